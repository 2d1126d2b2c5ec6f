//! # Courier Transport Boundary
//!
//! The courier is the external transport that durably stores and delivers
//! queued parcels (a job-runner-backed queue in production). The core
//! only consumes this contract; implementations live outside the crate.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::model::{Parcel, ScheduleSpec, TrackingCode, ValidationError};

/// Failure submitting work to the transport.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("courier submission failed: {message}")]
    Submission { message: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("unable to serialize message payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl SendError {
    /// Create a submission error.
    pub fn submission(message: impl Into<String>) -> Self {
        Self::Submission {
            message: message.into(),
        }
    }
}

/// Durable store-and-forward transport for parcels.
#[async_trait]
pub trait Courier: Send + Sync {
    /// Queue a parcel for delivery.
    async fn send(&self, parcel: &Parcel) -> Result<TrackingCode, SendError>;

    /// Queue a parcel on a recurring schedule.
    async fn send_recurring(
        &self,
        parcel: &Parcel,
        schedule: &ScheduleSpec,
    ) -> Result<TrackingCode, SendError>;

    /// Re-queue a previously tracked delivery.
    async fn resend(&self, code: &TrackingCode) -> Result<(), SendError>;
}

/// Mutual-exclusion wrapper for couriers whose implementations are not
/// internally thread-safe; hosts that share one sender across workers
/// route every submission through this.
pub struct SerializedSendingCourier {
    inner: Arc<dyn Courier>,
    gate: tokio::sync::Mutex<()>,
}

impl SerializedSendingCourier {
    pub fn new(inner: Arc<dyn Courier>) -> Self {
        Self {
            inner,
            gate: tokio::sync::Mutex::new(()),
        }
    }
}

#[async_trait]
impl Courier for SerializedSendingCourier {
    async fn send(&self, parcel: &Parcel) -> Result<TrackingCode, SendError> {
        let _held = self.gate.lock().await;
        debug!(parcel_id = %parcel.id, "serialized send");
        self.inner.send(parcel).await
    }

    async fn send_recurring(
        &self,
        parcel: &Parcel,
        schedule: &ScheduleSpec,
    ) -> Result<TrackingCode, SendError> {
        let _held = self.gate.lock().await;
        debug!(parcel_id = %parcel.id, "serialized recurring send");
        self.inner.send_recurring(parcel, schedule).await
    }

    async fn resend(&self, code: &TrackingCode) -> Result<(), SendError> {
        let _held = self.gate.lock().await;
        debug!(tracking_code = %code, "serialized resend");
        self.inner.resend(code).await
    }
}
