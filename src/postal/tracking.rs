//! # Parcel Tracking Boundary
//!
//! The tracking system records parcel lifecycle transitions and serves
//! tracking-report and topic-notice queries. It is backed by durable
//! external storage that can transiently fail, so a retrying wrapper with
//! bounded linear backoff is provided for the write operations.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::model::{
    CertifiedNotice, Channel, Envelope, NamedTopic, Parcel, ParcelTrackingReport, TopicStatus,
    TrackingCode,
};

/// Failure talking to the tracking store.
#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("tracking store unavailable: {message}")]
    StoreUnavailable { message: String },

    #[error("tracking update failed: {operation}: {message}")]
    UpdateFailed { operation: String, message: String },

    #[error("tracking query failed: {operation}: {message}")]
    QueryFailed { operation: String, message: String },
}

impl TrackingError {
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
        }
    }

    pub fn update_failed(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UpdateFailed {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn query_failed(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::QueryFailed {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// Lifecycle writes and tracking queries served by the external
/// event-sourced store.
#[async_trait]
pub trait ParcelTrackingSystem: Send + Sync {
    /// A parcel was queued for delivery.
    async fn update_sent(
        &self,
        code: &TrackingCode,
        parcel: &Parcel,
        address: &Channel,
    ) -> Result<(), TrackingError>;

    /// A parcel was routed to its destination channel.
    async fn update_addressed(
        &self,
        code: &TrackingCode,
        address: &Channel,
    ) -> Result<(), TrackingError>;

    /// A dispatcher began executing the envelope.
    async fn update_attempting(&self, code: &TrackingCode) -> Result<(), TrackingError>;

    /// The handler failed unexpectedly.
    async fn update_rejected(&self, code: &TrackingCode, message: &str)
        -> Result<(), TrackingError>;

    /// The handler raised the abort signal.
    async fn update_aborted(&self, code: &TrackingCode, reason: &str) -> Result<(), TrackingError>;

    /// The handler completed; `delivered` carries the message state as it
    /// was after execution, including applied shares.
    async fn update_delivered(
        &self,
        code: &TrackingCode,
        delivered: &Envelope,
    ) -> Result<(), TrackingError>;

    /// Request a re-delivery of a tracked parcel.
    async fn resend(&self, code: &TrackingCode) -> Result<(), TrackingError>;

    /// Current status of each given tracking code.
    async fn get_tracking_reports(
        &self,
        codes: &[TrackingCode],
    ) -> Result<Vec<ParcelTrackingReport>, TrackingError>;

    /// Latest notice that a topic was affected, optionally filtered to a
    /// status subset (empty filter means any status).
    async fn get_latest_topic_notice(
        &self,
        topic: &NamedTopic,
        status_filter: &[TopicStatus],
    ) -> Result<Option<crate::model::TopicStatusReport>, TrackingError>;

    /// Latest certified notice that a topic's affecting run delivered.
    async fn get_latest_certified_notice(
        &self,
        topic: &NamedTopic,
    ) -> Result<Option<CertifiedNotice>, TrackingError>;
}

/// Retry settings for tracking writes: linear backoff of
/// `base_delay * attempt` up to `max_attempts` total attempts.
#[derive(Debug, Clone, Copy)]
pub struct TrackingRetrySettings {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for TrackingRetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: crate::constants::DEFAULT_TRACKING_RETRY_ATTEMPTS,
            base_delay: Duration::from_millis(crate::constants::DEFAULT_TRACKING_RETRY_BASE_DELAY_MS),
        }
    }
}

/// Wrapper that retries tracking writes with bounded backoff. Queries
/// pass through unretried; their callers decide how stale data is
/// handled.
pub struct RetryingTrackingSystem {
    inner: Arc<dyn ParcelTrackingSystem>,
    settings: TrackingRetrySettings,
}

impl RetryingTrackingSystem {
    pub fn new(inner: Arc<dyn ParcelTrackingSystem>, settings: TrackingRetrySettings) -> Self {
        Self { inner, settings }
    }

    async fn retry_write<F, Fut>(&self, operation: &str, call: F) -> Result<(), TrackingError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<(), TrackingError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match call().await {
                Ok(()) => return Ok(()),
                Err(error) if attempt < self.settings.max_attempts => {
                    warn!(
                        operation,
                        attempt,
                        error = %error,
                        "tracking write failed; backing off"
                    );
                    tokio::time::sleep(self.settings.base_delay * attempt).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[async_trait]
impl ParcelTrackingSystem for RetryingTrackingSystem {
    async fn update_sent(
        &self,
        code: &TrackingCode,
        parcel: &Parcel,
        address: &Channel,
    ) -> Result<(), TrackingError> {
        self.retry_write("update_sent", || self.inner.update_sent(code, parcel, address))
            .await
    }

    async fn update_addressed(
        &self,
        code: &TrackingCode,
        address: &Channel,
    ) -> Result<(), TrackingError> {
        self.retry_write("update_addressed", || {
            self.inner.update_addressed(code, address)
        })
        .await
    }

    async fn update_attempting(&self, code: &TrackingCode) -> Result<(), TrackingError> {
        self.retry_write("update_attempting", || self.inner.update_attempting(code))
            .await
    }

    async fn update_rejected(
        &self,
        code: &TrackingCode,
        message: &str,
    ) -> Result<(), TrackingError> {
        self.retry_write("update_rejected", || {
            self.inner.update_rejected(code, message)
        })
        .await
    }

    async fn update_aborted(&self, code: &TrackingCode, reason: &str) -> Result<(), TrackingError> {
        self.retry_write("update_aborted", || self.inner.update_aborted(code, reason))
            .await
    }

    async fn update_delivered(
        &self,
        code: &TrackingCode,
        delivered: &Envelope,
    ) -> Result<(), TrackingError> {
        self.retry_write("update_delivered", || {
            self.inner.update_delivered(code, delivered)
        })
        .await
    }

    async fn resend(&self, code: &TrackingCode) -> Result<(), TrackingError> {
        self.retry_write("resend", || self.inner.resend(code)).await
    }

    async fn get_tracking_reports(
        &self,
        codes: &[TrackingCode],
    ) -> Result<Vec<ParcelTrackingReport>, TrackingError> {
        self.inner.get_tracking_reports(codes).await
    }

    async fn get_latest_topic_notice(
        &self,
        topic: &NamedTopic,
        status_filter: &[TopicStatus],
    ) -> Result<Option<crate::model::TopicStatusReport>, TrackingError> {
        self.inner.get_latest_topic_notice(topic, status_filter).await
    }

    async fn get_latest_certified_notice(
        &self,
        topic: &NamedTopic,
    ) -> Result<Option<CertifiedNotice>, TrackingError> {
        self.inner.get_latest_certified_notice(topic).await
    }
}
