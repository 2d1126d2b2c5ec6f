//! # Error Types
//!
//! Crate-level error taxonomy. Validation and dispatch errors are local
//! and fatal to the current call and must never be retried blindly; abort
//! signals are recovered inside the dispatcher and never escape it;
//! rejections propagate unchanged so the external job runner's retry
//! policy is the single source of truth for total attempt counts.

use thiserror::Error;

use crate::model::{TrackingCode, ValidationError};
use crate::postal::courier::SendError;
use crate::postal::tracking::TrackingError;
use crate::shares::ShareError;

/// Failure inside the per-envelope dispatch state machine.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Parcel must contain envelopes")]
    ParcelWithoutEnvelopes,

    #[error("Message type not specified in envelope; {tracking_code}")]
    MessageTypeNotSpecified { tracking_code: TrackingCode },

    #[error("Unable to find handler for message type {message_type}")]
    HandlerNotFound { message_type: String },

    /// Payload (de)serialization failures propagate unmodified.
    #[error(transparent)]
    Payload(#[from] serde_json::Error),

    #[error("message payload is not the registered type {expected}")]
    PayloadTypeMismatch { expected: String },

    #[error(transparent)]
    Share(#[from] ShareError),

    #[error("tracking system failure during dispatch: {0}")]
    Tracking(#[from] TrackingError),

    #[error("courier failure during dispatch: {0}")]
    Send(#[from] SendError),

    /// The handler failed unexpectedly; recorded as rejected and
    /// re-thrown unchanged to the caller.
    #[error("handler rejected delivery: {source}")]
    Rejected {
        #[source]
        source: anyhow::Error,
    },
}

/// Aggregate error for crate entry points.
#[derive(Debug, Error)]
pub enum CourierError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Tracking error: {0}")]
    Tracking(#[from] TrackingError),

    #[error("Courier error: {0}")]
    Send(#[from] SendError),

    #[error("Share error: {0}")]
    Share(#[from] ShareError),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, CourierError>;
