//! # Tracking Reports
//!
//! Point-in-time delivery status for a tracking code, served by the
//! external tracking collaborator and consumed by the bounded
//! retry-until-status helper.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::envelope::TrackingCode;

/// Delivery status of one tracking code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParcelStatus {
    /// Never seen by the tracking system.
    #[default]
    Unknown,
    /// Queued but not yet addressed to a worker.
    InTransit,
    /// Addressed and awaiting an attempt.
    OutForDelivery,
    /// A handler raised the abort signal.
    Aborted,
    /// A handler failed with an unexpected error.
    Rejected,
    /// The handler completed.
    Delivered,
}

impl ParcelStatus {
    /// Statuses the retry-until-status helper may target. Anything else
    /// describes an in-flight delivery and retrying it would race the
    /// worker that owns it.
    pub const RETRYABLE: [ParcelStatus; 3] = [
        ParcelStatus::Aborted,
        ParcelStatus::Rejected,
        ParcelStatus::Delivered,
    ];

    /// Whether the retry helper is allowed to target this status.
    pub fn is_retryable_target(&self) -> bool {
        Self::RETRYABLE.contains(self)
    }
}

impl fmt::Display for ParcelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "Unknown"),
            Self::InTransit => write!(f, "InTransit"),
            Self::OutForDelivery => write!(f, "OutForDelivery"),
            Self::Aborted => write!(f, "Aborted"),
            Self::Rejected => write!(f, "Rejected"),
            Self::Delivered => write!(f, "Delivered"),
        }
    }
}

/// One row of a tracking-report query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParcelTrackingReport {
    /// The delivery attempt the report describes.
    pub tracking_code: TrackingCode,
    /// Last-known status.
    pub status: ParcelStatus,
    /// When the status last changed.
    pub last_updated_utc: DateTime<Utc>,
    /// Error payload recorded with a rejection, if any.
    pub rejection_message: Option<String>,
}
