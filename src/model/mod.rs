//! # Core Value Types
//!
//! Channels, envelopes, parcels, tracking codes, and topic values: the
//! immutable data the dispatch pipeline and coordination protocol operate
//! on.

pub mod channel;
pub mod envelope;
pub mod parcel;
pub mod topic;
pub mod tracking;

pub use channel::{Channel, ChannelMatchStrategy};
pub use envelope::{Envelope, TrackingCode, TypeDescription, TypeMatchStrategy};
pub use parcel::{Parcel, ScheduleSpec};
pub use topic::{
    AffectedTopic, CertifiedNotice, DependencyTopic, NamedTopic, SimultaneousRunsStrategy,
    TopicCheckStrategy, TopicStatus, TopicStatusReport,
};
pub use tracking::{ParcelStatus, ParcelTrackingReport};

use thiserror::Error;

/// Malformed parcel, envelope, or topic configuration. Raised at
/// construction or send time; parcels failing validation are never
/// queued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Parcel must contain envelopes")]
    NoEnvelopes,

    #[error("Envelope id cannot be empty")]
    EmptyEnvelopeId,

    #[error("Duplicate envelope id in parcel: {id}")]
    DuplicateEnvelopeId { id: String },

    #[error("Parcel with an affected topic must specify a simultaneous-runs strategy")]
    TopicWithoutRunsStrategy,

    #[error("Parcel with dependency topics must specify a dependency-topic check strategy")]
    DependenciesWithoutCheckStrategy,

    #[error("Cannot have multiple TopicBeingAffected envelopes in a parcel")]
    MultipleBeingAffected,

    #[error("Cannot have multiple TopicWasAffected envelopes in a parcel")]
    MultipleWasAffected,

    #[error("Cannot have a TopicBeingAffected after a TopicWasAffected.")]
    BeingAffectedAfterWasAffected,

    #[error("Topic marker for {marker_topic} does not match parcel topic {parcel_topic}")]
    MarkerTopicMismatch {
        marker_topic: String,
        parcel_topic: String,
    },

    #[error("Topic marker envelope {envelope_id} has an unreadable payload: {message}")]
    UnreadableMarkerPayload {
        envelope_id: String,
        message: String,
    },

    #[error("Topic marker envelopes require the parcel to declare an affected topic")]
    MarkerWithoutTopic,

    #[error("Invalid statuses to retry: {provided}; allowed: Aborted, Rejected, Delivered")]
    InvalidRetryStatuses { provided: String },
}
