//! # Postal Boundary
//!
//! The sending surface ([`PostOffice`]) and the external collaborator
//! contracts the core consumes: the durable courier transport and the
//! parcel tracking system, plus the serializing and retrying wrappers
//! hosts layer over them.

pub mod courier;
pub mod post_office;
pub mod tracking;

pub use courier::{Courier, SendError, SerializedSendingCourier};
pub use post_office::PostOffice;
pub use tracking::{
    ParcelTrackingSystem, RetryingTrackingSystem, TrackingError, TrackingRetrySettings,
};
