//! # Topic Coordination Protocol
//!
//! Serializes and gates recurring workflows that affect or depend on
//! named topics. The protocol is built from ordinary messages and
//! handlers dispatched through the normal pipeline, plus the
//! parcel-construction rules that keep the injected envelopes
//! well-formed.

pub mod handlers;
pub mod injection;
pub mod messages;
pub mod recency;

pub use injection::{prepare_topic_parcel, validate_topic_markers};
pub use messages::ShareTopicStatusReports;

use std::sync::Arc;

use crate::dispatch::registry::HandlerRegistry;
use crate::postal::tracking::ParcelTrackingSystem;
use crate::shares::ShareRegistry;

use handlers::{
    AbortIfNoNewCertifiedNoticesHandler, AbortIfNoNewDependencyTopicDataHandler,
    AbortIfTopicsHaveSpecificStatusesHandler, FetchAndShareLatestTopicStatusReportsHandler,
    NullMessageHandler, RetryTrackingCodesInSpecificStatusesHandler, TopicBeingAffectedHandler,
    TopicWasAffectedHandler, WaitMessageHandler,
};
use messages::{
    AbortIfNoNewDependencyTopicDataMessage, AbortIfTopicsHaveSpecificStatusesMessage,
    TopicBeingAffectedMessage, TopicWasAffectedMessage,
};

/// Register every coordination handler and share-capability binding.
/// Called once at startup alongside business handler registration.
pub fn register_topic_coordination(
    handlers: &HandlerRegistry,
    shares: &ShareRegistry,
    tracker: Arc<dyn ParcelTrackingSystem>,
) {
    {
        let tracker = tracker.clone();
        handlers
            .register(move || FetchAndShareLatestTopicStatusReportsHandler::new(tracker.clone()));
    }
    handlers.register(|| AbortIfTopicsHaveSpecificStatusesHandler);
    handlers.register(|| AbortIfNoNewDependencyTopicDataHandler);
    handlers.register(TopicBeingAffectedHandler::default);
    handlers.register(TopicWasAffectedHandler::default);
    {
        let tracker = tracker.clone();
        handlers.register(move || AbortIfNoNewCertifiedNoticesHandler::new(tracker.clone()));
    }
    handlers.register(move || RetryTrackingCodesInSpecificStatusesHandler::new(tracker.clone()));
    handlers.register(|| NullMessageHandler);
    handlers.register(|| WaitMessageHandler);

    shares.register::<FetchAndShareLatestTopicStatusReportsHandler, ShareTopicStatusReports>();
    shares.register::<TopicBeingAffectedHandler, ShareTopicStatusReports>();
    shares.register::<TopicWasAffectedHandler, ShareTopicStatusReports>();
    shares.register::<AbortIfTopicsHaveSpecificStatusesMessage, ShareTopicStatusReports>();
    shares.register::<AbortIfNoNewDependencyTopicDataMessage, ShareTopicStatusReports>();
    shares.register::<TopicBeingAffectedMessage, ShareTopicStatusReports>();
    shares.register::<TopicWasAffectedMessage, ShareTopicStatusReports>();
}
