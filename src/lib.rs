#![allow(clippy::doc_markdown)] // Allow technical terms in docs without backticks
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Courier Core
//!
//! Store-and-forward message bus core: ordered sequences of work items
//! ("parcels") dispatched one envelope at a time to type-matched
//! handlers, with cross-message state propagation, topic-based dependency
//! coordination between independently-scheduled workflows, and
//! abort/reschedule/reject resilience semantics.
//!
//! ## Architecture
//!
//! The crate is the dispatch and coordination core only. Durable parcel
//! queueing, lifecycle persistence, and tracking-report storage are
//! external collaborators consumed through the traits in [`postal`] and
//! [`dispatch::worker`]:
//!
//! - [`model`] - channels, envelopes, parcels, tracking codes, topics
//! - [`shares`] - capability snapshots propagated across a sequence
//! - [`dispatch`] - handler registry, the per-envelope state machine,
//!   the active-message counter, and the polling worker pool
//! - [`postal`] - the sending surface and the courier/tracking contracts
//! - [`topics`] - the topic coordination protocol
//!
//! ## Dispatch cycle
//!
//! The external job runner pops one parcel and calls
//! [`dispatch::MessageDispatcher::dispatch`]. Only the parcel's first
//! envelope executes; on success a new parcel holding the remaining
//! envelopes and the extended shared-state list is resubmitted through
//! the courier. The cycle repeats until the envelope list is exhausted,
//! a handler aborts without reschedule, or the delivery is rejected.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use courier_core::dispatch::{HandlerRegistry, MessageDispatcher};
//! use courier_core::shares::{ShareManager, ShareRegistry};
//! use courier_core::topics::register_topic_coordination;
//! # use courier_core::postal::{Courier, ParcelTrackingSystem};
//!
//! # fn wire(tracker: Arc<dyn ParcelTrackingSystem>, courier: Arc<dyn Courier>) {
//! let handlers = Arc::new(HandlerRegistry::new());
//! let shares = Arc::new(ShareRegistry::new());
//! register_topic_coordination(&handlers, &shares, tracker.clone());
//!
//! let dispatcher = MessageDispatcher::new(
//!     handlers,
//!     Arc::new(ShareManager::new(shares)),
//!     tracker,
//!     courier,
//! );
//! # let _ = dispatcher;
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod model;
pub mod postal;
pub mod shares;
pub mod topics;

pub use config::CourierConfig;
pub use dispatch::{
    ActiveMessageTracker, BusMessage, DispatchOutcome, HandlerFailure, HandlerRegistry,
    HandlerResult, MessageDispatcher, MessageHandler, StatefulMessageHandler,
};
pub use error::{CourierError, DispatchError, Result};
pub use model::{
    AffectedTopic, Channel, DependencyTopic, Envelope, NamedTopic, Parcel, ParcelStatus,
    ScheduleSpec, SimultaneousRunsStrategy, TopicCheckStrategy, TopicStatus, TopicStatusReport,
    TrackingCode, TypeDescription, ValidationError,
};
pub use postal::{Courier, ParcelTrackingSystem, PostOffice, SendError, TrackingError};
pub use shares::{ShareManager, ShareRegistry, SharedInterfaceState};
