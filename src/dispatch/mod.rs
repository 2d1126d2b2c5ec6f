//! # Dispatch Pipeline
//!
//! Handler resolution, the per-envelope state machine, the active-message
//! counter, and the polling worker pool.

pub mod active_tracker;
pub mod dispatcher;
pub mod handler;
pub mod registry;
pub mod worker;

pub use active_tracker::{ActiveMessageGuard, ActiveMessageTracker};
pub use dispatcher::{DispatchOutcome, MessageDispatcher};
pub use handler::{
    BusMessage, DynMessageHandler, HandlerFailure, HandlerResult, MessageHandler,
    StatefulMessageHandler,
};
pub use registry::{HandlerRegistration, HandlerRegistry};
pub use worker::{DispatchWorkerPool, ParcelQueue, QueuedParcel, WorkerPoolSettings};
