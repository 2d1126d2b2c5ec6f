//! # Message Handlers
//!
//! Handler extension points for the dispatch pipeline. A handler is
//! resolved per message type, fed the deserialized message after shared
//! state has been applied, and reports its outcome as a value the
//! dispatcher classifies exhaustively; delivery aborts are data, not
//! exceptions.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::postal::courier::SendError;
use crate::postal::tracking::TrackingError;
use crate::shares::AnyShareable;

/// A message carried through the bus.
///
/// Implementations are plain serde structs; the description is used for
/// envelope diagnostics and tracking display names.
pub trait BusMessage: std::any::Any + Send + Sync {
    /// Human-readable description of this message instance.
    fn description(&self) -> String;
}

/// Failure modes a handler can report.
///
/// `Abort` is an expected business signal: the sequence stops (and is
/// optionally resubmitted for retry) without surfacing a crash. Anything
/// else is `Fatal` and is recorded as a rejection, then re-thrown so the
/// external job runner's retry policy governs it.
#[derive(Debug, Error)]
pub enum HandlerFailure {
    #[error("delivery aborted: {reason}")]
    Abort {
        /// Why the handler stopped the sequence.
        reason: String,
        /// Whether the remaining sequence (including the aborted step)
        /// should be resubmitted.
        reschedule: bool,
        /// Optional delay before the resubmit.
        wait: Option<Duration>,
    },

    #[error(transparent)]
    Fatal(#[from] anyhow::Error),
}

impl HandlerFailure {
    /// Abort the sequence; the remaining envelopes are abandoned.
    pub fn abort(reason: impl Into<String>) -> Self {
        Self::Abort {
            reason: reason.into(),
            reschedule: false,
            wait: None,
        }
    }

    /// Abort and resubmit the remaining sequence, optionally after a wait,
    /// so the same step is retried.
    pub fn abort_and_reschedule(reason: impl Into<String>, wait: Option<Duration>) -> Self {
        Self::Abort {
            reason: reason.into(),
            reschedule: true,
            wait,
        }
    }

    /// Unexpected failure; recorded as a rejection and re-thrown.
    pub fn fatal(error: impl Into<anyhow::Error>) -> Self {
        Self::Fatal(error.into())
    }
}

impl From<TrackingError> for HandlerFailure {
    fn from(error: TrackingError) -> Self {
        Self::Fatal(error.into())
    }
}

impl From<SendError> for HandlerFailure {
    fn from(error: SendError) -> Self {
        Self::Fatal(error.into())
    }
}

/// Result of one handler execution.
pub type HandlerResult = Result<(), HandlerFailure>;

/// Processes one message type. Handlers are built fresh per dispatch by
/// the registry factory and may hold `Arc` handles to collaborators.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// The concrete message type this handler processes.
    type Message: BusMessage + Serialize + DeserializeOwned;

    /// Execute against the deserialized message. Runs as a single logical
    /// unit; may internally await I/O.
    async fn handle(&mut self, message: &Self::Message) -> HandlerResult;
}

/// A handler that resumes from seeded state when the same parcel envelope
/// is retried.
///
/// Before execution the dispatcher searches the parcel's accumulated
/// shared states for a snapshot keyed by the handler's concrete type: a
/// still-valid snapshot is seeded back, otherwise fresh state is created,
/// appended to the parcel, and seeded, so a retry of the same envelope
/// observes the state of the attempt that preceded it.
pub trait StatefulMessageHandler: MessageHandler {
    /// Resumable state carried between delivery attempts.
    type State: Serialize + DeserializeOwned + Send + 'static;

    /// Create fresh state for a first attempt.
    fn create_state(&self) -> Self::State;

    /// Whether a previously-captured state is still usable.
    fn is_state_valid(&self, state: &Self::State) -> bool;

    /// Install state before execution.
    fn seed_state(&mut self, state: Self::State);
}

/// Object-safe handler surface the dispatcher drives.
#[async_trait]
pub trait DynMessageHandler: Send {
    /// Execute against a type-erased message.
    async fn handle_dyn(&mut self, message: &AnyShareable) -> HandlerResult;

    /// The concrete handler, for share capture and state seeding.
    fn as_any(&self) -> &AnyShareable;

    /// The concrete handler, mutably.
    fn as_any_mut(&mut self) -> &mut AnyShareable;
}

/// Adapter carrying a typed handler behind the object-safe surface.
pub(crate) struct HandlerAdapter<H>(pub(crate) H);

#[async_trait]
impl<H> DynMessageHandler for HandlerAdapter<H>
where
    H: MessageHandler,
{
    async fn handle_dyn(&mut self, message: &AnyShareable) -> HandlerResult {
        let Some(message) = message.downcast_ref::<H::Message>() else {
            return Err(HandlerFailure::fatal(anyhow::anyhow!(
                "message payload does not match the handler's message type"
            )));
        };
        self.0.handle(message).await
    }

    fn as_any(&self) -> &AnyShareable {
        &self.0
    }

    fn as_any_mut(&mut self) -> &mut AnyShareable {
        &mut self.0
    }
}
