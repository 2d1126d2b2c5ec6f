//! # Message Dispatcher
//!
//! The per-envelope state machine. Each dispatch validates the parcel,
//! checks channel affinity, resolves a handler, seeds and applies shared
//! state, executes the handler, classifies the outcome, persists the
//! tracking transition, and re-queues the remaining envelopes.
//!
//! Envelopes within one parcel are strictly sequential: the remainder is
//! only resubmitted after the current envelope finishes, so at most one
//! envelope per parcel id is ever in flight. Different parcels run fully
//! concurrently; serializing topic-affecting runs is the coordination
//! protocol's job, not the dispatcher's.

use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::active_tracker::{ActiveMessageGuard, ActiveMessageTracker};
use super::handler::HandlerFailure;
use super::registry::HandlerRegistry;
use crate::error::DispatchError;
use crate::model::{Channel, ChannelMatchStrategy, Parcel, TrackingCode, TypeDescription, TypeMatchStrategy};
use crate::postal::courier::Courier;
use crate::postal::tracking::ParcelTrackingSystem;
use crate::shares::ShareManager;
use crate::topics::messages::RecurringHeaderMessage;

/// How one dispatch call concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The handler completed; `resent` is whether a successor parcel was
    /// queued for the remaining envelopes.
    Delivered { resent: bool },
    /// The envelope belongs to a channel this dispatcher does not
    /// monitor; the parcel was resent unmodified with no tracking calls.
    Redirected,
    /// The leading recurring-header envelope was stripped and the
    /// remainder resent with no tracking calls.
    RecurringHeaderSkipped,
    /// The handler raised the abort signal; `rescheduled` is whether the
    /// remaining sequence (including the aborted step) was resubmitted.
    Aborted { rescheduled: bool },
}

/// Per-envelope dispatch state machine bound to one channel affinity.
pub struct MessageDispatcher {
    registry: Arc<HandlerRegistry>,
    share_manager: Arc<ShareManager>,
    tracker: Arc<dyn ParcelTrackingSystem>,
    courier: Arc<dyn Courier>,
    active: Arc<ActiveMessageTracker>,
    channel_match_strategy: ChannelMatchStrategy,
    type_match_strategy: TypeMatchStrategy,
}

impl MessageDispatcher {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        share_manager: Arc<ShareManager>,
        tracker: Arc<dyn ParcelTrackingSystem>,
        courier: Arc<dyn Courier>,
    ) -> Self {
        Self {
            registry,
            share_manager,
            tracker,
            courier,
            active: Arc::new(ActiveMessageTracker::new()),
            channel_match_strategy: ChannelMatchStrategy::default(),
            type_match_strategy: TypeMatchStrategy::default(),
        }
    }

    /// Override the channel and type comparison strategies.
    pub fn with_strategies(
        mut self,
        channel_match_strategy: ChannelMatchStrategy,
        type_match_strategy: TypeMatchStrategy,
    ) -> Self {
        self.channel_match_strategy = channel_match_strategy;
        self.type_match_strategy = type_match_strategy;
        self
    }

    /// Share an externally-owned active-message counter, typically the
    /// hosting harness's shutdown gate.
    pub fn with_active_tracker(mut self, active: Arc<ActiveMessageTracker>) -> Self {
        self.active = active;
        self
    }

    /// The active-message counter this dispatcher reports into.
    pub fn active_messages(&self) -> Arc<ActiveMessageTracker> {
        self.active.clone()
    }

    /// Execute the first envelope of `parcel` on behalf of the worker
    /// bound to `bound_channel`.
    #[instrument(
        skip_all,
        fields(display_name = %display_name, tracking_code = %tracking_code, parcel_id = %parcel.id)
    )]
    pub async fn dispatch(
        &self,
        display_name: &str,
        tracking_code: &TrackingCode,
        parcel: Parcel,
        bound_channel: &Channel,
    ) -> Result<DispatchOutcome, DispatchError> {
        if parcel.envelopes.is_empty() {
            return Err(DispatchError::ParcelWithoutEnvelopes);
        }
        let envelope = parcel.envelopes[0].clone();

        if !envelope.payload_type.is_complete() {
            return Err(DispatchError::MessageTypeNotSpecified {
                tracking_code: tracking_code.clone(),
            });
        }

        // Channel affinity: a mixed-channel parcel fans back out through
        // the queue until the owning worker pool picks it up.
        if !envelope.address.matches(bound_channel, self.channel_match_strategy) {
            debug!(
                address = %envelope.address,
                bound = %bound_channel,
                "envelope addressed elsewhere; resending unmodified"
            );
            self.courier.send(&parcel).await?;
            return Ok(DispatchOutcome::Redirected);
        }

        // Recurring-header short-circuit: strip the throwaway envelope a
        // recurring schedule injects, with no tracking calls.
        if envelope.carries(
            &TypeDescription::of::<RecurringHeaderMessage>(),
            self.type_match_strategy,
        ) {
            let remainder = parcel.without_first_envelope();
            if !remainder.envelopes.is_empty() {
                self.courier.send(&remainder).await?;
            }
            return Ok(DispatchOutcome::RecurringHeaderSkipped);
        }

        let _active = ActiveMessageGuard::new(self.active.clone());
        self.tracker.update_attempting(tracking_code).await?;

        let registration = self
            .registry
            .resolve(&envelope.payload_type, self.type_match_strategy)
            .ok_or_else(|| DispatchError::HandlerNotFound {
                message_type: envelope.payload_type.full_name.clone(),
            })?;

        let mut message = (registration.deserialize)(&envelope.serialized_payload)?;
        let mut handler = (registration.build)();

        let mut shared_states = parcel.shared_interface_states.clone();

        // Stateful-handler resume: seed a still-valid prior snapshot, or
        // create fresh state and record it on the parcel so a retry of
        // this envelope can resume idempotently.
        if let Some(hooks) = &registration.state_hooks {
            let existing = shared_states
                .iter()
                .find(|state| {
                    state
                        .source_type
                        .matches(&registration.handler_type, self.type_match_strategy)
                })
                .cloned();
            match existing {
                Some(state) if (hooks.validate)(handler.as_any(), &state) => {
                    debug!(handler = %registration.handler_type, "resuming handler from seeded state");
                    (hooks.seed)(handler.as_any_mut(), &state)?;
                }
                _ => {
                    let fresh = (hooks.create)(handler.as_any())?;
                    (hooks.seed)(handler.as_any_mut(), &fresh)?;
                    shared_states.push(fresh);
                }
            }
        }

        // Forward propagation: every accumulated snapshot whose capability
        // the message declares, in list order; later writes win.
        for state in &shared_states {
            self.share_manager
                .apply_shared_interface_state(state, &mut *message)?;
        }

        let outcome = handler.handle_dyn(&*message).await;

        match outcome {
            Ok(()) => {
                shared_states.extend(
                    self.share_manager
                        .get_shared_interface_states(handler.as_any())?,
                );
                let delivered_payload = (registration.serialize)(&*message)?;
                let delivered = envelope.with_payload(delivered_payload);
                self.tracker.update_delivered(tracking_code, &delivered).await?;
                info!(
                    display_name,
                    message_type = %registration.message_type,
                    "envelope delivered"
                );

                if parcel.envelopes.len() > 1 {
                    let successor = parcel.next_with(shared_states);
                    self.courier.send(&successor).await?;
                    Ok(DispatchOutcome::Delivered { resent: true })
                } else {
                    Ok(DispatchOutcome::Delivered { resent: false })
                }
            }
            Err(HandlerFailure::Abort {
                reason,
                reschedule,
                wait,
            }) => {
                self.tracker.update_aborted(tracking_code, &reason).await?;
                warn!(display_name, reason = %reason, reschedule, "delivery aborted");
                if reschedule {
                    if let Some(wait) = wait {
                        tokio::time::sleep(wait).await;
                    }
                    // The full remaining set, including the envelope that
                    // just aborted, so the same step is retried.
                    let retry = parcel.with_shared_states(shared_states);
                    self.courier.send(&retry).await?;
                }
                Ok(DispatchOutcome::Aborted {
                    rescheduled: reschedule,
                })
            }
            Err(HandlerFailure::Fatal(source)) => {
                self.tracker
                    .update_rejected(tracking_code, &source.to_string())
                    .await?;
                warn!(display_name, error = %source, "delivery rejected");
                Err(DispatchError::Rejected { source })
            }
        }
    }
}

impl std::fmt::Debug for MessageDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageDispatcher")
            .field("registry", &self.registry)
            .field("channel_match_strategy", &self.channel_match_strategy)
            .field("type_match_strategy", &self.type_match_strategy)
            .finish()
    }
}
