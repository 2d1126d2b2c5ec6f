//! # Parcels
//!
//! A parcel is an ordered, atomically-abandonable sequence of envelopes.
//! The dispatcher only ever executes the first envelope; on success it
//! produces a *new* parcel value holding the remaining envelopes and the
//! extended shared-state list and resubmits it, so re-queued parcels are
//! always safe to hand to a concurrent queue implementation.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use super::channel::Channel;
use super::envelope::Envelope;
use super::topic::{AffectedTopic, DependencyTopic, SimultaneousRunsStrategy, TopicCheckStrategy};
use super::ValidationError;
use crate::dispatch::handler::BusMessage;
use crate::shares::SharedInterfaceState;

/// Recurrence specification handed opaquely to the courier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSpec {
    /// Cron expression the job runner schedules the parcel on.
    pub cron_expression: String,
}

impl ScheduleSpec {
    pub fn new(cron_expression: impl Into<String>) -> Self {
        Self {
            cron_expression: cron_expression.into(),
        }
    }
}

/// An ordered sequence of envelopes to execute serially, abandoning the
/// rest on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parcel {
    /// Identity for tracking; stable across trim-and-resend cycles.
    pub id: Uuid,
    /// Diagnostic name.
    pub name: String,
    /// Ordered envelopes; must be non-empty to dispatch.
    pub envelopes: Vec<Envelope>,
    /// Shared-state snapshots accumulated across the sequence, in
    /// application order. Append-only: successors carry extended copies.
    #[serde(default)]
    pub shared_interface_states: Vec<SharedInterfaceState>,
    /// The topic this parcel impacts, if any.
    #[serde(default)]
    pub topic: Option<AffectedTopic>,
    /// Topics this parcel depends on having been recently affected.
    #[serde(default)]
    pub dependency_topics: Vec<DependencyTopic>,
    /// Aggregation strategy for the dependency recency check.
    #[serde(default)]
    pub dependency_topic_check_strategy: TopicCheckStrategy,
    /// Gate against overlapping runs on the same topic.
    #[serde(default)]
    pub simultaneous_runs_strategy: SimultaneousRunsStrategy,
}

impl Parcel {
    /// Create a parcel with a fresh id and no topic configuration.
    pub fn new(name: impl Into<String>, envelopes: Vec<Envelope>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            envelopes,
            shared_interface_states: Vec::new(),
            topic: None,
            dependency_topics: Vec::new(),
            dependency_topic_check_strategy: TopicCheckStrategy::Unspecified,
            simultaneous_runs_strategy: SimultaneousRunsStrategy::Unspecified,
        }
    }

    /// Wrap a single message into a one-envelope parcel.
    pub fn for_single_message<M>(message: &M, address: &Channel) -> Result<Self, serde_json::Error>
    where
        M: BusMessage + Serialize,
    {
        let envelope = Envelope::for_message(message, address)?;
        Ok(Self::new(message.description(), vec![envelope]))
    }

    /// Declare the topic this parcel impacts.
    pub fn with_topic(mut self, topic: AffectedTopic, strategy: SimultaneousRunsStrategy) -> Self {
        self.topic = Some(topic);
        self.simultaneous_runs_strategy = strategy;
        self
    }

    /// Declare the topics this parcel depends on.
    pub fn with_dependency_topics(
        mut self,
        topics: Vec<DependencyTopic>,
        strategy: TopicCheckStrategy,
    ) -> Self {
        self.dependency_topics = topics;
        self.dependency_topic_check_strategy = strategy;
        self
    }

    /// The envelope the dispatcher would execute next.
    pub fn first_envelope(&self) -> Option<&Envelope> {
        self.envelopes.first()
    }

    /// Successor parcel after a successful delivery: all-but-first
    /// envelopes and the extended shared-state list.
    pub fn next_with(&self, shared_interface_states: Vec<SharedInterfaceState>) -> Self {
        Self {
            envelopes: self.envelopes.iter().skip(1).cloned().collect(),
            shared_interface_states,
            ..self.clone()
        }
    }

    /// The same parcel minus its first envelope, shares untouched; used
    /// for the recurring-header short-circuit.
    pub fn without_first_envelope(&self) -> Self {
        Self {
            envelopes: self.envelopes.iter().skip(1).cloned().collect(),
            ..self.clone()
        }
    }

    /// The same parcel with a replacement shared-state list; used for
    /// abort-with-reschedule resends where the envelope set is retained.
    pub fn with_shared_states(&self, shared_interface_states: Vec<SharedInterfaceState>) -> Self {
        Self {
            shared_interface_states,
            ..self.clone()
        }
    }

    /// The same parcel with a replacement envelope list.
    pub fn with_envelopes(&self, envelopes: Vec<Envelope>) -> Self {
        Self {
            envelopes,
            ..self.clone()
        }
    }

    /// The same parcel with one envelope prepended.
    pub fn with_leading_envelope(&self, envelope: Envelope) -> Self {
        let mut envelopes = Vec::with_capacity(self.envelopes.len() + 1);
        envelopes.push(envelope);
        envelopes.extend(self.envelopes.iter().cloned());
        self.with_envelopes(envelopes)
    }

    /// Enforce the structural invariants required before a parcel may be
    /// queued: non-empty envelopes with non-empty unique ids, and topic
    /// configuration paired with its strategies.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.envelopes.is_empty() {
            return Err(ValidationError::NoEnvelopes);
        }

        let mut seen = HashSet::new();
        for envelope in &self.envelopes {
            if envelope.id.is_empty() {
                return Err(ValidationError::EmptyEnvelopeId);
            }
            if !seen.insert(envelope.id.as_str()) {
                return Err(ValidationError::DuplicateEnvelopeId {
                    id: envelope.id.clone(),
                });
            }
        }

        if self.topic.is_some()
            && self.simultaneous_runs_strategy == SimultaneousRunsStrategy::Unspecified
        {
            return Err(ValidationError::TopicWithoutRunsStrategy);
        }

        if !self.dependency_topics.is_empty()
            && self.dependency_topic_check_strategy == TopicCheckStrategy::Unspecified
        {
            return Err(ValidationError::DependenciesWithoutCheckStrategy);
        }

        Ok(())
    }
}
