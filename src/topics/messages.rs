//! # Coordination Messages
//!
//! The protocol messages the post office injects around topic-affecting
//! parcels, plus the retry and utility messages. All are ordinary
//! registered messages dispatched through the normal pipeline; the
//! status-report capability is how the fetch step's results reach the
//! gate and marker steps that run after it.

use serde::{Deserialize, Serialize};

use crate::dispatch::handler::BusMessage;
use crate::model::{
    AffectedTopic, DependencyTopic, NamedTopic, ParcelStatus, TopicCheckStrategy, TopicStatus,
    TopicStatusReport, TrackingCode,
};
use crate::shares::{SharedCapability, Shares};

/// Capability carrying the latest topic status reports forward through a
/// parcel.
pub struct ShareTopicStatusReports;

/// Property bag for [`ShareTopicStatusReports`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicStatusReportsSnapshot {
    pub reports: Vec<TopicStatusReport>,
}

impl SharedCapability for ShareTopicStatusReports {
    type Snapshot = TopicStatusReportsSnapshot;
}

/// Sentinel payload a recurring schedule prepends; the dispatcher strips
/// it without tracking or handler execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringHeaderMessage;

impl BusMessage for RecurringHeaderMessage {
    fn description(&self) -> String {
        "Recurring schedule header".to_string()
    }
}

/// Deliberate no-op step, used by schedule keep-alive parcels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NullMessage;

impl BusMessage for NullMessage {
    fn description(&self) -> String {
        "Null message".to_string()
    }
}

/// Sleeps inside its handler to space out subsequent envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitMessage {
    pub wait_ms: u64,
}

impl BusMessage for WaitMessage {
    fn description(&self) -> String {
        format!("Wait {} ms", self.wait_ms)
    }
}

/// Read the latest status report of each listed topic from the tracking
/// system and share the set forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchAndShareLatestTopicStatusReportsMessage {
    pub topics: Vec<NamedTopic>,
}

impl BusMessage for FetchAndShareLatestTopicStatusReportsMessage {
    fn description(&self) -> String {
        format!(
            "Fetch and share latest status reports for {} topic(s)",
            self.topics.len()
        )
    }
}

/// Abort when listed topics currently hold one of the given statuses,
/// aggregated per the strategy. Injected with the parcel's own topic and
/// `BeingAffected` to prevent overlapping runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbortIfTopicsHaveSpecificStatusesMessage {
    pub topics: Vec<NamedTopic>,
    pub statuses_to_abort_on: Vec<TopicStatus>,
    pub strategy: TopicCheckStrategy,
    /// Shared in by the fetch step.
    #[serde(default)]
    pub topic_status_reports: Vec<TopicStatusReport>,
}

impl BusMessage for AbortIfTopicsHaveSpecificStatusesMessage {
    fn description(&self) -> String {
        format!(
            "Abort if {} topic(s) hold {:?}",
            self.topics.len(),
            self.statuses_to_abort_on
        )
    }
}

impl Shares<ShareTopicStatusReports> for AbortIfTopicsHaveSpecificStatusesMessage {
    fn capture(&self) -> TopicStatusReportsSnapshot {
        TopicStatusReportsSnapshot {
            reports: self.topic_status_reports.clone(),
        }
    }

    fn apply(&mut self, snapshot: TopicStatusReportsSnapshot) {
        self.topic_status_reports = snapshot.reports;
    }
}

/// Abort unless the dependency topics carry new data relative to the
/// snapshot taken when the impacting topic's current run began.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbortIfNoNewDependencyTopicDataMessage {
    pub impacting_topic: AffectedTopic,
    pub dependency_topics: Vec<DependencyTopic>,
    pub strategy: TopicCheckStrategy,
    /// Shared in by the fetch step.
    #[serde(default)]
    pub topic_status_reports: Vec<TopicStatusReport>,
}

impl BusMessage for AbortIfNoNewDependencyTopicDataMessage {
    fn description(&self) -> String {
        format!(
            "Abort {} unless dependency topics have new data",
            self.impacting_topic
        )
    }
}

impl Shares<ShareTopicStatusReports> for AbortIfNoNewDependencyTopicDataMessage {
    fn capture(&self) -> TopicStatusReportsSnapshot {
        TopicStatusReportsSnapshot {
            reports: self.topic_status_reports.clone(),
        }
    }

    fn apply(&mut self, snapshot: TopicStatusReportsSnapshot) {
        self.topic_status_reports = snapshot.reports;
    }
}

/// Marks the start of the affecting run on a topic. The status reports
/// shared in at this point become the run's dependency-notice snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicBeingAffectedMessage {
    pub topic: AffectedTopic,
    #[serde(default)]
    pub topic_status_reports: Vec<TopicStatusReport>,
}

impl BusMessage for TopicBeingAffectedMessage {
    fn description(&self) -> String {
        format!("Topic being affected: {}", self.topic)
    }
}

impl Shares<ShareTopicStatusReports> for TopicBeingAffectedMessage {
    fn capture(&self) -> TopicStatusReportsSnapshot {
        TopicStatusReportsSnapshot {
            reports: self.topic_status_reports.clone(),
        }
    }

    fn apply(&mut self, snapshot: TopicStatusReportsSnapshot) {
        self.topic_status_reports = snapshot.reports;
    }
}

/// Marks the completion of the affecting run on a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicWasAffectedMessage {
    pub topic: AffectedTopic,
    #[serde(default)]
    pub topic_status_reports: Vec<TopicStatusReport>,
}

impl BusMessage for TopicWasAffectedMessage {
    fn description(&self) -> String {
        format!("Topic was affected: {}", self.topic)
    }
}

impl Shares<ShareTopicStatusReports> for TopicWasAffectedMessage {
    fn capture(&self) -> TopicStatusReportsSnapshot {
        TopicStatusReportsSnapshot {
            reports: self.topic_status_reports.clone(),
        }
    }

    fn apply(&mut self, snapshot: TopicStatusReportsSnapshot) {
        self.topic_status_reports = snapshot.reports;
    }
}

/// One recentness check of [`AbortIfNoNewCertifiedNoticesMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertifiedNoticeCheck {
    pub topic: NamedTopic,
    /// A notice older than this is stale.
    pub recentness_threshold_seconds: u64,
}

/// Abort-and-reschedule gate on certified notice recentness: when the
/// checks fail, the sequence is resubmitted after the configured wait
/// instead of being dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbortIfNoNewCertifiedNoticesMessage {
    pub checks: Vec<CertifiedNoticeCheck>,
    pub strategy: TopicCheckStrategy,
    pub reschedule_wait_seconds: u64,
}

impl BusMessage for AbortIfNoNewCertifiedNoticesMessage {
    fn description(&self) -> String {
        format!(
            "Abort and reschedule unless certified notices are recent for {} check(s)",
            self.checks.len()
        )
    }
}

/// Bounded retry-until-status helper: polls tracking reports for the
/// given codes and resends each code still in a target status, up to the
/// attempt budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryTrackingCodesInSpecificStatusesMessage {
    pub tracking_codes: Vec<TrackingCode>,
    /// Only `Aborted`, `Rejected`, and `Delivered` are valid targets.
    pub statuses_to_retry: Vec<ParcelStatus>,
    pub check_interval_ms: u64,
    pub max_attempts: u32,
    /// Raise the distinct retries-exhausted condition instead of exiting
    /// silently when the budget runs out.
    pub throw_if_retries_exceeded: bool,
}

impl RetryTrackingCodesInSpecificStatusesMessage {
    /// Retry the given codes while they remain in the given statuses,
    /// polling on the default interval and exiting silently on
    /// exhaustion.
    pub fn new(
        tracking_codes: Vec<TrackingCode>,
        statuses_to_retry: Vec<ParcelStatus>,
        max_attempts: u32,
    ) -> Self {
        Self {
            tracking_codes,
            statuses_to_retry,
            check_interval_ms: crate::constants::DEFAULT_RETRY_CHECK_INTERVAL_MS,
            max_attempts,
            throw_if_retries_exceeded: false,
        }
    }

    /// Raise the distinct retries-exhausted condition instead of exiting
    /// silently.
    pub fn with_throw_on_exhaustion(mut self) -> Self {
        self.throw_if_retries_exceeded = true;
        self
    }
}

impl BusMessage for RetryTrackingCodesInSpecificStatusesMessage {
    fn description(&self) -> String {
        format!(
            "Retry {} tracking code(s) while in {:?}",
            self.tracking_codes.len(),
            self.statuses_to_retry
        )
    }
}
