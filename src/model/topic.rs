//! # Topic Value Types
//!
//! Named subjects that recurring workflows impact or depend on. The
//! affected and dependency kinds are distinct newtypes so a dependency can
//! never be passed where an impacted topic is expected, even when both
//! carry the same name. [`NamedTopic`] is the kind-erased key used by
//! status reports and tracking queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The topic a running workflow is currently impacting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AffectedTopic(pub String);

/// A topic a workflow requires to have been recently affected before it
/// may proceed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyTopic(pub String);

/// Kind-erased topic name used as the key of status reports and notices.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamedTopic(pub String);

impl AffectedTopic {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn to_named(&self) -> NamedTopic {
        NamedTopic(self.0.clone())
    }
}

impl DependencyTopic {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn to_named(&self) -> NamedTopic {
        NamedTopic(self.0.clone())
    }
}

impl NamedTopic {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl fmt::Display for AffectedTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for DependencyTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for NamedTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Last-known affecting state of a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TopicStatus {
    /// No affecting run has ever been recorded.
    #[default]
    Unknown,
    /// An affecting run is currently in flight.
    BeingAffected,
    /// The most recent affecting run completed.
    WasAffected,
    /// The most recent affecting run failed.
    Failed,
}

/// Gate controlling whether a topic-affecting parcel may run while another
/// run on the same topic is still in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SimultaneousRunsStrategy {
    /// No gate configured; a topic-bearing parcel must not use this.
    #[default]
    Unspecified,
    /// Abort a new run while the topic's latest report shows `BeingAffected`.
    AbortSubsequentRunsWhenOneIsRunning,
}

/// Aggregation applied across a set of per-topic checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TopicCheckStrategy {
    /// Checks are disabled; never aborts.
    #[default]
    Unspecified,
    /// Proceed when at least one topic passes.
    Any,
    /// Proceed only when every topic passes.
    All,
}

/// Point-in-time read of a topic's status.
///
/// `dependency_topic_notices_at_start` is the snapshot, captured when the
/// current affecting run began, of what each of the topic's own dependency
/// topics looked like at that moment; later recency comparisons are
/// measured against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicStatusReport {
    /// The topic the report describes.
    pub topic: NamedTopic,
    /// Last-known affecting state.
    pub status: TopicStatus,
    /// When the most recent affecting run completed, if it has.
    pub affects_completed_date_utc: Option<DateTime<Utc>>,
    /// Dependency-topic snapshot taken when the current run began.
    #[serde(default)]
    pub dependency_topic_notices_at_start: Vec<TopicStatusReport>,
}

impl TopicStatusReport {
    /// A report for a topic nothing has ever affected.
    pub fn unknown(topic: NamedTopic) -> Self {
        Self {
            topic,
            status: TopicStatus::Unknown,
            affects_completed_date_utc: None,
            dependency_topic_notices_at_start: Vec::new(),
        }
    }
}

/// Certified record that a topic's affecting run delivered, with the
/// delivery timestamp used by recentness checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertifiedNotice {
    /// The affected topic.
    pub topic: NamedTopic,
    /// When the affecting run's final envelope delivered.
    pub delivered_date_utc: DateTime<Utc>,
}
