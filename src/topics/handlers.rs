//! # Coordination Handlers
//!
//! Handlers for the protocol messages. They run through the same
//! dispatcher as any business handler: the fetch handler shares the
//! status reports it reads, the gate handlers consume them via the
//! shared-state propagation step, and the marker handlers re-share them
//! so the tracking system can embed the dependency snapshot into the
//! run's notice.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::messages::{
    AbortIfNoNewCertifiedNoticesMessage, AbortIfNoNewDependencyTopicDataMessage,
    AbortIfTopicsHaveSpecificStatusesMessage, FetchAndShareLatestTopicStatusReportsMessage,
    NullMessage, TopicBeingAffectedMessage, TopicStatusReportsSnapshot, TopicWasAffectedMessage,
    RetryTrackingCodesInSpecificStatusesMessage, ShareTopicStatusReports, WaitMessage,
};
use super::recency;
use crate::dispatch::handler::{HandlerFailure, HandlerResult, MessageHandler};
use crate::model::{TopicCheckStrategy, TopicStatusReport, ValidationError};
use crate::postal::tracking::ParcelTrackingSystem;
use crate::shares::Shares;

/// The bounded-retry helper ran out of attempts with codes still in a
/// target status; distinct from never having started.
#[derive(Debug, Error)]
#[error("retry budget exhausted after {attempts} attempt(s); codes still in a target status: {codes}")]
pub struct RetriesExhaustedError {
    pub attempts: u32,
    pub codes: String,
}

/// Reads the latest status report of each requested topic and shares the
/// set forward for the gate and marker steps.
pub struct FetchAndShareLatestTopicStatusReportsHandler {
    tracker: Arc<dyn ParcelTrackingSystem>,
    reports: Vec<TopicStatusReport>,
}

impl FetchAndShareLatestTopicStatusReportsHandler {
    pub fn new(tracker: Arc<dyn ParcelTrackingSystem>) -> Self {
        Self {
            tracker,
            reports: Vec::new(),
        }
    }
}

#[async_trait]
impl MessageHandler for FetchAndShareLatestTopicStatusReportsHandler {
    type Message = FetchAndShareLatestTopicStatusReportsMessage;

    async fn handle(&mut self, message: &Self::Message) -> HandlerResult {
        let lookups = message
            .topics
            .iter()
            .map(|topic| self.tracker.get_latest_topic_notice(topic, &[]));
        let results = futures::future::join_all(lookups).await;

        let mut reports = Vec::with_capacity(message.topics.len());
        for (topic, result) in message.topics.iter().zip(results) {
            let report = result?.unwrap_or_else(|| TopicStatusReport::unknown(topic.clone()));
            reports.push(report);
        }
        debug!(reports = reports.len(), "fetched latest topic status reports");
        self.reports = reports;
        Ok(())
    }
}

impl Shares<ShareTopicStatusReports> for FetchAndShareLatestTopicStatusReportsHandler {
    fn capture(&self) -> TopicStatusReportsSnapshot {
        TopicStatusReportsSnapshot {
            reports: self.reports.clone(),
        }
    }

    fn apply(&mut self, snapshot: TopicStatusReportsSnapshot) {
        self.reports = snapshot.reports;
    }
}

/// Gate against topics currently holding an excluded status; the abort
/// reason names every matching topic.
#[derive(Default)]
pub struct AbortIfTopicsHaveSpecificStatusesHandler;

#[async_trait]
impl MessageHandler for AbortIfTopicsHaveSpecificStatusesHandler {
    type Message = AbortIfTopicsHaveSpecificStatusesMessage;

    async fn handle(&mut self, message: &Self::Message) -> HandlerResult {
        let matching: Vec<String> = message
            .topics
            .iter()
            .filter(|topic| {
                message.topic_status_reports.iter().any(|report| {
                    &report.topic == *topic
                        && message.statuses_to_abort_on.contains(&report.status)
                })
            })
            .map(ToString::to_string)
            .collect();

        let abort = match message.strategy {
            TopicCheckStrategy::Unspecified => false,
            TopicCheckStrategy::Any => !matching.is_empty(),
            TopicCheckStrategy::All => {
                !message.topics.is_empty() && matching.len() == message.topics.len()
            }
        };

        if abort {
            return Err(HandlerFailure::abort(format!(
                "Topics currently in {:?}: {}",
                message.statuses_to_abort_on,
                matching.join(", ")
            )));
        }
        Ok(())
    }
}

/// Gate on dependency recency: compares each dependency topic's current
/// report against the snapshot embedded in the impacting topic's latest
/// report.
#[derive(Default)]
pub struct AbortIfNoNewDependencyTopicDataHandler;

#[async_trait]
impl MessageHandler for AbortIfNoNewDependencyTopicDataHandler {
    type Message = AbortIfNoNewDependencyTopicDataMessage;

    async fn handle(&mut self, message: &Self::Message) -> HandlerResult {
        let impacting = message.impacting_topic.to_named();
        let baseline = message
            .topic_status_reports
            .iter()
            .find(|report| report.topic == impacting)
            .map(|report| report.dependency_topic_notices_at_start.clone())
            .unwrap_or_default();

        let with_new_data = recency::topics_with_new_data(
            &message.dependency_topics,
            &message.topic_status_reports,
            &baseline,
        );

        if recency::should_abort(message.strategy, &message.dependency_topics, &with_new_data) {
            let stale: Vec<String> = message
                .dependency_topics
                .iter()
                .filter(|topic| !with_new_data.contains(topic))
                .map(ToString::to_string)
                .collect();
            return Err(HandlerFailure::abort(format!(
                "No new data for dependency topics of {}: {}",
                message.impacting_topic,
                stale.join(", ")
            )));
        }
        Ok(())
    }
}

/// Marks the start of an affecting run. Re-shares the inbound status
/// reports so the delivered envelope embeds the dependency snapshot the
/// run began with.
#[derive(Default)]
pub struct TopicBeingAffectedHandler {
    reports: Vec<TopicStatusReport>,
}

#[async_trait]
impl MessageHandler for TopicBeingAffectedHandler {
    type Message = TopicBeingAffectedMessage;

    async fn handle(&mut self, message: &Self::Message) -> HandlerResult {
        debug!(topic = %message.topic, "topic being affected");
        self.reports = message.topic_status_reports.clone();
        Ok(())
    }
}

impl Shares<ShareTopicStatusReports> for TopicBeingAffectedHandler {
    fn capture(&self) -> TopicStatusReportsSnapshot {
        TopicStatusReportsSnapshot {
            reports: self.reports.clone(),
        }
    }

    fn apply(&mut self, snapshot: TopicStatusReportsSnapshot) {
        self.reports = snapshot.reports;
    }
}

/// Marks the completion of an affecting run.
#[derive(Default)]
pub struct TopicWasAffectedHandler {
    reports: Vec<TopicStatusReport>,
}

#[async_trait]
impl MessageHandler for TopicWasAffectedHandler {
    type Message = TopicWasAffectedMessage;

    async fn handle(&mut self, message: &Self::Message) -> HandlerResult {
        debug!(topic = %message.topic, "topic was affected");
        self.reports = message.topic_status_reports.clone();
        Ok(())
    }
}

impl Shares<ShareTopicStatusReports> for TopicWasAffectedHandler {
    fn capture(&self) -> TopicStatusReportsSnapshot {
        TopicStatusReportsSnapshot {
            reports: self.reports.clone(),
        }
    }

    fn apply(&mut self, snapshot: TopicStatusReportsSnapshot) {
        self.reports = snapshot.reports;
    }
}

/// Gate on certified-notice recentness. A failed check raises the
/// abort-and-reschedule signal carrying the configured wait, so the
/// caller re-enqueues after the wait instead of dropping the sequence.
pub struct AbortIfNoNewCertifiedNoticesHandler {
    tracker: Arc<dyn ParcelTrackingSystem>,
}

impl AbortIfNoNewCertifiedNoticesHandler {
    pub fn new(tracker: Arc<dyn ParcelTrackingSystem>) -> Self {
        Self { tracker }
    }
}

#[async_trait]
impl MessageHandler for AbortIfNoNewCertifiedNoticesHandler {
    type Message = AbortIfNoNewCertifiedNoticesMessage;

    async fn handle(&mut self, message: &Self::Message) -> HandlerResult {
        let now = Utc::now();
        let mut fresh = 0usize;
        let mut stale: Vec<String> = Vec::new();

        for check in &message.checks {
            let notice = self.tracker.get_latest_certified_notice(&check.topic).await?;
            let is_fresh = notice.is_some_and(|notice| {
                now.signed_duration_since(notice.delivered_date_utc).num_seconds()
                    <= check.recentness_threshold_seconds as i64
            });
            if is_fresh {
                fresh += 1;
            } else {
                stale.push(check.topic.to_string());
            }
        }

        let abort = match message.strategy {
            TopicCheckStrategy::Unspecified => false,
            TopicCheckStrategy::Any => fresh == 0 && !message.checks.is_empty(),
            TopicCheckStrategy::All => !stale.is_empty(),
        };

        if abort {
            return Err(HandlerFailure::abort_and_reschedule(
                format!("No recent certified notices for: {}", stale.join(", ")),
                Some(Duration::from_secs(message.reschedule_wait_seconds)),
            ));
        }
        Ok(())
    }
}

/// Bounded retry-until-status helper.
pub struct RetryTrackingCodesInSpecificStatusesHandler {
    tracker: Arc<dyn ParcelTrackingSystem>,
}

impl RetryTrackingCodesInSpecificStatusesHandler {
    pub fn new(tracker: Arc<dyn ParcelTrackingSystem>) -> Self {
        Self { tracker }
    }
}

#[async_trait]
impl MessageHandler for RetryTrackingCodesInSpecificStatusesHandler {
    type Message = RetryTrackingCodesInSpecificStatusesMessage;

    async fn handle(&mut self, message: &Self::Message) -> HandlerResult {
        let all_valid = !message.statuses_to_retry.is_empty()
            && message
                .statuses_to_retry
                .iter()
                .all(|status| status.is_retryable_target());
        if !all_valid {
            let provided: Vec<String> = message
                .statuses_to_retry
                .iter()
                .map(ToString::to_string)
                .collect();
            return Err(HandlerFailure::fatal(ValidationError::InvalidRetryStatuses {
                provided: provided.join(", "),
            }));
        }

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let reports = self
                .tracker
                .get_tracking_reports(&message.tracking_codes)
                .await?;
            let matching: Vec<_> = reports
                .iter()
                .filter(|report| message.statuses_to_retry.contains(&report.status))
                .collect();

            if matching.is_empty() {
                return Ok(());
            }
            for report in &matching {
                debug!(tracking_code = %report.tracking_code, status = %report.status, "resending tracked parcel");
                self.tracker.resend(&report.tracking_code).await?;
            }

            if attempt >= message.max_attempts {
                let codes: Vec<String> = matching
                    .iter()
                    .map(|report| report.tracking_code.to_string())
                    .collect();
                if message.throw_if_retries_exceeded {
                    return Err(HandlerFailure::fatal(RetriesExhaustedError {
                        attempts: attempt,
                        codes: codes.join(", "),
                    }));
                }
                warn!(attempts = attempt, "retry budget exhausted; exiting silently");
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(message.check_interval_ms)).await;
        }
    }
}

/// No-op step for schedule keep-alive parcels.
#[derive(Default)]
pub struct NullMessageHandler;

#[async_trait]
impl MessageHandler for NullMessageHandler {
    type Message = NullMessage;

    async fn handle(&mut self, _message: &Self::Message) -> HandlerResult {
        Ok(())
    }
}

/// Sleeps for the requested duration to space out subsequent envelopes.
#[derive(Default)]
pub struct WaitMessageHandler;

#[async_trait]
impl MessageHandler for WaitMessageHandler {
    type Message = WaitMessage;

    async fn handle(&mut self, message: &Self::Message) -> HandlerResult {
        tokio::time::sleep(Duration::from_millis(message.wait_ms)).await;
        Ok(())
    }
}
