//! # Dependency Recency Check
//!
//! The temporal-consistency comparison behind the dependency-topic gate:
//! a dependency counts as carrying new data when its current report's
//! completion timestamp is strictly later than the snapshot recorded for
//! it when the impacting topic's current run began.

use crate::model::{DependencyTopic, TopicCheckStrategy, TopicStatus, TopicStatusReport};

/// Whether one dependency topic carries new data.
///
/// A topic is new when a current report exists, its status is not
/// `Unknown`, and either no baseline entry exists for it (trivially new)
/// or its completion timestamp is strictly later than the baseline's. A
/// current report without a completion timestamp is never new against an
/// existing baseline entry; a timestamped current report against a
/// baseline entry that never completed is new.
pub fn has_new_data(
    topic: &DependencyTopic,
    current_reports: &[TopicStatusReport],
    baseline_at_start: &[TopicStatusReport],
) -> bool {
    let named = topic.to_named();
    let Some(current) = current_reports.iter().find(|report| report.topic == named) else {
        return false;
    };
    if current.status == TopicStatus::Unknown {
        return false;
    }
    let Some(baseline) = baseline_at_start.iter().find(|report| report.topic == named) else {
        return true;
    };
    match (
        current.affects_completed_date_utc,
        baseline.affects_completed_date_utc,
    ) {
        (Some(current_completed), Some(baseline_completed)) => {
            current_completed > baseline_completed
        }
        (Some(_), None) => true,
        (None, _) => false,
    }
}

/// The subset of `checked` topics that carry new data.
pub fn topics_with_new_data(
    checked: &[DependencyTopic],
    current_reports: &[TopicStatusReport],
    baseline_at_start: &[TopicStatusReport],
) -> Vec<DependencyTopic> {
    checked
        .iter()
        .filter(|topic| has_new_data(topic, current_reports, baseline_at_start))
        .cloned()
        .collect()
}

/// Aggregate the per-topic results: `Any` aborts unless at least one
/// topic is new, `All` aborts unless every one is, `Unspecified` never
/// aborts. An empty checked set never aborts.
pub fn should_abort(
    strategy: TopicCheckStrategy,
    checked: &[DependencyTopic],
    with_new_data: &[DependencyTopic],
) -> bool {
    if checked.is_empty() {
        return false;
    }
    match strategy {
        TopicCheckStrategy::Unspecified => false,
        TopicCheckStrategy::Any => with_new_data.is_empty(),
        TopicCheckStrategy::All => with_new_data.len() < checked.len(),
    }
}
