//! Topic coordination integration tests: envelope injection, overlap
//! gating, dependency recency, certified-notice reschedule, and the
//! bounded retry helper, all driven through the real dispatcher.

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::{EchoMessage, TestBus, WORK_CHANNEL};
use courier_core::dispatch::DispatchOutcome;
use courier_core::error::DispatchError;
use courier_core::model::{
    AffectedTopic, CertifiedNotice, Channel, DependencyTopic, Envelope, NamedTopic, Parcel,
    ParcelStatus, SimultaneousRunsStrategy, TopicCheckStrategy, TopicStatus, TopicStatusReport,
    TrackingCode, ValidationError,
};
use courier_core::postal::SendError;
use courier_core::topics::messages::{
    AbortIfNoNewCertifiedNoticesMessage, CertifiedNoticeCheck,
    RetryTrackingCodesInSpecificStatusesMessage,
};

fn payload_envelope(label: &str) -> Envelope {
    Envelope::for_message(
        &EchoMessage {
            label: label.to_string(),
            entries: Vec::new(),
        },
        &Channel::named(WORK_CHANNEL),
    )
    .unwrap()
}

fn report(
    name: &str,
    status: TopicStatus,
    completed: Option<chrono::DateTime<Utc>>,
    notices_at_start: Vec<TopicStatusReport>,
) -> TopicStatusReport {
    TopicStatusReport {
        topic: NamedTopic::new(name),
        status,
        affects_completed_date_utc: completed,
        dependency_topic_notices_at_start: notices_at_start,
    }
}

#[tokio::test]
async fn test_topic_send_injects_five_envelopes_and_completes() {
    let bus = TestBus::new();
    let parcel = Parcel::new("affect me", vec![payload_envelope("payload")]).with_topic(
        AffectedTopic::new("me"),
        SimultaneousRunsStrategy::AbortSubsequentRunsWhenOneIsRunning,
    );
    bus.post_office.send(parcel).await.unwrap();

    let submitted = &bus.courier.sent()[0];
    let names: Vec<&str> = submitted
        .envelopes
        .iter()
        .map(|envelope| envelope.payload_type.name.as_str())
        .collect();
    assert_eq!(
        names,
        vec![
            "FetchAndShareLatestTopicStatusReportsMessage",
            "AbortIfTopicsHaveSpecificStatusesMessage",
            "TopicBeingAffectedMessage",
            "EchoMessage",
            "TopicWasAffectedMessage",
        ]
    );

    let outcomes = bus.run_until_drained(20).await.unwrap();
    assert_eq!(outcomes.len(), 5);
    assert!(outcomes
        .iter()
        .all(|outcome| matches!(outcome, DispatchOutcome::Delivered { .. })));

    // The tracking system observed the full affecting run.
    let notice = bus.tracker.topic_notice("me").unwrap();
    assert_eq!(notice.status, TopicStatus::WasAffected);
    assert!(notice.affects_completed_date_utc.is_some());
}

#[tokio::test]
async fn test_overlapping_run_on_same_topic_aborts_at_the_gate() {
    let bus = TestBus::new();
    bus.tracker.set_topic_notice(report(
        "me",
        TopicStatus::BeingAffected,
        None,
        Vec::new(),
    ));

    let parcel = Parcel::new("second run", vec![payload_envelope("payload")]).with_topic(
        AffectedTopic::new("me"),
        SimultaneousRunsStrategy::AbortSubsequentRunsWhenOneIsRunning,
    );
    bus.post_office.send(parcel).await.unwrap();

    let outcomes = bus.run_until_drained(20).await.unwrap();
    assert_eq!(
        outcomes,
        vec![
            DispatchOutcome::Delivered { resent: true },
            DispatchOutcome::Aborted { rescheduled: false },
        ]
    );

    let aborted = bus.tracker.aborted();
    assert_eq!(aborted.len(), 1);
    assert!(aborted[0].1.contains("me"));
    // The payload and the markers never executed.
    assert_eq!(bus.tracker.delivered().len(), 1);
}

fn dependent_parcel(strategy: TopicCheckStrategy) -> Parcel {
    Parcel::new("dependent run", vec![payload_envelope("payload")])
        .with_topic(
            AffectedTopic::new("mine"),
            SimultaneousRunsStrategy::AbortSubsequentRunsWhenOneIsRunning,
        )
        .with_dependency_topics(
            vec![
                DependencyTopic::new("billing"),
                DependencyTopic::new("shipping"),
            ],
            strategy,
        )
}

fn seed_dependency_notices(bus: &TestBus, shipping_is_new: bool) {
    let start = Utc::now() - ChronoDuration::hours(1);
    let newer = Utc::now() - ChronoDuration::minutes(10);
    let baseline = vec![
        report("billing", TopicStatus::WasAffected, Some(start), Vec::new()),
        report("shipping", TopicStatus::WasAffected, Some(start), Vec::new()),
    ];
    bus.tracker.set_topic_notice(report(
        "mine",
        TopicStatus::WasAffected,
        Some(start),
        baseline.clone(),
    ));
    bus.tracker.set_topic_notice(report(
        "billing",
        TopicStatus::WasAffected,
        Some(newer),
        Vec::new(),
    ));
    bus.tracker.set_topic_notice(if shipping_is_new {
        report("shipping", TopicStatus::WasAffected, Some(newer), Vec::new())
    } else {
        baseline[1].clone()
    });
}

#[tokio::test]
async fn test_all_strategy_passes_when_every_dependency_is_newer() {
    let bus = TestBus::new();
    seed_dependency_notices(&bus, true);

    bus.post_office
        .send(dependent_parcel(TopicCheckStrategy::All))
        .await
        .unwrap();
    let outcomes = bus.run_until_drained(20).await.unwrap();
    // Six envelopes: fetch, overlap gate, dependency gate, being-affected,
    // payload, was-affected.
    assert_eq!(outcomes.len(), 6);
    assert!(bus.tracker.aborted().is_empty());
}

#[tokio::test]
async fn test_all_strategy_aborts_when_one_dependency_is_stale() {
    let bus = TestBus::new();
    seed_dependency_notices(&bus, false);

    bus.post_office
        .send(dependent_parcel(TopicCheckStrategy::All))
        .await
        .unwrap();
    let outcomes = bus.run_until_drained(20).await.unwrap();
    assert_eq!(
        outcomes,
        vec![
            DispatchOutcome::Delivered { resent: true },
            DispatchOutcome::Delivered { resent: true },
            DispatchOutcome::Aborted { rescheduled: false },
        ]
    );
    let aborted = bus.tracker.aborted();
    assert!(aborted[0].1.contains("shipping"));
    assert!(!aborted[0].1.contains("billing"));
}

#[tokio::test]
async fn test_any_strategy_tolerates_a_stale_dependency() {
    let bus = TestBus::new();
    seed_dependency_notices(&bus, false);

    bus.post_office
        .send(dependent_parcel(TopicCheckStrategy::Any))
        .await
        .unwrap();
    let outcomes = bus.run_until_drained(20).await.unwrap();
    assert_eq!(outcomes.len(), 6);
    assert!(bus.tracker.aborted().is_empty());
}

#[tokio::test]
async fn test_stale_certified_notices_abort_and_reschedule() {
    let bus = TestBus::new();
    bus.tracker.set_certified_notice(CertifiedNotice {
        topic: NamedTopic::new("billing"),
        delivered_date_utc: Utc::now() - ChronoDuration::hours(2),
    });

    let message = AbortIfNoNewCertifiedNoticesMessage {
        checks: vec![CertifiedNoticeCheck {
            topic: NamedTopic::new("billing"),
            recentness_threshold_seconds: 60,
        }],
        strategy: TopicCheckStrategy::Any,
        reschedule_wait_seconds: 0,
    };
    let envelope = Envelope::for_message(&message, &bus.channel).unwrap();
    bus.post_office
        .send(Parcel::new("gated", vec![envelope]))
        .await
        .unwrap();

    let queued = bus.courier.pop_queued().unwrap();
    let remaining_before = queued.parcel.envelopes.len();
    let outcome = bus
        .dispatcher
        .dispatch("gated", &queued.tracking_code, queued.parcel, &bus.channel)
        .await
        .unwrap();

    // Distinct from a plain abort: the sequence is resubmitted so the
    // caller re-enqueues after the wait rather than dropping it.
    assert_eq!(outcome, DispatchOutcome::Aborted { rescheduled: true });
    assert_eq!(bus.courier.sent_count(), 2);
    assert_eq!(bus.courier.sent()[1].envelopes.len(), remaining_before);
}

#[tokio::test]
async fn test_recent_certified_notice_lets_the_sequence_proceed() {
    let bus = TestBus::new();
    bus.tracker.set_certified_notice(CertifiedNotice {
        topic: NamedTopic::new("billing"),
        delivered_date_utc: Utc::now(),
    });

    let message = AbortIfNoNewCertifiedNoticesMessage {
        checks: vec![CertifiedNoticeCheck {
            topic: NamedTopic::new("billing"),
            recentness_threshold_seconds: 3_600,
        }],
        strategy: TopicCheckStrategy::All,
        reschedule_wait_seconds: 0,
    };
    let envelope = Envelope::for_message(&message, &bus.channel).unwrap();
    bus.post_office
        .send(Parcel::new("open", vec![envelope]))
        .await
        .unwrap();

    let outcomes = bus.run_until_drained(10).await.unwrap();
    assert_eq!(outcomes, vec![DispatchOutcome::Delivered { resent: false }]);
}

#[tokio::test]
async fn test_retry_helper_rejects_non_terminal_target_statuses() {
    for status in [
        ParcelStatus::InTransit,
        ParcelStatus::OutForDelivery,
        ParcelStatus::Unknown,
    ] {
        let bus = TestBus::new();
        let message = RetryTrackingCodesInSpecificStatusesMessage {
            tracking_codes: vec![TrackingCode::new(uuid::Uuid::new_v4(), "x")],
            statuses_to_retry: vec![status],
            check_interval_ms: 1,
            max_attempts: 1,
            throw_if_retries_exceeded: false,
        };
        let envelope = Envelope::for_message(&message, &bus.channel).unwrap();
        bus.post_office
            .send(Parcel::new("bad retry", vec![envelope]))
            .await
            .unwrap();

        let result = bus.run_until_drained(10).await;
        match result {
            Err(DispatchError::Rejected { source }) => {
                let text = source.to_string();
                assert!(text.contains("Aborted, Rejected, Delivered"), "{text}");
                assert!(text.contains(&status.to_string()), "{text}");
            }
            other => panic!("expected rejection for {status}, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_retry_helper_resends_codes_until_they_leave_target_statuses() {
    let bus = TestBus::new();
    let target = TrackingCode::new(uuid::Uuid::new_v4(), "retry-me");
    bus.tracker.set_status(&target, ParcelStatus::Aborted);

    let message = RetryTrackingCodesInSpecificStatusesMessage {
        tracking_codes: vec![target.clone()],
        statuses_to_retry: vec![ParcelStatus::Aborted],
        check_interval_ms: 1,
        max_attempts: 5,
        throw_if_retries_exceeded: true,
    };
    let envelope = Envelope::for_message(&message, &bus.channel).unwrap();
    bus.post_office
        .send(Parcel::new("retry", vec![envelope]))
        .await
        .unwrap();

    let outcomes = bus.run_until_drained(10).await.unwrap();
    assert_eq!(outcomes, vec![DispatchOutcome::Delivered { resent: false }]);
    assert_eq!(bus.tracker.resends(), vec![target]);
}

#[tokio::test]
async fn test_retry_helper_raises_distinct_condition_when_budget_runs_out() {
    let bus = TestBus::new();
    bus.tracker
        .pin_statuses
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let target = TrackingCode::new(uuid::Uuid::new_v4(), "stuck");
    bus.tracker.set_status(&target, ParcelStatus::Rejected);

    let message = RetryTrackingCodesInSpecificStatusesMessage {
        tracking_codes: vec![target.clone()],
        statuses_to_retry: vec![ParcelStatus::Rejected],
        check_interval_ms: 1,
        max_attempts: 3,
        throw_if_retries_exceeded: true,
    };
    let envelope = Envelope::for_message(&message, &bus.channel).unwrap();
    bus.post_office
        .send(Parcel::new("stuck retry", vec![envelope]))
        .await
        .unwrap();

    let result = bus.run_until_drained(10).await;
    match result {
        Err(DispatchError::Rejected { source }) => {
            assert!(source.to_string().contains("exhausted"));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(bus.tracker.resends().len(), 3);
}

#[tokio::test]
async fn test_send_time_validation_blocks_misconfigured_topic_parcels() {
    let bus = TestBus::new();

    let mut topical = Parcel::new("half configured", vec![payload_envelope("payload")]);
    topical.topic = Some(AffectedTopic::new("me"));
    let result = bus.post_office.send(topical).await;
    assert!(matches!(
        result,
        Err(SendError::Validation(ValidationError::TopicWithoutRunsStrategy))
    ));

    let mut dependent = Parcel::new("half dependent", vec![payload_envelope("payload")])
        .with_topic(
            AffectedTopic::new("me"),
            SimultaneousRunsStrategy::AbortSubsequentRunsWhenOneIsRunning,
        );
    dependent.dependency_topics = vec![DependencyTopic::new("billing")];
    let result = bus.post_office.send(dependent).await;
    assert!(matches!(
        result,
        Err(SendError::Validation(
            ValidationError::DependenciesWithoutCheckStrategy
        ))
    ));

    // Nothing reached the courier.
    assert_eq!(bus.courier.sent_count(), 0);
}
