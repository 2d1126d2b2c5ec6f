#![allow(dead_code)]

//! Shared test doubles: an in-memory tracking system that derives topic
//! notices from delivered marker envelopes, an in-memory courier that
//! doubles as the parcel queue, and a handful of test messages and
//! handlers.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use courier_core::dispatch::worker::{ParcelQueue, QueuedParcel};
use courier_core::dispatch::{
    BusMessage, DispatchOutcome, HandlerFailure, HandlerRegistry, HandlerResult, MessageDispatcher,
    MessageHandler, StatefulMessageHandler,
};
use courier_core::error::DispatchError;
use courier_core::model::{
    CertifiedNotice, Channel, Envelope, NamedTopic, Parcel, ParcelStatus, ParcelTrackingReport,
    ScheduleSpec, TopicStatus, TopicStatusReport, TrackingCode,
};
use courier_core::postal::{Courier, ParcelTrackingSystem, PostOffice, SendError, TrackingError};
use courier_core::shares::{ShareManager, ShareRegistry, SharedCapability, Shares};
use courier_core::topics::messages::{TopicBeingAffectedMessage, TopicWasAffectedMessage};
use courier_core::topics::register_topic_coordination;

// ---------------------------------------------------------------------------
// Tracking system double
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TrackingState {
    statuses: HashMap<String, ParcelStatus>,
    attempting: Vec<TrackingCode>,
    aborted: Vec<(TrackingCode, String)>,
    rejected: Vec<(TrackingCode, String)>,
    delivered: Vec<(TrackingCode, Envelope)>,
    resends: Vec<TrackingCode>,
    topic_notices: HashMap<String, TopicStatusReport>,
    certified: HashMap<String, CertifiedNotice>,
}

/// In-memory stand-in for the event-sourced tracking store. Delivered
/// topic marker envelopes are parsed to derive topic notices the same way
/// the real store does.
#[derive(Default)]
pub struct InMemoryTrackingSystem {
    state: Mutex<TrackingState>,
    /// When set, `resend` leaves statuses untouched so the bounded retry
    /// helper exhausts its budget.
    pub pin_statuses: AtomicBool,
}

impl InMemoryTrackingSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempting_count(&self) -> usize {
        self.state.lock().attempting.len()
    }

    pub fn aborted(&self) -> Vec<(TrackingCode, String)> {
        self.state.lock().aborted.clone()
    }

    pub fn rejected(&self) -> Vec<(TrackingCode, String)> {
        self.state.lock().rejected.clone()
    }

    pub fn delivered(&self) -> Vec<(TrackingCode, Envelope)> {
        self.state.lock().delivered.clone()
    }

    pub fn resends(&self) -> Vec<TrackingCode> {
        self.state.lock().resends.clone()
    }

    pub fn set_status(&self, code: &TrackingCode, status: ParcelStatus) {
        self.state.lock().statuses.insert(code.to_string(), status);
    }

    pub fn set_topic_notice(&self, report: TopicStatusReport) {
        self.state
            .lock()
            .topic_notices
            .insert(report.topic.0.clone(), report);
    }

    pub fn topic_notice(&self, topic: &str) -> Option<TopicStatusReport> {
        self.state.lock().topic_notices.get(topic).cloned()
    }

    pub fn set_certified_notice(&self, notice: CertifiedNotice) {
        self.state
            .lock()
            .certified
            .insert(notice.topic.0.clone(), notice);
    }

    fn derive_topic_notice(state: &mut TrackingState, envelope: &Envelope) {
        if envelope.payload_type.name == "TopicBeingAffectedMessage" {
            let message: TopicBeingAffectedMessage =
                serde_json::from_str(&envelope.serialized_payload)
                    .expect("marker payload should parse");
            let named = message.topic.to_named();
            let notices_at_start = message
                .topic_status_reports
                .iter()
                .filter(|report| report.topic != named)
                .cloned()
                .collect();
            state.topic_notices.insert(
                message.topic.0.clone(),
                TopicStatusReport {
                    topic: named,
                    status: TopicStatus::BeingAffected,
                    affects_completed_date_utc: None,
                    dependency_topic_notices_at_start: notices_at_start,
                },
            );
        } else if envelope.payload_type.name == "TopicWasAffectedMessage" {
            let message: TopicWasAffectedMessage =
                serde_json::from_str(&envelope.serialized_payload)
                    .expect("marker payload should parse");
            let named = message.topic.to_named();
            let notices_at_start = state
                .topic_notices
                .get(&message.topic.0)
                .map(|report| report.dependency_topic_notices_at_start.clone())
                .unwrap_or_default();
            let now = Utc::now();
            state.topic_notices.insert(
                message.topic.0.clone(),
                TopicStatusReport {
                    topic: named.clone(),
                    status: TopicStatus::WasAffected,
                    affects_completed_date_utc: Some(now),
                    dependency_topic_notices_at_start: notices_at_start,
                },
            );
            state.certified.insert(
                message.topic.0.clone(),
                CertifiedNotice {
                    topic: named,
                    delivered_date_utc: now,
                },
            );
        }
    }
}

#[async_trait]
impl ParcelTrackingSystem for InMemoryTrackingSystem {
    async fn update_sent(
        &self,
        code: &TrackingCode,
        _parcel: &Parcel,
        _address: &Channel,
    ) -> Result<(), TrackingError> {
        self.state
            .lock()
            .statuses
            .insert(code.to_string(), ParcelStatus::InTransit);
        Ok(())
    }

    async fn update_addressed(
        &self,
        code: &TrackingCode,
        _address: &Channel,
    ) -> Result<(), TrackingError> {
        self.state
            .lock()
            .statuses
            .insert(code.to_string(), ParcelStatus::OutForDelivery);
        Ok(())
    }

    async fn update_attempting(&self, code: &TrackingCode) -> Result<(), TrackingError> {
        let mut state = self.state.lock();
        state.attempting.push(code.clone());
        state
            .statuses
            .insert(code.to_string(), ParcelStatus::OutForDelivery);
        Ok(())
    }

    async fn update_rejected(
        &self,
        code: &TrackingCode,
        message: &str,
    ) -> Result<(), TrackingError> {
        let mut state = self.state.lock();
        state.rejected.push((code.clone(), message.to_string()));
        state
            .statuses
            .insert(code.to_string(), ParcelStatus::Rejected);
        Ok(())
    }

    async fn update_aborted(&self, code: &TrackingCode, reason: &str) -> Result<(), TrackingError> {
        let mut state = self.state.lock();
        state.aborted.push((code.clone(), reason.to_string()));
        state
            .statuses
            .insert(code.to_string(), ParcelStatus::Aborted);
        Ok(())
    }

    async fn update_delivered(
        &self,
        code: &TrackingCode,
        delivered: &Envelope,
    ) -> Result<(), TrackingError> {
        let mut state = self.state.lock();
        state.delivered.push((code.clone(), delivered.clone()));
        state
            .statuses
            .insert(code.to_string(), ParcelStatus::Delivered);
        Self::derive_topic_notice(&mut state, delivered);
        Ok(())
    }

    async fn resend(&self, code: &TrackingCode) -> Result<(), TrackingError> {
        let mut state = self.state.lock();
        state.resends.push(code.clone());
        if !self.pin_statuses.load(Ordering::SeqCst) {
            state
                .statuses
                .insert(code.to_string(), ParcelStatus::InTransit);
        }
        Ok(())
    }

    async fn get_tracking_reports(
        &self,
        codes: &[TrackingCode],
    ) -> Result<Vec<ParcelTrackingReport>, TrackingError> {
        let state = self.state.lock();
        Ok(codes
            .iter()
            .map(|code| ParcelTrackingReport {
                tracking_code: code.clone(),
                status: state
                    .statuses
                    .get(&code.to_string())
                    .copied()
                    .unwrap_or_default(),
                last_updated_utc: Utc::now(),
                rejection_message: None,
            })
            .collect())
    }

    async fn get_latest_topic_notice(
        &self,
        topic: &NamedTopic,
        status_filter: &[TopicStatus],
    ) -> Result<Option<TopicStatusReport>, TrackingError> {
        let state = self.state.lock();
        Ok(state
            .topic_notices
            .get(&topic.0)
            .filter(|report| status_filter.is_empty() || status_filter.contains(&report.status))
            .cloned())
    }

    async fn get_latest_certified_notice(
        &self,
        topic: &NamedTopic,
    ) -> Result<Option<CertifiedNotice>, TrackingError> {
        Ok(self.state.lock().certified.get(&topic.0).cloned())
    }
}

// ---------------------------------------------------------------------------
// Courier double (also the parcel queue)
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CourierState {
    sent: Vec<Parcel>,
    recurring: Vec<(Parcel, ScheduleSpec)>,
    resent: Vec<TrackingCode>,
    queue: VecDeque<QueuedParcel>,
}

/// In-memory courier: records submissions and queues them for the test
/// loop (or the worker pool) to pop, standing in for the durable job
/// runner.
#[derive(Default)]
pub struct InMemoryCourier {
    state: Mutex<CourierState>,
}

impl InMemoryCourier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Parcel> {
        self.state.lock().sent.clone()
    }

    pub fn sent_count(&self) -> usize {
        self.state.lock().sent.len()
    }

    pub fn recurring(&self) -> Vec<(Parcel, ScheduleSpec)> {
        self.state.lock().recurring.clone()
    }

    pub fn pop_queued(&self) -> Option<QueuedParcel> {
        self.state.lock().queue.pop_front()
    }

    pub fn queue_len(&self) -> usize {
        self.state.lock().queue.len()
    }

    fn enqueue(state: &mut CourierState, parcel: &Parcel) -> Result<TrackingCode, SendError> {
        let first = parcel
            .first_envelope()
            .ok_or_else(|| SendError::submission("parcel has no envelopes"))?;
        let code = TrackingCode::new(parcel.id, first.id.clone());
        state.sent.push(parcel.clone());
        state.queue.push_back(QueuedParcel {
            tracking_code: code.clone(),
            parcel: parcel.clone(),
        });
        Ok(code)
    }
}

#[async_trait]
impl Courier for InMemoryCourier {
    async fn send(&self, parcel: &Parcel) -> Result<TrackingCode, SendError> {
        let mut state = self.state.lock();
        Self::enqueue(&mut state, parcel)
    }

    async fn send_recurring(
        &self,
        parcel: &Parcel,
        schedule: &ScheduleSpec,
    ) -> Result<TrackingCode, SendError> {
        let mut state = self.state.lock();
        state.recurring.push((parcel.clone(), schedule.clone()));
        Self::enqueue(&mut state, parcel)
    }

    async fn resend(&self, code: &TrackingCode) -> Result<(), SendError> {
        self.state.lock().resent.push(code.clone());
        Ok(())
    }
}

#[async_trait]
impl ParcelQueue for InMemoryCourier {
    async fn pop(&self, _channel: &Channel) -> Result<Option<QueuedParcel>, SendError> {
        Ok(self.pop_queued())
    }
}

// ---------------------------------------------------------------------------
// Test messages and handlers
// ---------------------------------------------------------------------------

/// Capability used by the echo chain to observe share accumulation.
pub struct ShareAudit;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditSnapshot {
    pub entries: Vec<String>,
}

impl SharedCapability for ShareAudit {
    type Snapshot = AuditSnapshot;
}

/// Message that receives the audit trail of every earlier echo step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EchoMessage {
    pub label: String,
    #[serde(default)]
    pub entries: Vec<String>,
}

impl BusMessage for EchoMessage {
    fn description(&self) -> String {
        format!("echo {}", self.label)
    }
}

impl Shares<ShareAudit> for EchoMessage {
    fn capture(&self) -> AuditSnapshot {
        AuditSnapshot {
            entries: self.entries.clone(),
        }
    }

    fn apply(&mut self, snapshot: AuditSnapshot) {
        self.entries = snapshot.entries;
    }
}

/// Appends its message's label to the audit trail and shares it forward.
#[derive(Default)]
pub struct EchoHandler {
    entries: Vec<String>,
}

#[async_trait]
impl MessageHandler for EchoHandler {
    type Message = EchoMessage;

    async fn handle(&mut self, message: &Self::Message) -> HandlerResult {
        self.entries = message.entries.clone();
        self.entries.push(message.label.clone());
        Ok(())
    }
}

impl Shares<ShareAudit> for EchoHandler {
    fn capture(&self) -> AuditSnapshot {
        AuditSnapshot {
            entries: self.entries.clone(),
        }
    }

    fn apply(&mut self, snapshot: AuditSnapshot) {
        self.entries = snapshot.entries;
    }
}

/// Raises the abort signal, optionally with reschedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbortingMessage {
    pub reschedule: bool,
}

impl BusMessage for AbortingMessage {
    fn description(&self) -> String {
        "aborting".to_string()
    }
}

#[derive(Default)]
pub struct AbortingHandler;

#[async_trait]
impl MessageHandler for AbortingHandler {
    type Message = AbortingMessage;

    async fn handle(&mut self, message: &Self::Message) -> HandlerResult {
        if message.reschedule {
            Err(HandlerFailure::abort_and_reschedule(
                "try again later",
                None,
            ))
        } else {
            Err(HandlerFailure::abort("not today"))
        }
    }
}

/// Fails with an unexpected error so the delivery is rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailingMessage;

impl BusMessage for FailingMessage {
    fn description(&self) -> String {
        "failing".to_string()
    }
}

#[derive(Default)]
pub struct FailingHandler;

#[async_trait]
impl MessageHandler for FailingHandler {
    type Message = FailingMessage;

    async fn handle(&mut self, _message: &Self::Message) -> HandlerResult {
        Err(HandlerFailure::fatal(anyhow::anyhow!("boom")))
    }
}

/// Stateful handler exercising the resume hooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMessage;

impl BusMessage for CheckpointMessage {
    fn description(&self) -> String {
        "checkpoint".to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointState {
    pub token: String,
}

#[derive(Default)]
pub struct CheckpointHandler {
    state: Option<CheckpointState>,
}

#[async_trait]
impl MessageHandler for CheckpointHandler {
    type Message = CheckpointMessage;

    async fn handle(&mut self, _message: &Self::Message) -> HandlerResult {
        match &self.state {
            Some(state) if state.token == "fresh" => Ok(()),
            Some(state) => Err(HandlerFailure::abort(format!(
                "resumed with token {}",
                state.token
            ))),
            None => Err(HandlerFailure::fatal(anyhow::anyhow!(
                "handler was never seeded"
            ))),
        }
    }
}

impl StatefulMessageHandler for CheckpointHandler {
    type State = CheckpointState;

    fn create_state(&self) -> CheckpointState {
        CheckpointState {
            token: "fresh".to_string(),
        }
    }

    fn is_state_valid(&self, state: &CheckpointState) -> bool {
        state.token != "stale"
    }

    fn seed_state(&mut self, state: CheckpointState) {
        self.state = Some(state);
    }
}

// ---------------------------------------------------------------------------
// Wired-up test bus
// ---------------------------------------------------------------------------

pub const WORK_CHANNEL: &str = "work";

/// Fully wired dispatcher over the in-memory doubles, with the protocol
/// and test handlers registered.
pub struct TestBus {
    pub tracker: Arc<InMemoryTrackingSystem>,
    pub courier: Arc<InMemoryCourier>,
    pub dispatcher: Arc<MessageDispatcher>,
    pub post_office: PostOffice,
    pub channel: Channel,
}

impl TestBus {
    pub fn new() -> Self {
        let tracker = Arc::new(InMemoryTrackingSystem::new());
        let courier = Arc::new(InMemoryCourier::new());
        let handlers = Arc::new(HandlerRegistry::new());
        let shares = Arc::new(ShareRegistry::new());

        register_topic_coordination(
            &handlers,
            &shares,
            tracker.clone() as Arc<dyn ParcelTrackingSystem>,
        );

        handlers.register(EchoHandler::default);
        handlers.register(|| AbortingHandler);
        handlers.register(|| FailingHandler);
        handlers.register_stateful(CheckpointHandler::default);
        shares.register::<EchoHandler, ShareAudit>();
        shares.register::<EchoMessage, ShareAudit>();

        let dispatcher = Arc::new(MessageDispatcher::new(
            handlers,
            Arc::new(ShareManager::new(shares)),
            tracker.clone() as Arc<dyn ParcelTrackingSystem>,
            courier.clone() as Arc<dyn Courier>,
        ));

        Self {
            tracker,
            courier: courier.clone(),
            dispatcher,
            post_office: PostOffice::new(courier.clone() as Arc<dyn Courier>),
            channel: Channel::named(WORK_CHANNEL),
        }
    }

    /// Pop-and-dispatch until the queue drains, simulating the external
    /// job runner. Panics after `limit` cycles to catch runaway resends.
    pub async fn run_until_drained(
        &self,
        limit: usize,
    ) -> Result<Vec<DispatchOutcome>, DispatchError> {
        let mut outcomes = Vec::new();
        let mut cycles = 0;
        while let Some(queued) = self.courier.pop_queued() {
            cycles += 1;
            assert!(cycles <= limit, "dispatch loop exceeded {limit} cycles");
            let display_name = queued.parcel.name.clone();
            let outcome = self
                .dispatcher
                .dispatch(
                    &display_name,
                    &queued.tracking_code,
                    queued.parcel,
                    &self.channel,
                )
                .await?;
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}
