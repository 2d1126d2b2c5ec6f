//! # Dispatch Worker Pool
//!
//! Bounded worker pool that polls the external durable queue for each
//! monitored channel and dispatches popped parcels. Shutdown is
//! cooperative: the pool stops popping, then waits for the
//! active-message counter to drain before returning; an in-flight
//! handler is never pre-empted.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use super::dispatcher::MessageDispatcher;
use crate::model::{Channel, Parcel, TrackingCode};
use crate::postal::courier::SendError;

/// A popped queue entry: the parcel and the tracking code of its first
/// envelope.
#[derive(Debug, Clone)]
pub struct QueuedParcel {
    pub tracking_code: TrackingCode,
    pub parcel: Parcel,
}

/// The external durable queue the pool polls, one logical queue per
/// monitored channel.
#[async_trait]
pub trait ParcelQueue: Send + Sync {
    /// Pop the next parcel for a channel, if any is ready.
    async fn pop(&self, channel: &Channel) -> Result<Option<QueuedParcel>, SendError>;
}

/// Worker pool settings.
#[derive(Debug, Clone)]
pub struct WorkerPoolSettings {
    /// Maximum concurrently executing dispatches.
    pub concurrency: usize,
    /// Delay between polls when every monitored channel came up empty.
    pub poll_interval: Duration,
    /// Delay between drain checks during shutdown.
    pub drain_poll_interval: Duration,
    /// Stop accepting work after this long, then drain and return.
    pub time_to_live: Option<Duration>,
}

impl Default for WorkerPoolSettings {
    fn default() -> Self {
        Self {
            concurrency: crate::constants::DEFAULT_WORKER_CONCURRENCY,
            poll_interval: Duration::from_millis(crate::constants::DEFAULT_POLL_INTERVAL_MS),
            drain_poll_interval: Duration::from_millis(50),
            time_to_live: None,
        }
    }
}

/// Polls monitored channels and drives the dispatcher with bounded
/// concurrency.
pub struct DispatchWorkerPool {
    dispatcher: Arc<MessageDispatcher>,
    queue: Arc<dyn ParcelQueue>,
    channels: Vec<Channel>,
    settings: WorkerPoolSettings,
    shutdown: Arc<AtomicBool>,
}

impl DispatchWorkerPool {
    pub fn new(
        dispatcher: Arc<MessageDispatcher>,
        queue: Arc<dyn ParcelQueue>,
        channels: Vec<Channel>,
        settings: WorkerPoolSettings,
    ) -> Self {
        Self {
            dispatcher,
            queue,
            channels,
            settings,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle used to request a cooperative shutdown from another task.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Poll-and-dispatch until shutdown (or time-to-live expiry), then
    /// drain in-flight handlers before returning.
    pub async fn run(&self) {
        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency));
        let deadline = self
            .settings
            .time_to_live
            .map(|ttl| tokio::time::Instant::now() + ttl);
        info!(
            channels = self.channels.len(),
            concurrency = self.settings.concurrency,
            "dispatch worker pool started"
        );

        while !self.shutdown.load(Ordering::SeqCst) {
            if let Some(deadline) = deadline {
                if tokio::time::Instant::now() >= deadline {
                    info!("worker pool time-to-live reached; shutting down");
                    self.shutdown.store(true, Ordering::SeqCst);
                    break;
                }
            }

            let mut popped_any = false;
            for channel in &self.channels {
                if self.shutdown.load(Ordering::SeqCst) {
                    break;
                }
                match self.queue.pop(channel).await {
                    Ok(Some(queued)) => {
                        popped_any = true;
                        let Ok(permit) = semaphore.clone().acquire_owned().await else {
                            break;
                        };
                        let dispatcher = self.dispatcher.clone();
                        let channel = channel.clone();
                        tokio::spawn(async move {
                            let _permit = permit;
                            let display_name = queued.parcel.name.clone();
                            if let Err(err) = dispatcher
                                .dispatch(
                                    &display_name,
                                    &queued.tracking_code,
                                    queued.parcel,
                                    &channel,
                                )
                                .await
                            {
                                error!(error = %err, "parcel dispatch failed");
                            }
                        });
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!(channel = %channel, error = %err, "queue poll failed");
                    }
                }
            }

            if !popped_any {
                tokio::time::sleep(self.settings.poll_interval).await;
            }
        }

        self.dispatcher
            .active_messages()
            .wait_until_idle(self.settings.drain_poll_interval)
            .await;
        info!("dispatch worker pool drained and stopped");
    }
}
