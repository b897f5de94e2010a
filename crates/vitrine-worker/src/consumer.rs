//! Upload event consumer: bounded worker pool, per-kind timeouts and redelivery.
//!
//! Events are pushed through an mpsc channel. Each delivery holds a semaphore permit
//! while the handler runs. Retryable failures and timeouts are redelivered with capped
//! exponential backoff until `max_redeliveries` is exhausted. Closing the consumer
//! stops intake and waits for every in-flight delivery, including pending redeliveries.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Serialize;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};

use vitrine_core::models::UploadEvent;
use vitrine_core::WorkerConfig;

use crate::handler::{HandlerOutcome, UploadEventHandler};

/// Maximum number of backoff units before a redelivery. Caps exponential backoff
/// so that high attempt counts do not produce excessively long delays.
pub const MAX_REDELIVERY_BACKOFF_UNITS: u64 = 300;

/// Backoff in units for a given attempt (exponential with cap).
#[inline]
pub(crate) fn compute_redelivery_backoff_units(attempt: u32) -> u64 {
    2_u64
        .checked_pow(attempt)
        .unwrap_or(u64::MAX)
        .min(MAX_REDELIVERY_BACKOFF_UNITS)
}

#[derive(Clone, Debug)]
pub struct ConsumerConfig {
    pub max_concurrent_events: usize,
    pub max_redeliveries: u32,
    pub image_timeout: Duration,
    pub video_timeout: Duration,
    /// Duration of one backoff unit; one second in production.
    pub backoff_unit: Duration,
    pub channel_capacity: usize,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self::from(&WorkerConfig::default())
    }
}

impl From<&WorkerConfig> for ConsumerConfig {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            max_concurrent_events: config.max_concurrent_events.max(1),
            max_redeliveries: config.max_redeliveries,
            image_timeout: Duration::from_secs(config.image_timeout_secs),
            video_timeout: Duration::from_secs(config.video_timeout_secs),
            backoff_unit: Duration::from_secs(1),
            channel_capacity: 64,
        }
    }
}

impl ConsumerConfig {
    fn timeout_for(&self, event: &UploadEvent) -> Duration {
        if event.content_type.to_ascii_lowercase().starts_with("video/") {
            self.video_timeout
        } else {
            self.image_timeout
        }
    }
}

/// Counters reported when the consumer shuts down.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerSummary {
    pub processed: u64,
    pub already_processed: u64,
    pub skipped: u64,
    pub failed: u64,
    pub redeliveries: u64,
    pub timeouts: u64,
}

#[derive(Default)]
struct Counters {
    processed: AtomicU64,
    already_processed: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    redeliveries: AtomicU64,
    timeouts: AtomicU64,
}

impl Counters {
    fn record(&self, outcome: &HandlerOutcome) {
        let counter = match outcome {
            HandlerOutcome::Processed { .. } => &self.processed,
            HandlerOutcome::AlreadyProcessed { .. } => &self.already_processed,
            HandlerOutcome::Skipped => &self.skipped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn summary(&self) -> ConsumerSummary {
        ConsumerSummary {
            processed: self.processed.load(Ordering::Relaxed),
            already_processed: self.already_processed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            redeliveries: self.redeliveries.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }
}

pub struct UploadEventConsumer {
    sender: mpsc::Sender<UploadEvent>,
    pool: JoinHandle<()>,
    counters: Arc<Counters>,
}

impl UploadEventConsumer {
    /// Spawn the worker pool.
    pub fn start(handler: Arc<dyn UploadEventHandler>, config: ConsumerConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.channel_capacity.max(1));
        let counters = Arc::new(Counters::default());
        let pool = tokio::spawn(Self::worker_pool(
            handler,
            config,
            receiver,
            counters.clone(),
        ));
        Self {
            sender,
            pool,
            counters,
        }
    }

    /// Queue an event for delivery. Waits while the channel is full.
    pub async fn submit(&self, event: UploadEvent) -> Result<()> {
        self.sender
            .send(event)
            .await
            .map_err(|_| anyhow!("Upload event consumer is no longer running"))
    }

    /// Stop accepting events and wait until every in-flight delivery settled.
    pub async fn shutdown(self) -> Result<ConsumerSummary> {
        tracing::info!("Initiating upload event consumer shutdown");
        drop(self.sender);
        self.pool
            .await
            .map_err(|e| anyhow!("Upload event worker pool panicked: {}", e))?;
        Ok(self.counters.summary())
    }

    async fn worker_pool(
        handler: Arc<dyn UploadEventHandler>,
        config: ConsumerConfig,
        mut receiver: mpsc::Receiver<UploadEvent>,
        counters: Arc<Counters>,
    ) {
        tracing::info!(
            max_concurrent_events = config.max_concurrent_events,
            max_redeliveries = config.max_redeliveries,
            "Upload event worker pool started"
        );

        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_events));
        let config = Arc::new(config);
        let mut deliveries = JoinSet::new();

        while let Some(event) = receiver.recv().await {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let handler = handler.clone();
            let semaphore = semaphore.clone();
            let config = config.clone();
            let counters = counters.clone();
            deliveries.spawn(async move {
                Self::deliver_with_redelivery(event, handler, semaphore, permit, config, counters)
                    .await;
            });

            // Reap finished deliveries so the set does not grow with the stream.
            while let Some(joined) = deliveries.try_join_next() {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "Upload event delivery task panicked");
                }
            }
        }

        tracing::info!(
            in_flight = deliveries.len(),
            "Upload event channel closed, draining in-flight deliveries"
        );
        while let Some(joined) = deliveries.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Upload event delivery task panicked");
            }
        }
        tracing::info!("Upload event worker pool stopped");
    }

    #[tracing::instrument(skip_all, fields(event.key = %event.key, event.content_type = %event.content_type))]
    async fn deliver_with_redelivery(
        event: UploadEvent,
        handler: Arc<dyn UploadEventHandler>,
        semaphore: Arc<Semaphore>,
        permit: tokio::sync::OwnedSemaphorePermit,
        config: Arc<ConsumerConfig>,
        counters: Arc<Counters>,
    ) {
        let timeout = config.timeout_for(&event);
        let mut permit = Some(permit);
        let mut attempt: u32 = 0;

        loop {
            let held = match permit.take() {
                Some(permit) => permit,
                None => match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
            };

            let start = std::time::Instant::now();
            let result = tokio::time::timeout(timeout, handler.handle(&event)).await;
            drop(held);

            let retryable = match result {
                Ok(Ok(outcome)) => {
                    tracing::info!(
                        attempt = attempt + 1,
                        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                        outcome = ?outcome,
                        "Upload event handled"
                    );
                    counters.record(&outcome);
                    return;
                }
                Ok(Err(e)) => {
                    tracing::error!(
                        error = %e,
                        attempt = attempt + 1,
                        retryable = e.is_retryable(),
                        "Upload event handling failed"
                    );
                    e.is_retryable()
                }
                Err(_) => {
                    counters.timeouts.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(
                        attempt = attempt + 1,
                        timeout_seconds = timeout.as_secs(),
                        "Upload event handling timed out"
                    );
                    true
                }
            };

            if !retryable || attempt >= config.max_redeliveries {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    attempts = attempt + 1,
                    "Upload event failed, will not redeliver"
                );
                return;
            }

            let backoff = config
                .backoff_unit
                .saturating_mul(compute_redelivery_backoff_units(attempt) as u32);
            attempt += 1;
            counters.redeliveries.fetch_add(1, Ordering::Relaxed);
            tracing::info!(
                attempt = attempt + 1,
                backoff_ms = backoff.as_millis() as u64,
                "Scheduling upload event redelivery"
            );
            tokio::time::sleep(backoff).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use vitrine_core::EventError;

    fn fast_config() -> ConsumerConfig {
        ConsumerConfig {
            max_concurrent_events: 2,
            max_redeliveries: 2,
            image_timeout: Duration::from_millis(200),
            video_timeout: Duration::from_millis(200),
            backoff_unit: Duration::from_millis(1),
            channel_capacity: 8,
        }
    }

    /// Fails a scripted number of times per key before succeeding.
    struct ScriptedHandler {
        failures_before_success: usize,
        retryable: bool,
        calls: Mutex<Vec<String>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delay: Duration,
    }

    impl ScriptedHandler {
        fn new(failures_before_success: usize, retryable: bool) -> Self {
            Self {
                failures_before_success,
                retryable,
                calls: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                delay: Duration::from_millis(5),
            }
        }
    }

    #[async_trait]
    impl UploadEventHandler for ScriptedHandler {
        async fn handle(&self, event: &UploadEvent) -> Result<HandlerOutcome, EventError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let previous = {
                let mut calls = self.calls.lock().unwrap();
                let previous = calls.iter().filter(|k| **k == event.key).count();
                calls.push(event.key.clone());
                previous
            };
            if previous < self.failures_before_success {
                let err = anyhow!("store unavailable");
                return Err(if self.retryable {
                    EventError::retryable(err)
                } else {
                    EventError::fatal(err)
                });
            }
            Ok(HandlerOutcome::Processed {
                media_id: event.key.clone(),
            })
        }
    }

    fn event(key: &str) -> UploadEvent {
        UploadEvent::new(key, "image/jpeg", 10)
    }

    #[test]
    fn redelivery_backoff_exponential_then_capped() {
        assert_eq!(compute_redelivery_backoff_units(0), 1);
        assert_eq!(compute_redelivery_backoff_units(3), 8);
        assert_eq!(compute_redelivery_backoff_units(9), MAX_REDELIVERY_BACKOFF_UNITS);
        assert_eq!(compute_redelivery_backoff_units(64), MAX_REDELIVERY_BACKOFF_UNITS);
    }

    #[tokio::test]
    async fn retryable_failures_are_redelivered() {
        let handler = Arc::new(ScriptedHandler::new(2, true));
        let consumer = UploadEventConsumer::start(handler.clone(), fast_config());
        consumer.submit(event("uploads/images/a.jpg")).await.unwrap();

        let summary = consumer.shutdown().await.unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.redeliveries, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(handler.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn fatal_failures_are_not_redelivered() {
        let handler = Arc::new(ScriptedHandler::new(1, false));
        let consumer = UploadEventConsumer::start(handler.clone(), fast_config());
        consumer.submit(event("uploads/images/a.jpg")).await.unwrap();

        let summary = consumer.shutdown().await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.redeliveries, 0);
        assert_eq!(handler.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn redeliveries_stop_at_the_limit() {
        let handler = Arc::new(ScriptedHandler::new(10, true));
        let consumer = UploadEventConsumer::start(handler.clone(), fast_config());
        consumer.submit(event("uploads/images/a.jpg")).await.unwrap();

        let summary = consumer.shutdown().await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.redeliveries, 2);
        assert_eq!(handler.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn concurrency_is_bounded_and_shutdown_drains() {
        let handler = Arc::new(ScriptedHandler::new(0, true));
        let consumer = UploadEventConsumer::start(handler.clone(), fast_config());
        for i in 0..6 {
            consumer
                .submit(event(&format!("uploads/images/{}.jpg", i)))
                .await
                .unwrap();
        }

        let summary = consumer.shutdown().await.unwrap();
        assert_eq!(summary.processed, 6);
        assert!(handler.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn slow_handlers_time_out_and_are_redelivered() {
        let mut slow = ScriptedHandler::new(0, true);
        slow.delay = Duration::from_millis(100);
        let handler = Arc::new(slow);
        let config = ConsumerConfig {
            image_timeout: Duration::from_millis(10),
            max_redeliveries: 1,
            ..fast_config()
        };
        let consumer = UploadEventConsumer::start(handler, config);
        consumer.submit(event("uploads/images/slow.jpg")).await.unwrap();

        let summary = consumer.shutdown().await.unwrap();
        assert_eq!(summary.timeouts, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.redeliveries, 1);
    }

    #[test]
    fn timeout_depends_on_media_kind() {
        let config = ConsumerConfig {
            image_timeout: Duration::from_secs(1),
            video_timeout: Duration::from_secs(9),
            ..fast_config()
        };
        assert_eq!(config.timeout_for(&event("a.jpg")), Duration::from_secs(1));
        assert_eq!(
            config.timeout_for(&UploadEvent::new("v.mp4", "video/mp4", 1)),
            Duration::from_secs(9)
        );
    }
}
