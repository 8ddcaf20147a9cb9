//! Pipeline supervisor
//!
//! Owns the buffer, poller, delivery client, alert notifier and metrics
//! sink, and runs the two long-lived loops:
//!
//! ```text
//! poller thread ──callback──▶ buffer ──pop(100ms)──▶ consumer thread ──▶ broker
//!                                │
//! monitor thread ◀──depth/stats──┘  (every interval: metrics sink + alert rules)
//! ```
//!
//! Startup wires the callback and starts consumer and monitor before the
//! poller, so no reading is produced without a consumer to drain it.
//! Shutdown is cooperative: clear the running flag, close the buffer (the
//! pushers' escape hatch), join the loops, stop the poller, flush delivery.
//! A message-level failure never ends a loop thread; loop lifetime is tied
//! to the running flag only.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::alerts::{AlertNotifier, WebhookTransport};
use crate::broker::{DeliveryClient, MqttTransport, StatsSnapshot};
use crate::buffer::BoundedBuffer;
use crate::config::Config;
use crate::metrics::{LogMetricsSink, MetricsSink};
use crate::retry::{RetryOutcome, RetryPolicy};
use crate::sensors::{NoiseSampler, ReadingCallback, SensorPoller};
use crate::Reading;

const POP_TIMEOUT: Duration = Duration::from_millis(100);

/// Slice length for the monitor's interval sleep, so a stop request is
/// observed promptly without changing the sweep cadence.
const MONITOR_SLICE: Duration = Duration::from_millis(100);

const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Pipeline {
    buffer: Arc<BoundedBuffer<Reading>>,
    poller: SensorPoller,
    delivery: Arc<DeliveryClient>,
    notifier: Arc<AlertNotifier>,
    metrics: Arc<dyn MetricsSink>,
    monitor_interval: Duration,
    running: Arc<AtomicBool>,
    consumer: Option<JoinHandle<()>>,
    monitor: Option<JoinHandle<()>>,
}

impl Pipeline {
    /// Build the production pipeline. Broker or webhook construction
    /// failure is fatal and surfaces to the process exit path.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let transport = Arc::new(MqttTransport::new(&config.broker)?);
        let webhook = Arc::new(WebhookTransport::new(config.alerts.webhook_url.clone())?);

        let retry = RetryPolicy::new(
            config.retry.max_attempts,
            Duration::from_millis(config.retry.initial_delay_ms),
            Duration::from_millis(config.retry.max_delay_ms),
        );

        let mut poller = SensorPoller::new(
            Duration::from_millis(config.sensors.poll_interval_ms),
            Arc::new(NoiseSampler::default()),
        );
        for &id in &config.sensors.ids {
            poller.add_sensor(id);
        }

        let notifier = Arc::new(AlertNotifier::with_cooldown(
            webhook,
            config.buffer.capacity,
            Duration::from_secs(config.alerts.cooldown_secs),
        ));

        Ok(Self::assemble(
            Arc::new(BoundedBuffer::new(config.buffer.capacity)),
            poller,
            Arc::new(DeliveryClient::new(transport, retry)),
            notifier,
            Arc::new(LogMetricsSink),
            Duration::from_secs(config.monitor_interval_secs),
        ))
    }

    /// Assemble from parts; the seam tests use to inject mock transports.
    pub fn assemble(
        buffer: Arc<BoundedBuffer<Reading>>,
        poller: SensorPoller,
        delivery: Arc<DeliveryClient>,
        notifier: Arc<AlertNotifier>,
        metrics: Arc<dyn MetricsSink>,
        monitor_interval: Duration,
    ) -> Self {
        Self {
            buffer,
            poller,
            delivery,
            notifier,
            metrics,
            monitor_interval,
            running: Arc::new(AtomicBool::new(false)),
            consumer: None,
            monitor: None,
        }
    }

    pub fn queue_depth(&self) -> usize {
        self.buffer.len()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.delivery.stats()
    }

    /// Start consumer and monitor threads, then the poller. No-op if
    /// already running.
    pub fn start(&mut self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("pipeline already running");
            return;
        }

        info!(
            sensors = self.poller.sensor_ids().len(),
            capacity = self.buffer.capacity(),
            "starting pipeline"
        );

        self.consumer = Some(self.spawn_consumer());
        self.monitor = Some(self.spawn_monitor());

        // Poller last: readings only flow once a consumer exists.
        let buffer = Arc::clone(&self.buffer);
        let callback: ReadingCallback = Arc::new(move |reading: Reading| {
            if let Err(e) = buffer.push(reading) {
                // Reading dropped; the pipeline itself keeps going.
                warn!("failed to buffer reading: {e}");
            }
        });
        self.poller.start(callback);
    }

    fn spawn_consumer(&self) -> JoinHandle<()> {
        let running = Arc::clone(&self.running);
        let buffer = Arc::clone(&self.buffer);
        let delivery = Arc::clone(&self.delivery);

        std::thread::spawn(move || {
            debug!("consumer loop started");
            while running.load(Ordering::SeqCst) {
                let Some(reading) = buffer.pop(POP_TIMEOUT) else {
                    continue;
                };

                let payload = match reading.to_wire() {
                    Ok(payload) => payload,
                    Err(e) => {
                        error!(sensor_id = reading.sensor_id, "failed to serialize reading: {e}");
                        continue;
                    }
                };

                match delivery.send_with_retry(&payload) {
                    RetryOutcome::Succeeded => {}
                    RetryOutcome::Exhausted => {
                        warn!(
                            sensor_id = reading.sensor_id,
                            "delivery rejected on every attempt, dropping reading"
                        );
                    }
                    RetryOutcome::Failed(e) => {
                        error!(
                            sensor_id = reading.sensor_id,
                            "delivery failed on final attempt, dropping reading: {e}"
                        );
                    }
                }
            }
            debug!("consumer loop stopped");
        })
    }

    fn spawn_monitor(&self) -> JoinHandle<()> {
        let running = Arc::clone(&self.running);
        let buffer = Arc::clone(&self.buffer);
        let delivery = Arc::clone(&self.delivery);
        let notifier = Arc::clone(&self.notifier);
        let metrics = Arc::clone(&self.metrics);
        let interval = self.monitor_interval;
        let sensors = self.poller.snapshot_handle();

        std::thread::spawn(move || {
            debug!("monitor loop started");
            while running.load(Ordering::SeqCst) {
                // Best-effort snapshots; transient inconsistency with the
                // consumer loop is acceptable.
                let stats = delivery.stats();
                let depth = buffer.len();

                metrics.record_queue_depth(depth);
                metrics.record_delivery_counters(stats);

                let snapshots = sensors.snapshot();
                let mut values = Vec::with_capacity(snapshots.len());
                for s in &snapshots {
                    metrics.record_sensor_value(s.sensor_id, s.value);
                    metrics.record_sensor_online(s.sensor_id, s.online);
                    if s.online {
                        values.push((s.sensor_id, s.value));
                    }
                }

                notifier.evaluate(depth, stats.failed, &values);

                sleep_while(&running, interval);
            }
            debug!("monitor loop stopped");
        })
    }

    /// Stop everything in order and flush outstanding deliveries.
    /// Idempotent; blocks until both loops and the poller have joined.
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        info!("stopping pipeline");

        // Wake any pusher blocked on a full buffer so the poller can exit.
        self.buffer.close();

        if let Some(consumer) = self.consumer.take() {
            if consumer.join().is_err() {
                warn!("consumer thread panicked");
            }
        }
        if let Some(monitor) = self.monitor.take() {
            if monitor.join().is_err() {
                warn!("monitor thread panicked");
            }
        }

        self.poller.stop();

        if !self.delivery.flush(FLUSH_TIMEOUT) {
            warn!("delivery flush incomplete at shutdown");
        }
        self.delivery.shutdown();

        let stats = self.delivery.stats();
        info!(
            sent = stats.sent,
            failed = stats.failed,
            retried = stats.retried,
            errored = stats.errored,
            buffered = self.buffer.len(),
            "pipeline stopped"
        );
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Sleep `total` in short slices, returning early once `flag` clears.
fn sleep_while(flag: &AtomicBool, total: Duration) {
    let deadline = std::time::Instant::now() + total;
    while flag.load(Ordering::SeqCst) {
        let remaining = deadline.saturating_duration_since(std::time::Instant::now());
        if remaining.is_zero() {
            return;
        }
        std::thread::sleep(remaining.min(MONITOR_SLICE));
    }
}
