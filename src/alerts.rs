//! Threshold evaluation and rate-limited webhook notifications
//!
//! One global cooldown clock gates *every* notification kind: a buffer
//! alert can suppress an unrelated sensor-range alert for the full window.
//! That coarse behavior is deliberate, and the window is consumed even when
//! the webhook call fails.
//!
//! The "High Delivery Lag" rule takes the cumulative failed-delivery
//! counter as a lag proxy, not a real queueing-delay measurement. Callers
//! pass `failed_deliveries`; renaming it to a latency would silently change
//! what the 1000 threshold means.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        }
    }
}

/// A single notification, created when a rule fires and dropped after
/// dispatch; only the dispatch instant is retained (for the cooldown).
#[derive(Debug, Clone)]
pub struct Notification {
    pub name: String,
    pub description: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(name: &str, description: String, severity: Severity) -> Self {
        Self {
            name: name.to_string(),
            description,
            severity,
            timestamp: Utc::now(),
        }
    }
}

/// Delivery seam for notifications; the production implementation POSTs to
/// a webhook endpoint.
pub trait AlertTransport: Send + Sync {
    fn deliver(&self, payload: &serde_json::Value) -> anyhow::Result<()>;
}

/// Webhook transport: JSON POST, non-2xx is a delivery failure.
pub struct WebhookTransport {
    client: reqwest::blocking::Client,
    url: String,
}

impl WebhookTransport {
    pub fn new(url: String) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, url })
    }
}

impl AlertTransport for WebhookTransport {
    fn deliver(&self, payload: &serde_json::Value) -> anyhow::Result<()> {
        let response = self.client.post(&self.url).json(payload).send()?;
        if !response.status().is_success() {
            anyhow::bail!("webhook returned status {}", response.status());
        }
        Ok(())
    }
}

pub struct AlertNotifier {
    transport: Arc<dyn AlertTransport>,
    cooldown: Duration,
    /// Buffer capacity the depth thresholds scale against.
    buffer_capacity: usize,
    /// Single global clock across all notification kinds.
    last_dispatch: Mutex<Option<Instant>>,
}

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5 * 60);

/// Failed-delivery count above which the lag-proxy rule fires.
const DELIVERY_LAG_THRESHOLD: u64 = 1000;

impl AlertNotifier {
    pub fn new(transport: Arc<dyn AlertTransport>, buffer_capacity: usize) -> Self {
        Self::with_cooldown(transport, buffer_capacity, DEFAULT_COOLDOWN)
    }

    pub fn with_cooldown(
        transport: Arc<dyn AlertTransport>,
        buffer_capacity: usize,
        cooldown: Duration,
    ) -> Self {
        Self {
            transport,
            cooldown,
            buffer_capacity,
            last_dispatch: Mutex::new(None),
        }
    }

    /// Send one notification, unless the cooldown window is still open (a
    /// silent no-op). Transport failure is logged, never raised, and still
    /// consumes the window.
    pub fn dispatch(&self, notification: Notification) {
        let mut last = self
            .last_dispatch
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if let Some(at) = *last {
            if at.elapsed() < self.cooldown {
                debug!(
                    name = %notification.name,
                    "notification suppressed by cooldown"
                );
                return;
            }
        }
        *last = Some(Instant::now());
        drop(last);

        let payload = json!({
            "text": notification.description,
            "severity": notification.severity.as_str(),
            "timestamp": notification.timestamp.timestamp(),
        });

        match self.transport.deliver(&payload) {
            Ok(()) => {
                info!(
                    name = %notification.name,
                    severity = notification.severity.as_str(),
                    "alert dispatched"
                );
            }
            Err(e) => {
                error!(
                    name = %notification.name,
                    "failed to deliver alert: {e}"
                );
            }
        }
    }

    /// Evaluate every rule against the current pipeline state. Rules are
    /// not short-circuited; one call may dispatch several notifications
    /// (each subject to the shared cooldown).
    pub fn evaluate(
        &self,
        queue_depth: usize,
        failed_deliveries: u64,
        sensor_values: &[(i32, f64)],
    ) {
        let critical_depth = (self.buffer_capacity as f64 * 0.9) as usize;
        let warning_depth = (self.buffer_capacity as f64 * 0.7) as usize;

        if queue_depth > critical_depth {
            warn!(queue_depth, "buffer nearly full");
            self.dispatch(Notification::new(
                "Buffer Nearly Full",
                "Data buffer is approaching maximum capacity".to_string(),
                Severity::Critical,
            ));
        } else if queue_depth > warning_depth {
            warn!(queue_depth, "buffer filling up");
            self.dispatch(Notification::new(
                "Buffer Warning",
                "Data buffer is filling up".to_string(),
                Severity::Warning,
            ));
        }

        if failed_deliveries > DELIVERY_LAG_THRESHOLD {
            warn!(failed_deliveries, "delivery lag proxy above threshold");
            self.dispatch(Notification::new(
                "High Delivery Lag",
                "Broker delivery is experiencing high lag".to_string(),
                Severity::Critical,
            ));
        }

        for &(sensor_id, value) in sensor_values {
            if !(-50.0..=100.0).contains(&value) {
                warn!(sensor_id, value, "sensor value out of range");
                self.dispatch(Notification::new(
                    "Sensor Value Out of Range",
                    format!("Sensor {sensor_id} reported abnormal value: {value}"),
                    Severity::Warning,
                ));
            }
        }
    }
}
