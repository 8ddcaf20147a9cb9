//! Metrics collaborator interface
//!
//! Metrics exposition itself is external to the pipeline; the monitor loop
//! only needs somewhere to record what it observed. Implementations with a
//! real exporter live outside this crate.

use tracing::debug;

use crate::broker::StatsSnapshot;

pub trait MetricsSink: Send + Sync {
    fn record_queue_depth(&self, depth: usize);
    fn record_delivery_counters(&self, stats: StatsSnapshot);
    fn record_sensor_value(&self, sensor_id: i32, value: f64);
    fn record_sensor_online(&self, sensor_id: i32, online: bool);
}

/// Default sink: structured debug logging only.
#[derive(Debug, Default)]
pub struct LogMetricsSink;

impl MetricsSink for LogMetricsSink {
    fn record_queue_depth(&self, depth: usize) {
        debug!(depth, "queue depth");
    }

    fn record_delivery_counters(&self, stats: StatsSnapshot) {
        debug!(
            sent = stats.sent,
            failed = stats.failed,
            retried = stats.retried,
            errored = stats.errored,
            "delivery counters"
        );
    }

    fn record_sensor_value(&self, sensor_id: i32, value: f64) {
        debug!(sensor_id, value, "sensor value");
    }

    fn record_sensor_online(&self, sensor_id: i32, online: bool) {
        debug!(sensor_id, online, "sensor status");
    }
}
