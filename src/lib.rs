pub mod alerts;
pub mod broker;
pub mod buffer;
pub mod config;
pub mod metrics;
pub mod retry;
pub mod sensors;
pub mod service;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One sampled sensor value with identity and timestamp.
///
/// Immutable once created: produced by the poller, owned by a buffer slot
/// until popped, then by the consumer loop until handed to delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub sensor_id: i32,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Broker wire form of a [`Reading`]: timestamp in milliseconds since the
/// epoch, one JSON object per broker message, no batching envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireReading {
    pub sensor_id: i32,
    pub value: f64,
    pub timestamp: i64,
}

impl Reading {
    pub fn new(sensor_id: i32, value: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            sensor_id,
            value,
            timestamp,
        }
    }

    /// Serialize to the broker wire format.
    pub fn to_wire(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&WireReading {
            sensor_id: self.sensor_id,
            value: self.value,
            timestamp: self.timestamp.timestamp_millis(),
        })
    }
}
