//! Sensor polling loop
//!
//! One dedicated thread sweeps the registered sensors in registration
//! order, invoking the reading callback once per sensor per sweep, then
//! sleeps for the polling period. The callback runs on the poller's thread:
//! it gates the next sensor's sampling and the overall cadence, so it must
//! not block indefinitely.
//!
//! Sampling is pluggable via [`Sampler`]. The default draws stationary
//! noise per call (no per-sensor state); read values carry no physical
//! meaning beyond "one value per sensor per sweep".

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tracing::{debug, warn};

use crate::Reading;

/// Callback invoked with each fresh reading, on the poller thread.
pub type ReadingCallback = Arc<dyn Fn(Reading) + Send + Sync>;

/// Source of sensor values. Implementations must be stateless per call or
/// handle their own synchronization; `sample` is called from the poller
/// thread only.
pub trait Sampler: Send + Sync {
    fn sample(&self, sensor_id: i32) -> f64;
}

/// Default sampler: stationary noise around a mean, no per-sensor state.
pub struct NoiseSampler {
    mean: f64,
    spread: f64,
}

impl NoiseSampler {
    pub fn new(mean: f64, spread: f64) -> Self {
        Self { mean, spread }
    }
}

impl Default for NoiseSampler {
    fn default() -> Self {
        Self::new(20.0, 5.0)
    }
}

impl Sampler for NoiseSampler {
    fn sample(&self, _sensor_id: i32) -> f64 {
        let noise: f64 = rand::thread_rng().gen_range(-1.0..=1.0);
        self.mean + noise * self.spread
    }
}

/// Last observed state of one sensor, for the monitor loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSnapshot {
    pub sensor_id: i32,
    pub value: f64,
    pub online: bool,
}

pub struct SensorPoller {
    sensor_ids: Vec<i32>,
    interval: Duration,
    sampler: Arc<dyn Sampler>,
    running: Arc<AtomicBool>,
    latest: Arc<Mutex<HashMap<i32, f64>>>,
    handle: Option<JoinHandle<()>>,
}

impl SensorPoller {
    pub fn new(interval: Duration, sampler: Arc<dyn Sampler>) -> Self {
        Self {
            sensor_ids: Vec::new(),
            interval,
            sampler,
            running: Arc::new(AtomicBool::new(false)),
            latest: Arc::new(Mutex::new(HashMap::new())),
            handle: None,
        }
    }

    /// Register a sensor. Sweeps visit sensors in registration order.
    pub fn add_sensor(&mut self, sensor_id: i32) {
        self.sensor_ids.push(sensor_id);
    }

    pub fn sensor_ids(&self) -> &[i32] {
        &self.sensor_ids
    }

    /// Launch the polling thread. No-op if already running.
    pub fn start(&mut self, callback: ReadingCallback) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("sensor poller already running");
            return;
        }

        let sensor_ids = self.sensor_ids.clone();
        let interval = self.interval;
        let sampler = Arc::clone(&self.sampler);
        let running = Arc::clone(&self.running);
        let latest = Arc::clone(&self.latest);

        debug!(sensors = sensor_ids.len(), ?interval, "starting sensor poller");

        self.handle = Some(std::thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                for &sensor_id in &sensor_ids {
                    let value = sampler.sample(sensor_id);
                    let reading = Reading::new(sensor_id, value, Utc::now());

                    latest
                        .lock()
                        .unwrap_or_else(std::sync::PoisonError::into_inner)
                        .insert(sensor_id, value);

                    callback(reading);
                }

                std::thread::sleep(interval);
            }

            debug!("sensor poller stopped");
        }));
    }

    /// Clear the running flag and join the polling thread. Blocks until the
    /// loop observes the flag and exits; idempotent if already stopped.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("sensor poller thread panicked");
            }
        }
    }

    /// Last sampled value and online status per sensor, in registration
    /// order. A sensor is online once it has produced at least one reading.
    pub fn snapshot(&self) -> Vec<SensorSnapshot> {
        self.snapshot_handle().snapshot()
    }

    /// Cheap cloneable view for observers on other threads, so they can
    /// snapshot sensor state without holding the poller itself.
    pub fn snapshot_handle(&self) -> SensorView {
        SensorView {
            sensor_ids: self.sensor_ids.clone(),
            latest: Arc::clone(&self.latest),
        }
    }
}

/// Read-only view of the poller's sensor set and last sampled values.
#[derive(Clone)]
pub struct SensorView {
    sensor_ids: Vec<i32>,
    latest: Arc<Mutex<HashMap<i32, f64>>>,
}

impl SensorView {
    pub fn snapshot(&self) -> Vec<SensorSnapshot> {
        let latest = self
            .latest
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        self.sensor_ids
            .iter()
            .map(|&sensor_id| match latest.get(&sensor_id) {
                Some(&value) => SensorSnapshot {
                    sensor_id,
                    value,
                    online: true,
                },
                None => SensorSnapshot {
                    sensor_id,
                    value: 0.0,
                    online: false,
                },
            })
            .collect()
    }
}

impl Drop for SensorPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    /// Sampler returning the sensor id itself, so sweeps are verifiable.
    struct EchoSampler;

    impl Sampler for EchoSampler {
        fn sample(&self, sensor_id: i32) -> f64 {
            sensor_id as f64
        }
    }

    fn collecting_callback() -> (ReadingCallback, Arc<StdMutex<Vec<Reading>>>) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: ReadingCallback = Arc::new(move |reading| {
            sink.lock().unwrap().push(reading);
        });
        (callback, seen)
    }

    #[test]
    fn sweeps_sensors_in_registration_order() {
        let mut poller = SensorPoller::new(Duration::from_millis(5), Arc::new(EchoSampler));
        poller.add_sensor(3);
        poller.add_sensor(1);
        poller.add_sensor(2);

        let (callback, seen) = collecting_callback();
        poller.start(callback);
        std::thread::sleep(Duration::from_millis(40));
        poller.stop();

        let readings = seen.lock().unwrap();
        assert!(readings.len() >= 3, "expected at least one full sweep");
        let ids: Vec<i32> = readings.iter().take(3).map(|r| r.sensor_id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn one_value_per_sensor_per_sweep() {
        let mut poller = SensorPoller::new(Duration::from_millis(5), Arc::new(EchoSampler));
        poller.add_sensor(1);
        poller.add_sensor(2);

        let (callback, seen) = collecting_callback();
        poller.start(callback);
        std::thread::sleep(Duration::from_millis(40));
        poller.stop();

        let readings = seen.lock().unwrap();
        // Full sweeps alternate 1, 2, 1, 2, ...
        for pair in readings.chunks_exact(2) {
            assert_eq!(pair[0].sensor_id, 1);
            assert_eq!(pair[1].sensor_id, 2);
        }
    }

    #[test]
    fn stop_is_idempotent_and_start_once() {
        let mut poller = SensorPoller::new(Duration::from_millis(5), Arc::new(EchoSampler));
        poller.add_sensor(1);

        let (callback, seen) = collecting_callback();
        poller.start(Arc::clone(&callback));
        // Second start is a no-op, not a second thread.
        poller.start(callback);

        std::thread::sleep(Duration::from_millis(20));
        poller.stop();
        poller.stop();

        let count = seen.lock().unwrap().len();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(seen.lock().unwrap().len(), count, "no readings after stop");
    }

    #[test]
    fn snapshot_reports_last_value_and_online() {
        let mut poller = SensorPoller::new(Duration::from_millis(5), Arc::new(EchoSampler));
        poller.add_sensor(7);
        poller.add_sensor(8);

        // Never started: registered but offline.
        let before = poller.snapshot();
        assert_eq!(before.len(), 2);
        assert!(before.iter().all(|s| !s.online));

        let (callback, _seen) = collecting_callback();
        poller.start(callback);
        std::thread::sleep(Duration::from_millis(30));
        poller.stop();

        let after = poller.snapshot();
        assert_eq!(after[0], SensorSnapshot { sensor_id: 7, value: 7.0, online: true });
        assert_eq!(after[1], SensorSnapshot { sensor_id: 8, value: 8.0, online: true });
    }
}
