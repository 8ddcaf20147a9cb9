//! MQTT broker transport on rumqttc's synchronous client
//!
//! The client enqueues publishes onto a bounded request queue; a dedicated
//! connection thread drives the event loop, flips the connected flag on
//! ConnAck/errors and counts PubAcks so `flush` can wait for the in-flight
//! window to drain. rumqttc reconnects on the next iteration after a
//! connection error, so the thread just logs and keeps iterating.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rumqttc::{Client, Connection, Event, Incoming, MqttOptions, QoS};
use tracing::{debug, trace, warn};

use super::transport::{BrokerTransport, PublishError};
use crate::config::BrokerConfig;

pub struct MqttTransport {
    client: Client,
    topic: String,
    connected: Arc<AtomicBool>,
    /// Publishes accepted by the request queue, not yet PubAck'd.
    in_flight: Arc<AtomicU64>,
}

impl MqttTransport {
    /// Connect-lazily to the configured broker. Fails fast on an invalid
    /// broker address; the TCP connection itself is established (and
    /// re-established) by the connection thread.
    pub fn new(config: &BrokerConfig) -> anyhow::Result<Self> {
        if config.host.trim().is_empty() {
            anyhow::bail!("broker host must not be empty");
        }
        if config.queue_capacity == 0 {
            anyhow::bail!("broker queue capacity must be at least 1");
        }

        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(15));

        let (client, connection) = Client::new(options, config.queue_capacity);

        let connected = Arc::new(AtomicBool::new(false));
        let in_flight = Arc::new(AtomicU64::new(0));

        spawn_connection_thread(connection, Arc::clone(&connected), Arc::clone(&in_flight));

        Ok(Self {
            client,
            topic: config.topic.clone(),
            connected,
            in_flight,
        })
    }
}

fn spawn_connection_thread(
    mut connection: Connection,
    connected: Arc<AtomicBool>,
    in_flight: Arc<AtomicU64>,
) {
    std::thread::spawn(move || {
        for event in connection.iter() {
            match event {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    debug!("mqtt broker connected");
                    connected.store(true, Ordering::SeqCst);
                }
                Ok(Event::Incoming(Incoming::PubAck(_))) => {
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                }
                Ok(Event::Incoming(Incoming::Disconnect)) => {
                    warn!("mqtt broker sent disconnect");
                    connected.store(false, Ordering::SeqCst);
                }
                Ok(_) => {}
                Err(e) => {
                    connected.store(false, Ordering::SeqCst);
                    warn!("mqtt connection error, reconnecting: {e}");
                    std::thread::sleep(Duration::from_secs(1));
                }
            }
        }
        debug!("mqtt connection thread exiting");
    });
}

impl BrokerTransport for MqttTransport {
    fn try_publish(&self, payload: &[u8]) -> Result<bool, PublishError> {
        match self
            .client
            .try_publish(&self.topic, QoS::AtLeastOnce, false, payload.to_vec())
        {
            Ok(()) => {
                self.in_flight.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
            Err(e) => {
                // rumqttc does not distinguish a full request queue from a
                // torn-down one in the error itself; the connection thread's
                // flag decides between backpressure and hard failure.
                if self.connected.load(Ordering::SeqCst) {
                    trace!("mqtt request queue full, publish rejected");
                    Ok(false)
                } else {
                    Err(PublishError::Disconnected(e.to_string()))
                }
            }
        }
    }

    fn flush(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.in_flight.load(Ordering::SeqCst) > 0 {
            if Instant::now() >= deadline {
                let left = self.in_flight.load(Ordering::SeqCst);
                warn!(unacked = left, "mqtt flush timed out with messages in flight");
                return false;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        true
    }

    fn shutdown(&self) {
        if let Err(e) = self.client.try_disconnect() {
            debug!("mqtt disconnect failed (already down?): {e}");
        }
        self.connected.store(false, Ordering::SeqCst);
    }
}
