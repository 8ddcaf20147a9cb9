//! Broker transport seam

use std::time::Duration;

/// Transport-level failure of a publish attempt.
///
/// A *rejected* publish (transport queue full, i.e. backpressure) is not an
/// error: `try_publish` reports it as `Ok(false)` so callers can treat it
/// as recoverable without an error path.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("broker connection lost: {0}")]
    Disconnected(String),

    #[error("broker transport failed: {0}")]
    Transport(String),
}

/// Non-blocking producer handle to a message broker.
///
/// Implementations must be `Send + Sync`; the consumer loop publishes from
/// its own thread while `flush` may be called from the shutdown path.
pub trait BrokerTransport: Send + Sync {
    /// Attempt a single non-blocking enqueue of one message.
    ///
    /// `Ok(true)`: accepted by the transport. `Ok(false)`: rejected under
    /// backpressure, safe to retry. `Err`: the transport itself failed.
    fn try_publish(&self, payload: &[u8]) -> Result<bool, PublishError>;

    /// Wait up to `timeout` for outstanding accepted messages to be
    /// acknowledged. Best-effort: returns whether everything drained.
    fn flush(&self, timeout: Duration) -> bool;

    /// Tear the connection down. Idempotent.
    fn shutdown(&self);
}
