//! Delivery client: counters plus the retrying send path

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

use super::transport::{BrokerTransport, PublishError};
use crate::retry::{RetryOutcome, RetryPolicy};

/// Immutable snapshot of the cumulative delivery counters.
///
/// Counters only ever increase; they are never reset during normal
/// operation, so deltas between snapshots are meaningful.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub sent: u64,
    pub failed: u64,
    pub retried: u64,
    pub errored: u64,
}

#[derive(Default)]
struct Counters {
    sent: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    errored: AtomicU64,
}

pub struct DeliveryClient {
    transport: Arc<dyn BrokerTransport>,
    retry: RetryPolicy,
    counters: Counters,
}

impl DeliveryClient {
    pub fn new(transport: Arc<dyn BrokerTransport>, retry: RetryPolicy) -> Self {
        Self {
            transport,
            retry,
            counters: Counters::default(),
        }
    }

    /// One non-blocking enqueue. Accepted → sent+1, `Ok(true)`; rejected
    /// under backpressure → failed+1, `Ok(false)`; transport failure →
    /// `Err` (accounted by [`send_with_retry`](Self::send_with_retry)).
    ///
    /// Yields the thread afterwards so the transport's connection thread
    /// gets a slice to make progress.
    pub fn send(&self, payload: &[u8]) -> Result<bool, PublishError> {
        let result = self.transport.try_publish(payload);

        match &result {
            Ok(true) => {
                self.counters.sent.fetch_add(1, Ordering::Relaxed);
            }
            Ok(false) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {}
        }

        std::thread::yield_now();
        result
    }

    /// Retrying send. Attempts after the first count as retries; attempts
    /// that end in a transport error count as errors. The outcome follows
    /// the retry policy: `Failed` only on a final-attempt transport error,
    /// `Exhausted` when every attempt was rejected without erroring.
    pub fn send_with_retry(&self, payload: &[u8]) -> RetryOutcome<PublishError> {
        let mut attempt = 0u32;
        self.retry.execute_with_retry(|| {
            if attempt > 0 {
                self.counters.retried.fetch_add(1, Ordering::Relaxed);
                trace!(attempt, "retrying delivery");
            }
            attempt += 1;

            self.send(payload).inspect_err(|_| {
                self.counters.errored.fetch_add(1, Ordering::Relaxed);
            })
        })
    }

    /// Best-effort wait for the transport to acknowledge outstanding
    /// messages; never errors on partial drain.
    pub fn flush(&self, timeout: Duration) -> bool {
        self.transport.flush(timeout)
    }

    /// Tear the transport down. Sends after this fail or are rejected.
    pub fn shutdown(&self) {
        self.transport.shutdown();
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            sent: self.counters.sent.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            retried: self.counters.retried.load(Ordering::Relaxed),
            errored: self.counters.errored.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Transport whose `try_publish` replies from a script, then accepts.
    pub(crate) struct ScriptedTransport {
        script: Mutex<Vec<Result<bool, PublishError>>>,
        published: AtomicU64,
    }

    impl ScriptedTransport {
        pub(crate) fn new(mut script: Vec<Result<bool, PublishError>>) -> Self {
            script.reverse();
            Self {
                script: Mutex::new(script),
                published: AtomicU64::new(0),
            }
        }

        fn published(&self) -> u64 {
            self.published.load(Ordering::SeqCst)
        }
    }

    impl BrokerTransport for ScriptedTransport {
        fn try_publish(&self, _payload: &[u8]) -> Result<bool, PublishError> {
            let next = self.script.lock().unwrap().pop().unwrap_or(Ok(true));
            if let Ok(true) = next {
                self.published.fetch_add(1, Ordering::SeqCst);
            }
            next
        }

        fn flush(&self, _timeout: Duration) -> bool {
            true
        }

        fn shutdown(&self) {}
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2))
    }

    #[test]
    fn send_counts_sent_and_failed() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(true), Ok(false)]));
        let client = DeliveryClient::new(Arc::clone(&transport) as _, fast_retry());

        assert!(client.send(b"a").unwrap());
        assert!(!client.send(b"b").unwrap());

        let stats = client.stats();
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.retried, 0);
        assert_eq!(stats.errored, 0);
        assert_eq!(transport.published(), 1);
    }

    #[test]
    fn retry_recovers_after_rejections() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(false),
            Ok(false),
            Ok(true),
        ]));
        let client = DeliveryClient::new(Arc::clone(&transport) as _, fast_retry());

        let outcome = client.send_with_retry(b"m");
        assert!(outcome.is_success());

        let stats = client.stats();
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.retried, 2);
        assert_eq!(stats.errored, 0);
    }

    #[test]
    fn exhausted_when_every_attempt_rejected() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(false),
            Ok(false),
            Ok(false),
        ]));
        let client = DeliveryClient::new(Arc::clone(&transport) as _, fast_retry());

        let outcome = client.send_with_retry(b"m");
        assert!(matches!(outcome, RetryOutcome::Exhausted));

        let stats = client.stats();
        assert_eq!(stats.sent, 0);
        assert_eq!(stats.failed, 3);
        assert_eq!(stats.retried, 2);
        assert_eq!(stats.errored, 0);
    }

    #[test]
    fn transport_errors_counted_and_final_one_surfaces() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Err(PublishError::Disconnected("a".into())),
            Err(PublishError::Disconnected("b".into())),
            Err(PublishError::Disconnected("c".into())),
        ]));
        let client = DeliveryClient::new(Arc::clone(&transport) as _, fast_retry());

        let outcome = client.send_with_retry(b"m");
        match outcome {
            RetryOutcome::Failed(PublishError::Disconnected(msg)) => assert_eq!(msg, "c"),
            other => panic!("expected final-attempt failure, got {other:?}"),
        }

        let stats = client.stats();
        assert_eq!(stats.sent, 0);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.retried, 2);
        assert_eq!(stats.errored, 3);
    }

    #[test]
    fn early_error_swallowed_when_later_attempt_lands() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Err(PublishError::Transport("hiccup".into())),
            Ok(true),
        ]));
        let client = DeliveryClient::new(Arc::clone(&transport) as _, fast_retry());

        let outcome = client.send_with_retry(b"m");
        assert!(outcome.is_success());

        let stats = client.stats();
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.errored, 1);
        assert_eq!(stats.retried, 1);
    }
}
