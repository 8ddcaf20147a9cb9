//! Property-based tests for invariants using proptest
//!
//! - Backoff delays always land inside the jitter band of the capped
//!   exponential curve.
//! - The bounded buffer is FIFO and never exceeds capacity for arbitrary
//!   push/pop interleavings.

use std::collections::VecDeque;
use std::time::Duration;

use proptest::prelude::*;
use sensor_relay::buffer::BoundedBuffer;
use sensor_relay::retry::RetryPolicy;

proptest! {
    #[test]
    fn prop_backoff_delay_within_jitter_band(
        attempt in 0u32..16,
        base_ms in 1u64..1000,
        cap_extra_ms in 0u64..10_000,
    ) {
        let cap_ms = base_ms + cap_extra_ms;
        let policy = RetryPolicy::new(
            3,
            Duration::from_millis(base_ms),
            Duration::from_millis(cap_ms),
        );

        let expected = base_ms
            .saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX))
            .min(cap_ms);
        let delay = policy.delay_for(attempt).as_millis() as u64;

        // Truncation to whole milliseconds shifts the lower edge by one.
        let low = ((expected as f64) * 0.75) as u64;
        let high = ((expected as f64) * 1.25).ceil() as u64;
        prop_assert!(
            delay + 1 >= low && delay <= high,
            "attempt {attempt}: delay {delay}ms outside [{low}, {high}]"
        );
    }
}

proptest! {
    #[test]
    fn prop_buffer_fifo_matches_model(
        capacity in 1usize..32,
        ops in proptest::collection::vec(any::<bool>(), 1..200),
    ) {
        let buffer = BoundedBuffer::new(capacity);
        let mut model: VecDeque<u32> = VecDeque::new();
        let mut next = 0u32;

        for push in ops {
            if push {
                // Single-threaded: skip pushes that would block.
                if model.len() < capacity {
                    buffer.push(next).unwrap();
                    model.push_back(next);
                    next += 1;
                }
            } else {
                let got = buffer.pop(Duration::from_millis(0));
                prop_assert_eq!(got, model.pop_front());
            }

            prop_assert_eq!(buffer.len(), model.len());
            prop_assert!(buffer.len() <= capacity);
        }

        // Everything left drains in order.
        while let Some(expected) = model.pop_front() {
            prop_assert_eq!(buffer.pop(Duration::from_millis(1)), Some(expected));
        }
        prop_assert!(buffer.is_empty());
    }
}

// Concurrent variant: N producer threads, one consumer; per-producer order
// must survive and nothing may be lost or duplicated.
#[test]
fn concurrent_pushes_preserve_per_producer_order() {
    use std::sync::Arc;

    const PRODUCERS: u32 = 4;
    const PER_PRODUCER: u32 = 250;

    let buffer = Arc::new(BoundedBuffer::new(16));
    let mut handles = vec![];
    for producer in 0..PRODUCERS {
        let buffer = Arc::clone(&buffer);
        handles.push(std::thread::spawn(move || {
            for i in 0..PER_PRODUCER {
                buffer.push((producer, i)).unwrap();
            }
        }));
    }

    let mut last_seen = [None::<u32>; PRODUCERS as usize];
    let mut total = 0;
    while total < PRODUCERS * PER_PRODUCER {
        if let Some((producer, i)) = buffer.pop(Duration::from_millis(100)) {
            let slot = &mut last_seen[producer as usize];
            match *slot {
                Some(prev) => assert_eq!(i, prev + 1, "producer {producer} out of order"),
                None => assert_eq!(i, 0),
            }
            *slot = Some(i);
            total += 1;
        }
    }

    for handle in handles {
        handle.join().unwrap();
    }
    assert!(buffer.is_empty());
}
