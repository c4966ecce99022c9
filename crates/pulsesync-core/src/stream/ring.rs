//! Fixed-capacity timestamped sample store
//!
//! One [`SampleRing`] per capture channel. The capture callback calls
//! [`SampleRing::add`] from its own thread while the analysis thread reads
//! with [`SampleRing::snapshot`]. Capacity is fixed at construction: once
//! full, each insertion overwrites the oldest sample, so memory stays
//! bounded no matter how far the consumer falls behind.

use std::sync::{Mutex, MutexGuard, PoisonError};

use ringbuf::traits::{Consumer, Observer, RingBuffer};
use ringbuf::HeapRb;

use crate::types::TimestampedSample;

/// Lock-guarded circular buffer of [`TimestampedSample`]s
///
/// All methods take `&self`; share it between the producer and consumer
/// threads with an `Arc`.
///
/// # Example
/// ```
/// use pulsesync_core::stream::ring::SampleRing;
///
/// let ring = SampleRing::new(4);
/// for i in 0..6 {
///     ring.add(i as f64, i * 1_000_000);
/// }
/// assert_eq!(ring.size(), 4);
///
/// // Samples within 2ms of the newest one, oldest first
/// let window = ring.snapshot(2_000_000).unwrap();
/// let values: Vec<f64> = window.iter().map(|s| s.value).collect();
/// assert_eq!(values, vec![3.0, 4.0, 5.0]);
/// ```
pub struct SampleRing {
    inner: Mutex<HeapRb<TimestampedSample>>,
    capacity: usize,
}

impl std::fmt::Debug for SampleRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleRing")
            .field("capacity", &self.capacity)
            .field("size", &self.size())
            .finish()
    }
}

impl SampleRing {
    /// Create a ring holding at most `capacity` samples (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(HeapRb::new(capacity)),
            capacity,
        }
    }

    /// Create a ring sized for `seconds` of capture at `rate_hz`
    pub fn for_duration(seconds: f64, rate_hz: f64) -> Self {
        Self::new((seconds * rate_hz).ceil().max(1.0) as usize)
    }

    // A panicking writer cannot leave a half-written sample behind, so a
    // poisoned lock still guards consistent data.
    fn lock(&self) -> MutexGuard<'_, HeapRb<TimestampedSample>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a sample, overwriting the oldest one when full
    pub fn add(&self, value: f64, timestamp_ns: i64) {
        self.push(TimestampedSample::new(timestamp_ns, value));
    }

    /// Append an existing sample, overwriting the oldest one when full
    pub fn push(&self, sample: TimestampedSample) {
        let overwritten = self.lock().push_overwrite(sample);
        if overwritten.is_some() {
            tracing::trace!(capacity = self.capacity, "ring_overwrite_oldest");
        }
    }

    /// Most recent samples within `window_ns` of the newest sample
    ///
    /// Walks backwards from the newest sample and stops at the first one
    /// older than the window, so the cost is proportional to the window,
    /// not the capacity. Returns the run in chronological order, or `None`
    /// when the buffer is empty or no sample qualifies.
    pub fn snapshot(&self, window_ns: i64) -> Option<Vec<TimestampedSample>> {
        if window_ns < 0 {
            return None;
        }
        let guard = self.lock();
        let (head, tail) = guard.as_slices();
        let newest = tail.last().or_else(|| head.last())?.timestamp_ns;

        let mut run: Vec<TimestampedSample> = Vec::new();
        for sample in tail.iter().rev().chain(head.iter().rev()) {
            if newest.saturating_sub(sample.timestamp_ns) > window_ns {
                break;
            }
            run.push(*sample);
        }
        drop(guard);

        if run.is_empty() {
            return None;
        }
        run.reverse();
        Some(run)
    }

    /// Copy of every stored sample, oldest first
    pub fn to_vec(&self) -> Vec<TimestampedSample> {
        let guard = self.lock();
        let (head, tail) = guard.as_slices();
        head.iter().chain(tail.iter()).copied().collect()
    }

    /// Newest sample, if any
    pub fn latest(&self) -> Option<TimestampedSample> {
        let guard = self.lock();
        let (head, tail) = guard.as_slices();
        tail.last().or_else(|| head.last()).copied()
    }

    /// Number of samples currently stored
    pub fn size(&self) -> usize {
        self.lock().occupied_len()
    }

    /// Whether the ring holds no samples
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Maximum number of samples held
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Discard all samples
    pub fn reset(&self) {
        let cleared = Consumer::clear(&mut *self.lock());
        tracing::debug!(cleared = cleared, "ring_reset");
    }
}
