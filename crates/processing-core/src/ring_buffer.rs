//! Fixed-capacity window of recent samples.

use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use shotscope_model::sample::ProcessedSample;

/// FIFO buffer of the most recent `capacity` samples, ordered by arrival
/// (and therefore by unwrapped device time).
#[derive(Debug, Clone)]
pub struct RingBuffer {
    samples: VecDeque<ProcessedSample>,
    capacity: usize,
    /// Global index of the next pushed sample. Survives `clear`.
    next_index: u64,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            next_index: 0,
        }
    }

    /// Insert a sample, evicting the oldest when full.
    /// Returns the sample's global index.
    pub fn push(&mut self, sample: ProcessedSample) -> u64 {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        let index = self.next_index;
        self.next_index += 1;
        index
    }

    /// Samples with `t_start <= t_ms <= t_end`, oldest first.
    pub fn range(&self, t_start: u64, t_end: u64) -> Vec<ProcessedSample> {
        if t_start > t_end {
            return Vec::new();
        }
        let lo = self.samples.partition_point(|s| s.t_ms < t_start);
        let hi = self.samples.partition_point(|s| s.t_ms <= t_end);
        self.samples.range(lo..hi.max(lo)).cloned().collect()
    }

    /// Samples from the last `window_ms` of device time.
    pub fn recent(&self, window_ms: u64) -> Vec<ProcessedSample> {
        match self.samples.back() {
            Some(last) => self.range(last.t_ms.saturating_sub(window_ms), last.t_ms),
            None => Vec::new(),
        }
    }

    pub fn latest(&self) -> Option<&ProcessedSample> {
        self.samples.back()
    }

    /// Sample by global index, if still retained.
    pub fn get(&self, index: u64) -> Option<&ProcessedSample> {
        let first = self.next_index - self.samples.len() as u64;
        if index < first {
            return None;
        }
        self.samples.get((index - first) as usize)
    }

    /// Oldest and newest retained device times.
    pub fn time_span(&self) -> Option<(u64, u64)> {
        Some((self.samples.front()?.t_ms, self.samples.back()?.t_ms))
    }

    /// Oldest and newest retained global indices.
    pub fn index_span(&self) -> Option<(u64, u64)> {
        if self.samples.is_empty() {
            return None;
        }
        Some((self.next_index - self.samples.len() as u64, self.next_index - 1))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop all samples. Global indices keep counting.
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessedSample> {
        self.samples.iter()
    }
}

/// Shared handle: one writer (the pipeline), any number of readers.
///
/// Every operation takes the lock for its whole duration, so a reader
/// sees the buffer either before or after a push, never in between.
#[derive(Debug, Clone)]
pub struct SharedRingBuffer {
    inner: Arc<RwLock<RingBuffer>>,
}

impl SharedRingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(RingBuffer::new(capacity))),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, RingBuffer> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RingBuffer> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, sample: ProcessedSample) -> u64 {
        self.write().push(sample)
    }

    pub fn range(&self, t_start: u64, t_end: u64) -> Vec<ProcessedSample> {
        self.read().range(t_start, t_end)
    }

    pub fn recent(&self, window_ms: u64) -> Vec<ProcessedSample> {
        self.read().recent(window_ms)
    }

    pub fn latest(&self) -> Option<ProcessedSample> {
        self.read().latest().cloned()
    }

    pub fn time_span(&self) -> Option<(u64, u64)> {
        self.read().time_span()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.read().capacity()
    }

    pub fn clear(&self) {
        self.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use shotscope_model::sample::{ImuReading, RawImu};

    fn sample(seq: u16, t_ms: u64) -> ProcessedSample {
        let reading = ImuReading {
            raw: RawImu::default(),
            accel_g: [0.0; 3],
            gyro_dps: [0.0; 3],
            gyro_mag: 0.0,
            gyro_mag_raw: 0.0,
            accel_mag: 0.0,
            accel_mag_raw: 0.0,
        };
        ProcessedSample {
            seq,
            t_device_ms: t_ms as u32,
            t_ms,
            t_received_ns: 0,
            button: 0,
            imu: [reading, reading],
        }
    }

    #[test]
    fn test_eviction_keeps_most_recent() {
        let mut rb = RingBuffer::new(4);
        for i in 0..5u16 {
            rb.push(sample(i, i as u64 * 10));
        }
        assert_eq!(rb.len(), 4);
        let seqs: Vec<u16> = rb.iter().map(|s| s.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4]);
        assert_eq!(rb.index_span(), Some((1, 4)));
        assert!(rb.get(0).is_none());
        assert_eq!(rb.get(4).map(|s| s.seq), Some(4));
    }

    #[test]
    fn test_range_is_closed_interval() {
        let mut rb = RingBuffer::new(100);
        for i in 0..10u16 {
            rb.push(sample(i, i as u64 * 10));
        }
        let seqs: Vec<u16> = rb.range(20, 50).iter().map(|s| s.seq).collect();
        assert_eq!(seqs, vec![2, 3, 4, 5]);
        assert!(rb.range(1_000, 2_000).is_empty());
        assert!(rb.range(50, 20).is_empty());
        assert!(RingBuffer::new(3).range(0, 10).is_empty());
    }

    #[test]
    fn test_recent_and_span() {
        let mut rb = RingBuffer::new(100);
        for i in 0..10u16 {
            rb.push(sample(i, 1_000 + i as u64 * 10));
        }
        assert_eq!(rb.recent(25).len(), 3);
        assert_eq!(rb.time_span(), Some((1_000, 1_090)));
        assert_eq!(rb.latest().map(|s| s.seq), Some(9));
    }

    #[test]
    fn test_clear_keeps_index_counter() {
        let mut rb = RingBuffer::new(10);
        rb.push(sample(0, 0));
        rb.push(sample(1, 10));
        rb.clear();
        assert!(rb.is_empty());
        assert_eq!(rb.push(sample(2, 20)), 2);
        assert_eq!(rb.index_span(), Some((2, 2)));
    }

    #[test]
    fn test_shared_buffer_readers_see_pushes() {
        let shared = SharedRingBuffer::new(8);
        let reader = shared.clone();
        let writer = std::thread::spawn(move || {
            for i in 0..100u16 {
                shared.push(sample(i, i as u64));
            }
        });
        for _ in 0..100 {
            let len = reader.len();
            assert!(len <= 8);
            let span = reader.range(0, u64::MAX);
            assert!(span.windows(2).all(|w| w[0].t_ms < w[1].t_ms));
        }
        writer.join().unwrap();
        assert_eq!(reader.latest().map(|s| s.seq), Some(99));
        assert_eq!(reader.capacity(), 8);
    }

    proptest! {
        #[test]
        fn prop_retains_last_capacity(capacity in 1usize..50, pushes in 0usize..200) {
            let mut rb = RingBuffer::new(capacity);
            for i in 0..pushes {
                rb.push(sample(i as u16, i as u64));
            }
            let kept: Vec<u64> = rb.iter().map(|s| s.t_ms).collect();
            let expected: Vec<u64> =
                (pushes.saturating_sub(capacity)..pushes).map(|i| i as u64).collect();
            prop_assert_eq!(kept, expected);
        }
    }
}
