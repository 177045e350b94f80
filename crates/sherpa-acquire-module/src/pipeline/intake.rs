//! Lock-free sample intake queue.
//!
//! `crossbeam_queue::SegQueue` is the only MPMC lock-free queue in the
//! surrounding ecosystem shaped like "push samples from any thread, drain
//! in windowed chunks from one periodic task" — `tokio::sync::mpsc` is
//! single-consumer by construction and `Mutex<VecDeque<f32>>` is exactly
//! the lock this queue exists to avoid. `SegQueue` doesn't expose a cheap
//! `len()` in the version this workspace pins, so the length is tracked
//! alongside it with a plain atomic counter.

use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_queue::SegQueue;

/// Unbounded FIFO of `f32` samples. Producers call [`Self::push_all`] from
/// any thread; a single periodic drain task pops windowed chunks via
/// [`Self::pop_window`].
#[derive(Default)]
pub struct IntakeQueue {
    queue: SegQueue<f32>,
    len: AtomicUsize,
}

impl IntakeQueue {
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: SegQueue::new(),
            len: AtomicUsize::new(0),
        }
    }

    pub fn push_all(&self, samples: &[f32]) {
        for &sample in samples {
            self.queue.push(sample);
        }
        self.len.fetch_add(samples.len(), Ordering::AcqRel);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fill `buf` with exactly `window_size` samples and return `true`, or
    /// leave `buf` untouched and return `false` if fewer than that many are
    /// currently available. `buf` is cleared first and reused across calls
    /// by the caller rather than reallocated per window.
    pub fn pop_window(&self, window_size: usize, buf: &mut Vec<f32>) -> bool {
        if self.len() < window_size {
            return false;
        }
        buf.clear();
        for _ in 0..window_size {
            match self.queue.pop() {
                Some(sample) => buf.push(sample),
                None => break,
            }
        }
        self.len.fetch_sub(buf.len(), Ordering::AcqRel);
        buf.len() == window_size
    }

    /// Pop everything currently queued, regardless of window alignment.
    /// Used by `flush` to push a final partial window through before the
    /// native engine's own flush.
    pub fn drain_all(&self) -> Vec<f32> {
        let mut drained = Vec::with_capacity(self.len());
        while let Some(sample) = self.queue.pop() {
            drained.push(sample);
        }
        self.len.fetch_sub(drained.len(), Ordering::AcqRel);
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_window_returns_false_until_enough_samples_queued() {
        let queue = IntakeQueue::new();
        let mut buf = Vec::new();

        queue.push_all(&[1.0, 2.0, 3.0]);
        assert!(!queue.pop_window(4, &mut buf));

        queue.push_all(&[4.0]);
        assert!(queue.pop_window(4, &mut buf));
        assert_eq!(buf, vec![1.0, 2.0, 3.0, 4.0]);
        assert!(queue.is_empty());
    }

    #[test]
    fn pop_window_preserves_fifo_order_across_multiple_windows() {
        let queue = IntakeQueue::new();
        queue.push_all(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        let mut buf = Vec::new();
        assert!(queue.pop_window(3, &mut buf));
        assert_eq!(buf, vec![1.0, 2.0, 3.0]);
        assert!(queue.pop_window(3, &mut buf));
        assert_eq!(buf, vec![4.0, 5.0, 6.0]);
        assert!(!queue.pop_window(1, &mut buf));
    }

    #[test]
    fn drain_all_empties_partial_queue() {
        let queue = IntakeQueue::new();
        queue.push_all(&[1.0, 2.0, 3.0]);
        let drained = queue.drain_all();
        assert_eq!(drained, vec![1.0, 2.0, 3.0]);
        assert!(queue.is_empty());
    }
}
