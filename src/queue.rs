//! Fixed-capacity, lock-free queues connecting the three execution contexts.
//!
//! [`BoundedQueue`] wraps a [`heapless::mpmc::MpMcQueue`] and adds a depth
//! counter for diagnostics. Every operation takes `&self`, so one queue can sit
//! in a shared [`Link`](crate::link::Link) with the producer and the consumer in
//! different contexts.
//!
//! - [`BoundedQueue::try_push`] never blocks and never allocates; it is the only
//!   form allowed in the capture context.
//! - [`BoundedQueue::push_within`] retries a bounded number of times, sleeping
//!   on an [`embedded_hal::delay::DelayNs`] between attempts.
//!
//! A full queue always rejects the *new* item; queued items and their order are
//! never disturbed.

use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use embedded_hal::delay::DelayNs;
use heapless::mpmc::MpMcQueue;

/// A bounded FIFO queue with non-blocking and bounded-wait producers.
///
/// `N` must be a power of two.
pub struct BoundedQueue<T, const N: usize> {
    inner: MpMcQueue<T, N>,
    depth: AtomicUsize,
    dropped: AtomicU32,
}

impl<T, const N: usize> core::fmt::Debug for BoundedQueue<T, N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("capacity", &N)
            .field("len", &self.len())
            .field("dropped", &self.dropped())
            .finish()
    }
}

impl<T, const N: usize> Default for BoundedQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> BoundedQueue<T, N> {
    /// Creates an empty queue.
    pub const fn new() -> Self {
        Self {
            inner: MpMcQueue::new(),
            depth: AtomicUsize::new(0),
            dropped: AtomicU32::new(0),
        }
    }

    /// Maximum number of queued items.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of queued items. Approximate while producers are active.
    pub fn len(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    /// Whether the queue looks empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items rejected because the queue was full.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Enqueues `item` without waiting. Returns it back if the queue is full.
    pub fn try_push(&self, item: T) -> Result<(), T> {
        self.enqueue(item).inspect_err(|_| {
            let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
        })
    }

    /// Enqueues `item`, retrying up to `attempts` times `step_us` apart.
    pub fn push_within<D: DelayNs>(
        &self,
        mut item: T,
        delay: &mut D,
        attempts: u32,
        step_us: u32,
    ) -> Result<(), T> {
        for attempt in 0..attempts.max(1) {
            if attempt > 0 {
                delay.delay_us(step_us);
            }
            match self.enqueue(item) {
                Ok(()) => return Ok(()),
                Err(back) => item = back,
            }
        }
        let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
        Err(item)
    }

    fn enqueue(&self, item: T) -> Result<(), T> {
        // Count first so a concurrent pop can never underflow the depth.
        let _ = self.depth.fetch_add(1, Ordering::AcqRel);
        self.inner.enqueue(item).inspect_err(|_| {
            let _ = self.depth.fetch_sub(1, Ordering::AcqRel);
        })
    }

    /// Dequeues the oldest item, if any.
    pub fn try_pop(&self) -> Option<T> {
        let item = self.inner.dequeue()?;
        let _ = self.depth.fetch_sub(1, Ordering::AcqRel);
        Some(item)
    }

    /// Discards every queued item, returning how many there were.
    pub fn clear(&self) -> usize {
        let mut n = 0;
        while self.try_pop().is_some() {
            n += 1;
        }
        n
    }
}
