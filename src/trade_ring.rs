//! Trade Ring - bounded SPSC ring decoupling matching from listener dispatch.
//!
//! The engine thread is the sole producer; the trade-dispatch thread is the
//! sole consumer. Overflow policy is newest-wins: a full ring advances the
//! consumer cursor by one, dropping the oldest undelivered trade, so the
//! matching hot path never blocks on a stalled listener. The consumer claims
//! entries with a CAS on its cursor; a failed CAS means the producer stole
//! the slot first and the read is discarded and retried.
//!
//! Dropped trades are counted and surfaced through [`TradeRing::overflow_count`].

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::types::Trade;

/// Default ring capacity.
pub const DEFAULT_CAPACITY: usize = 2048;

#[repr(align(64))]
struct Al64<T>(T);

pub struct TradeRing {
    buf: Vec<UnsafeCell<MaybeUninit<Trade>>>,
    mask: u64,
    capacity: u64,
    head: Al64<AtomicU64>,
    tail: Al64<AtomicU64>,
    dropped: AtomicU64,
}

unsafe impl Send for TradeRing {}
unsafe impl Sync for TradeRing {}

impl TradeRing {
    /// Capacity is rounded up to a power of two, minimum 2048.
    pub fn new(capacity: usize) -> Self {
        let cap = capacity.next_power_of_two().max(DEFAULT_CAPACITY);
        let mut buf = Vec::with_capacity(cap);
        buf.resize_with(cap, || UnsafeCell::new(MaybeUninit::uninit()));
        Self {
            buf,
            mask: (cap - 1) as u64,
            capacity: cap as u64,
            head: Al64(AtomicU64::new(0)),
            tail: Al64(AtomicU64::new(0)),
            dropped: AtomicU64::new(0),
        }
    }

    /// Splits into producer and consumer handles sharing this ring.
    pub fn split(self) -> (TradeProducer, TradeConsumer) {
        let ring = Arc::new(self);
        (
            TradeProducer { ring: ring.clone() },
            TradeConsumer { ring },
        )
    }

    /// Trades dropped by the newest-wins overflow policy.
    pub fn overflow_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.head.0.load(Ordering::Acquire) == self.tail.0.load(Ordering::Acquire)
    }

    fn push(&self, trade: Trade) {
        let head = self.head.0.load(Ordering::Relaxed);
        let tail = self.tail.0.load(Ordering::Acquire);
        if head.wrapping_sub(tail) >= self.capacity {
            // Full: steal the oldest undelivered entry. A failed CAS means
            // the consumer advanced first and space exists anyway.
            if self
                .tail
                .0
                .compare_exchange(tail, tail.wrapping_add(1), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
        let idx = (head & self.mask) as usize;
        unsafe {
            (*self.buf[idx].get()).write(trade);
        }
        self.head.0.store(head.wrapping_add(1), Ordering::Release);
    }

    fn pop(&self) -> Option<Trade> {
        loop {
            let tail = self.tail.0.load(Ordering::Acquire);
            let head = self.head.0.load(Ordering::Acquire);
            if tail == head {
                return None;
            }
            let idx = (tail & self.mask) as usize;
            let trade = unsafe { (*self.buf[idx].get()).assume_init_read() };
            if self
                .tail
                .0
                .compare_exchange(tail, tail.wrapping_add(1), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(trade);
            }
            // The producer dropped this entry under overflow; discard and retry.
        }
    }
}

/// Engine-thread handle. Enqueueing never blocks.
pub struct TradeProducer {
    ring: Arc<TradeRing>,
}

impl TradeProducer {
    #[inline]
    pub fn push(&self, trade: Trade) {
        self.ring.push(trade);
    }

    pub fn overflow_count(&self) -> u64 {
        self.ring.overflow_count()
    }
}

/// Dispatch-thread handle.
pub struct TradeConsumer {
    ring: Arc<TradeRing>,
}

impl TradeConsumer {
    #[inline]
    pub fn pop(&self) -> Option<Trade> {
        self.ring.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn overflow_count(&self) -> u64 {
        self.ring.overflow_count()
    }
}
