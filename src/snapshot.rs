//! Shared-memory depth snapshots.
//!
//! One POSIX shm region per instrument, named `<prefix>_<token>`. The engine
//! thread is the single writer and publishes at a throttle interval using a
//! seqlock: the sequence goes odd, the body is written, the sequence goes
//! even with release ordering. Readers retry while the sequence is odd or
//! changes across their copy. Prices and quantities are stored as `f64` at
//! this boundary only; the core stays integer.
//!
//! Layout, in order: `sequence: u64`, `max_levels/bid_count/ask_count: u32`,
//! `timestamp_ns: u64`, `ltp/ltq: f64`, then `max_levels` bid levels followed
//! by `max_levels` ask levels, each `{price: f64, qty: f64}`.

use std::ffi::CString;
use std::sync::atomic::{fence, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::Context;
use log::warn;

use crate::order_book::OrderBook;
use crate::types::{InstrumentToken, Price, Qty};
use crate::util::now_nanos;

#[repr(C)]
struct SharedHeader {
    sequence: u64,
    max_levels: u32,
    bid_count: u32,
    ask_count: u32,
    _pad: u32,
    timestamp_ns: u64,
    ltp: f64,
    ltq: f64,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
struct Level {
    price: f64,
    qty: f64,
}

const _: () = assert!(std::mem::size_of::<SharedHeader>() == 48);
const _: () = assert!(std::mem::size_of::<Level>() == 16);

fn region_bytes(max_levels: usize) -> usize {
    std::mem::size_of::<SharedHeader>() + 2 * max_levels * std::mem::size_of::<Level>()
}

/// `<prefix>_<token>`, with the leading slash POSIX requires.
pub fn region_name(prefix: &str, token: InstrumentToken) -> String {
    let mut name = if prefix.starts_with('/') {
        prefix.to_string()
    } else {
        format!("/{prefix}")
    };
    name.push('_');
    name.push_str(&token.to_string());
    name
}

/// Removes a region. Used by tests and operational cleanup.
pub fn unlink_region(prefix: &str, token: InstrumentToken) {
    if let Ok(name) = CString::new(region_name(prefix, token)) {
        unsafe {
            libc::shm_unlink(name.as_ptr());
        }
    }
}

/// Single-writer publisher owned by one engine thread.
pub struct SnapshotWriter {
    ptr: *mut u8,
    size: usize,
    fd: libc::c_int,
    max_levels: usize,
    interval: Duration,
    next_publish: Instant,
    bids: Vec<(Price, Qty)>,
    asks: Vec<(Price, Qty)>,
}

// The raw mapping is owned exclusively by the engine thread that holds the
// writer; concurrent readers go through the seqlock.
unsafe impl Send for SnapshotWriter {}

impl SnapshotWriter {
    pub fn create(
        prefix: &str,
        token: InstrumentToken,
        max_levels: u32,
        interval: Duration,
    ) -> anyhow::Result<Self> {
        let max_levels = max_levels.max(1) as usize;
        let size = region_bytes(max_levels);
        let name = region_name(prefix, token);
        let cname = CString::new(name.clone()).context("region name")?;

        let fd = unsafe {
            libc::shm_open(
                cname.as_ptr(),
                libc::O_CREAT | libc::O_RDWR,
                0o660 as libc::mode_t,
            )
        };
        if fd == -1 {
            return Err(std::io::Error::last_os_error()).context(format!("shm_open {name}"));
        }
        if unsafe { libc::ftruncate(fd, size as libc::off_t) } == -1 {
            let err = std::io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(err).context(format!("ftruncate {name}"));
        }
        let addr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            let err = std::io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(err).context(format!("mmap {name}"));
        }

        let ptr = addr as *mut u8;
        unsafe {
            std::ptr::write_bytes(ptr, 0, size);
            let header = ptr as *mut SharedHeader;
            (*header).max_levels = max_levels as u32;
        }

        Ok(Self {
            ptr,
            size,
            fd,
            max_levels,
            interval,
            next_publish: Instant::now(),
            bids: Vec::new(),
            asks: Vec::new(),
        })
    }

    /// Publishes when the throttle interval has elapsed. Runs inline on the
    /// engine thread and never blocks.
    pub fn maybe_publish(&mut self, book: &OrderBook) {
        let now = Instant::now();
        if now < self.next_publish {
            return;
        }
        self.next_publish = now + self.interval;
        self.publish(book);
    }

    pub fn publish(&mut self, book: &OrderBook) {
        let mut bids = std::mem::take(&mut self.bids);
        let mut asks = std::mem::take(&mut self.asks);
        book.snapshot(&mut bids, &mut asks);

        let header = self.ptr as *mut SharedHeader;
        let seq = unsafe { &*(std::ptr::addr_of!((*header).sequence) as *const AtomicU64) };

        let start = seq.load(Ordering::Relaxed);
        seq.store(start.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);

        unsafe {
            let bid_count = bids.len().min(self.max_levels);
            let ask_count = asks.len().min(self.max_levels);
            std::ptr::addr_of_mut!((*header).bid_count).write_volatile(bid_count as u32);
            std::ptr::addr_of_mut!((*header).ask_count).write_volatile(ask_count as u32);
            std::ptr::addr_of_mut!((*header).timestamp_ns).write_volatile(now_nanos());
            std::ptr::addr_of_mut!((*header).ltp).write_volatile(book.last_trade_price() as f64);
            std::ptr::addr_of_mut!((*header).ltq).write_volatile(book.last_trade_qty() as f64);

            let levels = self.ptr.add(std::mem::size_of::<SharedHeader>()) as *mut Level;
            for i in 0..self.max_levels {
                let level = bids.get(i).map_or(Level::default(), |&(p, q)| Level {
                    price: p as f64,
                    qty: q as f64,
                });
                levels.add(i).write_volatile(level);
            }
            for i in 0..self.max_levels {
                let level = asks.get(i).map_or(Level::default(), |&(p, q)| Level {
                    price: p as f64,
                    qty: q as f64,
                });
                levels.add(self.max_levels + i).write_volatile(level);
            }
        }

        seq.store(start.wrapping_add(2), Ordering::Release);

        self.bids = bids;
        self.asks = asks;
    }
}

impl Drop for SnapshotWriter {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr as *mut libc::c_void, self.size);
            libc::close(self.fd);
        }
    }
}

/// One consistent copy of a region, as seen by a reader.
#[derive(Clone, Debug, Default)]
pub struct DepthSnapshot {
    pub sequence: u64,
    pub timestamp_ns: u64,
    pub ltp: f64,
    pub ltq: f64,
    pub bids: Vec<(f64, f64)>,
    pub asks: Vec<(f64, f64)>,
}

/// Read-only mapping used by the terminal viewer.
pub struct SnapshotReader {
    ptr: *const u8,
    size: usize,
    fd: libc::c_int,
    last_seq: u64,
}

unsafe impl Send for SnapshotReader {}

impl SnapshotReader {
    pub fn open(prefix: &str, token: InstrumentToken) -> anyhow::Result<Self> {
        let name = region_name(prefix, token);
        let cname = CString::new(name.clone()).context("region name")?;

        let fd = unsafe { libc::shm_open(cname.as_ptr(), libc::O_RDONLY, 0) };
        if fd == -1 {
            return Err(std::io::Error::last_os_error()).context(format!("shm_open {name}"));
        }
        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        if unsafe { libc::fstat(fd, &mut st) } == -1 {
            let err = std::io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(err).context(format!("fstat {name}"));
        }
        let size = st.st_size as usize;
        if size < std::mem::size_of::<SharedHeader>() {
            unsafe { libc::close(fd) };
            anyhow::bail!("region {name} too small ({size} bytes)");
        }
        let addr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            let err = std::io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(err).context(format!("mmap {name}"));
        }

        Ok(Self {
            ptr: addr as *const u8,
            size,
            fd,
            last_seq: 0,
        })
    }

    /// Copies the region if it changed since the last successful read.
    /// Returns `None` when unchanged, or when 64 retries failed to observe a
    /// stable sequence.
    pub fn read(&mut self) -> Option<DepthSnapshot> {
        let header = self.ptr as *const SharedHeader;
        let seq = unsafe { &*(std::ptr::addr_of!((*header).sequence) as *const AtomicU64) };

        for _ in 0..64 {
            let first = seq.load(Ordering::Acquire);
            if first & 1 == 1 {
                std::hint::spin_loop();
                continue;
            }
            if first == self.last_seq {
                return None;
            }

            let snapshot = unsafe { self.copy_body(header, first) };

            fence(Ordering::Acquire);
            if seq.load(Ordering::Relaxed) == first {
                self.last_seq = first;
                return Some(snapshot);
            }
        }
        warn!("snapshot read retries exhausted; writer too busy");
        None
    }

    unsafe fn copy_body(&self, header: *const SharedHeader, sequence: u64) -> DepthSnapshot {
        // Clamp everything against the mapped size so a torn or hostile
        // header can never take reads out of bounds.
        let level_space =
            (self.size - std::mem::size_of::<SharedHeader>()) / std::mem::size_of::<Level>();
        let max_levels =
            (std::ptr::addr_of!((*header).max_levels).read_volatile() as usize).min(level_space / 2);
        let bid_count =
            (std::ptr::addr_of!((*header).bid_count).read_volatile() as usize).min(max_levels);
        let ask_count =
            (std::ptr::addr_of!((*header).ask_count).read_volatile() as usize).min(max_levels);

        let mut snapshot = DepthSnapshot {
            sequence,
            timestamp_ns: std::ptr::addr_of!((*header).timestamp_ns).read_volatile(),
            ltp: std::ptr::addr_of!((*header).ltp).read_volatile(),
            ltq: std::ptr::addr_of!((*header).ltq).read_volatile(),
            bids: Vec::with_capacity(bid_count),
            asks: Vec::with_capacity(ask_count),
        };

        let levels = self.ptr.add(std::mem::size_of::<SharedHeader>()) as *const Level;
        for i in 0..bid_count {
            let level = levels.add(i).read_volatile();
            snapshot.bids.push((level.price, level.qty));
        }
        for i in 0..ask_count {
            let level = levels.add(max_levels + i).read_volatile();
            snapshot.asks.push((level.price, level.qty));
        }
        snapshot
    }
}

impl Drop for SnapshotReader {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr as *mut libc::c_void, self.size);
            libc::close(self.fd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::Order;
    use crate::types::Side;

    fn test_prefix() -> String {
        format!("/simex_test_{}", std::process::id())
    }

    #[test]
    fn region_names_are_slash_prefixed() {
        assert_eq!(region_name("/simex_book", 26000), "/simex_book_26000");
        assert_eq!(region_name("simex_book", 1), "/simex_book_1");
    }

    #[test]
    fn publish_and_read_round_trip() {
        let prefix = test_prefix();
        let token = 901;
        let mut book = OrderBook::default();
        book.set_instrument_token(token);
        book.submit(Order::limit(1, token, Side::Buy, 1000, 10)).unwrap();
        book.submit(Order::limit(2, token, Side::Buy, 1005, 20)).unwrap();
        book.submit(Order::limit(3, token, Side::Sell, 1010, 5)).unwrap();

        let mut writer =
            SnapshotWriter::create(&prefix, token, 8, Duration::from_millis(1)).unwrap();
        writer.publish(&book);

        let mut reader = SnapshotReader::open(&prefix, token).unwrap();
        let snapshot = reader.read().expect("first read sees data");
        assert_eq!(snapshot.sequence, 2);
        assert_eq!(snapshot.bids, vec![(1005.0, 20.0), (1000.0, 10.0)]);
        assert_eq!(snapshot.asks, vec![(1010.0, 5.0)]);
        assert!(snapshot.timestamp_ns > 0);

        // Unchanged region reads as None.
        assert!(reader.read().is_none());

        // Sequence is strictly increasing across publishes.
        writer.publish(&book);
        let next = reader.read().expect("second publish visible");
        assert_eq!(next.sequence, 4);

        unlink_region(&prefix, token);
    }

    #[test]
    fn ltp_and_ltq_cross_the_boundary_as_floats() {
        let prefix = test_prefix();
        let token = 902;
        let mut book = OrderBook::default();
        book.set_instrument_token(token);
        book.submit(Order::limit(1, token, Side::Sell, 1000, 5)).unwrap();
        book.submit(Order::limit(2, token, Side::Buy, 1000, 5)).unwrap();

        let mut writer =
            SnapshotWriter::create(&prefix, token, 4, Duration::from_millis(1)).unwrap();
        writer.publish(&book);

        let mut reader = SnapshotReader::open(&prefix, token).unwrap();
        let snapshot = reader.read().unwrap();
        assert_eq!(snapshot.ltp, 1000.0);
        assert_eq!(snapshot.ltq, 5.0);
        assert!(snapshot.bids.is_empty());
        assert!(snapshot.asks.is_empty());

        unlink_region(&prefix, token);
    }

    #[test]
    fn throttle_limits_publish_rate() {
        let prefix = test_prefix();
        let token = 903;
        let book = OrderBook::default();
        let mut writer =
            SnapshotWriter::create(&prefix, token, 4, Duration::from_secs(3600)).unwrap();

        writer.maybe_publish(&book);
        writer.maybe_publish(&book);
        writer.maybe_publish(&book);

        let mut reader = SnapshotReader::open(&prefix, token).unwrap();
        let snapshot = reader.read().unwrap();
        // Only the first call published within the hour-long interval.
        assert_eq!(snapshot.sequence, 2);

        unlink_region(&prefix, token);
    }
}
