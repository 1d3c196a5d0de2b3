//! Dispatcher - multicast ingest fanned out to per-instrument queues.
//!
//! One thread receives datagrams, parses the wire format, and routes each
//! order to its instrument's SPSC queue. Orders for unknown instruments and
//! malformed lines are dropped with a warning. A full queue is handled with
//! spin-then-yield pushes; the dispatcher never drops an order for a known
//! instrument.

use std::net::UdpSocket;

use log::warn;
use rustc_hash::FxHashMap;

use crate::types::InstrumentToken;
use crate::util::ShutdownFlag;
use crate::wire::{parse_line, WireOrder};

/// Capacity of each dispatcher-to-engine queue.
pub const QUEUE_CAPACITY: usize = 10_240;

pub struct Dispatcher {
    socket: UdpSocket,
    queues: FxHashMap<InstrumentToken, rtrb::Producer<WireOrder>>,
}

impl Dispatcher {
    pub fn new(
        socket: UdpSocket,
        queues: FxHashMap<InstrumentToken, rtrb::Producer<WireOrder>>,
    ) -> Self {
        Self { socket, queues }
    }

    /// Receive loop; returns once the shutdown flag is raised. The socket
    /// carries a read timeout so the flag is polled even when quiet.
    pub fn run(&mut self, shutdown: &ShutdownFlag) {
        let mut buf = [0u8; 2048];
        while !shutdown.is_raised() {
            match self.socket.recv_from(&mut buf) {
                Ok((len, _)) => self.handle_payload(&buf[..len], shutdown),
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(e) => {
                    warn!("dispatcher receive failed: {e}");
                }
            }
        }
    }

    fn handle_payload(&mut self, payload: &[u8], shutdown: &ShutdownFlag) {
        let Ok(text) = std::str::from_utf8(payload) else {
            warn!("dropping non-utf8 payload ({} bytes)", payload.len());
            return;
        };
        let Some(order) = parse_line(text) else {
            warn!("dropping malformed order line {:?}", text.trim_end());
            return;
        };
        let Some(queue) = self.queues.get_mut(&order.instrument) else {
            warn!("dropping order {} for unknown instrument {}", order.order_id, order.instrument);
            return;
        };

        let mut pending = order;
        let mut spins: u32 = 0;
        loop {
            match queue.push(pending) {
                Ok(()) => return,
                Err(rtrb::PushError::Full(back)) => {
                    pending = back;
                    spins = spins.wrapping_add(1);
                    if spins % 1000 == 0 {
                        if shutdown.is_raised() {
                            return;
                        }
                        std::thread::yield_now();
                    }
                }
            }
        }
    }
}
