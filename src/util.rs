//! Small runtime helpers shared by the engine and the binaries.

use std::sync::atomic::{AtomicBool, Ordering};

/// One-way shutdown flag raised from signal handlers.
#[derive(Default)]
pub struct ShutdownFlag(AtomicBool);

impl ShutdownFlag {
    #[inline]
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Pins the current thread to a core index, when one is configured and the
/// platform exposes it. Best effort.
pub fn pin_to_core(core_index: Option<usize>) {
    if let Some(index) = core_index {
        if let Some(cores) = core_affinity::get_core_ids() {
            if let Some(core) = cores.into_iter().find(|core| core.id == index) {
                let _ = core_affinity::set_for_current(core);
            }
        }
    }
}

/// System-clock nanoseconds since the epoch, for snapshot timestamps.
#[inline]
pub fn now_nanos() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_secs() * 1_000_000_000 + u64::from(elapsed.subsec_nanos()),
        Err(_) => 0,
    }
}
