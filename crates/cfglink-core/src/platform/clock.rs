//! Monotonic uptime and host-settable wall clock.

use std::time::Instant;

use tracing::info;

/// Reset reason codes reported in the `UPTIME` reply.
pub mod reset_reason {
    pub const UNKNOWN: u8 = 0;
    pub const POWER_ON: u8 = 1;
    pub const EXTERNAL_PIN: u8 = 2;
    pub const SOFTWARE: u8 = 3;
    pub const PANIC: u8 = 4;
    pub const WATCHDOG: u8 = 5;
    pub const DEEP_SLEEP: u8 = 6;
    pub const BROWNOUT: u8 = 7;
}

/// Time source consumed by the engine.
pub trait Clock: Send {
    /// Adopt the host's wall clock (milliseconds since the Unix epoch).
    fn set_realtime_ms(&mut self, epoch_ms: u64);

    /// Microseconds since boot.
    fn monotonic_micros(&self) -> u64;

    /// Why the device last reset.
    fn last_reset_reason(&self) -> u8;
}

/// Process-lifetime clock: uptime counts from construction.
pub struct SystemClock {
    started: Instant,
    reset_reason: u8,
    realtime_anchor_ms: Option<u64>,
}

impl SystemClock {
    pub fn new(reset_reason: u8) -> Self {
        Self {
            started: Instant::now(),
            reset_reason,
            realtime_anchor_ms: None,
        }
    }

    /// The host-provided epoch, if one was adopted.
    pub fn realtime_anchor_ms(&self) -> Option<u64> {
        self.realtime_anchor_ms
    }
}

impl Clock for SystemClock {
    fn set_realtime_ms(&mut self, epoch_ms: u64) {
        info!(epoch_ms, "Wall clock set from host");
        self.realtime_anchor_ms = Some(epoch_ms);
    }

    fn monotonic_micros(&self) -> u64 {
        self.started.elapsed().as_micros() as u64
    }

    fn last_reset_reason(&self) -> u8 {
        self.reset_reason
    }
}

/// Deterministic clock for tests. Clones share the adopted wall clock so a
/// test can inspect it after the engine takes ownership.
#[derive(Clone)]
pub struct FixedClock {
    micros: u64,
    reset_reason: u8,
    realtime_ms: std::sync::Arc<std::sync::Mutex<Option<u64>>>,
}

impl FixedClock {
    pub fn new(micros: u64, reset_reason: u8) -> Self {
        Self {
            micros,
            reset_reason,
            realtime_ms: Default::default(),
        }
    }

    pub fn realtime_ms(&self) -> Option<u64> {
        *self.realtime_ms.lock().unwrap()
    }
}

impl Clock for FixedClock {
    fn set_realtime_ms(&mut self, epoch_ms: u64) {
        *self.realtime_ms.lock().unwrap() = Some(epoch_ms);
    }

    fn monotonic_micros(&self) -> u64 {
        self.micros
    }

    fn last_reset_reason(&self) -> u8 {
        self.reset_reason
    }
}
