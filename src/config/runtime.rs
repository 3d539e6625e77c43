//! Runtime flags shared between the operator console and the control loop
//!
//! Every field is an atomic so the operator thread can flip flags without
//! locking. The control loop only samples them at the top of a tick.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Operator-controlled bot configuration
#[derive(Debug)]
pub struct BotConfig {
    paused: AtomicBool,
    upgrade_enabled: AtomicBool,
    troop: AtomicU8,
    debug: AtomicBool,
    log_pinned: AtomicBool,
    running: AtomicBool,
}

impl BotConfig {
    pub fn new(troop: u8, upgrade_enabled: bool) -> Self {
        Self {
            paused: AtomicBool::new(false),
            upgrade_enabled: AtomicBool::new(upgrade_enabled),
            troop: AtomicU8::new(troop),
            debug: AtomicBool::new(false),
            log_pinned: AtomicBool::new(false),
            running: AtomicBool::new(true),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    /// Flip the pause flag, returning the new value
    pub fn toggle_pause(&self) -> bool {
        !self.paused.fetch_xor(true, Ordering::Relaxed)
    }

    pub fn upgrade_enabled(&self) -> bool {
        self.upgrade_enabled.load(Ordering::Relaxed)
    }

    /// Flip the upgrade flag, returning the new value
    pub fn toggle_upgrade(&self) -> bool {
        !self.upgrade_enabled.fetch_xor(true, Ordering::Relaxed)
    }

    /// Selected troop index. May be out of range; the layout falls back.
    pub fn troop(&self) -> u8 {
        self.troop.load(Ordering::Relaxed)
    }

    pub fn set_troop(&self, troop: u8) {
        self.troop.store(troop, Ordering::Relaxed);
    }

    pub fn debug(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    pub fn set_debug(&self, debug: bool) {
        self.debug.store(debug, Ordering::Relaxed);
    }

    /// Flip the debug flag, returning the new value
    pub fn toggle_debug(&self) -> bool {
        !self.debug.fetch_xor(true, Ordering::Relaxed)
    }

    /// Whether the log level was fixed at startup (e.g. by `RUST_LOG`)
    /// and must not follow the debug flag
    pub fn log_pinned(&self) -> bool {
        self.log_pinned.load(Ordering::Relaxed)
    }

    pub fn set_log_pinned(&self, pinned: bool) {
        self.log_pinned.store(pinned, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Ask every schedule to stop at its next iteration
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self::new(2, true)
    }
}
