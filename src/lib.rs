//! Warden - screen-driven battle and upgrade automation for Android
//!
//! This library pilots a mobile game purely through its rendered screen:
//! it captures the display over adb, classifies screens by template
//! matching, reads gold amounts with OCR and taps its way through the
//! menu and battle cycle.
//!
//! ## Recovery
//!
//! A frozen screen is detected from the frame history and handled by the
//! configured [`config::StuckRecovery`] policy.

pub mod ai;
pub mod android;
pub mod config;
pub mod game;
pub mod operator;
pub mod vision;

#[cfg(test)]
mod testing;

/// Touch actions sent to the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotAction {
    /// Tap at a specific screen coordinate
    Tap { x: i32, y: i32 },
    /// Swipe from one point to another
    Swipe {
        start_x: i32,
        start_y: i32,
        end_x: i32,
        end_y: i32,
        duration_ms: u32,
    },
    /// Wait for a specified duration
    Wait { duration_ms: u64 },
}
