//! Game control module
//!
//! This module contains the state machine that drives the application
//! through its menu and battle screens, and the state it publishes.

pub mod controller;
pub mod state;

use crate::android::DeviceError;
use crate::vision::VisionError;

pub use controller::Controller;
pub use state::{BattleSession, BotSnapshot, BotState, ControlState, StatusBoard};

/// Failures that abort a single decision tick
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    #[error("Timed out after {waited_ms} ms waiting for {what}")]
    ActionTimeout { what: &'static str, waited_ms: u64 },
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
    #[error("Vision error: {0}")]
    Vision(#[from] VisionError),
}
