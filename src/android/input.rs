//! Touch action generation and dispatch
//!
//! Builds [`BotAction`] sequences from layout coordinates and executes them
//! on the attached [`Device`].

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::device::{Device, DeviceError};
use crate::config::Point;
use crate::BotAction;

/// Generate a tap on a layout point
pub fn tap(point: Point) -> BotAction {
    BotAction::Tap {
        x: point.x,
        y: point.y,
    }
}

/// Generate a long-press: a swipe that starts and ends on the same point
pub fn long_press(point: Point, duration_ms: u32) -> BotAction {
    BotAction::Swipe {
        start_x: point.x,
        start_y: point.y,
        end_x: point.x,
        end_y: point.y,
        duration_ms,
    }
}

/// Generate taps on each point in order, with an optional pause between them
pub fn tap_sequence(points: &[Point], delay_ms: u64) -> Vec<BotAction> {
    let mut actions = Vec::with_capacity(points.len() * 2);

    for (i, &point) in points.iter().enumerate() {
        if i > 0 && delay_ms > 0 {
            actions.push(BotAction::Wait {
                duration_ms: delay_ms,
            });
        }
        actions.push(tap(point));
    }

    actions
}

/// Executes actions on the device
#[derive(Clone)]
pub struct ActionDispatcher {
    device: Arc<dyn Device>,
}

impl ActionDispatcher {
    /// Create a new dispatcher for a device
    pub fn new(device: Arc<dyn Device>) -> Self {
        Self { device }
    }

    /// Execute a single action
    pub fn dispatch(&self, action: &BotAction) -> Result<(), DeviceError> {
        log::debug!("Dispatching {:?}", action);

        match *action {
            BotAction::Tap { x, y } => self.device.tap(x, y),
            BotAction::Swipe {
                start_x,
                start_y,
                end_x,
                end_y,
                duration_ms,
            } => self
                .device
                .swipe(start_x, start_y, end_x, end_y, duration_ms),
            BotAction::Wait { duration_ms } => {
                thread::sleep(Duration::from_millis(duration_ms));
                Ok(())
            }
        }
    }

    /// Execute actions in order, stopping at the first failure
    pub fn dispatch_all(&self, actions: &[BotAction]) -> Result<(), DeviceError> {
        actions.iter().try_for_each(|action| self.dispatch(action))
    }

    /// Tap a layout point
    pub fn tap(&self, point: Point) -> Result<(), DeviceError> {
        self.dispatch(&tap(point))
    }

    /// Long-press a layout point
    pub fn long_press(&self, point: Point, duration_ms: u32) -> Result<(), DeviceError> {
        self.dispatch(&long_press(point, duration_ms))
    }

    /// Force-stop an application package
    pub fn force_stop(&self, package: &str) -> Result<(), DeviceError> {
        log::info!("Stopping {}...", package);
        self.device.force_stop(package)
    }

    /// Launch an application package
    pub fn launch(&self, package: &str) -> Result<(), DeviceError> {
        log::info!("Starting {}...", package);
        self.device.launch(package)
    }
}
