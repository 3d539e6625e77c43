//! Android device module
//!
//! Provides the device control surface and the dispatcher that turns bot
//! actions into taps and swipes on the attached device.

pub mod device;
pub mod input;

pub use device::{AdbDevice, Device, DeviceError};
pub use input::ActionDispatcher;
