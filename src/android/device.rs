//! Device control surface
//!
//! The [`Device`] trait is everything the bot needs from the phone. The
//! [`AdbDevice`] backend drives a single attached device through the `adb`
//! command line tool.

use std::path::{Path, PathBuf};
use std::process::Command;

use image::GrayImage;

/// Operations the control loop performs on the attached device
pub trait Device: Send + Sync {
    /// Capture the current display as a grayscale raster
    fn capture(&self) -> Result<GrayImage, DeviceError>;

    /// Tap at a screen coordinate
    fn tap(&self, x: i32, y: i32) -> Result<(), DeviceError>;

    /// Swipe between two coordinates. A swipe that starts and ends on the
    /// same point is a long-press.
    fn swipe(&self, x1: i32, y1: i32, x2: i32, y2: i32, duration_ms: u32)
        -> Result<(), DeviceError>;

    /// Force-stop an application package
    fn force_stop(&self, package: &str) -> Result<(), DeviceError>;

    /// Launch an application package
    fn launch(&self, package: &str) -> Result<(), DeviceError>;
}

/// Device errors
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Expected exactly one attached device, found {0}")]
    NoDevice(usize),
    #[error("Device {0} is not attached")]
    NotFound(String),
    #[error("Failed to run adb: {0}")]
    Io(#[from] std::io::Error),
    #[error("adb {command} failed ({status}): {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },
    #[error("Failed to decode screen capture: {0}")]
    Decode(#[from] image::ImageError),
}

/// Device backend that shells out to `adb`
pub struct AdbDevice {
    /// Path to the adb executable
    adb: PathBuf,
    /// Serial of the device every command targets
    serial: String,
}

impl AdbDevice {
    /// Connect to the attached device.
    ///
    /// With no serial, exactly one device must be attached.
    pub fn connect(adb: impl Into<PathBuf>, serial: Option<&str>) -> Result<Self, DeviceError> {
        let adb = adb.into();
        let devices = list_devices(&adb)?;
        let serial = select_device(&devices, serial)?;
        log::info!("Using device {}", serial);
        Ok(Self { adb, serial })
    }

    /// Serial of the connected device
    pub fn serial(&self) -> &str {
        &self.serial
    }

    fn run(&self, args: &[&str]) -> Result<Vec<u8>, DeviceError> {
        let output = Command::new(&self.adb)
            .arg("-s")
            .arg(&self.serial)
            .args(args)
            .output()?;

        if !output.status.success() {
            return Err(DeviceError::CommandFailed {
                command: args.join(" "),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output.stdout)
    }

    fn shell(&self, command: &str) -> Result<(), DeviceError> {
        self.run(&["shell", command]).map(|_| ())
    }
}

impl Device for AdbDevice {
    fn capture(&self) -> Result<GrayImage, DeviceError> {
        let png = self.run(&["exec-out", "screencap", "-p"])?;
        let image = image::load_from_memory(&png)?;
        Ok(image.to_luma8())
    }

    fn tap(&self, x: i32, y: i32) -> Result<(), DeviceError> {
        self.shell(&format!("input tap {} {}", x, y))
    }

    fn swipe(
        &self,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        duration_ms: u32,
    ) -> Result<(), DeviceError> {
        self.shell(&format!(
            "input touchscreen swipe {} {} {} {} {}",
            x1, y1, x2, y2, duration_ms
        ))
    }

    fn force_stop(&self, package: &str) -> Result<(), DeviceError> {
        self.shell(&format!("am force-stop {}", package))
    }

    fn launch(&self, package: &str) -> Result<(), DeviceError> {
        self.shell(&format!(
            "monkey -p {} -c android.intent.category.LAUNCHER 1",
            package
        ))
    }
}

/// List the serials of attached devices in the `device` state
pub fn list_devices(adb: &Path) -> Result<Vec<String>, DeviceError> {
    let output = Command::new(adb).arg("devices").output()?;
    if !output.status.success() {
        return Err(DeviceError::CommandFailed {
            command: "devices".to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(parse_device_list(&String::from_utf8_lossy(&output.stdout)))
}

/// Parse the output of `adb devices`
fn parse_device_list(output: &str) -> Vec<String> {
    output
        .lines()
        .skip_while(|line| !line.starts_with("List of devices"))
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some(serial), Some("device")) => Some(serial.to_string()),
                _ => None,
            }
        })
        .collect()
}

/// Pick the device to drive
fn select_device(devices: &[String], serial: Option<&str>) -> Result<String, DeviceError> {
    match serial {
        Some(wanted) => devices
            .iter()
            .find(|d| d.as_str() == wanted)
            .cloned()
            .ok_or_else(|| DeviceError::NotFound(wanted.to_string())),
        None => match devices {
            [only] => Ok(only.clone()),
            _ => Err(DeviceError::NoDevice(devices.len())),
        },
    }
}
