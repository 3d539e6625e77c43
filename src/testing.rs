//! Test doubles and synthetic rasters shared by the unit tests

use std::collections::VecDeque;
use std::io;
use std::sync::Mutex;

use image::{imageops, GrayImage, Luma};

use crate::android::{Device, DeviceError};
use crate::vision::{Ocr, OcrError};

fn mix(x: u32, y: u32, seed: u32) -> u32 {
    let mut v = x.wrapping_mul(0x9E37_79B1)
        ^ y.wrapping_mul(0x85EB_CA77)
        ^ seed.wrapping_mul(0xC2B2_AE3D).wrapping_add(0x27D4_EB2F);
    v ^= v >> 15;
    v = v.wrapping_mul(0x2C1B_3C6D);
    v ^= v >> 12;
    v = v.wrapping_mul(0x297A_2D39);
    v ^= v >> 15;
    v
}

/// Deterministic per-pixel noise
pub fn noise(width: u32, height: u32, seed: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| Luma([(mix(x, y, seed) >> 24) as u8]))
}

/// Deterministic noise made of `block`-sized squares
pub fn blocks(width: u32, height: u32, block: u32, seed: u32) -> GrayImage {
    let block = block.max(1);
    GrayImage::from_fn(width, height, |x, y| {
        Luma([(mix(x / block, y / block, seed) >> 24) as u8])
    })
}

/// Copy `src` into `dst` with its top-left corner at (x, y)
pub fn paste(dst: &mut GrayImage, src: &GrayImage, x: u32, y: u32) {
    imageops::replace(dst, src, i64::from(x), i64::from(y));
}

/// A device call recorded by [`ScriptedDevice`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCall {
    Tap(i32, i32),
    Swipe(i32, i32, i32, i32, u32),
    ForceStop(String),
    Launch(String),
}

struct Transition {
    from: usize,
    x: i32,
    y: i32,
    radius: i32,
    to: usize,
}

struct DeviceState {
    screens: Vec<GrayImage>,
    current: usize,
    transitions: Vec<Transition>,
    launch_screen: Option<usize>,
    calls: Vec<DeviceCall>,
    captures: usize,
    offline: bool,
}

/// Fake device showing one of a fixed set of screens.
///
/// Taps near a configured point switch the displayed screen, which lets
/// tests walk the bot through the application's screen flow.
pub struct ScriptedDevice {
    state: Mutex<DeviceState>,
}

impl ScriptedDevice {
    pub fn new(screens: Vec<GrayImage>) -> Self {
        assert!(!screens.is_empty(), "ScriptedDevice needs a screen");
        Self {
            state: Mutex::new(DeviceState {
                screens,
                current: 0,
                transitions: Vec::new(),
                launch_screen: None,
                calls: Vec::new(),
                captures: 0,
                offline: false,
            }),
        }
    }

    /// Single black screen
    pub fn blank(width: u32, height: u32) -> Self {
        Self::new(vec![GrayImage::from_pixel(width, height, Luma([0]))])
    }

    /// Switch from screen `from` to `to` on a tap within `radius` of (x, y)
    pub fn on_tap(self, from: usize, (x, y): (i32, i32), radius: i32, to: usize) -> Self {
        self.state.lock().unwrap().transitions.push(Transition {
            from,
            x,
            y,
            radius,
            to,
        });
        self
    }

    /// Show `screen` after the application is launched
    pub fn on_launch(self, screen: usize) -> Self {
        self.state.lock().unwrap().launch_screen = Some(screen);
        self
    }

    pub fn show(&self, screen: usize) {
        self.state.lock().unwrap().current = screen;
    }

    pub fn screen(&self) -> usize {
        self.state.lock().unwrap().current
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn taps(&self) -> Vec<(i32, i32)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                DeviceCall::Tap(x, y) => Some((x, y)),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn capture_count(&self) -> usize {
        self.state.lock().unwrap().captures
    }

    fn offline_error() -> DeviceError {
        DeviceError::Io(io::Error::new(io::ErrorKind::NotConnected, "device offline"))
    }
}

impl Device for ScriptedDevice {
    fn capture(&self) -> Result<GrayImage, DeviceError> {
        let mut state = self.state.lock().unwrap();
        if state.offline {
            return Err(Self::offline_error());
        }
        state.captures += 1;
        Ok(state.screens[state.current].clone())
    }

    fn tap(&self, x: i32, y: i32) -> Result<(), DeviceError> {
        let mut state = self.state.lock().unwrap();
        if state.offline {
            return Err(Self::offline_error());
        }
        state.calls.push(DeviceCall::Tap(x, y));

        let current = state.current;
        let next = state
            .transitions
            .iter()
            .find(|t| {
                t.from == current && (t.x - x).abs() <= t.radius && (t.y - y).abs() <= t.radius
            })
            .map(|t| t.to);
        if let Some(next) = next {
            state.current = next;
        }
        Ok(())
    }

    fn swipe(
        &self,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        duration_ms: u32,
    ) -> Result<(), DeviceError> {
        let mut state = self.state.lock().unwrap();
        if state.offline {
            return Err(Self::offline_error());
        }
        state
            .calls
            .push(DeviceCall::Swipe(x1, y1, x2, y2, duration_ms));
        Ok(())
    }

    fn force_stop(&self, package: &str) -> Result<(), DeviceError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(DeviceCall::ForceStop(package.to_string()));
        Ok(())
    }

    fn launch(&self, package: &str) -> Result<(), DeviceError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(DeviceCall::Launch(package.to_string()));
        if let Some(screen) = state.launch_screen {
            state.current = screen;
        }
        Ok(())
    }
}

/// Fake OCR backend returning scripted text
pub struct ScriptedOcr {
    replies: Mutex<VecDeque<String>>,
    fallback: Option<String>,
    seen: Mutex<Vec<(u32, u32)>>,
}

impl ScriptedOcr {
    /// Always read `text`
    pub fn constant(text: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: Some(text.to_string()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Read `texts` in order, then empty text
    pub fn sequence(texts: &[&str]) -> Self {
        Self {
            replies: Mutex::new(texts.iter().map(|t| t.to_string()).collect()),
            fallback: Some(String::new()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Every recognition fails
    pub fn failing() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Dimensions of every crop handed to the backend
    pub fn seen_sizes(&self) -> Vec<(u32, u32)> {
        self.seen.lock().unwrap().clone()
    }
}

impl Ocr for ScriptedOcr {
    fn recognize(&self, image: &GrayImage) -> Result<String, OcrError> {
        self.seen.lock().unwrap().push(image.dimensions());
        if let Some(reply) = self.replies.lock().unwrap().pop_front() {
            return Ok(reply);
        }
        self.fallback
            .clone()
            .ok_or_else(|| OcrError::Failed("scripted failure".to_string()))
    }
}
