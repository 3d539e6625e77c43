//! Screen capture handling
//!
//! Acquires frames from the device, keeps a bounded history of recent
//! frames for stuck detection and serves fresh frames to the control loop.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::{Frame, VisionError};
use crate::android::Device;
use crate::config::BotConfig;

/// Frames kept in history
pub const HISTORY_CAPACITY: usize = 60;

/// Fixed-capacity, insertion-ordered buffer of frames
#[derive(Debug)]
pub struct FrameHistory {
    frames: VecDeque<Arc<Frame>>,
    capacity: usize,
}

impl FrameHistory {
    /// Create an empty history holding at most `capacity` frames
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a frame, evicting the oldest one when full
    pub fn push(&mut self, frame: Arc<Frame>) {
        if self.frames.len() == self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Newest frame
    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.frames.back().cloned()
    }

    /// Handles to every frame, oldest first
    pub fn snapshot(&self) -> Vec<Arc<Frame>> {
        self.frames.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

impl Default for FrameHistory {
    fn default() -> Self {
        Self::new(HISTORY_CAPACITY)
    }
}

/// Frame history shared between the capture and decision schedules
pub type SharedHistory = Arc<Mutex<FrameHistory>>;

/// Lock a shared history, recovering it if a holder panicked
pub fn lock_history(history: &SharedHistory) -> MutexGuard<'_, FrameHistory> {
    history.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Acquires frames from the device
#[derive(Clone)]
pub struct FrameSource {
    device: Arc<dyn Device>,
    history: SharedHistory,
    /// Oldest history frame `current` hands out without capturing
    max_age: Duration,
}

impl FrameSource {
    /// Create a new frame source
    pub fn new(device: Arc<dyn Device>, capacity: usize, max_age: Duration) -> Self {
        Self {
            device,
            history: Arc::new(Mutex::new(FrameHistory::new(capacity))),
            max_age,
        }
    }

    /// Shared handle to the frame history
    pub fn history(&self) -> SharedHistory {
        Arc::clone(&self.history)
    }

    /// Capture a frame and append it to the history
    pub fn poll(&self) -> Result<Arc<Frame>, VisionError> {
        let frame = Arc::new(Frame::new(self.device.capture()?));
        lock_history(&self.history).push(Arc::clone(&frame));
        Ok(frame)
    }

    /// The newest frame, captured now if the history has nothing recent
    pub fn current(&self) -> Result<Arc<Frame>, VisionError> {
        let latest = lock_history(&self.history).latest();
        match latest {
            Some(frame) if frame.age() < self.max_age => Ok(frame),
            _ => self.poll(),
        }
    }

    /// Capture a frame for OCR. It is not added to the history so reads
    /// never skew stuck detection.
    pub fn numeric(&self) -> Result<Frame, VisionError> {
        Ok(Frame::new(self.device.capture()?))
    }

    pub fn clear_history(&self) {
        lock_history(&self.history).clear();
    }

    /// Start the capture schedule.
    ///
    /// Captures every `period` until the bot stops. A failed capture is
    /// logged and skipped.
    pub fn spawn_capture_loop(&self, period: Duration, config: Arc<BotConfig>) -> JoinHandle<()> {
        let source = self.clone();

        thread::spawn(move || {
            let mut failures: u64 = 0;
            while config.is_running() {
                match source.poll() {
                    Ok(_) => failures = 0,
                    Err(e) => {
                        failures += 1;
                        // One line per failure streak is enough
                        if failures == 1 {
                            log::warn!("Error capturing screen: {}", e);
                        } else {
                            log::debug!("Capture failure #{}: {}", failures, e);
                        }
                    }
                }
                thread::sleep(period);
            }
            log::debug!("Capture loop stopped");
        })
    }
}
