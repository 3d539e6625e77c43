//! Frozen screen detection

use std::sync::Arc;

use super::capture::{lock_history, SharedHistory};
use super::matcher::correlation;
use super::Frame;
use crate::config::StuckSettings;

/// Detects runs of near-identical frames in the history
#[derive(Debug, Clone)]
pub struct StuckDetector {
    min_frames: usize,
    similarity: f32,
}

impl StuckDetector {
    pub fn new(min_frames: usize, similarity: f32) -> Self {
        Self {
            min_frames: min_frames.max(2),
            similarity,
        }
    }

    pub fn from_settings(settings: &StuckSettings) -> Self {
        Self::new(settings.min_frames, settings.similarity)
    }

    /// Number of consecutive frames before the newest one that look like it.
    ///
    /// Walks backward from the second-newest frame and stops at the first
    /// frame whose correlation with the newest is not above the similarity.
    pub fn similar_run(&self, frames: &[Arc<Frame>]) -> usize {
        let Some((reference, older)) = frames.split_last() else {
            return 0;
        };

        older
            .iter()
            .rev()
            .take_while(|frame| correlation(reference.image(), frame.image()) > self.similarity)
            .count()
    }

    /// Check frames (oldest first) for a frozen screen
    pub fn is_stuck(&self, frames: &[Arc<Frame>]) -> bool {
        if frames.len() < self.min_frames {
            return false;
        }

        let run = self.similar_run(frames);
        log::trace!("Similar frame run: {}", run);
        run >= self.min_frames - 1
    }

    /// Check the shared history. The lock is held only to copy the frame
    /// handles.
    pub fn check(&self, history: &SharedHistory) -> bool {
        let frames = lock_history(history).snapshot();
        self.is_stuck(&frames)
    }
}

impl Default for StuckDetector {
    fn default() -> Self {
        Self::from_settings(&StuckSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::noise;
    use crate::vision::FrameHistory;
    use std::sync::Mutex;

    fn frames(count: usize, seed_of: impl Fn(usize) -> u32) -> Vec<Arc<Frame>> {
        (0..count)
            .map(|i| Arc::new(Frame::new(noise(32, 32, seed_of(i)))))
            .collect()
    }

    #[test]
    fn test_identical_frames_are_stuck() {
        let detector = StuckDetector::default();
        let frames = frames(50, |_| 3);

        assert_eq!(detector.similar_run(&frames), 49);
        assert!(detector.is_stuck(&frames));
    }

    #[test]
    fn test_recent_change_breaks_the_run() {
        let detector = StuckDetector::default();
        let frames = frames(50, |i| if i == 40 { 4 } else { 3 });

        assert_eq!(detector.similar_run(&frames), 8);
        assert!(!detector.is_stuck(&frames));
    }

    #[test]
    fn test_short_history_is_never_stuck() {
        let detector = StuckDetector::default();
        assert!(!detector.is_stuck(&frames(49, |_| 3)));
        assert_eq!(detector.similar_run(&[]), 0);
    }

    #[test]
    fn test_different_dimensions_are_dissimilar() {
        let detector = StuckDetector::default();
        let mut frames = frames(50, |_| 3);
        frames[48] = Arc::new(Frame::new(noise(16, 16, 3)));

        assert_eq!(detector.similar_run(&frames), 0);
    }

    #[test]
    fn test_check_reads_shared_history() {
        let detector = StuckDetector::new(5, 0.95);
        let mut history = FrameHistory::new(10);
        for frame in frames(6, |_| 9) {
            history.push(frame);
        }
        let shared = Arc::new(Mutex::new(history));

        assert!(detector.check(&shared));
        lock_history(&shared).push(Arc::new(Frame::new(noise(32, 32, 10))));
        assert!(!detector.check(&shared));
    }
}
