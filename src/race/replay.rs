//! Instant-replay position history

use serde::{Deserialize, Serialize};

use crate::util::time::REPLAY_FPS;

/// One captured replay frame
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ReplayFrame {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub direction: f32,
    pub orientation: f32,
}

/// Fixed-capacity ring of frames captured at a fixed rate, independent of
/// how often `record` is called.
#[derive(Debug, Clone)]
pub struct ReplayBuffer {
    frames: Vec<ReplayFrame>,
    capacity: usize,
    /// Index the next frame is written to
    cursor: usize,
    used: usize,
    accumulator: f32,
    frame_interval: f32,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        Self::with_rate(capacity, REPLAY_FPS)
    }

    /// Buffer long enough to hold `seconds` of history at the default rate
    pub fn for_seconds(seconds: f32) -> Self {
        let frames = (seconds.max(0.0) * REPLAY_FPS as f32).ceil() as usize;
        Self::new(frames)
    }

    pub fn with_rate(capacity: usize, fps: u32) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: Vec::with_capacity(capacity),
            capacity,
            cursor: 0,
            used: 0,
            accumulator: 0.0,
            frame_interval: 1.0 / fps.max(1) as f32,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of frames currently held
    pub fn len(&self) -> usize {
        self.used
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Advance the capture clock by `dt` and store `frame` if a capture is due.
    /// Returns whether a frame was stored.
    pub fn record(&mut self, dt: f32, frame: ReplayFrame) -> bool {
        if !dt.is_finite() || dt <= 0.0 {
            return false;
        }
        self.accumulator += dt;
        if self.accumulator < self.frame_interval {
            return false;
        }
        // Never let a long stall queue up a burst of identical frames
        self.accumulator = (self.accumulator - self.frame_interval).min(self.frame_interval);
        self.push(frame);
        true
    }

    fn push(&mut self, frame: ReplayFrame) {
        if self.frames.len() < self.capacity {
            self.frames.push(frame);
        } else {
            self.frames[self.cursor] = frame;
        }
        self.cursor = (self.cursor + 1) % self.capacity;
        self.used = (self.used + 1).min(self.capacity);
    }

    /// Frame captured `frames_ago` captures before the latest (0 = latest)
    pub fn frame_ago(&self, frames_ago: usize) -> Option<&ReplayFrame> {
        if frames_ago >= self.used {
            return None;
        }
        let index = (self.cursor + self.capacity - 1 - frames_ago) % self.capacity;
        self.frames.get(index)
    }

    /// Frame closest to `seconds` ago, clamped to the oldest available
    pub fn lookback(&self, seconds: f32) -> Option<&ReplayFrame> {
        if self.used == 0 {
            return None;
        }
        let frames_ago = (seconds.max(0.0) / self.frame_interval).round() as usize;
        self.frame_ago(frames_ago.min(self.used - 1))
    }

    /// Frames from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &ReplayFrame> + '_ {
        (0..self.used).rev().filter_map(move |ago| self.frame_ago(ago))
    }

    pub fn clear(&mut self) {
        self.frames.clear();
        self.cursor = 0;
        self.used = 0;
        self.accumulator = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(x: f32) -> ReplayFrame {
        ReplayFrame {
            x,
            ..Default::default()
        }
    }

    #[test]
    fn captures_at_fixed_rate_regardless_of_tick_rate() {
        let mut buffer = ReplayBuffer::new(1000);
        // 50 Hz ticks for 2 seconds capture 25 Hz frames
        let mut stored = 0;
        for i in 0..100 {
            if buffer.record(0.02, frame(i as f32)) {
                stored += 1;
            }
        }
        assert!((49..=51).contains(&stored), "stored {stored}");
        assert_eq!(buffer.len(), stored);
    }

    #[test]
    fn wraps_and_keeps_latest_frames() {
        let mut buffer = ReplayBuffer::with_rate(4, 10);
        for i in 0..10 {
            assert!(buffer.record(0.1001, frame(i as f32)));
        }
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.frame_ago(0).unwrap().x, 9.0);
        assert_eq!(buffer.frame_ago(3).unwrap().x, 6.0);
        assert!(buffer.frame_ago(4).is_none());

        let ordered: Vec<f32> = buffer.iter().map(|f| f.x).collect();
        assert_eq!(ordered, vec![6.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn lookback_clamps_to_oldest() {
        let mut buffer = ReplayBuffer::with_rate(8, 10);
        for i in 0..5 {
            buffer.record(0.1001, frame(i as f32));
        }
        assert_eq!(buffer.lookback(0.0).unwrap().x, 4.0);
        assert_eq!(buffer.lookback(0.2).unwrap().x, 2.0);
        assert_eq!(buffer.lookback(60.0).unwrap().x, 0.0);
    }

    #[test]
    fn long_stall_stores_one_frame() {
        let mut buffer = ReplayBuffer::with_rate(8, 10);
        assert!(buffer.record(5.0, frame(1.0)));
        assert!(buffer.record(0.0001, frame(2.0)));
        assert!(!buffer.record(0.0001, frame(3.0)));
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn clear_empties_buffer() {
        let mut buffer = ReplayBuffer::for_seconds(2.0);
        assert_eq!(buffer.capacity(), 50);
        buffer.record(1.0, frame(1.0));
        buffer.clear();
        assert!(buffer.is_empty());
        assert!(buffer.lookback(0.0).is_none());
    }
}
