//! Frame-accurate timestamps
//!
//! A `Timestamp` is a position or duration expressed as a number of frames at
//! a given framerate. Two timestamps compare equal when they describe the same
//! point in time, even if their framerates differ.

use std::cmp::Ordering;
use std::fmt;

/// A frame count at a fixed framerate
#[derive(Debug, Clone, Copy)]
pub struct Timestamp {
    frames: i64,
    framerate: u32,
}

impl Timestamp {
    /// Create a timestamp from milliseconds, expressed at `framerate`
    ///
    /// Fractional frames are rounded down.
    pub fn new(msecs: i64, framerate: u32) -> Self {
        let framerate = framerate.max(1);
        let frames = (msecs as i128 * framerate as i128).div_euclid(1000) as i64;
        Self { frames, framerate }
    }

    /// Create a timestamp from a raw frame count
    pub fn from_frames(frames: i64, framerate: u32) -> Self {
        Self {
            frames,
            framerate: framerate.max(1),
        }
    }

    /// Zero at the given framerate
    pub fn zero(framerate: u32) -> Self {
        Self::from_frames(0, framerate)
    }

    pub fn framerate(&self) -> u32 {
        self.framerate
    }

    pub fn total_frames(&self) -> i64 {
        self.frames
    }

    /// Whole milliseconds, rounded down
    pub fn msecs(&self) -> i64 {
        (self.frames as i128 * 1000).div_euclid(self.framerate as i128) as i64
    }

    /// Express the same point in time at another framerate, rounding down
    pub fn convert_to_framerate(&self, framerate: u32) -> Self {
        let framerate = framerate.max(1);
        if framerate == self.framerate {
            return *self;
        }
        let frames = (self.frames as i128 * framerate as i128)
            .div_euclid(self.framerate as i128) as i64;
        Self { frames, framerate }
    }

    pub fn add_frames(&self, frames: i64) -> Self {
        Self {
            frames: self.frames.saturating_add(frames),
            framerate: self.framerate,
        }
    }

    pub fn add_msecs(&self, msecs: i64) -> Self {
        let delta = Timestamp::new(msecs, self.framerate);
        self.add_frames(delta.frames)
    }

    pub fn is_negative(&self) -> bool {
        self.frames < 0
    }

    // frames_a / rate_a vs frames_b / rate_b without losing precision
    fn cross(&self, other: &Self) -> (i128, i128) {
        (
            self.frames as i128 * other.framerate as i128,
            other.frames as i128 * self.framerate as i128,
        )
    }
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        let (a, b) = self.cross(other);
        a == b
    }
}

impl Eq for Timestamp {}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        let (a, b) = self.cross(other);
        a.cmp(&b)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = self.msecs();
        let sign = if ms < 0 { "-" } else { "" };
        let ms = ms.unsigned_abs();
        write!(
            f,
            "{}{}:{:02}.{:03}",
            sign,
            ms / 60_000,
            (ms / 1000) % 60,
            ms % 1000
        )
    }
}
