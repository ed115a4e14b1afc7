// SPDX-License-Identifier: GPL-3.0-only

//! Camera configuration types

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which camera faces the scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraPosition {
    #[default]
    Front,
    Back,
}

impl CameraPosition {
    pub fn flipped(&self) -> Self {
        match self {
            CameraPosition::Front => CameraPosition::Back,
            CameraPosition::Back => CameraPosition::Front,
        }
    }
}

impl std::fmt::Display for CameraPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraPosition::Front => write!(f, "front"),
            CameraPosition::Back => write!(f, "back"),
        }
    }
}

/// Capture resolution preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPreset {
    Vga640x480,
    #[default]
    Hd1280x720,
    Hd1920x1080,
}

impl SessionPreset {
    pub fn size(&self) -> (u32, u32) {
        match self {
            SessionPreset::Vga640x480 => (640, 480),
            SessionPreset::Hd1280x720 => (1280, 720),
            SessionPreset::Hd1920x1080 => (1920, 1080),
        }
    }
}

/// Preview/output orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoOrientation {
    #[default]
    Portrait,
    PortraitUpsideDown,
    LandscapeLeft,
    LandscapeRight,
}

/// Flash behaviour for photo capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashMode {
    #[default]
    Off,
    On,
    Auto,
}

/// Continuous torch (flashlight) behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TorchMode {
    #[default]
    Off,
    On,
    Auto,
}

/// Framerate as a fraction (numerator/denominator)
///
/// Kept exact so NTSC rates like 29.97 fps (30000/1001) survive a round
/// trip through the Y4M header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Framerate {
    pub num: u32,
    pub denom: u32,
}

impl Framerate {
    pub fn new(num: u32, denom: u32) -> Self {
        Self {
            num,
            denom: if denom == 0 { 1 } else { denom },
        }
    }

    /// Integer rate, 30 becomes 30/1 (0 falls back to 30)
    pub fn from_int(fps: u32) -> Self {
        Self {
            num: if fps == 0 { 30 } else { fps },
            denom: 1,
        }
    }

    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.denom as f64
    }

    /// Time between consecutive frames
    pub fn frame_interval(&self) -> Duration {
        if self.num == 0 {
            return Duration::from_millis(33);
        }
        Duration::from_nanos(1_000_000_000 * self.denom as u64 / self.num as u64)
    }

    /// Presentation time of frame `index`
    pub fn timestamp_of(&self, index: u64) -> Duration {
        if self.num == 0 {
            return Duration::ZERO;
        }
        let nanos = index as u128 * self.denom as u128 * 1_000_000_000 / self.num as u128;
        Duration::from_nanos(nanos as u64)
    }
}

impl std::fmt::Display for Framerate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show decimal for non-integer framerates (NTSC)
        if self.denom != 1 {
            write!(f, "{:.2}", self.as_f64())
        } else {
            write!(f, "{}", self.num)
        }
    }
}

impl Default for Framerate {
    fn default() -> Self {
        Self { num: 30, denom: 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framerate_display() {
        assert_eq!(Framerate::from_int(30).to_string(), "30");
        assert_eq!(Framerate::new(30000, 1001).to_string(), "29.97");
    }

    #[test]
    fn test_frame_timestamps() {
        let rate = Framerate::from_int(25);
        assert_eq!(rate.frame_interval(), Duration::from_millis(40));
        assert_eq!(rate.timestamp_of(50), Duration::from_secs(2));
    }
}
