// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic camera
//!
//! Generates scrolling colour bars (front) or a diagonal gradient (back) at
//! the configured frame rate, with monotonically increasing timestamps. Used
//! when no hardware provider is supplied and by the CLI `record` command.

use super::types::{CameraPosition, FlashMode, Framerate, TorchMode};
use super::CameraProvider;
use crate::config::CameraConfig;
use crate::errors::{SdkError, SdkResult};
use crate::filters::Point;
use crate::media::Frame;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const BARS: [[u8; 3]; 8] = [
    [235, 235, 235],
    [235, 235, 16],
    [16, 235, 235],
    [16, 235, 16],
    [235, 16, 235],
    [235, 16, 16],
    [16, 16, 235],
    [16, 16, 16],
];

const MAX_ZOOM: f32 = 8.0;

/// Camera provider that synthesises frames
pub struct TestPatternCamera {
    size_override: Option<(u32, u32)>,
    size: (u32, u32),
    framerate: Framerate,
    position: CameraPosition,
    open: bool,
    paused: bool,
    permission_granted: bool,
    frame_index: u64,
    started_at: Option<Instant>,
    zoom: f32,
    focus: Point,
    exposure: Point,
    flash: FlashMode,
    torch: TorchMode,
}

impl Default for TestPatternCamera {
    fn default() -> Self {
        Self {
            size_override: None,
            size: (1280, 720),
            framerate: Framerate::default(),
            position: CameraPosition::Front,
            open: false,
            paused: false,
            permission_granted: true,
            frame_index: 0,
            started_at: None,
            zoom: 1.0,
            focus: Point::new(0.5, 0.5),
            exposure: Point::new(0.5, 0.5),
            flash: FlashMode::Off,
            torch: TorchMode::Off,
        }
    }
}

impl TestPatternCamera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixed output size regardless of the session preset
    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            size_override: Some((width, height)),
            size: (width, height),
            ..Self::default()
        }
    }

    /// Simulate a user who refused camera access
    pub fn permission_denied(mut self) -> Self {
        self.permission_granted = false;
        self
    }

    /// Frames produced since the camera was opened
    pub fn frames_produced(&self) -> u64 {
        self.frame_index
    }

    fn render(&self) -> Vec<u8> {
        let (width, height) = self.size;
        let (w, h) = (width as usize, height as usize);
        let mut rgba = vec![255u8; w * h * 4];
        let scroll = self.frame_index as usize;
        let cx = w as f32 / 2.0;
        let cy = h as f32 / 2.0;

        for y in 0..h {
            for x in 0..w {
                // Zoom samples the pattern closer to the centre
                let zx = cx + (x as f32 - cx) / self.zoom;
                let zy = cy + (y as f32 - cy) / self.zoom;
                let rgb = match self.position {
                    CameraPosition::Front => {
                        let bar = ((zx as usize + scroll) * BARS.len() / w.max(1)) % BARS.len();
                        BARS[bar]
                    }
                    CameraPosition::Back => {
                        let t = ((zx + zy) / (w + h) as f32).clamp(0.0, 1.0);
                        let phase = (scroll % 256) as u8;
                        [(t * 255.0) as u8, phase, 255 - (t * 255.0) as u8]
                    }
                };
                let i = (y * w + x) * 4;
                rgba[i..i + 3].copy_from_slice(&rgb);
            }
        }
        rgba
    }
}

impl CameraProvider for TestPatternCamera {
    fn name(&self) -> &str {
        "Test Pattern"
    }

    fn open(&mut self, config: &CameraConfig) -> SdkResult<()> {
        if !self.permission_granted {
            return Err(SdkError::CameraPermissionDenied);
        }
        self.size = self.size_override.unwrap_or(config.session_preset.size());
        self.framerate = Framerate::from_int(config.frame_rate);
        self.position = config.position;
        self.flash = config.flash_mode;
        self.open = true;
        self.paused = false;
        self.frame_index = 0;
        self.started_at = Some(Instant::now());
        info!(
            width = self.size.0,
            height = self.size.1,
            fps = %self.framerate,
            position = %self.position,
            "Test pattern camera opened"
        );
        Ok(())
    }

    fn close(&mut self) {
        if self.open {
            debug!(frames = self.frame_index, "Test pattern camera closed");
        }
        self.open = false;
        self.started_at = None;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    fn resume(&mut self) -> SdkResult<()> {
        if !self.open {
            return Err(SdkError::CameraUnavailable("camera is closed".into()));
        }
        self.paused = false;
        // Re-anchor pacing so paused time does not produce a burst of frames
        self.started_at = Instant::now().checked_sub(self.framerate.timestamp_of(self.frame_index));
        Ok(())
    }

    fn capture(&mut self, timeout: Duration) -> SdkResult<Option<Frame>> {
        if !self.open {
            return Err(SdkError::CameraUnavailable("camera is closed".into()));
        }
        if self.paused {
            std::thread::sleep(timeout);
            return Ok(None);
        }

        let timestamp = self.framerate.timestamp_of(self.frame_index);
        let started = *self.started_at.get_or_insert_with(Instant::now);
        let elapsed = started.elapsed();
        if timestamp > elapsed {
            let wait = timestamp - elapsed;
            if wait > timeout {
                std::thread::sleep(timeout);
                return Ok(None);
            }
            std::thread::sleep(wait);
        }

        let frame = Frame::from_rgba(self.size.0, self.size.1, self.render(), timestamp)?;
        self.frame_index += 1;
        Ok(Some(frame))
    }

    fn available_positions(&self) -> Vec<CameraPosition> {
        vec![CameraPosition::Front, CameraPosition::Back]
    }

    fn position(&self) -> CameraPosition {
        self.position
    }

    fn switch_to(&mut self, position: CameraPosition) -> SdkResult<()> {
        info!(from = %self.position, to = %position, "Switching camera");
        self.position = position;
        self.zoom = 1.0;
        Ok(())
    }

    fn set_frame_rate(&mut self, fps: u32) -> bool {
        if fps == 0 || fps > 120 {
            return false;
        }
        self.framerate = Framerate::from_int(fps);
        self.started_at = Instant::now().checked_sub(self.framerate.timestamp_of(self.frame_index));
        true
    }

    fn zoom_factor(&self) -> f32 {
        self.zoom
    }

    fn max_zoom_factor(&self) -> f32 {
        MAX_ZOOM
    }

    fn set_zoom_factor(&mut self, factor: f32) -> bool {
        if !factor.is_finite() {
            return false;
        }
        self.zoom = factor.clamp(1.0, MAX_ZOOM);
        true
    }

    fn set_focus_point(&mut self, point: Point) -> bool {
        self.focus = point;
        true
    }

    fn set_exposure_point(&mut self, point: Point) -> bool {
        self.exposure = point;
        true
    }

    fn reset_focus_and_exposure(&mut self) {
        self.focus = Point::new(0.5, 0.5);
        self.exposure = Point::new(0.5, 0.5);
    }

    fn has_flash(&self) -> bool {
        self.position == CameraPosition::Back
    }

    fn has_torch(&self) -> bool {
        self.position == CameraPosition::Back
    }

    fn set_flash_mode(&mut self, mode: FlashMode) -> bool {
        if !self.has_flash() {
            return false;
        }
        self.flash = mode;
        true
    }

    fn set_torch_mode(&mut self, mode: TorchMode) -> bool {
        if !self.has_torch() {
            return false;
        }
        self.torch = mode;
        true
    }
}
