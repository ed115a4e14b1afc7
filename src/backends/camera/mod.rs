// SPDX-License-Identifier: GPL-3.0-only

//! Camera input
//!
//! Camera hardware lives behind the [`CameraProvider`] collaborator. The
//! pipeline only needs raw frames plus the pass-through controls (position,
//! zoom, focus, exposure, flash, torch); [`CameraSource`] adapts a provider
//! to the [`FrameSource`] lifecycle.
//!
//! ```text
//! ┌─────────────────────┐
//! │  FilterSdk facade   │  ← pass-through controls
//! └──────────┬──────────┘
//!            │ SharedCamera
//!            ▼
//! ┌─────────────────────┐      ┌──────────────┐
//! │ CameraProvider Trait│ ◄─── │ CameraSource │ ← driven by the arbiter
//! └──────────┬──────────┘      └──────────────┘
//!            ▼
//!   ┌─────────────────┐
//!   │TestPatternCamera│  ← built-in provider
//!   └─────────────────┘
//! ```

pub mod test_pattern;
pub mod types;

pub use test_pattern::TestPatternCamera;
pub use types::*;

use super::{FrameSource, InputSourceKind};
use crate::config::CameraConfig;
use crate::errors::SdkResult;
use crate::filters::Point;
use crate::media::{Frame, convert};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Camera hardware collaborator
///
/// Implementations deliver raw frames and apply the device controls. All
/// control methods return whether the device accepted the request.
pub trait CameraProvider: Send {
    /// Human readable device name
    fn name(&self) -> &str;

    // ===== Lifecycle =====

    /// Open the device with the given configuration
    fn open(&mut self, config: &CameraConfig) -> SdkResult<()>;

    /// Close the device
    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Stop delivering frames without closing the device
    fn pause(&mut self) {}

    fn resume(&mut self) -> SdkResult<()> {
        Ok(())
    }

    /// Wait up to `timeout` for the next frame
    fn capture(&mut self, timeout: Duration) -> SdkResult<Option<Frame>>;

    // ===== Position =====

    fn available_positions(&self) -> Vec<CameraPosition>;

    fn position(&self) -> CameraPosition;

    fn switch_to(&mut self, position: CameraPosition) -> SdkResult<()>;

    // ===== Controls =====

    fn set_frame_rate(&mut self, fps: u32) -> bool;

    fn zoom_factor(&self) -> f32;

    fn max_zoom_factor(&self) -> f32;

    fn set_zoom_factor(&mut self, factor: f32) -> bool;

    /// Focus at a normalized point of interest
    fn set_focus_point(&mut self, point: Point) -> bool;

    /// Meter exposure at a normalized point of interest
    fn set_exposure_point(&mut self, point: Point) -> bool;

    fn reset_focus_and_exposure(&mut self);

    fn has_flash(&self) -> bool;

    fn has_torch(&self) -> bool;

    fn set_flash_mode(&mut self, mode: FlashMode) -> bool;

    fn set_torch_mode(&mut self, mode: TorchMode) -> bool;
}

/// Camera provider shared between the source and the facade controls
pub type SharedCamera = Arc<Mutex<Box<dyn CameraProvider>>>;

/// Wrap a provider for sharing
pub fn shared(provider: impl CameraProvider + 'static) -> SharedCamera {
    Arc::new(Mutex::new(Box::new(provider)))
}

/// Lock a shared camera, recovering from poisoning
pub fn lock(camera: &SharedCamera) -> std::sync::MutexGuard<'_, Box<dyn CameraProvider>> {
    camera.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Adapts a camera provider to the frame source lifecycle
pub struct CameraSource {
    camera: SharedCamera,
    config: CameraConfig,
}

impl CameraSource {
    pub fn new(camera: SharedCamera, config: CameraConfig) -> Self {
        Self { camera, config }
    }

    pub fn camera(&self) -> SharedCamera {
        Arc::clone(&self.camera)
    }
}

impl FrameSource for CameraSource {
    fn kind(&self) -> InputSourceKind {
        InputSourceKind::Camera
    }

    fn start(&mut self) -> SdkResult<()> {
        let mut camera = lock(&self.camera);
        if !camera.is_open() {
            camera.open(&self.config)?;
        }
        debug!(camera = camera.name(), position = %camera.position(), "Camera source started");
        Ok(())
    }

    fn stop(&mut self) {
        lock(&self.camera).close();
    }

    fn pause(&mut self) {
        lock(&self.camera).pause();
    }

    fn resume(&mut self) -> SdkResult<()> {
        lock(&self.camera).resume()
    }

    fn next_frame(&mut self, timeout: Duration) -> SdkResult<Option<Frame>> {
        let (frame, position) = {
            let mut camera = lock(&self.camera);
            (camera.capture(timeout)?, camera.position())
        };
        match frame {
            // Front camera frames are mirrored so the preview behaves like a mirror
            Some(frame) if self.config.enable_mirroring && position == CameraPosition::Front => {
                convert::mirror(&frame).map(Some)
            }
            other => Ok(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_source_lifecycle() {
        let camera = shared(TestPatternCamera::with_size(16, 8));
        let mut source = CameraSource::new(Arc::clone(&camera), CameraConfig::default());

        source.start().unwrap();
        assert!(lock(&camera).is_open());

        let frame = source.next_frame(Duration::from_millis(200)).unwrap().unwrap();
        assert_eq!((frame.width(), frame.height()), (16, 8));

        source.stop();
        assert!(!lock(&camera).is_open());
    }
}
