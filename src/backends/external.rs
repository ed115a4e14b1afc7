// SPDX-License-Identifier: GPL-3.0-only

//! Caller-supplied frames
//!
//! Offscreen integrations push raw buffers through an
//! [`ExternalFrameInjector`]. The matching [`ExternalFrameSource`] drains a
//! bounded queue; when the queue is full the newest frame is dropped so the
//! caller never blocks on the pipeline.

use super::{FrameSource, InputSourceKind};
use crate::constants::sinks::EXTERNAL_QUEUE_DEPTH;
use crate::errors::{FrameError, SdkResult};
use crate::media::{Frame, PixelFormat};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, TrySendError, sync_channel};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A raw buffer as handed over by the caller
///
/// Geometry arrives as signed integers because foreign callers commonly
/// pass them that way; non-positive values are rejected on conversion.
#[derive(Debug, Clone)]
pub struct ExternalFrameData {
    pub data: Vec<u8>,
    pub width: i64,
    pub height: i64,
    /// Row stride in bytes (luma stride for planar formats), tightly packed when `None`
    pub stride: Option<i64>,
    /// Pixel format, inferred from the payload size when `None`
    pub format: Option<PixelFormat>,
    /// Presentation time, assigned on arrival when `None`
    pub timestamp: Option<Duration>,
}

impl ExternalFrameData {
    pub fn new(data: Vec<u8>, width: i64, height: i64) -> Self {
        Self {
            data,
            width,
            height,
            stride: None,
            format: None,
            timestamp: None,
        }
    }

    pub fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_stride(mut self, stride: i64) -> Self {
        self.stride = Some(stride);
        self
    }

    pub fn with_timestamp(mut self, timestamp: Duration) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Validate the geometry and build a canonical frame
    pub fn into_frame(self, arrival: Duration) -> SdkResult<Frame> {
        let width = u32::try_from(self.width).unwrap_or(0);
        let height = u32::try_from(self.height).unwrap_or(0);
        if width == 0 || height == 0 {
            return Err(FrameError::InvalidDimensions { width, height }.into());
        }

        let format = match self.format {
            Some(format) => format,
            None => PixelFormat::infer(width, height, self.data.len()).ok_or_else(|| {
                FrameError::UnrecognizedFormat(format!(
                    "cannot infer format for {}x{} from {} bytes",
                    width,
                    height,
                    self.data.len()
                ))
            })?,
        };

        let stride = match self.stride {
            Some(stride) => u32::try_from(stride).unwrap_or(0),
            None => format.min_stride(width),
        };

        Frame::new(
            width,
            height,
            format,
            stride,
            self.timestamp.unwrap_or(arrival),
            self.data,
        )
    }
}

struct InjectorShared {
    accepting: AtomicBool,
    dropped: AtomicU64,
    epoch: Mutex<Instant>,
}

/// Handle used by callers to push frames into the pipeline
#[derive(Clone)]
pub struct ExternalFrameInjector {
    sender: SyncSender<Frame>,
    shared: Arc<InjectorShared>,
}

impl ExternalFrameInjector {
    /// Convert and enqueue a caller buffer
    ///
    /// Returns `Ok(false)` when the frame was discarded because the source is
    /// not active or the queue is full.
    pub fn push(&self, data: ExternalFrameData) -> SdkResult<bool> {
        let arrival = self
            .shared
            .epoch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed();
        let frame = data.into_frame(arrival)?;
        Ok(self.push_frame(frame))
    }

    /// Enqueue an already validated frame
    pub fn push_frame(&self, frame: Frame) -> bool {
        if !self.shared.accepting.load(Ordering::Acquire) {
            return false;
        }
        match self.sender.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let dropped = self.shared.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(dropped, "External frame queue full, dropping frame");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Whether the source is currently active and taking frames
    pub fn is_accepting(&self) -> bool {
        self.shared.accepting.load(Ordering::Acquire)
    }

    /// Frames discarded because the queue was full
    pub fn dropped_count(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

/// Source draining frames pushed through an [`ExternalFrameInjector`]
pub struct ExternalFrameSource {
    receiver: Receiver<Frame>,
    injector: ExternalFrameInjector,
}

impl Default for ExternalFrameSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ExternalFrameSource {
    pub fn new() -> Self {
        Self::with_capacity(EXTERNAL_QUEUE_DEPTH)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, receiver) = sync_channel(capacity.max(1));
        let shared = Arc::new(InjectorShared {
            accepting: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
            epoch: Mutex::new(Instant::now()),
        });
        Self {
            receiver,
            injector: ExternalFrameInjector { sender, shared },
        }
    }

    pub fn injector(&self) -> ExternalFrameInjector {
        self.injector.clone()
    }

    fn drain(&self) -> usize {
        self.receiver.try_iter().count()
    }
}

impl FrameSource for ExternalFrameSource {
    fn kind(&self) -> InputSourceKind {
        InputSourceKind::ExternalData
    }

    fn start(&mut self) -> SdkResult<()> {
        self.drain();
        *self
            .injector
            .shared
            .epoch
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
        self.injector.shared.accepting.store(true, Ordering::Release);
        Ok(())
    }

    fn stop(&mut self) {
        self.injector.shared.accepting.store(false, Ordering::Release);
        let discarded = self.drain();
        if discarded > 0 {
            warn!(discarded, "Discarded pending external frames on stop");
        }
    }

    fn pause(&mut self) {
        self.injector.shared.accepting.store(false, Ordering::Release);
    }

    fn resume(&mut self) -> SdkResult<()> {
        self.injector.shared.accepting.store(true, Ordering::Release);
        Ok(())
    }

    fn next_frame(&mut self, timeout: Duration) -> SdkResult<Option<Frame>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            // The injector half lives inside self, so this cannot happen while we exist
            Err(RecvTimeoutError::Disconnected) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SdkError;

    #[test]
    fn test_negative_geometry_rejected() {
        let err = ExternalFrameData::new(vec![0; 16], -2, 2)
            .into_frame(Duration::ZERO)
            .unwrap_err();
        assert!(matches!(
            err,
            SdkError::Frame(FrameError::InvalidDimensions { width: 0, .. })
        ));
    }

    #[test]
    fn test_format_inferred_from_size() {
        let frame = ExternalFrameData::new(vec![0; 4 * 4 * 3], 4, 4)
            .into_frame(Duration::ZERO)
            .unwrap();
        assert_eq!(frame.format(), PixelFormat::Rgb24);

        let err = ExternalFrameData::new(vec![0; 7], 4, 4)
            .into_frame(Duration::ZERO)
            .unwrap_err();
        assert!(matches!(err, SdkError::Frame(FrameError::UnrecognizedFormat(_))));
    }

    #[test]
    fn test_ambiguous_size_needs_explicit_format() {
        let err = ExternalFrameData::new(vec![0; 3], 1, 1)
            .into_frame(Duration::ZERO)
            .unwrap_err();
        assert_eq!(err.code(), crate::errors::ErrorCode::InvalidFrameFormat);

        let frame = ExternalFrameData::new(vec![0; 3], 1, 1)
            .with_format(PixelFormat::Rgb24)
            .into_frame(Duration::ZERO)
            .unwrap();
        assert_eq!(frame.format(), PixelFormat::Rgb24);
    }

    #[test]
    fn test_inactive_source_discards() {
        let mut source = ExternalFrameSource::with_capacity(1);
        let injector = source.injector();
        let data = || ExternalFrameData::new(vec![0; 4], 1, 1)
            .with_format(PixelFormat::Rgba32)
            .with_timestamp(Duration::ZERO);

        assert!(!injector.push(data()).unwrap());

        source.start().unwrap();
        assert!(injector.push(data()).unwrap());
        // Queue holds one frame, the next is dropped
        assert!(!injector.push(data()).unwrap());
        assert_eq!(injector.dropped_count(), 1);

        let frame = source.next_frame(Duration::from_millis(10)).unwrap();
        assert!(frame.is_some());
        assert!(source.next_frame(Duration::from_millis(10)).unwrap().is_none());
    }
}
