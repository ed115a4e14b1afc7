// SPDX-License-Identifier: GPL-3.0-only

//! Output fan-out
//!
//! Every callback category gets its own lane: a worker thread fed through a
//! two-slot queue. Delivery never blocks the processing loop; when a lane's
//! queue is full the frame is dropped for that lane only.
//!
//! The recording lane differs: it is an unbounded, ordered queue so that no
//! frame is lost or reordered on its way into the container, and it can be
//! flushed before the recording is finalised.

use super::engine::ProcessingMode;
use super::frame_loop::{LoopAction, WorkerController};
use super::video::RecordingSink;
use crate::constants::sinks::CALLBACK_QUEUE_DEPTH;
use crate::errors::{SdkError, SdkResult};
use crate::media::{AudioBuffer, Frame, convert};
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

const LANE_POLL: Duration = Duration::from_millis(50);

/// Callback receiving a processed frame
pub type FrameCallback = Arc<dyn Fn(&Frame) + Send + Sync>;

/// Callback receiving a processed frame as a pixel buffer and its timestamp
pub type PixelBufferCallback = Arc<dyn Fn(&Frame, Duration) + Send + Sync>;

/// Callback receiving tightly packed RGBA bytes, width, height and timestamp
pub type RawFrameCallback = Arc<dyn Fn(&[u8], u32, u32, Duration) + Send + Sync>;

/// Callback categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkLane {
    /// On-screen preview, skipped in offscreen mode
    Preview,
    /// Pixel buffer output, gated by `set_live_frame_output_enabled`
    PixelBuffer,
    /// RGBA frame data, gated by `set_recording_enabled`
    RawFrame,
    /// Live streaming output
    LiveStream,
}

impl SinkLane {
    pub const ALL: [SinkLane; 4] = [
        SinkLane::Preview,
        SinkLane::PixelBuffer,
        SinkLane::RawFrame,
        SinkLane::LiveStream,
    ];

    fn index(self) -> usize {
        match self {
            SinkLane::Preview => 0,
            SinkLane::PixelBuffer => 1,
            SinkLane::RawFrame => 2,
            SinkLane::LiveStream => 3,
        }
    }

    fn enabled_by_default(self) -> bool {
        matches!(self, SinkLane::Preview | SinkLane::LiveStream)
    }

    fn name(self) -> &'static str {
        match self {
            SinkLane::Preview => "sink-preview",
            SinkLane::PixelBuffer => "sink-pixel-buffer",
            SinkLane::RawFrame => "sink-raw-frame",
            SinkLane::LiveStream => "sink-live-stream",
        }
    }
}

// Field order matters: the sender must drop before the worker is joined
struct CallbackLane {
    sender: SyncSender<Frame>,
    _worker: WorkerController,
}

impl CallbackLane {
    fn spawn(lane: SinkLane, callback: FrameCallback) -> SdkResult<Self> {
        let (sender, receiver) = mpsc::sync_channel::<Frame>(CALLBACK_QUEUE_DEPTH);
        let worker = WorkerController::start(lane.name(), move || match receiver.recv_timeout(LANE_POLL) {
            Ok(frame) => {
                // A panicking callback must not take the lane down with it
                if catch_unwind(AssertUnwindSafe(|| callback(&frame))).is_err() {
                    warn!(lane = lane.name(), "Sink callback panicked");
                }
                LoopAction::Continue
            }
            Err(RecvTimeoutError::Timeout) => LoopAction::Continue,
            Err(RecvTimeoutError::Disconnected) => LoopAction::Stop,
        })?;
        Ok(Self {
            sender,
            _worker: worker,
        })
    }
}

/// Fan-out of processed frames to the installed callbacks
pub struct SinkSet {
    lanes: Mutex<HashMap<SinkLane, CallbackLane>>,
    enabled: [AtomicBool; 4],
    dropped: AtomicU64,
}

impl Default for SinkSet {
    fn default() -> Self {
        Self::new()
    }
}

impl SinkSet {
    pub fn new() -> Self {
        Self {
            lanes: Mutex::new(HashMap::new()),
            enabled: SinkLane::ALL.map(|lane| AtomicBool::new(lane.enabled_by_default())),
            dropped: AtomicU64::new(0),
        }
    }

    /// Install (or replace) the callback of a lane
    pub fn set_callback(&self, lane: SinkLane, callback: Option<FrameCallback>) -> SdkResult<()> {
        let mut lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
        // Old lane drains and joins outside the map
        let previous = match callback {
            Some(callback) => lanes.insert(lane, CallbackLane::spawn(lane, callback)?),
            None => lanes.remove(&lane),
        };
        drop(lanes);
        drop(previous);
        debug!(lane = lane.name(), "Sink callback updated");
        Ok(())
    }

    pub fn set_pixel_buffer_callback(&self, callback: Option<PixelBufferCallback>) -> SdkResult<()> {
        let adapted = callback.map(|cb| Arc::new(move |frame: &Frame| cb(frame, frame.timestamp())) as FrameCallback);
        self.set_callback(SinkLane::PixelBuffer, adapted)
    }

    /// RGBA conversion happens on the lane thread, never on the processing loop
    pub fn set_raw_frame_callback(&self, callback: Option<RawFrameCallback>) -> SdkResult<()> {
        let adapted = callback.map(|cb| {
            Arc::new(move |frame: &Frame| {
                let rgba = convert::to_rgba(frame);
                cb(&rgba, frame.width(), frame.height(), frame.timestamp());
            }) as FrameCallback
        });
        self.set_callback(SinkLane::RawFrame, adapted)
    }

    pub fn set_enabled(&self, lane: SinkLane, enabled: bool) {
        self.enabled[lane.index()].store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self, lane: SinkLane) -> bool {
        self.enabled[lane.index()].load(Ordering::Acquire)
    }

    pub fn has_callback(&self, lane: SinkLane) -> bool {
        self.lanes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&lane)
    }

    /// Hand a processed frame to every enabled lane, returns the lanes reached
    pub fn deliver(&self, frame: &Frame, mode: ProcessingMode) -> usize {
        let lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
        let mut delivered = 0;
        for (lane, sink) in lanes.iter() {
            if !self.is_enabled(*lane) || (*lane == SinkLane::Preview && !mode.has_preview()) {
                continue;
            }
            match sink.sender.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    debug!(lane = lane.name(), "Sink lane busy, frame dropped");
                }
                Err(TrySendError::Disconnected(_)) => {}
            }
        }
        delivered
    }

    /// Frames dropped across all lanes because a callback was slow
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stop every lane, waiting for in-flight callbacks
    pub fn clear(&self) {
        let lanes = std::mem::take(&mut *self.lanes.lock().unwrap_or_else(PoisonError::into_inner));
        drop(lanes);
    }
}

enum RecordingCommand {
    Video(Frame),
    Audio(AudioBuffer),
    Flush(SyncSender<()>),
}

/// Ordered delivery into a [`RecordingSink`]
pub struct RecordingLane {
    sender: Sender<RecordingCommand>,
    _worker: WorkerController,
}

impl RecordingLane {
    pub fn spawn(sink: Arc<RecordingSink>) -> SdkResult<Self> {
        let (sender, receiver) = mpsc::channel();
        let worker = WorkerController::start("sink-recording", move || Self::drain_one(&receiver, &sink))?;
        Ok(Self {
            sender,
            _worker: worker,
        })
    }

    fn drain_one(receiver: &Receiver<RecordingCommand>, sink: &RecordingSink) -> LoopAction {
        match receiver.recv_timeout(LANE_POLL) {
            Ok(RecordingCommand::Video(frame)) => {
                if sink.is_recording() {
                    if let Err(e) = sink.append_video_frame(&frame) {
                        warn!(error = %e, "Recording append rejected");
                    }
                }
                LoopAction::Continue
            }
            Ok(RecordingCommand::Audio(buffer)) => {
                if sink.is_recording() {
                    if let Err(e) = sink.append_audio(&buffer) {
                        debug!(error = %e, "Audio append rejected");
                    }
                }
                LoopAction::Continue
            }
            Ok(RecordingCommand::Flush(ack)) => {
                let _ = ack.send(());
                LoopAction::Continue
            }
            Err(RecvTimeoutError::Timeout) => LoopAction::Continue,
            Err(RecvTimeoutError::Disconnected) => LoopAction::Stop,
        }
    }

    fn send(&self, command: RecordingCommand) -> SdkResult<()> {
        self.sender
            .send(command)
            .map_err(|_| SdkError::invalid_state("recording append", "lane closed"))
    }

    /// Enqueue a processed frame; returns once it is queued in order
    pub fn push_video(&self, frame: Frame) -> SdkResult<()> {
        self.send(RecordingCommand::Video(frame))
    }

    pub fn push_audio(&self, buffer: AudioBuffer) -> SdkResult<()> {
        self.send(RecordingCommand::Audio(buffer))
    }

    /// Wait until everything queued so far reached the sink
    pub fn flush(&self, timeout: Duration) -> bool {
        let (ack, done) = mpsc::sync_channel(1);
        if self.send(RecordingCommand::Flush(ack)).is_err() {
            return false;
        }
        done.recv_timeout(timeout).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    fn frame() -> Frame {
        Frame::from_rgba(1, 1, vec![1, 2, 3, 255], Duration::from_millis(5)).unwrap()
    }

    fn wait_for(counter: &AtomicUsize, expected: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if counter.load(Ordering::SeqCst) >= expected {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_preview_skipped_offscreen() {
        let sinks = SinkSet::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        sinks
            .set_callback(
                SinkLane::Preview,
                Some(Arc::new(move |_: &Frame| {
                    c.fetch_add(1, Ordering::SeqCst);
                })),
            )
            .unwrap();

        assert_eq!(sinks.deliver(&frame(), ProcessingMode::Offscreen), 0);
        assert_eq!(sinks.deliver(&frame(), ProcessingMode::Live), 1);
        assert!(wait_for(&count, 1));
    }

    #[test]
    fn test_raw_frame_lane_gated() {
        let sinks = SinkSet::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&seen);
        sinks
            .set_raw_frame_callback(Some(Arc::new(move |rgba: &[u8], w: u32, h: u32, ts: Duration| {
                assert_eq!(rgba, &[1, 2, 3, 255]);
                assert_eq!((w, h, ts), (1, 1, Duration::from_millis(5)));
                s.fetch_add(1, Ordering::SeqCst);
            })))
            .unwrap();

        assert_eq!(sinks.deliver(&frame(), ProcessingMode::Live), 0);
        sinks.set_enabled(SinkLane::RawFrame, true);
        assert_eq!(sinks.deliver(&frame(), ProcessingMode::Live), 1);
        assert!(wait_for(&seen, 1));
    }

    #[test]
    fn test_slow_callback_drops_frames() {
        let sinks = SinkSet::new();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        sinks
            .set_callback(
                SinkLane::LiveStream,
                Some(Arc::new(move |_: &Frame| {
                    let _ = release_rx.lock().unwrap().recv_timeout(Duration::from_secs(2));
                })),
            )
            .unwrap();

        // One frame blocks in the callback, two fill the queue, the rest drop
        for _ in 0..6 {
            sinks.deliver(&frame(), ProcessingMode::Live);
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(sinks.dropped_count() >= 2);

        for _ in 0..6 {
            let _ = release_tx.send(());
        }
        sinks.clear();
        assert!(!sinks.has_callback(SinkLane::LiveStream));
    }
}
