// SPDX-License-Identifier: GPL-3.0-only

//! Recording sink
//!
//! Consumes processed frames (and optionally audio) in presentation order and
//! writes them through a [`Muxer`]. The sink owns the recording session and
//! its state machine:
//!
//! ```text
//! Idle ──start──▶ Starting ──▶ Recording ──stop──▶ Stopping ──▶ Idle
//!                    │             │                   │
//!                    └─────────────┴───────────────────┴──▶ Error ──▶ Idle
//! ```
//!
//! Duration and file-size limits stop the session from inside the append
//! that crosses them.

use super::muxer::{MuxOutput, Muxer, Y4mMuxer};
use crate::backends::camera::Framerate;
use crate::errors::{RecordingError, SdkError, SdkResult};
use crate::media::{AudioBuffer, Frame, convert};
use crate::pipelines::events::{EventBus, SdkEvent};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Recording sink lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    #[default]
    Idle,
    Starting,
    Recording,
    Stopping,
    Error,
}

/// Parameters of one recording session
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingOptions {
    pub output_path: PathBuf,
    pub frame_rate: Framerate,
    /// Stop automatically once reached
    pub max_duration: Option<Duration>,
    /// Stop automatically once this many bytes were written
    pub max_file_size: Option<u64>,
}

impl RecordingOptions {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
            frame_rate: Framerate::default(),
            max_duration: None,
            max_file_size: None,
        }
    }
}

/// Result of a video append
#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    Appended,
    /// A configured limit was reached and the session was finalised
    LimitReached(MuxOutput),
}

struct Session {
    id: Uuid,
    options: RecordingOptions,
    video_size: (u32, u32),
    muxer: Box<dyn Muxer>,
    first_video: Option<Duration>,
    last_video: Option<Duration>,
    last_audio: Option<Duration>,
    frames: u64,
}

impl Session {
    /// Span between first and last frame plus one average frame duration
    fn duration(&self) -> Duration {
        match (self.first_video, self.last_video) {
            (Some(first), Some(last)) if self.frames > 1 => span_duration(first, last, self.frames),
            _ if self.frames == 1 => self.options.frame_rate.frame_interval(),
            _ => Duration::ZERO,
        }
    }

    fn limit_reached(&self) -> bool {
        self.options.max_duration.is_some_and(|max| self.duration() >= max)
            || self
                .options
                .max_file_size
                .is_some_and(|max| self.muxer.bytes_written() >= max)
    }
}

/// `last - first` plus the average gap between `frames` pictures
fn span_duration(first: Duration, last: Duration, frames: u64) -> Duration {
    let span = last.saturating_sub(first);
    let gaps = u128::from(frames.saturating_sub(1).max(1));
    let average = span.as_nanos() / gaps;
    span + Duration::from_nanos(u64::try_from(average).unwrap_or(u64::MAX))
}

struct Inner {
    state: RecordingState,
    session: Option<Session>,
    video_size: (u32, u32),
    include_audio: bool,
    last_duration: Duration,
}

/// Sink writing processed frames to a container file
pub struct RecordingSink {
    inner: Mutex<Inner>,
    events: Option<EventBus>,
}

impl RecordingSink {
    pub fn new(video_size: (u32, u32), include_audio: bool) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: RecordingState::Idle,
                session: None,
                video_size,
                include_audio,
                last_duration: Duration::ZERO,
            }),
            events: None,
        }
    }

    /// Publish state changes and finished recordings on `events`
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, inner: &mut Inner, state: RecordingState) {
        if inner.state != state {
            debug!(from = ?inner.state, to = ?state, "Recording state");
            inner.state = state;
            if let Some(events) = &self.events {
                events.publish(SdkEvent::RecordingStateChanged(state));
            }
        }
    }

    fn publish_finished(&self, result: &SdkResult<MuxOutput>) {
        if let Some(events) = &self.events {
            events.publish(SdkEvent::RecordingFinished(
                result.as_ref().map(|out| out.video.clone()).map_err(Clone::clone),
            ));
        }
    }

    pub fn state(&self) -> RecordingState {
        self.lock().state
    }

    pub fn is_recording(&self) -> bool {
        self.state() == RecordingState::Recording
    }

    pub fn video_size(&self) -> (u32, u32) {
        self.lock().video_size
    }

    /// Change the output size, only while idle
    pub fn set_video_size(&self, width: u32, height: u32) -> SdkResult<()> {
        let mut inner = self.lock();
        if inner.state != RecordingState::Idle {
            return Err(SdkError::invalid_state("update video size", inner.state));
        }
        if width == 0 || height == 0 {
            return Err(SdkError::InvalidParameter(format!("video size {}x{}", width, height)));
        }
        inner.video_size = (width, height);
        Ok(())
    }

    pub fn include_audio(&self) -> bool {
        self.lock().include_audio
    }

    /// Toggle the audio track, only while idle
    pub fn set_include_audio(&self, include: bool) -> SdkResult<()> {
        let mut inner = self.lock();
        if inner.state != RecordingState::Idle {
            return Err(SdkError::invalid_state("set include audio", inner.state));
        }
        inner.include_audio = include;
        Ok(())
    }

    /// Open a new session writing to `options.output_path`
    pub fn start(&self, options: RecordingOptions) -> SdkResult<Uuid> {
        let mut inner = self.lock();
        if inner.state != RecordingState::Idle {
            return Err(RecordingError::AlreadyRecording.into());
        }
        self.transition(&mut inner, RecordingState::Starting);

        let (width, height) = inner.video_size;
        let muxer = match Y4mMuxer::create(
            &options.output_path,
            width,
            height,
            options.frame_rate,
            inner.include_audio,
        ) {
            Ok(muxer) => muxer,
            Err(e) => {
                error!(path = %options.output_path.display(), error = %e, "Failed to open recording");
                self.transition(&mut inner, RecordingState::Error);
                self.transition(&mut inner, RecordingState::Idle);
                return Err(e);
            }
        };

        let id = Uuid::new_v4();
        info!(
            session = %id,
            path = %options.output_path.display(),
            width,
            height,
            fps = %options.frame_rate,
            audio = inner.include_audio,
            "Recording started"
        );
        inner.session = Some(Session {
            id,
            options,
            video_size: (width, height),
            muxer: Box::new(muxer),
            first_video: None,
            last_video: None,
            last_audio: None,
            frames: 0,
        });
        inner.last_duration = Duration::ZERO;
        self.transition(&mut inner, RecordingState::Recording);
        Ok(id)
    }

    /// Append a processed frame
    ///
    /// Frames must arrive with strictly increasing timestamps; anything else
    /// is rejected and the session carries on.
    pub fn append_video_frame(&self, frame: &Frame) -> SdkResult<AppendOutcome> {
        let mut inner = self.lock();
        if inner.state != RecordingState::Recording {
            return Err(SdkError::invalid_state("append video frame", inner.state));
        }
        let Some(session) = inner.session.as_mut() else {
            return Err(SdkError::invalid_state("append video frame", "no session"));
        };

        let timestamp = frame.timestamp();
        if let Some(previous) = session.last_video {
            if timestamp <= previous {
                return Err(RecordingError::NonMonotonicTimestamp {
                    previous,
                    received: timestamp,
                }
                .into());
            }
        }

        let (width, height) = session.video_size;
        let mut rgba = convert::to_rgba(frame);
        if (frame.width(), frame.height()) != (width, height) {
            rgba = convert::scale_rgba(rgba, frame.width(), frame.height(), width, height);
        }
        let i420 = convert::rgba_to_i420(&rgba, width, height)?;

        if let Err(e) = session.muxer.write_video(&i420) {
            error!(error = %e, "Recording write failed");
            drop(inner);
            return Err(self.fail(e));
        }

        session.first_video.get_or_insert(timestamp);
        session.last_video = Some(timestamp);
        session.frames += 1;

        if session.limit_reached() {
            info!(session = %session.id, "Recording limit reached");
            drop(inner);
            return self.stop().map(AppendOutcome::LimitReached);
        }
        Ok(AppendOutcome::Appended)
    }

    /// Append an audio buffer (audio must be enabled)
    pub fn append_audio(&self, buffer: &AudioBuffer) -> SdkResult<()> {
        let mut inner = self.lock();
        if !inner.include_audio {
            return Err(RecordingError::AudioDisabled.into());
        }
        if inner.state != RecordingState::Recording {
            return Err(SdkError::invalid_state("append audio", inner.state));
        }
        let Some(session) = inner.session.as_mut() else {
            return Err(SdkError::invalid_state("append audio", "no session"));
        };

        if let Some(previous) = session.last_audio {
            if buffer.timestamp() <= previous {
                return Err(RecordingError::NonMonotonicTimestamp {
                    previous,
                    received: buffer.timestamp(),
                }
                .into());
            }
        }
        session.muxer.write_audio(buffer)?;
        session.last_audio = Some(buffer.timestamp());
        Ok(())
    }

    /// Duration of the running session, or of the last finished one
    pub fn current_duration(&self) -> Duration {
        let inner = self.lock();
        inner
            .session
            .as_ref()
            .map(Session::duration)
            .unwrap_or(inner.last_duration)
    }

    pub fn frames_written(&self) -> u64 {
        self.lock().session.as_ref().map_or(0, |s| s.frames)
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.lock().session.as_ref().map(|s| s.id)
    }

    /// Finalise the session
    ///
    /// A session without a single video frame is discarded and reported as
    /// an empty recording.
    pub fn stop(&self) -> SdkResult<MuxOutput> {
        let mut inner = self.lock();
        if inner.state != RecordingState::Recording {
            return Err(SdkError::invalid_state("stop recording", inner.state));
        }
        self.transition(&mut inner, RecordingState::Stopping);

        let Some(session) = inner.session.take() else {
            self.transition(&mut inner, RecordingState::Idle);
            return Err(SdkError::invalid_state("stop recording", "no session"));
        };
        let duration = session.duration();

        let result = if session.frames == 0 {
            warn!(session = %session.id, "Stopping recording without frames");
            session.muxer.abort();
            Err(RecordingError::EmptyRecording.into())
        } else {
            session.muxer.finalize()
        };

        match &result {
            Ok(output) => {
                inner.last_duration = duration;
                info!(
                    session = %session.id,
                    path = %output.video.display(),
                    frames = output.frames,
                    duration_secs = duration.as_secs_f64(),
                    "Recording finished"
                );
            }
            Err(SdkError::Recording(RecordingError::EmptyRecording)) => {
                inner.last_duration = Duration::ZERO;
            }
            Err(e) => {
                error!(session = %session.id, error = %e, "Recording finalisation failed");
                self.transition(&mut inner, RecordingState::Error);
            }
        }

        self.transition(&mut inner, RecordingState::Idle);
        drop(inner);
        self.publish_finished(&result);
        result
    }

    /// Abort after a write failure, keeping whatever reached disk
    fn fail(&self, cause: SdkError) -> SdkError {
        let mut inner = self.lock();
        self.transition(&mut inner, RecordingState::Error);
        if let Some(session) = inner.session.take() {
            inner.last_duration = session.duration();
            if let Err(e) = session.muxer.finalize() {
                warn!(error = %e, "Could not salvage failed recording");
            }
        }
        self.transition(&mut inner, RecordingState::Idle);
        drop(inner);
        self.publish_finished(&Err(cause.clone()));
        cause
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_at(ms: u64) -> Frame {
        Frame::from_rgba(4, 4, vec![128u8; 64], Duration::from_millis(ms)).unwrap()
    }

    fn options(dir: &tempfile::TempDir) -> RecordingOptions {
        RecordingOptions::new(dir.path().join("clip.y4m"))
    }

    #[test]
    fn test_span_duration_many_frames() {
        let ms = Duration::from_millis;
        assert_eq!(span_duration(ms(0), ms(957), 30), ms(990));
        // More frames than fit in a u32 must not wrap the divisor
        let frames = u64::from(u32::MAX) + 2;
        let last = Duration::from_nanos(frames - 1);
        assert_eq!(span_duration(Duration::ZERO, last, frames), last + Duration::from_nanos(1));
    }

    #[test]
    fn test_double_start_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RecordingSink::new((4, 4), false);
        sink.start(options(&dir)).unwrap();
        let err = sink.start(options(&dir)).unwrap_err();
        assert!(matches!(err, SdkError::Recording(RecordingError::AlreadyRecording)));
    }

    #[test]
    fn test_video_size_locked_while_recording() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RecordingSink::new((4, 4), false);
        sink.set_video_size(8, 8).unwrap();
        sink.start(options(&dir)).unwrap();
        let err = sink.set_video_size(2, 2).unwrap_err();
        assert!(matches!(err, SdkError::InvalidState { .. }));
        assert_eq!(sink.video_size(), (8, 8));
    }

    #[test]
    fn test_frames_are_scaled() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RecordingSink::new((2, 2), false);
        sink.start(options(&dir)).unwrap();
        sink.append_video_frame(&frame_at(0)).unwrap();
        let output = sink.stop().unwrap();
        let len = std::fs::metadata(&output.video).unwrap().len() as usize;
        let header = "YUV4MPEG2 W2 H2 F30:1 Ip A1:1 C420jpeg\n".len();
        assert_eq!(len, header + 6 + 6);
    }

    #[test]
    fn test_max_duration_stops() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RecordingSink::new((4, 4), false);
        let mut opts = options(&dir);
        opts.max_duration = Some(Duration::from_millis(100));
        sink.start(opts).unwrap();

        assert_eq!(sink.append_video_frame(&frame_at(0)).unwrap(), AppendOutcome::Appended);
        assert_eq!(sink.append_video_frame(&frame_at(40)).unwrap(), AppendOutcome::Appended);
        let outcome = sink.append_video_frame(&frame_at(80)).unwrap();
        assert!(matches!(outcome, AppendOutcome::LimitReached(ref out) if out.frames == 3));
        assert_eq!(sink.state(), RecordingState::Idle);
        assert_eq!(sink.current_duration(), Duration::from_millis(120));
    }

    #[test]
    fn test_audio_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RecordingSink::new((4, 4), false);
        sink.start(options(&dir)).unwrap();
        let err = sink
            .append_audio(&AudioBuffer::new(vec![0i16; 4], 48_000, 1, Duration::ZERO))
            .unwrap_err();
        assert!(matches!(err, SdkError::Recording(RecordingError::AudioDisabled)));
    }

    #[test]
    fn test_stop_when_idle_is_invalid() {
        let sink = RecordingSink::new((4, 4), false);
        assert!(matches!(sink.stop().unwrap_err(), SdkError::InvalidState { .. }));
    }
}
