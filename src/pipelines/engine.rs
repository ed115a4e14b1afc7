// SPDX-License-Identifier: GPL-3.0-only

//! Processing engine
//!
//! One worker thread pulls frames from the active input source and runs the
//! per-frame cycle:
//!
//! ```text
//! acquire → (mirror) → detect faces → FilterChain::apply → time
//!        → sinks + recording lane → FrameProcessed event
//! ```
//!
//! A frame whose processing fails is dropped and reported; the loop carries
//! on with the next frame. Frames produced by a source that lost the active
//! slot while they were in flight are dropped as stale.

use super::events::{EventBus, SdkEvent};
use super::frame_loop::{LoopAction, WorkerController};
use super::metrics::{MetricsTracker, ProcessingMetrics};
use super::sinks::{RecordingLane, SinkSet};
use super::video::{MuxOutput, RecordingOptions, RecordingSink};
use crate::backends::{
    ConflictStrategy, FrameSource, InputArbiter, InputSourceKind, InputState, RequestOutcome, SourceEvent,
};
use crate::config::SdkConfig;
use crate::constants::timing::{FRAME_LOG_INTERVAL, IDLE_BACKOFF, SOURCE_POLL_TIMEOUT};
use crate::errors::{SdkError, SdkResult, SourceError};
use crate::filters::{FaceDetector, FilterChain};
use crate::media::{AudioBuffer, Frame, convert};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How long `stop_recording` waits for queued frames to reach the sink
const RECORDING_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Which inputs and sinks the engine serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    /// Camera input with preview
    #[default]
    Live,
    /// Caller-supplied frames only, no preview surface
    Offscreen,
    /// Every input and every sink category
    Hybrid,
}

impl ProcessingMode {
    pub fn has_preview(&self) -> bool {
        !matches!(self, ProcessingMode::Offscreen)
    }

    /// Whether a source of `kind` may run in this mode
    pub fn allows(&self, kind: InputSourceKind) -> bool {
        match self {
            ProcessingMode::Live => kind != InputSourceKind::ExternalData,
            ProcessingMode::Offscreen => kind != InputSourceKind::Camera,
            ProcessingMode::Hybrid => true,
        }
    }
}

impl std::fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingMode::Live => write!(f, "live"),
            ProcessingMode::Offscreen => write!(f, "offscreen"),
            ProcessingMode::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// SDK lifecycle
///
/// ```text
/// Uninitialized → Initializing → Ready ⇄ Paused
///                      │           │
///                      └─▶ Error ◀─┘        any ─▶ Terminated
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdkState {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
    Paused,
    Error,
    Terminated,
}

impl std::fmt::Display for SdkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SdkState::Uninitialized => "uninitialized",
            SdkState::Initializing => "initializing",
            SdkState::Ready => "ready",
            SdkState::Paused => "paused",
            SdkState::Error => "error",
            SdkState::Terminated => "terminated",
        };
        write!(f, "{}", name)
    }
}

/// Cancellation flags of the cycles currently running
///
/// Each cycle owns its flag, so a cancellation only reaches the frames that
/// were in flight when it was issued.
#[derive(Default)]
struct InFlight {
    cycles: Mutex<Vec<(Arc<AtomicBool>, bool)>>,
}

impl InFlight {
    fn lock(&self) -> MutexGuard<'_, Vec<(Arc<AtomicBool>, bool)>> {
        self.cycles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self, sourced: bool) -> CycleToken<'_> {
        let flag = Arc::new(AtomicBool::new(false));
        self.lock().push((Arc::clone(&flag), sourced));
        CycleToken { in_flight: self, flag }
    }

    /// Cancel the running cycles fed by the processing loop
    fn cancel_sourced(&self) {
        for (flag, _) in self.lock().iter().filter(|(_, sourced)| *sourced) {
            flag.store(true, Ordering::Release);
        }
    }

    /// Cancel every running cycle
    fn cancel_all(&self) {
        for (flag, _) in self.lock().iter() {
            flag.store(true, Ordering::Release);
        }
    }
}

struct CycleToken<'a> {
    in_flight: &'a InFlight,
    flag: Arc<AtomicBool>,
}

impl Drop for CycleToken<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().retain(|(flag, _)| !Arc::ptr_eq(flag, &self.flag));
    }
}

struct EngineCore {
    chain: Arc<FilterChain>,
    arbiter: Mutex<InputArbiter>,
    sinks: SinkSet,
    recorder: Arc<RecordingSink>,
    recording_lane: RecordingLane,
    events: EventBus,
    metrics: MetricsTracker,
    face_detector: RwLock<Option<Arc<dyn FaceDetector>>>,
    face_detection: AtomicBool,
    mode: Mutex<ProcessingMode>,
    state: Mutex<SdkState>,
    debug_logging: AtomicBool,
    last_frame: Mutex<Option<Frame>>,
    in_flight: InFlight,
    cycles: AtomicU64,
}

impl EngineCore {
    fn arbiter(&self) -> MutexGuard<'_, InputArbiter> {
        self.arbiter.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> SdkState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mode(&self) -> ProcessingMode {
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn detect_faces(&self, frame: &Frame) -> Vec<crate::filters::FaceInfo> {
        if !self.face_detection.load(Ordering::Relaxed) || !self.chain.snapshot().requires_faces() {
            return Vec::new();
        }
        let detector = self
            .face_detector
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(detector) = detector else {
            return Vec::new();
        };
        let rgba = convert::to_rgba(frame);
        let faces = detector.detect(&rgba, frame.width(), frame.height());
        if !faces.is_empty() {
            self.events.publish(SdkEvent::FacesDetected(faces.clone()));
        }
        faces
    }

    /// One frame cycle
    ///
    /// `sourced` marks frames pulled from the active source, which a source
    /// switch cancels. `still_current` is consulted after processing; a frame
    /// whose source was replaced meanwhile is dropped without delivery.
    fn run_cycle(
        &self,
        frame: Frame,
        mirror: bool,
        sourced: bool,
        still_current: impl Fn() -> bool,
    ) -> SdkResult<Frame> {
        let started = Instant::now();
        let n = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        let token = self.in_flight.begin(sourced);

        let result = (|| {
            let frame = if mirror { convert::mirror(&frame)? } else { frame };
            let faces = self.detect_faces(&frame);
            self.chain.apply(&frame, &faces, &token.flag)
        })();
        drop(token);
        let elapsed = started.elapsed();
        let processing_time_ms = elapsed.as_secs_f64() * 1000.0;

        let processed = match result {
            Ok(processed) if still_current() => processed,
            Ok(_) => {
                self.metrics.record_dropped();
                debug!("Dropping frame from a replaced source");
                return Err(SourceError::Failed("source replaced during processing".into()).into());
            }
            Err(e) => {
                self.metrics.record_dropped();
                warn!(error = %e, "Frame dropped");
                self.events.publish(SdkEvent::FrameProcessed {
                    success: false,
                    processing_time_ms,
                    error: Some(e.clone()),
                });
                return Err(e);
            }
        };

        self.metrics.record_processed(elapsed);
        self.sinks.deliver(&processed, self.mode());
        if self.recorder.is_recording() {
            if let Err(e) = self.recording_lane.push_video(processed.clone()) {
                warn!(error = %e, "Recording lane rejected frame");
            }
        }
        *self.last_frame.lock().unwrap_or_else(PoisonError::into_inner) = Some(processed.clone());

        if self.debug_logging.load(Ordering::Relaxed) && n % FRAME_LOG_INTERVAL == 0 {
            debug!(
                frame = n,
                width = processed.width(),
                height = processed.height(),
                format = ?processed.format(),
                processing_ms = processing_time_ms,
                "Frame processed"
            );
        }

        self.events.publish(SdkEvent::FrameProcessed {
            success: true,
            processing_time_ms,
            error: None,
        });
        Ok(processed)
    }

    /// One iteration of the processing loop
    fn poll_active_source(&self) -> LoopAction {
        match self.state() {
            SdkState::Terminated => return LoopAction::Stop,
            SdkState::Ready => {}
            _ => {
                std::thread::sleep(IDLE_BACKOFF);
                return LoopAction::Continue;
            }
        }

        let active = self.arbiter().active_source();
        let Some((generation, kind, source)) = active else {
            std::thread::sleep(IDLE_BACKOFF);
            return LoopAction::Continue;
        };

        // The source lock is released before the arbiter is consulted again
        let (result, exhausted) = {
            let mut source = source.lock().unwrap_or_else(PoisonError::into_inner);
            let result = source.next_frame(SOURCE_POLL_TIMEOUT);
            (result, source.is_exhausted())
        };

        match result {
            Ok(Some(frame)) => {
                let current = || {
                    let arbiter = self.arbiter();
                    arbiter.generation() == generation && arbiter.active_kind() == Some(kind)
                };
                // Failures are already reported through FrameProcessed
                let _ = self.run_cycle(frame, false, true, current);
            }
            Ok(None) if exhausted => {
                info!(source = %kind, "Input source exhausted");
                let mut arbiter = self.arbiter();
                if arbiter.generation() == generation {
                    arbiter.release(kind);
                }
            }
            Ok(None) => {}
            Err(e) => {
                let mut arbiter = self.arbiter();
                if arbiter.generation() == generation {
                    arbiter.fail(kind, &e.to_string());
                }
                drop(arbiter);
                self.events.publish(SdkEvent::Error(e));
            }
        }
        LoopAction::Continue
    }
}

/// Owns the processing thread and everything it touches
pub struct ProcessingEngine {
    core: Arc<EngineCore>,
    worker: Mutex<Option<WorkerController>>,
}

impl ProcessingEngine {
    pub fn new(config: &SdkConfig) -> SdkResult<Self> {
        let events = EventBus::default();

        let mut arbiter = InputArbiter::new(config.conflict_strategy);
        let source_events = events.clone();
        arbiter.set_listener(move |event| {
            source_events.publish(match event {
                SourceEvent::SourceChanged { old, new } => SdkEvent::InputSourceChanged { old, new },
                SourceEvent::StateChanged { kind, state } => SdkEvent::InputStateChanged { kind, state },
            });
        });

        let recorder = Arc::new(
            RecordingSink::new(config.recording.effective_video_size(), config.recording.include_audio)
                .with_events(events.clone()),
        );
        let recording_lane = RecordingLane::spawn(Arc::clone(&recorder))?;

        let core = EngineCore {
            chain: Arc::new(FilterChain::new()),
            arbiter: Mutex::new(arbiter),
            sinks: SinkSet::new(),
            recorder,
            recording_lane,
            events,
            metrics: MetricsTracker::new(),
            face_detector: RwLock::new(None),
            face_detection: AtomicBool::new(config.enable_face_detection),
            mode: Mutex::new(config.processing_mode),
            state: Mutex::new(SdkState::Uninitialized),
            debug_logging: AtomicBool::new(config.enable_debug_logging),
            last_frame: Mutex::new(None),
            in_flight: InFlight::default(),
            cycles: AtomicU64::new(0),
        };

        Ok(Self {
            core: Arc::new(core),
            worker: Mutex::new(None),
        })
    }

    // ===== Shared components =====

    pub fn chain(&self) -> &Arc<FilterChain> {
        &self.core.chain
    }

    pub fn events(&self) -> &EventBus {
        &self.core.events
    }

    pub fn sinks(&self) -> &SinkSet {
        &self.core.sinks
    }

    pub fn recorder(&self) -> &Arc<RecordingSink> {
        &self.core.recorder
    }

    pub fn metrics(&self) -> ProcessingMetrics {
        let mut metrics = self.core.metrics.snapshot();
        metrics.frames_dropped += self.core.sinks.dropped_count();
        metrics
    }

    pub fn reset_metrics(&self) {
        self.core.metrics.reset();
    }

    // ===== Lifecycle =====

    pub fn state(&self) -> SdkState {
        self.core.state()
    }

    /// Move to `state`, publishing the transition
    pub(crate) fn transition(&self, state: SdkState) -> SdkState {
        let old = {
            let mut current = self.core.state.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *current, state)
        };
        if old != state {
            info!(from = %old, to = %state, "SDK state changed");
            self.core.events.publish(SdkEvent::StateChanged { old, new: state });
        }
        old
    }

    /// Spawn the processing thread if it is not running
    pub fn start(&self) -> SdkResult<()> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.as_ref().is_some_and(WorkerController::is_running) {
            return Ok(());
        }
        let core = Arc::clone(&self.core);
        *worker = Some(WorkerController::start("frame-processing", move || {
            core.poll_active_source()
        })?);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(WorkerController::is_running)
    }

    /// Stop the processing thread, cancelling the frame in flight
    pub fn stop(&self) {
        self.core.in_flight.cancel_all();
        let worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take();
        drop(worker);
    }

    /// Pause the active source and the loop
    pub fn pause(&self) -> SdkResult<()> {
        let state = self.state();
        if state != SdkState::Ready {
            return Err(SdkError::invalid_state("pause", state));
        }
        self.core.arbiter().pause_active();
        self.transition(SdkState::Paused);
        Ok(())
    }

    pub fn resume(&self) -> SdkResult<()> {
        let state = self.state();
        if state != SdkState::Paused {
            return Err(SdkError::invalid_state("resume", state));
        }
        self.core.arbiter().resume_active()?;
        self.transition(SdkState::Ready);
        Ok(())
    }

    /// Tear everything down; the engine cannot be restarted
    pub fn shutdown(&self) {
        if self.state() == SdkState::Terminated {
            return;
        }
        self.stop();
        if self.core.recorder.is_recording() {
            // Whatever was written so far is kept
            if let Err(e) = self.stop_recording() {
                warn!(error = %e, "Recording could not be finalised during shutdown");
            }
        }
        self.core.arbiter().stop_all();
        self.core.sinks.clear();
        *self.core.last_frame.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.transition(SdkState::Terminated);
    }

    // ===== Settings =====

    pub fn mode(&self) -> ProcessingMode {
        self.core.mode()
    }

    /// Switch mode, releasing an active source the new mode does not allow
    pub fn set_mode(&self, mode: ProcessingMode) {
        *self.core.mode.lock().unwrap_or_else(PoisonError::into_inner) = mode;
        let mut arbiter = self.core.arbiter();
        if let Some(kind) = arbiter.active_kind() {
            if !mode.allows(kind) {
                info!(source = %kind, %mode, "Releasing source not allowed in new mode");
                arbiter.release(kind);
            }
        }
    }

    pub fn set_face_detector(&self, detector: Option<Arc<dyn FaceDetector>>) {
        *self
            .core
            .face_detector
            .write()
            .unwrap_or_else(PoisonError::into_inner) = detector;
    }

    pub fn set_face_detection_enabled(&self, enabled: bool) {
        self.core.face_detection.store(enabled, Ordering::Relaxed);
    }

    pub fn is_face_detection_enabled(&self) -> bool {
        self.core.face_detection.load(Ordering::Relaxed)
    }

    pub fn set_debug_logging(&self, enabled: bool) {
        self.core.debug_logging.store(enabled, Ordering::Relaxed);
    }

    pub fn debug_logging(&self) -> bool {
        self.core.debug_logging.load(Ordering::Relaxed)
    }

    // ===== Sources =====

    pub fn register_source(&self, source: Box<dyn FrameSource>) {
        self.core.arbiter().register(source);
    }

    pub fn unregister_source(&self, kind: InputSourceKind) -> bool {
        self.core.arbiter().unregister(kind)
    }

    /// Ask for `kind` to become the active source
    pub fn request_source(&self, kind: InputSourceKind, priority: i32) -> SdkResult<RequestOutcome> {
        let mode = self.mode();
        if !mode.allows(kind) {
            return Err(SourceError::ModeRejected {
                kind,
                mode: mode.to_string(),
            }
            .into());
        }
        let mut arbiter = self.core.arbiter();
        if arbiter.active_kind().is_some_and(|active| active != kind) {
            // Cancel the frame of the outgoing source
            self.core.in_flight.cancel_sourced();
        }
        arbiter.request(kind, priority)
    }

    pub fn release_source(&self, kind: InputSourceKind) {
        let mut arbiter = self.core.arbiter();
        if arbiter.active_kind() == Some(kind) {
            self.core.in_flight.cancel_sourced();
        }
        arbiter.release(kind);
    }

    pub fn active_source(&self) -> Option<InputSourceKind> {
        self.core.arbiter().active_kind()
    }

    pub fn source_state(&self, kind: InputSourceKind) -> InputState {
        self.core.arbiter().state(kind)
    }

    pub fn conflict_strategy(&self) -> ConflictStrategy {
        self.core.arbiter().strategy()
    }

    pub fn set_conflict_strategy(&self, strategy: ConflictStrategy) {
        self.core.arbiter().set_strategy(strategy);
    }

    // ===== Frames =====

    /// Run one cycle on a caller-supplied frame
    ///
    /// The processed frame is delivered to the sinks like any looped frame
    /// and also returned.
    pub fn process_frame(&self, frame: Frame, mirror: bool) -> SdkResult<Frame> {
        self.core.run_cycle(frame, mirror, false, || true)
    }

    /// `process_frame` on the blocking pool
    pub async fn process_frame_async(&self, frame: Frame, mirror: bool) -> SdkResult<Frame> {
        let core = Arc::clone(&self.core);
        tokio::task::spawn_blocking(move || core.run_cycle(frame, mirror, false, || true))
            .await
            .map_err(|e| SdkError::Memory(format!("processing task failed: {}", e)))?
    }

    /// Most recent successfully processed frame
    pub fn last_frame(&self) -> Option<Frame> {
        self.core
            .last_frame
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // ===== Recording =====

    pub fn start_recording(&self, options: RecordingOptions) -> SdkResult<Uuid> {
        self.core.recorder.start(options)
    }

    /// Drain queued frames into the sink, then finalise
    pub fn stop_recording(&self) -> SdkResult<MuxOutput> {
        if !self.core.recording_lane.flush(RECORDING_FLUSH_TIMEOUT) {
            warn!("Recording lane did not drain in time");
        }
        self.core.recorder.stop()
    }

    /// Queue an audio buffer for the running recording
    pub fn append_audio(&self, buffer: AudioBuffer) -> SdkResult<()> {
        if !self.core.recorder.is_recording() {
            return Err(SdkError::invalid_state("append audio", self.core.recorder.state()));
        }
        self.core.recording_lane.push_audio(buffer)
    }
}

impl Drop for ProcessingEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::ExternalFrameSource;
    use crate::filters::ParamMap;

    fn ready_engine(mode: ProcessingMode) -> ProcessingEngine {
        let config = SdkConfig {
            processing_mode: mode,
            ..SdkConfig::default()
        };
        let engine = ProcessingEngine::new(&config).unwrap();
        engine.transition(SdkState::Ready);
        engine
    }

    fn frame(value: u8) -> Frame {
        Frame::from_rgba(2, 2, vec![value; 16], Duration::from_millis(1)).unwrap()
    }

    #[test]
    fn test_mode_rejects_source() {
        let engine = ready_engine(ProcessingMode::Live);
        engine.register_source(Box::new(ExternalFrameSource::new()));
        let err = engine.request_source(InputSourceKind::ExternalData, 0).unwrap_err();
        assert!(matches!(err, SdkError::Source(SourceError::ModeRejected { .. })));
    }

    #[test]
    fn test_fault_drops_frame_and_continues() {
        let engine = ready_engine(ProcessingMode::Offscreen);
        let effect = crate::filters::LoadedEffect::parse(
            br#"{"name": "broken", "passes": [{"id": 0, "kind": "posterize", "params": {"levels": 0}}]}"#,
            "broken",
        )
        .unwrap();
        engine.chain().install_effect(effect);
        let mut events = engine.events().subscribe();

        assert!(engine.process_frame(frame(10), false).is_err());
        let metrics = engine.metrics();
        assert_eq!(metrics.frames_dropped, 1);
        assert_eq!(metrics.frames_processed, 0);
        assert!(matches!(
            events.try_recv().unwrap(),
            SdkEvent::FrameProcessed { success: false, .. }
        ));

        engine.chain().unload_effect();
        assert!(engine.process_frame(frame(10), false).is_ok());
        assert_eq!(engine.metrics().frames_processed, 1);
    }

    #[test]
    fn test_direct_frames_survive_source_release() {
        let engine = ready_engine(ProcessingMode::Offscreen);
        engine.register_source(Box::new(ExternalFrameSource::new()));
        engine.request_source(InputSourceKind::ExternalData, 0).unwrap();
        engine.release_source(InputSourceKind::ExternalData);
        engine.stop();

        assert!(engine.process_frame(frame(10), false).is_ok());
        assert!(engine.process_frame(frame(20), false).is_ok());
        assert_eq!(engine.metrics().frames_dropped, 0);
    }

    #[test]
    fn test_cancellation_reaches_running_cycles_only() {
        let in_flight = InFlight::default();
        let sourced = in_flight.begin(true);
        let direct = in_flight.begin(false);

        in_flight.cancel_sourced();
        assert!(sourced.flag.load(Ordering::Acquire));
        assert!(!direct.flag.load(Ordering::Acquire));

        in_flight.cancel_all();
        assert!(direct.flag.load(Ordering::Acquire));

        drop(sourced);
        drop(direct);
        assert!(in_flight.lock().is_empty());
        let next = in_flight.begin(true);
        assert!(!next.flag.load(Ordering::Acquire));
    }

    #[test]
    fn test_pause_requires_ready() {
        let engine = ready_engine(ProcessingMode::Live);
        engine.pause().unwrap();
        assert_eq!(engine.state(), SdkState::Paused);
        assert!(engine.pause().is_err());
        engine.resume().unwrap();
        assert_eq!(engine.state(), SdkState::Ready);
    }

    #[test]
    fn test_loop_processes_external_frames() {
        let engine = ready_engine(ProcessingMode::Offscreen);
        let source = ExternalFrameSource::new();
        let injector = source.injector();
        engine.register_source(Box::new(source));
        engine.request_source(InputSourceKind::ExternalData, 0).unwrap();

        let mut params = ParamMap::new();
        params.insert("brightness".into(), 0.2);
        engine.chain().append_built_in("BrightnessFilter", &params).unwrap();
        engine.start().unwrap();

        assert!(injector.push_frame(frame(100)));
        let deadline = Instant::now() + Duration::from_secs(2);
        while engine.last_frame().is_none() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        let processed = engine.last_frame().unwrap();
        assert!(processed.data()[0] > 100);

        engine.shutdown();
        assert_eq!(engine.state(), SdkState::Terminated);
        assert!(!engine.is_running());
    }
}
