// SPDX-License-Identifier: GPL-3.0-only

//! Input arbitration
//!
//! Per-source state machine:
//!
//! ```text
//! inactive → initializing → active → paused → active
//!                              │        └──→ inactive (release)
//!                              └──→ error
//! ```
//!
//! Only one source may be initializing or active at a time. When a new source
//! is requested while another holds the slot, the [`ConflictStrategy`]
//! decides what happens. A paused source does not hold the slot and is
//! released when another source activates.

use super::{FrameSource, InputSourceKind, InputState};
use crate::errors::{SdkResult, SourceError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// What to do when a source is requested while another is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Stop the current source, then start the requested one
    #[default]
    AutoStopPrevious,
    /// Reject the request and leave the current source running
    ErrorOnConflict,
    /// Start the requested source once the current one is released
    QueueRequest,
    /// Higher priority preempts, equal or lower priority is rejected
    PriorityBased,
}

/// Source lifecycle notifications
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    /// The active source changed
    SourceChanged {
        old: Option<InputSourceKind>,
        new: InputSourceKind,
    },
    /// A source moved to a new state
    StateChanged {
        kind: InputSourceKind,
        state: InputState,
    },
}

/// Result of a source request that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The requested source is now active
    Activated,
    /// The request waits for the current source to be released
    Queued,
}

/// A registered source shared between the arbiter and the processing thread
pub type SharedSource = Arc<Mutex<Box<dyn FrameSource>>>;

type Listener = Arc<dyn Fn(SourceEvent) + Send + Sync>;

struct Slot {
    source: SharedSource,
    state: InputState,
    priority: i32,
}

/// Arbitrates the single active input source
pub struct InputArbiter {
    slots: HashMap<InputSourceKind, Slot>,
    active: Option<InputSourceKind>,
    /// Last source that gave up the slot, reported as `old` on the next switch
    previous: Option<InputSourceKind>,
    queue: VecDeque<(InputSourceKind, i32)>,
    strategy: ConflictStrategy,
    generation: u64,
    listener: Option<Listener>,
}

impl InputArbiter {
    pub fn new(strategy: ConflictStrategy) -> Self {
        Self {
            slots: HashMap::new(),
            active: None,
            previous: None,
            queue: VecDeque::new(),
            strategy,
            generation: 0,
            listener: None,
        }
    }

    /// Receive source notifications
    pub fn set_listener(&mut self, listener: impl Fn(SourceEvent) + Send + Sync + 'static) {
        self.listener = Some(Arc::new(listener));
    }

    pub fn strategy(&self) -> ConflictStrategy {
        self.strategy
    }

    pub fn set_strategy(&mut self, strategy: ConflictStrategy) {
        debug!(?strategy, "Conflict strategy changed");
        self.strategy = strategy;
    }

    /// Register a source, replacing (and stopping) any previous one of the same kind
    pub fn register(&mut self, source: Box<dyn FrameSource>) {
        let kind = source.kind();
        if self.slots.contains_key(&kind) {
            self.deactivate(kind);
        }
        self.slots.insert(
            kind,
            Slot {
                source: Arc::new(Mutex::new(source)),
                state: InputState::Inactive,
                priority: 0,
            },
        );
        debug!(source = %kind, "Registered input source");
    }

    /// Remove a source, stopping it first
    pub fn unregister(&mut self, kind: InputSourceKind) -> bool {
        if !self.slots.contains_key(&kind) {
            return false;
        }
        self.deactivate(kind);
        self.queue.retain(|(k, _)| *k != kind);
        self.slots.remove(&kind);
        self.service_queue();
        true
    }

    pub fn is_registered(&self, kind: InputSourceKind) -> bool {
        self.slots.contains_key(&kind)
    }

    /// Source currently holding the active slot
    pub fn active_kind(&self) -> Option<InputSourceKind> {
        self.active
    }

    /// State of a registered source (inactive if unknown)
    pub fn state(&self, kind: InputSourceKind) -> InputState {
        self.slots
            .get(&kind)
            .map(|slot| slot.state)
            .unwrap_or_default()
    }

    /// Sources currently in the active state
    pub fn active_count(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| slot.state == InputState::Active)
            .count()
    }

    /// Incremented every time a source becomes active
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The active source, if it is producing frames
    pub fn active_source(&self) -> Option<(u64, InputSourceKind, SharedSource)> {
        let kind = self.active?;
        let slot = self.slots.get(&kind)?;
        (slot.state == InputState::Active).then(|| (self.generation, kind, Arc::clone(&slot.source)))
    }

    /// Requests waiting for the active slot
    pub fn queued(&self) -> Vec<InputSourceKind> {
        self.queue.iter().map(|(k, _)| *k).collect()
    }

    /// Request that `kind` becomes the active source
    pub fn request(&mut self, kind: InputSourceKind, priority: i32) -> SdkResult<RequestOutcome> {
        if !self.slots.contains_key(&kind) {
            return Err(SourceError::NotRegistered(kind).into());
        }

        if self.active == Some(kind) {
            if self.state(kind) == InputState::Paused {
                self.resume_active()?;
            }
            return Ok(RequestOutcome::Activated);
        }

        if let Some(current) = self.active {
            let current_state = self.state(current);
            if current_state.holds_slot() {
                match self.strategy {
                    ConflictStrategy::AutoStopPrevious => {}
                    ConflictStrategy::ErrorOnConflict => {
                        debug!(active = %current, requested = %kind, "Rejecting conflicting source");
                        return Err(SourceError::Conflict {
                            active: current,
                            requested: kind,
                        }
                        .into());
                    }
                    ConflictStrategy::QueueRequest => {
                        if !self.queue.iter().any(|(k, _)| *k == kind) {
                            self.queue.push_back((kind, priority));
                        }
                        debug!(active = %current, requested = %kind, "Queued source request");
                        return Ok(RequestOutcome::Queued);
                    }
                    ConflictStrategy::PriorityBased => {
                        let current_priority = self.slots.get(&current).map_or(0, |s| s.priority);
                        if priority <= current_priority {
                            return Err(SourceError::Conflict {
                                active: current,
                                requested: kind,
                            }
                            .into());
                        }
                        info!(
                            active = %current,
                            requested = %kind,
                            priority,
                            current_priority,
                            "Preempting lower priority source"
                        );
                    }
                }
            }
            self.deactivate(current);
        }

        self.activate(kind, priority)?;
        Ok(RequestOutcome::Activated)
    }

    /// Release a source back to inactive and start the next queued request
    pub fn release(&mut self, kind: InputSourceKind) {
        self.queue.retain(|(k, _)| *k != kind);
        if self.active == Some(kind) || self.state(kind) != InputState::Inactive {
            self.deactivate(kind);
        }
        self.service_queue();
    }

    /// Pause the active source; it keeps its resources but frees the slot
    pub fn pause_active(&mut self) -> bool {
        let Some(kind) = self.active else {
            return false;
        };
        let Some(slot) = self.slots.get_mut(&kind) else {
            return false;
        };
        if slot.state != InputState::Active {
            return false;
        }
        lock(&slot.source).pause();
        self.set_state(kind, InputState::Paused);
        true
    }

    /// Resume the paused active source
    pub fn resume_active(&mut self) -> SdkResult<bool> {
        let Some(kind) = self.active else {
            return Ok(false);
        };
        let Some(slot) = self.slots.get(&kind) else {
            return Ok(false);
        };
        if slot.state != InputState::Paused {
            return Ok(false);
        }
        let result = lock(&slot.source).resume();
        match result {
            Ok(()) => {
                self.set_state(kind, InputState::Active);
                Ok(true)
            }
            Err(e) => {
                self.fail(kind, &e.to_string());
                Err(e)
            }
        }
    }

    /// Record a failure of a running source and free the slot
    pub fn fail(&mut self, kind: InputSourceKind, reason: &str) {
        warn!(source = %kind, reason, "Input source failed");
        if let Some(slot) = self.slots.get(&kind) {
            lock(&slot.source).stop();
        }
        self.set_state(kind, InputState::Error);
        if self.active == Some(kind) {
            self.active = None;
        }
        self.service_queue();
    }

    /// Stop every source and drop queued requests
    pub fn stop_all(&mut self) {
        self.queue.clear();
        let kinds: Vec<InputSourceKind> = self.slots.keys().copied().collect();
        for kind in kinds {
            if self.state(kind) != InputState::Inactive {
                self.deactivate(kind);
            }
        }
    }

    fn activate(&mut self, kind: InputSourceKind, priority: i32) -> SdkResult<()> {
        let old = self.active.or(self.previous.take()).filter(|k| *k != kind);
        self.set_state(kind, InputState::Initializing);
        self.active = Some(kind);

        let Some(slot) = self.slots.get_mut(&kind) else {
            return Err(SourceError::NotRegistered(kind).into());
        };
        slot.priority = priority;
        let started = lock(&slot.source).start();

        match started {
            Ok(()) => {
                self.generation += 1;
                self.set_state(kind, InputState::Active);
                info!(old = ?old, new = %kind, "Input source activated");
                self.emit(SourceEvent::SourceChanged { old, new: kind });
                Ok(())
            }
            Err(e) => {
                warn!(source = %kind, error = %e, "Input source failed to start");
                self.set_state(kind, InputState::Error);
                self.active = None;
                Err(e)
            }
        }
    }

    fn deactivate(&mut self, kind: InputSourceKind) {
        if let Some(slot) = self.slots.get(&kind) {
            lock(&slot.source).stop();
        }
        if self.active == Some(kind) {
            self.active = None;
            self.previous = Some(kind);
        }
        self.set_state(kind, InputState::Inactive);
    }

    fn service_queue(&mut self) {
        while self.active.is_none() {
            let Some((kind, priority)) = self.queue.pop_front() else {
                break;
            };
            if !self.slots.contains_key(&kind) {
                continue;
            }
            if let Err(e) = self.activate(kind, priority) {
                warn!(source = %kind, error = %e, "Queued source failed to start");
            }
        }
    }

    fn set_state(&mut self, kind: InputSourceKind, state: InputState) {
        let Some(slot) = self.slots.get_mut(&kind) else {
            return;
        };
        if slot.state == state {
            return;
        }
        slot.state = state;
        debug!(source = %kind, ?state, "Input state changed");
        self.emit(SourceEvent::StateChanged { kind, state });
    }

    fn emit(&self, event: SourceEvent) {
        if let Some(listener) = &self.listener {
            listener(event);
        }
    }
}

impl Drop for InputArbiter {
    fn drop(&mut self) {
        self.stop_all();
    }
}

fn lock(source: &SharedSource) -> std::sync::MutexGuard<'_, Box<dyn FrameSource>> {
    source.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SdkError;
    use crate::media::Frame;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    struct MockSource {
        kind: InputSourceKind,
        running: Arc<AtomicBool>,
        fail_start: bool,
    }

    impl MockSource {
        fn new(kind: InputSourceKind) -> (Box<dyn FrameSource>, Arc<AtomicBool>) {
            let running = Arc::new(AtomicBool::new(false));
            let source = MockSource {
                kind,
                running: Arc::clone(&running),
                fail_start: false,
            };
            (Box::new(source), running)
        }
    }

    impl FrameSource for MockSource {
        fn kind(&self) -> InputSourceKind {
            self.kind
        }

        fn start(&mut self) -> SdkResult<()> {
            if self.fail_start {
                return Err(SourceError::Failed("boom".into()).into());
            }
            self.running.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn stop(&mut self) {
            self.running.store(false, Ordering::SeqCst);
        }

        fn next_frame(&mut self, _timeout: Duration) -> SdkResult<Option<Frame>> {
            Ok(None)
        }
    }

    fn arbiter_with(strategy: ConflictStrategy) -> (InputArbiter, Arc<AtomicBool>, Arc<AtomicBool>) {
        let mut arbiter = InputArbiter::new(strategy);
        let (camera, camera_running) = MockSource::new(InputSourceKind::Camera);
        let (external, external_running) = MockSource::new(InputSourceKind::ExternalData);
        arbiter.register(camera);
        arbiter.register(external);
        (arbiter, camera_running, external_running)
    }

    #[test]
    fn test_auto_stop_previous() {
        let (mut arbiter, camera, external) = arbiter_with(ConflictStrategy::AutoStopPrevious);
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        arbiter.set_listener(move |e| sink.lock().unwrap().push(e));

        arbiter.request(InputSourceKind::ExternalData, 0).unwrap();
        arbiter.request(InputSourceKind::Camera, 0).unwrap();

        assert_eq!(arbiter.active_kind(), Some(InputSourceKind::Camera));
        assert_eq!(arbiter.state(InputSourceKind::ExternalData), InputState::Inactive);
        assert_eq!(arbiter.active_count(), 1);
        assert!(camera.load(Ordering::SeqCst));
        assert!(!external.load(Ordering::SeqCst));
        assert!(events.lock().unwrap().contains(&SourceEvent::SourceChanged {
            old: Some(InputSourceKind::ExternalData),
            new: InputSourceKind::Camera,
        }));
    }

    #[test]
    fn test_error_on_conflict_keeps_active() {
        let (mut arbiter, camera, _) = arbiter_with(ConflictStrategy::ErrorOnConflict);
        arbiter.request(InputSourceKind::Camera, 0).unwrap();
        let err = arbiter.request(InputSourceKind::ExternalData, 0).unwrap_err();
        assert!(matches!(err, SdkError::Source(SourceError::Conflict { .. })));
        assert_eq!(arbiter.active_kind(), Some(InputSourceKind::Camera));
        assert!(camera.load(Ordering::SeqCst));
    }

    #[test]
    fn test_queue_request_serviced_on_release() {
        let (mut arbiter, _, external) = arbiter_with(ConflictStrategy::QueueRequest);
        arbiter.request(InputSourceKind::Camera, 0).unwrap();
        assert_eq!(
            arbiter.request(InputSourceKind::ExternalData, 0).unwrap(),
            RequestOutcome::Queued
        );
        assert_eq!(arbiter.active_kind(), Some(InputSourceKind::Camera));

        arbiter.release(InputSourceKind::Camera);
        assert_eq!(arbiter.active_kind(), Some(InputSourceKind::ExternalData));
        assert!(external.load(Ordering::SeqCst));
    }

    #[test]
    fn test_priority_based() {
        let (mut arbiter, _, _) = arbiter_with(ConflictStrategy::PriorityBased);
        arbiter.request(InputSourceKind::Camera, 5).unwrap();
        assert!(arbiter.request(InputSourceKind::ExternalData, 5).is_err());
        assert!(arbiter.request(InputSourceKind::ExternalData, 2).is_err());
        arbiter.request(InputSourceKind::ExternalData, 9).unwrap();
        assert_eq!(arbiter.active_kind(), Some(InputSourceKind::ExternalData));
    }

    #[test]
    fn test_paused_source_does_not_conflict() {
        let (mut arbiter, camera, _) = arbiter_with(ConflictStrategy::ErrorOnConflict);
        arbiter.request(InputSourceKind::Camera, 0).unwrap();
        assert!(arbiter.pause_active());
        arbiter.request(InputSourceKind::ExternalData, 0).unwrap();
        assert_eq!(arbiter.state(InputSourceKind::Camera), InputState::Inactive);
        assert!(!camera.load(Ordering::SeqCst));
    }

    #[test]
    fn test_unregistered_source() {
        let mut arbiter = InputArbiter::new(ConflictStrategy::default());
        let err = arbiter.request(InputSourceKind::Image, 0).unwrap_err();
        assert!(matches!(err, SdkError::Source(SourceError::NotRegistered(_))));
    }

    #[test]
    fn test_failed_start_leaves_slot_free() {
        let mut arbiter = InputArbiter::new(ConflictStrategy::default());
        let source = MockSource {
            kind: InputSourceKind::Camera,
            running: Arc::new(AtomicBool::new(false)),
            fail_start: true,
        };
        arbiter.register(Box::new(source));
        assert!(arbiter.request(InputSourceKind::Camera, 0).is_err());
        assert_eq!(arbiter.active_kind(), None);
        assert_eq!(arbiter.state(InputSourceKind::Camera), InputState::Error);
    }
}
