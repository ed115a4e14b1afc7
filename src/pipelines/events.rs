// SPDX-License-Identifier: GPL-3.0-only

//! Observer event stream
//!
//! All notifications the SDK produces travel as one tagged [`SdkEvent`] over a
//! broadcast channel. Observers subscribe and match on the variants they care
//! about; slow observers lag and lose the oldest events rather than stalling
//! the pipeline.

use super::engine::SdkState;
use super::video::RecordingState;
use crate::backends::camera::CameraPosition;
use crate::backends::{InputSourceKind, InputState};
use crate::errors::SdkError;
use crate::filters::FaceInfo;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Events buffered per subscriber before the oldest are discarded
pub const EVENT_CAPACITY: usize = 256;

/// Notification delivered to observers
#[derive(Debug, Clone)]
pub enum SdkEvent {
    /// SDK lifecycle transition
    StateChanged { old: SdkState, new: SdkState },
    /// Asynchronous failure outside a frame cycle (licensing, sources)
    Error(SdkError),
    /// Faces found in the latest frame
    FacesDetected(Vec<FaceInfo>),
    /// Active input source switched
    InputSourceChanged {
        old: Option<InputSourceKind>,
        new: InputSourceKind,
    },
    /// Input source lifecycle transition
    InputStateChanged { kind: InputSourceKind, state: InputState },
    /// One frame cycle completed
    FrameProcessed {
        success: bool,
        processing_time_ms: f64,
        error: Option<SdkError>,
    },
    /// Effect file installed or removed
    EffectStateChanged { effect: Option<String> },
    /// Built-in filter list or cloud catalogue changed
    FiltersUpdated { filters: Vec<String> },
    /// Recording sink transition
    RecordingStateChanged(RecordingState),
    /// Recording finalised
    RecordingFinished(Result<PathBuf, SdkError>),
    /// Camera position or running state changed
    CameraStateChanged { position: CameraPosition, running: bool },
}

/// Broadcast channel for [`SdkEvent`]s
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SdkEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SdkEvent> {
        self.sender.subscribe()
    }

    /// Publish an event, returns the number of observers reached
    pub fn publish(&self, event: SdkEvent) -> usize {
        // No subscribers is not an error for fire-and-forget notifications
        self.sender.send(event).unwrap_or(0)
    }

    pub fn observer_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

pub type SharedEventBus = Arc<EventBus>;

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{Duration, timeout};

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        let reached = bus.publish(SdkEvent::InputSourceChanged {
            old: Some(InputSourceKind::ExternalData),
            new: InputSourceKind::Camera,
        });
        assert_eq!(reached, 1);

        let event = timeout(Duration::from_millis(100), rx.recv()).await.unwrap().unwrap();
        assert!(matches!(
            event,
            SdkEvent::InputSourceChanged {
                old: Some(InputSourceKind::ExternalData),
                new: InputSourceKind::Camera
            }
        ));
    }

    #[test]
    fn test_publish_without_observers() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(SdkEvent::FiltersUpdated { filters: vec![] }), 0);
        assert_eq!(bus.observer_count(), 0);
    }
}
