// SPDX-License-Identifier: GPL-3.0-only

//! End-to-end tests through the public API

use lumafx::backends::ExternalFrameData;
use lumafx::errors::{RecordingError, SourceError};
use lumafx::pipelines::video::{RecordingOptions, RecordingSink, RecordingState};
use lumafx::{
    ConflictStrategy, FilterSdk, Frame, InputSourceKind, InputState, PixelFormat, ProcessingMode, SdkConfig,
    SdkError, SdkEvent,
};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::error::TryRecvError;

fn config(mode: ProcessingMode, cache: &Path) -> SdkConfig {
    let mut config = SdkConfig::with_api_key("demo");
    config.processing_mode = mode;
    config.cloud_filter_cache_path = Some(cache.to_path_buf());
    config.recording.include_audio = false;
    config.recording.video_size = Some((8, 8));
    config
}

fn gradient(width: u32, height: u32, timestamp: Duration) -> Frame {
    let data: Vec<u8> = (0..width * height * 4).map(|i| (i * 7 % 251) as u8).collect();
    Frame::from_rgba(width, height, data, timestamp).unwrap()
}

fn write_effect(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("a.fx.json");
    std::fs::write(
        &path,
        r#"{
            "name": "A",
            "passes": [{ "id": 0, "kind": "warm", "params": { "intensity": 1.0 } }],
            "parameters": [
                { "name": "intensity", "default": 1.0, "min": 0.0, "max": 1.0, "pass": 0 }
            ]
        }"#,
    )
    .unwrap();
    path
}

#[tokio::test]
async fn test_effect_parameter_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let sdk = FilterSdk::new(config(ProcessingMode::Offscreen, dir.path())).unwrap();
    sdk.initialize().await.unwrap();

    let info = sdk.apply_effect_sync(write_effect(dir.path())).unwrap();
    assert_eq!(info.name, "A");
    assert!(sdk.has_active_effects());

    assert!(sdk.set_effect_parameter("intensity", 0.5));
    assert_eq!(sdk.effect_parameter_value("intensity"), 0.5);

    // Out of range values are clamped, not rejected
    assert!(sdk.set_effect_parameter("intensity", 2.0));
    assert_eq!(sdk.effect_parameter_value("intensity"), 1.0);
    assert!(sdk.set_effect_parameter("intensity", -1.0));
    assert_eq!(sdk.effect_parameter_value("intensity"), 0.0);

    assert!(!sdk.set_effect_parameter("missing", 0.5));
    sdk.cleanup();
}

#[tokio::test]
async fn test_empty_chain_is_identity() {
    let dir = tempfile::tempdir().unwrap();
    let sdk = FilterSdk::new(config(ProcessingMode::Offscreen, dir.path())).unwrap();
    sdk.initialize().await.unwrap();

    let input = gradient(16, 8, Duration::from_millis(5));
    let output = sdk.process_frame(input.clone(), false).unwrap();
    assert_eq!(output.data(), input.data());
    assert_eq!((output.width(), output.height()), (16, 8));
    assert_eq!(output.timestamp(), input.timestamp());
    sdk.cleanup();
}

#[tokio::test]
async fn test_camera_replaces_external_data() {
    let dir = tempfile::tempdir().unwrap();
    let sdk = FilterSdk::new(config(ProcessingMode::Hybrid, dir.path())).unwrap();
    sdk.initialize().await.unwrap();
    assert_eq!(sdk.conflict_strategy(), ConflictStrategy::AutoStopPrevious);
    let mut events = sdk.subscribe();

    sdk.request_source(InputSourceKind::ExternalData, 0).unwrap();
    assert_eq!(sdk.active_source(), Some(InputSourceKind::ExternalData));

    sdk.request_source(InputSourceKind::Camera, 0).unwrap();
    assert_eq!(sdk.active_source(), Some(InputSourceKind::Camera));
    assert_eq!(sdk.source_state(InputSourceKind::ExternalData), InputState::Inactive);
    assert_eq!(sdk.source_state(InputSourceKind::Camera), InputState::Active);

    let mut switched = false;
    loop {
        let event = match events.try_recv() {
            Ok(event) => event,
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        };
        if matches!(
            event,
            SdkEvent::InputSourceChanged {
                old: Some(InputSourceKind::ExternalData),
                new: InputSourceKind::Camera
            }
        ) {
            switched = true;
        }
    }
    assert!(switched);
    sdk.cleanup();
}

#[tokio::test]
async fn test_error_on_conflict_keeps_active_source() {
    let dir = tempfile::tempdir().unwrap();
    let sdk = FilterSdk::new(config(ProcessingMode::Hybrid, dir.path())).unwrap();
    sdk.initialize().await.unwrap();
    sdk.set_conflict_strategy(ConflictStrategy::ErrorOnConflict);

    sdk.request_source(InputSourceKind::Camera, 0).unwrap();
    let err = sdk.request_source(InputSourceKind::ExternalData, 0).unwrap_err();
    assert!(matches!(err, SdkError::Source(SourceError::Conflict { .. })));
    assert_eq!(sdk.active_source(), Some(InputSourceKind::Camera));
    assert_eq!(sdk.source_state(InputSourceKind::ExternalData), InputState::Inactive);
    sdk.cleanup();
}

#[test]
fn test_recording_duration() {
    let dir = tempfile::tempdir().unwrap();
    let sink = RecordingSink::new((4, 4), false);
    sink.start(RecordingOptions::new(dir.path().join("clip.y4m"))).unwrap();

    for i in 0..30u64 {
        sink.append_video_frame(&gradient(4, 4, Duration::from_millis(i * 33))).unwrap();
    }
    let output = sink.stop().unwrap();

    assert_eq!(output.frames, 30);
    assert!(output.video.exists());
    assert_eq!(sink.state(), RecordingState::Idle);
    let duration = sink.current_duration().as_secs_f64();
    assert!((duration - 0.99).abs() < 0.01, "duration {}", duration);
}

#[test]
fn test_recording_without_frames() {
    let dir = tempfile::tempdir().unwrap();
    let sink = RecordingSink::new((4, 4), false);
    sink.start(RecordingOptions::new(dir.path().join("empty.y4m"))).unwrap();

    let err = sink.stop().unwrap_err();
    assert!(matches!(err, SdkError::Recording(RecordingError::EmptyRecording)));
    assert_eq!(sink.state(), RecordingState::Idle);
    assert_eq!(sink.current_duration(), Duration::ZERO);
}

#[test]
fn test_recording_rejects_stale_timestamp() {
    let dir = tempfile::tempdir().unwrap();
    let sink = RecordingSink::new((4, 4), false);
    sink.start(RecordingOptions::new(dir.path().join("clip.y4m"))).unwrap();

    sink.append_video_frame(&gradient(4, 4, Duration::from_millis(0))).unwrap();
    sink.append_video_frame(&gradient(4, 4, Duration::from_millis(100))).unwrap();
    let before = sink.current_duration();

    let err = sink
        .append_video_frame(&gradient(4, 4, Duration::from_millis(50)))
        .unwrap_err();
    assert!(matches!(
        err,
        SdkError::Recording(RecordingError::NonMonotonicTimestamp { .. })
    ));
    assert_eq!(sink.current_duration(), before);
    assert_eq!(sink.frames_written(), 2);
    assert!(sink.is_recording());

    sink.append_video_frame(&gradient(4, 4, Duration::from_millis(200))).unwrap();
    assert_eq!(sink.stop().unwrap().frames, 3);
}

#[tokio::test]
async fn test_external_frames_are_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let sdk = FilterSdk::new(config(ProcessingMode::Offscreen, dir.path())).unwrap();
    sdk.initialize().await.unwrap();
    sdk.apply_brightness_filter(0.1).unwrap();
    sdk.start_processing().unwrap();
    assert_eq!(sdk.active_source(), Some(InputSourceKind::ExternalData));

    let path = sdk.start_recording(Some(dir.path().join("out.y4m"))).unwrap();
    for i in 0..10u64 {
        loop {
            let data = ExternalFrameData::new(vec![90u8; 8 * 8 * 4], 8, 8)
                .with_format(PixelFormat::Rgba32)
                .with_timestamp(Duration::from_millis(i * 33));
            if sdk.push_external_frame(data).unwrap() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    while sdk.recorded_frames() < 10 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let output = sdk.stop_recording().unwrap();
    assert_eq!(output.video, path);
    assert_eq!(output.frames, 10);
    assert!(sdk.processing_metrics().frames_processed >= 10);
    sdk.cleanup();
}

#[tokio::test]
async fn test_process_frame_after_stop_processing() {
    let dir = tempfile::tempdir().unwrap();
    let sdk = FilterSdk::new(config(ProcessingMode::Offscreen, dir.path())).unwrap();
    sdk.initialize().await.unwrap();
    sdk.apply_brightness_filter(0.1).unwrap();

    sdk.start_processing().unwrap();
    sdk.stop_processing();
    assert_eq!(sdk.active_source(), None);

    for i in 0..3u64 {
        let processed = sdk.process_frame(gradient(2, 2, Duration::from_millis(i)), false).unwrap();
        assert_eq!((processed.width(), processed.height()), (2, 2));
    }
    assert_eq!(sdk.processing_metrics().frames_processed, 3);
    assert_eq!(sdk.processing_metrics().frames_dropped, 0);
    sdk.cleanup();
}

/// Number of pictures in a YUV4MPEG2 stream of `width`x`height` I420 frames
fn y4m_frame_count(bytes: &[u8], width: usize, height: usize) -> usize {
    let header_end = bytes.iter().position(|b| *b == b'\n').unwrap() + 1;
    let picture = width * height + 2 * width.div_ceil(2) * height.div_ceil(2);
    let mut offset = header_end;
    let mut frames = 0;
    while offset < bytes.len() {
        assert_eq!(&bytes[offset..offset + 6], b"FRAME\n");
        offset += 6 + picture;
        frames += 1;
    }
    assert_eq!(offset, bytes.len());
    frames
}

#[tokio::test]
async fn test_cleanup_finalises_recording() {
    let dir = tempfile::tempdir().unwrap();
    let sdk = FilterSdk::new(config(ProcessingMode::Offscreen, dir.path())).unwrap();
    sdk.initialize().await.unwrap();
    let mut events = sdk.subscribe();

    let path = sdk.start_recording(Some(dir.path().join("partial.y4m"))).unwrap();
    for i in 0..5u64 {
        sdk.process_frame(gradient(8, 8, Duration::from_millis(i * 33)), false)
            .unwrap();
    }
    sdk.cleanup();

    assert_eq!(sdk.state(), lumafx::SdkState::Terminated);
    assert!(!sdk.is_recording());
    let bytes = std::fs::read(&path).unwrap();
    assert!(bytes.starts_with(b"YUV4MPEG2 W8 H8"));
    assert_eq!(y4m_frame_count(&bytes, 8, 8), 5);

    let mut finished = None;
    loop {
        match events.try_recv() {
            Ok(SdkEvent::RecordingFinished(result)) => finished = Some(result),
            Ok(_) | Err(TryRecvError::Lagged(_)) => {}
            Err(_) => break,
        }
    }
    assert_eq!(finished.unwrap().unwrap(), path);
}
