// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! - Listing the built-in filters
//! - Inspecting effect files
//! - Filtering still images
//! - Recording the test-pattern camera
//! - Browsing a cloud filter catalogue

use lumafx::backends::camera::TestPatternCamera;
use lumafx::cloud::{LocalCatalogService, ProgressFn};
use lumafx::filters::{BuiltInKind, get_filter_info};
use lumafx::pipelines::photo::PhotoPipeline;
use lumafx::{FilterSdk, Frame, ProcessingMode, SdkConfig, SdkResult};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

type CliResult = Result<(), Box<dyn std::error::Error>>;

pub struct ApplyArgs {
    pub input: PathBuf,
    pub output: PathBuf,
    pub filters: Vec<String>,
    pub effect: Option<PathBuf>,
    pub mirror: bool,
    pub api_key: String,
}

pub struct RecordArgs {
    pub output: Option<PathBuf>,
    pub frames: u64,
    pub fps: u32,
    pub filters: Vec<String>,
    pub effect: Option<PathBuf>,
    pub api_key: String,
}

/// List every built-in filter with its parameter ranges
pub fn list_filters() -> CliResult {
    println!("Built-in filters:");
    println!();
    for kind in BuiltInKind::ALL {
        let mut tags = Vec::new();
        if kind.requires_beauty() {
            tags.push("beauty");
        }
        if kind.requires_faces() {
            tags.push("face");
        }
        if tags.is_empty() {
            println!("  {}", kind.name());
        } else {
            println!("  {} [{}]", kind.name(), tags.join(", "));
        }
        for param in kind.descriptors() {
            println!(
                "      {:<12} {} .. {} (default {})",
                param.name, param.min, param.max, param.default
            );
        }
    }
    Ok(())
}

/// Print the metadata of an effect file
pub fn inspect_effect(path: &Path) -> CliResult {
    let info = get_filter_info(path)?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

/// Apply `Stage` or `Stage.param=value` filter arguments
fn apply_filter_args(sdk: &FilterSdk, filters: &[String]) -> SdkResult<()> {
    for arg in filters {
        let (target, value) = match arg.split_once('=') {
            Some((target, value)) => {
                let value = value.trim().parse::<f32>().map_err(|_| {
                    lumafx::SdkError::InvalidParameter(format!("'{}' is not a number in '{}'", value, arg))
                })?;
                (target.trim(), Some(value))
            }
            None => (arg.trim(), None),
        };
        let (stage, param) = match target.split_once('.') {
            Some((stage, param)) => (stage, Some(param)),
            None => (target, None),
        };
        let kind = BuiltInKind::from_name(stage)
            .ok_or_else(|| lumafx::SdkError::InvalidParameter(format!("unknown filter '{}'", stage)))?;
        match (param, value) {
            (Some(param), Some(value)) => sdk.apply_built_in(kind, &[(param, value)])?,
            (None, None) => sdk.apply_built_in(kind, &[])?,
            _ => {
                return Err(lumafx::SdkError::InvalidParameter(format!(
                    "expected Stage or Stage.param=value, got '{}'",
                    arg
                )));
            }
        }
    }
    Ok(())
}

/// Filter a still image and save the result
pub fn apply_to_image(args: ApplyArgs) -> CliResult {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let mut config = SdkConfig::with_api_key(args.api_key);
        config.processing_mode = ProcessingMode::Offscreen;
        let sdk = FilterSdk::new(config)?;
        sdk.initialize().await?;

        if let Some(effect) = &args.effect {
            let info = sdk.apply_effect(effect).await?;
            println!("Effect: {} ({} passes)", info.name, info.passes.len());
        }
        apply_filter_args(&sdk, &args.filters)?;

        let image = image::open(&args.input)?.to_rgba8();
        let (width, height) = image.dimensions();
        let frame = Frame::from_rgba(width, height, image.into_raw(), Duration::ZERO)?;
        let processed = sdk.process_frame(frame, args.mirror)?;

        let path = PhotoPipeline::default().save(&processed, args.output).await?;
        let metrics = sdk.processing_metrics();
        println!(
            "Saved {}x{} image to {} in {:.1} ms",
            width,
            height,
            path.display(),
            metrics.avg_processing_time_ms
        );
        sdk.cleanup();
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

/// Record the test-pattern camera through the chain
pub fn record(args: RecordArgs) -> CliResult {
    if args.frames == 0 {
        return Err("frame count must be positive".into());
    }
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let mut config = SdkConfig::with_api_key(args.api_key);
        config.processing_mode = ProcessingMode::Live;
        config.camera.frame_rate = args.fps;
        config.recording.frame_rate = args.fps;
        config.recording.include_audio = false;
        config.recording.video_size = Some(config.camera.session_preset.size());

        let sdk = FilterSdk::new(config)?.with_camera(Box::new(TestPatternCamera::new()));
        sdk.initialize().await?;
        if let Some(effect) = &args.effect {
            sdk.apply_effect(effect).await?;
        }
        apply_filter_args(&sdk, &args.filters)?;

        sdk.start_processing()?;
        let path = sdk.start_recording(args.output)?;
        println!("Recording to {}", path.display());
        println!("Press Ctrl+C to stop early");

        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_flag_clone = Arc::clone(&stop_flag);
        ctrlc::set_handler(move || {
            stop_flag_clone.store(true, Ordering::SeqCst);
        })?;

        let started = Instant::now();
        let budget = Duration::from_secs_f64(args.frames as f64 / args.fps.max(1) as f64) + Duration::from_secs(5);
        while sdk.is_recording() && sdk.recorded_frames() < args.frames {
            if stop_flag.load(Ordering::SeqCst) {
                println!();
                println!("Stopping early...");
                break;
            }
            if started.elapsed() > budget {
                println!();
                println!("Camera stalled, stopping");
                break;
            }
            print!("\rFrames: {}/{}", sdk.recorded_frames(), args.frames);
            std::io::stdout().flush()?;
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        println!();

        sdk.stop_processing();
        let output = sdk.stop_recording()?;
        println!(
            "Video saved: {} ({} frames, {:.2}s, {} bytes)",
            output.video.display(),
            output.frames,
            sdk.current_recording_duration().as_secs_f64(),
            output.bytes
        );
        sdk.cleanup();
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

/// List a catalogue and optionally download one filter
pub fn cloud(catalog: &Path, download: Option<&str>, api_key: &str) -> CliResult {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let mut config = SdkConfig::with_api_key(api_key);
        config.processing_mode = ProcessingMode::Offscreen;
        let sdk = FilterSdk::new(config)?.with_cloud_service(Arc::new(LocalCatalogService::new(catalog)));
        sdk.initialize().await?;

        sdk.fetch_cloud_filters().await?;
        println!("Cloud filters:");
        for entry in sdk.cloud_filters() {
            let status = if entry.downloaded { "downloaded" } else { "available" };
            println!(
                "  {:<20} {:<24} {:>8} bytes  {}",
                entry.metadata.id, entry.metadata.name, entry.metadata.size_bytes, status
            );
        }

        if let Some(id) = download {
            let progress: ProgressFn = Arc::new(|p: f32| {
                print!("\rDownloading: {:>3.0}%", p * 100.0);
                let _ = std::io::stdout().flush();
            });
            let path = sdk.download_cloud_filter(id, Some(progress)).await?;
            println!();
            println!("Saved to {}", path.display());
        }
        sdk.cleanup();
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
