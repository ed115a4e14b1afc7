// SPDX-License-Identifier: GPL-3.0-only

//! Process-wide SDK context
//!
//! [`FilterSdk`] ties the processing engine, the effect cache, the cloud
//! filter manager, licensing and the camera together. There is no global
//! instance: the application creates one context, initializes it, passes it
//! where it is needed and calls [`FilterSdk::cleanup`] on shutdown.
//!
//! ```text
//! new ─▶ initialize ─▶ licence check ─▶ Ready ⇄ Paused ─▶ cleanup
//!                            │
//!                            └─▶ Error ─▶ retry_license_verification
//! ```

use crate::backends::camera::{self, CameraPosition, FlashMode, TorchMode};
use crate::backends::{
    CameraProvider, CameraSource, ConflictStrategy, ExternalFrameData, ExternalFrameInjector,
    ExternalFrameSource, ImageSource, InputSourceKind, InputState, RequestOutcome, SharedCamera,
    TestPatternCamera, VideoFileSource,
};
use crate::cloud::{
    CacheStats, CloudFilterEntry, CloudFilterManager, CloudFilterService, FilterCache,
    FilterMetadata, LocalCatalogService, LocalFilter, ProgressFn, local_filters,
};
use crate::config::SdkConfig;
use crate::constants::app_info;
use crate::errors::{SdkError, SdkResult, SourceError};
use crate::filters::{
    ActiveEffect, BuiltInKind, ChainConfiguration, EffectInfo, FaceDetector, FilterChain,
    LoadedEffect, ParamMap, ParameterDescriptor, Point, get_filter_info,
};
use crate::media::{AudioBuffer, Frame};
use crate::pipelines::engine::{ProcessingEngine, ProcessingMode, SdkState};
use crate::pipelines::events::SdkEvent;
use crate::pipelines::license::{LicenseInfo, LicenseValidator, OfflineLicenseValidator, validate_with_timeout};
use crate::pipelines::metrics::ProcessingMetrics;
use crate::pipelines::photo::{self, PhotoPipeline};
use crate::pipelines::sinks::{FrameCallback, PixelBufferCallback, RawFrameCallback, SinkLane};
use crate::pipelines::video::{MuxOutput, RecordingOptions, RecordingState};
use crate::storage;
use image::RgbaImage;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

#[derive(Debug, Default)]
struct LicenseStatus {
    info: Option<LicenseInfo>,
    error: Option<String>,
}

/// The SDK context
pub struct FilterSdk {
    config: SdkConfig,
    engine: ProcessingEngine,
    cache: Arc<Mutex<FilterCache>>,
    cloud: CloudFilterManager,
    validator: Arc<dyn LicenseValidator>,
    license: Mutex<LicenseStatus>,
    camera: SharedCamera,
    injector: Mutex<Option<ExternalFrameInjector>>,
    sources_registered: AtomicBool,
    active_effect: Mutex<Option<PathBuf>>,
    photo: PhotoPipeline,
    epoch: Instant,
}

impl FilterSdk {
    /// Build a context from `config`
    ///
    /// Until replaced, licences are checked by [`OfflineLicenseValidator::demo`],
    /// the camera is a [`TestPatternCamera`] and cloud filters come from a
    /// local catalogue under the cache directory.
    pub fn new(config: SdkConfig) -> SdkResult<Self> {
        let engine = ProcessingEngine::new(&config)?;
        let cache_dir = config.cache_dir();
        let cloud = CloudFilterManager::new(
            Arc::new(LocalCatalogService::new(cache_dir.join("catalog"))),
            cache_dir.join("filters"),
        );
        let cache = FilterCache::new(config.max_cache_size_bytes, config.automatic_cache_cleanup);

        Ok(Self {
            engine,
            cache: Arc::new(Mutex::new(cache)),
            cloud,
            validator: Arc::new(OfflineLicenseValidator::demo()),
            license: Mutex::new(LicenseStatus::default()),
            camera: camera::shared(TestPatternCamera::new()),
            injector: Mutex::new(None),
            sources_registered: AtomicBool::new(false),
            active_effect: Mutex::new(None),
            photo: PhotoPipeline::default(),
            epoch: Instant::now(),
            config,
        })
    }

    /// Use another licence validator
    pub fn with_license_validator(mut self, validator: Arc<dyn LicenseValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Use another cloud filter service
    pub fn with_cloud_service(mut self, service: Arc<dyn CloudFilterService>) -> Self {
        self.cloud = CloudFilterManager::new(service, self.config.cache_dir().join("filters"));
        self
    }

    /// Use another camera provider
    pub fn with_camera(mut self, provider: Box<dyn CameraProvider>) -> Self {
        self.camera = Arc::new(Mutex::new(provider));
        self
    }

    /// Supply face detection for face-dependent filters
    pub fn with_face_detector(self, detector: Arc<dyn FaceDetector>) -> Self {
        self.engine.set_face_detector(Some(detector));
        self
    }

    pub fn version(&self) -> &'static str {
        app_info::version()
    }

    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    pub fn state(&self) -> SdkState {
        self.engine.state()
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.state(), SdkState::Ready | SdkState::Paused)
    }

    /// Observe every SDK event
    pub fn subscribe(&self) -> broadcast::Receiver<SdkEvent> {
        self.engine.events().subscribe()
    }

    fn ensure_ready(&self, operation: &'static str) -> SdkResult<()> {
        match self.state() {
            SdkState::Ready => Ok(()),
            state => Err(SdkError::invalid_state(operation, state)),
        }
    }

    fn ensure_alive(&self, operation: &'static str) -> SdkResult<()> {
        match self.state() {
            SdkState::Terminated => Err(SdkError::invalid_state(operation, SdkState::Terminated)),
            _ => Ok(()),
        }
    }

    fn chain(&self) -> &Arc<FilterChain> {
        self.engine.chain()
    }

    fn cache(&self) -> MutexGuard<'_, FilterCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ===== Lifecycle =====

    /// Register sources, validate the licence and start processing
    pub async fn initialize(&self) -> SdkResult<()> {
        let state = self.state();
        if state != SdkState::Uninitialized {
            return Err(SdkError::invalid_state("initialize", state));
        }
        self.engine.transition(SdkState::Initializing);
        info!(version = self.version(), mode = %self.engine.mode(), "Initializing SDK");

        if let Err(e) = self.register_sources() {
            error!(error = %e, "SDK setup failed");
            self.engine.transition(SdkState::Error);
            return Err(SdkError::InitializationFailed(e.to_string()));
        }
        self.verify_license().await
    }

    /// `initialize` for frame processing without a camera
    pub async fn initialize_offscreen(&self, width: u32, height: u32) -> SdkResult<()> {
        if width == 0 || height == 0 {
            return Err(SdkError::InvalidParameter(format!(
                "offscreen size must be positive, got {}x{}",
                width, height
            )));
        }
        self.engine.set_mode(ProcessingMode::Offscreen);
        self.engine.recorder().set_video_size(width, height)?;
        self.initialize().await
    }

    fn register_sources(&self) -> SdkResult<()> {
        if self.sources_registered.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let external = ExternalFrameSource::new();
        *self.injector.lock().unwrap_or_else(PoisonError::into_inner) = Some(external.injector());
        self.engine.register_source(Box::new(external));
        self.engine.register_source(Box::new(CameraSource::new(
            Arc::clone(&self.camera),
            self.config.camera.clone(),
        )));
        self.engine.start()
    }

    async fn verify_license(&self) -> SdkResult<()> {
        let result = validate_with_timeout(
            self.validator.as_ref(),
            &self.config.api_key,
            self.config.license_timeout(),
        )
        .await;

        let mut status = self.license.lock().unwrap_or_else(PoisonError::into_inner);
        match result {
            Ok(info) => {
                self.chain().set_beauty_licensed(info.features.beauty);
                self.cloud.set_enabled(info.features.cloud_filters);
                status.info = Some(info);
                status.error = None;
                drop(status);
                self.engine.transition(SdkState::Ready);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Licence verification failed");
                self.chain().set_beauty_licensed(false);
                self.cloud.set_enabled(false);
                status.info = None;
                status.error = Some(e.to_string());
                drop(status);
                self.engine.transition(SdkState::Error);
                self.engine.events().publish(SdkEvent::Error(e.clone()));
                Err(e)
            }
        }
    }

    /// Validate the licence again after a failure, without repeating setup
    pub async fn retry_license_verification(&self) -> SdkResult<()> {
        let state = self.state();
        if state != SdkState::Error {
            return Err(SdkError::invalid_state("retry licence verification", state));
        }
        self.engine.transition(SdkState::Initializing);
        self.verify_license().await
    }

    pub fn is_license_valid(&self) -> bool {
        self.license
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .info
            .is_some()
    }

    pub fn license_error(&self) -> Option<String> {
        self.license
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .error
            .clone()
    }

    pub fn license_info(&self) -> Option<LicenseInfo> {
        self.license
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .info
            .clone()
    }

    pub fn pause(&self) -> SdkResult<()> {
        self.engine.pause()
    }

    pub fn resume(&self) -> SdkResult<()> {
        self.engine.resume()
    }

    /// Stop everything; the context cannot be used afterwards
    ///
    /// A running recording is finalised, not discarded.
    pub fn cleanup(&self) {
        if self.state() == SdkState::Terminated {
            return;
        }
        info!("Cleaning up SDK");
        self.engine.shutdown();
        *self.injector.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.cache().clear();
    }

    // ===== Processing =====

    pub fn processing_mode(&self) -> ProcessingMode {
        self.engine.mode()
    }

    pub fn set_processing_mode(&self, mode: ProcessingMode) {
        info!(%mode, "Processing mode changed");
        self.engine.set_mode(mode);
    }

    /// Start feeding frames from the mode's primary source
    pub fn start_processing(&self) -> SdkResult<RequestOutcome> {
        self.ensure_ready("start processing")?;
        let kind = match self.engine.mode() {
            ProcessingMode::Offscreen => InputSourceKind::ExternalData,
            ProcessingMode::Live | ProcessingMode::Hybrid => InputSourceKind::Camera,
        };
        self.request_source(kind, 0)
    }

    /// Release the active source
    pub fn stop_processing(&self) {
        if let Some(kind) = self.engine.active_source() {
            self.release_source(kind);
        }
    }

    pub fn request_source(&self, kind: InputSourceKind, priority: i32) -> SdkResult<RequestOutcome> {
        self.ensure_alive("request source")?;
        let outcome = self.engine.request_source(kind, priority)?;
        if kind == InputSourceKind::Camera && outcome == RequestOutcome::Activated {
            self.publish_camera_state();
        }
        Ok(outcome)
    }

    pub fn release_source(&self, kind: InputSourceKind) {
        self.engine.release_source(kind);
        if kind == InputSourceKind::Camera {
            self.publish_camera_state();
        }
    }

    pub fn active_source(&self) -> Option<InputSourceKind> {
        self.engine.active_source()
    }

    pub fn source_state(&self, kind: InputSourceKind) -> InputState {
        self.engine.source_state(kind)
    }

    pub fn conflict_strategy(&self) -> ConflictStrategy {
        self.engine.conflict_strategy()
    }

    pub fn set_conflict_strategy(&self, strategy: ConflictStrategy) {
        self.engine.set_conflict_strategy(strategy);
    }

    /// Make an image file the active source
    pub fn use_image_source(&self, path: &Path) -> SdkResult<RequestOutcome> {
        self.ensure_alive("use image source")?;
        self.engine.register_source(Box::new(ImageSource::open(path)?));
        self.engine.request_source(InputSourceKind::Image, 0)
    }

    /// Make a Y4M video file the active source
    pub fn use_video_file(&self, path: &Path) -> SdkResult<RequestOutcome> {
        self.ensure_alive("use video file")?;
        self.engine.register_source(Box::new(VideoFileSource::open(path)?));
        self.engine.request_source(InputSourceKind::VideoFile, 0)
    }

    /// Whether caller-supplied frames can be processed right now
    pub fn is_external_processing_available(&self) -> bool {
        self.state() == SdkState::Ready && self.engine.mode().allows(InputSourceKind::ExternalData)
    }

    fn ensure_external_processing(&self) -> SdkResult<()> {
        self.ensure_ready("process frame")?;
        let mode = self.engine.mode();
        if !mode.allows(InputSourceKind::ExternalData) {
            return Err(SourceError::ModeRejected {
                kind: InputSourceKind::ExternalData,
                mode: mode.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Run one frame through the chain and the sinks, returning the result
    pub fn process_frame(&self, frame: Frame, mirror: bool) -> SdkResult<Frame> {
        self.ensure_external_processing()?;
        self.engine.process_frame(frame, mirror)
    }

    /// `process_frame` for a raw caller buffer
    pub fn process_frame_data(&self, data: ExternalFrameData, mirror: bool) -> SdkResult<Frame> {
        let frame = data.into_frame(self.epoch.elapsed())?;
        self.process_frame(frame, mirror)
    }

    /// `process_frame` off the calling thread
    pub async fn process_frame_async(&self, frame: Frame, mirror: bool) -> SdkResult<Frame> {
        self.ensure_external_processing()?;
        self.engine.process_frame_async(frame, mirror).await
    }

    /// Queue a raw buffer for the processing loop
    ///
    /// Returns `false` when the external source is not active or its queue
    /// is full.
    pub fn push_external_frame(&self, data: ExternalFrameData) -> SdkResult<bool> {
        self.ensure_alive("push external frame")?;
        let injector = self.injector.lock().unwrap_or_else(PoisonError::into_inner).clone();
        match injector {
            Some(injector) => injector.push(data),
            None => Err(SdkError::invalid_state("push external frame", self.state())),
        }
    }

    pub fn processing_metrics(&self) -> ProcessingMetrics {
        self.engine.metrics()
    }

    pub fn reset_metrics(&self) {
        self.engine.reset_metrics();
    }

    pub fn set_face_detection_enabled(&self, enabled: bool) {
        self.engine.set_face_detection_enabled(enabled);
    }

    // ===== Output callbacks =====

    /// Preview frames, delivered in modes with a preview surface
    pub fn set_preview_callback(&self, callback: Option<FrameCallback>) -> SdkResult<()> {
        self.engine.sinks().set_callback(SinkLane::Preview, callback)
    }

    pub fn set_live_frame_stream_callback(&self, callback: Option<FrameCallback>) -> SdkResult<()> {
        self.engine.sinks().set_callback(SinkLane::LiveStream, callback)
    }

    pub fn set_pixel_buffer_callback(&self, callback: Option<PixelBufferCallback>) -> SdkResult<()> {
        self.engine.sinks().set_pixel_buffer_callback(callback)
    }

    /// Raw RGBA frames for an external recorder
    pub fn set_recording_callback(&self, callback: Option<RawFrameCallback>) -> SdkResult<()> {
        self.engine.sinks().set_raw_frame_callback(callback)
    }

    /// Enable delivery to the raw frame callback
    pub fn set_recording_enabled(&self, enabled: bool) {
        self.engine.sinks().set_enabled(SinkLane::RawFrame, enabled);
    }

    /// Enable delivery to the pixel buffer callback
    pub fn set_live_frame_output_enabled(&self, enabled: bool) {
        self.engine.sinks().set_enabled(SinkLane::PixelBuffer, enabled);
    }

    // ===== Effects =====

    fn load_cached(&self, path: &Path) -> SdkResult<Arc<LoadedEffect>> {
        self.cache().get_or_load(path)
    }

    fn install(&self, path: &Path, effect: &LoadedEffect) -> EffectInfo {
        let info = effect.info();
        self.chain().install_effect(effect.clone());
        *self.active_effect.lock().unwrap_or_else(PoisonError::into_inner) = Some(path.to_path_buf());
        self.engine.events().publish(SdkEvent::EffectStateChanged {
            effect: Some(info.name.clone()),
        });
        info
    }

    /// Load an effect file (through the cache) and make it the active effect
    pub async fn apply_effect(&self, path: impl AsRef<Path>) -> SdkResult<EffectInfo> {
        self.ensure_alive("apply effect")?;
        let path = path.as_ref().to_path_buf();
        let cache = Arc::clone(&self.cache);
        let target = path.clone();
        let effect = tokio::task::spawn_blocking(move || {
            cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get_or_load(&target)
        })
        .await
        .map_err(|e| SdkError::Memory(format!("effect load task failed: {}", e)))??;
        Ok(self.install(&path, &effect))
    }

    /// `apply_effect` on the calling thread
    pub fn apply_effect_sync(&self, path: impl AsRef<Path>) -> SdkResult<EffectInfo> {
        self.ensure_alive("apply effect")?;
        let path = path.as_ref();
        let effect = self.load_cached(path)?;
        Ok(self.install(path, &effect))
    }

    /// Unload the active effect, keeping built-in filters
    pub fn unload_effect(&self) -> bool {
        let unloaded = self.chain().unload_effect();
        *self.active_effect.lock().unwrap_or_else(PoisonError::into_inner) = None;
        if unloaded {
            self.engine.events().publish(SdkEvent::EffectStateChanged { effect: None });
        }
        unloaded
    }

    pub fn active_effect_path(&self) -> Option<PathBuf> {
        self.active_effect
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn has_active_effects(&self) -> bool {
        !self.chain().active_effects().is_empty()
    }

    /// Parameters exposed by the active effect
    pub fn effect_parameters(&self) -> Vec<ParameterDescriptor> {
        self.chain()
            .effect_info()
            .map(|info| info.parameters)
            .unwrap_or_default()
    }

    pub fn set_effect_parameter(&self, name: &str, value: f32) -> bool {
        self.chain().set_parameter(name, value)
    }

    pub fn effect_parameter_value(&self, name: &str) -> f32 {
        self.chain().get_parameter(name)
    }

    /// Metadata of an effect file without installing it
    pub fn filter_info(&self, path: &Path) -> SdkResult<EffectInfo> {
        get_filter_info(path)
    }

    /// Render an effect over `image` without touching the live chain
    pub fn preview_filter(&self, path: &Path, image: &RgbaImage) -> SdkResult<RgbaImage> {
        let effect = self.load_cached(path)?;
        let chain = FilterChain::new();
        chain.install_effect(LoadedEffect::clone(&effect));
        let frame = Frame::from_rgba(image.width(), image.height(), image.as_raw().clone(), Duration::ZERO)?;
        let rendered = chain.apply(&frame, &[], &AtomicBool::new(false))?;
        photo::frame_to_image(&rendered)
    }

    /// Reload the active effect from disk, bypassing the cache
    pub fn force_filter_chain_rebuild(&self) -> SdkResult<()> {
        let Some(path) = self.active_effect_path() else {
            return Ok(());
        };
        self.cache().clear_entry(&path.to_string_lossy());
        let effect = self.load_cached(&path)?;
        self.install(&path, &effect);
        debug!(path = %path.display(), "Filter chain rebuilt");
        Ok(())
    }

    pub fn set_effects_enabled(&self, enabled: bool) {
        self.chain().set_effects_enabled(enabled);
    }

    pub fn effects_enabled(&self) -> bool {
        self.chain().effects_enabled()
    }

    pub fn reset_to_defaults(&self) {
        self.chain().reset_to_defaults();
        self.publish_filters();
    }

    pub fn active_effects(&self) -> Vec<ActiveEffect> {
        self.chain().active_effects()
    }

    pub fn save_effect_configuration(&self) -> ChainConfiguration {
        self.chain().save_configuration()
    }

    pub fn restore_effect_configuration(&self, configuration: &ChainConfiguration) -> SdkResult<()> {
        self.chain().restore_configuration(configuration)?;
        *self.active_effect.lock().unwrap_or_else(PoisonError::into_inner) =
            configuration.effect.as_ref().map(|e| e.path.clone());
        self.publish_filters();
        Ok(())
    }

    /// Remove the effect and every built-in filter
    pub fn remove_all_filters(&self) {
        self.unload_effect();
        self.remove_all_built_in_filters();
    }

    pub fn is_beauty_effect_enabled(&self) -> bool {
        self.license_info().is_some_and(|info| info.features.beauty)
    }

    pub fn is_cloud_filter_enabled(&self) -> bool {
        self.cloud.is_enabled()
    }

    // ===== Built-in filters =====

    fn publish_filters(&self) {
        let filters = self
            .chain()
            .snapshot()
            .stages()
            .iter()
            .filter(|s| s.is_active())
            .map(|s| s.name().to_string())
            .collect();
        self.engine.events().publish(SdkEvent::FiltersUpdated { filters });
    }

    /// Add a built-in filter or update its parameters
    pub fn apply_built_in(&self, kind: BuiltInKind, values: &[(&str, f32)]) -> SdkResult<()> {
        let values: ParamMap = values.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        self.chain().append_built_in(kind.name(), &values)?;
        self.publish_filters();
        Ok(())
    }

    pub fn apply_rgb_filter(&self, red: f32, green: f32, blue: f32) -> SdkResult<()> {
        self.apply_built_in(BuiltInKind::Rgb, &[("red", red), ("green", green), ("blue", blue)])
    }

    pub fn apply_brightness_filter(&self, brightness: f32) -> SdkResult<()> {
        self.apply_built_in(BuiltInKind::Brightness, &[("brightness", brightness)])
    }

    pub fn apply_contrast_filter(&self, contrast: f32) -> SdkResult<()> {
        self.apply_built_in(BuiltInKind::Contrast, &[("contrast", contrast)])
    }

    pub fn apply_face_slimming(&self, level: f32) -> SdkResult<()> {
        self.apply_built_in(BuiltInKind::FaceSlimming, &[("level", level)])
    }

    pub fn apply_eye_enlargement(&self, level: f32) -> SdkResult<()> {
        self.apply_built_in(BuiltInKind::EyeEnlargement, &[("level", level)])
    }

    pub fn apply_nose_size(&self, level: f32) -> SdkResult<()> {
        self.apply_built_in(BuiltInKind::NoseSize, &[("level", level)])
    }

    pub fn apply_skin_smoothing(&self, level: f32) -> SdkResult<()> {
        self.apply_built_in(BuiltInKind::SkinSmoothing, &[("level", level)])
    }

    pub fn apply_skin_whitening(&self, level: f32) -> SdkResult<()> {
        self.apply_built_in(BuiltInKind::SkinWhitening, &[("level", level)])
    }

    pub fn apply_sharpening(&self, level: f32) -> SdkResult<()> {
        self.apply_built_in(BuiltInKind::Sharpen, &[("level", level)])
    }

    /// Blend level of a makeup filter (`"LipstickFilter"` or `"BlusherFilter"`)
    pub fn apply_makeup_blend_level(&self, filter_name: &str, level: f32) -> SdkResult<()> {
        match BuiltInKind::from_name(filter_name) {
            Some(kind @ (BuiltInKind::Lipstick | BuiltInKind::Blusher)) => {
                self.apply_built_in(kind, &[("level", level)])
            }
            _ => Err(SdkError::InvalidParameter(format!(
                "'{}' is not a makeup filter",
                filter_name
            ))),
        }
    }

    pub fn apply_grayscale_filter(&self) -> SdkResult<()> {
        self.apply_built_in(BuiltInKind::Grayscale, &[])
    }

    pub fn apply_hue(&self, hue_angle: f32) -> SdkResult<()> {
        self.apply_built_in(BuiltInKind::Hue, &[("hue", hue_angle)])
    }

    /// Hue is added, saturation and brightness multiply the current values
    pub fn adjust_hsb(&self, hue: f32, saturation: f32, brightness: f32) -> SdkResult<()> {
        self.chain().adjust_hsb(hue, saturation, brightness)?;
        self.publish_filters();
        Ok(())
    }

    pub fn reset_hsb_filter(&self) {
        self.chain().reset_hsb();
        self.publish_filters();
    }

    pub fn apply_white_balance(&self, temperature: f32, tint: f32) -> SdkResult<()> {
        self.apply_built_in(BuiltInKind::WhiteBalance, &[("temperature", temperature), ("tint", tint)])
    }

    pub fn remove_built_in_filter(&self, name: &str) -> bool {
        let removed = self.chain().remove_by_name(name);
        if removed {
            self.publish_filters();
        }
        removed
    }

    pub fn remove_all_built_in_filters(&self) {
        self.chain().remove_all();
        self.publish_filters();
    }

    pub fn has_active_built_in_filters(&self) -> bool {
        self.chain().snapshot().stages().iter().any(|s| s.is_active())
    }

    // ===== Cloud filters and local effects =====

    /// Refresh the cloud catalogue
    pub async fn fetch_cloud_filters(&self) -> SdkResult<Vec<FilterMetadata>> {
        self.cloud.refresh().await
    }

    /// Last fetched catalogue with download status
    pub fn cloud_filters(&self) -> Vec<CloudFilterEntry> {
        self.cloud.cloud_filters()
    }

    /// Download a cloud filter, returning its local effect path
    pub async fn download_cloud_filter(&self, id: &str, progress: Option<ProgressFn>) -> SdkResult<PathBuf> {
        self.cloud.download(id, progress).await
    }

    pub fn is_cloud_filter_downloaded(&self, id: &str) -> bool {
        self.cloud.is_downloaded(id)
    }

    pub fn cloud_filter_local_path(&self, id: &str) -> Option<PathBuf> {
        self.cloud.local_path(id)
    }

    pub fn remove_cloud_filter(&self, id: &str) -> SdkResult<bool> {
        let path = self.cloud.local_path(id);
        let removed = self.cloud.remove(id)?;
        if let Some(path) = path {
            self.cache().clear_entry(&path.to_string_lossy());
        }
        Ok(removed)
    }

    /// Apply an already downloaded cloud filter
    pub async fn apply_cloud_filter(&self, id: &str) -> SdkResult<EffectInfo> {
        if !self.cloud.is_enabled() {
            return Err(SdkError::FeatureNotEnabled("cloud_filters".into()));
        }
        let path = self
            .cloud
            .local_path(id)
            .ok_or_else(|| SdkError::ResourceNotFound(format!("cloud filter {} is not downloaded", id)))?;
        self.apply_effect(path).await
    }

    /// Effect files available on disk
    pub fn local_filters(&self) -> SdkResult<Vec<LocalFilter>> {
        local_filters(self.cloud.download_dir())
    }

    /// Filter names grouped by origin: built-in, local and cloud
    pub fn initial_filters(&self) -> BTreeMap<String, Vec<String>> {
        let mut groups = BTreeMap::new();
        groups.insert(
            "built_in".to_string(),
            BuiltInKind::ALL
                .iter()
                .filter(|k| !k.requires_beauty() || self.is_beauty_effect_enabled())
                .map(|k| k.name().to_string())
                .collect(),
        );
        groups.insert(
            "local".to_string(),
            self.local_filters()
                .unwrap_or_default()
                .into_iter()
                .map(|f| f.info.name)
                .collect(),
        );
        groups.insert(
            "cloud".to_string(),
            self.cloud_filters().into_iter().map(|f| f.metadata.name).collect(),
        );
        groups
    }

    // ===== Effect cache =====

    pub fn cache_size(&self) -> u64 {
        self.cache().size_bytes()
    }

    pub fn cache_count(&self) -> usize {
        self.cache().count()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache().stats()
    }

    pub fn set_max_cache_size(&self, max_size_bytes: u64) {
        self.cache().set_max_size(max_size_bytes);
    }

    pub fn enable_automatic_cache_cleanup(&self, enabled: bool) {
        self.cache().set_automatic_cleanup(enabled);
    }

    /// Trim the cache to half its ceiling
    pub fn force_cache_cleanup(&self) -> usize {
        self.cache().force_cleanup()
    }

    pub fn clear_cache_entry(&self, filter_name: &str) -> bool {
        self.cache().clear_entry(filter_name)
    }

    pub fn clear_filters_cache(&self) {
        self.cache().clear();
    }

    /// Release what can be rebuilt on demand
    pub fn force_memory_cleanup(&self) {
        let evicted = self.force_cache_cleanup();
        debug!(evicted, "Memory cleanup");
    }

    // ===== Recording =====

    /// Start recording to `path`, or to a timestamped file in the recording directory
    pub fn start_recording(&self, path: Option<PathBuf>) -> SdkResult<PathBuf> {
        self.ensure_ready("start recording")?;
        let recording = &self.config.recording;
        let output_path = path.unwrap_or_else(|| storage::recording_path(&self.config.recording_dir()));
        let mut options = RecordingOptions::new(output_path.clone());
        options.frame_rate = camera::Framerate::from_int(recording.effective_frame_rate());
        options.max_duration = recording.max_duration();
        options.max_file_size = Some(recording.max_file_size_bytes).filter(|size| *size > 0);
        self.engine.start_recording(options)?;
        Ok(output_path)
    }

    /// Finalise the recording, waiting for queued frames
    pub fn stop_recording(&self) -> SdkResult<MuxOutput> {
        self.engine.stop_recording()
    }

    pub fn is_recording(&self) -> bool {
        self.engine.recorder().is_recording()
    }

    pub fn recording_state(&self) -> RecordingState {
        self.engine.recorder().state()
    }

    pub fn current_recording_duration(&self) -> Duration {
        self.engine.recorder().current_duration()
    }

    /// Frames written to the running recording
    pub fn recorded_frames(&self) -> u64 {
        self.engine.recorder().frames_written()
    }

    pub fn set_video_size(&self, width: u32, height: u32) -> SdkResult<()> {
        self.engine.recorder().set_video_size(width, height)
    }

    pub fn set_include_audio(&self, include: bool) -> SdkResult<()> {
        self.engine.recorder().set_include_audio(include)
    }

    pub fn append_audio(&self, buffer: AudioBuffer) -> SdkResult<()> {
        self.engine.append_audio(buffer)
    }

    // ===== Photos =====

    /// The last processed frame as an image
    pub fn capture_photo(&self) -> SdkResult<RgbaImage> {
        let frame = self
            .engine
            .last_frame()
            .ok_or_else(|| SdkError::ResourceNotFound("no processed frame to capture".into()))?;
        photo::frame_to_image(&frame)
    }

    /// Save the last processed frame to `path`, or to the photos directory as JPEG
    pub async fn save_photo(&self, path: Option<PathBuf>) -> SdkResult<PathBuf> {
        let frame = self
            .engine
            .last_frame()
            .ok_or_else(|| SdkError::ResourceNotFound("no processed frame to capture".into()))?;
        let path = path.unwrap_or_else(|| storage::photo_path(&storage::default_photos_dir(), "jpg"));
        self.photo.save(&frame, path).await
    }

    // ===== Camera =====

    fn publish_camera_state(&self) {
        let position = camera::lock(&self.camera).position();
        let running = self.engine.active_source() == Some(InputSourceKind::Camera);
        self.engine
            .events()
            .publish(SdkEvent::CameraStateChanged { position, running });
    }

    pub fn camera_position(&self) -> CameraPosition {
        camera::lock(&self.camera).position()
    }

    pub fn has_camera_position(&self, position: CameraPosition) -> bool {
        camera::lock(&self.camera).available_positions().contains(&position)
    }

    /// Flip between front and back cameras
    pub fn switch_camera(&self) -> SdkResult<CameraPosition> {
        let target = self.camera_position().flipped();
        self.switch_to_position(target)?;
        Ok(target)
    }

    pub fn switch_to_position(&self, position: CameraPosition) -> SdkResult<()> {
        camera::lock(&self.camera).switch_to(position)?;
        info!(?position, "Camera switched");
        self.publish_camera_state();
        Ok(())
    }

    pub fn set_camera_frame_rate(&self, fps: u32) -> bool {
        camera::lock(&self.camera).set_frame_rate(fps)
    }

    pub fn set_zoom_factor(&self, factor: f32) -> bool {
        camera::lock(&self.camera).set_zoom_factor(factor)
    }

    pub fn zoom_factor(&self) -> f32 {
        camera::lock(&self.camera).zoom_factor()
    }

    pub fn max_zoom_factor(&self) -> f32 {
        camera::lock(&self.camera).max_zoom_factor()
    }

    pub fn set_focus_point(&self, point: Point) -> bool {
        camera::lock(&self.camera).set_focus_point(point)
    }

    pub fn set_exposure_point(&self, point: Point) -> bool {
        camera::lock(&self.camera).set_exposure_point(point)
    }

    pub fn reset_focus_and_exposure(&self) {
        camera::lock(&self.camera).reset_focus_and_exposure();
    }

    pub fn has_flash(&self) -> bool {
        camera::lock(&self.camera).has_flash()
    }

    pub fn has_torch(&self) -> bool {
        camera::lock(&self.camera).has_torch()
    }

    pub fn set_flash_mode(&self, mode: FlashMode) -> bool {
        camera::lock(&self.camera).set_flash_mode(mode)
    }

    pub fn set_torch_mode(&self, mode: TorchMode) -> bool {
        camera::lock(&self.camera).set_torch_mode(mode)
    }

    // ===== Diagnostics =====

    pub fn set_debug_logging_enabled(&self, enabled: bool) {
        self.engine.set_debug_logging(enabled);
    }

    pub fn is_debug_logging_enabled(&self) -> bool {
        self.engine.debug_logging()
    }

    /// Snapshot of the SDK state for bug reports
    pub fn export_debug_info(&self) -> serde_json::Value {
        json!({
            "version": self.version(),
            "state": self.state(),
            "processing_mode": self.engine.mode(),
            "active_source": self.engine.active_source(),
            "conflict_strategy": self.engine.conflict_strategy(),
            "license": {
                "valid": self.is_license_valid(),
                "error": self.license_error(),
                "info": self.license_info(),
            },
            "recording": {
                "state": self.recording_state(),
                "duration_secs": self.current_recording_duration().as_secs_f64(),
            },
            "chain": {
                "effects_enabled": self.effects_enabled(),
                "active_effect": self.active_effect_path(),
                "active": self.active_effects(),
            },
            "cache": self.cache_stats(),
            "metrics": self.processing_metrics(),
            "debug_logging": self.is_debug_logging_enabled(),
        })
    }
}

impl Drop for FilterSdk {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(key: &str) -> SdkConfig {
        let mut config = SdkConfig::with_api_key(key);
        config.processing_mode = ProcessingMode::Offscreen;
        config.cloud_filter_cache_path = Some(std::env::temp_dir().join("lumafx-sdk-tests"));
        config
    }

    #[tokio::test]
    async fn test_invalid_licence_then_retry() {
        let sdk = FilterSdk::new(config("wrong")).unwrap();
        assert!(matches!(sdk.initialize().await, Err(SdkError::LicenseInvalid(_))));
        assert_eq!(sdk.state(), SdkState::Error);
        assert!(sdk.license_error().is_some());
        assert!(!sdk.is_license_valid());

        assert!(sdk.retry_license_verification().await.is_err());
        assert_eq!(sdk.state(), SdkState::Error);
        assert!(matches!(
            sdk.process_frame(Frame::from_rgba(1, 1, vec![0u8; 4], Duration::ZERO).unwrap(), false),
            Err(SdkError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn test_beauty_follows_licence() {
        let sdk = FilterSdk::new(config("basic"))
            .unwrap()
            .with_license_validator(Arc::new(
                OfflineLicenseValidator::new().with_key("basic", LicenseInfo::new(Default::default())),
            ));
        sdk.initialize().await.unwrap();
        assert!(!sdk.is_beauty_effect_enabled());
        assert!(matches!(sdk.apply_skin_smoothing(0.5), Err(SdkError::FeatureNotEnabled(_))));
        assert!(sdk.apply_brightness_filter(0.1).is_ok());
        assert!(sdk.has_active_built_in_filters());
        sdk.cleanup();
        assert_eq!(sdk.state(), SdkState::Terminated);
    }

    #[tokio::test]
    async fn test_makeup_blend_level_names() {
        let sdk = FilterSdk::new(config("demo")).unwrap();
        sdk.initialize().await.unwrap();
        assert!(sdk.apply_makeup_blend_level("lipstick", 0.4).is_ok());
        assert!(sdk.apply_makeup_blend_level("BlusherFilter", 0.2).is_ok());
        assert!(sdk.apply_makeup_blend_level("ContrastFilter", 0.2).is_err());
        assert_eq!(sdk.effect_parameter_value("LipstickFilter.level"), 0.4);
    }

    #[tokio::test]
    async fn test_debug_info_snapshot() {
        let sdk = FilterSdk::new(config("demo")).unwrap();
        sdk.initialize().await.unwrap();
        let info = sdk.export_debug_info();
        assert_eq!(info["state"], "ready");
        assert_eq!(info["processing_mode"], "offscreen");
        assert_eq!(info["license"]["valid"], true);
    }
}
