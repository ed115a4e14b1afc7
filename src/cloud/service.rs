// SPDX-License-Identifier: GPL-3.0-only

//! Cloud filter catalogue and downloads

use super::{CloudFilterEntry, FilterMetadata, ProgressFn};
use crate::constants::cache::{CATALOG_FILE, DOWNLOAD_CHUNK_BYTES};
use crate::constants::file_formats::EFFECT_SUFFIX;
use crate::errors::{SdkError, SdkResult};
use crate::filters::LoadedEffect;
use futures::future::BoxFuture;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Remote filter catalogue
pub trait CloudFilterService: Send + Sync {
    /// Every filter the service offers
    fn list(&self) -> BoxFuture<'_, SdkResult<Vec<FilterMetadata>>>;

    /// Download the effect payload for `id`, reporting progress in `[0, 1]`
    fn fetch<'a>(&'a self, id: &'a str, progress: Option<ProgressFn>) -> BoxFuture<'a, SdkResult<Vec<u8>>>;
}

#[derive(Debug, Deserialize)]
struct Catalog {
    filters: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    #[serde(flatten)]
    metadata: FilterMetadata,
    /// Effect file relative to the catalogue directory
    file: PathBuf,
}

/// Catalogue served from a local directory
///
/// The directory holds a `catalog.json` of the form
/// `{"filters": [{"id", "name", "category", "description", "file"}]}` next to
/// the effect files it references.
#[derive(Debug, Clone)]
pub struct LocalCatalogService {
    root: PathBuf,
}

impl LocalCatalogService {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn read_catalog(&self) -> SdkResult<Vec<CatalogEntry>> {
        let path = self.root.join(CATALOG_FILE);
        let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                SdkError::ResourceNotFound(format!("filter catalogue {}", path.display()))
            }
            _ => SdkError::Network(format!("cannot read catalogue: {}", e)),
        })?;
        let catalog: Catalog = serde_json::from_slice(&bytes)
            .map_err(|e| SdkError::Network(format!("malformed catalogue {}: {}", path.display(), e)))?;
        Ok(catalog.filters)
    }
}

impl CloudFilterService for LocalCatalogService {
    fn list(&self) -> BoxFuture<'_, SdkResult<Vec<FilterMetadata>>> {
        Box::pin(async move {
            let mut filters = Vec::new();
            for entry in self.read_catalog().await? {
                let mut metadata = entry.metadata;
                if metadata.size_bytes == 0 {
                    metadata.size_bytes = tokio::fs::metadata(self.root.join(&entry.file))
                        .await
                        .map(|m| m.len())
                        .unwrap_or(0);
                }
                filters.push(metadata);
            }
            debug!(count = filters.len(), root = %self.root.display(), "Catalogue listed");
            Ok(filters)
        })
    }

    fn fetch<'a>(&'a self, id: &'a str, progress: Option<ProgressFn>) -> BoxFuture<'a, SdkResult<Vec<u8>>> {
        Box::pin(async move {
            let entry = self
                .read_catalog()
                .await?
                .into_iter()
                .find(|e| e.metadata.id == id)
                .ok_or_else(|| SdkError::ResourceNotFound(format!("cloud filter {}", id)))?;
            let path = self.root.join(&entry.file);

            let mut file = tokio::fs::File::open(&path)
                .await
                .map_err(|e| SdkError::Network(format!("cannot open {}: {}", path.display(), e)))?;
            let total = file.metadata().await.map(|m| m.len()).unwrap_or(0);

            let mut data = Vec::with_capacity(total as usize);
            let mut chunk = vec![0u8; DOWNLOAD_CHUNK_BYTES];
            loop {
                let read = tokio::io::AsyncReadExt::read(&mut file, &mut chunk)
                    .await
                    .map_err(|e| SdkError::Network(format!("download of {} interrupted: {}", id, e)))?;
                if read == 0 {
                    break;
                }
                data.extend_from_slice(&chunk[..read]);
                if let Some(progress) = &progress {
                    if total > 0 {
                        progress((data.len() as f64 / total as f64).min(1.0) as f32);
                    }
                }
            }
            if let Some(progress) = &progress {
                progress(1.0);
            }
            Ok(data)
        })
    }
}

/// Downloads, tracks and removes cloud filters
///
/// Every operation needs the licence `cloud_filters` feature.
pub struct CloudFilterManager {
    service: Arc<dyn CloudFilterService>,
    download_dir: PathBuf,
    enabled: AtomicBool,
    catalog: Mutex<Vec<FilterMetadata>>,
}

impl CloudFilterManager {
    pub fn new(service: Arc<dyn CloudFilterService>, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            service,
            download_dir: download_dir.into(),
            enabled: AtomicBool::new(false),
            catalog: Mutex::new(Vec::new()),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    fn ensure_enabled(&self) -> SdkResult<()> {
        if self.is_enabled() {
            Ok(())
        } else {
            Err(SdkError::FeatureNotEnabled("cloud_filters".into()))
        }
    }

    /// Where the effect for `id` is stored once downloaded
    fn target_path(&self, id: &str) -> SdkResult<PathBuf> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !id.contains("..");
        if !valid {
            return Err(SdkError::InvalidParameter(format!("invalid cloud filter id '{}'", id)));
        }
        Ok(self.download_dir.join(format!("{}{}", id, EFFECT_SUFFIX)))
    }

    /// Fetch the catalogue from the service and remember it
    pub async fn refresh(&self) -> SdkResult<Vec<FilterMetadata>> {
        self.ensure_enabled()?;
        let filters = self.service.list().await?;
        info!(count = filters.len(), "Cloud filter catalogue refreshed");
        *self.catalog.lock().unwrap_or_else(PoisonError::into_inner) = filters.clone();
        Ok(filters)
    }

    /// Last fetched catalogue with local download status
    pub fn cloud_filters(&self) -> Vec<CloudFilterEntry> {
        self.catalog
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|metadata| {
                let local_path = self.local_path(&metadata.id);
                CloudFilterEntry {
                    metadata: metadata.clone(),
                    downloaded: local_path.is_some(),
                    local_path,
                }
            })
            .collect()
    }

    pub fn local_path(&self, id: &str) -> Option<PathBuf> {
        self.target_path(id).ok().filter(|path| path.is_file())
    }

    pub fn is_downloaded(&self, id: &str) -> bool {
        self.local_path(id).is_some()
    }

    /// Download `id` unless already present, returning the local effect path
    ///
    /// The payload is validated as an effect before it is stored.
    pub async fn download(&self, id: &str, progress: Option<ProgressFn>) -> SdkResult<PathBuf> {
        self.ensure_enabled()?;
        let target = self.target_path(id)?;
        if target.is_file() {
            debug!(id, "Cloud filter already downloaded");
            if let Some(progress) = &progress {
                progress(1.0);
            }
            return Ok(target);
        }

        let data = self.service.fetch(id, progress).await?;
        LoadedEffect::parse(&data, id)?;

        tokio::fs::create_dir_all(&self.download_dir).await?;
        let partial = target.with_extension("part");
        tokio::fs::write(&partial, &data).await?;
        tokio::fs::rename(&partial, &target).await?;
        info!(id, path = %target.display(), size = data.len(), "Cloud filter downloaded");
        Ok(target)
    }

    /// Delete a downloaded filter
    pub fn remove(&self, id: &str) -> SdkResult<bool> {
        self.ensure_enabled()?;
        let Some(path) = self.local_path(id) else {
            return Ok(false);
        };
        match std::fs::remove_file(&path) {
            Ok(()) => {
                info!(id, "Cloud filter removed");
                Ok(true)
            }
            Err(e) => {
                warn!(id, error = %e, "Failed to remove cloud filter");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn catalogue(dir: &Path) {
        std::fs::write(
            dir.join(CATALOG_FILE),
            r#"{ "filters": [
                { "id": "glow", "name": "Glow", "category": "light", "file": "glow.fx.json" },
                { "id": "broken", "name": "Broken", "file": "broken.fx.json" }
            ] }"#,
        )
        .unwrap();
        let glow = format!(
            r#"{{ "name": "Glow", "passes": [{{ "id": 0, "kind": "warm" }}], "padding": "{}" }}"#,
            "x".repeat(DOWNLOAD_CHUNK_BYTES * 2)
        );
        std::fs::write(dir.join("glow.fx.json"), glow).unwrap();
        std::fs::write(dir.join("broken.fx.json"), "{ nope").unwrap();
    }

    fn manager(catalog: &Path, downloads: &Path) -> CloudFilterManager {
        let manager = CloudFilterManager::new(Arc::new(LocalCatalogService::new(catalog)), downloads);
        manager.set_enabled(true);
        manager
    }

    #[tokio::test]
    async fn test_download_reports_progress() {
        let catalog = tempfile::tempdir().unwrap();
        let downloads = tempfile::tempdir().unwrap();
        catalogue(catalog.path());
        let manager = manager(catalog.path(), downloads.path());

        let filters = manager.refresh().await.unwrap();
        assert_eq!(filters.len(), 2);
        assert!(filters[0].size_bytes > 0);

        let calls = Arc::new(AtomicUsize::new(0));
        let last = Arc::new(Mutex::new(0.0f32));
        let progress: ProgressFn = {
            let calls = Arc::clone(&calls);
            let last = Arc::clone(&last);
            Arc::new(move |p: f32| {
                calls.fetch_add(1, Ordering::Relaxed);
                *last.lock().unwrap() = p;
            })
        };
        let path = manager.download("glow", Some(progress)).await.unwrap();
        assert!(path.is_file());
        assert!(calls.load(Ordering::Relaxed) >= 3);
        assert_eq!(*last.lock().unwrap(), 1.0);

        assert!(manager.is_downloaded("glow"));
        assert!(manager.cloud_filters().iter().any(|f| f.metadata.id == "glow" && f.downloaded));
        assert!(manager.remove("glow").unwrap());
        assert!(!manager.is_downloaded("glow"));
    }

    #[tokio::test]
    async fn test_invalid_payload_is_not_stored() {
        let catalog = tempfile::tempdir().unwrap();
        let downloads = tempfile::tempdir().unwrap();
        catalogue(catalog.path());
        let manager = manager(catalog.path(), downloads.path());

        assert!(manager.download("broken", None).await.is_err());
        assert!(!manager.is_downloaded("broken"));
        let err = manager.download("missing", None).await.unwrap_err();
        assert!(matches!(err, SdkError::ResourceNotFound(_)));
        let err = manager.download("../etc", None).await.unwrap_err();
        assert!(matches!(err, SdkError::InvalidParameter(_)));
    }

    #[tokio::test]
    async fn test_requires_licence_feature() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CloudFilterManager::new(Arc::new(LocalCatalogService::new(dir.path())), dir.path());
        let err = manager.refresh().await.unwrap_err();
        assert!(matches!(err, SdkError::FeatureNotEnabled(_)));
    }
}
