// SPDX-License-Identifier: GPL-3.0-only

//! Cloud filter delivery and the effect cache
//!
//! ```text
//! CloudFilterService ──fetch──▶ CloudFilterManager ──▶ download dir
//!                                                          │
//!                              FilterCache ◀──load─────────┘
//!                                   │
//!                                   └──▶ FilterChain
//! ```
//!
//! - [`cache`]: LRU cache of parsed effects with a byte ceiling
//! - [`service`]: Catalogue collaborator and download manager

pub mod cache;
pub mod service;

pub use cache::{CacheStats, FilterCache};
pub use service::{CloudFilterManager, CloudFilterService, LocalCatalogService};

use crate::constants::file_formats::EFFECT_SUFFIX;
use crate::errors::SdkResult;
use crate::filters::{EffectInfo, get_filter_info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// Download progress in `[0, 1]`
pub type ProgressFn = Arc<dyn Fn(f32) + Send + Sync>;

/// Catalogue entry as published by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterMetadata {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub size_bytes: u64,
}

/// Catalogue entry with its local status
#[derive(Debug, Clone, Serialize)]
pub struct CloudFilterEntry {
    #[serde(flatten)]
    pub metadata: FilterMetadata,
    pub downloaded: bool,
    pub local_path: Option<PathBuf>,
}

/// Effect file found on disk
#[derive(Debug, Clone, Serialize)]
pub struct LocalFilter {
    pub path: PathBuf,
    pub info: EffectInfo,
}

/// Effect files in `dir`, sorted by name
///
/// Files that fail to parse are skipped.
pub fn local_filters(dir: &Path) -> SdkResult<Vec<LocalFilter>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut filters = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_effect = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(EFFECT_SUFFIX));
        if !is_effect {
            continue;
        }
        match get_filter_info(&path) {
            Ok(info) => filters.push(LocalFilter { path, info }),
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable effect"),
        }
    }
    filters.sort_by(|a, b| a.info.name.cmp(&b.info.name));
    Ok(filters)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_filters_skips_invalid() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("b.fx.json"),
            r#"{ "name": "Beta", "passes": [{ "id": 0, "kind": "cool" }] }"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("a.fx.json"),
            r#"{ "name": "Alpha", "passes": [{ "id": 0, "kind": "fade" }] }"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("bad.fx.json"), "[]").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();

        let filters = local_filters(dir.path()).unwrap();
        let names: Vec<_> = filters.iter().map(|f| f.info.name.as_str()).collect();
        assert_eq!(names, ["Alpha", "Beta"]);
        assert!(local_filters(&dir.path().join("missing")).unwrap().is_empty());
    }
}
