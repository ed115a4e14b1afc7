// SPDX-License-Identifier: GPL-3.0-only

//! Output locations for recordings and photos

use crate::constants::app_info::APP_DIR;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Platform videos directory with an application subfolder
pub fn default_videos_dir() -> PathBuf {
    dirs::video_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
}

/// Platform pictures directory with an application subfolder
pub fn default_photos_dir() -> PathBuf {
    dirs::picture_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
}

/// Timestamped file path inside `dir`, e.g. `VID_20250101_120000.y4m`
///
/// A numeric suffix is appended when two captures land in the same second.
pub fn timestamped_path(dir: &Path, prefix: &str, extension: &str) -> PathBuf {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let mut path = dir.join(format!("{}_{}.{}", prefix, timestamp, extension));
    let mut n = 1;
    while path.exists() {
        path = dir.join(format!("{}_{}_{}.{}", prefix, timestamp, n, extension));
        n += 1;
    }
    path
}

/// Path for a new recording
pub fn recording_path(dir: &Path) -> PathBuf {
    timestamped_path(dir, "VID", "y4m")
}

/// Path for a new photo with the given extension
pub fn photo_path(dir: &Path, extension: &str) -> PathBuf {
    timestamped_path(dir, "IMG", extension)
}

/// Most recently modified file in `dir` whose extension matches `extensions`
///
/// The directory scan runs on the blocking pool.
pub async fn latest_file(dir: PathBuf, extensions: &'static [&'static str]) -> Option<PathBuf> {
    let latest = tokio::task::spawn_blocking(move || {
        std::fs::read_dir(&dir)
            .ok()?
            .flatten()
            .filter(|entry| {
                entry
                    .path()
                    .extension()
                    .map(|ext| ext.to_string_lossy().to_lowercase())
                    .is_some_and(|ext| extensions.contains(&ext.as_str()))
            })
            .max_by_key(|entry| entry.metadata().ok().and_then(|m| m.modified().ok()))
            .map(|entry| entry.path())
    })
    .await
    .ok()??;

    debug!(path = %latest.display(), "Latest capture");
    Some(latest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamped_paths_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let first = recording_path(dir.path());
        std::fs::write(&first, b"x").unwrap();
        let second = recording_path(dir.path());
        assert_ne!(first, second);
        assert!(second.to_string_lossy().ends_with(".y4m"));
    }

    #[tokio::test]
    async fn test_latest_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(latest_file(dir.path().to_path_buf(), &["png"]).await.is_none());

        let photo = dir.path().join("IMG_1.png");
        std::fs::write(&photo, b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        assert_eq!(latest_file(dir.path().to_path_buf(), &["png"]).await, Some(photo));
    }
}
