//! Playable media handles for rendered clips.
//!
//! A downloaded clip is staged as a file in the work directory. The
//! [`MediaHandle`] owns that file: dropping the handle deletes it unless the
//! clip was persisted somewhere else first.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, VideoError};

/// Stages downloaded clips on disk.
#[derive(Debug, Clone)]
pub struct MediaStore {
    dir: PathBuf,
}

impl MediaStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Write a clip for `scene_number` and hand back the owning handle.
    pub async fn store(&self, scene_number: u32, data: &[u8]) -> Result<MediaHandle> {
        let path = self
            .dir
            .join(format!("scene_{}_{}.mp4", scene_number, Uuid::new_v4().simple()));

        let staged = match tokio::fs::create_dir_all(&self.dir).await {
            Ok(()) => tokio::fs::write(&path, data).await,
            Err(e) => Err(e),
        };
        staged.map_err(|e| {
            VideoError::Download(format!("Failed to stage clip at {}: {}", path.display(), e))
        })?;

        debug!(scene = scene_number, path = %path.display(), "Staged clip");
        Ok(MediaHandle {
            path,
            size: data.len() as u64,
            persisted: false,
        })
    }
}

/// Exclusive owner of one rendered clip.
#[derive(Debug)]
pub struct MediaHandle {
    path: PathBuf,
    size: u64,
    persisted: bool,
}

impl MediaHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Move the clip to `dest`. After this the file outlives the handle.
    pub async fn persist(&mut self, dest: &Path) -> Result<PathBuf> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // rename fails across filesystems; fall back to copy + remove
        if tokio::fs::rename(&self.path, dest).await.is_err() {
            tokio::fs::copy(&self.path, dest).await?;
            tokio::fs::remove_file(&self.path).await.ok();
        }

        self.path = dest.to_path_buf();
        self.persisted = true;
        Ok(self.path.clone())
    }
}

impl Drop for MediaHandle {
    fn drop(&mut self) {
        if self.persisted {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Released clip"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), "Failed to release clip: {}", e),
        }
    }
}
