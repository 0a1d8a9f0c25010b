use serde::Serialize;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{RenderError, Result};

/// Folder holding media assets copied into a workspace
pub const PUBLIC_DIR: &str = "public";

/// Job-scoped temporary directory, removed on drop unless retained for debugging
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    path: PathBuf,
    keep: bool,
}

impl Workspace {
    /// Allocate a fresh, uniquely named directory under `root`
    pub fn create(root: &Path, prefix: &str, keep: bool) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", prefix))
            .tempdir_in(root)?;
        let path = dir.path().to_path_buf();

        debug!("📁 Allocated workspace {}", path.display());
        Ok(Self {
            dir: Some(dir),
            path,
            keep,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.path.join(relative)
    }

    /// Create a sub-directory and return its path
    pub fn subdir(&self, name: &str) -> Result<PathBuf> {
        let dir = self.path.join(name);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    pub fn write_file(&self, relative: &str, contents: impl AsRef<[u8]>) -> Result<PathBuf> {
        let target = self.path.join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, contents)?;
        Ok(target)
    }

    pub fn write_json<T: Serialize>(&self, relative: &str, value: &T) -> Result<PathBuf> {
        let json = serde_json::to_vec_pretty(value)?;
        self.write_file(relative, json)
    }

    /// Served path a media file will have once copied, e.g. `public/3f2a...png`.
    ///
    /// Fails when the source is not a readable file; touches nothing on disk.
    pub fn asset_path(source: &Path) -> Result<String> {
        if !source.is_file() {
            return Err(RenderError::InvalidSpec(format!(
                "asset not found: {}",
                source.display()
            )));
        }

        let digest = md5::compute(source.to_string_lossy().as_bytes());
        let name = match source.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{:x}.{}", digest, ext.to_lowercase()),
            None => format!("{:x}", digest),
        };
        Ok(format!("{}/{}", PUBLIC_DIR, name))
    }

    /// Copy a media file into `public/` under a collision-free name.
    ///
    /// Returns the path relative to the served root, see [`Workspace::asset_path`].
    pub fn copy_asset(&self, source: &Path) -> Result<String> {
        let relative = Self::asset_path(source)?;
        self.subdir(PUBLIC_DIR)?;
        std::fs::copy(source, self.path.join(&relative))?;
        debug!("📎 Copied asset {} -> {}", source.display(), relative);
        Ok(relative)
    }

    /// Recursively copy a directory tree inside the workspace
    pub fn copy_tree(&self, from: &str, to: &str) -> Result<usize> {
        let source = self.path.join(from);
        let target = self.path.join(to);
        std::fs::create_dir_all(&target)?;
        if !source.exists() {
            return Ok(0);
        }

        let mut copied = 0;
        for entry in WalkDir::new(&source) {
            let entry = entry.map_err(|e| RenderError::execution(e.to_string()))?;
            let relative = entry
                .path()
                .strip_prefix(&source)
                .map_err(|e| RenderError::execution(e.to_string()))?;
            let destination = target.join(relative);

            if entry.file_type().is_dir() {
                std::fs::create_dir_all(&destination)?;
            } else {
                std::fs::copy(entry.path(), &destination)?;
                copied += 1;
            }
        }
        Ok(copied)
    }

    /// Tear down now; returns the retained path in debug mode
    pub fn close(mut self) -> Option<PathBuf> {
        self.release()
    }

    fn release(&mut self) -> Option<PathBuf> {
        let dir = self.dir.take()?;
        if self.keep {
            let kept = dir.keep();
            info!("🔍 Keeping workspace for inspection: {}", kept.display());
            return Some(kept);
        }

        let path = dir.path().to_path_buf();
        if let Err(e) = dir.close() {
            warn!("Failed to remove workspace {}: {}", path.display(), e);
        } else {
            debug!("🧹 Removed workspace {}", path.display());
        }
        None
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.release();
    }
}
