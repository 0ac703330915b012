use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::fingerprint::CacheKey;

pub const IMAGE_CONFIG_FILE: &str = "image.json";
pub const ROOTFS_DIR: &str = "rootfs";

/// Metadata recorded on the final image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageConfig {
    /// External image the first stage started from
    pub base_image: String,
    /// Working directory the default command runs in
    pub workdir: String,
    /// Default startup command; never executed at build time
    pub cmd: Option<Vec<String>>,
    /// Stage chain that produced the image, oldest first
    pub stages: Vec<String>,
    /// Layer keys applied on top of the base image, in order
    pub layers: Vec<CacheKey>,
}

/// A materialized image: `rootfs/` plus `image.json`.
#[derive(Debug, Clone)]
pub struct FinalImage {
    pub dir: PathBuf,
    pub config: ImageConfig,
}

impl FinalImage {
    pub fn load(dir: &Path) -> Result<Self, ImageError> {
        let path = dir.join(IMAGE_CONFIG_FILE);
        let content = std::fs::read_to_string(&path).map_err(|e| ImageError::Read {
            path: path.clone(),
            source: e,
        })?;
        let config = serde_json::from_str(&content)
            .map_err(|e| ImageError::Parse { path, source: e })?;
        Ok(Self {
            dir: dir.to_path_buf(),
            config,
        })
    }

    pub fn rootfs(&self) -> PathBuf {
        self.dir.join(ROOTFS_DIR)
    }

    /// Host path of the working directory inside the rootfs.
    pub fn workdir_path(&self) -> PathBuf {
        self.rootfs()
            .join(self.config.workdir.trim_start_matches('/'))
    }
}

pub(crate) fn write_config(dir: &Path, config: &ImageConfig) -> Result<(), ImageError> {
    let path = dir.join(IMAGE_CONFIG_FILE);
    let json = serde_json::to_string_pretty(config).map_err(|e| ImageError::Encode { source: e })?;
    std::fs::write(&path, json).map_err(|e| ImageError::Write { path, source: e })
}

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("failed to read image config {path}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse image config {path}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to encode image config")]
    Encode { source: serde_json::Error },
    #[error("failed to write image config {path}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}
