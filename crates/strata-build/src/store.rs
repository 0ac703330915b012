//! On-disk layer cache.
//!
//! ```text
//! <cache_dir>/
//!   layers/<key>/   committed layer deltas, immutable
//!   staging/<key>/  layer being built, renamed into layers/ on success
//!   scratch/<key>/  merged filesystem a RUN step executes in
//! ```

use std::path::{Path, PathBuf};

use crate::fingerprint::CacheKey;
use crate::fsutil::{self, FsError};

pub struct LayerStore {
    root: PathBuf,
}

/// A layer directory that is not yet visible to cache lookups.
///
/// Dropping it without [`LayerStore::commit`] removes the directory, so a
/// failed operation never leaves a partial layer behind.
pub struct StagedLayer {
    key: CacheKey,
    path: PathBuf,
    committed: bool,
}

impl StagedLayer {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedLayer {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(e) = fsutil::remove_dir_all_if_exists(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to discard staged layer");
        }
    }
}

impl LayerStore {
    /// Open (creating if needed) the store rooted at `root`.
    ///
    /// The root is canonicalized: scratch paths handed to commands must
    /// stay valid from any working directory.
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        for dir in ["layers", "staging", "scratch"] {
            fsutil::create_dir_all(&root.join(dir)).map_err(|e| StoreError::Open {
                path: root.to_path_buf(),
                source: e,
            })?;
        }
        let root = root.canonicalize().map_err(|e| StoreError::Open {
            path: root.to_path_buf(),
            source: FsError::Io {
                op: "resolve",
                path: root.to_path_buf(),
                source: e,
            },
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn layer_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join("layers").join(key.as_str())
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.layer_path(key).is_dir()
    }

    /// Start a fresh layer for `key`, clearing any leftovers of an
    /// interrupted earlier attempt.
    pub fn stage(&self, key: &CacheKey) -> Result<StagedLayer, StoreError> {
        let path = self.root.join("staging").join(key.as_str());
        fsutil::remove_dir_all_if_exists(&path).map_err(|e| StoreError::Stage {
            key: key.clone(),
            source: e,
        })?;
        fsutil::create_dir_all(&path).map_err(|e| StoreError::Stage {
            key: key.clone(),
            source: e,
        })?;
        Ok(StagedLayer {
            key: key.clone(),
            path,
            committed: false,
        })
    }

    /// Atomically publish a staged layer.
    pub fn commit(&self, mut staged: StagedLayer) -> Result<PathBuf, StoreError> {
        let target = self.layer_path(&staged.key);
        // replaces a layer left by --no-cache rebuilds
        fsutil::remove_dir_all_if_exists(&target).map_err(|e| StoreError::Stage {
            key: staged.key.clone(),
            source: e,
        })?;
        std::fs::rename(&staged.path, &target).map_err(|e| StoreError::Commit {
            key: staged.key.clone(),
            source: e,
        })?;
        staged.committed = true;
        tracing::debug!(key = %staged.key.short(), "layer committed");
        Ok(target)
    }

    /// Empty scratch directory for executing a command on top of `key`'s parent.
    pub fn scratch(&self, key: &CacheKey) -> Result<PathBuf, StoreError> {
        let path = self.root.join("scratch").join(key.as_str());
        fsutil::remove_dir_all_if_exists(&path)
            .and_then(|()| fsutil::create_dir_all(&path))
            .map_err(|e| StoreError::Stage {
                key: key.clone(),
                source: e,
            })?;
        Ok(path)
    }

    /// Keys of all committed layers.
    pub fn layers(&self) -> Result<Vec<String>, StoreError> {
        let dir = self.root.join("layers");
        let entries = std::fs::read_dir(&dir).map_err(|e| StoreError::List {
            path: dir.clone(),
            source: e,
        })?;
        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::List {
                path: dir.clone(),
                source: e,
            })?;
            keys.push(entry.file_name().to_string_lossy().into_owned());
        }
        keys.sort();
        Ok(keys)
    }

    /// Remove every layer and all scratch space.
    pub fn clear(&self) -> Result<(), StoreError> {
        fsutil::remove_dir_all_if_exists(&self.root).map_err(|e| StoreError::Clear {
            path: self.root.clone(),
            source: e,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to open layer store at {path}")]
    Open { path: PathBuf, source: FsError },
    #[error("failed to stage layer {key}")]
    Stage { key: CacheKey, source: FsError },
    #[error("failed to commit layer {key}")]
    Commit {
        key: CacheKey,
        source: std::io::Error,
    },
    #[error("failed to clear layer store at {path}")]
    Clear { path: PathBuf, source: FsError },
    #[error("failed to list layers in {path}")]
    List {
        path: PathBuf,
        source: std::io::Error,
    },
}
