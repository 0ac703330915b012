//! Cache fingerprints.
//!
//! Every operation is keyed by `sha256(parent key, operation, input digest)`.
//! The chain starts from the runtime image reference, so a key changes
//! exactly when something it (transitively) depends on changes:
//!
//! ```text
//! image ─▶ WORKDIR ─▶ COPY manifest ─▶ RUN install ─▶ COPY main.py ─▶ ...
//!                          ▲                               ▲
//!                     manifest bytes                  main.py bytes
//! ```
//!
//! Editing `main.py` therefore leaves every key up to and including the
//! install step untouched.

use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strata_core::BuildContext;

use crate::plan::{BuildPlan, Operation};

/// Bumped whenever the key derivation changes.
const KEY_VERSION: &[u8] = b"strata-cache-v1";

/// Hex-encoded SHA-256 identifying one operation's result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars, for display.
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sha256:{}", self.0)
    }
}

/// Content digest of a build-context input (file or directory tree).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDigest([u8; 32]);

/// Key of the empty filesystem a stage based on `image` starts from.
pub fn image_key(image: &str) -> CacheKey {
    let mut hasher = Sha256::new();
    field(&mut hasher, KEY_VERSION);
    field(&mut hasher, b"image");
    field(&mut hasher, image.as_bytes());
    CacheKey(hex::encode(hasher.finalize()))
}

/// Key of `op` applied on top of `parent`.
pub fn operation_key(
    parent: &CacheKey,
    op: &Operation,
    input: Option<&ContentDigest>,
) -> Result<CacheKey, FingerprintError> {
    let encoded = serde_json::to_vec(op).map_err(|e| FingerprintError::Encode { source: e })?;

    let mut hasher = Sha256::new();
    field(&mut hasher, KEY_VERSION);
    field(&mut hasher, parent.as_str().as_bytes());
    field(&mut hasher, &encoded);
    match input {
        Some(digest) => field(&mut hasher, &digest.0),
        None => field(&mut hasher, b""),
    }
    Ok(CacheKey(hex::encode(hasher.finalize())))
}

/// Digest a file or a directory tree.
///
/// Directory digests cover every entry's relative path, type, executable
/// bit and content, walked in sorted order. Symlinks are not followed;
/// their target path is hashed instead.
pub fn digest_path(path: &Path) -> Result<ContentDigest, FingerprintError> {
    let mut hasher = Sha256::new();

    for entry in walkdir::WalkDir::new(path)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| FingerprintError::Walk {
            path: path.to_path_buf(),
            source: e,
        })?;
        let relative = entry
            .path()
            .strip_prefix(path)
            .map_err(|_| FingerprintError::Rebase {
                path: entry.path().to_path_buf(),
            })?;
        let relative = relative.to_string_lossy().replace('\\', "/");
        let file_type = entry.file_type();

        if file_type.is_dir() {
            field(&mut hasher, b"dir");
            field(&mut hasher, relative.as_bytes());
        } else if file_type.is_symlink() {
            let target = std::fs::read_link(entry.path()).map_err(|e| FingerprintError::Read {
                path: entry.path().to_path_buf(),
                source: e,
            })?;
            field(&mut hasher, b"symlink");
            field(&mut hasher, relative.as_bytes());
            field(&mut hasher, target.to_string_lossy().as_bytes());
        } else {
            let metadata = entry.metadata().map_err(|e| FingerprintError::Walk {
                path: path.to_path_buf(),
                source: e,
            })?;
            field(&mut hasher, b"file");
            field(&mut hasher, relative.as_bytes());
            field(&mut hasher, &[u8::from(is_executable(&metadata))]);
            hash_file(&mut hasher, entry.path())?;
        }
    }

    Ok(ContentDigest(hasher.finalize().into()))
}

/// Keys for every operation of every stage, computed without building.
#[derive(Debug, Clone)]
pub struct StageKeys {
    pub stage: String,
    pub operations: Vec<(Operation, CacheKey)>,
}

impl StageKeys {
    /// Key of the stage's final filesystem and metadata.
    pub fn last(&self) -> Option<&CacheKey> {
        self.operations.last().map(|(_, key)| key)
    }
}

/// Compute the full key chain of `plan` against `ctx`.
pub fn plan_keys(plan: &BuildPlan, ctx: &BuildContext) -> Result<Vec<StageKeys>, FingerprintError> {
    let mut result: Vec<StageKeys> = Vec::with_capacity(plan.stages().len());

    for stage in plan.stages() {
        let mut current = match &stage.base {
            crate::plan::StageBase::Image(reference) => image_key(reference),
            crate::plan::StageBase::Stage(parent) => result
                .iter()
                .find(|k| &k.stage == parent)
                .and_then(|k| k.last().cloned())
                .ok_or_else(|| FingerprintError::UnknownStage(parent.clone()))?,
        };

        let mut operations = Vec::with_capacity(stage.operations.len());
        for op in &stage.operations {
            let input = input_digest(op, ctx)?;
            current = operation_key(&current, op, input.as_ref())?;
            operations.push((op.clone(), current.clone()));
        }
        result.push(StageKeys {
            stage: stage.name.clone(),
            operations,
        });
    }

    Ok(result)
}

/// Digest of the build-context input an operation reads, if any.
pub fn input_digest(
    op: &Operation,
    ctx: &BuildContext,
) -> Result<Option<ContentDigest>, FingerprintError> {
    match op {
        Operation::Copy { src, .. } => {
            let path = ctx
                .resolve(src)
                .map_err(|e| FingerprintError::Context { source: e })?;
            digest_path(&path).map(Some)
        }
        _ => Ok(None),
    }
}

/// Length-prefixed write so adjacent fields cannot run together.
fn field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

fn hash_file(hasher: &mut Sha256, path: &Path) -> Result<(), FingerprintError> {
    let mut file = std::fs::File::open(path).map_err(|e| FingerprintError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    let len = file
        .metadata()
        .map_err(|e| FingerprintError::Read {
            path: path.to_path_buf(),
            source: e,
        })?
        .len();
    hasher.update(len.to_le_bytes());

    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buffer).map_err(|e| FingerprintError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(())
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &std::fs::Metadata) -> bool {
    false
}

#[derive(Debug, thiserror::Error)]
pub enum FingerprintError {
    #[error("build context input unavailable")]
    Context { source: strata_core::Error },
    #[error("failed to walk {path}")]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },
    #[error("failed to read {path}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to encode operation")]
    Encode { source: serde_json::Error },
    #[error("walked path {path} is outside its root")]
    Rebase { path: PathBuf },
    #[error("stage '{0}' has no computed key")]
    UnknownStage(String),
}
