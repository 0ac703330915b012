//! Filesystem helpers for layers: tree copy, snapshot, and change capture.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// State of one entry in a snapshot, keyed by its root-relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryState {
    Dir,
    File { len: u64, digest: [u8; 32] },
    Symlink(PathBuf),
}

pub type Snapshot = BTreeMap<PathBuf, EntryState>;

/// Result of comparing a tree against an earlier snapshot.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    pub added: Vec<PathBuf>,
    pub modified: Vec<PathBuf>,
    /// Present before, gone after. Layers cannot express deletions.
    pub removed: Vec<PathBuf>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }
}

/// Copy a file or a directory tree from `src` to `dst`.
///
/// Directories are merged into an existing `dst`; files overwrite.
/// Symlinks are recreated, never followed. Returns the number of
/// non-directory entries written.
pub fn copy_into(src: &Path, dst: &Path) -> Result<u64, FsError> {
    let mut written = 0;

    for entry in walkdir::WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(|e| FsError::Walk {
            path: src.to_path_buf(),
            source: e,
        })?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|_| FsError::Rebase {
                path: entry.path().to_path_buf(),
            })?;
        let target = if relative.as_os_str().is_empty() {
            dst.to_path_buf()
        } else {
            dst.join(relative)
        };
        let file_type = entry.file_type();

        if file_type.is_dir() {
            create_dir_all(&target)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            create_dir_all(parent)?;
        }
        remove_if_symlink(&target)?;

        if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target).map_err(|e| FsError::Io {
                op: "copy",
                path: entry.path().to_path_buf(),
                source: e,
            })?;
        }
        written += 1;
    }

    Ok(written)
}

/// Record every entry below `root` (the root itself excluded).
pub fn snapshot(root: &Path) -> Result<Snapshot, FsError> {
    let mut entries = Snapshot::new();

    for entry in walkdir::WalkDir::new(root).min_depth(1).follow_links(false) {
        let entry = entry.map_err(|e| FsError::Walk {
            path: root.to_path_buf(),
            source: e,
        })?;
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| FsError::Rebase {
                path: entry.path().to_path_buf(),
            })?
            .to_path_buf();
        entries.insert(relative, entry_state(entry.path(), entry.file_type())?);
    }

    Ok(entries)
}

/// Copy everything under `root` that is new or changed relative to
/// `before` into `layer_dir`, preserving relative paths.
pub fn capture_changes(
    before: &Snapshot,
    root: &Path,
    layer_dir: &Path,
) -> Result<ChangeSet, FsError> {
    let after = snapshot(root)?;
    let mut changes = ChangeSet::default();

    for (relative, state) in &after {
        match before.get(relative) {
            Some(previous) if previous == state => continue,
            Some(_) => changes.modified.push(relative.clone()),
            None => changes.added.push(relative.clone()),
        }

        let src = root.join(relative);
        let dst = layer_dir.join(relative);
        if *state == EntryState::Dir {
            create_dir_all(&dst)?;
            continue;
        }
        if let Some(parent) = dst.parent() {
            create_dir_all(parent)?;
        }
        remove_if_symlink(&dst)?;
        match state {
            EntryState::Symlink(_) => copy_symlink(&src, &dst)?,
            _ => {
                std::fs::copy(&src, &dst).map_err(|e| FsError::Io {
                    op: "copy",
                    path: src.clone(),
                    source: e,
                })?;
            }
        }
    }

    changes.removed = before
        .keys()
        .filter(|relative| !after.contains_key(*relative))
        .cloned()
        .collect();

    Ok(changes)
}

pub fn create_dir_all(path: &Path) -> Result<(), FsError> {
    std::fs::create_dir_all(path).map_err(|e| FsError::Io {
        op: "create directory",
        path: path.to_path_buf(),
        source: e,
    })
}

pub fn remove_dir_all_if_exists(path: &Path) -> Result<(), FsError> {
    if path.exists() {
        std::fs::remove_dir_all(path).map_err(|e| FsError::Io {
            op: "remove directory",
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

fn remove_if_symlink(path: &Path) -> Result<(), FsError> {
    let is_link = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta.file_type().is_symlink(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            return Err(FsError::Io {
                op: "inspect",
                path: path.to_path_buf(),
                source: e,
            });
        }
    };
    if is_link {
        std::fs::remove_file(path).map_err(|e| FsError::Io {
            op: "replace symlink",
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

fn entry_state(path: &Path, file_type: std::fs::FileType) -> Result<EntryState, FsError> {
    if file_type.is_dir() {
        return Ok(EntryState::Dir);
    }
    if file_type.is_symlink() {
        let target = std::fs::read_link(path).map_err(|e| FsError::Io {
            op: "read link",
            path: path.to_path_buf(),
            source: e,
        })?;
        return Ok(EntryState::Symlink(target));
    }

    let io_err = |e| FsError::Io {
        op: "read",
        path: path.to_path_buf(),
        source: e,
    };
    let mut file = std::fs::File::open(path).map_err(io_err)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];
    let mut len = 0u64;
    loop {
        let n = file.read(&mut buffer).map_err(io_err)?;
        if n == 0 {
            break;
        }
        len += n as u64;
        hasher.update(&buffer[..n]);
    }
    Ok(EntryState::File {
        len,
        digest: hasher.finalize().into(),
    })
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> Result<(), FsError> {
    let target = std::fs::read_link(src).map_err(|e| FsError::Io {
        op: "read link",
        path: src.to_path_buf(),
        source: e,
    })?;
    std::os::unix::fs::symlink(&target, dst).map_err(|e| FsError::Io {
        op: "create symlink",
        path: dst.to_path_buf(),
        source: e,
    })
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> Result<(), FsError> {
    std::fs::copy(src, dst).map_err(|e| FsError::Io {
        op: "copy",
        path: src.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("failed to walk {path}")]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },
    #[error("failed to {op} {path}")]
    Io {
        op: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("walked path {path} is outside its root")]
    Rebase { path: PathBuf },
}
