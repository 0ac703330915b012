//! Hand-maintained Dockerfile.
//!
//! Once a project ejects, `.strata/Dockerfile` belongs to the user:
//! `strata bundle` ships it verbatim and never renders the plan again.

use std::path::{Path, PathBuf};

/// Location of the ejected Dockerfile inside a project.
pub fn ejected_path(project_dir: &Path) -> PathBuf {
    project_dir.join(".strata").join("Dockerfile")
}

/// Write the rendered plan to `.strata/Dockerfile`.
///
/// Refuses to replace an existing file so local edits are never lost.
pub fn eject(project_dir: &Path, rendered: &str) -> Result<PathBuf, EjectError> {
    let path = ejected_path(project_dir);
    if path.exists() {
        return Err(EjectError::AlreadyEjected(path));
    }
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| EjectError::Write {
            path: dir.to_path_buf(),
            source: e,
        })?;
    }

    std::fs::write(&path, rendered).map_err(|e| EjectError::Write {
        path: path.clone(),
        source: e,
    })?;
    tracing::info!(path = %path.display(), "Dockerfile ejected");

    Ok(path)
}

pub fn is_ejected(project_dir: &Path) -> bool {
    ejected_path(project_dir).is_file()
}

/// Contents of the ejected Dockerfile.
pub fn load_ejected_dockerfile(project_dir: &Path) -> Result<String, EjectError> {
    let path = ejected_path(project_dir);
    std::fs::read_to_string(&path).map_err(|e| EjectError::Read { path, source: e })
}

#[derive(Debug, thiserror::Error)]
pub enum EjectError {
    #[error("project already ejected: {0} exists (remove it to render the plan again)")]
    AlreadyEjected(PathBuf),
    #[error("cannot write {path}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot read ejected Dockerfile {path}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}
