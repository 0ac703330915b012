//! The read-only set of files a build may copy from.

use std::path::{Component, Path, PathBuf};

/// A build context rooted at a directory on the host.
///
/// The pipeline only ever reads from the context. Inputs are addressed by
/// paths relative to [`root`](Self::root); nothing outside the root can be
/// resolved.
///
/// # Examples
///
/// ```no_run
/// use strata_core::BuildContext;
/// use std::path::Path;
///
/// let ctx = BuildContext::open(Path::new(".")).unwrap();
/// let manifest = ctx.resolve("requirements.txt").unwrap();
/// println!("manifest at {}", manifest.display());
/// ```
#[derive(Debug, Clone)]
pub struct BuildContext {
    root: PathBuf,
}

impl BuildContext {
    /// Open the context at `dir`, canonicalizing the root.
    ///
    /// # Errors
    ///
    /// - [`Error::ContextNotFound`](crate::Error::ContextNotFound) if `dir` is not a directory
    /// - [`Error::ContextResolve`](crate::Error::ContextResolve) if canonicalization fails
    pub fn open(dir: &Path) -> crate::Result<Self> {
        if !dir.is_dir() {
            return Err(crate::Error::ContextNotFound {
                path: dir.to_path_buf(),
            });
        }
        let root = dir
            .canonicalize()
            .map_err(|e| crate::Error::ContextResolve {
                path: dir.to_path_buf(),
                source: e,
            })?;
        tracing::debug!(root = %root.display(), "opened build context");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `name` to an existing host path inside the context.
    ///
    /// A trailing `/` is accepted (`templates/`) and ignored.
    pub fn resolve(&self, name: &str) -> crate::Result<PathBuf> {
        let trimmed = name.trim_end_matches('/');
        let relative = Path::new(trimmed);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(crate::Error::OutsideContext {
                name: name.to_owned(),
            });
        }

        let path = self.root.join(relative);
        // symlink_metadata so a dangling link still counts as present
        if std::fs::symlink_metadata(&path).is_err() {
            return Err(crate::Error::MissingInput {
                name: name.to_owned(),
                path,
            });
        }
        Ok(path)
    }

    /// Resolve every name, failing on the first missing input.
    pub fn require_all<'a, I>(&self, names: I) -> crate::Result<Vec<PathBuf>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        names.into_iter().map(|n| self.resolve(n)).collect()
    }
}
