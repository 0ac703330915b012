use std::path::{Path, PathBuf};

use strata_core::BuildContext;

use crate::fsutil::{self, FsError};
use crate::plan::BuildPlan;

/// Directory the bundle is written to, under the project directory.
pub const BUNDLE_DIR: &str = ".strata-bundle";

/// Bundles the build context for an external image builder.
///
/// Only the inputs the plan copies are included, at the same relative
/// paths, so the rendered Dockerfile's `COPY` sources resolve. The
/// Dockerfile is written at the bundle root.
pub fn create_bundle(
    project_dir: &Path,
    context: &BuildContext,
    plan: &BuildPlan,
    dockerfile_content: &str,
) -> Result<PathBuf, BundleError> {
    let bundle_dir = project_dir.join(BUNDLE_DIR);

    // Clean previous bundle
    fsutil::remove_dir_all_if_exists(&bundle_dir).map_err(|e| BundleError::Cleanup {
        path: bundle_dir.clone(),
        source: e,
    })?;
    fsutil::create_dir_all(&bundle_dir).map_err(|e| BundleError::Create {
        path: bundle_dir.clone(),
        source: e,
    })?;

    for input in plan.context_inputs() {
        let src = context
            .resolve(input)
            .map_err(|e| BundleError::MissingInput { source: e })?;
        let dst = bundle_dir.join(input.trim_end_matches('/'));

        let files = fsutil::copy_into(&src, &dst).map_err(|e| BundleError::CopyInput {
            path: src.clone(),
            source: e,
        })?;
        tracing::debug!(input, files, "bundled input");
    }

    // Write generated Dockerfile
    std::fs::write(bundle_dir.join("Dockerfile"), dockerfile_content).map_err(|e| {
        BundleError::WriteDockerfile {
            path: bundle_dir.join("Dockerfile"),
            source: e,
        }
    })?;

    Ok(bundle_dir)
}

#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("failed to clean up bundle directory {path}")]
    Cleanup { path: PathBuf, source: FsError },
    #[error("failed to create directory {path}")]
    Create { path: PathBuf, source: FsError },
    #[error("build input missing")]
    MissingInput { source: strata_core::Error },
    #[error("failed to copy {path} into bundle")]
    CopyInput { path: PathBuf, source: FsError },
    #[error("failed to write Dockerfile at {path}")]
    WriteDockerfile {
        path: PathBuf,
        source: std::io::Error,
    },
}
