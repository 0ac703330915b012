//! Local build engine.
//!
//! Walks a [`BuildPlan`] stage by stage, operation by operation:
//!
//! 1. Fingerprint the operation (parent key + operation + input digest).
//! 2. Metadata operations (`WORKDIR`, `CMD`) only update stage state.
//! 3. Filesystem operations reuse `layers/<key>` when present, otherwise
//!    build a staged layer and commit it.
//! 4. After the terminal stage, merge its layers into `<output>/rootfs`
//!    and write `<output>/image.json`.
//!
//! The first failing operation aborts the build. The output directory is
//! only replaced once every stage has succeeded.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use strata_core::BuildContext;
use strata_core::config::ROOTFS_PLACEHOLDER;

use crate::executor::{CommandExecutor, ExecError, RealExecutor, RunSpec};
use crate::fingerprint::{self, CacheKey, FingerprintError};
use crate::fsutil::{self, FsError};
use crate::image::{self, FinalImage, ImageConfig, ImageError, ROOTFS_DIR};
use crate::plan::{BuildPlan, Operation, PlanError, StageBase};
use crate::store::{LayerStore, StoreError};

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Rebuild every layer even when a cached one exists.
    pub no_cache: bool,
}

/// What happened to one operation during a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpOutcome {
    pub stage: String,
    pub index: usize,
    pub op: Operation,
    pub key: CacheKey,
    /// `true` when an existing layer was reused. Always `false` for
    /// metadata operations.
    pub cached: bool,
}

#[derive(Debug, Clone)]
pub struct BuildReport {
    pub outcomes: Vec<OpOutcome>,
    pub image: FinalImage,
}

impl BuildReport {
    /// Outcomes of operations of the given kind (`"run"`, `"copy"`, ...).
    pub fn of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a OpOutcome> + 'a {
        self.outcomes.iter().filter(move |o| o.op.kind() == kind)
    }

    pub fn cached_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.cached).count()
    }

    /// Filesystem operations that produced a new layer.
    pub fn built_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| !o.cached && !o.op.is_metadata())
            .count()
    }
}

/// Filesystem and metadata of a stage while it is being built.
#[derive(Debug, Clone)]
struct StageState {
    key: CacheKey,
    base_image: String,
    workdir: String,
    cmd: Option<Vec<String>>,
    layers: Vec<CacheKey>,
    lineage: Vec<String>,
}

impl StageState {
    fn from_image(reference: &str) -> Self {
        Self {
            key: fingerprint::image_key(reference),
            base_image: reference.to_owned(),
            workdir: "/".to_owned(),
            cmd: None,
            layers: Vec::new(),
            lineage: Vec::new(),
        }
    }

    /// Working directory relative to the rootfs.
    fn workdir_rel(&self) -> &str {
        self.workdir.trim_start_matches('/')
    }
}

/// Builds plans against a build context, caching layers in a [`LayerStore`].
pub struct Engine<E: CommandExecutor = RealExecutor> {
    executor: E,
    store: LayerStore,
    context: BuildContext,
    env: BTreeMap<String, String>,
}

impl Engine<RealExecutor> {
    pub fn new(context: BuildContext, store: LayerStore) -> Self {
        Self::with_executor(context, store, RealExecutor)
    }
}

impl<E: CommandExecutor> Engine<E> {
    pub fn with_executor(context: BuildContext, store: LayerStore, executor: E) -> Self {
        Self {
            executor,
            store,
            context,
            env: BTreeMap::new(),
        }
    }

    /// Extra environment for `RUN` commands. `{rootfs}` in a value expands
    /// to the staged root filesystem.
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Build every stage of `plan` and materialize the terminal stage into
    /// `output_dir`.
    pub async fn build(
        &self,
        plan: &BuildPlan,
        output_dir: &Path,
        options: &BuildOptions,
    ) -> Result<BuildReport, BuildError> {
        let terminal = plan.terminal().ok_or(PlanError::Empty)?;
        let mut states: HashMap<&str, StageState> = HashMap::new();
        let mut outcomes = Vec::new();

        for stage in plan.stages() {
            let mut state = match &stage.base {
                StageBase::Image(reference) => StageState::from_image(reference),
                StageBase::Stage(parent) => states
                    .get(parent.as_str())
                    .cloned()
                    .ok_or_else(|| PlanError::UnknownBase {
                        stage: stage.name.clone(),
                        base: parent.clone(),
                    })?,
            };
            state.lineage.push(stage.name.clone());
            tracing::info!(stage = %stage.name, "building stage");

            for (index, op) in stage.operations.iter().enumerate() {
                let cached = self
                    .apply(&mut state, op, options)
                    .await
                    .map_err(|source| BuildError::Operation {
                        stage: stage.name.clone(),
                        index,
                        op: op.to_string(),
                        source,
                    })?;
                outcomes.push(OpOutcome {
                    stage: stage.name.clone(),
                    index,
                    op: op.clone(),
                    key: state.key.clone(),
                    cached,
                });
            }

            states.insert(stage.name.as_str(), state);
        }

        let state = states
            .remove(terminal.name.as_str())
            .ok_or(PlanError::Empty)?;
        let image = self.materialize(&state, output_dir)?;
        tracing::info!(
            output = %output_dir.display(),
            layers = state.layers.len(),
            "image written"
        );

        Ok(BuildReport { outcomes, image })
    }

    /// Apply one operation, returning whether its layer came from cache.
    async fn apply(
        &self,
        state: &mut StageState,
        op: &Operation,
        options: &BuildOptions,
    ) -> Result<bool, StepError> {
        let input = fingerprint::input_digest(op, &self.context)?;
        let key = fingerprint::operation_key(&state.key, op, input.as_ref())?;

        match op {
            Operation::Workdir { path } => {
                state.workdir = resolve_workdir(&state.workdir, path);
                state.key = key;
                return Ok(false);
            }
            Operation::Cmd { argv } => {
                state.cmd = Some(argv.clone());
                state.key = key;
                return Ok(false);
            }
            _ => {}
        }

        let cached = !options.no_cache && self.store.contains(&key);
        if cached {
            tracing::info!(op = %op, key = %key.short(), "cache hit");
        } else {
            tracing::info!(op = %op, key = %key.short(), "building layer");
            let staged = self.store.stage(&key)?;
            let target = staged.path().join(state.workdir_rel());
            match op {
                Operation::Copy { src, dest } => self.copy(src, dest, &target)?,
                Operation::Mkdir { path } => fsutil::create_dir_all(&target.join(path))?,
                Operation::Run { argv } => self.run(state, &key, argv, staged.path()).await?,
                Operation::Workdir { .. } | Operation::Cmd { .. } => {}
            }
            self.store.commit(staged)?;
        }

        state.layers.push(key.clone());
        state.key = key;
        Ok(cached)
    }

    fn copy(&self, src: &str, dest: &str, target_dir: &Path) -> Result<(), StepError> {
        let source = self.context.resolve(src)?;
        let mut target = target_dir.join(dest.trim_end_matches('/'));
        if dest.ends_with('/') && source.is_file() {
            if let Some(name) = source.file_name() {
                target = target.join(name);
            }
        }
        let written = fsutil::copy_into(&source, &target)?;
        tracing::debug!(src, dest, files = written, "copied from build context");
        Ok(())
    }

    async fn run(
        &self,
        state: &StageState,
        key: &CacheKey,
        argv: &[String],
        layer_dir: &Path,
    ) -> Result<(), StepError> {
        let rootfs = self.store.scratch(key)?;
        for layer in &state.layers {
            fsutil::copy_into(&self.store.layer_path(layer), &rootfs)?;
        }
        let cwd = rootfs.join(state.workdir_rel());
        fsutil::create_dir_all(&cwd)?;

        let before = fsutil::snapshot(&rootfs)?;
        let spec = RunSpec {
            argv: argv.to_vec(),
            cwd,
            rootfs: rootfs.clone(),
            env: self.expand_env(&rootfs),
        };
        let result = self.executor.run(&spec).await;
        let captured = result
            .map_err(StepError::from)
            .and_then(|output| {
                tracing::debug!(stdout = %output.stdout.trim_end(), "command finished");
                fsutil::capture_changes(&before, &rootfs, layer_dir).map_err(StepError::from)
            });
        fsutil::remove_dir_all_if_exists(&rootfs)?;

        let changes = captured?;
        if changes.is_empty() {
            tracing::debug!(argv = ?argv, "command left the filesystem unchanged");
            return Ok(());
        }
        if !changes.removed.is_empty() {
            tracing::warn!(
                removed = changes.removed.len(),
                "command deleted files; deletions are not recorded in layers"
            );
        }
        tracing::debug!(
            added = changes.added.len(),
            modified = changes.modified.len(),
            "captured command changes"
        );
        Ok(())
    }

    fn expand_env(&self, rootfs: &Path) -> BTreeMap<String, String> {
        let rootfs = rootfs.to_string_lossy();
        self.env
            .iter()
            .map(|(k, v)| (k.clone(), v.replace(ROOTFS_PLACEHOLDER, &rootfs)))
            .collect()
    }

    /// Merge layers into a fresh directory next to `output_dir`, then swap it in.
    fn materialize(&self, state: &StageState, output_dir: &Path) -> Result<FinalImage, BuildError> {
        let partial = partial_dir(output_dir);
        let output_err = |source| BuildError::Output {
            path: output_dir.to_path_buf(),
            source,
        };

        fsutil::remove_dir_all_if_exists(&partial)
            .map_err(|e| output_err(OutputError::Fs(e)))?;
        let rootfs = partial.join(ROOTFS_DIR);
        fsutil::create_dir_all(&rootfs).map_err(|e| output_err(OutputError::Fs(e)))?;

        for layer in &state.layers {
            fsutil::copy_into(&self.store.layer_path(layer), &rootfs)
                .map_err(|e| output_err(OutputError::Fs(e)))?;
        }

        let config = ImageConfig {
            base_image: state.base_image.clone(),
            workdir: state.workdir.clone(),
            cmd: state.cmd.clone(),
            stages: state.lineage.clone(),
            layers: state.layers.clone(),
        };
        image::write_config(&partial, &config).map_err(|e| output_err(OutputError::Image(e)))?;

        fsutil::remove_dir_all_if_exists(output_dir)
            .map_err(|e| output_err(OutputError::Fs(e)))?;
        std::fs::rename(&partial, output_dir).map_err(|e| output_err(OutputError::Rename(e)))?;

        Ok(FinalImage {
            dir: output_dir.to_path_buf(),
            config,
        })
    }
}

fn resolve_workdir(current: &str, path: &str) -> String {
    if path.starts_with('/') {
        path.to_owned()
    } else {
        format!("{}/{}", current.trim_end_matches('/'), path)
    }
}

fn partial_dir(output_dir: &Path) -> PathBuf {
    let name = output_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_owned());
    output_dir.with_file_name(format!(".{name}.partial"))
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid build plan")]
    Plan(#[from] PlanError),

    #[error("stage '{stage}' step {index} `{op}` failed")]
    Operation {
        stage: String,
        index: usize,
        op: String,
        source: StepError,
    },

    #[error("failed to write image to {path}")]
    Output { path: PathBuf, source: OutputError },
}

/// Why a single operation failed.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("input missing from build context")]
    Context(#[from] strata_core::Error),
    #[error("failed to fingerprint operation")]
    Fingerprint(#[from] FingerprintError),
    #[error("filesystem operation failed")]
    Fs(#[from] FsError),
    #[error("command failed")]
    Exec(#[from] ExecError),
    #[error("layer store failure")]
    Store(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("filesystem operation failed")]
    Fs(#[source] FsError),
    #[error("failed to record image config")]
    Image(#[source] ImageError),
    #[error("failed to move image into place")]
    Rename(#[source] std::io::Error),
}
