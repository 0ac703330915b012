//! The three-stage pipeline: base → code → runner.
//!
//! ```text
//! base    FROM <runtime>; WORKDIR; COPY manifest; RUN install
//! code    FROM base;      COPY entrypoint; COPY templates/ → templates/
//! runner  FROM code;      mkdir -p data; CMD [runtime, entrypoint]
//! ```
//!
//! The manifest is the only file copied before the install step, so the
//! install layer's fingerprint never depends on application code.

use strata_core::StrataConfig;
use strata_core::config::MANIFEST_PLACEHOLDER;

use crate::plan::{BuildPlan, Operation, PlanError, Stage, StageBase};

pub const BASE_STAGE: &str = "base";
pub const CODE_STAGE: &str = "code";
pub const RUNNER_STAGE: &str = "runner";

/// Runtime image, working directory, manifest copy, dependency install.
pub fn base_stage(config: &StrataConfig) -> Stage {
    let manifest = trim_dir(&config.app.manifest);
    let in_image = file_name(manifest);
    let install = config
        .build
        .install_command
        .iter()
        .map(|arg| arg.replace(MANIFEST_PLACEHOLDER, in_image))
        .collect();

    Stage::new(BASE_STAGE, StageBase::Image(config.runtime.image.clone()))
        .op(Operation::Workdir {
            path: config.app.workdir.clone(),
        })
        .op(Operation::Copy {
            src: manifest.to_owned(),
            dest: in_image.to_owned(),
        })
        .op(Operation::Run { argv: install })
}

/// Entry point into the working directory, templates into `templates/`.
pub fn code_stage(config: &StrataConfig) -> Stage {
    let entrypoint = trim_dir(&config.app.entrypoint);
    let templates = trim_dir(&config.app.templates);

    Stage::new(CODE_STAGE, StageBase::Stage(BASE_STAGE.to_owned()))
        .op(Operation::Copy {
            src: entrypoint.to_owned(),
            dest: file_name(entrypoint).to_owned(),
        })
        .op(Operation::Copy {
            src: format!("{templates}/"),
            dest: "templates/".to_owned(),
        })
}

/// Data directory and default command.
pub fn runner_stage(config: &StrataConfig) -> Stage {
    let entrypoint = file_name(trim_dir(&config.app.entrypoint));

    Stage::new(RUNNER_STAGE, StageBase::Stage(CODE_STAGE.to_owned()))
        .op(Operation::Mkdir {
            path: trim_dir(&config.app.data_dir).to_owned(),
        })
        .op(Operation::Cmd {
            argv: vec![config.runtime.binary.clone(), entrypoint.to_owned()],
        })
}

/// Assemble the standard pipeline from configuration.
pub fn standard_plan(config: &StrataConfig) -> Result<BuildPlan, PlanError> {
    BuildPlan::new()
        .with_stage(base_stage(config))?
        .with_stage(code_stage(config))?
        .with_stage(runner_stage(config))
}

fn trim_dir(path: &str) -> &str {
    path.trim_end_matches('/')
}

/// Last path segment; inputs land directly in the working directory.
fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
