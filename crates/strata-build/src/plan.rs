//! Build plan: an ordered list of stages, each an ordered list of operations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a stage's filesystem starts from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageBase {
    /// An external image reference, e.g. `python:3-slim`.
    Image(String),
    /// A stage declared earlier in the same plan.
    Stage(String),
}

/// One atomic mutation of the image filesystem or its metadata.
///
/// Paths in `Copy::dest` and `Mkdir::path` are relative to the working
/// directory in effect when the operation runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Workdir { path: String },
    Copy { src: String, dest: String },
    Run { argv: Vec<String> },
    Mkdir { path: String },
    Cmd { argv: Vec<String> },
}

impl Operation {
    /// Operations that only change image metadata produce no layer.
    pub fn is_metadata(&self) -> bool {
        matches!(self, Self::Workdir { .. } | Self::Cmd { .. })
    }

    /// Short kind name used in logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Workdir { .. } => "workdir",
            Self::Copy { .. } => "copy",
            Self::Run { .. } => "run",
            Self::Mkdir { .. } => "mkdir",
            Self::Cmd { .. } => "cmd",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Workdir { path } => write!(f, "WORKDIR {path}"),
            Self::Copy { src, dest } => write!(f, "COPY {src} {dest}"),
            Self::Run { argv } => write!(f, "RUN {}", argv.join(" ")),
            Self::Mkdir { path } => write!(f, "RUN mkdir -p {path}"),
            Self::Cmd { argv } => write!(f, "CMD {argv:?}"),
        }
    }
}

/// A named step producing a filesystem snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    pub base: StageBase,
    pub operations: Vec<Operation>,
}

impl Stage {
    pub fn new(name: impl Into<String>, base: StageBase) -> Self {
        Self {
            name: name.into(),
            base,
            operations: Vec::new(),
        }
    }

    /// Append an operation; declaration order is execution order.
    pub fn op(mut self, operation: Operation) -> Self {
        self.operations.push(operation);
        self
    }
}

/// A validated, linear sequence of stages. The last stage is the image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildPlan {
    stages: Vec<Stage>,
}

impl BuildPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage after checking that its name is new and that a
    /// stage base refers to an already declared stage.
    pub fn push(&mut self, stage: Stage) -> Result<(), PlanError> {
        if stage.name.is_empty() {
            return Err(PlanError::EmptyStageName);
        }
        if self.stage(&stage.name).is_some() {
            return Err(PlanError::DuplicateStage(stage.name));
        }
        if let StageBase::Stage(parent) = &stage.base {
            if self.stage(parent).is_none() {
                return Err(PlanError::UnknownBase {
                    stage: stage.name.clone(),
                    base: parent.clone(),
                });
            }
        }
        self.stages.push(stage);
        Ok(())
    }

    /// Builder-style [`push`](Self::push).
    pub fn with_stage(mut self, stage: Stage) -> Result<Self, PlanError> {
        self.push(stage)?;
        Ok(self)
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// The stage materialized as the final image.
    pub fn terminal(&self) -> Option<&Stage> {
        self.stages.last()
    }

    /// Every build-context path read by a `Copy` operation, in order.
    pub fn context_inputs(&self) -> Vec<&str> {
        self.stages
            .iter()
            .flat_map(|s| &s.operations)
            .filter_map(|op| match op {
                Operation::Copy { src, .. } => Some(src.as_str()),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("stage name must not be empty")]
    EmptyStageName,
    #[error("stage '{0}' is declared twice")]
    DuplicateStage(String),
    #[error("stage '{stage}' builds on '{base}', which is not declared before it")]
    UnknownBase { stage: String, base: String },
    #[error("build plan has no stages")]
    Empty,
}
