use std::collections::BTreeMap;
use std::path::PathBuf;

/// A command to run against a staged root filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSpec {
    /// Program followed by its arguments.
    pub argv: Vec<String>,
    /// Host path of the image working directory inside the staged rootfs.
    pub cwd: PathBuf,
    /// Host path of the staged rootfs.
    pub rootfs: PathBuf,
    /// Extra environment on top of the inherited one.
    pub env: BTreeMap<String, String>,
}

/// Captured output of a successful command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Abstraction over command execution for testability.
///
/// Production code uses [`RealExecutor`], tests use mockall-generated mocks.
#[allow(async_fn_in_trait)]
pub trait CommandExecutor: Send + Sync {
    /// Run a command to completion, capturing its output.
    /// A non-zero exit status is an error.
    async fn run(&self, spec: &RunSpec) -> Result<RunOutput, ExecError>;
}

/// Spawns host processes via tokio.
pub struct RealExecutor;

impl CommandExecutor for RealExecutor {
    async fn run(&self, spec: &RunSpec) -> Result<RunOutput, ExecError> {
        use std::process::Stdio;

        let (program, args) = spec.argv.split_first().ok_or(ExecError::EmptyCommand)?;

        tracing::debug!(argv = ?spec.argv, cwd = %spec.cwd.display(), "spawning command");

        let output = tokio::process::Command::new(program)
            .args(args)
            .current_dir(&spec.cwd)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ExecError::Spawn {
                program: program.clone(),
                source: e,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if output.status.success() {
            Ok(RunOutput { stdout, stderr })
        } else {
            Err(ExecError::CommandFailed {
                argv: spec.argv.clone(),
                status: output.status.to_string(),
                stderr,
            })
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("command is empty")]
    EmptyCommand,

    #[error("failed to spawn {program}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("command {argv:?} failed with {status}\n{stderr}")]
    CommandFailed {
        argv: Vec<String>,
        status: String,
        stderr: String,
    },
}
