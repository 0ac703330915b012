use std::collections::BTreeMap;
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

/// Placeholder in `[local.env]` values replaced by the staged root filesystem.
pub const ROOTFS_PLACEHOLDER: &str = "{rootfs}";

/// Placeholder in `build.install_command` replaced by `app.manifest`.
pub const MANIFEST_PLACEHOLDER: &str = "{manifest}";

/// strata.toml configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrataConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub local: LocalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Language runtime image the base stage starts from.
    /// Only the major release line is pinned by default.
    #[serde(default = "default_runtime_image")]
    pub image: String,
    /// Interpreter invoked by the default command
    #[serde(default = "default_runtime_binary")]
    pub binary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Absolute working directory shared by all stages
    #[serde(default = "default_workdir")]
    pub workdir: String,
    /// Dependency manifest, relative to the build context
    #[serde(default = "default_manifest")]
    pub manifest: String,
    /// Application entry point, relative to the build context
    #[serde(default = "default_entrypoint")]
    pub entrypoint: String,
    /// Templates directory, relative to the build context
    #[serde(default = "default_templates")]
    pub templates: String,
    /// Mutable data directory created under the working directory
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Dependency installation command, run from the working directory.
    /// `{manifest}` expands to `app.manifest`.
    #[serde(default = "default_install_command")]
    pub install_command: Vec<String>,
    /// Layer cache location, relative to the project directory
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
    /// Where the local engine materializes the final image
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

/// Settings that only affect the local build engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Extra environment for commands executed by the local engine.
    /// `{rootfs}` expands to the staged root filesystem.
    #[serde(default = "default_local_env")]
    pub env: BTreeMap<String, String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            image: default_runtime_image(),
            binary: default_runtime_binary(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workdir: default_workdir(),
            manifest: default_manifest(),
            entrypoint: default_entrypoint(),
            templates: default_templates(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            install_command: default_install_command(),
            cache_dir: default_cache_dir(),
            output_dir: default_output_dir(),
        }
    }
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            env: default_local_env(),
        }
    }
}

impl StrataConfig {
    /// Load from strata.toml at the given path, or return defaults if not found.
    pub fn load(project_dir: &Path) -> crate::Result<Self> {
        let config_path = project_dir.join("strata.toml");
        let config: Self = if config_path.exists() {
            let content =
                std::fs::read_to_string(&config_path).map_err(|e| crate::Error::ConfigLoad {
                    path: config_path.clone(),
                    source: e,
                })?;
            toml::from_str(&content).map_err(|e| crate::Error::ConfigParse {
                path: config_path,
                source: e,
            })?
        } else {
            tracing::debug!("no strata.toml found, using defaults");
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the build plan relies on.
    pub fn validate(&self) -> crate::Result<()> {
        if self.runtime.image.trim().is_empty() {
            return Err(crate::Error::EmptyValue {
                field: "runtime.image",
            });
        }
        if self.runtime.binary.trim().is_empty() {
            return Err(crate::Error::EmptyValue {
                field: "runtime.binary",
            });
        }
        if self.build.install_command.is_empty() {
            return Err(crate::Error::EmptyValue {
                field: "build.install_command",
            });
        }

        if !self.app.workdir.starts_with('/') {
            return Err(crate::Error::InvalidPath {
                field: "app.workdir",
                path: self.app.workdir.clone(),
                reason: "must be absolute",
            });
        }
        if Path::new(&self.app.workdir)
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(crate::Error::InvalidPath {
                field: "app.workdir",
                path: self.app.workdir.clone(),
                reason: "must not contain '..'",
            });
        }

        for (field, value) in [
            ("app.manifest", &self.app.manifest),
            ("app.entrypoint", &self.app.entrypoint),
            ("app.templates", &self.app.templates),
            ("app.data_dir", &self.app.data_dir),
        ] {
            validate_relative(field, value)?;
        }
        Ok(())
    }
}

/// Rejects empty, absolute, and parent-escaping paths.
pub fn validate_relative(field: &'static str, value: &str) -> crate::Result<()> {
    let trimmed = value.trim_end_matches('/');
    if Path::new(trimmed)
        .components()
        .all(|c| matches!(c, Component::CurDir))
    {
        return Err(crate::Error::InvalidPath {
            field,
            path: value.to_owned(),
            reason: "must not be empty",
        });
    }
    let path = Path::new(trimmed);
    if path.is_absolute() {
        return Err(crate::Error::InvalidPath {
            field,
            path: value.to_owned(),
            reason: "must be relative to the build context",
        });
    }
    if path
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
    {
        return Err(crate::Error::InvalidPath {
            field,
            path: value.to_owned(),
            reason: "must not contain '..'",
        });
    }
    Ok(())
}

fn default_runtime_image() -> String {
    "python:3-slim".to_owned()
}

fn default_runtime_binary() -> String {
    "python".to_owned()
}

fn default_workdir() -> String {
    "/app".to_owned()
}

fn default_manifest() -> String {
    "requirements.txt".to_owned()
}

fn default_entrypoint() -> String {
    "main.py".to_owned()
}

fn default_templates() -> String {
    "templates".to_owned()
}

fn default_data_dir() -> String {
    "data".to_owned()
}

fn default_install_command() -> Vec<String> {
    ["pip", "install", "--no-cache-dir", "-r", MANIFEST_PLACEHOLDER]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

fn default_cache_dir() -> String {
    ".strata/cache".to_owned()
}

fn default_output_dir() -> String {
    ".strata/image".to_owned()
}

fn default_local_env() -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    env.insert(
        "PIP_TARGET".to_owned(),
        format!("{ROOTFS_PLACEHOLDER}/usr/local/lib/python3/site-packages"),
    );
    env
}
