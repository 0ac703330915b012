use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // ── Config ──
    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config at {path}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid {field} path {path:?}: {reason}")]
    InvalidPath {
        field: &'static str,
        path: String,
        reason: &'static str,
    },

    #[error("{field} must not be empty")]
    EmptyValue { field: &'static str },

    // ── Build context ──
    #[error("build context directory {path} does not exist")]
    ContextNotFound { path: PathBuf },

    #[error("failed to resolve build context {path}")]
    ContextResolve {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{name} not found in build context at {path}")]
    MissingInput { name: String, path: PathBuf },

    #[error("{name} escapes the build context")]
    OutsideContext { name: String },
}
