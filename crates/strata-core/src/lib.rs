//! Core types and configuration for strata.
//!
//! This crate defines the `strata.toml` schema ([`StrataConfig`]),
//! the read-only build context ([`BuildContext`]), and shared error types.

pub mod config;
pub mod context;
pub mod error;

pub use config::{AppConfig, BuildConfig, LocalConfig, RuntimeConfig, StrataConfig};
pub use context::BuildContext;
pub use error::{Error, Result};
