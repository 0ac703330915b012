//! Build plans, cache fingerprints, the local layer engine, and Dockerfile
//! rendering for strata.
//!
//! # Build pipeline
//!
//! ```text
//! strata build
//!   1. Config      ── strata.toml → StrataConfig
//!   2. Plan        ── stages::standard_plan() → base, code, runner
//!   3. Fingerprint ── parent key + operation + input digest per step
//!   4. Layers      ── reuse layers/<key> or build and commit a new one
//!   5. Image       ── merge terminal layers → rootfs/ + image.json
//! ```
//!
//! # Cache reuse
//!
//! The dependency manifest is copied alone before the install step, so
//! only a manifest change re-runs the install. Application code and
//! templates are copied in the `code` stage on top of the cached install
//! layer.
//!
//! # External builders
//!
//! [`DockerfileGenerator`] renders the same plan as a multi-stage
//! Dockerfile; [`bundle::create_bundle`] gathers exactly the inputs it
//! copies.

pub mod bundle;
pub mod dockerfile;
pub mod eject;
pub mod engine;
pub mod executor;
pub mod fingerprint;
pub mod fsutil;
pub mod image;
pub mod plan;
pub mod stages;
pub mod store;

pub use dockerfile::DockerfileGenerator;
pub use engine::{BuildError, BuildOptions, BuildReport, Engine, OpOutcome};
pub use executor::{CommandExecutor, RealExecutor, RunSpec};
pub use fingerprint::CacheKey;
pub use image::{FinalImage, ImageConfig};
pub use plan::{BuildPlan, Operation, Stage, StageBase};
pub use store::LayerStore;
