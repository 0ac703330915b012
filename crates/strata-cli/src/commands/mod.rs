mod build;
mod bundle;
mod clean;
mod dockerfile;
mod eject;
mod init;
mod inspect;
mod plan;

use std::path::PathBuf;

use strata_build::{BuildPlan, stages};
use strata_core::StrataConfig;

pub use build::build;
pub use bundle::bundle;
pub use clean::clean;
pub use dockerfile::dockerfile;
pub use eject::eject;
pub use init::init_project;
pub use inspect::inspect;
pub use plan::plan;

/// Configuration and build plan of the project in the current directory.
pub(crate) struct Project {
    pub dir: PathBuf,
    pub config: StrataConfig,
    pub plan: BuildPlan,
}

impl Project {
    pub fn load() -> anyhow::Result<Self> {
        let dir = PathBuf::from(".");
        let config = StrataConfig::load(&dir)?;
        let plan = stages::standard_plan(&config)?;
        Ok(Self { dir, config, plan })
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.dir.join(&self.config.build.cache_dir)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.dir.join(&self.config.build.output_dir)
    }
}
