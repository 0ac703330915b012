use strata_build::DockerfileGenerator;
use strata_build::{bundle as bundle_mod, eject as eject_mod};
use strata_core::BuildContext;

use super::Project;

/// Write `.strata-bundle/` with the plan's inputs and a Dockerfile.
pub async fn bundle() -> anyhow::Result<()> {
    let project = Project::load()?;
    let ctx = BuildContext::open(&project.dir)?;

    let dockerfile = if eject_mod::is_ejected(&project.dir) {
        let path = eject_mod::ejected_path(&project.dir);
        println!("Using ejected Dockerfile from {}", path.display());
        eject_mod::load_ejected_dockerfile(&project.dir)?
    } else {
        DockerfileGenerator::new(&project.plan).render()
    };

    let bundle_dir = bundle_mod::create_bundle(&project.dir, &ctx, &project.plan, &dockerfile)?;
    tracing::debug!(path = %bundle_dir.display(), "bundle created");

    println!("Bundle written to {}", bundle_dir.display());
    println!("Build it with: docker build {}", bundle_dir.display());
    Ok(())
}
