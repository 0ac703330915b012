use strata_build::{BuildOptions, Engine, LayerStore};
use strata_core::BuildContext;

use super::Project;

/// Build the image with the local engine.
pub async fn build(no_cache: bool) -> anyhow::Result<()> {
    let project = Project::load()?;
    let ctx = BuildContext::open(&project.dir)?;
    let store = LayerStore::open(&project.cache_dir())?;
    let engine = Engine::new(ctx, store).with_env(project.config.local.env.clone());

    let output_dir = project.output_dir();
    let report = engine
        .build(&project.plan, &output_dir, &BuildOptions { no_cache })
        .await?;

    for outcome in &report.outcomes {
        let status = if outcome.op.is_metadata() {
            "meta"
        } else if outcome.cached {
            "cached"
        } else {
            "built"
        };
        println!("[{}] {status:<6} {}", outcome.stage, outcome.op);
    }

    println!();
    println!(
        "Built image: {} layers ({} cached, {} built)",
        report.image.config.layers.len(),
        report.cached_count(),
        report.built_count()
    );
    println!("Image written to {}", report.image.dir.display());
    Ok(())
}
