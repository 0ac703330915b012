use strata_build::StageBase;
use strata_build::fingerprint;
use strata_core::BuildContext;

use super::Project;

/// Print every stage with its operations and their cache keys.
pub async fn plan() -> anyhow::Result<()> {
    let project = Project::load()?;
    let ctx = BuildContext::open(&project.dir)?;
    ctx.require_all(project.plan.context_inputs())?;
    let keys = fingerprint::plan_keys(&project.plan, &ctx)?;

    for (stage, stage_keys) in project.plan.stages().iter().zip(&keys) {
        let from = match &stage.base {
            StageBase::Image(reference) => reference,
            StageBase::Stage(parent) => parent,
        };
        println!("{} (from {from})", stage.name);
        for (op, key) in &stage_keys.operations {
            println!("  {:<12} {op}", key.short());
        }
    }
    Ok(())
}
