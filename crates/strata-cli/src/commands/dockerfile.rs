use strata_build::DockerfileGenerator;

use super::Project;

pub async fn dockerfile() -> anyhow::Result<()> {
    let project = Project::load()?;
    print!("{}", DockerfileGenerator::new(&project.plan).render());
    Ok(())
}
