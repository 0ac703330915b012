use strata_build::DockerfileGenerator;

use super::Project;

pub async fn eject() -> anyhow::Result<()> {
    let project = Project::load()?;
    let dockerfile = DockerfileGenerator::new(&project.plan).render();

    let path = strata_build::eject::eject(&project.dir, &dockerfile)?;

    println!("Ejected build config to {}", path.display());
    println!("You can now edit it directly. strata bundle will use this file.");
    Ok(())
}
