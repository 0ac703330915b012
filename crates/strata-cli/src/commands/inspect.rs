use strata_build::FinalImage;

use super::Project;

/// Print metadata of the image produced by `strata build`.
pub async fn inspect(json: bool) -> anyhow::Result<()> {
    let project = Project::load()?;
    let output_dir = project.output_dir();
    let image = FinalImage::load(&output_dir).map_err(|e| {
        anyhow::anyhow!("no image at {}; run `strata build` first ({e})", output_dir.display())
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&image.config)?);
        return Ok(());
    }

    let config = &image.config;
    println!("Base image: {}", config.base_image);
    println!("Stages:     {}", config.stages.join(" -> "));
    println!("Workdir:    {}", config.workdir);
    match &config.cmd {
        Some(cmd) => println!("Command:    {}", serde_json::to_string(cmd)?),
        None => println!("Command:    (none)"),
    }
    println!("Rootfs:     {}", image.rootfs().display());
    println!("Layers:");
    for key in &config.layers {
        println!("  {key}");
    }
    Ok(())
}
