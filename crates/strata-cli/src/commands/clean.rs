use strata_build::LayerStore;

use super::Project;

/// Remove the layer cache and the built image.
pub async fn clean() -> anyhow::Result<()> {
    let project = Project::load()?;

    let cache_dir = project.cache_dir();
    if cache_dir.exists() {
        let store = LayerStore::open(&cache_dir)?;
        let layers = store.layers()?.len();
        store.clear()?;
        println!("Removed {layers} cached layers from {}", cache_dir.display());
    }

    let output_dir = project.output_dir();
    if output_dir.exists() {
        std::fs::remove_dir_all(&output_dir)?;
        println!("Removed image at {}", output_dir.display());
    }

    println!("Clean complete.");
    Ok(())
}
