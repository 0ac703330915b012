use std::path::Path;

const STRATA_TOML: &str = r#"[runtime]
# image = "python:3-slim"
# binary = "python"

[app]
# workdir = "/app"
# manifest = "requirements.txt"
# entrypoint = "main.py"
# templates = "templates"
# data_dir = "data"

[build]
# install_command = ["pip", "install", "--no-cache-dir", "-r", "{manifest}"]
# cache_dir = ".strata/cache"
# output_dir = ".strata/image"

[local.env]
# Environment for commands run by `strata build`; {rootfs} is the staged filesystem.
PIP_TARGET = "{rootfs}/usr/local/lib/python3/site-packages"
"#;

/// Write a commented strata.toml into the current directory.
pub async fn init_project() -> anyhow::Result<()> {
    let path = Path::new("strata.toml");
    if path.exists() {
        println!("strata.toml already exists, skipping");
        return Ok(());
    }

    std::fs::write(path, STRATA_TOML)?;
    println!("Created strata.toml");

    let missing: Vec<&str> = ["requirements.txt", "main.py", "templates"]
        .into_iter()
        .filter(|p| !Path::new(p).exists())
        .collect();
    if !missing.is_empty() {
        println!();
        println!("Build inputs not found yet:");
        for p in missing {
            println!("  - {p}");
        }
    }

    println!();
    println!("Next steps:");
    println!("  strata plan        # inspect stages and cache keys");
    println!("  strata build       # build the image locally");
    Ok(())
}
