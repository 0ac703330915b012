mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "strata", about = "Layered, cache-friendly images for Python template services")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a commented strata.toml into the current directory
    Init,
    /// Show build stages, operations and cache keys
    Plan,
    /// Print the multi-stage Dockerfile for this project
    Dockerfile,
    /// Build the image locally, reusing cached layers
    Build {
        /// Rebuild every layer even when a cached one exists
        #[arg(long)]
        no_cache: bool,
    },
    /// Show metadata of the locally built image
    Inspect {
        /// Print raw image.json
        #[arg(long)]
        json: bool,
    },
    /// Gather the build context and Dockerfile for an external builder
    Bundle,
    /// Eject Dockerfile for manual customization
    Eject,
    /// Delete the layer cache and built image
    Clean,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => commands::init_project().await?,
        Commands::Plan => commands::plan().await?,
        Commands::Dockerfile => commands::dockerfile().await?,
        Commands::Build { no_cache } => commands::build(no_cache).await?,
        Commands::Inspect { json } => commands::inspect(json).await?,
        Commands::Bundle => commands::bundle().await?,
        Commands::Eject => commands::eject().await?,
        Commands::Clean => commands::clean().await?,
    }

    Ok(())
}
