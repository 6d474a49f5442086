//! sitewright CLI - build a static site or develop it with live reload.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use sitewright_static::CONFIG_FILE;
use tracing_subscriber::{fmt, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "sitewright")]
#[command(about = "Static site build pipeline with a live-reload development server")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the sitewright.toml config file
    #[arg(short, long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Production mode, used when neither SITEWRIGHT_ENV nor NODE_ENV is set
    #[arg(long, global = true)]
    production: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Delete the dist and temp directories
    Clean,

    /// Build the deployable site into dist
    Build,

    /// Compile, then watch and serve with live reload
    Develop {
        /// Port to listen on (defaults to config or 2080)
        #[arg(short, long)]
        port: Option<u16>,

        /// Open the browser once the server is up
        #[arg(long)]
        open: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt().with_env_filter(filter).with_target(false).init();

    let production = commands::resolve_production(cli.production);
    let config = commands::load_config(&cli.config, production)?;

    match cli.command {
        Commands::Clean => commands::clean::run(config).await?,
        Commands::Build => commands::build::run(config).await?,
        Commands::Develop { port, open } => commands::develop::run(config, port, open).await?,
    }

    Ok(())
}
