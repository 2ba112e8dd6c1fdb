//! Uyuni service discovery daemon entry point.

mod app;
mod config;
mod output;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Polls an Uyuni server and writes Prometheus file_sd targets.
#[derive(Parser, Debug)]
#[command(about, version)]
struct Cli {
    /// Path of the TOML configuration file.
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Output file, overriding `[output] path` from the configuration.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Run a single refresh, write the result and exit.
    #[arg(long)]
    once: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting uyuni service discovery"
    );

    let mut config = config::Config::load(&cli.config)?;
    if let Some(path) = cli.output {
        config.output.path = path;
    }
    tracing::info!(
        host = %config.uyuni.host,
        output = %config.output.path.display(),
        "configuration loaded"
    );

    let rt = tokio::runtime::Runtime::new()?;
    if cli.once {
        rt.block_on(app::run_once(config))?;
    } else {
        rt.block_on(app::run(config))?;
    }

    tracing::info!("uyuni-sd shut down cleanly");
    Ok(())
}
