//! gpu-autoselect: resolve trainer device flags into concrete GPUs.
//!
//! Reads `CUDA_VISIBLE_DEVICES` once, queries the configured inventory
//! source, and prints the chosen devices as JSON or as an env line for a
//! child training process.

use clap::Parser;
use tracing::{error, info};

use gpu_autoselect::config::{Cli, Config, OutputFormat};
use gpu_autoselect::gpu::visibility::{VisibleDevices, CUDA_VISIBLE_DEVICES};
use gpu_autoselect::trainer::resolve_devices;

fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging. Logs go to stderr; stdout carries the result.
    let filter = if cli.verbose {
        "gpu_autoselect=debug"
    } else {
        "gpu_autoselect=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    info!("gpu-autoselect v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let mut config = Config::load(&cli.config)?;
    config.apply_cli(&cli);

    info!(
        source = ?config.inventory.source,
        ranking = ?config.inventory.ranking,
        auto_select_gpus = config.trainer.auto_select_gpus,
        "Configuration loaded"
    );

    let selector = config.selector(VisibleDevices::from_env())?;

    let resolved = match resolve_devices(&config.trainer, &selector) {
        Ok(resolved) => resolved,
        Err(e) => {
            error!("{e}");
            return Err(e.into());
        }
    };

    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&resolved)?),
        OutputFormat::Env => println!("{CUDA_VISIBLE_DEVICES}={}", resolved.cuda_visible_devices()),
    }

    Ok(())
}
