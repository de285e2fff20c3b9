use anyhow::{Context, Result};
use calrissian_cli::{run, Cli};
use calrissian_config::{CalrissianConfig, ConfigLoader};
use calrissian_kube::KubeClusterClient;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

/// Where the configuration came from, reported once logging is up
enum ConfigSource {
    File(PathBuf),
    MissingFile(PathBuf),
    Environment,
}

/// Load configuration from file or environment
fn load_config(config_path: Option<&PathBuf>) -> Result<(CalrissianConfig, ConfigSource)> {
    let loader = ConfigLoader::new();

    match config_path {
        Some(path) if path.exists() => {
            let config = loader
                .from_file(path)
                .context(format!("Failed to load configuration from {:?}", path))?;
            Ok((config, ConfigSource::File(path.clone())))
        }
        Some(path) => {
            let config = loader
                .from_env()
                .context("Failed to load configuration from environment")?;
            Ok((config, ConfigSource::MissingFile(path.clone())))
        }
        None => {
            let config = loader
                .from_env()
                .context("Failed to load configuration from environment")?;
            Ok((config, ConfigSource::Environment))
        }
    }
}

fn init_logging(config: &CalrissianConfig, log_level: Option<&str>) -> Result<()> {
    let mut logging = config.logging.clone();
    if let Some(level) = log_level {
        match level.parse() {
            Ok(level) => logging.level = level,
            Err(e) => eprintln!("{}, keeping '{}'", e, logging.level.as_str()),
        }
    }
    calrissian_logging::init_logging_from_config(&logging)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let (config, source) = load_config(cli.config.as_ref())?;
    init_logging(&config, cli.log_level.as_deref())?;
    match source {
        ConfigSource::File(path) => info!("Loaded configuration from: {:?}", path),
        ConfigSource::MissingFile(path) => {
            warn!("Configuration file not found: {:?}. Using defaults.", path)
        }
        ConfigSource::Environment => {}
    }

    let client = KubeClusterClient::from_config(&config.cluster)
        .await
        .context("Failed to create the cluster client")?;

    let outcome = run(&cli, &config, Arc::new(client)).await?;
    println!(
        "{}",
        serde_json::to_string(&outcome.output).context("Failed to serialize the output")?
    );

    Ok(if outcome.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
