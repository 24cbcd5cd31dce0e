// Proctor engine
// Main entry point for the proctor binary

use clap::Parser;
use proctor_engine::cli::{Cli, Command};
use proctor_engine::config::Config;
use proctor_engine::handlers::{
    handle_config, handle_grade, handle_results, handle_serve, OutputFormat,
};
use proctor_engine::telemetry::{init_telemetry, init_telemetry_with_level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)
    } else {
        Config::load_or_create()
    };

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            init_telemetry();
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // --log wins over config; RUST_LOG still wins over both
    let level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(level);

    tracing::info!(
        "Proctor engine v{} ({} - {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COMMIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    match cli.command {
        Command::Serve { bind } => handle_serve(&config, bind).await,

        Command::Grade { candidate_id } => {
            tracing::info!("Grading latest attempt of {}", candidate_id);
            handle_grade(&candidate_id, &config, format).await
        }

        Command::Results { candidate_id } => handle_results(&candidate_id, &config, format).await,

        Command::Config => handle_config(&config, format),
    }
}
