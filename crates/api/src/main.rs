//! Alertbridge - Main Entry Point

use anyhow::Context;
use api::config::Settings;
use api::logging::{init_logging, parse_level, LogSettings};
use api::{create_router, server, AppState};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "alertbridge", version, about = "Forward push notifications to Alertmanager")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, env = "ALERTBRIDGE_CONFIG_FILE")]
    config_file: Option<PathBuf>,

    /// Log format override: plain, text or json
    #[arg(long)]
    log_format: Option<String>,

    /// Log level override: debug, info, warn, error
    #[arg(long)]
    log_level: Option<String>,

    /// Include timestamps in log output; `--log-time=false` turns them off
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    log_time: Option<bool>,
}

impl Cli {
    /// Apply command-line logging flags over `base`
    fn log_settings(&self, base: LogSettings) -> anyhow::Result<LogSettings> {
        let mut settings = base;
        if let Some(format) = &self.log_format {
            settings.format = format.parse()?;
        }
        if let Some(level) = &self.log_level {
            settings.level = parse_level(level)?;
        }
        if let Some(include_time) = self.log_time {
            settings.include_time = include_time;
        }
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let Some(path) = cli.config_file.clone() else {
        init_logging(&cli.log_settings(LogSettings::default())?)?;
        warn!("No configuration file given (--config-file); nothing to serve");
        return Ok(());
    };

    let settings = Settings::load(&path)
        .with_context(|| format!("load configuration from {}", path.display()))?;
    init_logging(&cli.log_settings(settings.logging)?)?;

    info!("=== Alertbridge v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "Loaded {} app(s), forwarding to {}",
        settings.apps.len(),
        settings.alertmanager.url
    );

    let metrics = api::metrics::install().context("install metrics recorder")?;
    let state = AppState::from_settings(&settings, metrics).context("build alertmanager client")?;
    let router = create_router(state, settings.server.max_body_bytes);

    let listener = server::bind(&settings.server).await?;
    server::run_until(
        listener,
        router,
        server::ServeLimits::from(&settings.server),
        server::shutdown_signal(),
    )
    .await?;

    Ok(())
}
