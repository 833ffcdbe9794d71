// server/src/cli/cli.rs

// Parses arguments, loads configuration, initializes tracing and dispatches.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use super::app::PlannerApp;
use super::commands::{CliArgs, PlannerCommands};
use super::handlers;
use planner::config::PlannerConfig;

/// Installs the fmt subscriber. `RUST_LOG` takes precedence over `level`.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // A subscriber may already be installed (tests, embedding); keep it.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();
}

pub async fn start_cli() -> Result<()> {
    run(CliArgs::parse()).await
}

pub async fn run(args: CliArgs) -> Result<()> {
    let mut config = PlannerConfig::load(&args.config)
        .await
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;
    if let Some(fixture) = args.fixture {
        config.storage.fixture_path = Some(fixture);
    }
    init_tracing(args.log_level.as_deref().unwrap_or(&config.log_level));
    debug!("Loaded configuration: {:?}", config);

    if args.command == PlannerCommands::CheckConfig {
        return handlers::handle_check_config(&config);
    }

    let app = PlannerApp::build(config).await?;
    match args.command {
        PlannerCommands::Reminders { once, interval_secs } => handlers::handle_reminders(&app, once, interval_secs).await,
        PlannerCommands::Risk { mother } => handlers::handle_risk(&app, mother).await,
        PlannerCommands::Route { chw, date, mode } => handlers::handle_route(&app, chw, date, mode).await,
        PlannerCommands::Slots { facility, date, duration } => {
            handlers::handle_slots(&app, facility, date, duration).await
        }
        PlannerCommands::Balance { facility, date } => handlers::handle_balance(&app, facility, date).await,
        PlannerCommands::CheckConfig => Ok(()),
    }
}
