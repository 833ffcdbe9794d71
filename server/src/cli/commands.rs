// server/src/cli/commands.rs

// Command-line arguments and subcommands of the planner binary.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use models::{FacilityId, MotherId, UserId};
use planner::config::DEFAULT_CONFIG_PATH;
use planner::routing::TransportMode;

/// Seconds between reminder passes when neither `--once` nor `--interval-secs` is given.
pub const DEFAULT_REMINDER_INTERVAL_SECS: u64 = 900;

#[derive(Parser, Debug)]
#[command(name = "mamacare-planner")]
#[command(version = "0.1.0")]
#[command(about = "MamaCare clinical planner: reminders, risk, routes and slots")]
pub struct CliArgs {
    /// Planner configuration file (YAML, `planner:` root)
    #[arg(long, short = 'c', env = "PLANNER_CONFIG", default_value = DEFAULT_CONFIG_PATH, value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,
    /// JSON store snapshot; overrides `storage.fixture_path`
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub fixture: Option<PathBuf>,
    /// Log filter; `RUST_LOG` wins when set
    #[arg(long)]
    pub log_level: Option<String>,
    #[command(subcommand)]
    pub command: PlannerCommands,
}

#[derive(Debug, Subcommand, PartialEq)]
pub enum PlannerCommands {
    /// Send upcoming visit reminders and mark missed visits
    Reminders {
        /// Run a single pass and exit
        #[arg(long, conflicts_with = "interval_secs")]
        once: bool,
        #[arg(long)]
        interval_secs: Option<u64>,
    },
    /// Score a mother's pregnancy risk and cache the level
    Risk {
        #[arg(long)]
        mother: MotherId,
    },
    /// Plan a CHW's route through the day's visits
    Route {
        #[arg(long)]
        chw: UserId,
        #[arg(long, value_name = "YYYY-MM-DD")]
        date: NaiveDate,
        #[arg(long, default_value = "driving")]
        mode: TransportMode,
    },
    /// List free appointment slots at a facility
    Slots {
        #[arg(long)]
        facility: FacilityId,
        #[arg(long, value_name = "YYYY-MM-DD")]
        date: NaiveDate,
        /// Slot length in minutes
        #[arg(long)]
        duration: Option<u32>,
    },
    /// Even out a facility's CHW workload for one day
    Balance {
        #[arg(long)]
        facility: FacilityId,
        #[arg(long, value_name = "YYYY-MM-DD")]
        date: NaiveDate,
    },
    /// Load and validate the configuration, then print it
    CheckConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_route_with_mode_alias() {
        let chw = UserId::new();
        let args = CliArgs::try_parse_from([
            "mamacare-planner",
            "route",
            "--chw",
            &chw.to_string(),
            "--date",
            "2024-07-03",
            "--mode",
            "walker",
        ])
        .unwrap();
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert_eq!(
            args.command,
            PlannerCommands::Route {
                chw,
                date: NaiveDate::from_ymd_opt(2024, 7, 3).unwrap(),
                mode: TransportMode::Walking,
            }
        );
    }

    #[test]
    fn reminders_once_conflicts_with_interval() {
        let err = CliArgs::try_parse_from(["mamacare-planner", "reminders", "--once", "--interval-secs", "60"]);
        assert!(err.is_err());
        let args = CliArgs::try_parse_from(["mamacare-planner", "-c", "alt.yaml", "reminders", "--once"]).unwrap();
        assert_eq!(args.config, PathBuf::from("alt.yaml"));
        assert_eq!(
            args.command,
            PlannerCommands::Reminders {
                once: true,
                interval_secs: None
            }
        );
    }

    #[test]
    fn rejects_malformed_identifiers_and_dates() {
        assert!(CliArgs::try_parse_from(["mamacare-planner", "risk", "--mother", "not-a-uuid"]).is_err());
        let facility = FacilityId::new().to_string();
        assert!(
            CliArgs::try_parse_from(["mamacare-planner", "slots", "--facility", &facility, "--date", "03/07/2024"])
                .is_err()
        );
    }
}
