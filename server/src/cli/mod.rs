// server/src/cli/mod.rs

pub mod app;
pub mod cli;
pub mod commands;
pub mod handlers;

pub use app::PlannerApp;
pub use cli::{run, start_cli};
pub use commands::{CliArgs, PlannerCommands};
