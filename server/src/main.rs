// server/src/main.rs

// Entry point of the planner binary; parsing and dispatch live in the cli module.

use anyhow::Result;
use planner_server::cli::start_cli;

#[tokio::main]
async fn main() -> Result<()> {
    start_cli().await
}
