//! Operator CLI for the observatory pipeline.

use clap::{Parser, Subcommand};
use chrono::NaiveDate;
use tracing::info;
use tracing_subscriber::EnvFilter;

use observatory_core::{Config, Runtime};

#[derive(Parser)]
#[command(name = "observatory", about = "AI-news observatory pipeline", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline service (workers + schedulers)
    Run,
    /// Run the feed dispatcher once and exit
    Ingest,
    /// Enqueue a briefing job for the given date (default: today)
    TriggerBriefing {
        /// Briefing date, YYYY-MM-DD
        date: Option<NaiveDate>,
    },
    /// Migrate legacy rows through the snapshot pipeline
    Backfill,
}

#[tokio::main]
async fn main() -> observatory_core::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let runtime = Runtime::new(config)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => runtime.run().await?,
        Command::Ingest => {
            let result = runtime.ingest_once().await?;
            info!(%result, "ingest pass complete");
        }
        Command::TriggerBriefing { date } => {
            runtime.trigger_briefing(date)?;
        }
        Command::Backfill => {
            let migrated = runtime.backfill()?;
            info!(migrated, "backfill complete");
        }
    }
    Ok(())
}
