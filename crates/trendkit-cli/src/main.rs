mod collect;
mod report;
mod sources;

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use trendkit_pipeline::TrendPipeline;

use crate::report::ReportCommands;
use crate::sources::SourcesCommands;

#[derive(Debug, Parser)]
#[command(name = "trendkit")]
#[command(about = "Weekly developer trend collection")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Collect both categories and store the weekly report
    Collect {
        /// Any date inside the target ISO week (defaults to today, UTC)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Regenerate even if a report for the week already exists
        #[arg(long)]
        force: bool,
        /// Show the collection plan without contacting any source
        #[arg(long)]
        dry_run: bool,
    },
    /// Read stored reports
    Report {
        #[command(subcommand)]
        command: ReportCommands,
    },
    /// Show the last pipeline run and per-source status
    Status,
    /// Inspect configured sources
    Sources {
        #[command(subcommand)]
        command: SourcesCommands,
    },
    /// Delete reports and snapshots past the retention window
    Cleanup {
        /// Override `TRENDKIT_REPORT_RETENTION_WEEKS`
        #[arg(long, value_parser = retention_weeks_parser())]
        retention_weeks: Option<u32>,
        /// Reference date for the retention window (defaults to today, UTC)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn retention_weeks_parser() -> clap::builder::RangedI64ValueParser<u32> {
    clap::value_parser!(u32).range(0..=i64::from(trendkit_core::MAX_WEEK_SPAN))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("trendkit: no command given; see `trendkit --help`");
        return Ok(());
    };

    let config = trendkit_core::load_app_config_from_env()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let pipeline = TrendPipeline::from_config(&config).await?;

    match command {
        Commands::Collect {
            date,
            force,
            dry_run,
        } => collect::run_collect(&pipeline, date.unwrap_or_else(today), force, dry_run).await?,
        Commands::Report { command } => report::run_report(&pipeline, command).await?,
        Commands::Status => sources::run_status(&pipeline).await?,
        Commands::Sources { command } => sources::run_sources(&pipeline, command).await?,
        Commands::Cleanup {
            retention_weeks,
            date,
        } => {
            let retention = retention_weeks.unwrap_or(pipeline.settings().retention_weeks);
            collect::run_cleanup(&pipeline, retention, date.unwrap_or_else(today)).await?;
        }
    }

    Ok(())
}
