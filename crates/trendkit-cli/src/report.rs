//! Read-only report commands.

use clap::Subcommand;
use trendkit_core::WeeklyTrendReport;
use trendkit_pipeline::TrendPipeline;

/// Sub-commands available under `report`.
#[derive(Debug, Subcommand)]
pub enum ReportCommands {
    /// Print the most recent report as JSON
    Latest,
    /// Print the report for one week as JSON
    Show {
        /// ISO week id, e.g. 2026-W42
        week: String,
    },
    /// List stored reports, most recent first
    List {
        #[arg(long, default_value = "12")]
        limit: usize,
    },
    /// Print the plain-text digest for a week (latest if omitted)
    Summary { week: Option<String> },
}

/// # Errors
///
/// Returns an error if storage fails, the week id is malformed, or the
/// requested report does not exist.
pub(crate) async fn run_report(
    pipeline: &TrendPipeline,
    command: ReportCommands,
) -> anyhow::Result<()> {
    match command {
        ReportCommands::Latest => {
            let report = require(pipeline.get_latest_trend_report().await?, None)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        ReportCommands::Show { week } => {
            let report = require(pipeline.get_trend_report(&week).await?, Some(&week))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        ReportCommands::List { limit } => {
            let entries = pipeline.list_trend_reports().await?;
            if entries.is_empty() {
                println!("no reports stored; run `collect` first");
                return Ok(());
            }
            println!("{:<10}{:<22}SIZE", "WEEK", "UPDATED");
            for entry in entries.iter().take(limit) {
                println!(
                    "{:<10}{:<22}{}",
                    entry.week,
                    entry.updated_at.format("%Y-%m-%d %H:%M UTC").to_string(),
                    fmt_size(entry.size_bytes)
                );
            }
        }
        ReportCommands::Summary { week } => {
            let report = match week.as_deref() {
                Some(w) => require(pipeline.get_trend_report(w).await?, Some(w))?,
                None => require(pipeline.get_latest_trend_report().await?, None)?,
            };
            println!("{}", report.summary);
        }
    }
    Ok(())
}

fn require(
    report: Option<WeeklyTrendReport>,
    week: Option<&str>,
) -> anyhow::Result<WeeklyTrendReport> {
    report.ok_or_else(|| match week {
        Some(w) => anyhow::anyhow!("no report stored for {w}"),
        None => anyhow::anyhow!("no reports stored; run `collect` first"),
    })
}

#[allow(clippy::cast_precision_loss)]
fn fmt_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else {
        format!("{:.1} KiB", bytes as f64 / 1024.0)
    }
}
