//! `status` and `sources` command handlers.

use chrono::{DateTime, Utc};
use clap::Subcommand;
use trendkit_core::{HealthVerdict, SourceHealth};
use trendkit_pipeline::TrendPipeline;

#[derive(Debug, Subcommand)]
pub enum SourcesCommands {
    /// List configured sources in priority order
    List,
    /// Probe every source now
    Check,
}

fn fmt_time(t: Option<DateTime<Utc>>) -> String {
    t.map_or_else(
        || "\u{2014}".to_string(),
        |t| t.format("%Y-%m-%d %H:%M").to_string(),
    )
}

fn fmt_verdict(verdict: Option<&HealthVerdict>) -> String {
    match verdict {
        Some(v) if v.healthy => format!("healthy ({}ms)", v.latency_ms),
        Some(v) => format!(
            "unhealthy: {}",
            v.detail.as_deref().unwrap_or("no detail")
        ),
        None => "no probe".to_string(),
    }
}

/// Print the last persisted run followed by per-source status.
///
/// # Errors
///
/// Returns an error if storage cannot be read.
pub(crate) async fn run_status(pipeline: &TrendPipeline) -> anyhow::Result<()> {
    match pipeline.get_pipeline_status().await? {
        Some(status) => {
            println!("Last run: {} ({})", status.week, status.run_id);
            println!("Started:  {}", fmt_time(Some(status.started_at)));
            println!("Finished: {}", fmt_time(status.finished_at));
            for p in &status.categories {
                match &p.source {
                    Some(source) => {
                        println!("  {}: {} items from {source}", p.category, p.item_count);
                    }
                    None => println!(
                        "  {}: gap ({})",
                        p.category,
                        p.gap_reason.as_deref().unwrap_or("no source succeeded")
                    ),
                }
            }
        }
        None => println!("no pipeline run recorded yet"),
    }

    println!();
    println!(
        "{:<20}{:<8}{:<18}{:<18}{:<6}LAST ERROR",
        "SOURCE", "CAT", "LAST SUCCESS", "LAST FAILURE", "FAILS"
    );
    for s in pipeline.get_source_statuses() {
        println!(
            "{:<20}{:<8}{:<18}{:<18}{:<6}{}",
            s.source,
            s.category.as_str(),
            fmt_time(s.last_success),
            fmt_time(s.last_failure),
            s.consecutive_failures,
            s.last_error.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

pub(crate) async fn run_sources(
    pipeline: &TrendPipeline,
    command: SourcesCommands,
) -> anyhow::Result<()> {
    match command {
        SourcesCommands::List => {
            println!("{:<8}{:<20}VARIANT", "CAT", "SOURCE");
            for (category, name, variant) in pipeline.registry().describe() {
                println!("{:<8}{name:<20}{}", category.as_str(), variant.as_str());
            }
        }
        SourcesCommands::Check => {
            let results: Vec<SourceHealth> = pipeline.check_all_sources().await;
            let unhealthy = results
                .iter()
                .filter(|h| h.verdict.as_ref().is_some_and(|v| !v.healthy))
                .count();
            for h in &results {
                println!(
                    "{:<8}{:<20}{}",
                    h.category.as_str(),
                    h.source,
                    fmt_verdict(h.verdict.as_ref())
                );
            }
            if unhealthy > 0 {
                eprintln!("warning: {unhealthy} of {} sources unhealthy", results.len());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_formatting() {
        assert_eq!(fmt_verdict(None), "no probe");
        assert_eq!(
            fmt_verdict(Some(&HealthVerdict::healthy(12))),
            "healthy (12ms)"
        );
        assert_eq!(
            fmt_verdict(Some(&HealthVerdict::unhealthy(5, "HTTP 503"))),
            "unhealthy: HTTP 503"
        );
    }

    #[test]
    fn missing_time_is_a_dash() {
        assert_eq!(fmt_time(None), "\u{2014}");
    }
}
