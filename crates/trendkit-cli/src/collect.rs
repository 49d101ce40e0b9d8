//! `collect` and `cleanup` command handlers.
//!
//! Source failures never surface here; the pipeline turns them into report
//! gaps. Only storage and configuration errors abort the command.

use chrono::NaiveDate;
use trendkit_core::period_for;
use trendkit_pipeline::TrendPipeline;

/// Run the weekly pipeline for the week containing `date`.
///
/// With `dry_run` the period and the source order are printed and nothing
/// is fetched or written.
///
/// # Errors
///
/// Returns an error if storage is unavailable.
pub(crate) async fn run_collect(
    pipeline: &TrendPipeline,
    date: NaiveDate,
    force: bool,
    dry_run: bool,
) -> anyhow::Result<()> {
    let period = period_for(date);

    if dry_run {
        let exists = pipeline.storage().report_exists(&period.week).await?;
        println!(
            "dry-run: week {} ({} to {}), report {}",
            period.week,
            period.start,
            period.end,
            if exists { "exists" } else { "missing" }
        );
        if exists && !force {
            println!("dry-run: existing report would be reused (pass --force to regenerate)");
        }
        for (category, name, variant) in pipeline.registry().describe() {
            println!(
                "  {:<6} {name:<20} {}",
                category.as_str(),
                variant.as_str()
            );
        }
        return Ok(());
    }

    let generated = pipeline.run_weekly(date, force).await?;
    let report = &generated.report;
    if generated.reused {
        println!(
            "report for {} already exists; reused (pass --force to regenerate)",
            report.week
        );
    }
    println!("{}", report.summary);

    let gaps: Vec<String> = report
        .provenance
        .iter()
        .filter(|p| p.is_gap())
        .map(|p| p.category.to_string())
        .collect();
    if !gaps.is_empty() {
        tracing::warn!(week = %report.week, gaps = %gaps.join(", "), "report has category gaps");
    }
    Ok(())
}

/// # Errors
///
/// Returns an error if storage is unavailable.
pub(crate) async fn run_cleanup(
    pipeline: &TrendPipeline,
    retention_weeks: u32,
    today: NaiveDate,
) -> anyhow::Result<()> {
    let summary = pipeline.cleanup_with_retention(retention_weeks, today).await?;
    tracing::info!(
        retention_weeks,
        reports = summary.reports_deleted.len(),
        snapshots = summary.snapshots_deleted,
        "retention cleanup finished"
    );
    let cutoff = summary
        .cutoff
        .map_or_else(|| "n/a".to_string(), |d| d.to_string());
    println!(
        "cleanup: cutoff {cutoff}, deleted {} reports and {} snapshots",
        summary.reports_deleted.len(),
        summary.snapshots_deleted
    );
    for week in &summary.reports_deleted {
        println!("  removed {week}");
    }
    Ok(())
}
