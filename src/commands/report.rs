use anyhow::{Context as _, Result};
use chrono::Utc;
use colored::Colorize;
use lifecycle::{Category, LifecycleOrchestrator, RunOptions, StorageReport};

use crate::Context;
use crate::cli::ReportArgs;
use crate::commands::Session;
use crate::progress;
use crate::ui;

pub fn run(ctx: &Context, args: ReportArgs) -> Result<()> {
    let session = Session::open(ctx)?;
    let options = RunOptions {
        persist_report: !args.no_save,
        ..session.config.run_options()
    };
    let orchestrator = LifecycleOrchestrator::new(
        &session.client,
        &session.folders,
        &session.config.retention_config,
    )?
    .with_options(options);

    let pb = progress::spinner("Building storage report", ctx.quiet || args.json);
    let result = orchestrator.report_only(Utc::now());
    progress::finish_clear(&pb);
    let (report, name) = result.context("Failed to build storage report")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_report(&report);
    if let Some(name) = name {
        ui::success(&format!("Saved {}", name));
    }
    Ok(())
}

/// Pretty-print a storage report.
pub fn print_report(report: &StorageReport) {
    ui::header("Storage Report");
    ui::kv(
        "Taken",
        &report.timestamp_taken.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    );
    ui::kv(
        "Usage",
        &format!(
            "{} of {}",
            ui::format_gb(report.used_gb),
            ui::format_gb(report.limit_gb)
        ),
    );
    println!("  {}", ui::usage_bar(report.usage_percent));

    ui::section("Categories");
    for category in Category::ALL {
        let stats = report.stats(category);
        let expired = if stats.expired_count > 0 {
            format!(", {} expired", stats.expired_count).yellow().to_string()
        } else {
            String::new()
        };
        println!(
            "  {:<12} {:>10.1} MB  {:>5} file(s){}",
            category.key(),
            stats.size_mb,
            stats.file_count,
            expired
        );
    }

    if !report.recommendations.is_empty() {
        ui::section("Recommendations");
        for rec in &report.recommendations {
            println!("  {} {}", "→".cyan(), rec);
        }
    }

    if !report.warnings.is_empty() {
        ui::section("Warnings");
        for warning in &report.warnings {
            ui::warn(warning);
        }
    }
}
