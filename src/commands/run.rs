use anyhow::{Context as _, Result, bail};
use chrono::Utc;
use colored::Colorize;
use lifecycle::{LifecycleOrchestrator, RunSummary};

use crate::Context;
use crate::cli::RunArgs;
use crate::commands::{Session, report};
use crate::progress::StateSpinner;
use crate::ui;

/// Usage above which a finished run still prints a warning.
const HIGH_USAGE_PERCENT: f64 = 90.0;

pub fn run(ctx: &Context, args: RunArgs) -> Result<()> {
    let session = Session::open(ctx)?;
    let observer = StateSpinner::new(ctx.quiet || args.json);
    let orchestrator = LifecycleOrchestrator::new(
        &session.client,
        &session.folders,
        &session.config.retention_config,
    )?
    .with_options(session.config.run_options())
    .with_observer(&observer);

    let result = orchestrator.run(Utc::now());
    observer.finish();
    let summary = result.context("Lifecycle run aborted")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(ctx, &summary);
    }

    if summary.reclaim_shortfall() {
        bail!(
            "Emergency reclamation ran out of candidates; usage is still {:.1}%",
            summary.final_usage_percent()
        );
    }
    if summary.needs_attention(args.alert_threshold) {
        bail!(
            "Final usage {:.1}% is above the {:.1}% alert threshold",
            summary.final_usage_percent(),
            args.alert_threshold
        );
    }
    Ok(())
}

fn print_summary(ctx: &Context, summary: &RunSummary) {
    ui::header("Lifecycle Run");
    ui::kv(
        "Usage",
        &format!(
            "{} → {} of {}",
            ui::format_gb(summary.initial_usage.used_gb()),
            ui::format_gb(summary.final_usage.used_gb()),
            ui::format_gb(summary.final_usage.limit_gb())
        ),
    );
    println!("  {}", ui::usage_bar(summary.final_usage_percent()));

    ui::section("Actions");
    if summary.adopted > 0 {
        ui::kv("Adopted", &summary.adopted.to_string());
    }
    ui::kv("Archives written", &summary.archives_written.to_string());
    ui::kv("Files compressed", &summary.files_compressed.to_string());
    ui::kv("Files deleted", &summary.files_deleted.to_string());
    ui::kv("Models moved", &summary.models_moved.to_string());
    ui::kv("Space freed", &ui::format_size(summary.bytes_freed));

    if let Some(reclaim) = &summary.reclaim {
        let status = if reclaim.shortfall {
            "short of target".red().to_string()
        } else {
            "target met".green().to_string()
        };
        ui::kv(
            "Emergency reclaim",
            &format!(
                "{} of {} freed, {}",
                ui::format_size(reclaim.freed_bytes),
                ui::format_size(reclaim.target_bytes),
                status
            ),
        );
    }

    if !summary.degraded.is_empty() {
        let states: Vec<String> = summary.degraded.iter().map(ToString::to_string).collect();
        ui::kv("Degraded", &states.join(", ").yellow().to_string());
    }

    if ctx.verbose > 0 {
        if let Some(report) = &summary.report {
            report::print_report(report);
        }
    } else if !summary.warnings.is_empty() {
        ui::section("Warnings");
        for warning in &summary.warnings {
            ui::warn(warning);
        }
    }

    println!();
    if let Some(name) = &summary.report_name {
        ui::success(&format!("Report saved as {}", name));
    }
    if summary.final_usage_percent() > HIGH_USAGE_PERCENT {
        ui::warn("Storage is still above 90% after cleanup");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing;
    use crate::config::StoreConfig;
    use tempfile::TempDir;

    fn args() -> RunArgs {
        RunArgs {
            alert_threshold: 90.0,
            json: true,
        }
    }

    #[test]
    fn test_run_on_empty_store_succeeds() {
        let dir = TempDir::new().unwrap();
        let ctx = testing::local_context(&dir);

        run(&ctx, args()).unwrap();

        let config = StoreConfig::load(ctx.config.as_deref().unwrap()).unwrap();
        assert_eq!(config.folder_ids.len(), 6);
        let logs = dir.path().join("store").join("forex_logs");
        assert_eq!(std::fs::read_dir(logs).unwrap().count(), 1);
    }

    #[test]
    fn test_run_with_unreadable_config_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("storage_config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let ctx = Context {
            verbose: 0,
            quiet: true,
            config: Some(path),
        };

        assert!(run(&ctx, args()).is_err());
    }
}
