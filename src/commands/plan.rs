use anyhow::Result;
use chrono::Utc;
use colored::Colorize;
use lifecycle::{LifecycleOrchestrator, ModelRecord, RunPlan};

use crate::Context;
use crate::commands::Session;
use crate::progress;
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    let session = Session::open(ctx)?;
    let orchestrator = LifecycleOrchestrator::new(
        &session.client,
        &session.folders,
        &session.config.retention_config,
    )?
    .with_options(session.config.run_options());

    let pb = progress::spinner("Planning", ctx.quiet);
    let plan = orchestrator.plan(Utc::now());
    progress::finish_clear(&pb);

    print_plan(&plan);
    Ok(())
}

fn model_line(model: &ModelRecord) -> String {
    let score = if model.defaulted {
        "no metric".dimmed().to_string()
    } else {
        format!("{:.4}", model.performance_score)
    };
    format!("{} ({}, {})", model.file.name, score, model.file.category)
}

fn print_plan(plan: &RunPlan) {
    ui::header("Lifecycle Plan");

    match plan.usage {
        Some(usage) => {
            ui::kv(
                "Usage",
                &format!(
                    "{} of {}",
                    ui::format_gb(usage.used_gb()),
                    ui::format_gb(usage.limit_gb())
                ),
            );
            println!("  {}", ui::usage_bar(usage.usage_percent()));
        }
        None => ui::kv("Usage", &"unknown".yellow().to_string()),
    }

    if !plan.legacy.is_empty() {
        ui::section("Adopt unfiled files");
        for (name, category) in &plan.legacy {
            match category {
                Some(category) => println!("  {} → {}", name, category),
                None => println!("  {} {}", name, "(unrecognised, left in place)".dimmed()),
            }
        }
    }

    ui::section("Archive raw data");
    if plan.monthly_groups.is_empty() {
        ui::dim("Nothing past the raw retention window");
    }
    for group in &plan.monthly_groups {
        println!(
            "  {}  {} file(s), {}",
            group.month,
            group.files.len(),
            ui::format_size(group.bytes())
        );
    }

    ui::section("Model retention");
    for model in &plan.models.keep_primary {
        println!("  {} {}", "keep".green(), model_line(model));
    }
    for model in &plan.models.keep_backup {
        println!("  {} {}", "backup".cyan(), model_line(model));
    }
    for model in &plan.models.to_delete {
        println!("  {} {}", "delete".red(), model_line(model));
    }
    if plan.models.moves() > 0 {
        ui::dim(&format!("{} artifact(s) change folder", plan.models.moves()));
    }

    ui::section("Expire archives");
    if plan.expired_archives.is_empty() {
        ui::dim("No archive past the compressed retention window");
    }
    for file in &plan.expired_archives {
        println!("  {} ({})", file.name, ui::format_size(file.size_bytes));
    }

    if plan.reclaim_target_bytes > 0 {
        println!();
        ui::warn(&format!(
            "Over quota: emergency reclamation would target {}",
            ui::format_size(plan.reclaim_target_bytes)
        ));
    }

    if !plan.warnings.is_empty() {
        ui::section("Warnings");
        for warning in &plan.warnings {
            ui::warn(warning);
        }
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing;
    use tempfile::TempDir;

    #[test]
    fn test_plan_writes_nothing_to_the_store() {
        let dir = TempDir::new().unwrap();
        let ctx = testing::local_context(&dir);
        let raw = dir.path().join("store").join("forex_data_raw");
        std::fs::create_dir_all(&raw).unwrap();
        std::fs::write(raw.join("data_2020-01-01.csv"), "t,v\n1,2\n").unwrap();

        run(&ctx).unwrap();

        assert!(raw.join("data_2020-01-01.csv").exists());
        let logs = dir.path().join("store").join("forex_logs");
        assert_eq!(std::fs::read_dir(logs).unwrap().count(), 0);
    }
}
