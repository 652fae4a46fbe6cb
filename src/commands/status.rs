use anyhow::Result;
use colored::Colorize;
use lifecycle::Category;

use crate::Context;
use crate::commands::Session;
use crate::paths;
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    ui::header("Drivekeeper Status");

    let path = paths::config_file(ctx.config.as_deref())?;
    ui::kv("Config", &path.display().to_string());
    if !path.exists() {
        ui::kv("Status", &"Not configured".yellow().to_string());
        ui::dim("Run: drivekeeper setup");
        println!();
        return Ok(());
    }

    let session = Session::load(ctx)?;
    let config = &session.config;
    ui::kv("Store", &config.backend.describe());
    ui::kv("Namespace", &config.namespace);
    if let Some(date) = config.setup_date {
        ui::kv("Set up", &date.format("%Y-%m-%d %H:%M UTC").to_string());
    }
    if let Some(marker) = &config.legacy_marker {
        ui::kv("Legacy marker", marker);
    }

    ui::section("Folders");
    let layout = config.layout();
    for category in Category::ALL {
        let state = match session.folders.get(category) {
            Ok(id) => format!("{} {}", "✓".green(), id.to_string().dimmed()),
            Err(_) => format!("{} not resolved", "⚠".yellow()),
        };
        println!("  {:<28} {}", layout.folder_name(category), state);
    }

    ui::section("Retention");
    let retention = &config.retention_config;
    ui::kv("Raw", &format!("{} days", retention.raw_retention_days));
    ui::kv("Processed", &format!("{} days", retention.processed_retention_days));
    ui::kv(
        "Models",
        &format!(
            "{} primary, {} with backups",
            retention.models_to_keep, retention.backup_models_to_keep
        ),
    );
    ui::kv(
        "Archives",
        &format!("{} months", retention.compressed_retention_months),
    );
    ui::kv("Quota target", &ui::format_gb(retention.max_storage_gb));

    ui::section("Usage");
    match session.client.quota() {
        Ok(quota) => {
            ui::kv(
                "Used",
                &format!(
                    "{} of {}",
                    ui::format_gb(quota.used_gb()),
                    ui::format_gb(quota.limit_gb())
                ),
            );
            println!("  {}", ui::usage_bar(quota.usage_percent()));
        }
        Err(e) => {
            log::debug!("Quota lookup failed: {}", e);
            ui::kv("Used", &format!("{} ({})", "unavailable".yellow(), e));
        }
    }

    println!();
    Ok(())
}
