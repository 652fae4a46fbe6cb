use anyhow::{Context as _, Result, bail};
use chrono::Utc;
use dialoguer::Confirm;
use lifecycle::{FolderMap, LifecycleOrchestrator};

use crate::Context;
use crate::cli::SetupArgs;
use crate::config::{BackendConfig, StoreConfig};
use crate::paths;
use crate::progress;
use crate::ui;

pub fn run(ctx: &Context, args: SetupArgs) -> Result<()> {
    let path = paths::config_file(ctx.config.as_deref())?;

    // Thresholds survive a re-run of setup
    let previous = if path.exists() {
        if !args.force {
            let confirmed = Confirm::new()
                .with_prompt(format!("{} already exists. Overwrite?", path.display()))
                .default(false)
                .interact()
                .context("Failed to read confirmation")?;
            if !confirmed {
                ui::info("Setup cancelled");
                return Ok(());
            }
        }
        StoreConfig::load(&path).ok()
    } else {
        None
    };

    let backend = match args.local {
        Some(root) => {
            if !(args.limit_gb.is_finite() && args.limit_gb > 0.0) {
                bail!("--limit-gb must be a positive number");
            }
            BackendConfig::Local {
                root,
                limit_gb: args.limit_gb,
            }
        }
        None => BackendConfig::Drive {
            api_base: args.api_base,
            token_env: args.token_env,
        },
    };

    let mut config = StoreConfig {
        namespace: args.namespace,
        backend,
        legacy_marker: args.legacy_marker,
        retention_config: previous
            .map(|c| c.retention_config)
            .unwrap_or_default(),
        ..Default::default()
    };
    config.check()?;

    let client = config.backend.connect()?;
    let layout = config.layout();

    let pb = progress::spinner("Resolving category folders", ctx.quiet);
    let mut folders = FolderMap::default();
    if let Err(e) = folders.resolve(&client, &layout) {
        progress::finish_warn(&pb, "Could not resolve folders");
        return Err(e).context("Failed to create category folders");
    }
    progress::finish_success(&pb, "Category folders ready");

    config.set_folders(&folders);
    config.setup_date = Some(Utc::now());
    config.save(&path)?;

    if !ctx.quiet {
        ui::header("Storage Setup");
        ui::kv("Config", &path.display().to_string());
        ui::kv("Store", &config.backend.describe());
        for (category, id) in folders.iter() {
            ui::kv(category.key(), &format!("{} ({})", layout.folder_name(category), id));
        }
    }

    // A first report gives later runs a baseline
    let orchestrator = LifecycleOrchestrator::new(&client, &folders, &config.retention_config)?
        .with_options(config.run_options());
    match orchestrator.report_only(Utc::now()) {
        Ok((report, name)) => {
            if !ctx.quiet {
                println!();
                ui::kv("Usage", &ui::usage_bar(report.usage_percent));
                if let Some(name) = name {
                    ui::success(&format!("Initial report saved as {}", name));
                }
            }
        }
        Err(e) => {
            log::warn!("Initial report failed: {}", e);
            ui::warn("Could not write the initial report; `drivekeeper report` will retry");
        }
    }

    Ok(())
}
