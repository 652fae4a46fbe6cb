use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "drivekeeper")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Keep a quota-limited remote store tidy", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: $DRIVEKEEPER_CONFIG or ~/.config/drivekeeper/storage_config.json)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create the category folders and write the config file
    Setup(SetupArgs),

    /// Run the full storage lifecycle
    Run(RunArgs),

    /// Show what `run` would do without changing anything
    Plan,

    /// Generate a storage report
    Report(ReportArgs),

    /// Show config location, folders and quota usage
    Status,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct SetupArgs {
    /// Prefix for folder names (<namespace>_data_raw, ...)
    #[arg(long, default_value = lifecycle::FolderLayout::DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Use a local directory as the store instead of Google Drive
    #[arg(long, value_name = "DIR")]
    pub local: Option<String>,

    /// Quota for a local store, in GB
    #[arg(long, value_name = "GB", default_value_t = 15.0)]
    pub limit_gb: f64,

    /// Drive API base URL
    #[arg(long, value_name = "URL", conflicts_with = "local")]
    pub api_base: Option<String>,

    /// Environment variable holding the Drive access token
    #[arg(long, value_name = "VAR", default_value = remote::backend::drive::DEFAULT_TOKEN_ENV)]
    pub token_env: String,

    /// Adopt root-level files whose name contains this marker
    #[arg(long, value_name = "MARKER")]
    pub legacy_marker: Option<String>,

    /// Overwrite an existing config without asking
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args)]
pub struct RunArgs {
    /// Exit non-zero when final usage is above this percentage
    #[arg(long, value_name = "PCT", default_value_t = 90.0)]
    pub alert_threshold: f64,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct ReportArgs {
    /// Print the report without saving it to the store
    #[arg(long)]
    pub no_save: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}
