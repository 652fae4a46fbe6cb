//! Progress indicators for the drivekeeper CLI.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use lifecycle::{LifecycleState, RunObserver};
use std::time::Duration;

const TICK: Duration = Duration::from_millis(100);

/// Start a spinner with a message. Hidden when `quiet` is set.
pub fn spinner(msg: &str, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(TICK);
    pb
}

/// Finish a spinner with a success mark.
pub fn finish_success(pb: &ProgressBar, msg: &str) {
    pb.finish_with_message(format!("{} {}", "✓".green(), msg));
}

/// Finish a spinner with a warning mark.
pub fn finish_warn(pb: &ProgressBar, msg: &str) {
    pb.finish_with_message(format!("{} {}", "⚠".yellow(), msg));
}

/// Remove a spinner from the terminal.
pub fn finish_clear(pb: &ProgressBar) {
    pb.finish_and_clear();
}

/// Shows the lifecycle state on a spinner while a run is in progress.
pub struct StateSpinner {
    pb: ProgressBar,
}

impl StateSpinner {
    pub fn new(quiet: bool) -> Self {
        Self {
            pb: spinner("Starting", quiet),
        }
    }

    /// Stop the spinner; the summary is printed afterwards.
    pub fn finish(&self) {
        finish_clear(&self.pb);
    }
}

impl RunObserver for StateSpinner {
    fn on_state(&self, state: LifecycleState) {
        log::debug!("Entering state {}", state);
        self.pb.set_message(state.to_string());
    }
}
