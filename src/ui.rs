use colored::Colorize;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Size Formatting
// ============================================================================

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;
const TB: u64 = GB * 1024;

/// Format bytes as human-readable size
pub fn format_size(bytes: u64) -> String {
    if bytes >= TB {
        format!("{:.2} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format a GB figure the way quota is reported (two decimals).
pub fn format_gb(gb: f64) -> String {
    format!("{gb:.2} GB")
}

// ============================================================================
// Usage Bar
// ============================================================================

const BAR_WIDTH: usize = 30;

/// Filled and empty cell counts for a percentage, clamped to 0..=100.
fn bar_cells(percent: f64) -> (usize, usize) {
    let clamped = if percent.is_finite() {
        percent.clamp(0.0, 100.0)
    } else {
        0.0
    };
    let filled = ((clamped / 100.0) * BAR_WIDTH as f64).round() as usize;
    (filled, BAR_WIDTH - filled)
}

/// Colored quota bar: green below 80%, yellow below 90%, red above.
pub fn usage_bar(percent: f64) -> String {
    let (filled, empty) = bar_cells(percent);
    let fill = "█".repeat(filled);
    let fill = if percent >= 90.0 {
        fill.red()
    } else if percent >= 80.0 {
        fill.yellow()
    } else {
        fill.green()
    };
    format!("{}{} {:.1}%", fill, "░".repeat(empty).dimmed(), percent)
}

// ============================================================================
// Tests
// ============================================================================
