//! Config file location for drivekeeper
//!
//! # Environment Variables
//!
//! - `DRIVEKEEPER_CONFIG` - Full path of the config file
//! - `DRIVEKEEPER_CONFIG_DIR` - Directory holding `storage_config.json`
//!
//! # Path Resolution Priority
//!
//! For config_file():
//! 1. `--config` flag
//! 2. `DRIVEKEEPER_CONFIG` environment variable
//! 3. `DRIVEKEEPER_CONFIG_DIR/storage_config.json`
//! 4. `XDG_CONFIG_HOME/drivekeeper/storage_config.json` (if set)
//! 5. `~/.config/drivekeeper/storage_config.json`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for the config file path
pub const ENV_CONFIG: &str = "DRIVEKEEPER_CONFIG";

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "DRIVEKEEPER_CONFIG_DIR";

/// Default config file name
pub const CONFIG_FILE_NAME: &str = "storage_config.json";

/// Get the drivekeeper config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join("drivekeeper");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join("drivekeeper");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Resolve the config file, honouring an explicit `--config` first.
pub fn config_file(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(expand(&path.to_string_lossy()));
    }

    if let Ok(file) = std::env::var(ENV_CONFIG) {
        let path = expand(&file);
        log::debug!("Using config file from {}: {}", ENV_CONFIG, path.display());
        return Ok(path);
    }

    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, MutexGuard};

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_lock() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Helper to run a test with temporary env var
    ///
    /// # Safety
    /// This function uses unsafe env::set_var/remove_var which can cause issues
    /// if other threads read environment variables concurrently.
    fn with_env_var<F, R>(key: &str, value: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: Tests run in isolation and don't read env vars concurrently
        unsafe { env::set_var(key, value) };
        let result = f();
        match original {
            // SAFETY: Tests run in isolation
            Some(v) => unsafe { env::set_var(key, v) },
            None => unsafe { env::remove_var(key) },
        }
        result
    }

    fn without_env_var<F, R>(key: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: Tests run in isolation and don't read env vars concurrently
        unsafe { env::remove_var(key) };
        let result = f();
        if let Some(v) = original {
            // SAFETY: Tests run in isolation
            unsafe { env::set_var(key, v) };
        }
        result
    }

    #[test]
    fn test_explicit_path_wins() {
        let _guard = env_lock();
        with_env_var(ENV_CONFIG, "/from/env.json", || {
            let result = config_file(Some(Path::new("/flag/kp.toml"))).unwrap();
            assert_eq!(result, PathBuf::from("/flag/kp.toml"));
        });
    }

    #[test]
    fn test_config_env_override() {
        let _guard = env_lock();
        with_env_var(ENV_CONFIG, "/from/env.json", || {
            assert_eq!(config_file(None).unwrap(), PathBuf::from("/from/env.json"));
        });
    }

    #[test]
    fn test_config_dir_env_override() {
        let _guard = env_lock();
        without_env_var(ENV_CONFIG, || {
            with_env_var(ENV_CONFIG_DIR, "/custom/keeper", || {
                assert_eq!(
                    config_file(None).unwrap(),
                    PathBuf::from("/custom/keeper/storage_config.json")
                );
            });
        });
    }

    #[test]
    fn test_xdg_config_home() {
        let _guard = env_lock();
        without_env_var(ENV_CONFIG_DIR, || {
            with_env_var("XDG_CONFIG_HOME", "/tmp/xdg-keeper-test", || {
                let result = config_dir().unwrap();
                assert_eq!(result, PathBuf::from("/tmp/xdg-keeper-test/drivekeeper"));
            });
        });
    }

    #[test]
    fn test_expand_with_tilde() {
        let result = expand("~/keeper/store");
        let home = dirs::home_dir().unwrap();
        assert_eq!(result, home.join("keeper").join("store"));
    }

    #[test]
    fn test_expand_absolute() {
        assert_eq!(expand("/absolute/path"), PathBuf::from("/absolute/path"));
    }
}
