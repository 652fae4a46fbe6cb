//! The `storage_config` file written by `setup` and read by every other
//! command. JSON by default, TOML when the file name ends in `.toml`.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use lifecycle::{Category, FolderLayout, FolderMap, RetentionConfig, RunOptions};
use remote::backend::drive::{DEFAULT_TOKEN_ENV, DriveBackend};
use remote::backend::local::LocalBackend;
use remote::{Client, FolderId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::paths;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Which store the config points at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum BackendConfig {
    /// A directory tree on this machine
    Local { root: String, limit_gb: f64 },
    /// Google Drive, authenticated with a bearer token from the environment
    Drive {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        api_base: Option<String>,
        #[serde(default = "default_token_env")]
        token_env: String,
    },
}

fn default_token_env() -> String {
    DEFAULT_TOKEN_ENV.to_string()
}

fn default_namespace() -> String {
    FolderLayout::DEFAULT_NAMESPACE.to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::Drive {
            api_base: None,
            token_env: default_token_env(),
        }
    }
}

impl BackendConfig {
    /// Open a client for this store.
    pub fn connect(&self) -> Result<Client> {
        let client = match self {
            Self::Local { root, limit_gb } => {
                let root = paths::expand(root);
                let backend = LocalBackend::new(&root, (limit_gb * BYTES_PER_GB) as u64)
                    .with_context(|| format!("Could not open local store at {}", root.display()))?;
                Client::with_backend(Box::new(backend))
            }
            Self::Drive {
                api_base,
                token_env,
            } => {
                let backend = DriveBackend::from_env(token_env, api_base.as_deref())
                    .with_context(|| format!("Could not authenticate using ${token_env}"))?;
                Client::with_backend(Box::new(backend))
            }
        };
        Ok(client)
    }

    /// One-line description for status output.
    pub fn describe(&self) -> String {
        match self {
            Self::Local { root, limit_gb } => format!("local {root} ({limit_gb} GB)"),
            Self::Drive { api_base, .. } => format!(
                "drive {}",
                api_base
                    .as_deref()
                    .unwrap_or(remote::backend::drive::DEFAULT_API_BASE)
            ),
        }
    }
}

/// Contents of the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    #[serde(default)]
    pub folder_ids: BTreeMap<String, FolderId>,
    #[serde(default)]
    pub retention_config: RetentionConfig,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_marker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_date: Option<DateTime<Utc>>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            folder_ids: BTreeMap::new(),
            retention_config: RetentionConfig::default(),
            namespace: default_namespace(),
            backend: BackendConfig::default(),
            legacy_marker: None,
            setup_date: None,
        }
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}

impl StoreConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).with_context(|| {
            format!(
                "Could not read {} (run `drivekeeper setup` first)",
                path.display()
            )
        })?;

        let config: Self = if is_toml(path) {
            toml::from_str(&content)
                .with_context(|| format!("Invalid TOML format in {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON format in {}", path.display()))?
        };

        config
            .retention_config
            .validate()
            .with_context(|| format!("Invalid retentionConfig in {}", path.display()))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Write the config file, creating its directory.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Could not create {}", dir.display()))?;
        }

        let content = if is_toml(path) {
            toml::to_string_pretty(self).context("Failed to serialize config")?
        } else {
            serde_json::to_string_pretty(self).context("Failed to serialize config")?
        };
        fs::write(path, content).with_context(|| format!("Could not write {}", path.display()))?;
        log::debug!("Saved config to {}", path.display());
        Ok(())
    }

    pub fn layout(&self) -> FolderLayout {
        FolderLayout::new(&self.namespace)
    }

    /// Folder handles recorded in the file. Unknown keys are ignored.
    pub fn folder_map(&self) -> FolderMap {
        FolderMap::from_ids(self.folder_ids.iter().filter_map(|(key, id)| {
            let category = Category::from_key(key);
            if category.is_none() {
                log::warn!("Ignoring unknown folder key '{}' in config", key);
            }
            category.map(|c| (c, id.clone()))
        }))
    }

    /// Record resolved folder handles.
    pub fn set_folders(&mut self, folders: &FolderMap) {
        self.folder_ids = folders
            .iter()
            .map(|(category, id)| (category.key().to_string(), id.clone()))
            .collect();
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            legacy_marker: self.legacy_marker.clone(),
            ..RunOptions::default()
        }
    }

    /// Reject a retention config that cannot be run.
    pub fn check(&self) -> Result<()> {
        if self.namespace.trim().is_empty() {
            bail!("namespace must not be empty");
        }
        self.retention_config.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> StoreConfig {
        let mut config = StoreConfig {
            namespace: "fx".to_string(),
            backend: BackendConfig::Local {
                root: "/srv/store".to_string(),
                limit_gb: 2.0,
            },
            legacy_marker: Some("forex".to_string()),
            ..Default::default()
        };
        config
            .folder_ids
            .insert("raw".to_string(), FolderId::new("folder-1"));
        config
    }

    #[test]
    fn test_json_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("storage_config.json");

        sample().save(&path).unwrap();
        let loaded = StoreConfig::load(&path).unwrap();

        assert_eq!(loaded, sample());
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"folderIds\""));
        assert!(raw.contains("\"retentionConfig\""));
        assert!(raw.contains("\"limitGb\""));
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keeper.toml");

        sample().save(&path).unwrap();
        let loaded = StoreConfig::load(&path).unwrap();

        assert_eq!(loaded, sample());
        assert!(fs::read_to_string(&path).unwrap().contains("type = \"local\""));
    }

    #[test]
    fn test_minimal_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("storage_config.json");
        fs::write(&path, r#"{"backend": {"type": "drive"}}"#).unwrap();

        let loaded = StoreConfig::load(&path).unwrap();

        assert_eq!(loaded.namespace, "forex");
        assert_eq!(loaded.retention_config, RetentionConfig::default());
        assert_eq!(loaded.backend, BackendConfig::default());
    }

    #[test]
    fn test_invalid_retention_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("storage_config.json");
        fs::write(
            &path,
            r#"{"retentionConfig": {"modelsToKeep": 7, "backupModelsToKeep": 5}}"#,
        )
        .unwrap();

        let err = StoreConfig::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("backupModelsToKeep"));
    }

    #[test]
    fn test_folder_map_skips_unknown_keys() {
        let mut config = sample();
        config
            .folder_ids
            .insert("scratch".to_string(), FolderId::new("folder-9"));

        let map = config.folder_map();

        assert_eq!(map.get(Category::Raw).unwrap(), &FolderId::new("folder-1"));
        assert_eq!(map.iter().count(), 1);
    }

    #[test]
    fn test_local_backend_connects() {
        let dir = TempDir::new().unwrap();
        let backend = BackendConfig::Local {
            root: dir.path().to_string_lossy().to_string(),
            limit_gb: 1.0,
        };
        let client = backend.connect().unwrap();
        assert_eq!(client.quota().unwrap().limit_bytes, 1024 * 1024 * 1024);
    }
}
