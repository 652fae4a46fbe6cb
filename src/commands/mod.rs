pub mod plan;
pub mod report;
pub mod run;
pub mod setup;
pub mod status;

use anyhow::{Context as _, Result};
use lifecycle::FolderMap;
use remote::Client;
use std::path::PathBuf;

use crate::Context;
use crate::config::StoreConfig;
use crate::paths;

/// A loaded config with a connected client and its folder handles.
pub struct Session {
    pub path: PathBuf,
    pub config: StoreConfig,
    pub client: Client,
    pub folders: FolderMap,
}

impl Session {
    /// Load the config and connect, without touching any folder.
    pub fn load(ctx: &Context) -> Result<Self> {
        let path = paths::config_file(ctx.config.as_deref())?;
        let config = StoreConfig::load(&path)?;
        let client = config.backend.connect()?;
        let folders = config.folder_map();
        Ok(Self {
            path,
            config,
            client,
            folders,
        })
    }

    /// Load, connect and make sure every category folder exists.
    ///
    /// Missing handles are looked up (or created) by name and written back
    /// to the config file.
    pub fn open(ctx: &Context) -> Result<Self> {
        let mut session = Self::load(ctx)?;
        if !session.folders.is_complete() {
            log::info!("Resolving missing category folders");
            session
                .folders
                .resolve(&session.client, &session.config.layout())
                .context("Failed to resolve category folders")?;
            session.config.set_folders(&session.folders);
            session.config.save(&session.path)?;
        }
        Ok(session)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::config::BackendConfig;
    use tempfile::TempDir;

    /// A config file pointing at a local store, both inside `dir`.
    pub fn local_context(dir: &TempDir) -> Context {
        let path = dir.path().join("storage_config.json");
        let config = StoreConfig {
            backend: BackendConfig::Local {
                root: dir.path().join("store").to_string_lossy().to_string(),
                limit_gb: 1.0,
            },
            ..Default::default()
        };
        config.save(&path).unwrap();
        Context {
            verbose: 0,
            quiet: true,
            config: Some(path),
        }
    }
}
