//! Configuration and local cache shared by every command.

use anyhow::{Context as _, Result};
use corkboard_core::config::CorkboardConfig;
use corkboard_core::storage::{self, FileStore};
use corkboard_core::workspace::Workspace;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Command-line values that win over the config file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub storage_dir: Option<PathBuf>,
    pub api_url: Option<String>,
    pub ws_url: Option<String>,
    pub token: Option<String>,
}

pub struct Context {
    pub config: CorkboardConfig,
    pub store: Arc<FileStore>,
}

impl Context {
    pub fn load(config_path: &Path, overrides: Overrides) -> Result<Self> {
        let mut config = CorkboardConfig::load_or_default(config_path)
            .with_context(|| format!("Failed to load config {:?}", config_path))?;
        if let Some(dir) = overrides.storage_dir {
            config.storage_dir = dir;
        }
        if let Some(url) = overrides.api_url {
            config.api_base_url = url;
        }
        if let Some(url) = overrides.ws_url {
            config.ws_url = url;
        }
        if overrides.token.is_some() {
            config.auth_token = overrides.token;
        }
        let dir = config.storage_path();
        debug!(storage = %dir.display(), api = config.api_base(), "Loaded configuration");
        Ok(Self {
            store: Arc::new(FileStore::new(dir)),
            config,
        })
    }

    /// The cached workspace, or an empty one.
    pub fn workspace(&self) -> Workspace {
        storage::load_workspace(self.store.as_ref())
    }

    pub fn save_workspace(&self, workspace: &Workspace) -> Result<()> {
        if !storage::save_workspace(self.store.as_ref(), workspace) {
            anyhow::bail!(
                "Failed to write workspace to {}",
                self.store.dir().display()
            );
        }
        Ok(())
    }
}
