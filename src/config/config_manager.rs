//! Shared config/keymap handles with atomic swap.
//!
//! The pump thread reads the current handles at frame boundaries; reloads
//! build the new `Config`/`Keymap` off-thread and swap the `Arc`s in one
//! write-lock blip.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use tracing::info;

use super::config::Config;
use super::keymap_file::load_keymap;
use crate::keymap::Keymap;

pub struct ConfigManager {
    config_path: PathBuf,
    config: RwLock<Arc<Config>>,
    keymap: RwLock<Arc<Keymap>>,
}

impl ConfigManager {
    /// Load config and keymap from disk, or fall back to defaults when the
    /// config file does not exist yet.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config_path = match config_path {
            Some(p) => p.to_path_buf(),
            None => Config::default_path()?,
        };
        let config = Config::load_or_default(Some(&config_path))?;
        let keymap = Self::load_keymap_for(&config, &config_path)?;
        Ok(Self {
            config_path,
            config: RwLock::new(Arc::new(config)),
            keymap: RwLock::new(Arc::new(keymap)),
        })
    }

    fn load_keymap_for(config: &Config, config_path: &Path) -> Result<Keymap> {
        let keymap_path = config.keymap_path(config_path);
        if keymap_path.exists() {
            load_keymap(&keymap_path, &config.layout)
                .with_context(|| format!("failed to load keymap {}", keymap_path.display()))
        } else {
            info!("no keymap file at {}, starting empty", keymap_path.display());
            Ok(Keymap::new(config.layout.clone()))
        }
    }

    /// Re-read config and keymap from disk and swap both handles.
    pub fn reload(&self) -> Result<()> {
        let config = Config::load_or_default(Some(&self.config_path))?;
        let keymap = Self::load_keymap_for(&config, &self.config_path)?;
        *self.config.write() = Arc::new(config);
        *self.keymap.write() = Arc::new(keymap);
        info!("configuration reloaded from {}", self.config_path.display());
        Ok(())
    }

    #[must_use]
    pub fn config(&self) -> Arc<Config> {
        self.config.read().clone()
    }

    #[must_use]
    pub fn keymap(&self) -> Arc<Keymap> {
        self.keymap.read().clone()
    }

    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}
