//! Last-search persistence, kept next to the cache in the data directory.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchState {
    pub last_search: Option<String>,
}

impl SearchState {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::state_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::state_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create state directory: {}", parent.display())
            })?;
        }

        let toml = toml::to_string_pretty(self).context("Failed to serialize search state")?;
        fs::write(path, toml)
            .with_context(|| format!("Failed to write state file: {}", path.display()))
    }

    /// Record a submitted search. Blank input is not remembered.
    pub fn remember(&mut self, query: &str) {
        if !query.trim().is_empty() {
            self.last_search = Some(query.to_string());
        }
    }

    pub fn state_file_path() -> Result<PathBuf> {
        Ok(weathercache_core::config::project_dirs()?.data_dir().join("state.toml"))
    }
}
