//! Profile persistence.
//!
//! [`JsonProfileStore`] keeps every profile in one pretty-printed JSON list.
//! Saving replaces the record with the same id (or appends a new one) and
//! rewrites the file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::Profile;

pub trait ProfileStore: Send + Sync {
    fn load_all(&self) -> Result<Vec<Profile>>;

    /// Full replacement keyed by `profile.id`.
    fn save(&self, profile: &Profile) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct JsonProfileStore {
    path: PathBuf,
}

impl JsonProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_all(&self, profiles: &[Profile]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create profile directory: {}", parent.display())
            })?;
        }
        let json = serde_json::to_string_pretty(profiles).context("failed to serialise profiles")?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("failed to write profiles: {}", self.path.display()))
    }
}

impl ProfileStore for JsonProfileStore {
    /// Missing file → empty list.
    fn load_all(&self) -> Result<Vec<Profile>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read profiles: {}", self.path.display()))?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse profiles: {}", self.path.display()))
    }

    fn save(&self, profile: &Profile) -> Result<()> {
        let mut profiles = self.load_all()?;
        match profiles.iter_mut().find(|p| p.id == profile.id) {
            Some(existing) => *existing = profile.clone(),
            None => profiles.push(profile.clone()),
        }
        self.write_all(&profiles)?;
        log::debug!("reward: saved profile {} ({} coins)", profile.id, profile.coins);
        Ok(())
    }
}
