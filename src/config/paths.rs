//! Where pov-kids keeps its files.
//!
//! Settings and learner profiles live in the platform config directory,
//! camera stills in the local data directory (both via `dirs`).  Setting
//! `POV_KIDS_HOME` puts everything under one directory instead, which is
//! handy for a shared classroom machine or a USB stick.

use std::path::{Path, PathBuf};

/// Overrides both platform directories when set.
pub const HOME_ENV: &str = "POV_KIDS_HOME";

const APP_DIR: &str = "pov-kids";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub settings_file: PathBuf,
    pub profiles_file: PathBuf,
    /// Watched by the file-backed camera.
    pub camera_dir: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Self::portable(Path::new(&home));
        }
        let config_root = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        let data_root = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::from_roots(&config_root.join(APP_DIR), &data_root.join(APP_DIR))
    }

    /// Everything under `home`, stills in `home/camera`.
    pub fn portable(home: &Path) -> Self {
        Self::from_roots(home, home)
    }

    fn from_roots(config: &Path, data: &Path) -> Self {
        Self {
            settings_file: config.join("settings.toml"),
            profiles_file: config.join("profiles.json"),
            camera_dir: data.join("camera"),
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
