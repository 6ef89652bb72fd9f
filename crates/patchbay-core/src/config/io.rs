//! Reading and writing the librarian settings file

use anyhow::{Context, Result};
use std::path::Path;

use super::LibrarianConfig;

/// Read the settings file
///
/// A missing or unreadable file yields the defaults. A relative adaptation
/// directory is taken relative to the directory holding the settings file, so
/// a collection can be moved as a whole.
pub fn load_librarian_config(path: &Path) -> LibrarianConfig {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::info!("Config: No settings at {}, using defaults", path.display());
            return LibrarianConfig::default();
        }
        Err(e) => {
            log::warn!("Config: Cannot read {}: {}, using defaults", path.display(), e);
            return LibrarianConfig::default();
        }
    };

    let mut config: LibrarianConfig = match serde_yaml::from_str(&contents) {
        Ok(config) => config,
        Err(e) => {
            log::warn!("Config: Invalid settings in {}: {}, using defaults", path.display(), e);
            return LibrarianConfig::default();
        }
    };

    if let (Some(dir), Some(base)) = (config.adaptation_directory.as_mut(), path.parent()) {
        if dir.is_relative() {
            *dir = base.join(&*dir);
        }
    }

    config
}

/// Write the settings file, creating the collection directory if needed
pub fn save_librarian_config(config: &LibrarianConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize librarian settings")?;
    std::fs::write(path, yaml).with_context(|| format!("Failed to write {}", path.display()))?;

    log::info!("Config: Saved settings to {}", path.display());
    Ok(())
}
