//! Librarian configuration
//!
//! - The [`LibrarianConfig`] settings consumed by the adaptation registry
//! - Reading and writing the YAML settings file
//! - Default collection and adaptation paths
//!
//! # Usage
//!
//! ```ignore
//! use patchbay_core::config::{default_config_path, load_librarian_config};
//!
//! let config = load_librarian_config(&default_config_path());
//! ```

mod io;
mod paths;

pub use io::{load_librarian_config, save_librarian_config};
pub use paths::{default_adaptation_path, default_collection_path, default_config_path};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Settings of the librarian core
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibrarianConfig {
    /// Directory scanned for user adaptation modules
    ///
    /// `None` uses [`default_adaptation_path`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adaptation_directory: Option<PathBuf>,
}

impl LibrarianConfig {
    /// The configured adaptation directory, or the default location
    pub fn adaptation_directory(&self) -> PathBuf {
        self.adaptation_directory
            .clone()
            .unwrap_or_else(default_adaptation_path)
    }
}
