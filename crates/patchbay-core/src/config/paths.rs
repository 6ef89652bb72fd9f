//! Standard locations of the librarian's files

use std::path::PathBuf;

/// Get the default collection path
///
/// Returns: `~/Documents/Patchbay` (home directory if there is no documents
/// folder, current directory as last resort)
pub fn default_collection_path() -> PathBuf {
    dirs::document_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Patchbay")
}

/// Get the default adaptation directory
///
/// Returns: `~/Documents/Patchbay/adaptations`
pub fn default_adaptation_path() -> PathBuf {
    default_collection_path().join("adaptations")
}

/// Get the default config file path
///
/// Returns: `~/Documents/Patchbay/patchbay.yaml`
pub fn default_config_path() -> PathBuf {
    default_collection_path().join("patchbay.yaml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_path_ends_with_patchbay() {
        let path = default_collection_path();
        assert!(path.ends_with("Patchbay"));
    }

    #[test]
    fn test_adaptation_path_inside_collection() {
        let path = default_adaptation_path();
        assert!(path.starts_with(default_collection_path()));
        assert!(path.ends_with("adaptations"));
    }
}
