//! Error types for the adaptation runtime
//!
//! Most of these never reach the host: the bridge logs them and degrades to a
//! neutral value. They exist so the runtime and module layers can report what
//! went wrong with enough context to log it.

use std::path::PathBuf;
use thiserror::Error;

use crate::module::EntryPoint;

/// Errors that can occur while loading or calling adaptations
#[derive(Debug, Error)]
pub enum AdaptationError {
    /// The process-wide runtime was never started or has been poisoned
    #[error("Adaptation runtime is not available")]
    RuntimeUnavailable,

    /// No module with this name is loaded into the runtime
    #[error("Adaptation module '{0}' is not loaded")]
    ModuleNotLoaded(String),

    /// The module does not define the entry point
    #[error("Adaptation '{module}': method {entry} not found")]
    MissingEntryPoint { module: String, entry: EntryPoint },

    /// The entry point ran but produced data that violates its contract
    #[error("Adaptation '{module}': {entry} returned invalid data: {reason}")]
    ContractViolation {
        module: String,
        entry: EntryPoint,
        reason: String,
    },

    /// Module source failed to parse or validate
    #[error("Invalid adaptation module '{module}': {reason}")]
    InvalidModule { module: String, reason: String },

    /// Module file has no usable name
    #[error("Not an adaptation module file: {0}")]
    NotAModuleFile(PathBuf),

    /// Embedded modules have no file to reload from
    #[error("Adaptation '{0}' is built in and cannot be reloaded")]
    NotReloadable(String),

    /// IO error reading a module file
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AdaptationError {
    /// True for a missing entry point, the only error that is part of normal operation
    pub fn is_missing_entry(&self) -> bool {
        matches!(self, Self::MissingEntryPoint { .. })
    }
}

/// Result type for adaptation operations
pub type AdaptationResult<T> = Result<T, AdaptationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AdaptationError::MissingEntryPoint {
            module: "Korg_MS2000".to_string(),
            entry: EntryPoint::ConvertToProgramDump,
        };
        assert!(err.to_string().contains("convertToProgramDump"));
        assert!(err.is_missing_entry());

        let err = AdaptationError::NotReloadable("Roland_MKS80".to_string());
        assert!(err.to_string().contains("Roland_MKS80"));
        assert!(!err.is_missing_entry());
    }
}
