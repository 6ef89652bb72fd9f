//! Error types for legacy bank decoding

use thiserror::Error;

/// Structural problems that reject a whole legacy bank
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LegacyBankError {
    /// The byte stream ended inside a record
    #[error("File appears to be truncated: slot {slot} ends past byte {offset}")]
    Truncated { slot: usize, offset: usize },

    /// A complete parse that did not yield a full bank
    #[error("Did not find {expected} patches and {expected} tones, found {found}")]
    WrongRecordCount { expected: usize, found: usize },

    /// Fixed-length container of the wrong size
    #[error("File length is {found:#x}, expected {expected:#x}")]
    WrongLength { expected: usize, found: usize },
}

/// Result type for legacy bank decoding
pub type LegacyResult<T> = Result<T, LegacyBankError>;
