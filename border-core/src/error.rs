//! Errors in the library.
use thiserror::Error;

/// Errors in the library.
#[derive(Error, Debug)]
pub enum LrrError {
    /// Record key error.
    #[error("Record key error: {0}")]
    RecordKeyError(String),

    /// Record value type error.
    #[error("Record value type error: expected {expected}, found {found}")]
    RecordValueTypeError {
        /// The variant requested by the caller.
        expected: &'static str,
        /// The variant stored in the record.
        found: &'static str,
    },
}
