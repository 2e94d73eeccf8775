//! Error types for mftscope
//!
//! Only an unreadable input is fatal. Record- and attribute-level faults
//! are recoverable and surfaced as data so a single corrupt record cannot
//! hide the rest of the table.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for mftscope operations
#[derive(Error, Debug)]
pub enum MftError {
    #[error("Failed to open input '{}': {source}", path.display())]
    InputOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed record at offset {offset:#x}: {fault}")]
    MalformedRecord { offset: usize, fault: RecordFault },

    #[error("Malformed attribute at offset {offset:#x} of entry {entry}: {reason}")]
    MalformedAttribute {
        entry: u64,
        offset: usize,
        reason: String,
    },

    #[error(transparent)]
    Carve(#[from] CarveError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for mftscope operations
pub type Result<T> = std::result::Result<T, MftError>;

impl MftError {
    /// Check if this error is recoverable (scan can continue)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MftError::MalformedRecord { .. }
                | MftError::MalformedAttribute { .. }
                | MftError::Carve(_)
        )
    }
}

/// Why a signature occurrence could not be turned into a record
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFault {
    #[error("header cut off by end of input ({available} bytes available)")]
    TruncatedHeader { available: usize },

    #[error("logical size {declared} is below the {minimum}-byte header minimum")]
    SizeTooSmall { declared: u32, minimum: usize },

    #[error("logical size {declared} exceeds the {remaining} bytes left in the input")]
    SizeExceedsInput { declared: u32, remaining: usize },
}

/// Field-level decode failures. These are stored next to the decoded
/// value instead of being raised, so sibling fields keep decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid timestamp")]
    InvalidTimestamp(u64),

    #[error("invalid residency marker")]
    InvalidResidency(u8),

    #[error("unreadable name")]
    UnreadableName,

    #[error("value is non-resident")]
    NonResidentValue,

    #[error("{field} out of bounds ({len} bytes at offset {offset})")]
    OutOfBounds {
        field: &'static str,
        offset: usize,
        len: usize,
    },
}

/// Outcome of asking an entry for carvable resident content
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CarveError {
    #[error("entry has no $DATA attribute")]
    NoDataAttribute,

    #[error(
        "$DATA is non-resident and cannot be carved from the MFT \
         (clusters {start_vcn}..={end_vcn}, data runs at offset {data_run_offset}, {actual_size} bytes)"
    )]
    NotResident {
        start_vcn: u64,
        end_vcn: u64,
        data_run_offset: u16,
        actual_size: u64,
    },

    #[error("$DATA could not be decoded: {0}")]
    Decode(#[from] DecodeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_messages() {
        assert_eq!(DecodeError::InvalidTimestamp(1).to_string(), "invalid timestamp");
        assert_eq!(DecodeError::InvalidResidency(7).to_string(), "invalid residency marker");
        assert_eq!(DecodeError::UnreadableName.to_string(), "unreadable name");
    }

    #[test]
    fn only_input_errors_are_fatal() {
        let io = MftError::InputOpen {
            path: PathBuf::from("missing.bin"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert!(!io.is_recoverable());

        let bad = MftError::MalformedRecord {
            offset: 0x400,
            fault: RecordFault::SizeTooSmall { declared: 8, minimum: 42 },
        };
        assert!(bad.is_recoverable());
        assert!(bad.to_string().contains("0x400"));
    }
}
