//! Signature scan over a raw MFT image
//!
//! Records are located by their `FILE` signature rather than by a fixed
//! stride, so images with slack or garbage between records still yield every
//! planted record.

use crate::error::{MftError, RecordFault};
use crate::ntfs::structs::{LOGICAL_SIZE_OFFSET, MFT_RECORD_SIGNATURE, MIN_RECORD_SIZE};
use byteorder::{ByteOrder, LittleEndian};
use std::fmt;

/// One record's bytes, exactly `logical size` long
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawRecord<'a> {
    /// Offset of the signature within the input
    pub offset: usize,
    pub bytes: &'a [u8],
}

impl<'a> RawRecord<'a> {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A signature that could not be turned into a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MalformedRecord {
    pub offset: usize,
    pub fault: RecordFault,
}

impl fmt::Display for MalformedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record at {:#x}: {}", self.offset, self.fault)
    }
}

impl From<MalformedRecord> for MftError {
    fn from(value: MalformedRecord) -> Self {
        MftError::MalformedRecord {
            offset: value.offset,
            fault: value.fault,
        }
    }
}

/// Lazy iterator over every `FILE` occurrence in a buffer.
///
/// A good record moves the cursor to its end, so signatures inside its slack
/// are never revisited. A malformed one moves the cursor past the signature
/// only.
#[derive(Debug, Clone)]
pub struct RecordScanner<'a> {
    data: &'a [u8],
    cursor: usize,
}

impl<'a> RecordScanner<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, cursor: 0 }
    }

    /// Only the well-formed records
    pub fn records(self) -> impl Iterator<Item = RawRecord<'a>> {
        self.filter_map(|item| item.ok())
    }

    /// Current search position within the input
    pub fn position(&self) -> usize {
        self.cursor
    }

    fn find_signature(&self) -> Option<usize> {
        self.data
            .get(self.cursor..)?
            .windows(MFT_RECORD_SIGNATURE.len())
            .position(|w| w == MFT_RECORD_SIGNATURE)
            .map(|pos| self.cursor + pos)
    }

    fn slice_record(&self, offset: usize) -> Result<RawRecord<'a>, RecordFault> {
        let remaining = self.data.len() - offset;
        let size_field = offset + LOGICAL_SIZE_OFFSET;
        let declared = self
            .data
            .get(size_field..size_field + 4)
            .map(LittleEndian::read_u32)
            .ok_or(RecordFault::TruncatedHeader { available: remaining })?;

        if (declared as usize) < MIN_RECORD_SIZE {
            return Err(RecordFault::SizeTooSmall {
                declared,
                minimum: MIN_RECORD_SIZE,
            });
        }
        if declared as usize > remaining {
            return Err(RecordFault::SizeExceedsInput { declared, remaining });
        }

        Ok(RawRecord {
            offset,
            bytes: &self.data[offset..offset + declared as usize],
        })
    }
}

impl<'a> Iterator for RecordScanner<'a> {
    type Item = Result<RawRecord<'a>, MalformedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.find_signature()?;
        match self.slice_record(offset) {
            Ok(record) => {
                self.cursor = offset + record.len();
                tracing::trace!(offset, size = record.len(), "record located");
                Some(Ok(record))
            }
            Err(fault) => {
                self.cursor = offset + MFT_RECORD_SIGNATURE.len();
                tracing::warn!(offset, %fault, "skipping malformed record");
                Some(Err(MalformedRecord { offset, fault }))
            }
        }
    }
}

/// Scan `data` for records
pub fn scan(data: &[u8]) -> RecordScanner<'_> {
    RecordScanner::new(data)
}
