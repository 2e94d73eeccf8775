//! Attribute chain walker
//!
//! Walks one record's attributes from the header's first-attribute offset,
//! using each attribute's length field as the stride. The walk keeps its own
//! cursor and finishes in exactly one [`WalkEnd`] state.

use crate::ntfs::attribute::Attribute;
use crate::ntfs::structs::{AttributeHeader, ATTRIBUTE_END_MARKER};
use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;
use std::fmt;

/// How an attribute walk finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WalkEnd {
    /// Type code 0xFFFFFFFF
    EndMarker,
    /// Cursor hit the record or logical-size limit
    ReachedLimit,
    /// Length field of zero
    ZeroLength { offset: usize },
    /// `offset + length` runs past the record
    Overflow { offset: usize, length: u32 },
    /// Not enough bytes left for a generic attribute header
    Truncated { offset: usize },
}

impl WalkEnd {
    /// Whether the chain ended normally
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::EndMarker | Self::ReachedLimit)
    }

    /// Offset of the attribute that stopped a malformed walk
    pub fn fault_offset(&self) -> Option<usize> {
        match *self {
            Self::ZeroLength { offset } | Self::Overflow { offset, .. } | Self::Truncated { offset } => {
                Some(offset)
            }
            Self::EndMarker | Self::ReachedLimit => None,
        }
    }
}

impl fmt::Display for WalkEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EndMarker => f.write_str("end marker"),
            Self::ReachedLimit => f.write_str("reached record limit"),
            Self::ZeroLength { offset } => write!(f, "zero-length attribute at {offset:#x}"),
            Self::Overflow { offset, length } => {
                write!(f, "attribute at {offset:#x} claims {length} bytes past the record end")
            }
            Self::Truncated { offset } => write!(f, "truncated attribute header at {offset:#x}"),
        }
    }
}

/// Iterator over the attributes of a single record
#[derive(Debug, Clone)]
pub struct AttributeWalker<'a> {
    record: &'a [u8],
    cursor: usize,
    limit: usize,
    end: Option<WalkEnd>,
}

impl<'a> AttributeWalker<'a> {
    pub fn new(record: &'a [u8], first_attribute_offset: usize) -> Self {
        Self {
            record,
            cursor: first_attribute_offset,
            limit: record.len(),
            end: None,
        }
    }

    /// Also stop at a declared logical size shorter than the buffer
    pub fn with_limit(mut self, logical_size: usize) -> Self {
        self.limit = self.limit.min(logical_size);
        self
    }

    /// Terminal state, once the iterator has returned `None`
    pub fn end(&self) -> Option<WalkEnd> {
        self.end
    }

    /// Walk to completion, returning the attributes and how the walk ended
    pub fn collect_all(mut self) -> (Vec<Attribute<'a>>, WalkEnd) {
        let attributes: Vec<_> = self.by_ref().collect();
        (attributes, self.end.unwrap_or(WalkEnd::ReachedLimit))
    }

    fn finish(&mut self, end: WalkEnd) -> Option<Attribute<'a>> {
        if !end.is_clean() {
            tracing::warn!(%end, "attribute walk stopped early");
        }
        self.end = Some(end);
        None
    }
}

impl<'a> Iterator for AttributeWalker<'a> {
    type Item = Attribute<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.end.is_some() {
            return None;
        }

        let offset = self.cursor;
        if offset >= self.limit {
            return self.finish(WalkEnd::ReachedLimit);
        }

        let record = self.record;
        let window = &record[offset..self.limit];
        if window.len() >= 4 && LittleEndian::read_u32(window) == ATTRIBUTE_END_MARKER {
            return self.finish(WalkEnd::EndMarker);
        }

        let Some(header) = AttributeHeader::from_bytes(window) else {
            return self.finish(WalkEnd::Truncated { offset });
        };

        let length = header.length as usize;
        if length == 0 {
            return self.finish(WalkEnd::ZeroLength { offset });
        }
        if length > window.len() {
            return self.finish(WalkEnd::Overflow {
                offset,
                length: header.length,
            });
        }

        // a length shorter than the generic header still sets the stride;
        // the header fields it cuts off decode as errors
        self.cursor = offset + length;
        tracing::trace!(offset, type_code = header.type_code, length, "attribute");
        Some(Attribute::decode(offset, header, &window[..length]))
    }
}
