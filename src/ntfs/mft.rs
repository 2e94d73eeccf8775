//! MFT (Master File Table) entries and image access
//!
//! An [`Entry`] is one record's header plus its attributes in on-disk order.
//! An [`MftImage`] owns the input buffer every entry borrows from.

use crate::error::{DecodeError, MftError, Result};
use crate::ntfs::attribute::{Attribute, AttributeBody, DataAttribute, FileName, StandardInformation};
use crate::ntfs::records::{RawRecord, RecordScanner};
use crate::ntfs::structs::*;
use crate::ntfs::walker::{AttributeWalker, WalkEnd};
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};

// ============================================================================
// Decoded Entry
// ============================================================================

/// One decoded MFT record
#[derive(Debug, Clone, PartialEq)]
pub struct Entry<'a> {
    /// Offset of the record within the input
    pub offset: usize,
    /// Record number from the header, or the scan ordinal for short records
    pub entry_number: u64,
    pub header: RecordHeader,
    pub attributes: Vec<Attribute<'a>>,
    pub walk_end: WalkEnd,
}

impl<'a> Entry<'a> {
    /// Decode a located record. `ordinal` is its position in the scan.
    pub fn decode(record: RawRecord<'a>, ordinal: u64) -> Option<Self> {
        let header = RecordHeader::from_bytes(record.bytes)?;
        let entry_number = header.record_number.map(u64::from).unwrap_or(ordinal);

        let _span = tracing::debug_span!("entry", number = entry_number, offset = record.offset).entered();
        let (attributes, walk_end) = AttributeWalker::new(record.bytes, header.first_attribute_offset as usize)
            .with_limit(header.used_size as usize)
            .collect_all();
        tracing::trace!(attributes = attributes.len(), %walk_end, "entry decoded");

        Some(Self {
            offset: record.offset,
            entry_number,
            header,
            attributes,
            walk_end,
        })
    }

    /// Decode a single record buffer that starts at offset 0
    pub fn from_bytes(bytes: &'a [u8]) -> Option<Self> {
        Self::decode(RawRecord { offset: 0, bytes }, 0)
    }

    pub fn is_in_use(&self) -> bool {
        self.header.is_in_use()
    }

    pub fn is_directory(&self) -> bool {
        self.header.is_directory()
    }

    /// Attributes of one type, in on-disk order
    pub fn attributes_of(&self, kind: AttributeType) -> impl Iterator<Item = &Attribute<'a>> {
        self.attributes
            .iter()
            .filter(move |a| a.attribute_type() == Some(kind))
    }

    /// Every decodable `$FILE_NAME`
    pub fn file_names(&self) -> impl Iterator<Item = &FileName> {
        self.attributes.iter().filter_map(|a| match &a.body {
            AttributeBody::FileName(Ok(f)) => Some(f),
            _ => None,
        })
    }

    /// Best readable name: Win32 > Win32+DOS > POSIX > DOS
    pub fn primary_file_name(&self) -> Option<&FileName> {
        self.file_names()
            .filter(|f| f.name.is_ok())
            .min_by_key(|f| f.namespace.rank())
    }

    pub fn primary_name(&self) -> Option<&str> {
        self.primary_file_name().and_then(|f| f.name.as_deref().ok())
    }

    pub fn standard_information(&self) -> Option<&StandardInformation> {
        self.attributes.iter().find_map(|a| match &a.body {
            AttributeBody::StandardInformation(Ok(si)) => Some(si),
            _ => None,
        })
    }

    /// The `$DATA` attribute to carve: the unnamed stream when present,
    /// otherwise the first named one
    pub fn data(&self) -> Option<(&Attribute<'a>, &std::result::Result<DataAttribute<'a>, DecodeError>)> {
        let mut streams = self.attributes.iter().filter_map(|a| match &a.body {
            AttributeBody::Data(d) => Some((a, d)),
            _ => None,
        });
        let first = streams.next()?;
        if first.0.is_unnamed() {
            return Some(first);
        }
        streams.find(|(a, _)| a.is_unnamed()).or(Some(first))
    }

    /// Names of the alternate data streams
    pub fn stream_names(&self) -> Vec<&str> {
        self.attributes_of(AttributeType::Data)
            .filter_map(|a| a.name.as_ref()?.as_deref().ok())
            .collect()
    }

    /// The walk fault, if the attribute chain was malformed
    pub fn walk_fault(&self) -> Option<MftError> {
        let offset = self.walk_end.fault_offset()?;
        Some(MftError::MalformedAttribute {
            entry: self.entry_number,
            offset,
            reason: self.walk_end.to_string(),
        })
    }
}

// ============================================================================
// Image Session
// ============================================================================

enum Buffer {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

/// Read-only MFT image: a memory-mapped file or an owned buffer
pub struct MftImage {
    path: Option<PathBuf>,
    buffer: Buffer,
}

impl MftImage {
    /// Memory-map an image file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let open_err = |source| MftError::InputOpen {
            path: path.to_path_buf(),
            source,
        };

        let file = File::open(path).map_err(open_err)?;
        let len = file.metadata().map_err(open_err)?.len();

        // mapping a zero-length file fails on some platforms
        let buffer = if len == 0 {
            Buffer::Owned(Vec::new())
        } else {
            // The image is opened read-only and never written while mapped.
            Buffer::Mapped(unsafe { Mmap::map(&file) }.map_err(open_err)?)
        };

        tracing::debug!(path = %path.display(), bytes = len, "image opened");
        Ok(Self {
            path: Some(path.to_path_buf()),
            buffer,
        })
    }

    /// Wrap an in-memory buffer
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            path: None,
            buffer: Buffer::Owned(bytes),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn bytes(&self) -> &[u8] {
        match &self.buffer {
            Buffer::Mapped(map) => map,
            Buffer::Owned(vec) => vec,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }

    /// Signature scan over the whole image
    pub fn records(&self) -> RecordScanner<'_> {
        RecordScanner::new(self.bytes())
    }

    /// Decode every well-formed record in scan order
    pub fn entries(&self) -> impl Iterator<Item = Entry<'_>> {
        self.records()
            .records()
            .enumerate()
            .filter_map(|(ordinal, record)| Entry::decode(record, ordinal as u64))
    }
}

impl std::fmt::Debug for MftImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MftImage")
            .field("path", &self.path)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ntfs::test_support::*;

    #[test]
    fn entry_number_comes_from_header() {
        let record = RecordBuilder::new(41)
            .file_name(FileNameSpec::new(40, "report.txt"))
            .build();
        let entry = Entry::from_bytes(&record).unwrap();
        assert_eq!(entry.entry_number, 41);
        assert_eq!(entry.walk_end, WalkEnd::EndMarker);
        assert!(entry.walk_fault().is_none());
        assert_eq!(entry.primary_name(), Some("report.txt"));
    }

    #[test]
    fn short_record_falls_back_to_ordinal() {
        let mut record = vec![0u8; 42];
        record[0..4].copy_from_slice(b"FILE");
        record[20..22].copy_from_slice(&42u16.to_le_bytes());
        record[24..28].copy_from_slice(&42u32.to_le_bytes());
        let entry = Entry::decode(RawRecord { offset: 0x400, bytes: &record }, 9).unwrap();
        assert_eq!(entry.entry_number, 9);
        assert!(entry.attributes.is_empty());
        assert_eq!(entry.walk_end, WalkEnd::ReachedLimit);
    }

    #[test]
    fn primary_name_prefers_win32_over_dos() {
        let record = RecordBuilder::new(50)
            .file_name(FileNameSpec::new(5, "PROGRA~1").namespace(FilenameNamespace::Dos))
            .file_name(FileNameSpec::new(5, "Program Files").namespace(FilenameNamespace::Win32))
            .build();
        let entry = Entry::from_bytes(&record).unwrap();
        assert_eq!(entry.file_names().count(), 2);
        assert_eq!(entry.primary_name(), Some("Program Files"));
    }

    #[test]
    fn data_prefers_unnamed_stream() {
        let record = RecordBuilder::new(60)
            .attribute(data_attr(b"zone", Some("Zone.Identifier")))
            .attribute(data_attr(b"main", None))
            .build();
        let entry = Entry::from_bytes(&record).unwrap();
        let (attr, _) = entry.data().unwrap();
        assert!(attr.is_unnamed());
        assert_eq!(entry.stream_names(), vec!["Zone.Identifier"]);
    }

    #[test]
    fn malformed_walk_becomes_recoverable_error() {
        let mut zero = resident_attr(0x10, &[0u8; 48]);
        zero[4..8].copy_from_slice(&0u32.to_le_bytes());
        let record = RecordBuilder::new(7).attribute(zero).build();
        let entry = Entry::from_bytes(&record).unwrap();
        let err = entry.walk_fault().unwrap();
        assert!(err.is_recoverable());
        assert!(matches!(err, MftError::MalformedAttribute { entry: 7, offset: 56, .. }));
    }

    #[test]
    fn image_from_bytes_decodes_entries() {
        let mut bytes = vec![0u8; 100];
        bytes.extend(RecordBuilder::new(5).directory().file_name(FileNameSpec::new(5, ".")).build());
        let image = MftImage::from_bytes(bytes);
        let entries: Vec<_> = image.entries().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].offset, 100);
        assert!(entries[0].is_directory());
    }
}
