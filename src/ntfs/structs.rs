//! NTFS on-disk structures and constants

use crate::error::DecodeError;
use crate::ntfs::codec::ByteCursor;
use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;
use std::fmt;
use std::io::Cursor;

// ============================================================================
// NTFS Constants
// ============================================================================

/// MFT record signature "FILE"
pub const MFT_RECORD_SIGNATURE: [u8; 4] = *b"FILE";

/// End of attributes marker
pub const ATTRIBUTE_END_MARKER: u32 = 0xFFFFFFFF;

/// Smallest logical size a record may declare (header through next attribute id)
pub const MIN_RECORD_SIZE: usize = 42;

/// Offset of the logical (used) size field inside the record header
pub const LOGICAL_SIZE_OFFSET: usize = 24;

/// Offset of the record's own entry number (NTFS 3.1+)
pub const RECORD_NUMBER_OFFSET: usize = 44;

/// Well-known entry number of the root directory
pub const ROOT_ENTRY_NUMBER: u64 = 5;

/// Every attribute starts with at least this many bytes of common header
pub const ATTRIBUTE_HEADER_SIZE: usize = 16;

/// Mask selecting the entry number from a 64-bit file reference
pub const FILE_REFERENCE_ENTRY_MASK: u64 = 0x0000_FFFF_FFFF_FFFF;

// MFT Record Flags
pub const MFT_RECORD_IN_USE: u16 = 0x0001;
pub const MFT_RECORD_IS_DIRECTORY: u16 = 0x0002;
pub const MFT_RECORD_IN_EXTEND: u16 = 0x0004;
pub const MFT_RECORD_IS_VIEW_INDEX: u16 = 0x0008;

/// Split a file reference into (entry number, sequence number)
pub fn split_file_reference(reference: u64) -> (u64, u16) {
    (reference & FILE_REFERENCE_ENTRY_MASK, (reference >> 48) as u16)
}

// ============================================================================
// Attribute Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u32)]
pub enum AttributeType {
    StandardInformation = 0x10,
    AttributeList = 0x20,
    FileName = 0x30,
    ObjectId = 0x40,
    SecurityDescriptor = 0x50,
    VolumeName = 0x60,
    VolumeInformation = 0x70,
    Data = 0x80,
    IndexRoot = 0x90,
    IndexAllocation = 0xA0,
    Bitmap = 0xB0,
    ReparsePoint = 0xC0,
    EaInformation = 0xD0,
    Ea = 0xE0,
    PropertySet = 0xF0,
    LoggedUtilityStream = 0x100,
}

impl AttributeType {
    pub const ALL: [AttributeType; 16] = [
        Self::StandardInformation,
        Self::AttributeList,
        Self::FileName,
        Self::ObjectId,
        Self::SecurityDescriptor,
        Self::VolumeName,
        Self::VolumeInformation,
        Self::Data,
        Self::IndexRoot,
        Self::IndexAllocation,
        Self::Bitmap,
        Self::ReparsePoint,
        Self::EaInformation,
        Self::Ea,
        Self::PropertySet,
        Self::LoggedUtilityStream,
    ];

    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0x10 => Some(Self::StandardInformation),
            0x20 => Some(Self::AttributeList),
            0x30 => Some(Self::FileName),
            0x40 => Some(Self::ObjectId),
            0x50 => Some(Self::SecurityDescriptor),
            0x60 => Some(Self::VolumeName),
            0x70 => Some(Self::VolumeInformation),
            0x80 => Some(Self::Data),
            0x90 => Some(Self::IndexRoot),
            0xA0 => Some(Self::IndexAllocation),
            0xB0 => Some(Self::Bitmap),
            0xC0 => Some(Self::ReparsePoint),
            0xD0 => Some(Self::EaInformation),
            0xE0 => Some(Self::Ea),
            0xF0 => Some(Self::PropertySet),
            0x100 => Some(Self::LoggedUtilityStream),
            _ => None,
        }
    }

    pub fn code(&self) -> u32 {
        *self as u32
    }

    /// Conventional `$NAME` of the attribute type
    pub fn name(&self) -> &'static str {
        match self {
            Self::StandardInformation => "$STANDARD_INFORMATION",
            Self::AttributeList => "$ATTRIBUTE_LIST",
            Self::FileName => "$FILE_NAME",
            Self::ObjectId => "$OBJECT_ID",
            Self::SecurityDescriptor => "$SECURITY_DESCRIPTOR",
            Self::VolumeName => "$VOLUME_NAME",
            Self::VolumeInformation => "$VOLUME_INFORMATION",
            Self::Data => "$DATA",
            Self::IndexRoot => "$INDEX_ROOT",
            Self::IndexAllocation => "$INDEX_ALLOCATION",
            Self::Bitmap => "$BITMAP",
            Self::ReparsePoint => "$REPARSE_POINT",
            Self::EaInformation => "$EA_INFORMATION",
            Self::Ea => "$EA",
            Self::PropertySet => "$PROPERTY_SET",
            Self::LoggedUtilityStream => "$LOGGED_UTILITY_STREAM",
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Filename Namespace
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FilenameNamespace {
    Posix,
    Win32,
    Dos,
    Win32AndDos,
    Other(u8),
}

impl From<FilenameNamespace> for u8 {
    fn from(value: FilenameNamespace) -> Self {
        value.code()
    }
}

impl FilenameNamespace {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Posix,
            1 => Self::Win32,
            2 => Self::Dos,
            3 => Self::Win32AndDos,
            other => Self::Other(other),
        }
    }

    /// On-disk namespace byte
    pub fn code(&self) -> u8 {
        match *self {
            Self::Posix => 0,
            Self::Win32 => 1,
            Self::Dos => 2,
            Self::Win32AndDos => 3,
            Self::Other(v) => v,
        }
    }

    /// Preference when several names describe one entry: Win32 > Win32+DOS > POSIX > DOS
    pub fn rank(&self) -> u8 {
        match self {
            Self::Win32 => 0,
            Self::Win32AndDos => 1,
            Self::Posix => 2,
            Self::Dos => 3,
            Self::Other(_) => 4,
        }
    }
}

// ============================================================================
// MFT Record Header
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordHeader {
    pub signature: [u8; 4],
    pub update_sequence_offset: u16,
    pub update_sequence_size: u16,
    pub log_sequence_number: u64,
    pub sequence_number: u16,
    pub hard_link_count: u16,
    pub first_attribute_offset: u16,
    pub flags: u16,
    pub used_size: u32,
    pub allocated_size: u32,
    pub base_record_reference: u64,
    pub next_attribute_id: u16,
    /// Present only when the record carries the NTFS 3.1 header extension
    pub record_number: Option<u32>,
}

impl RecordHeader {
    /// Parse MFT record header from raw bytes
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < MIN_RECORD_SIZE {
            return None;
        }

        let mut cursor = Cursor::new(data);
        let mut signature = [0u8; 4];
        signature.copy_from_slice(&data[0..4]);
        cursor.set_position(4);

        let mut header = Self {
            signature,
            update_sequence_offset: cursor.read_u16::<LittleEndian>().ok()?,
            update_sequence_size: cursor.read_u16::<LittleEndian>().ok()?,
            log_sequence_number: cursor.read_u64::<LittleEndian>().ok()?,
            sequence_number: cursor.read_u16::<LittleEndian>().ok()?,
            hard_link_count: cursor.read_u16::<LittleEndian>().ok()?,
            first_attribute_offset: cursor.read_u16::<LittleEndian>().ok()?,
            flags: cursor.read_u16::<LittleEndian>().ok()?,
            used_size: cursor.read_u32::<LittleEndian>().ok()?,
            allocated_size: cursor.read_u32::<LittleEndian>().ok()?,
            base_record_reference: cursor.read_u64::<LittleEndian>().ok()?,
            next_attribute_id: cursor.read_u16::<LittleEndian>().ok()?,
            record_number: None,
        };

        if data.len() >= RECORD_NUMBER_OFFSET + 4 {
            cursor.set_position(RECORD_NUMBER_OFFSET as u64);
            header.record_number = cursor.read_u32::<LittleEndian>().ok();
        }

        Some(header)
    }

    /// Check if this is a valid MFT record
    pub fn is_valid(&self) -> bool {
        self.signature == MFT_RECORD_SIGNATURE
    }

    /// Check if this record is in use
    pub fn is_in_use(&self) -> bool {
        (self.flags & MFT_RECORD_IN_USE) != 0
    }

    /// Check if this record represents a directory
    pub fn is_directory(&self) -> bool {
        (self.flags & MFT_RECORD_IS_DIRECTORY) != 0
    }

    /// Get the base record number (lower 48 bits)
    pub fn base_record_number(&self) -> u64 {
        self.base_record_reference & FILE_REFERENCE_ENTRY_MASK
    }

    /// Check if this is a base record (not an extension)
    pub fn is_base_record(&self) -> bool {
        self.base_record_reference == 0
    }

    /// Human-readable names of the set record flags
    pub fn flag_names(&self) -> Vec<&'static str> {
        [
            (MFT_RECORD_IN_USE, "in use"),
            (MFT_RECORD_IS_DIRECTORY, "directory"),
            (MFT_RECORD_IN_EXTEND, "in $Extend"),
            (MFT_RECORD_IS_VIEW_INDEX, "view index"),
        ]
        .into_iter()
        .filter(|(bit, _)| self.flags & bit != 0)
        .map(|(_, name)| name)
        .collect()
    }
}

// ============================================================================
// Attribute Header
// ============================================================================

/// Where an attribute's value lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Residency {
    Resident,
    NonResident,
}

impl Residency {
    pub fn from_u8(value: u8) -> Result<Self, DecodeError> {
        match value {
            0 => Ok(Self::Resident),
            1 => Ok(Self::NonResident),
            other => Err(DecodeError::InvalidResidency(other)),
        }
    }
}

/// Attribute data flags (compressed / encrypted / sparse)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DataFlags(pub u16);

impl DataFlags {
    pub const COMPRESSED: u16 = 0x0001;
    pub const ENCRYPTED: u16 = 0x4000;
    pub const SPARSE: u16 = 0x8000;

    pub fn is_compressed(&self) -> bool {
        self.0 & Self::COMPRESSED != 0
    }

    pub fn is_encrypted(&self) -> bool {
        self.0 & Self::ENCRYPTED != 0
    }

    pub fn is_sparse(&self) -> bool {
        self.0 & Self::SPARSE != 0
    }
}

impl fmt::Display for DataFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.is_compressed() {
            parts.push("compressed");
        }
        if self.is_encrypted() {
            parts.push("encrypted");
        }
        if self.is_sparse() {
            parts.push("sparse");
        }
        if parts.is_empty() {
            f.write_str("-")
        } else {
            f.write_str(&parts.join(", "))
        }
    }
}

/// Common prefix of every attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeHeader {
    pub type_code: u32,
    pub length: u32,
    pub residency_marker: u8,
    pub name_length: u8,
    pub name_offset: u16,
    pub flags: DataFlags,
    pub attribute_id: u16,
}

impl AttributeHeader {
    /// Parse attribute header from raw bytes
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < ATTRIBUTE_HEADER_SIZE {
            return None;
        }

        let mut cursor = Cursor::new(data);

        Some(Self {
            type_code: cursor.read_u32::<LittleEndian>().ok()?,
            length: cursor.read_u32::<LittleEndian>().ok()?,
            residency_marker: cursor.read_u8().ok()?,
            name_length: cursor.read_u8().ok()?,
            name_offset: cursor.read_u16::<LittleEndian>().ok()?,
            flags: DataFlags(cursor.read_u16::<LittleEndian>().ok()?),
            attribute_id: cursor.read_u16::<LittleEndian>().ok()?,
        })
    }

    pub fn attribute_type(&self) -> Option<AttributeType> {
        AttributeType::from_u32(self.type_code)
    }

    pub fn residency(&self) -> Result<Residency, DecodeError> {
        Residency::from_u8(self.residency_marker)
    }

    /// Decode the attribute's own name (e.g. an alternate data stream name)
    pub fn stream_name(&self, attr_data: &[u8]) -> Option<Result<String, DecodeError>> {
        if self.name_length == 0 {
            return None;
        }
        Some(ByteCursor::new(attr_data).utf16(self.name_offset as usize, self.name_length as usize))
    }
}

/// Resident value location, relative to the attribute start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResidentHeader {
    pub content_length: u32,
    pub content_offset: u16,
    pub indexed_flag: u8,
}

impl ResidentHeader {
    pub fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        let cursor = ByteCursor::new(data);
        Ok(Self {
            content_length: cursor.u32("content length", 16)?,
            content_offset: cursor.u16("content offset", 20)?,
            indexed_flag: cursor.u8("indexed flag", 22)?,
        })
    }

    /// The resident value bytes within `attr_data`
    pub fn content<'a>(&self, attr_data: &'a [u8]) -> Result<&'a [u8], DecodeError> {
        ByteCursor::new(attr_data).slice(
            "resident content",
            self.content_offset as usize,
            self.content_length as usize,
        )
    }
}

/// Cluster-run bookkeeping of a non-resident attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NonResidentHeader {
    pub start_vcn: u64,
    pub end_vcn: u64,
    pub data_run_offset: u16,
    pub compression_unit: u16,
    pub allocated_size: u64,
    pub actual_size: u64,
    pub initialized_size: u64,
}

impl NonResidentHeader {
    pub fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        let cursor = ByteCursor::new(data);
        Ok(Self {
            start_vcn: cursor.u64("start vcn", 16)?,
            end_vcn: cursor.u64("end vcn", 24)?,
            data_run_offset: cursor.u16("data run offset", 32)?,
            compression_unit: cursor.u16("compression unit", 34)?,
            allocated_size: cursor.u64("allocated size", 40)?,
            actual_size: cursor.u64("actual size", 48)?,
            initialized_size: cursor.u64("initialized size", 56)?,
        })
    }
}

// ============================================================================
// File Attributes
// ============================================================================

pub mod file_attributes {
    pub const READONLY: u32 = 0x00000001;
    pub const HIDDEN: u32 = 0x00000002;
    pub const SYSTEM: u32 = 0x00000004;
    pub const DIRECTORY: u32 = 0x00000010;
    pub const ARCHIVE: u32 = 0x00000020;
    pub const DEVICE: u32 = 0x00000040;
    pub const NORMAL: u32 = 0x00000080;
    pub const TEMPORARY: u32 = 0x00000100;
    pub const SPARSE_FILE: u32 = 0x00000200;
    pub const REPARSE_POINT: u32 = 0x00000400;
    pub const COMPRESSED: u32 = 0x00000800;
    pub const OFFLINE: u32 = 0x00001000;
    pub const NOT_CONTENT_INDEXED: u32 = 0x00002000;
    pub const ENCRYPTED: u32 = 0x00004000;
    pub const INTEGRITY_STREAM: u32 = 0x00008000;
    pub const VIRTUAL: u32 = 0x00010000;
    pub const NO_SCRUB_DATA: u32 = 0x00020000;
    /// Set on $FILE_NAME copies of directory entries
    pub const DUP_FILE_NAME_INDEX_PRESENT: u32 = 0x10000000;

    const NAMES: [(u32, &str); 18] = [
        (READONLY, "read-only"),
        (HIDDEN, "hidden"),
        (SYSTEM, "system"),
        (DIRECTORY, "directory"),
        (ARCHIVE, "archive"),
        (DEVICE, "device"),
        (NORMAL, "normal"),
        (TEMPORARY, "temporary"),
        (SPARSE_FILE, "sparse"),
        (REPARSE_POINT, "reparse point"),
        (COMPRESSED, "compressed"),
        (OFFLINE, "offline"),
        (NOT_CONTENT_INDEXED, "not content indexed"),
        (ENCRYPTED, "encrypted"),
        (INTEGRITY_STREAM, "integrity stream"),
        (VIRTUAL, "virtual"),
        (NO_SCRUB_DATA, "no scrub data"),
        (DUP_FILE_NAME_INDEX_PRESENT, "directory (index present)"),
    ];

    /// Names of every set flag, in bit order
    pub fn describe(flags: u32) -> Vec<&'static str> {
        NAMES
            .iter()
            .filter(|(bit, _)| flags & bit != 0)
            .map(|(_, name)| *name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_type_codes_round_trip() {
        for kind in AttributeType::ALL {
            assert_eq!(AttributeType::from_u32(kind.code()), Some(kind));
        }
        assert_eq!(AttributeType::from_u32(0x110), None);
        assert_eq!(AttributeType::from_u32(ATTRIBUTE_END_MARKER), None);
        assert_eq!(AttributeType::PropertySet.to_string(), "$PROPERTY_SET");
    }

    #[test]
    fn namespace_codes_round_trip() {
        for code in 0u8..6 {
            assert_eq!(FilenameNamespace::from_u8(code).code(), code);
        }
        assert_eq!(u8::from(FilenameNamespace::Dos), 2);
        assert_eq!(FilenameNamespace::from_u8(9), FilenameNamespace::Other(9));
    }

    #[test]
    fn residency_marker() {
        assert_eq!(Residency::from_u8(0), Ok(Residency::Resident));
        assert_eq!(Residency::from_u8(1), Ok(Residency::NonResident));
        assert_eq!(Residency::from_u8(2), Err(DecodeError::InvalidResidency(2)));
    }

    #[test]
    fn header_needs_minimum_size() {
        let mut data = vec![0u8; MIN_RECORD_SIZE];
        data[0..4].copy_from_slice(b"FILE");
        data[20..22].copy_from_slice(&56u16.to_le_bytes());
        data[22..24].copy_from_slice(&(MFT_RECORD_IN_USE | MFT_RECORD_IS_DIRECTORY).to_le_bytes());
        let header = RecordHeader::from_bytes(&data).unwrap();
        assert!(header.is_valid());
        assert!(header.is_directory());
        assert_eq!(header.first_attribute_offset, 56);
        assert_eq!(header.record_number, None);
        assert_eq!(header.flag_names(), vec!["in use", "directory"]);

        assert!(RecordHeader::from_bytes(&data[..41]).is_none());
    }

    #[test]
    fn extension_record_points_at_base() {
        let mut data = vec![0u8; 48];
        data[0..4].copy_from_slice(b"FILE");
        let header = RecordHeader::from_bytes(&data).unwrap();
        assert!(header.is_base_record());

        data[32..40].copy_from_slice(&((2u64 << 48) | 77).to_le_bytes());
        let header = RecordHeader::from_bytes(&data).unwrap();
        assert!(!header.is_base_record());
        assert_eq!(header.base_record_number(), 77);
    }

    #[test]
    fn file_reference_split() {
        let reference = (3u64 << 48) | 40;
        assert_eq!(split_file_reference(reference), (40, 3));
    }

    #[test]
    fn describes_file_attribute_flags() {
        let names = file_attributes::describe(file_attributes::HIDDEN | file_attributes::ARCHIVE);
        assert_eq!(names, vec!["hidden", "archive"]);
        assert_eq!(DataFlags(DataFlags::SPARSE).to_string(), "sparse");
        assert_eq!(DataFlags(0).to_string(), "-");
    }
}
