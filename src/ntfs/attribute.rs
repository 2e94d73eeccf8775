//! Attribute decoding
//!
//! Every attribute goes through the same generic header decoder, then its
//! type code selects a body extractor from [`EXTRACTORS`]. Adding a typed
//! decoder for a new kind means adding one row to that table.
//!
//! Field failures are stored next to the value (`Result` fields) so one
//! unreadable name or timestamp never hides its siblings.

use crate::error::DecodeError;
use crate::ntfs::codec::{encode_utf16le, ByteCursor, Filetime};
use crate::ntfs::structs::*;
use std::fmt;
use std::ops::Range;

// ============================================================================
// Generic Attribute
// ============================================================================

/// Resident or non-resident layout of the attribute's value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeForm {
    Resident(ResidentHeader),
    NonResident(NonResidentHeader),
}

/// One decoded attribute, borrowing its bytes from the record
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute<'a> {
    /// Offset of the attribute within its record
    pub offset: usize,
    pub header: AttributeHeader,
    /// Exactly `header.length` bytes
    pub raw: &'a [u8],
    /// Stream name, for named attributes such as alternate data streams
    pub name: Option<Result<String, DecodeError>>,
    pub form: Result<AttributeForm, DecodeError>,
    pub body: AttributeBody<'a>,
}

impl<'a> Attribute<'a> {
    /// Decode an attribute whose bytes have already been bounded by the walker
    pub fn decode(offset: usize, header: AttributeHeader, raw: &'a [u8]) -> Self {
        let form = decode_form(&header, raw);
        let name = header.stream_name(raw);

        let source = Source { raw, form: &form };
        let body = header
            .attribute_type()
            .and_then(extractor_for)
            .map(|extract| extract(&source))
            .unwrap_or(AttributeBody::Unknown(header.type_code));

        Self {
            offset,
            header,
            raw,
            name,
            form,
            body,
        }
    }

    pub fn attribute_type(&self) -> Option<AttributeType> {
        self.header.attribute_type()
    }

    /// Byte range of this attribute within the record
    pub fn span(&self) -> Range<usize> {
        self.offset..self.offset + self.raw.len()
    }

    pub fn is_resident(&self) -> bool {
        matches!(self.form, Ok(AttributeForm::Resident(_)))
    }

    /// True for attributes with no stream name
    pub fn is_unnamed(&self) -> bool {
        self.name.is_none()
    }

    /// `$NAME` of the type, or the hex code for unrecognised types
    pub fn type_name(&self) -> String {
        match self.attribute_type() {
            Some(kind) => kind.name().to_string(),
            None => format!("unknown ({:#x})", self.header.type_code),
        }
    }
}

fn decode_form(header: &AttributeHeader, raw: &[u8]) -> Result<AttributeForm, DecodeError> {
    // the residency byte lies outside an attribute shorter than the header
    ByteCursor::new(raw).slice("attribute header", 0, ATTRIBUTE_HEADER_SIZE)?;
    match header.residency()? {
        Residency::Resident => ResidentHeader::from_bytes(raw).map(AttributeForm::Resident),
        Residency::NonResident => NonResidentHeader::from_bytes(raw).map(AttributeForm::NonResident),
    }
}

// ============================================================================
// Attribute Bodies
// ============================================================================

/// Type-specific payload. Kinds without a typed decoder carry no body and
/// are described by the generic header alone.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeBody<'a> {
    StandardInformation(Result<StandardInformation, DecodeError>),
    AttributeList(Result<Vec<AttributeListEntry>, DecodeError>),
    FileName(Result<FileName, DecodeError>),
    ObjectId(Result<ObjectId, DecodeError>),
    SecurityDescriptor,
    VolumeName(Result<String, DecodeError>),
    VolumeInformation(Result<VolumeInformation, DecodeError>),
    Data(Result<DataAttribute<'a>, DecodeError>),
    IndexRoot,
    IndexAllocation,
    Bitmap,
    ReparsePoint,
    EaInformation,
    Ea,
    PropertySet,
    LoggedUtilityStream,
    Unknown(u32),
}

/// What an extractor gets to look at
struct Source<'s, 'a> {
    raw: &'a [u8],
    form: &'s Result<AttributeForm, DecodeError>,
}

impl<'a> Source<'_, 'a> {
    fn resident_content(&self) -> Result<&'a [u8], DecodeError> {
        match self.form {
            Ok(AttributeForm::Resident(header)) => header.content(self.raw),
            Ok(AttributeForm::NonResident(_)) => Err(DecodeError::NonResidentValue),
            Err(e) => Err(e.clone()),
        }
    }
}

type Extractor = for<'s, 'a> fn(&Source<'s, 'a>) -> AttributeBody<'a>;

/// Body extractor per attribute type
const EXTRACTORS: [(AttributeType, Extractor); 16] = [
    (AttributeType::StandardInformation, |s| {
        AttributeBody::StandardInformation(s.resident_content().and_then(StandardInformation::from_bytes))
    }),
    (AttributeType::AttributeList, |s| {
        AttributeBody::AttributeList(s.resident_content().map(parse_attribute_list))
    }),
    (AttributeType::FileName, |s| {
        AttributeBody::FileName(s.resident_content().and_then(FileName::from_bytes))
    }),
    (AttributeType::ObjectId, |s| {
        AttributeBody::ObjectId(s.resident_content().and_then(ObjectId::from_bytes))
    }),
    (AttributeType::SecurityDescriptor, |_| AttributeBody::SecurityDescriptor),
    (AttributeType::VolumeName, |s| {
        AttributeBody::VolumeName(
            s.resident_content()
                .and_then(|c| ByteCursor::new(c).utf16(0, c.len() / 2)),
        )
    }),
    (AttributeType::VolumeInformation, |s| {
        AttributeBody::VolumeInformation(s.resident_content().and_then(VolumeInformation::from_bytes))
    }),
    (AttributeType::Data, |s| AttributeBody::Data(DataAttribute::from_source(s))),
    (AttributeType::IndexRoot, |_| AttributeBody::IndexRoot),
    (AttributeType::IndexAllocation, |_| AttributeBody::IndexAllocation),
    (AttributeType::Bitmap, |_| AttributeBody::Bitmap),
    (AttributeType::ReparsePoint, |_| AttributeBody::ReparsePoint),
    (AttributeType::EaInformation, |_| AttributeBody::EaInformation),
    (AttributeType::Ea, |_| AttributeBody::Ea),
    (AttributeType::PropertySet, |_| AttributeBody::PropertySet),
    (AttributeType::LoggedUtilityStream, |_| AttributeBody::LoggedUtilityStream),
];

fn extractor_for(kind: AttributeType) -> Option<Extractor> {
    EXTRACTORS.iter().find(|(k, _)| *k == kind).map(|(_, f)| *f)
}

// ============================================================================
// $STANDARD_INFORMATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandardInformation {
    pub created: Filetime,
    pub modified: Filetime,
    pub mft_modified: Filetime,
    pub accessed: Filetime,
    pub file_attributes: u32,
    pub max_versions: u32,
    pub version: u32,
    pub class_id: u32,
    /// NTFS 3.0+ extension, present when the content is at least 72 bytes
    pub owner_id: Option<u32>,
    pub security_id: Option<u32>,
    pub quota_charged: Option<u64>,
    pub usn: Option<u64>,
}

impl StandardInformation {
    pub const MIN_SIZE: usize = 48;
    pub const EXTENDED_SIZE: usize = 72;

    /// Parse from resident attribute content
    pub fn from_bytes(content: &[u8]) -> Result<Self, DecodeError> {
        let c = ByteCursor::new(content);
        let mut si = Self {
            created: c.filetime("created", 0)?,
            modified: c.filetime("modified", 8)?,
            mft_modified: c.filetime("mft modified", 16)?,
            accessed: c.filetime("accessed", 24)?,
            file_attributes: c.u32("file attributes", 32)?,
            max_versions: c.u32("max versions", 36)?,
            version: c.u32("version", 40)?,
            class_id: c.u32("class id", 44)?,
            owner_id: None,
            security_id: None,
            quota_charged: None,
            usn: None,
        };

        if content.len() >= Self::EXTENDED_SIZE {
            si.owner_id = Some(c.u32("owner id", 48)?);
            si.security_id = Some(c.u32("security id", 52)?);
            si.quota_charged = Some(c.u64("quota charged", 56)?);
            si.usn = Some(c.u64("usn", 64)?);
        }

        Ok(si)
    }
}

// ============================================================================
// $FILE_NAME
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileName {
    pub parent_entry: u64,
    pub parent_sequence: u16,
    pub created: Filetime,
    pub modified: Filetime,
    pub mft_modified: Filetime,
    pub accessed: Filetime,
    /// Physical size
    pub allocated_size: u64,
    /// Logical size
    pub real_size: u64,
    pub flags: u32,
    pub reparse_value: u32,
    /// Name length in UTF-16 code units
    pub name_length: u8,
    pub namespace: FilenameNamespace,
    pub name: Result<String, DecodeError>,
}

impl FileName {
    /// Fixed part preceding the name
    pub const HEADER_SIZE: usize = 66;

    /// Parse from resident attribute content
    pub fn from_bytes(content: &[u8]) -> Result<Self, DecodeError> {
        let c = ByteCursor::new(content);
        let (parent_entry, parent_sequence) = split_file_reference(c.u64("parent reference", 0)?);
        let name_length = c.u8("name length", 64)?;

        Ok(Self {
            parent_entry,
            parent_sequence,
            created: c.filetime("created", 8)?,
            modified: c.filetime("modified", 16)?,
            mft_modified: c.filetime("mft modified", 24)?,
            accessed: c.filetime("accessed", 32)?,
            allocated_size: c.u64("allocated size", 40)?,
            real_size: c.u64("real size", 48)?,
            flags: c.u32("flags", 56)?,
            reparse_value: c.u32("reparse value", 60)?,
            name_length,
            namespace: FilenameNamespace::from_u8(c.u8("namespace", 65)?),
            name: c.utf16(Self::HEADER_SIZE, name_length as usize),
        })
    }

    /// Serialize back to attribute content. Unreadable names encode as empty.
    pub fn to_bytes(&self) -> Vec<u8> {
        let name = self
            .name
            .as_ref()
            .map(|n| encode_utf16le(n))
            .unwrap_or_default();
        let mut out = Vec::with_capacity(Self::HEADER_SIZE + name.len());
        let reference = (self.parent_entry & FILE_REFERENCE_ENTRY_MASK) | ((self.parent_sequence as u64) << 48);
        out.extend(reference.to_le_bytes());
        for ts in [self.created, self.modified, self.mft_modified, self.accessed] {
            out.extend(ts.ticks().to_le_bytes());
        }
        out.extend(self.allocated_size.to_le_bytes());
        out.extend(self.real_size.to_le_bytes());
        out.extend(self.flags.to_le_bytes());
        out.extend(self.reparse_value.to_le_bytes());
        out.push((name.len() / 2) as u8);
        out.push(self.namespace.code());
        out.extend(name);
        out
    }

    pub fn is_directory(&self) -> bool {
        self.flags & (file_attributes::DIRECTORY | file_attributes::DUP_FILE_NAME_INDEX_PRESENT) != 0
    }
}

// ============================================================================
// $ATTRIBUTE_LIST
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeListEntry {
    pub type_code: u32,
    pub entry_length: u16,
    pub starting_vcn: u64,
    /// Entry number of the record holding the attribute
    pub entry_number: u64,
    pub attribute_id: u16,
    pub name: Option<Result<String, DecodeError>>,
}

impl AttributeListEntry {
    pub const MIN_SIZE: usize = 26;

    /// Parse one entry, returning it with the number of bytes it occupies
    pub fn from_bytes(data: &[u8]) -> Option<(Self, usize)> {
        let c = ByteCursor::new(data);
        let entry_length = c.u16("entry length", 4).ok()?;
        if (entry_length as usize) < Self::MIN_SIZE || entry_length as usize > data.len() {
            return None;
        }
        let name_length = c.u8("name length", 6).ok()?;
        let name_offset = c.u8("name offset", 7).ok()?;
        let entry = Self {
            type_code: c.u32("type", 0).ok()?,
            entry_length,
            starting_vcn: c.u64("starting vcn", 8).ok()?,
            entry_number: split_file_reference(c.u64("reference", 16).ok()?).0,
            attribute_id: c.u16("attribute id", 24).ok()?,
            name: (name_length > 0).then(|| c.utf16(name_offset as usize, name_length as usize)),
        };
        Some((entry, entry_length as usize))
    }

    pub fn attribute_type(&self) -> Option<AttributeType> {
        AttributeType::from_u32(self.type_code)
    }
}

/// Parse all entries from resident attribute-list content
pub fn parse_attribute_list(data: &[u8]) -> Vec<AttributeListEntry> {
    let mut entries = Vec::new();
    let mut offset = 0;

    while offset + AttributeListEntry::MIN_SIZE <= data.len() {
        match AttributeListEntry::from_bytes(&data[offset..]) {
            Some((entry, consumed)) => {
                entries.push(entry);
                offset += consumed;
            }
            None => break,
        }
    }

    entries
}

// ============================================================================
// $OBJECT_ID / $VOLUME_INFORMATION
// ============================================================================

/// Object GUID in on-disk byte order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectId(pub [u8; 16]);

impl ObjectId {
    pub fn from_bytes(content: &[u8]) -> Result<Self, DecodeError> {
        let mut guid = [0u8; 16];
        guid.copy_from_slice(ByteCursor::new(content).slice("object id", 0, 16)?);
        Ok(Self(guid))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let g = &self.0;
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-",
            u32::from_le_bytes([g[0], g[1], g[2], g[3]]),
            u16::from_le_bytes([g[4], g[5]]),
            u16::from_le_bytes([g[6], g[7]]),
            g[8],
            g[9]
        )?;
        g[10..].iter().try_for_each(|b| write!(f, "{:02x}", b))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeInformation {
    pub major_version: u8,
    pub minor_version: u8,
    pub flags: u16,
}

impl VolumeInformation {
    pub fn from_bytes(content: &[u8]) -> Result<Self, DecodeError> {
        let c = ByteCursor::new(content);
        Ok(Self {
            major_version: c.u8("major version", 8)?,
            minor_version: c.u8("minor version", 9)?,
            flags: c.u16("volume flags", 10)?,
        })
    }

    /// Dirty bit set
    pub fn is_dirty(&self) -> bool {
        self.flags & 0x0001 != 0
    }
}

// ============================================================================
// $DATA
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataAttribute<'a> {
    /// Content lives inside the record
    Resident {
        content_length: u32,
        content_offset: u16,
        content: Result<&'a [u8], DecodeError>,
    },
    /// Content lives in clusters described by a run list
    NonResident(NonResidentHeader),
}

impl<'a> DataAttribute<'a> {
    fn from_source(source: &Source<'_, 'a>) -> Result<Self, DecodeError> {
        match source.form.clone()? {
            AttributeForm::Resident(header) => Ok(Self::Resident {
                content_length: header.content_length,
                content_offset: header.content_offset,
                content: header.content(source.raw),
            }),
            AttributeForm::NonResident(header) => Ok(Self::NonResident(header)),
        }
    }

    /// Logical size of the stream
    pub fn size(&self) -> u64 {
        match self {
            Self::Resident { content_length, .. } => *content_length as u64,
            Self::NonResident(h) => h.actual_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ntfs::test_support::{
        data_attr, file_name_attr, nonresident_data_attr, resident_attr, FileNameSpec, FILE_NAME_TICKS,
    };

    fn decode(raw: &[u8]) -> Attribute<'_> {
        let header = AttributeHeader::from_bytes(raw).unwrap();
        Attribute::decode(0, header, raw)
    }

    #[test]
    fn every_known_type_has_an_extractor() {
        for kind in AttributeType::ALL {
            assert!(EXTRACTORS.iter().any(|(k, _)| *k == kind), "{kind}");
        }
    }

    #[test]
    fn file_name_fields_survive_round_trip() {
        let spec = FileNameSpec::new(40, "report.txt")
            .sequence(3)
            .sizes(4096, 1234)
            .namespace(FilenameNamespace::Win32);
        let raw = file_name_attr(&spec);
        let attr = decode(&raw);

        let AttributeBody::FileName(Ok(fname)) = &attr.body else {
            panic!("expected file name, got {:?}", attr.body);
        };
        assert_eq!(fname.parent_entry, 40);
        assert_eq!(fname.parent_sequence, 3);
        assert_eq!(fname.allocated_size, 4096);
        assert_eq!(fname.real_size, 1234);
        assert_eq!(fname.name.as_deref(), Ok("report.txt"));
        assert_eq!(fname.namespace, FilenameNamespace::Win32);
        assert_eq!(fname.flags, 0x20);
        assert!(!fname.is_directory());
        let ticks = [fname.created, fname.modified, fname.mft_modified, fname.accessed].map(|t| t.ticks());
        assert_eq!(ticks, FILE_NAME_TICKS);
        assert_eq!(ticks[0], 132_000_000_000_000_000);
        assert_eq!(fname.to_bytes(), spec.content());

        let again = FileName::from_bytes(&fname.to_bytes()).unwrap();
        assert_eq!(&again, fname);
    }

    #[test]
    fn truncated_name_keeps_other_fields() {
        let spec = FileNameSpec::new(5, "docs");
        let mut content = spec.content();
        content[64] = 200; // claims far more units than present
        let fname = FileName::from_bytes(&content).unwrap();
        assert_eq!(fname.parent_entry, 5);
        assert_eq!(fname.name, Err(DecodeError::UnreadableName));
        assert_eq!(fname.name.unwrap_err().to_string(), "unreadable name");
    }

    #[test]
    fn invalid_residency_is_reported() {
        let mut raw = data_attr(b"hello", None);
        raw[8] = 7;
        let attr = decode(&raw);
        assert_eq!(attr.form, Err(DecodeError::InvalidResidency(7)));
        assert_eq!(attr.body, AttributeBody::Data(Err(DecodeError::InvalidResidency(7))));
    }

    #[test]
    fn resident_data_is_exact() {
        let raw = data_attr(b"hello world", None);
        let attr = decode(&raw);
        assert!(attr.is_resident());
        assert!(attr.is_unnamed());
        match attr.body {
            AttributeBody::Data(Ok(DataAttribute::Resident { content, content_length, .. })) => {
                assert_eq!(content_length, 11);
                assert_eq!(content, Ok(&b"hello world"[..]));
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn named_stream_and_nonresident_data() {
        let raw = data_attr(b"x", Some("Zone.Identifier"));
        assert_eq!(decode(&raw).name, Some(Ok("Zone.Identifier".to_string())));

        let raw = nonresident_data_attr(0, 9, 1 << 20);
        let attr = decode(&raw);
        match attr.body {
            AttributeBody::Data(Ok(DataAttribute::NonResident(h))) => {
                assert_eq!((h.start_vcn, h.end_vcn, h.actual_size), (0, 9, 1 << 20));
                assert_eq!(h.data_run_offset, 64);
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn volume_and_object_id_bodies() {
        let label = encode_utf16le("SYSTEM");
        let raw = resident_attr(0x60, &label);
        let attr = decode(&raw);
        assert_eq!(attr.body, AttributeBody::VolumeName(Ok("SYSTEM".to_string())));

        let mut info = vec![0u8; 12];
        info[8] = 3;
        info[9] = 1;
        info[10] = 1;
        let raw = resident_attr(0x70, &info);
        let attr = decode(&raw);
        match attr.body {
            AttributeBody::VolumeInformation(Ok(v)) => {
                assert_eq!((v.major_version, v.minor_version), (3, 1));
                assert!(v.is_dirty());
            }
            other => panic!("unexpected body {other:?}"),
        }

        let guid: Vec<u8> = (0u8..16).collect();
        let raw = resident_attr(0x40, &guid);
        let attr = decode(&raw);
        let AttributeBody::ObjectId(Ok(id)) = attr.body else { panic!() };
        assert_eq!(id.to_string(), "03020100-0504-0706-0809-0a0b0c0d0e0f");
    }

    #[test]
    fn attribute_list_entries() {
        let mut content = Vec::new();
        for (kind, entry) in [(0x10u32, 12u64), (0x80, 77)] {
            let mut e = vec![0u8; 32];
            e[0..4].copy_from_slice(&kind.to_le_bytes());
            e[4..6].copy_from_slice(&32u16.to_le_bytes());
            e[16..24].copy_from_slice(&(entry | (1 << 48)).to_le_bytes());
            content.extend(e);
        }
        let raw = resident_attr(0x20, &content);
        let attr = decode(&raw);
        let AttributeBody::AttributeList(Ok(entries)) = attr.body else { panic!() };
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].attribute_type(), Some(AttributeType::Data));
        assert_eq!(entries[1].entry_number, 77);
    }

    #[test]
    fn standard_information_extension() {
        let mut content = vec![0u8; 72];
        content[32..36].copy_from_slice(&0x20u32.to_le_bytes());
        content[52..56].copy_from_slice(&0x101u32.to_le_bytes());
        let si = StandardInformation::from_bytes(&content).unwrap();
        assert_eq!(si.file_attributes, file_attributes::ARCHIVE);
        assert_eq!(si.security_id, Some(0x101));

        let short = StandardInformation::from_bytes(&content[..48]).unwrap();
        assert_eq!(short.security_id, None);
        assert!(StandardInformation::from_bytes(&content[..40]).is_err());
    }

    #[test]
    fn unknown_type_code() {
        let raw = resident_attr(0x1234, b"abcd");
        let attr = decode(&raw);
        assert_eq!(attr.body, AttributeBody::Unknown(0x1234));
        assert_eq!(attr.type_name(), "unknown (0x1234)");
    }
}
