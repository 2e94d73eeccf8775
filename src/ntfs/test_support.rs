//! Synthetic record builders for tests
//!
//! Depends on std only: the integration tests include this same file with
//! `#[path]`, so one set of layouts serves both.

const END_MARKER: u32 = 0xFFFF_FFFF;
const RECORD_IN_USE: u16 = 0x0001;
const RECORD_IS_DIRECTORY: u16 = 0x0002;

const NAMESPACE_WIN32: u8 = 1;

fn align8(buf: &mut Vec<u8>) {
    while buf.len() % 8 != 0 {
        buf.push(0);
    }
}

fn utf16(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

/// Resident attribute with a 24-byte header, unnamed
pub fn resident_attr(type_code: u32, content: &[u8]) -> Vec<u8> {
    resident_named(type_code, None, content)
}

fn resident_named(type_code: u32, name: Option<&str>, content: &[u8]) -> Vec<u8> {
    let name = name.map(utf16).unwrap_or_default();
    let mut buf = vec![0u8; 24];
    buf.extend(&name);
    align8(&mut buf);
    let content_offset = buf.len();
    buf.extend(content);
    align8(&mut buf);

    let length = buf.len() as u32;
    buf[0..4].copy_from_slice(&type_code.to_le_bytes());
    buf[4..8].copy_from_slice(&length.to_le_bytes());
    buf[8] = 0;
    buf[9] = (name.len() / 2) as u8;
    buf[10..12].copy_from_slice(&(if name.is_empty() { 0u16 } else { 24 }).to_le_bytes());
    buf[16..20].copy_from_slice(&(content.len() as u32).to_le_bytes());
    buf[20..22].copy_from_slice(&(content_offset as u16).to_le_bytes());
    buf
}

/// Resident `$DATA`, optionally a named stream
pub fn data_attr(content: &[u8], stream: Option<&str>) -> Vec<u8> {
    resident_named(0x80, stream, content)
}

/// Non-resident `$DATA` with a single short run list at offset 64
pub fn nonresident_data_attr(start_vcn: u64, end_vcn: u64, actual_size: u64) -> Vec<u8> {
    let mut buf = vec![0u8; 72];
    buf[0..4].copy_from_slice(&0x80u32.to_le_bytes());
    buf[4..8].copy_from_slice(&72u32.to_le_bytes());
    buf[8] = 1;
    buf[16..24].copy_from_slice(&start_vcn.to_le_bytes());
    buf[24..32].copy_from_slice(&end_vcn.to_le_bytes());
    buf[32..34].copy_from_slice(&64u16.to_le_bytes());
    let allocated = (end_vcn - start_vcn + 1) * 4096;
    buf[40..48].copy_from_slice(&allocated.to_le_bytes());
    buf[48..56].copy_from_slice(&actual_size.to_le_bytes());
    buf[56..64].copy_from_slice(&actual_size.to_le_bytes());
    buf[64..68].copy_from_slice(&[0x21, 0x0A, 0x00, 0x10]);
    buf
}

/// Ticks written for created, modified, mft modified and accessed
pub const FILE_NAME_TICKS: [u64; 4] = [
    132_000_000_000_000_000,
    132_000_000_100_000_000,
    132_000_000_200_000_000,
    132_000_000_300_000_000,
];

/// `$FILE_NAME` content parameters
#[derive(Debug, Clone)]
pub struct FileNameSpec {
    pub parent: u64,
    pub parent_sequence: u16,
    pub name: String,
    pub namespace: u8,
    pub allocated_size: u64,
    pub real_size: u64,
    pub flags: u32,
}

impl FileNameSpec {
    pub fn new(parent: u64, name: &str) -> Self {
        Self {
            parent,
            parent_sequence: 1,
            name: name.to_string(),
            namespace: NAMESPACE_WIN32,
            allocated_size: 0,
            real_size: 0,
            flags: 0x20,
        }
    }

    pub fn sequence(mut self, sequence: u16) -> Self {
        self.parent_sequence = sequence;
        self
    }

    pub fn sizes(mut self, allocated: u64, real: u64) -> Self {
        self.allocated_size = allocated;
        self.real_size = real;
        self
    }

    pub fn namespace(mut self, namespace: impl Into<u8>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn content(&self) -> Vec<u8> {
        let name = utf16(&self.name);
        let mut buf = vec![0u8; 66];
        let reference = self.parent | ((self.parent_sequence as u64) << 48);
        buf[0..8].copy_from_slice(&reference.to_le_bytes());
        for (i, ticks) in FILE_NAME_TICKS.iter().enumerate() {
            buf[8 + i * 8..16 + i * 8].copy_from_slice(&ticks.to_le_bytes());
        }
        buf[40..48].copy_from_slice(&self.allocated_size.to_le_bytes());
        buf[48..56].copy_from_slice(&self.real_size.to_le_bytes());
        buf[56..60].copy_from_slice(&self.flags.to_le_bytes());
        buf[64] = (name.len() / 2) as u8;
        buf[65] = self.namespace;
        buf.extend(name);
        buf
    }
}

pub fn file_name_attr(spec: &FileNameSpec) -> Vec<u8> {
    resident_attr(0x30, &spec.content())
}

/// Builds one MFT record: 56-byte header, attributes, optional end marker
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    entry_number: u32,
    flags: u16,
    attributes: Vec<Vec<u8>>,
    end_marker: bool,
}

impl RecordBuilder {
    pub const FIRST_ATTRIBUTE_OFFSET: usize = 56;

    pub fn new(entry_number: u32) -> Self {
        Self {
            entry_number,
            flags: RECORD_IN_USE,
            attributes: Vec::new(),
            end_marker: true,
        }
    }

    pub fn directory(mut self) -> Self {
        self.flags |= RECORD_IS_DIRECTORY;
        self
    }

    /// Clear the in-use flag
    pub fn free(mut self) -> Self {
        self.flags &= !RECORD_IN_USE;
        self
    }

    pub fn attribute(mut self, raw: Vec<u8>) -> Self {
        self.attributes.push(raw);
        self
    }

    pub fn file_name(self, spec: FileNameSpec) -> Self {
        self.attribute(file_name_attr(&spec))
    }

    pub fn without_end_marker(mut self) -> Self {
        self.end_marker = false;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::FIRST_ATTRIBUTE_OFFSET];
        for attr in &self.attributes {
            buf.extend(attr);
        }
        if self.end_marker {
            buf.extend(END_MARKER.to_le_bytes());
            buf.extend([0u8; 4]);
        }

        let size = buf.len() as u32;
        buf[0..4].copy_from_slice(b"FILE");
        buf[4..6].copy_from_slice(&48u16.to_le_bytes());
        buf[6..8].copy_from_slice(&3u16.to_le_bytes());
        buf[16..18].copy_from_slice(&1u16.to_le_bytes());
        buf[18..20].copy_from_slice(&1u16.to_le_bytes());
        buf[20..22].copy_from_slice(&(Self::FIRST_ATTRIBUTE_OFFSET as u16).to_le_bytes());
        buf[22..24].copy_from_slice(&self.flags.to_le_bytes());
        buf[24..28].copy_from_slice(&size.to_le_bytes());
        buf[28..32].copy_from_slice(&1024u32.to_le_bytes());
        buf[40..42].copy_from_slice(&(self.attributes.len() as u16).to_le_bytes());
        buf[44..48].copy_from_slice(&self.entry_number.to_le_bytes());
        buf
    }
}
