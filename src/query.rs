//! Entry queries and resident-file carving

use crate::error::{CarveError, Result};
use crate::ntfs::{DataAttribute, Entry};
use std::io::Write;

/// Entries with any readable `$FILE_NAME` containing `needle` (case-sensitive)
pub fn filter_by_name<'e, 'a>(entries: &'e [Entry<'a>], needle: &str) -> Vec<&'e Entry<'a>> {
    entries
        .iter()
        .filter(|entry| {
            entry
                .file_names()
                .any(|f| f.name.as_deref().is_ok_and(|name| name.contains(needle)))
        })
        .collect()
}

/// Entries carrying entry number `number`
pub fn filter_by_number<'e, 'a>(entries: &'e [Entry<'a>], number: u64) -> Vec<&'e Entry<'a>> {
    entries.iter().filter(|e| e.entry_number == number).collect()
}

/// Resident `$DATA` bytes of `entry`, preferring the unnamed stream
pub fn extract_resident_data<'a>(entry: &Entry<'a>) -> std::result::Result<&'a [u8], CarveError> {
    let (_, data) = entry.data().ok_or(CarveError::NoDataAttribute)?;
    match data.as_ref().map_err(|e| CarveError::Decode(e.clone()))? {
        DataAttribute::Resident { content, .. } => content.clone().map_err(CarveError::Decode),
        DataAttribute::NonResident(header) => Err(CarveError::NotResident {
            start_vcn: header.start_vcn,
            end_vcn: header.end_vcn,
            data_run_offset: header.data_run_offset,
            actual_size: header.actual_size,
        }),
    }
}

/// Write the resident content of `entry` to `sink`, returning the byte count
pub fn carve<W: Write>(entry: &Entry<'_>, sink: &mut W) -> Result<u64> {
    let bytes = extract_resident_data(entry)?;
    sink.write_all(bytes)?;
    sink.flush()?;
    tracing::debug!(entry = entry.entry_number, bytes = bytes.len(), "carved resident data");
    Ok(bytes.len() as u64)
}

/// File name to carve `entry` into: its primary name made safe for a
/// single path component, or `entry_<n>.bin` when it has none
pub fn carve_name(entry: &Entry<'_>) -> String {
    let sanitized: Option<String> = entry.primary_name().map(|name| {
        name.chars()
            .map(|c| match c {
                '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                c if c.is_control() => '_',
                c => c,
            })
            .collect()
    });

    match sanitized {
        Some(name) if !name.is_empty() && name != "." && name != ".." => name,
        _ => format!("entry_{}.bin", entry.entry_number),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MftError;
    use crate::ntfs::test_support::*;

    #[test]
    fn filters_by_name_and_number() {
        let records = [
            RecordBuilder::new(40).file_name(FileNameSpec::new(5, "docs")).build(),
            RecordBuilder::new(41).file_name(FileNameSpec::new(40, "report.txt")).build(),
            RecordBuilder::new(42).file_name(FileNameSpec::new(40, "Report.md")).build(),
        ];
        let entries: Vec<_> = records.iter().map(|r| Entry::from_bytes(r).unwrap()).collect();

        let hits: Vec<u64> = filter_by_name(&entries, "report").iter().map(|e| e.entry_number).collect();
        assert_eq!(hits, vec![41]);
        assert_eq!(filter_by_number(&entries, 42).len(), 1);
        assert!(filter_by_number(&entries, 7).is_empty());
    }

    #[test]
    fn carves_resident_content() {
        let record = RecordBuilder::new(41)
            .file_name(FileNameSpec::new(40, "report.txt"))
            .attribute(data_attr(b"quarterly numbers", None))
            .build();
        let entry = Entry::from_bytes(&record).unwrap();

        let mut sink = Vec::new();
        assert_eq!(carve(&entry, &mut sink).unwrap(), 17);
        assert_eq!(sink, b"quarterly numbers");
        assert_eq!(carve_name(&entry), "report.txt");
    }

    #[test]
    fn refuses_non_resident_data() {
        let record = RecordBuilder::new(43)
            .attribute(nonresident_data_attr(16, 31, 65536))
            .build();
        let entry = Entry::from_bytes(&record).unwrap();

        let err = extract_resident_data(&entry).unwrap_err();
        assert_eq!(
            err,
            CarveError::NotResident {
                start_vcn: 16,
                end_vcn: 31,
                data_run_offset: 64,
                actual_size: 65536
            }
        );
        let mut sink = Vec::new();
        assert!(matches!(carve(&entry, &mut sink), Err(MftError::Carve(_))));
        assert!(sink.is_empty());
        assert_eq!(carve_name(&entry), "entry_43.bin");
    }

    #[test]
    fn missing_data_attribute() {
        let record = RecordBuilder::new(44).file_name(FileNameSpec::new(5, "a:b")).build();
        let entry = Entry::from_bytes(&record).unwrap();
        assert_eq!(extract_resident_data(&entry), Err(CarveError::NoDataAttribute));
        assert_eq!(carve_name(&entry), "a_b");
    }
}
