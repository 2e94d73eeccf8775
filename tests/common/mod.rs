//! Synthetic MFT images for the integration tests

#![allow(dead_code)]

#[path = "../../src/ntfs/test_support.rs"]
mod test_support;

pub use test_support::*;

use std::io::Write;

/// Root `.` plus `\docs\report.txt` and a non-resident `\docs\big.iso`
pub fn sample_image() -> Vec<u8> {
    [
        RecordBuilder::new(5).directory().file_name(FileNameSpec::new(5, ".")),
        RecordBuilder::new(40).directory().file_name(FileNameSpec::new(5, "docs")),
        RecordBuilder::new(41)
            .file_name(FileNameSpec::new(40, "report.txt"))
            .attribute(data_attr(b"quarterly numbers", None)),
        RecordBuilder::new(42)
            .file_name(FileNameSpec::new(40, "big.iso"))
            .attribute(nonresident_data_attr(0, 299, 1_228_800)),
    ]
    .iter()
    .flat_map(RecordBuilder::build)
    .collect()
}

/// Write `bytes` to a temporary file
pub fn write_image(bytes: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("create temp image");
    file.write_all(bytes).expect("write temp image");
    file.flush().expect("flush temp image");
    file
}
