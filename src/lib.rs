//! mftscope - NTFS Master File Table image decoder
//!
//! Reads a raw MFT image (or any buffer containing MFT records), decodes
//! every record's attributes and rebuilds the directory namespace from the
//! `$FILE_NAME` attributes it finds.
//!
//! # Features
//!
//! - **Signature scan**: records are located by their `FILE` signature, so
//!   slack and garbage between records are tolerated
//! - **Typed attributes**: timestamps, names, resident and non-resident
//!   `$DATA`, volume and object-id metadata
//! - **Namespace index**: full paths, directory listings and cycle-safe trees
//! - **Carving**: resident file content written to any `io::Write`
//!
//! # Example
//!
//! ```no_run
//! use mftscope::{ImageScanner, MftImage, NamespaceIndex, ScanConfig};
//!
//! fn main() -> mftscope::Result<()> {
//!     let image = MftImage::open("MFT.bin")?;
//!     let report = ImageScanner::new(&image)
//!         .with_config(ScanConfig::default())
//!         .scan();
//!
//!     println!("Entries: {}", report.entries.len());
//!     println!("Malformed records: {}", report.malformed_records());
//!
//!     let index = NamespaceIndex::build(&report.entries);
//!     if let Some(path) = index.resolve_path("report.txt") {
//!         println!("{path}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod namespace;
pub mod ntfs;
pub mod query;
pub mod scanner;

// Re-export main types
pub use error::{CarveError, DecodeError, MftError, RecordFault, Result};
pub use namespace::{NamespaceEdge, NamespaceIndex, NamespaceStats, ResolvedPath, TreeNode};
pub use scanner::{ImageScanner, ScanConfig, ScanPhase, ScanReport};

// Re-export NTFS types that users might need
pub use ntfs::{
    Attribute, AttributeBody, AttributeType, DataAttribute, Entry, FileName, Filetime, MftImage, RawRecord,
    RecordScanner, WalkEnd,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Format bytes as human-readable string
pub fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
