//! NTFS MFT decoding
//!
//! - Signature scan over a raw image ([`records`])
//! - Attribute chain walking ([`walker`]) and typed decoding ([`attribute`])
//! - Entry assembly and image access ([`mft`])

pub mod attribute;
pub mod codec;
pub mod mft;
pub mod records;
pub mod structs;
pub mod walker;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use attribute::{Attribute, AttributeBody, DataAttribute, FileName, StandardInformation};
pub use codec::Filetime;
pub use mft::{Entry, MftImage};
pub use records::{MalformedRecord, RawRecord, RecordScanner};
pub use structs::{AttributeType, FilenameNamespace, RecordHeader, ROOT_ENTRY_NUMBER};
pub use walker::{AttributeWalker, WalkEnd};
