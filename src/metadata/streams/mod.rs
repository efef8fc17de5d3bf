//! Metadata streams (ECMA-335 II.24.2.2 - II.24.2.6).
//!
//! Only the streams needed to identify an assembly and rewrite its dependency table are
//! interpreted: `#Strings`, `#Blob` and the compressed `#~` tables stream. `#US`, `#GUID`
//! and unknown streams are carried through a rewrite byte for byte.

mod blob;
mod streamheader;
mod strings;
mod tablesheader;

pub use blob::Blob;
pub use streamheader::{StreamHeader, MAX_STREAM_NAME};
pub use strings::Strings;
pub use tablesheader::TablesHeader;

/// Name of the compressed tables stream.
pub const STREAM_TABLES: &str = "#~";
/// Name of the uncompressed (edit-and-continue) tables stream, which is not supported.
pub const STREAM_TABLES_UNCOMPRESSED: &str = "#-";
/// Name of the identifier string heap.
pub const STREAM_STRINGS: &str = "#Strings";
/// Name of the blob heap.
pub const STREAM_BLOB: &str = "#Blob";
