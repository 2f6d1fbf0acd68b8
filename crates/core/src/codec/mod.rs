//! Text and binary codecs
//!
//! Per-kind import/export and serialize/deserialize hooks are implemented on
//! the property kinds themselves. This module holds the shared machinery
//! they are driven through:
//! - [`TextCursor`] and [`PortContext`] for the human-readable text form
//! - [`ArchiveWriter`] / [`ArchiveReader`] for the little-endian binary form
//! - [`tagged`] for self-describing record streams that survive schema changes

pub mod binary;
pub mod tagged;
pub mod text;

pub use binary::{ArchiveReader, ArchiveWriter};
pub use tagged::{deserialize_tagged, serialize_tagged, TaggedOptions};
pub use text::{
    needs_quotes, needs_quotes_bare, write_quoted, write_string, PortContext, PortFlags, TextCursor,
};
