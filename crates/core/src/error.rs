//! Error types shared by property operations

use propsys_engine::EngineError;
use thiserror::Error;

use crate::layout::LayoutError;

/// Error from reading or writing a property value
#[derive(Debug, Error)]
pub enum PropertyError {
    /// A byte range fell outside the memory block it was taken from
    #[error("Range {offset}..{} out of bounds for a block of {available} bytes", .offset + .len)]
    OutOfBounds {
        offset: usize,
        len: usize,
        available: usize,
    },

    /// Element index outside a container or static array
    #[error("Index {index} out of range (length {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// The property is not of the kind the operation needs
    #[error("Property '{property}' is {actual}, expected {expected}")]
    KindMismatch {
        property: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// A container would grow past the elements it may hold
    #[error("Length {requested} exceeds the limit of {limit} elements")]
    TooLarge { requested: usize, limit: usize },

    /// The kind has no hash and cannot be a set element or map key
    #[error("{0} values cannot be hashed")]
    Unhashable(&'static str),

    /// A hashed query was made on a table with raw, unindexed additions
    #[error("Hash table was modified without rehashing")]
    NeedsRehash,

    #[error("Record '{record}' has no field '{field}'")]
    UnknownField { record: String, field: String },

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Text import failure, carrying the byte position reached
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Import failed at position {position}: {message}")]
pub struct ImportError {
    pub position: usize,
    pub message: String,
}

impl ImportError {
    pub fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

/// Binary archive failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArchiveError {
    #[error("Unexpected end of archive (needed {needed} bytes, {remaining} left)")]
    UnexpectedEof { needed: usize, remaining: usize },

    #[error("Archive string is not valid UTF-8")]
    InvalidUtf8,

    #[error("Invalid tag: {0}")]
    InvalidTag(String),

    #[error("Length {0} does not fit the archive format")]
    LengthOverflow(usize),
}

pub type PropertyResult<T> = Result<T, PropertyError>;
