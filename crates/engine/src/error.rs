//! Error types for engine services

use propsys_sdk::ObjectHandle;

/// Error type for name pool and object table operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// An object with this path already exists
    #[error("Object path already in use: {0}")]
    DuplicatePath(String),

    /// Handle does not refer to a live object
    #[error("Unknown or destroyed object: {0:?}")]
    UnknownObject(ObjectHandle),

    /// Name exceeds the pool's maximum length
    #[error("Name too long ({len} > {max} characters)")]
    NameTooLong { len: usize, max: usize },
}
