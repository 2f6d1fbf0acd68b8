//! propsys core - runtime property reflection
//!
//! Describes record types at runtime and operates on their values through
//! the descriptors: construct, copy, compare, hash, destroy, export and
//! import text, and serialize to binary archives.
//!
//! # Layers
//!
//! - [`layout`] - offsets, alignment and bit packing of record fields
//! - [`property`] - one descriptor per field kind, plus [`Property`] itself
//! - [`record`] - composite descriptors ([`RecordType`]) and owned values
//! - [`containers`] - dynamic arrays, maps and sets over raw storage
//! - [`iter`] - depth-first traversal over a record value
//! - [`codec`] - text cursor and binary archives, tagged record streams
//! - [`registry`] - named types built from declarations or JSON schemas
//! - [`config`] - core settings and ini persistence of `CONFIG` fields
//!
//! # Re-exports
//!
//! This crate re-exports the SDK and engine crates for convenience:
//! - [`sdk`] - in-memory value representations and handle types
//! - [`engine`] - name pool and object table services

pub use propsys_engine as engine;
pub use propsys_sdk as sdk;

pub mod codec;
pub mod config;
pub mod containers;
pub mod error;
pub mod hash;
pub mod iter;
pub mod layout;
pub mod memory;
pub mod property;
pub mod record;
pub mod registry;

// Re-export commonly used items
pub use codec::{ArchiveReader, ArchiveWriter, PortContext, TaggedOptions, TextCursor};
pub use config::{ApplyOptions, ConfigError, ConfigFile, ConfigResult, CoreConfig};
pub use containers::{
    ArrayProperty, MapProperty, ScriptArrayHelper, ScriptArrayView, ScriptMapHelper,
    ScriptMapView, ScriptSetHelper, ScriptSetView, SetProperty,
};
pub use error::{ArchiveError, ImportError, PropertyError, PropertyResult};
pub use iter::{PropertyValue, PropertyValueIterator, RecursionMode};
pub use layout::{LayoutError, RecordLayout};
pub use memory::{ValueBuffer, ValueMut, ValueRef};
pub use property::{Property, PropertyFlags, PropertyKind, PropertyOps};
pub use record::{RecordType, RecordValue};
pub use registry::{
    FieldDecl, FieldType, RecordBuilder, RecordDecl, RegistryError, RegistryResult,
    SchemaDocument, TypeRegistry,
};
