//! propsys Engine - Name Pool and Object Table
//!
//! This crate holds the collaborator services the property system consumes
//! through narrow interfaces:
//! - Interning names into compact [`NameId`](propsys_sdk::NameId)s
//! - Tracking live objects behind generational [`ObjectHandle`](propsys_sdk::ObjectHandle)s
//! - Resolving objects by path or GUID for soft and lazy references
//!
//! # Architecture
//!
//! There are no global statics. An [`EngineServices`] value is created once
//! by the host and passed by reference to anything that needs it.
//!
//! # Thread Safety
//!
//! The name pool is lock-free for lookups. The object table sits behind a
//! `parking_lot::RwLock`, reads are shared.

pub mod error;
pub mod names;
pub mod objects;
pub mod services;

pub use error::EngineError;
pub use names::{NamePool, MAX_NAME_LEN};
pub use objects::{ObjectEntry, ObjectTable};
pub use services::EngineServices;
