//! propsys SDK - Value Representation Type Definitions
//!
//! This crate contains the `#[repr(C)]` types that reflected fields are stored
//! as inside opaque record memory. It has no dependencies and compiles quickly,
//! allowing parallel compilation of dependent crates.
//!
//! Every type here is valid when all of its bytes are zero, so a freshly
//! zeroed record block is always a legal (empty) value.
//!
//! # Modules
//!
//! - [`handles`] - Name ids, object handles and GUIDs
//! - [`script`] - Growable arrays, strings, hash-set headers, delegates

pub mod handles;
pub mod script;

pub use handles::*;
pub use script::*;
