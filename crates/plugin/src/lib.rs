//! propsys FFI Layer
//!
//! This crate provides the C ABI through which non-Rust hosts (editor
//! tooling, config readers) reach the property system. It compiles to a
//! cdylib (.so/.dll) and generates `include/propsys.h` at build time.
//!
//! Every object crosses the boundary as an opaque pointer created and
//! destroyed by a matching pair of exports.

pub mod ffi;

pub use ffi::{PropsysContext, PropsysRecord};
