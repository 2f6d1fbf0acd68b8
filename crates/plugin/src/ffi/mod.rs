//! C-compatible exports and the opaque types they hand out

mod context;
pub mod exports;

pub use context::{PropsysContext, PropsysRecord};
