//! Handle type definitions
//!
//! Small plain-old-data identifiers that reflected fields store instead of
//! pointers. All of them reserve the all-zero bit pattern for "nothing".
//!
//! # Object Handle Format
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           u64 raw value                         │
//! ├─────────────────────────────┬───────────────────────────────────┤
//! │    Serial Number (32 bits)  │       Slot Index (32 bits)        │
//! │         bits 32-63          │           bits 0-31               │
//! └─────────────────────────────┴───────────────────────────────────┘
//! ```
//!
//! The serial number changes whenever a slot is reused, so a handle to a
//! destroyed object never resolves to its successor.

use std::fmt;

/// Index of an interned name
///
/// `NameId(0)` is the `None` name. Ids are only meaningful together with the
/// name pool that produced them.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NameId(pub u32);

impl NameId {
    /// The `None` name
    pub const NONE: NameId = NameId(0);

    /// Check if this is the `None` name
    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Get the raw pool index
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

/// Generational handle to an object in an object table
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ObjectHandle(u64);

impl ObjectHandle {
    /// The null handle
    pub const NULL: ObjectHandle = ObjectHandle(0);

    /// Create a handle from its raw 64-bit value
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw 64-bit value
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Check if this is the null handle
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Slot index (lower 32 bits)
    #[inline]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Serial number (upper 32 bits)
    #[inline]
    pub const fn serial(self) -> u32 {
        (self.0 >> 32) as u32
    }
}

/// 128-bit globally unique identifier
///
/// Text form is 32 uppercase hex digits, `a` first.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Guid {
    pub a: u32,
    pub b: u32,
    pub c: u32,
    pub d: u32,
}

impl Guid {
    /// The all-zero (invalid) GUID
    pub const ZERO: Guid = Guid::new(0, 0, 0, 0);

    /// Create a GUID from its four components
    pub const fn new(a: u32, b: u32, c: u32, d: u32) -> Self {
        Self { a, b, c, d }
    }

    /// Check if any component is non-zero
    #[inline]
    pub const fn is_valid(&self) -> bool {
        (self.a | self.b | self.c | self.d) != 0
    }

    /// Parse the 32-hex-digit form produced by `Display`
    ///
    /// Dashes between groups are accepted and ignored.
    pub fn parse(text: &str) -> Option<Self> {
        let digits: String = text.chars().filter(|c| *c != '-').collect();
        if digits.len() != 32 || !digits.is_ascii() {
            return None;
        }
        let part = |i: usize| u32::from_str_radix(&digits[i * 8..(i + 1) * 8], 16).ok();
        Some(Self::new(part(0)?, part(1)?, part(2)?, part(3)?))
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}{:08X}{:08X}{:08X}", self.a, self.b, self.c, self.d)
    }
}
