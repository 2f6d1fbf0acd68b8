//! Property flag bits

use bitflags::bitflags;

bitflags! {
    /// Behavioral traits of a property
    ///
    /// The low bits are computed from the kind when the property is built.
    /// The rest are declared per field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PropertyFlags: u32 {
        /// Values can be copied with a plain byte copy
        const TRIVIALLY_COPYABLE = 1 << 0;
        /// All-zero bytes are the initialized value
        const ZERO_CONSTRUCTIBLE = 1 << 1;
        /// Nothing to release when the value is destroyed
        const NO_DESTRUCTOR = 1 << 2;
        /// Holds strong object references
        const CONTAINS_OBJECT_REFERENCE = 1 << 3;
        /// Holds weak, lazy or delegate object references
        const CONTAINS_WEAK_REFERENCE = 1 << 4;

        /// Replicated over the network
        const NET_RELEVANT = 1 << 8;
        /// Kept for loading old data only
        const DEPRECATED = 1 << 9;
        /// Only present in editor builds
        const EDITOR_ONLY = 1 << 10;
        /// Persisted to config files
        const CONFIG = 1 << 11;
        /// Never serialized
        const TRANSIENT = 1 << 12;
        /// Included in save games
        const SAVE_GAME = 1 << 13;
        /// Visible but not editable in tools
        const EDIT_CONST = 1 << 14;
    }
}

impl PropertyFlags {
    /// Flags derived from the kind
    pub const COMPUTED: Self = Self::TRIVIALLY_COPYABLE
        .union(Self::ZERO_CONSTRUCTIBLE)
        .union(Self::NO_DESTRUCTOR)
        .union(Self::CONTAINS_OBJECT_REFERENCE)
        .union(Self::CONTAINS_WEAK_REFERENCE);

    /// Flags a field declaration may set
    pub const DECLARED: Self = Self::NET_RELEVANT
        .union(Self::DEPRECATED)
        .union(Self::EDITOR_ONLY)
        .union(Self::CONFIG)
        .union(Self::TRANSIENT)
        .union(Self::SAVE_GAME)
        .union(Self::EDIT_CONST);

    /// Plain-data kinds: copyable, zero-initialized, nothing to destroy
    pub const POD: Self = Self::TRIVIALLY_COPYABLE
        .union(Self::ZERO_CONSTRUCTIBLE)
        .union(Self::NO_DESTRUCTOR);

    /// Reference flags, which containers and structs inherit from their contents
    pub const REFERENCES: Self =
        Self::CONTAINS_OBJECT_REFERENCE.union(Self::CONTAINS_WEAK_REFERENCE);

    /// Parse a declared flag by name, case-insensitively
    pub fn parse_declared(name: &str) -> Option<Self> {
        Self::from_name(&name.to_ascii_uppercase()).filter(|flag| Self::DECLARED.contains(*flag))
    }
}
