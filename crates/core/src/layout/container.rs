//! Element layouts for hash containers

use super::{align_up, LayoutError};

/// Key/value pair stored in one map slot
///
/// The key sits at offset 0 and the value at the key size rounded up to the
/// value's alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairLayout {
    pub key_offset: usize,
    pub value_offset: usize,
    pub size: usize,
    pub alignment: usize,
}

impl PairLayout {
    pub fn new(
        key: (usize, usize),
        value: (usize, usize),
    ) -> Result<Self, LayoutError> {
        let (key_size, key_align) = key;
        let (value_size, value_align) = value;
        for align in [key_align, value_align] {
            if !align.is_power_of_two() {
                return Err(LayoutError::InvalidAlignment(align));
            }
        }

        let alignment = key_align.max(value_align);
        let value_offset = align_up(key_size, value_align).ok_or(LayoutError::Overflow)?;
        let end = value_offset
            .checked_add(value_size)
            .ok_or(LayoutError::Overflow)?;
        let size = align_up(end, alignment).ok_or(LayoutError::Overflow)?;

        Ok(Self {
            key_offset: 0,
            value_offset,
            size,
            alignment,
        })
    }
}

/// One slot of a sparse hash table
///
/// ```text
/// ┌──────────────────┬───────────────┬────────────────┬─────┐
/// │ payload          │ hash_next i32 │ hash_index i32 │ pad │
/// └──────────────────┴───────────────┴────────────────┴─────┘
/// ```
///
/// `hash_next` chains slots in the same bucket, or links free slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SparseLayout {
    pub payload_size: usize,
    pub hash_next_offset: usize,
    pub hash_index_offset: usize,
    pub stride: usize,
    pub alignment: usize,
}

impl SparseLayout {
    pub fn new(payload_size: usize, payload_align: usize) -> Result<Self, LayoutError> {
        if !payload_align.is_power_of_two() {
            return Err(LayoutError::InvalidAlignment(payload_align));
        }

        let alignment = payload_align.max(4);
        let hash_next_offset = align_up(payload_size, 4).ok_or(LayoutError::Overflow)?;
        let hash_index_offset = hash_next_offset + 4;
        let stride = align_up(hash_index_offset + 4, alignment).ok_or(LayoutError::Overflow)?;

        Ok(Self {
            payload_size,
            hash_next_offset,
            hash_index_offset,
            stride,
            alignment,
        })
    }
}
