//! Layout Engine - byte offsets for record fields
//!
//! Fields are placed in declaration order. Each one lands at the lowest
//! offset past the previous field that satisfies its alignment, and the
//! record's size is rounded up to its largest field alignment.
//!
//! ```text
//!  offset 0          4    6  8                16
//!  ┌────────────────┬────┬──┬─────────────────┐
//!  │ i32            │i16 │░░│ f64             │   size 16, align 8
//!  └────────────────┴────┴──┴─────────────────┘
//! ```
//!
//! Consecutive boolean bitfields share a host byte, one bit each, until the
//! byte is full or a non-bit field is placed.

mod container;

pub use container::{PairLayout, SparseLayout};

use thiserror::Error;

/// Error from the layout engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("Alignment {0} is not a non-zero power of two")]
    InvalidAlignment(usize),

    #[error("Record size overflowed the offset counter")]
    Overflow,

    /// Two fields of a record, inherited ones included, share a name
    #[error("Field name '{0}' is used more than once")]
    DuplicateField(String),

    #[error("Field names must not be empty")]
    EmptyFieldName,
}

/// Round `value` up to a multiple of `align`
///
/// Returns `None` on overflow. `align` must be a power of two.
#[inline]
pub fn align_up(value: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two());
    value.checked_add(align - 1).map(|v| v & !(align - 1))
}

fn check_alignment(align: usize) -> Result<(), LayoutError> {
    if align.is_power_of_two() {
        Ok(())
    } else {
        Err(LayoutError::InvalidAlignment(align))
    }
}

/// Placement of one field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSlot {
    pub offset: usize,
    pub size: usize,
    pub align: usize,
}

impl FieldSlot {
    /// One past the last byte of the field
    pub fn end(&self) -> usize {
        self.offset + self.size
    }
}

/// Placement of one boolean bitfield
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitSlot {
    /// Offset of the host byte
    pub offset: usize,
    /// Bit used inside the host byte
    pub byte_mask: u8,
}

/// Final size and alignment of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLayout {
    pub size: usize,
    pub alignment: usize,
}

/// Incremental field placement
#[derive(Debug, Clone)]
pub struct LayoutBuilder {
    cursor: usize,
    alignment: usize,
    /// Host byte offset and next free bit for bitfield packing
    bit_host: Option<(usize, u32)>,
}

impl LayoutBuilder {
    pub fn new() -> Self {
        Self {
            cursor: 0,
            alignment: 1,
            bit_host: None,
        }
    }

    /// Start after a parent record, so inherited fields keep their offsets
    pub fn extending(parent: RecordLayout) -> Result<Self, LayoutError> {
        check_alignment(parent.alignment)?;
        Ok(Self {
            cursor: parent.size,
            alignment: parent.alignment,
            bit_host: None,
        })
    }

    /// Place a field of `size` bytes with the given alignment
    pub fn place(&mut self, size: usize, align: usize) -> Result<FieldSlot, LayoutError> {
        check_alignment(align)?;
        let offset = align_up(self.cursor, align).ok_or(LayoutError::Overflow)?;
        self.cursor = offset.checked_add(size).ok_or(LayoutError::Overflow)?;
        self.alignment = self.alignment.max(align);
        self.bit_host = None;
        Ok(FieldSlot {
            offset,
            size,
            align,
        })
    }

    /// Place `count` consecutive elements as one fixed-size array field
    pub fn place_array(
        &mut self,
        size: usize,
        align: usize,
        count: usize,
    ) -> Result<FieldSlot, LayoutError> {
        let total = size.checked_mul(count).ok_or(LayoutError::Overflow)?;
        self.place(total, align)
    }

    /// Place a single-bit boolean, packing into the current host byte if possible
    pub fn place_bit(&mut self) -> Result<BitSlot, LayoutError> {
        if let Some((offset, bit)) = self.bit_host {
            if bit < 8 {
                self.bit_host = Some((offset, bit + 1));
                return Ok(BitSlot {
                    offset,
                    byte_mask: 1 << bit,
                });
            }
        }

        let host = self.place(1, 1)?;
        self.bit_host = Some((host.offset, 1));
        Ok(BitSlot {
            offset: host.offset,
            byte_mask: 1,
        })
    }

    /// Current end of the placed fields
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Finish placement, rounding the size up to the record alignment
    ///
    /// Empty records still occupy one byte.
    pub fn finish(self) -> Result<RecordLayout, LayoutError> {
        let size = align_up(self.cursor.max(1), self.alignment).ok_or(LayoutError::Overflow)?;
        Ok(RecordLayout {
            size,
            alignment: self.alignment,
        })
    }
}

impl Default for LayoutBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Lay out a list of `(size, align)` requests in order
pub fn layout_fields(
    fields: &[(usize, usize)],
) -> Result<(Vec<FieldSlot>, RecordLayout), LayoutError> {
    let mut builder = LayoutBuilder::new();
    let slots = fields
        .iter()
        .map(|&(size, align)| builder.place(size, align))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((slots, builder.finish()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 4), Some(0));
        assert_eq!(align_up(5, 4), Some(8));
        assert_eq!(align_up(8, 8), Some(8));
        assert_eq!(align_up(usize::MAX, 8), None);
    }

    #[test]
    fn test_declaration_order_and_padding() {
        let (slots, layout) = layout_fields(&[(4, 4), (2, 2), (8, 8)]).unwrap();
        let offsets: Vec<_> = slots.iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![0, 4, 8]);
        assert_eq!(layout, RecordLayout { size: 16, alignment: 8 });
    }

    #[test]
    fn test_layout_soundness() {
        let requests = [(1, 1), (8, 8), (2, 2), (1, 1), (4, 4), (24, 8), (3, 1), (16, 4)];
        let (slots, layout) = layout_fields(&requests).unwrap();

        for (slot, &(size, align)) in slots.iter().zip(&requests) {
            assert_eq!(slot.offset % align, 0);
            assert_eq!(slot.size, size);
            assert!(slot.end() <= layout.size);
        }
        for (i, a) in slots.iter().enumerate() {
            for b in &slots[i + 1..] {
                assert!(a.end() <= b.offset || b.end() <= a.offset);
            }
        }
        assert_eq!(layout.size % layout.alignment, 0);
    }

    #[test]
    fn test_empty_record_has_size_one() {
        let layout = LayoutBuilder::new().finish().unwrap();
        assert_eq!(layout, RecordLayout { size: 1, alignment: 1 });
    }

    #[test]
    fn test_extending_parent() {
        let parent = RecordLayout { size: 12, alignment: 4 };
        let mut builder = LayoutBuilder::extending(parent).unwrap();
        let slot = builder.place(8, 8).unwrap();
        assert_eq!(slot.offset, 16);
        assert_eq!(builder.finish().unwrap().size, 24);
    }

    #[test]
    fn test_bitfields_share_host_byte() {
        let mut builder = LayoutBuilder::new();
        let bits: Vec<_> = (0..9).map(|_| builder.place_bit().unwrap()).collect();
        assert!(bits[..8].iter().all(|b| b.offset == 0));
        assert_eq!(bits[2].byte_mask, 0x04);
        assert_eq!(bits[8], BitSlot { offset: 1, byte_mask: 1 });

        builder.place(1, 1).unwrap();
        let after = builder.place_bit().unwrap();
        assert_eq!(after.offset, 3);
    }

    #[test]
    fn test_errors() {
        let mut builder = LayoutBuilder::new();
        assert_eq!(builder.place(4, 3), Err(LayoutError::InvalidAlignment(3)));
        assert_eq!(builder.place(4, 0), Err(LayoutError::InvalidAlignment(0)));
        assert_eq!(
            builder.place_array(usize::MAX, 1, 2),
            Err(LayoutError::Overflow)
        );
        builder.place(usize::MAX, 1).unwrap();
        assert_eq!(builder.place(1, 1), Err(LayoutError::Overflow));
    }
}
