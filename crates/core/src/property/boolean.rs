//! Boolean properties, native or bitfield
//!
//! A boolean lives in one byte of a host field of `field_size` bytes:
//!
//! ```text
//! host field:  [ byte 0 ][ byte 1 ] ... [ byte field_size-1 ]
//!                   ▲
//!                   byte_offset, bits selected by byte_mask
//! ```
//!
//! A native `bool` has `field_mask == 0xFF`: any non-zero byte reads as true.
//! A bitfield has `field_mask == byte_mask` and shares its host byte with
//! other bitfields, so every operation is masked.

use crate::codec::{ArchiveReader, ArchiveWriter, PortContext, TextCursor};
use crate::error::{ImportError, PropertyResult};
use crate::memory::{ValueMut, ValueRef};

use super::{PropertyFlags, PropertyOps};

const NATIVE_MASK: u8 = 0xFF;

/// Boolean stored in a byte or a single bit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoolProperty {
    field_size: u8,
    byte_offset: u8,
    byte_mask: u8,
    field_mask: u8,
}

impl BoolProperty {
    /// A full-byte native boolean
    pub const fn native() -> Self {
        Self {
            field_size: 1,
            byte_offset: 0,
            byte_mask: 1,
            field_mask: NATIVE_MASK,
        }
    }

    /// A single bit inside a host field
    ///
    /// # Arguments
    /// * `field_size` - Host field size in bytes (1..=8)
    /// * `byte_offset` - Byte of the host field holding the bit
    /// * `byte_mask` - The bit, exactly one bit set
    ///
    /// Returns `None` if the arguments do not describe one bit of the host.
    pub fn bitfield(field_size: usize, byte_offset: usize, byte_mask: u8) -> Option<Self> {
        if !(1..=8).contains(&field_size) || byte_offset >= field_size || byte_mask.count_ones() != 1
        {
            return None;
        }
        Some(Self {
            field_size: field_size as u8,
            byte_offset: byte_offset as u8,
            byte_mask,
            field_mask: byte_mask,
        })
    }

    pub fn is_native(&self) -> bool {
        self.field_mask == NATIVE_MASK
    }

    pub fn field_size(&self) -> usize {
        self.field_size as usize
    }

    pub fn byte_offset(&self) -> usize {
        self.byte_offset as usize
    }

    pub fn byte_mask(&self) -> u8 {
        self.byte_mask
    }

    pub fn field_mask(&self) -> u8 {
        self.field_mask
    }

    /// Read the boolean from a host field value
    pub fn get_bool(&self, value: ValueRef<'_>) -> bool {
        value.as_bytes()[self.byte_offset()] & self.field_mask != 0
    }

    /// Write the boolean into a host field value, leaving other bits alone
    pub fn set_bool(&self, mut dest: ValueMut<'_>, value: bool) {
        let byte = &mut dest.bytes_mut()[self.byte_offset as usize];
        *byte = (*byte & !self.field_mask) | if value { self.byte_mask } else { 0 };
    }
}

impl Default for BoolProperty {
    fn default() -> Self {
        Self::native()
    }
}

/// Parse the text forms accepted for booleans
fn parse_bool(token: &str) -> Option<bool> {
    const TRUE: &[&str] = &["true", "yes", "on", "1"];
    const FALSE: &[&str] = &["false", "no", "off", "0"];
    if TRUE.iter().any(|t| t.eq_ignore_ascii_case(token)) {
        Some(true)
    } else if FALSE.iter().any(|t| t.eq_ignore_ascii_case(token)) {
        Some(false)
    } else {
        None
    }
}

impl PropertyOps for BoolProperty {
    fn kind_name(&self) -> &'static str {
        "Bool"
    }

    fn value_layout(&self) -> (usize, usize) {
        (self.field_size(), 1)
    }

    fn intrinsic_flags(&self) -> PropertyFlags {
        if self.is_native() {
            PropertyFlags::POD
        } else {
            PropertyFlags::NO_DESTRUCTOR
        }
    }

    fn is_hashable(&self) -> bool {
        true
    }

    fn identical(&self, a: ValueRef<'_>, b: ValueRef<'_>) -> bool {
        self.get_bool(a) == self.get_bool(b)
    }

    fn copy_value(&self, dest: ValueMut<'_>, src: ValueRef<'_>) {
        self.set_bool(dest, self.get_bool(src));
    }

    fn initialize_value(&self, dest: ValueMut<'_>) {
        self.set_bool(dest, false);
    }

    fn destroy_value(&self, _dest: ValueMut<'_>) {}

    fn hash_value(&self, value: ValueRef<'_>) -> Option<u32> {
        Some(self.get_bool(value) as u32)
    }

    fn export_value(&self, value: ValueRef<'_>, out: &mut String, _cx: &PortContext<'_>) {
        out.push_str(if self.get_bool(value) { "True" } else { "False" });
    }

    fn import_value(
        &self,
        dest: ValueMut<'_>,
        cursor: &mut TextCursor<'_>,
        _cx: &PortContext<'_>,
    ) -> Result<(), ImportError> {
        let start = cursor.position();
        let token = cursor.read_token()?;
        let value = parse_bool(token)
            .ok_or_else(|| ImportError::new(start, format!("invalid Bool value '{}'", token)))?;
        self.set_bool(dest, value);
        Ok(())
    }

    fn serialize_value(
        &self,
        value: ValueRef<'_>,
        ar: &mut ArchiveWriter,
        _cx: &PortContext<'_>,
    ) -> PropertyResult<()> {
        ar.write_u8(self.get_bool(value) as u8);
        Ok(())
    }

    fn deserialize_value(
        &self,
        dest: ValueMut<'_>,
        ar: &mut ArchiveReader<'_>,
        _cx: &PortContext<'_>,
    ) -> PropertyResult<()> {
        let value = ar.read_u8()? != 0;
        self.set_bool(dest, value);
        Ok(())
    }
}
