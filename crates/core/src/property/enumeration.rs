//! Enumeration properties
//!
//! An [`EnumType`] is a named list of `(entry, value)` pairs shared by every
//! field of that enum. The stored integer is 1, 2, 4 or 8 bytes wide; one
//! byte enums are unsigned, wider ones signed.

use std::sync::Arc;

use crate::codec::{ArchiveReader, ArchiveWriter, PortContext, TextCursor};
use crate::error::{ArchiveError, ImportError, PropertyResult};
use crate::hash::hash_u64;
use crate::memory::{ValueMut, ValueRef};

use super::{NumericAccess, NumericValue, PropertyFlags, PropertyOps};

/// Named enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType {
    name: String,
    entries: Vec<(String, i64)>,
}

impl EnumType {
    pub fn new(name: impl Into<String>, entries: Vec<(String, i64)>) -> Self {
        Self {
            name: name.into(),
            entries,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entries(&self) -> &[(String, i64)] {
        &self.entries
    }

    /// Look up an entry value by name
    ///
    /// Accepts both `Entry` and `EnumName::Entry`, case-insensitively.
    pub fn value_of(&self, entry: &str) -> Option<i64> {
        let short = match entry.split_once("::") {
            Some((prefix, rest)) if prefix.eq_ignore_ascii_case(&self.name) => rest,
            Some(_) => return None,
            None => entry,
        };
        self.entries
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(short))
            .map(|(_, value)| *value)
    }

    /// Look up the first entry name with this value
    pub fn name_of(&self, value: i64) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(name, _)| name.as_str())
    }
}

/// Property holding an enumeration value
#[derive(Clone)]
pub struct EnumProperty {
    enum_type: Arc<EnumType>,
    size: usize,
}

impl EnumProperty {
    /// Create an enum property with an underlying integer of `size` bytes
    ///
    /// Returns `None` unless `size` is 1, 2, 4 or 8.
    pub fn new(enum_type: Arc<EnumType>, size: usize) -> Option<Self> {
        matches!(size, 1 | 2 | 4 | 8).then_some(Self { enum_type, size })
    }

    pub fn enum_type(&self) -> &Arc<EnumType> {
        &self.enum_type
    }

    /// Read the raw underlying integer
    pub fn get_raw(&self, value: ValueRef<'_>) -> i64 {
        match self.size {
            1 => value.read::<u8>() as i64,
            2 => value.read::<i16>() as i64,
            4 => value.read::<i32>() as i64,
            _ => value.read::<i64>(),
        }
    }

    /// Write the raw underlying integer, returning whether it fit
    pub fn set_raw(&self, mut dest: ValueMut<'_>, raw: i64) -> bool {
        match self.size {
            1 => {
                dest.write(raw as u8);
                u8::try_from(raw).is_ok()
            }
            2 => {
                dest.write(raw as i16);
                i16::try_from(raw).is_ok()
            }
            4 => {
                dest.write(raw as i32);
                i32::try_from(raw).is_ok()
            }
            _ => {
                dest.write(raw);
                true
            }
        }
    }

    fn fits(&self, raw: i64) -> bool {
        match self.size {
            1 => u8::try_from(raw).is_ok(),
            2 => i16::try_from(raw).is_ok(),
            4 => i32::try_from(raw).is_ok(),
            _ => true,
        }
    }

    fn entry_text(&self, raw: i64) -> String {
        self.enum_type
            .name_of(raw)
            .map(str::to_string)
            .unwrap_or_else(|| raw.to_string())
    }

    fn parse_entry(&self, text: &str) -> Option<i64> {
        self.enum_type
            .value_of(text)
            .or_else(|| text.parse::<i64>().ok())
    }
}

impl NumericAccess for EnumProperty {
    fn is_integer(&self) -> bool {
        true
    }

    fn get_numeric(&self, value: ValueRef<'_>) -> NumericValue {
        NumericValue::Signed(self.get_raw(value))
    }

    fn set_numeric(&self, dest: ValueMut<'_>, value: NumericValue) -> bool {
        let (raw, exact) = <i64 as super::NumericType>::from_numeric(value);
        self.set_raw(dest, raw) && exact
    }

    fn can_hold(&self, value: NumericValue) -> bool {
        let (raw, exact) = <i64 as super::NumericType>::from_numeric(value);
        exact && self.fits(raw)
    }
}

impl PropertyOps for EnumProperty {
    fn kind_name(&self) -> &'static str {
        "Enum"
    }

    fn value_layout(&self) -> (usize, usize) {
        (self.size, self.size)
    }

    fn intrinsic_flags(&self) -> PropertyFlags {
        PropertyFlags::POD
    }

    fn is_hashable(&self) -> bool {
        true
    }

    fn identical(&self, a: ValueRef<'_>, b: ValueRef<'_>) -> bool {
        self.get_raw(a) == self.get_raw(b)
    }

    fn hash_value(&self, value: ValueRef<'_>) -> Option<u32> {
        Some(hash_u64(self.get_raw(value) as u64))
    }

    fn export_value(&self, value: ValueRef<'_>, out: &mut String, _cx: &PortContext<'_>) {
        out.push_str(&self.entry_text(self.get_raw(value)));
    }

    fn import_value(
        &self,
        dest: ValueMut<'_>,
        cursor: &mut TextCursor<'_>,
        _cx: &PortContext<'_>,
    ) -> Result<(), ImportError> {
        let start = cursor.position();
        let token = cursor.read_token()?;
        let raw = self.parse_entry(token).ok_or_else(|| {
            ImportError::new(
                start,
                format!("'{}' is not an entry of {}", token, self.enum_type.name()),
            )
        })?;
        if !self.set_raw(dest, raw) {
            return Err(ImportError::new(
                start,
                format!("{} does not fit a {}-byte enum", raw, self.size),
            ));
        }
        Ok(())
    }

    fn serialize_value(
        &self,
        value: ValueRef<'_>,
        ar: &mut ArchiveWriter,
        _cx: &PortContext<'_>,
    ) -> PropertyResult<()> {
        // Entries are archived by name so reordering an enum keeps old data valid
        ar.write_str(&self.entry_text(self.get_raw(value)))?;
        Ok(())
    }

    fn deserialize_value(
        &self,
        dest: ValueMut<'_>,
        ar: &mut ArchiveReader<'_>,
        _cx: &PortContext<'_>,
    ) -> PropertyResult<()> {
        let text = ar.read_str()?;
        let raw = self.parse_entry(text).ok_or_else(|| {
            ArchiveError::InvalidTag(format!("unknown {} entry '{}'", self.enum_type.name(), text))
        })?;
        self.set_raw(dest, raw);
        Ok(())
    }
}
