//! Integer and floating point properties
//!
//! One generic [`NumericProperty<T>`] covers every width. The per-type
//! differences (hash, parse, archive encoding, conversion limits) live in
//! [`NumericType`].

use std::fmt::Display;
use std::marker::PhantomData;
use std::str::FromStr;

use crate::codec::{ArchiveReader, ArchiveWriter, PortContext, TextCursor};
use crate::error::{ArchiveError, ImportError, PropertyResult};
use crate::hash::hash_u64;
use crate::memory::{Plain, ValueMut, ValueRef};

use super::{PropertyFlags, PropertyOps};

/// A numeric value of unknown width
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericValue {
    Signed(i64),
    Unsigned(u64),
    Float(f64),
}

impl NumericValue {
    /// Read a value written by the numeric kind named `kind_name`
    ///
    /// Returns `None` if the kind is not numeric.
    pub fn read_archived(
        kind_name: &str,
        ar: &mut ArchiveReader<'_>,
    ) -> Option<Result<Self, ArchiveError>> {
        let value = match kind_name {
            "Int8" => ar.read_i8().map(|v| Self::Signed(v as i64)),
            "Int16" => ar.read_i16().map(|v| Self::Signed(v as i64)),
            "Int32" => ar.read_i32().map(|v| Self::Signed(v as i64)),
            "Int64" => ar.read_i64().map(Self::Signed),
            "UInt8" => ar.read_u8().map(|v| Self::Unsigned(v as u64)),
            "UInt16" => ar.read_u16().map(|v| Self::Unsigned(v as u64)),
            "UInt32" => ar.read_u32().map(|v| Self::Unsigned(v as u64)),
            "UInt64" => ar.read_u64().map(Self::Unsigned),
            "Float" => ar.read_f32().map(|v| Self::Float(v as f64)),
            "Double" => ar.read_f64().map(Self::Float),
            _ => return None,
        };
        Some(value)
    }
}

/// Native numeric type usable in a [`NumericProperty`]
pub trait NumericType: Plain + PartialEq + Display + FromStr + Send + Sync {
    const KIND_NAME: &'static str;
    const IS_INTEGER: bool;

    fn to_numeric(self) -> NumericValue;

    /// Convert, reporting whether the conversion was exact
    fn from_numeric(value: NumericValue) -> (Self, bool);

    fn type_hash(self) -> u32;

    fn archive(self, ar: &mut ArchiveWriter);

    fn unarchive(ar: &mut ArchiveReader<'_>) -> Result<Self, ArchiveError>;
}

/// Float to integer conversion, exact only for in-range whole numbers
fn float_to_int<T: TryFrom<i128>>(value: f64) -> Option<T> {
    if !value.is_finite() || value.fract() != 0.0 {
        return None;
    }
    let whole = value as i128;
    if whole as f64 != value {
        return None;
    }
    T::try_from(whole).ok()
}

macro_rules! impl_integer {
    ($ty:ty, $kind:literal, $variant:ident, $wide:ty, $write:ident, $read:ident, $hash:expr) => {
        impl NumericType for $ty {
            const KIND_NAME: &'static str = $kind;
            const IS_INTEGER: bool = true;

            fn to_numeric(self) -> NumericValue {
                NumericValue::$variant(self as $wide)
            }

            fn from_numeric(value: NumericValue) -> (Self, bool) {
                match value {
                    NumericValue::Signed(v) => (v as $ty, <$ty>::try_from(v).is_ok()),
                    NumericValue::Unsigned(v) => (v as $ty, <$ty>::try_from(v).is_ok()),
                    NumericValue::Float(v) => match float_to_int::<$ty>(v) {
                        Some(exact) => (exact, true),
                        None => (v as $ty, false),
                    },
                }
            }

            fn type_hash(self) -> u32 {
                let hash: fn($ty) -> u32 = $hash;
                hash(self)
            }

            fn archive(self, ar: &mut ArchiveWriter) {
                ar.$write(self);
            }

            fn unarchive(ar: &mut ArchiveReader<'_>) -> Result<Self, ArchiveError> {
                ar.$read()
            }
        }
    };
}

impl_integer!(i8, "Int8", Signed, i64, write_i8, read_i8, |v| v as i32 as u32);
impl_integer!(i16, "Int16", Signed, i64, write_i16, read_i16, |v| v as i32 as u32);
impl_integer!(i32, "Int32", Signed, i64, write_i32, read_i32, |v| v as u32);
impl_integer!(i64, "Int64", Signed, i64, write_i64, read_i64, |v| hash_u64(v as u64));
impl_integer!(u8, "UInt8", Unsigned, u64, write_u8, read_u8, |v| v as u32);
impl_integer!(u16, "UInt16", Unsigned, u64, write_u16, read_u16, |v| v as u32);
impl_integer!(u32, "UInt32", Unsigned, u64, write_u32, read_u32, |v| v);
impl_integer!(u64, "UInt64", Unsigned, u64, write_u64, read_u64, hash_u64);

impl NumericType for f32 {
    const KIND_NAME: &'static str = "Float";
    const IS_INTEGER: bool = false;

    fn to_numeric(self) -> NumericValue {
        NumericValue::Float(self as f64)
    }

    fn from_numeric(value: NumericValue) -> (Self, bool) {
        let converted = match value {
            NumericValue::Signed(v) => v as f32,
            NumericValue::Unsigned(v) => v as f32,
            NumericValue::Float(v) => v as f32,
        };
        let exact = match value {
            NumericValue::Signed(v) => converted as f64 == v as f64 && (converted as i64) == v,
            NumericValue::Unsigned(v) => converted as f64 == v as f64 && (converted as u64) == v,
            NumericValue::Float(v) => converted as f64 == v || v.is_nan(),
        };
        (converted, exact)
    }

    fn type_hash(self) -> u32 {
        // +0.0 and -0.0 compare equal, so they must hash equal
        if self == 0.0 {
            0
        } else {
            self.to_bits()
        }
    }

    fn archive(self, ar: &mut ArchiveWriter) {
        ar.write_f32(self);
    }

    fn unarchive(ar: &mut ArchiveReader<'_>) -> Result<Self, ArchiveError> {
        ar.read_f32()
    }
}

impl NumericType for f64 {
    const KIND_NAME: &'static str = "Double";
    const IS_INTEGER: bool = false;

    fn to_numeric(self) -> NumericValue {
        NumericValue::Float(self)
    }

    fn from_numeric(value: NumericValue) -> (Self, bool) {
        match value {
            NumericValue::Signed(v) => (v as f64, (v as f64) as i64 == v && v != i64::MAX),
            NumericValue::Unsigned(v) => (v as f64, (v as f64) as u64 == v && v != u64::MAX),
            NumericValue::Float(v) => (v, true),
        }
    }

    fn type_hash(self) -> u32 {
        if self == 0.0 {
            0
        } else {
            hash_u64(self.to_bits())
        }
    }

    fn archive(self, ar: &mut ArchiveWriter) {
        ar.write_f64(self);
    }

    fn unarchive(ar: &mut ArchiveReader<'_>) -> Result<Self, ArchiveError> {
        ar.read_f64()
    }
}

/// Object-safe numeric access shared by numeric and enum kinds
pub trait NumericAccess {
    fn is_integer(&self) -> bool;

    fn get_numeric(&self, value: ValueRef<'_>) -> NumericValue;

    /// Store `value`, converting as needed; returns whether it was exact
    fn set_numeric(&self, dest: ValueMut<'_>, value: NumericValue) -> bool;

    /// Check if `value` converts to this type without loss
    fn can_hold(&self, value: NumericValue) -> bool;
}

/// Property of a native numeric type
#[derive(Clone, Copy)]
pub struct NumericProperty<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T: NumericType> NumericProperty<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T: NumericType> Default for NumericProperty<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: NumericType> NumericAccess for NumericProperty<T> {
    fn is_integer(&self) -> bool {
        T::IS_INTEGER
    }

    fn get_numeric(&self, value: ValueRef<'_>) -> NumericValue {
        value.read::<T>().to_numeric()
    }

    fn set_numeric(&self, mut dest: ValueMut<'_>, value: NumericValue) -> bool {
        let (converted, exact) = T::from_numeric(value);
        dest.write(converted);
        exact
    }

    fn can_hold(&self, value: NumericValue) -> bool {
        T::from_numeric(value).1
    }
}

impl<T: NumericType> PropertyOps for NumericProperty<T> {
    fn kind_name(&self) -> &'static str {
        T::KIND_NAME
    }

    fn value_layout(&self) -> (usize, usize) {
        (std::mem::size_of::<T>(), std::mem::align_of::<T>())
    }

    fn intrinsic_flags(&self) -> PropertyFlags {
        PropertyFlags::POD
    }

    fn is_hashable(&self) -> bool {
        true
    }

    fn identical(&self, a: ValueRef<'_>, b: ValueRef<'_>) -> bool {
        a.read::<T>() == b.read::<T>()
    }

    fn hash_value(&self, value: ValueRef<'_>) -> Option<u32> {
        Some(value.read::<T>().type_hash())
    }

    fn export_value(&self, value: ValueRef<'_>, out: &mut String, _cx: &PortContext<'_>) {
        out.push_str(&value.read::<T>().to_string());
    }

    fn import_value(
        &self,
        mut dest: ValueMut<'_>,
        cursor: &mut TextCursor<'_>,
        _cx: &PortContext<'_>,
    ) -> Result<(), ImportError> {
        let start = cursor.position();
        let token = cursor.read_token()?;
        let parsed = token
            .parse::<T>()
            .map_err(|_| ImportError::new(start, format!("invalid {} value '{}'", T::KIND_NAME, token)))?;
        dest.write(parsed);
        Ok(())
    }

    fn serialize_value(
        &self,
        value: ValueRef<'_>,
        ar: &mut ArchiveWriter,
        _cx: &PortContext<'_>,
    ) -> PropertyResult<()> {
        value.read::<T>().archive(ar);
        Ok(())
    }

    fn deserialize_value(
        &self,
        mut dest: ValueMut<'_>,
        ar: &mut ArchiveReader<'_>,
        _cx: &PortContext<'_>,
    ) -> PropertyResult<()> {
        dest.write(T::unarchive(ar)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ValueBuffer;
    use propsys_engine::EngineServices;

    #[test]
    fn test_can_hold() {
        let byte = NumericProperty::<u8>::new();
        assert!(byte.can_hold(NumericValue::Signed(255)));
        assert!(!byte.can_hold(NumericValue::Signed(256)));
        assert!(!byte.can_hold(NumericValue::Signed(-1)));
        assert!(byte.can_hold(NumericValue::Float(3.0)));
        assert!(!byte.can_hold(NumericValue::Float(3.5)));

        let int = NumericProperty::<i32>::new();
        assert!(int.can_hold(NumericValue::Unsigned(i32::MAX as u64)));
        assert!(!int.can_hold(NumericValue::Unsigned(u32::MAX as u64)));
        assert!(!int.can_hold(NumericValue::Float(f64::NAN)));

        let float = NumericProperty::<f32>::new();
        assert!(float.can_hold(NumericValue::Signed(1 << 20)));
        assert!(!float.can_hold(NumericValue::Signed((1 << 24) + 1)));
        assert!(!float.can_hold(NumericValue::Float(0.1)));
        assert!(float.can_hold(NumericValue::Float(0.5)));
    }

    #[test]
    fn test_set_numeric_reports_loss() {
        let prop = NumericProperty::<i8>::new();
        let mut buffer = ValueBuffer::zeroed(1, 1).unwrap();
        assert!(!prop.set_numeric(buffer.as_value_mut(), NumericValue::Signed(300)));
        assert_eq!(prop.get_numeric(buffer.as_value()), NumericValue::Signed(300i64 as i8 as i64));
        assert!(prop.set_numeric(buffer.as_value_mut(), NumericValue::Unsigned(7)));
        assert_eq!(prop.get_numeric(buffer.as_value()), NumericValue::Signed(7));
    }

    #[test]
    fn test_hashes() {
        assert_eq!(5i32.type_hash(), 5);
        assert_eq!((-1i8).type_hash(), u32::MAX);
        assert_eq!(0.0f32.type_hash(), (-0.0f32).type_hash());
        assert_eq!(((3u64 << 32) | 2).type_hash(), 2 + 3 * 23);
    }

    #[test]
    fn test_text_and_archive_round_trip() {
        let services = EngineServices::new();
        let cx = PortContext::new(&services);
        let prop = NumericProperty::<f64>::new();
        let mut a = ValueBuffer::zeroed(8, 8).unwrap();
        let mut b = ValueBuffer::zeroed(8, 8).unwrap();

        let mut cursor = TextCursor::new("0.1");
        prop.import_value(a.as_value_mut(), &mut cursor, &cx).unwrap();
        let mut text = String::new();
        prop.export_value(a.as_value(), &mut text, &cx);
        assert_eq!(text, "0.1");

        let mut writer = ArchiveWriter::new();
        prop.serialize_value(a.as_value(), &mut writer, &cx).unwrap();
        let bytes = writer.into_bytes();
        let mut reader = ArchiveReader::new(&bytes);
        prop.deserialize_value(b.as_value_mut(), &mut reader, &cx).unwrap();
        assert!(prop.identical(a.as_value(), b.as_value()));
    }

    #[test]
    fn test_read_archived_other_width() {
        let mut writer = ArchiveWriter::new();
        writer.write_u16(65535);
        let bytes = writer.into_bytes();
        let mut reader = ArchiveReader::new(&bytes);
        let value = NumericValue::read_archived("UInt16", &mut reader).unwrap().unwrap();
        assert_eq!(value, NumericValue::Unsigned(65535));
        assert!(NumericValue::read_archived("Str", &mut reader).is_none());
    }
}
