//! Typed access to property values from native Rust types

use propsys_sdk::{NameId, ObjectHandle, ScriptInterface, ScriptString};

use crate::error::{PropertyError, PropertyResult};
use crate::memory::{ValueMut, ValueRef};

use super::{NumericType, ObjectFlavor, Property, PropertyKind};

/// A Rust type that one or more property kinds store directly
pub trait NativeValue: Sized {
    /// Kind name reported in mismatch errors
    const EXPECTED: &'static str;

    fn read(prop: &Property, value: ValueRef<'_>) -> PropertyResult<Self>;

    fn write(prop: &Property, dest: ValueMut<'_>, value: Self) -> PropertyResult<()>;
}

fn mismatch(prop: &Property, expected: &'static str) -> PropertyError {
    PropertyError::KindMismatch {
        property: prop.name().to_string(),
        expected,
        actual: prop.kind_name(),
    }
}

macro_rules! impl_native_numeric {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl NativeValue for $ty {
                const EXPECTED: &'static str = <$ty as NumericType>::KIND_NAME;

                fn read(prop: &Property, value: ValueRef<'_>) -> PropertyResult<Self> {
                    match prop.kind() {
                        PropertyKind::$variant(_) => Ok(value.read::<$ty>()),
                        _ => Err(mismatch(prop, Self::EXPECTED)),
                    }
                }

                fn write(prop: &Property, mut dest: ValueMut<'_>, value: Self) -> PropertyResult<()> {
                    match prop.kind() {
                        PropertyKind::$variant(_) => {
                            dest.write(value);
                            Ok(())
                        }
                        _ => Err(mismatch(prop, Self::EXPECTED)),
                    }
                }
            }
        )*
    };
}

impl_native_numeric!(
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float,
    f64 => Double,
);

impl NativeValue for bool {
    const EXPECTED: &'static str = "Bool";

    fn read(prop: &Property, value: ValueRef<'_>) -> PropertyResult<Self> {
        match prop.kind() {
            PropertyKind::Bool(b) => Ok(b.get_bool(value)),
            _ => Err(mismatch(prop, Self::EXPECTED)),
        }
    }

    fn write(prop: &Property, dest: ValueMut<'_>, value: Self) -> PropertyResult<()> {
        match prop.kind() {
            PropertyKind::Bool(b) => {
                b.set_bool(dest, value);
                Ok(())
            }
            _ => Err(mismatch(prop, Self::EXPECTED)),
        }
    }
}

impl NativeValue for NameId {
    const EXPECTED: &'static str = "Name";

    fn read(prop: &Property, value: ValueRef<'_>) -> PropertyResult<Self> {
        match prop.kind() {
            PropertyKind::Name(_) => Ok(value.read::<NameId>()),
            _ => Err(mismatch(prop, Self::EXPECTED)),
        }
    }

    fn write(prop: &Property, mut dest: ValueMut<'_>, value: Self) -> PropertyResult<()> {
        match prop.kind() {
            PropertyKind::Name(_) => {
                dest.write(value);
                Ok(())
            }
            _ => Err(mismatch(prop, Self::EXPECTED)),
        }
    }
}

/// Raw handle of strong and weak object references, and of interfaces
impl NativeValue for ObjectHandle {
    const EXPECTED: &'static str = "Object";

    fn read(prop: &Property, value: ValueRef<'_>) -> PropertyResult<Self> {
        match prop.kind() {
            PropertyKind::Object(o) if matches!(o.flavor(), ObjectFlavor::Strong | ObjectFlavor::Weak) => {
                Ok(value.read::<ObjectHandle>())
            }
            PropertyKind::Interface(_) => Ok(value.read::<ScriptInterface>().object),
            _ => Err(mismatch(prop, Self::EXPECTED)),
        }
    }

    fn write(prop: &Property, mut dest: ValueMut<'_>, value: Self) -> PropertyResult<()> {
        match prop.kind() {
            PropertyKind::Object(o) if matches!(o.flavor(), ObjectFlavor::Strong | ObjectFlavor::Weak) => {
                dest.write(value);
                Ok(())
            }
            PropertyKind::Interface(_) => {
                dest.write(ScriptInterface { object: value });
                Ok(())
            }
            _ => Err(mismatch(prop, Self::EXPECTED)),
        }
    }
}

impl NativeValue for String {
    const EXPECTED: &'static str = "Str";

    fn read(prop: &Property, value: ValueRef<'_>) -> PropertyResult<Self> {
        match prop.kind() {
            // SAFETY: Str values are ScriptStrings
            PropertyKind::Str(_) => Ok(unsafe { value.cast::<ScriptString>() }.as_str().to_string()),
            _ => Err(mismatch(prop, Self::EXPECTED)),
        }
    }

    fn write(prop: &Property, dest: ValueMut<'_>, value: Self) -> PropertyResult<()> {
        match prop.kind() {
            PropertyKind::Str(_) => {
                // SAFETY: as above
                unsafe { dest.into_cast_mut::<ScriptString>() }.set(&value);
                Ok(())
            }
            _ => Err(mismatch(prop, Self::EXPECTED)),
        }
    }
}
