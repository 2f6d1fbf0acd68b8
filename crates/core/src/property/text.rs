//! Name and string properties
//!
//! Names are interned [`NameId`]s: plain data, compared and hashed by id, so
//! comparison is case-insensitive. Strings are owned [`ScriptString`]s,
//! compared and hashed by content, case-sensitively.

use propsys_sdk::{NameId, ScriptString};

use crate::codec::{
    needs_quotes_bare, write_quoted, write_string, ArchiveReader, ArchiveWriter, PortContext,
    TextCursor,
};
use crate::error::{ImportError, PropertyResult};
use crate::hash::hash_str;
use crate::memory::{ValueMut, ValueRef};

use super::{PropertyFlags, PropertyOps};

/// Interned name property
#[derive(Debug, Default, Clone, Copy)]
pub struct NameProperty;

impl PropertyOps for NameProperty {
    fn kind_name(&self) -> &'static str {
        "Name"
    }

    fn value_layout(&self) -> (usize, usize) {
        (std::mem::size_of::<NameId>(), std::mem::align_of::<NameId>())
    }

    fn intrinsic_flags(&self) -> PropertyFlags {
        PropertyFlags::POD
    }

    fn is_hashable(&self) -> bool {
        true
    }

    fn identical(&self, a: ValueRef<'_>, b: ValueRef<'_>) -> bool {
        a.read::<NameId>() == b.read::<NameId>()
    }

    fn hash_value(&self, value: ValueRef<'_>) -> Option<u32> {
        Some(value.read::<NameId>().index())
    }

    fn export_value(&self, value: ValueRef<'_>, out: &mut String, cx: &PortContext<'_>) {
        let name = cx.services.names().to_string(value.read::<NameId>());
        write_string(&name, out, cx);
    }

    fn import_value(
        &self,
        mut dest: ValueMut<'_>,
        cursor: &mut TextCursor<'_>,
        cx: &PortContext<'_>,
    ) -> Result<(), ImportError> {
        let start = cursor.position();
        let text = cursor.read_string_value(cx.is_delimited())?;
        let id = cx
            .services
            .names()
            .intern(&text)
            .map_err(|e| ImportError::new(start, e.to_string()))?;
        dest.write(id);
        Ok(())
    }

    fn serialize_value(
        &self,
        value: ValueRef<'_>,
        ar: &mut ArchiveWriter,
        cx: &PortContext<'_>,
    ) -> PropertyResult<()> {
        let name = cx.services.names().to_string(value.read::<NameId>());
        ar.write_str(&name)?;
        Ok(())
    }

    fn deserialize_value(
        &self,
        mut dest: ValueMut<'_>,
        ar: &mut ArchiveReader<'_>,
        cx: &PortContext<'_>,
    ) -> PropertyResult<()> {
        let id = cx.services.names().intern(ar.read_str()?)?;
        dest.write(id);
        Ok(())
    }
}

/// Owned string property
#[derive(Debug, Default, Clone, Copy)]
pub struct StrProperty;

fn script_str<'a>(value: ValueRef<'a>) -> &'a ScriptString {
    // SAFETY: Str values are ScriptStrings, valid when zeroed
    unsafe { value.cast::<ScriptString>() }
}

fn script_str_mut<'a>(dest: ValueMut<'a>) -> &'a mut ScriptString {
    // SAFETY: as above
    unsafe { dest.into_cast_mut::<ScriptString>() }
}

impl PropertyOps for StrProperty {
    fn kind_name(&self) -> &'static str {
        "Str"
    }

    fn value_layout(&self) -> (usize, usize) {
        (
            std::mem::size_of::<ScriptString>(),
            std::mem::align_of::<ScriptString>(),
        )
    }

    fn intrinsic_flags(&self) -> PropertyFlags {
        PropertyFlags::ZERO_CONSTRUCTIBLE
    }

    fn is_hashable(&self) -> bool {
        true
    }

    fn identical(&self, a: ValueRef<'_>, b: ValueRef<'_>) -> bool {
        script_str(a).as_str() == script_str(b).as_str()
    }

    fn copy_value(&self, dest: ValueMut<'_>, src: ValueRef<'_>) {
        script_str_mut(dest).set(script_str(src).as_str());
    }

    fn destroy_value(&self, dest: ValueMut<'_>) {
        script_str_mut(dest).free();
    }

    fn hash_value(&self, value: ValueRef<'_>) -> Option<u32> {
        Some(hash_str(script_str(value).as_str()))
    }

    fn export_value(&self, value: ValueRef<'_>, out: &mut String, cx: &PortContext<'_>) {
        let text = script_str(value).as_str();
        if cx.is_delimited() || needs_quotes_bare(text) {
            write_quoted(text, out);
        } else {
            out.push_str(text);
        }
    }

    fn import_value(
        &self,
        dest: ValueMut<'_>,
        cursor: &mut TextCursor<'_>,
        cx: &PortContext<'_>,
    ) -> Result<(), ImportError> {
        let text = cursor.read_string_value(cx.is_delimited())?;
        script_str_mut(dest).set(&text);
        Ok(())
    }

    fn serialize_value(
        &self,
        value: ValueRef<'_>,
        ar: &mut ArchiveWriter,
        _cx: &PortContext<'_>,
    ) -> PropertyResult<()> {
        ar.write_str(script_str(value).as_str())?;
        Ok(())
    }

    fn deserialize_value(
        &self,
        dest: ValueMut<'_>,
        ar: &mut ArchiveReader<'_>,
        _cx: &PortContext<'_>,
    ) -> PropertyResult<()> {
        let text = ar.read_str()?;
        script_str_mut(dest).set(text);
        Ok(())
    }
}
