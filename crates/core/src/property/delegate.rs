//! Delegate properties
//!
//! A delegate binds an object to one of its functions by name. Text form is
//! `Path.Function`, or `None` when unbound. A multicast delegate is an
//! invocation list of delegates, exported as `(A.Fire,B.Open)`.

use propsys_sdk::{NameId, ObjectHandle, ScriptArray, ScriptDelegate};

use crate::codec::{ArchiveReader, ArchiveWriter, PortContext, TextCursor};
use crate::error::{ImportError, PropertyResult};
use crate::memory::{ValueMut, ValueRef};

use super::{PropertyFlags, PropertyOps};

const DELEGATE_SIZE: usize = std::mem::size_of::<ScriptDelegate>();
const DELEGATE_ALIGN: usize = std::mem::align_of::<ScriptDelegate>();

fn export_delegate(delegate: ScriptDelegate, out: &mut String, cx: &PortContext<'_>) {
    let path = cx.services.path_of(delegate.object);
    match path {
        Some(path) if !delegate.function.is_none() => {
            out.push_str(&path);
            out.push('.');
            out.push_str(&cx.services.names().to_string(delegate.function));
        }
        _ => out.push_str("None"),
    }
}

fn parse_delegate(text: &str, start: usize, cx: &PortContext<'_>) -> Result<ScriptDelegate, ImportError> {
    if text.eq_ignore_ascii_case("None") {
        return Ok(ScriptDelegate::default());
    }
    let (path, function) = text
        .rsplit_once('.')
        .ok_or_else(|| ImportError::new(start, format!("expected Path.Function, got '{}'", text)))?;
    let object = cx
        .services
        .resolve_path(path)
        .ok_or_else(|| ImportError::new(start, format!("no object at path '{}'", path)))?;
    let function = cx
        .services
        .names()
        .intern(function)
        .map_err(|e| ImportError::new(start, e.to_string()))?;
    Ok(ScriptDelegate::new(object, function))
}

fn serialize_delegate(
    delegate: ScriptDelegate,
    ar: &mut ArchiveWriter,
    cx: &PortContext<'_>,
) -> PropertyResult<()> {
    ar.write_str(&cx.services.path_of(delegate.object).unwrap_or_default())?;
    ar.write_str(&cx.services.names().to_string(delegate.function))?;
    Ok(())
}

fn deserialize_delegate(ar: &mut ArchiveReader<'_>, cx: &PortContext<'_>) -> PropertyResult<ScriptDelegate> {
    let path = ar.read_str()?;
    let function = ar.read_str()?;
    let object = if path.is_empty() {
        ObjectHandle::NULL
    } else {
        cx.services.resolve_path(path).unwrap_or(ObjectHandle::NULL)
    };
    if object.is_null() {
        return Ok(ScriptDelegate::default());
    }
    Ok(ScriptDelegate::new(object, cx.services.names().intern(function)?))
}

/// Single-cast delegate property
#[derive(Debug, Default, Clone, Copy)]
pub struct DelegateProperty {
    signature: Option<NameId>,
}

impl DelegateProperty {
    /// # Arguments
    /// * `signature` - Name of the function signature, informational only
    pub fn new(signature: Option<NameId>) -> Self {
        Self { signature }
    }

    pub fn signature(&self) -> Option<NameId> {
        self.signature
    }

    pub fn get_delegate(&self, value: ValueRef<'_>) -> ScriptDelegate {
        value.read::<ScriptDelegate>()
    }

    pub fn set_delegate(&self, mut dest: ValueMut<'_>, delegate: ScriptDelegate) {
        dest.write(delegate);
    }
}

impl PropertyOps for DelegateProperty {
    fn kind_name(&self) -> &'static str {
        "Delegate"
    }

    fn value_layout(&self) -> (usize, usize) {
        (DELEGATE_SIZE, DELEGATE_ALIGN)
    }

    fn intrinsic_flags(&self) -> PropertyFlags {
        PropertyFlags::POD | PropertyFlags::CONTAINS_WEAK_REFERENCE
    }

    fn identical(&self, a: ValueRef<'_>, b: ValueRef<'_>) -> bool {
        self.get_delegate(a) == self.get_delegate(b)
    }

    fn export_value(&self, value: ValueRef<'_>, out: &mut String, cx: &PortContext<'_>) {
        export_delegate(self.get_delegate(value), out, cx);
    }

    fn import_value(
        &self,
        dest: ValueMut<'_>,
        cursor: &mut TextCursor<'_>,
        cx: &PortContext<'_>,
    ) -> Result<(), ImportError> {
        let start = cursor.position();
        let text = cursor.read_string_value(cx.is_delimited())?;
        self.set_delegate(dest, parse_delegate(&text, start, cx)?);
        Ok(())
    }

    fn serialize_value(
        &self,
        value: ValueRef<'_>,
        ar: &mut ArchiveWriter,
        cx: &PortContext<'_>,
    ) -> PropertyResult<()> {
        serialize_delegate(self.get_delegate(value), ar, cx)
    }

    fn deserialize_value(
        &self,
        dest: ValueMut<'_>,
        ar: &mut ArchiveReader<'_>,
        cx: &PortContext<'_>,
    ) -> PropertyResult<()> {
        let delegate = deserialize_delegate(ar, cx)?;
        self.set_delegate(dest, delegate);
        Ok(())
    }
}

/// Multicast delegate property, an owned invocation list
#[derive(Debug, Default, Clone, Copy)]
pub struct MulticastDelegateProperty {
    signature: Option<NameId>,
}

impl MulticastDelegateProperty {
    pub fn new(signature: Option<NameId>) -> Self {
        Self { signature }
    }

    pub fn signature(&self) -> Option<NameId> {
        self.signature
    }

    fn list<'a>(&self, value: ValueRef<'a>) -> &'a ScriptArray {
        // SAFETY: multicast values are ScriptArrays of ScriptDelegate
        unsafe { value.cast::<ScriptArray>() }
    }

    fn list_mut<'a>(&self, dest: ValueMut<'a>) -> &'a mut ScriptArray {
        // SAFETY: as above
        unsafe { dest.into_cast_mut::<ScriptArray>() }
    }

    /// Bound delegates in invocation order
    pub fn invocation_list(&self, value: ValueRef<'_>) -> Vec<ScriptDelegate> {
        // SAFETY: the list is only ever grown with the delegate element size
        let bytes = unsafe { self.list(value).as_bytes(DELEGATE_SIZE) };
        bytes
            .chunks_exact(DELEGATE_SIZE)
            // SAFETY: each chunk holds one delegate, which is plain data
            .map(|chunk| unsafe { ValueRef::from_bytes(chunk) }.read::<ScriptDelegate>())
            .collect()
    }

    /// Replace the whole invocation list
    pub fn set_invocation_list(&self, dest: ValueMut<'_>, delegates: &[ScriptDelegate]) {
        let list = self.list_mut(dest);
        // SAFETY: same element size and alignment on every call; delegates
        // own nothing, so the old elements need no destruction
        unsafe {
            list.free(DELEGATE_SIZE, DELEGATE_ALIGN);
            if delegates.is_empty() {
                return;
            }
            list.add_zeroed(delegates.len(), DELEGATE_SIZE, DELEGATE_ALIGN);
            for (chunk, delegate) in list
                .as_bytes_mut(DELEGATE_SIZE)
                .chunks_exact_mut(DELEGATE_SIZE)
                .zip(delegates)
            {
                ValueMut::from_bytes(chunk).write(*delegate);
            }
        }
    }

    /// Add a delegate unless it is already bound
    ///
    /// Returns `false` if the delegate was already in the list.
    pub fn add_unique(&self, mut dest: ValueMut<'_>, delegate: ScriptDelegate) -> bool {
        let mut delegates = self.invocation_list(dest.as_ref());
        if delegates.contains(&delegate) {
            return false;
        }
        delegates.push(delegate);
        self.set_invocation_list(dest, &delegates);
        true
    }

    /// Remove a delegate, returning whether it was bound
    pub fn remove(&self, mut dest: ValueMut<'_>, delegate: ScriptDelegate) -> bool {
        let mut delegates = self.invocation_list(dest.as_ref());
        let before = delegates.len();
        delegates.retain(|d| *d != delegate);
        if delegates.len() == before {
            return false;
        }
        self.set_invocation_list(dest, &delegates);
        true
    }
}

impl PropertyOps for MulticastDelegateProperty {
    fn kind_name(&self) -> &'static str {
        "MulticastDelegate"
    }

    fn value_layout(&self) -> (usize, usize) {
        (
            std::mem::size_of::<ScriptArray>(),
            std::mem::align_of::<ScriptArray>(),
        )
    }

    fn intrinsic_flags(&self) -> PropertyFlags {
        PropertyFlags::ZERO_CONSTRUCTIBLE | PropertyFlags::CONTAINS_WEAK_REFERENCE
    }

    fn identical(&self, a: ValueRef<'_>, b: ValueRef<'_>) -> bool {
        self.invocation_list(a) == self.invocation_list(b)
    }

    fn copy_value(&self, dest: ValueMut<'_>, src: ValueRef<'_>) {
        let delegates = self.invocation_list(src);
        self.set_invocation_list(dest, &delegates);
    }

    fn destroy_value(&self, dest: ValueMut<'_>) {
        // SAFETY: element layout matches every growth of this list
        unsafe { self.list_mut(dest).free(DELEGATE_SIZE, DELEGATE_ALIGN) };
    }

    fn export_value(&self, value: ValueRef<'_>, out: &mut String, cx: &PortContext<'_>) {
        out.push('(');
        for (i, delegate) in self.invocation_list(value).into_iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            export_delegate(delegate, out, cx);
        }
        out.push(')');
    }

    fn import_value(
        &self,
        dest: ValueMut<'_>,
        cursor: &mut TextCursor<'_>,
        cx: &PortContext<'_>,
    ) -> Result<(), ImportError> {
        let inner = cx.delimited();
        let mut delegates = Vec::new();
        cursor.expect('(')?;
        cursor.skip_whitespace();
        if !cursor.eat(')') {
            loop {
                cursor.skip_whitespace();
                let start = cursor.position();
                let text = cursor.read_string_value(inner.is_delimited())?;
                let delegate = parse_delegate(&text, start, &inner)?;
                if delegate.is_bound() {
                    delegates.push(delegate);
                }
                cursor.skip_whitespace();
                if cursor.eat(')') {
                    break;
                }
                cursor.expect(',')?;
            }
        }
        self.set_invocation_list(dest, &delegates);
        Ok(())
    }

    fn serialize_value(
        &self,
        value: ValueRef<'_>,
        ar: &mut ArchiveWriter,
        cx: &PortContext<'_>,
    ) -> PropertyResult<()> {
        let delegates = self.invocation_list(value);
        ar.write_len(delegates.len())?;
        for delegate in delegates {
            serialize_delegate(delegate, ar, cx)?;
        }
        Ok(())
    }

    fn deserialize_value(
        &self,
        dest: ValueMut<'_>,
        ar: &mut ArchiveReader<'_>,
        cx: &PortContext<'_>,
    ) -> PropertyResult<()> {
        let count = ar.read_len()?;
        let mut delegates = Vec::new();
        for _ in 0..count {
            let delegate = deserialize_delegate(ar, cx)?;
            if delegate.is_bound() {
                delegates.push(delegate);
            }
        }
        self.set_invocation_list(dest, &delegates);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ValueBuffer;
    use propsys_engine::EngineServices;

    fn buffer_for(prop: &dyn PropertyOps) -> ValueBuffer {
        let (size, align) = prop.value_layout();
        ValueBuffer::zeroed(size, align).unwrap()
    }

    #[test]
    fn test_delegate_text_round_trip() {
        let services = EngineServices::new();
        let cx = PortContext::new(&services);
        services.objects_mut().create("/Game/Button", NameId::NONE).unwrap();

        let prop = DelegateProperty::new(None);
        let mut value = buffer_for(&prop);
        prop.import_value(value.as_value_mut(), &mut TextCursor::new("/Game/Button.OnPressed"), &cx)
            .unwrap();
        assert!(prop.get_delegate(value.as_value()).is_bound());

        let mut out = String::new();
        prop.export_value(value.as_value(), &mut out, &cx);
        assert_eq!(out, "/Game/Button.OnPressed");

        assert!(prop
            .import_value(value.as_value_mut(), &mut TextCursor::new("/Game/Nothing.Fire"), &cx)
            .is_err());
    }

    #[test]
    fn test_multicast_add_remove() {
        let services = EngineServices::new();
        let a = services.objects_mut().create("/Game/A", NameId::NONE).unwrap();
        let fire = services.names().intern("Fire").unwrap();

        let prop = MulticastDelegateProperty::new(None);
        let mut value = buffer_for(&prop);
        let delegate = ScriptDelegate::new(a, fire);

        assert!(prop.add_unique(value.as_value_mut(), delegate));
        assert!(!prop.add_unique(value.as_value_mut(), delegate));
        assert_eq!(prop.invocation_list(value.as_value()), vec![delegate]);
        assert!(prop.remove(value.as_value_mut(), delegate));
        assert!(prop.invocation_list(value.as_value()).is_empty());

        prop.destroy_value(value.as_value_mut());
    }

    #[test]
    fn test_multicast_text_and_copy() {
        let services = EngineServices::new();
        let cx = PortContext::new(&services);
        services.objects_mut().create("/Game/A", NameId::NONE).unwrap();
        services.objects_mut().create("/Game/B", NameId::NONE).unwrap();

        let prop = MulticastDelegateProperty::new(None);
        let mut a = buffer_for(&prop);
        let mut b = buffer_for(&prop);
        prop.import_value(a.as_value_mut(), &mut TextCursor::new("( /Game/A.Fire , /Game/B.Open )"), &cx)
            .unwrap();
        prop.copy_value(b.as_value_mut(), a.as_value());
        assert!(prop.identical(a.as_value(), b.as_value()));

        let mut out = String::new();
        prop.export_value(b.as_value(), &mut out, &cx);
        assert_eq!(out, "(/Game/A.Fire,/Game/B.Open)");

        prop.destroy_value(a.as_value_mut());
        prop.destroy_value(b.as_value_mut());
    }
}
