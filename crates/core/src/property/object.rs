//! Object reference properties
//!
//! | flavor  | stored as         | identity            |
//! |---------|-------------------|---------------------|
//! | Strong  | `ObjectHandle`    | handle bits         |
//! | Weak    | `ObjectHandle`    | handle bits         |
//! | Lazy    | `LazyObjectRef`   | GUID, else handle   |
//! | Soft    | `SoftObjectPath`  | path string         |
//!
//! A weak reference whose object was destroyed is [`WeakState::Stale`]. It
//! keeps its handle bits, so it is neither identical to null nor to a live
//! reference to whatever reuses the slot, and it exports as `None`.

use propsys_engine::EngineServices;
use propsys_sdk::{Guid, LazyObjectRef, NameId, ObjectHandle, ScriptInterface, SoftObjectPath};

use crate::codec::{write_string, ArchiveReader, ArchiveWriter, PortContext, TextCursor};
use crate::error::{ImportError, PropertyResult};
use crate::hash::{hash_combine, hash_str, hash_u64};
use crate::memory::{ValueMut, ValueRef};

use super::{PropertyFlags, PropertyOps};

const NONE_TEXT: &str = "None";

/// How an object property refers to its object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectFlavor {
    Strong,
    Weak,
    Lazy,
    Soft,
}

/// Liveness of a handle-based reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeakState {
    Null,
    Live,
    /// The object was destroyed after the reference was stored
    Stale,
}

impl WeakState {
    pub fn of(handle: ObjectHandle, services: &EngineServices) -> Self {
        if handle.is_null() {
            WeakState::Null
        } else if services.is_alive(handle) {
            WeakState::Live
        } else {
            WeakState::Stale
        }
    }
}

fn export_handle(handle: ObjectHandle, out: &mut String, cx: &PortContext<'_>) {
    match cx.services.path_of(handle) {
        Some(path) => write_string(&path, out, cx),
        None => out.push_str(NONE_TEXT),
    }
}

/// Read an object path and resolve it, `None` giving the null handle
fn import_handle(
    cursor: &mut TextCursor<'_>,
    cx: &PortContext<'_>,
) -> Result<(ObjectHandle, usize), ImportError> {
    let start = cursor.position();
    let path = cursor.read_string_value(cx.is_delimited())?;
    if path.eq_ignore_ascii_case(NONE_TEXT) {
        return Ok((ObjectHandle::NULL, start));
    }
    cx.services
        .resolve_path(&path)
        .map(|handle| (handle, start))
        .ok_or_else(|| ImportError::new(start, format!("no object at path '{}'", path)))
}

fn serialize_handle(handle: ObjectHandle, ar: &mut ArchiveWriter, cx: &PortContext<'_>) -> PropertyResult<()> {
    let path = cx.services.path_of(handle).unwrap_or_default();
    ar.write_str(&path)?;
    Ok(())
}

fn deserialize_handle(ar: &mut ArchiveReader<'_>, cx: &PortContext<'_>) -> PropertyResult<ObjectHandle> {
    let path = ar.read_str()?;
    if path.is_empty() {
        return Ok(ObjectHandle::NULL);
    }
    Ok(cx.services.resolve_path(path).unwrap_or_else(|| {
        tracing::debug!("Object '{}' not found while loading, reference cleared", path);
        ObjectHandle::NULL
    }))
}

/// Property referring to an object
#[derive(Debug, Clone, Copy)]
pub struct ObjectProperty {
    flavor: ObjectFlavor,
    class: Option<NameId>,
}

impl ObjectProperty {
    /// Create an object property
    ///
    /// # Arguments
    /// * `flavor` - How the reference is stored
    /// * `class` - Required class for imported objects, `None` for any
    pub fn new(flavor: ObjectFlavor, class: Option<NameId>) -> Self {
        Self { flavor, class }
    }

    pub fn flavor(&self) -> ObjectFlavor {
        self.flavor
    }

    pub fn class(&self) -> Option<NameId> {
        self.class
    }

    fn handle(&self, value: ValueRef<'_>) -> ObjectHandle {
        value.read::<ObjectHandle>()
    }

    fn lazy(&self, value: ValueRef<'_>) -> LazyObjectRef {
        value.read::<LazyObjectRef>()
    }

    fn soft<'a>(&self, value: ValueRef<'a>) -> &'a SoftObjectPath {
        // SAFETY: Soft values are SoftObjectPaths, valid when zeroed
        unsafe { value.cast::<SoftObjectPath>() }
    }

    fn soft_mut<'a>(&self, dest: ValueMut<'a>) -> &'a mut SoftObjectPath {
        // SAFETY: as above
        unsafe { dest.into_cast_mut::<SoftObjectPath>() }
    }

    /// Stored handle for handle-based flavors
    pub fn raw_handle(&self, value: ValueRef<'_>) -> ObjectHandle {
        match self.flavor {
            ObjectFlavor::Strong | ObjectFlavor::Weak => self.handle(value),
            ObjectFlavor::Lazy => self.lazy(value).handle,
            ObjectFlavor::Soft => ObjectHandle::NULL,
        }
    }

    /// Liveness of the stored reference
    pub fn weak_state(&self, value: ValueRef<'_>, services: &EngineServices) -> WeakState {
        WeakState::of(self.raw_handle(value), services)
    }

    /// Resolve the reference to a live object
    pub fn get_object(&self, value: ValueRef<'_>, services: &EngineServices) -> Option<ObjectHandle> {
        let resolved = match self.flavor {
            ObjectFlavor::Strong | ObjectFlavor::Weak => Some(self.handle(value)),
            ObjectFlavor::Lazy => {
                let lazy = self.lazy(value);
                if services.is_alive(lazy.handle) {
                    Some(lazy.handle)
                } else {
                    services.objects().find_by_guid(lazy.guid)
                }
            }
            ObjectFlavor::Soft => services.resolve_path(self.soft(value).path.as_str()),
        };
        resolved.filter(|handle| services.is_alive(*handle))
    }

    /// Point the reference at `handle`
    pub fn set_object(&self, dest: ValueMut<'_>, handle: ObjectHandle, services: &EngineServices) {
        let mut dest = dest;
        match self.flavor {
            ObjectFlavor::Strong | ObjectFlavor::Weak => dest.write(handle),
            ObjectFlavor::Lazy => {
                let guid = services.objects().guid_of(handle).unwrap_or(Guid::ZERO);
                dest.write(LazyObjectRef { handle, guid });
            }
            ObjectFlavor::Soft => {
                let path = services.path_of(handle).unwrap_or_default();
                self.soft_mut(dest).path.set(&path);
            }
        }
    }

    fn check_class(&self, handle: ObjectHandle, start: usize, cx: &PortContext<'_>) -> Result<(), ImportError> {
        match self.class {
            Some(class) if !handle.is_null() && !cx.services.objects().is_a(handle, class) => {
                Err(ImportError::new(
                    start,
                    format!(
                        "object is not a {}",
                        cx.services.names().to_string(class)
                    ),
                ))
            }
            _ => Ok(()),
        }
    }
}

impl PropertyOps for ObjectProperty {
    fn kind_name(&self) -> &'static str {
        match self.flavor {
            ObjectFlavor::Strong => "Object",
            ObjectFlavor::Weak => "WeakObject",
            ObjectFlavor::Lazy => "LazyObject",
            ObjectFlavor::Soft => "SoftObject",
        }
    }

    fn value_layout(&self) -> (usize, usize) {
        match self.flavor {
            ObjectFlavor::Strong | ObjectFlavor::Weak => (
                std::mem::size_of::<ObjectHandle>(),
                std::mem::align_of::<ObjectHandle>(),
            ),
            ObjectFlavor::Lazy => (
                std::mem::size_of::<LazyObjectRef>(),
                std::mem::align_of::<LazyObjectRef>(),
            ),
            ObjectFlavor::Soft => (
                std::mem::size_of::<SoftObjectPath>(),
                std::mem::align_of::<SoftObjectPath>(),
            ),
        }
    }

    fn intrinsic_flags(&self) -> PropertyFlags {
        match self.flavor {
            ObjectFlavor::Strong => PropertyFlags::POD | PropertyFlags::CONTAINS_OBJECT_REFERENCE,
            ObjectFlavor::Weak | ObjectFlavor::Lazy => {
                PropertyFlags::POD | PropertyFlags::CONTAINS_WEAK_REFERENCE
            }
            ObjectFlavor::Soft => PropertyFlags::ZERO_CONSTRUCTIBLE,
        }
    }

    fn is_hashable(&self) -> bool {
        true
    }

    fn identical(&self, a: ValueRef<'_>, b: ValueRef<'_>) -> bool {
        match self.flavor {
            ObjectFlavor::Strong | ObjectFlavor::Weak => self.handle(a) == self.handle(b),
            ObjectFlavor::Lazy => {
                let (a, b) = (self.lazy(a), self.lazy(b));
                if a.guid.is_valid() || b.guid.is_valid() {
                    a.guid == b.guid
                } else {
                    a.handle == b.handle
                }
            }
            ObjectFlavor::Soft => self.soft(a).path.as_str() == self.soft(b).path.as_str(),
        }
    }

    fn copy_value(&self, mut dest: ValueMut<'_>, src: ValueRef<'_>) {
        match self.flavor {
            ObjectFlavor::Soft => {
                let path = self.soft(src).path.as_str();
                self.soft_mut(dest).path.set(path);
            }
            _ => dest.copy_bytes_from(src),
        }
    }

    fn destroy_value(&self, mut dest: ValueMut<'_>) {
        match self.flavor {
            ObjectFlavor::Soft => self.soft_mut(dest).path.free(),
            _ => dest.fill_zero(),
        }
    }

    fn hash_value(&self, value: ValueRef<'_>) -> Option<u32> {
        let hash = match self.flavor {
            ObjectFlavor::Strong | ObjectFlavor::Weak => hash_u64(self.handle(value).raw()),
            ObjectFlavor::Lazy => {
                let lazy = self.lazy(value);
                if lazy.guid.is_valid() {
                    [lazy.guid.b, lazy.guid.c, lazy.guid.d]
                        .into_iter()
                        .fold(lazy.guid.a, hash_combine)
                } else {
                    hash_u64(lazy.handle.raw())
                }
            }
            ObjectFlavor::Soft => hash_str(self.soft(value).path.as_str()),
        };
        Some(hash)
    }

    fn export_value(&self, value: ValueRef<'_>, out: &mut String, cx: &PortContext<'_>) {
        match self.flavor {
            ObjectFlavor::Strong | ObjectFlavor::Weak => export_handle(self.handle(value), out, cx),
            ObjectFlavor::Lazy => {
                let lazy = self.lazy(value);
                if lazy.guid.is_valid() {
                    out.push_str(&lazy.guid.to_string());
                } else {
                    out.push_str(NONE_TEXT);
                }
            }
            ObjectFlavor::Soft => {
                let path = self.soft(value).path.as_str();
                if path.is_empty() {
                    out.push_str(NONE_TEXT);
                } else {
                    write_string(path, out, cx);
                }
            }
        }
    }

    fn import_value(
        &self,
        mut dest: ValueMut<'_>,
        cursor: &mut TextCursor<'_>,
        cx: &PortContext<'_>,
    ) -> Result<(), ImportError> {
        match self.flavor {
            ObjectFlavor::Strong | ObjectFlavor::Weak => {
                let (handle, start) = import_handle(cursor, cx)?;
                self.check_class(handle, start, cx)?;
                dest.write(handle);
            }
            ObjectFlavor::Lazy => {
                let start = cursor.position();
                let token = cursor.read_token()?;
                let guid = if token.eq_ignore_ascii_case(NONE_TEXT) {
                    Guid::ZERO
                } else {
                    Guid::parse(token)
                        .ok_or_else(|| ImportError::new(start, format!("invalid GUID '{}'", token)))?
                };
                // Unloaded objects resolve later through the GUID
                let handle = cx
                    .services
                    .objects()
                    .find_by_guid(guid)
                    .unwrap_or(ObjectHandle::NULL);
                dest.write(LazyObjectRef { handle, guid });
            }
            ObjectFlavor::Soft => {
                let path = cursor.read_string_value(cx.is_delimited())?;
                let path = if path.eq_ignore_ascii_case(NONE_TEXT) { "" } else { path.as_str() };
                self.soft_mut(dest).path.set(path);
            }
        }
        Ok(())
    }

    fn serialize_value(
        &self,
        value: ValueRef<'_>,
        ar: &mut ArchiveWriter,
        cx: &PortContext<'_>,
    ) -> PropertyResult<()> {
        match self.flavor {
            ObjectFlavor::Strong | ObjectFlavor::Weak => serialize_handle(self.handle(value), ar, cx)?,
            ObjectFlavor::Lazy => {
                let guid = self.lazy(value).guid;
                for part in [guid.a, guid.b, guid.c, guid.d] {
                    ar.write_u32(part);
                }
            }
            ObjectFlavor::Soft => ar.write_str(self.soft(value).path.as_str())?,
        }
        Ok(())
    }

    fn deserialize_value(
        &self,
        mut dest: ValueMut<'_>,
        ar: &mut ArchiveReader<'_>,
        cx: &PortContext<'_>,
    ) -> PropertyResult<()> {
        match self.flavor {
            ObjectFlavor::Strong | ObjectFlavor::Weak => {
                let handle = deserialize_handle(ar, cx)?;
                dest.write(handle);
            }
            ObjectFlavor::Lazy => {
                let guid = Guid::new(ar.read_u32()?, ar.read_u32()?, ar.read_u32()?, ar.read_u32()?);
                let handle = cx
                    .services
                    .objects()
                    .find_by_guid(guid)
                    .unwrap_or(ObjectHandle::NULL);
                dest.write(LazyObjectRef { handle, guid });
            }
            ObjectFlavor::Soft => {
                let path = ar.read_str()?;
                self.soft_mut(dest).path.set(path);
            }
        }
        Ok(())
    }
}

/// Property referring to an object through an interface
#[derive(Debug, Clone, Copy)]
pub struct InterfaceProperty {
    interface: Option<NameId>,
}

impl InterfaceProperty {
    pub fn new(interface: Option<NameId>) -> Self {
        Self { interface }
    }

    pub fn interface(&self) -> Option<NameId> {
        self.interface
    }

    pub fn get_object(&self, value: ValueRef<'_>) -> ObjectHandle {
        value.read::<ScriptInterface>().object
    }
}

impl PropertyOps for InterfaceProperty {
    fn kind_name(&self) -> &'static str {
        "Interface"
    }

    fn value_layout(&self) -> (usize, usize) {
        (
            std::mem::size_of::<ScriptInterface>(),
            std::mem::align_of::<ScriptInterface>(),
        )
    }

    fn intrinsic_flags(&self) -> PropertyFlags {
        PropertyFlags::POD | PropertyFlags::CONTAINS_OBJECT_REFERENCE
    }

    fn is_hashable(&self) -> bool {
        true
    }

    fn identical(&self, a: ValueRef<'_>, b: ValueRef<'_>) -> bool {
        self.get_object(a) == self.get_object(b)
    }

    fn hash_value(&self, value: ValueRef<'_>) -> Option<u32> {
        Some(hash_u64(self.get_object(value).raw()))
    }

    fn export_value(&self, value: ValueRef<'_>, out: &mut String, cx: &PortContext<'_>) {
        export_handle(self.get_object(value), out, cx);
    }

    fn import_value(
        &self,
        mut dest: ValueMut<'_>,
        cursor: &mut TextCursor<'_>,
        cx: &PortContext<'_>,
    ) -> Result<(), ImportError> {
        let (object, start) = import_handle(cursor, cx)?;
        if let Some(interface) = self.interface {
            if !object.is_null() && !cx.services.objects().implements(object, interface) {
                return Err(ImportError::new(
                    start,
                    format!(
                        "object does not implement {}",
                        cx.services.names().to_string(interface)
                    ),
                ));
            }
        }
        dest.write(ScriptInterface { object });
        Ok(())
    }

    fn serialize_value(
        &self,
        value: ValueRef<'_>,
        ar: &mut ArchiveWriter,
        cx: &PortContext<'_>,
    ) -> PropertyResult<()> {
        serialize_handle(self.get_object(value), ar, cx)
    }

    fn deserialize_value(
        &self,
        mut dest: ValueMut<'_>,
        ar: &mut ArchiveReader<'_>,
        cx: &PortContext<'_>,
    ) -> PropertyResult<()> {
        let object = deserialize_handle(ar, cx)?;
        dest.write(ScriptInterface { object });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ValueBuffer;

    fn buffer_for(prop: &dyn PropertyOps) -> ValueBuffer {
        let (size, align) = prop.value_layout();
        ValueBuffer::zeroed(size, align).unwrap()
    }

    fn export(prop: &dyn PropertyOps, value: ValueRef<'_>, cx: &PortContext<'_>) -> String {
        let mut out = String::new();
        prop.export_value(value, &mut out, cx);
        out
    }

    #[test]
    fn test_strong_round_trip() {
        let services = EngineServices::new();
        let cx = PortContext::new(&services);
        let class = services.names().intern("Door").unwrap();
        let door = services.objects_mut().create("/Game/Door_1", class).unwrap();

        let prop = ObjectProperty::new(ObjectFlavor::Strong, Some(class));
        let mut value = buffer_for(&prop);
        prop.import_value(value.as_value_mut(), &mut TextCursor::new("/Game/Door_1"), &cx)
            .unwrap();
        assert_eq!(prop.get_object(value.as_value(), &services), Some(door));
        assert_eq!(export(&prop, value.as_value(), &cx), "/Game/Door_1");

        prop.import_value(value.as_value_mut(), &mut TextCursor::new("None"), &cx)
            .unwrap();
        assert_eq!(prop.weak_state(value.as_value(), &services), WeakState::Null);
        assert!(prop
            .import_value(value.as_value_mut(), &mut TextCursor::new("/Game/Missing"), &cx)
            .is_err());
    }

    #[test]
    fn test_class_restriction() {
        let services = EngineServices::new();
        let cx = PortContext::new(&services);
        let door = services.names().intern("Door").unwrap();
        let light = services.names().intern("Light").unwrap();
        services.objects_mut().create("/Game/Lamp", light).unwrap();

        let prop = ObjectProperty::new(ObjectFlavor::Strong, Some(door));
        let mut value = buffer_for(&prop);
        assert!(prop
            .import_value(value.as_value_mut(), &mut TextCursor::new("/Game/Lamp"), &cx)
            .is_err());
    }

    #[test]
    fn test_stale_weak_reference() {
        let services = EngineServices::new();
        let cx = PortContext::new(&services);
        let old = services.objects_mut().create("/Game/A", NameId::NONE).unwrap();

        let prop = ObjectProperty::new(ObjectFlavor::Weak, None);
        let mut stale = buffer_for(&prop);
        prop.set_object(stale.as_value_mut(), old, &services);
        services.objects_mut().destroy(old).unwrap();
        let reused = services.objects_mut().create("/Game/B", NameId::NONE).unwrap();

        let null = buffer_for(&prop);
        let mut live = buffer_for(&prop);
        prop.set_object(live.as_value_mut(), reused, &services);

        assert_eq!(prop.weak_state(stale.as_value(), &services), WeakState::Stale);
        assert!(!prop.identical(stale.as_value(), null.as_value()));
        assert!(!prop.identical(stale.as_value(), live.as_value()));
        assert_eq!(prop.get_object(stale.as_value(), &services), None);
        assert_eq!(export(&prop, stale.as_value(), &cx), "None");
    }

    #[test]
    fn test_lazy_resolves_by_guid() {
        let services = EngineServices::new();
        let cx = PortContext::new(&services);
        let guid = Guid::new(1, 2, 3, 4);

        let prop = ObjectProperty::new(ObjectFlavor::Lazy, None);
        let mut value = buffer_for(&prop);
        prop.import_value(value.as_value_mut(), &mut TextCursor::new(&guid.to_string()), &cx)
            .unwrap();
        assert_eq!(prop.get_object(value.as_value(), &services), None);

        let handle = services
            .objects_mut()
            .create_with_guid("/Game/Late", NameId::NONE, guid)
            .unwrap();
        assert_eq!(prop.get_object(value.as_value(), &services), Some(handle));
        assert_eq!(export(&prop, value.as_value(), &cx), guid.to_string());
    }

    #[test]
    fn test_soft_compares_by_path() {
        let services = EngineServices::new();
        let cx = PortContext::new(&services).delimited();
        let prop = ObjectProperty::new(ObjectFlavor::Soft, None);
        let mut a = buffer_for(&prop);
        let mut b = buffer_for(&prop);

        prop.import_value(a.as_value_mut(), &mut TextCursor::new("/Game/Unloaded.Asset"), &cx)
            .unwrap();
        prop.copy_value(b.as_value_mut(), a.as_value());
        assert!(prop.identical(a.as_value(), b.as_value()));
        assert_eq!(prop.hash_value(a.as_value()), prop.hash_value(b.as_value()));
        assert_eq!(prop.get_object(a.as_value(), &services), None);
        assert_eq!(export(&prop, a.as_value(), &cx), "/Game/Unloaded.Asset");

        prop.destroy_value(a.as_value_mut());
        prop.destroy_value(b.as_value_mut());
    }

    #[test]
    fn test_interface_requires_implementation() {
        let services = EngineServices::new();
        let cx = PortContext::new(&services);
        let usable = services.names().intern("Usable").unwrap();
        let handle = services.objects_mut().create("/Game/Button", NameId::NONE).unwrap();

        let prop = InterfaceProperty::new(Some(usable));
        let mut value = buffer_for(&prop);
        assert!(prop
            .import_value(value.as_value_mut(), &mut TextCursor::new("/Game/Button"), &cx)
            .is_err());

        services.objects_mut().implement(handle, usable).unwrap();
        prop.import_value(value.as_value_mut(), &mut TextCursor::new("/Game/Button"), &cx)
            .unwrap();
        assert_eq!(prop.get_object(value.as_value()), handle);
    }
}
