//! Live object table
//!
//! Objects are stored in a slot map and addressed by [`ObjectHandle`]s built
//! from the slot map keys. A destroyed object's handle stops resolving even if
//! its slot is reused, which is what makes weak references detectable as stale.

use std::collections::HashMap;

use propsys_sdk::{Guid, NameId, ObjectHandle};
use slotmap::{new_key_type, Key, KeyData, SlotMap};

use crate::error::EngineError;

new_key_type! {
    /// Slot map key behind an [`ObjectHandle`]
    pub struct ObjectKey;
}

impl ObjectKey {
    fn handle(self) -> ObjectHandle {
        ObjectHandle::from_raw(self.data().as_ffi())
    }

    fn from_handle(handle: ObjectHandle) -> Option<Self> {
        if handle.is_null() {
            return None;
        }
        Some(KeyData::from_ffi(handle.raw()).into())
    }
}

/// Information about one live object
#[derive(Debug, Clone)]
pub struct ObjectEntry {
    /// Unique path, e.g. `/Game/Maps/Arena.Arena:Door_1`
    pub path: String,
    /// Class name
    pub class: NameId,
    /// Interfaces implemented besides the class
    pub interfaces: Vec<NameId>,
    /// Stable identity across sessions, [`Guid::ZERO`] when unassigned
    pub guid: Guid,
}

/// Table of live objects
#[derive(Default)]
pub struct ObjectTable {
    objects: SlotMap<ObjectKey, ObjectEntry>,
    /// Lowercased path -> key
    by_path: HashMap<String, ObjectKey>,
    by_guid: HashMap<Guid, ObjectKey>,
}

impl ObjectTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an object
    ///
    /// # Arguments
    /// * `path` - Unique object path (compared case-insensitively)
    /// * `class` - Class name id
    pub fn create(&mut self, path: &str, class: NameId) -> Result<ObjectHandle, EngineError> {
        self.create_with_guid(path, class, Guid::ZERO)
    }

    /// Create an object with a stable GUID
    pub fn create_with_guid(
        &mut self,
        path: &str,
        class: NameId,
        guid: Guid,
    ) -> Result<ObjectHandle, EngineError> {
        let path_key = path.to_lowercase();
        if self.by_path.contains_key(&path_key) {
            return Err(EngineError::DuplicatePath(path.to_string()));
        }

        let key = self.objects.insert(ObjectEntry {
            path: path.to_string(),
            class,
            interfaces: Vec::new(),
            guid,
        });
        self.by_path.insert(path_key, key);
        if guid.is_valid() {
            self.by_guid.insert(guid, key);
        }

        let handle = key.handle();
        tracing::debug!("Created object '{}' as {:?}", path, handle);
        Ok(handle)
    }

    /// Record that an object implements an interface
    pub fn implement(&mut self, handle: ObjectHandle, interface: NameId) -> Result<(), EngineError> {
        let entry = ObjectKey::from_handle(handle)
            .and_then(|key| self.objects.get_mut(key))
            .ok_or(EngineError::UnknownObject(handle))?;
        if !entry.interfaces.contains(&interface) {
            entry.interfaces.push(interface);
        }
        Ok(())
    }

    /// Destroy an object, invalidating every handle to it
    pub fn destroy(&mut self, handle: ObjectHandle) -> Result<ObjectEntry, EngineError> {
        let entry = ObjectKey::from_handle(handle)
            .and_then(|key| self.objects.remove(key))
            .ok_or(EngineError::UnknownObject(handle))?;
        self.by_path.remove(&entry.path.to_lowercase());
        if entry.guid.is_valid() {
            self.by_guid.remove(&entry.guid);
        }
        tracing::debug!("Destroyed object '{}'", entry.path);
        Ok(entry)
    }

    /// Check if a handle refers to a live object
    pub fn is_alive(&self, handle: ObjectHandle) -> bool {
        self.get(handle).is_some()
    }

    pub fn get(&self, handle: ObjectHandle) -> Option<&ObjectEntry> {
        ObjectKey::from_handle(handle).and_then(|key| self.objects.get(key))
    }

    pub fn find_by_path(&self, path: &str) -> Option<ObjectHandle> {
        self.by_path.get(&path.to_lowercase()).map(|key| key.handle())
    }

    pub fn find_by_guid(&self, guid: Guid) -> Option<ObjectHandle> {
        if !guid.is_valid() {
            return None;
        }
        self.by_guid.get(&guid).map(|key| key.handle())
    }

    pub fn path_of(&self, handle: ObjectHandle) -> Option<&str> {
        self.get(handle).map(|entry| entry.path.as_str())
    }

    pub fn guid_of(&self, handle: ObjectHandle) -> Option<Guid> {
        self.get(handle).map(|entry| entry.guid)
    }

    /// Check if a live object has exactly this class
    pub fn is_a(&self, handle: ObjectHandle, class: NameId) -> bool {
        self.get(handle).is_some_and(|entry| entry.class == class)
    }

    /// Check if a live object implements an interface
    pub fn implements(&self, handle: ObjectHandle, interface: NameId) -> bool {
        self.get(handle)
            .is_some_and(|entry| entry.interfaces.contains(&interface))
    }

    /// Number of live objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_find() {
        let mut table = ObjectTable::new();
        let handle = table.create("/Game/Door", NameId(1)).unwrap();
        assert!(!handle.is_null());
        assert!(table.is_alive(handle));
        assert_eq!(table.find_by_path("/game/door"), Some(handle));
        assert_eq!(table.path_of(handle), Some("/Game/Door"));
        assert!(table.is_a(handle, NameId(1)));
        assert!(!table.is_a(handle, NameId(2)));
    }

    #[test]
    fn test_duplicate_path() {
        let mut table = ObjectTable::new();
        table.create("/Game/Door", NameId(1)).unwrap();
        assert!(matches!(
            table.create("/Game/DOOR", NameId(1)),
            Err(EngineError::DuplicatePath(_))
        ));
    }

    #[test]
    fn test_destroyed_handle_is_stale() {
        let mut table = ObjectTable::new();
        let old = table.create("/Game/A", NameId(1)).unwrap();
        table.destroy(old).unwrap();
        let new = table.create("/Game/B", NameId(1)).unwrap();

        assert!(!table.is_alive(old));
        assert!(table.is_alive(new));
        assert_ne!(old, new);
        assert_eq!(old.index(), new.index());
        assert!(table.find_by_path("/Game/A").is_none());
    }

    #[test]
    fn test_null_handle_never_resolves() {
        let mut table = ObjectTable::new();
        table.create("/Game/A", NameId(1)).unwrap();
        assert!(!table.is_alive(ObjectHandle::NULL));
        assert!(table.destroy(ObjectHandle::NULL).is_err());
    }

    #[test]
    fn test_guid_lookup_and_interfaces() {
        let mut table = ObjectTable::new();
        let guid = Guid::new(1, 2, 3, 4);
        let handle = table.create_with_guid("/Game/A", NameId(1), guid).unwrap();
        assert_eq!(table.find_by_guid(guid), Some(handle));
        assert_eq!(table.find_by_guid(Guid::ZERO), None);

        table.implement(handle, NameId(5)).unwrap();
        table.implement(handle, NameId(5)).unwrap();
        assert!(table.implements(handle, NameId(5)));
        assert_eq!(table.get(handle).unwrap().interfaces.len(), 1);
    }
}
