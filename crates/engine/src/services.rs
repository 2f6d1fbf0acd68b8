//! Service bundle handed to the property system

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use propsys_sdk::ObjectHandle;

use crate::names::NamePool;
use crate::objects::ObjectTable;

/// Engine services consumed by property descriptors
///
/// Created once by the host and passed by reference wherever names or
/// objects have to be resolved.
#[derive(Default)]
pub struct EngineServices {
    names: NamePool,
    objects: RwLock<ObjectTable>,
}

impl EngineServices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the name pool
    pub fn names(&self) -> &NamePool {
        &self.names
    }

    /// Lock the object table for reading
    pub fn objects(&self) -> RwLockReadGuard<'_, ObjectTable> {
        self.objects.read()
    }

    /// Lock the object table for writing
    pub fn objects_mut(&self) -> RwLockWriteGuard<'_, ObjectTable> {
        self.objects.write()
    }

    /// Check if a handle refers to a live object
    pub fn is_alive(&self, handle: ObjectHandle) -> bool {
        self.objects.read().is_alive(handle)
    }

    /// Get an object's path
    pub fn path_of(&self, handle: ObjectHandle) -> Option<String> {
        self.objects.read().path_of(handle).map(str::to_string)
    }

    /// Resolve an object path to a live handle
    pub fn resolve_path(&self, path: &str) -> Option<ObjectHandle> {
        self.objects.read().find_by_path(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_services_round_trip() {
        let services = EngineServices::new();
        let class = services.names().intern("Actor").unwrap();
        let handle = services.objects_mut().create("/Game/A", class).unwrap();

        assert!(services.is_alive(handle));
        assert_eq!(services.path_of(handle).as_deref(), Some("/Game/A"));
        assert_eq!(services.resolve_path("/Game/A"), Some(handle));
    }
}
