//! Interned name pool
//!
//! Names are case-insensitive and interned once. The spelling used on first
//! registration is the one returned by [`NamePool::resolve`].
//!
//! `""` and `"None"` (any case) always map to [`NameId::NONE`].

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use propsys_sdk::NameId;

use crate::error::EngineError;

/// Maximum length of a single name, in characters
pub const MAX_NAME_LEN: usize = 1023;

/// Spelling stored for [`NameId::NONE`]
const NONE_NAME: &str = "None";

/// Case-insensitive string interner
pub struct NamePool {
    /// Lowercased name -> id
    lookup: DashMap<String, NameId>,
    /// Id -> display spelling, slot 0 is `None`
    entries: RwLock<Vec<Arc<str>>>,
}

impl NamePool {
    pub fn new() -> Self {
        Self {
            lookup: DashMap::new(),
            entries: RwLock::new(vec![Arc::from(NONE_NAME)]),
        }
    }

    /// Intern a name, returning its id
    ///
    /// # Errors
    /// Returns [`EngineError::NameTooLong`] for names over [`MAX_NAME_LEN`] characters.
    pub fn intern(&self, name: &str) -> Result<NameId, EngineError> {
        if is_none_name(name) {
            return Ok(NameId::NONE);
        }

        let len = name.chars().count();
        if len > MAX_NAME_LEN {
            return Err(EngineError::NameTooLong {
                len,
                max: MAX_NAME_LEN,
            });
        }

        let key = name.to_lowercase();
        if let Some(id) = self.lookup.get(&key) {
            return Ok(*id);
        }

        let id = *self.lookup.entry(key).or_insert_with(|| {
            let mut entries = self.entries.write();
            entries.push(Arc::from(name));
            NameId((entries.len() - 1) as u32)
        });

        tracing::trace!("Interned name '{}' as {:?}", name, id);
        Ok(id)
    }

    /// Look up a name without interning it
    pub fn find(&self, name: &str) -> Option<NameId> {
        if is_none_name(name) {
            return Some(NameId::NONE);
        }
        self.lookup.get(&name.to_lowercase()).map(|id| *id)
    }

    /// Get the display spelling of an id
    pub fn resolve(&self, id: NameId) -> Option<Arc<str>> {
        self.entries.read().get(id.index() as usize).cloned()
    }

    /// Get the display spelling, or `None` for unknown ids
    pub fn to_string(&self, id: NameId) -> String {
        self.resolve(id)
            .map(|s| s.to_string())
            .unwrap_or_else(|| NONE_NAME.to_string())
    }

    /// Number of interned names, including `None`
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        // `None` is always present
        false
    }
}

impl Default for NamePool {
    fn default() -> Self {
        Self::new()
    }
}

fn is_none_name(name: &str) -> bool {
    name.is_empty() || name.eq_ignore_ascii_case(NONE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_case_insensitive() {
        let pool = NamePool::new();
        let a = pool.intern("Health").unwrap();
        let b = pool.intern("HEALTH").unwrap();
        assert_eq!(a, b);
        assert_eq!(&*pool.resolve(a).unwrap(), "Health");
    }

    #[test]
    fn test_none_name() {
        let pool = NamePool::new();
        assert_eq!(pool.intern("").unwrap(), NameId::NONE);
        assert_eq!(pool.intern("none").unwrap(), NameId::NONE);
        assert_eq!(pool.to_string(NameId::NONE), "None");
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_find_does_not_intern() {
        let pool = NamePool::new();
        assert_eq!(pool.find("Missing"), None);
        assert_eq!(pool.len(), 1);
        let id = pool.intern("Missing").unwrap();
        assert_eq!(pool.find("missing"), Some(id));
    }

    #[test]
    fn test_name_too_long() {
        let pool = NamePool::new();
        let long = "x".repeat(MAX_NAME_LEN + 1);
        assert!(matches!(
            pool.intern(&long),
            Err(EngineError::NameTooLong { .. })
        ));
    }

    #[test]
    fn test_unknown_id_resolves_to_none() {
        let pool = NamePool::new();
        assert!(pool.resolve(NameId(99)).is_none());
        assert_eq!(pool.to_string(NameId(99)), "None");
    }
}
