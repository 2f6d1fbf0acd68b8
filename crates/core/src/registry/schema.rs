//! JSON schema documents
//!
//! A schema lists enums and records in any order:
//!
//! ```json
//! {
//!   "enums":   [ { "name": "Team", "entries": [ { "name": "Red", "value": 1 } ] } ],
//!   "records": [ { "name": "Actor", "parent": "Base", "fields": [ ... ] },
//!                { "name": "Base", "fields": [ ... ] } ]
//! }
//! ```
//!
//! Records are registered in dependency order, so a record may name a parent
//! or struct declared later in the same document.

use std::path::Path;
use std::sync::Arc;

use propsys_engine::EngineServices;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::record::RecordType;

use super::{EnumDecl, RecordDecl, RegistryResult, TypeRegistry};

/// A set of type declarations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDocument {
    #[serde(default)]
    pub enums: Vec<EnumDecl>,
    #[serde(default)]
    pub records: Vec<RecordDecl>,
}

impl SchemaDocument {
    pub fn from_json(json: &str) -> RegistryResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> RegistryResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let doc = Self::from_json(&content)?;
        debug!("Read schema from {:?}", path);
        Ok(doc)
    }

    pub fn to_json(&self) -> RegistryResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl TypeRegistry {
    /// Register every type in a schema document
    ///
    /// Enums go first, then records in passes: each pass registers the
    /// records whose dependencies are all available. Returns the records in
    /// the order they were registered.
    ///
    /// # Errors
    /// Stops at the first failing declaration. Types registered before the
    /// failure stay registered. A record whose dependencies never become
    /// available fails with [`super::RegistryError::UnknownType`].
    pub fn register_schema(
        &self,
        doc: SchemaDocument,
        services: &EngineServices,
    ) -> RegistryResult<Vec<Arc<RecordType>>> {
        for decl in doc.enums {
            self.register_enum(decl)?;
        }

        let mut pending = doc.records;
        let mut registered = Vec::with_capacity(pending.len());
        while !pending.is_empty() {
            let (ready, waiting): (Vec<_>, Vec<_>) = pending.into_iter().partition(|decl| {
                decl.dependencies()
                    .iter()
                    .all(|dep| self.contains_record(dep))
            });

            if ready.is_empty() {
                // No progress: registering the first one reports what it lacks
                let mut waiting = waiting;
                let first = waiting.remove(0);
                self.register_record(first, services)?;
                pending = waiting;
                continue;
            }

            for decl in ready {
                registered.push(self.register_record(decl, services)?);
            }
            pending = waiting;
        }

        info!(
            "Registered schema: {} records, {} enums in registry",
            self.record_count(),
            self.enum_count()
        );
        Ok(registered)
    }

    /// Parse and register a JSON schema
    pub fn load_schema_json(
        &self,
        json: &str,
        services: &EngineServices,
    ) -> RegistryResult<Vec<Arc<RecordType>>> {
        self.register_schema(SchemaDocument::from_json(json)?, services)
    }

    /// Read, parse and register a JSON schema file
    pub fn load_schema_file(
        &self,
        path: &Path,
        services: &EngineServices,
    ) -> RegistryResult<Vec<Arc<RecordType>>> {
        self.register_schema(SchemaDocument::from_file(path)?, services)
    }
}

#[cfg(test)]
mod tests {
    use super::super::RegistryError;
    use super::*;
    use crate::codec::PortContext;

    const SCHEMA: &str = r#"{
        "enums": [
            { "name": "Team", "entries": [
                { "name": "Spectator", "value": 0 },
                { "name": "Red", "value": 2 },
                { "name": "Blue", "value": 3 } ] }
        ],
        "records": [
            { "name": "Player", "parent": "Actor", "fields": [
                { "name": "team", "type": { "kind": "enum", "name": "Team" }, "default": "Red" },
                { "name": "loadout", "type": { "kind": "map",
                    "key": { "kind": "name" }, "value": { "kind": "int32" } } }
            ] },
            { "name": "Actor", "fields": [
                { "name": "origin", "type": { "kind": "struct", "name": "Vec3" } },
                { "name": "owner", "type": { "kind": "weak_object", "class": "Controller" } }
            ] },
            { "name": "Vec3", "fields": [
                { "name": "x", "type": { "kind": "float" } },
                { "name": "y", "type": { "kind": "float" } },
                { "name": "z", "type": { "kind": "float" } }
            ] }
        ]
    }"#;

    #[test]
    fn test_registers_in_dependency_order() {
        let services = EngineServices::new();
        let cx = PortContext::new(&services);
        let registry = TypeRegistry::new();

        let records = registry.load_schema_json(SCHEMA, &services).unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.name()).collect();
        assert_eq!(names, ["Vec3", "Actor", "Player"]);
        assert_eq!(registry.record_names(), ["Actor", "Player", "Vec3"]);

        let player = registry.instantiate("Player").unwrap();
        assert_eq!(player.export_field("team", 0, &cx).unwrap(), "Red");
        assert!(services.names().find("Controller").is_some());
    }

    #[test]
    fn test_unresolvable_dependency() {
        let services = EngineServices::new();
        let registry = TypeRegistry::new();
        let json = r#"{ "records": [
            { "name": "Ok", "fields": [] },
            { "name": "Orphan", "parent": "Missing" }
        ] }"#;

        let err = registry.load_schema_json(json, &services).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownType(name) if name == "Missing"));
        assert!(registry.contains_record("Ok"));
    }

    #[test]
    fn test_malformed_json() {
        let services = EngineServices::new();
        let registry = TypeRegistry::new();
        let err = registry
            .load_schema_json(r#"{ "records": [ { "fields": [] } ] }"#, &services)
            .unwrap_err();
        assert!(matches!(err, RegistryError::Json(_)));
    }

    #[test]
    fn test_document_round_trip() {
        let doc = SchemaDocument::from_json(SCHEMA).unwrap();
        let again = SchemaDocument::from_json(&doc.to_json().unwrap()).unwrap();
        assert_eq!(doc, again);
    }
}
