//! Type registry
//!
//! Builds [`RecordType`]s and [`EnumType`]s from declarations and keeps them
//! by name for the lifetime of the registry. Names are matched
//! case-insensitively.
//!
//! The registry is an ordinary value: create one, register types into it and
//! pass it to whoever needs lookups. It is safe to share between threads.
//!
//! # Example
//!
//! ```ignore
//! let services = EngineServices::new();
//! let registry = TypeRegistry::new();
//!
//! registry.register_record(
//!     RecordBuilder::new("Vec2")
//!         .field("x", FieldType::Float)
//!         .field("y", FieldType::Float)
//!         .build(),
//!     &services,
//! )?;
//! let mut origin = registry.instantiate("vec2")?;
//! ```

mod decl;
mod schema;

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use propsys_engine::{EngineError, EngineServices};
use propsys_sdk::NameId;
use tracing::{debug, trace};

use crate::codec::PortContext;
use crate::containers::{ArrayProperty, MapProperty, SetProperty};
use crate::error::PropertyError;
use crate::layout::LayoutError;
use crate::memory::ValueBuffer;
use crate::property::{
    BoolProperty, DelegateProperty, EnumProperty, EnumType, InterfaceProperty,
    MulticastDelegateProperty, NameProperty, NumericProperty, ObjectFlavor, ObjectProperty,
    Property, PropertyFlags, PropertyKind, StrProperty, StructProperty,
};
use crate::record::{RecordType, RecordValue};

pub use decl::{EnumDecl, EnumEntryDecl, FieldDecl, FieldType, RecordBuilder, RecordDecl};
pub use schema::SchemaDocument;

/// Error type for registry operations
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Type already registered: {0}")]
    DuplicateType(String),

    #[error("Unknown record type: {0}")]
    UnknownType(String),

    #[error("Unknown enum type: {0}")]
    UnknownEnum(String),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error("Invalid field {record}.{field}: {reason}")]
    InvalidField {
        record: String,
        field: String,
        reason: String,
    },

    #[error("Invalid default for {record}.{field}: {source}")]
    InvalidDefault {
        record: String,
        field: String,
        #[source]
        source: PropertyError,
    },

    /// A set element or map key kind has no hash
    #[error("Field {record}.{field}: {kind} values cannot be hashed")]
    Unhashable {
        record: String,
        field: String,
        kind: &'static str,
    },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Property(#[from] PropertyError),

    #[error("Failed to read schema file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse schema: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Registered record and enum types
#[derive(Debug, Default)]
pub struct TypeRegistry {
    records: DashMap<String, Arc<RecordType>>,
    enums: DashMap<String, Arc<EnumType>>,
}

fn key_of(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// Field being built, for error context
struct FieldSite<'d> {
    record: &'d str,
    field: &'d str,
}

impl FieldSite<'_> {
    fn invalid(&self, reason: impl Into<String>) -> RegistryError {
        RegistryError::InvalidField {
            record: self.record.to_string(),
            field: self.field.to_string(),
            reason: reason.into(),
        }
    }

    fn unhashable(&self, err: PropertyError) -> RegistryError {
        match err {
            PropertyError::Unhashable(kind) => RegistryError::Unhashable {
                record: self.record.to_string(),
                field: self.field.to_string(),
                kind,
            },
            other => other.into(),
        }
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register an enumeration
    ///
    /// # Errors
    /// Returns [`RegistryError::DuplicateType`] if an enum of that name exists.
    pub fn register_enum(&self, decl: EnumDecl) -> RegistryResult<Arc<EnumType>> {
        let entries = decl
            .entries
            .into_iter()
            .map(|entry| (entry.name, entry.value))
            .collect();
        let enum_type = Arc::new(EnumType::new(decl.name, entries));

        match self.enums.entry(key_of(enum_type.name())) {
            Entry::Occupied(_) => Err(RegistryError::DuplicateType(enum_type.name().to_string())),
            Entry::Vacant(slot) => {
                debug!(
                    "Registered enum '{}' ({} entries)",
                    enum_type.name(),
                    enum_type.entries().len()
                );
                slot.insert(Arc::clone(&enum_type));
                Ok(enum_type)
            }
        }
    }

    /// Build and register a record type
    ///
    /// The parent, and every struct and enum the fields name, must already
    /// be registered. Declared defaults are parsed into a template value that
    /// every new instance is copied from.
    ///
    /// # Arguments
    /// * `decl` - The record declaration
    /// * `services` - Name pool for class names, and context for default text
    ///
    /// # Errors
    /// Returns an error if the name is taken, a referenced type is missing,
    /// a field is malformed, the layout overflows, or a default does not parse.
    pub fn register_record(
        &self,
        decl: RecordDecl,
        services: &EngineServices,
    ) -> RegistryResult<Arc<RecordType>> {
        if self.records.contains_key(&key_of(&decl.name)) {
            return Err(RegistryError::DuplicateType(decl.name));
        }

        let parent = decl
            .parent
            .as_deref()
            .map(|name| self.record(name))
            .transpose()?;

        let mut fields = Vec::with_capacity(decl.fields.len());
        for field in &decl.fields {
            let site = FieldSite {
                record: &decl.name,
                field: &field.name,
            };
            fields.push(self.build_field(field, &site, services)?);
        }

        let mut record =
            RecordType::new(decl.name.as_str(), parent, fields).map_err(|e| match e {
                LayoutError::DuplicateField(field) => RegistryError::InvalidField {
                    record: decl.name.clone(),
                    field,
                    reason: "name is already used by another field".to_string(),
                },
                e => e.into(),
            })?;
        self.install_defaults(&mut record, &decl, services)?;

        let record = Arc::new(record);
        match self.records.entry(key_of(&decl.name)) {
            Entry::Occupied(_) => Err(RegistryError::DuplicateType(decl.name)),
            Entry::Vacant(slot) => {
                debug!(
                    "Registered record '{}' ({} fields, {} bytes)",
                    record.name(),
                    record.properties().len(),
                    record.size()
                );
                slot.insert(Arc::clone(&record));
                Ok(record)
            }
        }
    }

    fn build_field(
        &self,
        field: &FieldDecl,
        site: &FieldSite<'_>,
        services: &EngineServices,
    ) -> RegistryResult<Property> {
        if field.array_dim == 0 {
            return Err(site.invalid("array dimension must be at least 1"));
        }

        let mut flags = PropertyFlags::empty();
        for name in &field.flags {
            let flag = PropertyFlags::parse_declared(name)
                .ok_or_else(|| site.invalid(format!("unknown flag '{}'", name)))?;
            flags |= flag;
        }

        let kind = self.build_kind(&field.ty, &field.name, site, services)?;
        if field.array_dim > 1 && matches!(field.ty, FieldType::Bitfield) {
            return Err(site.invalid("bitfields cannot be static arrays"));
        }

        Ok(Property::new(field.name.as_str(), kind)
            .with_array_dim(field.array_dim)
            .with_flags(flags))
    }

    fn build_kind(
        &self,
        ty: &FieldType,
        name: &str,
        site: &FieldSite<'_>,
        services: &EngineServices,
    ) -> RegistryResult<PropertyKind> {
        let intern = |name: &Option<String>| -> RegistryResult<Option<NameId>> {
            name.as_deref()
                .map(|n| services.names().intern(n))
                .transpose()
                .map_err(RegistryError::from)
        };
        let object = |flavor, class: &Option<String>| -> RegistryResult<PropertyKind> {
            Ok(PropertyKind::Object(ObjectProperty::new(flavor, intern(class)?)))
        };

        let kind = match ty {
            FieldType::Int8 => PropertyKind::Int8(NumericProperty::new()),
            FieldType::Int16 => PropertyKind::Int16(NumericProperty::new()),
            FieldType::Int32 => PropertyKind::Int32(NumericProperty::new()),
            FieldType::Int64 => PropertyKind::Int64(NumericProperty::new()),
            FieldType::UInt8 => PropertyKind::UInt8(NumericProperty::new()),
            FieldType::UInt16 => PropertyKind::UInt16(NumericProperty::new()),
            FieldType::UInt32 => PropertyKind::UInt32(NumericProperty::new()),
            FieldType::UInt64 => PropertyKind::UInt64(NumericProperty::new()),
            FieldType::Float => PropertyKind::Float(NumericProperty::new()),
            FieldType::Double => PropertyKind::Double(NumericProperty::new()),
            FieldType::Bool => PropertyKind::Bool(BoolProperty::native()),
            FieldType::Bitfield => PropertyKind::Bool(
                BoolProperty::bitfield(1, 0, 1).ok_or_else(|| site.invalid("bad bitfield"))?,
            ),
            FieldType::Name => PropertyKind::Name(NameProperty),
            FieldType::Str => PropertyKind::Str(StrProperty),
            FieldType::Enum { name, size } => {
                let enum_type = self
                    .find_enum(name)
                    .ok_or_else(|| RegistryError::UnknownEnum(name.clone()))?;
                PropertyKind::Enum(
                    EnumProperty::new(enum_type, *size)
                        .ok_or_else(|| site.invalid(format!("enum size {} is not 1, 2, 4 or 8", size)))?,
                )
            }
            FieldType::Object { class } => object(ObjectFlavor::Strong, class)?,
            FieldType::WeakObject { class } => object(ObjectFlavor::Weak, class)?,
            FieldType::LazyObject { class } => object(ObjectFlavor::Lazy, class)?,
            FieldType::SoftObject { class } => object(ObjectFlavor::Soft, class)?,
            FieldType::Interface { interface } => {
                PropertyKind::Interface(InterfaceProperty::new(intern(interface)?))
            }
            FieldType::Struct { name } => PropertyKind::Struct(StructProperty::new(self.record(name)?)),
            FieldType::Array { inner } => {
                let inner = self.build_element(inner, name, site, services)?;
                PropertyKind::Array(ArrayProperty::new(inner))
            }
            FieldType::Set { element } => {
                let element = self.build_element(element, name, site, services)?;
                PropertyKind::Set(SetProperty::new(element).map_err(|e| site.unhashable(e))?)
            }
            FieldType::Map { key, value } => {
                let key = self.build_element(key, &format!("{}_key", name), site, services)?;
                let value = self.build_element(value, &format!("{}_value", name), site, services)?;
                PropertyKind::Map(MapProperty::new(key, value).map_err(|e| site.unhashable(e))?)
            }
            FieldType::Delegate { signature } => {
                PropertyKind::Delegate(DelegateProperty::new(intern(signature)?))
            }
            FieldType::MulticastDelegate { signature } => {
                PropertyKind::MulticastDelegate(MulticastDelegateProperty::new(intern(signature)?))
            }
        };
        Ok(kind)
    }

    /// Container element descriptor; bitfields are not valid elements
    fn build_element(
        &self,
        ty: &FieldType,
        name: &str,
        site: &FieldSite<'_>,
        services: &EngineServices,
    ) -> RegistryResult<Property> {
        if matches!(ty, FieldType::Bitfield) {
            return Err(site.invalid("container elements cannot be bitfields"));
        }
        Ok(Property::new(name, self.build_kind(ty, name, site, services)?))
    }

    /// Build the default template from the parent's defaults and the
    /// declared default text of each field
    fn install_defaults(
        &self,
        record: &mut RecordType,
        decl: &RecordDecl,
        services: &EngineServices,
    ) -> RegistryResult<()> {
        let parent_defaults = record.parent().and_then(|p| p.defaults()).is_some();
        if !parent_defaults && decl.fields.iter().all(|f| f.default.is_none()) {
            return Ok(());
        }

        let cx = PortContext::new(services);
        let mut template = ValueBuffer::zeroed(record.size(), record.alignment())?;
        record.initialize(template.as_value_mut());

        if let Some(parent) = record.parent() {
            if let Some(defaults) = parent.defaults() {
                let mut value = template.as_value_mut();
                parent.copy(value.slice_mut(0, parent.size())?, defaults);
            }
        }

        for field in &decl.fields {
            let Some(text) = &field.default else {
                continue;
            };
            let prop = record.property(&field.name)?;
            for index in 0..prop.array_dim() {
                if let Err(source) = prop.import_text_in_container(text, template.as_value_mut(), index, &cx) {
                    record.destroy(template.as_value_mut());
                    return Err(RegistryError::InvalidDefault {
                        record: decl.name.clone(),
                        field: field.name.clone(),
                        source,
                    });
                }
            }
            trace!("Default {}.{} = {}", decl.name, field.name, text);
        }

        record.set_defaults(template);
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Look up a record type by name
    pub fn find_record(&self, name: &str) -> Option<Arc<RecordType>> {
        self.records.get(&key_of(name)).map(|r| Arc::clone(r.value()))
    }

    /// Look up a record type by name
    ///
    /// # Errors
    /// Returns [`RegistryError::UnknownType`] if no such record is registered.
    pub fn record(&self, name: &str) -> RegistryResult<Arc<RecordType>> {
        self.find_record(name)
            .ok_or_else(|| RegistryError::UnknownType(name.to_string()))
    }

    /// Look up an enum type by name
    pub fn find_enum(&self, name: &str) -> Option<Arc<EnumType>> {
        self.enums.get(&key_of(name)).map(|e| Arc::clone(e.value()))
    }

    pub fn contains_record(&self, name: &str) -> bool {
        self.records.contains_key(&key_of(name))
    }

    pub fn contains_enum(&self, name: &str) -> bool {
        self.enums.contains_key(&key_of(name))
    }

    /// Names of all registered record types, sorted
    pub fn record_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .records
            .iter()
            .map(|r| r.value().name().to_string())
            .collect();
        names.sort();
        names
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn enum_count(&self) -> usize {
        self.enums.len()
    }

    /// Create a new initialized instance of a record type
    pub fn instantiate(&self, name: &str) -> RegistryResult<RecordValue> {
        Ok(RecordValue::new(self.record(name)?)?)
    }
}
