//! Declarative type descriptions
//!
//! A [`RecordDecl`] names a record's fields by [`FieldType`] rather than by
//! built descriptors, so it can be written by hand, by [`RecordBuilder`], or
//! read from a JSON schema file:
//!
//! ```json
//! { "name": "Actor", "parent": "Base", "fields": [
//!     { "name": "hp", "type": { "kind": "int32" }, "array_dim": 2, "default": "100" },
//!     { "name": "tags", "type": { "kind": "set", "element": { "kind": "str" } },
//!       "flags": ["config"] }
//! ] }
//! ```

use serde::{Deserialize, Serialize};

fn default_enum_size() -> usize {
    1
}

fn default_array_dim() -> usize {
    1
}

/// Type of a declared field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldType {
    Int8,
    Int16,
    Int32,
    Int64,
    #[serde(rename = "uint8")]
    UInt8,
    #[serde(rename = "uint16")]
    UInt16,
    #[serde(rename = "uint32")]
    UInt32,
    #[serde(rename = "uint64")]
    UInt64,
    Float,
    Double,
    Bool,
    /// Single-bit boolean, packed with adjacent bitfields
    Bitfield,
    Name,
    Str,
    Enum {
        name: String,
        #[serde(default = "default_enum_size")]
        size: usize,
    },
    Object {
        #[serde(default)]
        class: Option<String>,
    },
    WeakObject {
        #[serde(default)]
        class: Option<String>,
    },
    LazyObject {
        #[serde(default)]
        class: Option<String>,
    },
    SoftObject {
        #[serde(default)]
        class: Option<String>,
    },
    Interface {
        #[serde(default)]
        interface: Option<String>,
    },
    Struct {
        name: String,
    },
    Array {
        inner: Box<FieldType>,
    },
    Set {
        element: Box<FieldType>,
    },
    Map {
        key: Box<FieldType>,
        value: Box<FieldType>,
    },
    Delegate {
        #[serde(default)]
        signature: Option<String>,
    },
    MulticastDelegate {
        #[serde(default)]
        signature: Option<String>,
    },
}

impl FieldType {
    pub fn array(inner: FieldType) -> Self {
        Self::Array {
            inner: Box::new(inner),
        }
    }

    pub fn set(element: FieldType) -> Self {
        Self::Set {
            element: Box::new(element),
        }
    }

    pub fn map(key: FieldType, value: FieldType) -> Self {
        Self::Map {
            key: Box::new(key),
            value: Box::new(value),
        }
    }

    pub fn structure(name: impl Into<String>) -> Self {
        Self::Struct { name: name.into() }
    }

    pub fn enumeration(name: impl Into<String>, size: usize) -> Self {
        Self::Enum {
            name: name.into(),
            size,
        }
    }

    /// Record types this type embeds by value, at any depth
    pub fn struct_dependencies<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Struct { name } => out.push(name),
            Self::Array { inner } => inner.struct_dependencies(out),
            Self::Set { element } => element.struct_dependencies(out),
            Self::Map { key, value } => {
                key.struct_dependencies(out);
                value.struct_dependencies(out);
            }
            _ => {}
        }
    }

    /// Enum types this type refers to, at any depth
    pub fn enum_dependencies<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Enum { name, .. } => out.push(name),
            Self::Array { inner } => inner.enum_dependencies(out),
            Self::Set { element } => element.enum_dependencies(out),
            Self::Map { key, value } => {
                key.enum_dependencies(out);
                value.enum_dependencies(out);
            }
            _ => {}
        }
    }
}

/// One declared field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: FieldType,
    /// Static array dimension, 1 for a plain field
    #[serde(default = "default_array_dim")]
    pub array_dim: usize,
    /// Declared flag names, e.g. `"config"` or `"transient"`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
    /// Text form of the initial value, applied to every element
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl FieldDecl {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            array_dim: 1,
            flags: Vec::new(),
            default: None,
        }
    }
}

/// A record type declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDecl {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
}

impl RecordDecl {
    /// Record types that must be registered before this one
    pub fn dependencies(&self) -> Vec<&str> {
        let mut deps: Vec<&str> = self.parent.as_deref().into_iter().collect();
        for field in &self.fields {
            field.ty.struct_dependencies(&mut deps);
        }
        deps
    }
}

/// One enum entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumEntryDecl {
    pub name: String,
    pub value: i64,
}

/// An enumeration declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumDecl {
    pub name: String,
    pub entries: Vec<EnumEntryDecl>,
}

impl EnumDecl {
    /// Entries numbered from 0 in the given order
    pub fn sequential<S: Into<String>>(name: impl Into<String>, entries: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            entries: entries
                .into_iter()
                .enumerate()
                .map(|(i, entry)| EnumEntryDecl {
                    name: entry.into(),
                    value: i as i64,
                })
                .collect(),
        }
    }
}

/// Fluent construction of a [`RecordDecl`]
///
/// # Example
///
/// ```ignore
/// let decl = RecordBuilder::new("Actor")
///     .field("id", FieldType::Int32)
///     .array("hp", FieldType::Int32, 2)
///     .with_default("100")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    decl: RecordDecl,
}

impl RecordBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            decl: RecordDecl {
                name: name.into(),
                parent: None,
                fields: Vec::new(),
            },
        }
    }

    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.decl.parent = Some(parent.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.decl.fields.push(FieldDecl::new(name, ty));
        self
    }

    /// Add a static array field of `dim` elements
    pub fn array(mut self, name: impl Into<String>, ty: FieldType, dim: usize) -> Self {
        let mut field = FieldDecl::new(name, ty);
        field.array_dim = dim;
        self.decl.fields.push(field);
        self
    }

    /// Add a declared flag to the last field
    ///
    /// # Panics
    /// Panics if no field was added yet.
    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.last_field().flags.push(flag.into());
        self
    }

    /// Set the default text of the last field
    ///
    /// # Panics
    /// Panics if no field was added yet.
    pub fn with_default(mut self, text: impl Into<String>) -> Self {
        self.last_field().default = Some(text.into());
        self
    }

    pub fn build(self) -> RecordDecl {
        self.decl
    }

    fn last_field(&mut self) -> &mut FieldDecl {
        let name = &self.decl.name;
        self.decl
            .fields
            .last_mut()
            .unwrap_or_else(|| panic!("RecordBuilder '{}': no field to modify", name))
    }
}
