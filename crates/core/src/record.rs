//! Record types and owned record values
//!
//! A [`RecordType`] is the descriptor list of a struct or class: its fields
//! laid out by the layout engine, inherited fields first. Record-wide
//! operations (copy, compare, hash, text, binary) apply the field operations
//! in declaration order at each field's offset.
//!
//! ```text
//! RecordType "Door" (parent "Actor")
//!   ├─ Actor fields   offsets 0 .. parent size
//!   └─ Door fields    offsets parent size ..
//! ```
//!
//! [`RecordValue`] owns one initialized instance and destroys it on drop.

use std::fmt;
use std::sync::Arc;

use crate::codec::{ArchiveReader, ArchiveWriter, PortContext, TextCursor};
use crate::error::{ImportError, PropertyError, PropertyResult};
use crate::hash::hash_combine;
use crate::layout::{LayoutBuilder, LayoutError, RecordLayout};
use crate::memory::{ValueBuffer, ValueMut, ValueRef};
use crate::property::{NativeValue, Property, PropertyFlags};

/// Descriptor list and layout of one record type
pub struct RecordType {
    name: String,
    parent: Option<Arc<RecordType>>,
    properties: Vec<Property>,
    own_start: usize,
    layout: RecordLayout,
    flags: PropertyFlags,
    defaults: Option<ValueBuffer>,
}

impl RecordType {
    /// Lay out `fields` after the parent's fields
    ///
    /// Offsets are assigned here in declaration order. Single-bit booleans
    /// that follow each other share a host byte, and get their bit masks
    /// assigned as they are packed.
    ///
    /// # Arguments
    /// * `name` - Record type name
    /// * `parent` - Record type this one extends, if any
    /// * `fields` - The record's own fields
    ///
    /// # Errors
    /// Fails on an empty field name, on a name already used by another field
    /// (compared case-insensitively, inherited fields included) and when the
    /// layout overflows.
    pub fn new(
        name: impl Into<String>,
        parent: Option<Arc<RecordType>>,
        fields: Vec<Property>,
    ) -> Result<Self, LayoutError> {
        let mut builder = match &parent {
            Some(parent) => LayoutBuilder::extending(parent.layout)?,
            None => LayoutBuilder::new(),
        };

        let mut properties: Vec<Property> = parent
            .as_ref()
            .map(|p| p.properties.clone())
            .unwrap_or_default();
        let own_start = properties.len();

        for mut prop in fields {
            if prop.name().is_empty() {
                return Err(LayoutError::EmptyFieldName);
            }
            if properties
                .iter()
                .any(|p| p.name().eq_ignore_ascii_case(prop.name()))
            {
                return Err(LayoutError::DuplicateField(prop.name().to_string()));
            }
            if prop.is_packed_bit() {
                let slot = builder.place_bit()?;
                prop.set_offset(slot.offset);
                prop.set_bit_mask(slot.byte_mask);
            } else {
                let slot = builder.place_array(prop.element_size(), prop.alignment(), prop.array_dim())?;
                prop.set_offset(slot.offset);
            }
            properties.push(prop);
        }

        let layout = builder.finish()?;
        let flags = aggregate_flags(&properties);
        let name = name.into();
        tracing::trace!(
            "Laid out record '{}': {} fields, size {}, align {}",
            name,
            properties.len(),
            layout.size,
            layout.alignment
        );

        Ok(Self {
            name,
            parent,
            properties,
            own_start,
            layout,
            flags,
            defaults: None,
        })
    }

    /// Install the default value every new instance starts from
    ///
    /// A record with defaults is no longer zero-constructible.
    pub(crate) fn set_defaults(&mut self, defaults: ValueBuffer) {
        if let Some(mut old) = self.defaults.replace(defaults) {
            self.destroy(old.as_value_mut());
        }
        self.flags.remove(PropertyFlags::ZERO_CONSTRUCTIBLE);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<RecordType>> {
        self.parent.as_ref()
    }

    /// All fields, inherited ones first
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    /// Fields declared by this record itself
    pub fn own_properties(&self) -> &[Property] {
        &self.properties[self.own_start..]
    }

    /// Find a field by name, case-insensitively
    pub fn find_property(&self, name: &str) -> Option<&Property> {
        self.properties
            .iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
    }

    /// Find a field by name or fail with [`PropertyError::UnknownField`]
    pub fn property(&self, name: &str) -> PropertyResult<&Property> {
        self.find_property(name)
            .ok_or_else(|| PropertyError::UnknownField {
                record: self.name.clone(),
                field: name.to_string(),
            })
    }

    pub fn layout(&self) -> RecordLayout {
        self.layout
    }

    pub fn size(&self) -> usize {
        self.layout.size
    }

    pub fn alignment(&self) -> usize {
        self.layout.alignment
    }

    pub fn flags(&self) -> PropertyFlags {
        self.flags
    }

    /// Default value template, if any field declared a default
    pub fn defaults(&self) -> Option<ValueRef<'_>> {
        self.defaults.as_ref().map(ValueBuffer::as_value)
    }

    /// Check if this record is `other` or extends it
    pub fn is_child_of(&self, other: &RecordType) -> bool {
        let mut current = Some(self);
        while let Some(record) = current {
            if std::ptr::eq(record, other) || record.name.eq_ignore_ascii_case(&other.name) {
                return true;
            }
            current = record.parent.as_deref();
        }
        false
    }

    /// Whether every field can be hashed
    pub fn is_hashable(&self) -> bool {
        !self.properties.is_empty() && self.properties.iter().all(Property::is_hashable)
    }

    fn field<'a>(&self, prop: &Property, value: ValueRef<'a>) -> ValueRef<'a> {
        prop.field_value(value)
            .unwrap_or_else(|e| panic!("record '{}': {}", self.name, e))
    }

    fn field_mut<'a>(&self, prop: &Property, value: &'a mut ValueMut<'_>) -> ValueMut<'a> {
        prop.field_value_mut(value.reborrow())
            .unwrap_or_else(|e| panic!("record '{}': {}", self.name, e))
    }

    // ========================================================================
    // Value operations
    // ========================================================================

    /// Construct a value in zeroed memory, then apply the defaults
    pub fn initialize(&self, mut dest: ValueMut<'_>) {
        if self.flags.contains(PropertyFlags::ZERO_CONSTRUCTIBLE) {
            dest.fill_zero();
            return;
        }
        for prop in &self.properties {
            prop.initialize(self.field_mut(prop, &mut dest));
        }
        if let Some(defaults) = &self.defaults {
            self.copy(dest, defaults.as_value());
        }
    }

    /// Release everything the value owns
    pub fn destroy(&self, mut dest: ValueMut<'_>) {
        if self.flags.contains(PropertyFlags::NO_DESTRUCTOR) {
            return;
        }
        for prop in &self.properties {
            prop.destroy(self.field_mut(prop, &mut dest));
        }
    }

    /// Assign `src` over `dest`, field by field unless trivially copyable
    pub fn copy(&self, mut dest: ValueMut<'_>, src: ValueRef<'_>) {
        if self.flags.contains(PropertyFlags::TRIVIALLY_COPYABLE) {
            dest.copy_bytes_from(src);
            return;
        }
        for prop in &self.properties {
            prop.copy_complete(self.field_mut(prop, &mut dest), self.field(prop, src));
        }
    }

    pub fn identical(&self, a: ValueRef<'_>, b: ValueRef<'_>) -> bool {
        self.properties
            .iter()
            .all(|prop| prop.identical(self.field(prop, a), self.field(prop, b)))
    }

    /// Combined hash of every field element, `None` if any is unhashable
    pub fn hash(&self, value: ValueRef<'_>) -> Option<u32> {
        if !self.is_hashable() {
            return None;
        }
        let mut hash = 0;
        for prop in &self.properties {
            for index in 0..prop.array_dim() {
                let element = prop.container_value(value, index).ok()?;
                hash = hash_combine(hash, prop.hash(element).ok()?);
            }
        }
        Some(hash)
    }

    // ========================================================================
    // Text form: (Field=Value,Array[1]=Value,...)
    // ========================================================================

    pub fn export_text(&self, value: ValueRef<'_>, out: &mut String, cx: &PortContext<'_>) {
        let inner = cx.delimited();
        out.push('(');
        let mut first = true;
        for prop in &self.properties {
            for index in 0..prop.array_dim() {
                if !first {
                    out.push(',');
                }
                first = false;
                out.push_str(prop.name());
                if prop.array_dim() > 1 {
                    out.push_str(&format!("[{}]", index));
                }
                out.push('=');
                match prop.container_value(value, index) {
                    Ok(element) => out.push_str(&prop.export_text(element, &inner)),
                    Err(e) => panic!("record '{}': {}", self.name, e),
                }
            }
        }
        out.push(')');
    }

    /// Parse the parenthesized text form
    ///
    /// Fields may appear in any order; fields not mentioned keep their value.
    pub fn import_text(
        &self,
        mut dest: ValueMut<'_>,
        cursor: &mut TextCursor<'_>,
        cx: &PortContext<'_>,
    ) -> Result<(), ImportError> {
        let inner = cx.delimited();
        cursor.expect('(')?;
        if cursor.eat(')') {
            return Ok(());
        }
        loop {
            cursor.skip_whitespace();
            let start = cursor.position();
            let key = cursor.read_token()?;
            let (name, index) = split_index(key)
                .ok_or_else(|| ImportError::new(start, format!("malformed field key '{}'", key)))?;
            let prop = self.find_property(name).ok_or_else(|| {
                ImportError::new(start, format!("'{}' has no field '{}'", self.name, name))
            })?;
            cursor.expect('=')?;

            let element = prop
                .container_value_mut(dest.reborrow(), index)
                .map_err(|e| ImportError::new(start, e.to_string()))?;
            prop.import_item(element, cursor, &inner)?;

            if cursor.eat(')') {
                return Ok(());
            }
            cursor.expect(',')?;
        }
    }

    // ========================================================================
    // Binary form: every field element in declaration order
    // ========================================================================

    pub fn serialize(
        &self,
        value: ValueRef<'_>,
        ar: &mut ArchiveWriter,
        cx: &PortContext<'_>,
    ) -> PropertyResult<()> {
        for prop in &self.properties {
            for index in 0..prop.array_dim() {
                prop.serialize_item(prop.container_value(value, index)?, ar, cx)?;
            }
        }
        Ok(())
    }

    pub fn deserialize(
        &self,
        mut dest: ValueMut<'_>,
        ar: &mut ArchiveReader<'_>,
        cx: &PortContext<'_>,
    ) -> PropertyResult<()> {
        for prop in &self.properties {
            for index in 0..prop.array_dim() {
                let element = prop.container_value_mut(dest.reborrow(), index)?;
                prop.deserialize_item(element, ar, cx)?;
            }
        }
        Ok(())
    }
}

/// Split `Name[3]` into the name and index, `Name` giving index 0
pub(crate) fn split_index(key: &str) -> Option<(&str, usize)> {
    match key.split_once('[') {
        Some((name, rest)) => {
            let index = rest.strip_suffix(']')?.trim().parse().ok()?;
            Some((name, index))
        }
        None => Some((key, 0)),
    }
}

fn aggregate_flags(properties: &[Property]) -> PropertyFlags {
    let mut flags = PropertyFlags::POD;
    for prop in properties {
        // Packed bits are masked per field, but the whole record copies bytewise
        let own = if prop.is_packed_bit() {
            PropertyFlags::POD
        } else {
            prop.flags()
        };
        flags &= own | PropertyFlags::REFERENCES;
        flags |= own & PropertyFlags::REFERENCES;
    }
    flags
}

impl Drop for RecordType {
    fn drop(&mut self) {
        if let Some(mut defaults) = self.defaults.take() {
            self.destroy(defaults.as_value_mut());
        }
    }
}

impl fmt::Debug for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordType")
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| p.name()))
            .field("fields", &self.properties.len())
            .field("size", &self.layout.size)
            .field("alignment", &self.layout.alignment)
            .field("flags", &self.flags)
            .finish()
    }
}

/// An owned, initialized record instance
pub struct RecordValue {
    record: Arc<RecordType>,
    buffer: ValueBuffer,
}

impl RecordValue {
    /// Allocate and initialize a new instance, defaults applied
    pub fn new(record: Arc<RecordType>) -> PropertyResult<Self> {
        let mut buffer = ValueBuffer::zeroed(record.size(), record.alignment())?;
        record.initialize(buffer.as_value_mut());
        Ok(Self { record, buffer })
    }

    /// Deep copy into a fresh instance
    pub fn try_clone(&self) -> PropertyResult<Self> {
        let mut copy = Self::new(Arc::clone(&self.record))?;
        self.record.copy(copy.buffer.as_value_mut(), self.buffer.as_value());
        Ok(copy)
    }

    pub fn record(&self) -> &Arc<RecordType> {
        &self.record
    }

    pub fn as_value(&self) -> ValueRef<'_> {
        self.buffer.as_value()
    }

    pub fn as_value_mut(&mut self) -> ValueMut<'_> {
        self.buffer.as_value_mut()
    }

    /// Read element `index` of a field by name
    pub fn get<T: NativeValue>(&self, field: &str, index: usize) -> PropertyResult<T> {
        self.record.property(field)?.get(self.buffer.as_value(), index)
    }

    /// Write element `index` of a field by name
    pub fn set<T: NativeValue>(&mut self, field: &str, index: usize, value: T) -> PropertyResult<()> {
        self.record
            .property(field)?
            .set(self.buffer.as_value_mut(), index, value)
    }

    /// Text form of element `index` of a field
    pub fn export_field(&self, field: &str, index: usize, cx: &PortContext<'_>) -> PropertyResult<String> {
        self.record
            .property(field)?
            .export_text_in_container(self.buffer.as_value(), index, cx)
    }

    /// Parse `text` into element `index` of a field
    pub fn import_field(
        &mut self,
        field: &str,
        index: usize,
        text: &str,
        cx: &PortContext<'_>,
    ) -> PropertyResult<()> {
        self.record
            .property(field)?
            .import_text_in_container(text, self.buffer.as_value_mut(), index, cx)
    }

    /// Text form of the whole record
    pub fn export_text(&self, cx: &PortContext<'_>) -> String {
        let mut out = String::new();
        self.record.export_text(self.buffer.as_value(), &mut out, cx);
        out
    }

    /// Parse the whole-record text form
    pub fn import_text(&mut self, text: &str, cx: &PortContext<'_>) -> PropertyResult<()> {
        let mut cursor = TextCursor::new(text);
        self.record
            .import_text(self.buffer.as_value_mut(), &mut cursor, cx)?;
        cursor.finish()?;
        Ok(())
    }

    pub fn identical(&self, other: &RecordValue) -> bool {
        Arc::ptr_eq(&self.record, &other.record)
            && self.record.identical(self.as_value(), other.as_value())
    }
}

impl Drop for RecordValue {
    fn drop(&mut self) {
        self.record.destroy(self.buffer.as_value_mut());
    }
}

impl fmt::Debug for RecordValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordValue")
            .field("record", &self.record.name())
            .field("buffer", &self.buffer)
            .finish()
    }
}
