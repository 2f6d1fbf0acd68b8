//! Property Descriptors - one per field of a record type
//!
//! A [`Property`] describes the shape of a field: its kind, element size,
//! alignment, offset inside the owning record, static array dimension and
//! flags. It never holds a value. Operations take views of the memory the
//! value lives in.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Property                                                     │
//! │   name, offset, array_dim, flags                             │
//! │   element-wise loops, static array handling, bounds checks   │
//! └───────────────────────────┬──────────────────────────────────┘
//!                             │ dispatch
//!                             ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │ PropertyKind (closed enum)  ──implements──▶  PropertyOps     │
//! │   Int8 .. Double, Bool, Name, Str, Enum, Object, Interface,  │
//! │   Struct, Array, Map, Set, Delegate, MulticastDelegate       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Kind operations always work on exactly one element. [`Property`] applies
//! them across `array_dim` elements and picks the fast path (byte copy,
//! zero fill) when the flags allow it.

pub mod boolean;
pub mod delegate;
pub mod enumeration;
pub mod flags;
pub mod numeric;
pub mod object;
pub mod structure;
pub mod text;

mod native;

pub use boolean::BoolProperty;
pub use delegate::{DelegateProperty, MulticastDelegateProperty};
pub use enumeration::{EnumProperty, EnumType};
pub use flags::PropertyFlags;
pub use native::NativeValue;
pub use numeric::{NumericAccess, NumericProperty, NumericType, NumericValue};
pub use object::{InterfaceProperty, ObjectFlavor, ObjectProperty, WeakState};
pub use structure::StructProperty;
pub use text::{NameProperty, StrProperty};

use crate::codec::{ArchiveReader, ArchiveWriter, PortContext, TextCursor};
use crate::containers::{ArrayProperty, MapProperty, SetProperty};
use crate::error::{ImportError, PropertyError, PropertyResult};
use crate::memory::{ValueMut, ValueRef};

/// Per-kind behavior, implemented once for every variant of [`PropertyKind`]
///
/// Every method works on a single element of exactly `value_layout().0`
/// bytes. Destinations always hold a valid value (zeroed bytes count).
pub trait PropertyOps {
    /// Kind name, also the leaf type string of tagged archives
    fn kind_name(&self) -> &'static str;

    /// Size and alignment of one value
    fn value_layout(&self) -> (usize, usize);

    /// Flags that follow from the kind
    fn intrinsic_flags(&self) -> PropertyFlags;

    /// Whether [`PropertyOps::hash_value`] is supported
    fn is_hashable(&self) -> bool {
        false
    }

    /// Value equality
    fn identical(&self, a: ValueRef<'_>, b: ValueRef<'_>) -> bool;

    /// Assign `src` over the existing value in `dest`
    fn copy_value(&self, mut dest: ValueMut<'_>, src: ValueRef<'_>) {
        dest.copy_bytes_from(src);
    }

    /// Construct a value in zeroed memory
    fn initialize_value(&self, mut dest: ValueMut<'_>) {
        dest.fill_zero();
    }

    /// Release the value, leaving zeroed memory
    fn destroy_value(&self, mut dest: ValueMut<'_>) {
        dest.fill_zero();
    }

    /// Hash for use as a set element or map key
    fn hash_value(&self, _value: ValueRef<'_>) -> Option<u32> {
        None
    }

    /// Append the text form of the value
    fn export_value(&self, value: ValueRef<'_>, out: &mut String, cx: &PortContext<'_>);

    /// Parse the text form into `dest`
    fn import_value(
        &self,
        dest: ValueMut<'_>,
        cursor: &mut TextCursor<'_>,
        cx: &PortContext<'_>,
    ) -> Result<(), ImportError>;

    /// Write the binary form
    fn serialize_value(
        &self,
        value: ValueRef<'_>,
        ar: &mut ArchiveWriter,
        cx: &PortContext<'_>,
    ) -> PropertyResult<()>;

    /// Read the binary form into `dest`
    fn deserialize_value(
        &self,
        dest: ValueMut<'_>,
        ar: &mut ArchiveReader<'_>,
        cx: &PortContext<'_>,
    ) -> PropertyResult<()>;
}

/// Closed set of property kinds
#[derive(Clone)]
pub enum PropertyKind {
    Int8(NumericProperty<i8>),
    Int16(NumericProperty<i16>),
    Int32(NumericProperty<i32>),
    Int64(NumericProperty<i64>),
    UInt8(NumericProperty<u8>),
    UInt16(NumericProperty<u16>),
    UInt32(NumericProperty<u32>),
    UInt64(NumericProperty<u64>),
    Float(NumericProperty<f32>),
    Double(NumericProperty<f64>),
    Bool(BoolProperty),
    Name(NameProperty),
    Str(StrProperty),
    Enum(EnumProperty),
    Object(ObjectProperty),
    Interface(InterfaceProperty),
    Struct(StructProperty),
    Array(ArrayProperty),
    Map(MapProperty),
    Set(SetProperty),
    Delegate(DelegateProperty),
    MulticastDelegate(MulticastDelegateProperty),
}

macro_rules! dispatch {
    ($kind:expr, $p:ident => $body:expr) => {
        match $kind {
            PropertyKind::Int8($p) => $body,
            PropertyKind::Int16($p) => $body,
            PropertyKind::Int32($p) => $body,
            PropertyKind::Int64($p) => $body,
            PropertyKind::UInt8($p) => $body,
            PropertyKind::UInt16($p) => $body,
            PropertyKind::UInt32($p) => $body,
            PropertyKind::UInt64($p) => $body,
            PropertyKind::Float($p) => $body,
            PropertyKind::Double($p) => $body,
            PropertyKind::Bool($p) => $body,
            PropertyKind::Name($p) => $body,
            PropertyKind::Str($p) => $body,
            PropertyKind::Enum($p) => $body,
            PropertyKind::Object($p) => $body,
            PropertyKind::Interface($p) => $body,
            PropertyKind::Struct($p) => $body,
            PropertyKind::Array($p) => $body,
            PropertyKind::Map($p) => $body,
            PropertyKind::Set($p) => $body,
            PropertyKind::Delegate($p) => $body,
            PropertyKind::MulticastDelegate($p) => $body,
        }
    };
}

impl PropertyKind {
    /// Numeric view of integer, float and enum kinds
    pub fn as_numeric(&self) -> Option<&dyn NumericAccess> {
        match self {
            PropertyKind::Int8(p) => Some(p),
            PropertyKind::Int16(p) => Some(p),
            PropertyKind::Int32(p) => Some(p),
            PropertyKind::Int64(p) => Some(p),
            PropertyKind::UInt8(p) => Some(p),
            PropertyKind::UInt16(p) => Some(p),
            PropertyKind::UInt32(p) => Some(p),
            PropertyKind::UInt64(p) => Some(p),
            PropertyKind::Float(p) => Some(p),
            PropertyKind::Double(p) => Some(p),
            PropertyKind::Enum(p) => Some(p),
            _ => None,
        }
    }

    /// Whether the traversal engine can expand values of this kind
    pub fn is_expandable(&self) -> bool {
        matches!(
            self,
            PropertyKind::Struct(_)
                | PropertyKind::Array(_)
                | PropertyKind::Map(_)
                | PropertyKind::Set(_)
        )
    }
}

impl PropertyOps for PropertyKind {
    fn kind_name(&self) -> &'static str {
        dispatch!(self, p => p.kind_name())
    }

    fn value_layout(&self) -> (usize, usize) {
        dispatch!(self, p => p.value_layout())
    }

    fn intrinsic_flags(&self) -> PropertyFlags {
        dispatch!(self, p => p.intrinsic_flags())
    }

    fn is_hashable(&self) -> bool {
        dispatch!(self, p => p.is_hashable())
    }

    fn identical(&self, a: ValueRef<'_>, b: ValueRef<'_>) -> bool {
        dispatch!(self, p => p.identical(a, b))
    }

    fn copy_value(&self, dest: ValueMut<'_>, src: ValueRef<'_>) {
        dispatch!(self, p => p.copy_value(dest, src))
    }

    fn initialize_value(&self, dest: ValueMut<'_>) {
        dispatch!(self, p => p.initialize_value(dest))
    }

    fn destroy_value(&self, dest: ValueMut<'_>) {
        dispatch!(self, p => p.destroy_value(dest))
    }

    fn hash_value(&self, value: ValueRef<'_>) -> Option<u32> {
        dispatch!(self, p => p.hash_value(value))
    }

    fn export_value(&self, value: ValueRef<'_>, out: &mut String, cx: &PortContext<'_>) {
        dispatch!(self, p => p.export_value(value, out, cx))
    }

    fn import_value(
        &self,
        dest: ValueMut<'_>,
        cursor: &mut TextCursor<'_>,
        cx: &PortContext<'_>,
    ) -> Result<(), ImportError> {
        dispatch!(self, p => p.import_value(dest, cursor, cx))
    }

    fn serialize_value(
        &self,
        value: ValueRef<'_>,
        ar: &mut ArchiveWriter,
        cx: &PortContext<'_>,
    ) -> PropertyResult<()> {
        dispatch!(self, p => p.serialize_value(value, ar, cx))
    }

    fn deserialize_value(
        &self,
        dest: ValueMut<'_>,
        ar: &mut ArchiveReader<'_>,
        cx: &PortContext<'_>,
    ) -> PropertyResult<()> {
        dispatch!(self, p => p.deserialize_value(dest, ar, cx))
    }
}

/// Descriptor of one field
#[derive(Clone)]
pub struct Property {
    name: String,
    kind: PropertyKind,
    element_size: usize,
    alignment: usize,
    array_dim: usize,
    offset: usize,
    flags: PropertyFlags,
}

impl Property {
    /// Create a descriptor at offset 0 with a single element
    pub fn new(name: impl Into<String>, kind: PropertyKind) -> Self {
        let (element_size, alignment) = kind.value_layout();
        let flags = kind.intrinsic_flags();
        Self {
            name: name.into(),
            kind,
            element_size,
            alignment,
            array_dim: 1,
            offset: 0,
            flags,
        }
    }

    /// Make this a fixed-size array of `dim` elements
    pub fn with_array_dim(mut self, dim: usize) -> Self {
        self.array_dim = dim.max(1);
        self
    }

    /// Add declared flags; computed flags are ignored
    pub fn with_flags(mut self, flags: PropertyFlags) -> Self {
        self.flags |= flags & PropertyFlags::DECLARED;
        self
    }

    pub(crate) fn set_offset(&mut self, offset: usize) {
        self.offset = offset;
    }

    /// Reset to a single element at offset 0, as container elements are stored
    pub(crate) fn into_element(mut self) -> Self {
        self.array_dim = 1;
        self.offset = 0;
        self
    }

    /// Single-bit boolean the layout packs into a shared host byte
    pub(crate) fn is_packed_bit(&self) -> bool {
        matches!(&self.kind, PropertyKind::Bool(b) if !b.is_native() && b.field_size() == 1)
            && self.array_dim == 1
    }

    /// Move a packed boolean to the bit the layout assigned it
    pub(crate) fn set_bit_mask(&mut self, byte_mask: u8) {
        if let Some(bit) = BoolProperty::bitfield(1, 0, byte_mask) {
            self.kind = PropertyKind::Bool(bit);
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &PropertyKind {
        &self.kind
    }

    pub fn kind_name(&self) -> &'static str {
        self.kind.kind_name()
    }

    /// Size of one element
    pub fn element_size(&self) -> usize {
        self.element_size
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    pub fn array_dim(&self) -> usize {
        self.array_dim
    }

    /// Byte offset inside the owning record
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Total size of all elements
    pub fn size(&self) -> usize {
        self.element_size * self.array_dim
    }

    pub fn flags(&self) -> PropertyFlags {
        self.flags
    }

    pub fn has_any_flags(&self, flags: PropertyFlags) -> bool {
        self.flags.intersects(flags)
    }

    pub fn has_all_flags(&self, flags: PropertyFlags) -> bool {
        self.flags.contains(flags)
    }

    pub fn is_hashable(&self) -> bool {
        self.kind.is_hashable()
    }

    fn check_index(&self, index: usize) -> PropertyResult<()> {
        if index < self.array_dim {
            Ok(())
        } else {
            Err(PropertyError::IndexOutOfRange {
                index,
                len: self.array_dim,
            })
        }
    }

    fn kind_mismatch(&self, expected: &'static str) -> PropertyError {
        PropertyError::KindMismatch {
            property: self.name.clone(),
            expected,
            actual: self.kind_name(),
        }
    }

    // ========================================================================
    // Addressing
    // ========================================================================

    /// Address element `index` of this field inside a record value
    ///
    /// This is the only way to go from a record to a field. The index is
    /// checked against `array_dim` and the range against the record size.
    pub fn container_value<'a>(
        &self,
        container: ValueRef<'a>,
        index: usize,
    ) -> PropertyResult<ValueRef<'a>> {
        self.check_index(index)?;
        container.slice(self.offset + index * self.element_size, self.element_size)
    }

    /// Mutable variant of [`Property::container_value`]
    pub fn container_value_mut<'a>(
        &self,
        container: ValueMut<'a>,
        index: usize,
    ) -> PropertyResult<ValueMut<'a>> {
        self.check_index(index)?;
        container.into_slice(self.offset + index * self.element_size, self.element_size)
    }

    /// All `array_dim` elements of this field inside a record value
    pub fn field_value<'a>(&self, container: ValueRef<'a>) -> PropertyResult<ValueRef<'a>> {
        container.slice(self.offset, self.size())
    }

    /// Mutable variant of [`Property::field_value`]
    pub fn field_value_mut<'a>(&self, container: ValueMut<'a>) -> PropertyResult<ValueMut<'a>> {
        container.into_slice(self.offset, self.size())
    }

    fn element<'a>(&self, values: ValueRef<'a>, index: usize) -> ValueRef<'a> {
        values
            .slice(index * self.element_size, self.element_size)
            .unwrap_or_else(|e| panic!("property '{}': {}", self.name, e))
    }

    fn element_mut<'a>(&self, values: &'a mut ValueMut<'_>, index: usize) -> ValueMut<'a> {
        values
            .slice_mut(index * self.element_size, self.element_size)
            .unwrap_or_else(|e| panic!("property '{}': {}", self.name, e))
    }

    // ========================================================================
    // Value operations over all elements
    // ========================================================================

    /// Compare two field values (all `array_dim` elements)
    ///
    /// # Panics
    /// Panics if either view is shorter than [`Property::size`].
    pub fn identical(&self, a: ValueRef<'_>, b: ValueRef<'_>) -> bool {
        (0..self.array_dim).all(|i| self.kind.identical(self.element(a, i), self.element(b, i)))
    }

    /// Compare this field in two record values
    pub fn identical_in_container(
        &self,
        a: ValueRef<'_>,
        b: ValueRef<'_>,
    ) -> PropertyResult<bool> {
        Ok(self.identical(self.field_value(a)?, self.field_value(b)?))
    }

    /// Copy `count` consecutive elements from `src` over `dest`
    ///
    /// Trivially copyable kinds are copied bytewise. Everything else goes
    /// element by element through the kind's assignment.
    pub fn copy_values(&self, mut dest: ValueMut<'_>, src: ValueRef<'_>, count: usize) {
        let len = count * self.element_size;
        if self.has_any_flags(PropertyFlags::TRIVIALLY_COPYABLE) {
            let mut dest = dest
                .slice_mut(0, len)
                .unwrap_or_else(|e| panic!("property '{}': {}", self.name, e));
            let src = src
                .slice(0, len)
                .unwrap_or_else(|e| panic!("property '{}': {}", self.name, e));
            dest.copy_bytes_from(src);
            return;
        }
        for i in 0..count {
            let src = self.element(src, i);
            self.kind.copy_value(self.element_mut(&mut dest, i), src);
        }
    }

    /// Copy all `array_dim` elements
    pub fn copy_complete(&self, dest: ValueMut<'_>, src: ValueRef<'_>) {
        self.copy_values(dest, src, self.array_dim);
    }

    /// Copy this field from one record value to another
    pub fn copy_in_container(&self, dest: ValueMut<'_>, src: ValueRef<'_>) -> PropertyResult<()> {
        self.copy_complete(self.field_value_mut(dest)?, self.field_value(src)?);
        Ok(())
    }

    /// Construct all elements in zeroed memory
    pub fn initialize(&self, mut dest: ValueMut<'_>) {
        if self.has_any_flags(PropertyFlags::ZERO_CONSTRUCTIBLE) {
            dest.slice_mut(0, self.size())
                .unwrap_or_else(|e| panic!("property '{}': {}", self.name, e))
                .fill_zero();
            return;
        }
        for i in 0..self.array_dim {
            self.kind.initialize_value(self.element_mut(&mut dest, i));
        }
    }

    /// Destroy all elements, leaving zeroed memory where anything was owned
    pub fn destroy(&self, mut dest: ValueMut<'_>) {
        if self.has_any_flags(PropertyFlags::NO_DESTRUCTOR) {
            return;
        }
        for i in 0..self.array_dim {
            self.kind.destroy_value(self.element_mut(&mut dest, i));
        }
    }

    pub fn initialize_in_container(&self, container: ValueMut<'_>) -> PropertyResult<()> {
        self.initialize(self.field_value_mut(container)?);
        Ok(())
    }

    pub fn destroy_in_container(&self, container: ValueMut<'_>) -> PropertyResult<()> {
        self.destroy(self.field_value_mut(container)?);
        Ok(())
    }

    /// Hash one element
    pub fn hash(&self, value: ValueRef<'_>) -> PropertyResult<u32> {
        self.kind
            .hash_value(value)
            .ok_or(PropertyError::Unhashable(self.kind_name()))
    }

    // ========================================================================
    // Codec entry points (single element)
    // ========================================================================

    /// Text form of one element
    pub fn export_text(&self, value: ValueRef<'_>, cx: &PortContext<'_>) -> String {
        let mut out = String::new();
        self.kind.export_value(value, &mut out, cx);
        out
    }

    /// Text form of element `index` of this field inside a record value
    pub fn export_text_in_container(
        &self,
        container: ValueRef<'_>,
        index: usize,
        cx: &PortContext<'_>,
    ) -> PropertyResult<String> {
        Ok(self.export_text(self.container_value(container, index)?, cx))
    }

    /// Parse `text` into one element
    ///
    /// The whole text must be consumed. On failure the error carries the
    /// position reached and the element may hold a partially imported value.
    pub fn import_text(
        &self,
        text: &str,
        dest: ValueMut<'_>,
        cx: &PortContext<'_>,
    ) -> PropertyResult<()> {
        let mut cursor = TextCursor::new(text);
        self.kind.import_value(dest, &mut cursor, cx)?;
        cursor.finish()?;
        Ok(())
    }

    /// Parse `text` into element `index` of this field inside a record value
    pub fn import_text_in_container(
        &self,
        text: &str,
        container: ValueMut<'_>,
        index: usize,
        cx: &PortContext<'_>,
    ) -> PropertyResult<()> {
        self.import_text(text, self.container_value_mut(container, index)?, cx)
    }

    /// Import through an existing cursor, for nested values
    pub(crate) fn import_item(
        &self,
        dest: ValueMut<'_>,
        cursor: &mut TextCursor<'_>,
        cx: &PortContext<'_>,
    ) -> Result<(), ImportError> {
        self.kind.import_value(dest, cursor, cx)
    }

    /// Write one element's binary form
    pub fn serialize_item(
        &self,
        value: ValueRef<'_>,
        ar: &mut ArchiveWriter,
        cx: &PortContext<'_>,
    ) -> PropertyResult<()> {
        self.kind.serialize_value(value, ar, cx)
    }

    /// Read one element's binary form
    pub fn deserialize_item(
        &self,
        dest: ValueMut<'_>,
        ar: &mut ArchiveReader<'_>,
        cx: &PortContext<'_>,
    ) -> PropertyResult<()> {
        self.kind.deserialize_value(dest, ar, cx)
    }

    // ========================================================================
    // Typed access
    // ========================================================================

    /// Read element `index` of this field as a native value
    pub fn get<T: NativeValue>(&self, container: ValueRef<'_>, index: usize) -> PropertyResult<T> {
        T::read(self, self.container_value(container, index)?)
    }

    /// Write element `index` of this field from a native value
    pub fn set<T: NativeValue>(
        &self,
        container: ValueMut<'_>,
        index: usize,
        value: T,
    ) -> PropertyResult<()> {
        T::write(self, self.container_value_mut(container, index)?, value)
    }

    /// Read a bare element as a native value
    pub fn get_value<T: NativeValue>(&self, value: ValueRef<'_>) -> PropertyResult<T> {
        T::read(self, value)
    }

    /// Write a bare element from a native value
    pub fn set_value<T: NativeValue>(&self, dest: ValueMut<'_>, value: T) -> PropertyResult<()> {
        T::write(self, dest, value)
    }

    // ========================================================================
    // Kind downcasts
    // ========================================================================

    pub fn as_bool(&self) -> PropertyResult<&BoolProperty> {
        match &self.kind {
            PropertyKind::Bool(p) => Ok(p),
            _ => Err(self.kind_mismatch("Bool")),
        }
    }

    pub fn as_struct(&self) -> PropertyResult<&StructProperty> {
        match &self.kind {
            PropertyKind::Struct(p) => Ok(p),
            _ => Err(self.kind_mismatch("Struct")),
        }
    }

    pub fn as_array(&self) -> PropertyResult<&ArrayProperty> {
        match &self.kind {
            PropertyKind::Array(p) => Ok(p),
            _ => Err(self.kind_mismatch("Array")),
        }
    }

    pub fn as_map(&self) -> PropertyResult<&MapProperty> {
        match &self.kind {
            PropertyKind::Map(p) => Ok(p),
            _ => Err(self.kind_mismatch("Map")),
        }
    }

    pub fn as_set(&self) -> PropertyResult<&SetProperty> {
        match &self.kind {
            PropertyKind::Set(p) => Ok(p),
            _ => Err(self.kind_mismatch("Set")),
        }
    }

    pub fn as_numeric(&self) -> PropertyResult<&dyn NumericAccess> {
        self.kind
            .as_numeric()
            .ok_or_else(|| self.kind_mismatch("numeric"))
    }
}

impl std::fmt::Debug for Property {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("kind", &self.kind_name())
            .field("offset", &self.offset)
            .field("element_size", &self.element_size)
            .field("array_dim", &self.array_dim)
            .field("flags", &self.flags)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ValueBuffer;
    use propsys_engine::EngineServices;

    fn int_array(dim: usize) -> Property {
        Property::new("values", PropertyKind::Int32(NumericProperty::new())).with_array_dim(dim)
    }

    #[test]
    fn test_new_property_layout() {
        let prop = int_array(3);
        assert_eq!(prop.element_size(), 4);
        assert_eq!(prop.alignment(), 4);
        assert_eq!(prop.size(), 12);
        assert!(prop.has_all_flags(PropertyFlags::POD));
        assert_eq!(prop.kind_name(), "Int32");
    }

    #[test]
    fn test_declared_flags_only() {
        let prop = int_array(1).with_flags(PropertyFlags::CONFIG | PropertyFlags::CONTAINS_OBJECT_REFERENCE);
        assert!(prop.has_any_flags(PropertyFlags::CONFIG));
        assert!(!prop.has_any_flags(PropertyFlags::CONTAINS_OBJECT_REFERENCE));
    }

    #[test]
    fn test_container_value_bounds() {
        let mut prop = int_array(2);
        prop.set_offset(4);
        let buffer = ValueBuffer::zeroed(12, 4).unwrap();

        assert!(prop.container_value(buffer.as_value(), 1).is_ok());
        assert!(matches!(
            prop.container_value(buffer.as_value(), 2),
            Err(PropertyError::IndexOutOfRange { index: 2, len: 2 })
        ));

        let small = ValueBuffer::zeroed(8, 4).unwrap();
        assert!(matches!(
            prop.container_value(small.as_value(), 1),
            Err(PropertyError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_get_set_and_identical() {
        let prop = int_array(3);
        let mut a = ValueBuffer::zeroed(12, 4).unwrap();
        let mut b = ValueBuffer::zeroed(12, 4).unwrap();

        prop.set(a.as_value_mut(), 2, 9i32).unwrap();
        assert_eq!(prop.get::<i32>(a.as_value(), 2).unwrap(), 9);
        assert!(!prop.identical(a.as_value(), b.as_value()));

        prop.copy_complete(b.as_value_mut(), a.as_value());
        assert!(prop.identical(a.as_value(), b.as_value()));
        assert!(prop.get::<f32>(a.as_value(), 0).is_err());
    }

    #[test]
    fn test_text_round_trip_in_container() {
        let services = EngineServices::new();
        let cx = PortContext::new(&services);
        let prop = int_array(2);
        let mut buffer = ValueBuffer::zeroed(8, 4).unwrap();

        prop.import_text_in_container(" -42 ", buffer.as_value_mut(), 1, &cx)
            .unwrap();
        assert_eq!(
            prop.export_text_in_container(buffer.as_value(), 1, &cx).unwrap(),
            "-42"
        );

        let err = prop
            .import_text_in_container("12x", buffer.as_value_mut(), 0, &cx)
            .unwrap_err();
        assert!(matches!(err, PropertyError::Import(_)));
    }

    #[test]
    fn test_hash_unhashable() {
        let prop = Property::new(
            "list",
            PropertyKind::Set(SetProperty::new(int_array(1)).unwrap()),
        );
        let buffer = ValueBuffer::zeroed(prop.element_size(), prop.alignment()).unwrap();
        assert!(matches!(
            prop.hash(buffer.as_value()),
            Err(PropertyError::Unhashable("Set"))
        ));
    }
}
