//! Dynamic array properties and their adapters
//!
//! The value is a [`ScriptArray`] header. [`ScriptArrayHelper`] binds the
//! element descriptor to one live header for mutation, [`ScriptArrayView`]
//! for reading. Both are short-lived and own nothing.
//!
//! Every index is checked: `try_*` methods return
//! [`PropertyError::IndexOutOfRange`], the plain accessors panic with the
//! same message.

use propsys_sdk::ScriptArray;

use crate::codec::{ArchiveReader, ArchiveWriter, PortContext, TextCursor};
use crate::error::{ImportError, PropertyError, PropertyResult};
use crate::memory::{ValueMut, ValueRef};
use crate::property::{Property, PropertyFlags, PropertyOps};

/// Property holding a variable-length array of one element kind
#[derive(Debug, Clone)]
pub struct ArrayProperty {
    inner: Box<Property>,
}

impl ArrayProperty {
    /// Create an array of `inner` elements
    ///
    /// The element descriptor is reset to a single element at offset 0.
    pub fn new(inner: Property) -> Self {
        Self {
            inner: Box::new(inner.into_element()),
        }
    }

    /// Element descriptor
    pub fn inner(&self) -> &Property {
        &self.inner
    }

    /// Bind a mutable adapter to an array value
    pub fn helper<'a>(&'a self, value: ValueMut<'a>) -> ScriptArrayHelper<'a> {
        ScriptArrayHelper::new(&self.inner, value)
    }

    /// Bind a read-only adapter to an array value
    pub fn view<'a>(&'a self, value: ValueRef<'a>) -> ScriptArrayView<'a> {
        ScriptArrayView::new(&self.inner, value)
    }
}

fn range_error(index: usize, len: usize) -> PropertyError {
    PropertyError::IndexOutOfRange { index, len }
}

/// Read-only array adapter
#[derive(Clone, Copy)]
pub struct ScriptArrayView<'a> {
    inner: &'a Property,
    array: &'a ScriptArray,
}

impl<'a> ScriptArrayView<'a> {
    pub fn new(inner: &'a Property, value: ValueRef<'a>) -> Self {
        // SAFETY: array values are ScriptArray headers
        let array = unsafe { value.cast::<ScriptArray>() };
        Self { inner, array }
    }

    pub fn inner(&self) -> &'a Property {
        self.inner
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.array.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.array.is_empty()
    }

    #[inline]
    pub fn is_valid_index(&self, index: usize) -> bool {
        index < self.array.len()
    }

    fn elements(&self) -> ValueRef<'a> {
        // SAFETY: the array is only grown with the element size, and holds
        // constructed elements up to its length
        unsafe { ValueRef::from_bytes(self.array.as_bytes(self.inner.element_size())) }
    }

    /// All live elements as one block
    pub fn values(&self) -> ValueRef<'a> {
        self.elements()
    }

    pub fn try_element(&self, index: usize) -> PropertyResult<ValueRef<'a>> {
        if !self.is_valid_index(index) {
            return Err(range_error(index, self.len()));
        }
        let size = self.inner.element_size();
        self.elements().slice(index * size, size)
    }

    /// # Panics
    /// Panics if `index` is out of range.
    pub fn element(&self, index: usize) -> ValueRef<'a> {
        self.try_element(index).unwrap_or_else(|e| panic!("{}", e))
    }

    pub fn iter(&self) -> impl Iterator<Item = ValueRef<'a>> + 'a {
        let view = *self;
        (0..view.len()).map(move |i| view.element(i))
    }
}

/// Mutable array adapter
pub struct ScriptArrayHelper<'a> {
    inner: &'a Property,
    array: &'a mut ScriptArray,
}

impl<'a> ScriptArrayHelper<'a> {
    pub fn new(inner: &'a Property, value: ValueMut<'a>) -> Self {
        // SAFETY: array values are ScriptArray headers
        let array = unsafe { value.into_cast_mut::<ScriptArray>() };
        Self { inner, array }
    }

    pub fn view(&self) -> ScriptArrayView<'_> {
        ScriptArrayView {
            inner: self.inner,
            array: &*self.array,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.array.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.array.is_empty()
    }

    #[inline]
    pub fn is_valid_index(&self, index: usize) -> bool {
        index < self.array.len()
    }

    fn element_layout(&self) -> (usize, usize) {
        (self.inner.element_size(), self.inner.alignment())
    }

    fn elements_mut(&mut self) -> ValueMut<'_> {
        let size = self.inner.element_size();
        // SAFETY: see ScriptArrayView::elements
        unsafe { ValueMut::from_bytes(self.array.as_bytes_mut(size)) }
    }

    /// `count` elements starting at `index`, unchecked against the length
    fn range_mut(&mut self, index: usize, count: usize) -> ValueMut<'_> {
        let size = self.inner.element_size();
        self.elements_mut()
            .into_slice(index * size, count * size)
            .unwrap_or_else(|e| panic!("{}", e))
    }

    pub fn try_element(&self, index: usize) -> PropertyResult<ValueRef<'_>> {
        self.view().try_element(index)
    }

    pub fn element(&self, index: usize) -> ValueRef<'_> {
        self.view().element(index)
    }

    pub fn try_element_mut(&mut self, index: usize) -> PropertyResult<ValueMut<'_>> {
        if !self.is_valid_index(index) {
            return Err(range_error(index, self.len()));
        }
        Ok(self.range_mut(index, 1))
    }

    /// # Panics
    /// Panics if `index` is out of range.
    pub fn element_mut(&mut self, index: usize) -> ValueMut<'_> {
        self.try_element_mut(index).unwrap_or_else(|e| panic!("{}", e))
    }

    fn construct(&mut self, index: usize, count: usize) {
        if count == 0 || self.inner.has_any_flags(PropertyFlags::ZERO_CONSTRUCTIBLE) {
            // New slack is already zeroed
            return;
        }
        let inner = self.inner;
        let size = inner.element_size();
        let mut range = self.range_mut(index, count);
        for i in 0..count {
            if let Ok(element) = range.slice_mut(i * size, size) {
                inner.initialize(element);
            }
        }
    }

    fn destruct(&mut self, index: usize, count: usize) {
        if count == 0 || self.inner.has_any_flags(PropertyFlags::NO_DESTRUCTOR) {
            return;
        }
        let inner = self.inner;
        let size = inner.element_size();
        let mut range = self.range_mut(index, count);
        for i in 0..count {
            if let Ok(element) = range.slice_mut(i * size, size) {
                inner.destroy(element);
            }
        }
    }

    /// Append `count` constructed elements, returning the first new index
    pub fn add_values(&mut self, count: usize) -> usize {
        let (size, align) = self.element_layout();
        // SAFETY: the element layout never changes for this array
        let first = unsafe { self.array.add_zeroed(count, size, align) };
        self.construct(first, count);
        first
    }

    /// Append one constructed element
    pub fn add_value(&mut self) -> usize {
        self.add_values(1)
    }

    /// Grow with constructed elements or shrink by destroying the tail
    pub fn resize(&mut self, new_len: usize) {
        let len = self.len();
        if new_len > len {
            self.add_values(new_len - len);
        } else if new_len < len {
            self.destruct(new_len, len - new_len);
            let size = self.inner.element_size();
            // SAFETY: the range is in bounds and already destroyed
            unsafe { self.array.remove(new_len, len - new_len, size) };
        }
    }

    /// Insert `count` constructed elements before `index`
    pub fn insert_values(&mut self, index: usize, count: usize) -> PropertyResult<()> {
        if index > self.len() {
            return Err(range_error(index, self.len()));
        }
        let (size, align) = self.element_layout();
        // SAFETY: index checked, element layout unchanged
        unsafe { self.array.insert_zeroed(index, count, size, align) };
        self.construct(index, count);
        Ok(())
    }

    /// Destroy `count` elements at `index` and close the gap
    pub fn remove_values(&mut self, index: usize, count: usize) -> PropertyResult<()> {
        let len = self.len();
        match index.checked_add(count) {
            Some(end) if end <= len => {}
            _ => return Err(range_error(index.saturating_add(count), len)),
        }
        self.destruct(index, count);
        let size = self.inner.element_size();
        // SAFETY: range checked and destroyed
        unsafe { self.array.remove(index, count, size) };
        Ok(())
    }

    /// Largest length the element layout can address
    pub fn max_len(&self) -> usize {
        isize::MAX as usize / self.inner.element_size().max(1)
    }

    /// Make `index` valid, growing if needed; returns whether it grew
    ///
    /// # Errors
    /// [`PropertyError::TooLarge`] if `index + 1` elements cannot be allocated.
    pub fn expand_for_index(&mut self, index: usize) -> PropertyResult<bool> {
        if index < self.len() {
            return Ok(false);
        }
        let limit = self.max_len();
        match index.checked_add(1) {
            Some(new_len) if new_len <= limit => {
                self.resize(new_len);
                Ok(true)
            }
            _ => Err(PropertyError::TooLarge {
                requested: index.saturating_add(1),
                limit,
            }),
        }
    }

    pub fn swap_values(&mut self, a: usize, b: usize) -> PropertyResult<()> {
        let len = self.len();
        for index in [a, b] {
            if index >= len {
                return Err(range_error(index, len));
            }
        }
        let size = self.inner.element_size();
        // SAFETY: both indices checked
        unsafe { self.array.swap(a, b, size) };
        Ok(())
    }

    /// Destroy every element, keeping the allocation
    pub fn empty_values(&mut self) {
        self.resize(0);
    }

    /// Destroy every element and release the allocation
    pub fn empty_and_free(&mut self) {
        self.resize(0);
        let (size, align) = self.element_layout();
        // SAFETY: all elements destroyed, layout unchanged
        unsafe { self.array.free(size, align) };
    }

    /// Make this array an element-wise copy of `src`
    pub fn assign(&mut self, src: ScriptArrayView<'_>) {
        self.resize(src.len());
        let count = src.len();
        if count == 0 {
            return;
        }
        let inner = self.inner;
        let dest = self.range_mut(0, count);
        inner.copy_values(dest, src.values(), count);
    }
}

impl PropertyOps for ArrayProperty {
    fn kind_name(&self) -> &'static str {
        "Array"
    }

    fn value_layout(&self) -> (usize, usize) {
        (
            std::mem::size_of::<ScriptArray>(),
            std::mem::align_of::<ScriptArray>(),
        )
    }

    fn intrinsic_flags(&self) -> PropertyFlags {
        PropertyFlags::ZERO_CONSTRUCTIBLE | (self.inner.flags() & PropertyFlags::REFERENCES)
    }

    fn identical(&self, a: ValueRef<'_>, b: ValueRef<'_>) -> bool {
        let (a, b) = (self.view(a), self.view(b));
        a.len() == b.len()
            && (0..a.len()).all(|i| self.inner.identical(a.element(i), b.element(i)))
    }

    fn copy_value(&self, dest: ValueMut<'_>, src: ValueRef<'_>) {
        let src = self.view(src);
        self.helper(dest).assign(src);
    }

    fn destroy_value(&self, dest: ValueMut<'_>) {
        self.helper(dest).empty_and_free();
    }

    fn export_value(&self, value: ValueRef<'_>, out: &mut String, cx: &PortContext<'_>) {
        let inner_cx = cx.delimited();
        out.push('(');
        for (i, element) in self.view(value).iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(&self.inner.export_text(element, &inner_cx));
        }
        out.push(')');
    }

    fn import_value(
        &self,
        dest: ValueMut<'_>,
        cursor: &mut TextCursor<'_>,
        cx: &PortContext<'_>,
    ) -> Result<(), ImportError> {
        let inner_cx = cx.delimited();
        let mut helper = self.helper(dest);
        helper.empty_values();
        cursor.expect('(')?;
        if cursor.eat(')') {
            return Ok(());
        }
        loop {
            let index = helper.add_value();
            self.inner
                .import_item(helper.element_mut(index), cursor, &inner_cx)?;
            if cursor.eat(')') {
                return Ok(());
            }
            cursor.expect(',')?;
        }
    }

    fn serialize_value(
        &self,
        value: ValueRef<'_>,
        ar: &mut ArchiveWriter,
        cx: &PortContext<'_>,
    ) -> PropertyResult<()> {
        let view = self.view(value);
        ar.write_len(view.len())?;
        for element in view.iter() {
            self.inner.serialize_item(element, ar, cx)?;
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
        let mut helper = self.helper(dest);
        helper.empty_values();
        for _ in 0..count {
            let index = helper.add_value();
            self.inner.deserialize_item(helper.element_mut(index), ar, cx)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ValueBuffer;
    use crate::property::{NumericProperty, PropertyKind, StrProperty};
    use propsys_engine::EngineServices;

    fn int_array() -> ArrayProperty {
        ArrayProperty::new(Property::new("item", PropertyKind::Int32(NumericProperty::new())))
    }

    fn buffer_for(prop: &ArrayProperty) -> ValueBuffer {
        let (size, align) = prop.value_layout();
        ValueBuffer::zeroed(size, align).unwrap()
    }

    fn fill(prop: &ArrayProperty, buffer: &mut ValueBuffer, values: &[i32]) {
        let mut helper = prop.helper(buffer.as_value_mut());
        helper.resize(values.len());
        for (i, v) in values.iter().enumerate() {
            helper.element_mut(i).write(*v);
        }
    }

    fn read(prop: &ArrayProperty, buffer: &ValueBuffer) -> Vec<i32> {
        prop.view(buffer.as_value())
            .iter()
            .map(|e| e.read::<i32>())
            .collect()
    }

    #[test]
    fn test_insert_keeps_order() {
        let prop = int_array();
        let mut buffer = buffer_for(&prop);
        fill(&prop, &mut buffer, &[1, 2, 3, 4]);

        prop.helper(buffer.as_value_mut()).insert_values(1, 2).unwrap();
        assert_eq!(read(&prop, &buffer), vec![1, 0, 0, 2, 3, 4]);

        prop.helper(buffer.as_value_mut()).remove_values(0, 3).unwrap();
        assert_eq!(read(&prop, &buffer), vec![2, 3, 4]);

        prop.destroy_value(buffer.as_value_mut());
    }

    #[test]
    fn test_bounds_are_checked() {
        let prop = int_array();
        let mut buffer = buffer_for(&prop);
        fill(&prop, &mut buffer, &[7]);

        let mut helper = prop.helper(buffer.as_value_mut());
        assert!(helper.try_element(1).is_err());
        assert!(helper.insert_values(2, 1).is_err());
        assert!(helper.remove_values(0, 2).is_err());
        assert!(helper.swap_values(0, 1).is_err());
        helper.empty_and_free();
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_element_panics_out_of_range() {
        let prop = int_array();
        let buffer = buffer_for(&prop);
        prop.view(buffer.as_value()).element(0);
    }

    #[test]
    fn test_expand_for_index() {
        let prop = int_array();
        let mut buffer = buffer_for(&prop);
        let mut helper = prop.helper(buffer.as_value_mut());
        assert!(helper.expand_for_index(4).unwrap());
        assert_eq!(helper.len(), 5);
        assert!(!helper.expand_for_index(2).unwrap());

        assert!(matches!(
            helper.expand_for_index(usize::MAX),
            Err(PropertyError::TooLarge { .. })
        ));
        assert!(helper.expand_for_index(helper.max_len()).is_err());
        assert_eq!(helper.len(), 5);
        helper.empty_and_free();
    }

    #[test]
    fn test_string_elements_deep_copy() {
        let services = EngineServices::new();
        let cx = PortContext::new(&services);
        let prop = ArrayProperty::new(Property::new("name", PropertyKind::Str(StrProperty)));
        let mut a = buffer_for(&prop);
        let mut b = buffer_for(&prop);

        prop.import_value(a.as_value_mut(), &mut TextCursor::new("(\"x, y\", z)"), &cx)
            .unwrap();
        prop.copy_value(b.as_value_mut(), a.as_value());
        assert!(prop.identical(a.as_value(), b.as_value()));

        let mut out = String::new();
        prop.export_value(b.as_value(), &mut out, &cx);
        assert_eq!(out, "(\"x, y\",\"z\")");

        prop.destroy_value(a.as_value_mut());
        assert!(!prop.identical(a.as_value(), b.as_value()));
        prop.destroy_value(b.as_value_mut());
    }

    #[test]
    fn test_archive_round_trip() {
        let services = EngineServices::new();
        let cx = PortContext::new(&services);
        let prop = int_array();
        let mut a = buffer_for(&prop);
        fill(&prop, &mut a, &[5, -1, 9]);

        let mut writer = ArchiveWriter::new();
        prop.serialize_value(a.as_value(), &mut writer, &cx).unwrap();
        let bytes = writer.into_bytes();

        let mut b = buffer_for(&prop);
        prop.deserialize_value(b.as_value_mut(), &mut ArchiveReader::new(&bytes), &cx)
            .unwrap();
        assert_eq!(read(&prop, &b), vec![5, -1, 9]);

        prop.destroy_value(a.as_value_mut());
        prop.destroy_value(b.as_value_mut());
    }
}
