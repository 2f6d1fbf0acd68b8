//! Set properties and their adapters

use propsys_sdk::ScriptSet;

use crate::codec::{ArchiveReader, ArchiveWriter, PortContext, TextCursor};
use crate::error::{ImportError, PropertyError, PropertyResult};
use crate::layout::SparseLayout;
use crate::memory::{ValueMut, ValueRef};
use crate::property::{Property, PropertyFlags, PropertyOps};

use super::import_replacing;
use super::sparse::{SparseTable, SparseView};

/// Property holding a hash set of one element kind
#[derive(Debug, Clone)]
pub struct SetProperty {
    element: Box<Property>,
    layout: SparseLayout,
}

impl SetProperty {
    /// Create a set of `element` values
    ///
    /// Fails with [`PropertyError::Unhashable`] if the element kind has no hash.
    pub fn new(element: Property) -> PropertyResult<Self> {
        if !element.is_hashable() {
            return Err(PropertyError::Unhashable(element.kind_name()));
        }
        let layout = SparseLayout::new(element.element_size(), element.alignment())?;
        Ok(Self {
            element: Box::new(element.into_element()),
            layout,
        })
    }

    /// Element descriptor
    pub fn element(&self) -> &Property {
        &self.element
    }

    /// Slot layout of the backing table
    pub fn layout(&self) -> SparseLayout {
        self.layout
    }

    pub fn helper<'a>(&'a self, value: ValueMut<'a>) -> ScriptSetHelper<'a> {
        ScriptSetHelper::new(self, value)
    }

    pub fn view<'a>(&'a self, value: ValueRef<'a>) -> ScriptSetView<'a> {
        ScriptSetView::new(self, value)
    }
}

/// Read-only set adapter
#[derive(Clone, Copy)]
pub struct ScriptSetView<'a> {
    element: &'a Property,
    table: SparseView<'a>,
}

impl<'a> ScriptSetView<'a> {
    pub fn new(prop: &'a SetProperty, value: ValueRef<'a>) -> Self {
        // SAFETY: set values are ScriptSet headers
        let set = unsafe { value.cast::<ScriptSet>() };
        Self {
            element: &prop.element,
            table: SparseView::new(prop.layout, &prop.element, set),
        }
    }

    pub fn element_property(&self) -> &'a Property {
        self.element
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One past the highest slot index, free slots included
    pub fn max_index(&self) -> usize {
        self.table.max_index()
    }

    pub fn is_valid_index(&self, index: usize) -> bool {
        self.table.is_valid_index(index)
    }

    /// Whether raw additions are waiting for a rehash
    pub fn is_dirty(&self) -> bool {
        self.table.is_dirty()
    }

    pub fn element(&self, index: usize) -> PropertyResult<ValueRef<'a>> {
        self.table.try_payload(index)
    }

    /// Valid slot indices in ascending order
    pub fn indices(&self) -> impl Iterator<Item = usize> + 'a {
        self.table.indices()
    }

    pub fn iter(&self) -> impl Iterator<Item = ValueRef<'a>> + 'a {
        let table = self.table;
        table.indices().map(move |i| table.payload(i))
    }

    /// Hashed lookup; fails with [`PropertyError::NeedsRehash`] on a dirty set
    pub fn find_index(&self, element: ValueRef<'_>) -> PropertyResult<Option<usize>> {
        self.table.find_index(element)
    }

    /// Linear lookup that also works on a dirty set
    pub fn find_index_linear(&self, element: ValueRef<'_>) -> Option<usize> {
        self.table.find_index_linear(element)
    }

    pub fn contains(&self, element: ValueRef<'_>) -> PropertyResult<bool> {
        Ok(self.find_index(element)?.is_some())
    }
}

/// Mutable set adapter
pub struct ScriptSetHelper<'a> {
    element: &'a Property,
    table: SparseTable<'a>,
}

impl<'a> ScriptSetHelper<'a> {
    pub fn new(prop: &'a SetProperty, value: ValueMut<'a>) -> Self {
        // SAFETY: set values are ScriptSet headers
        let set = unsafe { value.into_cast_mut::<ScriptSet>() };
        Self {
            element: &prop.element,
            table: SparseTable::new(prop.layout, &prop.element, set),
        }
    }

    pub fn view(&self) -> ScriptSetView<'_> {
        ScriptSetView {
            element: self.element,
            table: self.table.view(),
        }
    }

    pub fn len(&self) -> usize {
        self.table.view().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_index(&self) -> usize {
        self.table.view().max_index()
    }

    pub fn is_valid_index(&self, index: usize) -> bool {
        self.table.view().is_valid_index(index)
    }

    pub fn element_mut(&mut self, index: usize) -> PropertyResult<ValueMut<'_>> {
        self.table.try_payload_mut(index)
    }

    pub fn find_index(&self, element: ValueRef<'_>) -> PropertyResult<Option<usize>> {
        self.table.view().find_index(element)
    }

    /// Add an element, or overwrite the identical one already present
    ///
    /// Returns the slot index. Adding an element already in the set never
    /// changes the count.
    pub fn add(&mut self, element: ValueRef<'_>) -> PropertyResult<usize> {
        if self.table.view().is_dirty() {
            return Err(PropertyError::NeedsRehash);
        }
        let prop = self.element;
        let hash = prop.hash(element)?;
        if let Some(index) = self.table.view().find_hashed(element, hash) {
            prop.copy_complete(self.table.payload_mut(index), element);
            return Ok(index);
        }
        let index = self.table.allocate();
        prop.initialize(self.table.payload_mut(index));
        prop.copy_complete(self.table.payload_mut(index), element);
        self.table.link(index, hash)?;
        Ok(index)
    }

    /// Remove an element, returning whether it was present
    pub fn remove(&mut self, element: ValueRef<'_>) -> PropertyResult<bool> {
        match self.find_index(element)? {
            Some(index) => {
                self.remove_at(index)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn remove_at(&mut self, index: usize) -> PropertyResult<()> {
        let prop = self.element;
        self.table.remove_at(index, &mut |value| prop.destroy(value))
    }

    /// Append a constructed element without hashing it
    ///
    /// The set is dirty afterwards: hashed queries fail until
    /// [`ScriptSetHelper::rehash`] is called.
    pub fn add_default_needs_rehash(&mut self) -> usize {
        let index = self.table.allocate();
        self.element.initialize(self.table.payload_mut(index));
        self.table.mark_dirty();
        index
    }

    /// Rebuild the hash index, dropping duplicates; returns how many were dropped
    pub fn rehash(&mut self) -> PropertyResult<usize> {
        let prop = self.element;
        self.table.rehash(&mut |value| prop.destroy(value))
    }

    /// Destroy every element and release all storage
    pub fn empty(&mut self) {
        let prop = self.element;
        self.table.empty(&mut |value| prop.destroy(value));
    }

    fn slot_mut(&mut self, index: usize) -> ValueMut<'_> {
        self.table.payload_mut(index)
    }
}

fn contains_any(view: &ScriptSetView<'_>, element: ValueRef<'_>) -> bool {
    match view.find_index(element) {
        Ok(found) => found.is_some(),
        Err(_) => view.find_index_linear(element).is_some(),
    }
}

impl PropertyOps for SetProperty {
    fn kind_name(&self) -> &'static str {
        "Set"
    }

    fn value_layout(&self) -> (usize, usize) {
        (
            std::mem::size_of::<ScriptSet>(),
            std::mem::align_of::<ScriptSet>(),
        )
    }

    fn intrinsic_flags(&self) -> PropertyFlags {
        PropertyFlags::ZERO_CONSTRUCTIBLE | (self.element.flags() & PropertyFlags::REFERENCES)
    }

    fn identical(&self, a: ValueRef<'_>, b: ValueRef<'_>) -> bool {
        let (a, b) = (self.view(a), self.view(b));
        a.len() == b.len() && a.iter().all(|element| contains_any(&b, element))
    }

    fn copy_value(&self, dest: ValueMut<'_>, src: ValueRef<'_>) {
        let src = self.view(src);
        let mut helper = self.helper(dest);
        helper.empty();
        for element in src.iter() {
            let index = helper.add_default_needs_rehash();
            self.element.copy_complete(helper.slot_mut(index), element);
        }
        if let Err(e) = helper.rehash() {
            tracing::warn!("Set copy left unindexed: {}", e);
        }
    }

    fn destroy_value(&self, dest: ValueMut<'_>) {
        self.helper(dest).empty();
    }

    fn export_value(&self, value: ValueRef<'_>, out: &mut String, cx: &PortContext<'_>) {
        let inner = cx.delimited();
        out.push('(');
        for (i, element) in self.view(value).iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(&self.element.export_text(element, &inner));
        }
        out.push(')');
    }

    fn import_value(
        &self,
        dest: ValueMut<'_>,
        cursor: &mut TextCursor<'_>,
        cx: &PortContext<'_>,
    ) -> Result<(), ImportError> {
        let inner = cx.delimited();
        import_replacing(self, dest, cursor, |scratch, cursor| {
            let mut helper = self.helper(scratch);
            cursor.expect('(')?;
            if !cursor.eat(')') {
                loop {
                    let index = helper.add_default_needs_rehash();
                    self.element.import_item(helper.slot_mut(index), cursor, &inner)?;
                    if cursor.eat(')') {
                        break;
                    }
                    cursor.expect(',')?;
                }
            }
            helper
                .rehash()
                .map_err(|e| cursor.error(e.to_string()))?;
            Ok(())
        })
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
            self.element.serialize_item(element, ar, cx)?;
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
        helper.empty();
        for _ in 0..count {
            let index = helper.add_default_needs_rehash();
            self.element.deserialize_item(helper.slot_mut(index), ar, cx)?;
        }
        helper.rehash()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ValueBuffer;
    use crate::property::{NumericProperty, PropertyKind, StrProperty, StructProperty};
    use crate::record::RecordType;
    use propsys_engine::EngineServices;
    use std::sync::Arc;

    fn int_set() -> SetProperty {
        SetProperty::new(Property::new("item", PropertyKind::Int64(NumericProperty::new()))).unwrap()
    }

    fn buffer_for(prop: &SetProperty) -> ValueBuffer {
        let (size, align) = prop.value_layout();
        ValueBuffer::zeroed(size, align).unwrap()
    }

    fn int(value: i64) -> ValueBuffer {
        let mut buffer = ValueBuffer::zeroed(8, 8).unwrap();
        buffer.as_value_mut().write(value);
        buffer
    }

    #[test]
    fn test_duplicate_add_keeps_count() {
        let prop = int_set();
        let mut value = buffer_for(&prop);
        let mut helper = prop.helper(value.as_value_mut());

        let first = helper.add(int(42).as_value()).unwrap();
        assert_eq!(helper.add(int(42).as_value()).unwrap(), first);
        helper.add(int(7).as_value()).unwrap();
        assert_eq!(helper.len(), 2);

        assert!(helper.remove(int(42).as_value()).unwrap());
        assert!(!helper.remove(int(42).as_value()).unwrap());
        assert_eq!(helper.len(), 1);
        helper.empty();
    }

    #[test]
    fn test_many_elements_grow_buckets() {
        let prop = int_set();
        let mut value = buffer_for(&prop);
        let mut helper = prop.helper(value.as_value_mut());
        for i in 0..200 {
            helper.add(int(i * 17).as_value()).unwrap();
        }
        assert_eq!(helper.len(), 200);
        for i in 0..200 {
            assert!(helper.find_index(int(i * 17).as_value()).unwrap().is_some());
        }
        assert!(helper.find_index(int(5).as_value()).unwrap().is_none());
        helper.empty();
    }

    #[test]
    fn test_raw_add_requires_rehash() {
        let prop = int_set();
        let mut value = buffer_for(&prop);
        let mut helper = prop.helper(value.as_value_mut());

        let index = helper.add_default_needs_rehash();
        helper.element_mut(index).unwrap().write(3i64);
        assert!(matches!(
            helper.find_index(int(3).as_value()),
            Err(PropertyError::NeedsRehash)
        ));
        assert!(matches!(helper.add(int(4).as_value()), Err(PropertyError::NeedsRehash)));
        assert_eq!(helper.view().find_index_linear(int(3).as_value()), Some(index));

        helper.rehash().unwrap();
        assert_eq!(helper.find_index(int(3).as_value()).unwrap(), Some(index));
        helper.empty();
    }

    #[test]
    fn test_unhashable_element_rejected() {
        let record = Arc::new(
            RecordType::new(
                "Holder",
                None,
                vec![Property::new("inner", PropertyKind::Set(int_set()))],
            )
            .unwrap(),
        );
        let element = Property::new("holder", PropertyKind::Struct(StructProperty::new(record)));
        assert!(matches!(
            SetProperty::new(element),
            Err(PropertyError::Unhashable("Struct"))
        ));
    }

    #[test]
    fn test_text_import_dedups_and_compares_unordered() {
        let services = EngineServices::new();
        let cx = PortContext::new(&services);
        let prop = int_set();
        let mut a = buffer_for(&prop);
        let mut b = buffer_for(&prop);

        prop.import_value(a.as_value_mut(), &mut TextCursor::new("(1,2,3,2)"), &cx)
            .unwrap();
        prop.import_value(b.as_value_mut(), &mut TextCursor::new("(3,1,2)"), &cx)
            .unwrap();
        assert_eq!(prop.view(a.as_value()).len(), 3);
        assert!(prop.identical(a.as_value(), b.as_value()));

        let mut c = buffer_for(&prop);
        prop.copy_value(c.as_value_mut(), a.as_value());
        assert!(prop.identical(a.as_value(), c.as_value()));
        assert!(prop.view(c.as_value()).contains(int(2).as_value()).unwrap());

        for buffer in [&mut a, &mut b, &mut c] {
            prop.destroy_value(buffer.as_value_mut());
        }
    }

    #[test]
    fn test_archive_round_trip() {
        let services = EngineServices::new();
        let cx = PortContext::new(&services);
        let prop = int_set();
        let mut a = buffer_for(&prop);
        {
            let mut helper = prop.helper(a.as_value_mut());
            for v in [10, 20, 30] {
                helper.add(int(v).as_value()).unwrap();
            }
            helper.remove(int(20).as_value()).unwrap();
        }

        let mut writer = ArchiveWriter::new();
        prop.serialize_value(a.as_value(), &mut writer, &cx).unwrap();
        let bytes = writer.into_bytes();

        let mut b = buffer_for(&prop);
        prop.deserialize_value(b.as_value_mut(), &mut ArchiveReader::new(&bytes), &cx)
            .unwrap();
        let view = prop.view(b.as_value());
        assert!(!view.is_dirty());
        assert_eq!(view.len(), 2);
        assert!(prop.identical(a.as_value(), b.as_value()));

        prop.destroy_value(a.as_value_mut());
        prop.destroy_value(b.as_value_mut());
    }

    #[test]
    fn test_failed_import_keeps_previous_contents() {
        let services = EngineServices::new();
        let cx = PortContext::new(&services);
        let prop = SetProperty::new(Property::new("tag", PropertyKind::Str(StrProperty))).unwrap();
        let mut set = buffer_for(&prop);
        prop.import_value(set.as_value_mut(), &mut TextCursor::new("(x,y)"), &cx)
            .unwrap();

        let err = prop
            .import_value(set.as_value_mut(), &mut TextCursor::new("(a,\"unterminated"), &cx)
            .unwrap_err();
        assert!(err.message.contains("unterminated"));

        let view = prop.view(set.as_value());
        assert!(!view.is_dirty());
        assert_eq!(view.len(), 2);

        let element = prop.element();
        let mut x = ValueBuffer::zeroed(element.element_size(), element.alignment()).unwrap();
        element.import_text("x", x.as_value_mut(), &cx).unwrap();
        assert!(view.contains(x.as_value()).unwrap());
        element.destroy(x.as_value_mut());

        let mut out = String::new();
        prop.export_value(set.as_value(), &mut out, &cx);
        assert_eq!(out, "(\"x\",\"y\")");
        prop.destroy_value(set.as_value_mut());
    }
}
