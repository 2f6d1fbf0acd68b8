//! Map properties and their adapters
//!
//! A map is a sparse table whose payload is a key/value pair. The key sits
//! at offset 0 so the table can hash and compare it without knowing the
//! value.

use propsys_sdk::ScriptSet;

use crate::codec::{ArchiveReader, ArchiveWriter, PortContext, TextCursor};
use crate::error::{ImportError, PropertyError, PropertyResult};
use crate::layout::{PairLayout, SparseLayout};
use crate::memory::{ValueMut, ValueRef};
use crate::property::{Property, PropertyFlags, PropertyOps};

use super::import_replacing;
use super::sparse::{SparseTable, SparseView};

/// Property holding a hash map from one kind to another
#[derive(Debug, Clone)]
pub struct MapProperty {
    key: Box<Property>,
    value: Box<Property>,
    pair: PairLayout,
    layout: SparseLayout,
}

impl MapProperty {
    /// Create a map from `key` values to `value` values
    ///
    /// Fails with [`PropertyError::Unhashable`] if the key kind has no hash.
    pub fn new(key: Property, value: Property) -> PropertyResult<Self> {
        if !key.is_hashable() {
            return Err(PropertyError::Unhashable(key.kind_name()));
        }
        let pair = PairLayout::new(
            (key.element_size(), key.alignment()),
            (value.element_size(), value.alignment()),
        )?;
        let layout = SparseLayout::new(pair.size, pair.alignment)?;
        Ok(Self {
            key: Box::new(key.into_element()),
            value: Box::new(value.into_element()),
            pair,
            layout,
        })
    }

    pub fn key(&self) -> &Property {
        &self.key
    }

    pub fn value(&self) -> &Property {
        &self.value
    }

    pub fn pair_layout(&self) -> PairLayout {
        self.pair
    }

    pub fn helper<'a>(&'a self, value: ValueMut<'a>) -> ScriptMapHelper<'a> {
        ScriptMapHelper::new(self, value)
    }

    pub fn view<'a>(&'a self, value: ValueRef<'a>) -> ScriptMapView<'a> {
        ScriptMapView::new(self, value)
    }

    fn value_part<'a>(&self, pair: ValueRef<'a>) -> ValueRef<'a> {
        pair.slice(self.pair.value_offset, self.value.element_size())
            .unwrap_or_else(|e| panic!("map value: {}", e))
    }

    fn key_part_mut<'a>(&self, pair: ValueMut<'a>) -> ValueMut<'a> {
        pair.into_slice(self.pair.key_offset, self.key.element_size())
            .unwrap_or_else(|e| panic!("map key: {}", e))
    }

    fn value_part_mut<'a>(&self, pair: ValueMut<'a>) -> ValueMut<'a> {
        pair.into_slice(self.pair.value_offset, self.value.element_size())
            .unwrap_or_else(|e| panic!("map value: {}", e))
    }

    fn construct_pair(&self, mut pair: ValueMut<'_>) {
        self.key.initialize(self.key_part_mut(pair.reborrow()));
        self.value.initialize(self.value_part_mut(pair));
    }

    fn destroy_pair(&self, mut pair: ValueMut<'_>) {
        self.key.destroy(self.key_part_mut(pair.reborrow()));
        self.value.destroy(self.value_part_mut(pair));
    }
}

/// Read-only map adapter
#[derive(Clone, Copy)]
pub struct ScriptMapView<'a> {
    prop: &'a MapProperty,
    table: SparseView<'a>,
}

impl<'a> ScriptMapView<'a> {
    pub fn new(prop: &'a MapProperty, value: ValueRef<'a>) -> Self {
        // SAFETY: map values are ScriptSet headers
        let set = unsafe { value.cast::<ScriptSet>() };
        Self {
            prop,
            table: SparseView::new(prop.layout, &prop.key, set),
        }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_index(&self) -> usize {
        self.table.max_index()
    }

    pub fn is_valid_index(&self, index: usize) -> bool {
        self.table.is_valid_index(index)
    }

    pub fn is_dirty(&self) -> bool {
        self.table.is_dirty()
    }

    pub fn indices(&self) -> impl Iterator<Item = usize> + 'a {
        self.table.indices()
    }

    /// Whole pair at slot `index`
    pub fn pair_at(&self, index: usize) -> PropertyResult<ValueRef<'a>> {
        self.table.try_payload(index)
    }

    pub fn key_at(&self, index: usize) -> PropertyResult<ValueRef<'a>> {
        self.table.try_payload(index)?;
        Ok(self.table.key_of(index))
    }

    pub fn value_at(&self, index: usize) -> PropertyResult<ValueRef<'a>> {
        Ok(self.prop.value_part(self.table.try_payload(index)?))
    }

    /// Key/value pairs in slot order
    pub fn iter(&self) -> impl Iterator<Item = (ValueRef<'a>, ValueRef<'a>)> + 'a {
        let (prop, table) = (self.prop, self.table);
        table
            .indices()
            .map(move |i| (table.key_of(i), prop.value_part(table.payload(i))))
    }

    pub fn find_index(&self, key: ValueRef<'_>) -> PropertyResult<Option<usize>> {
        self.table.find_index(key)
    }

    pub fn find_index_linear(&self, key: ValueRef<'_>) -> Option<usize> {
        self.table.find_index_linear(key)
    }

    pub fn find_value(&self, key: ValueRef<'_>) -> PropertyResult<Option<ValueRef<'a>>> {
        Ok(self
            .find_index(key)?
            .map(|i| self.prop.value_part(self.table.payload(i))))
    }

    pub fn contains_key(&self, key: ValueRef<'_>) -> PropertyResult<bool> {
        Ok(self.find_index(key)?.is_some())
    }
}

/// Mutable map adapter
pub struct ScriptMapHelper<'a> {
    prop: &'a MapProperty,
    table: SparseTable<'a>,
}

impl<'a> ScriptMapHelper<'a> {
    pub fn new(prop: &'a MapProperty, value: ValueMut<'a>) -> Self {
        // SAFETY: map values are ScriptSet headers
        let set = unsafe { value.into_cast_mut::<ScriptSet>() };
        Self {
            prop,
            table: SparseTable::new(prop.layout, &prop.key, set),
        }
    }

    pub fn view(&self) -> ScriptMapView<'_> {
        ScriptMapView {
            prop: self.prop,
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

    pub fn find_index(&self, key: ValueRef<'_>) -> PropertyResult<Option<usize>> {
        self.table.view().find_index(key)
    }

    pub fn value_at_mut(&mut self, index: usize) -> PropertyResult<ValueMut<'_>> {
        let prop = self.prop;
        Ok(prop.value_part_mut(self.table.try_payload_mut(index)?))
    }

    /// Key of slot `index`; the map is marked dirty until the next rehash
    pub fn key_at_mut(&mut self, index: usize) -> PropertyResult<ValueMut<'_>> {
        if !self.is_valid_index(index) {
            return Err(PropertyError::IndexOutOfRange {
                index,
                len: self.max_index(),
            });
        }
        self.table.mark_dirty();
        let prop = self.prop;
        Ok(prop.key_part_mut(self.table.payload_mut(index)))
    }

    pub fn find_value_mut(&mut self, key: ValueRef<'_>) -> PropertyResult<Option<ValueMut<'_>>> {
        match self.find_index(key)? {
            Some(index) => Ok(Some(self.value_at_mut(index)?)),
            None => Ok(None),
        }
    }

    /// Insert a pair, or overwrite the value stored under an identical key
    ///
    /// Returns the slot index.
    pub fn add(&mut self, key: ValueRef<'_>, value: ValueRef<'_>) -> PropertyResult<usize> {
        if self.table.view().is_dirty() {
            return Err(PropertyError::NeedsRehash);
        }
        let prop = self.prop;
        let hash = prop.key.hash(key)?;
        if let Some(index) = self.table.view().find_hashed(key, hash) {
            prop.value
                .copy_complete(prop.value_part_mut(self.table.payload_mut(index)), value);
            return Ok(index);
        }
        let index = self.table.allocate();
        prop.construct_pair(self.table.payload_mut(index));
        prop.key
            .copy_complete(prop.key_part_mut(self.table.payload_mut(index)), key);
        prop.value
            .copy_complete(prop.value_part_mut(self.table.payload_mut(index)), value);
        self.table.link(index, hash)?;
        Ok(index)
    }

    /// Remove the pair with `key`, returning whether it was present
    pub fn remove(&mut self, key: ValueRef<'_>) -> PropertyResult<bool> {
        match self.find_index(key)? {
            Some(index) => {
                self.remove_at(index)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn remove_at(&mut self, index: usize) -> PropertyResult<()> {
        let prop = self.prop;
        self.table.remove_at(index, &mut |pair| prop.destroy_pair(pair))
    }

    /// Append a constructed pair without hashing its key
    ///
    /// Fill in the key through [`ScriptMapHelper::key_at_mut`], then call
    /// [`ScriptMapHelper::rehash`] before any hashed query.
    pub fn add_default_needs_rehash(&mut self) -> usize {
        let index = self.table.allocate();
        self.prop.construct_pair(self.table.payload_mut(index));
        self.table.mark_dirty();
        index
    }

    /// Rebuild the hash index; for duplicate keys the highest slot wins
    pub fn rehash(&mut self) -> PropertyResult<usize> {
        let prop = self.prop;
        self.table.rehash(&mut |pair| prop.destroy_pair(pair))
    }

    pub fn empty(&mut self) {
        let prop = self.prop;
        self.table.empty(&mut |pair| prop.destroy_pair(pair));
    }

    fn pair_mut(&mut self, index: usize) -> ValueMut<'_> {
        self.table.payload_mut(index)
    }
}

impl PropertyOps for MapProperty {
    fn kind_name(&self) -> &'static str {
        "Map"
    }

    fn value_layout(&self) -> (usize, usize) {
        (
            std::mem::size_of::<ScriptSet>(),
            std::mem::align_of::<ScriptSet>(),
        )
    }

    fn intrinsic_flags(&self) -> PropertyFlags {
        PropertyFlags::ZERO_CONSTRUCTIBLE
            | ((self.key.flags() | self.value.flags()) & PropertyFlags::REFERENCES)
    }

    fn identical(&self, a: ValueRef<'_>, b: ValueRef<'_>) -> bool {
        let (a, b) = (self.view(a), self.view(b));
        if a.len() != b.len() {
            return false;
        }
        a.iter().all(|(key, value)| {
            let found = match b.find_index(key) {
                Ok(found) => found,
                Err(_) => b.find_index_linear(key),
            };
            found
                .and_then(|i| b.value_at(i).ok())
                .is_some_and(|other| self.value.identical(value, other))
        })
    }

    fn copy_value(&self, dest: ValueMut<'_>, src: ValueRef<'_>) {
        let src = self.view(src);
        let mut helper = self.helper(dest);
        helper.empty();
        for index in src.indices() {
            let Ok(pair) = src.pair_at(index) else {
                continue;
            };
            let slot = helper.add_default_needs_rehash();
            let mut dest = helper.pair_mut(slot);
            self.key.copy_complete(
                self.key_part_mut(dest.reborrow()),
                src.table.key_of(index),
            );
            self.value
                .copy_complete(self.value_part_mut(dest), self.value_part(pair));
        }
        if let Err(e) = helper.rehash() {
            tracing::warn!("Map copy left unindexed: {}", e);
        }
    }

    fn destroy_value(&self, dest: ValueMut<'_>) {
        self.helper(dest).empty();
    }

    fn export_value(&self, value: ValueRef<'_>, out: &mut String, cx: &PortContext<'_>) {
        let inner = cx.delimited();
        out.push('(');
        for (i, (key, value)) in self.view(value).iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push('(');
            out.push_str(&self.key.export_text(key, &inner));
            out.push(',');
            out.push_str(&self.value.export_text(value, &inner));
            out.push(')');
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
                    cursor.expect('(')?;
                    let index = helper.add_default_needs_rehash();
                    let mut pair = helper.pair_mut(index);
                    self.key
                        .import_item(self.key_part_mut(pair.reborrow()), cursor, &inner)?;
                    cursor.expect(',')?;
                    self.value
                        .import_item(self.value_part_mut(pair), cursor, &inner)?;
                    cursor.expect(')')?;
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
        for (key, value) in view.iter() {
            self.key.serialize_item(key, ar, cx)?;
            self.value.serialize_item(value, ar, cx)?;
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
            let mut pair = helper.pair_mut(index);
            self.key
                .deserialize_item(self.key_part_mut(pair.reborrow()), ar, cx)?;
            self.value
                .deserialize_item(self.value_part_mut(pair), ar, cx)?;
        }
        helper.rehash()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ValueBuffer;
    use crate::property::{NumericProperty, PropertyKind, StrProperty};
    use propsys_engine::EngineServices;
    use propsys_sdk::ScriptString;

    fn name_to_score() -> MapProperty {
        MapProperty::new(
            Property::new("key", PropertyKind::Str(StrProperty)),
            Property::new("value", PropertyKind::Int32(NumericProperty::new())),
        )
        .unwrap()
    }

    fn buffer_for(prop: &MapProperty) -> ValueBuffer {
        let (size, align) = prop.value_layout();
        ValueBuffer::zeroed(size, align).unwrap()
    }

    fn string(text: &str) -> ValueBuffer {
        let (size, align) = (
            std::mem::size_of::<ScriptString>(),
            std::mem::align_of::<ScriptString>(),
        );
        let mut buffer = ValueBuffer::zeroed(size, align).unwrap();
        // SAFETY: buffer is sized and aligned for a ScriptString
        unsafe { buffer.as_value_mut().cast_mut::<ScriptString>() }.set(text);
        buffer
    }

    fn free_string(mut buffer: ValueBuffer) {
        // SAFETY: as above
        unsafe { buffer.as_value_mut().cast_mut::<ScriptString>() }.free();
    }

    fn int(value: i32) -> ValueBuffer {
        let mut buffer = ValueBuffer::zeroed(4, 4).unwrap();
        buffer.as_value_mut().write(value);
        buffer
    }

    #[test]
    fn test_add_overwrites_existing_key() {
        let prop = name_to_score();
        let mut map = buffer_for(&prop);
        let (alice, bob) = (string("alice"), string("bob"));
        {
            let mut helper = prop.helper(map.as_value_mut());
            let first = helper.add(alice.as_value(), int(1).as_value()).unwrap();
            helper.add(bob.as_value(), int(2).as_value()).unwrap();
            assert_eq!(helper.add(alice.as_value(), int(10).as_value()).unwrap(), first);
            assert_eq!(helper.len(), 2);
        }

        let view = prop.view(map.as_value());
        let found = view.find_value(alice.as_value()).unwrap().unwrap();
        assert_eq!(found.read::<i32>(), 10);
        let carol = string("carol");
        assert!(view.find_value(carol.as_value()).unwrap().is_none());
        free_string(carol);

        prop.destroy_value(map.as_value_mut());
        free_string(alice);
        free_string(bob);
    }

    #[test]
    fn test_remove_and_find_value_mut() {
        let prop = name_to_score();
        let mut map = buffer_for(&prop);
        let key = string("k");
        let mut helper = prop.helper(map.as_value_mut());
        helper.add(key.as_value(), int(5).as_value()).unwrap();

        helper
            .find_value_mut(key.as_value())
            .unwrap()
            .unwrap()
            .write(6i32);
        let index = helper.find_index(key.as_value()).unwrap().unwrap();
        assert_eq!(helper.view().value_at(index).unwrap().read::<i32>(), 6);

        assert!(helper.remove(key.as_value()).unwrap());
        assert!(helper.is_empty());
        assert!(helper.view().value_at(index).is_err());
        helper.empty();
        free_string(key);
    }

    #[test]
    fn test_text_form() {
        let services = EngineServices::new();
        let cx = PortContext::new(&services);
        let prop = name_to_score();
        let mut map = buffer_for(&prop);

        prop.import_value(
            map.as_value_mut(),
            &mut TextCursor::new("((\"a b\",1),(c,2),(\"a b\",3))"),
            &cx,
        )
        .unwrap();
        let view = prop.view(map.as_value());
        assert_eq!(view.len(), 2);

        let mut out = String::new();
        prop.export_value(map.as_value(), &mut out, &cx);
        assert_eq!(out, "((\"c\",2),(\"a b\",3))");

        let mut copy = buffer_for(&prop);
        prop.copy_value(copy.as_value_mut(), map.as_value());
        assert!(prop.identical(map.as_value(), copy.as_value()));

        prop.destroy_value(map.as_value_mut());
        prop.destroy_value(copy.as_value_mut());
    }

    #[test]
    fn test_archive_round_trip() {
        let services = EngineServices::new();
        let cx = PortContext::new(&services);
        let prop = name_to_score();
        let mut a = buffer_for(&prop);
        prop.import_value(a.as_value_mut(), &mut TextCursor::new("((x,1),(y,2))"), &cx)
            .unwrap();

        let mut writer = ArchiveWriter::new();
        prop.serialize_value(a.as_value(), &mut writer, &cx).unwrap();
        let bytes = writer.into_bytes();

        let mut b = buffer_for(&prop);
        prop.deserialize_value(b.as_value_mut(), &mut ArchiveReader::new(&bytes), &cx)
            .unwrap();
        assert!(prop.identical(a.as_value(), b.as_value()));

        prop.destroy_value(a.as_value_mut());
        prop.destroy_value(b.as_value_mut());
    }

    #[test]
    fn test_unhashable_key_rejected() {
        let key = Property::new(
            "key",
            PropertyKind::Map(name_to_score()),
        );
        let value = Property::new("value", PropertyKind::Int32(NumericProperty::new()));
        assert!(matches!(
            MapProperty::new(key, value),
            Err(PropertyError::Unhashable("Map"))
        ));
    }

    #[test]
    fn test_failed_import_keeps_previous_contents() {
        let services = EngineServices::new();
        let cx = PortContext::new(&services);
        let prop = name_to_score();
        let mut map = buffer_for(&prop);
        prop.import_value(map.as_value_mut(), &mut TextCursor::new("((a,1))"), &cx)
            .unwrap();

        for text in ["((b,2),(c", "((b,2),(c,\"3\"))", "((b,2)"] {
            assert!(prop
                .import_value(map.as_value_mut(), &mut TextCursor::new(text), &cx)
                .is_err());
        }

        let view = prop.view(map.as_value());
        assert!(!view.is_dirty());
        assert_eq!(view.len(), 1);
        let key = string("a");
        assert!(view.find_index(key.as_value()).unwrap().is_some());
        free_string(key);
        prop.destroy_value(map.as_value_mut());
    }
}
