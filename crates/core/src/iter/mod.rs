//! Value Traversal - depth-first walk over a record value
//!
//! [`PropertyValueIterator`] flattens a nested record into a sequence of
//! [`PropertyValue`]s: every field element, and (with full recursion) every
//! struct field, array element, set element and map key/value reachable
//! from it. Parents are yielded before their children.
//!
//! ```text
//! Actor { id, origin: Vec3 { x, y }, tags: [a, b], hp }
//!
//!   id
//!   origin            ─┐ child frame
//!   origin.x           │
//!   origin.y          ─┘
//!   tags              ─┐ child frame
//!   tags[0]            │
//!   tags[1]           ─┘
//!   hp
//! ```
//!
//! The frame stack only ever grows by value embedding, which is acyclic.
//! Object references are leaves and never followed.

pub mod scan;

use crate::memory::ValueRef;
use crate::property::{Property, PropertyFlags, PropertyKind};
use crate::record::RecordType;

pub use scan::{collect_references, diff_records};

/// How far the iterator descends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecursionMode {
    /// Top-level field elements only
    NoRecursion,
    /// Structs and containers are expanded
    #[default]
    Full,
}

/// Where a yielded value sits inside its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Element `index` of a record field; `index` is only shown for static arrays
    Field { name: &'a str, index: usize, dim: usize },
    /// Element of an array, or slot of a set
    Element(usize),
    /// Key of map slot `n`
    MapKey(usize),
    /// Value of map slot `n`
    MapValue(usize),
}

impl Segment<'_> {
    fn write_to(&self, out: &mut String) {
        match *self {
            Segment::Field { name, index, dim } => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(name);
                if dim > 1 {
                    out.push_str(&format!("[{}]", index));
                }
            }
            Segment::Element(i) => out.push_str(&format!("[{}]", i)),
            Segment::MapKey(i) => out.push_str(&format!("[{}].Key", i)),
            Segment::MapValue(i) => out.push_str(&format!("[{}].Value", i)),
        }
    }
}

/// One step of a traversal
#[derive(Debug, Clone, Copy)]
pub struct PropertyValue<'a> {
    pub property: &'a Property,
    /// Exactly one element of `property`
    pub value: ValueRef<'a>,
    pub segment: Segment<'a>,
    /// Nesting depth, 0 for the root record's fields
    pub depth: usize,
}

impl<'a> PropertyValue<'a> {
    /// Element index within a static array or container
    pub fn index(&self) -> usize {
        match self.segment {
            Segment::Field { index, .. } => index,
            Segment::Element(i) | Segment::MapKey(i) | Segment::MapValue(i) => i,
        }
    }
}

struct Frame<'a> {
    owner: Option<PropertyValue<'a>>,
    entries: Vec<PropertyValue<'a>>,
    next: usize,
}

type Filter<'a> = Box<dyn Fn(&Property) -> bool + 'a>;

/// Lazy depth-first iterator over the values inside a record
///
/// # Example
/// ```ignore
/// let mut it = PropertyValueIterator::new(&record, value.as_value(), RecursionMode::Full);
/// while let Some(entry) = it.next() {
///     if entry.property.kind_name() == "Array" {
///         it.skip_recursion_once();
///     }
/// }
/// ```
pub struct PropertyValueIterator<'a> {
    root: (&'a RecordType, ValueRef<'a>),
    mode: RecursionMode,
    include_deprecated: bool,
    filter: Option<Filter<'a>>,
    stack: Vec<Frame<'a>>,
    current: Option<PropertyValue<'a>>,
    skip_next_expansion: bool,
}

impl<'a> PropertyValueIterator<'a> {
    /// Start a walk over `record`'s fields in `base`
    ///
    /// # Arguments
    /// * `record` - Record type of the value
    /// * `base` - The record value, at least `record.size()` bytes
    /// * `mode` - Whether structs and containers are expanded
    pub fn new(record: &'a RecordType, base: ValueRef<'a>, mode: RecursionMode) -> Self {
        let mut it = Self {
            root: (record, base),
            mode,
            include_deprecated: false,
            filter: None,
            stack: Vec::new(),
            current: None,
            skip_next_expansion: false,
        };
        it.restart();
        it
    }

    /// Only yield values whose property passes `filter`
    ///
    /// Values that fail the filter are still expanded.
    pub fn with_filter(mut self, filter: impl Fn(&Property) -> bool + 'a) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Also visit fields flagged `DEPRECATED`
    ///
    /// Restarts the walk.
    pub fn include_deprecated(mut self) -> Self {
        self.include_deprecated = true;
        self.restart();
        self
    }

    fn restart(&mut self) {
        let (record, base) = self.root;
        let entries = self.record_entries(record, base, 0);
        self.stack.clear();
        self.stack.push(Frame {
            owner: None,
            entries,
            next: 0,
        });
        self.current = None;
        self.skip_next_expansion = false;
    }

    /// Treat the value just yielded as a leaf
    pub fn skip_recursion_once(&mut self) {
        self.skip_next_expansion = true;
    }

    /// Properties from the value just yielded out to the root record's field
    ///
    /// The current property comes first, the outermost last.
    pub fn property_chain(&self) -> Vec<&'a Property> {
        let mut chain: Vec<&'a Property> = self.current.iter().map(|v| v.property).collect();
        chain.extend(
            self.stack
                .iter()
                .rev()
                .filter_map(|frame| frame.owner.map(|owner| owner.property)),
        );
        chain
    }

    /// Dotted path of the value just yielded, e.g. `origin.x` or `tags[1]`
    pub fn path(&self) -> String {
        let mut path = String::new();
        for owner in self.stack.iter().filter_map(|frame| frame.owner) {
            owner.segment.write_to(&mut path);
        }
        if let Some(current) = self.current {
            current.segment.write_to(&mut path);
        }
        path
    }

    fn record_entries(
        &self,
        record: &'a RecordType,
        base: ValueRef<'a>,
        depth: usize,
    ) -> Vec<PropertyValue<'a>> {
        let mut entries = Vec::new();
        for property in record.properties() {
            if !self.include_deprecated && property.has_any_flags(PropertyFlags::DEPRECATED) {
                continue;
            }
            for index in 0..property.array_dim() {
                match property.container_value(base, index) {
                    Ok(value) => entries.push(PropertyValue {
                        property,
                        value,
                        segment: Segment::Field {
                            name: property.name(),
                            index,
                            dim: property.array_dim(),
                        },
                        depth,
                    }),
                    Err(e) => {
                        tracing::warn!("Skipping '{}' in '{}': {}", property.name(), record.name(), e)
                    }
                }
            }
        }
        entries
    }

    fn children(&self, parent: &PropertyValue<'a>) -> Vec<PropertyValue<'a>> {
        let depth = parent.depth + 1;
        match parent.property.kind() {
            PropertyKind::Struct(s) => self.record_entries(s.record(), parent.value, depth),
            PropertyKind::Array(a) => {
                let view = a.view(parent.value);
                view.iter()
                    .enumerate()
                    .map(|(i, value)| PropertyValue {
                        property: view.inner(),
                        value,
                        segment: Segment::Element(i),
                        depth,
                    })
                    .collect()
            }
            PropertyKind::Set(s) => {
                let view = s.view(parent.value);
                view.indices()
                    .filter_map(|i| view.element(i).ok().map(|value| (i, value)))
                    .map(|(i, value)| PropertyValue {
                        property: s.element(),
                        value,
                        segment: Segment::Element(i),
                        depth,
                    })
                    .collect()
            }
            PropertyKind::Map(m) => {
                let view = m.view(parent.value);
                let mut entries = Vec::with_capacity(view.len() * 2);
                for i in view.indices() {
                    if let (Ok(key), Ok(value)) = (view.key_at(i), view.value_at(i)) {
                        entries.push(PropertyValue {
                            property: m.key(),
                            value: key,
                            segment: Segment::MapKey(i),
                            depth,
                        });
                        entries.push(PropertyValue {
                            property: m.value(),
                            value,
                            segment: Segment::MapValue(i),
                            depth,
                        });
                    }
                }
                entries
            }
            _ => Vec::new(),
        }
    }

    /// Push a frame for the value yielded last, unless it is a leaf
    fn expand_current(&mut self) {
        let skip = std::mem::take(&mut self.skip_next_expansion);
        let Some(current) = self.current.take() else {
            return;
        };
        if skip || self.mode == RecursionMode::NoRecursion || !current.property.kind().is_expandable() {
            return;
        }
        let entries = self.children(&current);
        if !entries.is_empty() {
            self.stack.push(Frame {
                owner: Some(current),
                entries,
                next: 0,
            });
        }
    }

    fn advance(&mut self) -> Option<PropertyValue<'a>> {
        self.expand_current();
        loop {
            let frame = self.stack.last_mut()?;
            if let Some(entry) = frame.entries.get(frame.next).copied() {
                frame.next += 1;
                self.current = Some(entry);
                return Some(entry);
            }
            self.stack.pop();
        }
    }
}

impl<'a> Iterator for PropertyValueIterator<'a> {
    type Item = PropertyValue<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = self.advance()?;
            match &self.filter {
                Some(filter) if !filter(entry.property) => continue,
                _ => return Some(entry),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PortContext;
    use crate::containers::ArrayProperty;
    use crate::property::{NumericProperty, StructProperty};
    use crate::record::RecordValue;
    use propsys_engine::EngineServices;
    use std::sync::Arc;

    fn int(name: &str) -> Property {
        Property::new(name, PropertyKind::Int32(NumericProperty::new()))
    }

    fn actor() -> Arc<RecordType> {
        let vec2 = Arc::new(RecordType::new("Vec2", None, vec![int("x"), int("y")]).unwrap());
        let tags = Property::new("tags", PropertyKind::Array(ArrayProperty::new(int("tag"))));
        Arc::new(
            RecordType::new(
                "Actor",
                None,
                vec![
                    int("id"),
                    Property::new("origin", PropertyKind::Struct(StructProperty::new(vec2))),
                    tags,
                    int("old").with_flags(PropertyFlags::DEPRECATED),
                    int("hp").with_array_dim(2),
                ],
            )
            .unwrap(),
        )
    }

    fn paths(mut it: PropertyValueIterator<'_>) -> Vec<String> {
        let mut out = Vec::new();
        while it.next().is_some() {
            out.push(it.path());
        }
        out
    }

    #[test]
    fn test_full_recursion_order() {
        let services = EngineServices::new();
        let record = actor();
        let mut value = RecordValue::new(record.clone()).unwrap();
        value
            .import_text("(tags=(7,8))", &PortContext::new(&services))
            .unwrap();

        let it = PropertyValueIterator::new(&record, value.as_value(), RecursionMode::Full);
        assert_eq!(
            paths(it),
            [
                "id", "origin", "origin.x", "origin.y", "tags", "tags[0]", "tags[1]", "hp[0]",
                "hp[1]"
            ]
        );
    }

    #[test]
    fn test_no_recursion_and_deprecated() {
        let record = actor();
        let value = RecordValue::new(record.clone()).unwrap();

        let it = PropertyValueIterator::new(&record, value.as_value(), RecursionMode::NoRecursion);
        assert_eq!(paths(it), ["id", "origin", "tags", "hp[0]", "hp[1]"]);

        let it = PropertyValueIterator::new(&record, value.as_value(), RecursionMode::NoRecursion)
            .include_deprecated();
        assert_eq!(paths(it), ["id", "origin", "tags", "old", "hp[0]", "hp[1]"]);
    }

    #[test]
    fn test_skip_recursion_once_and_property_chain() {
        let record = actor();
        let value = RecordValue::new(record.clone()).unwrap();
        let mut it = PropertyValueIterator::new(&record, value.as_value(), RecursionMode::Full);

        let mut seen = Vec::new();
        while let Some(entry) = it.next() {
            if entry.property.name() == "origin" {
                it.skip_recursion_once();
            }
            if entry.property.name() == "id" {
                assert_eq!(it.property_chain().len(), 1);
            }
            seen.push(entry.property.name().to_string());
        }
        assert_eq!(seen, ["id", "origin", "tags", "hp", "hp"]);

        let mut it = PropertyValueIterator::new(&record, value.as_value(), RecursionMode::Full);
        let y = it.find(|entry| entry.property.name() == "y").unwrap();
        assert_eq!(y.depth, 1);
        let names: Vec<&str> = it.property_chain().iter().map(|p| p.name()).collect();
        assert_eq!(names, ["y", "origin"]);
    }

    #[test]
    fn test_filter_still_descends() {
        let record = actor();
        let value = RecordValue::new(record.clone()).unwrap();
        let it = PropertyValueIterator::new(&record, value.as_value(), RecursionMode::Full)
            .with_filter(|p| p.name() == "x" || p.name() == "y");
        let names: Vec<&str> = it.map(|entry| entry.property.name()).collect();
        assert_eq!(names, ["x", "y"]);
    }
}
