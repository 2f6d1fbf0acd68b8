//! Tagged record streams
//!
//! Each field element is written behind a tag, so a stream written by one
//! version of a record type can be read by another:
//!
//! ```text
//! ┌──────────┬───────────┬───────────┬──────────────┬─────────┐
//! │ name str │ type str  │ index u32 │ payload size │ payload │ ... ""
//! └──────────┴───────────┴───────────┴──────────────┴─────────┘
//! ```
//!
//! The type string spells out element types, e.g. `Map<Name,Array<Int32>>`
//! or `Struct<Vec3>`. An empty name ends the stream; field names are never
//! empty.
//!
//! On read, tags are matched to fields by name. Unknown fields and fields
//! whose type changed incompatibly are skipped by payload size, as is a
//! payload that no longer reads as its field. A numeric field whose width
//! or signedness changed is converted.

use crate::error::{ArchiveError, PropertyResult};
use crate::memory::{ValueBuffer, ValueMut, ValueRef};
use crate::property::{NumericValue, Property, PropertyFlags, PropertyKind, PropertyOps};
use crate::record::RecordType;

use super::{ArchiveReader, ArchiveWriter, PortContext};

/// Name of the tag that ends a stream
const END_TAG: &str = "";

/// Options for tagged serialization
#[derive(Debug, Clone, Copy)]
pub struct TaggedOptions {
    /// Leave out field elements equal to the record's initial value
    pub skip_defaults: bool,
    /// Log a warning when a converted number does not fit its new type
    pub warn_on_narrowing: bool,
}

impl Default for TaggedOptions {
    fn default() -> Self {
        Self {
            skip_defaults: false,
            warn_on_narrowing: true,
        }
    }
}

struct Tag<'b> {
    name: &'b str,
    kind: &'b str,
    index: usize,
    payload: &'b [u8],
}

impl<'b> Tag<'b> {
    fn read(ar: &mut ArchiveReader<'b>) -> Result<Option<Self>, ArchiveError> {
        let name = ar.read_str()?;
        if name == END_TAG {
            return Ok(None);
        }
        let kind = ar.read_str()?;
        let index = ar.read_u32()? as usize;
        let payload = ar.read_bytes()?;
        Ok(Some(Self {
            name,
            kind,
            index,
            payload,
        }))
    }
}

/// Write every non-transient field element of `value` as a tagged stream
pub fn serialize_tagged(
    record: &RecordType,
    value: ValueRef<'_>,
    ar: &mut ArchiveWriter,
    cx: &PortContext<'_>,
    options: TaggedOptions,
) -> PropertyResult<()> {
    let baseline = if options.skip_defaults {
        let mut buffer = ValueBuffer::zeroed(record.size(), record.alignment())?;
        record.initialize(buffer.as_value_mut());
        Some(buffer)
    } else {
        None
    };

    let result = write_fields(record, value, baseline.as_ref(), ar, cx);

    if let Some(mut buffer) = baseline {
        record.destroy(buffer.as_value_mut());
    }
    result?;
    ar.write_str(END_TAG)?;
    Ok(())
}

fn write_fields(
    record: &RecordType,
    value: ValueRef<'_>,
    baseline: Option<&ValueBuffer>,
    ar: &mut ArchiveWriter,
    cx: &PortContext<'_>,
) -> PropertyResult<()> {
    for prop in record.properties() {
        if prop.has_any_flags(PropertyFlags::TRANSIENT) {
            continue;
        }
        for index in 0..prop.array_dim() {
            let element = prop.container_value(value, index)?;
            if let Some(baseline) = baseline {
                let initial = prop.container_value(baseline.as_value(), index)?;
                if prop.kind().identical(element, initial) {
                    continue;
                }
            }

            let mut payload = ArchiveWriter::new();
            prop.serialize_item(element, &mut payload, cx)?;
            ar.write_str(prop.name())?;
            ar.write_str(&type_signature(prop))?;
            ar.write_len(index)?;
            ar.write_bytes(payload.as_bytes())?;
        }
    }
    Ok(())
}

/// Read a tagged stream into an initialized record value
///
/// Fields not present in the stream keep their value. Returns the number of
/// field elements that were read.
pub fn deserialize_tagged(
    record: &RecordType,
    mut dest: ValueMut<'_>,
    ar: &mut ArchiveReader<'_>,
    cx: &PortContext<'_>,
    options: TaggedOptions,
) -> PropertyResult<usize> {
    let mut read = 0;
    while let Some(tag) = Tag::read(ar)? {
        let Some(prop) = record.find_property(tag.name) else {
            tracing::debug!("Skipping unknown field '{}' in '{}'", tag.name, record.name());
            continue;
        };
        if prop.has_any_flags(PropertyFlags::TRANSIENT) {
            continue;
        }
        if tag.index >= prop.array_dim() {
            tracing::debug!(
                "Skipping '{}[{}]' in '{}': array holds {}",
                tag.name,
                tag.index,
                record.name(),
                prop.array_dim()
            );
            continue;
        }

        let element = prop.container_value_mut(dest.reborrow(), tag.index)?;
        let mut payload = ArchiveReader::new(tag.payload);
        if tag.kind == type_signature(prop) {
            match read_element(prop, element, &mut payload, cx) {
                Ok(()) => read += 1,
                Err(e) => tracing::warn!(
                    "Skipping '{}[{}]' in '{}': {}",
                    tag.name,
                    tag.index,
                    record.name(),
                    e
                ),
            }
        } else if convert_numeric(prop, &tag, element, &mut payload, options)? {
            read += 1;
        } else {
            tracing::debug!(
                "Skipping '{}' in '{}': stored as {}, now {}",
                tag.name,
                record.name(),
                tag.kind,
                type_signature(prop)
            );
        }
    }
    Ok(read)
}

/// Type of a field element, including container element and struct types
pub fn type_signature(prop: &Property) -> String {
    match prop.kind() {
        PropertyKind::Array(array) => format!("Array<{}>", type_signature(array.inner())),
        PropertyKind::Set(set) => format!("Set<{}>", type_signature(set.element())),
        PropertyKind::Map(map) => format!(
            "Map<{},{}>",
            type_signature(map.key()),
            type_signature(map.value())
        ),
        PropertyKind::Struct(structure) => format!("Struct<{}>", structure.record().name()),
        kind => kind.kind_name().to_string(),
    }
}

/// Read one element into scratch space, storing it only if the whole read succeeds
fn read_element(
    prop: &Property,
    element: ValueMut<'_>,
    payload: &mut ArchiveReader<'_>,
    cx: &PortContext<'_>,
) -> PropertyResult<()> {
    let kind = prop.kind();
    let mut scratch = ValueBuffer::zeroed(prop.element_size(), prop.alignment())?;
    kind.initialize_value(scratch.as_value_mut());
    let result = kind.deserialize_value(scratch.as_value_mut(), payload, cx);
    if result.is_ok() {
        kind.copy_value(element, scratch.as_value());
    }
    kind.destroy_value(scratch.as_value_mut());
    result
}

/// Store a numeric payload of another numeric kind; false if not convertible
fn convert_numeric(
    prop: &Property,
    tag: &Tag<'_>,
    element: ValueMut<'_>,
    payload: &mut ArchiveReader<'_>,
    options: TaggedOptions,
) -> PropertyResult<bool> {
    let Ok(numeric) = prop.as_numeric() else {
        return Ok(false);
    };
    let Some(stored) = NumericValue::read_archived(tag.kind, payload) else {
        return Ok(false);
    };
    let stored: NumericValue = stored?;
    if !numeric.can_hold(stored) && options.warn_on_narrowing {
        tracing::warn!(
            "Converting '{}' from {} to {} loses precision ({:?})",
            tag.name,
            tag.kind,
            prop.kind_name(),
            stored
        );
    }
    numeric.set_numeric(element, stored);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::containers::{ArrayProperty, MapProperty};
    use crate::property::{NumericProperty, StrProperty, StructProperty};
    use crate::record::RecordValue;
    use propsys_engine::EngineServices;
    use std::sync::Arc;

    fn record(fields: Vec<Property>) -> Arc<RecordType> {
        Arc::new(RecordType::new("Save", None, fields).unwrap())
    }

    #[test]
    fn test_reads_across_schema_changes() {
        let services = EngineServices::new();
        let cx = PortContext::new(&services);
        let old = record(vec![
            Property::new("score", PropertyKind::Int16(NumericProperty::new())),
            Property::new("removed", PropertyKind::Str(StrProperty)),
            Property::new("ratio", PropertyKind::Double(NumericProperty::new())),
            Property::new("cache", PropertyKind::Int32(NumericProperty::new()))
                .with_flags(PropertyFlags::TRANSIENT),
        ]);
        let mut value = RecordValue::new(old.clone()).unwrap();
        value
            .import_text("(score=-300,removed=gone,ratio=2.5,cache=9)", &cx)
            .unwrap();

        let mut writer = ArchiveWriter::new();
        serialize_tagged(&old, value.as_value(), &mut writer, &cx, TaggedOptions::default())
            .unwrap();
        let bytes = writer.into_bytes();

        let new = record(vec![
            Property::new("ratio", PropertyKind::Float(NumericProperty::new())),
            Property::new("score", PropertyKind::Int64(NumericProperty::new())),
            Property::new("cache", PropertyKind::Int32(NumericProperty::new())),
        ]);
        let mut loaded = RecordValue::new(new.clone()).unwrap();
        let read = deserialize_tagged(
            &new,
            loaded.as_value_mut(),
            &mut ArchiveReader::new(&bytes),
            &cx,
            TaggedOptions::default(),
        )
        .unwrap();

        assert_eq!(read, 2);
        assert_eq!(loaded.get::<i64>("score", 0).unwrap(), -300);
        assert_eq!(loaded.get::<f32>("ratio", 0).unwrap(), 2.5);
        assert_eq!(loaded.get::<i32>("cache", 0).unwrap(), 0);
    }

    #[test]
    fn test_narrowing_still_writes() {
        let services = EngineServices::new();
        let cx = PortContext::new(&services);
        let wide = record(vec![Property::new(
            "level",
            PropertyKind::Int32(NumericProperty::new()),
        )]);
        let mut value = RecordValue::new(wide.clone()).unwrap();
        value.set("level", 0, 300i32).unwrap();

        let mut writer = ArchiveWriter::new();
        serialize_tagged(&wide, value.as_value(), &mut writer, &cx, TaggedOptions::default())
            .unwrap();
        let bytes = writer.into_bytes();

        let narrow = record(vec![Property::new(
            "level",
            PropertyKind::UInt8(NumericProperty::new()),
        )]);
        let mut loaded = RecordValue::new(narrow.clone()).unwrap();
        deserialize_tagged(
            &narrow,
            loaded.as_value_mut(),
            &mut ArchiveReader::new(&bytes),
            &cx,
            TaggedOptions::default(),
        )
        .unwrap();
        assert_eq!(loaded.get::<u8>("level", 0).unwrap(), 300i32 as u8);
    }

    #[test]
    fn test_skip_defaults() {
        let services = EngineServices::new();
        let cx = PortContext::new(&services);
        let save = record(vec![
            Property::new("a", PropertyKind::Int32(NumericProperty::new())),
            Property::new("b", PropertyKind::Int32(NumericProperty::new())).with_array_dim(3),
        ]);
        let mut value = RecordValue::new(save.clone()).unwrap();
        value.set("b", 2, 4i32).unwrap();

        let options = TaggedOptions {
            skip_defaults: true,
            ..TaggedOptions::default()
        };
        let mut sparse = ArchiveWriter::new();
        serialize_tagged(&save, value.as_value(), &mut sparse, &cx, options).unwrap();
        let mut full = ArchiveWriter::new();
        serialize_tagged(&save, value.as_value(), &mut full, &cx, TaggedOptions::default())
            .unwrap();
        assert!(sparse.len() < full.len());

        let bytes = sparse.into_bytes();
        let mut loaded = RecordValue::new(save.clone()).unwrap();
        let read = deserialize_tagged(
            &save,
            loaded.as_value_mut(),
            &mut ArchiveReader::new(&bytes),
            &cx,
            options,
        )
        .unwrap();
        assert_eq!(read, 1);
        assert!(loaded.identical(&value));
    }

    #[test]
    fn test_truncated_stream() {
        let services = EngineServices::new();
        let cx = PortContext::new(&services);
        let save = record(vec![Property::new(
            "a",
            PropertyKind::Int32(NumericProperty::new()),
        )]);
        let mut loaded = RecordValue::new(save.clone()).unwrap();
        let err = deserialize_tagged(
            &save,
            loaded.as_value_mut(),
            &mut ArchiveReader::new(&[1, 0]),
            &cx,
            TaggedOptions::default(),
        );
        assert!(err.is_err());
    }

    fn round_trip(
        from: &RecordType,
        value: &RecordValue,
        to: &Arc<RecordType>,
        cx: &PortContext<'_>,
    ) -> (PropertyResult<usize>, RecordValue) {
        let mut writer = ArchiveWriter::new();
        serialize_tagged(from, value.as_value(), &mut writer, cx, TaggedOptions::default())
            .unwrap();
        let bytes = writer.into_bytes();
        let mut loaded = RecordValue::new(to.clone()).unwrap();
        let read = deserialize_tagged(
            to,
            loaded.as_value_mut(),
            &mut ArchiveReader::new(&bytes),
            cx,
            TaggedOptions::default(),
        );
        (read, loaded)
    }

    fn int32() -> PropertyKind {
        PropertyKind::Int32(NumericProperty::new())
    }

    #[test]
    fn test_field_named_none_is_an_ordinary_tag() {
        let services = EngineServices::new();
        let cx = PortContext::new(&services);
        let save = record(vec![
            Property::new("None", int32()),
            Property::new("after", int32()),
        ]);
        let mut value = RecordValue::new(save.clone()).unwrap();
        value.set("None", 0, 7i32).unwrap();
        value.set("after", 0, 9i32).unwrap();

        let (read, loaded) = round_trip(&save, &value, &save, &cx);
        assert_eq!(read.unwrap(), 2);
        assert_eq!(loaded.get::<i32>("None", 0).unwrap(), 7);
        assert_eq!(loaded.get::<i32>("after", 0).unwrap(), 9);
    }

    #[test]
    fn test_type_signatures() {
        let nested = record(vec![Property::new("x", int32())]);
        let map = MapProperty::new(
            Property::new("key", PropertyKind::Str(StrProperty)),
            Property::new(
                "value",
                PropertyKind::Array(ArrayProperty::new(Property::new("v", int32()))),
            ),
        )
        .unwrap();
        assert_eq!(
            type_signature(&Property::new("m", PropertyKind::Map(map))),
            "Map<Str,Array<Int32>>"
        );
        assert_eq!(
            type_signature(&Property::new("s", PropertyKind::Struct(StructProperty::new(nested)))),
            "Struct<Save>"
        );
        assert_eq!(type_signature(&Property::new("i", int32())), "Int32");
    }

    #[test]
    fn test_changed_element_type_is_skipped() {
        let services = EngineServices::new();
        let cx = PortContext::new(&services);
        let ints = || PropertyKind::Array(ArrayProperty::new(Property::new("v", int32())));
        let strings = || {
            PropertyKind::Array(ArrayProperty::new(Property::new(
                "v",
                PropertyKind::Str(StrProperty),
            )))
        };

        let old = record(vec![Property::new("v", ints()), Property::new("k", int32())]);
        let mut value = RecordValue::new(old.clone()).unwrap();
        value.import_text("(v=(1000,2),k=5)", &cx).unwrap();

        let new = record(vec![Property::new("v", strings()), Property::new("k", int32())]);
        let (read, loaded) = round_trip(&old, &value, &new, &cx);
        assert_eq!(read.unwrap(), 1);
        assert_eq!(loaded.export_field("v", 0, &cx).unwrap(), "()");
        assert_eq!(loaded.get::<i32>("k", 0).unwrap(), 5);
    }

    #[test]
    fn test_unreadable_payload_is_skipped() {
        let services = EngineServices::new();
        let cx = PortContext::new(&services);
        let old_inner = Arc::new(RecordType::new("Inner", None, vec![Property::new("x", int32())]).unwrap());
        let new_inner = Arc::new(
            RecordType::new("Inner", None, vec![Property::new("x", PropertyKind::Str(StrProperty))])
                .unwrap(),
        );

        let old = record(vec![
            Property::new("inner", PropertyKind::Struct(StructProperty::new(old_inner))),
            Property::new("k", int32()),
        ]);
        let mut value = RecordValue::new(old.clone()).unwrap();
        value.import_text("(inner=(x=5),k=6)", &cx).unwrap();

        let new = record(vec![
            Property::new("inner", PropertyKind::Struct(StructProperty::new(new_inner))),
            Property::new("k", int32()),
        ]);
        let (read, loaded) = round_trip(&old, &value, &new, &cx);
        assert_eq!(read.unwrap(), 1);
        assert_eq!(loaded.export_field("inner", 0, &cx).unwrap(), "(x=\"\")");
        assert_eq!(loaded.get::<i32>("k", 0).unwrap(), 6);
    }
}
