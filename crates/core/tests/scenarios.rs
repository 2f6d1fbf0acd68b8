//! End-to-end behaviour of the public API

use propsys_core::codec::write_quoted;
use propsys_core::engine::EngineServices;
use propsys_core::property::BoolProperty;
use propsys_core::registry::EnumDecl;
use propsys_core::{
    ArchiveReader, ArchiveWriter, FieldType, PortContext, Property, PropertyKind, RecordBuilder,
    RecursionMode, PropertyValueIterator, RecordType, TypeRegistry, ValueBuffer,
};

fn element_buffer(prop: &Property) -> ValueBuffer {
    ValueBuffer::zeroed(prop.element_size(), prop.alignment()).unwrap()
}

fn paths(mut it: PropertyValueIterator<'_>) -> Vec<String> {
    let mut out = Vec::new();
    while it.next().is_some() {
        out.push(it.path());
    }
    out
}

#[test]
fn test_traversal_visits_struct_then_leaves_then_siblings() {
    let services = EngineServices::new();
    let cx = PortContext::new(&services);
    let registry = TypeRegistry::new();
    registry
        .register_record(
            RecordBuilder::new("Stats")
                .field("values", FieldType::array(FieldType::Int32))
                .build(),
            &services,
        )
        .unwrap();
    registry
        .register_record(
            RecordBuilder::new("Sheet")
                .field("stats", FieldType::structure("Stats"))
                .field("id", FieldType::Int32)
                .build(),
            &services,
        )
        .unwrap();

    let mut value = registry.instantiate("Sheet").unwrap();
    value
        .import_text("(stats=(values=(1,2,3)),id=9)", &cx)
        .unwrap();
    let record = registry.record("Sheet").unwrap();

    let all = PropertyValueIterator::new(&record, value.as_value(), RecursionMode::Full);
    assert_eq!(
        paths(all),
        [
            "stats",
            "stats.values",
            "stats.values[0]",
            "stats.values[1]",
            "stats.values[2]",
            "id"
        ]
    );

    // Without the intermediate array node: the struct, its three leaves, the rest
    let leaves = PropertyValueIterator::new(&record, value.as_value(), RecursionMode::Full)
        .with_filter(|p| !matches!(p.kind(), PropertyKind::Array(_)));
    assert_eq!(
        paths(leaves),
        ["stats", "stats.values[0]", "stats.values[1]", "stats.values[2]", "id"]
    );

    let top = PropertyValueIterator::new(&record, value.as_value(), RecursionMode::NoRecursion);
    assert_eq!(paths(top), ["stats", "id"]);
}

#[test]
fn test_record_with_tag_set() {
    let services = EngineServices::new();
    let cx = PortContext::new(&services);
    let registry = TypeRegistry::new();
    let record = registry
        .register_record(
            RecordBuilder::new("Tagged")
                .field("id", FieldType::Int32)
                .field("tags", FieldType::set(FieldType::Str))
                .build(),
            &services,
        )
        .unwrap();

    let mut value = registry.instantiate("Tagged").unwrap();
    let tags = record.property("tags").unwrap();
    let set = tags.as_set().unwrap();
    let element = set.element();

    let mut a = element_buffer(element);
    let mut b = element_buffer(element);
    element.set_value(a.as_value_mut(), "a".to_string()).unwrap();
    element.set_value(b.as_value_mut(), "b".to_string()).unwrap();

    {
        let mut helper = set.helper(tags.field_value_mut(value.as_value_mut()).unwrap());
        helper.add(a.as_value()).unwrap();
        helper.add(b.as_value()).unwrap();
        helper.add(a.as_value()).unwrap();
        assert_eq!(helper.len(), 2);

        helper.rehash().unwrap();
        assert!(helper.find_index(a.as_value()).unwrap().is_some());
        assert!(helper.remove(a.as_value()).unwrap());
        assert_eq!(helper.len(), 1);
        assert!(helper.find_index(a.as_value()).unwrap().is_none());
    }

    let id = record.property("id").unwrap();
    id.import_text_in_container("5", value.as_value_mut(), 0, &cx)
        .unwrap();
    assert_eq!(value.get::<i32>("id", 0).unwrap(), 5);
    assert_eq!(value.export_field("id", 0, &cx).unwrap(), "5");
    assert_eq!(value.export_field("tags", 0, &cx).unwrap(), "(\"b\")");

    element.destroy(a.as_value_mut());
    element.destroy(b.as_value_mut());
}

#[test]
fn test_bitfield_shares_host_byte() {
    let flag = BoolProperty::bitfield(1, 0, 0x04).unwrap();
    let other = BoolProperty::bitfield(1, 0, 0x01).unwrap();
    let mut host = ValueBuffer::zeroed(1, 1).unwrap();

    flag.set_bool(host.as_value_mut(), true);
    assert!(flag.get_bool(host.as_value()));
    assert_eq!(host.as_value().as_bytes(), [0x04]);

    other.set_bool(host.as_value_mut(), true);
    other.set_bool(host.as_value_mut(), false);
    assert!(flag.get_bool(host.as_value()));
    assert!(!other.get_bool(host.as_value()));

    flag.set_bool(host.as_value_mut(), false);
    assert_eq!(host.as_value().as_bytes(), [0x00]);
}

#[test]
fn test_array_insert_shifts_tail() {
    let services = EngineServices::new();
    let registry = TypeRegistry::new();
    let record = registry
        .register_record(
            RecordBuilder::new("List")
                .field("items", FieldType::array(FieldType::Int32))
                .build(),
            &services,
        )
        .unwrap();
    let mut value = registry.instantiate("List").unwrap();
    let items = record.property("items").unwrap();
    let array = items.as_array().unwrap();
    let inner = array.inner();

    let mut helper = array.helper(items.field_value_mut(value.as_value_mut()).unwrap());
    helper.add_values(5);
    for i in 0..5 {
        inner.set_value(helper.element_mut(i), i as i32 * 10).unwrap();
    }

    helper.insert_values(2, 3).unwrap();
    assert_eq!(helper.len(), 8);

    let read = |helper: &propsys_core::ScriptArrayHelper<'_>, i: usize| -> i32 {
        inner.get_value(helper.element(i)).unwrap()
    };
    assert_eq!(read(&helper, 0), 0);
    assert_eq!(read(&helper, 1), 10);
    for i in 2..5 {
        assert_eq!(read(&helper, i), 0);
    }
    assert_eq!(read(&helper, 5), 20);
    assert_eq!(read(&helper, 6), 30);
    assert_eq!(read(&helper, 7), 40);

    assert!(helper.insert_values(9, 1).is_err());
    assert!(helper.try_element(8).is_err());
}

#[test]
fn test_layout_is_sound() {
    let services = EngineServices::new();
    let registry = TypeRegistry::new();
    registry
        .register_record(
            RecordBuilder::new("Inner")
                .field("a", FieldType::UInt8)
                .field("b", FieldType::Double)
                .build(),
            &services,
        )
        .unwrap();
    let record = registry
        .register_record(
            RecordBuilder::new("Mixed")
                .field("flag", FieldType::Bool)
                .field("wide", FieldType::Int64)
                .field("small", FieldType::Int16)
                .array("triple", FieldType::UInt8, 3)
                .field("inner", FieldType::structure("Inner"))
                .field("name", FieldType::Str)
                .field("bits", FieldType::Bitfield)
                .field("more_bits", FieldType::Bitfield)
                .field("tags", FieldType::set(FieldType::Name))
                .build(),
            &services,
        )
        .unwrap();

    check_layout(&record);
}

fn check_layout(record: &RecordType) {
    let mut ranges = Vec::new();
    for prop in record.properties() {
        assert_eq!(prop.offset() % prop.alignment(), 0, "{} misaligned", prop.name());
        assert!(prop.offset() + prop.size() <= record.size(), "{} overruns", prop.name());
        ranges.push((prop.name(), prop.offset(), prop.offset() + prop.size()));
    }
    assert_eq!(record.size() % record.alignment(), 0);

    for (i, &(name_a, start_a, end_a)) in ranges.iter().enumerate() {
        for &(name_b, start_b, end_b) in &ranges[i + 1..] {
            let shared_bits = start_a == start_b
                && record.property(name_a).unwrap().as_bool().is_ok_and(|b| !b.is_native())
                && record.property(name_b).unwrap().as_bool().is_ok_and(|b| !b.is_native());
            if shared_bits {
                continue;
            }
            assert!(
                end_a <= start_b || end_b <= start_a,
                "{} and {} overlap",
                name_a,
                name_b
            );
        }
    }
}

#[test]
fn test_text_and_archive_round_trip() {
    let services = EngineServices::new();
    let cx = PortContext::new(&services);
    let registry = TypeRegistry::new();
    registry
        .register_enum(EnumDecl::sequential("Mode", ["Off", "Slow", "Fast"]))
        .unwrap();

    let class = services.names().intern("Thing").unwrap();
    services.objects_mut().create("/world/thing", class).unwrap();

    let record = registry
        .register_record(
            RecordBuilder::new("Everything")
                .field("i8", FieldType::Int8)
                .field("u64", FieldType::UInt64)
                .field("f", FieldType::Float)
                .field("d", FieldType::Double)
                .field("on", FieldType::Bool)
                .field("bit", FieldType::Bitfield)
                .field("label", FieldType::Name)
                .field("text", FieldType::Str)
                .field("mode", FieldType::enumeration("Mode", 4))
                .field("target", FieldType::Object { class: None })
                .field("watch", FieldType::WeakObject { class: None })
                .field("list", FieldType::array(FieldType::Int16))
                .field("lookup", FieldType::map(FieldType::Str, FieldType::Double))
                .field("seen", FieldType::set(FieldType::Int32))
                .build(),
            &services,
        )
        .unwrap();

    let mut original = registry.instantiate("Everything").unwrap();
    original
        .import_text(
            "(i8=-5,u64=18446744073709551615,f=0.25,d=-1.5e10,on=True,bit=True,\
             label=Hello,text=\"with, comma\",mode=Fast,target=/world/thing,\
             watch=/world/thing,list=(1,-2,3),lookup=((a,1.5),(b,2)),seen=(4,5,6))",
            &cx,
        )
        .unwrap();

    let text = original.export_text(&cx);
    let mut from_text = registry.instantiate("Everything").unwrap();
    from_text.import_text(&text, &cx).unwrap();
    assert!(from_text.identical(&original), "text round trip: {}", text);

    let mut writer = ArchiveWriter::new();
    record
        .serialize(original.as_value(), &mut writer, &cx)
        .unwrap();
    let bytes = writer.into_bytes();
    let mut from_archive = registry.instantiate("Everything").unwrap();
    record
        .deserialize(from_archive.as_value_mut(), &mut ArchiveReader::new(&bytes), &cx)
        .unwrap();
    assert!(from_archive.identical(&original));
}

#[test]
fn test_top_level_text_round_trip_per_leaf() {
    let services = EngineServices::new();
    let cx = PortContext::new(&services);
    let registry = TypeRegistry::new();
    registry
        .register_record(
            RecordBuilder::new("Leaves")
                .field("text", FieldType::Str)
                .field("label", FieldType::Name)
                .field("asset", FieldType::SoftObject { class: None })
                .build(),
            &services,
        )
        .unwrap();

    let samples = [
        "plain",
        "  pad  ",
        "\"q\" x",
        "a, b",
        "(x=1),y",
        "tab\tand\nbreak",
        "trailing ",
    ];
    for field in ["text", "label", "asset"] {
        for sample in samples {
            let mut quoted = String::new();
            write_quoted(sample, &mut quoted);
            let mut original = registry.instantiate("Leaves").unwrap();
            original.import_field(field, 0, &quoted, &cx).unwrap();

            let text = original.export_field(field, 0, &cx).unwrap();
            let mut loaded = registry.instantiate("Leaves").unwrap();
            loaded
                .import_field(field, 0, &text, &cx)
                .unwrap_or_else(|e| panic!("{} {:?} as {}: {}", field, sample, text, e));
            assert!(loaded.identical(&original), "{} {:?} as {}", field, sample, text);
            assert_eq!(loaded.export_field(field, 0, &cx).unwrap(), text);
        }
    }
}
