//! Consumers of the traversal: reference scanning and record diffing

use propsys_sdk::ObjectHandle;

use crate::error::{PropertyError, PropertyResult};
use crate::memory::ValueRef;
use crate::property::{ObjectFlavor, PropertyFlags, PropertyKind, PropertyOps};
use crate::record::RecordType;

use super::{PropertyValueIterator, RecursionMode};

/// Every non-null object handle held by a record value
///
/// Strong references and interfaces are always collected. Weak and lazy
/// references, and delegate targets, only when `include_weak` is set. Soft
/// references hold a path, not a handle, and are not collected.
pub fn collect_references(
    record: &RecordType,
    value: ValueRef<'_>,
    include_weak: bool,
) -> Vec<ObjectHandle> {
    let mut found = Vec::new();
    let wanted = if include_weak {
        PropertyFlags::REFERENCES
    } else {
        PropertyFlags::CONTAINS_OBJECT_REFERENCE
    };

    let mut it = PropertyValueIterator::new(record, value, RecursionMode::Full);
    while let Some(entry) = it.next() {
        if !entry.property.has_any_flags(wanted) {
            // Nothing below holds a wanted reference
            it.skip_recursion_once();
            continue;
        }
        let handle = match entry.property.kind() {
            PropertyKind::Object(o) => match o.flavor() {
                ObjectFlavor::Strong => o.raw_handle(entry.value),
                ObjectFlavor::Weak | ObjectFlavor::Lazy if include_weak => o.raw_handle(entry.value),
                _ => ObjectHandle::NULL,
            },
            PropertyKind::Interface(i) => i.get_object(entry.value),
            PropertyKind::Delegate(d) => d.get_delegate(entry.value).object,
            PropertyKind::MulticastDelegate(d) => {
                found.extend(
                    d.invocation_list(entry.value)
                        .into_iter()
                        .map(|delegate| delegate.object)
                        .filter(|handle| !handle.is_null()),
                );
                ObjectHandle::NULL
            }
            _ => ObjectHandle::NULL,
        };
        if !handle.is_null() {
            found.push(handle);
        }
    }
    tracing::trace!("Collected {} references from '{}'", found.len(), record.name());
    found
}

/// Paths of the fields whose values differ between `a` and `b`
///
/// Structs are compared field by field. Containers and leaves are compared
/// as a whole and reported by their own path, e.g. `origin.x` or `tags`.
///
/// # Errors
/// Returns [`PropertyError::OutOfBounds`] if either value is smaller than
/// the record.
pub fn diff_records(
    record: &RecordType,
    a: ValueRef<'_>,
    b: ValueRef<'_>,
) -> PropertyResult<Vec<String>> {
    for value in [a, b] {
        if value.len() < record.size() {
            return Err(PropertyError::OutOfBounds {
                offset: 0,
                len: record.size(),
                available: value.len(),
            });
        }
    }

    let mut left = PropertyValueIterator::new(record, a, RecursionMode::Full);
    let mut right = PropertyValueIterator::new(record, b, RecursionMode::Full);
    let mut changed = Vec::new();

    // Only structs are expanded, so both walks see the same shape
    while let (Some(x), Some(y)) = (left.next(), right.next()) {
        if matches!(x.property.kind(), PropertyKind::Struct(_)) {
            continue;
        }
        if x.property.kind().is_expandable() {
            left.skip_recursion_once();
            right.skip_recursion_once();
        }
        if !x.property.kind().identical(x.value, y.value) {
            changed.push(left.path());
        }
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PortContext;
    use crate::containers::{ArrayProperty, SetProperty};
    use crate::property::{NumericProperty, ObjectProperty, Property, StructProperty, StrProperty};
    use crate::record::RecordValue;
    use propsys_engine::EngineServices;
    use std::sync::Arc;

    fn object(name: &str, flavor: ObjectFlavor) -> Property {
        Property::new(name, PropertyKind::Object(ObjectProperty::new(flavor, None)))
    }

    #[test]
    fn test_collect_references() {
        let services = EngineServices::new();
        let cx = PortContext::new(&services);
        let class = services.names().intern("Thing").unwrap();
        let (a, b, c) = {
            let mut objects = services.objects_mut();
            (
                objects.create("/a", class).unwrap(),
                objects.create("/b", class).unwrap(),
                objects.create("/c", class).unwrap(),
            )
        };

        let inner = Arc::new(
            RecordType::new("Slot", None, vec![object("target", ObjectFlavor::Strong)]).unwrap(),
        );
        let record = Arc::new(
            RecordType::new(
                "Holder",
                None,
                vec![
                    Property::new("count", PropertyKind::Int32(NumericProperty::new())),
                    object("owner", ObjectFlavor::Strong),
                    object("watcher", ObjectFlavor::Weak),
                    Property::new(
                        "slots",
                        PropertyKind::Array(ArrayProperty::new(Property::new(
                            "slot",
                            PropertyKind::Struct(StructProperty::new(inner)),
                        ))),
                    ),
                ],
            )
            .unwrap(),
        );

        let mut value = RecordValue::new(record.clone()).unwrap();
        value
            .import_text("(owner=/a,watcher=/b,slots=((target=/c),(target=None)))", &cx)
            .unwrap();

        assert_eq!(collect_references(&record, value.as_value(), false), [a, c]);
        assert_eq!(collect_references(&record, value.as_value(), true), [a, b, c]);
    }

    #[test]
    fn test_diff_records() {
        let services = EngineServices::new();
        let cx = PortContext::new(&services);
        let int = |name: &str| Property::new(name, PropertyKind::Int32(NumericProperty::new()));
        let vec2 = Arc::new(RecordType::new("Vec2", None, vec![int("x"), int("y")]).unwrap());
        let record = Arc::new(
            RecordType::new(
                "Actor",
                None,
                vec![
                    int("id"),
                    Property::new("origin", PropertyKind::Struct(StructProperty::new(vec2))),
                    Property::new(
                        "tags",
                        PropertyKind::Set(
                            SetProperty::new(Property::new("tag", PropertyKind::Str(StrProperty)))
                                .unwrap(),
                        ),
                    ),
                    int("hp").with_array_dim(2),
                ],
            )
            .unwrap(),
        );

        let mut a = RecordValue::new(record.clone()).unwrap();
        let mut b = RecordValue::new(record.clone()).unwrap();
        a.import_text("(id=1,origin=(x=1,y=2),tags=(a,b),hp[1]=5)", &cx)
            .unwrap();
        b.import_text("(id=1,origin=(x=1,y=3),tags=(b,a),hp[1]=6)", &cx)
            .unwrap();

        assert_eq!(
            diff_records(&record, a.as_value(), b.as_value()).unwrap(),
            ["origin.y", "hp[1]"]
        );
        assert!(diff_records(&record, a.as_value(), a.as_value())
            .unwrap()
            .is_empty());
    }
}
