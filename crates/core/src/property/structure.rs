//! Struct properties: a nested record stored inline
//!
//! Every operation is forwarded to the nested [`RecordType`], which applies
//! it field by field at the field offsets relative to the struct's start.

use std::sync::Arc;

use crate::codec::{ArchiveReader, ArchiveWriter, PortContext, TextCursor};
use crate::error::{ImportError, PropertyResult};
use crate::memory::{ValueMut, ValueRef};
use crate::record::RecordType;

use super::{PropertyFlags, PropertyOps};

/// Property embedding a record value
#[derive(Debug, Clone)]
pub struct StructProperty {
    record: Arc<RecordType>,
}

impl StructProperty {
    pub fn new(record: Arc<RecordType>) -> Self {
        Self { record }
    }

    /// The nested record type, shared with every other field of that type
    pub fn record(&self) -> &Arc<RecordType> {
        &self.record
    }
}

impl PropertyOps for StructProperty {
    fn kind_name(&self) -> &'static str {
        "Struct"
    }

    fn value_layout(&self) -> (usize, usize) {
        (self.record.size(), self.record.alignment())
    }

    fn intrinsic_flags(&self) -> PropertyFlags {
        self.record.flags()
    }

    fn is_hashable(&self) -> bool {
        self.record.is_hashable()
    }

    fn identical(&self, a: ValueRef<'_>, b: ValueRef<'_>) -> bool {
        self.record.identical(a, b)
    }

    fn copy_value(&self, dest: ValueMut<'_>, src: ValueRef<'_>) {
        self.record.copy(dest, src);
    }

    fn initialize_value(&self, dest: ValueMut<'_>) {
        self.record.initialize(dest);
    }

    fn destroy_value(&self, dest: ValueMut<'_>) {
        self.record.destroy(dest);
    }

    fn hash_value(&self, value: ValueRef<'_>) -> Option<u32> {
        self.record.hash(value)
    }

    fn export_value(&self, value: ValueRef<'_>, out: &mut String, cx: &PortContext<'_>) {
        self.record.export_text(value, out, cx);
    }

    fn import_value(
        &self,
        dest: ValueMut<'_>,
        cursor: &mut TextCursor<'_>,
        cx: &PortContext<'_>,
    ) -> Result<(), ImportError> {
        self.record.import_text(dest, cursor, cx)
    }

    fn serialize_value(
        &self,
        value: ValueRef<'_>,
        ar: &mut ArchiveWriter,
        cx: &PortContext<'_>,
    ) -> PropertyResult<()> {
        self.record.serialize(value, ar, cx)
    }

    fn deserialize_value(
        &self,
        dest: ValueMut<'_>,
        ar: &mut ArchiveReader<'_>,
        cx: &PortContext<'_>,
    ) -> PropertyResult<()> {
        self.record.deserialize(dest, ar, cx)
    }
}
