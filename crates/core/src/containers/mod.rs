//! Container properties
//!
//! Arrays own a contiguous block of elements. Sets and maps share one
//! sparse hash table layout and differ only in their slot payload.

pub mod array;
pub mod map;
pub mod set;

mod sparse;

pub use array::{ArrayProperty, ScriptArrayHelper, ScriptArrayView};
pub use map::{MapProperty, ScriptMapHelper, ScriptMapView};
pub use set::{ScriptSetHelper, ScriptSetView, SetProperty};

use crate::codec::TextCursor;
use crate::error::ImportError;
use crate::memory::{ValueBuffer, ValueMut};
use crate::property::PropertyOps;

/// Import a whole container into scratch space, moving it over `dest` only
/// once every entry has been read
///
/// On failure `dest` keeps its previous contents.
pub(crate) fn import_replacing(
    kind: &impl PropertyOps,
    mut dest: ValueMut<'_>,
    cursor: &mut TextCursor<'_>,
    import: impl FnOnce(ValueMut<'_>, &mut TextCursor<'_>) -> Result<(), ImportError>,
) -> Result<(), ImportError> {
    let (size, align) = kind.value_layout();
    let mut scratch =
        ValueBuffer::zeroed(size, align).map_err(|e| cursor.error(e.to_string()))?;
    match import(scratch.as_value_mut(), cursor) {
        Ok(()) => {
            kind.destroy_value(dest.reborrow());
            // Bitwise move; dropping the buffer does not destroy its contents
            dest.copy_bytes_from(scratch.as_value());
            Ok(())
        }
        Err(e) => {
            kind.destroy_value(scratch.as_value_mut());
            Err(e)
        }
    }
}
