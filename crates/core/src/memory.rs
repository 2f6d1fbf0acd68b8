//! Bounds-checked views over opaque value memory
//!
//! Record memory is handled as byte slices. A [`ValueRef`] or [`ValueMut`]
//! is a window onto the bytes of one value, and every narrowing to a field or
//! element goes through a checked [`ValueRef::slice`] instead of raw pointer
//! arithmetic.
//!
//! Views can only be created from memory that holds valid values, which is
//! why the raw constructors are `unsafe`. [`ValueBuffer`] is the safe way to
//! get fresh storage: zeroed bytes are a valid value of every kind.

use std::alloc::{self, Layout};
use std::fmt;
use std::mem;
use std::ptr::NonNull;

use propsys_sdk::{Guid, LazyObjectRef, NameId, ObjectHandle, ScriptDelegate, ScriptInterface};

use crate::error::{PropertyError, PropertyResult};
use crate::layout::LayoutError;

/// Types for which every bit pattern is a valid value
///
/// # Safety
///
/// Implementors must be `Copy`, contain no pointers, no padding and no
/// invalid bit patterns.
pub unsafe trait Plain: Copy + 'static {}

macro_rules! impl_plain {
    ($($ty:ty),* $(,)?) => {
        $(unsafe impl Plain for $ty {})*
    };
}

impl_plain!(
    u8, u16, u32, u64, i8, i16, i32, i64, f32, f64,
    NameId, ObjectHandle, Guid, ScriptDelegate, ScriptInterface, LazyObjectRef,
);

fn check_range(offset: usize, len: usize, available: usize) -> PropertyResult<()> {
    match offset.checked_add(len) {
        Some(end) if end <= available => Ok(()),
        _ => Err(PropertyError::OutOfBounds {
            offset,
            len,
            available,
        }),
    }
}

/// Read-only view of one value's bytes
#[derive(Clone, Copy)]
pub struct ValueRef<'a> {
    bytes: &'a [u8],
}

impl<'a> ValueRef<'a> {
    /// Wrap raw bytes
    ///
    /// # Safety
    ///
    /// `bytes` must hold valid values for every property that will be used
    /// to read it. Container headers in particular must own their storage.
    pub unsafe fn from_bytes(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Raw bytes of the value
    #[inline]
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.bytes.as_ptr()
    }

    /// Narrow to `len` bytes starting at `offset`
    pub fn slice(&self, offset: usize, len: usize) -> PropertyResult<ValueRef<'a>> {
        check_range(offset, len, self.bytes.len())?;
        Ok(ValueRef {
            bytes: &self.bytes[offset..offset + len],
        })
    }

    /// Read a plain value from the start of the view
    pub(crate) fn read<T: Plain>(&self) -> T {
        assert!(
            self.bytes.len() >= mem::size_of::<T>(),
            "value of {} bytes read from a {}-byte view",
            mem::size_of::<T>(),
            self.bytes.len()
        );
        // SAFETY: length checked above, `Plain` accepts any bit pattern
        unsafe { self.bytes.as_ptr().cast::<T>().read_unaligned() }
    }

    /// Reinterpret the start of the view as a `T`
    ///
    /// # Safety
    ///
    /// The bytes must hold a valid `T`. Size and alignment are asserted.
    pub(crate) unsafe fn cast<T>(&self) -> &'a T {
        assert_castable::<T>(self.bytes.as_ptr(), self.bytes.len());
        &*self.bytes.as_ptr().cast::<T>()
    }
}

impl fmt::Debug for ValueRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueRef")
            .field("ptr", &self.bytes.as_ptr())
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Mutable view of one value's bytes
pub struct ValueMut<'a> {
    bytes: &'a mut [u8],
}

impl<'a> ValueMut<'a> {
    /// Wrap raw bytes
    ///
    /// # Safety
    ///
    /// Same contract as [`ValueRef::from_bytes`].
    pub unsafe fn from_bytes(bytes: &'a mut [u8]) -> Self {
        Self { bytes }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Shared view of the same bytes
    #[inline]
    pub fn as_ref(&self) -> ValueRef<'_> {
        ValueRef { bytes: &*self.bytes }
    }

    /// Shorter-lived mutable view of the same bytes
    #[inline]
    pub fn reborrow(&mut self) -> ValueMut<'_> {
        ValueMut {
            bytes: &mut *self.bytes,
        }
    }

    /// Narrow to `len` bytes starting at `offset`
    pub fn slice_mut(&mut self, offset: usize, len: usize) -> PropertyResult<ValueMut<'_>> {
        check_range(offset, len, self.bytes.len())?;
        Ok(ValueMut {
            bytes: &mut self.bytes[offset..offset + len],
        })
    }

    /// Narrow, consuming the view
    pub fn into_slice(self, offset: usize, len: usize) -> PropertyResult<ValueMut<'a>> {
        check_range(offset, len, self.bytes.len())?;
        Ok(ValueMut {
            bytes: &mut self.bytes[offset..offset + len],
        })
    }

    /// Zero every byte
    ///
    /// Any storage owned by the previous value is leaked, not freed.
    pub fn fill_zero(&mut self) {
        self.bytes.fill(0);
    }

    /// Bitwise copy from another view of the same length
    pub(crate) fn copy_bytes_from(&mut self, src: ValueRef<'_>) {
        self.bytes.copy_from_slice(src.bytes);
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        &mut *self.bytes
    }

    /// Write a plain value at the start of the view
    pub(crate) fn write<T: Plain>(&mut self, value: T) {
        assert!(
            self.bytes.len() >= mem::size_of::<T>(),
            "value of {} bytes written to a {}-byte view",
            mem::size_of::<T>(),
            self.bytes.len()
        );
        // SAFETY: length checked above, `Plain` has no invalid bit patterns
        unsafe { self.bytes.as_mut_ptr().cast::<T>().write_unaligned(value) }
    }

    /// Reinterpret the start of the view as a `T`
    ///
    /// # Safety
    ///
    /// The bytes must hold a valid `T`. Size and alignment are asserted.
    pub(crate) unsafe fn cast_mut<T>(&mut self) -> &mut T {
        assert_castable::<T>(self.bytes.as_ptr(), self.bytes.len());
        &mut *self.bytes.as_mut_ptr().cast::<T>()
    }

    /// Reinterpret, consuming the view
    ///
    /// # Safety
    ///
    /// Same contract as [`ValueMut::cast_mut`].
    pub(crate) unsafe fn into_cast_mut<T>(self) -> &'a mut T {
        assert_castable::<T>(self.bytes.as_ptr(), self.bytes.len());
        &mut *self.bytes.as_mut_ptr().cast::<T>()
    }
}

impl fmt::Debug for ValueMut<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueMut")
            .field("ptr", &self.bytes.as_ptr())
            .field("len", &self.bytes.len())
            .finish()
    }
}

fn assert_castable<T>(ptr: *const u8, len: usize) {
    assert!(
        len >= mem::size_of::<T>(),
        "{}-byte view too small for {}",
        len,
        std::any::type_name::<T>()
    );
    assert!(
        (ptr as usize) % mem::align_of::<T>() == 0,
        "misaligned view for {}",
        std::any::type_name::<T>()
    );
}

/// Owned, aligned, zero-initialized value storage
///
/// Does not run any property destructors on drop; owners that store
/// non-trivial values destroy them first.
pub struct ValueBuffer {
    ptr: NonNull<u8>,
    layout: Layout,
}

// SAFETY: the buffer exclusively owns its allocation, and values stored in it
// exclusively own theirs. Shared access only hands out read-only views.
unsafe impl Send for ValueBuffer {}
unsafe impl Sync for ValueBuffer {}

impl ValueBuffer {
    /// Allocate `size` zeroed bytes with the given alignment
    pub fn zeroed(size: usize, align: usize) -> Result<Self, LayoutError> {
        let layout = Layout::from_size_align(size.max(1), align)
            .map_err(|_| LayoutError::InvalidAlignment(align))?;
        // SAFETY: layout size is non-zero
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).unwrap_or_else(|| alloc::handle_alloc_error(layout));
        Ok(Self { ptr, layout })
    }

    pub fn len(&self) -> usize {
        self.layout.size()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn alignment(&self) -> usize {
        self.layout.align()
    }

    pub fn as_value(&self) -> ValueRef<'_> {
        // SAFETY: the allocation is live, zero-initialized and only ever
        // mutated through property operations
        unsafe { ValueRef::from_bytes(std::slice::from_raw_parts(self.ptr.as_ptr(), self.len())) }
    }

    pub fn as_value_mut(&mut self) -> ValueMut<'_> {
        // SAFETY: as above, and `&mut self` guarantees exclusivity
        unsafe {
            ValueMut::from_bytes(std::slice::from_raw_parts_mut(
                self.ptr.as_ptr(),
                self.len(),
            ))
        }
    }
}

impl Drop for ValueBuffer {
    fn drop(&mut self) {
        // SAFETY: allocated in `zeroed` with the same layout
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

impl fmt::Debug for ValueBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueBuffer")
            .field("len", &self.len())
            .field("alignment", &self.alignment())
            .finish()
    }
}
