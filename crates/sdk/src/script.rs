//! In-memory value representations
//!
//! These are the exact byte layouts reflected fields use inside record
//! buffers. Every type here is valid when all of its bytes are zero, which
//! is what lets the property system zero-fill fresh storage.
//!
//! `ScriptArray` is untyped: the element size and alignment are not stored
//! in the header, so every operation that touches the allocation takes them
//! as arguments and the caller must pass the same values for the whole life
//! of the array.

use std::alloc::{self, Layout};
use std::fmt;
use std::ptr;

use crate::handles::{Guid, NameId, ObjectHandle};

/// Minimum number of elements allocated on first growth
const MIN_CAPACITY: usize = 4;

fn array_layout(capacity: usize, elem_size: usize, align: usize) -> Layout {
    capacity
        .checked_mul(elem_size)
        .and_then(|bytes| Layout::from_size_align(bytes, align).ok())
        .unwrap_or_else(|| panic!("capacity overflow"))
}

/// Type-erased dynamic array header
///
/// ```text
/// ┌──────────────┬──────────────┬──────────────┐
/// │ data: *mut u8│  len: usize  │ capacity     │
/// └──────────────┴──────────────┴──────────────┘
/// ```
///
/// Bytes between `len` and `capacity` are always zero.
#[repr(C)]
pub struct ScriptArray {
    data: *mut u8,
    len: usize,
    capacity: usize,
}

impl ScriptArray {
    /// Create an empty array with no allocation
    pub const fn new() -> Self {
        Self {
            data: ptr::null_mut(),
            len: 0,
            capacity: 0,
        }
    }

    /// Number of live elements
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of elements the allocation can hold
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Raw data pointer, null when nothing has been allocated
    #[inline]
    pub fn data(&self) -> *const u8 {
        self.data
    }

    /// Bytes of the live elements
    ///
    /// # Safety
    ///
    /// `elem_size` must be the element size this array was grown with.
    pub unsafe fn as_bytes(&self, elem_size: usize) -> &[u8] {
        if self.data.is_null() {
            return &[];
        }
        std::slice::from_raw_parts(self.data, self.len * elem_size)
    }

    /// Mutable bytes of the live elements
    ///
    /// # Safety
    ///
    /// `elem_size` must be the element size this array was grown with.
    pub unsafe fn as_bytes_mut(&mut self, elem_size: usize) -> &mut [u8] {
        if self.data.is_null() {
            return &mut [];
        }
        std::slice::from_raw_parts_mut(self.data, self.len * elem_size)
    }

    /// Make room for at least `additional` more elements
    ///
    /// # Safety
    ///
    /// `elem_size` and `align` must be the same on every call for this array.
    /// `elem_size` must be non-zero and `align` a power of two.
    pub unsafe fn reserve(&mut self, additional: usize, elem_size: usize, align: usize) {
        let required = self
            .len
            .checked_add(additional)
            .unwrap_or_else(|| panic!("capacity overflow"));
        if required <= self.capacity {
            return;
        }

        let new_capacity = required.max(self.capacity * 2).max(MIN_CAPACITY);
        let new_layout = array_layout(new_capacity, elem_size, align);

        let data = if self.data.is_null() {
            alloc::alloc_zeroed(new_layout)
        } else {
            let old_layout = array_layout(self.capacity, elem_size, align);
            let grown = alloc::realloc(self.data, old_layout, new_layout.size());
            if !grown.is_null() {
                let old_bytes = old_layout.size();
                ptr::write_bytes(grown.add(old_bytes), 0, new_layout.size() - old_bytes);
            }
            grown
        };

        if data.is_null() {
            alloc::handle_alloc_error(new_layout);
        }

        self.data = data;
        self.capacity = new_capacity;
    }

    /// Append `count` zeroed elements, returning the index of the first one
    ///
    /// # Safety
    ///
    /// Same requirements as [`ScriptArray::reserve`].
    pub unsafe fn add_zeroed(&mut self, count: usize, elem_size: usize, align: usize) -> usize {
        self.reserve(count, elem_size, align);
        let first = self.len;
        self.len += count;
        first
    }

    /// Insert `count` zeroed elements before `index`
    ///
    /// # Safety
    ///
    /// Same requirements as [`ScriptArray::reserve`], and `index <= len`.
    pub unsafe fn insert_zeroed(&mut self, index: usize, count: usize, elem_size: usize, align: usize) {
        assert!(index <= self.len, "insert index {index} past length {}", self.len);
        if count == 0 {
            return;
        }
        self.reserve(count, elem_size, align);

        let src = self.data.add(index * elem_size);
        let dst = self.data.add((index + count) * elem_size);
        ptr::copy(src, dst, (self.len - index) * elem_size);
        ptr::write_bytes(src, 0, count * elem_size);
        self.len += count;
    }

    /// Remove `count` elements starting at `index`
    ///
    /// The removed elements must already have been destroyed by the caller.
    /// Trailing elements move down and the freed tail is zeroed.
    ///
    /// # Safety
    ///
    /// `elem_size` must match, and `index + count <= len`.
    pub unsafe fn remove(&mut self, index: usize, count: usize, elem_size: usize) {
        assert!(
            index <= self.len && count <= self.len - index,
            "remove range {index}..{} out of bounds for length {}",
            index + count,
            self.len
        );
        if count == 0 {
            return;
        }

        let tail = self.len - index - count;
        let dst = self.data.add(index * elem_size);
        let src = self.data.add((index + count) * elem_size);
        ptr::copy(src, dst, tail * elem_size);
        ptr::write_bytes(self.data.add((self.len - count) * elem_size), 0, count * elem_size);
        self.len -= count;
    }

    /// Swap two elements
    ///
    /// # Safety
    ///
    /// `elem_size` must match, and both indices must be valid.
    pub unsafe fn swap(&mut self, a: usize, b: usize, elem_size: usize) {
        assert!(a < self.len && b < self.len, "swap index out of bounds");
        if a != b {
            ptr::swap_nonoverlapping(
                self.data.add(a * elem_size),
                self.data.add(b * elem_size),
                elem_size,
            );
        }
    }

    /// Release the allocation and reset to the empty state
    ///
    /// Elements must already have been destroyed by the caller.
    ///
    /// # Safety
    ///
    /// `elem_size` and `align` must match the values used to grow the array.
    pub unsafe fn free(&mut self, elem_size: usize, align: usize) {
        if !self.data.is_null() {
            alloc::dealloc(self.data, array_layout(self.capacity, elem_size, align));
        }
        *self = Self::new();
    }
}

impl Default for ScriptArray {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ScriptArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptArray")
            .field("data", &self.data)
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Owned UTF-8 string stored as a byte `ScriptArray`
#[repr(C)]
#[derive(Default)]
pub struct ScriptString {
    chars: ScriptArray,
}

impl ScriptString {
    pub const fn new() -> Self {
        Self {
            chars: ScriptArray::new(),
        }
    }

    /// View the contents
    ///
    /// Contents are only ever written through [`ScriptString::set`], so
    /// invalid UTF-8 reads back as empty rather than panicking.
    pub fn as_str(&self) -> &str {
        // SAFETY: byte arrays always use element size 1
        let bytes = unsafe { self.chars.as_bytes(1) };
        std::str::from_utf8(bytes).unwrap_or_default()
    }

    /// Replace the contents
    pub fn set(&mut self, text: &str) {
        // SAFETY: byte arrays always use element size 1, alignment 1
        unsafe {
            let len = self.chars.len();
            self.chars.remove(0, len, 1);
            if !text.is_empty() {
                self.chars.add_zeroed(text.len(), 1, 1);
                self.chars.as_bytes_mut(1).copy_from_slice(text.as_bytes());
            }
        }
    }

    /// Release the allocation, leaving an empty string
    pub fn free(&mut self) {
        // SAFETY: byte arrays always use element size 1, alignment 1
        unsafe { self.chars.free(1, 1) }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }
}

impl From<&str> for ScriptString {
    fn from(text: &str) -> Self {
        let mut s = Self::new();
        s.set(text);
        s
    }
}

impl Clone for ScriptString {
    fn clone(&self) -> Self {
        Self::from(self.as_str())
    }
}

impl Drop for ScriptString {
    fn drop(&mut self) {
        self.free();
    }
}

impl PartialEq for ScriptString {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for ScriptString {}

impl fmt::Debug for ScriptString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for ScriptString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Path-addressed object reference resolved on demand
#[repr(C)]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SoftObjectPath {
    pub path: ScriptString,
}

/// Sparse hash table header shared by sets and maps
///
/// ```text
/// elements          slot storage (element + hash_next + hash_index)
/// allocation_flags  one bit per slot, u32 words
/// hash              bucket heads, i32 slot index or -1
/// free_head         first free slot + 1, 0 when the free list is empty
/// num_free          free slots inside elements
/// dirty             non-zero when the bucket index is out of date
/// ```
///
/// The bucket array is empty in the zero state, which is treated as
/// "no buckets allocated yet" rather than "stale".
#[repr(C)]
#[derive(Debug, Default)]
pub struct ScriptSet {
    pub elements: ScriptArray,
    pub allocation_flags: ScriptArray,
    pub hash: ScriptArray,
    pub free_head: u32,
    pub num_free: u32,
    pub dirty: u32,
    _pad: u32,
}

impl ScriptSet {
    pub const fn new() -> Self {
        Self {
            elements: ScriptArray::new(),
            allocation_flags: ScriptArray::new(),
            hash: ScriptArray::new(),
            free_head: 0,
            num_free: 0,
            dirty: 0,
            _pad: 0,
        }
    }

    /// Number of live elements
    #[inline]
    pub fn len(&self) -> usize {
        self.elements.len() - self.num_free as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Highest slot index plus one, including free slots
    #[inline]
    pub fn max_index(&self) -> usize {
        self.elements.len()
    }

    /// Check if the bucket index needs rebuilding
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty != 0
    }
}

/// Single-cast delegate: object plus function name
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScriptDelegate {
    pub object: ObjectHandle,
    pub function: NameId,
    _pad: u32,
}

impl ScriptDelegate {
    pub const fn new(object: ObjectHandle, function: NameId) -> Self {
        Self {
            object,
            function,
            _pad: 0,
        }
    }

    /// Check if the delegate is bound to anything
    #[inline]
    pub fn is_bound(&self) -> bool {
        !self.object.is_null() && !self.function.is_none()
    }
}

/// Reference to an object through one of its interfaces
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScriptInterface {
    pub object: ObjectHandle,
}

/// GUID-identified object reference with a cached handle
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LazyObjectRef {
    pub handle: ObjectHandle,
    pub guid: Guid,
}
