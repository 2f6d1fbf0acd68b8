//! Sparse hash table shared by sets and maps
//!
//! ```text
//! buckets  [  3 | -1 |  0 | -1 ]          head slot of each bucket chain
//! slots    [ A next=-1 ][ free ][ B next=-1 ][ C next=2 ]
//! bits       1            0       1            1
//! ```
//!
//! Slots never move, so an index stays valid until that slot is removed.
//! Removed slots are zeroed and threaded onto a free list through their
//! `hash_next` field and are reused first.
//!
//! Raw additions (deserialization, bulk import) skip the bucket chains and
//! mark the table dirty. A dirty table answers only index-based and linear
//! queries; hashed lookups fail with [`PropertyError::NeedsRehash`] until
//! [`SparseTable::rehash`] rebuilds the buckets.

use propsys_sdk::ScriptSet;

use crate::error::{PropertyError, PropertyResult};
use crate::layout::SparseLayout;
use crate::memory::{ValueMut, ValueRef};
use crate::property::Property;

const INDEX_NONE: i32 = -1;
const WORD_BITS: usize = 32;
const WORD_SIZE: usize = 4;

/// Number of hash buckets for `len` elements
pub(crate) fn bucket_count_for(len: usize) -> usize {
    if len >= 4 {
        (len / 2 + 8).next_power_of_two()
    } else {
        1
    }
}

fn read_i32(bytes: &[u8], offset: usize) -> i32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[offset..offset + 4]);
    i32::from_ne_bytes(raw)
}

fn write_i32(bytes: &mut [u8], offset: usize, value: i32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_ne_bytes());
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_ne_bytes(raw)
}

/// Read-only access to a sparse table
#[derive(Clone, Copy)]
pub(crate) struct SparseView<'a> {
    layout: SparseLayout,
    key: &'a Property,
    set: &'a ScriptSet,
}

impl<'a> SparseView<'a> {
    /// # Arguments
    /// * `layout` - Slot layout the table was built with
    /// * `key` - Descriptor of the key stored at the start of each payload
    /// * `set` - The table header
    pub(crate) fn new(layout: SparseLayout, key: &'a Property, set: &'a ScriptSet) -> Self {
        Self { layout, key, set }
    }

    fn slots(&self) -> &'a [u8] {
        // SAFETY: slots are only ever grown with this layout's stride
        unsafe { self.set.elements.as_bytes(self.layout.stride) }
    }

    fn words(&self) -> &'a [u8] {
        // SAFETY: allocation bits are grown as u32 words
        unsafe { self.set.allocation_flags.as_bytes(WORD_SIZE) }
    }

    fn buckets(&self) -> &'a [u8] {
        // SAFETY: buckets are grown as i32 heads
        unsafe { self.set.hash.as_bytes(WORD_SIZE) }
    }

    pub(crate) fn len(&self) -> usize {
        self.set.len()
    }

    pub(crate) fn max_index(&self) -> usize {
        self.set.max_index()
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.set.is_dirty()
    }

    pub(crate) fn bucket_count(&self) -> usize {
        self.set.hash.len()
    }

    pub(crate) fn is_valid_index(&self, index: usize) -> bool {
        index < self.max_index()
            && read_u32(self.words(), (index / WORD_BITS) * WORD_SIZE) & (1 << (index % WORD_BITS)) != 0
    }

    /// Payload of slot `index`, which must be allocated
    pub(crate) fn payload(&self, index: usize) -> ValueRef<'a> {
        let start = index * self.layout.stride;
        let bytes = &self.slots()[start..start + self.layout.payload_size];
        // SAFETY: allocated slots hold constructed payloads, free ones zeroes
        unsafe { ValueRef::from_bytes(bytes) }
    }

    /// Payload of slot `index`, checked
    pub(crate) fn try_payload(&self, index: usize) -> PropertyResult<ValueRef<'a>> {
        if self.is_valid_index(index) {
            Ok(self.payload(index))
        } else {
            Err(PropertyError::IndexOutOfRange {
                index,
                len: self.max_index(),
            })
        }
    }

    /// Key part of slot `index`
    pub(crate) fn key_of(&self, index: usize) -> ValueRef<'a> {
        let start = index * self.layout.stride;
        let bytes = &self.slots()[start..start + self.key.element_size()];
        // SAFETY: as in `payload`
        unsafe { ValueRef::from_bytes(bytes) }
    }

    fn hash_next(&self, index: usize) -> i32 {
        read_i32(self.slots(), index * self.layout.stride + self.layout.hash_next_offset)
    }

    fn hash_index(&self, index: usize) -> usize {
        read_i32(self.slots(), index * self.layout.stride + self.layout.hash_index_offset) as usize
    }

    fn bucket_head(&self, bucket: usize) -> i32 {
        read_i32(self.buckets(), bucket * WORD_SIZE)
    }

    /// Allocated slot indices in ascending order
    pub(crate) fn indices(&self) -> impl Iterator<Item = usize> + 'a {
        let view = *self;
        (0..view.max_index()).filter(move |&i| view.is_valid_index(i))
    }

    /// Hashed lookup of a key
    pub(crate) fn find_index(&self, needle: ValueRef<'_>) -> PropertyResult<Option<usize>> {
        if self.is_dirty() {
            return Err(PropertyError::NeedsRehash);
        }
        if self.len() == 0 {
            return Ok(None);
        }
        let hash = self.key.hash(needle)?;
        Ok(self.find_hashed(needle, hash))
    }

    pub(crate) fn find_hashed(&self, needle: ValueRef<'_>, hash: u32) -> Option<usize> {
        let count = self.bucket_count();
        if count == 0 {
            return None;
        }
        let mut current = self.bucket_head(hash as usize & (count - 1));
        while current != INDEX_NONE {
            let index = current as usize;
            if self.key.identical(self.key_of(index), needle) {
                return Some(index);
            }
            current = self.hash_next(index);
        }
        None
    }

    /// Linear lookup, usable on a dirty table
    pub(crate) fn find_index_linear(&self, needle: ValueRef<'_>) -> Option<usize> {
        self.indices()
            .find(|&i| self.key.identical(self.key_of(i), needle))
    }
}

/// Mutable access to a sparse table
pub(crate) struct SparseTable<'a> {
    layout: SparseLayout,
    key: &'a Property,
    set: &'a mut ScriptSet,
}

impl<'a> SparseTable<'a> {
    pub(crate) fn new(layout: SparseLayout, key: &'a Property, set: &'a mut ScriptSet) -> Self {
        Self { layout, key, set }
    }

    pub(crate) fn view(&self) -> SparseView<'_> {
        SparseView::new(self.layout, self.key, &*self.set)
    }

    fn slots_mut(&mut self) -> &mut [u8] {
        // SAFETY: slots are only ever grown with this layout's stride
        unsafe { self.set.elements.as_bytes_mut(self.layout.stride) }
    }

    /// Mutable payload of slot `index`, which must be allocated
    pub(crate) fn payload_mut(&mut self, index: usize) -> ValueMut<'_> {
        let start = index * self.layout.stride;
        let end = start + self.layout.payload_size;
        let bytes = &mut self.slots_mut()[start..end];
        // SAFETY: allocated slots hold constructed payloads
        unsafe { ValueMut::from_bytes(bytes) }
    }

    /// Checked mutable payload
    pub(crate) fn try_payload_mut(&mut self, index: usize) -> PropertyResult<ValueMut<'_>> {
        if !self.view().is_valid_index(index) {
            return Err(PropertyError::IndexOutOfRange {
                index,
                len: self.view().max_index(),
            });
        }
        Ok(self.payload_mut(index))
    }

    fn set_hash_next(&mut self, index: usize, next: i32) {
        let offset = index * self.layout.stride + self.layout.hash_next_offset;
        write_i32(self.slots_mut(), offset, next);
    }

    fn set_hash_index(&mut self, index: usize, bucket: usize) {
        let offset = index * self.layout.stride + self.layout.hash_index_offset;
        write_i32(self.slots_mut(), offset, bucket as i32);
    }

    fn set_bucket_head(&mut self, bucket: usize, head: i32) {
        // SAFETY: buckets are grown as i32 heads
        let buckets = unsafe { self.set.hash.as_bytes_mut(WORD_SIZE) };
        write_i32(buckets, bucket * WORD_SIZE, head);
    }

    fn set_allocated(&mut self, index: usize, allocated: bool) {
        // SAFETY: allocation bits are grown as u32 words
        let words = unsafe { self.set.allocation_flags.as_bytes_mut(WORD_SIZE) };
        let offset = (index / WORD_BITS) * WORD_SIZE;
        let mask = 1u32 << (index % WORD_BITS);
        let word = read_u32(words, offset);
        let word = if allocated { word | mask } else { word & !mask };
        words[offset..offset + WORD_SIZE].copy_from_slice(&word.to_ne_bytes());
    }

    /// Take a free slot or append one; the payload is zeroed
    pub(crate) fn allocate(&mut self) -> usize {
        let index = if self.set.free_head != 0 {
            let index = self.set.free_head as usize - 1;
            let next = self.view().hash_next(index);
            self.set.free_head = (next + 1) as u32;
            self.set.num_free -= 1;
            index
        } else {
            // SAFETY: consistent stride/alignment and word size for each array
            unsafe {
                let index = self
                    .set
                    .elements
                    .add_zeroed(1, self.layout.stride, self.layout.alignment);
                let words_needed = index / WORD_BITS + 1;
                let words = self.set.allocation_flags.len();
                if words < words_needed {
                    self.set
                        .allocation_flags
                        .add_zeroed(words_needed - words, WORD_SIZE, WORD_SIZE);
                }
                index
            }
        };
        self.set_hash_next(index, INDEX_NONE);
        self.set_allocated(index, true);
        index
    }

    /// Return an allocated slot to the free list; its payload is already destroyed
    fn release(&mut self, index: usize) {
        let start = index * self.layout.stride;
        let stride = self.layout.stride;
        self.slots_mut()[start..start + stride].fill(0);
        self.set_allocated(index, false);
        let next = self.set.free_head as i32 - 1;
        self.set_hash_next(index, next);
        self.set.free_head = index as u32 + 1;
        self.set.num_free += 1;
    }

    fn unlink(&mut self, index: usize) {
        let view = self.view();
        if view.is_dirty() || view.bucket_count() == 0 {
            return;
        }
        let bucket = view.hash_index(index);
        let mut previous = INDEX_NONE;
        let mut current = view.bucket_head(bucket);
        while current != INDEX_NONE {
            let next = self.view().hash_next(current as usize);
            if current as usize == index {
                if previous == INDEX_NONE {
                    self.set_bucket_head(bucket, next);
                } else {
                    self.set_hash_next(previous as usize, next);
                }
                return;
            }
            previous = current;
            current = next;
        }
    }

    fn link_into(&mut self, index: usize, hash: u32) {
        let bucket = hash as usize & (self.view().bucket_count() - 1);
        let head = self.view().bucket_head(bucket);
        self.set_hash_index(index, bucket);
        self.set_hash_next(index, head);
        self.set_bucket_head(bucket, index as i32);
    }

    /// Hook a freshly filled slot into its bucket, growing the buckets if needed
    pub(crate) fn link(&mut self, index: usize, hash: u32) -> PropertyResult<()> {
        if self.view().bucket_count() != bucket_count_for(self.view().len()) {
            self.rehash(&mut |_| {})?;
            return Ok(());
        }
        self.link_into(index, hash);
        Ok(())
    }

    /// Mark the bucket index stale after a raw addition
    pub(crate) fn mark_dirty(&mut self) {
        self.set.dirty = 1;
    }

    /// Rebuild the buckets from the allocated slots
    ///
    /// Slots whose keys are identical to a key at a higher index are
    /// destroyed with `destroy` and freed, so the highest index wins.
    /// Returns the number of duplicates removed.
    pub(crate) fn rehash(&mut self, destroy: &mut dyn FnMut(ValueMut<'_>)) -> PropertyResult<usize> {
        self.set.dirty = 1;
        let count = bucket_count_for(self.view().len());
        // SAFETY: buckets are always i32 heads
        unsafe {
            self.set.hash.free(WORD_SIZE, WORD_SIZE);
            self.set.hash.add_zeroed(count, WORD_SIZE, WORD_SIZE);
        }
        for bucket in 0..count {
            self.set_bucket_head(bucket, INDEX_NONE);
        }

        let indices: Vec<usize> = self.view().indices().collect();
        let mut removed = 0;
        for &index in indices.iter().rev() {
            let view = self.view();
            let key = view.key_of(index);
            let hash = self.key.hash(key)?;
            if view.find_hashed(key, hash).is_some() {
                destroy(self.payload_mut(index));
                self.release(index);
                removed += 1;
                continue;
            }
            self.link_into(index, hash);
        }

        self.set.dirty = 0;
        if removed > 0 {
            tracing::debug!("Rehash dropped {} duplicate entries", removed);
        }
        Ok(removed)
    }

    /// Destroy and free one slot
    pub(crate) fn remove_at(
        &mut self,
        index: usize,
        destroy: &mut dyn FnMut(ValueMut<'_>),
    ) -> PropertyResult<()> {
        if !self.view().is_valid_index(index) {
            return Err(PropertyError::IndexOutOfRange {
                index,
                len: self.view().max_index(),
            });
        }
        self.unlink(index);
        destroy(self.payload_mut(index));
        self.release(index);
        Ok(())
    }

    /// Destroy every element and release all storage
    pub(crate) fn empty(&mut self, destroy: &mut dyn FnMut(ValueMut<'_>)) {
        let indices: Vec<usize> = self.view().indices().collect();
        for index in indices {
            destroy(self.payload_mut(index));
        }
        // SAFETY: each array is freed with the layout it was grown with
        unsafe {
            self.set.elements.free(self.layout.stride, self.layout.alignment);
            self.set.allocation_flags.free(WORD_SIZE, WORD_SIZE);
            self.set.hash.free(WORD_SIZE, WORD_SIZE);
        }
        self.set.free_head = 0;
        self.set.num_free = 0;
        self.set.dirty = 0;
    }
}
