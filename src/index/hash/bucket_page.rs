use std::marker::PhantomData;

use crate::common::types::{Page, PAGE_SIZE};
use crate::index::hash::storable::Storable;

/// Bitmaps and entries start past the common page-LSN prefix.
const BUCKET_DATA_OFFSET: usize = 4;

/// How many `(key, value)` pairs fit in one bucket page alongside its two
/// bitmaps (occupied and readable, one bit each per slot).
pub fn bucket_array_size(entry_size: usize) -> usize {
    let available = PAGE_SIZE - BUCKET_DATA_OFFSET;
    let mut capacity = (4 * available) / (4 * entry_size + 1);
    while BUCKET_DATA_OFFSET + 2 * capacity.div_ceil(8) + capacity * entry_size > PAGE_SIZE {
        capacity -= 1;
    }
    capacity
}

/// View over a hash bucket page.
///
/// A slot's `occupied` bit is set the first time it is written and never
/// cleared; `readable` tracks whether a live pair is present. An occupied
/// but unreadable slot is a tombstone available for reuse. Scans stop at
/// the first never-occupied slot.
pub struct BucketPage<K, V> {
    _marker: PhantomData<(K, V)>,
}

impl<K, V> BucketPage<K, V>
where
    K: Storable,
    V: Storable,
{
    pub fn capacity() -> usize {
        bucket_array_size(K::SIZE + V::SIZE)
    }

    /// Collect the values stored under `key`. Returns true when at least
    /// one match was found.
    pub fn get_value(page: &Page, key: &K, result: &mut Vec<V>) -> bool {
        let found_before = result.len();
        for idx in 0..Self::capacity() {
            if !Self::is_occupied(page, idx) {
                break;
            }
            if Self::is_readable(page, idx) && Self::key_at(page, idx) == *key {
                result.push(Self::value_at(page, idx));
            }
        }
        result.len() > found_before
    }

    /// Insert a pair. Rejects an exact `(key, value)` duplicate; reuses a
    /// tombstone only once every slot has been occupied at least once.
    pub fn insert(page: &mut Page, key: &K, value: &V) -> bool {
        let capacity = Self::capacity();
        let mut idx = 0;
        while idx < capacity {
            if !Self::is_occupied(page, idx) {
                break;
            }
            if Self::is_readable(page, idx)
                && Self::key_at(page, idx) == *key
                && Self::value_at(page, idx) == *value
            {
                return false;
            }
            idx += 1;
        }

        if idx == capacity {
            for idx in 0..capacity {
                if !Self::is_readable(page, idx) {
                    Self::write_entry(page, idx, key, value);
                    Self::set_readable(page, idx, true);
                    return true;
                }
            }
            return false;
        }

        Self::write_entry(page, idx, key, value);
        Self::set_occupied(page, idx);
        Self::set_readable(page, idx, true);
        true
    }

    /// Remove the pair matching `(key, value)` by clearing its readable bit.
    pub fn remove(page: &mut Page, key: &K, value: &V) -> bool {
        for idx in 0..Self::capacity() {
            if !Self::is_occupied(page, idx) {
                break;
            }
            if Self::is_readable(page, idx)
                && Self::key_at(page, idx) == *key
                && Self::value_at(page, idx) == *value
            {
                Self::set_readable(page, idx, false);
                return true;
            }
        }
        false
    }

    pub fn key_at(page: &Page, idx: usize) -> K {
        let off = Self::entry_offset(idx);
        K::read_from(&page.data[off..off + K::SIZE])
    }

    pub fn value_at(page: &Page, idx: usize) -> V {
        let off = Self::entry_offset(idx) + K::SIZE;
        V::read_from(&page.data[off..off + V::SIZE])
    }

    pub fn is_occupied(page: &Page, idx: usize) -> bool {
        let off = Self::occupied_offset() + idx / 8;
        page.data[off] >> (idx % 8) & 1 == 1
    }

    pub fn is_readable(page: &Page, idx: usize) -> bool {
        let off = Self::readable_offset() + idx / 8;
        page.data[off] >> (idx % 8) & 1 == 1
    }

    pub fn set_occupied(page: &mut Page, idx: usize) {
        let off = Self::occupied_offset() + idx / 8;
        page.data[off] |= 1 << (idx % 8);
    }

    pub fn set_readable(page: &mut Page, idx: usize, readable: bool) {
        let off = Self::readable_offset() + idx / 8;
        if readable {
            page.data[off] |= 1 << (idx % 8);
        } else {
            page.data[off] &= !(1 << (idx % 8));
        }
    }

    /// Every slot holds a live pair.
    pub fn is_full(page: &Page) -> bool {
        (0..Self::capacity()).all(|idx| Self::is_readable(page, idx))
    }

    /// No slot holds a live pair.
    pub fn is_empty(page: &Page) -> bool {
        for idx in 0..Self::capacity() {
            if Self::is_readable(page, idx) {
                return false;
            }
            if !Self::is_occupied(page, idx) {
                break;
            }
        }
        true
    }

    fn occupied_offset() -> usize {
        BUCKET_DATA_OFFSET
    }

    fn readable_offset() -> usize {
        BUCKET_DATA_OFFSET + Self::capacity().div_ceil(8)
    }

    fn entries_offset() -> usize {
        BUCKET_DATA_OFFSET + 2 * Self::capacity().div_ceil(8)
    }

    fn entry_offset(idx: usize) -> usize {
        Self::entries_offset() + idx * (K::SIZE + V::SIZE)
    }

    fn write_entry(page: &mut Page, idx: usize, key: &K, value: &V) {
        let off = Self::entry_offset(idx);
        key.write_to(&mut page.data[off..off + K::SIZE]);
        value.write_to(&mut page.data[off + K::SIZE..off + K::SIZE + V::SIZE]);
    }
}
