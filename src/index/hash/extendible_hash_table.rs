use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use crate::common::types::{PageId, Rid};
use crate::index::hash::bucket_page::BucketPage;
use crate::index::hash::directory_page::{DirectoryPage, DIRECTORY_ARRAY_SIZE};
use crate::index::hash::storable::Storable;
use crate::storage::buffer::manager::BufferPool;
use crate::storage::buffer::BufferPoolError;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Buffer pool error: {0}")]
    BufferPool(#[from] BufferPoolError),

    #[error("Directory integrity violated: {0}")]
    IntegrityViolation(String),
}

pub type Result<T> = std::result::Result<T, IndexError>;

/// Disk-resident extendible hash table.
///
/// A single directory page maps the low `global_depth` bits of a key's
/// hash to bucket pages. Point reads and inserts take the table latch
/// shared plus a per-bucket page latch; structural changes (bucket split,
/// directory growth, merge, shrink) take the table latch exclusive.
pub struct ExtendibleHashTable<K, V> {
    buffer_pool: Arc<dyn BufferPool>,
    directory_page_id: PageId,
    table_latch: RwLock<()>,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> ExtendibleHashTable<K, V>
where
    K: Storable + Hash + Eq,
    V: Storable + Eq,
{
    /// Create a table with global depth 1 over two empty buckets.
    pub fn new(buffer_pool: Arc<dyn BufferPool>) -> Result<Self> {
        let (dir_page, directory_page_id) = buffer_pool.new_page()?;
        let (_bucket_0, bucket_page_id_0) = buffer_pool.new_page()?;
        let (_bucket_1, bucket_page_id_1) = buffer_pool.new_page()?;

        {
            let mut dir = dir_page.write();
            DirectoryPage::init(&mut dir);
            DirectoryPage::incr_global_depth(&mut dir);
            DirectoryPage::set_local_depth(&mut dir, 0, 1);
            DirectoryPage::set_local_depth(&mut dir, 1, 1);
            DirectoryPage::set_bucket_page_id(&mut dir, 0, bucket_page_id_0);
            DirectoryPage::set_bucket_page_id(&mut dir, 1, bucket_page_id_1);
        }

        buffer_pool.unpin_page(directory_page_id, true)?;
        buffer_pool.unpin_page(bucket_page_id_0, false)?;
        buffer_pool.unpin_page(bucket_page_id_1, false)?;

        Ok(Self {
            buffer_pool,
            directory_page_id,
            table_latch: RwLock::new(()),
            _marker: PhantomData,
        })
    }

    pub fn directory_page_id(&self) -> PageId {
        self.directory_page_id
    }

    /// Collect every value stored under `key`.
    pub fn get_value(&self, key: &K) -> Result<Vec<V>> {
        let _table = self.table_latch.read();

        let dir_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        let bucket_page_id = {
            let dir = dir_page.read();
            DirectoryPage::bucket_page_id(&dir, self.key_to_index(key, &dir))
        };

        let bucket_page = self.buffer_pool.fetch_page(bucket_page_id)?;
        let mut result = Vec::new();
        {
            let bucket = bucket_page.read();
            BucketPage::<K, V>::get_value(&bucket, key, &mut result);
        }

        self.buffer_pool.unpin_page(bucket_page_id, false)?;
        self.buffer_pool.unpin_page(self.directory_page_id, false)?;
        Ok(result)
    }

    /// Insert a pair. Duplicate `(key, value)` pairs are rejected; a full
    /// bucket triggers a split under the exclusive table latch.
    pub fn insert(&self, key: K, value: V) -> Result<bool> {
        {
            let _table = self.table_latch.read();

            let dir_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
            let bucket_page_id = {
                let dir = dir_page.read();
                DirectoryPage::bucket_page_id(&dir, self.key_to_index(&key, &dir))
            };

            let bucket_page = self.buffer_pool.fetch_page(bucket_page_id)?;
            let full = {
                let bucket = bucket_page.read();
                BucketPage::<K, V>::is_full(&bucket)
            };

            if !full {
                let inserted = {
                    let mut bucket = bucket_page.write();
                    BucketPage::<K, V>::insert(&mut bucket, &key, &value)
                };
                self.buffer_pool.unpin_page(bucket_page_id, true)?;
                self.buffer_pool.unpin_page(self.directory_page_id, false)?;
                return Ok(inserted);
            }

            self.buffer_pool.unpin_page(bucket_page_id, false)?;
            self.buffer_pool.unpin_page(self.directory_page_id, false)?;
        }

        self.split_insert(key, value)
    }

    /// Split the target bucket (growing the directory when its local depth
    /// already equals the global depth), redistribute its entries, then
    /// retry the insert.
    fn split_insert(&self, key: K, value: V) -> Result<bool> {
        {
            let _table = self.table_latch.write();

            let dir_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
            let mut dir = dir_page.write();

            let dir_index = self.key_to_index(&key, &dir);
            let old_bucket_page_id = DirectoryPage::bucket_page_id(&dir, dir_index);

            if DirectoryPage::global_depth(&dir) == DirectoryPage::local_depth(&dir, dir_index) {
                let size = DirectoryPage::size(&dir);
                if size as usize == DIRECTORY_ARRAY_SIZE {
                    drop(dir);
                    self.buffer_pool.unpin_page(self.directory_page_id, false)?;
                    return Ok(false);
                }

                // Mirror the existing half of the directory into the new half.
                for bucket_index in 0..size {
                    let new_index = bucket_index + size;
                    let depth = DirectoryPage::local_depth(&dir, bucket_index);
                    let page_id = DirectoryPage::bucket_page_id(&dir, bucket_index);
                    DirectoryPage::set_local_depth(&mut dir, new_index, depth);
                    DirectoryPage::set_bucket_page_id(&mut dir, new_index, page_id);
                }
                DirectoryPage::incr_global_depth(&mut dir);
            }

            let old_bucket_page = self.buffer_pool.fetch_page(old_bucket_page_id)?;
            let (new_bucket_page, new_bucket_page_id) = self.buffer_pool.new_page()?;

            DirectoryPage::incr_local_depth(&mut dir, dir_index);
            let local_mask = DirectoryPage::local_depth_mask(&dir, dir_index);
            let new_depth = DirectoryPage::local_depth(&dir, dir_index);

            // Slots of the old bucket whose low bits land in the high half
            // under the deeper mask now point at the new bucket.
            let size = DirectoryPage::size(&dir);
            for i in 0..size {
                if i != dir_index && DirectoryPage::bucket_page_id(&dir, i) == old_bucket_page_id {
                    DirectoryPage::set_local_depth(&mut dir, i, new_depth);
                    if (local_mask & i) != (local_mask & dir_index) {
                        DirectoryPage::set_bucket_page_id(&mut dir, i, new_bucket_page_id);
                    }
                }
            }

            {
                let mut old_bucket = old_bucket_page.write();
                let mut new_bucket = new_bucket_page.write();
                let global_mask = DirectoryPage::global_depth_mask(&dir);

                for idx in 0..BucketPage::<K, V>::capacity() {
                    if !BucketPage::<K, V>::is_occupied(&old_bucket, idx) {
                        break;
                    }
                    if !BucketPage::<K, V>::is_readable(&old_bucket, idx) {
                        continue;
                    }
                    let slot_key = BucketPage::<K, V>::key_at(&old_bucket, idx);
                    let target = self.hash(&slot_key) & global_mask;
                    if (local_mask & target) != (local_mask & dir_index) {
                        let slot_value = BucketPage::<K, V>::value_at(&old_bucket, idx);
                        BucketPage::<K, V>::insert(&mut new_bucket, &slot_key, &slot_value);
                        BucketPage::<K, V>::set_readable(&mut old_bucket, idx, false);
                    }
                }
            }

            drop(dir);
            self.buffer_pool.unpin_page(self.directory_page_id, true)?;
            self.buffer_pool.unpin_page(old_bucket_page_id, true)?;
            self.buffer_pool.unpin_page(new_bucket_page_id, true)?;
        }

        self.insert(key, value)
    }

    /// Remove the pair matching `(key, value)`. An emptied bucket is
    /// offered to `merge`.
    pub fn remove(&self, key: &K, value: &V) -> Result<bool> {
        let (removed, emptied) = {
            let _table = self.table_latch.read();

            let dir_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
            let bucket_page_id = {
                let dir = dir_page.read();
                DirectoryPage::bucket_page_id(&dir, self.key_to_index(key, &dir))
            };

            let bucket_page = self.buffer_pool.fetch_page(bucket_page_id)?;
            let (removed, emptied) = {
                let mut bucket = bucket_page.write();
                let removed = BucketPage::<K, V>::remove(&mut bucket, key, value);
                (removed, BucketPage::<K, V>::is_empty(&bucket))
            };

            self.buffer_pool.unpin_page(bucket_page_id, removed)?;
            self.buffer_pool.unpin_page(self.directory_page_id, false)?;
            (removed, emptied)
        };

        if removed && emptied {
            self.merge(key)?;
        }
        Ok(removed)
    }

    /// Fold an empty bucket into its split image when both halves sit at
    /// the same local depth, then shrink the directory while no slot needs
    /// the full global depth. Emptiness is re-checked under the exclusive
    /// latch; a racing insert cancels the merge.
    fn merge(&self, key: &K) -> Result<()> {
        let _table = self.table_latch.write();

        let dir_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        let mut dir = dir_page.write();

        let bucket_idx = self.key_to_index(key, &dir);
        let bucket_page_id = DirectoryPage::bucket_page_id(&dir, bucket_idx);

        let bucket_page = self.buffer_pool.fetch_page(bucket_page_id)?;
        let still_empty = {
            let bucket = bucket_page.read();
            BucketPage::<K, V>::is_empty(&bucket)
        };
        self.buffer_pool.unpin_page(bucket_page_id, false)?;

        if !still_empty {
            drop(dir);
            self.buffer_pool.unpin_page(self.directory_page_id, false)?;
            return Ok(());
        }

        let sibling_idx = DirectoryPage::split_image_index(&dir, bucket_idx);
        let sibling_page_id = DirectoryPage::bucket_page_id(&dir, sibling_idx);
        let local_depth = DirectoryPage::local_depth(&dir, bucket_idx);

        if bucket_page_id != sibling_page_id
            && local_depth == DirectoryPage::local_depth(&dir, sibling_idx)
            && local_depth > 0
        {
            self.buffer_pool.delete_page(bucket_page_id)?;

            let size = DirectoryPage::size(&dir);
            for i in 0..size {
                if DirectoryPage::bucket_page_id(&dir, i) == bucket_page_id {
                    DirectoryPage::decr_local_depth(&mut dir, i);
                    DirectoryPage::set_bucket_page_id(&mut dir, i, sibling_page_id);
                } else if DirectoryPage::bucket_page_id(&dir, i) == sibling_page_id {
                    DirectoryPage::decr_local_depth(&mut dir, i);
                }
            }
        }

        while DirectoryPage::global_depth(&dir) > 1 && DirectoryPage::can_shrink(&dir) {
            DirectoryPage::decr_global_depth(&mut dir);
        }

        drop(dir);
        self.buffer_pool.unpin_page(self.directory_page_id, true)?;
        Ok(())
    }

    pub fn global_depth(&self) -> Result<u32> {
        let _table = self.table_latch.read();
        let dir_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        let depth = DirectoryPage::global_depth(&dir_page.read());
        self.buffer_pool.unpin_page(self.directory_page_id, false)?;
        Ok(depth)
    }

    /// Check the directory invariants.
    pub fn verify_integrity(&self) -> Result<()> {
        let _table = self.table_latch.read();
        let dir_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        let result = DirectoryPage::verify_integrity(&dir_page.read());
        self.buffer_pool.unpin_page(self.directory_page_id, false)?;
        result.map_err(IndexError::IntegrityViolation)
    }

    fn hash(&self, key: &K) -> u32 {
        // DefaultHasher with fixed keys: stable across runs, which a
        // disk-resident table depends on.
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish() as u32
    }

    fn key_to_index(&self, key: &K, dir: &crate::common::types::Page) -> u32 {
        self.hash(key) & DirectoryPage::global_depth_mask(dir)
    }
}

/// Convenience constructor for the executor-facing index type.
impl ExtendibleHashTable<crate::index::hash::index_key::IndexKey, Rid> {
    pub fn for_table(buffer_pool: Arc<dyn BufferPool>) -> Result<Self> {
        Self::new(buffer_pool)
    }
}
