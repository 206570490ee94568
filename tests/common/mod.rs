use std::sync::Arc;

use tempfile::TempDir;

use oxbowdb::storage::buffer::manager::BufferPool;
use oxbowdb::{BufferPoolManager, DiskManager};

/// Buffer pool over a throwaway database file. The TempDir must outlive
/// the pool.
pub fn create_test_buffer_pool(pool_size: usize) -> (Arc<BufferPoolManager>, Arc<DiskManager>, TempDir) {
    let dir = TempDir::new().expect("create temp dir");
    let disk = Arc::new(DiskManager::new(dir.path().join("test.db")).expect("open disk manager"));
    let pool = Arc::new(BufferPoolManager::new(pool_size, Arc::clone(&disk)));
    (pool, disk, dir)
}

/// Same, but erased to the trait object most components consume.
#[allow(dead_code)]
pub fn create_test_pool_dyn(pool_size: usize) -> (Arc<dyn BufferPool>, Arc<DiskManager>, TempDir) {
    let (pool, disk, dir) = create_test_buffer_pool(pool_size);
    let pool: Arc<dyn BufferPool> = pool;
    (pool, disk, dir)
}
