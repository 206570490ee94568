use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::types::{PageId, PagePtr};
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::manager::{BufferPool, BufferPoolManager};
use crate::storage::disk::DiskManager;
use crate::transaction::wal::log_manager::LogManager;

/// A buffer pool sharded into independent instances.
///
/// Per-page operations dispatch by `page_id % num_instances`, which lines
/// up with how each instance allocates its ids. `new_page` probes the
/// instances round-robin from a rotating starting index so allocations
/// spread across shards.
pub struct ParallelBufferPoolManager {
    instances: Vec<Arc<BufferPoolManager>>,
    starting_index: Mutex<usize>,
}

impl ParallelBufferPoolManager {
    pub fn new(
        num_instances: u32,
        pool_size: usize,
        disk_manager: Arc<DiskManager>,
        log_manager: Option<Arc<LogManager>>,
    ) -> Self {
        let instances = (0..num_instances)
            .map(|i| {
                Arc::new(BufferPoolManager::new_instance(
                    pool_size,
                    num_instances,
                    i,
                    Arc::clone(&disk_manager),
                    log_manager.clone(),
                ))
            })
            .collect();

        Self {
            instances,
            starting_index: Mutex::new(0),
        }
    }

    fn instance_for(&self, page_id: PageId) -> &BufferPoolManager {
        &self.instances[page_id as usize % self.instances.len()]
    }
}

impl BufferPool for ParallelBufferPoolManager {
    fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        self.instance_for(page_id).fetch_page(page_id)
    }

    fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError> {
        let mut start = self.starting_index.lock();
        let n = self.instances.len();

        let mut i = *start;
        loop {
            match self.instances[i].new_page() {
                Ok(result) => {
                    *start = (i + 1) % n;
                    return Ok(result);
                }
                Err(_) => {
                    i = (i + 1) % n;
                    if i == *start {
                        break;
                    }
                }
            }
        }

        *start = (i + 1) % n;
        Err(BufferPoolError::BufferPoolFull)
    }

    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError> {
        self.instance_for(page_id).unpin_page(page_id, is_dirty)
    }

    fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        self.instance_for(page_id).flush_page(page_id)
    }

    fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        self.instance_for(page_id).delete_page(page_id)
    }

    fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        for instance in &self.instances {
            instance.flush_all_pages()?;
        }
        Ok(())
    }

    fn pool_size(&self) -> usize {
        self.instances.len() * self.instances[0].pool_size()
    }
}
