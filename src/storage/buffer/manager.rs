use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use parking_lot::{Mutex, RwLock};

use crate::common::types::{Frame, FrameId, FramePtr, Page, PageId, PagePtr, INVALID_PAGE_ID};
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::replacer::LruReplacer;
use crate::storage::disk::DiskManager;
use crate::storage::page::layout::PAGE_LSN_OFFSET;
use crate::transaction::wal::log_manager::LogManager;

/// Common surface of the single-instance and parallel buffer pools. The
/// table heap, hash index, recovery, and executors all go through this.
pub trait BufferPool: Send + Sync {
    fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError>;
    fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError>;
    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError>;
    fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError>;
    fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError>;
    fn flush_all_pages(&self) -> Result<(), BufferPoolError>;
    fn pool_size(&self) -> usize;
}

/// Bookkeeping guarded by the pool latch. Frame contents live outside it
/// (each frame has its own lock), but membership decisions — which page is
/// in which frame, what is free, what is evictable — are made atomically.
struct PoolCore {
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
    replacer: LruReplacer,
}

/// A fixed-size cache of pages over one disk manager.
///
/// Page ids are allocated starting at `instance_index` and stepping by
/// `num_instances`, so ids partition cleanly across the instances of a
/// parallel pool.
pub struct BufferPoolManager {
    pool_size: usize,
    num_instances: u32,
    frames: Vec<FramePtr>,
    core: Mutex<PoolCore>,
    next_page_id: AtomicU32,
    disk_manager: Arc<DiskManager>,
    log_manager: Option<Arc<LogManager>>,
}

impl BufferPoolManager {
    /// A standalone instance owning the whole page-id space.
    pub fn new(pool_size: usize, disk_manager: Arc<DiskManager>) -> Self {
        Self::new_instance(pool_size, 1, 0, disk_manager, None)
    }

    /// A standalone instance with WAL protection on eviction.
    pub fn new_with_wal(
        pool_size: usize,
        disk_manager: Arc<DiskManager>,
        log_manager: Arc<LogManager>,
    ) -> Self {
        Self::new_instance(pool_size, 1, 0, disk_manager, Some(log_manager))
    }

    /// One shard of a parallel pool.
    pub fn new_instance(
        pool_size: usize,
        num_instances: u32,
        instance_index: u32,
        disk_manager: Arc<DiskManager>,
        log_manager: Option<Arc<LogManager>>,
    ) -> Self {
        assert!(num_instances > 0, "a pool needs at least one instance");
        assert!(
            instance_index < num_instances,
            "instance index must fall inside the pool"
        );

        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);
        for i in 0..pool_size {
            let frame_id = i as FrameId;
            let page = Arc::new(RwLock::new(Page::new(INVALID_PAGE_ID)));
            frames.push(Arc::new(RwLock::new(Frame::new(frame_id, page))));
            free_list.push_back(frame_id);
        }

        Self {
            pool_size,
            num_instances,
            frames,
            core: Mutex::new(PoolCore {
                page_table: HashMap::new(),
                free_list,
                replacer: LruReplacer::new(pool_size),
            }),
            next_page_id: AtomicU32::new(instance_index),
            disk_manager,
            log_manager,
        }
    }

    /// Pick a frame to receive a page: free list first, then LRU victim.
    /// A victim's old page is written back (after forcing the log, when the
    /// WAL rule demands it) and unmapped.
    fn allocate_frame(&self, core: &mut PoolCore) -> Result<FrameId, BufferPoolError> {
        if let Some(frame_id) = core.free_list.pop_front() {
            return Ok(frame_id);
        }

        let victim_id = core.replacer.victim().ok_or(BufferPoolError::BufferPoolFull)?;

        let frame = &self.frames[victim_id as usize];
        let frame_guard = frame.read();
        let old_page_id;
        {
            let page_guard = frame_guard.page.read();
            old_page_id = page_guard.page_id;
            if frame_guard.is_dirty && old_page_id != INVALID_PAGE_ID {
                self.flush_log_for(&page_guard);
                self.disk_manager.write_page(&page_guard)?;
            }
        }
        drop(frame_guard);

        if old_page_id != INVALID_PAGE_ID {
            core.page_table.remove(&old_page_id);
        }
        Ok(victim_id)
    }

    /// WAL rule: the log record that last touched this page must be on
    /// disk before the page itself is.
    fn flush_log_for(&self, page: &Page) {
        if let Some(ref log_manager) = self.log_manager {
            if log_manager.logging_enabled() && page.lsn > log_manager.persistent_lsn() {
                log_manager.flush(true);
            }
        }
    }
}

impl BufferPool for BufferPoolManager {
    /// Fetch a page, pinning it. Resident pages are served from their
    /// frame; otherwise a frame is recycled and the page is read from disk.
    fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        if page_id == INVALID_PAGE_ID {
            return Err(BufferPoolError::InvalidOperation(
                "Cannot fetch invalid page ID".to_string(),
            ));
        }

        let mut core = self.core.lock();

        if let Some(&frame_id) = core.page_table.get(&page_id) {
            let frame = &self.frames[frame_id as usize];
            let mut frame_guard = frame.write();
            frame_guard.pin_count += 1;
            core.replacer.pin(frame_id);
            return Ok(frame_guard.page.clone());
        }

        let frame_id = self.allocate_frame(&mut core)?;
        let frame = &self.frames[frame_id as usize];
        let mut frame_guard = frame.write();
        {
            let mut page_guard = frame_guard.page.write();
            self.disk_manager.read_page(page_id, &mut page_guard)?;
            // Every page kind keeps its LSN in the first four bytes.
            page_guard.lsn =
                LittleEndian::read_u32(&page_guard.data[PAGE_LSN_OFFSET..PAGE_LSN_OFFSET + 4]);
        }
        frame_guard.pin_count = 1;
        frame_guard.is_dirty = false;

        core.page_table.insert(page_id, frame_id);
        Ok(frame_guard.page.clone())
    }

    /// Allocate a fresh page id and a zeroed, pinned, dirty page for it.
    fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError> {
        let mut core = self.core.lock();

        let frame_id = self.allocate_frame(&mut core)?;
        let page_id = self.next_page_id.fetch_add(self.num_instances, Ordering::SeqCst);

        let frame = &self.frames[frame_id as usize];
        let mut frame_guard = frame.write();
        {
            let mut page_guard = frame_guard.page.write();
            page_guard.reset_memory();
            page_guard.page_id = page_id;
            page_guard.lsn = 0;
        }
        frame_guard.pin_count = 1;
        frame_guard.is_dirty = true;

        core.page_table.insert(page_id, frame_id);
        Ok((frame_guard.page.clone(), page_id))
    }

    /// Drop one pin. The dirty flag only ever accumulates here; it is
    /// cleared by flushing. At pin count zero the frame becomes evictable.
    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError> {
        let mut core = self.core.lock();

        let frame_id = match core.page_table.get(&page_id) {
            Some(&id) => id,
            None => return Err(BufferPoolError::PageNotFound(page_id)),
        };

        let frame = &self.frames[frame_id as usize];
        let mut frame_guard = frame.write();
        if is_dirty {
            frame_guard.is_dirty = true;
        }
        if frame_guard.pin_count > 0 {
            frame_guard.pin_count -= 1;
        }
        if frame_guard.pin_count == 0 {
            core.replacer.unpin(frame_id);
        }
        Ok(())
    }

    /// Write a resident page to disk (dirty or not) and clear its dirty bit.
    fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let core = self.core.lock();

        let frame_id = match core.page_table.get(&page_id) {
            Some(&id) => id,
            None => return Err(BufferPoolError::PageNotFound(page_id)),
        };

        let frame = &self.frames[frame_id as usize];
        let mut frame_guard = frame.write();
        {
            let page_guard = frame_guard.page.read();
            self.flush_log_for(&page_guard);
            self.disk_manager.write_page(&page_guard)?;
        }
        frame_guard.is_dirty = false;
        Ok(())
    }

    fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        let page_ids: Vec<PageId> = {
            let core = self.core.lock();
            core.page_table.keys().copied().collect()
        };
        for page_id in page_ids {
            self.flush_page(page_id)?;
        }
        Ok(())
    }

    /// Remove a page from the pool. Absent pages delete trivially; pinned
    /// pages refuse. The freed frame goes back to the free list.
    fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let mut core = self.core.lock();

        let frame_id = match core.page_table.get(&page_id) {
            Some(&id) => id,
            None => return Ok(()),
        };

        let frame = &self.frames[frame_id as usize];
        let mut frame_guard = frame.write();
        if frame_guard.pin_count > 0 {
            return Err(BufferPoolError::PagePinned(page_id));
        }

        {
            let mut page_guard = frame_guard.page.write();
            page_guard.reset_memory();
            page_guard.page_id = INVALID_PAGE_ID;
            page_guard.lsn = 0;
        }
        frame_guard.is_dirty = false;

        core.page_table.remove(&page_id);
        core.replacer.pin(frame_id);
        core.free_list.push_back(frame_id);
        Ok(())
    }

    fn pool_size(&self) -> usize {
        self.pool_size
    }
}
