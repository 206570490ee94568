use std::sync::Arc;

use thiserror::Error;

use crate::common::types::{PageId, Rid, INVALID_PAGE_ID, PAGE_SIZE};
use crate::storage::buffer::manager::BufferPool;
use crate::storage::buffer::BufferPoolError;
use crate::storage::page::layout::{HEADER_SIZE, SLOT_SIZE};
use crate::storage::page::{PageError, PageManager};
use crate::storage::table::tuple::{Tuple, TupleError};
use crate::transaction::concurrency::transaction::Transaction;
use crate::transaction::wal::log_manager::{LogError, LogManager};
use crate::transaction::wal::log_record::LogRecord;

#[derive(Error, Debug)]
pub enum TableHeapError {
    #[error("Tuple of {0} bytes does not fit in a page")]
    TupleTooLarge(usize),

    #[error("Buffer pool error: {0}")]
    BufferPool(#[from] BufferPoolError),

    #[error("Page error: {0}")]
    Page(#[from] PageError),

    #[error("Tuple error: {0}")]
    Tuple(#[from] TupleError),

    #[error("WAL error: {0}")]
    Log(#[from] LogError),
}

pub type Result<T> = std::result::Result<T, TableHeapError>;

/// A table stored as a doubly linked chain of slotted pages.
///
/// Mutations append their log record (when a log manager is attached and a
/// transaction is supplied), stamp the page with the record's LSN, and
/// thread the LSN into the transaction's chain. Passing no transaction
/// bypasses logging entirely, which is what recovery relies on.
pub struct TableHeap {
    buffer_pool: Arc<dyn BufferPool>,
    log_manager: Option<Arc<LogManager>>,
    page_manager: PageManager,
    first_page_id: PageId,
}

impl TableHeap {
    /// Create a heap with one empty page.
    pub fn new(
        buffer_pool: Arc<dyn BufferPool>,
        log_manager: Option<Arc<LogManager>>,
        txn: Option<&Transaction>,
    ) -> Result<Self> {
        let (page, first_page_id) = buffer_pool.new_page()?;
        let page_manager = PageManager::new();
        {
            let mut guard = page.write();
            page_manager.init_page(&mut guard);
        }

        let heap = Self {
            buffer_pool,
            log_manager,
            page_manager,
            first_page_id,
        };

        if let Some(lsn) = heap.append_log(txn, |txn_id, prev_lsn| {
            LogRecord::new_page(txn_id, prev_lsn, INVALID_PAGE_ID, first_page_id)
        })? {
            let mut guard = page.write();
            heap.page_manager.set_lsn(&mut guard, lsn);
        }

        heap.buffer_pool.unpin_page(first_page_id, true)?;
        Ok(heap)
    }

    /// Reattach to an existing heap (e.g. after restart).
    pub fn open(
        buffer_pool: Arc<dyn BufferPool>,
        log_manager: Option<Arc<LogManager>>,
        first_page_id: PageId,
    ) -> Self {
        Self {
            buffer_pool,
            log_manager,
            page_manager: PageManager::new(),
            first_page_id,
        }
    }

    pub fn first_page_id(&self) -> PageId {
        self.first_page_id
    }

    /// Insert a tuple, extending the page chain when every existing page
    /// is full. Returns the new tuple's rid.
    pub fn insert_tuple(&self, tuple: &Tuple, txn: Option<&Transaction>) -> Result<Rid> {
        let bytes = tuple.to_bytes()?;
        if bytes.len() + SLOT_SIZE + HEADER_SIZE > PAGE_SIZE {
            return Err(TableHeapError::TupleTooLarge(bytes.len()));
        }

        let mut page_id = self.first_page_id;
        loop {
            let page = self.buffer_pool.fetch_page(page_id)?;
            let mut guard = page.write();

            match self.page_manager.insert_record(&mut guard, &bytes) {
                Ok(slot) => {
                    let rid = Rid::new(page_id, slot);
                    if let Some(lsn) = self.append_log(txn, |txn_id, prev_lsn| {
                        LogRecord::new_insert(txn_id, prev_lsn, rid, tuple.clone())
                    })? {
                        self.page_manager.set_lsn(&mut guard, lsn);
                    }
                    drop(guard);
                    self.buffer_pool.unpin_page(page_id, true)?;
                    return Ok(rid);
                }
                Err(PageError::InsufficientSpace) => {
                    let next = self.page_manager.get_header(&guard).next_page_id;
                    match next {
                        Some(next_id) => {
                            drop(guard);
                            self.buffer_pool.unpin_page(page_id, false)?;
                            page_id = next_id;
                        }
                        None => {
                            let rid =
                                self.insert_into_new_page(page_id, &mut guard, tuple, &bytes, txn)?;
                            drop(guard);
                            self.buffer_pool.unpin_page(page_id, true)?;
                            return Ok(rid);
                        }
                    }
                }
                Err(e) => {
                    drop(guard);
                    self.buffer_pool.unpin_page(page_id, false)?;
                    return Err(e.into());
                }
            }
        }
    }

    /// Logically delete the tuple at `rid`; it stays rollbackable until the
    /// owning transaction commits.
    pub fn mark_delete(&self, rid: Rid, txn: Option<&Transaction>) -> Result<()> {
        let page = self.buffer_pool.fetch_page(rid.page_id)?;
        let mut guard = page.write();

        let result = (|| -> Result<()> {
            let bytes = self.page_manager.get_record(&guard, rid.slot)?;
            let tuple = Tuple::from_bytes(&bytes)?;
            self.page_manager.mark_delete(&mut guard, rid.slot)?;
            if let Some(lsn) = self.append_log(txn, |txn_id, prev_lsn| {
                LogRecord::new_mark_delete(txn_id, prev_lsn, rid, tuple.clone())
            })? {
                self.page_manager.set_lsn(&mut guard, lsn);
            }
            Ok(())
        })();

        drop(guard);
        self.buffer_pool.unpin_page(rid.page_id, result.is_ok())?;
        result
    }

    /// Undo a mark-delete.
    pub fn rollback_delete(&self, rid: Rid, txn: Option<&Transaction>) -> Result<()> {
        let page = self.buffer_pool.fetch_page(rid.page_id)?;
        let mut guard = page.write();

        let result = (|| -> Result<()> {
            self.page_manager.rollback_delete(&mut guard, rid.slot)?;
            let bytes = self.page_manager.get_record(&guard, rid.slot)?;
            let tuple = Tuple::from_bytes(&bytes)?;
            if let Some(lsn) = self.append_log(txn, |txn_id, prev_lsn| {
                LogRecord::new_rollback_delete(txn_id, prev_lsn, rid, tuple.clone())
            })? {
                self.page_manager.set_lsn(&mut guard, lsn);
            }
            Ok(())
        })();

        drop(guard);
        self.buffer_pool.unpin_page(rid.page_id, result.is_ok())?;
        result
    }

    /// Physically remove the tuple at `rid` (live or mark-deleted).
    pub fn apply_delete(&self, rid: Rid, txn: Option<&Transaction>) -> Result<()> {
        let page = self.buffer_pool.fetch_page(rid.page_id)?;
        let mut guard = page.write();

        let result = (|| -> Result<()> {
            let bytes = self.page_manager.get_record_raw(&guard, rid.slot)?;
            let tuple = Tuple::from_bytes(&bytes)?;
            self.page_manager.apply_delete(&mut guard, rid.slot)?;
            if let Some(lsn) = self.append_log(txn, |txn_id, prev_lsn| {
                LogRecord::new_apply_delete(txn_id, prev_lsn, rid, tuple.clone())
            })? {
                self.page_manager.set_lsn(&mut guard, lsn);
            }
            Ok(())
        })();

        drop(guard);
        self.buffer_pool.unpin_page(rid.page_id, result.is_ok())?;
        result
    }

    /// Replace the tuple at `rid`, returning the old image.
    pub fn update_tuple(
        &self,
        rid: Rid,
        new_tuple: &Tuple,
        txn: Option<&Transaction>,
    ) -> Result<Tuple> {
        let page = self.buffer_pool.fetch_page(rid.page_id)?;
        let mut guard = page.write();

        let result = (|| -> Result<Tuple> {
            let old_bytes = self.page_manager.get_record(&guard, rid.slot)?;
            let old_tuple = Tuple::from_bytes(&old_bytes)?;
            let new_bytes = new_tuple.to_bytes()?;
            self.page_manager.update_record(&mut guard, rid.slot, &new_bytes)?;
            if let Some(lsn) = self.append_log(txn, |txn_id, prev_lsn| {
                LogRecord::new_update(txn_id, prev_lsn, rid, old_tuple.clone(), new_tuple.clone())
            })? {
                self.page_manager.set_lsn(&mut guard, lsn);
            }
            Ok(old_tuple)
        })();

        drop(guard);
        self.buffer_pool.unpin_page(rid.page_id, result.is_ok())?;
        result
    }

    /// Read the live tuple at `rid`.
    pub fn get_tuple(&self, rid: Rid) -> Result<Tuple> {
        let page = self.buffer_pool.fetch_page(rid.page_id)?;
        let result = {
            let guard = page.read();
            self.page_manager
                .get_record(&guard, rid.slot)
                .map_err(TableHeapError::from)
                .and_then(|bytes| Tuple::from_bytes(&bytes).map_err(TableHeapError::from))
        };
        self.buffer_pool.unpin_page(rid.page_id, false)?;
        result
    }

    /// Iterate the live tuples of the heap in page-chain order.
    pub fn iter(&self) -> TableIterator {
        TableIterator {
            buffer_pool: Arc::clone(&self.buffer_pool),
            page_manager: PageManager::new(),
            current_page: Some(self.first_page_id),
            current_slot: 0,
        }
    }

    /// Chain a fresh page after `tail_id` (whose guard the caller holds)
    /// and insert into it.
    fn insert_into_new_page(
        &self,
        tail_id: PageId,
        tail_guard: &mut parking_lot::RwLockWriteGuard<'_, crate::common::types::Page>,
        tuple: &Tuple,
        bytes: &[u8],
        txn: Option<&Transaction>,
    ) -> Result<Rid> {
        let (new_page, new_page_id) = self.buffer_pool.new_page()?;
        let mut new_guard = new_page.write();

        self.page_manager.init_page(&mut new_guard);
        self.page_manager.set_prev_page_id(&mut new_guard, Some(tail_id));
        self.page_manager.set_next_page_id(tail_guard, Some(new_page_id));

        if let Some(lsn) = self.append_log(txn, |txn_id, prev_lsn| {
            LogRecord::new_page(txn_id, prev_lsn, tail_id, new_page_id)
        })? {
            self.page_manager.set_lsn(&mut new_guard, lsn);
        }

        let slot = self.page_manager.insert_record(&mut new_guard, bytes)?;
        let rid = Rid::new(new_page_id, slot);

        if let Some(lsn) = self.append_log(txn, |txn_id, prev_lsn| {
            LogRecord::new_insert(txn_id, prev_lsn, rid, tuple.clone())
        })? {
            self.page_manager.set_lsn(&mut new_guard, lsn);
        }

        drop(new_guard);
        self.buffer_pool.unpin_page(new_page_id, true)?;
        Ok(rid)
    }

    /// Append a record to the WAL when logging is active for this heap,
    /// advancing the transaction's LSN chain.
    fn append_log<F>(&self, txn: Option<&Transaction>, make: F) -> Result<Option<crate::common::types::Lsn>>
    where
        F: FnOnce(crate::common::types::TxnId, crate::common::types::Lsn) -> LogRecord,
    {
        if let (Some(log_manager), Some(txn)) = (&self.log_manager, txn) {
            if log_manager.logging_enabled() {
                let mut record = make(txn.id(), txn.prev_lsn());
                let lsn = log_manager.append_log_record(&mut record)?;
                txn.set_prev_lsn(lsn);
                return Ok(Some(lsn));
            }
        }
        Ok(None)
    }
}

/// Pull-based cursor over a heap's live tuples. Errors (e.g. a page that
/// cannot be fetched) terminate the iteration.
pub struct TableIterator {
    buffer_pool: Arc<dyn BufferPool>,
    page_manager: PageManager,
    current_page: Option<PageId>,
    current_slot: u32,
}

impl Iterator for TableIterator {
    type Item = (Rid, Tuple);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let page_id = self.current_page?;
            let page = self.buffer_pool.fetch_page(page_id).ok()?;

            let mut found = None;
            let next_page;
            {
                let guard = page.read();
                let header = self.page_manager.get_header(&guard);
                let mut slot = self.current_slot;
                while slot < header.slot_count {
                    if self.page_manager.is_live(&guard, slot) {
                        if let Ok(bytes) = self.page_manager.get_record(&guard, slot) {
                            if let Ok(tuple) = Tuple::from_bytes(&bytes) {
                                found = Some((Rid::new(page_id, slot), tuple));
                                break;
                            }
                        }
                    }
                    slot += 1;
                }
                self.current_slot = slot + 1;
                next_page = header.next_page_id;
            }
            let _ = self.buffer_pool.unpin_page(page_id, false);

            if found.is_some() {
                return found;
            }

            self.current_page = next_page;
            self.current_slot = 0;
        }
    }
}
