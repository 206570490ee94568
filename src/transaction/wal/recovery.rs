use std::collections::HashMap;
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, info, warn};
use thiserror::Error;

use crate::common::types::{Lsn, TxnId, INVALID_PAGE_ID};
use crate::storage::buffer::manager::BufferPool;
use crate::storage::buffer::BufferPoolError;
use crate::storage::disk::{DiskManager, DiskManagerError};
use crate::storage::page::{PageError, PageManager};
use crate::storage::table::tuple::TupleError;
use crate::transaction::wal::log_manager::LOG_BUFFER_SIZE;
use crate::transaction::wal::log_record::{LogPayload, LogRecord};

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("Disk manager error: {0}")]
    Disk(#[from] DiskManagerError),

    #[error("Buffer pool error: {0}")]
    BufferPool(#[from] BufferPoolError),

    #[error("Page error: {0}")]
    Page(#[from] PageError),

    #[error("Tuple error: {0}")]
    Tuple(#[from] TupleError),

    #[error("Corrupt log: {0}")]
    Corruption(String),
}

pub type Result<T> = std::result::Result<T, RecoveryError>;

/// ARIES-style restart recovery at table-page granularity, without
/// checkpoints: one forward redo pass over the whole log, then undo of
/// every transaction that never reached COMMIT or ABORT.
pub struct LogRecovery {
    disk_manager: Arc<DiskManager>,
    buffer_pool: Arc<dyn BufferPool>,
    page_manager: PageManager,
    /// txn id -> LSN of its latest record seen during redo.
    active_txn: HashMap<TxnId, Lsn>,
    /// LSN -> byte offset of the record in the log file.
    lsn_mapping: HashMap<Lsn, u64>,
}

impl LogRecovery {
    pub fn new(disk_manager: Arc<DiskManager>, buffer_pool: Arc<dyn BufferPool>) -> Self {
        Self {
            disk_manager,
            buffer_pool,
            page_manager: PageManager::new(),
            active_txn: HashMap::new(),
            lsn_mapping: HashMap::new(),
        }
    }

    /// Run both recovery passes.
    pub fn recover(&mut self) -> Result<()> {
        info!("starting restart recovery");
        self.redo()?;
        self.undo()?;
        self.buffer_pool.flush_all_pages()?;
        info!("restart recovery complete");
        Ok(())
    }

    /// Transactions still open after the redo pass (losers).
    pub fn active_transactions(&self) -> Vec<TxnId> {
        self.active_txn.keys().copied().collect()
    }

    /// Forward pass: scan the log start to end, replay every operation
    /// whose LSN is newer than its page, and track live transactions plus
    /// record offsets for the undo pass.
    pub fn redo(&mut self) -> Result<()> {
        self.active_txn.clear();
        self.lsn_mapping.clear();

        let mut buf = vec![0u8; LOG_BUFFER_SIZE];
        let mut offset: u64 = 0;

        while self.disk_manager.read_log(&mut buf, offset)? {
            let mut buffer_offset = 0usize;
            while let Some(record) = LogRecord::deserialize(&buf[buffer_offset..]) {
                let size = LittleEndian::read_u32(&buf[buffer_offset..buffer_offset + 4]) as usize;
                self.lsn_mapping.insert(record.lsn, offset + buffer_offset as u64);
                self.active_txn.insert(record.txn_id, record.lsn);
                buffer_offset += size;

                debug!(
                    "redo scan: lsn {} txn {} type {:?}",
                    record.lsn,
                    record.txn_id,
                    record.record_type()
                );
                self.redo_record(&record)?;
            }

            if buffer_offset == 0 {
                // Nothing parsable at this offset: trailing padding or a
                // torn tail write. Recovery stops here.
                break;
            }
            offset += buffer_offset as u64;
        }
        Ok(())
    }

    fn redo_record(&mut self, record: &LogRecord) -> Result<()> {
        match &record.payload {
            LogPayload::Begin => {}
            LogPayload::Commit | LogPayload::Abort => {
                self.active_txn.remove(&record.txn_id);
            }
            LogPayload::NewPage { prev_page_id, page_id } => {
                let page = self.buffer_pool.fetch_page(*page_id)?;
                let need_redo;
                {
                    let mut guard = page.write();
                    need_redo = record.lsn > guard.lsn;
                    if need_redo {
                        self.page_manager.init_page(&mut guard);
                        self.page_manager.set_lsn(&mut guard, record.lsn);
                        if *prev_page_id != INVALID_PAGE_ID {
                            self.page_manager.set_prev_page_id(&mut guard, Some(*prev_page_id));
                        }
                    }
                }
                self.buffer_pool.unpin_page(*page_id, need_redo)?;

                if need_redo && *prev_page_id != INVALID_PAGE_ID {
                    let prev_page = self.buffer_pool.fetch_page(*prev_page_id)?;
                    let need_update;
                    {
                        let mut guard = prev_page.write();
                        let header = self.page_manager.get_header(&guard);
                        need_update = header.next_page_id != Some(*page_id);
                        if need_update {
                            self.page_manager.set_next_page_id(&mut guard, Some(*page_id));
                        }
                    }
                    self.buffer_pool.unpin_page(*prev_page_id, need_update)?;
                }
            }
            LogPayload::Insert { rid, tuple } => {
                self.redo_on_page(record, rid.page_id, |pm, page| {
                    let bytes = tuple.to_bytes()?;
                    let slot = pm.insert_record(page, &bytes)?;
                    if slot != rid.slot {
                        return Err(RecoveryError::Corruption(format!(
                            "redo insert landed in slot {} but the log says {}",
                            slot, rid.slot
                        )));
                    }
                    Ok(())
                })?;
            }
            LogPayload::MarkDelete { rid, .. } => {
                self.redo_on_page(record, rid.page_id, |pm, page| {
                    pm.mark_delete(page, rid.slot)?;
                    Ok(())
                })?;
            }
            LogPayload::ApplyDelete { rid, .. } => {
                self.redo_on_page(record, rid.page_id, |pm, page| {
                    pm.apply_delete(page, rid.slot)?;
                    Ok(())
                })?;
            }
            LogPayload::RollbackDelete { rid, .. } => {
                self.redo_on_page(record, rid.page_id, |pm, page| {
                    pm.rollback_delete(page, rid.slot)?;
                    Ok(())
                })?;
            }
            LogPayload::Update { rid, new_tuple, .. } => {
                self.redo_on_page(record, rid.page_id, |pm, page| {
                    let bytes = new_tuple.to_bytes()?;
                    pm.update_record(page, rid.slot, &bytes)?;
                    Ok(())
                })?;
            }
        }
        Ok(())
    }

    /// Replay one page-level operation if the page has not seen this
    /// record yet, stamping the page with the record's LSN afterwards.
    fn redo_on_page<F>(&self, record: &LogRecord, page_id: u32, apply: F) -> Result<()>
    where
        F: FnOnce(&PageManager, &mut crate::common::types::Page) -> Result<()>,
    {
        let page = self.buffer_pool.fetch_page(page_id)?;
        let need_redo;
        let result = {
            let mut guard = page.write();
            need_redo = record.lsn > guard.lsn;
            if need_redo {
                apply(&self.page_manager, &mut guard).map(|()| {
                    self.page_manager.set_lsn(&mut guard, record.lsn);
                })
            } else {
                Ok(())
            }
        };
        self.buffer_pool.unpin_page(page_id, need_redo)?;
        result
    }

    /// Backward pass: for each loser transaction, walk its `prev_lsn`
    /// chain and invert every operation.
    pub fn undo(&mut self) -> Result<()> {
        let losers = std::mem::take(&mut self.active_txn);
        let lsn_mapping = std::mem::take(&mut self.lsn_mapping);
        let mut buf = vec![0u8; LOG_BUFFER_SIZE];

        for (txn_id, last_lsn) in losers {
            info!("rolling back unfinished txn {}", txn_id);
            let mut lsn = last_lsn;
            while lsn != 0 {
                let offset = *lsn_mapping.get(&lsn).ok_or_else(|| {
                    RecoveryError::Corruption(format!("lsn {} missing from offset map", lsn))
                })?;

                self.disk_manager.read_log(&mut buf, offset)?;
                let record = LogRecord::deserialize(&buf).ok_or_else(|| {
                    RecoveryError::Corruption(format!("unreadable record at offset {}", offset))
                })?;

                if record.txn_id != txn_id {
                    return Err(RecoveryError::Corruption(format!(
                        "lsn {} belongs to txn {}, expected {}",
                        lsn, record.txn_id, txn_id
                    )));
                }

                self.undo_record(&record)?;
                lsn = record.prev_lsn;
            }
        }
        Ok(())
    }

    fn undo_record(&self, record: &LogRecord) -> Result<()> {
        debug!(
            "undo: lsn {} txn {} type {:?}",
            record.lsn,
            record.txn_id,
            record.record_type()
        );
        match &record.payload {
            LogPayload::Begin => {}
            LogPayload::Commit | LogPayload::Abort => {
                return Err(RecoveryError::Corruption(format!(
                    "finished txn {} found in the undo set",
                    record.txn_id
                )));
            }
            LogPayload::NewPage { prev_page_id, page_id } => {
                self.buffer_pool.delete_page(*page_id)?;
                if *prev_page_id != INVALID_PAGE_ID {
                    let prev_page = self.buffer_pool.fetch_page(*prev_page_id)?;
                    {
                        let mut guard = prev_page.write();
                        let header = self.page_manager.get_header(&guard);
                        if header.next_page_id != Some(*page_id) {
                            warn!(
                                "undoing page {} but page {} links elsewhere",
                                page_id, prev_page_id
                            );
                        }
                        self.page_manager.set_next_page_id(&mut guard, None);
                    }
                    self.buffer_pool.unpin_page(*prev_page_id, true)?;
                }
            }
            LogPayload::Insert { rid, .. } => {
                self.undo_on_page(rid.page_id, |pm, page| {
                    pm.apply_delete(page, rid.slot)?;
                    Ok(())
                })?;
            }
            LogPayload::ApplyDelete { rid, tuple } => {
                self.undo_on_page(rid.page_id, |pm, page| {
                    let bytes = tuple.to_bytes()?;
                    pm.insert_record_at(page, rid.slot, &bytes)?;
                    Ok(())
                })?;
            }
            LogPayload::MarkDelete { rid, .. } => {
                self.undo_on_page(rid.page_id, |pm, page| {
                    pm.rollback_delete(page, rid.slot)?;
                    Ok(())
                })?;
            }
            LogPayload::RollbackDelete { rid, .. } => {
                self.undo_on_page(rid.page_id, |pm, page| {
                    pm.mark_delete(page, rid.slot)?;
                    Ok(())
                })?;
            }
            LogPayload::Update { rid, old_tuple, .. } => {
                self.undo_on_page(rid.page_id, |pm, page| {
                    let bytes = old_tuple.to_bytes()?;
                    pm.update_record(page, rid.slot, &bytes)?;
                    Ok(())
                })?;
            }
        }
        Ok(())
    }

    fn undo_on_page<F>(&self, page_id: u32, apply: F) -> Result<()>
    where
        F: FnOnce(&PageManager, &mut crate::common::types::Page) -> Result<()>,
    {
        let page = self.buffer_pool.fetch_page(page_id)?;
        let result = {
            let mut guard = page.write();
            apply(&self.page_manager, &mut guard)
        };
        self.buffer_pool.unpin_page(page_id, result.is_ok())?;
        result
    }
}
