use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::common::types::TxnId;
use crate::index::hash::index_key::IndexKey;
use crate::transaction::concurrency::lock_manager::LockManager;
use crate::transaction::concurrency::transaction::{
    IsolationLevel, Transaction, TransactionError, TransactionState, WriteType,
};
use crate::transaction::wal::log_manager::LogManager;
use crate::transaction::wal::log_record::LogRecord;

/// Creates transactions, drives their commit/abort protocols, and tracks
/// the active set.
///
/// Commit applies deferred deletes, forces the log (simple force policy),
/// and releases all locks. Abort walks the write logs backwards, inverting
/// each table and index mutation, before releasing locks.
pub struct TransactionManager {
    next_txn_id: AtomicU32,
    log_manager: Option<Arc<LogManager>>,
    lock_manager: Option<Arc<LockManager>>,
    active: Mutex<HashMap<TxnId, Arc<Transaction>>>,
}

impl TransactionManager {
    pub fn new(
        log_manager: Option<Arc<LogManager>>,
        lock_manager: Option<Arc<LockManager>>,
    ) -> Self {
        Self {
            next_txn_id: AtomicU32::new(1),
            log_manager,
            lock_manager,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Begin a new transaction, logging BEGIN.
    pub fn begin(&self, isolation_level: IsolationLevel) -> Result<Arc<Transaction>, TransactionError> {
        let txn_id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let txn = Arc::new(Transaction::new(txn_id, isolation_level));

        if let Some(ref log_manager) = self.log_manager {
            if log_manager.logging_enabled() {
                let mut record = LogRecord::new_begin(txn_id);
                let lsn = log_manager.append_log_record(&mut record)?;
                txn.set_prev_lsn(lsn);
            }
        }

        self.active.lock().insert(txn_id, Arc::clone(&txn));
        Ok(txn)
    }

    /// Commit: apply deferred deletes, log COMMIT and force it to disk,
    /// then release every lock.
    pub fn commit(&self, txn: &Arc<Transaction>) -> Result<(), TransactionError> {
        match txn.state() {
            TransactionState::Committed | TransactionState::Aborted => {
                return Err(TransactionError::InvalidState(txn.id()))
            }
            _ => {}
        }

        // Mark-deletes become physical at commit.
        for record in txn.take_write_set() {
            if record.write_type == WriteType::Delete {
                record
                    .table
                    .apply_delete(record.rid, Some(txn.as_ref()))
                    .map_err(|e| TransactionError::StorageError(e.to_string()))?;
            }
        }
        txn.take_index_write_set();

        if let Some(ref log_manager) = self.log_manager {
            if log_manager.logging_enabled() {
                let mut record = LogRecord::new_commit(txn.id(), txn.prev_lsn());
                let lsn = log_manager.append_log_record(&mut record)?;
                txn.set_prev_lsn(lsn);
                log_manager.flush(true);
            }
        }

        txn.set_state(TransactionState::Committed);
        self.finish(txn);
        debug!("txn {} committed", txn.id());
        Ok(())
    }

    /// Abort: invert every table and index write in reverse order, log
    /// ABORT, then release every lock. Also used to clean up transactions
    /// wounded by the lock manager (already in the ABORTED state).
    pub fn abort(&self, txn: &Arc<Transaction>) -> Result<(), TransactionError> {
        if txn.state() == TransactionState::Committed {
            return Err(TransactionError::InvalidState(txn.id()));
        }

        for record in txn.take_write_set().into_iter().rev() {
            let result = match record.write_type {
                WriteType::Insert => record.table.apply_delete(record.rid, Some(txn.as_ref())),
                WriteType::Delete => record.table.rollback_delete(record.rid, Some(txn.as_ref())),
                WriteType::Update => record
                    .table
                    .update_tuple(record.rid, &record.old_tuple, Some(txn.as_ref()))
                    .map(|_| ()),
            };
            result.map_err(|e| TransactionError::StorageError(e.to_string()))?;
        }

        for record in txn.take_index_write_set().into_iter().rev() {
            match record.write_type {
                WriteType::Insert => {
                    let key = IndexKey::from_tuple(&record.tuple.key_from_tuple(&record.key_attrs));
                    record.index.remove(&key, &record.rid).map_err(to_storage_error)?;
                }
                WriteType::Delete => {
                    let key =
                        IndexKey::from_tuple(&record.old_tuple.key_from_tuple(&record.key_attrs));
                    record.index.insert(key, record.rid).map_err(to_storage_error)?;
                }
                WriteType::Update => {
                    let new_key =
                        IndexKey::from_tuple(&record.tuple.key_from_tuple(&record.key_attrs));
                    record.index.remove(&new_key, &record.rid).map_err(to_storage_error)?;
                    let old_key =
                        IndexKey::from_tuple(&record.old_tuple.key_from_tuple(&record.key_attrs));
                    record.index.insert(old_key, record.rid).map_err(to_storage_error)?;
                }
            }
        }

        if let Some(ref log_manager) = self.log_manager {
            if log_manager.logging_enabled() {
                let mut record = LogRecord::new_abort(txn.id(), txn.prev_lsn());
                let lsn = log_manager.append_log_record(&mut record)?;
                txn.set_prev_lsn(lsn);
            }
        }

        txn.set_state(TransactionState::Aborted);
        self.finish(txn);
        debug!("txn {} aborted", txn.id());
        Ok(())
    }

    pub fn get_transaction(&self, txn_id: TxnId) -> Option<Arc<Transaction>> {
        self.active.lock().get(&txn_id).cloned()
    }

    pub fn active_transaction_ids(&self) -> Vec<TxnId> {
        self.active.lock().keys().copied().collect()
    }

    /// Strict 2PL: locks are released only here, at end of transaction.
    fn finish(&self, txn: &Arc<Transaction>) {
        if let Some(ref lock_manager) = self.lock_manager {
            lock_manager.release_all_locks(txn);
        }
        self.active.lock().remove(&txn.id());
    }
}

fn to_storage_error<E: std::fmt::Display>(e: E) -> TransactionError {
    TransactionError::StorageError(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_assigns_increasing_ids() {
        let tm = TransactionManager::new(None, None);
        let t1 = tm.begin(IsolationLevel::RepeatableRead).unwrap();
        let t2 = tm.begin(IsolationLevel::ReadCommitted).unwrap();
        assert!(t2.id() > t1.id());
        assert_eq!(tm.active_transaction_ids().len(), 2);
    }

    #[test]
    fn test_commit_removes_from_active_set() {
        let tm = TransactionManager::new(None, None);
        let txn = tm.begin(IsolationLevel::RepeatableRead).unwrap();
        tm.commit(&txn).unwrap();
        assert_eq!(txn.state(), TransactionState::Committed);
        assert!(tm.get_transaction(txn.id()).is_none());

        // Double commit is rejected.
        assert!(matches!(
            tm.commit(&txn),
            Err(TransactionError::InvalidState(_))
        ));
    }

    #[test]
    fn test_abort_of_wounded_transaction() {
        let tm = TransactionManager::new(None, None);
        let txn = tm.begin(IsolationLevel::RepeatableRead).unwrap();
        txn.set_state(TransactionState::Aborted);
        tm.abort(&txn).unwrap();
        assert!(tm.get_transaction(txn.id()).is_none());
    }
}
