use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::common::types::{Lsn, Rid, TxnId};
use crate::index::hash::HashIndex;
use crate::storage::table::table_heap::TableHeap;
use crate::storage::table::tuple::Tuple;
use crate::transaction::wal::log_manager::LogError;

/// Transaction isolation levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
}

/// Transaction states under strict two-phase locking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Growing,
    Shrinking,
    Committed,
    Aborted,
}

/// Why a transaction was aborted by the lock manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    LockSharedOnReadUncommitted,
    LockOnShrinking,
    UpgradeConflict,
    Deadlock,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            AbortReason::LockSharedOnReadUncommitted => {
                "shared lock requested under READ UNCOMMITTED"
            }
            AbortReason::LockOnShrinking => "lock requested in shrinking phase",
            AbortReason::UpgradeConflict => "conflicting lock upgrade in progress",
            AbortReason::Deadlock => "chosen as deadlock victim",
        };
        write!(f, "{}", text)
    }
}

/// Errors surfaced by transaction processing
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Transaction {txn_id} aborted: {reason}")]
    Aborted { txn_id: TxnId, reason: AbortReason },

    #[error("Transaction {0} is already committed or aborted")]
    InvalidState(TxnId),

    #[error("Transaction {0} holds no shared lock to upgrade")]
    UpgradeWithoutSharedLock(TxnId),

    #[error("Failed to write to WAL: {0}")]
    LogError(#[from] LogError),

    #[error("Storage error during commit/abort processing: {0}")]
    StorageError(String),
}

pub type Result<T> = std::result::Result<T, TransactionError>;

/// What kind of write a rollback record undoes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteType {
    Insert,
    Delete,
    Update,
}

/// One table-heap mutation, remembered so abort can invert it.
pub struct TableWriteRecord {
    pub rid: Rid,
    pub write_type: WriteType,
    /// For updates, the pre-image; unused otherwise.
    pub old_tuple: Tuple,
    pub table: Arc<TableHeap>,
}

/// One index mutation, remembered so abort can invert it.
pub struct IndexWriteRecord {
    pub rid: Rid,
    pub write_type: WriteType,
    /// The tuple as inserted/updated (empty for deletes).
    pub tuple: Tuple,
    /// The displaced tuple (empty for inserts).
    pub old_tuple: Tuple,
    pub key_attrs: Vec<usize>,
    pub index: Arc<HashIndex>,
}

/// An active database transaction.
///
/// The transaction itself is passive: the lock manager mutates its lock
/// sets, the table heap threads the WAL chain through `prev_lsn`, and the
/// executors append write records for rollback. All fields are therefore
/// shareable behind `&self`.
pub struct Transaction {
    id: TxnId,
    isolation_level: IsolationLevel,
    state: Mutex<TransactionState>,
    prev_lsn: AtomicU32,
    shared_lock_set: Mutex<HashSet<Rid>>,
    exclusive_lock_set: Mutex<HashSet<Rid>>,
    write_set: Mutex<Vec<TableWriteRecord>>,
    index_write_set: Mutex<Vec<IndexWriteRecord>>,
}

impl Transaction {
    pub fn new(id: TxnId, isolation_level: IsolationLevel) -> Self {
        Self {
            id,
            isolation_level,
            state: Mutex::new(TransactionState::Growing),
            prev_lsn: AtomicU32::new(0),
            shared_lock_set: Mutex::new(HashSet::new()),
            exclusive_lock_set: Mutex::new(HashSet::new()),
            write_set: Mutex::new(Vec::new()),
            index_write_set: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    pub fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: TransactionState) {
        *self.state.lock() = state;
    }

    /// LSN of this transaction's latest log record (0 before BEGIN).
    pub fn prev_lsn(&self) -> Lsn {
        self.prev_lsn.load(Ordering::SeqCst)
    }

    pub fn set_prev_lsn(&self, lsn: Lsn) {
        self.prev_lsn.store(lsn, Ordering::SeqCst);
    }

    pub fn is_shared_locked(&self, rid: &Rid) -> bool {
        self.shared_lock_set.lock().contains(rid)
    }

    pub fn is_exclusive_locked(&self, rid: &Rid) -> bool {
        self.exclusive_lock_set.lock().contains(rid)
    }

    pub fn add_shared_lock(&self, rid: Rid) {
        self.shared_lock_set.lock().insert(rid);
    }

    pub fn add_exclusive_lock(&self, rid: Rid) {
        self.exclusive_lock_set.lock().insert(rid);
    }

    pub fn remove_shared_lock(&self, rid: &Rid) {
        self.shared_lock_set.lock().remove(rid);
    }

    pub fn remove_exclusive_lock(&self, rid: &Rid) {
        self.exclusive_lock_set.lock().remove(rid);
    }

    /// Snapshot of every rid this transaction holds a lock on.
    pub fn locked_rids(&self) -> Vec<Rid> {
        let mut rids: Vec<Rid> = self.shared_lock_set.lock().iter().copied().collect();
        rids.extend(self.exclusive_lock_set.lock().iter().copied());
        rids
    }

    pub fn shared_lock_count(&self) -> usize {
        self.shared_lock_set.lock().len()
    }

    pub fn exclusive_lock_count(&self) -> usize {
        self.exclusive_lock_set.lock().len()
    }

    pub fn append_table_write_record(&self, record: TableWriteRecord) {
        self.write_set.lock().push(record);
    }

    pub fn append_index_write_record(&self, record: IndexWriteRecord) {
        self.index_write_set.lock().push(record);
    }

    /// Drain the write logs for commit/abort processing.
    pub fn take_write_set(&self) -> Vec<TableWriteRecord> {
        std::mem::take(&mut self.write_set.lock())
    }

    pub fn take_index_write_set(&self) -> Vec<IndexWriteRecord> {
        std::mem::take(&mut self.index_write_set.lock())
    }
}
