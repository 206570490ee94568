use std::sync::Arc;

use crate::catalog::Catalog;
use crate::common::types::Rid;
use crate::execution::ExecutionResult;
use crate::storage::buffer::manager::BufferPool;
use crate::transaction::concurrency::lock_manager::LockManager;
use crate::transaction::concurrency::transaction::Transaction;
use crate::transaction::wal::log_manager::LogManager;

/// Everything an executor needs from its surroundings: the catalog and
/// buffer pool it reads through, plus the (optional) transactional
/// machinery. Absent transaction or lock manager means the helpers here
/// are no-ops, which is how non-transactional and recovery-time execution
/// run.
pub struct ExecutorContext {
    buffer_pool: Arc<dyn BufferPool>,
    catalog: Arc<Catalog>,
    txn: Option<Arc<Transaction>>,
    lock_manager: Option<Arc<LockManager>>,
    log_manager: Option<Arc<LogManager>>,
}

impl ExecutorContext {
    pub fn new(
        buffer_pool: Arc<dyn BufferPool>,
        catalog: Arc<Catalog>,
        txn: Option<Arc<Transaction>>,
        lock_manager: Option<Arc<LockManager>>,
        log_manager: Option<Arc<LogManager>>,
    ) -> Self {
        Self {
            buffer_pool,
            catalog,
            txn,
            lock_manager,
            log_manager,
        }
    }

    pub fn buffer_pool(&self) -> &Arc<dyn BufferPool> {
        &self.buffer_pool
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn transaction(&self) -> Option<&Arc<Transaction>> {
        self.txn.as_ref()
    }

    pub fn lock_manager(&self) -> Option<&Arc<LockManager>> {
        self.lock_manager.as_ref()
    }

    pub fn log_manager(&self) -> Option<&Arc<LogManager>> {
        self.log_manager.as_ref()
    }

    /// Take a shared lock when running transactionally.
    pub fn lock_shared(&self, rid: Rid) -> ExecutionResult<()> {
        if let (Some(lock_manager), Some(txn)) = (&self.lock_manager, &self.txn) {
            lock_manager.lock_shared(txn, rid)?;
        }
        Ok(())
    }

    /// Take an exclusive lock when running transactionally.
    pub fn lock_exclusive(&self, rid: Rid) -> ExecutionResult<()> {
        if let (Some(lock_manager), Some(txn)) = (&self.lock_manager, &self.txn) {
            lock_manager.lock_exclusive(txn, rid)?;
        }
        Ok(())
    }

    /// Upgrade an already-held shared lock, or take an exclusive lock
    /// outright when no shared lock is held.
    pub fn lock_upgrade_or_exclusive(&self, rid: Rid) -> ExecutionResult<()> {
        if let (Some(lock_manager), Some(txn)) = (&self.lock_manager, &self.txn) {
            if txn.is_shared_locked(&rid) {
                lock_manager.lock_upgrade(txn, rid)?;
            } else if !txn.is_exclusive_locked(&rid) {
                lock_manager.lock_exclusive(txn, rid)?;
            }
        }
        Ok(())
    }

    pub fn unlock(&self, rid: &Rid) {
        if let (Some(lock_manager), Some(txn)) = (&self.lock_manager, &self.txn) {
            lock_manager.unlock(txn, rid);
        }
    }
}
