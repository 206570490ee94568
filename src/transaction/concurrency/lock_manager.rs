use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use parking_lot::{Condvar, Mutex};

use crate::common::types::{Rid, TxnId};
use crate::transaction::concurrency::transaction::{
    AbortReason, IsolationLevel, Transaction, TransactionError, TransactionState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockMode {
    Shared,
    Exclusive,
}

/// Summary of what the queue currently grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueueState {
    Nothing,
    Read,
    Write,
    Upgrade,
}

struct LockRequest {
    txn_id: TxnId,
    mode: LockMode,
}

/// Granted requests for one rid, plus the condvar its waiters sleep on.
struct LockRequestQueue {
    queue: Vec<LockRequest>,
    state: QueueState,
    cv: Arc<Condvar>,
}

impl Default for LockRequestQueue {
    fn default() -> Self {
        Self {
            queue: Vec::new(),
            state: QueueState::Nothing,
            cv: Arc::new(Condvar::new()),
        }
    }
}

struct LockTable {
    queues: HashMap<Rid, LockRequestQueue>,
    txns: HashMap<TxnId, Arc<Transaction>>,
}

/// Record-granularity lock manager: strict two-phase locking with
/// wound-wait deadlock prevention.
///
/// One latch guards the whole table of queues; waiters sleep on their
/// queue's condvar, which releases the latch. Wound-wait keeps the
/// wait-for relation acyclic: when an older transaction must wait, every
/// younger transaction in the queue is aborted on the spot. A wounded
/// waiter observes its own ABORTED state on wakeup and surfaces
/// `AbortReason::Deadlock`.
pub struct LockManager {
    latch: Mutex<LockTable>,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            latch: Mutex::new(LockTable {
                queues: HashMap::new(),
                txns: HashMap::new(),
            }),
        }
    }

    /// Acquire a shared lock on `rid`.
    pub fn lock_shared(&self, txn: &Arc<Transaction>, rid: Rid) -> Result<(), TransactionError> {
        if txn.isolation_level() == IsolationLevel::ReadUncommitted {
            txn.set_state(TransactionState::Aborted);
            return Err(TransactionError::Aborted {
                txn_id: txn.id(),
                reason: AbortReason::LockSharedOnReadUncommitted,
            });
        }
        Self::check_shrinking(txn)?;

        let mut table = self.latch.lock();
        table.txns.insert(txn.id(), Arc::clone(txn));
        table.queues.entry(rid).or_default();

        if matches!(
            table.queues[&rid].state,
            QueueState::Write | QueueState::Upgrade
        ) {
            Self::wound_wait(&mut table, txn.id(), &rid);
            let cv = table.queues[&rid].cv.clone();
            loop {
                if txn.state() == TransactionState::Aborted {
                    break;
                }
                let state = table.queues[&rid].state;
                if state != QueueState::Write && state != QueueState::Upgrade {
                    break;
                }
                cv.wait(&mut table);
            }
        }

        Self::check_aborted(txn)?;

        txn.add_shared_lock(rid);
        let queue = table.queues.get_mut(&rid).expect("queue exists");
        queue.queue.push(LockRequest {
            txn_id: txn.id(),
            mode: LockMode::Shared,
        });
        queue.state = QueueState::Read;
        Ok(())
    }

    /// Acquire an exclusive lock on `rid`.
    pub fn lock_exclusive(&self, txn: &Arc<Transaction>, rid: Rid) -> Result<(), TransactionError> {
        Self::check_shrinking(txn)?;

        let mut table = self.latch.lock();
        table.txns.insert(txn.id(), Arc::clone(txn));
        table.queues.entry(rid).or_default();

        if table.queues[&rid].state != QueueState::Nothing {
            Self::wound_wait(&mut table, txn.id(), &rid);
            let cv = table.queues[&rid].cv.clone();
            loop {
                if txn.state() == TransactionState::Aborted {
                    break;
                }
                if table.queues[&rid].state == QueueState::Nothing {
                    break;
                }
                cv.wait(&mut table);
            }
        }

        Self::check_aborted(txn)?;

        txn.add_exclusive_lock(rid);
        let queue = table.queues.get_mut(&rid).expect("queue exists");
        queue.queue.push(LockRequest {
            txn_id: txn.id(),
            mode: LockMode::Exclusive,
        });
        queue.state = QueueState::Write;
        Ok(())
    }

    /// Upgrade a held shared lock to exclusive.
    pub fn lock_upgrade(&self, txn: &Arc<Transaction>, rid: Rid) -> Result<(), TransactionError> {
        Self::check_shrinking(txn)?;

        let mut table = self.latch.lock();
        table.txns.insert(txn.id(), Arc::clone(txn));

        {
            let queue = match table.queues.get_mut(&rid) {
                Some(queue) => queue,
                None => return Err(TransactionError::UpgradeWithoutSharedLock(txn.id())),
            };
            // Step out of the queue before waiting for the remaining holders.
            if let Some(pos) = queue.queue.iter().position(|r| r.txn_id == txn.id()) {
                queue.queue.remove(pos);
            }
            if queue.queue.is_empty() {
                queue.state = QueueState::Nothing;
            }
        }

        if table.queues[&rid].state != QueueState::Nothing {
            Self::wound_wait(&mut table, txn.id(), &rid);
            let cv = table.queues[&rid].cv.clone();
            loop {
                if txn.state() == TransactionState::Aborted {
                    break;
                }
                if table.queues[&rid].state == QueueState::Nothing {
                    break;
                }
                cv.wait(&mut table);
            }
        }

        if table.queues[&rid].state == QueueState::Upgrade {
            txn.set_state(TransactionState::Aborted);
            return Err(TransactionError::Aborted {
                txn_id: txn.id(),
                reason: AbortReason::UpgradeConflict,
            });
        }

        Self::check_aborted(txn)?;

        let queue = table.queues.get_mut(&rid).expect("queue exists");
        queue.state = QueueState::Upgrade;
        txn.remove_shared_lock(&rid);
        txn.add_exclusive_lock(rid);
        // The original discards everything queued here before installing
        // the exclusive entry; kept as-is.
        queue.queue.clear();
        queue.queue.push(LockRequest {
            txn_id: txn.id(),
            mode: LockMode::Exclusive,
        });
        queue.state = QueueState::Write;
        Ok(())
    }

    /// Release one lock. Returns false when the transaction holds no entry
    /// for `rid`. Under strict 2PL the first release moves the transaction
    /// to SHRINKING, except a READ COMMITTED shared-lock release.
    pub fn unlock(&self, txn: &Transaction, rid: &Rid) -> bool {
        let mut table = self.latch.lock();

        txn.remove_shared_lock(rid);
        txn.remove_exclusive_lock(rid);

        let queue = match table.queues.get_mut(rid) {
            Some(queue) => queue,
            None => return false,
        };
        let pos = match queue.queue.iter().position(|r| r.txn_id == txn.id()) {
            Some(pos) => pos,
            None => return false,
        };

        let mode = queue.queue[pos].mode;
        if txn.state() == TransactionState::Growing
            && !(txn.isolation_level() == IsolationLevel::ReadCommitted && mode == LockMode::Shared)
        {
            txn.set_state(TransactionState::Shrinking);
        }

        queue.queue.remove(pos);
        if queue.queue.is_empty() {
            queue.state = QueueState::Nothing;
        }
        queue.cv.notify_all();
        true
    }

    /// Drop every lock the transaction still holds. Called at end of
    /// transaction (commit or abort); it does not touch the transaction's
    /// state machine.
    pub fn release_all_locks(&self, txn: &Transaction) {
        let mut table = self.latch.lock();
        for rid in txn.locked_rids() {
            if let Some(queue) = table.queues.get_mut(&rid) {
                queue.queue.retain(|r| r.txn_id != txn.id());
                queue.state = match queue.queue.first() {
                    None => QueueState::Nothing,
                    Some(head) if head.mode == LockMode::Exclusive => QueueState::Write,
                    Some(_) => QueueState::Read,
                };
                queue.cv.notify_all();
            }
            txn.remove_shared_lock(&rid);
            txn.remove_exclusive_lock(&rid);
        }
        table.txns.remove(&txn.id());
    }

    /// Wound-wait: before `waiter` blocks, abort every younger transaction
    /// in the queue and drop their entries, so only older->younger wait
    /// edges remain.
    fn wound_wait(table: &mut LockTable, waiter: TxnId, rid: &Rid) {
        let mut wounded = Vec::new();
        let cv;
        {
            let queue = match table.queues.get_mut(rid) {
                Some(queue) => queue,
                None => return,
            };
            queue.queue.retain(|req| {
                if req.txn_id > waiter {
                    wounded.push(req.txn_id);
                    false
                } else {
                    true
                }
            });
            queue.state = match queue.queue.first() {
                None => QueueState::Nothing,
                Some(head) if head.mode == LockMode::Exclusive => QueueState::Write,
                Some(_) => QueueState::Read,
            };
            cv = queue.cv.clone();
        }

        for txn_id in wounded {
            if let Some(victim) = table.txns.get(&txn_id) {
                debug!("txn {} wounds younger txn {}", waiter, txn_id);
                victim.set_state(TransactionState::Aborted);
            }
        }
        cv.notify_all();
    }

    fn check_shrinking(txn: &Transaction) -> Result<(), TransactionError> {
        if txn.state() == TransactionState::Shrinking {
            txn.set_state(TransactionState::Aborted);
            return Err(TransactionError::Aborted {
                txn_id: txn.id(),
                reason: AbortReason::LockOnShrinking,
            });
        }
        Ok(())
    }

    fn check_aborted(txn: &Transaction) -> Result<(), TransactionError> {
        if txn.state() == TransactionState::Aborted {
            return Err(TransactionError::Aborted {
                txn_id: txn.id(),
                reason: AbortReason::Deadlock,
            });
        }
        Ok(())
    }
}
