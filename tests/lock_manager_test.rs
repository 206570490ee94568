use std::sync::Arc;
use std::time::Duration;

use oxbowdb::common::types::Rid;
use oxbowdb::transaction::concurrency::transaction::{
    AbortReason, IsolationLevel, TransactionError, TransactionState,
};
use oxbowdb::{LockManager, TransactionManager};

#[test]
fn test_strict_2pl_lifecycle() {
    let lock_manager = Arc::new(LockManager::new());
    let txn_manager = TransactionManager::new(None, Some(Arc::clone(&lock_manager)));

    let txn = txn_manager.begin(IsolationLevel::RepeatableRead).unwrap();
    let rid_a = Rid::new(1, 0);
    let rid_b = Rid::new(1, 1);

    lock_manager.lock_shared(&txn, rid_a).unwrap();
    lock_manager.lock_exclusive(&txn, rid_b).unwrap();
    assert_eq!(txn.shared_lock_count(), 1);
    assert_eq!(txn.exclusive_lock_count(), 1);

    // Commit releases everything.
    txn_manager.commit(&txn).unwrap();
    assert_eq!(txn.shared_lock_count(), 0);
    assert_eq!(txn.exclusive_lock_count(), 0);

    // Another transaction can take the exclusive lock immediately.
    let txn2 = txn_manager.begin(IsolationLevel::RepeatableRead).unwrap();
    lock_manager.lock_exclusive(&txn2, rid_b).unwrap();
    txn_manager.commit(&txn2).unwrap();
}

#[test]
fn test_wound_wait_aborts_younger_holder() {
    let lock_manager = Arc::new(LockManager::new());
    let txn_manager = TransactionManager::new(None, Some(Arc::clone(&lock_manager)));

    let older = txn_manager.begin(IsolationLevel::RepeatableRead).unwrap();
    let younger = txn_manager.begin(IsolationLevel::RepeatableRead).unwrap();
    assert!(older.id() < younger.id());

    let rid = Rid::new(2, 0);
    lock_manager.lock_exclusive(&younger, rid).unwrap();

    // The older transaction's request wounds the younger holder and is
    // granted without blocking.
    lock_manager.lock_shared(&older, rid).unwrap();
    assert_eq!(younger.state(), TransactionState::Aborted);

    // The wounded transaction is cleaned up through the normal abort path.
    txn_manager.abort(&younger).unwrap();
    txn_manager.commit(&older).unwrap();
}

#[test]
fn test_wounded_waiter_surfaces_deadlock() {
    let lock_manager = Arc::new(LockManager::new());
    let txn_manager = TransactionManager::new(None, Some(Arc::clone(&lock_manager)));

    let oldest = txn_manager.begin(IsolationLevel::RepeatableRead).unwrap();
    let middle = txn_manager.begin(IsolationLevel::RepeatableRead).unwrap();
    let youngest = txn_manager.begin(IsolationLevel::RepeatableRead).unwrap();

    let rid_a = Rid::new(3, 0);
    let rid_b = Rid::new(3, 1);

    // middle holds B; youngest holds A and then waits for B.
    lock_manager.lock_exclusive(&middle, rid_b).unwrap();
    lock_manager.lock_exclusive(&youngest, rid_a).unwrap();

    let lm = Arc::clone(&lock_manager);
    let youngest2 = Arc::clone(&youngest);
    let waiter = std::thread::spawn(move || lm.lock_exclusive(&youngest2, rid_b));

    std::thread::sleep(Duration::from_millis(50));

    // oldest requests A: the youngest (a granted holder there) is wounded.
    lock_manager.lock_exclusive(&oldest, rid_a).unwrap();
    assert_eq!(youngest.state(), TransactionState::Aborted);

    // When B frees up, the wounded waiter wakes and reports the deadlock.
    txn_manager.commit(&middle).unwrap();
    let result = waiter.join().unwrap();
    assert!(matches!(
        result,
        Err(TransactionError::Aborted {
            reason: AbortReason::Deadlock,
            ..
        })
    ));

    txn_manager.abort(&youngest).unwrap();
    txn_manager.commit(&oldest).unwrap();
}

#[test]
fn test_exclusive_waits_for_shared_readers() {
    let lock_manager = Arc::new(LockManager::new());
    let txn_manager = TransactionManager::new(None, Some(Arc::clone(&lock_manager)));

    let reader = txn_manager.begin(IsolationLevel::RepeatableRead).unwrap();
    let writer = txn_manager.begin(IsolationLevel::RepeatableRead).unwrap();
    let rid = Rid::new(4, 0);

    lock_manager.lock_shared(&reader, rid).unwrap();

    let lm = Arc::clone(&lock_manager);
    let writer2 = Arc::clone(&writer);
    let blocked = std::thread::spawn(move || lm.lock_exclusive(&writer2, rid));

    std::thread::sleep(Duration::from_millis(50));
    assert!(!writer.is_exclusive_locked(&rid));

    txn_manager.commit(&reader).unwrap();
    blocked.join().unwrap().unwrap();
    assert!(writer.is_exclusive_locked(&rid));
    txn_manager.commit(&writer).unwrap();
}
