use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tempfile::TempDir;

use oxbowdb::catalog::DataValue;
use oxbowdb::common::types::PageId;
use oxbowdb::storage::buffer::manager::BufferPool;
use oxbowdb::storage::table::Tuple;
use oxbowdb::transaction::concurrency::transaction::IsolationLevel;
use oxbowdb::{BufferPoolManager, DiskManager, LogManager, LogRecovery, TableHeap, TransactionManager};

fn row(text: &str) -> Tuple {
    Tuple::new(vec![DataValue::Text(text.to_string())])
}

struct LiveSystem {
    pool: Arc<dyn BufferPool>,
    log_manager: Arc<LogManager>,
    txn_manager: TransactionManager,
}

/// Stand up a logging database over `path`.
fn boot(dir: &TempDir) -> LiveSystem {
    let disk = Arc::new(DiskManager::new(dir.path().join("crash.db")).unwrap());
    let log_manager = Arc::new(LogManager::with_timeout(
        Arc::clone(&disk),
        Duration::from_millis(20),
    ));
    log_manager.run_flush_thread();

    let pool: Arc<dyn BufferPool> = Arc::new(BufferPoolManager::new_with_wal(
        16,
        disk,
        Arc::clone(&log_manager),
    ));
    let txn_manager = TransactionManager::new(Some(Arc::clone(&log_manager)), None);

    LiveSystem {
        pool,
        log_manager,
        txn_manager,
    }
}

/// Reopen the files and run restart recovery; returns a heap view over
/// the recovered table.
fn recover(dir: &TempDir, first_page_id: PageId) -> Result<(TableHeap, Arc<dyn BufferPool>)> {
    let disk = Arc::new(DiskManager::new(dir.path().join("crash.db"))?);
    let pool: Arc<dyn BufferPool> = Arc::new(BufferPoolManager::new(16, Arc::clone(&disk)));

    let mut recovery = LogRecovery::new(disk, Arc::clone(&pool));
    recovery.recover()?;

    let heap = TableHeap::open(Arc::clone(&pool), None, first_page_id);
    Ok((heap, pool))
}

#[test]
fn test_committed_insert_survives_unflushed_crash() -> Result<()> {
    let dir = TempDir::new()?;
    let first_page_id;
    let rid;

    {
        let system = boot(&dir);
        let txn = system.txn_manager.begin(IsolationLevel::RepeatableRead)?;
        let heap = TableHeap::new(
            Arc::clone(&system.pool),
            Some(Arc::clone(&system.log_manager)),
            Some(txn.as_ref()),
        )?;
        first_page_id = heap.first_page_id();

        rid = heap.insert_tuple(&row("alpha"), Some(txn.as_ref()))?;
        system.txn_manager.commit(&txn)?;

        // Crash: the log is forced at commit, the data pages never leave
        // the buffer pool.
        system.log_manager.stop_flush_thread();
    }

    let (heap, _pool) = recover(&dir, first_page_id)?;
    assert_eq!(heap.get_tuple(rid)?, row("alpha"));
    Ok(())
}

#[test]
fn test_uncommitted_update_is_undone() -> Result<()> {
    let dir = TempDir::new()?;
    let first_page_id;
    let rid_a;
    let rid_b;

    {
        let system = boot(&dir);

        // Committed groundwork: two rows.
        let setup = system.txn_manager.begin(IsolationLevel::RepeatableRead)?;
        let heap = TableHeap::new(
            Arc::clone(&system.pool),
            Some(Arc::clone(&system.log_manager)),
            Some(setup.as_ref()),
        )?;
        first_page_id = heap.first_page_id();
        rid_a = heap.insert_tuple(&row("alpha"), Some(setup.as_ref()))?;
        rid_b = heap.insert_tuple(&row("beta"), Some(setup.as_ref()))?;
        system.txn_manager.commit(&setup)?;

        // A transaction that never commits updates beta -> gamma; both its
        // log records and the mutated page reach disk before the crash.
        let loser = system.txn_manager.begin(IsolationLevel::RepeatableRead)?;
        heap.update_tuple(rid_b, &row("gamma"), Some(loser.as_ref()))?;
        system.log_manager.flush(true);
        system.pool.flush_all_pages()?;

        system.log_manager.stop_flush_thread();
    }

    let (heap, _pool) = recover(&dir, first_page_id)?;
    assert_eq!(heap.get_tuple(rid_a)?, row("alpha"));
    assert_eq!(heap.get_tuple(rid_b)?, row("beta"), "update must be rolled back");
    Ok(())
}

#[test]
fn test_uncommitted_insert_is_undone() -> Result<()> {
    let dir = TempDir::new()?;
    let first_page_id;
    let rid_kept;
    let rid_lost;

    {
        let system = boot(&dir);

        let setup = system.txn_manager.begin(IsolationLevel::RepeatableRead)?;
        let heap = TableHeap::new(
            Arc::clone(&system.pool),
            Some(Arc::clone(&system.log_manager)),
            Some(setup.as_ref()),
        )?;
        first_page_id = heap.first_page_id();
        rid_kept = heap.insert_tuple(&row("keep"), Some(setup.as_ref()))?;
        system.txn_manager.commit(&setup)?;

        let loser = system.txn_manager.begin(IsolationLevel::RepeatableRead)?;
        rid_lost = heap.insert_tuple(&row("phantom"), Some(loser.as_ref()))?;
        system.log_manager.flush(true);
        system.pool.flush_all_pages()?;

        system.log_manager.stop_flush_thread();
    }

    let (heap, _pool) = recover(&dir, first_page_id)?;
    assert_eq!(heap.get_tuple(rid_kept)?, row("keep"));
    assert!(
        heap.get_tuple(rid_lost).is_err(),
        "uncommitted insert must disappear"
    );
    Ok(())
}

#[test]
fn test_redo_is_idempotent_across_restarts() -> Result<()> {
    let dir = TempDir::new()?;
    let first_page_id;
    let rid;

    {
        let system = boot(&dir);
        let txn = system.txn_manager.begin(IsolationLevel::RepeatableRead)?;
        let heap = TableHeap::new(
            Arc::clone(&system.pool),
            Some(Arc::clone(&system.log_manager)),
            Some(txn.as_ref()),
        )?;
        first_page_id = heap.first_page_id();
        rid = heap.insert_tuple(&row("stable"), Some(txn.as_ref()))?;
        system.txn_manager.commit(&txn)?;
        system.log_manager.stop_flush_thread();
    }

    // Recover twice over the same log; page LSNs stop the second replay
    // from double-applying anything.
    {
        let (heap, pool) = recover(&dir, first_page_id)?;
        assert_eq!(heap.get_tuple(rid)?, row("stable"));
        pool.flush_all_pages()?;
    }
    let (heap, _pool) = recover(&dir, first_page_id)?;
    assert_eq!(heap.get_tuple(rid)?, row("stable"));
    assert_eq!(heap.iter().count(), 1);
    Ok(())
}
