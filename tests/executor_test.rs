use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;

mod common;
use common::create_test_pool_dyn;

use oxbowdb::catalog::{Catalog, Column, DataType, DataValue, Schema};
use oxbowdb::execution::executors::{
    AggregationExecutor, AggregationType, DeleteExecutor, DistinctExecutor, HashJoinExecutor,
    InsertExecutor, NestedLoopJoinExecutor, SeqScanExecutor, UpdateExecutor, UpdateInfo,
};
use oxbowdb::execution::{execute_to_vec, ComparisonOp, Expression, ExecutorContext};
use oxbowdb::index::hash::IndexKey;
use oxbowdb::storage::buffer::manager::BufferPool;
use oxbowdb::storage::table::Tuple;
use oxbowdb::transaction::concurrency::transaction::{IsolationLevel, Transaction};
use oxbowdb::{LockManager, TransactionManager};
use tempfile::TempDir;

struct TestDb {
    pool: Arc<dyn BufferPool>,
    catalog: Arc<Catalog>,
    lock_manager: Arc<LockManager>,
    txn_manager: TransactionManager,
    _dir: TempDir,
}

fn setup() -> TestDb {
    let (pool, _disk, dir) = create_test_pool_dyn(64);
    let catalog = Arc::new(Catalog::new(Arc::clone(&pool), None));
    let lock_manager = Arc::new(LockManager::new());
    let txn_manager = TransactionManager::new(None, Some(Arc::clone(&lock_manager)));
    TestDb {
        pool,
        catalog,
        lock_manager,
        txn_manager,
        _dir: dir,
    }
}

impl TestDb {
    fn context(&self, txn: Option<Arc<Transaction>>) -> Arc<ExecutorContext> {
        Arc::new(ExecutorContext::new(
            Arc::clone(&self.pool),
            Arc::clone(&self.catalog),
            txn,
            Some(Arc::clone(&self.lock_manager)),
            None,
        ))
    }
}

fn students_schema() -> Schema {
    Schema::new(vec![
        Column::new("id", DataType::Integer),
        Column::new("name", DataType::Text),
        Column::new("score", DataType::Integer),
    ])
}

fn student(id: i64, name: &str, score: i64) -> Vec<DataValue> {
    vec![
        DataValue::Integer(id),
        DataValue::Text(name.to_string()),
        DataValue::Integer(score),
    ]
}

/// Create the students table, insert the standard rows, return its oid.
fn seed_students(db: &TestDb) -> u32 {
    let info = db
        .catalog
        .create_table("students", students_schema(), None)
        .unwrap();
    db.catalog
        .create_index("students_id", "students", vec![0])
        .unwrap();

    let ctx = db.context(None);
    let rows = vec![
        student(1, "ada", 91),
        student(2, "grace", 84),
        student(3, "edsger", 75),
        student(4, "barbara", 91),
    ];
    let mut insert = InsertExecutor::new_raw(Arc::clone(&ctx), info.oid, rows).unwrap();
    assert_eq!(execute_to_vec(&mut insert).unwrap().len(), 4);
    info.oid
}

#[test]
fn test_insert_and_seq_scan() -> Result<()> {
    let db = setup();
    let oid = seed_students(&db);

    let ctx = db.context(None);
    let mut scan = SeqScanExecutor::new(ctx, oid, None, students_schema())?;
    let rows = execute_to_vec(&mut scan)?;
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0].0.value(1), &DataValue::Text("ada".into()));
    Ok(())
}

#[test]
fn test_seq_scan_predicate_and_projection() -> Result<()> {
    let db = setup();
    let oid = seed_students(&db);

    let predicate = Expression::comparison(
        ComparisonOp::GtEq,
        Expression::column(2),
        Expression::Constant(DataValue::Integer(85)),
    );
    let names_only = Schema::new(vec![Column::new("name", DataType::Text)]);

    let ctx = db.context(None);
    let mut scan = SeqScanExecutor::new(ctx, oid, Some(predicate), names_only)?;
    let rows = execute_to_vec(&mut scan)?;

    let names: Vec<&DataValue> = rows.iter().map(|(t, _)| t.value(0)).collect();
    assert_eq!(
        names,
        vec![
            &DataValue::Text("ada".into()),
            &DataValue::Text("barbara".into())
        ]
    );
    // Projected rows carry exactly one column.
    assert_eq!(rows[0].0.values().len(), 1);
    Ok(())
}

#[test]
fn test_insert_maintains_index() -> Result<()> {
    let db = setup();
    let oid = seed_students(&db);
    let info = db.catalog.get_table(oid).unwrap();
    let index = &db.catalog.get_table_indexes("students")[0];

    let key = IndexKey::from_tuple(&Tuple::new(vec![DataValue::Integer(3)]));
    let rids = index.index.get_value(&key)?;
    assert_eq!(rids.len(), 1);
    assert_eq!(
        info.table.get_tuple(rids[0])?.value(1),
        &DataValue::Text("edsger".into())
    );
    Ok(())
}

#[test]
fn test_update_set_and_add() -> Result<()> {
    let db = setup();
    let oid = seed_students(&db);

    let txn = db.txn_manager.begin(IsolationLevel::RepeatableRead)?;
    let ctx = db.context(Some(Arc::clone(&txn)));

    // Everyone gains 5 points.
    let child = SeqScanExecutor::new(Arc::clone(&ctx), oid, None, students_schema())?;
    let mut attrs = HashMap::new();
    attrs.insert(2, UpdateInfo::Add(5));
    let mut update = UpdateExecutor::new(Arc::clone(&ctx), oid, Box::new(child), attrs)?;
    assert_eq!(execute_to_vec(&mut update)?.len(), 4);
    db.txn_manager.commit(&txn)?;

    let scan_ctx = db.context(None);
    let mut scan = SeqScanExecutor::new(scan_ctx, oid, None, students_schema())?;
    let rows = execute_to_vec(&mut scan)?;
    let scores: Vec<&DataValue> = rows.iter().map(|(t, _)| t.value(2)).collect();
    assert_eq!(
        scores,
        vec![
            &DataValue::Integer(96),
            &DataValue::Integer(89),
            &DataValue::Integer(80),
            &DataValue::Integer(96)
        ]
    );
    Ok(())
}

#[test]
fn test_delete_removes_rows_and_index_entries() -> Result<()> {
    let db = setup();
    let oid = seed_students(&db);
    let index = Arc::clone(&db.catalog.get_table_indexes("students")[0]);

    let txn = db.txn_manager.begin(IsolationLevel::RepeatableRead)?;
    let ctx = db.context(Some(Arc::clone(&txn)));

    let predicate = Expression::comparison(
        ComparisonOp::Lt,
        Expression::column(2),
        Expression::Constant(DataValue::Integer(90)),
    );
    let child = SeqScanExecutor::new(Arc::clone(&ctx), oid, Some(predicate), students_schema())?;
    let mut delete = DeleteExecutor::new(Arc::clone(&ctx), oid, Box::new(child))?;
    assert_eq!(execute_to_vec(&mut delete)?.len(), 2);
    db.txn_manager.commit(&txn)?;

    let scan_ctx = db.context(None);
    let mut scan = SeqScanExecutor::new(scan_ctx, oid, None, students_schema())?;
    assert_eq!(execute_to_vec(&mut scan)?.len(), 2);

    let key = IndexKey::from_tuple(&Tuple::new(vec![DataValue::Integer(2)]));
    assert!(index.index.get_value(&key)?.is_empty());
    Ok(())
}

#[test]
fn test_distinct() -> Result<()> {
    let db = setup();
    let oid = seed_students(&db);

    // Project onto scores: 91 appears twice.
    let scores = Schema::new(vec![Column::new("score", DataType::Integer)]);
    let ctx = db.context(None);
    let scan = SeqScanExecutor::new(Arc::clone(&ctx), oid, None, scores)?;
    let mut distinct = DistinctExecutor::new(Box::new(scan));
    let rows = execute_to_vec(&mut distinct)?;
    assert_eq!(rows.len(), 3);
    Ok(())
}

#[test]
fn test_nested_loop_join() -> Result<()> {
    let db = setup();
    let oid = seed_students(&db);

    let grades_schema = Schema::new(vec![
        Column::new("student_id", DataType::Integer),
        Column::new("grade", DataType::Text),
    ]);
    let grades = db.catalog.create_table("grades", grades_schema.clone(), None).unwrap();
    let ctx = db.context(None);
    let rows = vec![
        vec![DataValue::Integer(1), DataValue::Text("A".into())],
        vec![DataValue::Integer(3), DataValue::Text("C".into())],
    ];
    let mut insert = InsertExecutor::new_raw(Arc::clone(&ctx), grades.oid, rows)?;
    execute_to_vec(&mut insert)?;

    let left = SeqScanExecutor::new(Arc::clone(&ctx), oid, None, students_schema())?;
    let right = SeqScanExecutor::new(Arc::clone(&ctx), grades.oid, None, grades_schema)?;
    let on = Expression::comparison(
        ComparisonOp::Eq,
        Expression::ColumnValue { tuple_idx: 0, col_idx: 0 },
        Expression::ColumnValue { tuple_idx: 1, col_idx: 0 },
    );
    let mut join = NestedLoopJoinExecutor::new(Box::new(left), Box::new(right), Some(on));
    let rows = execute_to_vec(&mut join)?;

    assert_eq!(rows.len(), 2);
    // students columns then grades columns.
    assert_eq!(rows[0].0.values().len(), 5);
    assert_eq!(rows[0].0.value(1), &DataValue::Text("ada".into()));
    assert_eq!(rows[0].0.value(4), &DataValue::Text("A".into()));
    Ok(())
}

#[test]
fn test_hash_join() -> Result<()> {
    let db = setup();
    let oid = seed_students(&db);

    let grades_schema = Schema::new(vec![
        Column::new("student_id", DataType::Integer),
        Column::new("grade", DataType::Text),
    ]);
    let grades = db.catalog.create_table("grades", grades_schema.clone(), None).unwrap();
    let ctx = db.context(None);
    let rows = vec![
        vec![DataValue::Integer(1), DataValue::Text("A".into())],
        vec![DataValue::Integer(1), DataValue::Text("A-".into())],
        vec![DataValue::Integer(4), DataValue::Text("B".into())],
        vec![DataValue::Integer(9), DataValue::Text("?".into())],
    ];
    let mut insert = InsertExecutor::new_raw(Arc::clone(&ctx), grades.oid, rows)?;
    execute_to_vec(&mut insert)?;

    let left = SeqScanExecutor::new(Arc::clone(&ctx), oid, None, students_schema())?;
    let right = SeqScanExecutor::new(Arc::clone(&ctx), grades.oid, None, grades_schema)?;

    // Output: student name, student score, grade.
    let mut join = HashJoinExecutor::new(
        Box::new(left),
        Box::new(right),
        Expression::column(0),
        Expression::column(0),
        vec![(0, 1), (0, 2), (1, 1)],
    );
    let mut rows = execute_to_vec(&mut join)?;
    rows.sort_by(|a, b| format!("{:?}", a.0).cmp(&format!("{:?}", b.0)));

    assert_eq!(rows.len(), 3, "unmatched probe rows yield nothing");
    for (tuple, _) in &rows {
        assert_eq!(tuple.values().len(), 3);
    }
    Ok(())
}

#[test]
fn test_aggregation_with_having() -> Result<()> {
    let db = setup();
    let oid = seed_students(&db);

    // Group by score; count and sum ids per group; keep groups of 2+.
    let ctx = db.context(None);
    let scan = SeqScanExecutor::new(Arc::clone(&ctx), oid, None, students_schema())?;
    let mut agg = AggregationExecutor::new(
        Box::new(scan),
        vec![Expression::column(2)],
        vec![Expression::column(0), Expression::column(0)],
        vec![AggregationType::Count, AggregationType::Sum],
        vec![
            Expression::GroupByRef(0),
            Expression::AggregateRef(0),
            Expression::AggregateRef(1),
        ],
        Some(Expression::comparison(
            ComparisonOp::GtEq,
            Expression::AggregateRef(0),
            Expression::Constant(DataValue::Integer(2)),
        )),
    );
    let rows = execute_to_vec(&mut agg)?;

    // Only score 91 has two students (ids 1 and 4).
    assert_eq!(rows.len(), 1);
    let tuple = &rows[0].0;
    assert_eq!(tuple.value(0), &DataValue::Integer(91));
    assert_eq!(tuple.value(1), &DataValue::Integer(2));
    assert_eq!(tuple.value(2), &DataValue::Integer(5));
    Ok(())
}

#[test]
fn test_aggregation_min_max() -> Result<()> {
    let db = setup();
    let oid = seed_students(&db);

    let ctx = db.context(None);
    let scan = SeqScanExecutor::new(Arc::clone(&ctx), oid, None, students_schema())?;
    let mut agg = AggregationExecutor::new(
        Box::new(scan),
        vec![],
        vec![Expression::column(2), Expression::column(2)],
        vec![AggregationType::Min, AggregationType::Max],
        vec![Expression::AggregateRef(0), Expression::AggregateRef(1)],
        None,
    );
    let rows = execute_to_vec(&mut agg)?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].0.value(0), &DataValue::Integer(75));
    assert_eq!(rows[0].0.value(1), &DataValue::Integer(91));
    Ok(())
}

#[test]
fn test_read_committed_releases_scan_locks() -> Result<()> {
    let db = setup();
    let oid = seed_students(&db);

    let reader = db.txn_manager.begin(IsolationLevel::ReadCommitted)?;
    let ctx = db.context(Some(Arc::clone(&reader)));
    let mut scan = SeqScanExecutor::new(ctx, oid, None, students_schema())?;
    let rows = execute_to_vec(&mut scan)?;
    assert_eq!(rows.len(), 4);

    // Shared locks were released row by row.
    assert_eq!(reader.shared_lock_count(), 0);

    // A concurrent writer proceeds without waiting for the reader's end.
    let writer = db.txn_manager.begin(IsolationLevel::RepeatableRead)?;
    db.lock_manager.lock_exclusive(&writer, rows[0].1)?;

    db.txn_manager.commit(&writer)?;
    db.txn_manager.commit(&reader)?;
    Ok(())
}

#[test]
fn test_repeatable_read_holds_scan_locks() -> Result<()> {
    let db = setup();
    let oid = seed_students(&db);

    let reader = db.txn_manager.begin(IsolationLevel::RepeatableRead)?;
    let ctx = db.context(Some(Arc::clone(&reader)));
    let mut scan = SeqScanExecutor::new(ctx, oid, None, students_schema())?;
    let rows = execute_to_vec(&mut scan)?;

    assert_eq!(reader.shared_lock_count(), rows.len());
    db.txn_manager.commit(&reader)?;
    assert_eq!(reader.shared_lock_count(), 0);
    Ok(())
}

#[test]
fn test_abort_rolls_back_insert_and_index() -> Result<()> {
    let db = setup();
    let oid = seed_students(&db);
    let index = Arc::clone(&db.catalog.get_table_indexes("students")[0]);

    let txn = db.txn_manager.begin(IsolationLevel::RepeatableRead)?;
    let ctx = db.context(Some(Arc::clone(&txn)));
    let mut insert = InsertExecutor::new_raw(
        Arc::clone(&ctx),
        oid,
        vec![student(99, "phantom", 1)],
    )?;
    execute_to_vec(&mut insert)?;
    db.txn_manager.abort(&txn)?;

    let scan_ctx = db.context(None);
    let mut scan = SeqScanExecutor::new(scan_ctx, oid, None, students_schema())?;
    assert_eq!(execute_to_vec(&mut scan)?.len(), 4);

    let key = IndexKey::from_tuple(&Tuple::new(vec![DataValue::Integer(99)]));
    assert!(index.index.get_value(&key)?.is_empty());
    Ok(())
}

#[test]
fn test_abort_rolls_back_update() -> Result<()> {
    let db = setup();
    let oid = seed_students(&db);

    let txn = db.txn_manager.begin(IsolationLevel::RepeatableRead)?;
    let ctx = db.context(Some(Arc::clone(&txn)));
    let child = SeqScanExecutor::new(Arc::clone(&ctx), oid, None, students_schema())?;
    let mut attrs = HashMap::new();
    attrs.insert(2, UpdateInfo::Set(DataValue::Integer(0)));
    let mut update = UpdateExecutor::new(Arc::clone(&ctx), oid, Box::new(child), attrs)?;
    execute_to_vec(&mut update)?;
    db.txn_manager.abort(&txn)?;

    let scan_ctx = db.context(None);
    let mut scan = SeqScanExecutor::new(scan_ctx, oid, None, students_schema())?;
    let rows = execute_to_vec(&mut scan)?;
    let scores: Vec<&DataValue> = rows.iter().map(|(t, _)| t.value(2)).collect();
    assert_eq!(
        scores,
        vec![
            &DataValue::Integer(91),
            &DataValue::Integer(84),
            &DataValue::Integer(75),
            &DataValue::Integer(91)
        ]
    );
    Ok(())
}

#[test]
fn test_insert_from_child_copies_rows() -> Result<()> {
    let db = setup();
    let oid = seed_students(&db);

    let archive = db
        .catalog
        .create_table("archive", students_schema(), None)
        .unwrap();

    let ctx = db.context(None);
    let scan = SeqScanExecutor::new(Arc::clone(&ctx), oid, None, students_schema())?;
    let mut insert = InsertExecutor::new_from_child(Arc::clone(&ctx), archive.oid, Box::new(scan))?;
    assert_eq!(execute_to_vec(&mut insert)?.len(), 4);

    let mut check = SeqScanExecutor::new(Arc::clone(&ctx), archive.oid, None, students_schema())?;
    assert_eq!(execute_to_vec(&mut check)?.len(), 4);
    Ok(())
}
