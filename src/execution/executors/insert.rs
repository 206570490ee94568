use std::sync::Arc;

use crate::catalog::{DataValue, IndexInfo, TableInfo, TableOid};
use crate::common::types::Rid;
use crate::execution::context::ExecutorContext;
use crate::execution::{ExecutionError, ExecutionResult, Executor};
use crate::index::hash::IndexKey;
use crate::storage::table::tuple::Tuple;
use crate::transaction::concurrency::transaction::{
    IndexWriteRecord, TableWriteRecord, WriteType,
};

enum InsertSource {
    /// Row literals carried by the plan.
    RawValues {
        rows: Vec<Vec<DataValue>>,
        current: usize,
    },
    /// Rows pulled from a child executor.
    Child(Box<dyn Executor>),
}

/// Inserts rows into a table, takes an exclusive lock on each new rid,
/// maintains every index of the table, and appends rollback records to
/// the owning transaction.
pub struct InsertExecutor {
    ctx: Arc<ExecutorContext>,
    table_info: Arc<TableInfo>,
    indexes: Vec<Arc<IndexInfo>>,
    source: InsertSource,
}

impl InsertExecutor {
    pub fn new_raw(
        ctx: Arc<ExecutorContext>,
        table_oid: TableOid,
        rows: Vec<Vec<DataValue>>,
    ) -> ExecutionResult<Self> {
        Self::build(ctx, table_oid, InsertSource::RawValues { rows, current: 0 })
    }

    pub fn new_from_child(
        ctx: Arc<ExecutorContext>,
        table_oid: TableOid,
        child: Box<dyn Executor>,
    ) -> ExecutionResult<Self> {
        Self::build(ctx, table_oid, InsertSource::Child(child))
    }

    fn build(
        ctx: Arc<ExecutorContext>,
        table_oid: TableOid,
        source: InsertSource,
    ) -> ExecutionResult<Self> {
        let table_info = ctx
            .catalog()
            .get_table(table_oid)
            .ok_or_else(|| ExecutionError::TableNotFound(format!("oid {table_oid}")))?;
        let indexes = ctx.catalog().get_table_indexes(&table_info.name);

        Ok(Self {
            ctx,
            table_info,
            indexes,
            source,
        })
    }

    fn pull_row(&mut self) -> ExecutionResult<Option<Tuple>> {
        match &mut self.source {
            InsertSource::RawValues { rows, current } => {
                if *current == rows.len() {
                    return Ok(None);
                }
                let tuple = Tuple::new(rows[*current].clone());
                *current += 1;
                Ok(Some(tuple))
            }
            InsertSource::Child(child) => Ok(child.next()?.map(|(tuple, _)| tuple)),
        }
    }
}

impl Executor for InsertExecutor {
    fn init(&mut self) -> ExecutionResult<()> {
        match &mut self.source {
            InsertSource::RawValues { current, .. } => *current = 0,
            InsertSource::Child(child) => child.init()?,
        }
        Ok(())
    }

    fn next(&mut self) -> ExecutionResult<Option<(Tuple, Rid)>> {
        let tuple = match self.pull_row()? {
            Some(tuple) => tuple,
            None => return Ok(None),
        };

        let txn = self.ctx.transaction().map(|t| t.as_ref());
        let rid = self.table_info.table.insert_tuple(&tuple, txn)?;
        self.ctx.lock_exclusive(rid)?;

        if let Some(txn) = self.ctx.transaction() {
            txn.append_table_write_record(TableWriteRecord {
                rid,
                write_type: WriteType::Insert,
                old_tuple: Tuple::empty(),
                table: Arc::clone(&self.table_info.table),
            });
        }

        for index_info in &self.indexes {
            let key = IndexKey::from_tuple(&tuple.key_from_tuple(&index_info.key_attrs));
            index_info.index.insert(key, rid)?;

            if let Some(txn) = self.ctx.transaction() {
                txn.append_index_write_record(IndexWriteRecord {
                    rid,
                    write_type: WriteType::Insert,
                    tuple: tuple.clone(),
                    old_tuple: Tuple::empty(),
                    key_attrs: index_info.key_attrs.clone(),
                    index: Arc::clone(&index_info.index),
                });
            }
        }

        Ok(Some((tuple, rid)))
    }
}
