use std::sync::Arc;

use crate::catalog::{IndexInfo, TableInfo, TableOid};
use crate::common::types::Rid;
use crate::execution::context::ExecutorContext;
use crate::execution::{ExecutionError, ExecutionResult, Executor};
use crate::index::hash::IndexKey;
use crate::storage::table::tuple::Tuple;
use crate::transaction::concurrency::transaction::{
    IndexWriteRecord, TableWriteRecord, WriteType,
};

/// Deletes the rows produced by its child: upgrades (or takes) an
/// exclusive lock, mark-deletes in the heap, removes index entries, and
/// appends rollback records. The physical delete happens at commit.
pub struct DeleteExecutor {
    ctx: Arc<ExecutorContext>,
    table_info: Arc<TableInfo>,
    indexes: Vec<Arc<IndexInfo>>,
    child: Box<dyn Executor>,
}

impl DeleteExecutor {
    pub fn new(
        ctx: Arc<ExecutorContext>,
        table_oid: TableOid,
        child: Box<dyn Executor>,
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
            child,
        })
    }
}

impl Executor for DeleteExecutor {
    fn init(&mut self) -> ExecutionResult<()> {
        self.child.init()
    }

    fn next(&mut self) -> ExecutionResult<Option<(Tuple, Rid)>> {
        let (tuple, rid) = match self.child.next()? {
            Some(row) => row,
            None => return Ok(None),
        };

        self.ctx.lock_upgrade_or_exclusive(rid)?;

        let txn = self.ctx.transaction().map(|t| t.as_ref());
        self.table_info.table.mark_delete(rid, txn)?;

        if let Some(txn) = self.ctx.transaction() {
            txn.append_table_write_record(TableWriteRecord {
                rid,
                write_type: WriteType::Delete,
                old_tuple: Tuple::empty(),
                table: Arc::clone(&self.table_info.table),
            });
        }

        for index_info in &self.indexes {
            let key = IndexKey::from_tuple(&tuple.key_from_tuple(&index_info.key_attrs));
            index_info.index.remove(&key, &rid)?;

            if let Some(txn) = self.ctx.transaction() {
                txn.append_index_write_record(IndexWriteRecord {
                    rid,
                    write_type: WriteType::Delete,
                    tuple: Tuple::empty(),
                    old_tuple: tuple.clone(),
                    key_attrs: index_info.key_attrs.clone(),
                    index: Arc::clone(&index_info.index),
                });
            }
        }

        Ok(Some((tuple, rid)))
    }
}
