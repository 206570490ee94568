use std::collections::HashMap;
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

/// Per-column update action.
#[derive(Debug, Clone)]
pub enum UpdateInfo {
    /// Add a constant to the current (integer) value.
    Add(i64),
    /// Overwrite with a new value.
    Set(DataValue),
}

/// Updates the rows produced by its child according to per-column update
/// actions, keeping every index in sync and appending rollback records.
pub struct UpdateExecutor {
    ctx: Arc<ExecutorContext>,
    table_info: Arc<TableInfo>,
    indexes: Vec<Arc<IndexInfo>>,
    child: Box<dyn Executor>,
    update_attrs: HashMap<usize, UpdateInfo>,
}

impl UpdateExecutor {
    pub fn new(
        ctx: Arc<ExecutorContext>,
        table_oid: TableOid,
        child: Box<dyn Executor>,
        update_attrs: HashMap<usize, UpdateInfo>,
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
            update_attrs,
        })
    }

    fn generate_updated_tuple(&self, src: &Tuple) -> Tuple {
        let values = src
            .values()
            .iter()
            .enumerate()
            .map(|(idx, value)| match self.update_attrs.get(&idx) {
                None => value.clone(),
                Some(UpdateInfo::Add(delta)) => value.add(&DataValue::Integer(*delta)),
                Some(UpdateInfo::Set(new_value)) => new_value.clone(),
            })
            .collect();
        Tuple::new(values)
    }
}

impl Executor for UpdateExecutor {
    fn init(&mut self) -> ExecutionResult<()> {
        self.child.init()
    }

    fn next(&mut self) -> ExecutionResult<Option<(Tuple, Rid)>> {
        let (tuple, rid) = match self.child.next()? {
            Some(row) => row,
            None => return Ok(None),
        };

        self.ctx.lock_upgrade_or_exclusive(rid)?;

        let updated = self.generate_updated_tuple(&tuple);
        let txn = self.ctx.transaction().map(|t| t.as_ref());
        let old_tuple = self.table_info.table.update_tuple(rid, &updated, txn)?;

        if let Some(txn) = self.ctx.transaction() {
            txn.append_table_write_record(TableWriteRecord {
                rid,
                write_type: WriteType::Update,
                old_tuple: old_tuple.clone(),
                table: Arc::clone(&self.table_info.table),
            });
        }

        for index_info in &self.indexes {
            let old_key = IndexKey::from_tuple(&old_tuple.key_from_tuple(&index_info.key_attrs));
            let new_key = IndexKey::from_tuple(&updated.key_from_tuple(&index_info.key_attrs));
            index_info.index.remove(&old_key, &rid)?;
            index_info.index.insert(new_key, rid)?;

            if let Some(txn) = self.ctx.transaction() {
                txn.append_index_write_record(IndexWriteRecord {
                    rid,
                    write_type: WriteType::Update,
                    tuple: updated.clone(),
                    old_tuple: old_tuple.clone(),
                    key_attrs: index_info.key_attrs.clone(),
                    index: Arc::clone(&index_info.index),
                });
            }
        }

        Ok(Some((updated, rid)))
    }
}
