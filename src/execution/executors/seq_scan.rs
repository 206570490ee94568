use std::sync::Arc;

use crate::catalog::{Schema, TableInfo, TableOid};
use crate::common::types::Rid;
use crate::execution::context::ExecutorContext;
use crate::execution::expression::Expression;
use crate::execution::{ExecutionError, ExecutionResult, Executor};
use crate::storage::table::table_heap::TableIterator;
use crate::storage::table::tuple::Tuple;
use crate::transaction::concurrency::transaction::IsolationLevel;

/// Sequential scan over a table heap with an optional predicate and
/// name-resolved projection.
///
/// Tuple locks follow the transaction's isolation level: READ UNCOMMITTED
/// takes none, READ COMMITTED takes a shared lock and releases it before
/// returning the row, REPEATABLE READ takes a shared lock and keeps it to
/// end of transaction.
pub struct SeqScanExecutor {
    ctx: Arc<ExecutorContext>,
    table_info: Arc<TableInfo>,
    predicate: Option<Expression>,
    output_schema: Schema,
    projects: bool,
    iter: Option<TableIterator>,
}

impl SeqScanExecutor {
    pub fn new(
        ctx: Arc<ExecutorContext>,
        table_oid: TableOid,
        predicate: Option<Expression>,
        output_schema: Schema,
    ) -> ExecutionResult<Self> {
        let table_info = ctx
            .catalog()
            .get_table(table_oid)
            .ok_or_else(|| ExecutionError::TableNotFound(format!("oid {table_oid}")))?;
        let projects = output_schema.column_count() != table_info.schema.column_count();

        Ok(Self {
            ctx,
            table_info,
            predicate,
            output_schema,
            projects,
            iter: None,
        })
    }

    fn isolation_level(&self) -> Option<IsolationLevel> {
        self.ctx.transaction().map(|txn| txn.isolation_level())
    }
}

impl Executor for SeqScanExecutor {
    fn init(&mut self) -> ExecutionResult<()> {
        self.iter = Some(self.table_info.table.iter());
        Ok(())
    }

    fn next(&mut self) -> ExecutionResult<Option<(Tuple, Rid)>> {
        let iter = self.iter.as_mut().expect("init before next");

        for (rid, tuple) in iter.by_ref() {
            if let Some(ref predicate) = self.predicate {
                if !predicate.evaluate(&tuple).is_true() {
                    continue;
                }
            }

            let isolation = self.isolation_level();
            match isolation {
                Some(IsolationLevel::ReadCommitted) | Some(IsolationLevel::RepeatableRead) => {
                    self.ctx.lock_shared(rid)?;
                }
                Some(IsolationLevel::ReadUncommitted) | None => {}
            }

            let out = if self.projects {
                tuple.project(&self.table_info.schema, &self.output_schema)
            } else {
                tuple
            };

            // READ COMMITTED holds the lock only while the row is copied out.
            if isolation == Some(IsolationLevel::ReadCommitted) {
                self.ctx.unlock(&rid);
            }

            return Ok(Some((out, rid)));
        }
        Ok(None)
    }
}
