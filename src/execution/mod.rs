pub mod context;
pub mod executors;
pub mod expression;

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::common::types::Rid;
use crate::index::hash::IndexError;
use crate::storage::table::table_heap::TableHeapError;
use crate::storage::table::tuple::Tuple;
use crate::transaction::concurrency::transaction::TransactionError;

pub use context::ExecutorContext;
pub use expression::{ComparisonOp, Expression};

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Table {0} not found")]
    TableNotFound(String),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Table heap error: {0}")]
    Heap(#[from] TableHeapError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

pub type ExecutionResult<T> = std::result::Result<T, ExecutionError>;

/// Pull-based executor: `init` prepares, `next` yields one tuple (and its
/// rid) at a time until exhausted. Transactional failures — above all a
/// lock denied because the transaction was aborted — propagate as errors
/// and unwind the whole operator tree.
pub trait Executor {
    fn init(&mut self) -> ExecutionResult<()>;
    fn next(&mut self) -> ExecutionResult<Option<(Tuple, Rid)>>;
}

/// Drain an executor tree to completion, initializing it first.
pub fn execute_to_vec(executor: &mut dyn Executor) -> ExecutionResult<Vec<(Tuple, Rid)>> {
    executor.init()?;
    let mut rows = Vec::new();
    while let Some(row) = executor.next()? {
        rows.push(row);
    }
    Ok(rows)
}
