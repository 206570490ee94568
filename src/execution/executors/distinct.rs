use std::collections::HashSet;

use crate::catalog::DataValue;
use crate::common::types::Rid;
use crate::execution::{ExecutionResult, Executor};
use crate::storage::table::tuple::Tuple;

/// Drops duplicate rows. The seen-set is keyed by the full value vector
/// and populated lazily as rows stream through `next`.
pub struct DistinctExecutor {
    child: Box<dyn Executor>,
    seen: HashSet<Vec<DataValue>>,
}

impl DistinctExecutor {
    pub fn new(child: Box<dyn Executor>) -> Self {
        Self {
            child,
            seen: HashSet::new(),
        }
    }
}

impl Executor for DistinctExecutor {
    fn init(&mut self) -> ExecutionResult<()> {
        self.seen.clear();
        self.child.init()
    }

    fn next(&mut self) -> ExecutionResult<Option<(Tuple, Rid)>> {
        while let Some((tuple, rid)) = self.child.next()? {
            if self.seen.insert(tuple.values().to_vec()) {
                return Ok(Some((tuple, rid)));
            }
        }
        Ok(None)
    }
}
