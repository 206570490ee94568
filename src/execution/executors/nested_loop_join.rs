use crate::common::types::{Rid, INVALID_PAGE_ID};
use crate::execution::expression::Expression;
use crate::execution::{ExecutionResult, Executor};
use crate::storage::table::tuple::Tuple;

/// Classic nested-loop join: the inner side is re-initialized for every
/// outer row. A missing predicate yields the cross product. Output rows
/// are the outer columns followed by the inner columns.
pub struct NestedLoopJoinExecutor {
    left: Box<dyn Executor>,
    right: Box<dyn Executor>,
    predicate: Option<Expression>,
    outer_tuple: Option<Tuple>,
}

impl NestedLoopJoinExecutor {
    pub fn new(
        left: Box<dyn Executor>,
        right: Box<dyn Executor>,
        predicate: Option<Expression>,
    ) -> Self {
        Self {
            left,
            right,
            predicate,
            outer_tuple: None,
        }
    }

    fn combine(outer: &Tuple, inner: &Tuple) -> Tuple {
        let mut values = outer.values().to_vec();
        values.extend_from_slice(inner.values());
        Tuple::new(values)
    }
}

impl Executor for NestedLoopJoinExecutor {
    fn init(&mut self) -> ExecutionResult<()> {
        self.left.init()?;
        self.right.init()?;
        self.outer_tuple = self.left.next()?.map(|(tuple, _)| tuple);
        Ok(())
    }

    fn next(&mut self) -> ExecutionResult<Option<(Tuple, Rid)>> {
        loop {
            let outer = match &self.outer_tuple {
                Some(outer) => outer.clone(),
                None => return Ok(None),
            };

            while let Some((inner, _)) = self.right.next()? {
                let matched = match &self.predicate {
                    Some(predicate) => predicate.evaluate_join(&outer, &inner).is_true(),
                    None => true,
                };
                if matched {
                    return Ok(Some((
                        Self::combine(&outer, &inner),
                        Rid::new(INVALID_PAGE_ID, 0),
                    )));
                }
            }

            // Inner side exhausted: restart it against the next outer row.
            self.right.init()?;
            self.outer_tuple = self.left.next()?.map(|(tuple, _)| tuple);
        }
    }
}
