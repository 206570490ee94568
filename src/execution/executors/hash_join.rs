use std::collections::HashMap;

use crate::catalog::DataValue;
use crate::common::types::{Rid, INVALID_PAGE_ID};
use crate::execution::expression::Expression;
use crate::execution::{ExecutionResult, Executor};
use crate::storage::table::tuple::Tuple;

/// Equi-join on one key expression per side. `init` builds an in-memory
/// hash table over the left (build) side; `next` streams the right
/// (probe) side and yields one combined row per left match. Output
/// columns are drawn by `(tuple_idx, col_idx)` from either side.
pub struct HashJoinExecutor {
    left: Box<dyn Executor>,
    right: Box<dyn Executor>,
    left_key: Expression,
    right_key: Expression,
    /// (0, i) takes column i of the matched left row; (1, i) of the right row.
    output_cols: Vec<(usize, usize)>,
    table: HashMap<DataValue, Vec<Vec<DataValue>>>,
    current_right: Option<Tuple>,
    current_matches: Vec<Vec<DataValue>>,
    current_idx: usize,
}

impl HashJoinExecutor {
    pub fn new(
        left: Box<dyn Executor>,
        right: Box<dyn Executor>,
        left_key: Expression,
        right_key: Expression,
        output_cols: Vec<(usize, usize)>,
    ) -> Self {
        Self {
            left,
            right,
            left_key,
            right_key,
            output_cols,
            table: HashMap::new(),
            current_right: None,
            current_matches: Vec::new(),
            current_idx: 0,
        }
    }

    fn emit(&self, right_tuple: &Tuple, left_values: &[DataValue]) -> Tuple {
        let values = self
            .output_cols
            .iter()
            .map(|&(tuple_idx, col_idx)| {
                if tuple_idx == 0 {
                    left_values[col_idx].clone()
                } else {
                    right_tuple.value(col_idx).clone()
                }
            })
            .collect();
        Tuple::new(values)
    }
}

impl Executor for HashJoinExecutor {
    fn init(&mut self) -> ExecutionResult<()> {
        self.left.init()?;
        self.right.init()?;
        self.table.clear();
        self.current_right = None;
        self.current_matches.clear();
        self.current_idx = 0;

        while let Some((tuple, _)) = self.left.next()? {
            let key = self.left_key.evaluate(&tuple);
            self.table
                .entry(key)
                .or_default()
                .push(tuple.values().to_vec());
        }
        Ok(())
    }

    fn next(&mut self) -> ExecutionResult<Option<(Tuple, Rid)>> {
        loop {
            if self.current_idx < self.current_matches.len() {
                let right = self.current_right.as_ref().expect("probe row set");
                let left_values = &self.current_matches[self.current_idx];
                let out = self.emit(right, left_values);
                self.current_idx += 1;
                return Ok(Some((out, Rid::new(INVALID_PAGE_ID, 0))));
            }

            let (right_tuple, _) = match self.right.next()? {
                Some(row) => row,
                None => return Ok(None),
            };

            let key = self.right_key.evaluate(&right_tuple);
            if let Some(matches) = self.table.get(&key) {
                self.current_matches = matches.clone();
                self.current_idx = 0;
                self.current_right = Some(right_tuple);
            }
        }
    }
}
