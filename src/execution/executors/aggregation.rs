use std::collections::HashMap;

use crate::catalog::DataValue;
use crate::common::types::{Rid, INVALID_PAGE_ID};
use crate::execution::expression::Expression;
use crate::execution::{ExecutionResult, Executor};
use crate::storage::table::tuple::Tuple;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationType {
    Count,
    Sum,
    Min,
    Max,
}

/// Hash aggregation: `init` drains the child into a table keyed by the
/// group-by values, combining each row into per-group running aggregates;
/// `next` emits one output row per group, skipping groups that fail the
/// HAVING predicate.
pub struct AggregationExecutor {
    child: Box<dyn Executor>,
    group_by_exprs: Vec<Expression>,
    agg_exprs: Vec<Expression>,
    agg_types: Vec<AggregationType>,
    /// Evaluated with `evaluate_aggregate` over (group-bys, aggregates).
    output_exprs: Vec<Expression>,
    having: Option<Expression>,
    groups: Vec<(Vec<DataValue>, Vec<DataValue>)>,
    cursor: usize,
}

impl AggregationExecutor {
    pub fn new(
        child: Box<dyn Executor>,
        group_by_exprs: Vec<Expression>,
        agg_exprs: Vec<Expression>,
        agg_types: Vec<AggregationType>,
        output_exprs: Vec<Expression>,
        having: Option<Expression>,
    ) -> Self {
        Self {
            child,
            group_by_exprs,
            agg_exprs,
            agg_types,
            output_exprs,
            having,
            groups: Vec::new(),
            cursor: 0,
        }
    }

    fn initial_aggregates(&self) -> Vec<DataValue> {
        self.agg_types
            .iter()
            .map(|agg| match agg {
                AggregationType::Count => DataValue::Integer(0),
                AggregationType::Sum | AggregationType::Min | AggregationType::Max => {
                    DataValue::Null
                }
            })
            .collect()
    }

    fn combine(&self, aggregates: &mut [DataValue], inputs: &[DataValue]) {
        for (idx, agg) in self.agg_types.iter().enumerate() {
            let input = &inputs[idx];
            match agg {
                AggregationType::Count => {
                    if let DataValue::Integer(count) = &aggregates[idx] {
                        aggregates[idx] = DataValue::Integer(count + 1);
                    }
                }
                AggregationType::Sum => {
                    if *input == DataValue::Null {
                        continue;
                    }
                    aggregates[idx] = match &aggregates[idx] {
                        DataValue::Null => input.clone(),
                        current => current.add(input),
                    };
                }
                AggregationType::Min => {
                    if *input == DataValue::Null {
                        continue;
                    }
                    if aggregates[idx] == DataValue::Null || *input < aggregates[idx] {
                        aggregates[idx] = input.clone();
                    }
                }
                AggregationType::Max => {
                    if *input == DataValue::Null {
                        continue;
                    }
                    if aggregates[idx] == DataValue::Null || *input > aggregates[idx] {
                        aggregates[idx] = input.clone();
                    }
                }
            }
        }
    }
}

impl Executor for AggregationExecutor {
    fn init(&mut self) -> ExecutionResult<()> {
        self.child.init()?;
        self.groups.clear();
        self.cursor = 0;

        let mut table: HashMap<Vec<DataValue>, Vec<DataValue>> = HashMap::new();
        while let Some((tuple, _)) = self.child.next()? {
            let key: Vec<DataValue> = self
                .group_by_exprs
                .iter()
                .map(|e| e.evaluate(&tuple))
                .collect();
            let inputs: Vec<DataValue> =
                self.agg_exprs.iter().map(|e| e.evaluate(&tuple)).collect();

            let aggregates = table
                .entry(key)
                .or_insert_with(|| self.initial_aggregates());
            self.combine(aggregates, &inputs);
        }

        self.groups = table.into_iter().collect();
        Ok(())
    }

    fn next(&mut self) -> ExecutionResult<Option<(Tuple, Rid)>> {
        while self.cursor < self.groups.len() {
            let (group_bys, aggregates) = &self.groups[self.cursor];
            self.cursor += 1;

            if let Some(ref having) = self.having {
                if !having.evaluate_aggregate(group_bys, aggregates).is_true() {
                    continue;
                }
            }

            let values: Vec<DataValue> = self
                .output_exprs
                .iter()
                .map(|e| e.evaluate_aggregate(group_bys, aggregates))
                .collect();
            return Ok(Some((Tuple::new(values), Rid::new(INVALID_PAGE_ID, 0))));
        }
        Ok(None)
    }
}
