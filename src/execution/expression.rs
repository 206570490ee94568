use crate::catalog::value::DataValue;
use crate::storage::table::tuple::Tuple;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

/// A small expression tree: enough for scan predicates, join keys and
/// conditions, and HAVING clauses over aggregate output.
#[derive(Debug, Clone)]
pub enum Expression {
    Constant(DataValue),
    /// Column of an input tuple; `tuple_idx` picks the side in a join
    /// (0 = left/outer, 1 = right/inner) and is ignored elsewhere.
    ColumnValue { tuple_idx: usize, col_idx: usize },
    /// Group-by column of an aggregation's output.
    GroupByRef(usize),
    /// Aggregate column of an aggregation's output.
    AggregateRef(usize),
    Comparison {
        op: ComparisonOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
}

impl Expression {
    pub fn column(col_idx: usize) -> Self {
        Expression::ColumnValue { tuple_idx: 0, col_idx }
    }

    pub fn comparison(op: ComparisonOp, left: Expression, right: Expression) -> Self {
        Expression::Comparison {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Evaluate against a single tuple.
    pub fn evaluate(&self, tuple: &Tuple) -> DataValue {
        match self {
            Expression::Constant(value) => value.clone(),
            Expression::ColumnValue { col_idx, .. } => tuple.value(*col_idx).clone(),
            Expression::GroupByRef(_) | Expression::AggregateRef(_) => DataValue::Null,
            Expression::Comparison { op, left, right } => {
                compare(*op, &left.evaluate(tuple), &right.evaluate(tuple))
            }
        }
    }

    /// Evaluate against a pair of join inputs.
    pub fn evaluate_join(&self, left_tuple: &Tuple, right_tuple: &Tuple) -> DataValue {
        match self {
            Expression::Constant(value) => value.clone(),
            Expression::ColumnValue { tuple_idx, col_idx } => {
                let side = if *tuple_idx == 0 { left_tuple } else { right_tuple };
                side.value(*col_idx).clone()
            }
            Expression::GroupByRef(_) | Expression::AggregateRef(_) => DataValue::Null,
            Expression::Comparison { op, left, right } => compare(
                *op,
                &left.evaluate_join(left_tuple, right_tuple),
                &right.evaluate_join(left_tuple, right_tuple),
            ),
        }
    }

    /// Evaluate against an aggregation group's output.
    pub fn evaluate_aggregate(&self, group_bys: &[DataValue], aggregates: &[DataValue]) -> DataValue {
        match self {
            Expression::Constant(value) => value.clone(),
            Expression::ColumnValue { .. } => DataValue::Null,
            Expression::GroupByRef(idx) => group_bys[*idx].clone(),
            Expression::AggregateRef(idx) => aggregates[*idx].clone(),
            Expression::Comparison { op, left, right } => compare(
                *op,
                &left.evaluate_aggregate(group_bys, aggregates),
                &right.evaluate_aggregate(group_bys, aggregates),
            ),
        }
    }
}

/// Three-valued-ish comparison: incomparable operands (NULL involved, or
/// mismatched types) come out false.
fn compare(op: ComparisonOp, left: &DataValue, right: &DataValue) -> DataValue {
    let result = match left.partial_cmp(right) {
        None => false,
        Some(ordering) => match op {
            ComparisonOp::Eq => ordering.is_eq(),
            ComparisonOp::NotEq => !ordering.is_eq(),
            ComparisonOp::Lt => ordering.is_lt(),
            ComparisonOp::LtEq => ordering.is_le(),
            ComparisonOp::Gt => ordering.is_gt(),
            ComparisonOp::GtEq => ordering.is_ge(),
        },
    };
    DataValue::Boolean(result)
}
