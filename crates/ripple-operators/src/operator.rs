use ripple_batch::{BatchPool, DataBatch, StreamProperties};
use ripple_state::Checkpointable;

use crate::binary::BinaryOperator;
use crate::logic::{ClipLogic, JoinLogic, UnionLogic, WhereNotExistsLogic};
use crate::strategy::{Columnar, ExecutionMode, ExecutionStrategy, RowBased};
use crate::{Error, PayloadEquality};

/// The input an event batch arrived on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn index(self) -> usize {
        match self {
            Side::Left => 0,
            Side::Right => 1,
        }
    }

    pub fn other(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum JoinKind {
    Inner,
    /// Also produce left intervals that never matched, with a null right
    /// payload.
    LeftOuter,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum OperatorKind {
    /// Equi-join on the key. Output payloads are records `{left, right}`.
    Join(JoinKind),
    /// Truncate left intervals at the first right event with the same key.
    Clip,
    /// Merge both inputs.
    Union,
    /// Left intervals that no right interval with the same key overlaps.
    WhereNotExists,
}

impl OperatorKind {
    /// Whether end edges are matched to the start edges they close.
    fn matches_end_edges(self) -> bool {
        !matches!(self, OperatorKind::Union)
    }
}

impl std::fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperatorKind::Join(JoinKind::Inner) => write!(f, "join"),
            OperatorKind::Join(JoinKind::LeftOuter) => write!(f, "left_outer_join"),
            OperatorKind::Clip => write!(f, "clip"),
            OperatorKind::Union => write!(f, "union"),
            OperatorKind::WhereNotExists => write!(f, "where_not_exists"),
        }
    }
}

/// How end edges are matched to the start edges they close, per input.
#[derive(Clone, Debug, Default)]
pub struct OperatorOptions {
    pub left_equality: PayloadEquality,
    pub right_equality: PayloadEquality,
}

impl OperatorOptions {
    pub fn with_left_equality(mut self, equality: PayloadEquality) -> Self {
        self.left_equality = equality;
        self
    }

    pub fn with_right_equality(mut self, equality: PayloadEquality) -> Self {
        self.right_equality = equality;
        self
    }
}

/// An incremental binary operator.
///
/// Batches are pushed from either input as they are produced. Output
/// batches are appended to `output` as soon as the progress of both inputs
/// allows them to be produced in order.
pub trait Operator: Checkpointable + Send + std::fmt::Debug {
    fn kind(&self) -> OperatorKind;

    fn mode(&self) -> ExecutionMode;

    /// Properties of the output stream.
    fn properties(&self) -> &StreamProperties;

    fn push(
        &mut self,
        side: Side,
        batch: &DataBatch,
        output: &mut Vec<DataBatch>,
    ) -> error_stack::Result<(), Error>;

    /// Number of partitions with resident state.
    fn num_partitions(&self) -> usize;
}

/// Create an operator over inputs with the given properties.
pub fn create_operator(
    kind: OperatorKind,
    left: &StreamProperties,
    right: &StreamProperties,
    options: &OperatorOptions,
    mode: ExecutionMode,
    pool: &BatchPool,
    partition_grace: i64,
) -> error_stack::Result<Box<dyn Operator>, Error> {
    error_stack::ensure!(
        left.partitioned == right.partitioned,
        Error::IncompatibleInputs(format!(
            "{kind} of partitioned and non-partitioned streams"
        ))
    );
    if kind == OperatorKind::Union {
        error_stack::ensure!(
            left.payload_type == right.payload_type,
            Error::IncompatibleInputs(format!(
                "union of {:?} and {:?}",
                left.payload_type, right.payload_type
            ))
        );
    }

    let inputs = [left.clone(), right.clone()];
    match mode {
        ExecutionMode::Columnar => build(Columnar, kind, inputs, options, pool, partition_grace),
        ExecutionMode::RowBased => build(RowBased, kind, inputs, options, pool, partition_grace),
    }
}

fn build<S: ExecutionStrategy>(
    strategy: S,
    kind: OperatorKind,
    inputs: [StreamProperties; 2],
    options: &OperatorOptions,
    pool: &BatchPool,
    partition_grace: i64,
) -> error_stack::Result<Box<dyn Operator>, Error> {
    let equality = if kind.matches_end_edges() {
        [
            strategy.equality(&options.left_equality, &inputs[0].payload_type)?,
            strategy.equality(&options.right_equality, &inputs[1].payload_type)?,
        ]
    } else {
        [
            strategy.equality(&PayloadEquality::AllFields, &inputs[0].payload_type)?,
            strategy.equality(&PayloadEquality::AllFields, &inputs[1].payload_type)?,
        ]
    };

    let operator: Box<dyn Operator> = match kind {
        OperatorKind::Join(join) => Box::new(BinaryOperator::new(
            strategy,
            JoinLogic::new(join),
            inputs,
            equality,
            pool,
            partition_grace,
        )),
        OperatorKind::Clip => Box::new(BinaryOperator::new(
            strategy,
            ClipLogic,
            inputs,
            equality,
            pool,
            partition_grace,
        )),
        OperatorKind::Union => Box::new(BinaryOperator::new(
            strategy,
            UnionLogic,
            inputs,
            equality,
            pool,
            partition_grace,
        )),
        OperatorKind::WhereNotExists => Box::new(BinaryOperator::new(
            strategy,
            WhereNotExistsLogic,
            inputs,
            equality,
            pool,
            partition_grace,
        )),
    };
    Ok(operator)
}
