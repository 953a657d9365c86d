//! Execution strategies for the binary operators.
//!
//! The operators are written once over an opaque payload. The strategy
//! decides how payloads are represented: [Columnar] keeps a reference to the
//! row of the input column and assembles output columns with `interleave`,
//! while [RowBased] boxes every payload as a [ScalarValue]. Both produce the
//! same results; columnar execution rejects equality functions over the
//! boxed payload.

mod columnar;
mod row;

use arrow_array::ArrayRef;
use arrow_schema::DataType;
pub use columnar::*;
use ripple_arrow::scalar_value::ScalarValue;
use ripple_batch::DataBatch;
pub use row::*;

use crate::equality::EqualityFn;
use crate::{Error, PayloadEquality};

/// Which strategy an operator executes with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ExecutionMode {
    #[default]
    Columnar,
    RowBased,
}

pub trait ExecutionStrategy: Send + Sync + std::fmt::Debug + 'static {
    type Payload: Clone + Send + Sync + std::fmt::Debug + 'static;

    fn mode(&self) -> ExecutionMode;

    /// The payload of a row of an input batch.
    fn payload(
        &self,
        batch: &DataBatch,
        row: usize,
    ) -> error_stack::Result<Self::Payload, Error>;

    /// Box a payload for checkpointing.
    fn to_scalar(&self, payload: &Self::Payload) -> error_stack::Result<ScalarValue, Error>;

    /// Unbox a checkpointed payload of the given type.
    fn from_scalar(
        &self,
        value: &ScalarValue,
        data_type: &DataType,
    ) -> error_stack::Result<Self::Payload, Error>;

    /// Create the equality function for payloads of the given type.
    fn equality(
        &self,
        equality: &PayloadEquality,
        data_type: &DataType,
    ) -> error_stack::Result<EqualityFn<Self::Payload>, Error>;

    /// Assemble a column of the given type. `None` produces a null row.
    fn concat(
        &self,
        data_type: &DataType,
        payloads: &[Option<&Self::Payload>],
    ) -> error_stack::Result<ArrayRef, Error>;
}
