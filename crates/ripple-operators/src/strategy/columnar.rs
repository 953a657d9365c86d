use std::sync::Arc;

use arrow_array::cast::AsArray;
use arrow_array::{Array, ArrayRef};
use arrow_schema::DataType;
use error_stack::{IntoReport, IntoReportCompat, ResultExt};
use hashbrown::HashMap;
use ripple_arrow::scalar_value::ScalarValue;
use ripple_arrow::utils::make_null_array;
use ripple_batch::DataBatch;

use crate::equality::EqualityFn;
use crate::strategy::{ExecutionMode, ExecutionStrategy};
use crate::{Error, PayloadEquality};

/// A reference to a row of a payload column.
///
/// Holding the payload keeps the column alive, but not the batch it arrived
/// in.
#[derive(Clone)]
pub struct ColumnarPayload {
    array: ArrayRef,
    row: usize,
}

impl std::fmt::Debug for ColumnarPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColumnarPayload")
            .field("data_type", self.array.data_type())
            .field("row", &self.row)
            .finish()
    }
}

impl ColumnarPayload {
    fn data(&self) -> arrow::array::ArrayData {
        self.array.slice(self.row, 1).to_data()
    }

    /// The named field of a record payload, or `None` if the field (or the
    /// record itself) is null.
    fn field(&self, name: &str) -> Option<ArrayRef> {
        if self.array.is_null(self.row) {
            return None;
        }
        let column = self.array.as_struct_opt()?.column_by_name(name)?;
        column.is_valid(self.row).then(|| column.slice(self.row, 1))
    }
}

/// Payloads stay in their input columns, and output columns are assembled
/// by interleaving rows of the input columns.
#[derive(Clone, Copy, Debug, Default)]
pub struct Columnar;

impl ExecutionStrategy for Columnar {
    type Payload = ColumnarPayload;

    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Columnar
    }

    fn payload(
        &self,
        batch: &DataBatch,
        row: usize,
    ) -> error_stack::Result<ColumnarPayload, Error> {
        error_stack::ensure!(row < batch.len(), Error::Payload);
        Ok(ColumnarPayload {
            array: batch.payload().clone(),
            row,
        })
    }

    fn to_scalar(&self, payload: &ColumnarPayload) -> error_stack::Result<ScalarValue, Error> {
        ScalarValue::from_array(payload.array.as_ref(), payload.row)
            .into_report()
            .change_context(Error::Payload)
    }

    fn from_scalar(
        &self,
        value: &ScalarValue,
        data_type: &DataType,
    ) -> error_stack::Result<ColumnarPayload, Error> {
        let array = ScalarValue::iter_to_array(data_type, std::iter::once(value))
            .into_report()
            .change_context(Error::Payload)?;
        Ok(ColumnarPayload { array, row: 0 })
    }

    fn equality(
        &self,
        equality: &PayloadEquality,
        data_type: &DataType,
    ) -> error_stack::Result<EqualityFn<ColumnarPayload>, Error> {
        equality.validate(data_type)?;
        match equality {
            PayloadEquality::AllFields => {
                Ok(Box::new(|a: &ColumnarPayload, b: &ColumnarPayload| {
                    a.data() == b.data()
                }))
            }
            PayloadEquality::Fields(names) => {
                let names = names.clone();
                Ok(Box::new(move |a: &ColumnarPayload, b: &ColumnarPayload| {
                    names.iter().all(|name| match (a.field(name), b.field(name)) {
                        (None, None) => true,
                        (Some(a), Some(b)) => a.to_data() == b.to_data(),
                        _ => false,
                    })
                }))
            }
            PayloadEquality::Custom(_) => error_stack::bail!(Error::InvalidComparer),
        }
    }

    fn concat(
        &self,
        data_type: &DataType,
        payloads: &[Option<&ColumnarPayload>],
    ) -> error_stack::Result<ArrayRef, Error> {
        // Index 0 is a single null row, used for missing payloads.
        let null = make_null_array(data_type, 1);
        let mut arrays: Vec<&dyn Array> = vec![null.as_ref()];
        let mut positions: HashMap<*const (), usize> = HashMap::new();
        let mut indices = Vec::with_capacity(payloads.len());
        for payload in payloads {
            match payload {
                None => indices.push((0, 0)),
                Some(payload) => {
                    let ptr = Arc::as_ptr(&payload.array).cast::<()>();
                    let position = *positions.entry(ptr).or_insert_with(|| {
                        arrays.push(payload.array.as_ref());
                        arrays.len() - 1
                    });
                    indices.push((position, payload.row));
                }
            }
        }

        arrow_select::interleave::interleave(&arrays, &indices)
            .into_report()
            .change_context(Error::Output)
    }
}
