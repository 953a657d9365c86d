use arrow_array::ArrayRef;
use arrow_schema::DataType;
use error_stack::{IntoReportCompat, ResultExt};
use ripple_arrow::scalar_value::ScalarValue;
use ripple_batch::DataBatch;

use crate::equality::EqualityFn;
use crate::strategy::{ExecutionMode, ExecutionStrategy};
use crate::{Error, PayloadEquality};

static NULL: ScalarValue = ScalarValue::Null;

/// Every payload is boxed as a [ScalarValue].
///
/// Slower than [Columnar](super::Columnar), but supports arbitrary equality
/// functions over the payload.
#[derive(Clone, Copy, Debug, Default)]
pub struct RowBased;

impl ExecutionStrategy for RowBased {
    type Payload = ScalarValue;

    fn mode(&self) -> ExecutionMode {
        ExecutionMode::RowBased
    }

    fn payload(&self, batch: &DataBatch, row: usize) -> error_stack::Result<ScalarValue, Error> {
        ScalarValue::from_array(batch.payload().as_ref(), row)
            .into_report()
            .change_context(Error::Payload)
    }

    fn to_scalar(&self, payload: &ScalarValue) -> error_stack::Result<ScalarValue, Error> {
        Ok(payload.clone())
    }

    fn from_scalar(
        &self,
        value: &ScalarValue,
        _data_type: &DataType,
    ) -> error_stack::Result<ScalarValue, Error> {
        Ok(value.clone())
    }

    fn equality(
        &self,
        equality: &PayloadEquality,
        data_type: &DataType,
    ) -> error_stack::Result<EqualityFn<ScalarValue>, Error> {
        equality.validate(data_type)?;
        match equality {
            PayloadEquality::AllFields => Ok(Box::new(|a: &ScalarValue, b: &ScalarValue| a == b)),
            PayloadEquality::Fields(names) => {
                let names = names.clone();
                Ok(Box::new(move |a: &ScalarValue, b: &ScalarValue| {
                    names.iter().all(|name| {
                        let a = a.as_record().and_then(|record| record.field(name));
                        let b = b.as_record().and_then(|record| record.field(name));
                        match (a, b) {
                            (Some(a), Some(b)) if a.is_null() && b.is_null() => true,
                            (a, b) => a == b,
                        }
                    })
                }))
            }
            PayloadEquality::Custom(custom) => {
                let custom = custom.clone();
                Ok(Box::new(move |a: &ScalarValue, b: &ScalarValue| {
                    custom(a, b)
                }))
            }
        }
    }

    fn concat(
        &self,
        data_type: &DataType,
        payloads: &[Option<&ScalarValue>],
    ) -> error_stack::Result<ArrayRef, Error> {
        ScalarValue::iter_to_array(
            data_type,
            payloads.iter().map(|payload| payload.unwrap_or(&NULL)),
        )
        .into_report()
        .change_context(Error::Output)
    }
}

#[cfg(test)]
mod tests {
    use arrow_array::Array;

    use super::*;

    #[test]
    fn test_fields_equality_treats_nulls_alike() {
        let a = ScalarValue::record(vec![
            ("id", ScalarValue::Int64(None)),
            ("name", ScalarValue::from("a")),
        ]);
        let b = ScalarValue::record(vec![
            ("id", ScalarValue::Int64(None)),
            ("name", ScalarValue::from("b")),
        ]);
        let data_type = a.data_type();

        let by_id = RowBased
            .equality(&PayloadEquality::fields(["id"]), &data_type)
            .unwrap();
        assert!(by_id(&a, &b));

        let all = RowBased
            .equality(&PayloadEquality::AllFields, &data_type)
            .unwrap();
        assert!(!all(&a, &b));
    }

    #[test]
    fn test_custom_equality() {
        let equal = RowBased
            .equality(
                &PayloadEquality::custom(|a, b| a.is_null() == b.is_null()),
                &DataType::Int64,
            )
            .unwrap();
        assert!(equal(&ScalarValue::from(1i64), &ScalarValue::from(2i64)));
        assert!(!equal(&ScalarValue::from(1i64), &ScalarValue::Int64(None)));
    }

    #[test]
    fn test_concat_with_missing() {
        let one = ScalarValue::from(1i64);
        let array = RowBased
            .concat(&DataType::Int64, &[Some(&one), None])
            .unwrap();
        assert_eq!(array.len(), 2);
        assert_eq!(
            ScalarValue::from_array(array.as_ref(), 1).unwrap(),
            ScalarValue::Int64(None)
        );
    }
}
