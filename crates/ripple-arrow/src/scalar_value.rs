use std::sync::Arc;

use anyhow::{anyhow, Context};
use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, NullArray, PrimitiveArray, StringArray,
};
use arrow::datatypes::*;
use arrow_buffer::NullBuffer;
use decorum::Total;
use itertools::izip;

use crate::utils::make_struct_array;

/// Represents a single value of a given data type.
///
/// This corresponds to a single row of an Arrow array. It is the boxed,
/// per-element representation of a payload used by the row-based execution
/// path and by checkpoints.
#[derive(
    Clone, Debug, PartialEq, PartialOrd, Eq, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum ScalarValue {
    Null,
    Boolean(Option<bool>),
    Int32(Option<i32>),
    Int64(Option<i64>),
    UInt32(Option<u32>),
    UInt64(Option<u64>),
    Float64(Option<Total<f64>>),
    /// UTF-8 encoded strings with 32 bit offsets.
    Utf8(Option<String>),
    /// Records.
    Record(Box<ScalarRecord>),
}

#[derive(
    Clone, Debug, PartialEq, PartialOrd, Eq, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct ScalarRecord {
    value: Option<Vec<ScalarValue>>,
    fields: Fields,
}

static NULL: ScalarValue = ScalarValue::Null;

impl From<bool> for ScalarValue {
    fn from(b: bool) -> Self {
        ScalarValue::Boolean(Some(b))
    }
}

impl From<i32> for ScalarValue {
    fn from(n: i32) -> Self {
        ScalarValue::Int32(Some(n))
    }
}

impl From<i64> for ScalarValue {
    fn from(n: i64) -> Self {
        ScalarValue::Int64(Some(n))
    }
}

impl From<u32> for ScalarValue {
    fn from(n: u32) -> Self {
        ScalarValue::UInt32(Some(n))
    }
}

impl From<u64> for ScalarValue {
    fn from(n: u64) -> Self {
        ScalarValue::UInt64(Some(n))
    }
}

impl From<f64> for ScalarValue {
    fn from(n: f64) -> Self {
        ScalarValue::Float64(Some(Total::from(n)))
    }
}

impl From<&str> for ScalarValue {
    fn from(s: &str) -> Self {
        ScalarValue::Utf8(Some(s.to_owned()))
    }
}

impl From<String> for ScalarValue {
    fn from(s: String) -> Self {
        ScalarValue::Utf8(Some(s))
    }
}

impl std::fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            null if null.is_null() => write!(f, "null"),
            ScalarValue::Boolean(Some(true)) => write!(f, "true"),
            ScalarValue::Boolean(Some(false)) => write!(f, "false"),
            ScalarValue::Int32(Some(n)) => write!(f, "{n}i32"),
            ScalarValue::Int64(Some(n)) => write!(f, "{n}i64"),
            ScalarValue::UInt32(Some(n)) => write!(f, "{n}u32"),
            ScalarValue::UInt64(Some(n)) => write!(f, "{n}u64"),
            ScalarValue::Float64(Some(n)) => write!(f, "{n}f64"),
            ScalarValue::Utf8(Some(str)) => write!(f, "\"{str}\""),
            ScalarValue::Record(record) => {
                write!(f, "{{")?;
                if let Some(values) = &record.value {
                    for (index, (field, value)) in izip!(record.fields.iter(), values).enumerate()
                    {
                        if index > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}: {}", field.name(), value)?;
                    }
                }
                write!(f, "}}")
            }
            unreachable => unreachable!("Unable to format {unreachable:?}"),
        }
    }
}

impl ScalarRecord {
    pub fn new(value: Option<Vec<ScalarValue>>, fields: Fields) -> ScalarRecord {
        ScalarRecord { value, fields }
    }

    pub fn values(&self) -> &Option<Vec<ScalarValue>> {
        &self.value
    }
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Return the value of the named field.
    ///
    /// Returns `None` if there is no such field. A null record yields
    /// [ScalarValue::Null] for every field.
    pub fn field(&self, name: &str) -> Option<&ScalarValue> {
        let (index, _) = self.fields.find(name)?;
        match &self.value {
            Some(values) => values.get(index),
            None => Some(&NULL),
        }
    }
}

impl ScalarValue {
    pub fn from_f64(value: f64) -> Self {
        Self::Float64(Some(Total::from(value)))
    }

    /// Create a non-null record from named values.
    ///
    /// The fields are nullable and take the type of the corresponding value.
    pub fn record(values: Vec<(&str, ScalarValue)>) -> Self {
        let fields: Fields = values
            .iter()
            .map(|(name, value)| Field::new(*name, value.data_type(), true))
            .collect();
        let value = values.into_iter().map(|(_, value)| value).collect();
        Self::Record(Box::new(ScalarRecord {
            value: Some(value),
            fields,
        }))
    }

    /// Create a null scalar value of the given type
    ///
    /// # Errors
    /// If the data type can't be represented as a scalar value.
    pub fn try_new_null(data_type: &DataType) -> anyhow::Result<Self> {
        match data_type {
            DataType::Null => Ok(Self::Null),
            DataType::Boolean => Ok(Self::Boolean(None)),
            DataType::Int32 => Ok(Self::Int32(None)),
            DataType::Int64 => Ok(Self::Int64(None)),
            DataType::UInt32 => Ok(Self::UInt32(None)),
            DataType::UInt64 => Ok(Self::UInt64(None)),
            DataType::Float64 => Ok(Self::Float64(None)),
            DataType::Utf8 => Ok(Self::Utf8(None)),
            DataType::Struct(fields) => Ok(Self::Record(Box::new(ScalarRecord {
                value: None,
                fields: fields.clone(),
            }))),
            unsupported => Err(anyhow!(
                "Unsupported data type for scalar value {:?}",
                unsupported
            )),
        }
    }

    /// Return the Arrow DataType describing this scalar value.
    pub fn data_type(&self) -> DataType {
        match self {
            ScalarValue::Null => DataType::Null,
            ScalarValue::Boolean(_) => DataType::Boolean,
            ScalarValue::Int32(_) => DataType::Int32,
            ScalarValue::Int64(_) => DataType::Int64,
            ScalarValue::UInt32(_) => DataType::UInt32,
            ScalarValue::UInt64(_) => DataType::UInt64,
            ScalarValue::Float64(_) => DataType::Float64,
            ScalarValue::Utf8(_) => DataType::Utf8,
            ScalarValue::Record(record) => DataType::Struct(record.fields.clone()),
        }
    }

    /// Create an Arrow array of length `len` containing this scalar value in
    /// each row.
    pub fn to_array(&self, len: usize) -> ArrayRef {
        match self {
            ScalarValue::Null => Arc::new(NullArray::new(len)),
            ScalarValue::Boolean(b) => {
                Arc::new(std::iter::repeat(b).take(len).collect::<BooleanArray>())
            }
            ScalarValue::Int32(n) => fill_primitive::<Int32Type>(len, n),
            ScalarValue::Int64(n) => fill_primitive::<Int64Type>(len, n),
            ScalarValue::UInt32(n) => fill_primitive::<UInt32Type>(len, n),
            ScalarValue::UInt64(n) => fill_primitive::<UInt64Type>(len, n),
            ScalarValue::Float64(n) => {
                fill_primitive::<Float64Type>(len, &n.map(|f| f.into_inner()))
            }
            ScalarValue::Utf8(s) => {
                let iter = std::iter::repeat(s).take(len);
                Arc::new(iter.cloned().collect::<StringArray>())
            }
            ScalarValue::Record(record) => {
                let columns: Vec<(FieldRef, ArrayRef)> = match &record.value {
                    Some(values) => izip!(&record.fields, values)
                        .map(|(field, value)| (field.clone(), value.to_array(len)))
                        .collect(),
                    None => record
                        .fields
                        .iter()
                        .map(|field| {
                            (
                                field.clone(),
                                crate::utils::make_null_array(field.data_type(), len),
                            )
                        })
                        .collect(),
                };
                let nulls = record
                    .value
                    .is_none()
                    .then(|| NullBuffer::new_null(len));
                Arc::new(make_struct_array(len, columns, nulls))
            }
        }
    }

    /// Create an Arrow array of the given type from a sequence of values.
    ///
    /// [ScalarValue::Null] is accepted in place of any value and produces a
    /// null row.
    ///
    /// # Errors
    /// If a value doesn't match the requested type, or the type can't be
    /// represented as a scalar value.
    pub fn iter_to_array<'a>(
        data_type: &DataType,
        values: impl IntoIterator<Item = &'a ScalarValue>,
    ) -> anyhow::Result<ArrayRef> {
        macro_rules! collect_values {
            ($array:ty, $($pattern:pat => $value:expr),+) => {{
                let array: $array = values
                    .into_iter()
                    .map(|value| match value {
                        ScalarValue::Null => Ok(None),
                        $($pattern => Ok($value),)+
                        other => Err(mismatch(data_type, other)),
                    })
                    .collect::<anyhow::Result<_>>()?;
                Ok(Arc::new(array) as ArrayRef)
            }};
        }

        match data_type {
            DataType::Null => {
                let len = values.into_iter().count();
                Ok(Arc::new(NullArray::new(len)))
            }
            DataType::Boolean => {
                collect_values!(BooleanArray, ScalarValue::Boolean(b) => *b)
            }
            DataType::Int32 => {
                collect_values!(PrimitiveArray<Int32Type>, ScalarValue::Int32(n) => *n)
            }
            DataType::Int64 => {
                collect_values!(PrimitiveArray<Int64Type>, ScalarValue::Int64(n) => *n)
            }
            DataType::UInt32 => {
                collect_values!(PrimitiveArray<UInt32Type>, ScalarValue::UInt32(n) => *n)
            }
            DataType::UInt64 => {
                collect_values!(PrimitiveArray<UInt64Type>, ScalarValue::UInt64(n) => *n)
            }
            DataType::Float64 => collect_values!(
                PrimitiveArray<Float64Type>,
                ScalarValue::Float64(n) => n.map(|n| n.into_inner())
            ),
            DataType::Utf8 => {
                collect_values!(StringArray, ScalarValue::Utf8(s) => s.as_deref())
            }
            DataType::Struct(fields) => {
                let mut validity = Vec::new();
                let mut children: Vec<Vec<&ScalarValue>> = vec![Vec::new(); fields.len()];
                for value in values {
                    let row = match value {
                        ScalarValue::Record(record) => record.value.as_deref(),
                        ScalarValue::Null => None,
                        other => return Err(mismatch(data_type, other)),
                    };

                    if let Some(row) = row {
                        anyhow::ensure!(
                            row.len() == fields.len(),
                            "Expected record with {} fields, but was {}",
                            fields.len(),
                            row.len()
                        );
                        for (child, value) in izip!(children.iter_mut(), row) {
                            child.push(value);
                        }
                        validity.push(true);
                    } else {
                        for child in children.iter_mut() {
                            child.push(&NULL);
                        }
                        validity.push(false);
                    }
                }

                let len = validity.len();
                let columns = izip!(fields.iter(), children)
                    .map(|(field, child)| {
                        let column = Self::iter_to_array(field.data_type(), child)?;
                        Ok((field.clone(), column))
                    })
                    .collect::<anyhow::Result<Vec<_>>>()?;
                let nulls = NullBuffer::from(validity);
                let nulls = (nulls.null_count() > 0).then_some(nulls);
                Ok(Arc::new(make_struct_array(len, columns, nulls)))
            }
            unsupported => Err(anyhow!(
                "Unable to create array of type {:?} from scalar values",
                unsupported
            )),
        }
    }

    /// Create a scalar value from the given row in the array.
    ///
    /// # Errors
    /// If the row is out of bounds for the given array or if the type of the
    /// array can't be converted to a scalar value.
    pub fn from_array(array: &dyn Array, row: usize) -> anyhow::Result<Self> {
        anyhow::ensure!(
            row < array.len(),
            "Row must be less than array length ({:?}), but was {:?}",
            array.len(),
            row
        );

        match array.data_type() {
            DataType::Null => Ok(Self::Null),
            DataType::Boolean => {
                let array = array
                    .as_boolean_opt()
                    .context("expected boolean array")?;
                let value = array.is_valid(row).then(|| array.value(row));
                Ok(Self::Boolean(value))
            }
            DataType::Int32 => Ok(Self::Int32(from_primitive::<Int32Type>(row, array)?)),
            DataType::Int64 => Ok(Self::Int64(from_primitive::<Int64Type>(row, array)?)),
            DataType::UInt32 => Ok(Self::UInt32(from_primitive::<UInt32Type>(row, array)?)),
            DataType::UInt64 => Ok(Self::UInt64(from_primitive::<UInt64Type>(row, array)?)),
            DataType::Float64 => {
                let value = from_primitive::<Float64Type>(row, array)?;
                Ok(Self::Float64(value.map(Total::from)))
            }
            DataType::Utf8 => {
                if array.is_valid(row) {
                    let array = array
                        .as_string_opt::<i32>()
                        .context("expected string array")?;
                    Ok(Self::Utf8(Some(array.value(row).to_owned())))
                } else {
                    Ok(Self::Utf8(None))
                }
            }
            DataType::Struct(fields) => {
                let value = if array.is_valid(row) {
                    let array = array.as_struct_opt().context("expected struct array")?;
                    let values: Result<Vec<_>, _> = array
                        .columns()
                        .iter()
                        .map(|column| Self::from_array(column.as_ref(), row))
                        .collect();
                    Some(values?)
                } else {
                    None
                };
                let fields = fields.clone();
                Ok(Self::Record(Box::new(ScalarRecord { value, fields })))
            }
            unsupported => Err(anyhow!(
                "Unable to convert value of type {:?} to ScalarValue",
                unsupported
            )),
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            ScalarValue::Null => true,
            ScalarValue::Boolean(b) => b.is_none(),
            ScalarValue::Int32(n) => n.is_none(),
            ScalarValue::Int64(n) => n.is_none(),
            ScalarValue::UInt32(n) => n.is_none(),
            ScalarValue::UInt64(n) => n.is_none(),
            ScalarValue::Float64(n) => n.is_none(),
            ScalarValue::Utf8(str) => str.is_none(),
            ScalarValue::Record(record) => record.value.is_none(),
        }
    }

    /// Return the record backing this value, if it is a record.
    pub fn as_record(&self) -> Option<&ScalarRecord> {
        match self {
            ScalarValue::Record(record) => Some(record.as_ref()),
            _ => None,
        }
    }
}

fn mismatch(expected: &DataType, actual: &ScalarValue) -> anyhow::Error {
    anyhow!(
        "Expected value of type {:?}, but was {:?}",
        expected,
        actual.data_type()
    )
}

#[inline]
fn fill_primitive<T>(len: usize, value: &Option<T::Native>) -> ArrayRef
where
    T: ArrowPrimitiveType,
{
    let iter = std::iter::repeat(value).take(len);
    // SAFETY: The iterator is of a fixed size.
    let array = unsafe { PrimitiveArray::<T>::from_trusted_len_iter(iter) };
    Arc::new(array)
}

#[inline]
fn from_primitive<T>(row: usize, array: &dyn Array) -> anyhow::Result<Option<T::Native>>
where
    T: ArrowPrimitiveType,
{
    if array.is_valid(row) {
        let array = array
            .as_primitive_opt::<T>()
            .with_context(|| format!("expected {:?} array", T::DATA_TYPE))?;
        Ok(Some(array.value(row)))
    } else {
        Ok(None)
    }
}
