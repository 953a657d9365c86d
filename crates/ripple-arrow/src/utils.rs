use std::sync::Arc;

use arrow::array::{ArrayData, ArrayRef, StructArray};
use arrow::datatypes::{DataType, FieldRef, Fields};
use arrow_buffer::NullBuffer;

/// Create a StructArray with the given length, fields and validity.
///
/// The field value arrays (if any) should have the same length.
///
/// This works around the fact that the `StructArray::from(fields)`
/// panics when provided 0 fields, which happens for payloads that are
/// empty records.
///
/// https://github.com/apache/arrow-rs/issues/1657
pub fn make_struct_array(
    length: usize,
    fields: Vec<(FieldRef, ArrayRef)>,
    nulls: Option<NullBuffer>,
) -> StructArray {
    // Check the fields have the expected length.
    #[cfg(debug_assertions)]
    {
        for (field, array) in fields.iter() {
            debug_assert_eq!(
                array.len(),
                length,
                "Array for field '{}' had unexpected length",
                field.name()
            );
        }
    }

    if fields.is_empty() {
        // Arrow can't create a struct array with no fields -- it wouldn't know the
        // length. So we create the ArrayData directly.
        let array_data = ArrayData::builder(DataType::Struct(Fields::empty()))
            .len(length)
            .nulls(nulls);
        // SAFETY: Array Data constructed correctly.
        let array_data = unsafe { array_data.build_unchecked() };
        StructArray::from(array_data)
    } else {
        let (fields, columns): (Vec<_>, Vec<_>) = fields.into_iter().unzip();
        StructArray::new(fields.into(), columns, nulls)
    }
}

/// Work around the fact that `new_null_array` panics on 0-field struct.
///
/// https://github.com/apache/arrow-rs/issues/1657
pub fn make_null_array(data_type: &DataType, length: usize) -> ArrayRef {
    if data_type == &DataType::Struct(Fields::empty()) {
        Arc::new(make_struct_array(
            length,
            vec![],
            Some(NullBuffer::new_null(length)),
        ))
    } else {
        arrow::array::new_null_array(data_type, length)
    }
}

#[cfg(test)]
mod tests {
    use arrow::array::Array;

    use super::*;

    #[test]
    fn test_empty_struct_nulls() {
        let array = make_null_array(&DataType::Struct(Fields::empty()), 3);
        assert_eq!(array.len(), 3);
        assert_eq!(array.null_count(), 3);
    }
}
