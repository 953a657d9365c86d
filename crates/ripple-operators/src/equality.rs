use std::sync::Arc;

use arrow_schema::DataType;
use ripple_arrow::scalar_value::ScalarValue;

use crate::Error;

/// How payloads are compared when matching an end edge to the start edge it
/// closes.
#[derive(Clone, Default)]
pub enum PayloadEquality {
    /// Payloads are equal if every field is equal.
    #[default]
    AllFields,
    /// Payloads are equal if the named fields of a record payload are equal.
    Fields(Vec<String>),
    /// A user function over the boxed payloads.
    ///
    /// Only supported by row-based execution.
    Custom(Arc<dyn Fn(&ScalarValue, &ScalarValue) -> bool + Send + Sync>),
}

impl std::fmt::Debug for PayloadEquality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayloadEquality::AllFields => write!(f, "AllFields"),
            PayloadEquality::Fields(fields) => f.debug_tuple("Fields").field(fields).finish(),
            PayloadEquality::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl PayloadEquality {
    pub fn fields<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        PayloadEquality::Fields(fields.into_iter().map(Into::into).collect())
    }

    pub fn custom(f: impl Fn(&ScalarValue, &ScalarValue) -> bool + Send + Sync + 'static) -> Self {
        PayloadEquality::Custom(Arc::new(f))
    }

    /// Check that the named fields exist in the payload type.
    pub(crate) fn validate(&self, data_type: &DataType) -> error_stack::Result<(), Error> {
        let PayloadEquality::Fields(names) = self else {
            return Ok(());
        };
        let DataType::Struct(fields) = data_type else {
            error_stack::bail!(Error::InvalidEquality(format!(
                "fields {names:?} compared on non-record payload {data_type:?}"
            )));
        };
        for name in names {
            error_stack::ensure!(
                fields.find(name).is_some(),
                Error::InvalidEquality(format!("no field '{name}' in {data_type:?}"))
            );
        }
        Ok(())
    }
}

/// Equality over payloads of a specific execution strategy.
pub(crate) type EqualityFn<P> = Box<dyn Fn(&P, &P) -> bool + Send + Sync>;
