use arrow::datatypes::DataType;
use datafusion::scalar::ScalarValue;

use crate::error::{Result, WindowError};

pub fn scalar_to_i64(value: &ScalarValue) -> Option<i64> {
    match value {
        ScalarValue::Int8(Some(v)) => Some(*v as i64),
        ScalarValue::Int16(Some(v)) => Some(*v as i64),
        ScalarValue::Int32(Some(v)) => Some(*v as i64),
        ScalarValue::Int64(Some(v)) => Some(*v),
        ScalarValue::UInt8(Some(v)) => Some(*v as i64),
        ScalarValue::UInt16(Some(v)) => Some(*v as i64),
        ScalarValue::UInt32(Some(v)) => Some(*v as i64),
        ScalarValue::UInt64(Some(v)) => i64::try_from(*v).ok(),
        _ => None,
    }
}

pub fn scalar_to_f64(value: &ScalarValue) -> Option<f64> {
    match value {
        ScalarValue::Float32(Some(v)) => Some(*v as f64),
        ScalarValue::Float64(Some(v)) => Some(*v),
        other => scalar_to_i64(other).map(|v| v as f64),
    }
}

pub fn is_integer_type(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
    )
}

pub fn is_float_type(data_type: &DataType) -> bool {
    matches!(data_type, DataType::Float32 | DataType::Float64)
}

/// NULL of the given type.
pub fn typed_null(data_type: &DataType) -> Result<ScalarValue> {
    ScalarValue::try_from(data_type).map_err(WindowError::from)
}

/// Reads an integer parameter (offset, bucket count). `None` means NULL.
pub fn integer_param(value: &ScalarValue, what: &str) -> Result<Option<i64>> {
    if value.is_null() {
        return Ok(None);
    }
    scalar_to_i64(value).map(Some).ok_or_else(|| {
        WindowError::InvalidParameter(format!(
            "{what} must be an integer, got {}",
            value.data_type()
        ))
    })
}
