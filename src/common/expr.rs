use arrow::datatypes::{DataType, Schema};
use datafusion::scalar::ScalarValue;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WindowError};

/// Serializable constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    Null,
    Boolean(bool),
    Int64(i64),
    Float64(f64),
    Utf8(String),
}

impl Literal {
    pub fn to_scalar(&self) -> ScalarValue {
        match self {
            Literal::Null => ScalarValue::Null,
            Literal::Boolean(v) => ScalarValue::Boolean(Some(*v)),
            Literal::Int64(v) => ScalarValue::Int64(Some(*v)),
            Literal::Float64(v) => ScalarValue::Float64(Some(*v)),
            Literal::Utf8(v) => ScalarValue::Utf8(Some(v.clone())),
        }
    }
}

/// Argument or frame-offset expression, evaluated against an input row.
///
/// Constants are evaluated once at setup; a `Column` is re-evaluated for every
/// row, which is what makes a frame bound "delayed".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgExpr {
    Column(usize),
    Literal(Literal),
    /// Typed constant that has no literal form (intervals, decimals).
    #[serde(skip)]
    Value(ScalarValue),
}

impl ArgExpr {
    pub fn column(idx: usize) -> Self {
        ArgExpr::Column(idx)
    }

    pub fn int(v: i64) -> Self {
        ArgExpr::Literal(Literal::Int64(v))
    }

    pub fn value(v: ScalarValue) -> Self {
        ArgExpr::Value(v)
    }

    pub fn is_constant(&self) -> bool {
        !matches!(self, ArgExpr::Column(_))
    }

    pub fn data_type(&self, schema: &Schema) -> Result<DataType> {
        match self {
            ArgExpr::Column(idx) => schema
                .fields()
                .get(*idx)
                .map(|f| f.data_type().clone())
                .ok_or_else(|| column_out_of_range(*idx, schema.fields().len())),
            ArgExpr::Literal(lit) => Ok(lit.to_scalar().data_type()),
            ArgExpr::Value(v) => Ok(v.data_type()),
        }
    }

    pub fn evaluate(&self, row: &[ScalarValue]) -> Result<ScalarValue> {
        match self {
            ArgExpr::Column(idx) => row
                .get(*idx)
                .cloned()
                .ok_or_else(|| column_out_of_range(*idx, row.len())),
            ArgExpr::Literal(lit) => Ok(lit.to_scalar()),
            ArgExpr::Value(v) => Ok(v.clone()),
        }
    }

    /// Value of a constant expression, `None` for per-row expressions.
    pub fn constant_value(&self) -> Option<ScalarValue> {
        match self {
            ArgExpr::Column(_) => None,
            ArgExpr::Literal(lit) => Some(lit.to_scalar()),
            ArgExpr::Value(v) => Some(v.clone()),
        }
    }
}

fn column_out_of_range(idx: usize, width: usize) -> WindowError {
    WindowError::InvalidArgument(format!("column {idx} out of range for {width} columns"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::Field;

    #[test]
    fn test_evaluate_and_type() {
        let schema = Schema::new(vec![
            Field::new("a", DataType::Int64, true),
            Field::new("b", DataType::Utf8, true),
        ]);
        let row = vec![ScalarValue::Int64(Some(7)), ScalarValue::Utf8(Some("x".into()))];

        let col = ArgExpr::column(1);
        assert!(!col.is_constant());
        assert_eq!(col.data_type(&schema).unwrap(), DataType::Utf8);
        assert_eq!(col.evaluate(&row).unwrap(), ScalarValue::Utf8(Some("x".into())));

        let lit = ArgExpr::int(3);
        assert!(lit.is_constant());
        assert_eq!(lit.constant_value(), Some(ScalarValue::Int64(Some(3))));

        assert!(ArgExpr::column(5).evaluate(&row).is_err());
    }

    #[test]
    fn test_yaml_form() {
        let exprs: Vec<ArgExpr> =
            serde_yaml::from_str("- column: 2\n- literal:\n    int64: 4\n- literal:\n    utf8: abc\n").unwrap();
        assert_eq!(
            exprs,
            vec![
                ArgExpr::Column(2),
                ArgExpr::Literal(Literal::Int64(4)),
                ArgExpr::Literal(Literal::Utf8("abc".into()))
            ]
        );
    }
}
