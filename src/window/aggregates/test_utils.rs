use arrow::datatypes::DataType;
use datafusion::scalar::ScalarValue;

use crate::common::scalar_utils::scalar_to_i64;
use crate::error::Result;
use crate::window::aggregates::{AccumulatorState, AggregateFunction, AggregateSignature};

/// Sum of squares with only a transition function: no combine, no inverse.
#[derive(Debug, Default)]
pub struct SumSquares;

impl AggregateFunction for SumSquares {
    fn name(&self) -> &str {
        "sum_squares"
    }

    fn bind(&self, _arg_types: &[DataType]) -> Result<AggregateSignature> {
        Ok(AggregateSignature {
            state_types: vec![DataType::Int64],
            return_type: DataType::Int64,
        })
    }

    fn initial_state(&self, _signature: &AggregateSignature) -> Result<AccumulatorState> {
        Ok(vec![ScalarValue::Int64(Some(0))])
    }

    fn transition(&self, state: &mut AccumulatorState, args: &[ScalarValue]) -> Result<()> {
        let v = scalar_to_i64(&args[0]).unwrap_or(0);
        let cur = scalar_to_i64(&state[0]).unwrap_or(0);
        state[0] = ScalarValue::Int64(Some(cur + v * v));
        Ok(())
    }

    fn finalize(&self, state: &AccumulatorState) -> Result<ScalarValue> {
        Ok(state[0].clone())
    }
}
