use std::cmp::Ordering;

use arrow::datatypes::DataType;
use datafusion::scalar::ScalarValue;

use crate::common::scalar_utils::{is_float_type, is_integer_type, scalar_to_f64, scalar_to_i64, typed_null};
use crate::error::{Result, WindowError};
use crate::window::aggregates::{AccumulatorState, AggregateFunction, AggregateSignature};

fn expect_args(name: &str, arg_types: &[DataType], allowed: &[usize]) -> Result<()> {
    if allowed.contains(&arg_types.len()) {
        Ok(())
    } else {
        Err(WindowError::InvalidArgument(format!(
            "{name} takes {allowed:?} arguments, got {}",
            arg_types.len()
        )))
    }
}

fn state_slot<'a>(state: &'a mut AccumulatorState, name: &str) -> Result<&'a mut ScalarValue> {
    state
        .first_mut()
        .ok_or_else(|| WindowError::internal(format!("{name} state is empty")))
}

fn state_i64(state: &AccumulatorState, idx: usize) -> i64 {
    state.get(idx).and_then(scalar_to_i64).unwrap_or(0)
}

fn overflow(name: &str) -> WindowError {
    WindowError::InvalidArgument(format!("{name} overflowed Int64"))
}

/// Integer inputs sum exactly in Int64, floats in Float64.
fn sum_state_type(name: &str, dt: &DataType) -> Result<DataType> {
    if is_integer_type(dt) || *dt == DataType::Null {
        Ok(DataType::Int64)
    } else if is_float_type(dt) {
        Ok(DataType::Float64)
    } else {
        Err(WindowError::InvalidArgument(format!("{name} is not defined for {dt}")))
    }
}

fn exact_sum(signature: &AggregateSignature) -> bool {
    signature.state_types.first() == Some(&DataType::Int64)
}

/// `count(*)` / `count(x)`.
#[derive(Debug, Default)]
pub struct Count;

impl AggregateFunction for Count {
    fn name(&self) -> &str {
        "count"
    }

    fn bind(&self, arg_types: &[DataType]) -> Result<AggregateSignature> {
        expect_args("count", arg_types, &[0, 1])?;
        Ok(AggregateSignature {
            state_types: vec![DataType::Int64],
            return_type: DataType::Int64,
        })
    }

    fn initial_state(&self, _signature: &AggregateSignature) -> Result<AccumulatorState> {
        Ok(vec![ScalarValue::Int64(Some(0))])
    }

    fn transition(&self, state: &mut AccumulatorState, _args: &[ScalarValue]) -> Result<()> {
        let n = state_i64(state, 0) + 1;
        *state_slot(state, "count")? = ScalarValue::Int64(Some(n));
        Ok(())
    }

    fn supports_combine(&self) -> bool {
        true
    }

    fn combine(&self, state: &mut AccumulatorState, other: &AccumulatorState) -> Result<()> {
        let n = state_i64(state, 0) + state_i64(other, 0);
        *state_slot(state, "count")? = ScalarValue::Int64(Some(n));
        Ok(())
    }

    fn supports_inverse(&self) -> bool {
        true
    }

    fn inverse_combine(&self, state: &mut AccumulatorState, other: &AccumulatorState) -> Result<()> {
        let n = state_i64(state, 0) - state_i64(other, 0);
        *state_slot(state, "count")? = ScalarValue::Int64(Some(n));
        Ok(())
    }

    fn finalize(&self, state: &AccumulatorState) -> Result<ScalarValue> {
        Ok(ScalarValue::Int64(Some(state_i64(state, 0))))
    }
}

/// `sum(x)`: Int64 over integers, Float64 over floats.
#[derive(Debug, Default)]
pub struct Sum;

impl Sum {
    fn add(name: &str, acc: &ScalarValue, v: &ScalarValue, negate: bool) -> Result<ScalarValue> {
        if v.is_null() {
            return Ok(acc.clone());
        }
        match acc {
            ScalarValue::Int64(cur) => {
                let v = scalar_to_i64(v).ok_or_else(|| mismatch(name, v))?;
                let base = cur.unwrap_or(0);
                let out = if negate { base.checked_sub(v) } else { base.checked_add(v) };
                out.map(|n| ScalarValue::Int64(Some(n))).ok_or_else(|| overflow(name))
            }
            ScalarValue::Float64(cur) => {
                let v = scalar_to_f64(v).ok_or_else(|| mismatch(name, v))?;
                let base = cur.unwrap_or(0.0);
                Ok(ScalarValue::Float64(Some(if negate { base - v } else { base + v })))
            }
            other => Err(WindowError::internal(format!("bad {name} state {other:?}"))),
        }
    }
}

fn mismatch(name: &str, v: &ScalarValue) -> WindowError {
    WindowError::InvalidArgument(format!("{name} cannot take a value of type {}", v.data_type()))
}

impl AggregateFunction for Sum {
    fn name(&self) -> &str {
        "sum"
    }

    fn bind(&self, arg_types: &[DataType]) -> Result<AggregateSignature> {
        expect_args("sum", arg_types, &[1])?;
        let state_type = sum_state_type("sum", &arg_types[0])?;
        Ok(AggregateSignature {
            state_types: vec![state_type.clone()],
            return_type: state_type,
        })
    }

    fn initial_state(&self, signature: &AggregateSignature) -> Result<AccumulatorState> {
        Ok(vec![typed_null(&signature.return_type)?])
    }

    fn transition(&self, state: &mut AccumulatorState, args: &[ScalarValue]) -> Result<()> {
        let slot = state_slot(state, "sum")?;
        *slot = Self::add("sum", slot, &args[0], false)?;
        Ok(())
    }

    fn supports_combine(&self) -> bool {
        true
    }

    fn combine(&self, state: &mut AccumulatorState, other: &AccumulatorState) -> Result<()> {
        let slot = state_slot(state, "sum")?;
        *slot = Self::add("sum", slot, &other[0], false)?;
        Ok(())
    }

    fn supports_inverse(&self) -> bool {
        true
    }

    fn inverse_combine(&self, state: &mut AccumulatorState, other: &AccumulatorState) -> Result<()> {
        let slot = state_slot(state, "sum")?;
        *slot = Self::add("sum", slot, &other[0], true)?;
        Ok(())
    }

    fn supports_inverse_for(&self, signature: &AggregateSignature) -> bool {
        exact_sum(signature)
    }

    fn finalize(&self, state: &AccumulatorState) -> Result<ScalarValue> {
        state
            .first()
            .cloned()
            .ok_or_else(|| WindowError::internal("sum state is empty"))
    }
}

/// `avg(x)` over numbers, as Float64. State is `[sum, count]`, the sum typed
/// like `sum(x)`.
#[derive(Debug, Default)]
pub struct Avg;

impl Avg {
    fn fold(state: &mut AccumulatorState, sum: &ScalarValue, count: i64, negate: bool) -> Result<()> {
        let acc = state.first().ok_or_else(|| WindowError::internal("avg state is empty"))?;
        let sum = Sum::add("avg", acc, sum, negate)?;
        let count = if negate { state_i64(state, 1) - count } else { state_i64(state, 1) + count };
        *state = vec![sum, ScalarValue::Int64(Some(count))];
        Ok(())
    }
}

impl AggregateFunction for Avg {
    fn name(&self) -> &str {
        "avg"
    }

    fn bind(&self, arg_types: &[DataType]) -> Result<AggregateSignature> {
        expect_args("avg", arg_types, &[1])?;
        let sum_type = sum_state_type("avg", &arg_types[0])?;
        Ok(AggregateSignature {
            state_types: vec![sum_type, DataType::Int64],
            return_type: DataType::Float64,
        })
    }

    fn initial_state(&self, signature: &AggregateSignature) -> Result<AccumulatorState> {
        let sum_type = signature
            .state_types
            .first()
            .ok_or_else(|| WindowError::internal("avg signature has no sum type"))?;
        Ok(vec![typed_null(sum_type)?, ScalarValue::Int64(Some(0))])
    }

    fn transition(&self, state: &mut AccumulatorState, args: &[ScalarValue]) -> Result<()> {
        Self::fold(state, &args[0], 1, false)
    }

    fn supports_combine(&self) -> bool {
        true
    }

    fn combine(&self, state: &mut AccumulatorState, other: &AccumulatorState) -> Result<()> {
        Self::fold(state, &other[0], state_i64(other, 1), false)
    }

    fn supports_inverse(&self) -> bool {
        true
    }

    fn inverse_combine(&self, state: &mut AccumulatorState, other: &AccumulatorState) -> Result<()> {
        Self::fold(state, &other[0], state_i64(other, 1), true)
    }

    fn supports_inverse_for(&self, signature: &AggregateSignature) -> bool {
        exact_sum(signature)
    }

    fn finalize(&self, state: &AccumulatorState) -> Result<ScalarValue> {
        let count = state_i64(state, 1);
        if count == 0 {
            return Ok(ScalarValue::Float64(None));
        }
        let sum = state.first().and_then(scalar_to_f64).unwrap_or(0.0);
        Ok(ScalarValue::Float64(Some(sum / count as f64)))
    }
}

/// `min(x)` / `max(x)`. Combinable but not invertible.
#[derive(Debug)]
pub struct MinMax {
    name: &'static str,
    keep: Ordering,
}

impl MinMax {
    pub fn min() -> Self {
        Self {
            name: "min",
            keep: Ordering::Less,
        }
    }

    pub fn max() -> Self {
        Self {
            name: "max",
            keep: Ordering::Greater,
        }
    }

    fn fold(&self, state: &mut AccumulatorState, v: &ScalarValue) -> Result<()> {
        if v.is_null() {
            return Ok(());
        }
        let slot = state_slot(state, self.name)?;
        if slot.is_null() || v.partial_cmp(slot) == Some(self.keep) {
            *slot = v.clone();
        }
        Ok(())
    }
}

impl AggregateFunction for MinMax {
    fn name(&self) -> &str {
        self.name
    }

    fn bind(&self, arg_types: &[DataType]) -> Result<AggregateSignature> {
        expect_args(self.name, arg_types, &[1])?;
        Ok(AggregateSignature {
            state_types: vec![arg_types[0].clone()],
            return_type: arg_types[0].clone(),
        })
    }

    fn initial_state(&self, signature: &AggregateSignature) -> Result<AccumulatorState> {
        Ok(vec![typed_null(&signature.return_type)?])
    }

    fn transition(&self, state: &mut AccumulatorState, args: &[ScalarValue]) -> Result<()> {
        self.fold(state, &args[0])
    }

    fn supports_combine(&self) -> bool {
        true
    }

    fn combine(&self, state: &mut AccumulatorState, other: &AccumulatorState) -> Result<()> {
        match other.first() {
            Some(v) => self.fold(state, v),
            None => Ok(()),
        }
    }

    fn finalize(&self, state: &AccumulatorState) -> Result<ScalarValue> {
        state
            .first()
            .cloned()
            .ok_or_else(|| WindowError::internal(format!("{} state is empty", self.name)))
    }
}
