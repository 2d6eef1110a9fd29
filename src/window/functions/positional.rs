use arrow::datatypes::{DataType, Schema};
use datafusion::scalar::ScalarValue;

use crate::common::expr::ArgExpr;
use crate::common::scalar_utils::{integer_param, is_integer_type, scalar_to_i64, typed_null};
use crate::error::{Result, WindowError};
use crate::window::codec::{Payload, PayloadLayout};
use crate::window::frame_buffer::FrameBuffer;
use crate::window::functions::{EvalContext, FunctionParams};
use crate::window::plan::WindowFunctionKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionalKind {
    RowNumber,
    Rank,
    DenseRank,
    PercentRank,
    CumeDist,
    Ntile,
    Lead,
    Lag,
    FirstValue,
    LastValue,
}

impl PositionalKind {
    pub fn from_function_kind(kind: &WindowFunctionKind) -> Result<Self> {
        Ok(match kind {
            WindowFunctionKind::RowNumber => PositionalKind::RowNumber,
            WindowFunctionKind::Rank => PositionalKind::Rank,
            WindowFunctionKind::DenseRank => PositionalKind::DenseRank,
            WindowFunctionKind::PercentRank => PositionalKind::PercentRank,
            WindowFunctionKind::CumeDist => PositionalKind::CumeDist,
            WindowFunctionKind::Ntile => PositionalKind::Ntile,
            WindowFunctionKind::Lead => PositionalKind::Lead,
            WindowFunctionKind::Lag => PositionalKind::Lag,
            WindowFunctionKind::FirstValue => PositionalKind::FirstValue,
            WindowFunctionKind::LastValue => PositionalKind::LastValue,
            WindowFunctionKind::Aggregate(name) => {
                return Err(WindowError::internal(format!("{name} is an aggregate")))
            }
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            PositionalKind::RowNumber => "row_number",
            PositionalKind::Rank => "rank",
            PositionalKind::DenseRank => "dense_rank",
            PositionalKind::PercentRank => "percent_rank",
            PositionalKind::CumeDist => "cume_dist",
            PositionalKind::Ntile => "ntile",
            PositionalKind::Lead => "lead",
            PositionalKind::Lag => "lag",
            PositionalKind::FirstValue => "first_value",
            PositionalKind::LastValue => "last_value",
        }
    }

    pub fn reads_frame(&self) -> bool {
        matches!(self, PositionalKind::FirstValue | PositionalKind::LastValue)
    }

    pub fn needs_partition_rows(&self) -> bool {
        matches!(
            self,
            PositionalKind::PercentRank | PositionalKind::CumeDist | PositionalKind::Ntile
        )
    }

    fn arity(&self) -> (usize, usize) {
        match self {
            PositionalKind::RowNumber
            | PositionalKind::Rank
            | PositionalKind::DenseRank
            | PositionalKind::PercentRank
            | PositionalKind::CumeDist => (0, 0),
            PositionalKind::Ntile | PositionalKind::FirstValue | PositionalKind::LastValue => (1, 1),
            PositionalKind::Lead | PositionalKind::Lag => (1, 3),
        }
    }
}

/// Non-aggregate window function: computed from rank counters, the partition
/// size, or one buffered value at a fixed offset or frame edge.
#[derive(Debug, Clone)]
pub struct PositionalFunction {
    kind: PositionalKind,
    args: Vec<ArgExpr>,
    return_type: DataType,
    slot: Option<usize>,
    /// Parameters when every parameter argument is constant.
    constant_params: Option<FunctionParams>,
    /// Constant `lag` offset, when there is one.
    lag_distance: Option<u64>,
}

impl PositionalFunction {
    pub fn try_new(kind: PositionalKind, args: Vec<ArgExpr>, schema: &Schema, slot: usize) -> Result<Self> {
        let (min, max) = kind.arity();
        if args.len() < min || args.len() > max {
            return Err(WindowError::InvalidArgument(format!(
                "{} takes {min}..={max} arguments, got {}",
                kind.name(),
                args.len()
            )));
        }
        let arg_types = args
            .iter()
            .map(|a| a.data_type(schema))
            .collect::<Result<Vec<DataType>>>()?;

        let return_type = match kind {
            PositionalKind::RowNumber
            | PositionalKind::Rank
            | PositionalKind::DenseRank
            | PositionalKind::Ntile => DataType::Int64,
            PositionalKind::PercentRank | PositionalKind::CumeDist => DataType::Float64,
            PositionalKind::Lead
            | PositionalKind::Lag
            | PositionalKind::FirstValue
            | PositionalKind::LastValue => arg_types[0].clone(),
        };

        let integer_args: &[DataType] = match kind {
            PositionalKind::Ntile => &arg_types[..],
            PositionalKind::Lead | PositionalKind::Lag => &arg_types[1..arg_types.len().min(2)],
            _ => &[],
        };
        if let Some(dt) = integer_args
            .iter()
            .find(|dt| !is_integer_type(dt) && **dt != DataType::Null)
        {
            return Err(WindowError::InvalidArgument(format!(
                "{} argument must be an integer, got {dt}",
                kind.name()
            )));
        }
        if let (PositionalKind::Lead | PositionalKind::Lag, Some(default_type)) = (kind, arg_types.get(2)) {
            if !arrow::compute::can_cast_types(default_type, &return_type) {
                return Err(WindowError::InvalidArgument(format!(
                    "{} default of type {default_type} cannot be cast to {return_type}",
                    kind.name()
                )));
            }
        }

        let slot = match kind {
            PositionalKind::Lead
            | PositionalKind::Lag
            | PositionalKind::FirstValue
            | PositionalKind::LastValue => Some(slot),
            _ => None,
        };
        let mut function = Self {
            kind,
            args,
            return_type,
            slot,
            constant_params: None,
            lag_distance: None,
        };
        if kind == PositionalKind::Lag {
            function.lag_distance = match function.args.get(1) {
                None => Some(1),
                Some(expr) => expr
                    .constant_value()
                    .as_ref()
                    .and_then(scalar_to_i64)
                    .map(i64::unsigned_abs),
            };
        }
        let param_args: &[ArgExpr] = match kind {
            PositionalKind::Ntile => &function.args,
            PositionalKind::Lead | PositionalKind::Lag => &function.args[1..],
            _ => &[],
        };
        let params_constant = param_args.iter().all(ArgExpr::is_constant);
        if params_constant {
            // constant parameters are rejected before the first row
            function.constant_params = Some(function.compute_params(&[])?);
        }
        Ok(function)
    }

    pub fn kind(&self) -> PositionalKind {
        self.kind
    }

    pub fn return_type(&self) -> &DataType {
        &self.return_type
    }

    pub fn constant_params(&self) -> Option<&FunctionParams> {
        self.constant_params.as_ref()
    }

    pub fn payload_layout(&self) -> Option<PayloadLayout> {
        self.slot.map(|_| PayloadLayout::Value(self.return_type.clone()))
    }

    pub fn buffer_payload(&self, row: &[ScalarValue]) -> Result<Option<Payload>> {
        match (self.slot, self.args.first()) {
            (Some(_), Some(arg)) => Ok(Some(Payload::Value(arg.evaluate(row)?))),
            _ => Ok(None),
        }
    }

    /// Constant `lag` distance; `None` when it varies per row.
    pub fn lookbehind(&self) -> Option<u64> {
        match self.kind {
            PositionalKind::Lag => self.lag_distance,
            _ => Some(0),
        }
    }

    pub fn row_params(&self, row: &[ScalarValue]) -> Result<FunctionParams> {
        match &self.constant_params {
            Some(params) => Ok(params.clone()),
            None => self.compute_params(row),
        }
    }

    fn compute_params(&self, row: &[ScalarValue]) -> Result<FunctionParams> {
        match self.kind {
            PositionalKind::Ntile => {
                let arg = self.args[0].evaluate(row)?;
                match integer_param(&arg, "NTILE argument")? {
                    None => Ok(FunctionParams::Ntile(None)),
                    Some(k) if k <= 0 => Err(WindowError::InvalidParameter(
                        "NTILE argument must be greater than zero".to_string(),
                    )),
                    Some(k) => Ok(FunctionParams::Ntile(Some(k))),
                }
            }
            PositionalKind::Lead | PositionalKind::Lag => {
                let label = if self.kind == PositionalKind::Lead { "LEAD" } else { "LAG" };
                let offset = match self.args.get(1) {
                    None => 1,
                    Some(expr) => {
                        let value = expr.evaluate(row)?;
                        match integer_param(&value, &format!("{label} offset"))? {
                            None => {
                                return Err(WindowError::InvalidParameter(format!(
                                    "{label} offset cannot be NULL"
                                )))
                            }
                            Some(n) if n < 0 => {
                                return Err(WindowError::InvalidParameter(format!(
                                    "{label} offset cannot be negative"
                                )))
                            }
                            Some(n) => n,
                        }
                    }
                };
                let default = match self.args.get(2) {
                    None => typed_null(&self.return_type)?,
                    Some(expr) => {
                        let value = expr.evaluate(row)?;
                        if value.is_null() {
                            typed_null(&self.return_type)?
                        } else if value.data_type() != self.return_type {
                            value.cast_to(&self.return_type)?
                        } else {
                            value
                        }
                    }
                };
                let offset = if self.kind == PositionalKind::Lead { offset } else { -offset };
                Ok(FunctionParams::Shift { offset, default })
            }
            _ => Ok(FunctionParams::None),
        }
    }

    fn value_at(&self, fb: &mut FrameBuffer, pos: u64) -> Result<ScalarValue> {
        let slot = self.slot_index()?;
        into_value(fb.payload(pos, slot)?)
    }

    fn slot_index(&self) -> Result<usize> {
        self.slot
            .ok_or_else(|| WindowError::internal(format!("{} has no buffer slot", self.kind.name())))
    }

    fn partition_rows(&self, ctx: &EvalContext<'_>) -> Result<u64> {
        ctx.partition_rows.ok_or_else(|| {
            WindowError::internal(format!("{} evaluated before partition end", self.kind.name()))
        })
    }

    pub fn evaluate(&self, ctx: &EvalContext<'_>, params: &FunctionParams, fb: &mut FrameBuffer) -> Result<ScalarValue> {
        let info = ctx.info;
        match self.kind {
            PositionalKind::RowNumber => Ok(ScalarValue::Int64(Some(info.row_index as i64 + 1))),
            PositionalKind::Rank => Ok(ScalarValue::Int64(Some(info.rank as i64))),
            PositionalKind::DenseRank => Ok(ScalarValue::Int64(Some(info.dense_rank as i64))),
            PositionalKind::PercentRank => {
                let n = self.partition_rows(ctx)?;
                let value = if n <= 1 {
                    0.0
                } else {
                    (info.rank - 1) as f64 / (n - 1) as f64
                };
                Ok(ScalarValue::Float64(Some(value)))
            }
            PositionalKind::CumeDist => {
                let n = self.partition_rows(ctx)?;
                let end = ctx.peer_group_end.ok_or_else(|| {
                    WindowError::internal(format!("peer group {} has no end", info.peer_group))
                })?;
                Ok(ScalarValue::Float64(Some(end as f64 / n as f64)))
            }
            PositionalKind::Ntile => match params {
                FunctionParams::Ntile(None) => Ok(ScalarValue::Int64(None)),
                FunctionParams::Ntile(Some(k)) => {
                    let n = self.partition_rows(ctx)?;
                    Ok(ScalarValue::Int64(Some(ntile_bucket(info.row_index, n, *k as u64) as i64)))
                }
                other => Err(WindowError::internal(format!("ntile got {other:?}"))),
            },
            PositionalKind::Lead | PositionalKind::Lag => {
                let FunctionParams::Shift { offset, default } = params else {
                    return Err(WindowError::internal(format!("{} got {params:?}", self.kind.name())));
                };
                let limit = ctx.partition_rows.unwrap_or(ctx.ingested);
                match (info.row_index as i64).checked_add(*offset) {
                    Some(target) if target >= 0 && (target as u64) < limit => {
                        into_value(fb.payload_at_offset(*offset, self.slot_index()?)?)
                    }
                    _ => Ok(default.clone()),
                }
            }
            PositionalKind::FirstValue => match ctx.frame {
                Some(frame) => self.value_at(fb, frame.start),
                None => typed_null(&self.return_type),
            },
            PositionalKind::LastValue => match ctx.frame {
                Some(frame) => self.value_at(fb, frame.end),
                None => typed_null(&self.return_type),
            },
        }
    }
}

fn into_value(payload: Payload) -> Result<ScalarValue> {
    match payload {
        Payload::Value(v) => Ok(v),
        other => Err(WindowError::internal(format!("expected a value payload, found {other:?}"))),
    }
}

/// 1-based bucket of row `row` when `rows` rows are split into `buckets`
/// contiguous buckets, the first `rows % buckets` one row larger.
pub fn ntile_bucket(row: u64, rows: u64, buckets: u64) -> u64 {
    let size = rows / buckets;
    let larger = rows % buckets;
    let prefix = larger * (size + 1);
    if row < prefix {
        row / (size + 1) + 1
    } else {
        larger + (row - prefix) / size.max(1) + 1
    }
}
