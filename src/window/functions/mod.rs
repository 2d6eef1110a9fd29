use arrow::datatypes::{DataType, Schema};
use datafusion::scalar::ScalarValue;

use crate::common::expr::ArgExpr;
use crate::config::StoreConfig;
use crate::error::{Result, WindowError};
use crate::window::aggregates::{AggregateFunction, AggregateRegistry, AggregateSignature, BoundAggregate};
use crate::window::codec::{Payload, PayloadLayout};
use crate::window::frame::{FrameMode, FrameSpec};
use crate::window::frame_buffer::{FrameBuffer, FrameRange};
use crate::window::plan::{WindowFunctionKind, WindowFunctionSpec};
use crate::window::sequencer::RowInfo;

pub mod aggregate_eval;
pub mod positional;

pub use aggregate_eval::{CumulativeAggregate, RescanAggregate, RunningAggregate, SlidingAggregate};
pub use positional::{PositionalFunction, PositionalKind};

/// How a window function is evaluated over its frame. Decided once when the
/// function is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStrategy {
    /// ROWS running frame: one transition per emitted row.
    Trivial,
    /// RANGE running frame: running transition, reported per peer group.
    Cumulative,
    /// Bounded frame, aggregate with combine and inverse: add entering rows, remove leaving ones.
    SlidingInverse,
    /// Bounded frame, aggregate with combine only: refold the frame.
    GeneralRescan,
    /// Rank family, ntile, lead/lag, first/last value.
    Positional,
}

/// Bounded frames use inverse removal only when it is exact for the bound
/// state types; otherwise the frame is rescanned.
pub fn classify_aggregate(
    frame: &FrameSpec,
    function: &dyn AggregateFunction,
    signature: &AggregateSignature,
) -> Result<FrameStrategy> {
    if frame.is_running() {
        return Ok(match frame.mode {
            FrameMode::Rows => FrameStrategy::Trivial,
            FrameMode::Range => FrameStrategy::Cumulative,
        });
    }
    if function.supports_combine() && function.supports_inverse_for(signature) {
        Ok(FrameStrategy::SlidingInverse)
    } else if function.supports_combine() {
        Ok(FrameStrategy::GeneralRescan)
    } else {
        Err(WindowError::UnsupportedFunction {
            name: function.name().to_string(),
            reason: "a bounded frame needs a combine operator".to_string(),
        })
    }
}

/// Per-row parameters, validated before the row is dispatched.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionParams {
    None,
    /// Signed row offset from the current row (`lead` positive, `lag` negative)
    /// and the value used when the target lies outside the partition.
    Shift { offset: i64, default: ScalarValue },
    /// `ntile` bucket count; `None` when the argument is NULL.
    Ntile(Option<i64>),
}

impl FunctionParams {
    /// Rows past the current one that must be buffered before emitting.
    pub fn lookahead(&self) -> u64 {
        match self {
            FunctionParams::Shift { offset, .. } if *offset > 0 => *offset as u64,
            _ => 0,
        }
    }
}

/// Everything known about the row being emitted.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub row: &'a [ScalarValue],
    pub info: RowInfo,
    /// Rows buffered so far in the partition.
    pub ingested: u64,
    /// Set once the partition is complete.
    pub partition_rows: Option<u64>,
    /// Exclusive end of the current peer group, once closed.
    pub peer_group_end: Option<u64>,
    /// `None` when the frame has no rows.
    pub frame: Option<FrameRange>,
}

pub(crate) fn evaluate_args(args: &[ArgExpr], row: &[ScalarValue]) -> Result<Vec<ScalarValue>> {
    args.iter().map(|a| a.evaluate(row)).collect()
}

#[derive(Debug)]
pub enum FunctionEvaluator {
    Trivial(RunningAggregate),
    Cumulative(CumulativeAggregate),
    SlidingInverse(SlidingAggregate),
    GeneralRescan(RescanAggregate),
    Positional(PositionalFunction),
}

impl FunctionEvaluator {
    /// Binds `spec` against the input schema. `slot` is the frame buffer
    /// payload slot the function gets if it buffers anything; `store` sizes
    /// any per-function buffer.
    pub fn try_new(
        spec: &WindowFunctionSpec,
        schema: &Schema,
        frame: &FrameSpec,
        registry: &AggregateRegistry,
        slot: usize,
        store: &StoreConfig,
    ) -> Result<Self> {
        let name = match &spec.kind {
            WindowFunctionKind::Aggregate(name) => name,
            kind => {
                let kind = PositionalKind::from_function_kind(kind)?;
                return PositionalFunction::try_new(kind, spec.args.clone(), schema, slot)
                    .map(FunctionEvaluator::Positional);
            }
        };
        let function = registry
            .get(name)
            .ok_or_else(|| WindowError::UnknownFunction(name.clone()))?;
        let arg_types = spec
            .args
            .iter()
            .map(|a| a.data_type(schema))
            .collect::<Result<Vec<DataType>>>()?;
        let aggregate = BoundAggregate::try_new(function, arg_types)?;
        let strategy = classify_aggregate(frame, aggregate.function.as_ref(), &aggregate.signature)?;
        let args = spec.args.clone();
        Ok(match strategy {
            FrameStrategy::Trivial => FunctionEvaluator::Trivial(RunningAggregate::new(aggregate, args)),
            FrameStrategy::Cumulative => {
                FunctionEvaluator::Cumulative(CumulativeAggregate::try_new(aggregate, args, store.clone())?)
            }
            FrameStrategy::SlidingInverse => {
                FunctionEvaluator::SlidingInverse(SlidingAggregate::new(aggregate, args, slot))
            }
            FrameStrategy::GeneralRescan => {
                FunctionEvaluator::GeneralRescan(RescanAggregate::new(aggregate, args, slot))
            }
            FrameStrategy::Positional => {
                return Err(WindowError::internal("aggregate classified as positional"))
            }
        })
    }

    pub fn strategy(&self) -> FrameStrategy {
        match self {
            FunctionEvaluator::Trivial(_) => FrameStrategy::Trivial,
            FunctionEvaluator::Cumulative(_) => FrameStrategy::Cumulative,
            FunctionEvaluator::SlidingInverse(_) => FrameStrategy::SlidingInverse,
            FunctionEvaluator::GeneralRescan(_) => FrameStrategy::GeneralRescan,
            FunctionEvaluator::Positional(_) => FrameStrategy::Positional,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            FunctionEvaluator::Trivial(f) => f.aggregate.name(),
            FunctionEvaluator::Cumulative(f) => f.aggregate.name(),
            FunctionEvaluator::SlidingInverse(f) => f.aggregate.name(),
            FunctionEvaluator::GeneralRescan(f) => f.aggregate.name(),
            FunctionEvaluator::Positional(f) => f.kind().name(),
        }
    }

    pub fn return_type(&self) -> DataType {
        match self {
            FunctionEvaluator::Trivial(f) => f.aggregate.signature.return_type.clone(),
            FunctionEvaluator::Cumulative(f) => f.aggregate.signature.return_type.clone(),
            FunctionEvaluator::SlidingInverse(f) => f.aggregate.signature.return_type.clone(),
            FunctionEvaluator::GeneralRescan(f) => f.aggregate.signature.return_type.clone(),
            FunctionEvaluator::Positional(f) => f.return_type().clone(),
        }
    }

    /// Layout of what the function stores per frame buffer entry.
    pub fn payload_layout(&self) -> Option<PayloadLayout> {
        match self {
            FunctionEvaluator::Trivial(_) | FunctionEvaluator::Cumulative(_) => None,
            FunctionEvaluator::SlidingInverse(f) => {
                Some(PayloadLayout::State(f.aggregate.signature.state_types.clone()))
            }
            FunctionEvaluator::GeneralRescan(f) => Some(PayloadLayout::Args(f.aggregate.arg_types.clone())),
            FunctionEvaluator::Positional(f) => f.payload_layout(),
        }
    }

    /// The function reads its frame edges.
    pub fn needs_frame(&self) -> bool {
        match self {
            FunctionEvaluator::SlidingInverse(_) | FunctionEvaluator::GeneralRescan(_) => true,
            FunctionEvaluator::Positional(f) => f.kind().reads_frame(),
            FunctionEvaluator::Trivial(_) | FunctionEvaluator::Cumulative(_) => false,
        }
    }

    pub fn needs_partition_end(&self) -> bool {
        match self {
            FunctionEvaluator::Positional(f) => f.kind().needs_partition_rows(),
            _ => false,
        }
    }

    pub fn needs_peer_group_end(&self) -> bool {
        matches!(self, FunctionEvaluator::Cumulative(_))
    }

    /// Constant `lag` distance, `None` when the distance varies per row.
    /// Functions that never look back return `Some(0)`.
    pub fn lookbehind(&self) -> Option<u64> {
        match self {
            FunctionEvaluator::Positional(f) => f.lookbehind(),
            _ => Some(0),
        }
    }

    /// Constant `lead` distance; 0 for everything else.
    pub fn constant_lookahead(&self) -> u64 {
        match self {
            FunctionEvaluator::Positional(f) => f.constant_params().map(|p| p.lookahead()).unwrap_or(0),
            _ => 0,
        }
    }

    pub fn row_params(&self, row: &[ScalarValue]) -> Result<FunctionParams> {
        match self {
            FunctionEvaluator::Positional(f) => f.row_params(row),
            _ => Ok(FunctionParams::None),
        }
    }

    /// Payload for the frame buffer entry of an incoming row.
    pub fn buffer_payload(&self, row: &[ScalarValue]) -> Result<Option<Payload>> {
        match self {
            FunctionEvaluator::Trivial(_) | FunctionEvaluator::Cumulative(_) => Ok(None),
            FunctionEvaluator::SlidingInverse(f) => {
                let args = evaluate_args(&f.args, row)?;
                let (not_null, state) = f.aggregate.row_state(&args)?;
                Ok(Some(Payload::State { not_null, state }))
            }
            FunctionEvaluator::GeneralRescan(f) => Ok(Some(Payload::Args(evaluate_args(&f.args, row)?))),
            FunctionEvaluator::Positional(f) => f.buffer_payload(row),
        }
    }

    /// Called for every ingested row, in input order. `closed_group` is the
    /// peer group this row's arrival closed.
    pub fn on_ingest(&mut self, row: &[ScalarValue], closed_group: Option<u64>) -> Result<()> {
        match self {
            FunctionEvaluator::Cumulative(f) => f.ingest(row, closed_group),
            _ => Ok(()),
        }
    }

    pub fn on_partition_end(&mut self, closed_group: Option<u64>) -> Result<()> {
        match self {
            FunctionEvaluator::Cumulative(f) => f.close_group(closed_group),
            _ => Ok(()),
        }
    }

    pub fn evaluate(&mut self, ctx: &EvalContext<'_>, params: &FunctionParams, fb: &mut FrameBuffer) -> Result<ScalarValue> {
        match self {
            FunctionEvaluator::Trivial(f) => f.evaluate(ctx.row),
            FunctionEvaluator::Cumulative(f) => f.evaluate(ctx.info.peer_group),
            FunctionEvaluator::SlidingInverse(f) => f.evaluate(ctx.frame, fb),
            FunctionEvaluator::GeneralRescan(f) => f.evaluate(ctx.frame, fb),
            FunctionEvaluator::Positional(f) => f.evaluate(ctx, params, fb),
        }
    }

    /// Drops all per-partition state.
    pub fn reset(&mut self) -> Result<()> {
        match self {
            FunctionEvaluator::Trivial(f) => f.reset(),
            FunctionEvaluator::Cumulative(f) => return f.reset(),
            FunctionEvaluator::SlidingInverse(f) => f.reset(),
            FunctionEvaluator::GeneralRescan(f) => f.reset(),
            FunctionEvaluator::Positional(_) => {}
        }
        Ok(())
    }
}
