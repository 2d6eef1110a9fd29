use std::cmp::Ordering;

use arrow::compute::SortOptions;
use arrow::datatypes::{DataType, Schema};
use datafusion::scalar::ScalarValue;
use tracing::trace;

use crate::common::expr::ArgExpr;
use crate::common::key::sorts_before;
use crate::common::scalar_utils::{integer_param, is_float_type, is_integer_type, scalar_to_i64};
use crate::error::{Result, WindowError};
use crate::storage::Cursor;
use crate::window::frame::{FrameBound, FrameMode, FrameSpec};
use crate::window::frame_buffer::{FrameBuffer, FrameRange};

#[derive(Debug, Clone, PartialEq)]
pub enum BoundOffset {
    /// Validated (and for RANGE, cast to the ordering key type) at setup.
    Constant(ScalarValue),
    /// Re-evaluated on every row.
    Delayed {
        expr: ArgExpr,
        cast_to: Option<DataType>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedBound {
    UnboundedPreceding,
    Preceding(BoundOffset),
    CurrentRow,
    Following(BoundOffset),
    UnboundedFollowing,
}

impl ResolvedBound {
    fn offset(&self) -> Option<&BoundOffset> {
        match self {
            ResolvedBound::Preceding(o) | ResolvedBound::Following(o) => Some(o),
            _ => None,
        }
    }
}

/// Where an edge of the current row's frame lies.
#[derive(Debug, Clone, PartialEq)]
pub enum EdgeTarget {
    /// Before the first row of the partition.
    PartitionStart,
    /// After the last row of the partition.
    PartitionEnd,
    /// A row index; may fall outside the partition.
    Row(i64),
    /// An ordering key value: trailing is the first row not sorting before
    /// it, leading is the last row it does not sort before.
    Key(Vec<ScalarValue>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowTargets {
    pub trailing: EdgeTarget,
    pub leading: EdgeTarget,
    /// The bound offsets alone prove the frame has no rows.
    pub empty: bool,
}

/// Frame bounds resolved against the input schema, plus the edge movement
/// logic over a [`FrameBuffer`].
#[derive(Debug, Clone)]
pub struct BoundaryEvaluator {
    mode: FrameMode,
    start: ResolvedBound,
    end: ResolvedBound,
    sort_options: Vec<SortOptions>,
    delayed: bool,
    static_empty: bool,
}

impl BoundaryEvaluator {
    pub fn try_new(
        frame: &FrameSpec,
        schema: &Schema,
        order_types: &[DataType],
        sort_options: Vec<SortOptions>,
    ) -> Result<Self> {
        frame.check_shape().map_err(WindowError::InvalidFrame)?;
        let range_key_type = match frame.mode {
            FrameMode::Range if frame.has_offset() => {
                if order_types.len() != 1 {
                    return Err(WindowError::InvalidFrame(format!(
                        "RANGE with offset PRECEDING/FOLLOWING requires exactly one ORDER BY column, got {}",
                        order_types.len()
                    )));
                }
                Some(order_types[0].clone())
            }
            _ => None,
        };

        let start = resolve_bound(&frame.start, frame.mode, range_key_type.as_ref(), schema, "starting")?;
        let end = resolve_bound(&frame.end, frame.mode, range_key_type.as_ref(), schema, "ending")?;
        let static_empty = match (start.offset(), end.offset()) {
            (Some(BoundOffset::Constant(a)), Some(BoundOffset::Constant(b))) => {
                pair_is_empty(&start, &end, a, b)
            }
            _ => false,
        };

        Ok(Self {
            mode: frame.mode,
            start,
            end,
            sort_options,
            delayed: frame.has_delayed_bound(),
            static_empty,
        })
    }

    pub fn mode(&self) -> FrameMode {
        self.mode
    }

    pub fn is_delayed(&self) -> bool {
        self.delayed
    }

    pub fn is_statically_empty(&self) -> bool {
        self.static_empty
    }

    pub fn start(&self) -> &ResolvedBound {
        &self.start
    }

    pub fn end(&self) -> &ResolvedBound {
        &self.end
    }

    /// Evaluates both bounds for the row at `row_index`.
    pub fn targets(&self, row: &[ScalarValue], order_key: &[ScalarValue], row_index: u64) -> Result<RowTargets> {
        let start_offset = self.offset_value(&self.start, row, "starting")?;
        let end_offset = self.offset_value(&self.end, row, "ending")?;
        let empty = self.static_empty
            || match (&start_offset, &end_offset) {
                (Some(a), Some(b)) if self.delayed => pair_is_empty(&self.start, &self.end, a, b),
                _ => false,
            };
        Ok(RowTargets {
            trailing: self.target(&self.start, start_offset.as_ref(), order_key, row_index),
            leading: self.target(&self.end, end_offset.as_ref(), order_key, row_index),
            empty,
        })
    }

    fn offset_value(&self, bound: &ResolvedBound, row: &[ScalarValue], edge: &str) -> Result<Option<ScalarValue>> {
        match bound.offset() {
            None => Ok(None),
            Some(BoundOffset::Constant(v)) => Ok(Some(v.clone())),
            Some(BoundOffset::Delayed { expr, cast_to }) => {
                let value = expr.evaluate(row)?;
                check_offset(&value, self.mode, edge)?;
                Ok(Some(cast_offset(value, cast_to.as_ref())?))
            }
        }
    }

    fn target(&self, bound: &ResolvedBound, offset: Option<&ScalarValue>, order_key: &[ScalarValue], row_index: u64) -> EdgeTarget {
        let r = row_index as i64;
        let rows = |v: Option<&ScalarValue>| v.and_then(scalar_to_i64).unwrap_or(i64::MAX);
        match (self.mode, bound) {
            (_, ResolvedBound::UnboundedPreceding) => EdgeTarget::PartitionStart,
            (_, ResolvedBound::UnboundedFollowing) => EdgeTarget::PartitionEnd,
            (FrameMode::Rows, ResolvedBound::CurrentRow) => EdgeTarget::Row(r),
            (FrameMode::Rows, ResolvedBound::Preceding(_)) => EdgeTarget::Row(r.saturating_sub(rows(offset))),
            (FrameMode::Rows, ResolvedBound::Following(_)) => EdgeTarget::Row(r.saturating_add(rows(offset))),
            (FrameMode::Range, ResolvedBound::CurrentRow) => EdgeTarget::Key(order_key.to_vec()),
            (FrameMode::Range, ResolvedBound::Preceding(_)) => self.range_target(order_key, offset, true),
            (FrameMode::Range, ResolvedBound::Following(_)) => self.range_target(order_key, offset, false),
        }
    }

    /// `key - offset` or `key + offset` in sort order. Overflow saturates to
    /// the partition edge on that side; a NULL key frames its NULL peers.
    fn range_target(&self, order_key: &[ScalarValue], offset: Option<&ScalarValue>, preceding: bool) -> EdgeTarget {
        let saturated = if preceding {
            EdgeTarget::PartitionStart
        } else {
            EdgeTarget::PartitionEnd
        };
        let (Some(key), Some(offset)) = (order_key.first(), offset) else {
            return saturated;
        };
        if key.is_null() {
            return EdgeTarget::Key(vec![key.clone()]);
        }
        let descending = self.sort_options.first().map(|o| o.descending).unwrap_or(false);
        let computed = if preceding != descending {
            key.sub_checked(offset)
        } else {
            key.add_checked(offset)
        };
        let key_type = key.data_type();
        let bound = computed.ok().filter(|v| !v.is_null()).and_then(|v| {
            if v.data_type() == key_type {
                Some(v)
            } else {
                v.cast_to(&key_type).ok()
            }
        });
        match bound {
            Some(v) => EdgeTarget::Key(vec![v]),
            None => saturated,
        }
    }

    /// Starts evaluating a new current row.
    pub fn enter_row(&self, fb: &mut FrameBuffer, targets: &RowTargets, ingested: u64, complete: bool) -> Result<()> {
        if self.delayed {
            let first = fb.first_position();
            fb.edges.trailing = Cursor::at(first);
            fb.edges.leading = Cursor::invalid();
            fb.edges.scan_next = first;
        }
        fb.edges.lead_resolved = false;
        self.scan_leading(fb, targets, ingested, complete)
    }

    /// Moves the leading edge over entries appended since the last call.
    pub fn on_append(&self, fb: &mut FrameBuffer, targets: &RowTargets, ingested: u64, complete: bool) -> Result<()> {
        self.scan_leading(fb, targets, ingested, complete)
    }

    fn scan_leading(&self, fb: &mut FrameBuffer, targets: &RowTargets, ingested: u64, complete: bool) -> Result<()> {
        let (leading, resolved) = match &targets.leading {
            EdgeTarget::PartitionStart => (None, true),
            EdgeTarget::PartitionEnd => (ingested.checked_sub(1), complete),
            EdgeTarget::Row(i) if *i < 0 => (None, true),
            EdgeTarget::Row(i) if (*i as u64) < ingested => (Some(*i as u64), true),
            EdgeTarget::Row(_) => (ingested.checked_sub(1), complete),
            EdgeTarget::Key(bound) => {
                let mut next = fb.edges.scan_next.max(fb.first_position());
                let mut resolved = fb.edges.lead_resolved;
                while !resolved && next < ingested {
                    let key = fb.keys_at(next)?;
                    if sorts_before(bound, &key, &self.sort_options) {
                        resolved = true;
                    } else {
                        next += 1;
                    }
                }
                fb.edges.scan_next = next;
                (next.checked_sub(1), resolved || complete)
            }
        };
        fb.edges.leading = leading.map(Cursor::at).unwrap_or_default();
        fb.edges.lead_resolved = resolved;
        Ok(())
    }

    /// Final frame of the current row once its leading edge is resolved.
    /// `None` means the frame has no rows.
    pub fn frame_range(&self, fb: &mut FrameBuffer, targets: &RowTargets, ingested: u64) -> Result<Option<FrameRange>> {
        let leading = fb.edges.leading.position();
        let first = fb.first_position();
        let trailing = match &targets.trailing {
            EdgeTarget::PartitionStart => 0,
            EdgeTarget::PartitionEnd => ingested,
            EdgeTarget::Row(i) => (*i).max(0) as u64,
            EdgeTarget::Key(bound) => {
                let limit = leading.map(|l| l + 1).unwrap_or(0).min(ingested);
                let mut pos = fb.edges.trailing.pos.max(first);
                while pos < limit {
                    let key = fb.keys_at(pos)?;
                    if sorts_before(&key, bound, &self.sort_options) {
                        pos += 1;
                    } else {
                        break;
                    }
                }
                pos
            }
        };
        fb.edges.trailing = Cursor::at(trailing);

        let Some(leading) = leading else {
            return Ok(None);
        };
        if targets.empty || trailing > leading {
            return Ok(None);
        }
        if trailing < first {
            return Err(WindowError::internal(format!(
                "frame start {trailing} already trimmed (buffer starts at {first})"
            )));
        }
        trace!(trailing, leading, "frame edges");
        Ok(Some(FrameRange {
            start: trailing,
            end: leading,
        }))
    }
}

fn mode_name(mode: FrameMode) -> &'static str {
    match mode {
        FrameMode::Rows => "ROWS",
        FrameMode::Range => "RANGE",
    }
}

fn check_offset(value: &ScalarValue, mode: FrameMode, edge: &str) -> Result<()> {
    if value.is_null() {
        return Err(WindowError::InvalidParameter(format!(
            "{} frame {edge} offset cannot be NULL",
            mode_name(mode)
        )));
    }
    let negative = match mode {
        FrameMode::Rows => integer_param(value, "ROWS frame offset")?.map(|v| v < 0).unwrap_or(false),
        FrameMode::Range => is_negative(value),
    };
    if negative {
        return Err(WindowError::InvalidParameter(format!(
            "{} frame {edge} offset cannot be negative",
            mode_name(mode)
        )));
    }
    Ok(())
}

fn is_negative(value: &ScalarValue) -> bool {
    if let Some(v) = scalar_to_i64(value) {
        return v < 0;
    }
    match ScalarValue::new_zero(&value.data_type()) {
        Ok(zero) => value.partial_cmp(&zero) == Some(Ordering::Less),
        Err(_) => false,
    }
}

fn cast_offset(value: ScalarValue, cast_to: Option<&DataType>) -> Result<ScalarValue> {
    match cast_to {
        Some(dt) if value.data_type() != *dt => value.cast_to(dt).map_err(|e| {
            WindowError::IncompatibleBoundTypes(format!("cannot cast RANGE offset to {dt}: {e}"))
        }),
        _ => Ok(value),
    }
}

/// Type RANGE offsets are cast to before being applied to the ordering key.
fn range_offset_cast(key_type: &DataType, offset_type: &DataType) -> Result<Option<DataType>> {
    let compatible_cast = match key_type {
        k if is_integer_type(k) => is_integer_type(offset_type).then(|| Some(k.clone())),
        k if is_float_type(k) => (is_integer_type(offset_type) || is_float_type(offset_type))
            .then(|| Some(k.clone())),
        DataType::Decimal128(_, _) => (is_integer_type(offset_type)
            || matches!(offset_type, DataType::Decimal128(_, _)))
        .then(|| Some(key_type.clone())),
        DataType::Date32 | DataType::Date64 => {
            matches!(offset_type, DataType::Interval(_)).then_some(None)
        }
        DataType::Timestamp(_, _) => {
            matches!(offset_type, DataType::Interval(_) | DataType::Duration(_)).then_some(None)
        }
        _ => None,
    };
    compatible_cast.ok_or_else(|| {
        WindowError::IncompatibleBoundTypes(format!(
            "RANGE offset of type {offset_type} cannot be applied to ordering key of type {key_type}"
        ))
    })
}

fn resolve_bound(
    bound: &FrameBound,
    mode: FrameMode,
    range_key_type: Option<&DataType>,
    schema: &Schema,
    edge: &str,
) -> Result<ResolvedBound> {
    let resolve = |expr: &ArgExpr| -> Result<BoundOffset> {
        let cast_to = match mode {
            FrameMode::Rows => {
                let dt = expr.data_type(schema)?;
                if !is_integer_type(&dt) && dt != DataType::Null {
                    return Err(WindowError::InvalidFrame(format!(
                        "ROWS frame {edge} offset must be an integer, got {dt}"
                    )));
                }
                None
            }
            FrameMode::Range => {
                let dt = expr.data_type(schema)?;
                match (range_key_type, dt) {
                    (_, DataType::Null) => None,
                    (Some(key_type), dt) => range_offset_cast(key_type, &dt)?,
                    (None, _) => None,
                }
            }
        };
        match expr.constant_value() {
            Some(value) => {
                check_offset(&value, mode, edge)?;
                Ok(BoundOffset::Constant(cast_offset(value, cast_to.as_ref())?))
            }
            None => Ok(BoundOffset::Delayed {
                expr: expr.clone(),
                cast_to,
            }),
        }
    };
    Ok(match bound {
        FrameBound::UnboundedPreceding => ResolvedBound::UnboundedPreceding,
        FrameBound::Preceding(expr) => ResolvedBound::Preceding(resolve(expr)?),
        FrameBound::CurrentRow => ResolvedBound::CurrentRow,
        FrameBound::Following(expr) => ResolvedBound::Following(resolve(expr)?),
        FrameBound::UnboundedFollowing => ResolvedBound::UnboundedFollowing,
    })
}

fn offset_cmp(a: &ScalarValue, b: &ScalarValue) -> Option<Ordering> {
    match (scalar_to_i64(a), scalar_to_i64(b)) {
        (Some(x), Some(y)) => Some(x.cmp(&y)),
        _ => a.partial_cmp(b),
    }
}

/// Both bounds on the same side of the current row, with the start past the end.
fn pair_is_empty(start: &ResolvedBound, end: &ResolvedBound, a: &ScalarValue, b: &ScalarValue) -> bool {
    match (start, end) {
        (ResolvedBound::Preceding(_), ResolvedBound::Preceding(_)) => {
            offset_cmp(a, b) == Some(Ordering::Less)
        }
        (ResolvedBound::Following(_), ResolvedBound::Following(_)) => {
            offset_cmp(a, b) == Some(Ordering::Greater)
        }
        _ => false,
    }
}
