use datafusion::scalar::ScalarValue;
use tracing::trace;

use crate::common::expr::ArgExpr;
use crate::error::{Result, WindowError};
use crate::config::StoreConfig;
use crate::storage::{PagedSequenceStore, PagedStoreStats, Position, SequenceStore};
use crate::window::aggregates::{AccumulatorState, BoundAggregate};
use crate::window::codec::{check_supported, EntryReader, EntryWriter, Payload};
use crate::window::frame_buffer::{FrameBuffer, FrameRange};
use crate::window::functions::evaluate_args;

/// ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW: rows are folded as they are emitted.
#[derive(Debug, Clone)]
pub struct RunningAggregate {
    pub aggregate: BoundAggregate,
    pub args: Vec<ArgExpr>,
    state: AccumulatorState,
}

impl RunningAggregate {
    pub fn new(aggregate: BoundAggregate, args: Vec<ArgExpr>) -> Self {
        let state = aggregate.initial_state();
        Self { aggregate, args, state }
    }

    pub fn evaluate(&mut self, row: &[ScalarValue]) -> Result<ScalarValue> {
        let args = evaluate_args(&self.args, row)?;
        self.aggregate.accumulate(&mut self.state, &args)?;
        self.aggregate.finalize(&self.state)
    }

    pub fn reset(&mut self) {
        self.state = self.aggregate.initial_state();
    }
}

/// RANGE BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW: every peer reports the
/// running value as of the last row of its peer group.
///
/// Group values wait in their own paged store until output moves past the
/// group, so a long lead between ingest and output spills instead of growing
/// in memory.
#[derive(Debug)]
pub struct CumulativeAggregate {
    pub aggregate: BoundAggregate,
    pub args: Vec<ArgExpr>,
    state: AccumulatorState,
    /// `(peer group, finalized value)` per closed group not yet emitted past.
    snapshots: PagedSequenceStore,
    /// Decoded copy of the oldest snapshot.
    front: Option<(u64, ScalarValue)>,
}

impl CumulativeAggregate {
    pub fn try_new(aggregate: BoundAggregate, args: Vec<ArgExpr>, config: StoreConfig) -> Result<Self> {
        check_supported(&aggregate.signature.return_type)?;
        let state = aggregate.initial_state();
        Ok(Self {
            aggregate,
            args,
            state,
            snapshots: PagedSequenceStore::new(config),
            front: None,
        })
    }

    /// Folds an ingested row. A row that closes a peer group is folded after
    /// that group's value is taken.
    pub fn ingest(&mut self, row: &[ScalarValue], closed_group: Option<u64>) -> Result<()> {
        self.close_group(closed_group)?;
        let args = evaluate_args(&self.args, row)?;
        self.aggregate.accumulate(&mut self.state, &args)?;
        Ok(())
    }

    pub fn close_group(&mut self, group: Option<u64>) -> Result<()> {
        if let Some(group) = group {
            let value = self.aggregate.finalize(&self.state)?;
            let mut writer = EntryWriter::new();
            writer.write_u64(group);
            writer.write_value(&self.aggregate.signature.return_type, &value)?;
            self.snapshots.append(writer.finish())?;
        }
        Ok(())
    }

    fn load_front(&mut self) -> Result<()> {
        if self.front.is_some() {
            return Ok(());
        }
        let first = self.snapshots.first_position();
        if let Some(record) = self.snapshots.get(first)? {
            let mut reader = EntryReader::new(&record);
            let group = reader.read_u64()?;
            let value = reader.read_value(&self.aggregate.signature.return_type)?;
            self.front = Some((group, value));
        }
        Ok(())
    }

    pub fn evaluate(&mut self, peer_group: u64) -> Result<ScalarValue> {
        loop {
            self.load_front()?;
            let passed = matches!(&self.front, Some((group, _)) if *group < peer_group);
            if !passed {
                break;
            }
            let first = self.snapshots.first_position();
            self.snapshots.trim(first + 1)?;
            self.front = None;
        }
        match &self.front {
            Some((group, value)) if *group == peer_group => Ok(value.clone()),
            _ => Err(WindowError::internal(format!(
                "no running value for peer group {peer_group}"
            ))),
        }
    }

    /// Groups closed but not yet emitted past.
    pub fn pending_groups(&self) -> usize {
        self.snapshots.len()
    }

    pub fn snapshot_stats(&self) -> PagedStoreStats {
        self.snapshots.stats()
    }

    pub fn reset(&mut self) -> Result<()> {
        self.state = self.aggregate.initial_state();
        self.front = None;
        self.snapshots.clear()
    }
}

/// Folds buffered partial states into `state`, tracking how many non-NULL rows are in it.
#[derive(Debug, Clone)]
struct FrameState {
    state: AccumulatorState,
    not_null: u64,
    /// Buffer positions `[start, end)` currently folded in.
    window: Option<(Position, Position)>,
}

impl FrameState {
    fn new(aggregate: &BoundAggregate) -> Self {
        Self {
            state: aggregate.initial_state(),
            not_null: 0,
            window: None,
        }
    }

    fn clear(&mut self, aggregate: &BoundAggregate) {
        *self = Self::new(aggregate);
    }

    fn result(&self, aggregate: &BoundAggregate) -> Result<ScalarValue> {
        if self.not_null == 0 {
            aggregate.empty_result()
        } else {
            aggregate.finalize(&self.state)
        }
    }
}

/// Bounded frame over an aggregate with combine and inverse combine.
///
/// Each buffer entry holds one row's partial state. Rows entering the frame
/// are combined, rows leaving it are removed with the inverse.
#[derive(Debug, Clone)]
pub struct SlidingAggregate {
    pub aggregate: BoundAggregate,
    pub args: Vec<ArgExpr>,
    pub slot: usize,
    frame: FrameState,
}

impl SlidingAggregate {
    pub fn new(aggregate: BoundAggregate, args: Vec<ArgExpr>, slot: usize) -> Self {
        let frame = FrameState::new(&aggregate);
        Self {
            aggregate,
            args,
            slot,
            frame,
        }
    }

    fn partial(&self, fb: &mut FrameBuffer, pos: Position) -> Result<(u64, AccumulatorState)> {
        match fb.payload(pos, self.slot)? {
            Payload::State { not_null, state } => Ok((not_null, state)),
            other => Err(WindowError::internal(format!(
                "expected partial state at {pos}, found {other:?}"
            ))),
        }
    }

    fn add(&mut self, fb: &mut FrameBuffer, pos: Position) -> Result<()> {
        let (not_null, partial) = self.partial(fb, pos)?;
        if not_null > 0 {
            self.aggregate.function.combine(&mut self.frame.state, &partial)?;
            self.frame.not_null += not_null;
        }
        Ok(())
    }

    fn remove(&mut self, fb: &mut FrameBuffer, pos: Position) -> Result<()> {
        let (not_null, partial) = self.partial(fb, pos)?;
        if not_null > 0 {
            self.aggregate.function.inverse_combine(&mut self.frame.state, &partial)?;
            self.frame.not_null = self.frame.not_null.checked_sub(not_null).ok_or_else(|| {
                WindowError::internal(format!("removed entry {pos} that was never added"))
            })?;
        }
        Ok(())
    }

    pub fn evaluate(&mut self, frame: Option<FrameRange>, fb: &mut FrameBuffer) -> Result<ScalarValue> {
        let Some(frame) = frame else {
            return self.aggregate.empty_result();
        };
        let (start, end) = (frame.start, frame.end + 1);
        let first = fb.first_position();
        match self.frame.window {
            Some((s, e)) if s >= first && s <= start && start <= e && e <= end => {
                for pos in s..start {
                    self.remove(fb, pos)?;
                }
                for pos in e..end {
                    self.add(fb, pos)?;
                }
            }
            _ => {
                trace!(start, end, "sliding aggregate restarts");
                self.frame.clear(&self.aggregate);
                for pos in start..end {
                    self.add(fb, pos)?;
                }
            }
        }
        self.frame.window = Some((start, end));
        self.frame.result(&self.aggregate)
    }

    pub fn reset(&mut self) {
        self.frame.clear(&self.aggregate);
    }
}

/// Bounded frame over an aggregate with combine only. Buffer entries hold raw
/// arguments; the frame is refolded unless it only grew at the leading side.
#[derive(Debug, Clone)]
pub struct RescanAggregate {
    pub aggregate: BoundAggregate,
    pub args: Vec<ArgExpr>,
    pub slot: usize,
    frame: FrameState,
}

impl RescanAggregate {
    pub fn new(aggregate: BoundAggregate, args: Vec<ArgExpr>, slot: usize) -> Self {
        let frame = FrameState::new(&aggregate);
        Self {
            aggregate,
            args,
            slot,
            frame,
        }
    }

    fn fold(&mut self, fb: &mut FrameBuffer, pos: Position) -> Result<()> {
        let args = match fb.payload(pos, self.slot)? {
            Payload::Args(args) => args,
            other => {
                return Err(WindowError::internal(format!(
                    "expected arguments at {pos}, found {other:?}"
                )))
            }
        };
        let (not_null, partial) = self.aggregate.row_state(&args)?;
        if not_null > 0 {
            self.aggregate.function.combine(&mut self.frame.state, &partial)?;
            self.frame.not_null += not_null;
        }
        Ok(())
    }

    pub fn evaluate(&mut self, frame: Option<FrameRange>, fb: &mut FrameBuffer) -> Result<ScalarValue> {
        let Some(frame) = frame else {
            return self.aggregate.empty_result();
        };
        let (start, end) = (frame.start, frame.end + 1);
        let from = match self.frame.window {
            Some((s, e)) if s == start && e <= end => e,
            _ => {
                self.frame.clear(&self.aggregate);
                start
            }
        };
        for pos in from..end {
            self.fold(fb, pos)?;
        }
        self.frame.window = Some((start, end));
        self.frame.result(&self.aggregate)
    }

    pub fn reset(&mut self) {
        self.frame.clear(&self.aggregate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::aggregates::get_aggregate_registry;
    use crate::window::codec::{BufferEntry, EntryLayout, PayloadLayout};
    use arrow::datatypes::DataType;

    fn bound(name: &str) -> BoundAggregate {
        let function = get_aggregate_registry().get(name).unwrap();
        BoundAggregate::try_new(function, vec![DataType::Int64]).unwrap()
    }

    fn values() -> Vec<ScalarValue> {
        [Some(1), None, Some(3), Some(4), None, None, Some(7)]
            .into_iter()
            .map(ScalarValue::Int64)
            .collect()
    }

    fn range(start: u64, end: u64) -> Option<FrameRange> {
        Some(FrameRange { start, end })
    }

    #[test]
    fn test_sliding_matches_direct_sums() {
        let agg = bound("sum");
        let layout = EntryLayout::try_new(vec![], vec![PayloadLayout::State(agg.signature.state_types.clone())])
            .unwrap();
        let mut fb = FrameBuffer::new(layout, StoreConfig::default());
        for v in values() {
            let (not_null, state) = agg.row_state(&[v]).unwrap();
            fb.append(&BufferEntry { keys: vec![], payloads: vec![Payload::State { not_null, state }] })
                .unwrap();
        }
        let mut sliding = SlidingAggregate::new(agg, vec![ArgExpr::column(0)], 0);
        let got: Vec<ScalarValue> = [range(0, 1), range(0, 2), range(1, 3), range(4, 5), range(4, 6), None, range(6, 6)]
            .into_iter()
            .map(|f| sliding.evaluate(f, &mut fb).unwrap())
            .collect();
        let want: Vec<ScalarValue> = [Some(1), Some(4), Some(7), None, Some(7), None, Some(7)]
            .into_iter()
            .map(ScalarValue::Int64)
            .collect();
        assert_eq!(got, want);
    }

    #[test]
    fn test_rescan_min() {
        let agg = bound("min");
        let layout = EntryLayout::try_new(vec![], vec![PayloadLayout::Args(vec![DataType::Int64])]).unwrap();
        let mut fb = FrameBuffer::new(layout, StoreConfig::default());
        for v in values() {
            fb.append(&BufferEntry { keys: vec![], payloads: vec![Payload::Args(vec![v])] }).unwrap();
        }
        let mut rescan = RescanAggregate::new(agg, vec![ArgExpr::column(0)], 0);
        let got: Vec<ScalarValue> = [range(0, 0), range(0, 3), range(2, 3), range(4, 5), range(4, 6)]
            .into_iter()
            .map(|f| rescan.evaluate(f, &mut fb).unwrap())
            .collect();
        let want: Vec<ScalarValue> = [Some(1), Some(1), Some(3), None, Some(7)]
            .into_iter()
            .map(ScalarValue::Int64)
            .collect();
        assert_eq!(got, want);
    }

    #[test]
    fn test_cumulative_reports_group_value() {
        let agg = bound("sum");
        let mut cumulative = CumulativeAggregate::try_new(agg, vec![ArgExpr::column(0)], StoreConfig::default()).unwrap();
        // groups: [1, 2] [3] [4]
        cumulative.ingest(&[ScalarValue::Int64(Some(1))], None).unwrap();
        cumulative.ingest(&[ScalarValue::Int64(Some(2))], None).unwrap();
        cumulative.ingest(&[ScalarValue::Int64(Some(3))], Some(0)).unwrap();
        cumulative.ingest(&[ScalarValue::Int64(Some(4))], Some(1)).unwrap();
        cumulative.close_group(Some(2)).unwrap();

        assert_eq!(cumulative.evaluate(0).unwrap(), ScalarValue::Int64(Some(3)));
        assert_eq!(cumulative.evaluate(0).unwrap(), ScalarValue::Int64(Some(3)));
        assert_eq!(cumulative.evaluate(1).unwrap(), ScalarValue::Int64(Some(6)));
        assert_eq!(cumulative.evaluate(2).unwrap(), ScalarValue::Int64(Some(10)));
        assert!(cumulative.evaluate(3).is_err());
    }

    #[test]
    fn test_cumulative_values_spill() {
        let agg = bound("sum");
        // ~24 bytes per snapshot: two per page, two pages resident
        let config = StoreConfig::new(48, 96);
        let mut cumulative = CumulativeAggregate::try_new(agg, vec![ArgExpr::column(0)], config).unwrap();
        for i in 0..200i64 {
            let closed = (i > 0).then(|| (i - 1) as u64);
            cumulative.ingest(&[ScalarValue::Int64(Some(i))], closed).unwrap();
        }
        cumulative.close_group(Some(199)).unwrap();
        assert_eq!(cumulative.pending_groups(), 200);
        let stats = cumulative.snapshot_stats();
        assert!(stats.spills > 0);
        assert!(stats.resident_bytes <= 96);

        for group in 0..200u64 {
            let g = group as i64;
            let want = ScalarValue::Int64(Some(g * (g + 1) / 2));
            assert_eq!(cumulative.evaluate(group).unwrap(), want);
            assert_eq!(cumulative.evaluate(group).unwrap(), want);
        }
        assert_eq!(cumulative.pending_groups(), 1);

        cumulative.reset().unwrap();
        assert_eq!(cumulative.pending_groups(), 0);
        assert!(cumulative.evaluate(0).is_err());
    }
}
