use arrow::datatypes::SchemaRef;
use tracing::{debug, trace};

use crate::common::key::project;
use crate::common::row::{ResultRow, Row, RowSource, WindowOutput};
use crate::config::EngineConfig;
use crate::error::{Result, WindowError};
use crate::window::aggregates::{get_aggregate_registry, AggregateRegistry};
use crate::window::boundary::RowTargets;
use crate::window::codec::BufferEntry;
use crate::window::frame_buffer::FrameBuffer;
use crate::window::functions::{EvalContext, FunctionParams};
use crate::window::input_buffer::InputBuffer;
use crate::window::plan::{WindowPlan, WindowSpec};
use crate::window::readiness::{OutputReadinessGate, RowProgress};
use crate::window::sequencer::{PeerSequencer, RowInfo};

/// The row being emitted: decoded once, then held until its values are produced.
#[derive(Debug)]
struct CurrentRow {
    info: RowInfo,
    row: Row,
    targets: Option<RowTargets>,
    params: Vec<FunctionParams>,
    lookahead: u64,
}

/// Pull-based window function evaluator over one partitioned, ordered input.
///
/// Rows must arrive grouped by the partition columns and sorted by the
/// ordering columns inside each partition. Each call to
/// [`next_output`](Self::next_output) returns the next result row, an
/// end-of-partition marker or end of input.
pub struct WindowEngine<S: RowSource> {
    source: S,
    plan: WindowPlan,
    gate: OutputReadinessGate,
    sequencer: PeerSequencer,
    input: InputBuffer,
    frame_buffer: FrameBuffer,
    /// First row of the next partition, read while finishing the current one.
    pending: Option<Row>,
    current_row: Option<CurrentRow>,
    /// Rows of the current partition read so far.
    ingested: u64,
    /// Index of the next row to emit.
    current: u64,
    partition_complete: bool,
    input_exhausted: bool,
    finished: bool,
    partitions: u64,
}

impl<S: RowSource> std::fmt::Debug for WindowEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowEngine")
            .field("ingested", &self.ingested)
            .field("current", &self.current)
            .field("partition_complete", &self.partition_complete)
            .field("partitions", &self.partitions)
            .finish()
    }
}

impl<S: RowSource> WindowEngine<S> {
    pub fn try_new(schema: SchemaRef, spec: &WindowSpec, config: EngineConfig, source: S) -> Result<Self> {
        Self::try_new_with_registry(schema, spec, config, source, get_aggregate_registry())
    }

    pub fn try_new_with_registry(
        schema: SchemaRef,
        spec: &WindowSpec,
        config: EngineConfig,
        source: S,
        registry: &AggregateRegistry,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| WindowError::Config(format!("{e:#}")))?;
        let plan = WindowPlan::try_new(schema.clone(), spec, registry, &config.frame_buffer)?;
        let input = InputBuffer::try_new(&schema, config.input_buffer)?;
        let frame_buffer = FrameBuffer::new(plan.layout.clone(), config.frame_buffer);
        debug!(
            functions = plan.functions.len(),
            buffered_slots = plan.layout.slots.len(),
            delayed = plan.boundary.is_delayed(),
            "window engine created"
        );
        Ok(Self {
            source,
            gate: OutputReadinessGate::new(plan.requirements),
            sequencer: PeerSequencer::new(plan.sort_options.clone()),
            plan,
            input,
            frame_buffer,
            pending: None,
            current_row: None,
            ingested: 0,
            current: 0,
            partition_complete: false,
            input_exhausted: false,
            finished: false,
            partitions: 0,
        })
    }

    pub fn output_schema(&self) -> SchemaRef {
        self.plan.output_schema.clone()
    }

    pub fn plan(&self) -> &WindowPlan {
        &self.plan
    }

    pub fn next_output(&mut self) -> Result<WindowOutput> {
        loop {
            if self.finished {
                return Ok(WindowOutput::EndOfInput);
            }
            if self.current >= self.ingested {
                if !self.partition_complete {
                    self.pull()?;
                    continue;
                }
                if self.ingested == 0 {
                    self.finished = true;
                    debug!(partitions = self.partitions, "window input finished");
                    return Ok(WindowOutput::EndOfInput);
                }
                self.end_partition()?;
                return Ok(WindowOutput::EndOfPartition);
            }
            if self.current_row.is_none() {
                self.enter_row()?;
            }
            if self.is_ready()? {
                return self.emit().map(WindowOutput::Row);
            }
            if self.partition_complete {
                return Err(WindowError::internal(format!(
                    "row {} not ready after its partition completed",
                    self.current
                )));
            }
            self.pull()?;
        }
    }

    /// Reads one row from upstream, or completes the partition.
    fn pull(&mut self) -> Result<()> {
        if self.input_exhausted {
            return self.complete_partition();
        }
        let next = match self.pending.take() {
            Some(row) => Some(row),
            None => self.source.next_row()?,
        };
        let Some(row) = next else {
            self.input_exhausted = true;
            return self.complete_partition();
        };
        let partition_key = project(&row, &self.plan.partition_by);
        if self.sequencer.is_new_partition(&partition_key) {
            self.pending = Some(row);
            return self.complete_partition();
        }
        self.ingest(partition_key, row)
    }

    fn ingest(&mut self, partition_key: Row, row: Row) -> Result<()> {
        let order_key = project(&row, &self.plan.order_by);
        let sequenced = self.sequencer.next_row(partition_key, order_key.clone())?;
        if sequenced.info.row_index == 0 {
            debug!(partition = self.partitions, "partition started");
        }
        for function in &mut self.plan.functions {
            function.on_ingest(&row, sequenced.closed_group)?;
        }
        if self.plan.uses_frame_buffer() {
            let payloads = self
                .plan
                .functions
                .iter()
                .filter_map(|f| f.buffer_payload(&row).transpose())
                .collect::<Result<Vec<_>>>()?;
            let keys = if self.plan.layout.has_keys() { order_key } else { vec![] };
            self.frame_buffer.append(&BufferEntry { keys, payloads })?;
        }
        self.input.append(&sequenced.info, &row)?;
        self.ingested += 1;

        if let Some(targets) = self.current_row.as_ref().and_then(|c| c.targets.as_ref()) {
            self.plan
                .boundary
                .on_append(&mut self.frame_buffer, targets, self.ingested, false)?;
        }
        Ok(())
    }

    fn complete_partition(&mut self) -> Result<()> {
        if self.partition_complete {
            return Ok(());
        }
        let closed = self.sequencer.finish_partition()?;
        for function in &mut self.plan.functions {
            function.on_partition_end(closed)?;
        }
        self.partition_complete = true;
        if let Some(targets) = self.current_row.as_ref().and_then(|c| c.targets.as_ref()) {
            self.plan
                .boundary
                .on_append(&mut self.frame_buffer, targets, self.ingested, true)?;
        }
        Ok(())
    }

    fn end_partition(&mut self) -> Result<()> {
        debug!(partition = self.partitions, rows = self.ingested, "partition finished");
        self.input.clear()?;
        self.frame_buffer.reset()?;
        self.sequencer.reset();
        for function in &mut self.plan.functions {
            function.reset()?;
        }
        self.current_row = None;
        self.ingested = 0;
        self.current = 0;
        self.partition_complete = false;
        self.partitions += 1;
        Ok(())
    }

    /// Decodes the next row to emit and positions the frame edges for it.
    fn enter_row(&mut self) -> Result<()> {
        let (info, row) = self.input.get(self.current)?;
        let params = self
            .plan
            .functions
            .iter()
            .map(|f| f.row_params(&row))
            .collect::<Result<Vec<_>>>()?;
        let lookahead = params.iter().map(FunctionParams::lookahead).max().unwrap_or(0);

        let targets = if self.plan.needs_edges() {
            let order_key = project(&row, &self.plan.order_by);
            let targets = self.plan.boundary.targets(&row, &order_key, info.row_index)?;
            self.plan.boundary.enter_row(
                &mut self.frame_buffer,
                &targets,
                self.ingested,
                self.partition_complete,
            )?;
            Some(targets)
        } else {
            None
        };
        if self.plan.uses_frame_buffer() && !self.frame_buffer.seek_current(self.current) {
            return Err(WindowError::internal(format!(
                "current row {} missing from frame buffer",
                self.current
            )));
        }
        self.current_row = Some(CurrentRow {
            info,
            row,
            targets,
            params,
            lookahead,
        });
        Ok(())
    }

    fn is_ready(&self) -> Result<bool> {
        let current = self
            .current_row
            .as_ref()
            .ok_or_else(|| WindowError::internal("readiness checked without a current row"))?;
        let progress = RowProgress {
            current: self.current,
            ingested: self.ingested,
            partition_complete: self.partition_complete,
            lead_resolved: self.frame_buffer.edges().lead_resolved,
            peer_group_closed: self.sequencer.is_group_closed(current.info.peer_group),
            frame_empty: current.targets.as_ref().map(|t| t.empty).unwrap_or(false),
            row_lead: current.lookahead,
        };
        Ok(self.gate.is_ready(&progress))
    }

    fn emit(&mut self) -> Result<ResultRow> {
        let current = self
            .current_row
            .take()
            .ok_or_else(|| WindowError::internal("emit without a current row"))?;
        let frame = match &current.targets {
            Some(targets) => self
                .plan
                .boundary
                .frame_range(&mut self.frame_buffer, targets, self.ingested)?,
            None => None,
        };
        let ctx = EvalContext {
            row: &current.row,
            info: current.info,
            ingested: self.ingested,
            partition_rows: self.partition_complete.then_some(self.ingested),
            peer_group_end: self.sequencer.group_end(current.info.peer_group),
            frame,
        };
        let mut values = Vec::with_capacity(self.plan.functions.len());
        for (function, params) in self.plan.functions.iter_mut().zip(&current.params) {
            values.push(function.evaluate(&ctx, params, &mut self.frame_buffer)?);
        }
        self.current += 1;
        self.trim(current.info)?;
        Ok(ResultRow::new(current.row, values))
    }

    /// Drops buffered rows no later row can reach.
    fn trim(&mut self, emitted: RowInfo) -> Result<()> {
        let next = self.current;
        self.input.trim(next)?;
        if self.plan.uses_frame_buffer() && self.plan.trims_frame_buffer() {
            let mut keep = next.saturating_sub(self.plan.max_lag.unwrap_or(0));
            if self.plan.needs_edges() {
                keep = keep.min(self.frame_buffer.edges().trailing.pos);
            }
            self.frame_buffer.trim(keep)?;
        }
        self.sequencer.release_groups_before(emitted.peer_group);
        trace!(next, buffered = self.frame_buffer.len(), "row emitted");
        Ok(())
    }
}

impl<S: RowSource> Iterator for WindowEngine<S> {
    type Item = Result<ResultRow>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.next_output() {
                Ok(WindowOutput::Row(row)) => return Some(Ok(row)),
                Ok(WindowOutput::EndOfPartition) => continue,
                Ok(WindowOutput::EndOfInput) => return None,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
