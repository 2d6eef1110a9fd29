use datafusion::scalar::ScalarValue;
use tracing::trace;

use crate::config::StoreConfig;
use crate::error::{Result, WindowError};
use crate::storage::{Cursor, PagedSequenceStore, Position, SequenceStore};
use crate::window::codec::{BufferEntry, EntryLayout, Payload};

/// Edge cursors of the row currently being evaluated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EdgeCursors {
    /// First row of the frame (a lower bound until the frame is computed).
    pub trailing: Cursor,
    /// Last row known to be in the frame; invalid while no row qualifies.
    pub leading: Cursor,
    /// Next entry the leading scan will examine.
    pub scan_next: Position,
    /// No later row can join the frame.
    pub lead_resolved: bool,
}

/// Inclusive range of frame buffer positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRange {
    pub start: Position,
    pub end: Position,
}

impl FrameRange {
    pub fn rows(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn contains(&self, pos: Position) -> bool {
        pos >= self.start && pos <= self.end
    }
}

/// Serialized per-row frame entries of the current partition plus the
/// cursors the boundary evaluator moves over them.
#[derive(Debug)]
pub struct FrameBuffer {
    store: PagedSequenceStore,
    layout: EntryLayout,
    pub(crate) edges: EdgeCursors,
    current: Cursor,
}

impl FrameBuffer {
    pub fn new(layout: EntryLayout, config: StoreConfig) -> Self {
        Self {
            store: PagedSequenceStore::new(config),
            layout,
            edges: EdgeCursors::default(),
            current: Cursor::invalid(),
        }
    }

    pub fn layout(&self) -> &EntryLayout {
        &self.layout
    }

    pub fn edges(&self) -> &EdgeCursors {
        &self.edges
    }

    pub fn append(&mut self, entry: &BufferEntry) -> Result<Position> {
        let record = self.layout.encode(entry)?;
        self.store.append(record)
    }

    fn record(&mut self, pos: Position) -> Result<bytes::Bytes> {
        self.store
            .get(pos)?
            .ok_or_else(|| WindowError::internal(format!("required buffered entry {pos} missing")))
    }

    pub fn entry(&mut self, pos: Position) -> Result<BufferEntry> {
        let record = self.record(pos)?;
        self.layout.decode(&record)
    }

    pub fn keys_at(&mut self, pos: Position) -> Result<Vec<ScalarValue>> {
        let record = self.record(pos)?;
        self.layout.decode_keys(&record)
    }

    pub fn payload(&mut self, pos: Position, slot: usize) -> Result<Payload> {
        let record = self.record(pos)?;
        self.layout.decode_slot(&record, slot)
    }

    /// Points the current-row cursor at `pos`.
    pub fn seek_current(&mut self, pos: Position) -> bool {
        let mut cursor = self.current;
        let valid = self.store.seek(&mut cursor, pos);
        self.current = cursor;
        valid
    }

    pub fn current(&self) -> Cursor {
        self.current
    }

    /// Payload of the entry `offset` rows away from the current row.
    /// The caller checks the target lies inside the partition.
    pub fn payload_at_offset(&mut self, offset: i64, slot: usize) -> Result<Payload> {
        let mut cursor = self.current;
        if !self.store.advance(&mut cursor, offset) {
            return Err(WindowError::internal(format!(
                "required buffered entry at offset {offset} from {} missing",
                self.current.pos
            )));
        }
        let record = self
            .store
            .current(&cursor)?
            .ok_or_else(|| WindowError::internal("required buffered entry missing"))?;
        self.layout.decode_slot(&record, slot)
    }

    pub fn trim(&mut self, before: Position) -> Result<()> {
        if before > self.store.first_position() {
            trace!(before, "trimming frame buffer");
            self.store.trim(before)?;
        }
        Ok(())
    }

    pub fn reset(&mut self) -> Result<()> {
        self.edges = EdgeCursors::default();
        self.current = Cursor::invalid();
        self.store.clear()
    }

    pub fn first_position(&self) -> Position {
        self.store.first_position()
    }

    pub fn end_position(&self) -> Position {
        self.store.end_position()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}
