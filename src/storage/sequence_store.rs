use bytes::Bytes;

use crate::error::Result;

/// Position of a record inside a sequence store. Positions restart at 0 after `clear`.
pub type Position = u64;

/// A position plus a validity flag. Cursors are plain values: copying one
/// remembers a position that can later be restored with `seek`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    pub pos: Position,
    pub valid: bool,
}

impl Cursor {
    pub fn invalid() -> Self {
        Self::default()
    }

    pub fn at(pos: Position) -> Self {
        Self { pos, valid: true }
    }

    pub fn position(&self) -> Option<Position> {
        self.valid.then_some(self.pos)
    }

    pub fn invalidate(&mut self) {
        self.valid = false;
    }
}

/// Ordered collection of opaque byte records with positional access.
///
/// Records live in `[first_position, end_position)`; everything before
/// `first_position` has been trimmed and is gone for good.
pub trait SequenceStore: Send {
    fn append(&mut self, record: Bytes) -> Result<Position>;

    /// Points `cursor` at `pos`. Returns whether `pos` holds a live record.
    fn seek(&self, cursor: &mut Cursor, pos: Position) -> bool {
        cursor.pos = pos;
        cursor.valid = pos >= self.first_position() && pos < self.end_position();
        cursor.valid
    }

    /// Moves a valid cursor by `n` records (negative is backwards). On failure
    /// the cursor is invalidated and keeps its old position.
    fn advance(&self, cursor: &mut Cursor, n: i64) -> bool {
        if !cursor.valid {
            return false;
        }
        let target = cursor.pos as i128 + n as i128;
        if target < self.first_position() as i128 || target >= self.end_position() as i128 {
            cursor.valid = false;
            return false;
        }
        cursor.pos = target as Position;
        true
    }

    fn current(&mut self, cursor: &Cursor) -> Result<Option<Bytes>> {
        if !cursor.valid {
            return Ok(None);
        }
        self.get(cursor.pos)
    }

    fn get(&mut self, pos: Position) -> Result<Option<Bytes>>;

    /// Drops every record before `before`.
    fn trim(&mut self, before: Position) -> Result<()>;

    /// Drops everything and restarts positions at 0.
    fn clear(&mut self) -> Result<()>;

    fn first_position(&self) -> Position;

    fn end_position(&self) -> Position;

    fn len(&self) -> usize {
        (self.end_position() - self.first_position()) as usize
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
