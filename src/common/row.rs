use std::collections::VecDeque;

use datafusion::scalar::ScalarValue;

use crate::error::Result;

/// One input row: a value per column of the input schema.
pub type Row = Vec<ScalarValue>;

/// Upstream row source, pulled one row at a time.
///
/// Rows must arrive grouped by partition key and, inside a partition,
/// sorted by the ordering key.
pub trait RowSource: Send {
    /// Returns the next row, or `None` at end of input.
    fn next_row(&mut self) -> Result<Option<Row>>;
}

/// In-memory row source, mostly for tests and small inputs.
#[derive(Debug, Default)]
pub struct VecRowSource {
    rows: VecDeque<Row>,
}

impl VecRowSource {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows: rows.into() }
    }
}

impl RowSource for VecRowSource {
    fn next_row(&mut self) -> Result<Option<Row>> {
        Ok(self.rows.pop_front())
    }
}

impl<S: RowSource + ?Sized> RowSource for Box<S> {
    fn next_row(&mut self) -> Result<Option<Row>> {
        (**self).next_row()
    }
}

/// A row produced by the engine: the original columns plus one value per
/// configured window function, in configuration order.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub values: Row,
    pub window_values: Vec<ScalarValue>,
}

impl ResultRow {
    pub fn new(values: Row, window_values: Vec<ScalarValue>) -> Self {
        Self { values, window_values }
    }

    pub fn window_value(&self, idx: usize) -> Option<&ScalarValue> {
        self.window_values.get(idx)
    }

    /// Input columns followed by window values.
    pub fn into_values(self) -> Row {
        let mut out = self.values;
        out.extend(self.window_values);
        out
    }
}

/// What `WindowEngine::next_output` yields.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowOutput {
    Row(ResultRow),
    EndOfPartition,
    EndOfInput,
}

impl WindowOutput {
    pub fn into_row(self) -> Option<ResultRow> {
        match self {
            WindowOutput::Row(row) => Some(row),
            _ => None,
        }
    }
}
