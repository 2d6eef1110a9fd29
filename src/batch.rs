use std::collections::VecDeque;

use arrow::array::{ArrayRef, RecordBatch};
use arrow::datatypes::SchemaRef;
use datafusion::scalar::ScalarValue;

use crate::common::row::{Row, RowSource, WindowOutput};
use crate::error::{Result, WindowError};
use crate::window::WindowEngine;

/// Row source over arrow record batches, read front to back.
#[derive(Debug, Default)]
pub struct RecordBatchSource {
    batches: VecDeque<RecordBatch>,
    row: usize,
}

impl RecordBatchSource {
    pub fn new(batches: Vec<RecordBatch>) -> Self {
        Self {
            batches: batches.into(),
            row: 0,
        }
    }
}

impl RowSource for RecordBatchSource {
    fn next_row(&mut self) -> Result<Option<Row>> {
        loop {
            let Some(batch) = self.batches.front() else {
                return Ok(None);
            };
            if self.row < batch.num_rows() {
                let row = batch
                    .columns()
                    .iter()
                    .map(|column| ScalarValue::try_from_array(column, self.row))
                    .collect::<std::result::Result<Row, _>>()?;
                self.row += 1;
                return Ok(Some(row));
            }
            self.batches.pop_front();
            self.row = 0;
        }
    }
}

/// Builds a batch of `schema` from rows holding one value per field.
pub fn rows_to_batch(schema: &SchemaRef, rows: &[Row]) -> Result<RecordBatch> {
    let width = schema.fields().len();
    if let Some(row) = rows.iter().find(|r| r.len() != width) {
        return Err(WindowError::internal(format!(
            "row has {} values, output schema has {width} fields",
            row.len()
        )));
    }
    let columns = (0..width)
        .map(|idx| {
            if rows.is_empty() {
                return Ok(arrow::array::new_empty_array(schema.field(idx).data_type()));
            }
            ScalarValue::iter_to_array(rows.iter().map(|r| r[idx].clone())).map_err(WindowError::from)
        })
        .collect::<Result<Vec<ArrayRef>>>()?;
    Ok(RecordBatch::try_new(schema.clone(), columns)?)
}

/// Drains `engine` into one output batch per partition.
pub fn collect_partitions<S: RowSource>(engine: &mut WindowEngine<S>) -> Result<Vec<RecordBatch>> {
    let schema = engine.output_schema();
    let mut batches = vec![];
    let mut rows: Vec<Row> = vec![];
    loop {
        match engine.next_output()? {
            WindowOutput::Row(row) => rows.push(row.into_values()),
            WindowOutput::EndOfPartition => {
                batches.push(rows_to_batch(&schema, &rows)?);
                rows.clear();
            }
            WindowOutput::EndOfInput => break,
        }
    }
    Ok(batches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    #[test]
    fn test_batches_to_rows() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("k", DataType::Utf8, true),
            Field::new("v", DataType::Int64, true),
        ]));
        let batch = |keys: Vec<&str>, vals: Vec<Option<i64>>| {
            RecordBatch::try_new(
                schema.clone(),
                vec![Arc::new(StringArray::from(keys)), Arc::new(Int64Array::from(vals))],
            )
            .unwrap()
        };
        let empty = RecordBatch::new_empty(schema.clone());
        let mut source = RecordBatchSource::new(vec![
            batch(vec!["a", "a"], vec![Some(1), None]),
            empty,
            batch(vec!["b"], vec![Some(3)]),
        ]);
        let mut rows = vec![];
        while let Some(row) = source.next_row().unwrap() {
            rows.push(row);
        }
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1][1], ScalarValue::Int64(None));
        assert_eq!(rows[2][0], ScalarValue::Utf8(Some("b".into())));

        let out = rows_to_batch(&schema, &rows).unwrap();
        assert_eq!(out.num_rows(), 3);
    }
}
