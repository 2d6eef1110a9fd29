use arrow::datatypes::{DataType, SchemaRef};
use datafusion::scalar::ScalarValue;
use tracing::trace;

use crate::common::row::Row;
use crate::config::StoreConfig;
use crate::error::{Result, WindowError};
use crate::storage::{PagedSequenceStore, Position, SequenceStore};
use crate::window::codec::{check_supported, EntryReader, EntryWriter};
use crate::window::sequencer::RowInfo;

/// Raw rows of the current partition, waiting to be emitted.
///
/// Each record holds the row's `RowInfo` followed by its column values.
/// Positions equal row indexes within the partition.
#[derive(Debug)]
pub struct InputBuffer {
    store: PagedSequenceStore,
    types: Vec<DataType>,
}

impl InputBuffer {
    pub fn try_new(schema: &SchemaRef, config: StoreConfig) -> Result<Self> {
        let types: Vec<DataType> = schema
            .fields()
            .iter()
            .map(|f| f.data_type().clone())
            .collect();
        for dt in &types {
            check_supported(dt)?;
        }
        Ok(Self {
            store: PagedSequenceStore::new(config),
            types,
        })
    }

    pub fn append(&mut self, info: &RowInfo, row: &[ScalarValue]) -> Result<Position> {
        if row.len() != self.types.len() {
            return Err(WindowError::InvalidArgument(format!(
                "row has {} columns, schema has {}",
                row.len(),
                self.types.len()
            )));
        }
        let mut writer = EntryWriter::new();
        writer.write_u64(info.row_index);
        writer.write_u64(info.peer_group);
        writer.write_u64(info.rank);
        writer.write_u64(info.dense_rank);
        for (dt, v) in self.types.iter().zip(row) {
            writer.write_value(dt, v)?;
        }
        self.store.append(writer.finish())
    }

    pub fn get(&mut self, pos: Position) -> Result<(RowInfo, Row)> {
        let record = self
            .store
            .get(pos)?
            .ok_or_else(|| WindowError::internal(format!("buffered input row {pos} missing")))?;
        let mut reader = EntryReader::new(&record);
        let info = RowInfo {
            row_index: reader.read_u64()?,
            peer_group: reader.read_u64()?,
            rank: reader.read_u64()?,
            dense_rank: reader.read_u64()?,
        };
        let row = self
            .types
            .iter()
            .map(|dt| reader.read_value(dt))
            .collect::<Result<Row>>()?;
        Ok((info, row))
    }

    pub fn trim(&mut self, before: Position) -> Result<()> {
        if before > self.store.first_position() {
            trace!(before, "trimming input buffer");
            self.store.trim(before)?;
        }
        Ok(())
    }

    pub fn clear(&mut self) -> Result<()> {
        self.store.clear()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{Field, Schema};
    use std::sync::Arc;

    #[test]
    fn test_round_trip_with_spill() {
        let schema: SchemaRef = Arc::new(Schema::new(vec![
            Field::new("k", DataType::Int64, true),
            Field::new("s", DataType::Utf8, true),
        ]));
        let mut buffer = InputBuffer::try_new(&schema, StoreConfig::new(64, 128)).unwrap();
        for i in 0..50u64 {
            let info = RowInfo { row_index: i, peer_group: i / 2, rank: i + 1, dense_rank: i / 2 + 1 };
            let row = vec![
                ScalarValue::Int64(Some(i as i64)),
                if i % 3 == 0 { ScalarValue::Utf8(None) } else { ScalarValue::Utf8(Some(format!("v{i}"))) },
            ];
            assert_eq!(buffer.append(&info, &row).unwrap(), i);
        }
        let (info, row) = buffer.get(7).unwrap();
        assert_eq!(info.peer_group, 3);
        assert_eq!(row[1], ScalarValue::Utf8(Some("v7".into())));
        let (_, row) = buffer.get(0).unwrap();
        assert_eq!(row[1], ScalarValue::Utf8(None));

        buffer.trim(40).unwrap();
        assert_eq!(buffer.len(), 10);
        assert!(buffer.get(39).is_err());
        assert_eq!(buffer.get(49).unwrap().0.rank, 50);
    }

    #[test]
    fn test_width_mismatch() {
        let schema: SchemaRef = Arc::new(Schema::new(vec![Field::new("k", DataType::Int64, true)]));
        let mut buffer = InputBuffer::try_new(&schema, StoreConfig::default()).unwrap();
        assert!(buffer.append(&RowInfo::default(), &[]).is_err());
    }
}
