use arrow::datatypes::{DataType, TimeUnit};
use bytes::{BufMut, Bytes, BytesMut};
use datafusion::scalar::ScalarValue;

use crate::common::scalar_utils::typed_null;
use crate::error::{Result, WindowError};
use crate::window::aggregates::AccumulatorState;

/// Largest variable-size value a buffer entry may carry.
pub const MAX_VARLEN_BYTES: usize = 16 * 1024 * 1024;

const NULL_TAG: u8 = 0;
const VALUE_TAG: u8 = 1;

pub fn check_supported(data_type: &DataType) -> Result<()> {
    match data_type {
        DataType::Null
        | DataType::Boolean
        | DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64
        | DataType::Float32
        | DataType::Float64
        | DataType::Date32
        | DataType::Date64
        | DataType::Timestamp(_, _)
        | DataType::Decimal128(_, _)
        | DataType::Utf8
        | DataType::LargeUtf8
        | DataType::Binary
        | DataType::LargeBinary => Ok(()),
        other => Err(WindowError::codec(format!(
            "type {other} cannot be stored in a window buffer"
        ))),
    }
}

/// Appends null-tagged values to a record. Offsets are relative to the
/// record start, so padding written here is skipped identically on read.
#[derive(Debug, Default)]
pub struct EntryWriter {
    buf: BytesMut,
}

impl EntryWriter {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(64),
        }
    }

    fn pad_to(&mut self, align: usize) {
        let rem = self.buf.len() % align;
        if rem != 0 {
            self.buf.put_bytes(0, align - rem);
        }
    }

    pub fn write_u64(&mut self, v: u64) {
        self.pad_to(8);
        self.buf.put_u64_le(v);
    }

    fn write_varlen(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > MAX_VARLEN_BYTES {
            return Err(WindowError::codec(format!(
                "variable-size value of {} bytes exceeds the {MAX_VARLEN_BYTES} byte limit",
                bytes.len()
            )));
        }
        self.pad_to(4);
        self.buf.put_u32_le(bytes.len() as u32);
        self.pad_to(8);
        self.buf.put_slice(bytes);
        Ok(())
    }

    pub fn write_value(&mut self, data_type: &DataType, value: &ScalarValue) -> Result<()> {
        if value.is_null() {
            self.buf.put_u8(NULL_TAG);
            return Ok(());
        }
        self.buf.put_u8(VALUE_TAG);
        match (data_type, value) {
            (DataType::Boolean, ScalarValue::Boolean(Some(v))) => self.buf.put_u8(u8::from(*v)),
            (DataType::Int8, ScalarValue::Int8(Some(v))) => self.buf.put_i8(*v),
            (DataType::UInt8, ScalarValue::UInt8(Some(v))) => self.buf.put_u8(*v),
            (DataType::Int16, ScalarValue::Int16(Some(v))) => {
                self.pad_to(2);
                self.buf.put_i16_le(*v);
            }
            (DataType::UInt16, ScalarValue::UInt16(Some(v))) => {
                self.pad_to(2);
                self.buf.put_u16_le(*v);
            }
            (DataType::Int32, ScalarValue::Int32(Some(v)))
            | (DataType::Date32, ScalarValue::Date32(Some(v))) => {
                self.pad_to(4);
                self.buf.put_i32_le(*v);
            }
            (DataType::UInt32, ScalarValue::UInt32(Some(v))) => {
                self.pad_to(4);
                self.buf.put_u32_le(*v);
            }
            (DataType::Float32, ScalarValue::Float32(Some(v))) => {
                self.pad_to(4);
                self.buf.put_u32_le(v.to_bits());
            }
            (DataType::Int64, ScalarValue::Int64(Some(v)))
            | (DataType::Date64, ScalarValue::Date64(Some(v))) => {
                self.pad_to(8);
                self.buf.put_i64_le(*v);
            }
            (DataType::UInt64, ScalarValue::UInt64(Some(v))) => {
                self.pad_to(8);
                self.buf.put_u64_le(*v);
            }
            (DataType::Float64, ScalarValue::Float64(Some(v))) => {
                self.pad_to(8);
                self.buf.put_u64_le(v.to_bits());
            }
            (DataType::Timestamp(unit, _), _) => {
                let raw = timestamp_raw(unit, value).ok_or_else(|| mismatch(data_type, value))?;
                self.pad_to(8);
                self.buf.put_i64_le(raw);
            }
            (DataType::Decimal128(_, _), ScalarValue::Decimal128(Some(v), _, _)) => {
                self.pad_to(8);
                self.buf.put_i128_le(*v);
            }
            (DataType::Utf8, ScalarValue::Utf8(Some(s)))
            | (DataType::LargeUtf8, ScalarValue::LargeUtf8(Some(s))) => {
                self.write_varlen(s.as_bytes())?;
            }
            (DataType::Binary, ScalarValue::Binary(Some(b)))
            | (DataType::LargeBinary, ScalarValue::LargeBinary(Some(b))) => {
                self.write_varlen(b)?;
            }
            _ => return Err(mismatch(data_type, value)),
        }
        Ok(())
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

fn mismatch(data_type: &DataType, value: &ScalarValue) -> WindowError {
    WindowError::codec(format!(
        "value of type {} does not match buffer slot type {data_type}",
        value.data_type()
    ))
}

fn timestamp_raw(unit: &TimeUnit, value: &ScalarValue) -> Option<i64> {
    match (unit, value) {
        (TimeUnit::Second, ScalarValue::TimestampSecond(v, _))
        | (TimeUnit::Millisecond, ScalarValue::TimestampMillisecond(v, _))
        | (TimeUnit::Microsecond, ScalarValue::TimestampMicrosecond(v, _))
        | (TimeUnit::Nanosecond, ScalarValue::TimestampNanosecond(v, _)) => *v,
        _ => None,
    }
}

/// A decoded value that may still borrow from the record it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueRef<'a> {
    Null,
    Fixed(ScalarValue),
    Str(&'a str),
    Bytes(&'a [u8]),
}

impl<'a> ValueRef<'a> {
    pub fn to_scalar(&self, data_type: &DataType) -> Result<ScalarValue> {
        Ok(match (self, data_type) {
            (ValueRef::Null, dt) => typed_null(dt)?,
            (ValueRef::Fixed(v), _) => v.clone(),
            (ValueRef::Str(s), DataType::LargeUtf8) => ScalarValue::LargeUtf8(Some(s.to_string())),
            (ValueRef::Str(s), _) => ScalarValue::Utf8(Some(s.to_string())),
            (ValueRef::Bytes(b), DataType::LargeBinary) => ScalarValue::LargeBinary(Some(b.to_vec())),
            (ValueRef::Bytes(b), _) => ScalarValue::Binary(Some(b.to_vec())),
        })
    }
}

#[derive(Debug)]
pub struct EntryReader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> EntryReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    pub fn is_exhausted(&self) -> bool {
        self.offset >= self.buf.len()
    }

    fn skip_pad(&mut self, align: usize) {
        let rem = self.offset % align;
        if rem != 0 {
            self.offset += align - rem;
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .offset
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| WindowError::codec("truncated buffer record"))?;
        let out = &self.buf[self.offset..end];
        self.offset = end;
        Ok(out)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.skip_pad(8);
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    fn read_varlen(&mut self) -> Result<&'a [u8]> {
        self.skip_pad(4);
        let len = u32::from_le_bytes(self.take_array()?) as usize;
        if len > MAX_VARLEN_BYTES {
            return Err(WindowError::codec(format!("corrupt variable-size length {len}")));
        }
        self.skip_pad(8);
        self.take(len)
    }

    pub fn read_value_ref(&mut self, data_type: &DataType) -> Result<ValueRef<'a>> {
        match self.take(1)?[0] {
            NULL_TAG => return Ok(ValueRef::Null),
            VALUE_TAG => {}
            other => return Err(WindowError::codec(format!("bad null tag {other}"))),
        }
        let value = match data_type {
            DataType::Boolean => ScalarValue::Boolean(Some(self.take(1)?[0] != 0)),
            DataType::Int8 => ScalarValue::Int8(Some(i8::from_le_bytes(self.take_array()?))),
            DataType::UInt8 => ScalarValue::UInt8(Some(self.take(1)?[0])),
            DataType::Int16 => {
                self.skip_pad(2);
                ScalarValue::Int16(Some(i16::from_le_bytes(self.take_array()?)))
            }
            DataType::UInt16 => {
                self.skip_pad(2);
                ScalarValue::UInt16(Some(u16::from_le_bytes(self.take_array()?)))
            }
            DataType::Int32 => {
                self.skip_pad(4);
                ScalarValue::Int32(Some(i32::from_le_bytes(self.take_array()?)))
            }
            DataType::Date32 => {
                self.skip_pad(4);
                ScalarValue::Date32(Some(i32::from_le_bytes(self.take_array()?)))
            }
            DataType::UInt32 => {
                self.skip_pad(4);
                ScalarValue::UInt32(Some(u32::from_le_bytes(self.take_array()?)))
            }
            DataType::Float32 => {
                self.skip_pad(4);
                ScalarValue::Float32(Some(f32::from_bits(u32::from_le_bytes(self.take_array()?))))
            }
            DataType::Int64 => {
                self.skip_pad(8);
                ScalarValue::Int64(Some(i64::from_le_bytes(self.take_array()?)))
            }
            DataType::Date64 => {
                self.skip_pad(8);
                ScalarValue::Date64(Some(i64::from_le_bytes(self.take_array()?)))
            }
            DataType::UInt64 => {
                self.skip_pad(8);
                ScalarValue::UInt64(Some(u64::from_le_bytes(self.take_array()?)))
            }
            DataType::Float64 => {
                self.skip_pad(8);
                ScalarValue::Float64(Some(f64::from_bits(u64::from_le_bytes(self.take_array()?))))
            }
            DataType::Timestamp(unit, tz) => {
                self.skip_pad(8);
                let raw = Some(i64::from_le_bytes(self.take_array()?));
                let tz = tz.clone();
                match unit {
                    TimeUnit::Second => ScalarValue::TimestampSecond(raw, tz),
                    TimeUnit::Millisecond => ScalarValue::TimestampMillisecond(raw, tz),
                    TimeUnit::Microsecond => ScalarValue::TimestampMicrosecond(raw, tz),
                    TimeUnit::Nanosecond => ScalarValue::TimestampNanosecond(raw, tz),
                }
            }
            DataType::Decimal128(precision, scale) => {
                self.skip_pad(8);
                ScalarValue::Decimal128(
                    Some(i128::from_le_bytes(self.take_array()?)),
                    *precision,
                    *scale,
                )
            }
            DataType::Utf8 | DataType::LargeUtf8 => {
                let bytes = self.read_varlen()?;
                let s = std::str::from_utf8(bytes)
                    .map_err(|e| WindowError::codec(format!("invalid utf8 in record: {e}")))?;
                return Ok(ValueRef::Str(s));
            }
            DataType::Binary | DataType::LargeBinary => {
                return Ok(ValueRef::Bytes(self.read_varlen()?));
            }
            other => {
                return Err(WindowError::codec(format!("cannot decode non-null {other}")));
            }
        };
        Ok(ValueRef::Fixed(value))
    }

    pub fn read_value(&mut self, data_type: &DataType) -> Result<ScalarValue> {
        self.read_value_ref(data_type)?.to_scalar(data_type)
    }
}

/// What one buffered function stores per row.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadLayout {
    /// Raw argument values, for functions rescanned over the frame.
    Args(Vec<DataType>),
    /// One row's partial state plus its not-null count, for inverse-capable aggregates.
    State(Vec<DataType>),
    /// A single value, for positional lookups.
    Value(DataType),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Args(Vec<ScalarValue>),
    State {
        not_null: u64,
        state: AccumulatorState,
    },
    Value(ScalarValue),
}

/// One frame buffer entry: ordering key followed by one payload per buffered function.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferEntry {
    pub keys: Vec<ScalarValue>,
    pub payloads: Vec<Payload>,
}

/// Shape of every entry of one frame buffer. Keys are empty in ROWS mode.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryLayout {
    pub key_types: Vec<DataType>,
    pub slots: Vec<PayloadLayout>,
}

impl EntryLayout {
    pub fn try_new(key_types: Vec<DataType>, slots: Vec<PayloadLayout>) -> Result<Self> {
        for dt in &key_types {
            check_supported(dt)?;
        }
        for slot in &slots {
            match slot {
                PayloadLayout::Args(types) | PayloadLayout::State(types) => {
                    types.iter().try_for_each(check_supported)?
                }
                PayloadLayout::Value(dt) => check_supported(dt)?,
            }
        }
        Ok(Self { key_types, slots })
    }

    pub fn has_keys(&self) -> bool {
        !self.key_types.is_empty()
    }

    pub fn encode(&self, entry: &BufferEntry) -> Result<Bytes> {
        if entry.keys.len() != self.key_types.len() || entry.payloads.len() != self.slots.len() {
            return Err(WindowError::codec("buffer entry does not match layout"));
        }
        let mut writer = EntryWriter::new();
        for (dt, key) in self.key_types.iter().zip(&entry.keys) {
            writer.write_value(dt, key)?;
        }
        for (slot, payload) in self.slots.iter().zip(&entry.payloads) {
            match (slot, payload) {
                (PayloadLayout::Args(types), Payload::Args(values)) => {
                    write_values(&mut writer, types, values)?
                }
                (PayloadLayout::State(types), Payload::State { not_null, state }) => {
                    writer.write_u64(*not_null);
                    write_values(&mut writer, types, state)?;
                }
                (PayloadLayout::Value(dt), Payload::Value(v)) => writer.write_value(dt, v)?,
                _ => return Err(WindowError::codec("payload kind does not match layout slot")),
            }
        }
        Ok(writer.finish())
    }

    pub fn decode(&self, record: &[u8]) -> Result<BufferEntry> {
        let mut reader = EntryReader::new(record);
        let keys = self.read_keys(&mut reader)?;
        let payloads = self
            .slots
            .iter()
            .map(|slot| read_payload(&mut reader, slot))
            .collect::<Result<Vec<_>>>()?;
        Ok(BufferEntry { keys, payloads })
    }

    pub fn decode_keys(&self, record: &[u8]) -> Result<Vec<ScalarValue>> {
        self.read_keys(&mut EntryReader::new(record))
    }

    /// Decodes only payload `slot`; earlier values are skipped without copying.
    pub fn decode_slot(&self, record: &[u8], slot: usize) -> Result<Payload> {
        let target = self
            .slots
            .get(slot)
            .ok_or_else(|| WindowError::internal(format!("no buffer slot {slot}")))?;
        let mut reader = EntryReader::new(record);
        for dt in &self.key_types {
            reader.read_value_ref(dt)?;
        }
        for layout in &self.slots[..slot] {
            skip_payload(&mut reader, layout)?;
        }
        read_payload(&mut reader, target)
    }

    fn read_keys(&self, reader: &mut EntryReader<'_>) -> Result<Vec<ScalarValue>> {
        self.key_types.iter().map(|dt| reader.read_value(dt)).collect()
    }
}

fn write_values(writer: &mut EntryWriter, types: &[DataType], values: &[ScalarValue]) -> Result<()> {
    if types.len() != values.len() {
        return Err(WindowError::codec(format!(
            "expected {} values, got {}",
            types.len(),
            values.len()
        )));
    }
    for (dt, v) in types.iter().zip(values) {
        writer.write_value(dt, v)?;
    }
    Ok(())
}

fn read_payload(reader: &mut EntryReader<'_>, layout: &PayloadLayout) -> Result<Payload> {
    Ok(match layout {
        PayloadLayout::Args(types) => {
            Payload::Args(types.iter().map(|dt| reader.read_value(dt)).collect::<Result<_>>()?)
        }
        PayloadLayout::State(types) => {
            let not_null = reader.read_u64()?;
            let state = types.iter().map(|dt| reader.read_value(dt)).collect::<Result<_>>()?;
            Payload::State { not_null, state }
        }
        PayloadLayout::Value(dt) => Payload::Value(reader.read_value(dt)?),
    })
}

fn skip_payload(reader: &mut EntryReader<'_>, layout: &PayloadLayout) -> Result<()> {
    match layout {
        PayloadLayout::Args(types) => {
            for dt in types {
                reader.read_value_ref(dt)?;
            }
        }
        PayloadLayout::State(types) => {
            reader.read_u64()?;
            for dt in types {
                reader.read_value_ref(dt)?;
            }
        }
        PayloadLayout::Value(dt) => {
            reader.read_value_ref(dt)?;
        }
    }
    Ok(())
}
