//! Record batch v2 (magic = 2), the only generation this crate accepts.
//!
//! See <https://kafka.apache.org/documentation/#recordbatch> and KIP-98.

use std::io::{Cursor, Read, Write};

use super::{
    traits::{ReadError, ReadType, WriteError, WriteType},
    vec_builder::VecBuilder,
};
use crate::protocol::primitives::{Varint, Varlong};

#[cfg(test)]
use proptest::prelude::*;

/// Compresses the serialized record payload area according to `compression`.
///
/// Returns an error if the crate was built without the feature gating the
/// requested codec.
fn compress_records(
    compression: RecordBatchCompression,
    plain: Vec<u8>,
) -> Result<Vec<u8>, WriteError> {
    match compression {
        RecordBatchCompression::NoCompression => Ok(plain),
        #[cfg(feature = "compression-gzip")]
        RecordBatchCompression::Gzip => {
            use flate2::{write::GzEncoder, Compression};

            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&plain)?;
            Ok(encoder.finish()?)
        }
        #[cfg(feature = "compression-snappy")]
        RecordBatchCompression::Snappy => snap::raw::Encoder::new()
            .compress_vec(&plain)
            .map_err(|e| WriteError::Malformed(Box::new(e))),
        #[cfg(feature = "compression-lz4")]
        RecordBatchCompression::Lz4 => {
            let mut encoder = lz4::EncoderBuilder::new().build(Vec::new())?;
            encoder.write_all(&plain)?;
            let (buf, result) = encoder.finish();
            result?;
            Ok(buf)
        }
        #[cfg(feature = "compression-zstd")]
        RecordBatchCompression::Zstd => Ok(zstd::stream::encode_all(plain.as_slice(), 0)?),
        #[allow(unreachable_patterns)]
        other => Err(WriteError::Malformed(
            format!("codec {other:?} is not compiled into this build").into(),
        )),
    }
}

/// Decompresses the record payload area according to `compression`.
fn decompress_records(
    compression: RecordBatchCompression,
    compressed: &[u8],
) -> Result<Vec<u8>, ReadError> {
    match compression {
        RecordBatchCompression::NoCompression => Ok(compressed.to_vec()),
        #[cfg(feature = "compression-gzip")]
        RecordBatchCompression::Gzip => {
            use flate2::read::GzDecoder;

            let mut out = Vec::new();
            GzDecoder::new(compressed).read_to_end(&mut out)?;
            Ok(out)
        }
        #[cfg(feature = "compression-snappy")]
        RecordBatchCompression::Snappy => snap::raw::Decoder::new()
            .decompress_vec(compressed)
            .map_err(|e| ReadError::Malformed(Box::new(e))),
        #[cfg(feature = "compression-lz4")]
        RecordBatchCompression::Lz4 => {
            let mut out = Vec::new();
            let mut decoder = lz4::Decoder::new(compressed)?;
            decoder.read_to_end(&mut out)?;
            Ok(out)
        }
        #[cfg(feature = "compression-zstd")]
        RecordBatchCompression::Zstd => Ok(zstd::stream::decode_all(compressed)?),
        #[allow(unreachable_patterns)]
        other => Err(ReadError::Malformed(
            format!("codec {other:?} is not compiled into this build").into(),
        )),
    }
}

const MAGIC: i8 = 2;

/// Low 3 bits of the batch `attributes` field.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum RecordBatchCompression {
    NoCompression,
    Gzip,
    Snappy,
    Lz4,
    Zstd,
}

impl RecordBatchCompression {
    fn from_bits(bits: i16) -> Result<Self, ReadError> {
        Ok(match bits {
            0 => Self::NoCompression,
            1 => Self::Gzip,
            2 => Self::Snappy,
            3 => Self::Lz4,
            4 => Self::Zstd,
            other => {
                return Err(ReadError::Malformed(
                    format!("invalid compression type: {other}").into(),
                ))
            }
        })
    }

    fn bits(&self) -> i16 {
        match self {
            Self::NoCompression => 0,
            Self::Gzip => 1,
            Self::Snappy => 2,
            Self::Lz4 => 3,
            Self::Zstd => 4,
        }
    }
}

/// Bit 3 of `attributes`.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum RecordBatchTimestampType {
    CreateTime,
    LogAppendTime,
}

/// A single record within a batch. Every field below is varint-encoded on
/// the wire (zigzag for the signed ones), per spec §4.1.
#[derive(Debug, PartialEq, Eq, Clone)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct Record {
    pub timestamp_delta: i64,
    pub offset_delta: i32,
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
    pub headers: Vec<(String, Option<Vec<u8>>)>,
}

impl<R> ReadType<R> for Record
where
    R: Read,
{
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let len = Varint::read(reader)?.0;
        let len = usize::try_from(len)?;
        let mut body = VecBuilder::new(len).read_exact(reader)?;
        let body: Vec<u8> = body.into();
        let mut cursor = Cursor::new(body);

        let _attributes = i8::read(&mut cursor)?;
        let timestamp_delta = Varlong::read(&mut cursor)?.0;
        let offset_delta = Varint::read(&mut cursor)?.0;

        let key = read_record_bytes(&mut cursor)?;
        let value = read_record_bytes(&mut cursor)?;

        let header_count = Varint::read(&mut cursor)?.0;
        let header_count = usize::try_from(header_count)?;
        let mut headers = VecBuilder::new(header_count);
        for _ in 0..header_count {
            let key_len = Varint::read(&mut cursor)?.0;
            let key_len = usize::try_from(key_len)?;
            let mut key_buf = VecBuilder::new(key_len).read_exact(&mut cursor)?;
            let key_buf: Vec<u8> = key_buf.into();
            let header_key =
                String::from_utf8(key_buf).map_err(|e| ReadError::Malformed(Box::new(e)))?;
            let header_value = read_record_bytes(&mut cursor)?;
            headers.push((header_key, header_value));
        }

        Ok(Self {
            timestamp_delta,
            offset_delta,
            key,
            value,
            headers: headers.into(),
        })
    }
}

fn read_record_bytes<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>, ReadError> {
    let len = Varint::read(reader)?.0;
    match len {
        -1 => Ok(None),
        l if l < -1 => Err(ReadError::Malformed(
            format!("invalid negative record byte-field length: {l}").into(),
        )),
        l => {
            let len = usize::try_from(l)?;
            let buf = VecBuilder::new(len).read_exact(reader)?;
            Ok(Some(buf.into()))
        }
    }
}

fn write_record_bytes<W: Write>(writer: &mut W, bytes: &Option<Vec<u8>>) -> Result<(), WriteError> {
    match bytes {
        Some(b) => {
            Varint(i32::try_from(b.len()).map_err(WriteError::Overflow)?).write(writer)?;
            writer.write_all(b)?;
        }
        None => Varint(-1).write(writer)?,
    }
    Ok(())
}

impl<W> WriteType<W> for Record
where
    W: Write,
{
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        let mut body = vec![];
        0i8.write(&mut body)?; // attributes, unused
        Varlong(self.timestamp_delta).write(&mut body)?;
        Varint(self.offset_delta).write(&mut body)?;
        write_record_bytes(&mut body, &self.key)?;
        write_record_bytes(&mut body, &self.value)?;

        Varint(i32::try_from(self.headers.len()).map_err(WriteError::Overflow)?).write(&mut body)?;
        for (key, value) in &self.headers {
            let key_bytes = key.as_bytes();
            Varint(i32::try_from(key_bytes.len()).map_err(WriteError::Overflow)?).write(&mut body)?;
            body.write_all(key_bytes)?;
            write_record_bytes(&mut body, value)?;
        }

        Varint(i32::try_from(body.len()).map_err(WriteError::Overflow)?).write(writer)?;
        writer.write_all(&body)?;
        Ok(())
    }
}

/// Payload of a control batch: a transaction marker written by the
/// coordinator, never produced by application code.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum ControlBatchRecord {
    Abort,
    Commit,
}

impl ControlBatchRecord {
    fn from_type(version: i16, ty: i16) -> Result<Self, ReadError> {
        if version != 0 {
            return Err(ReadError::Malformed(
                format!("unsupported control record version: {version}").into(),
            ));
        }

        match ty {
            0 => Ok(Self::Abort),
            1 => Ok(Self::Commit),
            other => Err(ReadError::Malformed(
                format!("unknown control record type: {other}").into(),
            )),
        }
    }

    fn ty(&self) -> i16 {
        match self {
            Self::Abort => 0,
            Self::Commit => 1,
        }
    }
}

/// Produce batches always carry plain records; control batches (markers
/// written by the transaction coordinator) carry a single marker instead.
#[derive(Debug, PartialEq, Eq, Clone)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum ControlBatchOrRecords {
    ControlBatch(ControlBatchRecord),
    Records(Vec<Record>),
}

#[derive(Debug, PartialEq, Eq, Clone)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct RecordBatch {
    pub base_offset: i64,
    pub partition_leader_epoch: i32,
    pub last_offset_delta: i32,
    pub first_timestamp: i64,
    pub max_timestamp: i64,
    pub producer_id: i64,
    pub producer_epoch: i16,
    pub base_sequence: i32,
    pub records: ControlBatchOrRecords,
    pub compression: RecordBatchCompression,
    pub is_transactional: bool,
    pub timestamp_type: RecordBatchTimestampType,
}

impl RecordBatch {
    fn attributes(&self) -> i16 {
        let mut attrs = self.compression.bits();
        if matches!(self.timestamp_type, RecordBatchTimestampType::LogAppendTime) {
            attrs |= 1 << 3;
        }
        if self.is_transactional {
            attrs |= 1 << 4;
        }
        if matches!(self.records, ControlBatchOrRecords::ControlBatch(_)) {
            attrs |= 1 << 5;
        }
        attrs
    }
}

impl<R> ReadType<R> for RecordBatch
where
    R: Read,
{
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let base_offset = i64::read(reader)?;
        let length = i32::read(reader)?;
        let length = usize::try_from(length)?;

        let body = VecBuilder::new(length).read_exact(reader)?;
        let body: Vec<u8> = body.into();
        let mut cursor = Cursor::new(body);

        let partition_leader_epoch = i32::read(&mut cursor)?;
        let magic = i8::read(&mut cursor)?;
        if magic != MAGIC {
            return Err(ReadError::Malformed(
                format!("unsupported record batch magic {magic}, only v2 (magic=2) is supported")
                    .into(),
            ));
        }

        let expected_crc = u32::from_be_bytes(
            <[u8; 4]>::try_from(&cursor.get_ref()[cursor.position() as usize..][..4])
                .expect("4 bytes available"),
        );
        cursor.set_position(cursor.position() + 4);

        let crc_body_start = cursor.position() as usize;
        let actual_crc = crc32c::crc32c(&cursor.get_ref()[crc_body_start..]);
        if actual_crc != expected_crc {
            return Err(ReadError::Malformed(
                format!(
                    "record batch CRC-32C mismatch: expected {expected_crc:#x}, got {actual_crc:#x}"
                )
                .into(),
            ));
        }

        let attributes = i16::read(&mut cursor)?;
        let compression = RecordBatchCompression::from_bits(attributes & 0b111)?;
        let timestamp_type = if attributes & (1 << 3) != 0 {
            RecordBatchTimestampType::LogAppendTime
        } else {
            RecordBatchTimestampType::CreateTime
        };
        let is_transactional = attributes & (1 << 4) != 0;
        let is_control = attributes & (1 << 5) != 0;

        let last_offset_delta = i32::read(&mut cursor)?;
        let first_timestamp = i64::read(&mut cursor)?;
        let max_timestamp = i64::read(&mut cursor)?;
        let producer_id = i64::read(&mut cursor)?;
        let producer_epoch = i16::read(&mut cursor)?;
        let base_sequence = i32::read(&mut cursor)?;

        let num_records = i32::read(&mut cursor)?;
        let num_records = usize::try_from(num_records)?;

        // everything from here to the end of the batch is the (possibly
        // compressed) records area.
        let records_start = cursor.position() as usize;
        let plain = decompress_records(compression, &cursor.get_ref()[records_start..])?;
        let mut cursor = Cursor::new(plain);

        let records = if is_control {
            // a control batch holds exactly one record whose key carries the
            // two-byte marker version and whose value carries the two-byte
            // marker type (0 = abort, 1 = commit).
            let marker = Record::read(&mut cursor)?;
            let key = marker
                .key
                .ok_or_else(|| ReadError::Malformed("control record key is missing".into()))?;
            let value = marker
                .value
                .ok_or_else(|| ReadError::Malformed("control record value is missing".into()))?;
            if key.len() != 2 || value.len() != 2 {
                return Err(ReadError::Malformed(
                    "control record key/value must be 2 bytes each".into(),
                ));
            }
            let marker_version = i16::from_be_bytes([key[0], key[1]]);
            let marker_type = i16::from_be_bytes([value[0], value[1]]);
            ControlBatchOrRecords::ControlBatch(ControlBatchRecord::from_type(
                marker_version,
                marker_type,
            )?)
        } else {
            let mut records = VecBuilder::new(num_records);
            for _ in 0..num_records {
                records.push(Record::read(&mut cursor)?);
            }
            ControlBatchOrRecords::Records(records.into())
        };

        Ok(Self {
            base_offset,
            partition_leader_epoch,
            last_offset_delta,
            first_timestamp,
            max_timestamp,
            producer_id,
            producer_epoch,
            base_sequence,
            records,
            compression,
            is_transactional,
            timestamp_type,
        })
    }
}

impl<W> WriteType<W> for RecordBatch
where
    W: Write,
{
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        // Everything after `partition_leader_epoch` is length-prefixed and
        // CRC-32C protected, so it is built in memory first.
        let mut after_epoch = vec![];
        MAGIC.write(&mut after_epoch)?;

        let mut after_crc = vec![];
        self.attributes().write(&mut after_crc)?;
        self.last_offset_delta.write(&mut after_crc)?;
        self.first_timestamp.write(&mut after_crc)?;
        self.max_timestamp.write(&mut after_crc)?;
        self.producer_id.write(&mut after_crc)?;
        self.producer_epoch.write(&mut after_crc)?;
        self.base_sequence.write(&mut after_crc)?;

        let mut plain = vec![];
        let num_records = match &self.records {
            ControlBatchOrRecords::Records(records) => {
                for record in records {
                    record.write(&mut plain)?;
                }
                records.len()
            }
            ControlBatchOrRecords::ControlBatch(marker) => {
                let record = Record {
                    timestamp_delta: 0,
                    offset_delta: 0,
                    key: Some(0i16.to_be_bytes().to_vec()),
                    value: Some(marker.ty().to_be_bytes().to_vec()),
                    headers: vec![],
                };
                record.write(&mut plain)?;
                1
            }
        };
        i32::try_from(num_records)
            .map_err(WriteError::Overflow)?
            .write(&mut after_crc)?;
        after_crc.write_all(&compress_records(self.compression, plain)?)?;

        let crc = crc32c::crc32c(&after_crc);
        after_epoch.write_all(&crc.to_be_bytes())?;
        after_epoch.write_all(&after_crc)?;

        self.base_offset.write(writer)?;
        i32::try_from(4 + after_epoch.len())
            .map_err(WriteError::Overflow)?
            .write(writer)?;
        self.partition_leader_epoch.write(writer)?;
        writer.write_all(&after_epoch)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::test_utils::test_roundtrip;

    test_roundtrip!(RecordBatch, test_record_batch_roundtrip);
    test_roundtrip!(Record, test_record_roundtrip);

    #[test]
    fn rejects_bad_magic() {
        let mut buf = vec![];
        // base_offset
        0i64.write(&mut buf).unwrap();
        // fabricate a body with magic=1
        let mut body = vec![];
        0i32.write(&mut body).unwrap(); // partition_leader_epoch
        1i8.write(&mut body).unwrap(); // magic = 1 (legacy, unsupported)
        body.extend_from_slice(&[0u8; 4]); // fake crc

        (body.len() as i32).write(&mut buf).unwrap();
        buf.extend_from_slice(&body);

        let err = RecordBatch::read(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, ReadError::Malformed(_)));
    }

    #[test]
    fn rejects_crc_mismatch() {
        let batch = RecordBatch {
            base_offset: 0,
            partition_leader_epoch: 0,
            last_offset_delta: 0,
            first_timestamp: 0,
            max_timestamp: 0,
            producer_id: -1,
            producer_epoch: -1,
            base_sequence: -1,
            records: ControlBatchOrRecords::Records(vec![]),
            compression: RecordBatchCompression::NoCompression,
            is_transactional: false,
            timestamp_type: RecordBatchTimestampType::CreateTime,
        };

        let mut buf = vec![];
        batch.write(&mut buf).unwrap();

        // flip a byte inside the CRC-protected body.
        let last = buf.len() - 1;
        buf[last] ^= 0xff;

        let err = RecordBatch::read(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, ReadError::Malformed(_)));
    }
}
