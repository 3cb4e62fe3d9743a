//! The user-facing record type produced and consumed by
//! [`crate::client::partition::PartitionClient`], [`crate::client::producer`]
//! and [`crate::client::consumer`].
//!
//! This is deliberately simpler than [`crate::protocol::record::Record`]: it
//! carries an absolute timestamp and a sorted header map rather than the
//! batch-relative deltas the wire format uses, since callers shouldn't have
//! to know which batch (if any) a record ends up in before they can
//! construct one.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};

use crate::protocol::record::Record as ProtocolRecord;

/// A single Kafka message, independent of the batch it's written into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
    pub headers: BTreeMap<String, Vec<u8>>,
    pub timestamp: DateTime<Utc>,
}

impl Record {
    /// Approximate size of this record once encoded, used by
    /// [`crate::client::producer::aggregator`] to decide when a batch is
    /// full. Not exact (varint lengths aren't accounted for) but stable and
    /// cheap.
    pub fn approximate_size(&self) -> usize {
        let mut size = 8 + 8; // timestamp_delta + offset_delta upper bound
        size += self.key.as_ref().map(Vec::len).unwrap_or_default();
        size += self.value.as_ref().map(Vec::len).unwrap_or_default();
        for (k, v) in &self.headers {
            size += k.len() + v.len();
        }
        size
    }

    pub(crate) fn into_protocol_record(
        self,
        first_timestamp_ms: i64,
        offset_delta: i32,
    ) -> ProtocolRecord {
        ProtocolRecord {
            timestamp_delta: self.timestamp.timestamp_millis() - first_timestamp_ms,
            offset_delta,
            key: self.key,
            value: self.value,
            headers: self
                .headers
                .into_iter()
                .map(|(k, v)| (k, Some(v)))
                .collect(),
        }
    }

    pub(crate) fn from_protocol_record(record: ProtocolRecord, first_timestamp_ms: i64) -> Self {
        let millis = first_timestamp_ms + record.timestamp_delta;
        let timestamp = Utc
            .timestamp_millis_opt(millis)
            .single()
            .unwrap_or_else(Utc::now);

        Self {
            key: record.key,
            value: record.value,
            headers: record
                .headers
                .into_iter()
                .map(|(k, v)| (k, v.unwrap_or_default()))
                .collect(),
            timestamp,
        }
    }
}

/// A [`Record`] together with the offset the broker assigned it, as
/// returned by [`crate::client::partition::PartitionClient::fetch_records`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordAndOffset {
    pub record: Record,
    pub offset: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_record_roundtrip_preserves_timestamp_and_payload() {
        let first_timestamp_ms = 1_700_000_000_000;
        let record = Record {
            key: Some(b"k".to_vec()),
            value: Some(b"v".to_vec()),
            headers: BTreeMap::from([("h".to_owned(), b"hv".to_vec())]),
            timestamp: Utc.timestamp_millis_opt(first_timestamp_ms + 42).unwrap(),
        };

        let protocol_record = record.clone().into_protocol_record(first_timestamp_ms, 3);
        assert_eq!(protocol_record.timestamp_delta, 42);
        assert_eq!(protocol_record.offset_delta, 3);

        let back = Record::from_protocol_record(protocol_record, first_timestamp_ms);
        assert_eq!(back.key, record.key);
        assert_eq!(back.value, record.value);
        assert_eq!(back.headers, record.headers);
        assert_eq!(back.timestamp, record.timestamp);
    }
}
