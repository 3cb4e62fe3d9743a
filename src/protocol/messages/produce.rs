use std::io::{Read, Write};

use super::{
    ReadVersionedError, ReadVersionedType, RequestBody, WriteVersionedError, WriteVersionedType,
    read_compact_versioned_array, read_versioned_array, write_compact_versioned_array,
    write_versioned_array,
};
use crate::protocol::api_version::ApiVersionRange;
use crate::protocol::error::Error;
use crate::protocol::primitives::{Records, TaggedFields};
use crate::protocol::traits::{ReadCompactType, ReadType, WriteCompactType, WriteType};
use crate::protocol::{api_key::ApiKey, api_version::ApiVersion};

#[derive(Debug)]
pub struct ProduceRequestPartitionData {
    /// The partition index.
    pub index: i32,

    /// The record data to be produced.
    pub records: Records,

    /// The tagged fields.
    ///
    /// Added in version 9.
    pub tagged_fields: Option<TaggedFields>,
}

impl<W> WriteVersionedType<W> for ProduceRequestPartitionData
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!(v <= 11);

        self.index.write(writer)?;

        if v >= 9 {
            self.records.write_compact(writer)?;
        } else {
            self.records.write(writer)?;
        }

        if v >= 9 {
            self.tagged_fields.write(writer)?;
        }

        Ok(())
    }
}

#[derive(Debug)]
pub struct ProduceRequestTopicData {
    /// The topic name.
    pub name: String,

    /// Each partition to produce to.
    pub partition_data: Vec<ProduceRequestPartitionData>,

    /// The tagged fields.
    ///
    /// Added in version 9.
    pub tagged_fields: Option<TaggedFields>,
}

impl<W> WriteVersionedType<W> for ProduceRequestTopicData
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!(v <= 11);

        if v >= 9 {
            self.name.write_compact(writer)?;
            write_compact_versioned_array(writer, version, Some(&self.partition_data))?;
        } else {
            self.name.write(writer)?;
            write_versioned_array(writer, version, Some(&self.partition_data))?;
        }

        if v >= 9 {
            self.tagged_fields.write(writer)?;
        }

        Ok(())
    }
}

#[derive(Debug)]
pub struct ProduceRequest {
    /// The transactional ID, or None if the producer is not transactional.
    ///
    /// Added in version 3.
    pub transactional_id: Option<String>,

    /// The number of acknowledgments the producer requires the leader to have
    /// received before considering a request complete: 0 for no
    /// acknowledgments, 1 for only the leader, and -1 for the full ISR.
    pub acks: i16,

    /// The timeout to await a response in milliseconds.
    pub timeout_ms: i32,

    /// Each topic to produce to.
    pub topic_data: Vec<ProduceRequestTopicData>,

    /// The tagged fields.
    ///
    /// Added in version 9.
    pub tagged_fields: Option<TaggedFields>,
}

impl RequestBody for ProduceRequest {
    type ResponseBody = ProduceResponse;

    const API_KEY: ApiKey = ApiKey::Produce;

    const API_VERSION_RANGE: ApiVersionRange = ApiVersionRange::new(3, 11);

    const FIRST_TAGGED_FIELD_IN_REQUEST_VERSION: ApiVersion = ApiVersion(9);
}

impl<W> WriteVersionedType<W> for ProduceRequest
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!(v >= 3 && v <= 11);

        if v >= 9 {
            self.transactional_id.write_compact(writer)?;
        } else {
            self.transactional_id.write(writer)?;
        }

        self.acks.write(writer)?;
        self.timeout_ms.write(writer)?;

        if v >= 9 {
            write_compact_versioned_array(writer, version, Some(&self.topic_data))?;
            self.tagged_fields.write(writer)?;
        } else {
            write_versioned_array(writer, version, Some(&self.topic_data))?;
        }

        Ok(())
    }
}

/// A record-level error returned for a batch, per KIP-467.
///
/// Added in version 8.
#[derive(Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub struct ProduceResponseRecordError {
    /// The index of the record that failed.
    pub batch_index: i32,

    /// The error message of the record that failed.
    pub batch_index_error_message: Option<String>,

    /// The tagged fields.
    pub tagged_fields: Option<TaggedFields>,
}

impl<R> ReadVersionedType<R> for ProduceResponseRecordError
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v >= 8 && v <= 11);

        let batch_index = i32::read(reader)?;
        let batch_index_error_message = if v >= 9 {
            Option::<String>::read_compact(reader)?
        } else {
            Option::<String>::read(reader)?
        };
        let tagged_fields = (v >= 9).then(|| TaggedFields::read(reader)).transpose()?;

        Ok(Self {
            batch_index,
            batch_index_error_message,
            tagged_fields,
        })
    }
}

#[derive(Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub struct ProduceResponsePartitionResponse {
    /// The partition index.
    pub index: i32,

    /// The error code, or 0 if there was no error.
    pub error: Option<Error>,

    /// The base offset.
    pub base_offset: i64,

    /// The timestamp returned by the broker after appending the messages.
    ///
    /// Added in version 2 ([KIP-32]).
    ///
    /// [KIP-32]: https://cwiki.apache.org/confluence/display/KAFKA/KIP-32+-+Add+timestamps+to+Kafka+message
    pub log_append_time_ms: Option<i64>,

    /// The start offset of the log at the time this produce response was
    /// created.
    ///
    /// Added in version 5.
    pub log_start_offset: Option<i64>,

    /// The record-level errors.
    ///
    /// Added in version 8.
    pub record_errors: Vec<ProduceResponseRecordError>,

    /// The global error message summarizing the partition error.
    ///
    /// Added in version 8.
    pub error_message: Option<String>,

    /// The tagged fields.
    pub tagged_fields: Option<TaggedFields>,
}

impl<R> ReadVersionedType<R> for ProduceResponsePartitionResponse
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 11);

        let index = i32::read(reader)?;
        let error = Error::new(i16::read(reader)?);
        let base_offset = i64::read(reader)?;
        let log_append_time_ms = (v >= 2).then(|| i64::read(reader)).transpose()?;
        let log_start_offset = (v >= 5).then(|| i64::read(reader)).transpose()?;
        let record_errors = if v >= 9 {
            (v >= 8)
                .then(|| read_compact_versioned_array(reader, version))
                .transpose()?
                .flatten()
                .unwrap_or_default()
        } else {
            (v >= 8)
                .then(|| read_versioned_array(reader, version))
                .transpose()?
                .flatten()
                .unwrap_or_default()
        };
        let error_message = if v >= 9 {
            Option::<String>::read_compact(reader)?
        } else if v >= 8 {
            Option::<String>::read(reader)?
        } else {
            None
        };
        let tagged_fields = (v >= 9).then(|| TaggedFields::read(reader)).transpose()?;

        Ok(Self {
            index,
            error,
            base_offset,
            log_append_time_ms,
            log_start_offset,
            record_errors,
            error_message,
            tagged_fields,
        })
    }
}

#[derive(Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub struct ProduceResponseTopicResponse {
    /// The topic name.
    pub name: String,

    /// Each partition that we produced to within the topic.
    pub partition_responses: Vec<ProduceResponsePartitionResponse>,

    /// The tagged fields.
    pub tagged_fields: Option<TaggedFields>,
}

impl<R> ReadVersionedType<R> for ProduceResponseTopicResponse
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 11);

        let (name, partition_responses) = if v >= 9 {
            (
                String::read_compact(reader)?,
                read_compact_versioned_array(reader, version)?.unwrap_or_default(),
            )
        } else {
            (
                String::read(reader)?,
                read_versioned_array(reader, version)?.unwrap_or_default(),
            )
        };
        let tagged_fields = (v >= 9).then(|| TaggedFields::read(reader)).transpose()?;

        Ok(Self {
            name,
            partition_responses,
            tagged_fields,
        })
    }
}

#[derive(Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub struct ProduceResponse {
    /// Each produce response.
    pub responses: Vec<ProduceResponseTopicResponse>,

    /// The duration in milliseconds for which the request was throttled due
    /// to a quota violation, or zero if the request did not violate any
    /// quota.
    ///
    /// Added in version 1.
    pub throttle_time_ms: Option<i32>,

    /// The tagged fields.
    pub tagged_fields: Option<TaggedFields>,
}

impl<R> ReadVersionedType<R> for ProduceResponse
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v >= 3 && v <= 11);

        let responses = if v >= 9 {
            read_compact_versioned_array(reader, version)?.unwrap_or_default()
        } else {
            read_versioned_array(reader, version)?.unwrap_or_default()
        };
        let throttle_time_ms = (v >= 1).then(|| i32::read(reader)).transpose()?;
        let tagged_fields = (v >= 9).then(|| TaggedFields::read(reader)).transpose()?;

        Ok(Self {
            responses,
            throttle_time_ms,
            tagged_fields,
        })
    }
}
