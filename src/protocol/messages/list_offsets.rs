//! `ListOffsets` request and response.
//!
//! # References
//! - [KIP-79](https://cwiki.apache.org/confluence/pages/viewpage.action?pageId=65868090)
//! - [KIP-98](https://cwiki.apache.org/confluence/display/KAFKA/KIP-98+-+Exactly+Once+Delivery+and+Transactional+Messaging)
use std::io::{Read, Write};

use crate::protocol::{
    api_key::ApiKey,
    api_version::{ApiVersion, ApiVersionRange},
    error::Error as ApiError,
    messages::{
        read_compact_versioned_array, read_versioned_array, write_compact_versioned_array,
        write_versioned_array, IsolationLevel,
    },
    primitives::TaggedFields,
    traits::{ReadCompactType, ReadType, WriteCompactType, WriteType},
};

use super::{
    ReadVersionedError, ReadVersionedType, RequestBody, WriteVersionedError, WriteVersionedType,
};

#[derive(Debug)]
#[allow(missing_copy_implementations)]
pub struct ListOffsetsRequestPartition {
    /// The partition index.
    pub partition_index: i32,

    /// The current timestamp.
    ///
    /// Depending on the version this will return:
    ///
    /// - **version 0:** `max_num_offsets` offsets that are smaller/equal than this timestamp.
    /// - **version 1 and later:** return timestamp and offset of the first/message greater/equal than this timestamp
    ///
    /// Per [KIP-79] this can have the following special values:
    ///
    /// - `-1`: latest offset
    /// - `-2`: earlist offset
    ///
    /// [KIP-79]: https://cwiki.apache.org/confluence/pages/viewpage.action?pageId=65868090
    pub timestamp: i64,

    /// The maximum number of offsets to report.
    ///
    /// Defaults to 1.
    ///
    /// Removed in version 1.
    pub max_num_offsets: Option<i32>,

    /// The current leader epoch of the partition.
    ///
    /// Added in version 4.
    pub current_leader_epoch: Option<i32>,

    /// The tagged fields.
    ///
    /// Added in version 6.
    pub tagged_fields: Option<TaggedFields>,
}

impl<W> WriteVersionedType<W> for ListOffsetsRequestPartition
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!(v <= 7);

        self.partition_index.write(writer)?;

        if v >= 4 {
            self.current_leader_epoch.unwrap_or(-1).write(writer)?;
        }

        self.timestamp.write(writer)?;

        if v == 0 {
            // Only fetch 1 offset by default.
            self.max_num_offsets.unwrap_or(1).write(writer)?;
        }

        if v >= 6 {
            self.tagged_fields.write(writer)?;
        }

        Ok(())
    }
}

#[derive(Debug)]
pub struct ListOffsetsRequestTopic {
    /// The topic name.
    pub name: String,

    /// Each partition in the request.
    ///
    /// Note: A partition may only appear once within the request.
    pub partitions: Vec<ListOffsetsRequestPartition>,

    /// The tagged fields.
    ///
    /// Added in version 6.
    pub tagged_fields: Option<TaggedFields>,
}

impl<W> WriteVersionedType<W> for ListOffsetsRequestTopic
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!(v <= 7);

        if v < 6 {
            self.name.write(writer)?;
            write_versioned_array(writer, version, Some(&self.partitions))?;
        } else {
            self.name.write_compact(writer)?;
            write_compact_versioned_array(writer, version, Some(&self.partitions))?;
        }

        if v >= 6 {
            self.tagged_fields.write(writer)?;
        }

        Ok(())
    }
}

#[derive(Debug)]
pub struct ListOffsetsRequest {
    /// The broker ID of the requestor, or -1 if this request is being made by a normal consumer.
    pub replica_id: i32,

    /// This setting controls the visibility of transactional records.
    ///
    /// Using `READ_UNCOMMITTED` (`isolation_level = 0`) makes all records visible. With `READ_COMMITTED`
    /// (`isolation_level = 1`), non-transactional and `COMMITTED` transactional records are visible. To be more
    /// concrete, `READ_COMMITTED` returns all data from offsets smaller than the current LSO (last stable offset), and
    /// enables the inclusion of the list of aborted transactions in the result, which allows consumers to discard
    /// `ABORTED` transactional records.
    ///
    /// As per [KIP-98] the default is `READ_UNCOMMITTED`.
    ///
    /// Added in version 2.
    ///
    /// [KIP-98]: https://cwiki.apache.org/confluence/display/KAFKA/KIP-98+-+Exactly+Once+Delivery+and+Transactional+Messaging
    pub isolation_level: Option<IsolationLevel>,

    /// Each topic in the request.
    ///
    /// Note: A topic may only appear once within the request.
    pub topics: Vec<ListOffsetsRequestTopic>,

    /// The tagged fields.
    ///
    /// Added in version 6.
    pub tagged_fields: Option<TaggedFields>,
}

impl<W> WriteVersionedType<W> for ListOffsetsRequest
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!(v <= 7);

        self.replica_id.write(writer)?;

        if v >= 2 {
            // The default is `READ_UNCOMMITTED`.
            let level: i8 = self.isolation_level.unwrap_or_default().into();
            level.write(writer)?;
        }

        if v < 6 {
            write_versioned_array(writer, version, Some(&self.topics))?;
        } else {
            write_compact_versioned_array(writer, version, Some(&self.topics))?;
        }

        if v >= 6 {
            self.tagged_fields.write(writer)?;
        }

        Ok(())
    }
}

impl RequestBody for ListOffsetsRequest {
    type ResponseBody = ListOffsetsResponse;

    const API_KEY: ApiKey = ApiKey::ListOffsets;

    const API_VERSION_RANGE: ApiVersionRange = ApiVersionRange::new(0, 7);

    const FIRST_TAGGED_FIELD_IN_REQUEST_VERSION: ApiVersion = ApiVersion(6);
}

#[derive(Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub struct ListOffsetsResponsePartition {
    /// The partition index.
    pub partition_index: i32,

    /// The partition error code, or 0 if there was no error.
    pub error_code: Option<ApiError>,

    /// The result offsets.
    ///
    /// Removed in version 1.
    pub old_style_offsets: Option<Vec<i64>>,

    /// The timestamp associated with the returned offset.
    ///
    /// Added in version 1.
    pub timestamp: Option<i64>,

    /// The returned offset.
    ///
    /// Added in version 1.
    pub offset: Option<i64>,

    /// The leader epoch associated with the returned offset.
    ///
    /// Added in version 4.
    pub leader_epoch: Option<i32>,

    /// The tagged fields.
    ///
    /// Added in version 6.
    pub tagged_fields: Option<TaggedFields>,
}

impl<R> ReadVersionedType<R> for ListOffsetsResponsePartition
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 7);

        let partition_index = i32::read(reader)?;
        let error_code = ApiError::new(i16::read(reader)?);
        let old_style_offsets = (v < 1).then(|| Vec::<i64>::read(reader)).transpose()?;
        let timestamp = (v >= 1).then(|| i64::read(reader)).transpose()?;
        let offset = (v >= 1).then(|| i64::read(reader)).transpose()?;
        let leader_epoch = (v >= 4).then(|| i32::read(reader)).transpose()?;
        let tagged_fields = (v >= 6).then(|| TaggedFields::read(reader)).transpose()?;

        Ok(Self {
            partition_index,
            error_code,
            old_style_offsets,
            timestamp,
            offset,
            leader_epoch,
            tagged_fields,
        })
    }
}

#[derive(Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub struct ListOffsetsResponseTopic {
    /// The topic name.
    pub name: String,

    /// Each partition in the response.
    pub partitions: Vec<ListOffsetsResponsePartition>,

    /// The tagged fields.
    ///
    /// Added in version 6.
    pub tagged_fields: Option<TaggedFields>,
}

impl<R> ReadVersionedType<R> for ListOffsetsResponseTopic
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 7);

        let name = if v < 6 {
            String::read(reader)?
        } else {
            String::read_compact(reader)?
        };
        let partitions = if v < 6 {
            read_versioned_array(reader, version)?
        } else {
            read_compact_versioned_array(reader, version)?
        }
        .unwrap_or_default();
        let tagged_fields = (v >= 6).then(|| TaggedFields::read(reader)).transpose()?;

        Ok(Self {
            name,
            partitions,
            tagged_fields,
        })
    }
}

#[derive(Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub struct ListOffsetsResponse {
    /// The duration in milliseconds for which the request was throttled due to a quota violation, or zero if the request did not violate any quota.
    ///
    /// Added in version 2.
    pub throttle_time_ms: Option<i32>,

    /// Each topic in the response.
    pub topics: Vec<ListOffsetsResponseTopic>,

    /// The tagged fields.
    ///
    /// Added in version 6.
    pub tagged_fields: Option<TaggedFields>,
}

impl<R> ReadVersionedType<R> for ListOffsetsResponse
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 7);

        let throttle_time_ms = (v >= 2).then(|| i32::read(reader)).transpose()?;
        let topics = if v < 6 {
            read_versioned_array(reader, version)?
        } else {
            read_compact_versioned_array(reader, version)?
        }
        .unwrap_or_default();
        let tagged_fields = (v >= 6).then(|| TaggedFields::read(reader)).transpose()?;

        Ok(Self {
            throttle_time_ms,
            topics,
            tagged_fields,
        })
    }
}
