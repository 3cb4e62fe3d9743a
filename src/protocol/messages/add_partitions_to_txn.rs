use std::io::{Read, Write};

use super::{
    ReadVersionedError, ReadVersionedType, RequestBody, WriteVersionedError, WriteVersionedType,
    read_compact_versioned_array, read_versioned_array, write_compact_versioned_array,
    write_versioned_array,
};
use crate::protocol::api_version::ApiVersionRange;
use crate::protocol::error::Error;
use crate::protocol::primitives::TaggedFields;
use crate::protocol::traits::{ReadCompactType, ReadType, WriteCompactType, WriteType};
use crate::protocol::{api_key::ApiKey, api_version::ApiVersion};

/// Adds partitions to an in-flight transaction before they are written to,
/// per [KIP-98].
///
/// [KIP-98]: https://cwiki.apache.org/confluence/display/KAFKA/KIP-98+-+Exactly+Once+Delivery+and+Transactional+Messaging
#[derive(Debug)]
pub struct AddPartitionsToTxnRequestTopic {
    /// The topic name.
    pub name: String,

    /// The partition indexes to add to the transaction.
    pub partitions: Vec<i32>,

    /// The tagged fields.
    ///
    /// Added in version 3.
    pub tagged_fields: Option<TaggedFields>,
}

impl<W> WriteVersionedType<W> for AddPartitionsToTxnRequestTopic
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!(v <= 3);

        if v >= 3 {
            self.name.write_compact(writer)?;
            self.partitions.write_compact(writer)?;
            self.tagged_fields.write(writer)?;
        } else {
            self.name.write(writer)?;
            self.partitions.write(writer)?;
        }

        Ok(())
    }
}

#[derive(Debug)]
pub struct AddPartitionsToTxnRequest {
    /// The transactional id.
    pub transactional_id: String,

    /// The producer id.
    pub producer_id: i64,

    /// The producer epoch.
    pub producer_epoch: i16,

    /// The partitions to add to the transaction, grouped by topic.
    pub topics: Vec<AddPartitionsToTxnRequestTopic>,

    /// The tagged fields.
    ///
    /// Added in version 3.
    pub tagged_fields: Option<TaggedFields>,
}

impl RequestBody for AddPartitionsToTxnRequest {
    type ResponseBody = AddPartitionsToTxnResponse;

    const API_KEY: ApiKey = ApiKey::AddPartitionsToTxn;

    const API_VERSION_RANGE: ApiVersionRange = ApiVersionRange::new(0, 3);

    const FIRST_TAGGED_FIELD_IN_REQUEST_VERSION: ApiVersion = ApiVersion(3);
}

impl<W> WriteVersionedType<W> for AddPartitionsToTxnRequest
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!(v <= 3);

        if v >= 3 {
            self.transactional_id.write_compact(writer)?;
        } else {
            self.transactional_id.write(writer)?;
        }

        self.producer_id.write(writer)?;
        self.producer_epoch.write(writer)?;

        if v >= 3 {
            write_compact_versioned_array(writer, version, Some(&self.topics))?;
            self.tagged_fields.write(writer)?;
        } else {
            write_versioned_array(writer, version, Some(&self.topics))?;
        }

        Ok(())
    }
}

#[derive(Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub struct AddPartitionsToTxnPartitionResult {
    /// The partition index.
    pub partition_index: i32,

    /// The error code, or 0 if there was no error.
    pub error: Option<Error>,

    /// The tagged fields.
    ///
    /// Added in version 3.
    pub tagged_fields: Option<TaggedFields>,
}

impl<R> ReadVersionedType<R> for AddPartitionsToTxnPartitionResult
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 3);

        let partition_index = i32::read(reader)?;
        let error = Error::new(i16::read(reader)?);
        let tagged_fields = (v >= 3).then(|| TaggedFields::read(reader)).transpose()?;

        Ok(Self {
            partition_index,
            error,
            tagged_fields,
        })
    }
}

#[derive(Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub struct AddPartitionsToTxnTopicResult {
    /// The topic name.
    pub name: String,

    /// The results for each partition.
    pub results: Vec<AddPartitionsToTxnPartitionResult>,

    /// The tagged fields.
    ///
    /// Added in version 3.
    pub tagged_fields: Option<TaggedFields>,
}

impl<R> ReadVersionedType<R> for AddPartitionsToTxnTopicResult
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 3);

        let (name, results) = if v >= 3 {
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
        let tagged_fields = (v >= 3).then(|| TaggedFields::read(reader)).transpose()?;

        Ok(Self {
            name,
            results,
            tagged_fields,
        })
    }
}

#[derive(Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub struct AddPartitionsToTxnResponse {
    /// The duration in milliseconds for which the request was throttled due
    /// to a quota violation, or zero if the request did not violate any
    /// quota.
    pub throttle_time_ms: i32,

    /// The results for each topic.
    pub results: Vec<AddPartitionsToTxnTopicResult>,

    /// The tagged fields.
    ///
    /// Added in version 3.
    pub tagged_fields: Option<TaggedFields>,
}

impl<R> ReadVersionedType<R> for AddPartitionsToTxnResponse
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 3);

        let throttle_time_ms = i32::read(reader)?;
        let results = if v >= 3 {
            read_compact_versioned_array(reader, version)?.unwrap_or_default()
        } else {
            read_versioned_array(reader, version)?.unwrap_or_default()
        };
        let tagged_fields = (v >= 3).then(|| TaggedFields::read(reader)).transpose()?;

        Ok(Self {
            throttle_time_ms,
            results,
            tagged_fields,
        })
    }
}
