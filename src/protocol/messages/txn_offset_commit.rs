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

/// Commits offsets as part of a transaction, per [KIP-98]/[KIP-447].
///
/// [KIP-98]: https://cwiki.apache.org/confluence/display/KAFKA/KIP-98+-+Exactly+Once+Delivery+and+Transactional+Messaging
/// [KIP-447]: https://cwiki.apache.org/confluence/display/KAFKA/KIP-447%3A+Producer+scalability+for+exactly+once+semantics
#[derive(Debug)]
pub struct TxnOffsetCommitRequestPartition {
    /// The partition index.
    pub partition_index: i32,

    /// The message offset to be committed.
    pub committed_offset: i64,

    /// The leader epoch of this partition.
    ///
    /// Added in version 2.
    pub committed_leader_epoch: Option<i32>,

    /// Any associated metadata the client wants to keep.
    pub committed_metadata: Option<String>,

    /// The tagged fields.
    ///
    /// Added in version 3.
    pub tagged_fields: Option<TaggedFields>,
}

impl<W> WriteVersionedType<W> for TxnOffsetCommitRequestPartition
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

        self.partition_index.write(writer)?;
        self.committed_offset.write(writer)?;

        if v >= 2 {
            self.committed_leader_epoch.unwrap_or(-1).write(writer)?;
        }

        if v >= 3 {
            self.committed_metadata.write_compact(writer)?;
            self.tagged_fields.write(writer)?;
        } else {
            self.committed_metadata.write(writer)?;
        }

        Ok(())
    }
}

#[derive(Debug)]
pub struct TxnOffsetCommitRequestTopic {
    /// The topic name.
    pub name: String,

    /// The partitions to commit offsets for.
    pub partitions: Vec<TxnOffsetCommitRequestPartition>,

    /// The tagged fields.
    ///
    /// Added in version 3.
    pub tagged_fields: Option<TaggedFields>,
}

impl<W> WriteVersionedType<W> for TxnOffsetCommitRequestTopic
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
            write_compact_versioned_array(writer, version, Some(&self.partitions))?;
            self.tagged_fields.write(writer)?;
        } else {
            self.name.write(writer)?;
            write_versioned_array(writer, version, Some(&self.partitions))?;
        }

        Ok(())
    }
}

#[derive(Debug)]
pub struct TxnOffsetCommitRequest {
    /// The transactional id.
    pub transactional_id: String,

    /// The unique group identifier.
    pub group_id: String,

    /// The producer id.
    pub producer_id: i64,

    /// The producer epoch.
    pub producer_epoch: i16,

    /// The generation of the consumer group.
    ///
    /// Added in version 3 ([KIP-447]).
    ///
    /// [KIP-447]: https://cwiki.apache.org/confluence/display/KAFKA/KIP-447%3A+Producer+scalability+for+exactly+once+semantics
    pub generation_id: Option<i32>,

    /// The member id assigned by the group coordinator.
    ///
    /// Added in version 3.
    pub member_id: Option<String>,

    /// The unique identifier of the consumer instance provided by end user.
    ///
    /// Added in version 3.
    pub group_instance_id: Option<String>,

    /// Each topic that we want to commit offsets for.
    pub topics: Vec<TxnOffsetCommitRequestTopic>,

    /// The tagged fields.
    ///
    /// Added in version 3.
    pub tagged_fields: Option<TaggedFields>,
}

impl RequestBody for TxnOffsetCommitRequest {
    type ResponseBody = TxnOffsetCommitResponse;

    const API_KEY: ApiKey = ApiKey::TxnOffsetCommit;

    const API_VERSION_RANGE: ApiVersionRange = ApiVersionRange::new(0, 3);

    const FIRST_TAGGED_FIELD_IN_REQUEST_VERSION: ApiVersion = ApiVersion(3);
}

impl<W> WriteVersionedType<W> for TxnOffsetCommitRequest
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
            self.group_id.write_compact(writer)?;
        } else {
            self.transactional_id.write(writer)?;
            self.group_id.write(writer)?;
        }

        self.producer_id.write(writer)?;
        self.producer_epoch.write(writer)?;

        if v >= 3 {
            self.generation_id.unwrap_or(-1).write(writer)?;
            self.member_id
                .clone()
                .unwrap_or_default()
                .write_compact(writer)?;
            self.group_instance_id.write_compact(writer)?;
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
pub struct TxnOffsetCommitResponsePartition {
    /// The partition index.
    pub partition_index: i32,

    /// The error code, or 0 if there was no error.
    pub error: Option<Error>,

    /// The tagged fields.
    ///
    /// Added in version 3.
    pub tagged_fields: Option<TaggedFields>,
}

impl<R> ReadVersionedType<R> for TxnOffsetCommitResponsePartition
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
pub struct TxnOffsetCommitResponseTopic {
    /// The topic name.
    pub name: String,

    /// The results for each partition.
    pub partitions: Vec<TxnOffsetCommitResponsePartition>,

    /// The tagged fields.
    ///
    /// Added in version 3.
    pub tagged_fields: Option<TaggedFields>,
}

impl<R> ReadVersionedType<R> for TxnOffsetCommitResponseTopic
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 3);

        let (name, partitions) = if v >= 3 {
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
            partitions,
            tagged_fields,
        })
    }
}

#[derive(Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub struct TxnOffsetCommitResponse {
    /// The duration in milliseconds for which the request was throttled due
    /// to a quota violation, or zero if the request did not violate any
    /// quota.
    pub throttle_time_ms: i32,

    /// The responses for each topic.
    pub topics: Vec<TxnOffsetCommitResponseTopic>,

    /// The tagged fields.
    ///
    /// Added in version 3.
    pub tagged_fields: Option<TaggedFields>,
}

impl<R> ReadVersionedType<R> for TxnOffsetCommitResponse
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 3);

        let throttle_time_ms = i32::read(reader)?;
        let topics = if v >= 3 {
            read_compact_versioned_array(reader, version)?.unwrap_or_default()
        } else {
            read_versioned_array(reader, version)?.unwrap_or_default()
        };
        let tagged_fields = (v >= 3).then(|| TaggedFields::read(reader)).transpose()?;

        Ok(Self {
            throttle_time_ms,
            topics,
            tagged_fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn request_v0() {
        let req = TxnOffsetCommitRequest {
            transactional_id: "txn".to_string(),
            group_id: "group".to_string(),
            producer_id: 1,
            producer_epoch: 0,
            generation_id: None,
            member_id: None,
            group_instance_id: None,
            topics: vec![TxnOffsetCommitRequestTopic {
                name: "topic".to_string(),
                partitions: vec![TxnOffsetCommitRequestPartition {
                    partition_index: 0,
                    committed_offset: 10,
                    committed_leader_epoch: None,
                    committed_metadata: None,
                    tagged_fields: None,
                }],
                tagged_fields: None,
            }],
            tagged_fields: None,
        };

        let mut cursor = Cursor::new([0u8; 128]);
        req.write_versioned(&mut cursor, ApiVersion(0)).unwrap();
        let len = cursor.position() as usize;
        assert!(len > 0);
    }

    #[test]
    fn response_v0() {
        let data = [
            0, 0, 0, 0, // throttle_time_ms
            0, 0, 0, 1, // 1 topic
            0, 5, b't', b'o', b'p', b'i', b'c', // topic name
            0, 0, 0, 1, // 1 partition
            0, 0, 0, 0, // partition index
            0, 0, // error
        ];
        let mut reader = Cursor::new(data.as_ref());
        let got = TxnOffsetCommitResponse::read_versioned(&mut reader, ApiVersion(0)).unwrap();
        assert_eq!(got.topics.len(), 1);
        assert_eq!(got.topics[0].partitions[0].error, None);
    }
}
