use crate::protocol::api_key::ApiKey;
use crate::protocol::api_version::{ApiVersion, ApiVersionRange};
use crate::protocol::error::Error;
use crate::protocol::messages::{
    read_compact_versioned_array, read_versioned_array, write_compact_versioned_array,
    write_versioned_array, ReadVersionedError, ReadVersionedType, RequestBody,
    WriteVersionedError, WriteVersionedType,
};
use crate::protocol::primitives::TaggedFields;
use crate::protocol::traits::{ReadCompactType, ReadType, WriteCompactType, WriteType};
use std::io::{Read, Write};

pub struct PartitionCommit {
    /// The partition index.
    pub partition_index: i32,

    /// the message offset to be committed.
    pub committed_offset: i64,

    /// The timestamp of the commit.
    ///
    /// Removed in version 2.
    pub commit_timestamp: i64,

    /// The leader epoch of this partition.
    ///
    /// Added in version 6
    pub committed_leader_epoch: i32,

    /// Any associated metadata the client wants to keep.
    pub committed_metadata: Option<String>,

    /// The tagged fields.
    ///
    /// Added in version 8.
    pub tagged_fields: Option<TaggedFields>,
}

impl<W: Write> WriteVersionedType<W> for PartitionCommit {
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!(v <= 8);

        self.partition_index.write(writer)?;
        self.committed_offset.write(writer)?;

        if v < 2 {
            self.commit_timestamp.write(writer)?;
        }

        if v >= 6 {
            self.committed_leader_epoch.write(writer)?;
        }

        if v < 8 {
            self.committed_metadata.write(writer)?;
        } else {
            self.committed_metadata.write_compact(writer)?;
        }

        if v >= 8 {
            self.tagged_fields.write(writer)?;
        }

        Ok(())
    }
}

pub struct TopicCommit {
    /// The topic name.
    pub name: String,

    /// Each partition to commit offsets for.
    pub partitions: Vec<PartitionCommit>,

    /// The tagged fields.
    ///
    /// Added in version 8.
    pub tagged_fields: Option<TaggedFields>,
}

impl<W: Write> WriteVersionedType<W> for TopicCommit {
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!(v <= 8);

        if v < 8 {
            self.name.write(writer)?;
            write_versioned_array(writer, version, Some(&self.partitions))?;
        } else {
            self.name.write_compact(writer)?;
            write_compact_versioned_array(writer, version, Some(&self.partitions))?;
        }

        if v >= 8 {
            self.tagged_fields.write(writer)?;
        }

        Ok(())
    }
}

// v1 or later
pub struct OffsetCommitRequest {
    /// The unique group identifier.
    pub group_id: String,

    /// The generation of the group.
    pub generation_id: i32,

    /// The member ID assigned by the group coordinator.
    pub member_id: String,

    /// The time period in ms to retain the offset.
    ///
    /// Added in version 2.
    /// Removed in version 5.
    pub retention_time_ms: i64,

    /// The unique identifier of the consumer instance provided by end user.
    ///
    /// Added in version 7.
    pub group_instance_id: Option<String>,

    /// The topics to commit offsets for.
    pub topics: Vec<TopicCommit>,

    /// The tagged fields.
    ///
    /// Added in version 8.
    pub tagged_fields: Option<TaggedFields>,
}

impl<W: Write> WriteVersionedType<W> for OffsetCommitRequest {
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!(v >= 1 && v <= 8);

        if v < 8 {
            self.group_id.write(writer)?;
        } else {
            self.group_id.write_compact(writer)?;
        }

        self.generation_id.write(writer)?;

        if v < 8 {
            self.member_id.write(writer)?;
        } else {
            self.member_id.write_compact(writer)?;
        }

        if v >= 2 && v < 5 {
            self.retention_time_ms.write(writer)?;
        }

        if v >= 7 {
            if v < 8 {
                self.group_instance_id.write(writer)?;
            } else {
                self.group_instance_id.write_compact(writer)?;
            }
        }

        if v < 8 {
            write_versioned_array(writer, version, Some(&self.topics))?;
        } else {
            write_compact_versioned_array(writer, version, Some(&self.topics))?;
        }

        if v >= 8 {
            self.tagged_fields.write(writer)?;
        }

        Ok(())
    }
}

impl RequestBody for OffsetCommitRequest {
    type ResponseBody = OffsetCommitResponse;
    const API_KEY: ApiKey = ApiKey::OffsetCommit;
    const API_VERSION_RANGE: ApiVersionRange = ApiVersionRange::new(1, 8);
    const FIRST_TAGGED_FIELD_IN_REQUEST_VERSION: ApiVersion = ApiVersion(8);
}

pub struct PartitionCommitResult {
    /// The partition index.
    pub partition_index: i32,

    /// The error_code, or 0 if there was no error.
    pub error_code: Option<Error>,

    /// The tagged fields.
    ///
    /// Added in version 8.
    pub tagged_fields: Option<TaggedFields>,
}

impl<R: Read> ReadVersionedType<R> for PartitionCommitResult {
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 8);

        let partition_index = i32::read(reader)?;
        let error_code = Error::new(i16::read(reader)?);
        let tagged_fields = (v >= 8).then(|| TaggedFields::read(reader)).transpose()?;

        Ok(Self {
            partition_index,
            error_code,
            tagged_fields,
        })
    }
}

pub struct TopicCommitResult {
    /// The topic name.
    pub name: String,

    /// The responses for each partition in the topic.
    pub partitions: Vec<PartitionCommitResult>,

    /// The tagged fields.
    ///
    /// Added in version 8.
    pub tagged_fields: Option<TaggedFields>,
}

impl<R: Read> ReadVersionedType<R> for TopicCommitResult {
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 8);

        let name = if v < 8 {
            String::read(reader)?
        } else {
            String::read_compact(reader)?
        };
        let partitions = if v < 8 {
            read_versioned_array(reader, version)?
        } else {
            read_compact_versioned_array(reader, version)?
        }
        .unwrap_or_default();
        let tagged_fields = (v >= 8).then(|| TaggedFields::read(reader)).transpose()?;

        Ok(Self {
            name,
            partitions,
            tagged_fields,
        })
    }
}

// v1 of later
pub struct OffsetCommitResponse {
    /// The duration in milliseconds for which the request was throttled due
    /// to a quota violation, or zero if the request did not violate any quota.
    ///
    /// Added in version 3.
    pub throttle_time_ms: i32,

    /// The responses for each partition in the topic.
    pub topics: Vec<TopicCommitResult>,

    /// The tagged fields.
    ///
    /// Added in version 8.
    pub tagged_fields: Option<TaggedFields>,
}

impl<R: Read> ReadVersionedType<R> for OffsetCommitResponse {
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v >= 1 && v <= 8);

        let throttle_time_ms = (v >= 3)
            .then(|| i32::read(reader))
            .transpose()?
            .unwrap_or_default();
        let topics = if v < 8 {
            read_versioned_array(reader, version)?
        } else {
            read_compact_versioned_array(reader, version)?
        }
        .unwrap_or_default();
        let tagged_fields = (v >= 8).then(|| TaggedFields::read(reader)).transpose()?;

        Ok(Self {
            throttle_time_ms,
            topics,
            tagged_fields,
        })
    }
}
