use std::io::{Read, Write};

use super::{ReadVersionedError, ReadVersionedType, RequestBody, WriteVersionedError, WriteVersionedType};
use crate::protocol::api_version::ApiVersionRange;
use crate::protocol::error::Error;
use crate::protocol::primitives::TaggedFields;
use crate::protocol::traits::{ReadCompactType, ReadType, WriteCompactType, WriteType};
use crate::protocol::{api_key::ApiKey, api_version::ApiVersion};

/// Adds a consumer group's offsets to an in-flight transaction, so that a
/// later `TxnOffsetCommit` lands inside the same transaction as the produced
/// records.
#[derive(Debug)]
pub struct AddOffsetsToTxnRequest {
    /// The transactional id.
    pub transactional_id: String,

    /// The producer id.
    pub producer_id: i64,

    /// The producer epoch.
    pub producer_epoch: i16,

    /// The unique group identifier.
    pub group_id: String,

    /// The tagged fields.
    ///
    /// Added in version 3.
    pub tagged_fields: Option<TaggedFields>,
}

impl RequestBody for AddOffsetsToTxnRequest {
    type ResponseBody = AddOffsetsToTxnResponse;

    const API_KEY: ApiKey = ApiKey::AddOffsetsToTxn;

    const API_VERSION_RANGE: ApiVersionRange = ApiVersionRange::new(0, 3);

    const FIRST_TAGGED_FIELD_IN_REQUEST_VERSION: ApiVersion = ApiVersion(3);
}

impl<W> WriteVersionedType<W> for AddOffsetsToTxnRequest
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
            self.group_id.write_compact(writer)?;
            self.tagged_fields.write(writer)?;
        } else {
            self.group_id.write(writer)?;
        }

        Ok(())
    }
}

#[derive(Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub struct AddOffsetsToTxnResponse {
    /// The duration in milliseconds for which the request was throttled due
    /// to a quota violation, or zero if the request did not violate any
    /// quota.
    pub throttle_time_ms: i32,

    /// The error code, or 0 if there was no error.
    pub error: Option<Error>,

    /// The tagged fields.
    ///
    /// Added in version 3.
    pub tagged_fields: Option<TaggedFields>,
}

impl<R> ReadVersionedType<R> for AddOffsetsToTxnResponse
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 3);

        let throttle_time_ms = i32::read(reader)?;
        let error = Error::new(i16::read(reader)?);
        let tagged_fields = (v >= 3).then(|| TaggedFields::read(reader)).transpose()?;

        Ok(Self {
            throttle_time_ms,
            error,
            tagged_fields,
        })
    }
}
