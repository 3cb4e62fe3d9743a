use std::io::{Read, Write};

use super::{ReadVersionedError, ReadVersionedType, RequestBody, WriteVersionedError, WriteVersionedType};
use crate::protocol::api_version::ApiVersionRange;
use crate::protocol::error::Error;
use crate::protocol::primitives::TaggedFields;
use crate::protocol::traits::{ReadCompactType, ReadType, WriteCompactType, WriteType};
use crate::protocol::{api_key::ApiKey, api_version::ApiVersion};

/// Initializes a producer identity for idempotent/transactional writes, per
/// [KIP-98]/[KIP-360].
///
/// [KIP-98]: https://cwiki.apache.org/confluence/display/KAFKA/KIP-98+-+Exactly+Once+Delivery+and+Transactional+Messaging
/// [KIP-360]: https://cwiki.apache.org/confluence/display/KAFKA/KIP-360%3A+Improve+handling+of+unknown+producer
#[derive(Debug)]
pub struct InitProducerIdRequest {
    /// The transactional id, or `None` if the producer is not transactional.
    pub transactional_id: Option<String>,

    /// The time in ms to wait before aborting idle transactions sent by this
    /// producer.
    pub transaction_timeout_ms: i32,

    /// The producer id to use, or -1 to request a new producer id.
    ///
    /// Added in version 3.
    pub producer_id: Option<i64>,

    /// The producer epoch to use, or -1 to request a new producer epoch.
    ///
    /// Added in version 3.
    pub producer_epoch: Option<i16>,

    /// The tagged fields.
    ///
    /// Added in version 2.
    pub tagged_fields: Option<TaggedFields>,
}

impl RequestBody for InitProducerIdRequest {
    type ResponseBody = InitProducerIdResponse;

    const API_KEY: ApiKey = ApiKey::InitProducerId;

    const API_VERSION_RANGE: ApiVersionRange = ApiVersionRange::new(0, 4);

    const FIRST_TAGGED_FIELD_IN_REQUEST_VERSION: ApiVersion = ApiVersion(2);
}

impl<W> WriteVersionedType<W> for InitProducerIdRequest
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!(v <= 4);

        if v >= 2 {
            self.transactional_id.write_compact(writer)?;
        } else {
            self.transactional_id.write(writer)?;
        }

        self.transaction_timeout_ms.write(writer)?;

        if v >= 3 {
            self.producer_id.unwrap_or(-1).write(writer)?;
            self.producer_epoch.unwrap_or(-1).write(writer)?;
        }

        if v >= 2 {
            self.tagged_fields.write(writer)?;
        }

        Ok(())
    }
}

#[derive(Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub struct InitProducerIdResponse {
    /// The duration in milliseconds for which the request was throttled due
    /// to a quota violation, or zero if the request did not violate any
    /// quota.
    pub throttle_time_ms: i32,

    /// The error code, or 0 if there was no error.
    pub error: Option<Error>,

    /// The current producer id.
    pub producer_id: i64,

    /// The current producer epoch.
    pub producer_epoch: i16,

    /// The tagged fields.
    ///
    /// Added in version 2.
    pub tagged_fields: Option<TaggedFields>,
}

impl<R> ReadVersionedType<R> for InitProducerIdResponse
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 4);

        let throttle_time_ms = i32::read(reader)?;
        let error = Error::new(i16::read(reader)?);
        let producer_id = i64::read(reader)?;
        let producer_epoch = i16::read(reader)?;
        let tagged_fields = (v >= 2).then(|| TaggedFields::read(reader)).transpose()?;

        Ok(Self {
            throttle_time_ms,
            error,
            producer_id,
            producer_epoch,
            tagged_fields,
        })
    }
}
