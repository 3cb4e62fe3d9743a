use std::io::{Read, Write};

use super::{ReadVersionedError, ReadVersionedType, RequestBody, WriteVersionedError, WriteVersionedType};
use crate::protocol::api_version::ApiVersionRange;
use crate::protocol::error::Error;
use crate::protocol::primitives::TaggedFields;
use crate::protocol::traits::{ReadCompactType, ReadType, WriteCompactType, WriteType};
use crate::protocol::{api_key::ApiKey, api_version::ApiVersion};

/// Ends (commits or aborts) a transaction, per [KIP-98].
///
/// [KIP-98]: https://cwiki.apache.org/confluence/display/KAFKA/KIP-98+-+Exactly+Once+Delivery+and+Transactional+Messaging
#[derive(Debug)]
pub struct EndTxnRequest {
    /// The transactional id.
    pub transactional_id: String,

    /// The producer id.
    pub producer_id: i64,

    /// The producer epoch.
    pub producer_epoch: i16,

    /// `true` if the transaction was committed, `false` if it was aborted.
    pub committed: bool,

    /// The tagged fields.
    ///
    /// Added in version 3.
    pub tagged_fields: Option<TaggedFields>,
}

impl RequestBody for EndTxnRequest {
    type ResponseBody = EndTxnResponse;

    const API_KEY: ApiKey = ApiKey::EndTxn;

    const API_VERSION_RANGE: ApiVersionRange = ApiVersionRange::new(0, 3);

    const FIRST_TAGGED_FIELD_IN_REQUEST_VERSION: ApiVersion = ApiVersion(3);
}

impl<W> WriteVersionedType<W> for EndTxnRequest
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
        self.committed.write(writer)?;

        if v >= 3 {
            self.tagged_fields.write(writer)?;
        }

        Ok(())
    }
}

#[derive(Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub struct EndTxnResponse {
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

impl<R> ReadVersionedType<R> for EndTxnResponse
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
