use std::io::{Read, Write};

use crate::protocol::api_key::ApiKey;
use crate::protocol::api_version::{ApiVersion, ApiVersionRange};
use crate::protocol::error::Error;
use crate::protocol::messages::{
    read_compact_versioned_array, write_compact_versioned_array, ReadVersionedError,
    ReadVersionedType, RequestBody, WriteVersionedError, WriteVersionedType,
};
use crate::protocol::primitives::TaggedFields;
use crate::protocol::traits::{ReadCompactType, ReadType, WriteCompactType, WriteType};

#[derive(Copy, Clone, Debug)]
pub enum CoordinatorType {
    Group,
    Transaction,
}

impl CoordinatorType {
    pub fn as_i8(&self) -> i8 {
        match self {
            CoordinatorType::Group => 0,
            CoordinatorType::Transaction => 1,
        }
    }
}

#[derive(Debug)]
pub struct FindCoordinatorRequest {
    /// The coordinator key.
    ///
    /// STRING < 3
    /// COMPACT_STRING == 3
    /// Replaced by `coordinator_keys` in version 4 (carried as the sole
    /// element of that list when writing a v4+ request).
    pub key: String,

    /// The coordinator key type. (Group, transaction, etc.)
    pub key_type: CoordinatorType,

    /// The coordinator keys.
    ///
    /// Added in version 4 (KIP-699 batched lookup). When writing a v4+
    /// request this replaces `key`; callers constructing a request should
    /// set both `key` (for v<4 compatibility) and `coordinator_keys`.
    pub coordinator_keys: Vec<String>,

    /// The tagged_fields.
    ///
    /// Added in version 3.
    pub tagged_fields: Option<TaggedFields>,
}

impl<W> WriteVersionedType<W> for FindCoordinatorRequest
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

        if v < 3 {
            self.key.write(writer)?;
        } else if v == 3 {
            self.key.write_compact(writer)?;
        }

        let key_type = self.key_type.as_i8();
        key_type.write(writer)?;

        if v >= 4 {
            write_compact_versioned_array(writer, version, Some(&self.coordinator_keys))?;
        }

        if v >= 3 {
            self.tagged_fields.write(writer)?;
        }

        Ok(())
    }
}

impl<W> WriteVersionedType<W> for String
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        _version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        WriteCompactType::write_compact(self, writer)?;
        Ok(())
    }
}

impl RequestBody for FindCoordinatorRequest {
    type ResponseBody = FindCoordinatorResponse;
    const API_KEY: ApiKey = ApiKey::FindCoordinator;
    const API_VERSION_RANGE: ApiVersionRange = ApiVersionRange::new(1, 4);
    const FIRST_TAGGED_FIELD_IN_REQUEST_VERSION: ApiVersion = ApiVersion(3);
}

/// A single coordinator lookup result.
///
/// Added in version 4 (KIP-699); versions below 4 carry exactly one of
/// these inline on [`FindCoordinatorResponse`] instead of in a `coordinators`
/// array.
#[derive(Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub struct Coordinator {
    /// The coordinator key.
    ///
    /// Added in version 4.
    pub key: String,

    /// The node id.
    pub node_id: i32,

    /// The hostname.
    pub host: String,

    /// The port.
    pub port: i32,

    /// The error code, or 0 if there was no error.
    pub error_code: Option<Error>,

    /// The error message, or null if there was no error.
    pub error_message: Option<String>,

    /// The tagged fields.
    ///
    /// Added in version 4.
    pub tagged_fields: Option<TaggedFields>,
}

impl<R> ReadVersionedType<R> for Coordinator
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v >= 4);

        let key = String::read_compact(reader)?;
        let node_id = i32::read(reader)?;
        let host = String::read_compact(reader)?;
        let port = i32::read(reader)?;
        let error_code = Error::new(i16::read(reader)?);
        let error_message = ReadCompactType::read_compact(reader)?;
        let tagged_fields = (v >= 4).then(|| TaggedFields::read(reader)).transpose()?;

        Ok(Self {
            key,
            node_id,
            host,
            port,
            error_code,
            error_message,
            tagged_fields,
        })
    }
}

#[derive(Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub struct FindCoordinatorResponse {
    /// The duration in milliseconds for which the request was throttled due
    /// to a quota violation, or zero if the request did not violate any quota.
    ///
    /// Added in version 1
    pub throttle_time_ms: Option<i32>,

    /// The error code, or 0 if there was no error.
    ///
    /// Removed in version 4.
    pub error_code: Option<Error>,

    /// The error message, or null if there was no error.
    ///
    /// Added in version 1
    /// NULLABLE_STRING >= 1
    /// COMPACT_NULLABLE_STRING == 3
    /// Removed in version 4
    pub error_message: Option<String>,

    /// The node id
    ///
    /// Removed in version 4
    pub node_id: i32,

    /// The hostname
    ///
    /// STRING < 3
    /// COMPACT_STRING == 3
    /// Removed in version 4
    pub host: String,

    /// The port
    ///
    /// Removed in version 4
    pub port: i32,

    /// One entry per requested coordinator key.
    ///
    /// Added in version 4.
    pub coordinators: Vec<Coordinator>,

    /// The tagged fields.
    ///
    /// Added in version 3
    pub tagged_fields: Option<TaggedFields>,
}

impl<R> ReadVersionedType<R> for FindCoordinatorResponse
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 4);

        let throttle_time_ms = (v >= 1).then(|| i32::read(reader)).transpose()?;

        if v < 4 {
            let error_code = Error::new(i16::read(reader)?);

            let error_message = if v == 3 {
                ReadCompactType::read_compact(reader)?
            } else if v >= 1 {
                ReadType::read(reader)?
            } else {
                None
            };

            let node_id = i32::read(reader)?;
            let host = if v < 3 {
                String::read(reader)?
            } else {
                String::read_compact(reader)?
            };

            let port = i32::read(reader)?;

            let tagged_fields = (v >= 3).then(|| TaggedFields::read(reader)).transpose()?;

            Ok(Self {
                throttle_time_ms,
                error_code,
                error_message,
                node_id,
                host,
                port,
                coordinators: vec![],
                tagged_fields,
            })
        } else {
            let coordinators = read_compact_versioned_array(reader, version)?.unwrap_or_default();
            let tagged_fields = Some(TaggedFields::read(reader)?);

            Ok(Self {
                throttle_time_ms,
                error_code: None,
                error_message: None,
                node_id: -1,
                host: String::new(),
                port: -1,
                coordinators,
                tagged_fields,
            })
        }
    }
}
