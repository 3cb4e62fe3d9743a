use std::io::{Read, Write};

use crate::protocol::api_key::ApiKey;
use crate::protocol::api_version::{ApiVersion, ApiVersionRange};
use crate::protocol::error::Error;
use crate::protocol::messages::{
    ReadVersionedError, ReadVersionedType, RequestBody, WriteVersionedError, WriteVersionedType,
};
use crate::protocol::primitives::TaggedFields;
use crate::protocol::traits::{ReadCompactType, ReadType, WriteCompactType, WriteType};

#[derive(Debug)]
pub struct HeartbeatRequest {
    /// The group id.
    pub group_id: String,

    /// The generation of the group.
    pub generation_id: i32,

    /// The member ID.
    pub member_id: String,

    /// The unique identifier of the consumer instance provided by end user.
    ///
    /// Added in version 3.
    pub group_instance_id: Option<String>,

    /// The tagged fields.
    ///
    /// Added in version 4.
    pub tagged_fields: Option<TaggedFields>,
}

impl<W> WriteVersionedType<W> for HeartbeatRequest
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

        if v < 4 {
            self.group_id.write(writer)?;
        } else {
            self.group_id.write_compact(writer)?;
        }

        self.generation_id.write(writer)?;

        if v < 4 {
            self.member_id.write(writer)?;
        } else {
            self.member_id.write_compact(writer)?;
        }

        if v >= 3 {
            if v < 4 {
                self.group_instance_id.write(writer)?;
            } else {
                self.group_instance_id.write_compact(writer)?;
            }
        }

        if v >= 4 {
            self.tagged_fields.write(writer)?;
        }

        Ok(())
    }
}

impl RequestBody for HeartbeatRequest {
    type ResponseBody = HeartbeatResponse;
    const API_KEY: ApiKey = ApiKey::Heartbeat;
    const API_VERSION_RANGE: ApiVersionRange = ApiVersionRange::new(0, 4);
    const FIRST_TAGGED_FIELD_IN_REQUEST_VERSION: ApiVersion = ApiVersion(4);
}

#[derive(Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub struct HeartbeatResponse {
    /// The duration in milliseconds for which the request was throttled due
    /// to a quota violation, or zero if the request did not violate any
    /// quota.
    ///
    /// Added in version 1.
    pub throttle_time_ms: Option<i32>,

    /// The error code, or 0 if there was no error.
    pub error_code: Option<Error>,

    /// The tagged fields.
    ///
    /// Added in version 4.
    pub tagged_fields: Option<TaggedFields>,
}

impl<R> ReadVersionedType<R> for HeartbeatResponse
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 4);

        let throttle_time_ms = (v >= 1).then(|| i32::read(reader)).transpose()?;
        let error_code = Error::new(i16::read(reader)?);
        let tagged_fields = (v >= 4).then(|| TaggedFields::read(reader)).transpose()?;

        Ok(Self {
            throttle_time_ms,
            error_code,
            tagged_fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn request() {
        for (name, version, req, want) in [
            (
                "v0",
                0,
                HeartbeatRequest {
                    group_id: "group".to_string(),
                    generation_id: 5,
                    member_id: "member".to_string(),
                    group_instance_id: None,
                    tagged_fields: None,
                },
                [
                    0, 5, b'g', b'r', b'o', b'u', b'p', // group id
                    0, 0, 0, 5, // generation id
                    0, 6, b'm', b'e', b'm', b'b', b'e', b'r', // member id
                ]
                .as_ref(),
            ),
            (
                "v3 with instance id",
                3,
                HeartbeatRequest {
                    group_id: "group".to_string(),
                    generation_id: 5,
                    member_id: "member".to_string(),
                    group_instance_id: Some("instance".to_string()),
                    tagged_fields: None,
                },
                [
                    0, 5, b'g', b'r', b'o', b'u', b'p', // group id
                    0, 0, 0, 5, // generation id
                    0, 6, b'm', b'e', b'm', b'b', b'e', b'r', // member id
                    0, 8, b'i', b'n', b's', b't', b'a', b'n', b'c', b'e', // instance id
                ]
                .as_ref(),
            ),
        ] {
            let mut cursor = Cursor::new([0u8; 128]);
            req.write_versioned(&mut cursor, ApiVersion(version))
                .unwrap();
            let len = cursor.position() as usize;
            let got = &cursor.get_ref()[..len];
            assert_eq!(got, want, "{name}/{version}");
        }
    }

    #[test]
    fn response() {
        for (name, version, want, data) in [
            (
                "no error",
                0,
                HeartbeatResponse {
                    throttle_time_ms: None,
                    error_code: None,
                    tagged_fields: None,
                },
                [0, 0].as_ref(),
            ),
            (
                "error",
                1,
                HeartbeatResponse {
                    throttle_time_ms: Some(100),
                    error_code: Some(Error::RebalanceInProgress),
                    tagged_fields: None,
                },
                [0, 0, 0, 100, 0, 27].as_ref(),
            ),
        ] {
            let mut reader = Cursor::new(data);
            let got = HeartbeatResponse::read_versioned(&mut reader, ApiVersion(version)).unwrap();
            assert_eq!(got, want, "{name}/{version}");
        }
    }
}
