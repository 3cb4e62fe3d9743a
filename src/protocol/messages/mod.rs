//! Versioned request/response bodies.
//!
//! Every message type in this module is dispatched on an [`ApiVersion`]
//! instead of being a fixed wire shape: the same Rust struct reads and
//! writes whichever subset of fields a given broker version actually puts
//! on the wire. [`RequestBody`] ties a request type to its `ApiKey`, the
//! version range this crate is willing to negotiate, and the version at
//! which tagged fields (flexible versions) start appearing.

use std::io::{Read, Write};

use thiserror::Error;

use crate::protocol::api_key::ApiKey;
use crate::protocol::api_version::{ApiVersion, ApiVersionRange};
use crate::protocol::traits::{ReadError, WriteError};
use crate::protocol::vec_builder::VecBuilder;

pub mod add_offsets_to_txn;
pub mod add_partitions_to_txn;
pub mod api_versions;
pub mod consumer_group;
pub mod consumer_group_heartbeat;
pub mod create_topics;
pub mod delete_groups;
pub mod delete_topics;
pub mod describe_groups;
pub mod end_txn;
pub mod fetch;
pub mod find_coordinator;
pub mod header;
pub mod heartbeat;
pub mod init_producer_id;
pub mod join_group;
pub mod leave_group;
pub mod list_groups;
pub mod list_offsets;
pub mod metadata;
pub mod offset_commit;
pub mod offset_fetch;
pub mod produce;
pub mod sasl_msg;
pub mod sync_group;
pub mod txn_offset_commit;

#[cfg(test)]
pub(crate) mod test_utils;

pub use add_offsets_to_txn::*;
pub use add_partitions_to_txn::*;
pub use api_versions::*;
pub use consumer_group::*;
pub use consumer_group_heartbeat::*;
pub use create_topics::*;
pub use delete_groups::*;
pub use delete_topics::*;
pub use describe_groups::*;
pub use end_txn::*;
pub use fetch::*;
pub use find_coordinator::*;
pub use header::*;
pub use heartbeat::*;
pub use init_producer_id::*;
pub use join_group::*;
pub use leave_group::*;
pub use list_groups::*;
pub use list_offsets::*;
pub use metadata::*;
pub use offset_commit::*;
pub use offset_fetch::*;
pub use produce::*;
pub use sasl_msg::*;
pub use sync_group::*;
pub use txn_offset_commit::*;

/// Controls which transactional records `Fetch` returns, per KIP-98.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum IsolationLevel {
    #[default]
    ReadUncommitted,
    ReadCommitted,
}

impl From<IsolationLevel> for i8 {
    fn from(level: IsolationLevel) -> Self {
        match level {
            IsolationLevel::ReadUncommitted => 0,
            IsolationLevel::ReadCommitted => 1,
        }
    }
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ReadVersionedError {
    #[error(transparent)]
    ReadError(#[from] ReadError),
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum WriteVersionedError {
    #[error(transparent)]
    WriteError(#[from] WriteError),

    #[error("Field '{field}' is not available in version {version}")]
    FieldNotAvailable { version: ApiVersion, field: String },
}

/// A type that can be read off the wire for a given negotiated [`ApiVersion`].
pub trait ReadVersionedType<R>: Sized
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError>;
}

/// A type that can be written to the wire for a given negotiated [`ApiVersion`].
pub trait WriteVersionedType<W>: Sized
where
    W: Write,
{
    fn write_versioned(&self, writer: &mut W, version: ApiVersion) -> Result<(), WriteVersionedError>;
}

/// Ties a request body to its API key, the version range this crate
/// negotiates, and the version at which request/response headers start
/// carrying tagged fields (flexible versions).
pub trait RequestBody {
    type ResponseBody;

    const API_KEY: ApiKey;
    const API_VERSION_RANGE: ApiVersionRange;
    const FIRST_TAGGED_FIELD_IN_REQUEST_VERSION: ApiVersion;

    /// Some APIs (notably `ApiVersions`) negotiate flexible request headers
    /// earlier than flexible response headers. Defaults to matching the
    /// request version.
    const FIRST_TAGGED_FIELD_IN_RESPONSE_VERSION: ApiVersion =
        Self::FIRST_TAGGED_FIELD_IN_REQUEST_VERSION;
}

/// Reads a legacy `[T]` array: an `INT32` length (`-1` for a null array)
/// followed by that many versioned elements.
pub(crate) fn read_versioned_array<R, T>(
    reader: &mut R,
    version: ApiVersion,
) -> Result<Option<Vec<T>>, ReadVersionedError>
where
    R: Read,
    T: ReadVersionedType<R>,
{
    use crate::protocol::traits::ReadType;

    let len = i32::read(reader).map_err(ReadVersionedError::from)?;
    match len {
        -1 => Ok(None),
        len if len < -1 => Err(ReadVersionedError::from(ReadError::Malformed(
            format!("invalid negative array length: {len}").into(),
        ))),
        len => {
            let len = usize::try_from(len).map_err(ReadError::Overflow)?;
            let mut res = VecBuilder::new(len);
            for _ in 0..len {
                res.push(T::read_versioned(reader, version)?);
            }
            Ok(Some(res.into()))
        }
    }
}

/// Writes a legacy `[T]` array (`None` is encoded as length `-1`).
pub(crate) fn write_versioned_array<W, T>(
    writer: &mut W,
    version: ApiVersion,
    values: Option<&Vec<T>>,
) -> Result<(), WriteVersionedError>
where
    W: Write,
    T: WriteVersionedType<W>,
{
    use crate::protocol::traits::WriteType;

    match values {
        None => (-1i32).write(writer).map_err(WriteVersionedError::from)?,
        Some(values) => {
            let len = i32::try_from(values.len()).map_err(WriteError::Overflow)?;
            len.write(writer)?;
            for value in values {
                value.write_versioned(writer, version)?;
            }
        }
    }

    Ok(())
}

/// Reads a compact (flexible-version) array: an unsigned varint length+1
/// (`0` for a null array) followed by that many versioned elements.
pub(crate) fn read_compact_versioned_array<R, T>(
    reader: &mut R,
    version: ApiVersion,
) -> Result<Option<Vec<T>>, ReadVersionedError>
where
    R: Read,
    T: ReadVersionedType<R>,
{
    use crate::protocol::primitives::UnsignedVarint;
    use crate::protocol::traits::ReadType;

    let len = UnsignedVarint::read(reader).map_err(ReadVersionedError::from)?.0;
    match len {
        0 => Ok(None),
        len => {
            let len = usize::try_from(len - 1).map_err(ReadError::Overflow)?;
            let mut res = VecBuilder::new(len);
            for _ in 0..len {
                res.push(T::read_versioned(reader, version)?);
            }
            Ok(Some(res.into()))
        }
    }
}

/// Writes a compact (flexible-version) array (`None` is encoded as length `0`).
pub(crate) fn write_compact_versioned_array<W, T>(
    writer: &mut W,
    version: ApiVersion,
    values: Option<&Vec<T>>,
) -> Result<(), WriteVersionedError>
where
    W: Write,
    T: WriteVersionedType<W>,
{
    use crate::protocol::primitives::UnsignedVarint;
    use crate::protocol::traits::WriteType;

    match values {
        None => UnsignedVarint(0).write(writer).map_err(WriteVersionedError::from)?,
        Some(values) => {
            let len = u64::try_from(values.len() + 1).map_err(WriteError::Overflow)?;
            UnsignedVarint(len).write(writer)?;
            for value in values {
                value.write_versioned(writer, version)?;
            }
        }
    }

    Ok(())
}
