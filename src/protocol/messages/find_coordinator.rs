use std::io::{Read, Write};

use crate::protocol::{
    api_key::ApiKey,
    api_version::{ApiVersion, ApiVersionRange},
    error::Error,
    messages::{
        ReadVersionedError, ReadVersionedType, RequestBody, WriteVersionedError,
        WriteVersionedType,
    },
    primitives::TaggedFields,
    traits::{ReadCompactType, ReadType, WriteCompactType, WriteType},
};

#[cfg(test)]
use proptest::prelude::*;

/// Kind of coordinator to look up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum CoordinatorType {
    Group,
    Transaction,
}

impl From<CoordinatorType> for i8 {
    fn from(t: CoordinatorType) -> Self {
        match t {
            CoordinatorType::Group => 0,
            CoordinatorType::Transaction => 1,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct FindCoordinatorRequest {
    /// The coordinator key, i.e. the group id for group coordinators.
    ///
    /// STRING < 3
    /// COMPACT_STRING == 3
    pub key: String,

    /// The coordinator key type.
    pub key_type: CoordinatorType,

    /// The tagged fields.
    ///
    /// Added in version 3.
    pub tagged_fields: Option<TaggedFields>,
}

impl FindCoordinatorRequest {
    pub fn group(group: impl Into<String>) -> Self {
        Self {
            key: group.into(),
            key_type: CoordinatorType::Group,
            tagged_fields: None,
        }
    }
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
        assert!((1..=3).contains(&v));

        if v >= 3 {
            self.key.write_compact(writer)?;
        } else {
            self.key.write(writer)?;
        }

        i8::from(self.key_type).write(writer)?;

        if v >= 3 {
            self.tagged_fields.write(writer)?;
        }

        Ok(())
    }
}

impl RequestBody for FindCoordinatorRequest {
    type ResponseBody = FindCoordinatorResponse;

    const API_KEY: ApiKey = ApiKey::FindCoordinator;

    /// Version 4 switches to batched keys, which we don't need.
    const API_VERSION_RANGE: ApiVersionRange = ApiVersionRange::new(1, 3);

    const FIRST_TAGGED_FIELD_IN_REQUEST_VERSION: ApiVersion = ApiVersion::new(3);
}

#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct FindCoordinatorResponse {
    /// The duration in milliseconds for which the request was throttled due to a
    /// quota violation, or zero if the request did not violate any quota.
    pub throttle_time_ms: i32,

    /// The error code, or 0 if there was no error.
    #[cfg_attr(
        test,
        proptest(strategy = "any::<i16>().prop_map(Error::new)")
    )]
    pub error_code: Option<Error>,

    /// The error message, or null if there was no error.
    ///
    /// NULLABLE_STRING < 3
    /// COMPACT_NULLABLE_STRING == 3
    pub error_message: Option<String>,

    /// The node id.
    pub node_id: i32,

    /// The host name.
    ///
    /// STRING < 3
    /// COMPACT_STRING == 3
    pub host: String,

    /// The port.
    pub port: i32,

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
        assert!((1..=3).contains(&v));

        let throttle_time_ms = i32::read(reader)?;
        let error_code = Error::new(i16::read(reader)?);
        let error_message = if v >= 3 {
            ReadCompactType::read_compact(reader)?
        } else {
            ReadType::read(reader)?
        };
        let node_id = i32::read(reader)?;
        let host = if v >= 3 {
            String::read_compact(reader)?
        } else {
            String::read(reader)?
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
            tagged_fields,
        })
    }
}

// this is not technically required for production but helpful for testing
impl<W> WriteVersionedType<W> for FindCoordinatorResponse
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!((1..=3).contains(&v));

        self.throttle_time_ms.write(writer)?;
        self.error_code.map(|e| e.code()).unwrap_or(0).write(writer)?;

        if v >= 3 {
            self.error_message.write_compact(writer)?;
        } else {
            self.error_message.write(writer)?;
        }

        self.node_id.write(writer)?;

        if v >= 3 {
            self.host.write_compact(writer)?;
        } else {
            self.host.write(writer)?;
        }

        self.port.write(writer)?;

        if v >= 3 {
            self.tagged_fields.write(writer)?;
        }

        Ok(())
    }
}
