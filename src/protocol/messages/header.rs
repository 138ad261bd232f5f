//! Request and response headers.
//!
//! Which header version is used depends on whether the body version uses tagged fields, see
//! [`RequestBody::FIRST_TAGGED_FIELD_IN_REQUEST_VERSION`](super::RequestBody::FIRST_TAGGED_FIELD_IN_REQUEST_VERSION).
use std::io::{Read, Write};

use crate::protocol::{
    api_key::ApiKey,
    api_version::ApiVersion,
    primitives::TaggedFields,
    traits::{ReadType, WriteType},
};

use super::{ReadVersionedError, ReadVersionedType, WriteVersionedError, WriteVersionedType};

#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct RequestHeader {
    /// The API key of this request.
    pub request_api_key: ApiKey,

    /// The API version of this request.
    pub request_api_version: ApiVersion,

    /// The correlation ID of this request.
    pub correlation_id: i32,

    /// The client ID string.
    ///
    /// Added in version 1.
    pub client_id: Option<String>,

    /// The tagged fields.
    ///
    /// Added in version 2.
    pub tagged_fields: Option<TaggedFields>,
}

// brokers parse this, we only need it to fake them in tests
impl<R> ReadVersionedType<R> for RequestHeader
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 2);

        Ok(Self {
            request_api_key: ApiKey::from(i16::read(reader)?),
            request_api_version: ApiVersion(i16::read(reader)?),
            correlation_id: i32::read(reader)?,
            client_id: if v >= 1 { ReadType::read(reader)? } else { None },
            tagged_fields: (v >= 2).then(|| TaggedFields::read(reader)).transpose()?,
        })
    }
}

impl<W> WriteVersionedType<W> for RequestHeader
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!(v <= 2);

        i16::from(self.request_api_key).write(writer)?;
        self.request_api_version.0.write(writer)?;
        self.correlation_id.write(writer)?;

        if v >= 1 {
            // the client id stays a classic nullable string even in flexible versions
            self.client_id.write(writer)?;
        }

        if v >= 2 {
            self.tagged_fields.write(writer)?;
        }

        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct ResponseHeader {
    /// The correlation ID of this response.
    pub correlation_id: i32,

    /// The tagged fields.
    ///
    /// Added in version 1.
    pub tagged_fields: Option<TaggedFields>,
}

impl<R> ReadVersionedType<R> for ResponseHeader
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 1);

        Ok(Self {
            correlation_id: i32::read(reader)?,
            tagged_fields: (v >= 1).then(|| TaggedFields::read(reader)).transpose()?,
        })
    }
}

// this is not technically required for production but helpful for testing
impl<W> WriteVersionedType<W> for ResponseHeader
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!(v <= 1);

        self.correlation_id.write(writer)?;

        if v >= 1 {
            self.tagged_fields.write(writer)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::test_utils::{
        assert_read_versioned, assert_write_versioned, test_roundtrip_versioned,
    };

    test_roundtrip_versioned!(
        RequestHeader,
        ApiVersion(0),
        ApiVersion(2),
        test_roundtrip_request_header
    );

    test_roundtrip_versioned!(
        ResponseHeader,
        ApiVersion(0),
        ApiVersion(1),
        test_roundtrip_response_header
    );

    #[test]
    fn request_header_v1() {
        let header = RequestHeader {
            request_api_key: ApiKey::DescribeGroups,
            request_api_version: ApiVersion(4),
            correlation_id: 7,
            client_id: Some("lag".to_string()),
            tagged_fields: None,
        };

        assert_write_versioned!(
            header,
            1,
            [
                0x00, 0x0F, // api key
                0x00, 0x04, // api version
                0x00, 0x00, 0x00, 0x07, // correlation id
                0x00, 0x03, b'l', b'a', b'g', // client id
            ]
        );

        assert_write_versioned!(
            header,
            2,
            [
                0x00, 0x0F, // api key
                0x00, 0x04, // api version
                0x00, 0x00, 0x00, 0x07, // correlation id
                0x00, 0x03, b'l', b'a', b'g', // client id
                0x00, // tagged fields
            ]
        );
    }

    #[test]
    fn response_header_v1() {
        assert_read_versioned!(
            ResponseHeader,
            [0x00, 0x00, 0x00, 0x2A, 0x00],
            1,
            ResponseHeader {
                correlation_id: 42,
                tagged_fields: Some(TaggedFields::default()),
            }
        );
    }
}
