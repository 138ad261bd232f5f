//! `ListOffsets` request and response.
//!
//! # References
//! - [KIP-79](https://cwiki.apache.org/confluence/pages/viewpage.action?pageId=65868090)
//! - [KIP-98](https://cwiki.apache.org/confluence/display/KAFKA/KIP-98+-+Exactly+Once+Delivery+and+Transactional+Messaging)
use std::io::{Read, Write};

use crate::protocol::{
    api_key::ApiKey,
    api_version::{ApiVersion, ApiVersionRange},
    error::Error as ApiError,
    messages::{read_versioned_array, write_versioned_array, IsolationLevel},
    traits::{ReadType, WriteType},
};

use super::{
    ReadVersionedError, ReadVersionedType, RequestBody, WriteVersionedError, WriteVersionedType,
};

#[cfg(test)]
use proptest::prelude::*;

/// Special timestamp asking for the offset of the next message to be produced.
pub const LATEST_TIMESTAMP: i64 = -1;

#[derive(Debug, PartialEq, Eq)]
pub struct ListOffsetsRequestPartition {
    /// The partition index.
    pub partition_index: i32,

    /// The current timestamp.
    ///
    /// Per [KIP-79] this can have special values, [`LATEST_TIMESTAMP`] is the one used here.
    ///
    /// [KIP-79]: https://cwiki.apache.org/confluence/pages/viewpage.action?pageId=65868090
    pub timestamp: i64,

    /// The maximum number of offsets to report.
    ///
    /// Defaults to 1.
    ///
    /// Removed in version 1.
    pub max_num_offsets: Option<i32>,
}

impl<W> WriteVersionedType<W> for ListOffsetsRequestPartition
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
        self.timestamp.write(writer)?;

        if v == 0 {
            self.max_num_offsets.unwrap_or(1).write(writer)?;
        }

        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ListOffsetsRequestTopic {
    /// The topic name.
    pub name: String,

    /// Each partition in the request.
    pub partitions: Vec<ListOffsetsRequestPartition>,
}

impl<W> WriteVersionedType<W> for ListOffsetsRequestTopic
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

        self.name.write(writer)?;
        write_versioned_array(writer, version, Some(&self.partitions))?;

        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ListOffsetsRequest {
    /// The broker ID of the requestor, or -1 if this request is being made by a normal consumer.
    pub replica_id: i32,

    /// This setting controls the visibility of transactional records.
    ///
    /// As per [KIP-98] the default is `READ_UNCOMMITTED`.
    ///
    /// Added in version 2.
    ///
    /// [KIP-98]: https://cwiki.apache.org/confluence/display/KAFKA/KIP-98+-+Exactly+Once+Delivery+and+Transactional+Messaging
    pub isolation_level: Option<IsolationLevel>,

    /// Each topic in the request.
    pub topics: Vec<ListOffsetsRequestTopic>,
}

impl ListOffsetsRequest {
    /// Consumer request for a single partition.
    pub fn single(topic: impl Into<String>, partition: i32, timestamp: i64) -> Self {
        Self {
            replica_id: -1,
            isolation_level: None,
            topics: vec![ListOffsetsRequestTopic {
                name: topic.into(),
                partitions: vec![ListOffsetsRequestPartition {
                    partition_index: partition,
                    timestamp,
                    max_num_offsets: None,
                }],
            }],
        }
    }
}

impl<W> WriteVersionedType<W> for ListOffsetsRequest
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

        self.replica_id.write(writer)?;

        if v >= 2 {
            i8::from(self.isolation_level.unwrap_or_default()).write(writer)?;
        }

        write_versioned_array(writer, version, Some(&self.topics))?;

        Ok(())
    }
}

impl RequestBody for ListOffsetsRequest {
    type ResponseBody = ListOffsetsResponse;

    const API_KEY: ApiKey = ApiKey::ListOffsets;

    const API_VERSION_RANGE: ApiVersionRange = ApiVersionRange::new(0, 3);

    const FIRST_TAGGED_FIELD_IN_REQUEST_VERSION: ApiVersion = ApiVersion(6);
}

#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct ListOffsetsResponsePartition {
    /// The partition index.
    pub partition_index: i32,

    /// The partition error code, or 0 if there was no error.
    #[cfg_attr(test, proptest(strategy = "any::<i16>().prop_map(ApiError::new)"))]
    pub error_code: Option<ApiError>,

    /// The result offsets.
    ///
    /// Removed in version 1.
    pub old_style_offsets: Option<Vec<i64>>,

    /// The timestamp associated with the returned offset.
    ///
    /// Added in version 1.
    pub timestamp: Option<i64>,

    /// The returned offset.
    ///
    /// Added in version 1.
    pub offset: Option<i64>,
}

impl ListOffsetsResponsePartition {
    /// The offset answered by the broker, whichever version was spoken.
    pub fn resolved_offset(&self) -> Option<i64> {
        self.offset.or_else(|| {
            self.old_style_offsets
                .as_ref()
                .and_then(|offsets| offsets.first().copied())
        })
    }
}

impl<R> ReadVersionedType<R> for ListOffsetsResponsePartition
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 3);

        Ok(Self {
            partition_index: i32::read(reader)?,
            error_code: ApiError::new(i16::read(reader)?),
            old_style_offsets: (v < 1).then(|| Vec::<i64>::read(reader)).transpose()?,
            timestamp: (v >= 1).then(|| i64::read(reader)).transpose()?,
            offset: (v >= 1).then(|| i64::read(reader)).transpose()?,
        })
    }
}

// this is not technically required for production but helpful for testing
impl<W> WriteVersionedType<W> for ListOffsetsResponsePartition
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
        self.error_code.map(|e| e.code()).unwrap_or(0).write(writer)?;

        if v < 1 {
            match &self.old_style_offsets {
                Some(offsets) => offsets.write(writer)?,
                None => Vec::<i64>::new().write(writer)?,
            }
        } else {
            self.timestamp.unwrap_or(-1).write(writer)?;
            self.offset.unwrap_or(-1).write(writer)?;
        }

        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct ListOffsetsResponseTopic {
    /// The topic name.
    pub name: String,

    /// Each partition in the response.
    #[cfg_attr(
        test,
        proptest(strategy = "prop::collection::vec(any::<ListOffsetsResponsePartition>(), 0..2)")
    )]
    pub partitions: Vec<ListOffsetsResponsePartition>,
}

impl<R> ReadVersionedType<R> for ListOffsetsResponseTopic
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 3);

        Ok(Self {
            name: String::read(reader)?,
            partitions: read_versioned_array(reader, version)?.unwrap_or_default(),
        })
    }
}

// this is not technically required for production but helpful for testing
impl<W> WriteVersionedType<W> for ListOffsetsResponseTopic
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

        self.name.write(writer)?;
        write_versioned_array(writer, version, Some(&self.partitions))?;

        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct ListOffsetsResponse {
    /// The duration in milliseconds for which the request was throttled due to a quota violation, or zero if the
    /// request did not violate any quota.
    ///
    /// Added in version 2.
    pub throttle_time_ms: Option<i32>,

    /// Each topic in the response.
    #[cfg_attr(
        test,
        proptest(strategy = "prop::collection::vec(any::<ListOffsetsResponseTopic>(), 0..2)")
    )]
    pub topics: Vec<ListOffsetsResponseTopic>,
}

impl<R> ReadVersionedType<R> for ListOffsetsResponse
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 3);

        Ok(Self {
            throttle_time_ms: (v >= 2).then(|| i32::read(reader)).transpose()?,
            topics: read_versioned_array(reader, version)?.unwrap_or_default(),
        })
    }
}

// this is not technically required for production but helpful for testing
impl<W> WriteVersionedType<W> for ListOffsetsResponse
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

        if v >= 2 {
            self.throttle_time_ms.unwrap_or(0).write(writer)?;
        }
        write_versioned_array(writer, version, Some(&self.topics))?;

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
        ListOffsetsResponse,
        ListOffsetsRequest::API_VERSION_RANGE.min(),
        ListOffsetsRequest::API_VERSION_RANGE.max(),
        test_roundtrip_list_offsets_response
    );

    #[test]
    fn request_latest() {
        let req = ListOffsetsRequest::single("t", 1, LATEST_TIMESTAMP);

        assert_write_versioned!(
            req,
            0,
            [
                0xFF, 0xFF, 0xFF, 0xFF, // replica id
                0x00, 0x00, 0x00, 0x01, // topics length
                0x00, 0x01, b't', // topic
                0x00, 0x00, 0x00, 0x01, // partitions length
                0x00, 0x00, 0x00, 0x01, // partition
                0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, // timestamp
                0x00, 0x00, 0x00, 0x01, // max num offsets
            ]
        );

        assert_write_versioned!(
            req,
            2,
            [
                0xFF, 0xFF, 0xFF, 0xFF, // replica id
                0x00, // isolation level
                0x00, 0x00, 0x00, 0x01, // topics length
                0x00, 0x01, b't', // topic
                0x00, 0x00, 0x00, 0x01, // partitions length
                0x00, 0x00, 0x00, 0x01, // partition
                0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, // timestamp
            ]
        );
    }

    #[test]
    fn response_v0_old_style_offsets() {
        let data = [
            0x00, 0x00, 0x00, 0x01, // topics length
            0x00, 0x01, b't', // topic
            0x00, 0x00, 0x00, 0x01, // partitions length
            0x00, 0x00, 0x00, 0x01, // partition
            0x00, 0x00, // error code
            0x00, 0x00, 0x00, 0x01, // offsets length
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x78, // offset
        ];

        let want = ListOffsetsResponse {
            throttle_time_ms: None,
            topics: vec![ListOffsetsResponseTopic {
                name: "t".to_string(),
                partitions: vec![ListOffsetsResponsePartition {
                    partition_index: 1,
                    error_code: None,
                    old_style_offsets: Some(vec![120]),
                    timestamp: None,
                    offset: None,
                }],
            }],
        };
        assert_eq!(want.topics[0].partitions[0].resolved_offset(), Some(120));

        assert_read_versioned!(ListOffsetsResponse, data, 0, want);
    }

    #[test]
    fn response_v1_offset() {
        let data = [
            0x00, 0x00, 0x00, 0x01, // topics length
            0x00, 0x01, b't', // topic
            0x00, 0x00, 0x00, 0x01, // partitions length
            0x00, 0x00, 0x00, 0x00, // partition
            0x00, 0x06, // NOT_LEADER_OR_FOLLOWER
            0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, // timestamp
            0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, // offset
        ];

        assert_read_versioned!(
            ListOffsetsResponse,
            data,
            1,
            ListOffsetsResponse {
                throttle_time_ms: None,
                topics: vec![ListOffsetsResponseTopic {
                    name: "t".to_string(),
                    partitions: vec![ListOffsetsResponsePartition {
                        partition_index: 0,
                        error_code: Some(ApiError::NotLeaderOrFollower),
                        old_style_offsets: None,
                        timestamp: Some(-1),
                        offset: Some(-1),
                    }],
                }],
            }
        );
    }
}
