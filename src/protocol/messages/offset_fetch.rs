use std::io::{Read, Write};

use crate::protocol::{
    api_key::ApiKey,
    api_version::{ApiVersion, ApiVersionRange},
    error::Error,
    messages::{
        read_compact_versioned_array, read_versioned_array, write_compact_versioned_array,
        write_versioned_array, ReadVersionedError, ReadVersionedType, RequestBody,
        WriteVersionedError, WriteVersionedType,
    },
    primitives::TaggedFields,
    traits::{ReadCompactType, ReadType, WriteCompactType, WriteType},
};

#[cfg(test)]
use proptest::prelude::*;

#[derive(Debug, PartialEq, Eq)]
pub struct OffsetFetchRequestTopic {
    /// The topic name.
    ///
    /// COMPACT_STRING > 5
    pub name: String,

    /// The partition indexes we would like to fetch offsets for.
    pub partition_indexes: Vec<i32>,

    /// The tagged fields
    ///
    /// Added in version 6
    pub tagged_fields: Option<TaggedFields>,
}

impl<W> WriteVersionedType<W> for OffsetFetchRequestTopic
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!(v <= 7);

        if v >= 6 {
            self.name.write_compact(writer)?;
            self.partition_indexes.write_compact(writer)?;
            self.tagged_fields.write(writer)?;
        } else {
            self.name.write(writer)?;

            // an empty partition list is still a list here, never null
            i32::try_from(self.partition_indexes.len())
                .map_err(crate::protocol::traits::WriteError::from)?
                .write(writer)?;
            for index in &self.partition_indexes {
                index.write(writer)?;
            }
        }

        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct OffsetFetchRequest {
    /// The group to fetch offsets for.
    pub group_id: String,

    /// Each topic we would like to fetch offsets for, or null to fetch
    /// offsets for all topics.
    ///
    /// Null is supported since version 2.
    pub topics: Option<Vec<OffsetFetchRequestTopic>>,

    /// Whether broker should hold on returning unstable offsets but set
    /// a retriable error code for the partitions.
    ///
    /// Added in version 7
    pub require_stable: bool,

    /// The tagged fields
    ///
    /// Added in version 6
    pub tagged_fields: Option<TaggedFields>,
}

impl OffsetFetchRequest {
    /// Ask for every offset the group has committed.
    pub fn all_topics(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            topics: None,
            require_stable: false,
            tagged_fields: None,
        }
    }

    /// Ask for the committed offsets of some partitions of a single topic.
    pub fn partitions(
        group_id: impl Into<String>,
        topic: impl Into<String>,
        partition_indexes: Vec<i32>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            topics: Some(vec![OffsetFetchRequestTopic {
                name: topic.into(),
                partition_indexes,
                tagged_fields: None,
            }]),
            require_stable: false,
            tagged_fields: None,
        }
    }
}

impl<W> WriteVersionedType<W> for OffsetFetchRequest
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!(v <= 7);

        if self.topics.is_none() && v < 2 {
            return Err(WriteVersionedError::FieldNotAvailable {
                version,
                field: "topics=null".to_string(),
            });
        }

        if v >= 6 {
            self.group_id.write_compact(writer)?;
            write_compact_versioned_array(writer, version, self.topics.as_deref())?;
        } else {
            self.group_id.write(writer)?;
            write_versioned_array(writer, version, self.topics.as_deref())?;
        }

        if v >= 7 {
            self.require_stable.write(writer)?;
        }

        if v >= 6 {
            self.tagged_fields.write(writer)?;
        }

        Ok(())
    }
}

impl RequestBody for OffsetFetchRequest {
    type ResponseBody = OffsetFetchResponse;
    const API_KEY: ApiKey = ApiKey::OffsetFetch;

    /// Version 8 batches groups, which we don't need.
    const API_VERSION_RANGE: ApiVersionRange = ApiVersionRange::new(0, 7);
    const FIRST_TAGGED_FIELD_IN_REQUEST_VERSION: ApiVersion = ApiVersion(6);
}

#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct OffsetFetchResponseTopicPartition {
    /// The partition index.
    pub partition_index: i32,

    /// The committed message offset, `-1` if nothing was committed.
    pub committed_offset: i64,

    /// The leader epoch.
    ///
    /// Added in version 5
    pub committed_leader_epoch: Option<i32>,

    /// The partition metadata.
    ///
    /// NULLABLE_STRING >= 0
    /// COMPACT_NULLABLE_STRING >= 6
    pub metadata: Option<String>,

    /// The error code, or 0 if there was no error.
    #[cfg_attr(test, proptest(strategy = "any::<i16>().prop_map(Error::new)"))]
    pub error_code: Option<Error>,

    /// The tagged fields
    ///
    /// Added in version 6
    pub tagged_fields: Option<TaggedFields>,
}

impl<R> ReadVersionedType<R> for OffsetFetchResponseTopicPartition
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 7);

        let partition_index = i32::read(reader)?;
        let committed_offset = i64::read(reader)?;
        let committed_leader_epoch = (v >= 5).then(|| i32::read(reader)).transpose()?;
        let metadata = if v >= 6 {
            ReadCompactType::read_compact(reader)?
        } else {
            ReadType::read(reader)?
        };
        let error_code = Error::new(i16::read(reader)?);
        let tagged_fields = (v >= 6).then(|| TaggedFields::read(reader)).transpose()?;

        Ok(Self {
            partition_index,
            committed_offset,
            committed_leader_epoch,
            metadata,
            error_code,
            tagged_fields,
        })
    }
}

// this is not technically required for production but helpful for testing
impl<W> WriteVersionedType<W> for OffsetFetchResponseTopicPartition
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!(v <= 7);

        self.partition_index.write(writer)?;
        self.committed_offset.write(writer)?;
        if v >= 5 {
            self.committed_leader_epoch.unwrap_or(-1).write(writer)?;
        }
        if v >= 6 {
            self.metadata.write_compact(writer)?;
        } else {
            self.metadata.write(writer)?;
        }
        self.error_code.map(|e| e.code()).unwrap_or(0).write(writer)?;
        if v >= 6 {
            self.tagged_fields.write(writer)?;
        }

        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct OffsetFetchResponseTopic {
    /// The topic name.
    ///
    /// COMPACT_STRING > 5
    pub name: String,

    /// The responses per partition
    #[cfg_attr(
        test,
        proptest(
            strategy = "prop::collection::vec(any::<OffsetFetchResponseTopicPartition>(), 0..2)"
        )
    )]
    pub partitions: Vec<OffsetFetchResponseTopicPartition>,

    /// The tagged_fields
    ///
    /// Added in version 6
    pub tagged_fields: Option<TaggedFields>,
}

impl<R> ReadVersionedType<R> for OffsetFetchResponseTopic
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 7);

        let (name, partitions) = if v >= 6 {
            (
                String::read_compact(reader)?,
                read_compact_versioned_array(reader, version)?,
            )
        } else {
            (String::read(reader)?, read_versioned_array(reader, version)?)
        };
        let tagged_fields = (v >= 6).then(|| TaggedFields::read(reader)).transpose()?;

        Ok(Self {
            name,
            partitions: partitions.unwrap_or_default(),
            tagged_fields,
        })
    }
}

// this is not technically required for production but helpful for testing
impl<W> WriteVersionedType<W> for OffsetFetchResponseTopic
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!(v <= 7);

        if v >= 6 {
            self.name.write_compact(writer)?;
            write_compact_versioned_array(writer, version, Some(&self.partitions))?;
            self.tagged_fields.write(writer)?;
        } else {
            self.name.write(writer)?;
            write_versioned_array(writer, version, Some(&self.partitions))?;
        }

        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct OffsetFetchResponse {
    /// The duration in milliseconds for which the request was throttled due to
    /// a quota violation, or zero if the request did not violate any quota.
    ///
    /// Added in version 3
    pub throttle_time_ms: Option<i32>,

    /// The responses per topic.
    #[cfg_attr(
        test,
        proptest(strategy = "prop::collection::vec(any::<OffsetFetchResponseTopic>(), 0..2)")
    )]
    pub topics: Vec<OffsetFetchResponseTopic>,

    /// The top-level error code, or 0 if there was no error.
    ///
    /// Added in version 2
    #[cfg_attr(test, proptest(strategy = "any::<i16>().prop_map(Error::new)"))]
    pub error_code: Option<Error>,

    /// The tagged fields
    ///
    /// Added in version 6
    pub tagged_fields: Option<TaggedFields>,
}

impl<R> ReadVersionedType<R> for OffsetFetchResponse
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 7);

        let throttle_time_ms = (v >= 3).then(|| i32::read(reader)).transpose()?;
        let topics = if v >= 6 {
            read_compact_versioned_array(reader, version)?
        } else {
            read_versioned_array(reader, version)?
        };
        let error_code = if v >= 2 {
            Error::new(i16::read(reader)?)
        } else {
            None
        };
        let tagged_fields = (v >= 6).then(|| TaggedFields::read(reader)).transpose()?;

        Ok(Self {
            throttle_time_ms,
            topics: topics.unwrap_or_default(),
            error_code,
            tagged_fields,
        })
    }
}

// this is not technically required for production but helpful for testing
impl<W> WriteVersionedType<W> for OffsetFetchResponse
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!(v <= 7);

        if v >= 3 {
            self.throttle_time_ms.unwrap_or(0).write(writer)?;
        }
        if v >= 6 {
            write_compact_versioned_array(writer, version, Some(&self.topics))?;
        } else {
            write_versioned_array(writer, version, Some(&self.topics))?;
        }
        if v >= 2 {
            self.error_code.map(|e| e.code()).unwrap_or(0).write(writer)?;
        }
        if v >= 6 {
            self.tagged_fields.write(writer)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use assert_matches::assert_matches;

    use super::*;
    use crate::protocol::messages::test_utils::{
        assert_read_versioned, assert_write_versioned, test_roundtrip_versioned,
    };

    test_roundtrip_versioned!(
        OffsetFetchResponse,
        OffsetFetchRequest::API_VERSION_RANGE.min(),
        OffsetFetchRequest::API_VERSION_RANGE.max(),
        test_roundtrip_offset_fetch_response
    );

    const ONE_PARTITION: [u8; 33] = [
        0x00, 0x04, b'b', b'l', b'a', b'h', // group
        0x00, 0x00, 0x00, 0x01, // topics length
        0x00, 0x0D, b't', b'o', b'p', b'i', b'c', b'T', b'h', b'e', b'F', b'i', b'r', b's',
        b't', // topic
        0x00, 0x00, 0x00, 0x01, // partitions length
        0x4F, 0x4F, 0x4F, 0x4F, // partition
    ];

    const ONE_PARTITION_V7: [u8; 28] = [
        0x05, b'b', b'l', b'a', b'h', // group
        0x02, // topics length
        0x0E, b't', b'o', b'p', b'i', b'c', b'T', b'h', b'e', b'F', b'i', b'r', b's',
        b't', // topic
        0x02, // partitions length
        0x4F, 0x4F, 0x4F, 0x4F, // partition
        0x00, // topic tagged fields
        0x00, // require stable
        0x00, // tagged fields
    ];

    #[test]
    fn request_one_partition() {
        let req = OffsetFetchRequest::partitions("blah", "topicTheFirst", vec![0x4f4f4f4f]);

        for version in 0..=5 {
            assert_write_versioned!(req, version, ONE_PARTITION);
        }
        assert_write_versioned!(req, 7, ONE_PARTITION_V7);
    }

    #[test]
    fn request_all_topics() {
        let req = OffsetFetchRequest::all_topics("blah");

        assert_write_versioned!(
            req,
            2,
            [
                0x00, 0x04, b'b', b'l', b'a', b'h', // group
                0xFF, 0xFF, 0xFF, 0xFF, // null topics
            ]
        );

        assert_write_versioned!(
            req,
            6,
            [
                0x05, b'b', b'l', b'a', b'h', // group
                0x00, // null topics
                0x00, // tagged fields
            ]
        );
    }

    #[test]
    fn request_all_topics_not_available_before_v2() {
        let req = OffsetFetchRequest::all_topics("blah");

        for version in 0..2 {
            let err = req
                .write_versioned(&mut Vec::new(), ApiVersion(version))
                .unwrap_err();
            assert_matches!(err, WriteVersionedError::FieldNotAvailable { .. });
        }
    }

    #[test]
    fn response_error() {
        for version in 3..=5 {
            assert_read_versioned!(
                OffsetFetchResponse,
                [0x00, 0x00, 0x00, 0x09, 0x00, 0x00, 0x00, 0x00, 0x00, 0x2A],
                version,
                OffsetFetchResponse {
                    throttle_time_ms: Some(9),
                    topics: vec![],
                    error_code: Some(Error::InvalidRequest),
                    tagged_fields: None,
                }
            );
        }
    }

    #[test]
    fn response_partition_v1() {
        let data = [
            0x00, 0x00, 0x00, 0x01, // topics length
            0x00, 0x01, b't', // topic
            0x00, 0x00, 0x00, 0x01, // partitions length
            0x00, 0x00, 0x00, 0x00, // partition
            0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, // committed offset
            0xFF, 0xFF, // null metadata
            0x00, 0x00, // error code
        ];

        let got =
            OffsetFetchResponse::read_versioned(&mut Cursor::new(data), ApiVersion(1)).unwrap();
        assert_eq!(
            got.topics,
            vec![OffsetFetchResponseTopic {
                name: "t".to_string(),
                partitions: vec![OffsetFetchResponseTopicPartition {
                    partition_index: 0,
                    committed_offset: -1,
                    committed_leader_epoch: None,
                    metadata: None,
                    error_code: None,
                    tagged_fields: None,
                }],
                tagged_fields: None,
            }]
        );
        assert_eq!(got.error_code, None);
    }
}
