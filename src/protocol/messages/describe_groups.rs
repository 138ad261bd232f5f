use std::io::{Read, Write};

use crate::protocol::{
    api_key::ApiKey,
    api_version::{ApiVersion, ApiVersionRange},
    error::Error,
    messages::{
        read_versioned_array, write_versioned_array, ReadVersionedError, ReadVersionedType,
        RequestBody, WriteVersionedError, WriteVersionedType,
    },
    traits::{ReadType, WriteType},
};

#[cfg(test)]
use proptest::prelude::*;

#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct DescribeGroupsRequest {
    /// The names of the groups to describe.
    pub groups: Vec<String>,

    /// Whether to include authorized operations.
    ///
    /// Added in version 3.
    pub include_authorized_operations: bool,
}

impl RequestBody for DescribeGroupsRequest {
    type ResponseBody = DescribeGroupsResponse;

    const API_KEY: ApiKey = ApiKey::DescribeGroups;

    const API_VERSION_RANGE: ApiVersionRange = ApiVersionRange::new(0, 4);

    const FIRST_TAGGED_FIELD_IN_REQUEST_VERSION: ApiVersion = ApiVersion::new(5);
}

impl<W> WriteVersionedType<W> for DescribeGroupsRequest
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

        self.groups.write(writer)?;

        if v >= 3 {
            self.include_authorized_operations.write(writer)?;
        }

        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct DescribeGroupsResponseMember {
    /// The member ID assigned by the group coordinator.
    pub member_id: String,

    /// The unique identifier of the consumer instance provided by end user.
    ///
    /// Added in version 4
    pub group_instance_id: Option<String>,

    /// The client ID used in the member's latest join group request.
    pub client_id: String,

    /// The client host.
    pub client_host: String,

    /// The metadata corresponding to the current group protocol in use.
    pub member_metadata: Vec<u8>,

    /// The current assignment provided by the group leader.
    pub member_assignment: Vec<u8>,
}

impl<R> ReadVersionedType<R> for DescribeGroupsResponseMember
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 4);

        Ok(Self {
            member_id: String::read(reader)?,
            group_instance_id: if v >= 4 { ReadType::read(reader)? } else { None },
            client_id: String::read(reader)?,
            client_host: String::read(reader)?,
            member_metadata: ReadType::read(reader)?,
            member_assignment: ReadType::read(reader)?,
        })
    }
}

// this is not technically required for production but helpful for testing
impl<W> WriteVersionedType<W> for DescribeGroupsResponseMember
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

        self.member_id.write(writer)?;
        if v >= 4 {
            self.group_instance_id.write(writer)?;
        }
        self.client_id.write(writer)?;
        self.client_host.write(writer)?;
        self.member_metadata.write(writer)?;
        self.member_assignment.write(writer)?;

        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct DescribeGroupsResponseGroup {
    /// The describe error, or 0 if there was no error.
    #[cfg_attr(test, proptest(strategy = "any::<i16>().prop_map(Error::new)"))]
    pub error_code: Option<Error>,

    /// The group ID string.
    pub group_id: String,

    /// The group state string, or the empty string.
    pub group_state: String,

    /// The group protocol type, or the empty string.
    pub protocol_type: String,

    /// The group protocol data, or the empty string.
    pub protocol_data: String,

    /// The group members.
    #[cfg_attr(
        test,
        proptest(
            strategy = "prop::collection::vec(any::<DescribeGroupsResponseMember>(), 0..2)"
        )
    )]
    pub members: Vec<DescribeGroupsResponseMember>,

    /// 32-bit bitfield to represent authorized operations for this group.
    ///
    /// Added in version 3.
    pub authorized_operations: Option<i32>,
}

impl<R> ReadVersionedType<R> for DescribeGroupsResponseGroup
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 4);

        let error_code = Error::new(i16::read(reader)?);
        let group_id = String::read(reader)?;
        let group_state = String::read(reader)?;
        let protocol_type = String::read(reader)?;
        let protocol_data = String::read(reader)?;
        let members = read_versioned_array(reader, version)?.unwrap_or_default();
        let authorized_operations = (v >= 3).then(|| i32::read(reader)).transpose()?;

        Ok(Self {
            error_code,
            group_id,
            group_state,
            protocol_type,
            protocol_data,
            members,
            authorized_operations,
        })
    }
}

// this is not technically required for production but helpful for testing
impl<W> WriteVersionedType<W> for DescribeGroupsResponseGroup
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

        self.error_code.map(|e| e.code()).unwrap_or(0).write(writer)?;
        self.group_id.write(writer)?;
        self.group_state.write(writer)?;
        self.protocol_type.write(writer)?;
        self.protocol_data.write(writer)?;
        write_versioned_array(writer, version, Some(&self.members))?;

        if v >= 3 {
            // i32::MIN means "not requested"
            self.authorized_operations
                .unwrap_or(i32::MIN)
                .write(writer)?;
        }

        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct DescribeGroupsResponse {
    /// The duration in milliseconds for which the request was throttled due to a quota violation, or zero if the
    /// request did not violate any quota.
    ///
    /// Added in version 1.
    pub throttle_time_ms: Option<i32>,

    /// Each described group.
    #[cfg_attr(
        test,
        proptest(strategy = "prop::collection::vec(any::<DescribeGroupsResponseGroup>(), 0..2)")
    )]
    pub groups: Vec<DescribeGroupsResponseGroup>,
}

impl<R> ReadVersionedType<R> for DescribeGroupsResponse
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 4);

        let throttle_time_ms = (v >= 1).then(|| i32::read(reader)).transpose()?;
        let groups = read_versioned_array(reader, version)?.unwrap_or_default();

        Ok(Self {
            throttle_time_ms,
            groups,
        })
    }
}

// this is not technically required for production but helpful for testing
impl<W> WriteVersionedType<W> for DescribeGroupsResponse
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

        if v >= 1 {
            self.throttle_time_ms.unwrap_or(0).write(writer)?;
        }
        write_versioned_array(writer, version, Some(&self.groups))?;

        Ok(())
    }
}
