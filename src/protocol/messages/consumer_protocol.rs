//! Embedded consumer protocol payloads.
//!
//! These are not API messages by themselves. Brokers treat them as opaque bytes inside `DescribeGroups` (and the
//! join/sync requests), their layout is only defined by the Java consumer.
//!
//! # References
//! - <https://github.com/apache/kafka/blob/trunk/clients/src/main/resources/common/message/ConsumerProtocolAssignment.json>
use std::io::{Read, Write};

use crate::protocol::{
    traits::{ReadError, ReadType, WriteError, WriteType},
    vec_builder::VecBuilder,
};

#[derive(Debug, PartialEq, Eq, Clone)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct AssignedTopicPartitions {
    /// The topic name.
    pub topic: String,

    /// The assigned partitions of that topic.
    pub partitions: Vec<i32>,
}

impl<R> ReadType<R> for AssignedTopicPartitions
where
    R: Read,
{
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            topic: String::read(reader)?,
            partitions: Vec::<i32>::read(reader)?,
        })
    }
}

impl<W> WriteType<W> for AssignedTopicPartitions
where
    W: Write,
{
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.topic.write(writer)?;

        // partition lists are never null, not even empty ones
        i32::try_from(self.partitions.len())?.write(writer)?;
        for p in &self.partitions {
            p.write(writer)?;
        }

        Ok(())
    }
}

/// The assignment the group leader handed to one member.
///
/// All known versions (0 to 3) share the same layout: later versions only changed what the
/// subscription side carries.
#[derive(Debug, PartialEq, Eq, Clone)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct ConsumerProtocolAssignment {
    pub version: i16,

    pub assigned_partitions: Vec<AssignedTopicPartitions>,

    /// Opaque assignor data, null if the assignor provided none.
    pub user_data: Option<Vec<u8>>,
}

impl<R> ReadType<R> for ConsumerProtocolAssignment
where
    R: Read,
{
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let version = i16::read(reader)?;

        let len = i32::read(reader)?;
        let assigned_partitions = if len < 0 {
            vec![]
        } else {
            let len = usize::try_from(len)?;
            let mut builder = VecBuilder::new(len);
            for _ in 0..len {
                builder.push(AssignedTopicPartitions::read(reader)?);
            }
            builder.into()
        };

        let user_data = match i32::read(reader)? {
            -1 => None,
            l if l < -1 => {
                return Err(ReadError::Malformed(
                    format!("Invalid negative length for user data: {l}").into(),
                ))
            }
            l => Some(VecBuilder::new(usize::try_from(l)?).read_exact(reader)?.into()),
        };

        Ok(Self {
            version,
            assigned_partitions,
            user_data,
        })
    }
}

impl<W> WriteType<W> for ConsumerProtocolAssignment
where
    W: Write,
{
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.version.write(writer)?;

        i32::try_from(self.assigned_partitions.len())?.write(writer)?;
        for assignment in &self.assigned_partitions {
            assignment.write(writer)?;
        }

        match &self.user_data {
            Some(data) => data.write(writer)?,
            None => (-1i32).write(writer)?,
        }

        Ok(())
    }
}
