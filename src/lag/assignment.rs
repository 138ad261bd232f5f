//! Decoding of the assignment payloads the group leader hands out.
use std::collections::BTreeMap;
use std::io::Cursor;

use thiserror::Error;
use tracing::warn;

use crate::protocol::{
    messages::ConsumerProtocolAssignment,
    traits::{ReadError, ReadType},
};

use super::{ConsumerGroup, Member, PartitionOwner, CONSUMER_PROTOCOL_TYPE};

/// Newest assignment layout we understand. Versions 0 to 3 share the same layout.
pub const MAX_ASSIGNMENT_VERSION: i16 = 3;

/// Assigned partitions per topic, partitions ascending and unique.
pub type Assignment = BTreeMap<String, Vec<i32>>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DecodeError {
    #[error("unsupported group protocol type \"{0}\"")]
    UnsupportedProtocol(String),

    #[error("unsupported assignment version {0}")]
    UnsupportedVersion(i16),

    #[error("malformed assignment: {0}")]
    Malformed(#[from] ReadError),

    #[error("{0} trailing bytes after assignment")]
    TrailingBytes(u64),
}

/// Decode one member's assignment.
///
/// An empty payload is a member that joined but did not get an assignment yet.
pub fn decode_assignment(protocol_type: &str, payload: &[u8]) -> Result<Assignment, DecodeError> {
    // groups without members report an empty protocol type
    if !(protocol_type == CONSUMER_PROTOCOL_TYPE || protocol_type.is_empty()) {
        return Err(DecodeError::UnsupportedProtocol(protocol_type.to_string()));
    }

    if payload.is_empty() {
        return Ok(Assignment::new());
    }

    // check the version before anything else, newer layouts would only show up as garbage
    if let [hi, lo, ..] = payload {
        let version = i16::from_be_bytes([*hi, *lo]);
        if !(0..=MAX_ASSIGNMENT_VERSION).contains(&version) {
            return Err(DecodeError::UnsupportedVersion(version));
        }
    }

    let mut cursor = Cursor::new(payload);
    let decoded = ConsumerProtocolAssignment::read(&mut cursor)?;

    let remaining = payload.len() as u64 - cursor.position();
    if remaining > 0 {
        return Err(DecodeError::TrailingBytes(remaining));
    }

    let mut assignment = Assignment::new();
    for topic in decoded.assigned_partitions {
        // a topic listed twice is merged
        assignment
            .entry(topic.topic)
            .or_default()
            .extend(topic.partitions);
    }
    for partitions in assignment.values_mut() {
        partitions.sort_unstable();
        partitions.dedup();
    }

    Ok(assignment)
}

/// A member together with its decoded assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAssignment {
    pub member_id: String,
    pub owner: PartitionOwner,
    pub assignment: Assignment,
}

/// A member whose assignment could not be decoded.
#[derive(Debug, Error)]
#[error("cannot decode assignment of member \"{member_id}\" (client \"{client_id}\"): {error}")]
pub struct DecodeFailure {
    pub member_id: String,
    pub client_id: String,
    #[source]
    pub error: DecodeError,
}

/// Decode all members of a group, keeping the coordinator's member order.
///
/// A member that fails to decode is left out and reported as a failure.
pub fn decode_members(group: &ConsumerGroup) -> (Vec<DecodedAssignment>, Vec<DecodeFailure>) {
    let mut decoded = Vec::with_capacity(group.members.len());
    let mut failures = vec![];

    for member in &group.members {
        match decode_assignment(&group.protocol_type, &member.assignment) {
            Ok(assignment) => decoded.push(DecodedAssignment {
                member_id: member.member_id.clone(),
                owner: PartitionOwner::from(member),
                assignment,
            }),
            Err(error) => {
                warn!(
                    group = %group.name,
                    member_id = %member.member_id,
                    client_id = %member.client_id,
                    %error,
                    "Skipping member with undecodable assignment",
                );
                failures.push(DecodeFailure {
                    member_id: member.member_id.clone(),
                    client_id: member.client_id.clone(),
                    error,
                });
            }
        }
    }

    (decoded, failures)
}

impl From<&Member> for PartitionOwner {
    fn from(member: &Member) -> Self {
        Self {
            id: member.client_id.clone(),
            host: member.client_host.clone(),
        }
    }
}
