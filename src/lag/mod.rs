//! Consumer group lag and partition ownership.
//!
//! A report is built in one pass:
//!
//! 1. describe the group on its coordinator
//! 2. decode every member's assignment ([`assignment`])
//! 3. fold the assignments into one owner per partition ([`ownership`])
//! 4. list the partitions of every topic the group touches
//! 5. fetch committed and produced offsets per partition ([`offsets`]) and join everything ([`report`])
//!
//! The cluster is reached through the [`ClusterMetadata`] and [`GroupCoordinator`] traits, implemented for
//! [`Client`](crate::client::Client) and [`GroupClient`](crate::client::group::GroupClient).
//!
//! Offsets and membership are read with separate requests, so a report is not a consistent snapshot. A rebalance or
//! new records between two requests skew the numbers, lag can even turn negative. Every report carries the time it
//! was started at.
use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use thiserror::Error;

use crate::client::error::Error as ClientError;

pub mod assignment;
pub mod offsets;
pub mod ownership;
pub mod report;
mod source;

pub use assignment::{
    decode_assignment, decode_members, Assignment, DecodeError, DecodeFailure, DecodedAssignment,
};
pub use offsets::{fetch_offsets, OffsetKind, OffsetPair, OffsetUnavailable};
pub use ownership::{OwnershipMap, PartitionOwner};
pub use report::{generate, LagRecord, LagReport};
pub use source::connect;

/// Protocol type of groups managed by the Java consumer (and everything compatible with it).
pub const CONSUMER_PROTOCOL_TYPE: &str = "consumer";

/// A consumer group as described by its coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerGroup {
    pub name: String,

    /// Free-form state, e.g. `Stable`, `PreparingRebalance` or `Empty`.
    pub state: String,

    /// Embedded protocol of the group, `consumer` for regular consumers.
    pub protocol_type: String,

    /// Members in the order the coordinator returned them.
    pub members: Vec<Member>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub member_id: String,
    pub client_id: String,
    pub client_host: String,

    /// Raw assignment payload, see [`decode_assignment`].
    pub assignment: Vec<u8>,
}

/// Partition IDs per topic, both ordered.
pub type TopicPartitions = BTreeMap<String, BTreeSet<i32>>;

/// Cluster-wide lookups.
#[async_trait]
pub trait ClusterMetadata: Send + Sync {
    /// All partition IDs of a topic.
    async fn partitions(&self, topic: &str) -> Result<Vec<i32>, ClientError>;

    /// Offset the next record produced to the partition will get.
    async fn produced_offset(&self, topic: &str, partition: i32) -> Result<i64, ClientError>;
}

/// Lookups answered by the coordinator of one group.
#[async_trait]
pub trait GroupCoordinator: Send + Sync {
    fn group(&self) -> &str;

    /// Make sure the coordinator is known and reachable.
    async fn resolve(&self) -> Result<(), ClientError>;

    async fn describe_group(&self) -> Result<ConsumerGroup, ClientError>;

    /// Next offset the group will consume, `-1` if it never committed one.
    async fn committed_offset(&self, topic: &str, partition: i32) -> Result<i64, ClientError>;

    /// Topics the group has committed offsets for.
    async fn committed_topics(&self) -> Result<Vec<String>, ClientError>;
}

/// Failures that abort a report.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("cannot connect to cluster: {0}")]
    Connection(#[source] ClientError),

    #[error("cannot resolve coordinator for group \"{group}\": {source}")]
    Coordinator { group: String, source: ClientError },

    #[error("cannot describe group \"{group}\": {source}")]
    GroupDescribe { group: String, source: ClientError },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A part of the report that could not be produced.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Warning {
    #[error(transparent)]
    Decode(#[from] DecodeFailure),

    #[error("cannot list topics with committed offsets: {0}")]
    CommittedTopics(#[source] ClientError),

    #[error("cannot list partitions of topic \"{topic}\": {source}")]
    Partitions { topic: String, source: ClientError },

    #[error(transparent)]
    Offset(#[from] OffsetUnavailable),
}
