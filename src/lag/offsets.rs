use std::fmt::{Display, Formatter};

use thiserror::Error;

use crate::client::error::Error as ClientError;

use super::{ClusterMetadata, GroupCoordinator};

/// Committed and produced offset of one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetPair {
    /// Next offset the group will consume, `-1` if it never committed one.
    pub committed: i64,

    /// Offset the next produced record will get.
    pub produced: i64,
}

impl OffsetPair {
    /// `produced - committed`, negative if the commit is ahead of what we saw produced.
    ///
    /// Saturates instead of overflowing for values no broker hands out.
    pub fn lag(&self) -> i64 {
        self.produced.saturating_sub(self.committed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetKind {
    Committed,
    Produced,
}

impl Display for OffsetKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Committed => write!(f, "committed"),
            Self::Produced => write!(f, "produced"),
        }
    }
}

#[derive(Debug, Error)]
#[error("{kind} offset unavailable for partition {partition} of topic \"{topic}\": {source}")]
pub struct OffsetUnavailable {
    pub topic: String,
    pub partition: i32,
    pub kind: OffsetKind,
    pub source: ClientError,
}

/// Fetch both offsets of one partition. Nothing is retried.
pub async fn fetch_offsets(
    cluster: &dyn ClusterMetadata,
    coordinator: &dyn GroupCoordinator,
    topic: &str,
    partition: i32,
) -> Result<OffsetPair, OffsetUnavailable> {
    let unavailable = |kind, source| OffsetUnavailable {
        topic: topic.to_string(),
        partition,
        kind,
        source,
    };

    let committed = coordinator
        .committed_offset(topic, partition)
        .await
        .map_err(|e| unavailable(OffsetKind::Committed, e))?;
    let produced = cluster
        .produced_offset(topic, partition)
        .await
        .map_err(|e| unavailable(OffsetKind::Produced, e))?;

    Ok(OffsetPair {
        committed,
        produced,
    })
}
