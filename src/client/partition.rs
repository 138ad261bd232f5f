use std::sync::Arc;

use tracing::debug;

use crate::{
    client::error::{Error, ProtocolError, RequestContext, Result},
    connection::{BrokerConnection, BrokerConnector},
    protocol::messages::{ListOffsetsRequest, ListOffsetsResponse, LATEST_TIMESTAMP},
    throttle::respect_throttle,
};

/// Many operations must be performed on the leader for a partition
///
/// The client resolves the leader once on construction and keeps the connection to it. It does not follow leader
/// changes; build a new client after a `NotLeaderOrFollower` error.
#[derive(Debug)]
pub struct PartitionClient {
    topic: String,
    partition: i32,
    leader: BrokerConnection,
}

impl PartitionClient {
    pub(super) async fn new(
        topic: String,
        partition: i32,
        brokers: Arc<BrokerConnector>,
    ) -> Result<Self> {
        let leader_id = leader_id(&brokers, &topic, partition).await?;

        let leader = brokers.connect(leader_id).await?.ok_or_else(|| {
            Error::InvalidResponse(format!(
                "Partition leader {leader_id} not found in metadata response"
            ))
        })?;

        Ok(Self {
            topic,
            partition,
            leader,
        })
    }

    /// Topic
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Partition
    pub fn partition(&self) -> i32 {
        self.partition
    }

    /// The offset of the next produced record, i.e. the exclusive upper bound of the partition.
    pub async fn latest_offset(&self) -> Result<i64> {
        let request = ListOffsetsRequest::single(self.topic.clone(), self.partition, LATEST_TIMESTAMP);
        let response = self.leader.request(request).await?;
        respect_throttle(response.throttle_time_ms).await;

        let offset = process_list_offsets_response(&self.topic, self.partition, response)?;
        debug!(
            topic = %self.topic,
            partition = self.partition,
            offset,
            "Got latest partition offset",
        );
        Ok(offset)
    }
}

async fn leader_id(brokers: &BrokerConnector, topic: &str, partition: i32) -> Result<i32> {
    let response = brokers
        .request_metadata(Some(vec![topic.to_string()]))
        .await?;

    let topic_metadata = match response.topics.as_slice() {
        [t] => t,
        topics => return Err(Error::exactly_one_topic(topics.len())),
    };

    if let Some(protocol_error) = topic_metadata.error {
        return Err(Error::ServerError {
            protocol_error,
            error_message: None,
            request: RequestContext::Topic(topic.to_string()),
        });
    }

    let partition_metadata = topic_metadata
        .partitions
        .iter()
        .find(|p| p.partition_index == partition)
        .ok_or_else(|| Error::ServerError {
            protocol_error: ProtocolError::UnknownTopicOrPartition,
            error_message: None,
            request: RequestContext::Partition(topic.to_string(), partition),
        })?;

    if let Some(protocol_error) = partition_metadata.error {
        // replica errors do not affect the leader
        if protocol_error != ProtocolError::ReplicaNotAvailable {
            return Err(Error::ServerError {
                protocol_error,
                error_message: None,
                request: RequestContext::Partition(topic.to_string(), partition),
            });
        }
    }

    if partition_metadata.leader_id < 0 {
        return Err(Error::ServerError {
            protocol_error: ProtocolError::LeaderNotAvailable,
            error_message: None,
            request: RequestContext::Partition(topic.to_string(), partition),
        });
    }

    Ok(partition_metadata.leader_id)
}

fn process_list_offsets_response(
    topic: &str,
    partition: i32,
    response: ListOffsetsResponse,
) -> Result<i64> {
    let response_topic = match response.topics.as_slice() {
        [t] if t.name == topic => t,
        [_] => {
            return Err(Error::InvalidResponse(format!(
                "Got offsets for a different topic than \"{topic}\""
            )))
        }
        topics => return Err(Error::exactly_one_topic(topics.len())),
    };

    let response_partition = match response_topic.partitions.as_slice() {
        [p] if p.partition_index == partition => p,
        [p] => {
            return Err(Error::InvalidResponse(format!(
                "Expected partition {partition} for topic \"{topic}\", got {}",
                p.partition_index
            )))
        }
        partitions => return Err(Error::exactly_one_partition(partitions.len())),
    };

    if let Some(protocol_error) = response_partition.error_code {
        return Err(Error::ServerError {
            protocol_error,
            error_message: None,
            request: RequestContext::Partition(topic.to_string(), partition),
        });
    }

    response_partition.resolved_offset().ok_or_else(|| {
        Error::InvalidResponse(format!(
            "No offset for partition {partition} of topic \"{topic}\""
        ))
    })
}
