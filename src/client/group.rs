//! Read-only access to a consumer group.
//!
//! Everything a consumer group stores (membership, assignments, committed offsets) lives on one broker, the group
//! coordinator. Any broker can tell us which one that is.
//!
//! <https://developer.confluent.io/courses/architecture/consumer-group-protocol>

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::client::error::{Error, RequestContext, Result};
use crate::connection::{BrokerConnection, BrokerConnector};
use crate::protocol::messages::{
    DescribeGroupsRequest, DescribeGroupsResponse, DescribeGroupsResponseGroup,
    FindCoordinatorRequest, OffsetFetchRequest, OffsetFetchResponse,
};
use crate::throttle::respect_throttle;

/// Client for a single consumer group.
///
/// The coordinator is looked up on first use and cached until its connection breaks.
#[derive(Debug)]
pub struct GroupClient {
    group: String,
    brokers: Arc<BrokerConnector>,
    coordinator: Mutex<Option<BrokerConnection>>,
}

impl GroupClient {
    pub(super) fn new(group: String, brokers: Arc<BrokerConnector>) -> Self {
        Self {
            group,
            brokers,
            coordinator: Mutex::new(None),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Resolve (and connect to) the coordinator of this group.
    pub async fn coordinator(&self) -> Result<BrokerConnection> {
        let mut current = self.coordinator.lock().await;
        match current.as_ref() {
            Some(broker) if !broker.is_poisoned() => return Ok(Arc::clone(broker)),
            // the coordinator may have moved, look it up again
            Some(_) => info!(group = %self.group, "Coordinator connection broke"),
            None => {}
        }

        info!(group = %self.group, "Looking up group coordinator");

        // we don't need to connect to controller, every broker can handle this request.
        //
        // See: https://developer.confluent.io/courses/architecture/consumer-group-protocol/#step-1--find-group-coordinator
        let broker = self.brokers.arbitrary_broker().await?;
        let resp = broker
            .request(FindCoordinatorRequest::group(self.group.clone()))
            .await?;
        respect_throttle(Some(resp.throttle_time_ms)).await;

        if let Some(protocol_error) = resp.error_code {
            return Err(Error::ServerError {
                protocol_error,
                error_message: resp.error_message,
                request: RequestContext::Group(self.group.clone()),
            });
        }

        // the coordinator might not be part of the bootstrap metadata yet
        if self.brokers.topology.get_broker(resp.node_id).is_none() {
            self.brokers.refresh_metadata().await?;
        }

        let coordinator_id = resp.node_id;
        let coordinator = self.brokers.connect(coordinator_id).await?.ok_or_else(|| {
            Error::InvalidResponse(format!(
                "coordinator {coordinator_id} not found in metadata response"
            ))
        })?;
        debug!(group = %self.group, coordinator = coordinator_id, "Found group coordinator");

        *current = Some(Arc::clone(&coordinator));
        Ok(coordinator)
    }

    /// Describe the group: state, protocol and members with their assignments.
    pub async fn describe(&self) -> Result<DescribeGroupsResponseGroup> {
        let coordinator = self.coordinator().await?;

        let resp = coordinator
            .request(DescribeGroupsRequest {
                groups: vec![self.group.clone()],
                include_authorized_operations: false,
            })
            .await?;
        respect_throttle(resp.throttle_time_ms).await;

        process_describe_response(&self.group, resp)
    }

    /// The committed offset of one partition, `-1` if the group never committed one.
    pub async fn committed_offset(&self, topic: &str, partition: i32) -> Result<i64> {
        let coordinator = self.coordinator().await?;

        let resp = coordinator
            .request(OffsetFetchRequest::partitions(
                self.group.clone(),
                topic,
                vec![partition],
            ))
            .await?;
        respect_throttle(resp.throttle_time_ms).await;

        process_committed_offset_response(&self.group, topic, partition, resp)
    }

    /// Topics the group has committed offsets for.
    ///
    /// Needs a broker that supports listing all offsets of a group (`OffsetFetch` v2 or newer).
    pub async fn committed_topics(&self) -> Result<Vec<String>> {
        let coordinator = self.coordinator().await?;

        let resp = coordinator
            .request(OffsetFetchRequest::all_topics(self.group.clone()))
            .await?;
        respect_throttle(resp.throttle_time_ms).await;

        process_committed_topics_response(&self.group, resp)
    }
}

fn process_describe_response(
    group: &str,
    resp: DescribeGroupsResponse,
) -> Result<DescribeGroupsResponseGroup> {
    let described = resp
        .groups
        .into_iter()
        .find(|g| g.group_id == group)
        .ok_or_else(|| {
            Error::InvalidResponse(format!("group \"{group}\" missing from describe response"))
        })?;

    if let Some(protocol_error) = described.error_code {
        return Err(Error::ServerError {
            protocol_error,
            error_message: None,
            request: RequestContext::Group(group.to_string()),
        });
    }

    Ok(described)
}

fn process_committed_offset_response(
    group: &str,
    topic: &str,
    partition: i32,
    resp: OffsetFetchResponse,
) -> Result<i64> {
    if let Some(protocol_error) = resp.error_code {
        return Err(Error::ServerError {
            protocol_error,
            error_message: None,
            request: RequestContext::Group(group.to_string()),
        });
    }

    let response_partition = resp
        .topics
        .iter()
        .filter(|t| t.name == topic)
        .flat_map(|t| t.partitions.iter())
        .find(|p| p.partition_index == partition)
        .ok_or_else(|| {
            Error::InvalidResponse(format!(
                "partition {partition} of topic \"{topic}\" missing from offset response"
            ))
        })?;

    if let Some(protocol_error) = response_partition.error_code {
        return Err(Error::ServerError {
            protocol_error,
            error_message: None,
            request: RequestContext::Partition(topic.to_string(), partition),
        });
    }

    Ok(response_partition.committed_offset)
}

fn process_committed_topics_response(group: &str, resp: OffsetFetchResponse) -> Result<Vec<String>> {
    if let Some(protocol_error) = resp.error_code {
        return Err(Error::ServerError {
            protocol_error,
            error_message: None,
            request: RequestContext::Group(group.to_string()),
        });
    }

    let mut topics: Vec<String> = resp
        .topics
        .into_iter()
        .filter(|t| {
            t.partitions
                .iter()
                .any(|p| p.error_code.is_none() && p.committed_offset >= 0)
        })
        .map(|t| t.name)
        .collect();
    topics.sort();
    topics.dedup();

    Ok(topics)
}
