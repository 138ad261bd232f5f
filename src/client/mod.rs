use std::sync::Arc;

use crate::{
    build_info::DEFAULT_CLIENT_ID,
    client::{group::GroupClient, partition::PartitionClient},
    connection::{Broker, BrokerConnector},
    topic::Topic,
};

pub mod error;
pub mod group;
pub mod partition;

use error::{Error, ProtocolError, RequestContext, Result};

/// Default upper bound for a single response frame.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024; // 100MB

/// Builder for [`Client`].
pub struct ClientBuilder {
    bootstrap_brokers: Vec<String>,
    client_id: Option<Arc<str>>,
    max_message_size: usize,
}

impl ClientBuilder {
    /// Create a new [`ClientBuilder`] with the list of bootstrap brokers
    pub fn new(bootstrap_brokers: Vec<String>) -> Self {
        Self {
            bootstrap_brokers,
            client_id: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Sets client ID.
    pub fn client_id(mut self, client_id: impl Into<Arc<str>>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set maximum size (in bytes) of message frames that can be received from a broker.
    ///
    /// Settings this too small will result in failures all over the place since metadata requests cannot be handled
    /// any longer.
    pub fn max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    /// Build [`Client`].
    ///
    /// Connects to one of the bootstrap brokers and fetches the broker list.
    pub async fn build(self) -> Result<Client> {
        let brokers = Arc::new(BrokerConnector::new(
            self.bootstrap_brokers,
            self.client_id
                .unwrap_or_else(|| Arc::from(DEFAULT_CLIENT_ID)),
            self.max_message_size,
        ));
        brokers.refresh_metadata().await?;

        Ok(Client { brokers })
    }
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder").finish_non_exhaustive()
    }
}

/// Top-level cluster-wide client.
///
/// This client can be used to query some cluster-wide metadata and construct task-specific sub-clients like
/// [`GroupClient`] and [`PartitionClient`].
///
/// Must be constructed using [`ClientBuilder`].
#[derive(Debug)]
pub struct Client {
    brokers: Arc<BrokerConnector>,
}

impl Client {
    /// Returns a client for reading the state of a consumer group.
    pub fn group_client(&self, group: impl Into<String>) -> GroupClient {
        GroupClient::new(group.into(), Arc::clone(&self.brokers))
    }

    /// Returns a client for performing operations on a specific partition
    pub async fn partition_client(
        &self,
        topic: impl Into<String> + Send,
        partition: i32,
    ) -> Result<PartitionClient> {
        PartitionClient::new(topic.into(), partition, Arc::clone(&self.brokers)).await
    }

    /// Returns a list of brokers from cluster topology
    pub fn brokers(&self) -> Vec<Broker> {
        self.brokers.topology.get_brokers()
    }

    /// Fetch the partition layout of a single topic.
    ///
    /// Never creates the topic, unknown topics are a [`ProtocolError::UnknownTopicOrPartition`] error.
    pub async fn fetch_metadata(&self, topic: &str) -> Result<Topic> {
        let resp = self
            .brokers
            .request_metadata(Some(vec![topic.to_string()]))
            .await?;

        match resp.topics.into_iter().find(|t| t.name == topic) {
            Some(t) => {
                if let Some(err) = t.error {
                    return Err(Error::ServerError {
                        protocol_error: err,
                        error_message: None,
                        request: RequestContext::Topic(topic.to_string()),
                    });
                }

                Ok(Topic {
                    name: t.name,
                    partitions: t.partitions.iter().map(|p| p.partition_index).collect(),
                })
            }
            None => Err(Error::ServerError {
                protocol_error: ProtocolError::UnknownTopicOrPartition,
                error_message: None,
                request: RequestContext::Topic(topic.to_string()),
            }),
        }
    }

    /// Close all broker connections.
    ///
    /// Errors are logged, not returned.
    pub async fn close(&self) {
        self.brokers.close().await;
    }
}
