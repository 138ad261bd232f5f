use async_trait::async_trait;

use crate::client::{error::Error as ClientError, group::GroupClient, Client, ClientBuilder};
use crate::protocol::messages::DescribeGroupsResponseGroup;

use super::{ClusterMetadata, ConsumerGroup, Error, GroupCoordinator, Member, Result};

/// Build a client, turning failures into [`Error::Connection`].
pub async fn connect(builder: ClientBuilder) -> Result<Client> {
    builder.build().await.map_err(Error::Connection)
}

#[async_trait]
impl ClusterMetadata for Client {
    async fn partitions(&self, topic: &str) -> Result<Vec<i32>, ClientError> {
        Ok(self.fetch_metadata(topic).await?.partition_ids())
    }

    async fn produced_offset(&self, topic: &str, partition: i32) -> Result<i64, ClientError> {
        self.partition_client(topic, partition)
            .await?
            .latest_offset()
            .await
    }
}

#[async_trait]
impl GroupCoordinator for GroupClient {
    fn group(&self) -> &str {
        GroupClient::group(self)
    }

    async fn resolve(&self) -> Result<(), ClientError> {
        self.coordinator().await.map(|_| ())
    }

    async fn describe_group(&self) -> Result<ConsumerGroup, ClientError> {
        Ok(self.describe().await?.into())
    }

    async fn committed_offset(&self, topic: &str, partition: i32) -> Result<i64, ClientError> {
        GroupClient::committed_offset(self, topic, partition).await
    }

    async fn committed_topics(&self) -> Result<Vec<String>, ClientError> {
        GroupClient::committed_topics(self).await
    }
}

impl From<DescribeGroupsResponseGroup> for ConsumerGroup {
    fn from(group: DescribeGroupsResponseGroup) -> Self {
        Self {
            name: group.group_id,
            state: group.group_state,
            protocol_type: group.protocol_type,
            members: group
                .members
                .into_iter()
                .map(|m| Member {
                    member_id: m.member_id,
                    client_id: m.client_id,
                    client_host: m.client_host,
                    assignment: m.member_assignment,
                })
                .collect(),
        }
    }
}
