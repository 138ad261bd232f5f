use std::collections::HashMap;
use std::sync::Arc;

use rand::prelude::*;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::messenger::{Messenger, RequestError, SyncVersionsError};
use crate::protocol::messages::{MetadataRequest, MetadataResponse};

pub use self::topology::{Broker, BrokerTopology};

mod topology;

#[cfg(test)]
pub(crate) mod test_broker;

/// A connection to a broker
pub type BrokerConnection = Arc<Messenger<TcpStream>>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("error getting cluster metadata: {0}")]
    Metadata(#[from] RequestError),

    #[error("error connecting to broker \"{broker}\": {error}")]
    Transport {
        broker: String,
        error: std::io::Error,
    },

    #[error("cannot sync versions with broker \"{broker}\": {error}")]
    SyncVersions {
        broker: String,
        error: SyncVersionsError,
    },

    #[error("no bootstrap brokers configured")]
    NoBootstrapBrokers,

    #[error("none of the bootstrap brokers is reachable, last error: {0}")]
    Bootstrap(Box<Error>),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Caches the cluster topology and the connections to individual brokers.
///
/// Connections are opened lazily and reused until they break or [`close`](Self::close) is called.
#[derive(Debug)]
pub struct BrokerConnector {
    /// Brokers used to boostrap this pool
    bootstrap_brokers: Vec<String>,

    /// Client ID sent with every request.
    client_id: Arc<str>,

    /// Discovered brokers in the cluster, including bootstrap brokers
    pub(crate) topology: BrokerTopology,

    /// Connection used for metadata requests, to one of the bootstrap brokers.
    bootstrap_connection: AsyncMutex<Option<BrokerConnection>>,

    /// Connections by broker ID.
    connections: AsyncMutex<HashMap<i32, BrokerConnection>>,

    /// Maximum message size for framing protocol.
    max_message_size: usize,
}

impl BrokerConnector {
    pub fn new(bootstrap_brokers: Vec<String>, client_id: Arc<str>, max_message_size: usize) -> Self {
        Self {
            bootstrap_brokers,
            client_id,
            topology: Default::default(),
            bootstrap_connection: AsyncMutex::new(None),
            connections: AsyncMutex::new(HashMap::new()),
            max_message_size,
        }
    }

    /// Fetch and cache the broker list.
    pub async fn refresh_metadata(&self) -> Result<()> {
        // an empty topic list only asks for brokers (except on v0 where it means "all topics")
        let response = self.request_metadata(Some(vec![])).await?;
        debug!(brokers = response.brokers.len(), "Refreshed broker metadata");
        Ok(())
    }

    /// Request metadata for the given topics, or for all topics if `None`.
    ///
    /// The broker list of the response updates the cached topology.
    pub async fn request_metadata(&self, topics: Option<Vec<String>>) -> Result<MetadataResponse> {
        let broker = self.arbitrary_broker().await?;

        match broker.request(MetadataRequest::new(topics)).await {
            Ok(response) => {
                self.topology.update(&response.brokers);
                Ok(response)
            }
            Err(e) => {
                // a failed connection stays failed, pick a fresh one next time
                if matches!(e, RequestError::Poisoned(_)) {
                    self.invalidate_arbitrary_broker("metadata request failed").await;
                }
                Err(e.into())
            }
        }
    }

    /// Forget the cached bootstrap connection.
    pub(crate) async fn invalidate_arbitrary_broker(&self, reason: &'static str) {
        info!(reason, "Invalidating cached bootstrap connection");
        self.bootstrap_connection.lock().await.take();
    }

    /// Returns a connection to the broker with the given ID.
    ///
    /// Returns `None` if the broker is not part of the known topology. A cached connection that broke is replaced
    /// by a new one.
    pub async fn connect(&self, broker_id: i32) -> Result<Option<BrokerConnection>> {
        let mut connections = self.connections.lock().await;
        if let Some(connection) = connections.get(&broker_id) {
            if !connection.is_poisoned() {
                return Ok(Some(Arc::clone(connection)));
            }

            info!(broker = broker_id, "Dropping poisoned connection");
            connections.remove(&broker_id);
        }

        let broker = match self.topology.get_broker(broker_id) {
            Some(broker) => broker,
            None => {
                warn!(broker = broker_id, "Broker not found in topology");
                return Ok(None);
            }
        };

        let connection = self.connect_to(&broker.to_string()).await?;
        connections.insert(broker_id, Arc::clone(&connection));
        Ok(Some(connection))
    }

    /// Returns a connection to any bootstrap broker.
    ///
    /// Every broker can answer metadata and coordinator lookups, so one connection is enough for those.
    pub(crate) async fn arbitrary_broker(&self) -> Result<BrokerConnection> {
        let mut current = self.bootstrap_connection.lock().await;
        match current.as_ref() {
            Some(connection) if !connection.is_poisoned() => return Ok(Arc::clone(connection)),
            Some(_) => info!("Dropping poisoned bootstrap connection"),
            None => {}
        }

        let mut brokers = self.bootstrap_brokers.clone();
        brokers.shuffle(&mut thread_rng());

        let mut last_error = None;
        for broker in brokers {
            match self.connect_to(&broker).await {
                Ok(connection) => {
                    *current = Some(Arc::clone(&connection));
                    return Ok(connection);
                }
                Err(e) => {
                    warn!(%broker, %e, "Failed to connect to bootstrap broker");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(Error::Bootstrap(Box::new(e))),
            None => Err(Error::NoBootstrapBrokers),
        }
    }

    async fn connect_to(&self, broker: &str) -> Result<BrokerConnection> {
        info!(broker, "Establishing new connection");

        let stream = TcpStream::connect(broker)
            .await
            .map_err(|error| Error::Transport {
                broker: broker.to_string(),
                error,
            })?;
        stream.set_nodelay(true).map_err(|error| Error::Transport {
            broker: broker.to_string(),
            error,
        })?;

        let messenger = Messenger::new(stream, self.max_message_size, Arc::clone(&self.client_id));
        messenger
            .sync_versions()
            .await
            .map_err(|error| Error::SyncVersions {
                broker: broker.to_string(),
                error,
            })?;
        debug!(broker, apis = messenger.known_api_count(), "Negotiated API versions");

        Ok(Arc::new(messenger))
    }

    /// Shut down all open connections.
    ///
    /// Failures are logged, the remaining connections are closed regardless.
    pub async fn close(&self) {
        let mut connections: Vec<(String, BrokerConnection)> = self
            .connections
            .lock()
            .await
            .drain()
            .map(|(id, connection)| (id.to_string(), connection))
            .collect();
        if let Some(connection) = self.bootstrap_connection.lock().await.take() {
            connections.push(("bootstrap".to_string(), connection));
        }

        for (broker, connection) in connections {
            if let Err(e) = connection.close().await {
                warn!(%broker, %e, "Failed to close broker connection");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_broker::{wait_until_poisoned, TestBroker, TEST_BROKER_ID};
    use super::*;

    fn connector(bootstrap_brokers: Vec<String>) -> BrokerConnector {
        BrokerConnector::new(bootstrap_brokers, Arc::from("test"), 1024 * 1024)
    }

    #[tokio::test]
    async fn connect_reuses_healthy_connection() {
        let broker = TestBroker::start(vec![]).await;
        let connector = connector(vec![]);
        connector.topology.update(&[broker.metadata_broker()]);

        let first = connector.connect(TEST_BROKER_ID).await.unwrap().unwrap();
        let second = connector.connect(TEST_BROKER_ID).await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(broker.accepted(), 1);
    }

    #[tokio::test]
    async fn connect_replaces_broken_connection() {
        // the first connection is closed by the broker right after version negotiation
        let broker = TestBroker::start(vec![0]).await;
        let connector = connector(vec![]);
        connector.topology.update(&[broker.metadata_broker()]);

        let broken = connector.connect(TEST_BROKER_ID).await.unwrap().unwrap();
        wait_until_poisoned(&broken).await;

        let fresh = connector.connect(TEST_BROKER_ID).await.unwrap().unwrap();
        assert!(!Arc::ptr_eq(&broken, &fresh));
        assert!(!fresh.is_poisoned());
        assert_eq!(broker.accepted(), 2);

        let response = fresh.request(MetadataRequest::new(Some(vec![]))).await.unwrap();
        assert_eq!(response.brokers, vec![broker.metadata_broker()]);
    }

    #[tokio::test]
    async fn bootstrap_connection_is_replaced_once_broken() {
        let broker = TestBroker::start(vec![0]).await;
        let connector = connector(vec![broker.address()]);

        let broken = connector.arbitrary_broker().await.unwrap();
        wait_until_poisoned(&broken).await;

        connector.refresh_metadata().await.unwrap();
        assert_eq!(broker.accepted(), 2);
        assert_eq!(
            connector.topology.get_broker(TEST_BROKER_ID).map(|b| b.port()),
            Some(i32::from(broker.port()))
        );
    }

    #[tokio::test]
    async fn no_bootstrap_brokers() {
        let err = connector(vec![]).refresh_metadata().await.unwrap_err();
        assert!(matches!(err, Error::NoBootstrapBrokers));
    }
}
