//! A minimal broker on localhost for connection handling tests.
//!
//! It answers `ApiVersions`, `Metadata` and `FindCoordinator`, always naming itself as the only broker and the
//! coordinator of every group.

use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use super::BrokerConnection;
use crate::protocol::{
    api_key::ApiKey,
    api_version::ApiVersion,
    frame::{AsyncMessageRead, AsyncMessageWrite},
    messages::{
        ApiVersionsResponse, ApiVersionsResponseApiKey, FindCoordinatorRequest,
        FindCoordinatorResponse, MetadataRequest, MetadataResponse, MetadataResponseBroker,
        RequestBody, ResponseHeader, WriteVersionedType,
    },
    traits::ReadType,
};

pub(crate) const TEST_BROKER_ID: i32 = 1;

#[derive(Debug)]
pub(crate) struct TestBroker {
    addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl TestBroker {
    /// Start listening on an ephemeral port.
    ///
    /// Connections whose accept index (starting at 0) is in `hang_up` are closed right after answering
    /// `ApiVersions`.
    pub(crate) async fn start(hang_up: Vec<usize>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));

        let task = tokio::spawn({
            let accepted = Arc::clone(&accepted);
            async move {
                loop {
                    let (stream, _) = listener.accept().await.unwrap();
                    let index = accepted.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(serve(stream, addr, hang_up.contains(&index)));
                }
            }
        });

        Self {
            addr,
            accepted,
            task,
        }
    }

    pub(crate) fn address(&self) -> String {
        self.addr.to_string()
    }

    pub(crate) fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Number of connections accepted so far.
    pub(crate) fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub(crate) fn metadata_broker(&self) -> MetadataResponseBroker {
        MetadataResponseBroker {
            node_id: TEST_BROKER_ID,
            host: self.addr.ip().to_string(),
            port: i32::from(self.addr.port()),
            rack: None,
        }
    }
}

impl Drop for TestBroker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Wait for the reader task of `connection` to notice that the peer hung up.
pub(crate) async fn wait_until_poisoned(connection: &BrokerConnection) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !connection.is_poisoned() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("connection was not poisoned in time");
}

async fn serve(mut stream: TcpStream, addr: SocketAddr, hang_up: bool) {
    loop {
        // the client went away
        let Ok(msg) = stream.read_message(1024 * 1024).await else {
            return;
        };

        let mut cursor = Cursor::new(msg);
        let api_key = ApiKey::from(i16::read(&mut cursor).unwrap());
        let version = ApiVersion(i16::read(&mut cursor).unwrap());
        let correlation_id = i32::read(&mut cursor).unwrap();

        let mut buf = vec![];
        match api_key {
            ApiKey::ApiVersions => {
                write_header(&mut buf, correlation_id, false);
                api_versions().write_versioned(&mut buf, version).unwrap();
            }
            ApiKey::Metadata => {
                write_header(
                    &mut buf,
                    correlation_id,
                    version >= MetadataRequest::FIRST_TAGGED_FIELD_IN_RESPONSE_VERSION,
                );
                MetadataResponse {
                    throttle_time_ms: Some(0),
                    brokers: vec![MetadataResponseBroker {
                        node_id: TEST_BROKER_ID,
                        host: addr.ip().to_string(),
                        port: i32::from(addr.port()),
                        rack: None,
                    }],
                    cluster_id: None,
                    controller_id: Some(TEST_BROKER_ID),
                    topics: vec![],
                }
                .write_versioned(&mut buf, version)
                .unwrap();
            }
            ApiKey::FindCoordinator => {
                write_header(
                    &mut buf,
                    correlation_id,
                    version >= FindCoordinatorRequest::FIRST_TAGGED_FIELD_IN_RESPONSE_VERSION,
                );
                FindCoordinatorResponse {
                    throttle_time_ms: 0,
                    error_code: None,
                    error_message: None,
                    node_id: TEST_BROKER_ID,
                    host: addr.ip().to_string(),
                    port: i32::from(addr.port()),
                    tagged_fields: Default::default(),
                }
                .write_versioned(&mut buf, version)
                .unwrap();
            }
            other => panic!("unexpected request: {other:?}"),
        }

        if stream.write_message(&buf).await.is_err() {
            return;
        }

        if hang_up && api_key == ApiKey::ApiVersions {
            return;
        }
    }
}

fn write_header(buf: &mut Vec<u8>, correlation_id: i32, tagged_fields: bool) {
    let version = ApiVersion(if tagged_fields { 1 } else { 0 });
    ResponseHeader {
        correlation_id,
        tagged_fields: Default::default(),
    }
    .write_versioned(buf, version)
    .unwrap();
}

fn api_versions() -> ApiVersionsResponse {
    let api_key = |api_key, min_version, max_version| ApiVersionsResponseApiKey {
        api_key,
        min_version: ApiVersion(min_version),
        max_version: ApiVersion(max_version),
        tagged_fields: Default::default(),
    };

    ApiVersionsResponse {
        error_code: None,
        api_keys: vec![
            api_key(ApiKey::ApiVersions, 0, 3),
            api_key(ApiKey::Metadata, 0, 4),
            api_key(ApiKey::FindCoordinator, 1, 3),
        ],
        throttle_time_ms: None,
        tagged_fields: Default::default(),
    }
}
