//! A single connection to a single broker.
//!
//! Requests are written by the caller, responses are read by a background task and routed back via the
//! correlation ID found in the response header.
use std::{
    collections::HashMap,
    future::Future,
    io::Cursor,
    ops::{Deref, DerefMut},
    pin::Pin,
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc,
    },
    task::{Context, Poll},
};

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf},
    sync::{oneshot::channel, Mutex as AsyncMutex},
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::protocol::{
    api_key::ApiKey,
    api_version::{ApiVersion, ApiVersionRange},
    frame::{AsyncMessageRead, AsyncMessageWrite},
    messages::{
        ApiVersionsRequest, ReadVersionedError, ReadVersionedType, RequestBody, RequestHeader,
        WriteVersionedError, WriteVersionedType,
    },
    primitives::TaggedFields,
    traits::{ReadError, ReadType},
};

#[derive(Debug)]
struct Response {
    #[allow(dead_code)]
    correlation_id: i32,
    data: Cursor<Vec<u8>>,
}

#[derive(Debug)]
struct ActiveRequest {
    channel: tokio::sync::oneshot::Sender<Result<Response, RequestError>>,
    use_tagged_fields_in_response: bool,
}

#[derive(Debug)]
enum MessengerState {
    /// Currently active requests by correlation ID.
    ///
    /// An active request is one that got prepared or send but the response wasn't received yet.
    RequestMap(HashMap<i32, ActiveRequest>),

    /// One or our streams died and we are unable to process any more requests.
    Poison(Arc<RequestError>),
}

impl MessengerState {
    fn poison(&mut self, err: RequestError) -> Arc<RequestError> {
        match self {
            Self::RequestMap(map) => {
                let err = Arc::new(err);

                // inform all active requests
                for (_correlation_id, active_request) in map.drain() {
                    // it's OK if the other side is gone
                    active_request
                        .channel
                        .send(Err(RequestError::Poisoned(Arc::clone(&err))))
                        .ok();
                }

                *self = Self::Poison(Arc::clone(&err));
                err
            }
            Self::Poison(e) => {
                // already poisoned, keep the first error
                Arc::clone(e)
            }
        }
    }
}

/// A connection to a single broker
///
/// Note: Requests to the same [`Messenger`] will be pipelined by Kafka
#[derive(Debug)]
pub struct Messenger<RW> {
    /// The half of the stream that we use to send data TO the broker.
    ///
    /// This will be used by [`request`](Self::request) to queue up messages.
    stream_write: Arc<AsyncMutex<WriteHalf<RW>>>,

    /// Client ID sent with every request header.
    client_id: Arc<str>,

    /// The next correlation ID.
    ///
    /// This is used to map responses to active requests.
    correlation_id: AtomicI32,

    /// Version ranges that we think are supported by the broker.
    ///
    /// This needs to be bootstrapped by [`sync_versions`](Self::sync_versions).
    version_ranges: RwLock<HashMap<ApiKey, ApiVersionRange>>,

    /// Current stream state.
    ///
    /// Note that this and `stream_write` are separate struct to allow sending and receiving data concurrently.
    state: Arc<Mutex<MessengerState>>,

    /// Join handle for the background worker that fetches responses.
    join_handle: JoinHandle<()>,
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RequestError {
    #[error("Cannot find matching version for: {api_key:?}")]
    NoVersionMatch { api_key: ApiKey },

    #[error("Cannot write data: {0}")]
    WriteError(#[from] WriteVersionedError),

    #[error("Cannot write versioned data: {0}")]
    WriteMessageError(#[from] crate::protocol::frame::WriteError),

    #[error("Cannot read data: {0}")]
    ReadError(#[from] ReadError),

    #[error("Cannot read versioned data: {0}")]
    ReadVersionedError(#[from] ReadVersionedError),

    #[error("Cannot read framed message: {0}")]
    ReadFramedMessageError(#[from] crate::protocol::frame::ReadError),

    #[error("Data left at the end of the message. Got {message_size} bytes but only read {read} bytes. api_key={api_key:?} api_version={api_version}")]
    TooMuchData {
        message_size: u64,
        read: u64,
        api_key: ApiKey,
        api_version: ApiVersion,
    },

    #[error("Cannot send/receive data: {0}")]
    IO(#[from] std::io::Error),

    #[error("Connection is poisoned: {0}")]
    Poisoned(Arc<RequestError>),
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SyncVersionsError {
    #[error("Did not found a version for ApiVersion that works with that broker")]
    NoWorkingVersion,

    #[error("Request error: {0}")]
    RequestError(#[from] RequestError),

    #[error("Got flipped version from server for API key {api_key:?}: min={min} max={max}")]
    FlippedVersionRange {
        api_key: ApiKey,
        min: ApiVersion,
        max: ApiVersion,
    },
}

impl<RW> Messenger<RW>
where
    RW: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(stream: RW, max_message_size: usize, client_id: Arc<str>) -> Self {
        let (stream_read, stream_write) = tokio::io::split(stream);
        let state = Arc::new(Mutex::new(MessengerState::RequestMap(HashMap::default())));
        let state_captured = Arc::clone(&state);

        let join_handle = tokio::spawn(async move {
            receive_responses(stream_read, max_message_size, state_captured).await;
        });

        Self {
            stream_write: Arc::new(AsyncMutex::new(stream_write)),
            client_id,
            correlation_id: AtomicI32::new(0),
            version_ranges: RwLock::new(HashMap::new()),
            state,
            join_handle,
        }
    }

    #[cfg(test)]
    fn set_version_ranges(&self, ranges: HashMap<ApiKey, ApiVersionRange>) {
        *self.version_ranges.write() = ranges;
    }

    /// Number of API keys that were negotiated with the broker.
    pub fn known_api_count(&self) -> usize {
        self.version_ranges.read().len()
    }

    /// Whether the connection broke or was closed. A poisoned messenger never recovers.
    pub fn is_poisoned(&self) -> bool {
        matches!(self.state.lock().deref(), MessengerState::Poison(_))
    }

    pub async fn request<R>(&self, msg: R) -> Result<R::ResponseBody, RequestError>
    where
        R: RequestBody + Send + WriteVersionedType<Vec<u8>>,
        R::ResponseBody: ReadVersionedType<Cursor<Vec<u8>>>,
    {
        let body_api_version = self
            .version_ranges
            .read()
            .get(&R::API_KEY)
            .and_then(|range_server| range_server.highest_common(&R::API_VERSION_RANGE))
            .ok_or(RequestError::NoVersionMatch {
                api_key: R::API_KEY,
            })?;

        // determine if our request and response headers shall contain tagged fields. This will select the header
        // versions below.
        let use_tagged_fields_in_request =
            body_api_version >= R::FIRST_TAGGED_FIELD_IN_REQUEST_VERSION;
        let use_tagged_fields_in_response =
            body_api_version >= R::FIRST_TAGGED_FIELD_IN_RESPONSE_VERSION;

        // Correlation ID so that we can de-multiplex the responses.
        let correlation_id = self.correlation_id.fetch_add(1, Ordering::SeqCst);

        let header = RequestHeader {
            request_api_key: R::API_KEY,
            request_api_version: body_api_version,
            correlation_id,
            client_id: Some(String::from(self.client_id.as_ref())),
            tagged_fields: Some(TaggedFields::default()),
        };
        let header_version = if use_tagged_fields_in_request {
            ApiVersion(2)
        } else {
            ApiVersion(1)
        };

        let mut buf = Vec::new();
        header.write_versioned(&mut buf, header_version)?;
        msg.write_versioned(&mut buf, body_api_version)?;

        let (tx, rx) = channel();

        // to prevent stale data in inner state, ensure that we would remove the request again if we are cancelled
        // while sending the request
        let _cleanup_on_cancel = CleanupRequestStateOnCancel {
            state: Arc::clone(&self.state),
            correlation_id,
        };

        match self.state.lock().deref_mut() {
            MessengerState::RequestMap(map) => {
                map.insert(
                    correlation_id,
                    ActiveRequest {
                        channel: tx,
                        use_tagged_fields_in_response,
                    },
                );
            }
            MessengerState::Poison(e) => {
                return Err(RequestError::Poisoned(Arc::clone(e)));
            }
        }

        self.send_message(buf).await?;

        let mut response = match rx.await {
            Ok(res) => res?,
            // the sender is only dropped without a value when the state got poisoned in the meantime
            Err(_) => return Err(self.poisoned_error()),
        };

        let body = R::ResponseBody::read_versioned(&mut response.data, body_api_version)?;

        // check if we fully consumed the message, otherwise there might be a bug in our protocol code
        let read_bytes = response.data.position();
        let message_bytes = response.data.into_inner().len() as u64;
        if read_bytes != message_bytes {
            return Err(RequestError::TooMuchData {
                message_size: message_bytes,
                read: read_bytes,
                api_key: R::API_KEY,
                api_version: body_api_version,
            });
        }

        Ok(body)
    }

    async fn send_message(&self, msg: Vec<u8>) -> Result<(), RequestError> {
        match self.send_message_inner(msg).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // need to poison the stream because message framing might be out-of-sync
                let mut state = self.state.lock();
                Err(RequestError::Poisoned(state.poison(e)))
            }
        }
    }

    async fn send_message_inner(&self, msg: Vec<u8>) -> Result<(), RequestError> {
        let mut stream_write = Arc::clone(&self.stream_write).lock_owned().await;

        // use a wrapper so that cancellation doesn't cancel the send operation and leaves half-send messages on the wire
        let fut = CancellationSafeFuture::new(async move {
            stream_write.write_message(&msg).await?;
            Ok::<_, RequestError>(())
        });

        fut.await
    }

    fn poisoned_error(&self) -> RequestError {
        match self.state.lock().deref_mut() {
            MessengerState::Poison(e) => RequestError::Poisoned(Arc::clone(e)),
            MessengerState::RequestMap(_) => RequestError::IO(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "response channel closed",
            )),
        }
    }

    /// Negotiate the API versions with the broker.
    ///
    /// Newer `ApiVersions` versions are tried first. Brokers that do not understand a version answer with a v0
    /// body, which we fail to parse at the requested version, so we fall back to the next older one.
    pub async fn sync_versions(&self) -> Result<(), SyncVersionsError> {
        for upper_bound in (ApiVersionsRequest::API_VERSION_RANGE.min().0
            ..=ApiVersionsRequest::API_VERSION_RANGE.max().0)
            .rev()
        {
            self.set_api_versions_range(upper_bound);

            match self.request(ApiVersionsRequest::this_client()).await {
                Ok(response) => {
                    if let Some(e) = response.error_code {
                        debug!(
                            %e,
                            version=upper_bound,
                            "Got error during version sync, cannot use version for ApiVersionRequest",
                        );
                        continue;
                    }

                    // check range sanity
                    for api_key in &response.api_keys {
                        if api_key.min_version.0 > api_key.max_version.0 {
                            return Err(SyncVersionsError::FlippedVersionRange {
                                api_key: api_key.api_key,
                                min: api_key.min_version,
                                max: api_key.max_version,
                            });
                        }
                    }

                    let ranges: HashMap<_, _> = response
                        .api_keys
                        .into_iter()
                        .map(|x| {
                            (
                                x.api_key,
                                ApiVersionRange::new(x.min_version.0, x.max_version.0),
                            )
                        })
                        .collect();
                    debug!(
                        versions=%sorted_ranges_repr(&ranges),
                        "Detected supported broker versions",
                    );
                    *self.version_ranges.write() = ranges;
                    return Ok(());
                }
                Err(RequestError::NoVersionMatch { .. }) => {
                    unreachable!("Just set to version range to a non-empty range")
                }
                Err(RequestError::ReadVersionedError(e)) => {
                    debug!(
                        %e,
                        version=upper_bound,
                        "Cannot read ApiVersionResponse for version",
                    );
                    continue;
                }
                Err(RequestError::ReadError(e)) => {
                    debug!(
                        %e,
                        version=upper_bound,
                        "Cannot read ApiVersionResponse for version",
                    );
                    continue;
                }
                Err(e @ RequestError::TooMuchData { .. }) => {
                    debug!(
                        %e,
                        version=upper_bound,
                        "Cannot read ApiVersionResponse for version",
                    );
                    continue;
                }
                Err(e) => {
                    return Err(SyncVersionsError::RequestError(e));
                }
            }
        }

        Err(SyncVersionsError::NoWorkingVersion)
    }

    fn set_api_versions_range(&self, upper_bound: i16) {
        let mut ranges = self.version_ranges.write();
        ranges.insert(
            ApiKey::ApiVersions,
            ApiVersionRange::new(upper_bound, upper_bound),
        );
    }

    /// Shut the connection down.
    ///
    /// Pending and future requests fail with [`RequestError::Poisoned`].
    pub async fn close(&self) -> Result<(), RequestError> {
        let res = self.stream_write.lock().await.shutdown().await;
        self.join_handle.abort();
        self.state.lock().poison(RequestError::IO(std::io::Error::new(
            std::io::ErrorKind::NotConnected,
            "connection closed",
        )));

        res.map_err(RequestError::from)
    }
}

impl<RW> Drop for Messenger<RW> {
    fn drop(&mut self) {
        self.join_handle.abort();
    }
}

async fn receive_responses<RW>(
    mut stream_read: ReadHalf<RW>,
    max_message_size: usize,
    state: Arc<Mutex<MessengerState>>,
) where
    RW: AsyncRead + Send,
{
    loop {
        let msg = match stream_read.read_message(max_message_size).await {
            Ok(msg) => msg,
            Err(e) => {
                // framing is unknown from here on, nothing else we can read
                state
                    .lock()
                    .poison(RequestError::ReadFramedMessageError(e));
                return;
            }
        };

        let mut cursor = Cursor::new(msg);

        // the correlation ID leads both response header versions, the rest depends on the request
        let correlation_id = match i32::read(&mut cursor) {
            Ok(id) => id,
            Err(e) => {
                state.lock().poison(RequestError::ReadError(e));
                return;
            }
        };

        let active_request = match state.lock().deref_mut() {
            MessengerState::RequestMap(map) => map.remove(&correlation_id),
            MessengerState::Poison(_) => return,
        };

        let Some(active_request) = active_request else {
            warn!(correlation_id, "Got response for unknown request",);
            continue;
        };

        if active_request.use_tagged_fields_in_response {
            if let Err(e) = TaggedFields::read(&mut cursor) {
                // we cannot process this response, but the stream itself is fine
                active_request
                    .channel
                    .send(Err(RequestError::ReadError(e)))
                    .ok();
                continue;
            }
        }

        // we don't care if the other side is gone
        active_request
            .channel
            .send(Ok(Response {
                correlation_id,
                data: cursor,
            }))
            .ok();
    }
}

fn sorted_ranges_repr(ranges: &HashMap<ApiKey, ApiVersionRange>) -> String {
    let mut ranges: Vec<_> = ranges.iter().map(|(key, range)| (*key, *range)).collect();
    ranges.sort_by_key(|(key, _range)| *key);
    let ranges: Vec<_> = ranges
        .into_iter()
        .map(|(key, range)| format!("{:?}: {}", key, range))
        .collect();
    ranges.join(", ")
}

/// Removes the request from the active-request map when dropped.
struct CleanupRequestStateOnCancel {
    state: Arc<Mutex<MessengerState>>,
    correlation_id: i32,
}

impl Drop for CleanupRequestStateOnCancel {
    fn drop(&mut self) {
        if let MessengerState::RequestMap(map) = self.state.lock().deref_mut() {
            map.remove(&self.correlation_id);
        }
    }
}

/// Wrapper around a future that cannot be cancelled.
///
/// When the wrapper is dropped before the inner future finished, the inner future is moved to a background task and
/// polled to completion there.
struct CancellationSafeFuture<F>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    done: bool,
    inner: Option<Pin<Box<F>>>,
}

impl<F> CancellationSafeFuture<F>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    fn new(fut: F) -> Self {
        Self {
            done: false,
            inner: Some(Box::pin(fut)),
        }
    }
}

impl<F> Drop for CancellationSafeFuture<F>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    fn drop(&mut self) {
        if !self.done {
            if let Some(inner) = self.inner.take() {
                tokio::spawn(inner);
            }
        }
    }
}

impl<F> Future for CancellationSafeFuture<F>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        let Some(inner) = this.inner.as_mut() else {
            return Poll::Pending;
        };

        match inner.as_mut().poll(cx) {
            Poll::Ready(res) => {
                this.done = true;
                Poll::Ready(res)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use tokio::io::DuplexStream;

    use super::*;
    use crate::protocol::{
        messages::{
            ApiVersionsResponse, ApiVersionsResponseApiKey, FindCoordinatorRequest,
            ResponseHeader,
        },
        traits::WriteType,
    };

    /// Read one request frame, returning API key, version and correlation ID.
    async fn read_request(server: &mut DuplexStream) -> (ApiKey, ApiVersion, i32) {
        let msg = server.read_message(1024).await.unwrap();
        let mut cursor = Cursor::new(msg);
        let api_key = ApiKey::from(i16::read(&mut cursor).unwrap());
        let version = ApiVersion(i16::read(&mut cursor).unwrap());
        let correlation_id = i32::read(&mut cursor).unwrap();
        (api_key, version, correlation_id)
    }

    async fn write_response<B>(
        server: &mut DuplexStream,
        correlation_id: i32,
        header_version: ApiVersion,
        body: &B,
        body_version: ApiVersion,
    ) where
        B: WriteVersionedType<Vec<u8>>,
    {
        let mut buf = Vec::new();
        ResponseHeader {
            correlation_id,
            tagged_fields: Default::default(),
        }
        .write_versioned(&mut buf, header_version)
        .unwrap();
        body.write_versioned(&mut buf, body_version).unwrap();
        server.write_message(&buf).await.unwrap();
    }

    fn api_versions_response() -> ApiVersionsResponse {
        ApiVersionsResponse {
            error_code: None,
            api_keys: vec![
                ApiVersionsResponseApiKey {
                    api_key: ApiKey::ApiVersions,
                    min_version: ApiVersion(0),
                    max_version: ApiVersion(3),
                    tagged_fields: Default::default(),
                },
                ApiVersionsResponseApiKey {
                    api_key: ApiKey::Metadata,
                    min_version: ApiVersion(0),
                    max_version: ApiVersion(9),
                    tagged_fields: Default::default(),
                },
            ],
            throttle_time_ms: None,
            tagged_fields: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_sync_versions_ok() {
        let (client, mut server) = tokio::io::duplex(1024);
        let messenger = Messenger::new(client, 1024, Arc::from("test"));

        let server_task = tokio::spawn(async move {
            let (api_key, version, correlation_id) = read_request(&mut server).await;
            assert_eq!(api_key, ApiKey::ApiVersions);
            assert_eq!(version, ApiVersion(3));

            write_response(
                &mut server,
                correlation_id,
                ApiVersion(0),
                &api_versions_response(),
                version,
            )
            .await;
            server
        });

        messenger.sync_versions().await.unwrap();
        assert_eq!(messenger.known_api_count(), 2);

        let ranges = messenger.version_ranges.read();
        assert_eq!(
            ranges.get(&ApiKey::Metadata),
            Some(&ApiVersionRange::new(0, 9))
        );
        drop(ranges);

        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_sync_versions_falls_back() {
        let (client, mut server) = tokio::io::duplex(1024);
        let messenger = Messenger::new(client, 1024, Arc::from("test"));

        let server_task = tokio::spawn(async move {
            // old brokers answer unknown versions with a v0 error body
            let (_api_key, version, correlation_id) = read_request(&mut server).await;
            assert_eq!(version, ApiVersion(3));
            let mut buf = Vec::new();
            correlation_id.write(&mut buf).unwrap();
            buf.extend_from_slice(&[0x00, 0x23, 0x00, 0x00, 0x00, 0x00]);
            server.write_message(&buf).await.unwrap();

            let (_api_key, version, correlation_id) = read_request(&mut server).await;
            assert_eq!(version, ApiVersion(2));
            write_response(
                &mut server,
                correlation_id,
                ApiVersion(0),
                &api_versions_response(),
                version,
            )
            .await;
            server
        });

        messenger.sync_versions().await.unwrap();
        assert_eq!(messenger.known_api_count(), 2);

        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_request_without_version_match() {
        let (client, _server) = tokio::io::duplex(1024);
        let messenger = Messenger::new(client, 1024, Arc::from("test"));

        let err = messenger
            .request(FindCoordinatorRequest::group("g"))
            .await
            .unwrap_err();
        assert_matches!(
            err,
            RequestError::NoVersionMatch {
                api_key: ApiKey::FindCoordinator
            }
        );
    }

    #[tokio::test]
    async fn test_request_poisoned_on_eof() {
        let (client, mut server) = tokio::io::duplex(1024);
        let messenger = Messenger::new(client, 1024, Arc::from("test"));
        messenger.set_version_ranges(HashMap::from([(
            ApiKey::FindCoordinator,
            ApiVersionRange::new(1, 3),
        )]));

        let server_task = tokio::spawn(async move {
            read_request(&mut server).await;
            // hang up without answering
            drop(server);
        });

        let err = messenger
            .request(FindCoordinatorRequest::group("g"))
            .await
            .unwrap_err();
        assert_matches!(err, RequestError::Poisoned(_));
        assert!(messenger.is_poisoned());
        server_task.await.unwrap();

        // give the reader a moment, the state stays poisoned either way
        tokio::time::sleep(Duration::from_millis(1)).await;
        let err = messenger
            .request(FindCoordinatorRequest::group("g"))
            .await
            .unwrap_err();
        assert_matches!(err, RequestError::Poisoned(_));
    }

    #[tokio::test]
    async fn test_close() {
        let (client, _server) = tokio::io::duplex(1024);
        let messenger = Messenger::new(client, 1024, Arc::from("test"));
        messenger.set_version_ranges(HashMap::from([(
            ApiKey::FindCoordinator,
            ApiVersionRange::new(1, 3),
        )]));
        assert!(!messenger.is_poisoned());

        messenger.close().await.unwrap();
        assert!(messenger.is_poisoned());

        let err = messenger
            .request(FindCoordinatorRequest::group("g"))
            .await
            .unwrap_err();
        assert_matches!(err, RequestError::Poisoned(_));
    }
}
