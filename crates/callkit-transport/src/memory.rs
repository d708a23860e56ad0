//! In-memory transport for testing.
//!
//! This module wires a client call object to a server endpoint over
//! `futures` channels, without network I/O. It is primarily useful for
//! testing handlers and pipelines end to end.
//!
//! # Example
//!
//! ```rust
//! use callkit_transport::memory::{self, ChannelConfig};
//!
//! let (call, server) = memory::duplex::<String, String>(&ChannelConfig::default());
//! assert_eq!(server.context.method(), "/callkit.Memory/Call");
//! # drop((call, server));
//! ```

use crate::call::{
    CallHandle, ClientStreamingCall, DuplexStreamingCall, ServerStreamingCall, UnaryCall,
};
use crate::server_context::ServerCallContext;
use crate::traits::{Cursor, MessageSink, cancellable};
use callkit_core::{
    BoxFuture, CallError, CallShape, CancellationToken, Code, Metadata, Status,
};
use futures::channel::{mpsc, oneshot};
use futures::{FutureExt, SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, trace};

/// Configuration for an in-memory call.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Buffer capacity of each direction.
    pub capacity: usize,
    /// Method name recorded on the server context.
    pub method: String,
    /// Peer label recorded on the server context.
    pub peer: String,
    /// Headers the client sends with the call.
    pub request_headers: Metadata,
}

impl ChannelConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the buffer capacity.
    #[must_use]
    pub const fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the method name.
    #[must_use]
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Set the peer label.
    #[must_use]
    pub fn peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = peer.into();
        self
    }

    /// Add a request header.
    #[must_use]
    pub fn request_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.request_headers.add(key, value);
        self
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity: 32,
            method: "/callkit.Memory/Call".to_string(),
            peer: "memory".to_string(),
            request_headers: Metadata::new(),
        }
    }
}

/// Receiving end of an in-memory stream.
pub struct ChannelCursor<T> {
    rx: mpsc::Receiver<T>,
    current: Option<T>,
    outcome: Option<Arc<CallHandle>>,
}

impl<T> ChannelCursor<T> {
    fn new(rx: mpsc::Receiver<T>, outcome: Option<Arc<CallHandle>>) -> Self {
        Self {
            rx,
            current: None,
            outcome,
        }
    }
}

impl<T: Send> Cursor for ChannelCursor<T> {
    type Item = T;

    fn advance<'a>(&'a mut self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<bool, CallError>> {
        Box::pin(async move {
            self.current = None;
            match cancellable(cancel, "advance", self.rx.next()).await? {
                Some(item) => {
                    self.current = Some(item);
                    Ok(true)
                }
                None => {
                    // A failed call surfaces its status instead of a clean end.
                    if let Some(status) = self
                        .outcome
                        .as_ref()
                        .and_then(|handle| handle.status().ok())
                        .filter(|status| !status.is_ok())
                    {
                        return Err(CallError::Status(status));
                    }
                    Ok(false)
                }
            }
        })
    }

    fn current(&self) -> Option<&T> {
        self.current.as_ref()
    }

    fn take_current(&mut self) -> Option<T> {
        self.current.take()
    }
}

/// Sending end of an in-memory stream.
///
/// On the server's response side the sink releases empty response headers
/// before the first message unless the handler already sent its own.
pub struct ChannelSink<T> {
    tx: Option<mpsc::Sender<T>>,
    context: Option<Arc<ServerCallContext>>,
}

impl<T> ChannelSink<T> {
    fn new(tx: mpsc::Sender<T>) -> Self {
        Self {
            tx: Some(tx),
            context: None,
        }
    }

    fn responding_for(tx: mpsc::Sender<T>, context: Arc<ServerCallContext>) -> Self {
        Self {
            tx: Some(tx),
            context: Some(context),
        }
    }

    /// Whether [`MessageSink::complete`] has been called.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.tx.is_none()
    }
}

impl<T: Send> MessageSink for ChannelSink<T> {
    type Item = T;

    fn write(&mut self, item: T) -> BoxFuture<'_, Result<(), CallError>> {
        Box::pin(async move {
            let Some(tx) = self.tx.as_mut() else {
                return Err(CallError::contract("write after the stream was completed"));
            };
            if let Some(context) = self.context.as_ref() {
                send_pending_headers(context);
            }
            tx.send(item).await.map_err(|_| {
                CallError::Status(Status::new(Code::Unavailable, "peer closed the stream"))
            })
        })
    }

    fn complete(&mut self) -> BoxFuture<'_, Result<(), CallError>> {
        if self.tx.take().is_some() {
            trace!("Channel sink completed");
        }
        Box::pin(futures::future::ready(Ok(())))
    }
}

fn send_pending_headers(context: &ServerCallContext) {
    if context.headers_pending() {
        if let Err(err) = context.write_response_headers(Metadata::new()) {
            trace!(error = %err, "Response headers already sent");
        }
    }
}

/// Reports the server's outcome to the client.
///
/// Finishing records the server context's status and trailers on the
/// client's call handle, then closes the response stream. Dropping an
/// unfinished `Completion` finishes it.
pub struct Completion<Resp> {
    client: Arc<CallHandle>,
    context: Arc<ServerCallContext>,
    keepalive: Option<mpsc::Sender<Resp>>,
}

impl<Resp> Completion<Resp> {
    /// Finish the call.
    pub fn finish(mut self) {
        self.finish_inner();
    }

    fn finish_inner(&mut self) {
        let Some(keepalive) = self.keepalive.take() else {
            return;
        };
        // A call that wrote nothing still releases its headers with the status.
        send_pending_headers(&self.context);
        let status = self.context.status();
        let status = if status.is_ok() && self.context.is_cancelled() {
            Status::cancelled("call was cancelled")
        } else {
            status
        };
        debug!(method = %self.context.method(), code = %status.code, "Server finished call");
        self.client.finish(status, self.context.response_trailers());
        drop(keepalive);
    }
}

impl<Resp> Drop for Completion<Resp> {
    fn drop(&mut self) {
        self.finish_inner();
    }
}

/// Server-side endpoints of an in-memory call.
pub struct ServerEnd<Req, Resp> {
    /// Incoming requests.
    pub requests: ChannelCursor<Req>,
    /// Outgoing responses.
    pub responses: ChannelSink<Resp>,
    /// The call context.
    pub context: Arc<ServerCallContext>,
    /// Reports the outcome to the client.
    pub completion: Completion<Resp>,
}

struct Wiring<Req, Resp> {
    requests: ChannelSink<Req>,
    responses: ChannelCursor<Resp>,
    handle: Arc<CallHandle>,
    server: ServerEnd<Req, Resp>,
}

fn wire<Req, Resp>(shape: CallShape, config: &ChannelConfig) -> Wiring<Req, Resp> {
    let (request_tx, request_rx) = mpsc::channel(config.capacity);
    let (response_tx, response_rx) = mpsc::channel(config.capacity);
    let (headers_tx, headers_rx) = oneshot::channel::<Metadata>();
    let cancel = CancellationToken::new();

    let handle = CallHandle::builder(shape)
        .headers(headers_rx.map(|headers| {
            headers.map_err(|_| Status::cancelled("call ended before headers were sent"))
        }))
        .cancellation(cancel.clone())
        .build();

    let context = Arc::new(
        ServerCallContext::builder(config.method.clone())
            .peer(config.peer.clone())
            .request_headers(config.request_headers.clone())
            .cancellation(cancel)
            .on_response_headers(move |headers| {
                if headers_tx.send(headers).is_err() {
                    trace!("Response headers dropped: client already gone");
                }
            })
            .build(),
    );

    let server = ServerEnd {
        requests: ChannelCursor::new(request_rx, None),
        responses: ChannelSink::responding_for(response_tx.clone(), Arc::clone(&context)),
        context: Arc::clone(&context),
        completion: Completion {
            client: Arc::clone(&handle),
            context,
            keepalive: Some(response_tx),
        },
    };

    trace!(%shape, method = %config.method, "Wired in-memory call");

    Wiring {
        requests: ChannelSink::new(request_tx),
        responses: ChannelCursor::new(response_rx, Some(Arc::clone(&handle))),
        handle,
        server,
    }
}

async fn single_response<Resp: Send>(
    mut responses: ChannelCursor<Resp>,
    cancel: CancellationToken,
) -> Result<Resp, CallError> {
    if responses.advance(&cancel).await? {
        responses
            .take_current()
            .ok_or_else(|| CallError::contract("cursor advanced but exposes no current item"))
    } else {
        Err(CallError::Status(Status::new(
            Code::Internal,
            "server completed without a response",
        )))
    }
}

fn send_single<Req>(mut requests: ChannelSink<Req>, request: Req) {
    if let Some(tx) = requests.tx.as_mut() {
        if tx.try_send(request).is_err() {
            debug!("Request dropped: server end already closed");
        }
    }
}

/// Create a connected duplex call.
#[must_use]
pub fn duplex<Req, Resp>(config: &ChannelConfig) -> (DuplexStreamingCall<Req, Resp>, ServerEnd<Req, Resp>)
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    let wiring = wire(CallShape::DuplexStreaming, config);
    let call = DuplexStreamingCall::new(
        Box::new(wiring.requests),
        Box::new(wiring.responses),
        wiring.handle,
    );
    (call, wiring.server)
}

/// Create a connected client-streaming call.
#[must_use]
pub fn client_streaming<Req, Resp>(
    config: &ChannelConfig,
) -> (ClientStreamingCall<Req, Resp>, ServerEnd<Req, Resp>)
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    let wiring = wire(CallShape::ClientStreaming, config);
    let cancel = wiring.handle.cancellation().clone();
    let call = ClientStreamingCall::new(
        Box::new(wiring.requests),
        single_response(wiring.responses, cancel),
        wiring.handle,
    );
    (call, wiring.server)
}

/// Create a connected server-streaming call carrying `request`.
#[must_use]
pub fn server_streaming<Req, Resp>(
    request: Req,
    config: &ChannelConfig,
) -> (ServerStreamingCall<Resp>, ServerEnd<Req, Resp>)
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    let wiring = wire(CallShape::ServerStreaming, config);
    send_single(wiring.requests, request);
    let call = ServerStreamingCall::new(Box::new(wiring.responses), wiring.handle);
    (call, wiring.server)
}

/// Create a connected unary call carrying `request`.
#[must_use]
pub fn unary<Req, Resp>(request: Req, config: &ChannelConfig) -> (UnaryCall<Resp>, ServerEnd<Req, Resp>)
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    let wiring = wire(CallShape::Unary, config);
    send_single(wiring.requests, request);
    let cancel = wiring.handle.cancellation().clone();
    let call = UnaryCall::new(single_response(wiring.responses, cancel), wiring.handle);
    (call, wiring.server)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::HasCallHandle;
    use std::time::Duration;

    #[tokio::test]
    async fn test_sink_to_cursor() {
        let (call, mut server) = duplex::<u32, u32>(&ChannelConfig::default());
        let (mut requests, _responses, _guard) = call.into_parts();

        requests.write(7).await.unwrap();
        requests.complete().await.unwrap();

        let token = CancellationToken::new();
        assert!(server.requests.advance(&token).await.unwrap());
        assert_eq!(server.requests.current(), Some(&7));
        assert!(!server.requests.advance(&token).await.unwrap());
    }

    #[tokio::test]
    async fn test_write_after_complete_is_rejected() {
        let (call, _server) = duplex::<u32, u32>(&ChannelConfig::default());
        let (mut requests, _responses, _guard) = call.into_parts();

        requests.complete().await.unwrap();
        requests.complete().await.unwrap();
        assert!(matches!(
            requests.write(1).await,
            Err(CallError::ContractViolation { .. })
        ));
    }

    #[tokio::test]
    async fn test_completion_reports_status_and_trailers() {
        let (call, server) = duplex::<u32, u32>(&ChannelConfig::default());
        let handle = Arc::clone(call.call_handle());

        server.context.set_status(Status::new(Code::NotFound, "no such key"));
        server.context.add_response_trailer("retry", "never");
        server.completion.finish();

        assert_eq!(handle.status().unwrap().code, Code::NotFound);
        assert_eq!(handle.trailers().unwrap().get_str("retry"), Some("never"));
        assert!(handle.response_headers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_first_response_releases_headers() {
        let (call, mut server) = duplex::<u32, u32>(&ChannelConfig::default());
        let handle = Arc::clone(call.call_handle());

        assert!(server.context.headers_pending());
        server.responses.write(1).await.unwrap();
        assert!(!server.context.headers_pending());

        let headers = tokio::time::timeout(Duration::from_secs(1), handle.response_headers())
            .await
            .expect("headers should be released by the first response");
        assert!(headers.unwrap().is_empty());
        assert!(handle.status().is_err());
        drop(server);
    }

    #[tokio::test]
    async fn test_explicit_headers_are_not_replaced() {
        let (call, mut server) = duplex::<u32, u32>(&ChannelConfig::default());
        let handle = Arc::clone(call.call_handle());

        let mut headers = Metadata::new();
        headers.add("x-shard", "7");
        server.context.write_response_headers(headers).unwrap();
        server.responses.write(1).await.unwrap();

        let received = handle.response_headers().await.unwrap();
        assert_eq!(received.get_str("x-shard"), Some("7"));
        drop(server);
    }

    #[tokio::test]
    async fn test_failed_status_fails_client_cursor() {
        let (call, server) = duplex::<u32, u32>(&ChannelConfig::default());
        let (_requests, mut responses, _guard) = call.into_parts();

        server.context.set_status(Status::new(Code::Internal, "crashed"));
        drop(server);

        let err = responses.advance(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, CallError::Status(s) if s.code == Code::Internal));
    }

    #[tokio::test]
    async fn test_unary_round_trip() {
        let (call, mut server) = unary::<u32, u32>(20, &ChannelConfig::default());

        let token = CancellationToken::new();
        assert!(server.requests.advance(&token).await.unwrap());
        let request = server.requests.take_current().unwrap();
        server.responses.write(request + 1).await.unwrap();
        server.completion.finish();

        assert_eq!(call.response().await.unwrap(), 21);
    }

    #[tokio::test]
    async fn test_cancelled_advance() {
        let (_call, mut server) = duplex::<u32, u32>(&ChannelConfig::default());
        let token = CancellationToken::new();
        token.cancel();
        let err = server.requests.advance(&token).await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
