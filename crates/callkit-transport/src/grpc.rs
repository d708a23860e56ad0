//! Bridges between tonic and callkit call objects.
//!
//! This module adapts tonic's streaming types to the [`Cursor`] and
//! [`MessageSink`] contracts, and builds callkit call objects from the
//! values a tonic client returns.
//!
//! # Client example
//!
//! ```ignore
//! use callkit_transport::grpc;
//!
//! let (requests, outbound) = grpc::request_channel(32);
//! let response = client.chat(outbound).await?;
//! let call = grpc::duplex_call(requests, response);
//! ```
//!
//! # Server example
//!
//! ```ignore
//! async fn chat(
//!     &self,
//!     request: Request<Streaming<Note>>,
//! ) -> Result<Response<Self::ChatStream>, Status> {
//!     let call = grpc::server_call(request, "/chat.Chat/Chat", 32);
//!     let (requests, responses, context, stream) = call.into_parts();
//!     tokio::spawn(async move {
//!         // run a pipeline against `requests`/`responses`/`context`
//!         responses.finish(&context).await;
//!     });
//!     Ok(Response::new(stream))
//! }
//! ```

use crate::call::{
    CallHandle, ClientStreamingCall, DuplexStreamingCall, ServerStreamingCall, UnaryCall,
};
use crate::server_context::ServerCallContext;
use crate::traits::{Cursor, MessageSink, cancellable};
use callkit_core::{
    BoxFuture, CallError, CallShape, CancelOnDrop, CancellationToken, Code, Metadata,
    MetadataValue, Status,
};
use futures::{FutureExt, Stream};
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tonic::metadata::{
    Ascii, Binary, KeyAndValueRef, MetadataKey, MetadataMap, MetadataValue as TonicValue,
};
use tracing::{debug, warn};

/// Re-export tonic types for convenience.
pub use tonic;

// =============================================================================
// Conversions
// =============================================================================

/// Convert a tonic status code.
#[must_use]
pub fn code_from_tonic(code: tonic::Code) -> Code {
    Code::from_i32(code as i32)
}

/// Convert a status code to tonic's.
#[must_use]
pub fn code_to_tonic(code: Code) -> tonic::Code {
    tonic::Code::from_i32(code.as_i32())
}

/// Convert a tonic status. Status metadata is dropped; see
/// [`metadata_from_tonic`].
#[must_use]
pub fn status_from_tonic(status: &tonic::Status) -> Status {
    Status::new(code_from_tonic(status.code()), status.message())
}

/// Convert a status to tonic's.
#[must_use]
pub fn status_to_tonic(status: &Status) -> tonic::Status {
    tonic::Status::new(code_to_tonic(status.code), status.message.clone())
}

/// Convert tonic metadata.
///
/// Non-printable ASCII values and undecodable binary values are skipped.
#[must_use]
pub fn metadata_from_tonic(map: &MetadataMap) -> Metadata {
    let mut metadata = Metadata::new();
    for entry in map.iter() {
        match entry {
            KeyAndValueRef::Ascii(key, value) => match value.to_str() {
                Ok(text) => {
                    metadata.add(key.as_str(), text);
                }
                Err(_) => warn!(key = key.as_str(), "Skipping non-printable metadata value"),
            },
            KeyAndValueRef::Binary(key, value) => match value.to_bytes() {
                Ok(bytes) => {
                    metadata.add_binary(key.as_str(), bytes);
                }
                Err(_) => warn!(key = key.as_str(), "Skipping undecodable binary metadata value"),
            },
        }
    }
    metadata
}

/// Convert metadata to tonic's.
///
/// Entries tonic rejects (invalid keys or values) are skipped.
#[must_use]
pub fn metadata_to_tonic(metadata: &Metadata) -> MetadataMap {
    let mut map = MetadataMap::new();
    for entry in metadata {
        match &entry.value {
            MetadataValue::Ascii(text) => {
                let key = MetadataKey::<Ascii>::from_bytes(entry.key.as_bytes());
                let value = TonicValue::<Ascii>::try_from(text.as_str());
                match (key, value) {
                    (Ok(key), Ok(value)) => {
                        map.append(key, value);
                    }
                    _ => warn!(key = %entry.key, "Skipping metadata entry rejected by tonic"),
                }
            }
            MetadataValue::Binary(bytes) => {
                match MetadataKey::<Binary>::from_bytes(entry.key.as_bytes()) {
                    Ok(key) => {
                        map.append_bin(key, TonicValue::from_bytes(bytes));
                    }
                    Err(_) => warn!(key = %entry.key, "Skipping metadata entry rejected by tonic"),
                }
            }
        }
    }
    map
}

fn failure_from_tonic(status: &tonic::Status) -> (Status, Metadata) {
    (status_from_tonic(status), metadata_from_tonic(status.metadata()))
}

// =============================================================================
// Cursor and sinks
// =============================================================================

/// A [`Cursor`] over a tonic message stream.
///
/// When attached to a call handle, the cursor records the call's outcome:
/// the trailers at a clean end, or the failure status.
pub struct TonicCursor<T> {
    inner: tonic::Streaming<T>,
    current: Option<T>,
    handle: Option<Arc<CallHandle>>,
}

impl<T> TonicCursor<T> {
    /// Wrap a tonic stream.
    #[must_use]
    pub fn new(inner: tonic::Streaming<T>) -> Self {
        Self {
            inner,
            current: None,
            handle: None,
        }
    }

    /// Record the outcome of the stream on `handle`.
    #[must_use]
    pub fn finishing(mut self, handle: Arc<CallHandle>) -> Self {
        self.handle = Some(handle);
        self
    }
}

impl<T: Send + 'static> Cursor for TonicCursor<T> {
    type Item = T;

    fn advance<'a>(&'a mut self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<bool, CallError>> {
        Box::pin(async move {
            self.current = None;
            match cancellable(cancel, "advance", self.inner.message()).await? {
                Ok(Some(item)) => {
                    self.current = Some(item);
                    Ok(true)
                }
                Ok(None) => {
                    if let Some(handle) = &self.handle {
                        let trailers = match self.inner.trailers().await {
                            Ok(trailers) => trailers.as_ref().map(metadata_from_tonic).unwrap_or_default(),
                            Err(status) => {
                                let (status, trailers) = failure_from_tonic(&status);
                                handle.finish(status.clone(), trailers);
                                return Err(CallError::Status(status));
                            }
                        };
                        handle.finish(Status::ok(), trailers);
                    }
                    Ok(false)
                }
                Err(status) => {
                    let (status, trailers) = failure_from_tonic(&status);
                    if let Some(handle) = &self.handle {
                        handle.finish(status.clone(), trailers);
                    }
                    Err(CallError::Status(status))
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

/// Client-side request sink feeding a tonic request stream.
pub struct TonicRequestSink<T> {
    tx: Option<mpsc::Sender<T>>,
}

/// Create a request sink and the stream to hand to a tonic client method.
#[must_use]
pub fn request_channel<T>(capacity: usize) -> (TonicRequestSink<T>, ReceiverStream<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    (TonicRequestSink { tx: Some(tx) }, ReceiverStream::new(rx))
}

impl<T: Send> MessageSink for TonicRequestSink<T> {
    type Item = T;

    fn write(&mut self, item: T) -> BoxFuture<'_, Result<(), CallError>> {
        Box::pin(async move {
            let Some(tx) = self.tx.as_ref() else {
                return Err(CallError::contract("write after the request stream was completed"));
            };
            tx.send(item).await.map_err(|_| {
                CallError::Status(Status::new(Code::Unavailable, "request stream closed"))
            })
        })
    }

    fn complete(&mut self) -> BoxFuture<'_, Result<(), CallError>> {
        self.tx = None;
        Box::pin(futures::future::ready(Ok(())))
    }
}

/// Server-side response sink feeding a tonic response stream.
pub struct TonicResponseSink<T> {
    tx: Option<mpsc::Sender<Result<T, tonic::Status>>>,
}

impl<T: Send> TonicResponseSink<T> {
    /// End the response stream, reporting a failed status to the client.
    ///
    /// A successful status ends the stream cleanly. tonic only carries
    /// trailers on failed statuses, so successful trailers are not sent.
    pub async fn finish(mut self, context: &ServerCallContext) {
        let Some(tx) = self.tx.take() else {
            return;
        };
        let status = context.status();
        if status.is_ok() {
            return;
        }
        let failure = tonic::Status::with_metadata(
            code_to_tonic(status.code),
            status.message,
            metadata_to_tonic(&context.response_trailers()),
        );
        if tx.send(Err(failure)).await.is_err() {
            debug!(method = %context.method(), "Client gone before the status was sent");
        }
    }
}

impl<T: Send> MessageSink for TonicResponseSink<T> {
    type Item = T;

    fn write(&mut self, item: T) -> BoxFuture<'_, Result<(), CallError>> {
        Box::pin(async move {
            let Some(tx) = self.tx.as_ref() else {
                return Err(CallError::contract("write after the response stream was completed"));
            };
            tx.send(Ok(item)).await.map_err(|_| {
                CallError::Status(Status::new(Code::Unavailable, "response stream closed"))
            })
        })
    }
}

pin_project! {
    /// Response stream handed back to tonic by a server handler.
    ///
    /// Dropping the stream, which tonic does once the client is gone,
    /// cancels the server call.
    pub struct ResponseStream<T> {
        #[pin]
        inner: ReceiverStream<Result<T, tonic::Status>>,
        guard: CancelOnDrop,
    }
}

impl<T> Stream for ResponseStream<T> {
    type Item = Result<T, tonic::Status>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().inner.poll_next(cx)
    }
}

// =============================================================================
// Server calls
// =============================================================================

/// The pieces a tonic server handler needs to run a pipeline.
pub struct TonicServerCall<Req, Resp> {
    requests: TonicCursor<Req>,
    responses: TonicResponseSink<Resp>,
    context: Arc<ServerCallContext>,
    stream: ResponseStream<Resp>,
}

impl<Req, Resp> TonicServerCall<Req, Resp> {
    /// Split into the request cursor, the response sink, the call context
    /// and the stream to return from the handler.
    #[must_use]
    pub fn into_parts(
        self,
    ) -> (
        TonicCursor<Req>,
        TonicResponseSink<Resp>,
        Arc<ServerCallContext>,
        ResponseStream<Resp>,
    ) {
        (self.requests, self.responses, self.context, self.stream)
    }
}

/// Build a server context from an incoming tonic request.
#[must_use]
pub fn server_context<R>(request: &tonic::Request<R>, method: impl Into<String>) -> ServerCallContext {
    let peer = request
        .remote_addr()
        .map_or_else(|| "unknown".to_string(), |addr| addr.to_string());
    ServerCallContext::builder(method)
        .peer(peer)
        .request_headers(metadata_from_tonic(request.metadata()))
        .build()
}

/// Prepare a streaming server call from an incoming tonic request.
#[must_use]
pub fn server_call<Req, Resp>(
    request: tonic::Request<tonic::Streaming<Req>>,
    method: impl Into<String>,
    capacity: usize,
) -> TonicServerCall<Req, Resp> {
    let context = Arc::new(server_context(&request, method));
    let (tx, rx) = mpsc::channel(capacity);
    let stream = ResponseStream {
        inner: ReceiverStream::new(rx),
        guard: CancelOnDrop::new(context.cancellation().clone()),
    };
    debug!(method = %context.method(), peer = %context.peer(), "Accepted streaming call");

    TonicServerCall {
        requests: TonicCursor::new(request.into_inner()),
        responses: TonicResponseSink { tx: Some(tx) },
        context,
        stream,
    }
}

// =============================================================================
// Client calls
// =============================================================================

fn streaming_handle<Resp>(shape: CallShape, response: &tonic::Response<Resp>) -> Arc<CallHandle> {
    let headers = metadata_from_tonic(response.metadata());
    CallHandle::builder(shape)
        .headers(futures::future::ready(Ok(headers)))
        .build()
}

/// Build a duplex call from a request sink and the tonic response.
#[must_use]
pub fn duplex_call<Req, Resp>(
    requests: TonicRequestSink<Req>,
    response: tonic::Response<tonic::Streaming<Resp>>,
) -> DuplexStreamingCall<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    let handle = streaming_handle(CallShape::DuplexStreaming, &response);
    let responses = TonicCursor::new(response.into_inner()).finishing(Arc::clone(&handle));
    DuplexStreamingCall::new(Box::new(requests), Box::new(responses), handle)
}

/// Build a server-streaming call from the tonic response.
#[must_use]
pub fn server_streaming_call<Resp>(
    response: tonic::Response<tonic::Streaming<Resp>>,
) -> ServerStreamingCall<Resp>
where
    Resp: Send + 'static,
{
    let handle = streaming_handle(CallShape::ServerStreaming, &response);
    let responses = TonicCursor::new(response.into_inner()).finishing(Arc::clone(&handle));
    ServerStreamingCall::new(Box::new(responses), handle)
}

fn single_response_handle<Resp, F>(
    shape: CallShape,
    response: F,
) -> (Arc<CallHandle>, impl Future<Output = Result<Resp, CallError>> + Send + 'static)
where
    Resp: Send + 'static,
    F: Future<Output = Result<tonic::Response<Resp>, tonic::Status>> + Send + 'static,
{
    let (headers_tx, headers_rx) = oneshot::channel::<Result<Metadata, Status>>();
    let handle = CallHandle::builder(shape)
        .headers(headers_rx.map(|headers| {
            headers.unwrap_or_else(|_| Err(Status::cancelled("call ended before headers arrived")))
        }))
        .build();

    let finisher = Arc::clone(&handle);
    let response = async move {
        match response.await {
            Ok(response) => {
                let (metadata, message, _) = response.into_parts();
                let _ = headers_tx.send(Ok(metadata_from_tonic(&metadata)));
                finisher.finish(Status::ok(), Metadata::new());
                Ok(message)
            }
            Err(status) => {
                let (status, trailers) = failure_from_tonic(&status);
                let _ = headers_tx.send(Err(status.clone()));
                finisher.finish(status.clone(), trailers);
                Err(CallError::Status(status))
            }
        }
    };
    (handle, response)
}

/// Build a client-streaming call from a request sink and the pending
/// tonic response.
pub fn client_streaming_call<Req, Resp, F>(
    requests: TonicRequestSink<Req>,
    response: F,
) -> ClientStreamingCall<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
    F: Future<Output = Result<tonic::Response<Resp>, tonic::Status>> + Send + 'static,
{
    let (handle, response) = single_response_handle(CallShape::ClientStreaming, response);
    ClientStreamingCall::new(Box::new(requests), response, handle)
}

/// Build a unary call from the pending tonic response.
pub fn unary_call<Resp, F>(response: F) -> UnaryCall<Resp>
where
    Resp: Send + 'static,
    F: Future<Output = Result<tonic::Response<Resp>, tonic::Status>> + Send + 'static,
{
    let (handle, response) = single_response_handle(CallShape::Unary, response);
    UnaryCall::new(response, handle)
}
