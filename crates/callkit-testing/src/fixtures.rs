//! Call objects wired to mock endpoints.

use crate::mock::{CursorProbe, MockCursor, MockSink, SinkProbe};
use callkit_core::{CallError, CallShape};
use callkit_transport::{
    CallHandle, ClientStreamingCall, DuplexStreamingCall, ServerCallContext, ServerStreamingCall,
    UnaryCall,
};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Counts how often a call was disposed.
#[derive(Debug, Clone, Default)]
pub struct DisposeCounter {
    count: Arc<AtomicUsize>,
}

impl DisposeCounter {
    /// Create a counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A dispose hook incrementing this counter.
    pub fn hook(&self) -> impl FnOnce() + Send + 'static {
        let count = Arc::clone(&self.count);
        move || {
            count.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// How many times the hook ran.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

fn tracked_handle(shape: CallShape, disposals: &DisposeCounter) -> Arc<CallHandle> {
    CallHandle::builder(shape).on_dispose(disposals.hook()).build()
}

/// A duplex call over a mock sink and cursor.
pub struct DuplexFixture<Req, Resp> {
    /// The call object.
    pub call: DuplexStreamingCall<Req, Resp>,
    /// The call's shared handle.
    pub handle: Arc<CallHandle>,
    /// Observes the request sink.
    pub requests: SinkProbe<Req>,
    /// Observes the response cursor.
    pub responses: CursorProbe,
    /// Counts disposals.
    pub disposals: DisposeCounter,
}

/// Build a duplex call writing to `sink` and reading from `cursor`.
pub fn duplex<Req, Resp>(sink: MockSink<Req>, cursor: MockCursor<Resp>) -> DuplexFixture<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    let disposals = DisposeCounter::new();
    let handle = tracked_handle(CallShape::DuplexStreaming, &disposals);
    let requests = sink.probe();
    let responses = cursor.probe();
    DuplexFixture {
        call: DuplexStreamingCall::new(Box::new(sink), Box::new(cursor), Arc::clone(&handle)),
        handle,
        requests,
        responses,
        disposals,
    }
}

/// A client-streaming call over a mock sink.
pub struct ClientStreamingFixture<Req, Resp> {
    /// The call object.
    pub call: ClientStreamingCall<Req, Resp>,
    /// The call's shared handle.
    pub handle: Arc<CallHandle>,
    /// Observes the request sink.
    pub requests: SinkProbe<Req>,
    /// Counts disposals.
    pub disposals: DisposeCounter,
}

/// Build a client-streaming call writing to `sink` and resolving to
/// `response`.
pub fn client_streaming<Req, Resp, F>(sink: MockSink<Req>, response: F) -> ClientStreamingFixture<Req, Resp>
where
    Req: Send + 'static,
    F: Future<Output = Result<Resp, CallError>> + Send + 'static,
{
    let disposals = DisposeCounter::new();
    let handle = tracked_handle(CallShape::ClientStreaming, &disposals);
    let requests = sink.probe();
    ClientStreamingFixture {
        call: ClientStreamingCall::new(Box::new(sink), response, Arc::clone(&handle)),
        handle,
        requests,
        disposals,
    }
}

/// A server-streaming call over a mock cursor.
pub struct ServerStreamingFixture<Resp> {
    /// The call object.
    pub call: ServerStreamingCall<Resp>,
    /// The call's shared handle.
    pub handle: Arc<CallHandle>,
    /// Observes the response cursor.
    pub responses: CursorProbe,
    /// Counts disposals.
    pub disposals: DisposeCounter,
}

/// Build a server-streaming call reading from `cursor`.
pub fn server_streaming<Resp>(cursor: MockCursor<Resp>) -> ServerStreamingFixture<Resp>
where
    Resp: Send + 'static,
{
    let disposals = DisposeCounter::new();
    let handle = tracked_handle(CallShape::ServerStreaming, &disposals);
    let responses = cursor.probe();
    ServerStreamingFixture {
        call: ServerStreamingCall::new(Box::new(cursor), Arc::clone(&handle)),
        handle,
        responses,
        disposals,
    }
}

/// Build a unary call resolving to `response`.
pub fn unary<Resp, F>(response: F) -> (UnaryCall<Resp>, Arc<CallHandle>, DisposeCounter)
where
    F: Future<Output = Result<Resp, CallError>> + Send + 'static,
{
    let disposals = DisposeCounter::new();
    let handle = tracked_handle(CallShape::Unary, &disposals);
    (UnaryCall::new(response, Arc::clone(&handle)), handle, disposals)
}

/// A fresh server context for `method`.
#[must_use]
pub fn server_context(method: &str) -> Arc<ServerCallContext> {
    Arc::new(ServerCallContext::builder(method).peer("test").build())
}
