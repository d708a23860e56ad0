//! Call objects for the four call shapes.
//!
//! Every call object owns the endpoints of its streams plus a shared
//! [`CallHandle`] carrying the call's lifecycle values: response headers,
//! terminal status, trailing metadata, the call's cancellation token and the
//! disposal hook that releases transport resources.
//!
//! The transport fills the handle in: it resolves the headers future, and it
//! calls [`CallHandle::finish`] once the peer reported the outcome.

use crate::traits::{BoxCursor, BoxSink};
use callkit_core::{BoxFuture, CallError, CallShape, CancellationToken, Metadata, Status};
use futures::future::{FutureExt, Shared};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tracing::{debug, trace};

type HeadersFuture = Shared<BoxFuture<'static, Result<Metadata, Status>>>;
type DisposeHook = Box<dyn FnOnce() + Send>;

/// Shared lifecycle state of one call.
pub struct CallHandle {
    shape: CallShape,
    headers: HeadersFuture,
    outcome: OnceLock<(Status, Metadata)>,
    cancel: CancellationToken,
    disposed: AtomicBool,
    on_dispose: Mutex<Option<DisposeHook>>,
}

impl CallHandle {
    /// Start building a handle for a call of the given shape.
    #[must_use]
    pub fn builder(shape: CallShape) -> CallHandleBuilder {
        CallHandleBuilder::new(shape)
    }

    /// The call shape.
    #[must_use]
    pub fn shape(&self) -> CallShape {
        self.shape
    }

    /// Wait for the response headers.
    pub async fn response_headers(&self) -> Result<Metadata, CallError> {
        self.headers.clone().await.map_err(CallError::Status)
    }

    /// Record the call's outcome.
    ///
    /// Only the first outcome is kept; returns `false` if the call had
    /// already finished.
    pub fn finish(&self, status: Status, trailers: Metadata) -> bool {
        let code = status.code;
        let recorded = self.outcome.set((status, trailers)).is_ok();
        if recorded {
            debug!(shape = %self.shape, %code, "Call finished");
        }
        recorded
    }

    /// Whether the outcome is known.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.outcome.get().is_some()
    }

    /// The terminal status. Fails until the call has finished.
    pub fn status(&self) -> Result<Status, CallError> {
        self.outcome
            .get()
            .map(|(status, _)| status.clone())
            .ok_or(CallError::NotCompleted { what: "status" })
    }

    /// The trailing metadata. Fails until the call has finished.
    pub fn trailers(&self) -> Result<Metadata, CallError> {
        self.outcome
            .get()
            .map(|(_, trailers)| trailers.clone())
            .ok_or(CallError::NotCompleted { what: "trailers" })
    }

    /// The call's cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Release the call: trigger its cancellation token and run the
    /// transport's disposal hook.
    ///
    /// Only the first call has an effect; returns whether this was it.
    pub fn dispose(&self) -> bool {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.cancel.cancel();
        let hook = self
            .on_dispose
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(hook) = hook {
            hook();
        }
        trace!(shape = %self.shape, "Call disposed");
        true
    }

    /// Whether [`CallHandle::dispose`] has run.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for CallHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallHandle")
            .field("shape", &self.shape)
            .field("finished", &self.is_finished())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

/// Builder for [`CallHandle`].
pub struct CallHandleBuilder {
    shape: CallShape,
    headers: Option<BoxFuture<'static, Result<Metadata, Status>>>,
    cancel: Option<CancellationToken>,
    on_dispose: Option<DisposeHook>,
}

impl CallHandleBuilder {
    fn new(shape: CallShape) -> Self {
        Self {
            shape,
            headers: None,
            cancel: None,
            on_dispose: None,
        }
    }

    /// Future resolving to the response headers.
    ///
    /// Defaults to empty headers available immediately.
    pub fn headers<F>(mut self, headers: F) -> Self
    where
        F: Future<Output = Result<Metadata, Status>> + Send + 'static,
    {
        self.headers = Some(headers.boxed());
        self
    }

    /// Share an existing cancellation token instead of creating one.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Hook run exactly once when the call is disposed.
    pub fn on_dispose(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_dispose = Some(Box::new(hook));
        self
    }

    /// Build the shared handle.
    #[must_use]
    pub fn build(self) -> Arc<CallHandle> {
        let headers = self
            .headers
            .unwrap_or_else(|| futures::future::ready(Ok(Metadata::new())).boxed());
        Arc::new(CallHandle {
            shape: self.shape,
            headers: headers.shared(),
            outcome: OnceLock::new(),
            cancel: self.cancel.unwrap_or_default(),
            disposed: AtomicBool::new(false),
            on_dispose: Mutex::new(self.on_dispose),
        })
    }
}

/// Disposes a call when dropped.
#[derive(Debug)]
pub struct CallGuard {
    handle: Arc<CallHandle>,
}

impl CallGuard {
    /// Guard `handle`.
    #[must_use]
    pub fn new(handle: Arc<CallHandle>) -> Self {
        Self { handle }
    }

    /// The guarded handle.
    #[must_use]
    pub fn handle(&self) -> &Arc<CallHandle> {
        &self.handle
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.handle.dispose();
    }
}

/// Access to the lifecycle handle of a call object.
pub trait HasCallHandle {
    /// The shared handle.
    fn call_handle(&self) -> &Arc<CallHandle>;
}

/// A single-request, single-response call.
pub struct UnaryCall<Resp> {
    response: BoxFuture<'static, Result<Resp, CallError>>,
    guard: CallGuard,
}

impl<Resp> UnaryCall<Resp> {
    /// Assemble a unary call.
    pub fn new<F>(response: F, handle: Arc<CallHandle>) -> Self
    where
        F: Future<Output = Result<Resp, CallError>> + Send + 'static,
    {
        Self {
            response: response.boxed(),
            guard: CallGuard::new(handle),
        }
    }

    /// Wait for the response. The call is disposed once this returns.
    pub async fn response(self) -> Result<Resp, CallError> {
        let Self { response, guard } = self;
        let result = response.await;
        drop(guard);
        result
    }
}

impl<Resp> HasCallHandle for UnaryCall<Resp> {
    fn call_handle(&self) -> &Arc<CallHandle> {
        self.guard.handle()
    }
}

/// A call sending a request stream and receiving one response.
pub struct ClientStreamingCall<Req, Resp> {
    requests: BoxSink<Req>,
    response: BoxFuture<'static, Result<Resp, CallError>>,
    guard: CallGuard,
}

impl<Req, Resp> ClientStreamingCall<Req, Resp> {
    /// Assemble a client-streaming call.
    pub fn new<F>(requests: BoxSink<Req>, response: F, handle: Arc<CallHandle>) -> Self
    where
        F: Future<Output = Result<Resp, CallError>> + Send + 'static,
    {
        Self {
            requests,
            response: response.boxed(),
            guard: CallGuard::new(handle),
        }
    }

    /// Split into the request sink, the response future and the guard.
    #[must_use]
    pub fn into_parts(
        self,
    ) -> (
        BoxSink<Req>,
        BoxFuture<'static, Result<Resp, CallError>>,
        CallGuard,
    ) {
        (self.requests, self.response, self.guard)
    }
}

impl<Req, Resp> HasCallHandle for ClientStreamingCall<Req, Resp> {
    fn call_handle(&self) -> &Arc<CallHandle> {
        self.guard.handle()
    }
}

/// A call sending one request and receiving a response stream.
pub struct ServerStreamingCall<Resp> {
    responses: BoxCursor<Resp>,
    guard: CallGuard,
}

impl<Resp> ServerStreamingCall<Resp> {
    /// Assemble a server-streaming call.
    #[must_use]
    pub fn new(responses: BoxCursor<Resp>, handle: Arc<CallHandle>) -> Self {
        Self {
            responses,
            guard: CallGuard::new(handle),
        }
    }

    /// Split into the response cursor and the guard.
    #[must_use]
    pub fn into_parts(self) -> (BoxCursor<Resp>, CallGuard) {
        (self.responses, self.guard)
    }
}

impl<Resp> HasCallHandle for ServerStreamingCall<Resp> {
    fn call_handle(&self) -> &Arc<CallHandle> {
        self.guard.handle()
    }
}

/// A call with a request stream and a response stream.
pub struct DuplexStreamingCall<Req, Resp> {
    requests: BoxSink<Req>,
    responses: BoxCursor<Resp>,
    guard: CallGuard,
}

impl<Req, Resp> DuplexStreamingCall<Req, Resp> {
    /// Assemble a duplex call.
    #[must_use]
    pub fn new(requests: BoxSink<Req>, responses: BoxCursor<Resp>, handle: Arc<CallHandle>) -> Self {
        Self {
            requests,
            responses,
            guard: CallGuard::new(handle),
        }
    }

    /// Split into the request sink, the response cursor and the guard.
    #[must_use]
    pub fn into_parts(self) -> (BoxSink<Req>, BoxCursor<Resp>, CallGuard) {
        (self.requests, self.responses, self.guard)
    }
}

impl<Req, Resp> HasCallHandle for DuplexStreamingCall<Req, Resp> {
    fn call_handle(&self) -> &Arc<CallHandle> {
        self.guard.handle()
    }
}
