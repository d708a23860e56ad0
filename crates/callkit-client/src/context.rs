//! The call context facade.
//!
//! Every call object, whatever its shape, exposes its lifecycle values
//! through [`StreamingCallContext`]. Downstream code only sees the
//! [`CallContext`] trait.

use callkit_core::{BoxFuture, CallContext, CallError, CallShape, Metadata, SharedCallContext, Status};
use callkit_transport::{CallHandle, HasCallHandle};
use std::fmt;
use std::sync::Arc;

/// [`CallContext`] over a call's shared handle.
///
/// The shape tag comes from the handle, so one type serves unary,
/// client-streaming, server-streaming and duplex calls alike.
#[derive(Clone)]
pub struct StreamingCallContext {
    handle: Arc<CallHandle>,
}

impl StreamingCallContext {
    /// Create a context for the call behind `handle`.
    #[must_use]
    pub fn new(handle: Arc<CallHandle>) -> Self {
        Self { handle }
    }

    /// Create a context for `call`.
    #[must_use]
    pub fn of<C: HasCallHandle + ?Sized>(call: &C) -> Self {
        Self::new(Arc::clone(call.call_handle()))
    }
}

impl CallContext for StreamingCallContext {
    fn shape(&self) -> CallShape {
        self.handle.shape()
    }

    fn response_headers(&self) -> BoxFuture<'_, Result<Metadata, CallError>> {
        Box::pin(self.handle.response_headers())
    }

    fn status(&self) -> Result<Status, CallError> {
        self.handle.status()
    }

    fn trailers(&self) -> Result<Metadata, CallError> {
        self.handle.trailers()
    }
}

impl fmt::Debug for StreamingCallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingCallContext")
            .field("shape", &self.handle.shape())
            .field("finished", &self.handle.is_finished())
            .finish()
    }
}

/// Adds [`call_context`](CallContextExt::call_context) to every call object.
pub trait CallContextExt: HasCallHandle {
    /// The call's lifecycle facade.
    fn call_context(&self) -> SharedCallContext {
        Arc::new(StreamingCallContext::of(self))
    }
}

impl<T: HasCallHandle + ?Sized> CallContextExt for T {}
