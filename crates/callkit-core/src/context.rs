//! The call lifecycle facade seen by client-side consumers.

use crate::error::CallError;
use crate::metadata::Metadata;
use crate::status::Status;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;

/// The four shapes a call can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallShape {
    /// Single request, single response.
    Unary,
    /// Request stream, single response.
    ClientStreaming,
    /// Single request, response stream.
    ServerStreaming,
    /// Request stream, response stream.
    DuplexStreaming,
}

impl CallShape {
    /// Whether the caller sends a stream of requests.
    #[must_use]
    pub const fn streams_requests(self) -> bool {
        matches!(self, Self::ClientStreaming | Self::DuplexStreaming)
    }

    /// Whether the peer answers with a stream of responses.
    #[must_use]
    pub const fn streams_responses(self) -> bool {
        matches!(self, Self::ServerStreaming | Self::DuplexStreaming)
    }
}

impl fmt::Display for CallShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unary => write!(f, "unary"),
            Self::ClientStreaming => write!(f, "client-streaming"),
            Self::ServerStreaming => write!(f, "server-streaming"),
            Self::DuplexStreaming => write!(f, "duplex-streaming"),
        }
    }
}

/// Read-only view of a call's lifecycle values.
///
/// Every call shape normalizes to this interface so downstream code does not
/// care which kind of call produced a message.
pub trait CallContext: Send + Sync {
    /// The shape of the underlying call.
    fn shape(&self) -> CallShape;

    /// Response headers. Resolves once the transport has received them.
    fn response_headers(&self) -> BoxFuture<'_, Result<Metadata, CallError>>;

    /// The terminal status.
    ///
    /// Fails with [`CallError::NotCompleted`] until the call has finished.
    fn status(&self) -> Result<Status, CallError>;

    /// The trailing metadata.
    ///
    /// Fails with [`CallError::NotCompleted`] until the call has finished.
    fn trailers(&self) -> Result<Metadata, CallError>;
}

/// Shared, type-erased call context.
pub type SharedCallContext = Arc<dyn CallContext>;

impl fmt::Debug for dyn CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("CallContext");
        debug.field("shape", &self.shape());
        match self.status() {
            Ok(status) => debug.field("status", &status),
            Err(_) => debug.field("status", &"pending"),
        };
        debug.finish()
    }
}

impl<T: CallContext + ?Sized> CallContext for Arc<T> {
    fn shape(&self) -> CallShape {
        (**self).shape()
    }

    fn response_headers(&self) -> BoxFuture<'_, Result<Metadata, CallError>> {
        (**self).response_headers()
    }

    fn status(&self) -> Result<Status, CallError> {
        (**self).status()
    }

    fn trailers(&self) -> Result<Metadata, CallError> {
        (**self).trailers()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_directions() {
        assert!(!CallShape::Unary.streams_requests());
        assert!(!CallShape::Unary.streams_responses());
        assert!(CallShape::ClientStreaming.streams_requests());
        assert!(!CallShape::ClientStreaming.streams_responses());
        assert!(!CallShape::ServerStreaming.streams_requests());
        assert!(CallShape::ServerStreaming.streams_responses());
        assert!(CallShape::DuplexStreaming.streams_requests());
        assert!(CallShape::DuplexStreaming.streams_responses());
    }

    #[test]
    fn test_shape_display() {
        assert_eq!(CallShape::DuplexStreaming.to_string(), "duplex-streaming");
    }

    struct Finished(Option<Status>);

    impl CallContext for Finished {
        fn shape(&self) -> CallShape {
            CallShape::ServerStreaming
        }

        fn response_headers(&self) -> BoxFuture<'_, Result<Metadata, CallError>> {
            Box::pin(futures::future::ready(Ok(Metadata::new())))
        }

        fn status(&self) -> Result<Status, CallError> {
            self.0.clone().ok_or(CallError::NotCompleted { what: "status" })
        }

        fn trailers(&self) -> Result<Metadata, CallError> {
            Ok(Metadata::new())
        }
    }

    #[test]
    fn test_shared_context_debug() {
        let open: SharedCallContext = Arc::new(Finished(None));
        let rendered = format!("{open:?}");
        assert!(rendered.contains("ServerStreaming"));
        assert!(rendered.contains("pending"));

        let done: SharedCallContext = Arc::new(Finished(Some(Status::ok())));
        let failed: Result<SharedCallContext, CallError> = Err(CallError::cancelled("read"));
        assert!(format!("{done:?}").contains("Ok"));
        assert!(failed.unwrap_err().is_cancelled());
    }
}
