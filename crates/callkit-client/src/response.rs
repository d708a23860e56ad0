//! Response streams paired with their call context.

use crate::context::CallContextExt;
use callkit_core::{CallError, MessageWithContext, SharedCallContext};
use callkit_transport::{
    BoxCursor, CallGuard, DuplexStreamingCall, ReadAll, ServerStreamingCall, read_all_with,
};
use futures::Stream;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

/// A response paired with the context of the call that produced it.
pub type Response<Resp> = MessageWithContext<Resp, SharedCallContext>;

pin_project! {
    /// The responses of a streaming call, each paired with the call context.
    ///
    /// The call is disposed when the stream ends, fails or is dropped.
    #[must_use = "streams do nothing unless polled"]
    pub struct Responses<Resp> {
        #[pin]
        inner: ReadAll<Resp>,
        context: SharedCallContext,
        guard: Option<CallGuard>,
    }
}

impl<Resp: Send + 'static> Responses<Resp> {
    pub(crate) fn new(cursor: BoxCursor<Resp>, guard: CallGuard, context: SharedCallContext) -> Self {
        let token = guard.handle().cancellation().clone();
        Self {
            inner: read_all_with(cursor, token),
            context,
            guard: Some(guard),
        }
    }
}

impl<Resp> Responses<Resp> {
    /// The context every item is paired with.
    #[must_use]
    pub fn context(&self) -> &SharedCallContext {
        &self.context
    }

    /// Dispose the call now. Later polls yield nothing.
    pub(crate) fn release(self: Pin<&mut Self>) {
        // Dropping the guard disposes the call, which cancels any read.
        self.project().guard.take();
    }
}

impl<Resp> Stream for Responses<Resp> {
    type Item = Result<Response<Resp>, CallError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if this.guard.is_none() {
            return Poll::Ready(None);
        }
        match ready!(this.inner.poll_next(cx)) {
            Some(Ok(item)) => Poll::Ready(Some(Ok(MessageWithContext::new(
                item,
                this.context.clone(),
            )))),
            Some(Err(err)) => {
                this.guard.take();
                Poll::Ready(Some(Err(err)))
            }
            None => {
                this.guard.take();
                Poll::Ready(None)
            }
        }
    }
}

/// Read-only consumption of a call's response stream.
pub trait OnResponse {
    /// The response type.
    type Response;

    /// Stream the responses, each paired with the call context.
    fn on_response(self) -> Responses<Self::Response>;
}

impl<Resp: Send + 'static> OnResponse for ServerStreamingCall<Resp> {
    type Response = Resp;

    fn on_response(self) -> Responses<Resp> {
        let context = self.call_context();
        let (cursor, guard) = self.into_parts();
        Responses::new(cursor, guard, context)
    }
}

impl<Req, Resp: Send + 'static> OnResponse for DuplexStreamingCall<Req, Resp> {
    type Response = Resp;

    /// Stream the responses without sending requests.
    ///
    /// The request sink is dropped, which closes the request stream.
    fn on_response(self) -> Responses<Resp> {
        let context = self.call_context();
        let (_requests, cursor, guard) = self.into_parts();
        Responses::new(cursor, guard, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callkit_core::{CallContext, Code, Metadata, Status};
    use callkit_transport::memory::{self, ChannelConfig};
    use callkit_transport::{HasCallHandle, MessageSink};
    use futures::{StreamExt, TryStreamExt};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_server_streaming_responses_carry_context() {
        let (call, mut server) = memory::server_streaming::<(), u32>((), &ChannelConfig::default());
        let handle = Arc::clone(call.call_handle());

        tokio::spawn(async move {
            for n in 0..3 {
                server.responses.write(n).await.unwrap();
            }
            server.context.add_response_trailer("count", "3");
            server.completion.finish();
        });

        let responses: Vec<_> = call.on_response().try_collect().await.unwrap();
        let values: Vec<u32> = responses.iter().map(|r| *r.message()).collect();
        assert_eq!(values, vec![0, 1, 2]);

        let context = responses[0].context();
        assert!(context.status().unwrap().is_ok());
        assert_eq!(context.trailers().unwrap().get_str("count"), Some("3"));
        assert!(handle.is_disposed());
    }

    #[tokio::test]
    async fn test_failed_call_disposes_and_reports_status() {
        let (call, server) = memory::duplex::<u32, u32>(&ChannelConfig::default());
        let handle = Arc::clone(call.call_handle());

        server.context.set_status(Status::new(Code::PermissionDenied, "no"));
        drop(server);

        let mut responses = call.on_response();
        let err = responses.next().await.unwrap().unwrap_err();
        assert!(matches!(err, CallError::Status(ref s) if s.code == Code::PermissionDenied));
        assert!(responses.next().await.is_none());
        assert!(handle.is_disposed());
    }

    #[tokio::test]
    async fn test_dropping_responses_cancels_the_call() {
        let (call, server) = memory::server_streaming::<(), u32>((), &ChannelConfig::default());
        let handle = Arc::clone(call.call_handle());
        let responses = call.on_response();

        assert!(!handle.cancellation().is_cancelled());
        drop(responses);
        assert!(handle.is_disposed());
        assert!(server.context.is_cancelled());
        assert_eq!(server.context.response_trailers(), Metadata::new());
    }
}
