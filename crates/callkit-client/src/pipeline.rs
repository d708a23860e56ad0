//! Request pipelines: feeding a request stream into a call.
//!
//! For a duplex call the write loop and the read loop run concurrently
//! within one output stream. Only the read loop produces items. The output:
//!
//! - yields every response paired with the call context;
//! - fails with the first failure of either loop;
//! - completes when the response stream completes.
//!
//! For a client-streaming call the output is the single response.

use crate::context::CallContextExt;
use crate::response::{Response, Responses};
use crate::write::write_all;
use callkit_core::{BoxFuture, CallError, SharedCallContext};
use callkit_transport::{ClientStreamingCall, DuplexStreamingCall};
use futures::future::{self, FutureExt};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::trace;

pin_project! {
    /// Output of a duplex request pipeline.
    ///
    /// Dropping the stream disposes the call, which stops both loops.
    #[must_use = "streams do nothing unless polled"]
    pub struct DuplexResponses<Resp> {
        write: Option<BoxFuture<'static, Result<(), CallError>>>,
        #[pin]
        read: Responses<Resp>,
        done: bool,
    }
}

impl<Resp> DuplexResponses<Resp> {
    /// The context every response is paired with.
    #[must_use]
    pub fn context(&self) -> &SharedCallContext {
        self.read.context()
    }

    /// Whether the write loop is still running.
    #[must_use]
    pub fn is_writing(&self) -> bool {
        self.write.is_some()
    }
}

impl<Resp> Stream for DuplexResponses<Resp> {
    type Item = Result<Response<Resp>, CallError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        if *this.done {
            return Poll::Ready(None);
        }

        // Write failures surface even though the write loop yields no items.
        if let Some(write) = this.write.as_mut() {
            match write.poll_unpin(cx) {
                Poll::Ready(Ok(())) => {
                    trace!("Write loop completed");
                    *this.write = None;
                }
                Poll::Ready(Err(err)) => {
                    *this.write = None;
                    *this.done = true;
                    this.read.as_mut().release();
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Pending => {}
            }
        }

        match this.read.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(response))) => Poll::Ready(Some(Ok(response))),
            Poll::Ready(Some(Err(err))) => {
                *this.write = None;
                *this.done = true;
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                if this.write.take().is_some() {
                    trace!("Response stream ended with the write loop still running");
                }
                *this.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Feed a request stream into a call.
pub trait RequestFrom<Req>: Sized {
    /// The pipeline's output.
    type Output;

    /// Start the pipeline. Requests are written one at a time in order, and
    /// the request stream is completed once they are exhausted or fail.
    fn request_from<S>(self, requests: S) -> Self::Output
    where
        S: Stream<Item = Result<Req, CallError>> + Send + 'static;
}

impl<Req, Resp> RequestFrom<Req> for DuplexStreamingCall<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    type Output = DuplexResponses<Resp>;

    fn request_from<S>(self, requests: S) -> DuplexResponses<Resp>
    where
        S: Stream<Item = Result<Req, CallError>> + Send + 'static,
    {
        let context = self.call_context();
        let (sink, cursor, guard) = self.into_parts();
        DuplexResponses {
            write: Some(write_all(sink, requests).boxed()),
            read: Responses::new(cursor, guard, context),
            done: false,
        }
    }
}

impl<Req, Resp> RequestFrom<Req> for ClientStreamingCall<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    type Output = BoxStream<'static, Result<Resp, CallError>>;

    /// A one-item stream: the response, or the first failure of the write
    /// loop and the response.
    fn request_from<S>(self, requests: S) -> Self::Output
    where
        S: Stream<Item = Result<Req, CallError>> + Send + 'static,
    {
        stream::once(send_all(self, requests)).boxed()
    }
}

/// Write `requests` to a client-streaming call and wait for its response.
///
/// Fails with the first failure of the write loop or the response. The
/// call is disposed before this returns.
pub async fn send_all<Req, Resp, S>(
    call: ClientStreamingCall<Req, Resp>,
    requests: S,
) -> Result<Resp, CallError>
where
    Req: Send + 'static,
    S: Stream<Item = Result<Req, CallError>> + Send,
{
    let (sink, response, guard) = call.into_parts();
    let result = future::try_join(write_all(sink, requests), response)
        .await
        .map(|((), response)| response);
    drop(guard);
    result
}
