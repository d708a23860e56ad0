//! Composable steps of the server processing pipeline.
//!
//! The entry points in [`crate::process`] chain these steps:
//!
//! ```text
//! on_request -> process_with* -> remove_context -> write_responses_to
//! ```
//!
//! They are public so handlers can insert their own stream combinators
//! between the steps.

use crate::options::ProcessOptions;
use callkit_core::{CallError, Code, MessageWithContext, Status};
use callkit_transport::{Cursor, MessageSink, ServerCallContext, read_all};
use futures::future;
use futures::stream::{BoxStream, Stream, StreamExt, TryStreamExt};
use std::future::Future;
use std::sync::Arc;
use tracing::{Level, debug, trace};

/// An item paired with the server context of its call.
pub type Request<T> = MessageWithContext<T, Arc<ServerCallContext>>;

/// The request stream of a call, each request paired with its context.
pub type RequestStream<Req> = BoxStream<'static, Result<Request<Req>, CallError>>;

/// Pair every item of `items` with `context`.
pub fn add_context<S, T, C>(
    items: S,
    context: C,
) -> impl Stream<Item = Result<MessageWithContext<T, C>, CallError>>
where
    S: Stream<Item = Result<T, CallError>>,
    C: Clone,
{
    items.map_ok(move |item| MessageWithContext::new(item, context.clone()))
}

/// Strip the context from every item of `items`.
pub fn remove_context<S, T, C>(items: S) -> impl Stream<Item = Result<T, CallError>>
where
    S: Stream<Item = Result<MessageWithContext<T, C>, CallError>>,
{
    items.map_ok(MessageWithContext::into_message)
}

/// Read the requests of a call, each paired with the call context.
///
/// The stream ends without an item once the call is cancelled.
pub fn on_request<C>(requests: C, context: Arc<ServerCallContext>) -> RequestStream<C::Item>
where
    C: Cursor + 'static,
{
    let cancelled = context.cancellation().clone().cancelled_owned();
    add_context(read_all(requests).take_until(cancelled), context).boxed()
}

/// Transform each request with an async function of the request, its
/// context and its zero-based position.
///
/// Requests are processed one at a time in arrival order: the transform of
/// a request starts only after the previous response was produced.
pub fn process_with_indexed_async<S, Req, Resp, F, Fut>(
    requests: S,
    mut transform: F,
) -> impl Stream<Item = Result<Request<Resp>, CallError>>
where
    S: Stream<Item = Result<Request<Req>, CallError>>,
    F: FnMut(Req, Arc<ServerCallContext>, usize) -> Fut,
    Fut: Future<Output = Result<Resp, CallError>>,
{
    requests.enumerate().then(move |(index, request)| {
        let started = request.map(|request| {
            let (item, context) = request.into_parts();
            trace!(index, "Processing request");
            (transform(item, Arc::clone(&context), index), context)
        });
        async move {
            let (response, context) = started?;
            let response = response.await?;
            Ok::<_, CallError>(MessageWithContext::new(response, context))
        }
    })
}

/// Transform each request with an async function of the request and its
/// context.
pub fn process_with_context_async<S, Req, Resp, F, Fut>(
    requests: S,
    mut transform: F,
) -> impl Stream<Item = Result<Request<Resp>, CallError>>
where
    S: Stream<Item = Result<Request<Req>, CallError>>,
    F: FnMut(Req, Arc<ServerCallContext>) -> Fut,
    Fut: Future<Output = Result<Resp, CallError>>,
{
    process_with_indexed_async(requests, move |item, context, _| transform(item, context))
}

/// Transform each request with an async function.
pub fn process_with_async<S, Req, Resp, F, Fut>(
    requests: S,
    mut transform: F,
) -> impl Stream<Item = Result<Request<Resp>, CallError>>
where
    S: Stream<Item = Result<Request<Req>, CallError>>,
    F: FnMut(Req) -> Fut,
    Fut: Future<Output = Result<Resp, CallError>>,
{
    process_with_indexed_async(requests, move |item, _, _| transform(item))
}

/// Transform each request with a function of the request, its context and
/// its zero-based position.
pub fn process_with_indexed<S, Req, Resp, F>(
    requests: S,
    mut transform: F,
) -> impl Stream<Item = Result<Request<Resp>, CallError>>
where
    S: Stream<Item = Result<Request<Req>, CallError>>,
    F: FnMut(Req, &ServerCallContext, usize) -> Result<Resp, CallError>,
{
    process_with_indexed_async(requests, move |item, context, index| {
        future::ready(transform(item, &*context, index))
    })
}

/// Transform each request with a function of the request and its context.
pub fn process_with_context<S, Req, Resp, F>(
    requests: S,
    mut transform: F,
) -> impl Stream<Item = Result<Request<Resp>, CallError>>
where
    S: Stream<Item = Result<Request<Req>, CallError>>,
    F: FnMut(Req, &ServerCallContext) -> Result<Resp, CallError>,
{
    process_with_indexed(requests, move |item, context, _| transform(item, context))
}

/// Transform each request with a function.
pub fn process_with<S, Req, Resp, F>(
    requests: S,
    mut transform: F,
) -> impl Stream<Item = Result<Request<Resp>, CallError>>
where
    S: Stream<Item = Result<Request<Req>, CallError>>,
    F: FnMut(Req) -> Result<Resp, CallError>,
{
    process_with_indexed(requests, move |item, _, _| transform(item))
}

/// Write every response to `sink`, awaiting each write.
///
/// The first failure, from the response stream or from a write, stops the
/// loop and becomes the call's status unless a status was already set.
/// The failure is not returned: the call completes with that status.
///
/// # Errors
///
/// Returns [`CallError::Cancelled`] if the call was cancelled when the
/// failure occurred.
pub async fn write_responses_to<S, K>(
    responses: S,
    sink: &mut K,
    context: &ServerCallContext,
    options: &ProcessOptions,
) -> Result<(), CallError>
where
    S: Stream<Item = Result<K::Item, CallError>>,
    K: MessageSink + ?Sized,
{
    futures::pin_mut!(responses);
    let mut written: u64 = 0;

    while let Some(response) = responses.next().await {
        let result = match response {
            Ok(response) => sink.write(response).await,
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            if context.is_cancelled() {
                debug!(method = %context.method(), written, "Processing stopped by cancellation");
                return Err(CallError::cancelled("processing requests"));
            }
            record_failure(context, &err, options, written);
            return Ok(());
        }
        written += 1;
    }

    trace!(method = %context.method(), written, "All responses written");
    Ok(())
}

macro_rules! failure_event {
    ($macro:ident, $context:expr, $code:expr, $err:expr, $written:expr, $status_set:expr) => {
        tracing::$macro!(
            method = %$context.method(),
            code = %$code,
            error = %$err,
            written = $written,
            status_set = $status_set,
            "Request processing failed"
        )
    };
}

fn record_failure(context: &ServerCallContext, err: &CallError, options: &ProcessOptions, written: u64) {
    let status = failure_status(err, options);
    let code = status.code;
    let status_set = context.set_status_if_ok(status);

    let level = options.log_level;
    if level == Level::ERROR {
        failure_event!(error, context, code, err, written, status_set);
    } else if level == Level::WARN {
        failure_event!(warn, context, code, err, written, status_set);
    } else if level == Level::INFO {
        failure_event!(info, context, code, err, written, status_set);
    } else if level == Level::DEBUG {
        failure_event!(debug, context, code, err, written, status_set);
    } else {
        failure_event!(trace, context, code, err, written, status_set);
    }
}

/// The status reported for a processing failure.
#[must_use]
pub fn failure_status(err: &CallError, options: &ProcessOptions) -> Status {
    if options.include_error_message {
        err.to_status()
    } else {
        let code: Code = err.kind().code();
        Status::new(code, code.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callkit_testing::{MockCursor, fixtures};
    use futures::stream;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_add_and_remove_context() {
        let context = fixtures::server_context("/m");
        let paired: Vec<_> = add_context(stream::iter([Ok(1), Ok(2)]), Arc::clone(&context))
            .try_collect()
            .await
            .unwrap();
        assert!(paired.iter().all(|r| Arc::ptr_eq(r.context(), &context)));

        let bare: Vec<i32> = remove_context(stream::iter(paired.into_iter().map(Ok)))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(bare, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_index_follows_arrival_order() {
        let context = fixtures::server_context("/m");
        let requests = on_request(MockCursor::new(["a", "b", "c"]), context);
        let responses: Vec<_> = process_with_indexed(requests, |item, _, index| {
            Ok(format!("{index}:{item}"))
        })
        .map_ok(MessageWithContext::into_message)
        .try_collect()
        .await
        .unwrap();

        assert_eq!(responses, vec!["0:a", "1:b", "2:c"]);
    }

    #[tokio::test]
    async fn test_on_request_stops_on_cancellation() {
        let context = fixtures::server_context("/m");
        context.cancellation().cancel();
        let requests: Vec<_> = on_request(MockCursor::new([1, 2]), context).collect().await;
        assert!(requests.is_empty());
    }

    #[test]
    fn test_failure_status_without_message() {
        let options = ProcessOptions::new().include_error_message(false);
        let status = failure_status(&CallError::out_of_range("index 7 of 3"), &options);
        assert_eq!(status.code, Code::OutOfRange);
        assert!(!status.message.contains("index 7"));
    }
}
