//! Client pipelines talking to server pipelines over the in-memory transport.

use callkit::prelude::*;
use callkit::transport::memory::{self, ChannelConfig, ServerEnd};
use callkit::{CallHandle, RequestProcessor, send_all};
use callkit_testing::async_helpers::with_default_timeout;
use callkit_testing::{assert_cancelled, assert_not_completed, assert_status, init_tracing};
use futures::{StreamExt, TryFutureExt, TryStreamExt, future, stream};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

type Handler = tokio::task::JoinHandle<Result<(), CallError>>;

/// Serve a duplex call: answer each request with `transform`, then finish.
fn serve<F>(server: ServerEnd<String, String>, transform: F) -> Handler
where
    F: FnMut(String, &ServerCallContext, usize) -> Result<String, CallError> + Send + 'static,
{
    tokio::spawn(async move {
        let ServerEnd {
            requests,
            mut responses,
            context,
            completion,
        } = server;
        let result = process_requests_indexed(requests, &mut responses, context, transform).await;
        completion.finish();
        result
    })
}

fn strings(items: &[&str]) -> impl futures::Stream<Item = Result<String, CallError>> + Send + 'static {
    let items: Vec<_> = items.iter().map(|s| Ok((*s).to_string())).collect();
    stream::iter(items)
}

#[tokio::test]
async fn duplex_round_trip_reports_status_and_trailers() {
    init_tracing();
    let config = ChannelConfig::new().method("/greet.Greeter/Chat");
    let (call, server) = memory::duplex(&config);
    let handler = serve(server, |name, context, index| {
        if index == 0 {
            context.add_response_trailer("greeted-by", context.method());
        }
        Ok(format!("hello {name}"))
    });

    let responses: Vec<_> = call
        .request_from(strings(&["ana", "bo"]))
        .try_collect()
        .await
        .unwrap();
    handler.await.unwrap().unwrap();

    let messages: Vec<_> = responses.iter().map(|r| r.message().as_str()).collect();
    assert_eq!(messages, vec!["hello ana", "hello bo"]);

    let context = responses[0].context();
    assert!(Arc::ptr_eq(context, responses[1].context()));
    assert!(context.status().unwrap().is_ok());
    assert_eq!(
        context.trailers().unwrap().get_str("greeted-by"),
        Some("/greet.Greeter/Chat")
    );
    assert!(context.response_headers().await.unwrap().is_empty());
}

#[tokio::test]
async fn server_failure_ends_the_client_stream_with_its_status() {
    init_tracing();
    let (call, server) = memory::duplex(&ChannelConfig::default());
    let handler = serve(server, |item, _, index| {
        if index == 2 {
            Err(CallError::out_of_range(format!("no room for {item}")))
        } else {
            Ok(item)
        }
    });

    let results: Vec<_> = call
        .request_from(strings(&["a", "b", "c", "d"]))
        .collect()
        .await;
    handler.await.unwrap().unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().message(), "a");
    assert_eq!(results[1].as_ref().unwrap().message(), "b");
    match results[2].as_ref().err() {
        Some(CallError::Status(status)) => assert_status(status, Code::OutOfRange, "no room for c"),
        other => panic!("expected a status failure, got {other:?}"),
    }
}

#[tokio::test]
async fn status_is_unavailable_until_the_call_finishes() {
    init_tracing();
    let (call, server) = memory::duplex::<String, String>(&ChannelConfig::default());
    let responses = call.request_from(strings(&["x"]));
    let context = Arc::clone(responses.context());

    assert_not_completed(&context.status());
    assert_not_completed(&context.trailers());

    let handler = serve(server, |item, _, _| Ok(item));
    let collected: Vec<_> = responses.try_collect().await.unwrap();
    handler.await.unwrap().unwrap();

    assert_eq!(collected.len(), 1);
    assert!(context.status().unwrap().is_ok());
}

#[tokio::test]
async fn dropping_the_client_stream_cancels_the_server_once() {
    init_tracing();
    let (call, server) = memory::duplex::<u32, u32>(&ChannelConfig::default());
    let handle: Arc<CallHandle> = Arc::clone(call.call_handle());
    let server_context = Arc::clone(&server.context);

    let handler = tokio::spawn(async move {
        let ServerEnd {
            requests,
            mut responses,
            context,
            completion,
        } = server;
        let result = process_requests(requests, &mut responses, context, |n: u32| Ok(n * 3)).await;
        completion.finish();
        result
    });

    let requests = stream::iter([Ok(1), Ok(2)]).chain(stream::pending());
    let mut responses = call.request_from(requests);
    assert_eq!(*responses.next().await.unwrap().unwrap().message(), 3);
    drop(responses);

    let err = handler.await.unwrap().unwrap_err();
    assert_cancelled(&err);
    assert!(handle.is_disposed());
    assert!(server_context.is_cancelled());
    assert!(server_context.status().is_ok());
    assert!(!handle.dispose());
    assert!(!server_context.cancellation().cancel());
}

#[tokio::test]
async fn headers_resolve_while_the_call_is_still_open() {
    init_tracing();
    let (call, server) = memory::duplex::<u32, u32>(&ChannelConfig::default());
    let server_context = Arc::clone(&server.context);

    let handler = tokio::spawn(async move {
        let ServerEnd {
            requests,
            mut responses,
            context,
            completion,
        } = server;
        let result = process_requests(requests, &mut responses, context, |n: u32| Ok(n)).await;
        completion.finish();
        result
    });

    let requests = stream::iter([Ok(1)]).chain(stream::pending());
    let mut responses = call.request_from(requests);
    let first = responses.next().await.unwrap().unwrap();
    assert_eq!(*first.message(), 1);

    let headers = with_default_timeout(first.context().response_headers()).await;
    assert!(headers.unwrap().is_empty());
    assert_not_completed(&first.context().status());
    assert!(!server_context.is_cancelled());

    drop(responses);
    assert_cancelled(&handler.await.unwrap().unwrap_err());
}

#[tokio::test]
async fn client_streaming_sum_with_custom_server_pipeline() {
    init_tracing();
    let (call, server) = memory::client_streaming::<u64, u64>(&ChannelConfig::default());

    let handler = tokio::spawn(async move {
        let ServerEnd {
            requests,
            mut responses,
            context,
            completion,
        } = server;
        let result = RequestProcessor::default()
            .run(requests, &mut responses, Arc::clone(&context), move |requests| {
                let total = requests
                    .map_ok(|request| request.into_message())
                    .try_fold(0u64, |sum, n| future::ready(Ok(sum + n)))
                    .map_ok(move |sum| MessageWithContext::new(sum, context));
                stream::once(total)
            })
            .await;
        completion.finish();
        result
    });

    let total = send_all(call, stream::iter((1..=10).map(Ok))).await.unwrap();
    handler.await.unwrap().unwrap();
    assert_eq!(total, 55);
}

#[tokio::test]
async fn client_streaming_surfaces_a_server_rejection() {
    init_tracing();
    let (call, server) = memory::client_streaming::<i64, i64>(&ChannelConfig::default());

    let handler = tokio::spawn(async move {
        let ServerEnd {
            requests,
            mut responses,
            context,
            completion,
        } = server;
        let result = process_requests(requests, &mut responses, context, |n: i64| {
            if n < 0 {
                Err(CallError::invalid_argument("negative amounts are not accepted"))
            } else {
                Ok(n)
            }
        })
        .await;
        completion.finish();
        result
    });

    let outcome: Vec<_> = call
        .request_from(stream::iter([Ok(-5)]))
        .collect()
        .await;
    handler.await.unwrap().unwrap();

    assert_eq!(outcome.len(), 1);
    match &outcome[0] {
        Err(CallError::Status(status)) => {
            assert_status(status, Code::InvalidArgument, "negative amounts are not accepted");
        }
        other => panic!("expected a status failure, got {other:?}"),
    }
}

#[tokio::test]
async fn server_streaming_responses_carry_headers_and_trailers() {
    init_tracing();
    let (call, mut server) = memory::server_streaming::<u32, u32>(5, &ChannelConfig::default());

    let handler = tokio::spawn(async move {
        let token = server.context.cancellation().clone();
        server.requests.advance(&token).await?;
        let count = server.requests.take_current().unwrap_or_default();
        server
            .context
            .write_response_headers(Metadata::new().with("x-count", count.to_string()))?;
        for n in 0..count {
            server.responses.write(n).await?;
        }
        server.context.add_response_trailer("x-done", "yes");
        server.completion.finish();
        Ok::<(), CallError>(())
    });

    let responses = call.on_response();
    let context = Arc::clone(responses.context());
    let numbers: Vec<u32> = responses
        .map_ok(|response| *response.message())
        .try_collect()
        .await
        .unwrap();
    handler.await.unwrap().unwrap();

    assert_eq!(numbers, vec![0, 1, 2, 3, 4]);
    assert_eq!(context.response_headers().await.unwrap().get_str("x-count"), Some("5"));
    assert_eq!(context.trailers().unwrap().get_str("x-done"), Some("yes"));
}

#[tokio::test]
async fn async_server_transform_sees_cancellation_of_a_slow_call() {
    init_tracing();
    let (call, server) = memory::duplex::<u64, u64>(&ChannelConfig::default());
    let server_context = Arc::clone(&server.context);

    let handler = tokio::spawn(async move {
        let ServerEnd {
            requests,
            mut responses,
            context,
            completion,
        } = server;
        let result = process_requests_async(requests, &mut responses, context, |n: u64| async move {
            tokio::time::sleep(Duration::from_secs(n)).await;
            Ok::<_, CallError>(n)
        })
        .await;
        completion.finish();
        result
    });

    let mut responses = call.request_from(stream::iter([Ok(0), Ok(3600)]));
    assert_eq!(*responses.next().await.unwrap().unwrap().message(), 0);
    drop(responses);

    let err = with_default_timeout(handler).await.unwrap().unwrap_err();
    assert_cancelled(&err);
    assert!(server_context.is_cancelled());
}
