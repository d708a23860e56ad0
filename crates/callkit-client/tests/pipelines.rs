//! Request pipelines driven against the in-memory transport.

use callkit_client::prelude::*;
use callkit_core::{CallContext, CallError, CancellationToken, Code, Status};
use callkit_transport::memory::{self, ChannelConfig, ServerEnd};
use callkit_transport::{Cursor, HasCallHandle, MessageSink};
use futures::{StreamExt, TryStreamExt, stream};
use pretty_assertions::assert_eq;
use std::sync::Arc;

/// Echo every request back, upper-cased, then finish the call.
async fn echo_server(mut server: ServerEnd<String, String>) {
    let token = server.context.cancellation().clone();
    while let Ok(true) = server.requests.advance(&token).await {
        let Some(request) = server.requests.take_current() else {
            break;
        };
        if server.responses.write(request.to_uppercase()).await.is_err() {
            break;
        }
    }
    server.completion.finish();
}

fn requests(items: &[&str]) -> impl futures::Stream<Item = Result<String, CallError>> + Send + 'static {
    let items: Vec<_> = items.iter().map(|s| Ok((*s).to_string())).collect();
    stream::iter(items)
}

#[tokio::test]
async fn duplex_echo_pairs_every_response_with_the_call_context() {
    let (call, server) = memory::duplex(&ChannelConfig::default());
    tokio::spawn(echo_server(server));

    let responses: Vec<_> = call
        .request_from(requests(&["a", "b", "c"]))
        .try_collect()
        .await
        .unwrap();

    let messages: Vec<_> = responses.iter().map(|r| r.message().clone()).collect();
    assert_eq!(messages, vec!["A", "B", "C"]);
    for response in &responses {
        assert!(response.context().status().unwrap().is_ok());
    }
}

#[tokio::test]
async fn output_length_follows_the_response_stream() {
    let (call, mut server) = memory::duplex::<u32, u32>(&ChannelConfig::default());
    tokio::spawn(async move {
        let token = server.context.cancellation().clone();
        for n in 0..5 {
            server.responses.write(n).await.unwrap();
        }
        while let Ok(true) = server.requests.advance(&token).await {}
        server.completion.finish();
    });

    let writes = stream::iter((0..2).map(Ok));
    let responses: Vec<_> = call.request_from(writes).try_collect().await.unwrap();
    assert_eq!(responses.len(), 5);
}

#[tokio::test]
async fn request_stream_failure_terminates_the_output() {
    let (call, server) = memory::duplex(&ChannelConfig::default());
    let server_context = Arc::clone(&server.context);
    tokio::spawn(echo_server(server));

    let failing = stream::iter(vec![
        Ok("a".to_string()),
        Err(CallError::invalid_argument("request 2 is malformed")),
        Ok("c".to_string()),
    ]);
    let results: Vec<_> = call.request_from(failing).collect().await;

    let last = results.last().unwrap();
    assert!(matches!(last, Err(CallError::InvalidArgument { .. })));
    assert!(results[..results.len() - 1].iter().all(Result::is_ok));
    assert!(server_context.is_cancelled());
}

#[tokio::test]
async fn response_failure_terminates_the_output() {
    let (call, mut server) = memory::duplex::<u32, u32>(&ChannelConfig::default());
    tokio::spawn(async move {
        server.responses.write(1).await.unwrap();
        server.context.set_status(Status::new(Code::ResourceExhausted, "quota"));
        server.completion.finish();
    });

    let results: Vec<_> = call.request_from(stream::pending()).collect().await;
    assert_eq!(results.len(), 2);
    assert_eq!(*results[0].as_ref().unwrap().message(), 1);
    assert!(matches!(&results[1], Err(CallError::Status(s)) if s.code == Code::ResourceExhausted));
}

#[tokio::test]
async fn dropping_the_output_disposes_the_call_once() {
    let (call, mut server) = memory::duplex::<u32, u32>(&ChannelConfig::default());
    let handle = Arc::clone(call.call_handle());
    let server_token: CancellationToken = server.context.cancellation().clone();

    tokio::spawn(async move {
        let mut n = 0;
        while server.responses.write(n).await.is_ok() {
            n += 1;
        }
    });

    let mut responses = call.request_from(stream::pending());
    assert_eq!(*responses.next().await.unwrap().unwrap().message(), 0);
    assert!(responses.is_writing());
    drop(responses);

    assert!(handle.is_disposed());
    assert!(server_token.is_cancelled());
    assert!(!handle.dispose());
    assert!(!server_token.cancel());
}

#[tokio::test]
async fn client_streaming_returns_the_single_response() {
    let (call, mut server) = memory::client_streaming::<u32, u32>(&ChannelConfig::default());
    tokio::spawn(async move {
        let token = server.context.cancellation().clone();
        let mut sum = 0;
        while let Ok(true) = server.requests.advance(&token).await {
            sum += server.requests.take_current().unwrap_or_default();
        }
        server.responses.write(sum).await.unwrap();
        server.completion.finish();
    });

    let total = send_all(call, stream::iter((1..=4).map(Ok))).await.unwrap();
    assert_eq!(total, 10);
}

#[tokio::test]
async fn client_streaming_output_is_a_single_item() {
    let (call, mut server) = memory::client_streaming::<u32, u32>(&ChannelConfig::default());
    tokio::spawn(async move {
        let token = server.context.cancellation().clone();
        while let Ok(true) = server.requests.advance(&token).await {}
        server.responses.write(7).await.unwrap();
        server.completion.finish();
    });

    let outputs: Vec<_> = call
        .request_from(stream::iter([Ok(1)]))
        .try_collect()
        .await
        .unwrap();
    assert_eq!(outputs, vec![7]);
}

#[tokio::test]
async fn client_streaming_write_failure_wins() {
    let (call, server) = memory::client_streaming::<u32, u32>(&ChannelConfig::default());
    let server_context = Arc::clone(&server.context);
    let _server = server;

    let err = send_all(
        call,
        stream::iter([Ok(1), Err(CallError::unimplemented("streaming upload"))]),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, CallError::Unimplemented { .. }));
    assert!(server_context.is_cancelled());
}

#[tokio::test]
async fn client_streaming_failed_response_surfaces() {
    let (call, server) = memory::client_streaming::<u32, u32>(&ChannelConfig::default());
    let context = call.call_context();

    // Keep the request cursor open so only the response can fail.
    let ServerEnd {
        requests: _requests,
        responses,
        context: server_context,
        completion,
    } = server;
    server_context.set_status(Status::new(Code::FailedPrecondition, "not ready"));
    completion.finish();
    drop(responses);

    let err = send_all(call, stream::iter([Ok(1)])).await.unwrap_err();
    assert!(matches!(err, CallError::Status(ref s) if s.code == Code::FailedPrecondition));
    assert_eq!(context.status().unwrap().message, "not ready");
}

#[test]
fn duplex_output_waits_for_responses_after_writes_finish() {
    let (call, _server) = memory::duplex::<u32, u32>(&ChannelConfig::default());
    let mut responses = tokio_test::task::spawn(call.request_from(stream::iter([Ok(1), Ok(2)])));

    tokio_test::assert_pending!(responses.poll_next());
    assert!(!responses.is_writing());
    assert!(matches!(
        responses.context().status(),
        Err(CallError::NotCompleted { .. })
    ));
}
