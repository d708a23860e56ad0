//! Entry points running a whole call.
//!
//! Each entry point reads the requests of a call, transforms them one at a
//! time, and writes the responses. A failure never escapes: it becomes the
//! call's status (first failure wins) and the entry point returns `Ok`.
//! Only cancellation of the call is reported as an error.

use crate::options::ProcessOptions;
use crate::pipeline::{
    Request, RequestStream, on_request, process_with, process_with_async, process_with_context,
    process_with_context_async, process_with_indexed, process_with_indexed_async, remove_context,
    write_responses_to,
};
use callkit_core::CallError;
use callkit_transport::{Cursor, MessageSink, ServerCallContext, cancellable};
use futures::Stream;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

const OPERATION: &str = "processing requests";

/// Runs processing pipelines with a fixed set of [`ProcessOptions`].
///
/// The free functions of this module use the default options.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestProcessor {
    options: ProcessOptions,
}

impl RequestProcessor {
    /// Create a processor.
    #[must_use]
    pub const fn new(options: ProcessOptions) -> Self {
        Self { options }
    }

    /// The processor's options.
    #[must_use]
    pub const fn options(&self) -> &ProcessOptions {
        &self.options
    }

    /// Run a custom pipeline between reading requests and writing responses.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::Cancelled`] if the call is cancelled before or
    /// during processing.
    pub async fn run<C, K, F, S>(
        &self,
        requests: C,
        responses: &mut K,
        context: Arc<ServerCallContext>,
        pipeline: F,
    ) -> Result<(), CallError>
    where
        C: Cursor + 'static,
        K: MessageSink + ?Sized,
        F: FnOnce(RequestStream<C::Item>) -> S,
        S: Stream<Item = Result<Request<K::Item>, CallError>>,
    {
        let token = context.cancellation().clone();
        if token.is_cancelled() {
            debug!(method = %context.method(), "Call cancelled before processing");
            return Err(CallError::cancelled(OPERATION));
        }

        let processed = remove_context(pipeline(on_request(requests, Arc::clone(&context))));
        cancellable(
            &token,
            OPERATION,
            write_responses_to(processed, responses, &context, &self.options),
        )
        .await??;

        if token.is_cancelled() {
            debug!(method = %context.method(), "Call cancelled during processing");
            return Err(CallError::cancelled(OPERATION));
        }
        Ok(())
    }

    /// Process every request with `transform`.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::Cancelled`] if the call is cancelled.
    pub async fn process_requests<C, K, F>(
        &self,
        requests: C,
        responses: &mut K,
        context: Arc<ServerCallContext>,
        transform: F,
    ) -> Result<(), CallError>
    where
        C: Cursor + 'static,
        K: MessageSink + ?Sized,
        F: FnMut(C::Item) -> Result<K::Item, CallError>,
    {
        self.run(requests, responses, context, |requests| {
            process_with(requests, transform)
        })
        .await
    }

    /// Process every request with `transform`, which also receives the
    /// call context.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::Cancelled`] if the call is cancelled.
    pub async fn process_requests_with_context<C, K, F>(
        &self,
        requests: C,
        responses: &mut K,
        context: Arc<ServerCallContext>,
        transform: F,
    ) -> Result<(), CallError>
    where
        C: Cursor + 'static,
        K: MessageSink + ?Sized,
        F: FnMut(C::Item, &ServerCallContext) -> Result<K::Item, CallError>,
    {
        self.run(requests, responses, context, |requests| {
            process_with_context(requests, transform)
        })
        .await
    }

    /// Process every request with `transform`, which also receives the
    /// call context and the request's zero-based position.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::Cancelled`] if the call is cancelled.
    pub async fn process_requests_indexed<C, K, F>(
        &self,
        requests: C,
        responses: &mut K,
        context: Arc<ServerCallContext>,
        transform: F,
    ) -> Result<(), CallError>
    where
        C: Cursor + 'static,
        K: MessageSink + ?Sized,
        F: FnMut(C::Item, &ServerCallContext, usize) -> Result<K::Item, CallError>,
    {
        self.run(requests, responses, context, |requests| {
            process_with_indexed(requests, transform)
        })
        .await
    }

    /// Process every request with the async `transform`.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::Cancelled`] if the call is cancelled.
    pub async fn process_requests_async<C, K, F, Fut>(
        &self,
        requests: C,
        responses: &mut K,
        context: Arc<ServerCallContext>,
        transform: F,
    ) -> Result<(), CallError>
    where
        C: Cursor + 'static,
        K: MessageSink + ?Sized,
        F: FnMut(C::Item) -> Fut,
        Fut: Future<Output = Result<K::Item, CallError>>,
    {
        self.run(requests, responses, context, |requests| {
            process_with_async(requests, transform)
        })
        .await
    }

    /// Process every request with the async `transform`, which also
    /// receives the call context.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::Cancelled`] if the call is cancelled.
    pub async fn process_requests_with_context_async<C, K, F, Fut>(
        &self,
        requests: C,
        responses: &mut K,
        context: Arc<ServerCallContext>,
        transform: F,
    ) -> Result<(), CallError>
    where
        C: Cursor + 'static,
        K: MessageSink + ?Sized,
        F: FnMut(C::Item, Arc<ServerCallContext>) -> Fut,
        Fut: Future<Output = Result<K::Item, CallError>>,
    {
        self.run(requests, responses, context, |requests| {
            process_with_context_async(requests, transform)
        })
        .await
    }

    /// Process every request with the async `transform`, which also
    /// receives the call context and the request's zero-based position.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::Cancelled`] if the call is cancelled.
    pub async fn process_requests_indexed_async<C, K, F, Fut>(
        &self,
        requests: C,
        responses: &mut K,
        context: Arc<ServerCallContext>,
        transform: F,
    ) -> Result<(), CallError>
    where
        C: Cursor + 'static,
        K: MessageSink + ?Sized,
        F: FnMut(C::Item, Arc<ServerCallContext>, usize) -> Fut,
        Fut: Future<Output = Result<K::Item, CallError>>,
    {
        self.run(requests, responses, context, |requests| {
            process_with_indexed_async(requests, transform)
        })
        .await
    }
}

/// [`RequestProcessor::process_requests`] with default options.
///
/// # Errors
///
/// Returns [`CallError::Cancelled`] if the call is cancelled.
pub async fn process_requests<C, K, F>(
    requests: C,
    responses: &mut K,
    context: Arc<ServerCallContext>,
    transform: F,
) -> Result<(), CallError>
where
    C: Cursor + 'static,
    K: MessageSink + ?Sized,
    F: FnMut(C::Item) -> Result<K::Item, CallError>,
{
    RequestProcessor::default()
        .process_requests(requests, responses, context, transform)
        .await
}

/// [`RequestProcessor::process_requests_with_context`] with default options.
///
/// # Errors
///
/// Returns [`CallError::Cancelled`] if the call is cancelled.
pub async fn process_requests_with_context<C, K, F>(
    requests: C,
    responses: &mut K,
    context: Arc<ServerCallContext>,
    transform: F,
) -> Result<(), CallError>
where
    C: Cursor + 'static,
    K: MessageSink + ?Sized,
    F: FnMut(C::Item, &ServerCallContext) -> Result<K::Item, CallError>,
{
    RequestProcessor::default()
        .process_requests_with_context(requests, responses, context, transform)
        .await
}

/// [`RequestProcessor::process_requests_indexed`] with default options.
///
/// # Errors
///
/// Returns [`CallError::Cancelled`] if the call is cancelled.
pub async fn process_requests_indexed<C, K, F>(
    requests: C,
    responses: &mut K,
    context: Arc<ServerCallContext>,
    transform: F,
) -> Result<(), CallError>
where
    C: Cursor + 'static,
    K: MessageSink + ?Sized,
    F: FnMut(C::Item, &ServerCallContext, usize) -> Result<K::Item, CallError>,
{
    RequestProcessor::default()
        .process_requests_indexed(requests, responses, context, transform)
        .await
}

/// [`RequestProcessor::process_requests_async`] with default options.
///
/// # Errors
///
/// Returns [`CallError::Cancelled`] if the call is cancelled.
pub async fn process_requests_async<C, K, F, Fut>(
    requests: C,
    responses: &mut K,
    context: Arc<ServerCallContext>,
    transform: F,
) -> Result<(), CallError>
where
    C: Cursor + 'static,
    K: MessageSink + ?Sized,
    F: FnMut(C::Item) -> Fut,
    Fut: Future<Output = Result<K::Item, CallError>>,
{
    RequestProcessor::default()
        .process_requests_async(requests, responses, context, transform)
        .await
}

/// [`RequestProcessor::process_requests_with_context_async`] with default
/// options.
///
/// # Errors
///
/// Returns [`CallError::Cancelled`] if the call is cancelled.
pub async fn process_requests_with_context_async<C, K, F, Fut>(
    requests: C,
    responses: &mut K,
    context: Arc<ServerCallContext>,
    transform: F,
) -> Result<(), CallError>
where
    C: Cursor + 'static,
    K: MessageSink + ?Sized,
    F: FnMut(C::Item, Arc<ServerCallContext>) -> Fut,
    Fut: Future<Output = Result<K::Item, CallError>>,
{
    RequestProcessor::default()
        .process_requests_with_context_async(requests, responses, context, transform)
        .await
}

/// [`RequestProcessor::process_requests_indexed_async`] with default options.
///
/// # Errors
///
/// Returns [`CallError::Cancelled`] if the call is cancelled.
pub async fn process_requests_indexed_async<C, K, F, Fut>(
    requests: C,
    responses: &mut K,
    context: Arc<ServerCallContext>,
    transform: F,
) -> Result<(), CallError>
where
    C: Cursor + 'static,
    K: MessageSink + ?Sized,
    F: FnMut(C::Item, Arc<ServerCallContext>, usize) -> Fut,
    Fut: Future<Output = Result<K::Item, CallError>>,
{
    RequestProcessor::default()
        .process_requests_indexed_async(requests, responses, context, transform)
        .await
}
