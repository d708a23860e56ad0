//! Server-side processing pipelines for callkit.
//!
//! A handler hands this crate the request cursor, the response sink and the
//! [`ServerCallContext`] of a call, plus a transform from request to
//! response. The pipeline:
//!
//! 1. reads requests one at a time, pairing each with the call context;
//! 2. transforms each request, strictly in arrival order;
//! 3. awaits the write of each response before reading the next request;
//! 4. turns the first failure into the call's status instead of an error.
//!
//! # Error mapping
//!
//! | Failure | Status code |
//! |---------|-------------|
//! | [`CallError::OutOfRange`](callkit_core::CallError::OutOfRange) | `OUT_OF_RANGE` |
//! | [`CallError::InvalidArgument`](callkit_core::CallError::InvalidArgument), contract violations | `INVALID_ARGUMENT` |
//! | [`CallError::Unimplemented`](callkit_core::CallError::Unimplemented) | `UNIMPLEMENTED` |
//! | anything else | `UNKNOWN` |
//!
//! # Example
//!
//! ```rust
//! use callkit_core::CallError;
//! use callkit_server::process_requests;
//! use callkit_transport::memory::{self, ChannelConfig};
//! use callkit_transport::MessageSink;
//! use std::sync::Arc;
//!
//! # futures::executor::block_on(async {
//! let (call, server) = memory::duplex::<u32, u32>(&ChannelConfig::default());
//! let (mut outbound, _inbound, _guard) = call.into_parts();
//! outbound.write(21).await?;
//! outbound.complete().await?;
//!
//! let memory::ServerEnd { requests, mut responses, context, completion } = server;
//! process_requests(requests, &mut responses, Arc::clone(&context), |n: u32| {
//!     n.checked_mul(2).ok_or_else(|| CallError::out_of_range("overflow"))
//! })
//! .await?;
//!
//! assert!(context.status().is_ok());
//! completion.finish();
//! # Ok::<(), CallError>(())
//! # }).unwrap();
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod options;
pub mod pipeline;
pub mod process;

pub use callkit_transport::{ServerCallContext, ServerCallContextBuilder};
pub use options::ProcessOptions;
pub use pipeline::{
    Request, RequestStream, add_context, failure_status, on_request, process_with,
    process_with_async, process_with_context, process_with_context_async, process_with_indexed,
    process_with_indexed_async, remove_context, write_responses_to,
};
pub use process::{
    RequestProcessor, process_requests, process_requests_async, process_requests_indexed,
    process_requests_indexed_async, process_requests_with_context,
    process_requests_with_context_async,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::options::ProcessOptions;
    pub use crate::process::{
        RequestProcessor, process_requests, process_requests_async, process_requests_indexed,
        process_requests_indexed_async, process_requests_with_context,
        process_requests_with_context_async,
    };
    pub use callkit_transport::ServerCallContext;
}
