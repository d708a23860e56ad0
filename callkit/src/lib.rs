//! # callkit
//!
//! Stream pipelines over gRPC-style calls.
//!
//! A call hands out pull-based cursors for incoming messages and sinks for
//! outgoing ones. callkit turns those endpoints into [`futures::Stream`]s
//! and back:
//!
//! - [`read_all`] reads a cursor as a lazy stream that cancels the pending
//!   read when dropped;
//! - the client pipelines write a request stream to a call and expose the
//!   responses, each paired with the call's context;
//! - the server pipelines read requests, transform them in order, write the
//!   responses, and turn the first failure into the call's status.
//!
//! ## Quick Start
//!
//! ```rust
//! use callkit::prelude::*;
//! use callkit::transport::memory::{self, ChannelConfig};
//! use futures::{StreamExt, TryStreamExt, stream};
//! use std::sync::Arc;
//!
//! # futures::executor::block_on(async {
//! let (call, server) = memory::duplex::<u32, u32>(&ChannelConfig::default());
//! let memory::ServerEnd { requests, mut responses, context, completion } = server;
//!
//! let client = call.request_from(stream::iter([Ok(1), Ok(2)])).try_collect::<Vec<_>>();
//! let server = async move {
//!     process_requests(requests, &mut responses, context, |n: u32| Ok(n + 10)).await?;
//!     completion.finish();
//!     Ok::<(), CallError>(())
//! };
//!
//! let (responses, ()) = futures::future::try_join(client, server).await?;
//! let numbers: Vec<u32> = responses.iter().map(|r| *r.message()).collect();
//! assert_eq!(numbers, vec![11, 12]);
//! assert!(responses[0].context().status()?.is_ok());
//! # Ok::<(), CallError>(())
//! # }).unwrap();
//! ```
//!
//! ## Crate Organization
//!
//! - [`callkit_core`] - Status codes, metadata, errors, cancellation
//! - [`callkit_transport`] - Cursor and sink contracts, call objects,
//!   in-memory and tonic transports
//! - [`mod@callkit_client`] - Client duplex and client-streaming pipelines
//! - [`mod@callkit_server`] - Server processing pipelines

#![deny(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::unwrap_used)]
#![allow(clippy::module_name_repetitions)]

// Re-export all public items from core
pub use callkit_core::*;

pub use callkit_transport::{
    CallGuard, CallHandle, ClientStreamingCall, Cursor, DuplexStreamingCall, HasCallHandle,
    MessageSink, ReadAll, ServerCallContext, ServerStreamingCall, UnaryCall, read_all,
    read_all_with,
};

#[cfg(feature = "client")]
pub use callkit_client::{
    CallContextExt, DuplexResponses, OnResponse, RequestFrom, Response, Responses, send_all,
    write_all,
};

#[cfg(feature = "server")]
pub use callkit_server::{
    ProcessOptions, Request, RequestProcessor, process_requests, process_requests_async,
    process_requests_indexed, process_requests_indexed_async, process_requests_with_context,
    process_requests_with_context_async,
};

pub mod prelude;

/// Transport module re-exports
pub mod transport {
    //! Cursor and sink contracts and the transports implementing them.
    pub use callkit_transport::*;
}

/// Client module re-exports
#[cfg(feature = "client")]
pub mod client {
    //! Client pipelines.
    pub use callkit_client::*;
}

/// Server module re-exports
#[cfg(feature = "server")]
pub mod server {
    //! Server processing pipelines.
    pub use callkit_server::*;
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_prelude_imports() {
        use crate::prelude::*;
        let _ = std::any::type_name::<CallError>();
        let _ = std::any::type_name::<Status>();
    }
}
