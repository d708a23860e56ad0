//! Client-side pipelines for callkit.
//!
//! This crate turns call objects into streams:
//!
//! - [`CallContextExt::call_context`] exposes the lifecycle values of any
//!   call through one [`CallContext`](callkit_core::CallContext) facade
//! - [`OnResponse::on_response`] streams the responses of a server-streaming
//!   or duplex call, each paired with the call context
//! - [`RequestFrom::request_from`] drives a request stream into a duplex or
//!   client-streaming call and returns the responses
//!
//! # Example
//!
//! ```no_run
//! use callkit_client::prelude::*;
//! use callkit_transport::memory::{self, ChannelConfig};
//! use futures::{StreamExt, stream};
//!
//! # async fn run() -> Result<(), callkit_core::CallError> {
//! let (call, _server) = memory::duplex::<String, String>(&ChannelConfig::default());
//!
//! let requests = stream::iter(["hello", "world"].map(|s| Ok(s.to_string())));
//! let mut responses = call.request_from(requests);
//! while let Some(response) = responses.next().await {
//!     let response = response?;
//!     println!("{}", response.message());
//! }
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]

pub mod context;
pub mod pipeline;
pub mod response;
pub mod write;

pub use context::{CallContextExt, StreamingCallContext};
pub use pipeline::{DuplexResponses, RequestFrom, send_all};
pub use response::{OnResponse, Response, Responses};
pub use write::write_all;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::context::CallContextExt;
    pub use crate::pipeline::{RequestFrom, send_all};
    pub use crate::response::{OnResponse, Response};
}
