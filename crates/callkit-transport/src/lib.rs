//! Transport contracts and call objects for callkit.
//!
//! A transport moves messages; this crate defines what the pipelines need
//! from one and how calls are represented on top of it.
//!
//! # Overview
//!
//! - [`Cursor`] and [`MessageSink`]: the receiving and sending endpoints of a
//!   stream
//! - [`read_all`]: turns a cursor into a lazily pulled [`futures::Stream`]
//! - [`CallHandle`] and the four call objects ([`UnaryCall`],
//!   [`ClientStreamingCall`], [`ServerStreamingCall`],
//!   [`DuplexStreamingCall`])
//! - [`ServerCallContext`]: the server-side view of a call
//!
//! # Available Transports
//!
//! | Transport | Use Case | Feature Flag |
//! |-----------|----------|--------------|
//! | [`memory`] | Testing and in-process calls | Always available |
//! | `grpc` | Bridges to tonic clients and servers | `grpc` |
//!
//! # Example
//!
//! ```rust
//! use callkit_transport::memory::{self, ChannelConfig};
//! use callkit_transport::HasCallHandle;
//!
//! # futures::executor::block_on(async {
//! let (call, server) = memory::duplex::<u32, u32>(&ChannelConfig::default());
//! assert!(!call.call_handle().is_finished());
//!
//! server.completion.finish();
//! assert!(call.call_handle().status().unwrap().is_ok());
//! # });
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod call;
pub mod memory;
pub mod read;
pub mod server_context;
pub mod traits;

#[cfg(feature = "grpc")]
pub mod grpc;

pub use call::{
    CallGuard, CallHandle, CallHandleBuilder, ClientStreamingCall, DuplexStreamingCall,
    HasCallHandle, ServerStreamingCall, UnaryCall,
};
pub use memory::{ChannelConfig, ChannelCursor, ChannelSink, Completion, ServerEnd};
pub use read::{ReadAll, read_all, read_all_with};
pub use server_context::{ServerCallContext, ServerCallContextBuilder};
pub use traits::{BoxCursor, BoxSink, Cursor, MessageSink, cancellable};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::call::{
        ClientStreamingCall, DuplexStreamingCall, HasCallHandle, ServerStreamingCall, UnaryCall,
    };
    pub use crate::read::read_all;
    pub use crate::server_context::ServerCallContext;
    pub use crate::traits::{Cursor, MessageSink};
}
