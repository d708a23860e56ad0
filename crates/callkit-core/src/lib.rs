//! Core types for callkit.
//!
//! This crate holds the vocabulary shared by the transport, client and server
//! crates. It has no async runtime dependency.
//!
//! - [`status`]: status codes and terminal statuses
//! - [`metadata`]: header and trailer multimaps
//! - [`error`]: the [`CallError`] type and its [`FailureKind`] taxonomy
//! - [`cancel`]: cooperative [`CancellationToken`]s
//! - [`message`]: the [`MessageWithContext`] envelope
//! - [`context`]: the [`CallContext`] lifecycle facade trait

#![deny(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::unwrap_used)]
#![allow(clippy::module_name_repetitions)]

pub mod cancel;
pub mod context;
pub mod error;
pub mod message;
pub mod metadata;
pub mod status;

pub use cancel::{CancelOnDrop, CancellationToken};
pub use context::{CallContext, CallShape, SharedCallContext};
pub use error::{BoxError, CallError, CallResult, FailureKind};
pub use message::MessageWithContext;
pub use metadata::{Metadata, MetadataEntry, MetadataValue};
pub use status::{Code, Status};

/// Re-export of the boxed future type used by [`CallContext`].
pub use futures::future::BoxFuture;
