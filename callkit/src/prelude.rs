//! Prelude module for convenient imports.
//!
//! ```rust
//! use callkit::prelude::*;
//!
//! let status = Status::new(Code::OutOfRange, "page 7 of 3");
//! assert!(!status.is_ok());
//! ```

pub use callkit_core::{
    CallContext, CallError, CancellationToken, Code, Metadata, MessageWithContext, Status,
};

pub use callkit_transport::prelude::*;

#[cfg(feature = "client")]
pub use callkit_client::prelude::*;

#[cfg(feature = "server")]
pub use callkit_server::prelude::*;
