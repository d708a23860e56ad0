//! Testing utilities for callkit.
//!
//! This crate provides mocks, fixtures, and assertions for testing call
//! pipelines. It includes:
//!
//! - Scripted cursors and recording sinks ([`mock`])
//! - Call objects wired to those mocks ([`fixtures`])
//! - Assertions on statuses and lifecycle errors ([`assertions`])
//! - Timeout helpers for async tests ([`async_helpers`])
//!
//! # Example
//!
//! ```rust
//! use callkit_testing::{fixtures, MockCursor, MockSink};
//!
//! let fixture = fixtures::duplex::<u32, u32>(MockSink::new(), MockCursor::new([1, 2]));
//! assert_eq!(fixture.disposals.count(), 0);
//! ```

#![deny(missing_docs)]

pub mod assertions;
pub mod async_helpers;
pub mod fixtures;
pub mod mock;

// Re-export commonly used types
pub use assertions::{assert_cancelled, assert_not_completed, assert_status};
pub use fixtures::DisposeCounter;
pub use mock::{CursorProbe, MockCursor, MockSink, SinkProbe, Step};

/// Install a test subscriber for `tracing` output.
///
/// The filter comes from `RUST_LOG` and defaults to `warn`. Output goes
/// through the test harness so it is captured per test. Calling this more
/// than once is harmless.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::assertions::{assert_cancelled, assert_not_completed, assert_status};
    pub use crate::async_helpers::{with_default_timeout, with_timeout};
    pub use crate::fixtures::{self, DisposeCounter};
    pub use crate::init_tracing;
    pub use crate::mock::{MockCursor, MockSink, Step};
}
