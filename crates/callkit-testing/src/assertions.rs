//! Custom assertions for call outcomes.

use callkit_core::{CallError, Code, Status};

/// Assert that `status` has `code` and a message containing `expected`.
///
/// # Panics
///
/// Panics if the code differs or the message does not contain `expected`.
pub fn assert_status(status: &Status, code: Code, expected: &str) {
    assert_eq!(
        status.code, code,
        "Expected status code {code}, got {status}"
    );
    assert!(
        status.message.contains(expected),
        "Expected status message to contain '{expected}', but got '{}'",
        status.message
    );
}

/// Assert that a lifecycle value was read before the call completed.
///
/// # Panics
///
/// Panics if `result` is not a [`CallError::NotCompleted`] failure.
pub fn assert_not_completed<T: std::fmt::Debug>(result: &Result<T, CallError>) {
    assert!(
        matches!(result, Err(CallError::NotCompleted { .. })),
        "Expected a not-completed error, got {result:?}"
    );
}

/// Assert that `error` reports a cancellation.
///
/// # Panics
///
/// Panics if `error` is not a cancellation.
pub fn assert_cancelled(error: &CallError) {
    assert!(error.is_cancelled(), "Expected a cancellation, got {error}");
}
