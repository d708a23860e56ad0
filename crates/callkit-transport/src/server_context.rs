//! The per-call context a transport hands to a server handler.

use callkit_core::{CallError, CancellationToken, Metadata, Status};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

type HeadersHook = Box<dyn FnOnce(Metadata) + Send>;

/// Server-side view of one call.
///
/// Exposes the call's cancellation token, the mutable status reported to
/// the peer when the handler returns, and the response trailers.
pub struct ServerCallContext {
    method: String,
    peer: String,
    request_headers: Metadata,
    cancel: CancellationToken,
    status: Mutex<Status>,
    trailers: Mutex<Metadata>,
    headers_hook: Mutex<Option<HeadersHook>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ServerCallContext {
    /// Start building a context for `method`.
    #[must_use]
    pub fn builder(method: impl Into<String>) -> ServerCallContextBuilder {
        ServerCallContextBuilder::new(method.into())
    }

    /// The fully qualified method name.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Description of the calling peer.
    #[must_use]
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Headers the client sent with the call.
    #[must_use]
    pub fn request_headers(&self) -> &Metadata {
        &self.request_headers
    }

    /// The call's cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether the call has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The status that will be reported to the peer.
    #[must_use]
    pub fn status(&self) -> Status {
        lock(&self.status).clone()
    }

    /// Overwrite the status unconditionally.
    pub fn set_status(&self, status: Status) {
        *lock(&self.status) = status;
    }

    /// Set the status only while it is still the default success status.
    ///
    /// Returns whether the status was set. The check and the write happen
    /// under one lock, so among concurrent failures exactly one wins.
    pub fn set_status_if_ok(&self, status: Status) -> bool {
        let mut current = lock(&self.status);
        if current.is_ok() {
            debug!(method = %self.method, code = %status.code, "Call status set");
            *current = status;
            true
        } else {
            false
        }
    }

    /// Trailers that will be sent when the call completes.
    #[must_use]
    pub fn response_trailers(&self) -> Metadata {
        lock(&self.trailers).clone()
    }

    /// Add a trailer.
    pub fn add_response_trailer(&self, key: impl Into<String>, value: impl Into<String>) {
        lock(&self.trailers).add(key, value);
    }

    /// Send the response headers ahead of the first response.
    ///
    /// Headers can be sent once; a second attempt is a contract violation.
    pub fn write_response_headers(&self, headers: Metadata) -> Result<(), CallError> {
        let hook = lock(&self.headers_hook).take();
        match hook {
            Some(hook) => {
                hook(headers);
                Ok(())
            }
            None => Err(CallError::contract("response headers were already sent")),
        }
    }

    /// Whether the response headers are still unsent.
    #[must_use]
    pub fn headers_pending(&self) -> bool {
        lock(&self.headers_hook).is_some()
    }
}

impl fmt::Debug for ServerCallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerCallContext")
            .field("method", &self.method)
            .field("peer", &self.peer)
            .field("status", &self.status())
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Builder for [`ServerCallContext`].
pub struct ServerCallContextBuilder {
    method: String,
    peer: String,
    request_headers: Metadata,
    cancel: Option<CancellationToken>,
    headers_hook: Option<HeadersHook>,
}

impl ServerCallContextBuilder {
    fn new(method: String) -> Self {
        Self {
            method,
            peer: "unknown".to_string(),
            request_headers: Metadata::new(),
            cancel: None,
            headers_hook: None,
        }
    }

    /// Describe the calling peer.
    pub fn peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = peer.into();
        self
    }

    /// Headers received with the call.
    pub fn request_headers(mut self, headers: Metadata) -> Self {
        self.request_headers = headers;
        self
    }

    /// Use an existing cancellation token.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Deliver response headers through `hook`.
    ///
    /// Without a hook, headers written by the handler are discarded.
    pub fn on_response_headers(mut self, hook: impl FnOnce(Metadata) + Send + 'static) -> Self {
        self.headers_hook = Some(Box::new(hook));
        self
    }

    /// Build the context.
    #[must_use]
    pub fn build(self) -> ServerCallContext {
        ServerCallContext {
            method: self.method,
            peer: self.peer,
            request_headers: self.request_headers,
            cancel: self.cancel.unwrap_or_default(),
            status: Mutex::new(Status::ok()),
            trailers: Mutex::new(Metadata::new()),
            headers_hook: Mutex::new(Some(
                self.headers_hook.unwrap_or_else(|| Box::new(|_| {})),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callkit_core::Code;
    use std::sync::Arc;

    #[test]
    fn test_defaults() {
        let ctx = ServerCallContext::builder("/echo.Echo/Chat").build();
        assert_eq!(ctx.method(), "/echo.Echo/Chat");
        assert_eq!(ctx.peer(), "unknown");
        assert!(ctx.status().is_ok());
        assert!(ctx.response_trailers().is_empty());
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn test_first_failure_wins() {
        let ctx = ServerCallContext::builder("/m").build();
        assert!(ctx.set_status_if_ok(Status::new(Code::OutOfRange, "first")));
        assert!(!ctx.set_status_if_ok(Status::new(Code::Unknown, "second")));
        assert_eq!(ctx.status(), Status::new(Code::OutOfRange, "first"));
    }

    #[test]
    fn test_concurrent_failures_set_status_once() {
        let ctx = Arc::new(ServerCallContext::builder("/m").build());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let ctx = Arc::clone(&ctx);
                std::thread::spawn(move || ctx.set_status_if_ok(Status::new(Code::Unknown, format!("{i}"))))
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_response_headers_sent_once() {
        let (tx, rx) = std::sync::mpsc::channel();
        let ctx = ServerCallContext::builder("/m")
            .on_response_headers(move |headers| {
                tx.send(headers).unwrap();
            })
            .build();

        assert!(ctx.headers_pending());
        ctx.write_response_headers(Metadata::new().with("x", "1")).unwrap();
        assert!(!ctx.headers_pending());
        assert!(matches!(
            ctx.write_response_headers(Metadata::new()),
            Err(CallError::ContractViolation { .. })
        ));
        assert_eq!(rx.recv().unwrap().get_str("x"), Some("1"));
    }
}
