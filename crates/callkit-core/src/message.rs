//! A payload paired with the context of the call it belongs to.

use crate::error::CallError;

/// An immutable pair of a message and its call context.
///
/// On the client side the context is the call's lifecycle facade; on the
/// server side it is the per-call server context. Both halves are always
/// present: a `MessageWithContext` cannot be observed half-built.
///
/// # Example
///
/// ```rust
/// use callkit_core::MessageWithContext;
///
/// let msg = MessageWithContext::new("ping", 7u32);
/// assert_eq!(*msg.message(), "ping");
/// assert_eq!(*msg.context(), 7);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageWithContext<M, C> {
    message: M,
    context: C,
}

impl<M, C> MessageWithContext<M, C> {
    /// Pair a message with its context.
    #[must_use]
    pub const fn new(message: M, context: C) -> Self {
        Self { message, context }
    }

    /// Pair parts that may be absent.
    ///
    /// Fails with [`CallError::ContractViolation`] if either part is missing.
    pub fn try_from_parts(message: Option<M>, context: Option<C>) -> Result<Self, CallError> {
        match (message, context) {
            (Some(message), Some(context)) => Ok(Self::new(message, context)),
            (None, None) => Err(CallError::contract("message and context are missing")),
            (None, Some(_)) => Err(CallError::contract("message is missing")),
            (Some(_), None) => Err(CallError::contract("context is missing")),
        }
    }

    /// The message.
    #[must_use]
    pub const fn message(&self) -> &M {
        &self.message
    }

    /// The context.
    #[must_use]
    pub const fn context(&self) -> &C {
        &self.context
    }

    /// Drop the context, keeping the message.
    #[must_use]
    pub fn into_message(self) -> M {
        self.message
    }

    /// Split into message and context.
    #[must_use]
    pub fn into_parts(self) -> (M, C) {
        (self.message, self.context)
    }

    /// Replace the message, keeping the same context.
    #[must_use]
    pub fn map<N>(self, f: impl FnOnce(M) -> N) -> MessageWithContext<N, C> {
        MessageWithContext::new(f(self.message), self.context)
    }
}
