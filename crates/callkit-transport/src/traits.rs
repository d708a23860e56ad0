//! The contracts a transport provides to the pipelines.
//!
//! A transport hands out two endpoints per streaming direction:
//!
//! - a [`Cursor`] on the receiving side: advance one step, then read the item
//!   the cursor now points at;
//! - a [`MessageSink`] on the sending side: write items one at a time, then
//!   signal that no more items follow.
//!
//! Both traits return boxed futures so that call objects can hold them as
//! trait objects regardless of the concrete transport.

use callkit_core::{BoxFuture, CallError, CancellationToken};
use futures::future::{self, Either};
use std::future::Future;

/// Pull-based receiving endpoint of a stream.
///
/// The protocol is: call [`advance`](Cursor::advance); on `Ok(true)` the
/// next item is available through [`current`](Cursor::current) or
/// [`take_current`](Cursor::take_current); on `Ok(false)` the stream has
/// ended. An `Err` ends the stream with that failure.
pub trait Cursor: Send {
    /// The item type.
    type Item: Send;

    /// Move to the next item.
    ///
    /// Implementations should abort promptly once `cancel` is triggered.
    fn advance<'a>(&'a mut self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<bool, CallError>>;

    /// The item the last successful advance moved to.
    fn current(&self) -> Option<&Self::Item>;

    /// Take ownership of the current item.
    ///
    /// After this returns `Some`, [`current`](Cursor::current) returns `None`
    /// until the next advance.
    fn take_current(&mut self) -> Option<Self::Item>;
}

/// Push-based sending endpoint of a stream.
pub trait MessageSink: Send {
    /// The item type.
    type Item: Send;

    /// Write one item. Callers await each write before issuing the next.
    fn write(&mut self, item: Self::Item) -> BoxFuture<'_, Result<(), CallError>>;

    /// Signal that no more items will be written.
    ///
    /// Sinks that have no notion of half-close keep the default no-op.
    fn complete(&mut self) -> BoxFuture<'_, Result<(), CallError>> {
        Box::pin(futures::future::ready(Ok(())))
    }
}

impl<C: Cursor + ?Sized> Cursor for Box<C> {
    type Item = C::Item;

    fn advance<'a>(&'a mut self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<bool, CallError>> {
        (**self).advance(cancel)
    }

    fn current(&self) -> Option<&Self::Item> {
        (**self).current()
    }

    fn take_current(&mut self) -> Option<Self::Item> {
        (**self).take_current()
    }
}

impl<S: MessageSink + ?Sized> MessageSink for Box<S> {
    type Item = S::Item;

    fn write(&mut self, item: Self::Item) -> BoxFuture<'_, Result<(), CallError>> {
        (**self).write(item)
    }

    fn complete(&mut self) -> BoxFuture<'_, Result<(), CallError>> {
        (**self).complete()
    }
}

/// A type-erased cursor.
pub type BoxCursor<T> = Box<dyn Cursor<Item = T>>;

/// A type-erased sink.
pub type BoxSink<T> = Box<dyn MessageSink<Item = T>>;

/// Run `future` unless `cancel` fires first.
///
/// Cancellation is checked before the future is polled, so an already
/// cancelled token never lets the operation start.
pub async fn cancellable<F>(
    cancel: &CancellationToken,
    operation: &str,
    future: F,
) -> Result<F::Output, CallError>
where
    F: Future,
{
    if cancel.is_cancelled() {
        return Err(CallError::cancelled(operation));
    }
    let cancelled = cancel.cancelled();
    futures::pin_mut!(future, cancelled);
    match future::select(future, cancelled).await {
        Either::Left((output, _)) => Ok(output),
        Either::Right(((), _)) => Err(CallError::cancelled(operation)),
    }
}
