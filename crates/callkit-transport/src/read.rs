//! Cursor to stream adapter.
//!
//! [`read_all`] turns a pull-based [`Cursor`] into a lazily-produced
//! [`Stream`]. Items are pulled strictly one at a time: the cursor is only
//! advanced when the consumer polls for the next item.
//!
//! The stream owns a [`CancellationToken`] that is handed to every advance.
//! Dropping the stream before it finished triggers the token, so a transport
//! blocked in `advance` can abort instead of leaking a live read.
//!
//! # Example
//!
//! ```rust,ignore
//! use callkit_transport::read_all;
//! use futures::TryStreamExt;
//!
//! let items: Vec<_> = read_all(cursor).try_collect().await?;
//! ```

use crate::traits::Cursor;
use callkit_core::{CallError, CancelOnDrop, CancellationToken};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::trace;

/// Stream of the items of a cursor. Created by [`read_all`].
#[must_use = "streams do nothing unless polled"]
pub struct ReadAll<T> {
    inner: BoxStream<'static, Result<T, CallError>>,
    token: CancellationToken,
}

impl<T> ReadAll<T> {
    /// The token handed to every advance of the underlying cursor.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.token
    }
}

impl<T> Stream for ReadAll<T> {
    type Item = Result<T, CallError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl<T> fmt::Debug for ReadAll<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadAll")
            .field("cancelled", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}

struct ReadState<C> {
    cursor: C,
    guard: CancelOnDrop,
    read: u64,
    done: bool,
}

/// Read every item of `cursor` as a stream.
///
/// The stream yields each item after a successful advance, ends without an
/// item when the cursor reports end-of-stream, and ends after yielding the
/// error when an advance fails. After cancellation no item is yielded.
pub fn read_all<C>(cursor: C) -> ReadAll<C::Item>
where
    C: Cursor + 'static,
{
    read_all_with(cursor, CancellationToken::new())
}

/// Like [`read_all`], using `token` as the stream's cancellation token.
///
/// The token is triggered if the stream is dropped before it finished.
pub fn read_all_with<C>(cursor: C, token: CancellationToken) -> ReadAll<C::Item>
where
    C: Cursor + 'static,
{
    let state = ReadState {
        cursor,
        guard: CancelOnDrop::new(token.clone()),
        read: 0,
        done: false,
    };

    let inner = stream::unfold(state, |mut state| async move {
        if state.done {
            return None;
        }
        if state.guard.token().is_cancelled() {
            trace!(items = state.read, "Read cancelled");
            state.done = true;
            return None;
        }

        let advanced = state.cursor.advance(state.guard.token()).await;
        match advanced {
            Ok(true) => {
                if state.guard.token().is_cancelled() {
                    state.done = true;
                    return None;
                }
                match state.cursor.take_current() {
                    Some(item) => {
                        state.read += 1;
                        Some((Ok(item), state))
                    }
                    None => {
                        state.done = true;
                        state.guard.disarm();
                        Some((
                            Err(CallError::contract(
                                "cursor advanced but exposes no current item",
                            )),
                            state,
                        ))
                    }
                }
            }
            Ok(false) => {
                trace!(items = state.read, "Cursor exhausted");
                state.guard.disarm();
                None
            }
            Err(err) => {
                trace!(items = state.read, error = %err, "Cursor failed");
                state.done = true;
                state.guard.disarm();
                Some((Err(err), state))
            }
        }
    })
    .fuse()
    .boxed();

    ReadAll { inner, token }
}
