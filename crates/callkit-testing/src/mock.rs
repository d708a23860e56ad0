//! Scripted transport endpoints.
//!
//! [`MockCursor`] replays a script of items, failures and hangs.
//! [`MockSink`] records what was written and can fail on a chosen write.
//! Both hand out probes that stay usable after the endpoint was moved into
//! a call object.

use callkit_core::{BoxFuture, CallError, CancellationToken};
use callkit_transport::{Cursor, MessageSink};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One step of a [`MockCursor`] script.
#[derive(Debug)]
pub enum Step<T> {
    /// Advance to this item.
    Item(T),
    /// Fail the advance.
    Fail(CallError),
    /// Block the advance until it is cancelled.
    Hang,
}

#[derive(Debug, Default)]
struct CursorCounters {
    advances: AtomicUsize,
    cancellations: AtomicUsize,
    exhausted: AtomicBool,
}

/// Observes a [`MockCursor`].
#[derive(Debug, Clone, Default)]
pub struct CursorProbe {
    counters: Arc<CursorCounters>,
}

impl CursorProbe {
    /// How many times the cursor was advanced.
    #[must_use]
    pub fn advances(&self) -> usize {
        self.counters.advances.load(Ordering::SeqCst)
    }

    /// How many blocked advances were released by cancellation.
    #[must_use]
    pub fn cancellations(&self) -> usize {
        self.counters.cancellations.load(Ordering::SeqCst)
    }

    /// Whether the cursor reported end-of-stream.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.counters.exhausted.load(Ordering::SeqCst)
    }
}

/// A cursor that replays a script.
///
/// # Example
///
/// ```rust
/// use callkit_testing::mock::MockCursor;
///
/// let cursor = MockCursor::new(["a", "b"]);
/// let probe = cursor.probe();
/// assert_eq!(probe.advances(), 0);
/// ```
#[derive(Debug)]
pub struct MockCursor<T> {
    steps: VecDeque<Step<T>>,
    current: Option<T>,
    probe: CursorProbe,
}

impl<T> MockCursor<T> {
    /// A cursor over `items` that then reports end-of-stream.
    pub fn new(items: impl IntoIterator<Item = T>) -> Self {
        Self::from_steps(items.into_iter().map(Step::Item))
    }

    /// A cursor replaying `steps`, then reporting end-of-stream.
    pub fn from_steps(steps: impl IntoIterator<Item = Step<T>>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            current: None,
            probe: CursorProbe::default(),
        }
    }

    /// A cursor over `items` whose next advance fails with `error`.
    pub fn failing_after(items: impl IntoIterator<Item = T>, error: CallError) -> Self {
        Self::from_steps(items.into_iter().map(Step::Item).chain([Step::Fail(error)]))
    }

    /// A cursor over `items` whose next advance blocks until cancelled.
    pub fn hanging_after(items: impl IntoIterator<Item = T>) -> Self {
        Self::from_steps(items.into_iter().map(Step::Item).chain([Step::Hang]))
    }

    /// A probe observing this cursor.
    #[must_use]
    pub fn probe(&self) -> CursorProbe {
        self.probe.clone()
    }
}

impl<T: Send> Cursor for MockCursor<T> {
    type Item = T;

    fn advance<'a>(&'a mut self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<bool, CallError>> {
        self.probe.counters.advances.fetch_add(1, Ordering::SeqCst);
        self.current = None;
        let step = self.steps.pop_front();
        Box::pin(async move {
            match step {
                Some(Step::Item(item)) => {
                    self.current = Some(item);
                    Ok(true)
                }
                Some(Step::Fail(err)) => Err(err),
                Some(Step::Hang) => {
                    cancel.cancelled().await;
                    self.probe.counters.cancellations.fetch_add(1, Ordering::SeqCst);
                    Err(CallError::cancelled("advance"))
                }
                None => {
                    self.probe.counters.exhausted.store(true, Ordering::SeqCst);
                    Ok(false)
                }
            }
        })
    }

    fn current(&self) -> Option<&T> {
        self.current.as_ref()
    }

    fn take_current(&mut self) -> Option<T> {
        self.current.take()
    }
}

#[derive(Debug)]
struct SinkState<T> {
    written: Vec<T>,
    attempts: usize,
    completes: usize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Observes a [`MockSink`].
#[derive(Debug)]
pub struct SinkProbe<T> {
    state: Arc<Mutex<SinkState<T>>>,
}

impl<T> Clone for SinkProbe<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Clone> SinkProbe<T> {
    /// The items written successfully, in order.
    #[must_use]
    pub fn written(&self) -> Vec<T> {
        lock(&self.state).written.clone()
    }
}

impl<T> SinkProbe<T> {
    /// How many writes were attempted, including failed ones.
    #[must_use]
    pub fn attempts(&self) -> usize {
        lock(&self.state).attempts
    }

    /// How many times the sink was completed.
    #[must_use]
    pub fn completes(&self) -> usize {
        lock(&self.state).completes
    }
}

/// A sink that records writes.
#[derive(Debug)]
pub struct MockSink<T> {
    state: Arc<Mutex<SinkState<T>>>,
    failure: Option<(usize, CallError)>,
}

impl<T> MockSink<T> {
    /// A sink accepting every write.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SinkState {
                written: Vec::new(),
                attempts: 0,
                completes: 0,
            })),
            failure: None,
        }
    }

    /// Fail the write with zero-based position `index` with `error`.
    #[must_use]
    pub fn failing_at(mut self, index: usize, error: CallError) -> Self {
        self.failure = Some((index, error));
        self
    }

    /// A probe observing this sink.
    #[must_use]
    pub fn probe(&self) -> SinkProbe<T> {
        SinkProbe {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> Default for MockSink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> MessageSink for MockSink<T> {
    type Item = T;

    fn write(&mut self, item: T) -> BoxFuture<'_, Result<(), CallError>> {
        let result = {
            let mut state = lock(&self.state);
            let index = state.attempts;
            state.attempts += 1;
            match self.failure.take() {
                Some((at, err)) if at == index => Err(err),
                failure => {
                    self.failure = failure;
                    state.written.push(item);
                    Ok(())
                }
            }
        };
        Box::pin(async move {
            // Writes complete asynchronously, as they would on a real transport.
            tokio::task::yield_now().await;
            result
        })
    }

    fn complete(&mut self) -> BoxFuture<'_, Result<(), CallError>> {
        lock(&self.state).completes += 1;
        Box::pin(futures::future::ready(Ok(())))
    }
}
