use std::error::Error as StdError;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Why a result-bearing action did not produce a value.
///
/// Cloneable so that repeated reads of a [`CallFuture`] observe the same
/// outcome.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ActionError {
    #[error("action panicked: {0}")]
    Panicked(String),
    #[error("action failed: {0}")]
    Failed(Arc<dyn StdError + Send + Sync>),
    #[error("action was cancelled before it ran")]
    Cancelled,
    #[error("result was already moved out by an earlier poll or wait")]
    Consumed,
}

impl ActionError {
    pub fn failed<E: StdError + Send + Sync + 'static>(error: E) -> Self {
        ActionError::Failed(Arc::new(error))
    }

    /// Recovers the original error of a [`ActionError::Failed`] outcome.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        match self {
            ActionError::Failed(error) => error.downcast_ref::<E>(),
            _ => None,
        }
    }
}

enum SlotState<R> {
    Empty,
    Cancelled,
    Fulfilled(R),
    Failed(ActionError),
    Taken,
}

struct SlotInner<R> {
    state: SlotState<R>,
    waker: Option<Waker>,
}

struct ResultSlot<R> {
    inner: Mutex<SlotInner<R>>,
    ready: Condvar,
}

impl<R> ResultSlot<R> {
    fn new() -> Self {
        ResultSlot {
            inner: Mutex::new(SlotInner {
                state: SlotState::Empty,
                waker: None,
            }),
            ready: Condvar::new(),
        }
    }

    fn complete(&self, outcome: Result<R, ActionError>) {
        let waker = {
            let mut inner = self.inner.lock();
            match inner.state {
                SlotState::Empty => {}
                // lost the race against `CallFuture::cancel`, the caller already gave up
                SlotState::Cancelled => return,
                _ => panic!("result slot fulfilled twice"),
            }

            inner.state = match outcome {
                Ok(value) => SlotState::Fulfilled(value),
                Err(error) => SlotState::Failed(error),
            };
            inner.waker.take()
        };

        self.ready.notify_all();
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    fn is_cancelled(&self) -> bool {
        matches!(self.inner.lock().state, SlotState::Cancelled)
    }
}

/// Producer half of a result slot, owned by the action that fills it.
///
/// Dropping an unfulfilled promise (the action was discarded during a
/// non-draining stop) resolves the paired future to `Cancelled`.
pub struct Promise<R> {
    slot: Arc<ResultSlot<R>>,
    completed: bool,
}

impl<R> Promise<R> {
    pub fn fulfil(mut self, value: R) {
        self.completed = true;
        self.slot.complete(Ok(value));
    }

    pub fn fail(mut self, error: ActionError) {
        self.completed = true;
        self.slot.complete(Err(error));
    }

    pub fn is_cancelled(&self) -> bool {
        self.slot.is_cancelled()
    }
}

impl<R> Drop for Promise<R> {
    fn drop(&mut self) {
        if !self.completed {
            self.slot.complete(Err(ActionError::Cancelled));
        }
    }
}

/// Consumer half of a result slot.
///
/// Can be waited on from synchronous code (`get`, `wait`, `wait_timeout`)
/// or awaited from async code.
pub struct CallFuture<R> {
    slot: Arc<ResultSlot<R>>,
}

pub fn pair<R>() -> (Promise<R>, CallFuture<R>) {
    let slot = Arc::new(ResultSlot::new());
    (
        Promise {
            slot: slot.clone(),
            completed: false,
        },
        CallFuture { slot },
    )
}

fn peek<R: Clone>(state: &SlotState<R>) -> Option<Result<R, ActionError>> {
    match state {
        SlotState::Empty => None,
        SlotState::Cancelled => Some(Err(ActionError::Cancelled)),
        SlotState::Fulfilled(value) => Some(Ok(value.clone())),
        SlotState::Failed(error) => Some(Err(error.clone())),
        SlotState::Taken => Some(Err(ActionError::Consumed)),
    }
}

fn take<R>(state: &mut SlotState<R>) -> Option<Result<R, ActionError>> {
    match mem::replace(state, SlotState::Taken) {
        SlotState::Empty => {
            *state = SlotState::Empty;
            None
        }
        SlotState::Cancelled => Some(Err(ActionError::Cancelled)),
        SlotState::Fulfilled(value) => Some(Ok(value)),
        SlotState::Failed(error) => Some(Err(error)),
        SlotState::Taken => Some(Err(ActionError::Consumed)),
    }
}

impl<R> CallFuture<R> {
    pub fn is_ready(&self) -> bool {
        !matches!(self.slot.inner.lock().state, SlotState::Empty)
    }

    /// Blocks until the action has run, returning its outcome. Every call
    /// returns the same outcome.
    pub fn get(&self) -> Result<R, ActionError>
    where
        R: Clone,
    {
        let mut inner = self.slot.inner.lock();
        loop {
            if let Some(outcome) = peek(&inner.state) {
                return outcome;
            }
            self.slot.ready.wait(&mut inner);
        }
    }

    /// Blocks until the action has run and moves its outcome out.
    pub fn wait(self) -> Result<R, ActionError> {
        let mut inner = self.slot.inner.lock();
        loop {
            if let Some(outcome) = take(&mut inner.state) {
                return outcome;
            }
            self.slot.ready.wait(&mut inner);
        }
    }

    /// Waits at most `timeout`. `None` means the action has not completed
    /// yet; it stays queued and the future can be waited on again.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<R, ActionError>>
    where
        R: Clone,
    {
        // too far out to represent: same as waiting without a bound
        let deadline = Instant::now().checked_add(timeout);
        let mut inner = self.slot.inner.lock();
        loop {
            if let Some(outcome) = peek(&inner.state) {
                return Some(outcome);
            }
            match deadline {
                Some(deadline) => {
                    if self.slot.ready.wait_until(&mut inner, deadline).timed_out() {
                        return peek(&inner.state);
                    }
                }
                None => self.slot.ready.wait(&mut inner),
            }
        }
    }

    /// Best-effort cancellation: if the action has not started yet it will
    /// be skipped and the future resolves to `Cancelled`. Returns whether the
    /// future was cancelled.
    pub fn cancel(&self) -> bool {
        let waker = {
            let mut inner = self.slot.inner.lock();
            if !matches!(inner.state, SlotState::Empty) {
                return false;
            }
            inner.state = SlotState::Cancelled;
            inner.waker.take()
        };

        self.slot.ready.notify_all();
        if let Some(waker) = waker {
            waker.wake();
        }
        true
    }
}

impl<R> Future for CallFuture<R> {
    type Output = Result<R, ActionError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.slot.inner.lock();
        match take(&mut inner.state) {
            Some(outcome) => Poll::Ready(outcome),
            None => {
                inner.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}
