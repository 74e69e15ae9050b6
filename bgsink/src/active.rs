use std::any::Any;
use std::error::Error as StdError;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, trace};

use crate::config::{ActiveConfig, ShutdownPolicy};
use crate::future::{self, ActionError, CallFuture};
use crate::{BgsinkError, Result};

type Task = Box<dyn FnOnce() -> std::result::Result<(), ActionError> + Send + 'static>;

enum Envelope {
    Run(Task),
    Stop,
}

pub(crate) struct Channel<T> {
    tx: UnboundedSender<T>,
    rx: UnboundedReceiver<T>,
}

impl<T> Channel<T> {
    pub(crate) fn new() -> Channel<T> {
        let (tx, rx) = unbounded_channel();

        Channel { tx, rx }
    }

    pub(crate) fn split(self) -> (UnboundedSender<T>, UnboundedReceiver<T>) {
        (self.tx, self.rx)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Active,
    Draining,
    Stopped,
}

#[derive(Debug, Default)]
pub struct WorkerStats {
    executed: AtomicU64,
    failed: AtomicU64,
    discarded: AtomicU64,
}

impl WorkerStats {
    /// Actions that ran, including the ones that failed.
    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    /// Actions dropped without running, by a discarding stop or a cancelled future.
    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::SeqCst)
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return message.to_string();
    }

    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }

    "non-string panic payload".to_string()
}

/// An unbounded FIFO of actions drained by one dedicated thread.
///
/// Any number of threads may post; the worker runs actions one at a time in
/// the order their `post` calls completed. A failing action is reported and
/// the worker carries on with the next one. Dropping the handle stops the
/// worker according to the configured [`ShutdownPolicy`] and joins it.
pub struct ActiveHandle {
    name: String,
    shutdown: ShutdownPolicy,
    inbox_tx: UnboundedSender<Envelope>,
    state: RwLock<State>,
    discard: Arc<AtomicBool>,
    stats: Arc<WorkerStats>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
}

struct Worker {
    name: String,
    inbox: UnboundedReceiver<Envelope>,
    discard: Arc<AtomicBool>,
    stats: Arc<WorkerStats>,
}

impl ActiveHandle {
    pub fn start(config: ActiveConfig) -> Result<ActiveHandle> {
        let (inbox_tx, inbox_rx) = Channel::new().split();
        let discard = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(WorkerStats::default());

        let worker = Worker {
            name: config.name.clone(),
            inbox: inbox_rx,
            discard: discard.clone(),
            stats: stats.clone(),
        };

        let handle = thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || worker.message_loop())?;
        let worker_id = handle.thread().id();

        debug!(worker = %config.name, "worker started");

        Ok(ActiveHandle {
            name: config.name,
            shutdown: config.shutdown,
            inbox_tx,
            state: RwLock::new(State::Active),
            discard,
            stats,
            worker: Mutex::new(Some(handle)),
            worker_id,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> State {
        *self.state.read()
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Queues a fire-and-forget action.
    pub fn post<F>(&self, action: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(Box::new(move || {
            action();
            Ok(())
        }))
    }

    /// Queues an action whose return value is delivered through the
    /// returned future. A panic inside the action resolves the future to
    /// [`ActionError::Panicked`].
    pub fn post_with_result<R, F>(&self, action: F) -> Result<CallFuture<R>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.post_fallible(move || Ok::<R, std::convert::Infallible>(action()))
    }

    /// Like [`post_with_result`](Self::post_with_result) for actions that
    /// can fail; an `Err` resolves the future to [`ActionError::Failed`].
    pub fn post_fallible<R, E, F>(&self, action: F) -> Result<CallFuture<R>>
    where
        F: FnOnce() -> std::result::Result<R, E> + Send + 'static,
        E: StdError + Send + Sync + 'static,
        R: Send + 'static,
    {
        let (promise, future) = future::pair();

        self.enqueue(Box::new(move || {
            if promise.is_cancelled() {
                return Err(ActionError::Cancelled);
            }

            let error = match panic::catch_unwind(AssertUnwindSafe(action)) {
                Ok(Ok(value)) => {
                    promise.fulfil(value);
                    return Ok(());
                }
                Ok(Err(error)) => ActionError::failed(error),
                Err(payload) => ActionError::Panicked(panic_message(payload.as_ref())),
            };

            promise.fail(error.clone());
            Err(error)
        }))?;

        Ok(future)
    }

    fn enqueue(&self, task: Task) -> Result<()> {
        // held across the send so nothing lands behind the stop marker
        let state = self.state.read();
        if *state != State::Active {
            return Err(BgsinkError::ClosedQueue.into());
        }

        self.inbox_tx
            .send(Envelope::Run(task))
            .map_err(|_| BgsinkError::ClosedQueue)?;
        Ok(())
    }

    /// Stops the worker using the configured policy.
    pub fn stop(&self) {
        self.stop_with(self.shutdown)
    }

    /// Stops accepting actions, lets the worker drain or discard what is
    /// queued, and joins it. Calling this more than once is a no-op.
    ///
    /// When called from an action running on this worker the join is
    /// skipped; the worker exits once it reaches the stop marker.
    pub fn stop_with(&self, policy: ShutdownPolicy) {
        {
            let mut state = self.state.write();
            if *state == State::Active {
                *state = State::Draining;
                if policy == ShutdownPolicy::Discard {
                    self.discard.store(true, Ordering::SeqCst);
                }

                debug!(worker = %self.name, %policy, "stopping worker");
                // fails only if the worker is already gone
                let _ = self.inbox_tx.send(Envelope::Stop);
            }
        }

        if thread::current().id() == self.worker_id {
            return;
        }

        let mut worker = self.worker.lock();
        if let Some(handle) = worker.take() {
            if handle.join().is_err() {
                error!(worker = %self.name, "worker thread terminated abnormally");
            }
        }
        *self.state.write() = State::Stopped;
    }
}

impl Drop for ActiveHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Worker {
    fn message_loop(mut self) {
        while let Some(envelope) = self.inbox.blocking_recv() {
            match envelope {
                Envelope::Run(task) => {
                    if self.discard.load(Ordering::SeqCst) {
                        self.stats.discarded.fetch_add(1, Ordering::SeqCst);
                        continue;
                    }
                    self.execute(task);
                }
                Envelope::Stop => break,
            }
        }

        debug!(
            worker = %self.name,
            executed = self.stats.executed(),
            failed = self.stats.failed(),
            discarded = self.stats.discarded(),
            "worker stopped"
        );
    }

    fn execute(&self, task: Task) {
        match panic::catch_unwind(AssertUnwindSafe(task)) {
            Ok(Ok(())) => {
                self.stats.executed.fetch_add(1, Ordering::SeqCst);
            }
            Ok(Err(ActionError::Cancelled)) => {
                self.stats.discarded.fetch_add(1, Ordering::SeqCst);
                trace!(worker = %self.name, "skipping cancelled action");
            }
            Ok(Err(failure)) => {
                self.stats.executed.fetch_add(1, Ordering::SeqCst);
                self.stats.failed.fetch_add(1, Ordering::SeqCst);
                error!(worker = %self.name, %failure, "action failed");
            }
            Err(payload) => {
                self.stats.executed.fetch_add(1, Ordering::SeqCst);
                self.stats.failed.fetch_add(1, Ordering::SeqCst);
                error!(
                    worker = %self.name,
                    panic = %panic_message(payload.as_ref()),
                    "action panicked"
                );
            }
        }
    }
}
