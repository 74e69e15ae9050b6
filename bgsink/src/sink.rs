use std::error::Error as StdError;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::active::{ActiveHandle, State, WorkerStats};
use crate::config::{ActiveConfig, ShutdownPolicy};
use crate::future::CallFuture;
use crate::message::LogMessage;
use crate::{BgsinkError, Errors, Result};

#[cfg(test)]
mod tests;

pub type AsyncMessageCall<T> = Arc<dyn Fn(&mut T, LogMessage) + Send + Sync>;

/// Type-erased view of a [`Sink`], used by whoever broadcasts messages to
/// sinks of different types.
pub trait SinkWrapper: Send + Sync {
    fn name(&self) -> &str;

    fn state(&self) -> State;

    fn send(&self, message: LogMessage) -> Result<()>;

    /// Drains and joins the sink's worker with its configured policy.
    fn stop(&self);
}

/// Runs a sink object on its own worker thread.
///
/// The wrapped object is only ever touched by that worker: messages passed
/// to [`send`](Sink::send) are handed to the default call bound at
/// construction, and [`invoke_async`](Sink::invoke_async) runs arbitrary
/// methods on it, both in submission order.
pub struct Sink<T: Send + 'static> {
    // declared first: the worker is drained and joined before the real sink drops
    bg: ActiveHandle,
    real_sink: Arc<Mutex<T>>,
    default_call: AsyncMessageCall<T>,
}

pub(crate) fn stopped(error: Errors) -> Errors {
    match error {
        Errors::Bgsink(BgsinkError::ClosedQueue) => BgsinkError::Stopped.into(),
        other => other,
    }
}

impl<T: Send + 'static> Sink<T> {
    /// Wraps a sink whose default call takes the structured message.
    pub fn new<F>(sink: T, call: F) -> Result<Self>
    where
        F: Fn(&mut T, LogMessage) + Send + Sync + 'static,
    {
        Self::with_config(sink, call, ActiveConfig::default())
    }

    pub fn with_config<F>(sink: T, call: F, config: ActiveConfig) -> Result<Self>
    where
        F: Fn(&mut T, LogMessage) + Send + Sync + 'static,
    {
        Ok(Sink {
            bg: ActiveHandle::start(config)?,
            real_sink: Arc::new(Mutex::new(sink)),
            default_call: Arc::new(call),
        })
    }

    /// Wraps a sink whose default call takes the message rendered as text.
    pub fn new_text<F>(sink: T, call: F) -> Result<Self>
    where
        F: Fn(&mut T, String) + Send + Sync + 'static,
    {
        Self::text_with_config(sink, call, ActiveConfig::default())
    }

    pub fn text_with_config<F>(sink: T, call: F, config: ActiveConfig) -> Result<Self>
    where
        F: Fn(&mut T, String) + Send + Sync + 'static,
    {
        Self::with_config(
            sink,
            move |real_sink: &mut T, message: LogMessage| call(real_sink, message.to_string()),
            config,
        )
    }

    pub fn name(&self) -> &str {
        self.bg.name()
    }

    pub fn state(&self) -> State {
        self.bg.state()
    }

    pub fn stats(&self) -> &WorkerStats {
        self.bg.stats()
    }

    /// Queues `message` for the default call. Fails only once the sink has
    /// stopped; errors raised while handling the message are reported on the
    /// worker and never reach the caller.
    pub fn send(&self, message: LogMessage) -> Result<()> {
        let real_sink = self.real_sink.clone();
        let call = self.default_call.clone();

        self.bg
            .post(move || call(&mut *real_sink.lock(), message))
            .map_err(stopped)
    }

    /// Queues `call` to run against the wrapped sink and returns a future
    /// for its result. Arguments are moved into the closure at call time.
    pub fn invoke_async<R, F>(&self, call: F) -> Result<CallFuture<R>>
    where
        F: FnOnce(&mut T) -> R + Send + 'static,
        R: Send + 'static,
    {
        let real_sink = self.real_sink.clone();

        self.bg
            .post_with_result(move || call(&mut *real_sink.lock()))
            .map_err(stopped)
    }

    /// Like [`invoke_async`](Sink::invoke_async) for fallible methods; an
    /// `Err` resolves the future to a failure carrying the error.
    pub fn try_invoke_async<R, E, F>(&self, call: F) -> Result<CallFuture<R>>
    where
        F: FnOnce(&mut T) -> std::result::Result<R, E> + Send + 'static,
        E: StdError + Send + Sync + 'static,
        R: Send + 'static,
    {
        let real_sink = self.real_sink.clone();

        self.bg
            .post_fallible(move || call(&mut *real_sink.lock()))
            .map_err(stopped)
    }

    pub fn stop(&self) {
        self.bg.stop();
    }

    pub fn stop_with(&self, policy: ShutdownPolicy) {
        self.bg.stop_with(policy);
    }

    /// Drains and stops the worker, then hands back the wrapped sink.
    pub fn into_inner(self) -> Option<T> {
        let Sink { bg, real_sink, .. } = self;
        bg.stop();
        drop(bg);

        match Arc::try_unwrap(real_sink) {
            Ok(real_sink) => Some(real_sink.into_inner()),
            Err(_) => {
                debug!("sink still referenced after its worker stopped");
                None
            }
        }
    }
}

impl<T: Send + 'static> SinkWrapper for Sink<T> {
    fn name(&self) -> &str {
        Sink::name(self)
    }

    fn state(&self) -> State {
        Sink::state(self)
    }

    fn send(&self, message: LogMessage) -> Result<()> {
        Sink::send(self, message)
    }

    fn stop(&self) {
        Sink::stop(self)
    }
}
