use std::error::Error as StdError;
use std::sync::{Arc, Weak};

use crate::future::CallFuture;
use crate::sink::Sink;
use crate::{BgsinkError, Result};

/// Non-owning reference to a sink registered with a dispatcher.
///
/// Calls go through the sink's worker like
/// [`Sink::invoke_async`]; once the sink has been removed they fail with
/// [`BgsinkError::SinkRemoved`].
pub struct SinkHandle<T: Send + 'static> {
    sink: Weak<Sink<T>>,
}

impl<T: Send + 'static> SinkHandle<T> {
    pub fn new(sink: &Arc<Sink<T>>) -> Self {
        SinkHandle {
            sink: Arc::downgrade(sink),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.sink.strong_count() > 0
    }

    pub fn call<R, F>(&self, call: F) -> Result<CallFuture<R>>
    where
        F: FnOnce(&mut T) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.upgrade()?.invoke_async(call)
    }

    pub fn try_call<R, E, F>(&self, call: F) -> Result<CallFuture<R>>
    where
        F: FnOnce(&mut T) -> std::result::Result<R, E> + Send + 'static,
        E: StdError + Send + Sync + 'static,
        R: Send + 'static,
    {
        self.upgrade()?.try_invoke_async(call)
    }

    fn upgrade(&self) -> Result<Arc<Sink<T>>> {
        Ok(self.sink.upgrade().ok_or(BgsinkError::SinkRemoved)?)
    }
}

impl<T: Send + 'static> Clone for SinkHandle<T> {
    fn clone(&self) -> Self {
        SinkHandle {
            sink: self.sink.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Level, LogMessage};
    use crate::Errors;

    struct Counter(u32);

    impl Counter {
        fn bump(&mut self, message: LogMessage) {
            self.0 += message.text().len() as u32;
        }
    }

    #[test]
    fn handle_calls_the_live_sink() {
        let sink = Arc::new(Sink::new(Counter(0), Counter::bump).unwrap());
        let handle = SinkHandle::new(&sink);

        sink.send(LogMessage::new(Level::Info, "abc")).unwrap();

        assert!(handle.is_alive());
        assert_eq!(handle.call(|counter| counter.0).unwrap().wait().unwrap(), 3);
    }

    #[test]
    fn handle_fails_after_the_sink_is_gone() {
        let sink = Arc::new(Sink::new(Counter(0), Counter::bump).unwrap());
        let handle = SinkHandle::new(&sink);
        drop(sink);

        assert!(!handle.is_alive());
        assert!(matches!(
            handle.call(|counter| counter.0),
            Err(Errors::Bgsink(BgsinkError::SinkRemoved))
        ));
    }
}
