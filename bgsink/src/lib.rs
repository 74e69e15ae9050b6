//! Background sinks: wrap any `Send` object so that it is driven by its own
//! worker thread.
//!
//! A [`Sink`] accepts fire-and-forget messages through
//! [`send`](Sink::send) and arbitrary method calls through
//! [`invoke_async`](Sink::invoke_async), executing both one at a time in
//! submission order. Dropping a sink drains its queue before the wrapped
//! object is dropped.
use std::result;

pub mod active;
pub mod config;
pub mod dispatcher;
pub mod future;
pub mod handle;
pub mod message;
pub mod sink;
pub mod sinks;

pub use active::{ActiveHandle, State, WorkerStats};
pub use config::{ActiveConfig, ShutdownPolicy};
pub use dispatcher::Dispatcher;
pub use future::{ActionError, CallFuture};
pub use handle::SinkHandle;
pub use message::{Level, LogMessage};
pub use sink::{Sink, SinkWrapper};

#[derive(Debug, thiserror::Error)]
pub enum BgsinkError {
    #[error("queue is closed")]
    ClosedQueue,
    #[error("sink is stopped")]
    Stopped,
    #[error("sink `{0}` already exists")]
    SinkAlreadyExists(String),
    #[error("sink `{0}` does not exist")]
    SinkDoesNotExist(String),
    #[error("sink was removed")]
    SinkRemoved,
}

pub type Result<T, E = Errors> = result::Result<T, E>;
#[derive(Debug, thiserror::Error)]
pub enum Errors {
    #[error(transparent)]
    Bgsink(#[from] BgsinkError),
    #[error(transparent)]
    Action(#[from] ActionError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    BsonSerialize(#[from] bson::ser::Error),
}
