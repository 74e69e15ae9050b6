use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::active::{ActiveHandle, State};
use crate::config::ActiveConfig;
use crate::future::CallFuture;
use crate::handle::SinkHandle;
use crate::message::LogMessage;
use crate::sink::{stopped, Sink, SinkWrapper};
use crate::{BgsinkError, Result};

type Sinks = Arc<DashMap<String, Arc<dyn SinkWrapper>>>;

/*
The dispatcher has its own worker. `save` only queues the message there;
the dispatcher's worker then hands it to every registered sink, whose own
workers do the actual writing.
 */

pub struct Dispatcher {
    bg: ActiveHandle,
    sinks: Sinks,
    messages_saved: Arc<AtomicU64>,
}

impl Dispatcher {
    pub fn new() -> Result<Dispatcher> {
        Self::with_config(ActiveConfig::new("bgsink-dispatcher"))
    }

    pub fn with_config(config: ActiveConfig) -> Result<Dispatcher> {
        Ok(Dispatcher {
            bg: ActiveHandle::start(config)?,
            sinks: Arc::new(DashMap::new()),
            messages_saved: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Registers `sink` under its worker name and returns a handle for
    /// calling into it.
    pub fn add_sink<T: Send + 'static>(&self, sink: Sink<T>) -> Result<SinkHandle<T>> {
        let name = sink.name().to_string();

        match self.sinks.entry(name) {
            Entry::Occupied(entry) => {
                Err(BgsinkError::SinkAlreadyExists(entry.key().clone()).into())
            }
            Entry::Vacant(entry) => {
                debug!(sink = %entry.key(), "adding sink");
                let sink = Arc::new(sink);
                let handle = SinkHandle::new(&sink);
                entry.insert(sink);
                Ok(handle)
            }
        }
    }

    /// Removes a sink after every message saved before this call has been
    /// handed to it. The sink drains its own queue before this returns, even
    /// while a [`SinkHandle`] call still holds a reference to it; such a call
    /// then fails with `Stopped`.
    ///
    /// Must not be called from an action running on the dispatcher's worker.
    pub fn remove_sink(&self, name: &str) -> Result<()> {
        let sinks = self.sinks.clone();
        let key = name.to_string();

        let removed = self
            .bg
            .post_with_result(move || sinks.remove(&key).map(|(_, sink)| sink))
            .map_err(stopped)?
            .wait()?;

        match removed {
            Some(sink) => {
                debug!(sink = %name, "removing sink");
                sink.stop();
                Ok(())
            }
            None => Err(BgsinkError::SinkDoesNotExist(name.to_string()).into()),
        }
    }

    pub fn remove_all_sinks(&self) -> Result<()> {
        let sinks = self.sinks.clone();

        let removed = self
            .bg
            .post_with_result(move || {
                let names: Vec<String> = sinks.iter().map(|entry| entry.key().clone()).collect();
                names
                    .into_iter()
                    .filter_map(|name| sinks.remove(&name).map(|(_, sink)| sink))
                    .collect::<Vec<_>>()
            })
            .map_err(stopped)?
            .wait()?;

        debug!(count = removed.len(), "removing all sinks");
        for sink in &removed {
            sink.stop();
        }
        Ok(())
    }

    pub fn sink_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sinks.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// Queues `message` for every registered sink.
    pub fn save(&self, message: LogMessage) -> Result<()> {
        let sinks = self.sinks.clone();

        self.bg
            .post(move || {
                for entry in sinks.iter() {
                    if let Err(error) = entry.value().send(message.clone()) {
                        warn!(sink = %entry.key(), %error, "sink rejected message");
                    }
                }
            })
            .map_err(stopped)?;

        self.messages_saved.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Resolves once every message saved before this call has been handed
    /// to the sinks' queues.
    pub fn barrier(&self) -> Result<CallFuture<()>> {
        self.bg.post_with_result(|| ()).map_err(stopped)
    }

    pub fn messages_saved(&self) -> u64 {
        self.messages_saved.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> State {
        self.bg.state()
    }

    /// Stops the dispatcher's worker, then every registered sink. Later
    /// calls fail with `Stopped`. Idempotent.
    pub fn stop(&self) {
        self.bg.stop();

        let names: Vec<String> = self.sinks.iter().map(|entry| entry.key().clone()).collect();
        for name in names {
            if let Some((_, sink)) = self.sinks.remove(&name) {
                sink.stop();
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
