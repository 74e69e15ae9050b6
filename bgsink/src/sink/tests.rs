use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use crate::active::State;
use crate::config::ActiveConfig;
use crate::future::ActionError;
use crate::message::{Level, LogMessage};
use crate::sink::Sink;
use crate::{BgsinkError, Errors};

#[derive(Default)]
struct Recorder {
    messages: Vec<String>,
    threads: Vec<Option<String>>,
    events: Option<Arc<Mutex<Vec<&'static str>>>>,
}

#[derive(Debug, thiserror::Error)]
#[error("recorder is full")]
struct RecorderFull;

impl Recorder {
    fn with_events(events: Arc<Mutex<Vec<&'static str>>>) -> Self {
        // Recorder implements Drop, so no struct-update syntax
        let mut recorder = Recorder::default();
        recorder.events = Some(events);
        recorder
    }

    fn receive(&mut self, message: LogMessage) {
        if message.text() == "poison" {
            panic!("poisoned message");
        }

        self.messages.push(message.text().to_string());
        self.threads.push(thread::current().name().map(str::to_string));
        if let Some(events) = &self.events {
            events.lock().push("message");
        }
    }

    fn receive_text(&mut self, line: String) {
        self.messages.push(line);
    }

    fn reserve(&mut self, limit: usize) -> Result<usize, RecorderFull> {
        if self.messages.len() >= limit {
            return Err(RecorderFull);
        }
        Ok(limit - self.messages.len())
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Some(events) = &self.events {
            events.lock().push("dropped");
        }
    }
}

fn message(text: impl Into<String>) -> LogMessage {
    LogMessage::new(Level::Info, text)
}

#[test]
fn sink_drains_before_it_is_destroyed() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Sink::new(Recorder::with_events(events.clone()), Recorder::receive).unwrap();

    for i in 0..1_000 {
        sink.send(message(i.to_string())).unwrap();
    }
    drop(sink);

    let events = events.lock();
    assert_eq!(events.len(), 1_001);
    assert_eq!(events.iter().filter(|e| **e == "message").count(), 1_000);
    assert_eq!(events.last(), Some(&"dropped"));
}

#[test]
fn text_sink_receives_rendered_messages() {
    let sink = Sink::new_text(Recorder::default(), Recorder::receive_text).unwrap();
    let sent = message("plain").at("main.rs", 7).with_timestamp_ms(11);

    sink.send(sent.clone()).unwrap();
    let lines = sink.invoke_async(|recorder| recorder.messages.clone()).unwrap();

    assert_eq!(lines.wait().unwrap(), vec![sent.to_string()]);
}

#[test]
fn sends_and_calls_share_one_order() {
    let sink = Sink::new(Recorder::default(), Recorder::receive).unwrap();
    let mut counts = Vec::new();

    for i in 0..100 {
        sink.send(message(i.to_string())).unwrap();
        counts.push(sink.invoke_async(|recorder| recorder.messages.len()).unwrap());
    }

    for (i, count) in counts.into_iter().enumerate() {
        assert_eq!(count.wait().unwrap(), i + 1);
    }
    let recorder = sink.into_inner().unwrap();
    let expected: Vec<String> = (0..100).map(|i| i.to_string()).collect();
    assert_eq!(recorder.messages, expected);
}

#[test]
fn invoke_async_moves_arguments_into_the_call() {
    let sink = Sink::new(Recorder::default(), Recorder::receive).unwrap();
    let extra = vec!["a".to_string(), "b".to_string()];

    let total = sink
        .invoke_async(move |recorder| {
            recorder.messages.extend(extra);
            recorder.messages.len()
        })
        .unwrap();

    assert_eq!(total.get().unwrap(), 2);
    assert_eq!(total.get().unwrap(), 2);
}

#[test]
fn failed_call_carries_the_error() {
    let sink = Sink::new(Recorder::default(), Recorder::receive).unwrap();
    sink.send(message("one")).unwrap();

    let room = sink.try_invoke_async(|recorder| recorder.reserve(1)).unwrap();
    let error = room.get().unwrap_err();

    assert!(matches!(error, ActionError::Failed(_)));
    assert!(error.downcast_ref::<RecorderFull>().is_some());
    assert_eq!(room.get().unwrap_err().to_string(), error.to_string());
    assert_eq!(sink.try_invoke_async(|recorder| recorder.reserve(3)).unwrap().wait().unwrap(), 2);
}

#[test]
fn failing_message_does_not_stop_the_sink() {
    let sink = Sink::new(Recorder::default(), Recorder::receive).unwrap();

    sink.send(message("before")).unwrap();
    sink.send(message("poison")).unwrap();
    sink.send(message("after")).unwrap();

    let messages = sink.invoke_async(|recorder| recorder.messages.clone()).unwrap();
    assert_eq!(messages.wait().unwrap(), vec!["before", "after"]);
    assert_eq!(sink.stats().failed(), 1);
}

#[test]
fn stopped_sink_rejects_submissions() {
    let sink = Sink::new(Recorder::default(), Recorder::receive).unwrap();

    sink.stop();
    sink.stop();

    assert_eq!(sink.state(), State::Stopped);
    assert!(matches!(
        sink.send(message("late")),
        Err(Errors::Bgsink(BgsinkError::Stopped))
    ));
    assert!(matches!(
        sink.invoke_async(|recorder| recorder.messages.len()),
        Err(Errors::Bgsink(BgsinkError::Stopped))
    ));
}

#[test]
fn sinks_only_run_on_their_own_worker() {
    let left = Arc::new(
        Sink::with_config(Recorder::default(), Recorder::receive, ActiveConfig::new("left")).unwrap(),
    );
    let right = Arc::new(
        Sink::with_config(Recorder::default(), Recorder::receive, ActiveConfig::new("right")).unwrap(),
    );

    let producers: Vec<_> = (0..4)
        .map(|p| {
            let left = left.clone();
            let right = right.clone();
            thread::spawn(move || {
                for i in 0..500 {
                    left.send(message(format!("{}-{}", p, i))).unwrap();
                    right.send(message(format!("{}-{}", p, i))).unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    for (sink, name) in [(left, "left"), (right, "right")] {
        let recorder = Arc::try_unwrap(sink).ok().unwrap().into_inner().unwrap();
        assert_eq!(recorder.messages.len(), 2_000);
        assert!(recorder.threads.iter().all(|thread| thread.as_deref() == Some(name)));
    }
}
