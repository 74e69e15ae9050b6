use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Debug,
    Info,
    Warning,
    Fatal,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Fatal => "FATAL",
        })
    }
}

/// A single log entry.
///
/// Sinks either take it as is (structured) or through its `Display`
/// rendering (plain text).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMessage {
    level: Level,
    timestamp_ms: i64,
    file: String,
    line: u32,
    text: String,
    fields: Document,
}

impl LogMessage {
    pub fn new(level: Level, text: impl Into<String>) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as i64)
            .unwrap_or_default();

        LogMessage {
            level,
            timestamp_ms,
            file: String::new(),
            line: 0,
            text: text.into(),
            fields: Document::new(),
        }
    }

    pub fn at(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = file.into();
        self.line = line;
        self
    }

    pub fn with_timestamp_ms(mut self, timestamp_ms: i64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.fields.insert(key, value);
        self
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn fields(&self) -> &Document {
        &self.fields
    }

    pub fn to_document(&self) -> Result<Document> {
        Ok(bson::to_document(self)?)
    }
}

impl fmt::Display for LogMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:<7}", self.timestamp_ms, self.level)?;
        if !self.file.is_empty() {
            write!(f, " [{}:{}]", self.file, self.line)?;
        }
        write!(f, " {}", self.text)?;
        if !self.fields.is_empty() {
            write!(f, " {}", self.fields)?;
        }
        Ok(())
    }
}

/// Builds a [`LogMessage`] stamped with the caller's file and line.
#[macro_export]
macro_rules! log_message {
    ($level:expr, $($arg:tt)+) => {
        $crate::message::LogMessage::new($level, format!($($arg)+)).at(file!(), line!())
    };
}
