use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What a worker does with actions still queued when it is told to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownPolicy {
    /// Run everything queued before the stop signal, in order.
    #[default]
    Drain,
    /// Drop whatever has not started yet.
    Discard,
}

impl fmt::Display for ShutdownPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownPolicy::Drain => f.write_str("drain"),
            ShutdownPolicy::Discard => f.write_str("discard"),
        }
    }
}

impl FromStr for ShutdownPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "drain" => Ok(ShutdownPolicy::Drain),
            "discard" => Ok(ShutdownPolicy::Discard),
            other => Err(format!("unknown shutdown policy `{}`", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActiveConfig {
    /// Worker thread name, also attached to diagnostics.
    pub name: String,
    pub shutdown: ShutdownPolicy,
}

impl ActiveConfig {
    pub fn new(name: impl Into<String>) -> Self {
        ActiveConfig {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownPolicy) -> Self {
        self.shutdown = shutdown;
        self
    }
}

impl Default for ActiveConfig {
    fn default() -> Self {
        ActiveConfig {
            name: "bgsink-worker".to_string(),
            shutdown: ShutdownPolicy::Drain,
        }
    }
}

#[cfg(test)]
mod tests {
    use bson::{doc, Bson};

    use super::*;

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!("Drain".parse::<ShutdownPolicy>(), Ok(ShutdownPolicy::Drain));
        assert_eq!("discard".parse::<ShutdownPolicy>(), Ok(ShutdownPolicy::Discard));
        assert!("later".parse::<ShutdownPolicy>().is_err());
    }

    #[test]
    fn config_embeds_in_documents() {
        let config = ActiveConfig::new("file-sink").with_shutdown(ShutdownPolicy::Discard);

        let document = bson::to_document(&config).unwrap();
        assert_eq!(document.get("shutdown"), Some(&Bson::String("discard".into())));

        let partial: ActiveConfig = bson::from_document(doc! { "name": "console" }).unwrap();
        assert_eq!(partial.name, "console");
        assert_eq!(partial.shutdown, ShutdownPolicy::Drain);
    }
}
