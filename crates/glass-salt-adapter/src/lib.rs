mod demo;
mod salt;

pub use demo::{DemoSettings, DemoSource};
pub use salt::{parse_event_line, parse_job_listing, parse_key_listing, SaltCliSource, SaltSettings};

use glass_core::{EventData, InventoryData, JobData};
use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },
    #[error("unexpected {what} output: {message}")]
    Parse { what: &'static str, message: String },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("event subscription ended")]
    SubscriptionEnded,
}

pub type EventStream = Box<dyn Iterator<Item = Result<EventData, SourceError>> + Send>;

/// Blocking access to the control plane. Implementations are only ever
/// called from a worker process, never from the UI loop.
pub trait DataSource {
    fn fetch_inventory(&self) -> Result<InventoryData, SourceError>;
    fn fetch_jobs(&self) -> Result<JobData, SourceError>;
    /// Lazy and effectively infinite. The iterator ending, or yielding an
    /// error, means the subscription is gone.
    fn subscribe_events(&self) -> Result<EventStream, SourceError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSettings {
    Salt(SaltSettings),
    Demo(DemoSettings),
}

impl Default for SourceSettings {
    fn default() -> Self {
        SourceSettings::Salt(SaltSettings::default())
    }
}

impl SourceSettings {
    pub fn label(&self) -> &'static str {
        match self {
            SourceSettings::Salt(_) => "salt",
            SourceSettings::Demo(_) => "demo",
        }
    }
}

pub fn open_source(settings: &SourceSettings) -> Box<dyn DataSource + Send> {
    match settings {
        SourceSettings::Salt(salt) => Box::new(SaltCliSource::new(salt.clone())),
        SourceSettings::Demo(demo) => Box::new(DemoSource::new(demo.clone())),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    #[serde(default)]
    pub tag_prefixes: Vec<String>,
}

impl EventFilter {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tag_prefixes = prefixes
            .into_iter()
            .map(|prefix| prefix.as_ref().trim().to_string())
            .filter(|prefix| !prefix.is_empty())
            .collect();
        Self { tag_prefixes }
    }

    pub fn is_open(&self) -> bool {
        self.tag_prefixes.is_empty()
    }

    pub fn matches(&self, tag: &str) -> bool {
        self.is_open()
            || self
                .tag_prefixes
                .iter()
                .any(|prefix| tag.starts_with(prefix.as_str()))
    }
}

pub(crate) fn ellipsize(input: &str, max: usize) -> String {
    let trimmed = input.trim();
    if trimmed.chars().count() <= max {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(max.saturating_sub(3)).collect();
    out.push_str("...");
    out
}
