use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("unknown key category: {0}")]
    UnknownCategory(String),
    #[error("duplicate agent '{agent}' in category {category}")]
    DuplicateAgent { category: KeyCategory, agent: String },
    #[error("duplicate job id: {0}")]
    DuplicateJob(String),
    #[error("unknown channel: {0}")]
    UnknownChannel(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChannelKind {
    Inventory,
    Jobs,
    Events,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 3] = [ChannelKind::Inventory, ChannelKind::Jobs, ChannelKind::Events];

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelKind::Inventory => "inventory",
            ChannelKind::Jobs => "jobs",
            ChannelKind::Events => "events",
        }
    }

    pub fn is_streaming(self) -> bool {
        matches!(self, ChannelKind::Events)
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelKind {
    type Err = ModelError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "inventory" | "keys" => Ok(ChannelKind::Inventory),
            "jobs" => Ok(ChannelKind::Jobs),
            "events" => Ok(ChannelKind::Events),
            other => Err(ModelError::UnknownChannel(other.to_string())),
        }
    }
}

impl Serialize for ChannelKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ChannelKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Authorization state of a minion key. `Local` is the master's own key and
/// is never shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyCategory {
    Accepted,
    Pending,
    Rejected,
    Denied,
    Local,
}

impl KeyCategory {
    pub const ALL: [KeyCategory; 5] = [
        KeyCategory::Accepted,
        KeyCategory::Pending,
        KeyCategory::Rejected,
        KeyCategory::Denied,
        KeyCategory::Local,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            KeyCategory::Accepted => "accepted",
            KeyCategory::Pending => "pending",
            KeyCategory::Rejected => "rejected",
            KeyCategory::Denied => "denied",
            KeyCategory::Local => "local",
        }
    }

    pub fn salt_name(self) -> &'static str {
        match self {
            KeyCategory::Accepted => "minions",
            KeyCategory::Pending => "minions_pre",
            KeyCategory::Rejected => "minions_rejected",
            KeyCategory::Denied => "minions_denied",
            KeyCategory::Local => "local",
        }
    }

    pub fn is_displayed(self) -> bool {
        !matches!(self, KeyCategory::Local)
    }
}

impl fmt::Display for KeyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyCategory {
    type Err = ModelError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "accepted" | "minions" => Ok(KeyCategory::Accepted),
            "pending" | "unaccepted" | "minions_pre" => Ok(KeyCategory::Pending),
            "rejected" | "minions_rejected" => Ok(KeyCategory::Rejected),
            "denied" | "minions_denied" => Ok(KeyCategory::Denied),
            "local" => Ok(KeyCategory::Local),
            other => Err(ModelError::UnknownCategory(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, Vec<String>>",
    into = "BTreeMap<String, Vec<String>>"
)]
pub struct InventoryData {
    categories: BTreeMap<KeyCategory, Vec<String>>,
}

impl InventoryData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<I, S>(&mut self, category: KeyCategory, agents: I) -> Result<(), ModelError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self.categories.entry(category).or_default();
        let mut seen: HashSet<String> = entry.iter().cloned().collect();
        for agent in agents {
            let agent = agent.into();
            if !seen.insert(agent.clone()) {
                return Err(ModelError::DuplicateAgent { category, agent });
            }
            entry.push(agent);
        }
        Ok(())
    }

    pub fn agents(&self, category: KeyCategory) -> &[String] {
        self.categories
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (KeyCategory, &[String])> {
        self.categories
            .iter()
            .map(|(category, agents)| (*category, agents.as_slice()))
    }

    /// Every (category, agent) pair that belongs on screen, in category
    /// order and then in the order the source listed the agents.
    pub fn displayed(&self) -> impl Iterator<Item = (KeyCategory, &str)> {
        self.iter()
            .filter(|(category, _)| category.is_displayed())
            .flat_map(|(category, agents)| agents.iter().map(move |agent| (category, agent.as_str())))
    }

    pub fn displayed_len(&self) -> usize {
        self.displayed().count()
    }
}

impl TryFrom<BTreeMap<String, Vec<String>>> for InventoryData {
    type Error = ModelError;

    fn try_from(raw: BTreeMap<String, Vec<String>>) -> Result<Self, Self::Error> {
        let mut inventory = InventoryData::new();
        for (name, agents) in raw {
            let category = name.parse::<KeyCategory>()?;
            inventory.insert(category, agents)?;
        }
        Ok(inventory)
    }
}

impl From<InventoryData> for BTreeMap<String, Vec<String>> {
    fn from(inventory: InventoryData) -> Self {
        inventory
            .categories
            .into_iter()
            .map(|(category, agents)| (category.as_str().to_string(), agents))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub target: String,
    pub function: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEntry {
    pub jid: String,
    #[serde(flatten)]
    pub record: JobRecord,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<JobEntry>", into = "Vec<JobEntry>")]
pub struct JobData {
    jobs: Vec<JobEntry>,
}

impl JobData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, jid: impl Into<String>, record: JobRecord) -> Result<(), ModelError> {
        let jid = jid.into();
        if self.jobs.iter().any(|entry| entry.jid == jid) {
            return Err(ModelError::DuplicateJob(jid));
        }
        self.jobs.push(JobEntry { jid, record });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &JobEntry> {
        self.jobs.iter()
    }
}

impl TryFrom<Vec<JobEntry>> for JobData {
    type Error = ModelError;

    fn try_from(entries: Vec<JobEntry>) -> Result<Self, Self::Error> {
        let mut seen = HashSet::new();
        for entry in &entries {
            if !seen.insert(entry.jid.as_str()) {
                return Err(ModelError::DuplicateJob(entry.jid.clone()));
            }
        }
        Ok(Self { jobs: entries })
    }
}

impl From<JobData> for Vec<JobEntry> {
    fn from(data: JobData) -> Self {
        data.jobs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    Job,
    Return,
    Run,
    Auth,
    Key,
    Presence,
    Other,
}

impl EventCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            EventCategory::Job => "job",
            EventCategory::Return => "return",
            EventCategory::Run => "run",
            EventCategory::Auth => "auth",
            EventCategory::Key => "key",
            EventCategory::Presence => "presence",
            EventCategory::Other => "other",
        }
    }

    pub fn from_tag(tag: &str) -> Self {
        if let Some(rest) = tag.strip_prefix("salt/job/") {
            if rest.contains("/ret/") {
                return EventCategory::Return;
            }
            return EventCategory::Job;
        }
        if tag.starts_with("salt/run/") {
            return EventCategory::Run;
        }
        if tag == "salt/auth" {
            return EventCategory::Auth;
        }
        if tag.starts_with("salt/key") {
            return EventCategory::Key;
        }
        if tag == "minion_start"
            || tag.starts_with("salt/presence/")
            || (tag.starts_with("salt/minion/") && tag.ends_with("/start"))
        {
            return EventCategory::Presence;
        }
        EventCategory::Other
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    pub tag: String,
    #[serde(default)]
    pub data: Value,
}

impl EventData {
    pub fn new(tag: impl Into<String>, data: Value) -> Self {
        Self {
            tag: tag.into(),
            data,
        }
    }

    pub fn category(&self) -> EventCategory {
        EventCategory::from_tag(&self.tag)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub channel: ChannelKind,
    pub message: String,
}
