use crate::{DataSource, EventStream, SourceError};
use chrono::Utc;
use glass_core::{EventData, InventoryData, JobData, JobRecord, KeyCategory};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::thread;
use std::time::Duration;

const DEMO_FUNCTIONS: [&str; 5] = ["test.ping", "state.apply", "cmd.run", "pkg.upgrade", "grains.items"];
const DEMO_TARGETS: [&str; 4] = ["*", "web*", "minion-01", "G@os:Debian"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoSettings {
    pub minions: usize,
    pub jobs: usize,
    pub event_interval_ms: u64,
    pub event_limit: Option<u64>,
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            minions: 8,
            jobs: 5,
            event_interval_ms: 750,
            event_limit: None,
        }
    }
}

/// Synthetic control plane for running the dashboard without a master.
pub struct DemoSource {
    settings: DemoSettings,
    jid_base: String,
}

impl DemoSource {
    pub fn new(settings: DemoSettings) -> Self {
        Self {
            settings,
            jid_base: Utc::now().format("%Y%m%d%H%M%S").to_string(),
        }
    }
}

fn minion_name(index: usize) -> String {
    format!("minion-{:02}", index + 1)
}

fn demo_category(index: usize) -> KeyCategory {
    match index % 8 {
        5 => KeyCategory::Pending,
        6 => KeyCategory::Rejected,
        7 => KeyCategory::Denied,
        _ => KeyCategory::Accepted,
    }
}

impl DataSource for DemoSource {
    fn fetch_inventory(&self) -> Result<InventoryData, SourceError> {
        let mut inventory = InventoryData::new();
        for category in KeyCategory::ALL {
            let names = (0..self.settings.minions)
                .filter(|index| demo_category(*index) == category)
                .map(minion_name);
            inventory
                .insert(category, names)
                .map_err(|err| SourceError::Parse {
                    what: "demo inventory",
                    message: err.to_string(),
                })?;
        }
        inventory
            .insert(KeyCategory::Local, ["master"])
            .map_err(|err| SourceError::Parse {
                what: "demo inventory",
                message: err.to_string(),
            })?;
        Ok(inventory)
    }

    fn fetch_jobs(&self) -> Result<JobData, SourceError> {
        let mut jobs = JobData::new();
        for index in 0..self.settings.jobs {
            let record = JobRecord {
                target: DEMO_TARGETS[index % DEMO_TARGETS.len()].to_string(),
                function: DEMO_FUNCTIONS[index % DEMO_FUNCTIONS.len()].to_string(),
                user: Some("root".to_string()),
                start_time: None,
            };
            jobs.push(format!("{}{index:06}", self.jid_base), record)
                .map_err(|err| SourceError::Parse {
                    what: "demo jobs",
                    message: err.to_string(),
                })?;
        }
        Ok(jobs)
    }

    fn subscribe_events(&self) -> Result<EventStream, SourceError> {
        Ok(Box::new(DemoEvents {
            settings: self.settings.clone(),
            jid_base: self.jid_base.clone(),
            seq: 0,
        }))
    }
}

struct DemoEvents {
    settings: DemoSettings,
    jid_base: String,
    seq: u64,
}

impl DemoEvents {
    fn event(&self) -> EventData {
        let minions = self.settings.minions.max(1);
        let minion = minion_name(self.seq as usize % minions);
        let jid = format!("{}{:06}", self.jid_base, 500_000 + self.seq / 4);
        let function = DEMO_FUNCTIONS[(self.seq as usize / 4) % DEMO_FUNCTIONS.len()];
        match self.seq % 4 {
            0 => EventData::new(
                format!("salt/job/{jid}/new"),
                json!({"jid": jid, "fun": function, "tgt": "*", "user": "root"}),
            ),
            1 => EventData::new(
                format!("salt/job/{jid}/ret/{minion}"),
                json!({"jid": jid, "fun": function, "id": minion, "success": true, "retcode": 0}),
            ),
            2 => EventData::new("salt/auth", json!({"id": minion, "act": "accept", "result": true})),
            _ => EventData::new(
                format!("salt/minion/{minion}/start"),
                json!({"id": minion, "data": format!("Minion {minion} started")}),
            ),
        }
    }
}

impl Iterator for DemoEvents {
    type Item = Result<EventData, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(limit) = self.settings.event_limit {
            if self.seq >= limit {
                return None;
            }
        }
        if self.seq > 0 && self.settings.event_interval_ms > 0 {
            thread::sleep(Duration::from_millis(self.settings.event_interval_ms));
        }
        let event = self.event();
        self.seq += 1;
        Some(Ok(event))
    }
}
