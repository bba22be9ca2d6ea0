use crate::{ellipsize, DataSource, EventStream, SourceError};
use glass_core::{EventData, InventoryData, JobData, JobRecord, KeyCategory};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{BufRead, BufReader, Lines};
use std::path::PathBuf;
use std::process::{Child, ChildStdout, Command, Stdio};
use tracing::{debug, warn};

const STDERR_EXCERPT_CHARS: usize = 240;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaltSettings {
    pub config_dir: PathBuf,
    pub salt_key_bin: String,
    pub salt_run_bin: String,
}

impl Default for SaltSettings {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from("/etc/salt"),
            salt_key_bin: "salt-key".to_string(),
            salt_run_bin: "salt-run".to_string(),
        }
    }
}

/// Wheel and runner calls through the Salt command line tools.
pub struct SaltCliSource {
    settings: SaltSettings,
}

impl SaltCliSource {
    pub fn new(settings: SaltSettings) -> Self {
        Self { settings }
    }

    fn config_dir(&self) -> String {
        self.settings.config_dir.to_string_lossy().to_string()
    }
}

impl DataSource for SaltCliSource {
    fn fetch_inventory(&self) -> Result<InventoryData, SourceError> {
        let config_dir = self.config_dir();
        let output = run_salt(
            &self.settings.salt_key_bin,
            &["-c", &config_dir, "--list=all", "--out=json"],
        )?;
        parse_key_listing(&output)
    }

    fn fetch_jobs(&self) -> Result<JobData, SourceError> {
        let config_dir = self.config_dir();
        let output = run_salt(
            &self.settings.salt_run_bin,
            &["-c", &config_dir, "--out=json", "jobs.list_jobs"],
        )?;
        parse_job_listing(&output)
    }

    fn subscribe_events(&self) -> Result<EventStream, SourceError> {
        let program = self.settings.salt_run_bin.clone();
        let mut child = Command::new(&program)
            .args(["-c", &self.config_dir(), "state.event", "pretty=False"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| SourceError::Spawn {
                program: program.clone(),
                source,
            })?;
        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(SourceError::Parse {
                what: "state.event",
                message: "child stdout was not captured".to_string(),
            });
        };
        debug!(event = "salt_event_subscribed", program = %program, pid = child.id());
        Ok(Box::new(SaltEventStream {
            child,
            lines: BufReader::new(stdout).lines(),
        }))
    }
}

struct SaltEventStream {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
}

impl Iterator for SaltEventStream {
    type Item = Result<EventData, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.lines.next()? {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => return Some(Ok(parse_event_line(&line))),
                Err(err) => return Some(Err(SourceError::Io(err))),
            }
        }
    }
}

impl Drop for SaltEventStream {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn run_salt(program: &str, args: &[&str]) -> Result<String, SourceError> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|source| SourceError::Spawn {
            program: program.to_string(),
            source,
        })?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SourceError::CommandFailed {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr: ellipsize(&stderr, STDERR_EXCERPT_CHARS),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

fn parse_json_object(raw: &str, what: &'static str) -> Result<serde_json::Map<String, Value>, SourceError> {
    let value: Value = serde_json::from_str(raw.trim()).map_err(|err| SourceError::Parse {
        what,
        message: err.to_string(),
    })?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(SourceError::Parse {
            what,
            message: format!("expected an object, got {}", json_kind(&other)),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// `salt-key --out=json` output. Unknown sections are skipped so a newer
/// master does not blank the whole pane.
pub fn parse_key_listing(raw: &str) -> Result<InventoryData, SourceError> {
    let listing = parse_json_object(raw, "key listing")?;
    let mut inventory = InventoryData::new();
    for (section, agents) in listing {
        let category = match section.parse::<KeyCategory>() {
            Ok(category) => category,
            Err(err) => {
                warn!(event = "salt_key_section_skipped", section = %section, error = %err);
                continue;
            }
        };
        let Value::Array(agents) = agents else {
            return Err(SourceError::Parse {
                what: "key listing",
                message: format!("section {section} is not a list"),
            });
        };
        let names = agents
            .iter()
            .filter_map(|agent| agent.as_str().map(str::to_string));
        inventory
            .insert(category, names)
            .map_err(|err| SourceError::Parse {
                what: "key listing",
                message: err.to_string(),
            })?;
    }
    Ok(inventory)
}

/// `salt-run jobs.list_jobs --out=json` output, keyed by jid.
pub fn parse_job_listing(raw: &str) -> Result<JobData, SourceError> {
    let listing = parse_json_object(raw, "job listing")?;
    let mut jobs = JobData::new();
    for (jid, entry) in listing {
        let Value::Object(entry) = entry else {
            warn!(event = "salt_job_entry_skipped", jid = %jid);
            continue;
        };
        let record = JobRecord {
            target: target_string(entry.get("Target")),
            function: entry
                .get("Function")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            user: entry.get("User").and_then(Value::as_str).map(str::to_string),
            start_time: entry
                .get("StartTime")
                .and_then(Value::as_str)
                .map(str::to_string),
        };
        jobs.push(jid, record).map_err(|err| SourceError::Parse {
            what: "job listing",
            message: err.to_string(),
        })?;
    }
    Ok(jobs)
}

fn target_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(target)) => target.clone(),
        Some(Value::Array(targets)) => targets
            .iter()
            .map(|target| match target {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(","),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// One `state.event pretty=False` line: `<tag>\t<json body>`.
pub fn parse_event_line(line: &str) -> EventData {
    let line = line.trim_end_matches(&['\r', '\n'][..]);
    match line.split_once('\t') {
        Some((tag, body)) => {
            let body = body.trim();
            let data = serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()));
            EventData::new(tag.trim(), data)
        }
        None => EventData::new(line.trim(), Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_listing_maps_salt_sections() {
        let inventory = parse_key_listing(
            r#"{
                "local": ["master.pem", "master.pub"],
                "minions": ["web-01", "web-02"],
                "minions_denied": [],
                "minions_pre": ["new-01"],
                "minions_rejected": ["old-01"],
                "minions_autosign": ["ignored"]
            }"#,
        )
        .expect("parse listing");

        assert_eq!(inventory.agents(KeyCategory::Accepted), ["web-01", "web-02"]);
        assert_eq!(inventory.agents(KeyCategory::Pending), ["new-01"]);
        assert_eq!(inventory.agents(KeyCategory::Rejected), ["old-01"]);
        assert_eq!(inventory.displayed_len(), 4);
    }

    #[test]
    fn key_listing_rejects_non_objects_and_bad_sections() {
        assert!(matches!(
            parse_key_listing("[]"),
            Err(SourceError::Parse { .. })
        ));
        assert!(matches!(
            parse_key_listing(r#"{"minions": "web-01"}"#),
            Err(SourceError::Parse { .. })
        ));
        assert!(parse_key_listing("not json").is_err());
    }

    #[test]
    fn job_listing_reads_function_target_and_metadata() {
        let jobs = parse_job_listing(
            r#"{
                "20261019120000000001": {"Function": "test.ping", "Target": "*", "User": "root", "StartTime": "2026, Oct 19 12:00:00.000000"},
                "20261019120500000002": {"Function": "state.apply", "Target": ["web-01", "web-02"], "Arguments": []}
            }"#,
        )
        .expect("parse jobs");

        let entries: Vec<_> = jobs.iter().collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].record.function, "test.ping");
        assert_eq!(entries[0].record.user.as_deref(), Some("root"));
        assert_eq!(entries[1].record.target, "web-01,web-02");
        assert_eq!(entries[1].record.start_time, None);
    }

    #[test]
    fn job_listing_keeps_the_runner_order() {
        let jobs = parse_job_listing(
            r#"{"20261019130000000009": {"Function": "cmd.run", "Target": "db*"},
                "20261019120000000001": {"Function": "test.ping", "Target": "*"}}"#,
        )
        .expect("parse jobs");
        let jids: Vec<&str> = jobs.iter().map(|entry| entry.jid.as_str()).collect();
        assert_eq!(jids, ["20261019130000000009", "20261019120000000001"]);
    }

    #[test]
    fn empty_job_listing_is_empty() {
        let jobs = parse_job_listing("{}\n").expect("parse empty");
        assert!(jobs.is_empty());
    }

    #[test]
    fn event_lines_split_tag_and_body() {
        let event = parse_event_line("salt/auth\t{\"id\": \"web-01\", \"act\": \"accept\"}\n");
        assert_eq!(event.tag, "salt/auth");
        assert_eq!(event.data, json!({"id": "web-01", "act": "accept"}));

        let raw = parse_event_line("custom/tag\tnot json");
        assert_eq!(raw.data, Value::String("not json".to_string()));

        let bare = parse_event_line("minion_start");
        assert_eq!(bare.tag, "minion_start");
        assert!(bare.data.is_null());
    }

    #[cfg(unix)]
    mod cli {
        use super::super::*;
        use std::fs;
        use std::os::unix::fs::PermissionsExt;
        use std::path::Path;

        fn fake_binary(dir: &Path, name: &str, script: &str) -> String {
            let path = dir.join(name);
            fs::write(&path, format!("#!/bin/sh\n{script}\n")).expect("write script");
            let mut perms = fs::metadata(&path).expect("metadata").permissions();
            perms.set_mode(0o755);
            fs::set_permissions(&path, perms).expect("chmod");
            path.to_string_lossy().to_string()
        }

        fn settings(dir: &Path, key_script: &str, run_script: &str) -> SaltSettings {
            SaltSettings {
                config_dir: dir.to_path_buf(),
                salt_key_bin: fake_binary(dir, "salt-key", key_script),
                salt_run_bin: fake_binary(dir, "salt-run", run_script),
            }
        }

        #[test]
        fn inventory_comes_from_salt_key() {
            let dir = tempfile::tempdir().expect("tempdir");
            let source = SaltCliSource::new(settings(
                dir.path(),
                r#"echo '{"minions": ["m1", "m2"], "local": ["master"], "minions_rejected": ["m3"]}'"#,
                "exit 0",
            ));
            let inventory = source.fetch_inventory().expect("inventory");
            let agents: Vec<&str> = inventory.displayed().map(|(_, agent)| agent).collect();
            assert_eq!(agents, ["m1", "m2", "m3"]);
        }

        #[test]
        fn failing_runner_surfaces_status_and_stderr() {
            let dir = tempfile::tempdir().expect("tempdir");
            let source = SaltCliSource::new(settings(
                dir.path(),
                "exit 0",
                "echo 'master unreachable' >&2; exit 3",
            ));
            match source.fetch_jobs() {
                Err(SourceError::CommandFailed { stderr, .. }) => {
                    assert_eq!(stderr, "master unreachable");
                }
                other => panic!("unexpected result: {other:?}"),
            }
        }

        #[test]
        fn missing_binary_is_a_spawn_error() {
            let source = SaltCliSource::new(SaltSettings {
                salt_key_bin: "/nonexistent/salt-key".to_string(),
                ..SaltSettings::default()
            });
            assert!(matches!(
                source.fetch_inventory(),
                Err(SourceError::Spawn { .. })
            ));
        }

        #[test]
        fn event_stream_ends_when_the_runner_exits() {
            let dir = tempfile::tempdir().expect("tempdir");
            let source = SaltCliSource::new(settings(
                dir.path(),
                "exit 0",
                r#"printf 'salt/auth\t{"id": "m1"}\n\nminion_start\t{"id": "m2"}\n'"#,
            ));
            let events: Vec<EventData> = source
                .subscribe_events()
                .expect("subscribe")
                .collect::<Result<_, _>>()
                .expect("events");
            let tags: Vec<&str> = events.iter().map(|event| event.tag.as_str()).collect();
            assert_eq!(tags, ["salt/auth", "minion_start"]);
        }
    }
}
