use crate::config::KeySpec;
use crate::pipe::PipeEvent;
use chrono::{DateTime, Local};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use glass_core::frame::{DecodeReport, FrameMsg, NdjsonFrameDecoder, PipeFrame, CURRENT_FRAME_VERSION};
use glass_core::{
    ChannelKind, EventCategory, EventData, FocusChange, InventoryData, JobData, KeyCategory, ListModel,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::process::ExitStatus;
use tracing::{debug, info, warn};

const PAGE_ROWS: isize = 10;
const SUMMARY_FIELDS: [&str; 6] = ["id", "fun", "tgt", "act", "success", "retcode"];
const RAW_SUMMARY_CHARS: usize = 96;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellPhase {
    Initializing,
    Running,
    ShuttingDown,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pane {
    Events,
    Agents,
    Jobs,
    Command,
}

impl Pane {
    pub const ORDER: [Pane; 4] = [Pane::Events, Pane::Agents, Pane::Jobs, Pane::Command];

    pub fn title(self) -> &'static str {
        match self {
            Pane::Events => "salt-glass",
            Pane::Agents => "Minions",
            Pane::Jobs => "Jobs",
            Pane::Command => "command:",
        }
    }

    pub fn channel(self) -> Option<ChannelKind> {
        match self {
            Pane::Events => Some(ChannelKind::Events),
            Pane::Agents => Some(ChannelKind::Inventory),
            Pane::Jobs => Some(ChannelKind::Jobs),
            Pane::Command => None,
        }
    }

    fn offset(self, step: isize) -> Pane {
        let len = Self::ORDER.len() as isize;
        let index = Self::ORDER.iter().position(|pane| *pane == self).unwrap_or(0) as isize;
        Self::ORDER[(index + step).rem_euclid(len) as usize]
    }

    pub fn next(self) -> Pane {
        self.offset(1)
    }

    pub fn prev(self) -> Pane {
        self.offset(-1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Key(KeyCategory),
    Job,
    Event(EventCategory),
    Failure,
    Command,
    Detail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub text: String,
    pub tone: Tone,
    /// Stable identity of the row: the agent id or the job id.
    pub key: Option<String>,
}

impl Row {
    fn plain(text: impl Into<String>, tone: Tone) -> Self {
        Self {
            text: text.into(),
            tone,
            key: None,
        }
    }
}

/// When the focus in `source` moves, `project` turns the newly focused row
/// into a row appended to `target`.
#[derive(Clone, Copy)]
pub struct FocusBridge {
    pub source: Pane,
    pub target: Pane,
    pub project: fn(&Row) -> Option<Row>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    Waiting,
    Loaded(usize),
    Streaming(u64),
    Failed(String),
    Closed,
}

impl ChannelStatus {
    pub fn label(&self) -> String {
        match self {
            ChannelStatus::Waiting => "waiting".to_string(),
            ChannelStatus::Loaded(rows) => format!("{rows} loaded"),
            ChannelStatus::Streaming(events) => format!("{events} events"),
            ChannelStatus::Failed(message) => format!("failed: {message}"),
            ChannelStatus::Closed => "closed".to_string(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ChannelStatus::Failed(_))
    }
}

pub struct ChannelState {
    decoder: NdjsonFrameDecoder<PipeFrame>,
    pub status: ChannelStatus,
    pub frames: u64,
    pub decode_errors: u64,
    pub exit: Option<String>,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            decoder: NdjsonFrameDecoder::default(),
            status: ChannelStatus::Waiting,
            frames: 0,
            decode_errors: 0,
            exit: None,
        }
    }
}

pub struct App {
    pub phase: ShellPhase,
    pub active: Pane,
    pub events: ListModel<Row>,
    pub agents: ListModel<Row>,
    pub jobs: ListModel<Row>,
    pub command: ListModel<Row>,
    pub quit_key: KeySpec,
    pub show_help: bool,
    pub source_label: String,
    channels: BTreeMap<ChannelKind, ChannelState>,
    bridges: Vec<FocusBridge>,
}

impl App {
    pub fn new(quit_key: KeySpec, source_label: impl Into<String>) -> Self {
        let channels = ChannelKind::ALL
            .into_iter()
            .map(|kind| (kind, ChannelState::default()))
            .collect();
        Self {
            phase: ShellPhase::Initializing,
            active: Pane::Agents,
            events: ListModel::new(),
            agents: ListModel::new(),
            jobs: ListModel::new(),
            command: ListModel::new(),
            quit_key,
            show_help: false,
            source_label: source_label.into(),
            channels,
            bridges: vec![FocusBridge {
                source: Pane::Agents,
                target: Pane::Command,
                project: agent_selection,
            }],
        }
    }

    pub fn start_running(&mut self) {
        match self.phase {
            ShellPhase::Initializing => self.phase = ShellPhase::Running,
            phase => warn!(event = "illegal_phase_transition", from = ?phase, to = "running"),
        }
    }

    pub fn begin_shutdown(&mut self) {
        match self.phase {
            ShellPhase::Initializing | ShellPhase::Running => {
                info!(event = "shell_shutdown_requested");
                self.phase = ShellPhase::ShuttingDown;
            }
            ShellPhase::ShuttingDown => {}
            ShellPhase::Terminated => {
                warn!(event = "illegal_phase_transition", from = "terminated", to = "shutting_down");
            }
        }
    }

    pub fn terminate(&mut self) {
        if self.phase != ShellPhase::ShuttingDown {
            warn!(event = "illegal_phase_transition", from = ?self.phase, to = "terminated");
            return;
        }
        self.phase = ShellPhase::Terminated;
    }

    pub fn model(&self, pane: Pane) -> &ListModel<Row> {
        match pane {
            Pane::Events => &self.events,
            Pane::Agents => &self.agents,
            Pane::Jobs => &self.jobs,
            Pane::Command => &self.command,
        }
    }

    fn model_mut(&mut self, pane: Pane) -> &mut ListModel<Row> {
        match pane {
            Pane::Events => &mut self.events,
            Pane::Agents => &mut self.agents,
            Pane::Jobs => &mut self.jobs,
            Pane::Command => &mut self.command,
        }
    }

    pub fn channel(&self, kind: ChannelKind) -> Option<&ChannelState> {
        self.channels.get(&kind)
    }

    pub fn channels(&self) -> impl Iterator<Item = (ChannelKind, &ChannelState)> {
        self.channels.iter().map(|(kind, state)| (*kind, state))
    }

    /// Feeds one pipe event into the models. Returns the channel when its
    /// pipe has closed so the caller can reap the worker.
    pub fn on_pipe_event(&mut self, event: PipeEvent) -> Option<ChannelKind> {
        if self.phase == ShellPhase::Terminated {
            debug!(event = "pipe_event_dropped", channel = %event.channel());
            return None;
        }
        match event {
            PipeEvent::Data { channel, bytes } => {
                self.apply_chunk(channel, &bytes);
                None
            }
            PipeEvent::Closed { channel } => {
                self.close_channel(channel);
                Some(channel)
            }
            PipeEvent::Failed { channel, error } => {
                self.flush_decoder(channel);
                self.record_failure(channel, format!("pipe error: {error}"));
                Some(channel)
            }
        }
    }

    fn apply_chunk(&mut self, channel: ChannelKind, bytes: &[u8]) {
        let Some(state) = self.channels.get_mut(&channel) else {
            return;
        };
        let report = state.decoder.push_chunk(bytes);
        self.apply_report(channel, report);
    }

    /// Decodes whatever the channel's pipe left unterminated.
    fn flush_decoder(&mut self, channel: ChannelKind) {
        let Some(state) = self.channels.get_mut(&channel) else {
            return;
        };
        let tail = state.decoder.finish();
        self.apply_report(channel, tail);
    }

    fn close_channel(&mut self, channel: ChannelKind) {
        self.flush_decoder(channel);

        let Some(state) = self.channels.get(&channel) else {
            return;
        };
        debug!(event = "channel_closed", channel = %channel, frames = state.frames, decode_errors = state.decode_errors);
        let status = state.status.clone();
        match status {
            ChannelStatus::Waiting if !channel.is_streaming() => {
                self.record_failure(channel, "worker exited without data".to_string());
            }
            ChannelStatus::Waiting | ChannelStatus::Streaming(_) => {
                if let Some(state) = self.channels.get_mut(&channel) {
                    state.status = ChannelStatus::Closed;
                }
            }
            _ => {}
        }
    }

    fn apply_report(&mut self, channel: ChannelKind, report: DecodeReport<PipeFrame>) {
        for err in report.errors {
            self.note_decode_error(channel, &err.to_string());
        }
        for frame in report.frames {
            self.apply_frame(channel, frame);
        }
    }

    fn note_decode_error(&mut self, channel: ChannelKind, reason: &str) {
        warn!(event = "pipe_decode_error", channel = %channel, error = %reason);
        if let Some(state) = self.channels.get_mut(&channel) {
            state.decode_errors += 1;
        }
    }

    fn apply_frame(&mut self, channel: ChannelKind, frame: PipeFrame) {
        if frame.version.0 > CURRENT_FRAME_VERSION {
            self.note_decode_error(channel, &format!("unsupported frame version {}", frame.version.0));
            return;
        }
        if frame.channel != channel || !frame.msg.belongs_to(channel) {
            self.note_decode_error(
                channel,
                &format!("{} frame for {} arrived on {channel}", frame.msg.kind(), frame.channel),
            );
            return;
        }

        let status = match frame.msg {
            FrameMsg::Inventory(inventory) => {
                let rows = inventory_rows(&inventory);
                let count = rows.len();
                let change = self.agents.insert_batch_at(0, rows);
                self.dispatch_focus(Pane::Agents, change);
                ChannelStatus::Loaded(count)
            }
            FrameMsg::Jobs(jobs) => {
                let rows = job_rows(&jobs);
                let count = rows.len();
                let change = self.jobs.insert_batch_at(0, rows);
                self.dispatch_focus(Pane::Jobs, change);
                ChannelStatus::Loaded(count)
            }
            FrameMsg::Event(event) => {
                self.events.insert_at_keep_focus(0, event_row(&event, &frame.sent_at));
                let seen = match self.channels.get(&channel).map(|state| &state.status) {
                    Some(ChannelStatus::Streaming(seen)) => *seen,
                    _ => 0,
                };
                ChannelStatus::Streaming(seen + 1)
            }
            FrameMsg::SourceFailure(failure) => {
                warn!(event = "source_failure", channel = %channel, error = %failure.message);
                self.events
                    .insert_at_keep_focus(0, failure_row(channel, &failure.message));
                ChannelStatus::Failed(failure.message)
            }
        };
        if let Some(state) = self.channels.get_mut(&channel) {
            state.frames += 1;
            state.status = status;
        }
    }

    fn record_failure(&mut self, channel: ChannelKind, message: String) {
        warn!(event = "channel_failure", channel = %channel, error = %message);
        self.events
            .insert_at_keep_focus(0, failure_row(channel, &message));
        if let Some(state) = self.channels.get_mut(&channel) {
            state.status = ChannelStatus::Failed(message);
        }
    }

    pub fn note_spawn_failure(&mut self, channel: ChannelKind, message: String) {
        self.record_failure(channel, message);
    }

    pub fn note_worker_exit(&mut self, channel: ChannelKind, status: ExitStatus) {
        info!(event = "worker_exit_noted", channel = %channel, status = %status);
        if let Some(state) = self.channels.get_mut(&channel) {
            state.exit = Some(status.to_string());
        }
    }

    fn dispatch_focus(&mut self, pane: Pane, change: Option<FocusChange>) {
        let Some(change) = change else {
            return;
        };
        let Some(row) = self.model(pane).get(change.index).cloned() else {
            return;
        };
        let projected: Vec<(Pane, Row)> = self
            .bridges
            .iter()
            .filter(|bridge| bridge.source == pane)
            .filter_map(|bridge| (bridge.project)(&row).map(|out| (bridge.target, out)))
            .collect();
        for (target, out) in projected {
            // Bridge targets are written without re-dispatching, so bridges never chain.
            self.model_mut(target).push_back(out);
        }
    }

    fn move_cursor(&mut self, delta: isize) {
        let pane = self.active;
        let change = self.model_mut(pane).move_focus(delta);
        self.dispatch_focus(pane, change);
    }

    fn cursor_first(&mut self) {
        let pane = self.active;
        let change = self.model_mut(pane).focus_first();
        self.dispatch_focus(pane, change);
    }

    fn cursor_last(&mut self) {
        let pane = self.active;
        let change = self.model_mut(pane).focus_last();
        self.dispatch_focus(pane, change);
    }

    fn inspect_focused(&mut self) {
        let pane = self.active;
        let Some(row) = self.model(pane).focused() else {
            return;
        };
        let text = match (pane, row.tone) {
            (Pane::Command, _) => return,
            (Pane::Agents, Tone::Key(category)) => format!("{} minion {}", category.as_str(), row.text),
            (Pane::Jobs, _) => match &row.key {
                Some(jid) => format!("job {jid}: {}", row.text),
                None => format!("job: {}", row.text),
            },
            _ => format!("event: {}", row.text),
        };
        let detail = Row {
            text,
            tone: Tone::Detail,
            key: row.key.clone(),
        };
        self.command.push_back(detail);
    }

    /// Returns true when the key asks the dashboard to quit.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        let ctrl_c = key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL);
        if ctrl_c || self.quit_key.matches(&key) {
            self.begin_shutdown();
            return true;
        }
        if key.code == KeyCode::Char('?') || key.code == KeyCode::F(1) {
            self.show_help = !self.show_help;
            return false;
        }
        if self.show_help {
            if key.code == KeyCode::Esc {
                self.show_help = false;
            }
            return false;
        }
        match key.code {
            KeyCode::Tab => self.active = self.active.next(),
            KeyCode::BackTab => self.active = self.active.prev(),
            KeyCode::Down | KeyCode::Char('j') => self.move_cursor(1),
            KeyCode::Up | KeyCode::Char('k') => self.move_cursor(-1),
            KeyCode::PageDown => self.move_cursor(PAGE_ROWS),
            KeyCode::PageUp => self.move_cursor(-PAGE_ROWS),
            KeyCode::Home | KeyCode::Char('g') => self.cursor_first(),
            KeyCode::End | KeyCode::Char('G') => self.cursor_last(),
            KeyCode::Char(' ') | KeyCode::Enter => self.inspect_focused(),
            _ => {}
        }
        false
    }
}

/// One row per displayed agent; the `local` key category never reaches the
/// screen.
pub fn inventory_rows(inventory: &InventoryData) -> Vec<Row> {
    inventory
        .displayed()
        .map(|(category, agent)| Row {
            text: agent.to_string(),
            tone: Tone::Key(category),
            key: Some(agent.to_string()),
        })
        .collect()
}

pub fn job_rows(jobs: &JobData) -> Vec<Row> {
    jobs.iter()
        .map(|entry| Row {
            text: format!("{}: {}", entry.record.target, entry.record.function),
            tone: Tone::Job,
            key: Some(entry.jid.clone()),
        })
        .collect()
}

pub fn event_row(event: &EventData, sent_at: &str) -> Row {
    let summary = event_summary(&event.data);
    let mut text = format!("{} {}", clock(sent_at), event.tag);
    if !summary.is_empty() {
        text.push_str("  ");
        text.push_str(&summary);
    }
    Row::plain(text, Tone::Event(event.category()))
}

fn failure_row(channel: ChannelKind, message: &str) -> Row {
    Row::plain(format!("{channel} source failed: {message}"), Tone::Failure)
}

fn agent_selection(row: &Row) -> Option<Row> {
    match row.tone {
        Tone::Key(_) => Some(Row {
            text: row.key.clone().unwrap_or_else(|| row.text.clone()),
            tone: Tone::Command,
            key: row.key.clone(),
        }),
        _ => None,
    }
}

fn clock(sent_at: &str) -> String {
    match DateTime::parse_from_rfc3339(sent_at) {
        Ok(at) => at.with_timezone(&Local).format("%H:%M:%S").to_string(),
        Err(_) => "--:--:--".to_string(),
    }
}

pub fn event_summary(data: &Value) -> String {
    let Value::Object(map) = data else {
        return match data {
            Value::Null => String::new(),
            Value::String(text) => ellipsize(text),
            other => ellipsize(&other.to_string()),
        };
    };
    let fields: Vec<String> = SUMMARY_FIELDS
        .iter()
        .filter_map(|field| {
            map.get(*field).map(|value| match value {
                Value::String(text) => format!("{field}={text}"),
                other => format!("{field}={other}"),
            })
        })
        .collect();
    if fields.is_empty() && !map.is_empty() {
        return ellipsize(&data.to_string());
    }
    fields.join(" ")
}

fn ellipsize(text: &str) -> String {
    if text.chars().count() <= RAW_SUMMARY_CHARS {
        return text.to_string();
    }
    let mut out: String = text.chars().take(RAW_SUMMARY_CHARS - 3).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use glass_core::frame::{encode_frame, DEFAULT_MAX_FRAME_BYTES};
    use glass_core::JobRecord;
    use serde_json::json;

    fn app() -> App {
        let mut app = App::new(KeySpec::default(), "demo");
        app.start_running();
        app
    }

    fn bytes(frame: &PipeFrame) -> Vec<u8> {
        encode_frame(frame, DEFAULT_MAX_FRAME_BYTES).expect("encode")
    }

    fn feed(app: &mut App, channel: ChannelKind, frame: &PipeFrame) {
        app.on_pipe_event(PipeEvent::Data {
            channel,
            bytes: bytes(frame),
        });
    }

    fn inventory(pairs: &[(KeyCategory, &[&str])]) -> PipeFrame {
        let mut inventory = InventoryData::new();
        for (category, agents) in pairs {
            inventory.insert(*category, agents.iter().copied()).expect("insert");
        }
        PipeFrame::new(ChannelKind::Inventory, FrameMsg::Inventory(inventory))
    }

    fn jobs(count: usize) -> PipeFrame {
        let mut jobs = JobData::new();
        for index in 0..count {
            jobs.push(
                format!("2026101912000000{index:04}"),
                JobRecord {
                    target: format!("web-{index}"),
                    function: "state.apply".to_string(),
                    user: None,
                    start_time: None,
                },
            )
            .expect("push");
        }
        PipeFrame::new(ChannelKind::Jobs, FrameMsg::Jobs(jobs))
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn texts(model: &ListModel<Row>) -> Vec<&str> {
        model.items().iter().map(|row| row.text.as_str()).collect()
    }

    #[test]
    fn local_keys_are_never_listed() {
        let mut app = app();
        feed(
            &mut app,
            ChannelKind::Inventory,
            &inventory(&[
                (KeyCategory::Accepted, &["m1", "m2"]),
                (KeyCategory::Local, &["master"]),
                (KeyCategory::Rejected, &["m3"]),
            ]),
        );
        assert_eq!(texts(&app.agents), ["m1", "m2", "m3"]);
        assert_eq!(app.agents.focus(), Some(2));
        assert_eq!(
            app.channel(ChannelKind::Inventory).map(|state| state.status.clone()),
            Some(ChannelStatus::Loaded(3))
        );
    }

    #[test]
    fn inventory_rows_keep_category_order_and_tone() {
        let frame = inventory(&[
            (KeyCategory::Rejected, &["r1"]),
            (KeyCategory::Accepted, &["a1"]),
            (KeyCategory::Pending, &["p1"]),
        ]);
        let FrameMsg::Inventory(data) = frame.msg else {
            panic!("inventory frame");
        };
        let rows = inventory_rows(&data);
        let tones: Vec<Tone> = rows.iter().map(|row| row.tone).collect();
        assert_eq!(
            tones,
            [
                Tone::Key(KeyCategory::Accepted),
                Tone::Key(KeyCategory::Pending),
                Tone::Key(KeyCategory::Rejected)
            ]
        );
    }

    #[test]
    fn job_rows_match_job_count() {
        for count in [0usize, 1, 4] {
            let mut app = app();
            feed(&mut app, ChannelKind::Jobs, &jobs(count));
            assert_eq!(app.jobs.len(), count);
            assert_eq!(
                app.channel(ChannelKind::Jobs).map(|state| state.status.clone()),
                Some(ChannelStatus::Loaded(count))
            );
        }
        let mut app = app();
        feed(&mut app, ChannelKind::Jobs, &jobs(2));
        assert_eq!(texts(&app.jobs), ["web-0: state.apply", "web-1: state.apply"]);
        assert_eq!(app.jobs.focus(), Some(1));
    }

    #[test]
    fn malformed_frames_leave_every_model_unchanged() {
        let mut app = app();
        feed(&mut app, ChannelKind::Jobs, &jobs(1));
        let before = (texts(&app.agents).len(), texts(&app.jobs).len(), app.events.len(), app.command.len());

        app.on_pipe_event(PipeEvent::Data {
            channel: ChannelKind::Jobs,
            bytes: b"{\"channel\": \"jobs\", \"type\": \"jobs\", \"payload\": [\n".to_vec(),
        });
        app.on_pipe_event(PipeEvent::Data {
            channel: ChannelKind::Events,
            bytes: b"\xff\xfe not json\n".to_vec(),
        });

        let after = (app.agents.len(), app.jobs.len(), app.events.len(), app.command.len());
        assert_eq!(before, after);
        assert_eq!(app.channel(ChannelKind::Jobs).map(|state| state.decode_errors), Some(1));
        assert_eq!(app.channel(ChannelKind::Events).map(|state| state.decode_errors), Some(1));
        assert_eq!(
            app.channel(ChannelKind::Jobs).map(|state| state.status.clone()),
            Some(ChannelStatus::Loaded(1))
        );
    }

    #[test]
    fn frames_on_the_wrong_channel_are_rejected() {
        let mut app = app();
        feed(&mut app, ChannelKind::Events, &jobs(3));
        assert!(app.jobs.is_empty());
        assert!(app.events.is_empty());
        assert_eq!(app.channel(ChannelKind::Events).map(|state| state.decode_errors), Some(1));
    }

    #[test]
    fn frames_split_across_chunks_are_reassembled() {
        let mut app = app();
        let encoded = bytes(&jobs(3));
        let (head, tail) = encoded.split_at(encoded.len() / 2);
        app.on_pipe_event(PipeEvent::Data {
            channel: ChannelKind::Jobs,
            bytes: head.to_vec(),
        });
        assert!(app.jobs.is_empty());
        app.on_pipe_event(PipeEvent::Data {
            channel: ChannelKind::Jobs,
            bytes: tail.to_vec(),
        });
        assert_eq!(app.jobs.len(), 3);
    }

    #[test]
    fn selecting_an_agent_appends_exactly_one_command_row() {
        let mut app = app();
        let names: Vec<String> = (1..=8).map(|n| format!("minion-{n:02}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        feed(&mut app, ChannelKind::Inventory, &inventory(&[(KeyCategory::Accepted, &refs)]));
        assert_eq!(texts(&app.command), ["minion-08"]);

        app.active = Pane::Agents;
        let before = app.command.len();
        assert!(!app.handle_key(key(KeyCode::Up)));
        assert_eq!(app.command.len(), before + 1);
        assert_eq!(app.command.items().last().map(|row| row.text.as_str()), Some("minion-07"));
        assert_eq!(app.command.items().last().map(|row| row.tone), Some(Tone::Command));
        assert_eq!(app.agents.focused().map(|row| row.text.as_str()), Some("minion-07"));
    }

    #[test]
    fn bridge_ignores_moves_that_do_not_change_focus() {
        let mut app = app();
        feed(&mut app, ChannelKind::Inventory, &inventory(&[(KeyCategory::Accepted, &["only"])]));
        app.active = Pane::Agents;
        let before = app.command.len();
        app.handle_key(key(KeyCode::Down));
        app.handle_key(key(KeyCode::End));
        assert_eq!(app.command.len(), before);

        app.active = Pane::Command;
        app.handle_key(key(KeyCode::Up));
        assert_eq!(app.command.len(), before);
    }

    #[test]
    fn events_are_newest_first_and_keep_the_cursor() {
        let mut app = app();
        for tag in ["salt/auth", "salt/job/1/new", "salt/job/1/ret/m1"] {
            let frame = PipeFrame::new(
                ChannelKind::Events,
                FrameMsg::Event(EventData::new(tag, json!({"id": "m1", "fun": "test.ping"}))),
            );
            feed(&mut app, ChannelKind::Events, &frame);
        }
        assert_eq!(app.events.len(), 3);
        assert!(app.events.items()[0].text.contains("salt/job/1/ret/m1"));
        assert!(app.events.items()[0].text.ends_with("id=m1 fun=test.ping"));
        assert_eq!(app.events.items()[0].tone, Tone::Event(EventCategory::Return));
        assert_eq!(app.events.focus(), None);
        assert_eq!(
            app.channel(ChannelKind::Events).map(|state| state.status.clone()),
            Some(ChannelStatus::Streaming(3))
        );
    }

    #[test]
    fn source_failure_frames_mark_the_channel() {
        let mut app = app();
        feed(
            &mut app,
            ChannelKind::Inventory,
            &PipeFrame::failure(ChannelKind::Inventory, "salt-key exited with exit status: 2"),
        );
        assert!(app.agents.is_empty());
        assert_eq!(app.events.len(), 1);
        assert_eq!(app.events.items()[0].tone, Tone::Failure);
        assert!(app
            .channel(ChannelKind::Inventory)
            .is_some_and(|state| state.status.is_failed()));
    }

    #[test]
    fn one_shot_channel_closing_without_data_is_a_failure() {
        let mut app = app();
        let closed = app.on_pipe_event(PipeEvent::Closed {
            channel: ChannelKind::Jobs,
        });
        assert_eq!(closed, Some(ChannelKind::Jobs));
        assert!(app.channel(ChannelKind::Jobs).is_some_and(|state| state.status.is_failed()));

        app.on_pipe_event(PipeEvent::Closed {
            channel: ChannelKind::Events,
        });
        assert_eq!(
            app.channel(ChannelKind::Events).map(|state| state.status.clone()),
            Some(ChannelStatus::Closed)
        );
    }

    #[test]
    fn unterminated_final_frame_is_applied_on_close() {
        let mut app = app();
        let mut encoded = bytes(&jobs(2));
        encoded.pop();
        app.on_pipe_event(PipeEvent::Data {
            channel: ChannelKind::Jobs,
            bytes: encoded,
        });
        assert!(app.jobs.is_empty());
        app.on_pipe_event(PipeEvent::Closed {
            channel: ChannelKind::Jobs,
        });
        assert_eq!(app.jobs.len(), 2);
        assert_eq!(
            app.channel(ChannelKind::Jobs).map(|state| state.status.clone()),
            Some(ChannelStatus::Loaded(2))
        );
    }

    #[test]
    fn pipe_failure_flushes_the_partial_frame_first() {
        let mut app = app();
        let mut encoded = bytes(&jobs(3));
        encoded.truncate(encoded.len() / 2);
        app.on_pipe_event(PipeEvent::Data {
            channel: ChannelKind::Jobs,
            bytes: encoded,
        });
        let closed = app.on_pipe_event(PipeEvent::Failed {
            channel: ChannelKind::Jobs,
            error: "connection reset".to_string(),
        });

        assert_eq!(closed, Some(ChannelKind::Jobs));
        let state = app.channel(ChannelKind::Jobs).expect("jobs channel");
        assert_eq!(state.decode_errors, 1);
        assert_eq!(state.status, ChannelStatus::Failed("pipe error: connection reset".to_string()));
        assert!(app.jobs.is_empty());
    }

    #[test]
    fn quit_key_moves_the_shell_to_shutting_down() {
        let mut app = app();
        assert_eq!(app.phase, ShellPhase::Running);
        assert!(!app.handle_key(key(KeyCode::Char('q'))));
        assert!(app.handle_key(key(KeyCode::F(12))));
        assert_eq!(app.phase, ShellPhase::ShuttingDown);

        let mut app = self::app();
        assert!(app.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)));
        assert_eq!(app.phase, ShellPhase::ShuttingDown);
        app.terminate();
        app.begin_shutdown();
        app.start_running();
        assert_eq!(app.phase, ShellPhase::Terminated);

        let mut fresh = self::app();
        fresh.terminate();
        assert_eq!(fresh.phase, ShellPhase::Running);
    }

    #[test]
    fn help_overlay_swallows_navigation() {
        let mut app = app();
        feed(&mut app, ChannelKind::Jobs, &jobs(3));
        app.active = Pane::Jobs;
        app.handle_key(key(KeyCode::Char('?')));
        assert!(app.show_help);
        app.handle_key(key(KeyCode::Home));
        assert_eq!(app.jobs.focus(), Some(2));
        app.handle_key(key(KeyCode::Esc));
        assert!(!app.show_help);
        app.handle_key(key(KeyCode::Home));
        assert_eq!(app.jobs.focus(), Some(0));
    }

    #[test]
    fn space_appends_a_detail_line_for_the_focused_row() {
        let mut app = app();
        feed(&mut app, ChannelKind::Jobs, &jobs(1));
        app.active = Pane::Jobs;
        app.handle_key(key(KeyCode::Char(' ')));
        assert_eq!(
            app.command.items().last().map(|row| row.text.as_str()),
            Some("job 20261019120000000000: web-0: state.apply")
        );
        assert_eq!(app.command.focus(), Some(app.command.len() - 1));
    }

    #[test]
    fn tab_cycles_through_every_pane() {
        let mut app = app();
        let start = app.active;
        let mut seen = vec![start];
        for _ in 0..3 {
            app.handle_key(key(KeyCode::Tab));
            seen.push(app.active);
        }
        app.handle_key(key(KeyCode::Tab));
        assert_eq!(app.active, start);
        assert_eq!(seen.len(), Pane::ORDER.len());
        app.handle_key(key(KeyCode::BackTab));
        assert_eq!(app.active, Pane::Events);
    }

    #[test]
    fn summaries_prefer_known_fields() {
        assert_eq!(event_summary(&json!({"tgt": "*", "fun": "cmd.run", "arg": ["ls"]})), "fun=cmd.run tgt=*");
        assert_eq!(event_summary(&json!({"success": true})), "success=true");
        assert_eq!(event_summary(&json!({"other": 1})), "{\"other\":1}");
        assert_eq!(event_summary(&Value::Null), "");
        assert_eq!(event_summary(&json!("raw text")), "raw text");
        assert_eq!(event_summary(&json!("x".repeat(200))).chars().count(), RAW_SUMMARY_CHARS);
    }

    #[test]
    fn unparseable_timestamps_render_a_placeholder() {
        let row = event_row(&EventData::new("salt/auth", Value::Null), "yesterday");
        assert_eq!(row.text, "--:--:-- salt/auth");
    }

    #[cfg(unix)]
    #[test]
    fn worker_exit_is_recorded() {
        use std::os::unix::process::ExitStatusExt;
        let mut app = app();
        app.note_worker_exit(ChannelKind::Events, ExitStatus::from_raw(256));
        assert!(app
            .channel(ChannelKind::Events)
            .and_then(|state| state.exit.as_deref())
            .is_some_and(|exit| exit.contains('1')));
    }
}
