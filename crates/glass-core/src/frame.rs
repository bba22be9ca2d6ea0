use crate::model::{ChannelKind, EventData, InventoryData, JobData, SourceFailure};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use thiserror::Error;

pub const DEFAULT_MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;
pub const CURRENT_FRAME_VERSION: u16 = 1;

/// Written as a string; read back from `1`, `"1"` or `"v1"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawVersion", into = "String")]
pub struct FrameVersion(pub u16);

impl FrameVersion {
    pub const CURRENT: Self = Self(CURRENT_FRAME_VERSION);
}

impl Default for FrameVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawVersion {
    Number(i64),
    Text(String),
}

impl TryFrom<RawVersion> for FrameVersion {
    type Error = String;

    fn try_from(raw: RawVersion) -> Result<Self, Self::Error> {
        let number = match raw {
            RawVersion::Number(number) => number,
            RawVersion::Text(text) => text
                .trim()
                .trim_start_matches('v')
                .parse::<i64>()
                .map_err(|err| format!("frame version {text:?} is not a number: {err}"))?,
        };
        u16::try_from(number)
            .map(FrameVersion)
            .map_err(|_| format!("frame version {number} is out of range"))
    }
}

impl From<FrameVersion> for String {
    fn from(version: FrameVersion) -> Self {
        version.0.to_string()
    }
}

/// One self-contained payload written by a worker onto its pipe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipeFrame {
    #[serde(default)]
    pub version: FrameVersion,
    pub channel: ChannelKind,
    pub sent_at: String,
    #[serde(flatten)]
    pub msg: FrameMsg,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum FrameMsg {
    Inventory(InventoryData),
    Jobs(JobData),
    Event(EventData),
    SourceFailure(SourceFailure),
}

impl FrameMsg {
    pub fn kind(&self) -> &'static str {
        match self {
            FrameMsg::Inventory(_) => "inventory",
            FrameMsg::Jobs(_) => "jobs",
            FrameMsg::Event(_) => "event",
            FrameMsg::SourceFailure(_) => "source_failure",
        }
    }

    /// Whether this message may legitimately arrive on `channel`.
    pub fn belongs_to(&self, channel: ChannelKind) -> bool {
        match self {
            FrameMsg::Inventory(_) => channel == ChannelKind::Inventory,
            FrameMsg::Jobs(_) => channel == ChannelKind::Jobs,
            FrameMsg::Event(_) => channel == ChannelKind::Events,
            FrameMsg::SourceFailure(failure) => failure.channel == channel,
        }
    }
}

impl PipeFrame {
    pub fn new(channel: ChannelKind, msg: FrameMsg) -> Self {
        Self {
            version: FrameVersion::CURRENT,
            channel,
            sent_at: Utc::now().to_rfc3339(),
            msg,
        }
    }

    pub fn failure(channel: ChannelKind, message: impl Into<String>) -> Self {
        Self::new(
            channel,
            FrameMsg::SourceFailure(SourceFailure {
                channel,
                message: message.into(),
            }),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame of {size} bytes is over the {max} byte pipe limit")]
    TooLarge { size: usize, max: usize },
    #[error("no line break within {max} bytes, dropped {buffered} buffered bytes")]
    Unterminated { buffered: usize, max: usize },
    #[error("frame could not be serialized: {0}")]
    Encode(String),
    #[error("line {line} is not a pipe frame: {reason}")]
    Malformed { line: usize, reason: String },
    #[error("pipe closed {bytes} bytes into an unfinished frame: {reason}")]
    Truncated { bytes: usize, reason: String },
}

/// What one chunk (or the final flush) of a pipe produced.
#[derive(Debug, Clone)]
pub struct DecodeReport<T> {
    pub frames: Vec<T>,
    pub errors: Vec<FrameError>,
}

impl<T> Default for DecodeReport<T> {
    fn default() -> Self {
        Self {
            frames: Vec::new(),
            errors: Vec::new(),
        }
    }
}

impl<T> DecodeReport<T> {
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty() && self.errors.is_empty()
    }

    fn record(&mut self, decoded: Result<T, FrameError>) {
        match decoded {
            Ok(frame) => self.frames.push(frame),
            Err(err) => self.errors.push(err),
        }
    }
}

pub fn encode_frame<T: Serialize>(value: &T, max_frame_bytes: usize) -> Result<Vec<u8>, FrameError> {
    let mut line = serde_json::to_vec(value).map_err(|err| FrameError::Encode(err.to_string()))?;
    if line.len() > max_frame_bytes {
        return Err(FrameError::TooLarge {
            size: line.len(),
            max: max_frame_bytes,
        });
    }
    line.push(b'\n');
    Ok(line)
}

/// Decodes a single line, with or without its line break.
pub fn decode_frame<T: DeserializeOwned>(bytes: &[u8], max_frame_bytes: usize) -> Result<T, FrameError> {
    let line = trim_line(bytes);
    check_size(line, max_frame_bytes)?;
    serde_json::from_slice(line).map_err(|err| FrameError::Malformed {
        line: 1,
        reason: err.to_string(),
    })
}

fn trim_line(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|byte| !byte.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|byte| !byte.is_ascii_whitespace())
        .map_or(start, |idx| idx + 1);
    &bytes[start..end]
}

fn check_size(line: &[u8], max: usize) -> Result<(), FrameError> {
    if line.len() > max {
        return Err(FrameError::TooLarge { size: line.len(), max });
    }
    Ok(())
}

/// Incremental decoder for one pipe. Bytes may arrive split at any point;
/// complete lines are decoded as soon as their line break shows up, and
/// blank lines are skipped. Errors carry the 1-based line number.
pub struct NdjsonFrameDecoder<T> {
    max_frame_bytes: usize,
    buffer: Vec<u8>,
    lines_seen: usize,
    marker: PhantomData<fn() -> T>,
}

impl<T> NdjsonFrameDecoder<T> {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            max_frame_bytes,
            buffer: Vec::new(),
            lines_seen: 0,
            marker: PhantomData,
        }
    }

    /// Bytes held back waiting for a line break.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}

impl<T> Default for NdjsonFrameDecoder<T> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl<T: DeserializeOwned> NdjsonFrameDecoder<T> {
    pub fn push_chunk(&mut self, chunk: &[u8]) -> DecodeReport<T> {
        self.buffer.extend_from_slice(chunk);
        let mut report = DecodeReport::default();

        let mut consumed = 0;
        while let Some(offset) = self.buffer[consumed..].iter().position(|byte| *byte == b'\n') {
            let end = consumed + offset;
            self.lines_seen += 1;
            let line = trim_line(&self.buffer[consumed..end]);
            if !line.is_empty() {
                report.record(self.parse_line(line));
            }
            consumed = end + 1;
        }
        self.buffer.drain(..consumed);

        if self.buffer.len() > self.max_frame_bytes {
            report.errors.push(FrameError::Unterminated {
                buffered: self.buffer.len(),
                max: self.max_frame_bytes,
            });
            self.buffer.clear();
        }
        report
    }

    /// Flushes the bytes left once the writer is gone. A worker may end on a
    /// frame without its line break, which still decodes; a worker that died
    /// mid-write leaves a partial frame, which becomes one `Truncated` error.
    pub fn finish(&mut self) -> DecodeReport<T> {
        let tail = std::mem::take(&mut self.buffer);
        let mut report = DecodeReport::default();
        let line = trim_line(&tail);
        if line.is_empty() {
            return report;
        }
        self.lines_seen += 1;
        let decoded = check_size(line, self.max_frame_bytes).and_then(|()| {
            serde_json::from_slice(line).map_err(|err| FrameError::Truncated {
                bytes: line.len(),
                reason: err.to_string(),
            })
        });
        report.record(decoded);
        report
    }

    fn parse_line(&self, line: &[u8]) -> Result<T, FrameError> {
        check_size(line, self.max_frame_bytes)?;
        serde_json::from_slice(line).map_err(|err| FrameError::Malformed {
            line: self.lines_seen,
            reason: err.to_string(),
        })
    }
}
