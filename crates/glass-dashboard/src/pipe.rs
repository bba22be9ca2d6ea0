use glass_core::frame::{encode_frame, FrameError, PipeFrame, DEFAULT_MAX_FRAME_BYTES};
use glass_core::ChannelKind;
use std::io::{self, Write};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

pub const READ_CHUNK_BYTES: usize = 8 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipeEvent {
    Data { channel: ChannelKind, bytes: Vec<u8> },
    Closed { channel: ChannelKind },
    Failed { channel: ChannelKind, error: String },
}

impl PipeEvent {
    pub fn channel(&self) -> ChannelKind {
        match self {
            PipeEvent::Data { channel, .. }
            | PipeEvent::Closed { channel }
            | PipeEvent::Failed { channel, .. } => *channel,
        }
    }
}

/// Forwards raw chunks from a worker's pipe into the UI queue until the
/// pipe closes. Chunks carry no framing; the receiver owns reassembly.
pub fn register_readable<R>(
    channel: ChannelKind,
    mut reader: R,
    tx: mpsc::Sender<PipeEvent>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_CHUNK_BYTES];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => {
                    debug!(event = "pipe_closed", channel = %channel);
                    let _ = tx.send(PipeEvent::Closed { channel }).await;
                    break;
                }
                Ok(n) => {
                    let event = PipeEvent::Data {
                        channel,
                        bytes: buf[..n].to_vec(),
                    };
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    let _ = tx
                        .send(PipeEvent::Failed {
                            channel,
                            error: err.to_string(),
                        })
                        .await;
                    break;
                }
            }
        }
    })
}

#[derive(Debug, Error)]
pub enum PipeError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("pipe write failed: {0}")]
    Io(#[from] io::Error),
}

/// Producer end of a channel. Every frame is flushed as soon as it is
/// written so the reader never waits on a half-filled buffer.
pub struct PipeWriter<W: Write> {
    inner: W,
    max_frame_bytes: usize,
}

impl<W: Write> PipeWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }

    pub fn write_frame(&mut self, frame: &PipeFrame) -> Result<(), PipeError> {
        let bytes = encode_frame(frame, self.max_frame_bytes)?;
        self.inner.write_all(&bytes)?;
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
