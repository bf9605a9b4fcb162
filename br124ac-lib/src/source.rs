//! Byte-source collaborators feeding the decode engine: a live serial
//! port or a paced, seekable capture replay.

use crate::error::AcError;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::time::timeout;
use tokio_serial::SerialStream;
use tracing::info;

/// What a source produced when asked for its next byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceRead {
    Byte(u8),
    /// Nothing available right now; the stream may resume. The caller
    /// decides whether to keep polling.
    Idle,
    /// Permanently exhausted (end of a capture file, closed port).
    Eof,
}

/// A stream of raw diagnostic bytes.
///
/// End-of-stream is a pause condition, not an error; the engine simply
/// stops advancing until more bytes arrive.
#[async_trait]
pub trait ByteSource: Send {
    async fn next_byte(&mut self) -> Result<SourceRead, AcError>;

    /// Relative scrubbing for replay sources. Live sources cannot seek.
    fn seek(&mut self, _relative: i64) -> Result<(), AcError> {
        Err(AcError::SeekUnsupported)
    }
}

/// Live serial line, default 4800 bps 8N1.
pub struct SerialSource {
    port: SerialStream,
    read_timeout: Duration,
}

impl SerialSource {
    pub fn open(path: &str, baud: u32, read_timeout: Duration) -> Result<Self, AcError> {
        let builder = tokio_serial::new(path, baud);
        let port = SerialStream::open(&builder)?;
        info!(path, baud, "serial port opened");
        Ok(Self { port, read_timeout })
    }
}

#[async_trait]
impl ByteSource for SerialSource {
    async fn next_byte(&mut self) -> Result<SourceRead, AcError> {
        let mut buf = [0u8; 1];
        match timeout(self.read_timeout, self.port.read(&mut buf)).await {
            Ok(Ok(0)) => Ok(SourceRead::Eof),
            Ok(Ok(_)) => Ok(SourceRead::Byte(buf[0])),
            Ok(Err(e)) => Err(e.into()),
            // No byte within the timeout; treat as a pause, not an error.
            Err(_) => Ok(SourceRead::Idle),
        }
    }
}

/// Capture-file replay with per-byte pacing and relative seek.
pub struct ReplaySource {
    data: Bytes,
    cursor: usize,
    pacing: Duration,
}

impl ReplaySource {
    pub fn new(data: Bytes, pacing: Duration) -> Self {
        Self {
            data,
            cursor: 0,
            pacing,
        }
    }

    pub fn from_file(path: impl AsRef<Path>, pacing: Duration) -> Result<Self, AcError> {
        let data = std::fs::read(path.as_ref())?;
        info!(
            path = %path.as_ref().display(),
            len = data.len(),
            "capture loaded"
        );
        Ok(Self::new(Bytes::from(data), pacing))
    }

    pub fn position(&self) -> usize {
        self.cursor
    }
}

#[async_trait]
impl ByteSource for ReplaySource {
    async fn next_byte(&mut self) -> Result<SourceRead, AcError> {
        if self.cursor >= self.data.len() {
            return Ok(SourceRead::Eof);
        }
        if !self.pacing.is_zero() {
            tokio::time::sleep(self.pacing).await;
        }
        let byte = self.data[self.cursor];
        self.cursor += 1;
        Ok(SourceRead::Byte(byte))
    }

    fn seek(&mut self, relative: i64) -> Result<(), AcError> {
        let target = self.cursor as i64 + relative;
        self.cursor = target.clamp(0, self.data.len() as i64) as usize;
        Ok(())
    }
}
