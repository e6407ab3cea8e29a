use super::LandmarkSource;
use crate::error::{FrameError, Result};
use crate::landmark::{from_timestamp_ms, Landmark, LandmarkFrame, YOrigin};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, info, warn};

/// Wire format of one frame: a JSON object per line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_id: Option<u64>,
    pub timestamp_ms: u64,
    #[serde(default)]
    pub y_origin: YOrigin,
    /// `[x, y, confidence]` per joint, in joint index order
    pub landmarks: Vec<[f32; 3]>,
}

impl FrameRecord {
    /// Convert to the internal coordinate convention
    pub fn into_frame(self, fallback_id: u64) -> std::result::Result<LandmarkFrame, FrameError> {
        let origin = self.y_origin;
        let landmarks: Vec<Landmark> = self
            .landmarks
            .iter()
            .map(|[x, y, confidence]| Landmark::with_origin(*x, *y, *confidence, origin))
            .collect();

        LandmarkFrame::from_slice(
            self.frame_id.unwrap_or(fallback_id),
            from_timestamp_ms(self.timestamp_ms),
            &landmarks,
        )
    }

    pub fn from_frame(frame: &LandmarkFrame) -> Self {
        Self {
            frame_id: Some(frame.id),
            timestamp_ms: frame.timestamp_ms(),
            y_origin: YOrigin::Top,
            landmarks: frame
                .landmarks
                .iter()
                .map(|l| [l.x, l.y, l.confidence])
                .collect(),
        }
    }
}

/// Replays frames recorded as JSON lines. Malformed lines are logged and skipped.
pub struct JsonLinesSource<R> {
    reader: BufReader<R>,
    buffer: Vec<u8>,
    name: String,
    line_number: u64,
    frames_read: u64,
    lines_skipped: u64,
}

impl<R: AsyncRead + Unpin + Send> JsonLinesSource<R> {
    pub fn new(reader: R, name: impl Into<String>) -> Self {
        Self {
            reader: BufReader::new(reader),
            buffer: Vec::new(),
            name: name.into(),
            line_number: 0,
            frames_read: 0,
            lines_skipped: 0,
        }
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    pub fn lines_skipped(&self) -> u64 {
        self.lines_skipped
    }

    fn parse_line(&self, line: &str) -> std::result::Result<LandmarkFrame, FrameError> {
        let record: FrameRecord = serde_json::from_str(line).map_err(|e| FrameError::Parse {
            line: self.line_number,
            details: e.to_string(),
        })?;
        record.into_frame(self.line_number)
    }
}

impl JsonLinesSource<tokio::fs::File> {
    /// Open a recording on disk
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path).await?;
        info!("Replaying landmark frames from {}", path.display());
        Ok(Self::new(file, path.display().to_string()))
    }
}

impl JsonLinesSource<tokio::io::Stdin> {
    /// Read frames piped in on standard input
    pub fn stdin() -> Self {
        Self::new(tokio::io::stdin(), "stdin")
    }
}

#[async_trait::async_trait]
impl<R: AsyncRead + Unpin + Send> LandmarkSource for JsonLinesSource<R> {
    async fn next_frame(&mut self) -> Result<Option<LandmarkFrame>> {
        loop {
            self.buffer.clear();
            if self.reader.read_until(b'\n', &mut self.buffer).await? == 0 {
                break;
            }
            self.line_number += 1;

            let line = match std::str::from_utf8(&self.buffer) {
                Ok(line) => line.trim(),
                Err(e) => {
                    self.lines_skipped += 1;
                    warn!(
                        "{}: skipping line {}: invalid UTF-8: {}",
                        self.name, self.line_number, e
                    );
                    continue;
                }
            };
            if line.is_empty() {
                continue;
            }

            match self.parse_line(line) {
                Ok(frame) => {
                    self.frames_read += 1;
                    return Ok(Some(frame));
                }
                Err(e) => {
                    self.lines_skipped += 1;
                    warn!("{}: skipping line: {}", self.name, e);
                }
            }
        }

        debug!(
            "{} exhausted after {} frames ({} lines skipped)",
            self.name, self.frames_read, self.lines_skipped
        );
        Ok(None)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
