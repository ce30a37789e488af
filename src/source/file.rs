//! Line-oriented file source
//!
//! Tails a text file one line per record. Progress is recorded in the
//! position service as the byte offset following the last committed line,
//! so a restarted (or rebalanced) reader picks up exactly there.

use super::retry::RetryPolicy;
use crate::error::{Error, Result};
use crate::service::PositionService;
use crate::types::{Offset, Partition};
use chrono::{DateTime, Utc};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Partition attribute holding the file name
pub const FILENAME_KEY: &str = "filename";

/// Offset attribute holding the next byte to read
pub const NEXT_POSITION_KEY: &str = "next_position";

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Settings for a [`FileLineSource`]
#[derive(Debug, Clone)]
pub struct FileSourceConfig {
    /// File to read
    pub filename: PathBuf,
    /// Maximum records returned by one poll
    pub batch_size: usize,
    /// Pause when no new data is available
    pub poll_interval: Duration,
    /// Policy for waiting on a file that does not exist yet
    pub retry: RetryPolicy,
}

impl FileSourceConfig {
    pub fn new(filename: impl Into<PathBuf>) -> Self {
        Self {
            filename: filename.into(),
            batch_size: 100,
            poll_interval: Duration::from_secs(1),
            retry: RetryPolicy::default(),
        }
    }

    /// Set the batch size
    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set the idle poll interval
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the retry policy for a missing file
    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// One line read from the file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    /// Partition the line belongs to
    pub partition: Partition,
    /// Position right after this line
    pub offset: Offset,
    /// Line content without its terminator
    pub line: String,
    /// When the line was read
    pub emitted_at: DateTime<Utc>,
}

/// Partition identifying a file
pub fn file_partition(path: &Path) -> Partition {
    Partition::new().with(FILENAME_KEY, path.to_string_lossy())
}

/// Offset pointing at a byte position
pub fn file_offset(next_position: u64) -> Offset {
    Offset::new().with(NEXT_POSITION_KEY, next_position.to_string())
}

/// Split the first complete line off `buf`.
///
/// Returns the line and the number of bytes it used, terminator included.
/// A `\r` at the very end is left alone until the next byte shows whether
/// it starts a `\r\n`.
pub fn split_line(buf: &[u8]) -> Option<(String, usize)> {
    for (i, byte) in buf.iter().enumerate() {
        match byte {
            b'\n' => return Some((String::from_utf8_lossy(&buf[..i]).into_owned(), i + 1)),
            b'\r' => {
                let next = buf.get(i + 1)?;
                let used = if *next == b'\n' { i + 2 } else { i + 1 };
                return Some((String::from_utf8_lossy(&buf[..i]).into_owned(), used));
            }
            _ => {}
        }
    }
    None
}

/// Resumable line reader for a single file
pub struct FileLineSource {
    config: FileSourceConfig,
    positions: PositionService,
    cancel: CancellationToken,
    partition: Partition,
    file: Option<File>,
    /// Bytes read but not yet returned as lines
    buffer: Vec<u8>,
    /// File position of the first byte in `buffer`
    stream_offset: u64,
}

impl FileLineSource {
    pub fn new(
        config: FileSourceConfig,
        positions: PositionService,
        cancel: CancellationToken,
    ) -> Self {
        let partition = file_partition(&config.filename);
        Self {
            config,
            positions,
            cancel,
            partition,
            file: None,
            buffer: Vec::new(),
            stream_offset: 0,
        }
    }

    /// Partition this source reports progress under
    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    /// Byte offset after the last line handed out
    pub fn stream_offset(&self) -> u64 {
        self.stream_offset
    }

    /// Whether the file is currently open
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Open the file and seek to the stored position.
    ///
    /// Waits for a missing file according to the retry policy.
    pub async fn open(&mut self) -> Result<()> {
        let mut file = self.open_with_retry().await?;

        let mut start = self.stored_position().await?;
        let len = file.metadata().await?.len();
        if start > len {
            warn!(
                file = %self.config.filename.display(),
                stored = start,
                len,
                "File is shorter than stored position, reading from the start"
            );
            start = 0;
        }
        if start > 0 {
            file.seek(SeekFrom::Start(start)).await?;
            debug!(file = %self.config.filename.display(), offset = start, "Skipped to stored position");
        }

        self.stream_offset = start;
        self.buffer.clear();
        self.file = Some(file);
        info!(file = %self.config.filename.display(), offset = start, "Opened file for reading");
        Ok(())
    }

    /// Read up to `batch_size` new lines.
    ///
    /// Returns an empty batch after waiting `poll_interval` when the file has
    /// nothing new.
    pub async fn poll(&mut self) -> Result<Vec<SourceRecord>> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if self.file.is_none() {
            self.open().await?;
        }

        let mut records = Vec::new();
        self.drain_lines(&mut records);

        let mut chunk = vec![0u8; READ_CHUNK_SIZE];
        while records.len() < self.config.batch_size {
            let Some(file) = self.file.as_mut() else {
                break;
            };
            let read = file.read(&mut chunk).await?;
            if read == 0 {
                break;
            }
            trace!(file = %self.config.filename.display(), bytes = read, "Read from file");
            self.buffer.extend_from_slice(&chunk[..read]);
            self.drain_lines(&mut records);
        }

        if records.is_empty() {
            self.sleep(self.config.poll_interval).await?;
        }
        Ok(records)
    }

    /// Record the position after the last of `records`
    pub async fn commit(&self, records: &[SourceRecord]) {
        if let Some(last) = records.last() {
            self.positions
                .put_position(last.partition.clone(), last.offset.clone())
                .await;
        }
    }

    /// Close the file; the next poll reopens it at the stored position
    pub fn close(&mut self) {
        if self.file.take().is_some() {
            debug!(file = %self.config.filename.display(), "Closed file");
        }
        self.buffer.clear();
    }

    fn drain_lines(&mut self, records: &mut Vec<SourceRecord>) {
        while records.len() < self.config.batch_size {
            let Some((line, used)) = split_line(&self.buffer) else {
                break;
            };
            self.buffer.drain(..used);
            self.stream_offset += used as u64;
            records.push(SourceRecord {
                partition: self.partition.clone(),
                offset: file_offset(self.stream_offset),
                line,
                emitted_at: Utc::now(),
            });
        }
    }

    async fn stored_position(&self) -> Result<u64> {
        let Some(offset) = self.positions.get_position(&self.partition).await else {
            return Ok(0);
        };
        match offset.get(NEXT_POSITION_KEY) {
            Some(raw) => raw.parse().map_err(|e| {
                Error::source_error(format!("Invalid stored position '{raw}': {e}"))
            }),
            None => Ok(0),
        }
    }

    async fn open_with_retry(&self) -> Result<File> {
        let mut failed = 0;
        loop {
            match File::open(&self.config.filename).await {
                Ok(file) => return Ok(file),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    failed += 1;
                    if self.config.retry.is_exhausted(failed) {
                        return Err(Error::file_not_found(
                            self.config.filename.to_string_lossy(),
                        ));
                    }
                    let delay = self.config.retry.delay(failed - 1);
                    warn!(
                        file = %self.config.filename.display(),
                        attempt = failed,
                        delay_ms = delay.as_millis() as u64,
                        "File not found, waiting for it to be created"
                    );
                    self.sleep(delay).await?;
                }
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }

    async fn sleep(&self, duration: Duration) -> Result<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

impl std::fmt::Debug for FileLineSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileLineSource")
            .field("filename", &self.config.filename)
            .field("open", &self.file.is_some())
            .field("stream_offset", &self.stream_offset)
            .finish()
    }
}
