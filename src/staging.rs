// AeroBridge Upload Staging
// Turns an unbounded input stream into a sized, re-readable upload source.
//
// Payloads below the spill threshold stay in memory. Larger ones are copied
// into an anonymous temporary file that the OS reclaims as soon as the handle
// is closed, whichever way the upload ends.

use std::io::{Cursor, SeekFrom};
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, ReadBuf};
use tracing::debug;

use crate::providers::ProviderError;

const KB: usize = 1 << 10;
const MB: usize = KB << 10;

/// Default in-memory ceiling before spilling to disk
pub const DEFAULT_SPILL_THRESHOLD: usize = 50 * MB;

/// Staging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagingConfig {
    /// Bytes buffered in memory before switching to a temporary file
    #[serde(default = "default_spill_threshold")]
    pub spill_threshold: usize,
    /// Directory for spill files (default: OS temp dir)
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

fn default_spill_threshold() -> usize {
    DEFAULT_SPILL_THRESHOLD
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            spill_threshold: DEFAULT_SPILL_THRESHOLD,
            temp_dir: None,
        }
    }
}

impl StagingConfig {
    /// Clamp values to a usable range
    pub fn validate(&mut self) {
        if self.spill_threshold == 0 {
            self.spill_threshold = 1;
        }
    }
}

/// Where a staged payload lives
#[derive(Debug)]
pub enum StagedSource {
    Memory(Cursor<Vec<u8>>),
    Spilled(File),
}

impl AsyncRead for StagedSource {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            StagedSource::Memory(cursor) => Pin::new(cursor).poll_read(cx, buf),
            StagedSource::Spilled(file) => Pin::new(file).poll_read(cx, buf),
        }
    }
}

/// A payload ready for upload, with its exact size
#[derive(Debug)]
pub struct StagedUpload {
    pub source: StagedSource,
    pub size: u64,
}

impl StagedUpload {
    pub fn is_spilled(&self) -> bool {
        matches!(self.source, StagedSource::Spilled(_))
    }
}

/// Stages one upload at a time; holds no state between calls
#[derive(Debug, Clone, Default)]
pub struct UploadStager {
    config: StagingConfig,
}

impl UploadStager {
    pub fn new(mut config: StagingConfig) -> Self {
        config.validate();
        Self { config }
    }

    pub fn threshold(&self) -> usize {
        self.config.spill_threshold
    }

    /// Read `input` to the end and return a re-readable source for it.
    ///
    /// Filling the whole threshold spills to disk even if the stream happens
    /// to end exactly there; only a short read proves end-of-stream.
    pub async fn stage<R>(&self, input: &mut R) -> Result<StagedUpload, ProviderError>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let threshold = self.config.spill_threshold;
        let mut head = Vec::with_capacity(threshold.min(64 * KB));
        (&mut *input).take(threshold as u64).read_to_end(&mut head).await?;

        if head.len() < threshold {
            let size = head.len() as u64;
            debug!("Staged {} bytes in memory", size);
            return Ok(StagedUpload {
                source: StagedSource::Memory(Cursor::new(head)),
                size,
            });
        }

        let mut file = self.spill_file().await?;
        file.write_all(&head).await?;
        drop(head);

        let copied = tokio::io::copy(input, &mut file).await?;
        file.flush().await?;
        file.seek(SeekFrom::Start(0)).await?;

        let size = threshold as u64 + copied;
        debug!("Staged {} bytes in a spill file", size);
        Ok(StagedUpload {
            source: StagedSource::Spilled(file),
            size,
        })
    }

    async fn spill_file(&self) -> Result<File, ProviderError> {
        let temp_dir = self.config.temp_dir.clone();
        let file = tokio::task::spawn_blocking(move || match temp_dir {
            Some(dir) => tempfile::tempfile_in(dir),
            None => tempfile::tempfile(),
        })
        .await
        .map_err(|e| ProviderError::Other(format!("spill file task: {}", e)))??;
        Ok(File::from_std(file))
    }
}
