use super::convert::{convert_blocking, TargetFormat};
use super::source::AssetSource;
use crate::error::{Error, Result};
use crate::utils::entry_name;
use bytes::Bytes;
use std::io::Write;
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_util::io::SyncIoBridge;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Commands buffered between the fetch loop and the archive writer
const WRITER_QUEUE_DEPTH: usize = 4;

enum ArchiveCommand {
    StartEntry(String),
    Data(Bytes),
}

/// What happened to one requested URL.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryOutcome {
    Written { url: String, name: String },
    /// Nothing was written for this URL
    Skipped { url: String, reason: String },
}

#[derive(Debug, Default)]
pub struct ArchiveReport {
    pub entries: Vec<EntryOutcome>,
    /// Loop stopped early because the caller went away
    pub cancelled: bool,
}

impl ArchiveReport {
    pub fn written(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| matches!(entry, EntryOutcome::Written { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.entries.len() - self.written()
    }

    /// URL and entry name of everything written, in archive order.
    pub fn written_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().filter_map(|entry| match entry {
            EntryOutcome::Written { url, name } => Some((url.as_str(), name.as_str())),
            EntryOutcome::Skipped { .. } => None,
        })
    }

    /// URL and reason of every entry left out of the archive.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().filter_map(|entry| match entry {
            EntryOutcome::Written { .. } => None,
            EntryOutcome::Skipped { url, reason } => Some((url.as_str(), reason.as_str())),
        })
    }
}

enum EntryError {
    Skipped(Error),
    SinkClosed,
}

/// Streams a list of assets into a ZIP archive, one asset at a time. At most
/// one asset body is held in memory.
pub struct ArchiveAssembler {
    source: Arc<dyn AssetSource>,
}

impl ArchiveAssembler {
    pub fn new(source: Arc<dyn AssetSource>) -> Self {
        Self { source }
    }

    /// Writes one entry per fetchable URL into `sink` and finalizes the
    /// archive. Per-entry failures are logged and reported, never returned;
    /// cancellation stops the loop and finalizes what was written.
    pub async fn assemble<W>(
        &self,
        urls: &[String],
        format: TargetFormat,
        cancel: &CancellationToken,
        sink: W,
    ) -> ArchiveReport
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(WRITER_QUEUE_DEPTH);
        let bridge = SyncIoBridge::new(sink);
        let writer = tokio::task::spawn_blocking(move || write_archive(bridge, rx));

        let mut report = ArchiveReport::default();
        let mut next_index = 1;

        for url in urls {
            if cancel.is_cancelled() {
                info!("Client disconnected, stopping archive stream");
                report.cancelled = true;
                break;
            }

            match self.write_entry(url, next_index, format, cancel, &tx).await {
                Ok(name) => {
                    debug!("Archived {} as {}", url, name);
                    next_index += 1;
                    report.entries.push(EntryOutcome::Written {
                        url: url.clone(),
                        name,
                    });
                }
                Err(EntryError::Skipped(Error::Cancelled)) => {
                    info!("Client disconnected, stopping archive stream");
                    report.cancelled = true;
                    break;
                }
                Err(EntryError::Skipped(error)) => {
                    warn!("Skipping {}: {}", url, error);
                    report.entries.push(EntryOutcome::Skipped {
                        url: url.clone(),
                        reason: error.to_string(),
                    });
                }
                Err(EntryError::SinkClosed) => {
                    info!("Archive output closed, stopping archive stream");
                    report.cancelled = true;
                    break;
                }
            }
        }

        // Closing the queue lets the writer emit the central directory.
        drop(tx);
        match writer.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to finalize archive: {}", e),
            Err(e) => warn!("Archive writer task failed: {}", e),
        }

        info!(
            "Archive finished: {} written, {} failed{}",
            report.written(),
            report.failed(),
            if report.cancelled { " (cancelled)" } else { "" }
        );
        report
    }

    async fn write_entry(
        &self,
        url: &str,
        index: usize,
        format: TargetFormat,
        cancel: &CancellationToken,
        tx: &mpsc::Sender<ArchiveCommand>,
    ) -> std::result::Result<String, EntryError> {
        let asset = self
            .source
            .open(url, cancel)
            .await
            .map_err(EntryError::Skipped)?;

        let extension = format.output_extension(&asset.extension);

        // The whole body is in hand before the entry is opened, so a failed
        // download or conversion never leaves a partial entry behind.
        let data = asset
            .read_to_end(cancel)
            .await
            .map_err(EntryError::Skipped)?;
        let data = if format.is_original() {
            data
        } else {
            convert_blocking(data, format)
                .await
                .map_err(EntryError::Skipped)?
        };

        let name = entry_name(index, &extension);
        queue(tx, ArchiveCommand::StartEntry(name.clone())).await?;
        queue(tx, ArchiveCommand::Data(Bytes::from(data))).await?;
        Ok(name)
    }
}

async fn queue(
    tx: &mpsc::Sender<ArchiveCommand>,
    command: ArchiveCommand,
) -> std::result::Result<(), EntryError> {
    tx.send(command).await.map_err(|_| EntryError::SinkClosed)
}

/// Owns the ZIP writer on a blocking thread. Runs until the command queue
/// closes, then writes the central directory and shuts the sink down.
fn write_archive<W>(sink: SyncIoBridge<W>, mut rx: mpsc::Receiver<ArchiveCommand>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    // Image payloads are already compressed.
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let mut zip = ZipWriter::new_stream(sink);

    while let Some(command) = rx.blocking_recv() {
        match command {
            ArchiveCommand::StartEntry(name) => zip.start_file(name, options)?,
            ArchiveCommand::Data(chunk) => zip.write_all(&chunk)?,
        }
    }

    let mut sink = zip.finish()?.into_inner();
    sink.shutdown()?;
    Ok(())
}
