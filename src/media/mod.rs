mod archive;
mod convert;
mod source;
mod stream;
mod types;

pub use archive::{ArchiveAssembler, ArchiveReport};
pub use convert::TargetFormat;
pub use source::AssetSource;
pub use types::SingleAsset;

use crate::error::Result;
use crate::reddit::{Gallery, RedditClient};
use crate::utils::{asset_filename, sanitize_archive_name};
use bytes::Bytes;
use convert::convert_blocking;
use futures::stream::{self as futures_stream, StreamExt};
use std::sync::Arc;
use stream::content_type_for_extension;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Entry points of the download pipeline: gallery lookup, single asset
/// download and bulk archive download.
pub struct MediaService {
    reddit: Arc<RedditClient>,
    assets: Arc<dyn AssetSource>,
}

impl MediaService {
    pub fn new(reddit: Arc<RedditClient>) -> Self {
        let assets: Arc<dyn AssetSource> = reddit.clone();
        Self { reddit, assets }
    }

    pub async fn resolve_and_fetch(
        &self,
        raw_url: &str,
        cancel: &CancellationToken,
    ) -> Result<Gallery> {
        info!("Starting gallery lookup for URL: {}", raw_url);
        self.reddit.fetch_gallery(raw_url, cancel).await
    }

    /// Fetches one asset. With `TargetFormat::Original` the upstream body is
    /// passed through untouched; otherwise it is buffered, converted and
    /// returned as a single chunk.
    pub async fn stream_single_asset(
        &self,
        url: &str,
        format: TargetFormat,
        cancel: &CancellationToken,
    ) -> Result<SingleAsset> {
        let asset = self.assets.open(url, cancel).await?;
        let extension = format.output_extension(&asset.extension);
        let filename = asset_filename(url, &extension);

        if format.is_original() {
            debug!("Streaming {} as {}", url, filename);
            let content_type = asset.content_type.clone();
            return Ok(SingleAsset {
                body: asset.into_body(),
                filename,
                content_type,
            });
        }

        let data = asset.read_to_end(cancel).await?;
        let converted = convert_blocking(data, format).await?;
        debug!("Converted {} to {} ({} bytes)", url, filename, converted.len());

        Ok(SingleAsset {
            body: futures_stream::once(async move { Ok(Bytes::from(converted)) }).boxed(),
            filename,
            content_type: format
                .content_type()
                .unwrap_or_else(|| content_type_for_extension(&extension))
                .to_string(),
        })
    }

    /// Writes a ZIP of `urls` into `sink`. Never fails as a whole; see
    /// [`ArchiveReport`] for what made it in.
    pub async fn assemble_archive<W>(
        &self,
        urls: &[String],
        format: TargetFormat,
        cancel: &CancellationToken,
        sink: W,
    ) -> ArchiveReport
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        info!("Assembling archive of {} images", urls.len());
        ArchiveAssembler::new(self.assets.clone())
            .assemble(urls, format, cancel, sink)
            .await
    }
}

/// Download filename for an archive built from a page titled `title`.
pub fn archive_filename(title: &str) -> String {
    format!("{}.zip", sanitize_archive_name(title))
}
