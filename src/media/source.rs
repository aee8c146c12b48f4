use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

/// Where asset bytes come from.
#[async_trait]
pub trait AssetSource: Send + Sync {
    /// Starts fetching `url`. The returned stream owns the connection; dropping
    /// it releases the connection.
    async fn open(&self, url: &str, cancel: &CancellationToken) -> Result<AssetStream>;
}

/// Body of one fetched asset plus what is known about its format.
pub struct AssetStream {
    body: BoxStream<'static, Result<Bytes>>,
    /// Lowercase, dot-prefixed, never empty
    pub extension: String,
    pub content_type: String,
}

impl AssetStream {
    pub fn new(
        body: BoxStream<'static, Result<Bytes>>,
        extension: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            body,
            extension: extension.into(),
            content_type: content_type.into(),
        }
    }

    /// Next body chunk, or `None` at end of stream.
    pub async fn next_chunk(&mut self, cancel: &CancellationToken) -> Result<Option<Bytes>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            chunk = self.body.next() => chunk.transpose(),
        }
    }

    /// Buffers the whole body. Only used where the full input is required.
    pub async fn read_to_end(mut self, cancel: &CancellationToken) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        while let Some(chunk) = self.next_chunk(cancel).await? {
            data.extend_from_slice(&chunk);
        }
        Ok(data)
    }

    pub fn into_body(self) -> BoxStream<'static, Result<Bytes>> {
        self.body
    }
}

impl std::fmt::Debug for AssetStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetStream")
            .field("extension", &self.extension)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}
