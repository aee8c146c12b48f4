use crate::error::Result;
use bytes::Bytes;
use futures::stream::BoxStream;

/// A single asset ready to hand to a client.
pub struct SingleAsset {
    pub body: BoxStream<'static, Result<Bytes>>,
    /// Suggested download filename, extension matching the body
    pub filename: String,
    pub content_type: String,
}

impl std::fmt::Debug for SingleAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleAsset")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}
