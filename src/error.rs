//! Error types for the gallery pipeline.
//!
//! Every failure the resolver, extractor, streamer or assembler can produce is
//! a variant of [`Error`]. [`Error::kind`] collapses the variants onto the
//! coarse categories the HTTP boundary needs to pick a status and a message.

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Input is not a parsable link or points outside the upstream domain
    #[error("invalid reddit url")]
    InvalidUrl,

    /// Upstream listing came back without a post
    #[error("post not found or deleted")]
    PostNotFound,

    /// Post exists but none of the extraction tiers produced an image
    #[error("no images found in post")]
    NoImages,

    /// Upstream answered with a non-success status
    #[error("upstream returned status {0}")]
    UpstreamStatus(u16),

    /// Connection, timeout or body read failure
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Upstream body did not match the expected JSON shape
    #[error("failed to decode upstream response: {0}")]
    MalformedResponse(#[from] serde_json::Error),

    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("failed to encode image: {0}")]
    Encode(#[source] image::ImageError),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Caller went away while the operation was in flight
    #[error("operation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

/// Coarse error categories exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidUrl,
    PostNotFound,
    NoImages,
    Upstream,
    Decode,
    UnsupportedFormat,
    Cancelled,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidUrl => ErrorKind::InvalidUrl,
            Error::PostNotFound => ErrorKind::PostNotFound,
            Error::NoImages => ErrorKind::NoImages,
            Error::UpstreamStatus(_) | Error::Transport(_) | Error::MalformedResponse(_) => {
                ErrorKind::Upstream
            }
            Error::Decode(_) | Error::Encode(_) => ErrorKind::Decode,
            Error::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Io(_) | Error::Archive(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status code for this error at the web boundary
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::InvalidUrl => 400,
            ErrorKind::PostNotFound => 404,
            ErrorKind::NoImages => 422,
            ErrorKind::Upstream | ErrorKind::Decode => 502,
            ErrorKind::UnsupportedFormat | ErrorKind::Cancelled => 400,
            ErrorKind::Internal => 500,
        }
    }

    /// Machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::InvalidUrl => "invalid_url",
            ErrorKind::PostNotFound => "post_not_found",
            ErrorKind::NoImages => "no_images",
            ErrorKind::Upstream => "upstream_error",
            ErrorKind::Decode => "decode_error",
            ErrorKind::UnsupportedFormat => "unsupported_format",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal_error",
        }
    }

    /// Message suitable for showing to the person who submitted the link
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::InvalidUrl => "That doesn't look like a valid Reddit link.".to_string(),
            ErrorKind::PostNotFound => {
                "Post not found. It might be deleted or private.".to_string()
            }
            ErrorKind::NoImages => "This post exists but has no images.".to_string(),
            _ => self.to_string(),
        }
    }
}
