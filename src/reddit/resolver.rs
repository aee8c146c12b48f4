use super::{send, RedditClient};
use crate::error::{Error, Result};
use reqwest::header::LOCATION;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

impl RedditClient {
    /// Validates a post link and rewrites it onto the canonical origin.
    ///
    /// Share links (`/r/<sub>/s/<id>`) are resolved by reading the redirect's
    /// `Location` header without following it; the destination page can answer
    /// 429 for restricted communities when requested without a session.
    pub async fn resolve(&self, input: &str, cancel: &CancellationToken) -> Result<String> {
        let normalized = normalize_input(input);
        debug!("Resolving post URL: {}", normalized);

        let mut url = Url::parse(&normalized).map_err(|_| Error::InvalidUrl)?;
        if !self.is_upstream_host(&url) {
            return Err(Error::InvalidUrl);
        }

        if is_share_link(url.path()) {
            url = self.resolve_share_link(&url, cancel).await?;
        }

        let canonical = format!(
            "{}{}",
            self.config.canonical_origin.trim_end_matches('/'),
            url.path()
        );
        debug!("Resolved {} to {}", input.trim(), canonical);
        Ok(canonical)
    }

    async fn resolve_share_link(&self, share_url: &Url, cancel: &CancellationToken) -> Result<Url> {
        let response = send(self.get_without_redirects(share_url.as_str()), cancel).await?;

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(Error::InvalidUrl)?;

        let target = Url::parse(location).map_err(|_| Error::InvalidUrl)?;
        if !self.is_upstream_host(&target) {
            return Err(Error::InvalidUrl);
        }

        debug!("Share link {} points to {}", share_url, target);
        Ok(target)
    }

    fn is_upstream_host(&self, url: &Url) -> bool {
        url.host_str()
            .is_some_and(|host| !host.is_empty() && host.contains(&self.config.domain))
    }
}

/// Trims the input and assumes `https://` when no scheme is given.
fn normalize_input(input: &str) -> String {
    let trimmed = input.trim();
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

/// Reports whether `path` has the share link shape `/r/<sub>/s/<id>`.
fn is_share_link(path: &str) -> bool {
    let parts: Vec<&str> = path.trim_matches('/').split('/').collect();
    matches!(
        parts.as_slice(),
        ["r", sub, "s", id] if !sub.is_empty() && !id.is_empty()
    )
}
