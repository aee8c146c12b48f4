use super::source::{AssetSource, AssetStream};
use crate::error::{Error, Result};
use crate::reddit::{send, RedditClient};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::CONTENT_TYPE;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

/// Extensions taken at face value when they appear in an asset URL
const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp"];

/// Used when neither the URL nor the content type settles the format
const DEFAULT_EXTENSION: &str = ".jpg";

#[async_trait]
impl AssetSource for RedditClient {
    async fn open(&self, url: &str, cancel: &CancellationToken) -> Result<AssetStream> {
        debug!("Fetching asset: {}", url);

        let response = send(self.get(url), cancel).await?;
        let status = response.status();
        if !status.is_success() {
            // dropping the response closes the body
            return Err(Error::UpstreamStatus(status.as_u16()));
        }

        let header_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let extension = detect_extension(url, &header_type);
        let content_type = if header_type.is_empty() {
            content_type_for_extension(&extension).to_string()
        } else {
            header_type
        };

        let body = response.bytes_stream().map_err(Error::from).boxed();
        Ok(AssetStream::new(body, extension, content_type))
    }
}

/// Resolves the original extension of an asset: a known image extension in
/// the URL path wins over the response content type, which wins over the
/// default.
pub fn detect_extension(asset_url: &str, content_type: &str) -> String {
    if let Some(extension) = url_extension(asset_url) {
        if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            return extension;
        }
    }

    extension_for_content_type(content_type)
        .unwrap_or(DEFAULT_EXTENSION)
        .to_string()
}

fn url_extension(asset_url: &str) -> Option<String> {
    let url = Url::parse(asset_url).ok()?;
    let last = url.path_segments()?.next_back()?;
    let dot = last.rfind('.')?;
    Some(last[dot..].to_ascii_lowercase())
}

fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match mime.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(".jpg"),
        "image/png" => Some(".png"),
        "image/gif" => Some(".gif"),
        "image/webp" => Some(".webp"),
        _ => None,
    }
}

pub fn content_type_for_extension(extension: &str) -> &'static str {
    match extension {
        ".jpg" | ".jpeg" => "image/jpeg",
        ".png" => "image/png",
        ".gif" => "image/gif",
        ".webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reddit::test_support::client_for;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_url_extension_beats_content_type() {
        assert_eq!(
            detect_extension("https://i.redd.it/abc.png", "image/jpeg"),
            ".png"
        );
        assert_eq!(
            detect_extension("https://i.redd.it/abc.GIF?s=1", "text/html"),
            ".gif"
        );
        assert_eq!(
            detect_extension("https://i.redd.it/abc.webp", ""),
            ".webp"
        );
    }

    #[test]
    fn test_content_type_fallback() {
        assert_eq!(
            detect_extension("https://preview.redd.it/abc", "image/jpeg"),
            ".jpg"
        );
        assert_eq!(
            detect_extension("https://i.redd.it/abc.php", "image/png; charset=binary"),
            ".png"
        );
        assert_eq!(
            detect_extension("https://www.reddit.com/gallery/x", "IMAGE/GIF"),
            ".gif"
        );
    }

    #[test]
    fn test_default_extension() {
        assert_eq!(detect_extension("https://i.redd.it/abc", ""), ".jpg");
        assert_eq!(detect_extension("nonsense", "text/html"), ".jpg");
    }

    #[test]
    fn test_content_type_for_extension() {
        assert_eq!(content_type_for_extension(".jpeg"), "image/jpeg");
        assert_eq!(content_type_for_extension(".gif"), "image/gif");
        assert_eq!(
            content_type_for_extension(".bin"),
            "application/octet-stream"
        );
    }

    #[tokio::test]
    async fn test_open_streams_body_verbatim() {
        let mock_server = MockServer::start().await;
        let client = client_for(&mock_server.uri());
        let payload: Vec<u8> = (0..=255u8).cycle().take(200_000).collect();

        Mock::given(method("GET"))
            .and(path("/asset"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(payload.clone(), "image/webp"),
            )
            .mount(&mock_server)
            .await;

        let url = format!("{}/asset", mock_server.uri());
        let asset = client.open(&url, &CancellationToken::new()).await.unwrap();
        assert_eq!(asset.extension, ".webp");
        assert_eq!(asset.content_type, "image/webp");

        let data = asset.read_to_end(&CancellationToken::new()).await.unwrap();
        assert_eq!(data, payload);
    }

    #[tokio::test]
    async fn test_open_non_success_status() {
        let mock_server = MockServer::start().await;
        let client = client_for(&mock_server.uri());

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let url = format!("{}/gone.jpg", mock_server.uri());
        let result = client.open(&url, &CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::UpstreamStatus(404))));
    }
}
