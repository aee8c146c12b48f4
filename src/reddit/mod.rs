mod post;
mod resolver;
mod types;

pub use types::Gallery;

use crate::config::UpstreamConfig;
use crate::error::{Error, Result};
use reqwest::header::COOKIE;
use reqwest::{redirect, Client, RequestBuilder, Response};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Age-gate cookie upstream expects before serving NSFW listings
const AGE_GATE_COOKIE: &str = "over18=1";

/// Upstream client shared by every request the pipeline serves.
///
/// Holds two connection pools: one that follows redirects for normal fetches,
/// and one that never does, used to read a share link's `Location` header
/// without touching the destination page.
pub struct RedditClient {
    client: Client,
    no_redirect_client: Client,
    config: UpstreamConfig,
}

impl RedditClient {
    pub fn new(config: UpstreamConfig) -> Result<Self> {
        let client = Self::builder(&config).build()?;
        let no_redirect_client = Self::builder(&config)
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            no_redirect_client,
            config,
        })
    }

    // The upstream CDN rate limits HTTP/2 from non-browser clients harder.
    fn builder(config: &UpstreamConfig) -> reqwest::ClientBuilder {
        Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout())
            .http1_only()
    }

    pub(crate) fn get(&self, url: &str) -> RequestBuilder {
        self.client.get(url).header(COOKIE, AGE_GATE_COOKIE)
    }

    fn get_without_redirects(&self, url: &str) -> RequestBuilder {
        self.no_redirect_client
            .get(url)
            .header(COOKIE, AGE_GATE_COOKIE)
    }

    /// Resolves a user-supplied post link and extracts its gallery.
    pub async fn fetch_gallery(&self, input: &str, cancel: &CancellationToken) -> Result<Gallery> {
        let canonical = self.resolve(input, cancel).await?;
        let mut gallery = self.fetch(&canonical, cancel).await?;
        gallery.source_url = input.to_string();

        info!(
            "Loaded {} images from {}",
            gallery.images.len(),
            gallery.source_url
        );
        Ok(gallery)
    }
}

/// Sends a request, aborting as soon as `cancel` fires.
pub(crate) async fn send(request: RequestBuilder, cancel: &CancellationToken) -> Result<Response> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        response = request.send() => Ok(response?),
    }
}
