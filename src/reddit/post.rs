use super::{send, Gallery, RedditClient};
use crate::error::{Error, Result};
use crate::utils::unescape_html;
use serde::Deserialize;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Post fields the extractor cares about, flattened out of upstream's
/// listing envelope. Every field is optional; absence is routine.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PostRecord {
    pub title: Option<String>,
    pub is_gallery: bool,
    pub direct_url: Option<String>,
    pub gallery_items: Option<Vec<GalleryItem>>,
    pub media_metadata: Option<HashMap<String, MediaSources>>,
    pub preview_variants: Option<Vec<PreviewVariant>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GalleryItem {
    pub media_id: String,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct MediaSources {
    pub static_url: Option<String>,
    pub animated_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreviewVariant {
    pub animated_url: Option<String>,
}

// Wire shape of `<post>.json`: [{ data: { children: [{ data: <post> }] } }, <comments>]

#[derive(Debug, Deserialize)]
struct Listing {
    data: Option<ListingData>,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    children: Option<Vec<ListingChild>>,
}

#[derive(Debug, Deserialize)]
struct ListingChild {
    data: Option<RawPost>,
}

#[derive(Debug, Deserialize)]
struct RawPost {
    title: Option<String>,
    is_gallery: Option<bool>,
    url_overridden_by_dest: Option<String>,
    gallery_data: Option<RawGalleryData>,
    media_metadata: Option<HashMap<String, RawMedia>>,
    preview: Option<RawPreview>,
}

#[derive(Debug, Deserialize)]
struct RawGalleryData {
    items: Option<Vec<RawGalleryItem>>,
}

#[derive(Debug, Deserialize)]
struct RawGalleryItem {
    media_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMedia {
    s: Option<RawMediaSource>,
}

#[derive(Debug, Deserialize)]
struct RawMediaSource {
    u: Option<String>,
    gif: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPreview {
    images: Option<Vec<RawPreviewImage>>,
}

#[derive(Debug, Deserialize)]
struct RawPreviewImage {
    variants: Option<RawVariants>,
}

#[derive(Debug, Deserialize)]
struct RawVariants {
    gif: Option<RawVariant>,
}

#[derive(Debug, Deserialize)]
struct RawVariant {
    source: Option<RawVariantSource>,
}

#[derive(Debug, Deserialize)]
struct RawVariantSource {
    url: Option<String>,
}

impl From<RawPost> for PostRecord {
    fn from(raw: RawPost) -> Self {
        let gallery_items = raw
            .gallery_data
            .and_then(|data| data.items)
            .map(|items| {
                items
                    .into_iter()
                    .filter_map(|item| item.media_id)
                    .map(|media_id| GalleryItem { media_id })
                    .collect()
            });

        let media_metadata = raw.media_metadata.map(|metadata| {
            metadata
                .into_iter()
                .map(|(id, media)| {
                    let sources = media
                        .s
                        .map(|s| MediaSources {
                            static_url: s.u,
                            animated_url: s.gif,
                        })
                        .unwrap_or_default();
                    (id, sources)
                })
                .collect()
        });

        let preview_variants = raw.preview.and_then(|preview| preview.images).map(|images| {
            images
                .into_iter()
                .filter_map(|image| image.variants)
                .filter_map(|variants| variants.gif)
                .map(|gif| PreviewVariant {
                    animated_url: gif.source.and_then(|source| source.url),
                })
                .collect()
        });

        PostRecord {
            title: raw.title,
            is_gallery: raw.is_gallery.unwrap_or(false),
            direct_url: raw.url_overridden_by_dest,
            gallery_items,
            media_metadata,
            preview_variants,
        }
    }
}

/// Parses a `<post>.json` body into the first post's record.
pub(crate) fn parse_listing(body: &[u8]) -> Result<PostRecord> {
    let listings: Vec<Listing> = serde_json::from_slice(body)?;

    listings
        .into_iter()
        .next()
        .and_then(|listing| listing.data)
        .and_then(|data| data.children)
        .and_then(|children| children.into_iter().next())
        .and_then(|child| child.data)
        .map(PostRecord::from)
        .ok_or(Error::PostNotFound)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Derives the ordered image URLs of a post. The first tier that yields
/// anything wins: gallery items, then animated preview variants, then the
/// post's direct link.
pub fn extract_images(post: &PostRecord) -> Vec<String> {
    let mut images: Vec<&str> = Vec::new();

    if post.is_gallery {
        if let Some(items) = &post.gallery_items {
            for item in items {
                let Some(media) = post
                    .media_metadata
                    .as_ref()
                    .and_then(|metadata| metadata.get(&item.media_id))
                else {
                    continue;
                };

                // Animated source first, static otherwise.
                if let Some(url) =
                    non_empty(&media.animated_url).or_else(|| non_empty(&media.static_url))
                {
                    images.push(url);
                }
            }
        }
    }

    if images.is_empty() {
        if let Some(variants) = &post.preview_variants {
            images.extend(variants.iter().filter_map(|v| non_empty(&v.animated_url)));
        }
    }

    if images.is_empty() {
        if let Some(url) = non_empty(&post.direct_url) {
            images.push(url);
        }
    }

    // Upstream JSON double-encodes query separators.
    images.into_iter().map(unescape_html).collect()
}

impl RedditClient {
    /// Fetches the JSON description of a canonical post URL and builds its gallery.
    pub async fn fetch(&self, canonical_url: &str, cancel: &CancellationToken) -> Result<Gallery> {
        let api_url = format!("{}.json", canonical_url.trim_end_matches('/'));
        debug!("Fetching post data from {}", api_url);

        let response = send(self.get(&api_url), cancel).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::UpstreamStatus(status.as_u16()));
        }

        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            body = response.bytes() => body?,
        };

        let post = parse_listing(&body)?;
        let images = extract_images(&post);
        if images.is_empty() {
            return Err(Error::NoImages);
        }

        debug!("Extracted {} images", images.len());
        Ok(Gallery {
            title: post.title.unwrap_or_default(),
            images,
            source_url: canonical_url.to_string(),
        })
    }
}
