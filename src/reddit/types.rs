use serde::Serialize;

/// Downloadable images of one post. `images` is never empty.
#[derive(Debug, Clone, Serialize)]
pub struct Gallery {
    pub title: String,
    pub images: Vec<String>,
    pub source_url: String,
}
