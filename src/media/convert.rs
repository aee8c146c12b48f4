use crate::error::{Error, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::str::FromStr;
use tracing::debug;

/// Quality used for every lossy encode
pub const JPEG_QUALITY: u8 = 90;

/// Output format requested for an asset. `Original` streams bytes untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetFormat {
    #[default]
    Original,
    Jpeg,
    Png,
    Gif,
}

struct Encoding {
    extension: &'static str,
    content_type: &'static str,
    encode: fn(&DynamicImage, &mut Vec<u8>) -> image::ImageResult<()>,
}

const JPEG: Encoding = Encoding {
    extension: ".jpg",
    content_type: "image/jpeg",
    encode: encode_jpeg,
};

const PNG: Encoding = Encoding {
    extension: ".png",
    content_type: "image/png",
    encode: encode_png,
};

const GIF: Encoding = Encoding {
    extension: ".gif",
    content_type: "image/gif",
    encode: encode_gif,
};

fn encode_jpeg(image: &DynamicImage, out: &mut Vec<u8>) -> image::ImageResult<()> {
    // JPEG has no alpha channel
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    rgb.write_with_encoder(JpegEncoder::new_with_quality(out, JPEG_QUALITY))
}

fn encode_png(image: &DynamicImage, out: &mut Vec<u8>) -> image::ImageResult<()> {
    image.write_to(&mut Cursor::new(out), ImageFormat::Png)
}

fn encode_gif(image: &DynamicImage, out: &mut Vec<u8>) -> image::ImageResult<()> {
    image.write_to(&mut Cursor::new(out), ImageFormat::Gif)
}

impl TargetFormat {
    fn encoding(self) -> Option<&'static Encoding> {
        match self {
            TargetFormat::Original => None,
            TargetFormat::Jpeg => Some(&JPEG),
            TargetFormat::Png => Some(&PNG),
            TargetFormat::Gif => Some(&GIF),
        }
    }

    pub fn is_original(self) -> bool {
        self == TargetFormat::Original
    }

    /// Canonical extension of the encoded output, `None` for passthrough.
    pub fn extension(self) -> Option<&'static str> {
        self.encoding().map(|encoding| encoding.extension)
    }

    pub fn content_type(self) -> Option<&'static str> {
        self.encoding().map(|encoding| encoding.content_type)
    }

    /// Extension a caller should name the output with.
    pub fn output_extension(self, original: &str) -> String {
        self.extension().unwrap_or(original).to_string()
    }
}

impl FromStr for TargetFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "original" => Ok(TargetFormat::Original),
            "jpg" | "jpeg" => Ok(TargetFormat::Jpeg),
            "png" => Ok(TargetFormat::Png),
            "gif" => Ok(TargetFormat::Gif),
            other => Err(Error::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Decodes `input` and re-encodes it as `target`.
///
/// Decoding needs the complete input, so this is the one place an asset is
/// held in memory in full. `Original` returns the input unchanged.
pub fn convert(input: &[u8], target: TargetFormat) -> Result<Vec<u8>> {
    let Some(encoding) = target.encoding() else {
        return Ok(input.to_vec());
    };

    let image = image::load_from_memory(input).map_err(Error::Decode)?;
    debug!(
        "Decoded {}x{} image, encoding as {}",
        image.width(),
        image.height(),
        encoding.extension
    );

    let mut out = Vec::new();
    (encoding.encode)(&image, &mut out).map_err(Error::Encode)?;
    Ok(out)
}

/// Runs [`convert`] on the blocking pool.
pub async fn convert_blocking(input: Vec<u8>, target: TargetFormat) -> Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || convert(&input, target))
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?
}
