//! Photo payload decoding and format detection.
//!
//! Photos arrive as base64 strings, optionally wrapped in a
//! `data:<mime>;base64,<data>` URI. The file extension used when staging a
//! photo on disk is chosen from, in order: the data-URI mime type, the magic
//! bytes of the decoded payload, a caller hint, and finally `.jpg`.

use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use image::DynamicImage;

const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];

/// Image formats recognised for staged photos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFormatHint {
    Png,
    #[default]
    Jpeg,
    Webp,
}

impl ImageFormatHint {
    /// File extension including the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => ".png",
            Self::Jpeg => ".jpg",
            Self::Webp => ".webp",
        }
    }

    /// Determine format from a mime type such as `image/png`.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime.to_ascii_lowercase();
        if mime.contains("png") {
            Some(Self::Png)
        } else if mime.contains("webp") {
            Some(Self::Webp)
        } else if mime.contains("jpeg") || mime.contains("jpg") {
            Some(Self::Jpeg)
        } else {
            None
        }
    }
}

impl std::str::FromStr for ImageFormatHint {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "webp" => Ok(Self::Webp),
            other => Err(format!("unknown image format '{other}'")),
        }
    }
}

/// Sniff the format from magic bytes.
pub fn sniff_format(bytes: &[u8]) -> Option<ImageFormatHint> {
    if bytes.starts_with(&PNG_MAGIC) {
        Some(ImageFormatHint::Png)
    } else if bytes.starts_with(&JPEG_MAGIC) {
        Some(ImageFormatHint::Jpeg)
    } else if bytes.len() >= 12 && &bytes[8..12] == b"WEBP" {
        Some(ImageFormatHint::Webp)
    } else {
        None
    }
}

/// Split a `data:` URI into its mime type and payload. Plain base64 yields no mime.
pub fn split_data_uri(raw: &str) -> (Option<&str>, &str) {
    let raw = raw.trim();
    if let Some(rest) = raw.strip_prefix("data:")
        && let Some((header, payload)) = rest.split_once(',')
    {
        let mime = header.split(';').next().unwrap_or_default();
        return (Some(mime), payload);
    }
    (None, raw)
}

/// A decoded (but not yet image-decoded) photo payload.
#[derive(Debug, Clone)]
pub struct PhotoPayload {
    pub bytes: Vec<u8>,
    pub mime: Option<String>,
}

impl PhotoPayload {
    /// Decode a base64 string or data URI.
    pub fn from_base64(raw: &str) -> Result<Self> {
        let (mime, payload) = split_data_uri(raw);
        let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = BASE64
            .decode(cleaned.as_bytes())
            .context("photo payload is not valid base64")?;
        anyhow::ensure!(!bytes.is_empty(), "photo payload is empty");
        Ok(Self {
            bytes,
            mime: mime.map(str::to_string),
        })
    }

    /// Resolve the staging format: mime header, magic bytes, hint, then JPEG.
    pub fn format(&self, hint: Option<ImageFormatHint>) -> ImageFormatHint {
        self.mime
            .as_deref()
            .and_then(ImageFormatHint::from_mime)
            .or_else(|| sniff_format(&self.bytes))
            .or(hint)
            .unwrap_or_default()
    }
}

/// A photo decoded into pixels.
#[derive(Debug, Clone)]
pub struct DecodedPhoto {
    pub image: DynamicImage,
    pub format: ImageFormatHint,
}

/// Decode a base64 photo string into an image.
pub fn decode_photo(raw: &str) -> Result<DecodedPhoto> {
    let payload = PhotoPayload::from_base64(raw)?;
    let format = payload.format(None);
    let image = image::load_from_memory(&payload.bytes).context("failed to decode photo bytes")?;
    Ok(DecodedPhoto { image, format })
}
