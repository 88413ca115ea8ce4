//! Image encoding: [`ImageAsset`] → base64 data URL wrapped in [`EncodedImage`].
//!
//! Multimodal APIs accept images as base64 payloads embedded in the JSON
//! request body. The data-URL form (`data:<media>;base64,<payload>`) is
//! self-describing, doubles as the preview the UI shows while the analysis
//! runs, and is split back into `(media type, payload)` when the request is
//! built. The bytes are sent as-is: re-encoding a photo would only cost
//! detail the recognition model needs.

use crate::error::ConversionError;
use crate::pipeline::input::ImageAsset;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static RE_DATA_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^data:([^;,]+);base64,(.*)$").expect("valid data-url regex"));

/// An image as a self-describing `data:` string plus its parsed parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    data_url: String,
    media_type: String,
    payload_start: usize,
}

impl EncodedImage {
    /// Parse a `data:<media>;base64,<payload>` string.
    ///
    /// # Errors
    /// [`ConversionError::MalformedInput`] when the media-type tag or the
    /// base64 marker is missing, or the payload is empty.
    pub fn parse(data_url: impl Into<String>) -> Result<Self, ConversionError> {
        let data_url = data_url.into();
        let (media_type, payload_start) = {
            let caps = RE_DATA_URL.captures(&data_url).ok_or_else(|| {
                ConversionError::malformed("the image encoding is invalid or the file is corrupt")
            })?;
            let payload = caps.get(2).map(|m| (m.start(), m.as_str()));
            match payload {
                Some((start, p)) if !p.is_empty() => (caps[1].trim().to_string(), start),
                _ => return Err(ConversionError::malformed("the encoded image is empty")),
            }
        };

        Ok(Self {
            data_url,
            media_type,
            payload_start,
        })
    }

    /// The full `data:` string.
    pub fn data_url(&self) -> &str {
        &self.data_url
    }

    /// The media-type tag, e.g. `image/jpeg`.
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// The base64 payload, without the `data:` prefix.
    pub fn payload(&self) -> &str {
        &self.data_url[self.payload_start..]
    }
}

/// Encode an image asset as a data URL.
pub fn encode_image(asset: &ImageAsset) -> Result<EncodedImage, ConversionError> {
    let b64 = STANDARD.encode(asset.bytes());
    debug!(
        "Encoded {} image → {} bytes base64",
        asset.media_type(),
        b64.len()
    );
    EncodedImage::parse(format!("data:{};base64,{}", asset.media_type(), b64))
}
