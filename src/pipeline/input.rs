//! Input resolution: turn a user-supplied upload, path, or URL into an
//! in-memory [`ImageAsset`].
//!
//! Images never touch the disk on our side. A local file is stat'ed before it
//! is read and a URL body is streamed, so nothing larger than the upload limit
//! is ever buffered. The bytes live only for the duration of one attempt. The declared media type is trusted when it is an `image/*` type;
//! when it is missing or generic (`application/octet-stream`, which is what
//! many upload widgets and HTTP servers send) the type is sniffed from the
//! magic bytes instead.

use crate::error::{ConversionError, Sheet2XmlError};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Media types that say nothing about the content.
const GENERIC_MEDIA_TYPES: [&str; 2] = ["application/octet-stream", "binary/octet-stream"];

/// An image file selection as delivered by the surrounding application.
///
/// `size` is the size the upload reports; it is checked against the upload
/// limit before any bytes are encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub declared_media_type: Option<String>,
    pub size: u64,
}

impl ImageUpload {
    /// Wrap raw bytes; `size` is taken from the byte length.
    pub fn new(bytes: Vec<u8>, declared_media_type: Option<&str>) -> Self {
        let size = bytes.len() as u64;
        Self {
            bytes,
            declared_media_type: declared_media_type.map(str::to_string),
            size,
        }
    }
}

/// A validated image ready for encoding: raw bytes and an `image/*` media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    bytes: Vec<u8>,
    media_type: String,
}

impl ImageAsset {
    /// Validate an upload, resolving its media type.
    ///
    /// # Errors
    /// [`ConversionError::MalformedInput`] when the upload is empty or is not
    /// an image.
    pub fn from_upload(upload: ImageUpload) -> Result<Self, ConversionError> {
        Self::new(upload.bytes, upload.declared_media_type.as_deref())
    }

    /// Validate raw bytes with an optional declared media type.
    pub fn new(bytes: Vec<u8>, declared_media_type: Option<&str>) -> Result<Self, ConversionError> {
        if bytes.is_empty() {
            return Err(ConversionError::malformed("the image file is empty"));
        }
        let media_type = resolve_media_type(&bytes, declared_media_type)?;
        Ok(Self { bytes, media_type })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Reject uploads larger than `limit` bytes.
pub fn ensure_within_limit(size: u64, limit: u64) -> Result<(), ConversionError> {
    if size > limit {
        return Err(ConversionError::OversizedInput { size, limit });
    }
    Ok(())
}

/// Whether `media_type` is an `image/*` type.
pub fn is_image_media_type(media_type: &str) -> bool {
    media_type
        .trim()
        .to_ascii_lowercase()
        .strip_prefix("image/")
        .is_some_and(|sub| !sub.is_empty())
}

/// Decide the media type of `bytes`.
///
/// A declared `image/*` type wins; parameters such as `; q=0.9` are dropped.
/// A missing or generic declaration falls back to sniffing the magic bytes.
/// Anything else is rejected.
pub fn resolve_media_type(bytes: &[u8], declared: Option<&str>) -> Result<String, ConversionError> {
    let declared = declared.map(|d| essence(d).to_ascii_lowercase());

    match declared.as_deref() {
        Some(d) if is_image_media_type(d) => Ok(d.to_string()),
        None | Some("") => sniff_media_type(bytes),
        Some(d) if GENERIC_MEDIA_TYPES.contains(&d) => sniff_media_type(bytes),
        Some(d) => Err(ConversionError::malformed(format!(
            "'{d}' is not an image media type"
        ))),
    }
}

/// The `type/subtype` part of a media type, without parameters.
fn essence(media_type: &str) -> &str {
    media_type.split(';').next().unwrap_or(media_type).trim()
}

fn sniff_media_type(bytes: &[u8]) -> Result<String, ConversionError> {
    let format = image::guess_format(bytes)
        .map_err(|_| ConversionError::malformed("the file is not a recognised image format"))?;
    let media_type = format.to_mime_type();
    debug!("Sniffed media type {}", media_type);
    Ok(media_type.to_string())
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to an in-memory upload.
///
/// If the input is a URL, download it. If it is a local file, read it.
/// Either way an input over `max_bytes` fails with
/// [`ConversionError::OversizedInput`] before more than `max_bytes` are held.
pub async fn resolve_input(
    input: &str,
    timeout_secs: u64,
    max_bytes: u64,
) -> Result<ImageUpload, Sheet2XmlError> {
    if input.trim().is_empty() {
        return Err(Sheet2XmlError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs, max_bytes).await
    } else {
        let path = Path::new(input);
        ensure_within_limit(local_file_size(path).await?, max_bytes)?;
        read_local(path).await
    }
}

/// Size of a local file, without reading it.
pub async fn local_file_size(path: &Path) -> Result<u64, Sheet2XmlError> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| map_io_error(path, e))?;
    if !meta.is_file() {
        return Err(Sheet2XmlError::InvalidInput {
            input: path.display().to_string(),
        });
    }
    Ok(meta.len())
}

/// Read a local image file. The extension supplies the declared media type.
pub async fn read_local(path: &Path) -> Result<ImageUpload, Sheet2XmlError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| map_io_error(path, e))?;

    let declared = image::ImageFormat::from_path(path)
        .ok()
        .map(|f| f.to_mime_type());

    debug!("Read local image: {} ({} bytes)", path.display(), bytes.len());
    Ok(ImageUpload::new(bytes, declared))
}

fn map_io_error(path: &Path, e: std::io::Error) -> Sheet2XmlError {
    let path = PathBuf::from(path);
    match e.kind() {
        std::io::ErrorKind::NotFound => Sheet2XmlError::FileNotFound { path },
        std::io::ErrorKind::PermissionDenied => Sheet2XmlError::PermissionDenied { path },
        _ => Sheet2XmlError::Internal(format!("Failed to read '{}': {}", path.display(), e)),
    }
}

/// Download a URL into memory. `Content-Type` supplies the declared media type.
///
/// A `Content-Length` over `max_bytes` is rejected before the body is read;
/// otherwise the body is streamed and abandoned as soon as it passes the limit.
async fn download_url(url: &str, timeout_secs: u64, max_bytes: u64) -> Result<ImageUpload, Sheet2XmlError> {
    info!("Downloading image from: {}", url);

    let failed = |e: reqwest::Error| {
        if e.is_timeout() {
            Sheet2XmlError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            Sheet2XmlError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Sheet2XmlError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let mut response = client.get(url).send().await.map_err(failed)?;

    if !response.status().is_success() {
        return Err(Sheet2XmlError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    if let Some(len) = response.content_length() {
        ensure_within_limit(len, max_bytes)?;
    }

    let declared = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| essence(v).to_string());

    let mut bytes = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(failed)? {
        let received = (bytes.len() + chunk.len()) as u64;
        if received > max_bytes {
            debug!("Abandoning download of {} after {} bytes", url, received);
            return Err(ConversionError::OversizedInput {
                size: received,
                limit: max_bytes,
            }
            .into());
        }
        bytes.extend_from_slice(&chunk);
    }

    info!("Downloaded {} bytes", bytes.len());
    Ok(ImageUpload::new(bytes, declared.as_deref()))
}
