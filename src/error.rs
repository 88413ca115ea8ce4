//! Error types for the edgequake-sheet2xml library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ConversionError`]: **Per-attempt**: one conversion attempt failed
//!   (image too large, the model answered with garbage, the network dropped).
//!   It is cloneable and serialisable because the session state machine keeps
//!   it inside [`crate::session::SessionState::Error`] and renders its message
//!   verbatim to the user.
//!
//! * [`Sheet2XmlError`]: **Fatal**: the conversion cannot even be attempted
//!   (file not found, provider not configured, invalid configuration) or its
//!   output could not be written. Returned from the top-level `convert_*`
//!   functions; a failed attempt is wrapped in [`Sheet2XmlError::Conversion`].
//!
//! No failure is retried automatically. The user re-initiates the attempt.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Phrase used when a failure carries no message of its own.
pub const GENERIC_FAILURE_MESSAGE: &str = "An unexpected error occurred during analysis.";

/// Category of a [`ConversionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    OversizedInput,
    ReadFailed,
    MalformedInput,
    EmptyResponse,
    IncompleteRecognition,
    Connectivity,
    ContentRejected,
    Unexpected,
}

/// A classified, user-facing failure of a single conversion attempt.
///
/// Every variant's `Display` output is the message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConversionError {
    /// The selected file exceeds the upload limit. Checked before the
    /// pipeline is invoked.
    #[error("File is too large ({size} bytes, maximum is {limit} bytes).")]
    OversizedInput { size: u64, limit: u64 },

    /// The file could not be read from disk or from the upload.
    #[error("The file could not be read: {detail}")]
    ReadFailed { detail: String },

    /// The image could not be encoded, or the service reply was not the
    /// expected JSON object.
    #[error("Malformed input: {detail}")]
    MalformedInput { detail: String },

    /// The service replied without any text.
    #[error("The recognition service returned no response. Check the image quality.")]
    EmptyResponse,

    /// The service replied, but the MusicXML is missing or too short to be
    /// real notation.
    #[error(
        "The notes could not be fully recognised ({length} characters of MusicXML). \
Please upload a clearer image."
    )]
    IncompleteRecognition { length: usize },

    /// Transport-level failure reaching the service.
    #[error("Network or service connection failed. Please try again.")]
    Connectivity { detail: String },

    /// The service's safety filter refused the image.
    #[error("The image was blocked by the safety filter. Upload sheet music only.")]
    ContentRejected { detail: String },

    /// Anything else. Carries the original message, or
    /// [`GENERIC_FAILURE_MESSAGE`] when there was none.
    #[error("{message}")]
    Unexpected { message: String },
}

impl ConversionError {
    /// Build an [`ConversionError::Unexpected`] from an optional message,
    /// falling back to [`GENERIC_FAILURE_MESSAGE`] for empty input.
    pub fn unexpected(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            ConversionError::Unexpected {
                message: GENERIC_FAILURE_MESSAGE.to_string(),
            }
        } else {
            ConversionError::Unexpected { message }
        }
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        ConversionError::MalformedInput {
            detail: detail.into(),
        }
    }

    /// The category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConversionError::OversizedInput { .. } => ErrorKind::OversizedInput,
            ConversionError::ReadFailed { .. } => ErrorKind::ReadFailed,
            ConversionError::MalformedInput { .. } => ErrorKind::MalformedInput,
            ConversionError::EmptyResponse => ErrorKind::EmptyResponse,
            ConversionError::IncompleteRecognition { .. } => ErrorKind::IncompleteRecognition,
            ConversionError::Connectivity { .. } => ErrorKind::Connectivity,
            ConversionError::ContentRejected { .. } => ErrorKind::ContentRejected,
            ConversionError::Unexpected { .. } => ErrorKind::Unexpected,
        }
    }
}

/// All fatal errors returned by the edgequake-sheet2xml library.
#[derive(Debug, Error)]
pub enum Sheet2XmlError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Image file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Service errors ────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("Recognition provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Attempt errors ────────────────────────────────────────────────────
    /// The conversion attempt itself failed.
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output MusicXML file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Sheet2XmlError {
    /// The attempt-level error, if this fatal error wraps one.
    pub fn as_conversion(&self) -> Option<&ConversionError> {
        match self {
            Sheet2XmlError::Conversion(e) => Some(e),
            _ => None,
        }
    }
}

/// An event the session state machine refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// A new file was selected while an attempt is still in progress or a
    /// result is still displayed.
    #[error("Cannot accept a new file while the session is {phase}; reset first")]
    Busy { phase: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unexpected_falls_back_to_generic_message() {
        let e = ConversionError::unexpected("   ");
        assert_eq!(e.to_string(), GENERIC_FAILURE_MESSAGE);
        assert_eq!(e.kind(), ErrorKind::Unexpected);
    }

    #[test]
    fn unexpected_keeps_original_message() {
        let e = ConversionError::unexpected("quota exceeded for project");
        assert_eq!(e.to_string(), "quota exceeded for project");
    }

    #[test]
    fn oversized_display() {
        let e = ConversionError::OversizedInput {
            size: 11 * 1024 * 1024,
            limit: 10 * 1024 * 1024,
        };
        let msg = e.to_string();
        assert!(msg.contains("too large"), "got: {msg}");
        assert!(msg.contains("10485760"), "got: {msg}");
    }

    #[test]
    fn content_rejected_hides_raw_detail() {
        let e = ConversionError::ContentRejected {
            detail: "blockReason=SAFETY".into(),
        };
        assert!(!e.to_string().contains("blockReason"));
        assert_eq!(e.kind(), ErrorKind::ContentRejected);
    }

    #[test]
    fn conversion_error_serialises_with_kind_tag() {
        let e = ConversionError::IncompleteRecognition { length: 12 };
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["kind"], "incomplete_recognition");
        assert_eq!(json["length"], 12);
    }

    #[test]
    fn fatal_wraps_conversion_transparently() {
        let inner = ConversionError::EmptyResponse;
        let e: Sheet2XmlError = inner.clone().into();
        assert_eq!(e.to_string(), inner.to_string());
        assert_eq!(e.as_conversion(), Some(&inner));
    }

    #[test]
    fn busy_display_names_phase() {
        let e = TransitionError::Busy {
            phase: "analyzing".into(),
        };
        assert!(e.to_string().contains("analyzing"));
    }
}
