//! The inference-service boundary.
//!
//! The pipeline talks to recognition back-ends only through
//! [`InferenceService`]. Adapters return a structured [`ServiceFailure`]
//! whose [`FailureKind`] decides how the failure is shown to the user, so
//! the pipeline never inspects free-text error messages itself.
//!
//! Two adapters ship with the crate:
//!
//! * [`gemini::GeminiService`]: native `generateContent` over `reqwest`;
//!   the only back-end that enforces the output schema server-side and
//!   honours the thinking budget.
//! * [`provider::LlmProviderService`]: any `edgequake_llm::LLMProvider`
//!   (OpenAI, Anthropic, Ollama, …); the schema travels as prompt text.
//!
//! Text-pattern classification lives in [`FailureKind::classify_message`]
//! and is only used by adapters whose provider reports nothing better than
//! a message string.

pub mod gemini;
pub mod provider;

use crate::error::ConversionError;
use crate::pipeline::request::ConversionRequest;
use async_trait::async_trait;
use thiserror::Error;

pub use gemini::GeminiService;
pub use provider::LlmProviderService;

/// Why a service call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The service could not be reached or dropped the connection.
    Connectivity,
    /// The call did not finish in time.
    Timeout,
    /// The service's safety filter refused the input or the output.
    SafetyBlocked,
    /// Anything else: bad credentials, quota, invalid request, …
    Other,
}

impl FailureKind {
    /// Classify a free-text failure description.
    ///
    /// Connectivity symptoms are checked before safety symptoms.
    pub fn classify_message(message: &str) -> Self {
        let m = message.to_ascii_lowercase();
        const CONNECTIVITY: [&str; 6] = [
            "fetch",
            "network",
            "connection",
            "connect error",
            "dns",
            "unreachable",
        ];
        if CONNECTIVITY.iter().any(|p| m.contains(p)) {
            return FailureKind::Connectivity;
        }
        if m.contains("timed out") || m.contains("timeout") {
            return FailureKind::Timeout;
        }
        if m.contains("safety") || m.contains("blocked") {
            return FailureKind::SafetyBlocked;
        }
        FailureKind::Other
    }
}

/// A failed service call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ServiceFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ServiceFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Build a failure whose kind is inferred from its message.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: FailureKind::classify_message(&message),
            message,
        }
    }
}

impl From<ServiceFailure> for ConversionError {
    fn from(f: ServiceFailure) -> Self {
        match f.kind {
            FailureKind::Connectivity | FailureKind::Timeout => {
                ConversionError::Connectivity { detail: f.message }
            }
            FailureKind::SafetyBlocked => ConversionError::ContentRejected { detail: f.message },
            FailureKind::Other => ConversionError::unexpected(f.message),
        }
    }
}

/// The raw reply of one successful call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceResponse {
    /// The reply text; `None` when the service answered without text.
    pub text: Option<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl ServiceResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }
}

/// A vision-language back-end that can analyse one sheet-music image.
///
/// Implementations make exactly one attempt per call: no retries, no
/// streaming, no partial results.
#[async_trait]
pub trait InferenceService: Send + Sync {
    /// Short identifier used in logs and stats, e.g. "gemini".
    fn name(&self) -> &str;

    /// Submit `request` and wait for the complete reply.
    async fn analyze(&self, request: &ConversionRequest) -> Result<ServiceResponse, ServiceFailure>;
}
