//! Native Gemini adapter: `models/{model}:generateContent` over `reqwest`.
//!
//! Gemini is the reference back-end because it enforces the output schema
//! server-side (`responseMimeType` + `responseSchema`) and accepts a
//! thinking budget separate from the visible output budget. The request has
//! one `inlineData` image part followed by one text part.
//!
//! Failures are classified structurally wherever Gemini gives us structure:
//! `promptFeedback.blockReason` and safety `finishReason`s become
//! [`FailureKind::SafetyBlocked`], reqwest connect errors become
//! [`FailureKind::Connectivity`], reqwest timeouts become
//! [`FailureKind::Timeout`]. Only HTTP error bodies fall back to
//! [`FailureKind::classify_message`].

use crate::error::Sheet2XmlError;
use crate::pipeline::request::ConversionRequest;
use crate::service::{FailureKind, InferenceService, ServiceFailure, ServiceResponse};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Default REST endpoint base.
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Candidate finish reasons that mean the safety layer intervened.
const SAFETY_FINISH_REASONS: [&str; 5] = [
    "SAFETY",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
    "IMAGE_SAFETY",
];

// ── Wire types: request ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Part<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: serde_json::Value,
    temperature: f32,
    max_output_tokens: usize,
    thinking_config: ThinkingConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
}

// ── Wire types: response ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

// ── Adapter ──────────────────────────────────────────────────────────────────

/// Gemini `generateContent` client. The API key is fixed at construction.
#[derive(Clone)]
pub struct GeminiService {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl fmt::Debug for GeminiService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiService")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GeminiService {
    /// Create a client for `model` authenticated with `api_key`.
    ///
    /// # Errors
    /// [`Sheet2XmlError::ProviderNotConfigured`] when the key is empty.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, Sheet2XmlError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Sheet2XmlError::ProviderNotConfigured {
                provider: "gemini".to_string(),
                hint: "Set GEMINI_API_KEY or pass --api-key.".to_string(),
            });
        }
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Sheet2XmlError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            model: model.into(),
            base_url: GEMINI_API_BASE.to_string(),
        })
    }

    /// Point the client at a different endpoint base (proxies, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

#[async_trait]
impl InferenceService for GeminiService {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn analyze(&self, request: &ConversionRequest) -> Result<ServiceResponse, ServiceFailure> {
        let body = request_body(request);
        debug!("POST {} (model {})", self.endpoint(), self.model);

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(map_transport_error)?;

        if !status.is_success() {
            let failure = failure_from_http(status, &text);
            warn!("Gemini returned HTTP {}: {}", status, failure.message);
            return Err(failure);
        }

        parse_generate_response(&text)
    }
}

/// Build the body of a `generateContent` call.
fn request_body(request: &ConversionRequest) -> GenerateContentRequest<'_> {
    let generation = request.generation();
    GenerateContentRequest {
        contents: vec![Content {
            role: "user",
            parts: vec![
                Part {
                    inline_data: Some(InlineData {
                        mime_type: request.image().media_type(),
                        data: request.image().payload(),
                    }),
                    text: None,
                },
                Part {
                    inline_data: None,
                    text: Some(request.prompt()),
                },
            ],
        }],
        generation_config: GenerationConfig {
            response_mime_type: "application/json",
            response_schema: request.schema().to_json_schema(),
            temperature: generation.temperature,
            max_output_tokens: generation.max_output_tokens,
            thinking_config: ThinkingConfig {
                thinking_budget: generation.thinking_budget,
            },
        },
    }
}

/// Interpret a successful (HTTP 2xx) `generateContent` body.
///
/// Thought-summary parts are skipped; the remaining text parts of the first
/// candidate are concatenated.
pub fn parse_generate_response(body: &str) -> Result<ServiceResponse, ServiceFailure> {
    let parsed: GenerateContentResponse = serde_json::from_str(body).map_err(|e| {
        ServiceFailure::new(
            FailureKind::Other,
            format!("Unreadable response from Gemini: {e}"),
        )
    })?;

    if let Some(reason) = parsed
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.as_deref())
    {
        return Err(ServiceFailure::new(
            FailureKind::SafetyBlocked,
            format!("Prompt blocked: {reason}"),
        ));
    }

    let (input_tokens, output_tokens) = parsed
        .usage_metadata
        .as_ref()
        .map(|u| (u.prompt_token_count, u.candidates_token_count))
        .unwrap_or((0, 0));

    let Some(candidate) = parsed.candidates.into_iter().next() else {
        return Ok(ServiceResponse {
            text: None,
            input_tokens,
            output_tokens,
        });
    };

    if let Some(reason) = candidate.finish_reason.as_deref() {
        if SAFETY_FINISH_REASONS.contains(&reason) {
            return Err(ServiceFailure::new(
                FailureKind::SafetyBlocked,
                format!("Response blocked: finishReason={reason}"),
            ));
        }
        if reason == "MAX_TOKENS" {
            warn!("Gemini stopped at the output token limit; MusicXML is likely truncated");
        }
    }

    let text: String = candidate
        .content
        .map(|c| {
            c.parts
                .into_iter()
                .filter(|p| !p.thought)
                .filter_map(|p| p.text)
                .collect()
        })
        .unwrap_or_default();

    Ok(ServiceResponse {
        text: (!text.is_empty()).then_some(text),
        input_tokens,
        output_tokens,
    })
}

fn map_transport_error(e: reqwest::Error) -> ServiceFailure {
    if e.is_timeout() {
        ServiceFailure::new(FailureKind::Timeout, e.to_string())
    } else if e.is_connect() || e.is_request() {
        ServiceFailure::new(FailureKind::Connectivity, e.to_string())
    } else {
        ServiceFailure::from_message(e.to_string())
    }
}

/// Classify a non-2xx reply.
fn failure_from_http(status: StatusCode, body: &str) -> ServiceFailure {
    let (message, api_status) = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|env| (env.error.message, env.error.status))
        .unwrap_or_else(|_| (body.trim().to_string(), String::new()));

    let message = if message.is_empty() {
        format!("HTTP {status}")
    } else {
        message
    };

    let kind = match status {
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            FailureKind::Connectivity
        }
        _ if api_status == "UNAVAILABLE" => FailureKind::Connectivity,
        _ => FailureKind::classify_message(&message),
    };
    ServiceFailure::new(kind, message)
}
