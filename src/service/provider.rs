//! Adapter for any `edgequake_llm` provider.
//!
//! The provider abstraction has no structured-output or thinking-budget
//! knobs, so the output schema is appended to the system prompt as text and
//! the thinking budget is ignored. The reply still goes through the same
//! validation as Gemini replies.

use crate::pipeline::encode::EncodedImage;
use crate::pipeline::request::{ConversionRequest, GenerationSettings, OutputSchema};
use crate::service::{InferenceService, ServiceFailure, ServiceResponse};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Wraps an `Arc<dyn LLMProvider>` as an [`InferenceService`].
#[derive(Clone)]
pub struct LlmProviderService {
    provider: Arc<dyn LLMProvider>,
    label: String,
}

impl fmt::Debug for LlmProviderService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmProviderService")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl LlmProviderService {
    /// `label` names the provider in logs and stats, e.g. "openai".
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
        }
    }
}

#[async_trait]
impl InferenceService for LlmProviderService {
    fn name(&self) -> &str {
        &self.label
    }

    async fn analyze(&self, request: &ConversionRequest) -> Result<ServiceResponse, ServiceFailure> {
        let system = format!(
            "{}\n\n{}",
            request.prompt(),
            schema_instruction(request.schema())
        );

        let messages = vec![
            ChatMessage::system(system),
            ChatMessage::user_with_images("", vec![image_part(request.image())]),
        ];
        let options = build_options(request.generation());

        match self.provider.chat(&messages, Some(&options)).await {
            Ok(response) => {
                debug!(
                    "{}: {} input tokens, {} output tokens",
                    self.label, response.prompt_tokens, response.completion_tokens
                );
                let text = response.content;
                Ok(ServiceResponse {
                    text: (!text.trim().is_empty()).then_some(text),
                    input_tokens: response.prompt_tokens as u64,
                    output_tokens: response.completion_tokens as u64,
                })
            }
            Err(e) => Err(ServiceFailure::from_message(format!("{}", e))),
        }
    }
}

fn build_options(generation: GenerationSettings) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(generation.temperature),
        max_tokens: Some(generation.max_output_tokens),
        ..Default::default()
    }
}

/// The schema as prompt text, for providers without server-side schemas.
pub fn schema_instruction(schema: &OutputSchema) -> String {
    let mut out = String::from(
        "Respond with a single JSON object and nothing else. \
         The object has exactly these string fields, all required:",
    );
    for field in &schema.fields {
        out.push_str(&format!("\n- \"{}\": {}", field.name, field.description));
    }
    out
}

/// The score image as a chat attachment.
///
/// `detail: "high"` keeps OpenAI-class models from downscaling the page to a
/// single 512 px tile, where note heads and accidentals become unreadable.
fn image_part(image: &EncodedImage) -> ImageData {
    ImageData::new(image.payload().to_string(), image.media_type()).with_detail("high")
}
