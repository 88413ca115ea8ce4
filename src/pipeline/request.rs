//! Request construction: the contract sent to the recognition service.
//!
//! A [`ConversionRequest`] is immutable once built. Adapters in
//! [`crate::service`] translate it into their provider's wire format; the
//! schema and generation settings here are what keeps result quality
//! comparable across providers.

use crate::config::ConversionConfig;
use crate::pipeline::encode::EncodedImage;
use crate::prompts::{build_prompt, summary_field_description, MUSIC_XML_FIELD_DESCRIPTION};
use serde::Serialize;

/// Name of the MusicXML field in the service reply.
pub const MUSIC_XML_FIELD: &str = "musicXml";

/// Name of the summary field in the service reply.
pub const SUMMARY_FIELD: &str = "summary";

/// One required string property of the output schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaField {
    pub name: &'static str,
    pub description: String,
}

/// The expected shape of the reply: an object whose fields are all
/// required strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputSchema {
    pub fields: Vec<SchemaField>,
}

impl OutputSchema {
    /// The two-field `{musicXml, summary}` schema.
    pub fn music_xml(summary_language: &str) -> Self {
        Self {
            fields: vec![
                SchemaField {
                    name: MUSIC_XML_FIELD,
                    description: MUSIC_XML_FIELD_DESCRIPTION.to_string(),
                },
                SchemaField {
                    name: SUMMARY_FIELD,
                    description: summary_field_description(summary_language),
                },
            ],
        }
    }

    pub fn required(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.name).collect()
    }

    /// Render as an OpenAPI-style schema object (the subset Gemini's
    /// `responseSchema` accepts).
    pub fn to_json_schema(&self) -> serde_json::Value {
        let properties: serde_json::Map<String, serde_json::Value> = self
            .fields
            .iter()
            .map(|f| {
                (
                    f.name.to_string(),
                    serde_json::json!({ "type": "STRING", "description": f.description }),
                )
            })
            .collect();

        serde_json::json!({
            "type": "OBJECT",
            "properties": properties,
            "required": self.required(),
        })
    }
}

/// Decoding settings for the service call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub max_output_tokens: usize,
    /// Internal reasoning budget, separate from `max_output_tokens`.
    pub thinking_budget: u32,
}

/// Everything one recognition call needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    image: EncodedImage,
    prompt: String,
    schema: OutputSchema,
    generation: GenerationSettings,
}

impl ConversionRequest {
    pub fn image(&self) -> &EncodedImage {
        &self.image
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn schema(&self) -> &OutputSchema {
        &self.schema
    }

    pub fn generation(&self) -> GenerationSettings {
        self.generation
    }
}

/// Combine the encoded image with the prompt, schema, and generation
/// settings from `config`.
pub fn build_request(image: EncodedImage, config: &ConversionConfig) -> ConversionRequest {
    ConversionRequest {
        image,
        prompt: build_prompt(config.system_prompt.as_deref(), &config.summary_language),
        schema: OutputSchema::music_xml(&config.summary_language),
        generation: GenerationSettings {
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            thinking_budget: config.thinking_budget,
        },
    }
}
