//! Reply validation: raw service text → [`ConversionResult`].
//!
//! The checks run in a fixed order and the first failure wins:
//!
//! 1. no text at all → [`ConversionError::EmptyResponse`]
//! 2. not a JSON object of the expected shape → [`ConversionError::MalformedInput`]
//! 3. `musicXml` missing, blank, or shorter than the configured minimum
//!    (counted in characters, surrounding whitespace included) →
//!    [`ConversionError::IncompleteRecognition`]
//!
//! A missing or blank `summary` is not an error; the configured default
//! phrase is used instead.

use crate::config::ConversionConfig;
use crate::error::ConversionError;
use crate::output::ConversionResult;
use crate::pipeline::postprocess::clean_reply;
use serde::Deserialize;
use serde_json::error::Category;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct RecognitionReply {
    #[serde(rename = "musicXml", default)]
    music_xml: Option<String>,
    #[serde(default)]
    summary: Option<String>,
}

/// Parse and validate the raw reply text.
pub fn parse_response(
    text: Option<&str>,
    config: &ConversionConfig,
) -> Result<ConversionResult, ConversionError> {
    let text = match text {
        Some(t) if !t.trim().is_empty() => t,
        _ => return Err(ConversionError::EmptyResponse),
    };

    let cleaned = clean_reply(text);
    let value: serde_json::Value = serde_json::from_str(&cleaned).map_err(|e| {
        warn!("Unparseable service reply ({} bytes): {}", cleaned.len(), e);
        ConversionError::malformed(format!("the service reply is not valid JSON: {e}"))
    })?;
    if !value.is_object() {
        return Err(ConversionError::malformed(
            "the service reply is not a JSON object",
        ));
    }
    let reply: RecognitionReply = serde_json::from_value(value).map_err(|e| match e.classify() {
        Category::Data => ConversionError::malformed(format!(
            "the service reply does not have the expected shape: {e}"
        )),
        _ => ConversionError::malformed(e.to_string()),
    })?;

    let xml_content = reply.music_xml.unwrap_or_default();
    let length = xml_content.chars().count();
    if xml_content.trim().is_empty() || length < config.min_xml_chars {
        return Err(ConversionError::IncompleteRecognition { length });
    }

    let summary = reply
        .summary
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| config.default_summary.clone());

    debug!("Validated reply: {} chars of MusicXML", length);
    Ok(ConversionResult {
        xml_content,
        summary,
    })
}
