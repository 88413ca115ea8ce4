//! Result types produced by a conversion.

use serde::{Deserialize, Serialize};

/// A successful recognition: MusicXML plus a short description of the piece.
///
/// `xml_content` is at least [`crate::config::ConversionConfig::min_xml_chars`]
/// characters long; shorter replies are reported as
/// [`crate::error::ConversionError::IncompleteRecognition`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResult {
    pub xml_content: String,
    pub summary: String,
}

/// Accounting for one service call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Name of the service that answered (e.g. "gemini").
    pub service: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Wall-clock time of the service call.
    pub duration_ms: u64,
}

/// A result together with its call statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionOutput {
    pub result: ConversionResult,
    pub stats: ConversionStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_serialises_with_camel_case_keys() {
        let r = ConversionResult {
            xml_content: "<score-partwise/>".into(),
            summary: "G major".into(),
        };
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["xmlContent"], "<score-partwise/>");
        assert_eq!(json["summary"], "G major");
    }
}
