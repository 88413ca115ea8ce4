//! Prompts and fixed user-facing phrases for sheet-music recognition.
//!
//! Callers can override the instruction via
//! [`crate::config::ConversionConfig::system_prompt`]; the summary-language
//! line is always appended so the output schema stays intact.

/// Default instruction sent alongside the sheet-music image.
pub const DEFAULT_OMR_PROMPT: &str = r#"Analyze this sheet music image and perform high-quality Optical Music Recognition (OMR).
Convert the entire visible music into a VALID and COMPLETE MusicXML string.

IMPORTANT:
- Include all details: clef, key signature, time signature, notes, durations, rests, and measure bars.
- If there are multiple measures, include all of them.
- The output must be a single JSON object with exactly two string fields: "musicXml" and "summary".
- Put the complete MusicXML document in the "musicXml" field.
- Do NOT wrap the JSON in code fences and do NOT add commentary."#;

/// Summary returned when the model produced MusicXML but no summary.
pub const DEFAULT_SUMMARY: &str = "The music was analysed successfully.";

/// Status-ticker messages shown while the recognition call is in flight,
/// in display order.
pub const STATUS_PHASES: [&str; 6] = [
    "Sending the image to the AI…",
    "Detecting staff lines and notes…",
    "Analysing rhythm and tempo…",
    "Converting each note to MusicXML…",
    "Checking the score structure…",
    "Waiting for the response, this may take a while…",
];

/// Description attached to the `musicXml` schema property.
pub const MUSIC_XML_FIELD_DESCRIPTION: &str =
    "The full valid MusicXML string including all measures.";

/// Build the summary instruction for the configured language.
pub fn summary_instruction(language: &str) -> String {
    format!(
        "- Provide a concise summary of the piece (e.g. \"G major, 4/4 time, for Saxophone\") \
in the \"summary\" field, written in {language}."
    )
}

/// Description attached to the `summary` schema property.
pub fn summary_field_description(language: &str) -> String {
    format!("Short summary of the piece in {language}.")
}

/// Assemble the full instruction prompt.
pub fn build_prompt(custom: Option<&str>, language: &str) -> String {
    let base = custom.unwrap_or(DEFAULT_OMR_PROMPT).trim_end();
    format!("{base}\n{}", summary_instruction(language))
}
