//! Post-processing: deterministic cleanup of the raw service reply before
//! it is parsed as JSON.
//!
//! ## What gets cleaned
//!
//! Gemini honours `responseMimeType: application/json` and returns a bare
//! object. Providers reached through the generic LLM adapter only see the
//! schema as prose in the prompt, and they occasionally:
//!
//! - wrap the object in ` ```json ... ``` ` fences despite being told not to
//! - prefix a BOM or zero-width characters that `serde_json` rejects
//! - surround the object with blank lines
//!
//! Each rule is a pure `&str → String` function and is independently tested.
//! The MusicXML inside the object is never touched.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to the raw reply text.
///
/// Rules (applied in order):
/// 1. Strip invisible Unicode (BOM, zero-width spaces, …)
/// 2. Trim surrounding whitespace
/// 3. Strip outer code fences (```` ``` ```` or ```` ```json ````)
pub fn clean_reply(input: &str) -> String {
    let s = remove_invisible_chars(input);
    let s = s.trim();
    strip_code_fences(s)
}

// ── Rule 1: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        ['\u{200B}', '\u{FEFF}', '\u{200C}', '\u{200D}', '\u{2060}'],
        "",
    )
}

// ── Rule 3: Strip outer code fences ─────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\r?\n(.*?)\r?\n?```\s*$").expect("valid fence regex")
});

fn strip_code_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input) {
        caps[1].trim().to_string()
    } else {
        input.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_json_is_unchanged() {
        let raw = r#"{"musicXml":"<x/>","summary":"s"}"#;
        assert_eq!(clean_reply(raw), raw);
    }

    #[test]
    fn strips_json_fence() {
        let raw = "```json\n{\"summary\":\"s\"}\n```";
        assert_eq!(clean_reply(raw), "{\"summary\":\"s\"}");
    }

    #[test]
    fn strips_plain_fence_with_crlf() {
        let raw = "```\r\n{\"summary\":\"s\"}\r\n```\r\n";
        assert_eq!(clean_reply(raw), "{\"summary\":\"s\"}");
    }

    #[test]
    fn removes_bom_and_whitespace() {
        let raw = "\u{FEFF}\n  {\"summary\":\"s\"}  \n";
        assert_eq!(clean_reply(raw), "{\"summary\":\"s\"}");
    }

    #[test]
    fn inner_fences_are_left_alone() {
        let raw = "{\"summary\":\"```x```\"}";
        assert_eq!(clean_reply(raw), raw);
    }
}
