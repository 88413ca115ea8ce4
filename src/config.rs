//! Configuration types for sheet-music-to-MusicXML conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`].
//!
//! The generation settings (`temperature`, `max_output_tokens`,
//! `thinking_budget`) and the two-field output schema form the contract with
//! the recognition service. Changing them changes result quality, so the
//! defaults mirror what the service was tuned against.

use crate::error::Sheet2XmlError;
use crate::progress::ProgressCallback;
use crate::prompts::DEFAULT_SUMMARY;
use crate::service::InferenceService;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Upload limit enforced before the pipeline runs: 10 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Shortest MusicXML payload accepted as a real recognition.
pub const DEFAULT_MIN_XML_CHARS: usize = 50;

/// Model used by the native Gemini adapter when none is configured.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-pro";

/// Configuration for a sheet-music conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_sheet2xml::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .model("gemini-2.5-pro")
///     .summary_language("Uzbek")
///     .build()
///     .unwrap();
/// assert_eq!(config.max_output_tokens, 12_000);
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Model identifier, e.g. "gemini-2.5-pro", "gpt-4.1".
    /// If None, uses [`DEFAULT_GEMINI_MODEL`] for Gemini and the provider
    /// default otherwise.
    pub model: Option<String>,

    /// Provider name ("gemini", "openai", "anthropic", "ollama", …).
    /// If None along with `service`, the provider is resolved from the
    /// environment.
    pub provider_name: Option<String>,

    /// Pre-constructed inference service. Takes precedence over `provider_name`.
    pub service: Option<Arc<dyn InferenceService>>,

    /// Service-access credential for the native Gemini adapter.
    /// Falls back to `GEMINI_API_KEY`, then `API_KEY`.
    pub api_key: Option<String>,

    /// Override for the Gemini REST endpoint base URL.
    pub api_base_url: Option<String>,

    /// Sampling temperature. Default: 0.1.
    ///
    /// Transcription must be faithful to the page; near-zero temperature
    /// keeps the model from inventing notes.
    pub temperature: f32,

    /// Maximum visible output tokens. Default: 12 000.
    ///
    /// A single page of piano music easily produces tens of kilobytes of
    /// MusicXML. Setting this too low truncates the document mid-measure and
    /// the JSON envelope no longer parses.
    pub max_output_tokens: usize,

    /// Internal reasoning budget, separate from `max_output_tokens`. Default: 4 000.
    pub thinking_budget: u32,

    /// Upload limit in bytes. Default: 10 MiB.
    pub max_upload_bytes: u64,

    /// Minimum MusicXML length (characters) for a successful recognition. Default: 50.
    pub min_xml_chars: usize,

    /// Language the model writes the summary in. Default: "English".
    pub summary_language: String,

    /// Summary used when the model returns none. Default: [`DEFAULT_SUMMARY`].
    pub default_summary: String,

    /// Custom instruction prompt. If None, uses the built-in default.
    pub system_prompt: Option<String>,

    /// Interval between status-ticker messages while analysing. Default: 5s.
    pub ticker_interval: Duration,

    /// Per-call timeout for the recognition service. Default: None (wait
    /// until the service answers or fails).
    pub api_timeout_secs: Option<u64>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Receives phase changes and status-ticker messages.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            service: None,
            api_key: None,
            api_base_url: None,
            temperature: 0.1,
            max_output_tokens: 12_000,
            thinking_budget: 4_000,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            min_xml_chars: DEFAULT_MIN_XML_CHARS,
            summary_language: "English".to_string(),
            default_summary: DEFAULT_SUMMARY.to_string(),
            system_prompt: None,
            ticker_interval: Duration::from_secs(5),
            api_timeout_secs: None,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("service", &self.service.as_ref().map(|s| s.name().to_string()))
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base_url", &self.api_base_url)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("thinking_budget", &self.thinking_budget)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("min_xml_chars", &self.min_xml_chars)
            .field("summary_language", &self.summary_language)
            .field("default_summary", &self.default_summary)
            .field(
                "system_prompt",
                &self.system_prompt.as_ref().map(|p| format!("<{} chars>", p.chars().count())),
            )
            .field("ticker_interval", &self.ticker_interval)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The per-call timeout, if one is configured.
    pub fn api_timeout(&self) -> Option<Duration> {
        self.api_timeout_secs.map(Duration::from_secs)
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn service(mut self, service: Arc<dyn InferenceService>) -> Self {
        self.config.service = Some(service);
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = Some(url.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_output_tokens(mut self, n: usize) -> Self {
        self.config.max_output_tokens = n;
        self
    }

    pub fn thinking_budget(mut self, n: u32) -> Self {
        self.config.thinking_budget = n;
        self
    }

    pub fn max_upload_bytes(mut self, n: u64) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    pub fn min_xml_chars(mut self, n: usize) -> Self {
        self.config.min_xml_chars = n;
        self
    }

    pub fn summary_language(mut self, language: impl Into<String>) -> Self {
        self.config.summary_language = language.into();
        self
    }

    pub fn default_summary(mut self, summary: impl Into<String>) -> Self {
        self.config.default_summary = summary.into();
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn ticker_interval(mut self, interval: Duration) -> Self {
        self.config.ticker_interval = interval;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = Some(secs);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.config.progress_callback = Some(callback);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Sheet2XmlError> {
        let c = &self.config;
        if c.max_output_tokens == 0 {
            return Err(Sheet2XmlError::InvalidConfig(
                "max_output_tokens must be ≥ 1".into(),
            ));
        }
        if c.max_upload_bytes == 0 {
            return Err(Sheet2XmlError::InvalidConfig(
                "max_upload_bytes must be ≥ 1".into(),
            ));
        }
        if c.ticker_interval.is_zero() {
            return Err(Sheet2XmlError::InvalidConfig(
                "ticker_interval must be greater than zero".into(),
            ));
        }
        if c.summary_language.trim().is_empty() {
            return Err(Sheet2XmlError::InvalidConfig(
                "summary_language must not be empty".into(),
            ));
        }
        if c.api_timeout_secs == Some(0) {
            return Err(Sheet2XmlError::InvalidConfig(
                "api_timeout_secs must be ≥ 1 when set".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_contract() {
        let c = ConversionConfig::default();
        assert_eq!(c.temperature, 0.1);
        assert_eq!(c.max_output_tokens, 12_000);
        assert_eq!(c.thinking_budget, 4_000);
        assert_eq!(c.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(c.min_xml_chars, 50);
        assert_eq!(c.ticker_interval, Duration::from_secs(5));
        assert!(c.api_timeout().is_none());
    }

    #[test]
    fn builder_clamps_temperature() {
        let c = ConversionConfig::builder().temperature(7.5).build().unwrap();
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn builder_rejects_zero_ticker_interval() {
        let err = ConversionConfig::builder()
            .ticker_interval(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(err, Sheet2XmlError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_zero_output_budget() {
        assert!(ConversionConfig::builder().max_output_tokens(0).build().is_err());
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = ConversionConfig::builder().api_key("secret-key").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("secret-key"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn debug_lists_every_setting() {
        let c = ConversionConfig::builder()
            .system_prompt("Transcribe the score.")
            .download_timeout_secs(30)
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(dbg.contains("default_summary"));
        assert!(dbg.contains("system_prompt: Some(\"<21 chars>\")"));
        assert!(dbg.contains("download_timeout_secs: 30"));
    }
}
