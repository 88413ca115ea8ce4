//! One-shot conversion entry points.
//!
//! These run the pipeline without a state machine: resolve the input, call
//! the service once, return the result. Use
//! [`crate::session::ConversionSession`] instead when something has to
//! render the `Idle → Uploading → Analyzing → Success | Error` lifecycle.

use crate::config::{ConversionConfig, DEFAULT_GEMINI_MODEL};
use crate::error::{ConversionError, Sheet2XmlError};
use crate::export::write_musicxml;
use crate::output::{ConversionOutput, ConversionStats};
use crate::pipeline::encode::{encode_image, EncodedImage};
use crate::pipeline::input::{self, ImageAsset, ImageUpload};
use crate::pipeline::{llm, request, response};
use crate::service::{GeminiService, InferenceService, LlmProviderService};
use edgequake_llm::ProviderFactory;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Model used with named non-Gemini providers when none is configured.
const FALLBACK_PROVIDER_MODEL: &str = "gpt-4.1";

/// Environment variables holding the Gemini key, in lookup order.
const GEMINI_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

/// Run the request pipeline on an already-encoded image: build the request,
/// call the service, validate the reply.
pub async fn analyze_encoded(
    service: &Arc<dyn InferenceService>,
    image: EncodedImage,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConversionError> {
    let request = request::build_request(image, config);
    let (reply, stats) = llm::invoke(service, &request, config).await?;
    let result = response::parse_response(reply.text.as_deref(), config)?;
    Ok(ConversionOutput { result, stats })
}

/// Run the whole pipeline on one image with an explicit service.
///
/// The caller has already checked the size limit.
pub async fn analyze_image(
    service: &Arc<dyn InferenceService>,
    image: &ImageAsset,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConversionError> {
    let encoded = encode_image(image)?;
    analyze_encoded(service, encoded, config).await
}

/// Convert one image, resolving the service from `config`.
///
/// # Errors
/// [`Sheet2XmlError::ProviderNotConfigured`] when no service can be
/// resolved; [`Sheet2XmlError::Conversion`] when the attempt fails.
pub async fn convert(
    image: &ImageAsset,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Sheet2XmlError> {
    let service = resolve_service(config)?;
    info!(
        "Converting {} image ({} bytes) with {}",
        image.media_type(),
        image.size(),
        service.name()
    );
    Ok(analyze_image(&service, image, config).await?)
}

/// Convert in-memory image bytes.
///
/// # Example
/// ```rust,no_run
/// use edgequake_sheet2xml::{convert_bytes, ConversionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = std::fs::read("minuet.png")?;
/// let output = convert_bytes(bytes, Some("image/png"), &ConversionConfig::default()).await?;
/// println!("{}", output.result.summary);
/// # Ok(())
/// # }
/// ```
pub async fn convert_bytes(
    bytes: Vec<u8>,
    declared_media_type: Option<&str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Sheet2XmlError> {
    convert_upload(ImageUpload::new(bytes, declared_media_type), config).await
}

/// Convert a local image file or an HTTP/HTTPS URL.
pub async fn convert_file(
    input: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Sheet2XmlError> {
    let input = input.as_ref();
    let upload =
        input::resolve_input(input, config.download_timeout_secs, config.max_upload_bytes).await?;
    debug!("Resolved '{}' to {} bytes", input, upload.size);
    convert_upload(upload, config).await
}

/// Convert and write the exported MusicXML document to `output_path`.
pub async fn convert_to_file(
    input: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionStats, Sheet2XmlError> {
    let output = convert_file(input, config).await?;
    write_musicxml(&output.result, output_path.as_ref()).await?;
    Ok(output.stats)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    image: &ImageAsset,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Sheet2XmlError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Sheet2XmlError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(image, config))
}

async fn convert_upload(
    upload: ImageUpload,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Sheet2XmlError> {
    input::ensure_within_limit(upload.size, config.max_upload_bytes)?;
    let asset = ImageAsset::from_upload(upload)?;
    convert(&asset, config).await
}

/// Resolve the inference service, from most-specific to least-specific.
///
/// 1. **Pre-built service** (`config.service`), used as-is.
/// 2. **Named provider** (`config.provider_name`). `"gemini"` gets the
///    native adapter; anything else goes through
///    [`ProviderFactory::create_llm_provider`], which reads that provider's
///    own API key variable.
/// 3. **Gemini key** from `config.api_key`, `GEMINI_API_KEY` or `API_KEY`.
/// 4. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`.
/// 5. **Full auto-detection** via [`ProviderFactory::from_env`].
pub fn resolve_service(config: &ConversionConfig) -> Result<Arc<dyn InferenceService>, Sheet2XmlError> {
    if let Some(ref service) = config.service {
        return Ok(Arc::clone(service));
    }

    if let Some(ref name) = config.provider_name {
        if name.eq_ignore_ascii_case("gemini") {
            let key = gemini_key(config).ok_or_else(|| Sheet2XmlError::ProviderNotConfigured {
                provider: "gemini".to_string(),
                hint: "Set GEMINI_API_KEY or pass --api-key.".to_string(),
            })?;
            return gemini_service(config, key);
        }
        let model = config.model.as_deref().unwrap_or(FALLBACK_PROVIDER_MODEL);
        return provider_service(name, model);
    }

    if let Some(key) = gemini_key(config) {
        return gemini_service(config, key);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return provider_service(&prov, &model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Sheet2XmlError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No recognition provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY, or OPENAI_API_KEY / ANTHROPIC_API_KEY with a vision model.\n\
                Error: {}",
                e
            ),
        })?;
    Ok(Arc::new(LlmProviderService::new(llm_provider, "auto")))
}

fn gemini_key(config: &ConversionConfig) -> Option<String> {
    config
        .api_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .or_else(|| {
            GEMINI_KEY_VARS
                .iter()
                .filter_map(|var| std::env::var(var).ok())
                .find(|k| !k.trim().is_empty())
        })
}

fn gemini_service(
    config: &ConversionConfig,
    api_key: String,
) -> Result<Arc<dyn InferenceService>, Sheet2XmlError> {
    let model = config.model.as_deref().unwrap_or(DEFAULT_GEMINI_MODEL);
    let mut service = GeminiService::new(api_key, model)?;
    if let Some(ref base) = config.api_base_url {
        service = service.with_base_url(base.clone());
    }
    Ok(Arc::new(service))
}

fn provider_service(name: &str, model: &str) -> Result<Arc<dyn InferenceService>, Sheet2XmlError> {
    let provider = ProviderFactory::create_llm_provider(name, model).map_err(|e| {
        Sheet2XmlError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: format!("{e}"),
        }
    })?;
    Ok(Arc::new(LlmProviderService::new(provider, name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::request::ConversionRequest;
    use crate::service::{ServiceFailure, ServiceResponse};
    use async_trait::async_trait;

    struct Echo(&'static str);

    #[async_trait]
    impl InferenceService for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn analyze(&self, _: &ConversionRequest) -> Result<ServiceResponse, ServiceFailure> {
            Ok(ServiceResponse::text(self.0))
        }
    }

    fn config_with(reply: &'static str) -> ConversionConfig {
        ConversionConfig::builder()
            .service(Arc::new(Echo(reply)))
            .build()
            .unwrap()
    }

    #[test]
    fn explicit_service_wins() {
        let config = config_with("{}");
        assert_eq!(resolve_service(&config).unwrap().name(), "echo");
    }

    #[test]
    fn configured_key_selects_gemini() {
        let config = ConversionConfig::builder()
            .provider_name("gemini")
            .api_key("test-key")
            .build()
            .unwrap();
        assert_eq!(resolve_service(&config).unwrap().name(), "gemini");
    }

    #[tokio::test]
    async fn oversized_bytes_are_rejected_before_the_call() {
        let config = ConversionConfig::builder()
            .service(Arc::new(Echo("{}")))
            .max_upload_bytes(4)
            .build()
            .unwrap();
        let err = convert_bytes(vec![0u8; 5], Some("image/png"), &config)
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_conversion(),
            Some(ConversionError::OversizedInput { size: 5, limit: 4 })
        ));
    }

    #[tokio::test]
    async fn convert_to_file_writes_document() {
        let xml = format!("<score-partwise>{}</score-partwise>", "<part/>".repeat(8));
        let reply: &'static str = Box::leak(
            serde_json::json!({ "musicXml": xml, "summary": "A minor" })
                .to_string()
                .into_boxed_str(),
        );
        let config = config_with(reply);

        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("page.png");
        std::fs::write(&input, b"\x89PNG\r\n\x1a\n0000").unwrap();
        let out = dir.path().join("page.musicxml");

        let stats = convert_to_file(input.to_str().unwrap(), &out, &config)
            .await
            .unwrap();
        assert_eq!(stats.service, "echo");
        let written = std::fs::read_to_string(&out).unwrap();
        assert!(written.starts_with("<?xml"));
        assert!(written.ends_with(&xml));
    }
}
