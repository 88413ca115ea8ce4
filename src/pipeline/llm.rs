//! Service invocation: one request in, one reply (or one failure) out.
//!
//! Exactly one call per conversion. A failed call is terminal for the
//! attempt; the user retries by resetting and selecting the file again.
//!
//! When `api_timeout_secs` is set the call is bounded by
//! [`tokio::time::timeout`] and an expiry is reported as a connectivity
//! failure.

use crate::config::ConversionConfig;
use crate::error::ConversionError;
use crate::output::ConversionStats;
use crate::pipeline::request::ConversionRequest;
use crate::service::{FailureKind, InferenceService, ServiceFailure, ServiceResponse};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Call `service` with `request` and return the raw reply plus call stats.
pub async fn invoke(
    service: &Arc<dyn InferenceService>,
    request: &ConversionRequest,
    config: &ConversionConfig,
) -> Result<(ServiceResponse, ConversionStats), ConversionError> {
    let start = Instant::now();
    debug!(
        "Calling {} ({} image, {} base64 bytes)",
        service.name(),
        request.image().media_type(),
        request.image().payload().len()
    );

    let outcome = match config.api_timeout() {
        Some(limit) => match tokio::time::timeout(limit, service.analyze(request)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ServiceFailure::new(
                FailureKind::Timeout,
                format!("no reply within {}s", limit.as_secs()),
            )),
        },
        None => service.analyze(request).await,
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    match outcome {
        Ok(response) => {
            debug!(
                "{}: {} input tokens, {} output tokens, {}ms",
                service.name(),
                response.input_tokens,
                response.output_tokens,
                duration_ms
            );
            let stats = ConversionStats {
                service: service.name().to_string(),
                input_tokens: response.input_tokens,
                output_tokens: response.output_tokens,
                duration_ms,
            };
            Ok((response, stats))
        }
        Err(failure) => {
            warn!(
                "{} failed after {}ms ({:?}): {}",
                service.name(),
                duration_ms,
                failure.kind,
                failure.message
            );
            Err(failure.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::encode::EncodedImage;
    use crate::pipeline::request::build_request;
    use async_trait::async_trait;
    use std::time::Duration;

    struct Slow;

    #[async_trait]
    impl InferenceService for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        async fn analyze(&self, _: &ConversionRequest) -> Result<ServiceResponse, ServiceFailure> {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok(ServiceResponse::default())
        }
    }

    struct Fixed(Result<ServiceResponse, ServiceFailure>);

    #[async_trait]
    impl InferenceService for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn analyze(&self, _: &ConversionRequest) -> Result<ServiceResponse, ServiceFailure> {
            self.0.clone()
        }
    }

    fn request(config: &ConversionConfig) -> ConversionRequest {
        build_request(EncodedImage::parse("data:image/png;base64,AAAA").unwrap(), config)
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_connectivity() {
        let config = ConversionConfig::builder().api_timeout_secs(30).build().unwrap();
        let service: Arc<dyn InferenceService> = Arc::new(Slow);
        let err = invoke(&service, &request(&config), &config).await.unwrap_err();
        assert!(matches!(err, ConversionError::Connectivity { .. }));
    }

    #[tokio::test]
    async fn stats_carry_token_counts() {
        let config = ConversionConfig::default();
        let service: Arc<dyn InferenceService> = Arc::new(Fixed(Ok(ServiceResponse {
            text: Some("{}".into()),
            input_tokens: 10,
            output_tokens: 20,
        })));
        let (resp, stats) = invoke(&service, &request(&config), &config).await.unwrap();
        assert_eq!(resp.text.as_deref(), Some("{}"));
        assert_eq!(stats.service, "fixed");
        assert_eq!(stats.input_tokens, 10);
        assert_eq!(stats.output_tokens, 20);
    }

    #[tokio::test]
    async fn safety_failure_maps_to_rejection() {
        let config = ConversionConfig::default();
        let service: Arc<dyn InferenceService> = Arc::new(Fixed(Err(ServiceFailure::new(
            FailureKind::SafetyBlocked,
            "blocked",
        ))));
        let err = invoke(&service, &request(&config), &config).await.unwrap_err();
        assert!(matches!(err, ConversionError::ContentRejected { .. }));
    }
}
