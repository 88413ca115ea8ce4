//! # edgequake-sheet2xml
//!
//! Convert photos of printed sheet music to MusicXML using a vision-language
//! model.
//!
//! No notation is recognised locally. The image is sent to a multimodal model
//! together with a two-field output schema (`musicXml`, `summary`), and the
//! reply is validated before it is accepted: it must be a JSON object and the
//! MusicXML must be long enough to be real notation.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image (upload / path / URL)
//!  │
//!  ├─ 1. Input     size limit (10 MiB), media type from header or magic bytes
//!  ├─ 2. Encode    bytes → data:<media>;base64,<payload>
//!  ├─ 3. Request   prompt + {musicXml, summary} schema + temperature 0.1,
//!  │               12 000 output tokens, 4 000 thinking tokens
//!  ├─ 4. Invoke    one call to Gemini or any edgequake-llm provider
//!  └─ 5. Validate  JSON object, musicXml ≥ 50 chars, default summary
//! ```
//!
//! Around the pipeline, [`ConversionSession`] drives the user-visible
//! lifecycle `Idle → Uploading → Analyzing → Success | Error` with a rotating
//! status message while the model is working.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_sheet2xml::{convert_file, to_musicxml_document, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Gemini key from GEMINI_API_KEY, or any provider edgequake-llm detects
//!     let config = ConversionConfig::default();
//!     let output = convert_file("nocturne.jpg", &config).await?;
//!     println!("{}", to_musicxml_document(&output.result));
//!     eprintln!("{}", output.result.summary);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `sheet2xml` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-sheet2xml = { version = "0.1", default-features = false }
//! ```
//!
//! ## Choosing a Model
//!
//! | Model | Schema enforced | Best for |
//! |-------|-----------------|----------|
//! | `gemini-2.5-pro`   | yes | Default; dense piano scores |
//! | `gemini-2.5-flash` | yes | Single-line melodies, lower cost |
//! | `gpt-4.1`          | prompt only | Alternative through `--provider openai` |
//! | `claude-sonnet-4-20250514` | prompt only | Alternative through `--provider anthropic` |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod export;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod service;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder};
pub use convert::{
    analyze_image, convert, convert_bytes, convert_file, convert_sync, convert_to_file,
    resolve_service,
};
pub use error::{ConversionError, ErrorKind, Sheet2XmlError, TransitionError};
pub use export::{to_musicxml_document, write_musicxml, ExportArtifact, MUSICXML_MEDIA_TYPE, SUGGESTED_FILENAME};
pub use output::{ConversionOutput, ConversionResult, ConversionStats};
pub use pipeline::input::{ImageAsset, ImageUpload};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use service::{FailureKind, GeminiService, InferenceService, LlmProviderService, ServiceFailure, ServiceResponse};
pub use session::{AttemptHandle, ConversionSession, Phase, SessionSnapshot, SessionState};
