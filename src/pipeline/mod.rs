//! Pipeline stages for sheet-music-to-MusicXML conversion.
//!
//! Each submodule implements exactly one transformation step.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ encode ──▶ request ──▶ llm ──▶ postprocess ──▶ response
//! (bytes)   (data URL)  (schema)    (VLM)   (cleanup)       (validate)
//! ```
//!
//! 1. [`input`]   : resolve an upload, path, or URL to an in-memory image
//!    and settle its media type
//! 2. [`encode`]  : base64-wrap the bytes into a self-describing data URL
//! 3. [`request`] : attach the prompt, the two-field output schema, and the
//!    generation settings
//! 4. [`llm`]     : the single awaited service call; the only stage with
//!    network I/O
//! 5. [`postprocess`]: strip fences and invisible characters from the reply
//! 6. [`response`]: parse the JSON object and enforce the minimum MusicXML
//!    length

pub mod encode;
pub mod input;
pub mod llm;
pub mod postprocess;
pub mod request;
pub mod response;
