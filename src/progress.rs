//! Progress-callback trait for conversion session events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! phase changes and status-ticker messages as a
//! [`crate::session::ConversionSession`] moves through an attempt.
//!
//! # Ordering guarantee
//!
//! Callbacks run while the session holds its state lock, so they observe
//! transitions in the exact order they happen and a status message is never
//! delivered after the session has left `Analyzing`. Implementations must
//! not call back into the session from a callback.
//!
//! # Example
//!
//! ```rust
//! use edgequake_sheet2xml::{ConversionConfig, ConversionProgressCallback, Phase};
//! use std::sync::Arc;
//!
//! struct PrintPhases;
//!
//! impl ConversionProgressCallback for PrintPhases {
//!     fn on_phase_change(&self, from: Phase, to: Phase) {
//!         eprintln!("{from} → {to}");
//!     }
//! }
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(Arc::new(PrintPhases))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::ConversionError;
use crate::output::ConversionResult;
use crate::session::Phase;
use std::sync::Arc;

/// Called by the session as an attempt progresses.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called on every state transition.
    fn on_phase_change(&self, from: Phase, to: Phase) {
        let _ = (from, to);
    }

    /// Called each time the status ticker advances.
    ///
    /// # Arguments
    /// * `step`   : index into [`crate::prompts::STATUS_PHASES`]
    /// * `message`: the message to display
    fn on_status(&self, step: usize, message: &str) {
        let _ = (step, message);
    }

    /// Called once when an attempt ends in `Success`.
    fn on_success(&self, result: &ConversionResult) {
        let _ = result;
    }

    /// Called once when an attempt ends in `Error`.
    fn on_error(&self, error: &ConversionError) {
        let _ = error;
    }

    /// Called when the session returns to `Idle` through a reset.
    fn on_reset(&self) {}
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
