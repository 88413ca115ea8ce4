//! Session state types.

use crate::error::ConversionError;
use crate::output::ConversionResult;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The phase of a [`crate::session::ConversionSession`], without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Uploading,
    Analyzing,
    Success,
    Error,
}

impl Phase {
    /// An attempt is in flight.
    pub fn is_busy(self) -> bool {
        matches!(self, Phase::Uploading | Phase::Analyzing)
    }

    /// The attempt has resolved and the session waits for a reset.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Success | Phase::Error)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Idle => "idle",
            Phase::Uploading => "uploading",
            Phase::Analyzing => "analyzing",
            Phase::Success => "success",
            Phase::Error => "error",
        };
        f.write_str(s)
    }
}

/// The live state of a session. `Success` and `Error` carry the outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "outcome", rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Uploading,
    Analyzing,
    Success(ConversionResult),
    Error(ConversionError),
}

impl SessionState {
    pub fn phase(&self) -> Phase {
        match self {
            SessionState::Idle => Phase::Idle,
            SessionState::Uploading => Phase::Uploading,
            SessionState::Analyzing => Phase::Analyzing,
            SessionState::Success(_) => Phase::Success,
            SessionState::Error(_) => Phase::Error,
        }
    }

    pub fn result(&self) -> Option<&ConversionResult> {
        match self {
            SessionState::Success(r) => Some(r),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ConversionError> {
        match self {
            SessionState::Error(e) => Some(e),
            _ => None,
        }
    }
}

/// A point-in-time copy of everything a renderer needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    /// `data:` URL of the image being analysed or last analysed.
    pub preview: Option<String>,
    /// Current status-ticker message; only set while analysing.
    pub status_message: Option<&'static str>,
    pub generation: u64,
}

impl SessionSnapshot {
    pub fn phase(&self) -> Phase {
        self.state.phase()
    }
}
