//! The conversion state machine.
//!
//! ```text
//!            FileSelected               encoded                resolved
//!   Idle ─────────────────▶ Uploading ──────────▶ Analyzing ─────────────▶ Success | Error
//!    ▲   └─ too large ──────────────────────────────────────────────────▶ Error       │
//!    └──────────────────────────────── Reset ─────────────────────────────────────────┘
//! ```
//!
//! A [`ConversionSession`] owns exactly one [`SessionState`] and runs at most
//! one attempt at a time. Each attempt is tagged with a generation number;
//! every asynchronous continuation (the read/encode step, the service reply,
//! each ticker tick) re-checks that number under the session lock before it
//! touches the state, so nothing from an abandoned attempt can overwrite a
//! newer state.
//!
//! The lock is a plain `std::sync::Mutex` and is never held across an
//! `.await`.

mod state;
mod ticker;

pub use state::{Phase, SessionSnapshot, SessionState};
pub use ticker::StatusTicker;

use crate::config::ConversionConfig;
use crate::convert::analyze_encoded;
use crate::error::{ConversionError, TransitionError};
use crate::output::ConversionResult;
use crate::pipeline::encode::{encode_image, EncodedImage};
use crate::pipeline::input::{ensure_within_limit, local_file_size, read_local, ImageAsset, ImageUpload};
use crate::prompts::STATUS_PHASES;
use crate::service::InferenceService;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct Inner {
    state: SessionState,
    preview: Option<EncodedImage>,
    status_index: Option<usize>,
    generation: u64,
    ticker: Option<StatusTicker>,
    task: Option<AbortHandle>,
}

/// What the user selected.
enum Selection {
    Upload(ImageUpload),
    Path(PathBuf),
}

/// Drives one conversion attempt at a time through
/// `Idle → Uploading → Analyzing → Success | Error`.
///
/// Cloning is cheap; clones share the same state.
///
/// # Example
/// ```rust,no_run
/// use edgequake_sheet2xml::{ConversionConfig, ConversionSession, GeminiService, ImageUpload};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let service = Arc::new(GeminiService::new(std::env::var("GEMINI_API_KEY")?, "gemini-2.5-pro")?);
/// let session = ConversionSession::new(service, ConversionConfig::default());
///
/// let bytes = std::fs::read("etude.jpg")?;
/// let attempt = session.select_file(ImageUpload::new(bytes, Some("image/jpeg")))?;
/// match attempt.wait().await {
///     Some(Ok(result)) => println!("{}", result.summary),
///     Some(Err(e)) => eprintln!("{e}"),
///     None => eprintln!("cancelled"),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ConversionSession {
    inner: Arc<Mutex<Inner>>,
    service: Arc<dyn InferenceService>,
    config: Arc<ConversionConfig>,
}

impl ConversionSession {
    pub fn new(service: Arc<dyn InferenceService>, config: ConversionConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            service,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    // ── Events ───────────────────────────────────────────────────────────

    /// `FileSelected` with an in-memory upload.
    ///
    /// An upload over the size limit moves straight to `Error` and the
    /// service is never called. Otherwise the session enters `Uploading`
    /// and the attempt continues on a spawned task; this call does not wait
    /// for it. Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// [`TransitionError::Busy`] unless the session is `Idle`.
    pub fn select_file(&self, upload: ImageUpload) -> Result<AttemptHandle, TransitionError> {
        let mut inner = self.lock();
        let generation = self.begin(&mut inner)?;

        if let Err(e) = ensure_within_limit(upload.size, self.config.max_upload_bytes) {
            info!("Rejected upload of {} bytes", upload.size);
            self.fail(&mut inner, e);
            return Ok(AttemptHandle::resolved(self.clone(), generation));
        }

        self.transition(&mut inner, SessionState::Uploading);
        Ok(self.spawn_attempt(&mut inner, generation, Selection::Upload(upload)))
    }

    /// `FileSelected` with a file on disk.
    ///
    /// The file's size is taken from its metadata up front, so an oversized
    /// file moves straight to `Error` like an oversized upload. The file is
    /// then read while the session is `Uploading`; a read failure ends in
    /// `Error(ReadFailed)`.
    ///
    /// # Errors
    /// [`TransitionError::Busy`] unless the session is `Idle`.
    pub fn select_path(&self, path: impl AsRef<Path>) -> Result<AttemptHandle, TransitionError> {
        let path = path.as_ref();
        let declared_size = std::fs::metadata(path).ok().map(|m| m.len());

        let mut inner = self.lock();
        let generation = self.begin(&mut inner)?;

        if let Some(size) = declared_size {
            if let Err(e) = ensure_within_limit(size, self.config.max_upload_bytes) {
                info!("Rejected {} ({} bytes)", path.display(), size);
                self.fail(&mut inner, e);
                return Ok(AttemptHandle::resolved(self.clone(), generation));
            }
        }

        self.transition(&mut inner, SessionState::Uploading);
        Ok(self.spawn_attempt(
            &mut inner,
            generation,
            Selection::Path(path.to_path_buf()),
        ))
    }

    /// Return to `Idle`, dropping the result, error, and preview.
    ///
    /// During `Uploading` or `Analyzing` the attempt is cancelled: its task
    /// is aborted, the ticker stops, and any late resolution is discarded.
    /// In `Idle` this does nothing.
    pub fn reset(&self) {
        let mut inner = self.lock();
        let phase = inner.state.phase();
        if phase == Phase::Idle {
            return;
        }
        if phase.is_busy() {
            if let Some(task) = inner.task.take() {
                task.abort();
            }
            inner.generation += 1;
            info!("Cancelled attempt while {}", phase);
        }
        inner.preview = None;
        self.transition(&mut inner, SessionState::Idle);
        if let Some(cb) = &self.config.progress_callback {
            cb.on_reset();
        }
    }

    // ── Observation ──────────────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        self.lock().state.clone()
    }

    pub fn phase(&self) -> Phase {
        self.lock().state.phase()
    }

    /// `data:` URL of the selected image, from `Analyzing` until reset.
    pub fn preview(&self) -> Option<String> {
        self.lock().preview.as_ref().map(|p| p.data_url().to_string())
    }

    /// The status-ticker message, only while `Analyzing`.
    pub fn status_message(&self) -> Option<&'static str> {
        self.lock().status_index.map(|i| STATUS_PHASES[i])
    }

    /// Number of the current (or most recent) attempt.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.lock();
        SessionSnapshot {
            state: inner.state.clone(),
            preview: inner.preview.as_ref().map(|p| p.data_url().to_string()),
            status_message: inner.status_index.map(|i| STATUS_PHASES[i]),
            generation: inner.generation,
        }
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock_inner(&self.inner)
    }

    /// Accept a new attempt: only from `Idle`.
    fn begin(&self, inner: &mut Inner) -> Result<u64, TransitionError> {
        let phase = inner.state.phase();
        if phase != Phase::Idle {
            debug!("Ignoring file selection while {}", phase);
            return Err(TransitionError::Busy {
                phase: phase.to_string(),
            });
        }
        inner.generation += 1;
        Ok(inner.generation)
    }

    fn spawn_attempt(
        &self,
        inner: &mut Inner,
        generation: u64,
        selection: Selection,
    ) -> AttemptHandle {
        let task = tokio::spawn(self.clone().run_attempt(generation, selection));
        inner.task = Some(task.abort_handle());
        AttemptHandle {
            session: self.clone(),
            generation,
            task: Some(task),
        }
    }

    async fn run_attempt(self, generation: u64, selection: Selection) {
        let encoded = match self.upload(selection).await {
            Ok(encoded) => encoded,
            Err(e) => {
                self.resolve(generation, Err(e));
                return;
            }
        };

        if !self.enter_analyzing(generation, encoded.clone()) {
            return;
        }

        let outcome = analyze_encoded(&self.service, encoded, &self.config)
            .await
            .map(|output| output.result);
        self.resolve(generation, outcome);
    }

    /// The `Uploading` work: read, check, and encode the image.
    async fn upload(&self, selection: Selection) -> Result<EncodedImage, ConversionError> {
        let upload = match selection {
            Selection::Upload(upload) => upload,
            Selection::Path(path) => {
                let size = local_file_size(&path).await.map_err(read_failed)?;
                ensure_within_limit(size, self.config.max_upload_bytes)?;
                read_local(&path).await.map_err(read_failed)?
            }
        };
        let asset = ImageAsset::from_upload(upload)?;
        encode_image(&asset)
    }

    /// `Uploading → Analyzing`: keep the preview and start the ticker.
    fn enter_analyzing(&self, generation: u64, preview: EncodedImage) -> bool {
        let mut inner = self.lock();
        if inner.generation != generation || inner.state.phase() != Phase::Uploading {
            debug!("Discarding encoded image of superseded attempt {}", generation);
            return false;
        }

        inner.preview = Some(preview);
        self.transition(&mut inner, SessionState::Analyzing);
        set_status(&mut inner, &self.config, 0);

        let shared = Arc::downgrade(&self.inner);
        let config = Arc::clone(&self.config);
        inner.ticker = Some(StatusTicker::start(self.config.ticker_interval, move |tick| {
            apply_tick(&shared, &config, generation, tick)
        }));
        true
    }

    /// Apply an attempt's outcome unless the attempt has been superseded.
    fn resolve(
        &self,
        generation: u64,
        outcome: Result<ConversionResult, ConversionError>,
    ) -> bool {
        let mut inner = self.lock();
        if inner.generation != generation || !inner.state.phase().is_busy() {
            debug!("Discarding stale resolution of attempt {}", generation);
            return false;
        }
        inner.task = None;
        match outcome {
            Ok(result) => {
                info!("Attempt {} succeeded", generation);
                self.transition(&mut inner, SessionState::Success(result.clone()));
                if let Some(cb) = &self.config.progress_callback {
                    cb.on_success(&result);
                }
            }
            Err(e) => self.fail(&mut inner, e),
        }
        true
    }

    fn fail(&self, inner: &mut Inner, error: ConversionError) {
        warn!("Attempt {} failed: {}", inner.generation, error);
        self.transition(inner, SessionState::Error(error.clone()));
        if let Some(cb) = &self.config.progress_callback {
            cb.on_error(&error);
        }
    }

    /// Replace the state. Leaving `Analyzing` always stops the ticker and
    /// clears the status message.
    fn transition(&self, inner: &mut Inner, next: SessionState) {
        let from = inner.state.phase();
        let to = next.phase();
        inner.state = next;
        if to != Phase::Analyzing {
            inner.ticker = None;
            inner.status_index = None;
        }
        if from != to {
            debug!("Session {} → {}", from, to);
            if let Some(cb) = &self.config.progress_callback {
                cb.on_phase_change(from, to);
            }
        }
    }
}

fn lock_inner(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read_failed(e: crate::error::Sheet2XmlError) -> ConversionError {
    ConversionError::ReadFailed {
        detail: e.to_string(),
    }
}

fn set_status(inner: &mut Inner, config: &ConversionConfig, index: usize) {
    inner.status_index = Some(index);
    if let Some(cb) = &config.progress_callback {
        cb.on_status(index, STATUS_PHASES[index]);
    }
}

fn apply_tick(shared: &Weak<Mutex<Inner>>, config: &ConversionConfig, generation: u64, tick: usize) {
    let Some(shared) = shared.upgrade() else {
        return;
    };
    let mut inner = lock_inner(&shared);
    if inner.generation != generation || inner.state.phase() != Phase::Analyzing {
        return;
    }
    set_status(&mut inner, config, tick % STATUS_PHASES.len());
}

/// Handle to one attempt started by [`ConversionSession::select_file`] or
/// [`ConversionSession::select_path`].
pub struct AttemptHandle {
    session: ConversionSession,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for AttemptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttemptHandle")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl AttemptHandle {
    fn resolved(session: ConversionSession, generation: u64) -> Self {
        Self {
            session,
            generation,
            task: None,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Wait for the attempt to resolve.
    ///
    /// Returns `None` when the attempt was cancelled by a reset, or when the
    /// session has moved on to a later attempt.
    pub async fn wait(self) -> Option<Result<ConversionResult, ConversionError>> {
        if let Some(task) = self.task {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!("Attempt {} task failed: {}", self.generation, e);
                }
            }
        }
        let inner = self.session.lock();
        if inner.generation != self.generation {
            return None;
        }
        match &inner.state {
            SessionState::Success(r) => Some(Ok(r.clone())),
            SessionState::Error(e) => Some(Err(e.clone())),
            _ => None,
        }
    }
}
