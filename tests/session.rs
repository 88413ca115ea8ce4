//! State machine integration tests.
//!
//! The recognition service is scripted, so these run offline and, with
//! paused tokio time, deterministically.

use async_trait::async_trait;
use edgequake_sheet2xml::pipeline::request::ConversionRequest;
use edgequake_sheet2xml::prompts::STATUS_PHASES;
use edgequake_sheet2xml::{
    ConversionConfig, ConversionError, ConversionProgressCallback, ConversionResult,
    ConversionSession, ErrorKind, ImageUpload, InferenceService, Phase, ServiceFailure,
    ServiceResponse, SessionState, TransitionError,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

const SCORE: &str = "<score-partwise version=\"4.0\"><part-list/><part id=\"P1\"><measure number=\"1\"/></part></score-partwise>";

/// Answers every call with the same outcome after `delay`.
struct ScriptedService {
    outcome: Result<ServiceResponse, ServiceFailure>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedService {
    fn replying(text: impl Into<String>) -> Arc<Self> {
        Self::new(Ok(ServiceResponse::text(text)), Duration::ZERO)
    }

    fn failing(message: &str) -> Arc<Self> {
        Self::new(Err(ServiceFailure::from_message(message)), Duration::ZERO)
    }

    fn new(outcome: Result<ServiceResponse, ServiceFailure>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceService for ScriptedService {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn analyze(&self, _request: &ConversionRequest) -> Result<ServiceResponse, ServiceFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.outcome.clone()
    }
}

/// Records every event the session reports.
#[derive(Default)]
struct Recorder {
    phases: Mutex<Vec<Phase>>,
    statuses: Mutex<Vec<String>>,
    resets: AtomicUsize,
}

impl ConversionProgressCallback for Recorder {
    fn on_phase_change(&self, _from: Phase, to: Phase) {
        self.phases.lock().unwrap().push(to);
    }

    fn on_status(&self, _step: usize, message: &str) {
        self.statuses.lock().unwrap().push(message.to_string());
    }

    fn on_reset(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }
}

impl Recorder {
    fn phases(&self) -> Vec<Phase> {
        self.phases.lock().unwrap().clone()
    }

    fn statuses(&self) -> Vec<String> {
        self.statuses.lock().unwrap().clone()
    }
}

fn session_with(service: Arc<ScriptedService>) -> (ConversionSession, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let config = ConversionConfig::builder()
        .progress_callback(recorder.clone())
        .build()
        .unwrap();
    (ConversionSession::new(service, config), recorder)
}

fn reply(xml: &str, summary: Option<&str>) -> String {
    match summary {
        Some(s) => serde_json::json!({ "musicXml": xml, "summary": s }),
        None => serde_json::json!({ "musicXml": xml }),
    }
    .to_string()
}

fn png_upload() -> ImageUpload {
    ImageUpload::new(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR".to_vec(), Some("image/png"))
}

// ── Lifecycle ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_oversized_upload_goes_straight_to_error() {
    let service = ScriptedService::replying(reply(SCORE, Some("x")));
    let (session, recorder) = session_with(service.clone());

    let upload = ImageUpload {
        bytes: vec![0u8; 16],
        declared_media_type: Some("image/jpeg".into()),
        size: 10 * 1024 * 1024 + 1,
    };
    let attempt = session.select_file(upload).unwrap();

    assert_eq!(session.phase(), Phase::Error);
    let outcome = attempt.wait().await;
    assert!(matches!(
        outcome,
        Some(Err(ConversionError::OversizedInput { .. }))
    ));
    assert_eq!(recorder.phases(), vec![Phase::Error]);
    assert_eq!(service.calls(), 0);
}

#[tokio::test]
async fn test_two_megabyte_jpeg_reaches_success() {
    let service = ScriptedService::replying(reply(SCORE, Some("D minor, 3/4")));
    let (session, recorder) = session_with(service.clone());

    let upload = ImageUpload::new(vec![0u8; 2 * 1024 * 1024], Some("image/jpeg"));
    let attempt = session.select_file(upload).unwrap();
    assert_eq!(session.phase(), Phase::Uploading);

    let outcome = attempt.wait().await;
    let expected = ConversionResult {
        xml_content: SCORE.to_string(),
        summary: "D minor, 3/4".to_string(),
    };
    assert_eq!(outcome, Some(Ok(expected.clone())));
    assert_eq!(session.state(), SessionState::Success(expected));
    assert_eq!(
        recorder.phases(),
        vec![Phase::Uploading, Phase::Analyzing, Phase::Success]
    );
    assert_eq!(service.calls(), 1);
    assert!(session
        .preview()
        .is_some_and(|p| p.starts_with("data:image/jpeg;base64,")));
}

#[tokio::test]
async fn test_fetch_failure_shows_connectivity_message() {
    let service = ScriptedService::failing("TypeError: Failed to fetch");
    let (session, _recorder) = session_with(service);

    let outcome = session.select_file(png_upload()).unwrap().wait().await;
    let err = match outcome {
        Some(Err(e)) => e,
        other => panic!("expected an error, got {other:?}"),
    };
    assert_eq!(err.kind(), ErrorKind::Connectivity);
    assert!(!err.to_string().contains("Failed to fetch"));
    assert_eq!(session.phase(), Phase::Error);
}

#[tokio::test]
async fn test_safety_block_is_content_rejected() {
    let service = ScriptedService::failing("Response was blocked by safety settings");
    let (session, _recorder) = session_with(service);

    let outcome = session.select_file(png_upload()).unwrap().wait().await;
    assert!(matches!(
        outcome,
        Some(Err(ConversionError::ContentRejected { .. }))
    ));
}

#[tokio::test]
async fn test_unparseable_reply_is_malformed() {
    let service = ScriptedService::replying("I could not read this score, sorry.");
    let (session, _recorder) = session_with(service);

    let outcome = session.select_file(png_upload()).unwrap().wait().await;
    assert!(matches!(
        outcome,
        Some(Err(ConversionError::MalformedInput { .. }))
    ));

    session.reset();
    assert_eq!(session.phase(), Phase::Idle);
}

#[tokio::test]
async fn test_short_xml_is_incomplete_recognition() {
    let service = ScriptedService::replying(reply("<score-partwise/>", Some("empty")));
    let (session, _recorder) = session_with(service);

    let outcome = session.select_file(png_upload()).unwrap().wait().await;
    assert!(matches!(
        outcome,
        Some(Err(ConversionError::IncompleteRecognition { length: 17 }))
    ));
}

#[tokio::test]
async fn test_missing_summary_uses_default_phrase() {
    let service = ScriptedService::replying(reply(SCORE, None));
    let (session, _recorder) = session_with(service);

    let result = session
        .select_file(png_upload())
        .unwrap()
        .wait()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.summary, edgequake_sheet2xml::prompts::DEFAULT_SUMMARY);
}

#[tokio::test]
async fn test_empty_reply_is_empty_response() {
    let service = ScriptedService::new(Ok(ServiceResponse::default()), Duration::ZERO);
    let (session, _recorder) = session_with(service);

    let outcome = session.select_file(png_upload()).unwrap().wait().await;
    assert_eq!(outcome, Some(Err(ConversionError::EmptyResponse)));
}

// ── Reset ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_reset_from_success_clears_everything() {
    let service = ScriptedService::replying(reply(SCORE, Some("G major")));
    let (session, recorder) = session_with(service);

    session.select_file(png_upload()).unwrap().wait().await;
    assert_eq!(session.phase(), Phase::Success);
    assert!(session.preview().is_some());

    session.reset();
    let snap = session.snapshot();
    assert_eq!(snap.state, SessionState::Idle);
    assert_eq!(snap.preview, None);
    assert_eq!(snap.status_message, None);
    assert_eq!(recorder.resets.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_reset_from_error_clears_everything() {
    let service = ScriptedService::failing("quota exceeded");
    let (session, _recorder) = session_with(service);

    session.select_file(png_upload()).unwrap().wait().await;
    assert_eq!(session.phase(), Phase::Error);

    session.reset();
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.preview(), None);
}

#[tokio::test]
async fn test_session_accepts_new_file_after_reset() {
    let service = ScriptedService::replying(reply(SCORE, Some("G major")));
    let (session, _recorder) = session_with(service.clone());

    let first = session.select_file(png_upload()).unwrap();
    first.wait().await;
    session.reset();

    let second = session.select_file(png_upload()).unwrap();
    assert_eq!(second.generation(), 2);
    assert!(matches!(second.wait().await, Some(Ok(_))));
    assert_eq!(service.calls(), 2);
}

// ── Concurrency ──────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_file_selected_while_analyzing_is_rejected() {
    let service = ScriptedService::new(
        Ok(ServiceResponse::text(reply(SCORE, Some("x")))),
        Duration::from_secs(30),
    );
    let (session, _recorder) = session_with(service.clone());

    let attempt = session.select_file(png_upload()).unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(session.phase(), Phase::Analyzing);

    let err = session.select_file(png_upload()).unwrap_err();
    assert_eq!(
        err,
        TransitionError::Busy {
            phase: "analyzing".to_string()
        }
    );

    assert!(matches!(attempt.wait().await, Some(Ok(_))));
    assert_eq!(service.calls(), 1);
}

#[tokio::test]
async fn test_file_selected_in_terminal_state_is_rejected() {
    let service = ScriptedService::replying(reply(SCORE, Some("x")));
    let (session, _recorder) = session_with(service);

    session.select_file(png_upload()).unwrap().wait().await;
    assert!(session.select_file(png_upload()).is_err());
}

#[tokio::test(start_paused = true)]
async fn test_reset_during_analysis_discards_the_attempt() {
    let service = ScriptedService::new(
        Ok(ServiceResponse::text(reply(SCORE, Some("x")))),
        Duration::from_secs(30),
    );
    let (session, recorder) = session_with(service);

    let attempt = session.select_file(png_upload()).unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(session.phase(), Phase::Analyzing);

    session.reset();
    assert_eq!(session.phase(), Phase::Idle);
    assert_eq!(attempt.wait().await, None);

    let statuses_at_reset = recorder.statuses().len();
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.status_message(), None);
    assert_eq!(recorder.statuses().len(), statuses_at_reset);
}

// ── Status ticker ────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_ticker_advances_in_order_and_stops_on_exit() {
    let service = ScriptedService::new(
        Ok(ServiceResponse::text(reply(SCORE, Some("x")))),
        Duration::from_millis(12_500),
    );
    let (session, recorder) = session_with(service);

    let attempt = session.select_file(png_upload()).unwrap();
    assert!(matches!(attempt.wait().await, Some(Ok(_))));

    let expected: Vec<String> = STATUS_PHASES[..3].iter().map(|s| s.to_string()).collect();
    assert_eq!(recorder.statuses(), expected);
    assert_eq!(session.status_message(), None);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(recorder.statuses().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_ticker_stops_when_analysis_fails() {
    let service = ScriptedService::new(
        Err(ServiceFailure::from_message("network connection lost")),
        Duration::from_millis(12_500),
    );
    let (session, recorder) = session_with(service);

    let outcome = session.select_file(png_upload()).unwrap().wait().await;
    assert!(matches!(
        outcome,
        Some(Err(ConversionError::Connectivity { .. }))
    ));
    assert_eq!(recorder.statuses().len(), 3);
    assert_eq!(session.status_message(), None);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(recorder.statuses().len(), 3);
    assert_eq!(session.status_message(), None);
    assert_eq!(session.phase(), Phase::Error);
}

#[tokio::test(start_paused = true)]
async fn test_ticker_wraps_after_six_messages() {
    let service = ScriptedService::new(
        Ok(ServiceResponse::text(reply(SCORE, Some("x")))),
        Duration::from_millis(37_500),
    );
    let (session, recorder) = session_with(service);

    session.select_file(png_upload()).unwrap().wait().await;

    let statuses = recorder.statuses();
    assert_eq!(statuses.len(), 8);
    for (i, message) in statuses.iter().enumerate() {
        assert_eq!(message, STATUS_PHASES[i % STATUS_PHASES.len()]);
    }
}

// ── File input ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_select_path_reads_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prelude.png");
    std::fs::write(&path, png_upload().bytes).unwrap();

    let service = ScriptedService::replying(reply(SCORE, Some("C major")));
    let (session, recorder) = session_with(service);

    let outcome = session.select_path(&path).unwrap().wait().await;
    assert!(matches!(outcome, Some(Ok(_))));
    assert_eq!(
        recorder.phases(),
        vec![Phase::Uploading, Phase::Analyzing, Phase::Success]
    );
    assert!(session
        .preview()
        .is_some_and(|p| p.starts_with("data:image/png;base64,")));
}

#[tokio::test]
async fn test_select_path_read_failure_is_read_failed() {
    let service = ScriptedService::replying(reply(SCORE, Some("x")));
    let (session, recorder) = session_with(service.clone());

    let outcome = session
        .select_path("/definitely/not/here/score.png")
        .unwrap()
        .wait()
        .await;
    assert!(matches!(
        outcome,
        Some(Err(ConversionError::ReadFailed { .. }))
    ));
    assert_eq!(recorder.phases(), vec![Phase::Uploading, Phase::Error]);
    assert_eq!(service.calls(), 0);
}

#[tokio::test]
async fn test_non_image_upload_is_malformed() {
    let service = ScriptedService::replying(reply(SCORE, Some("x")));
    let (session, _recorder) = session_with(service.clone());

    let upload = ImageUpload::new(b"%PDF-1.7".to_vec(), Some("application/pdf"));
    let outcome = session.select_file(upload).unwrap().wait().await;
    assert!(matches!(
        outcome,
        Some(Err(ConversionError::MalformedInput { .. }))
    ));
    assert_eq!(service.calls(), 0);
}

#[tokio::test]
async fn test_oversized_path_goes_straight_to_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("poster.png");
    std::fs::write(&path, vec![0u8; 2048]).unwrap();

    let service = ScriptedService::replying(reply(SCORE, Some("x")));
    let recorder = Arc::new(Recorder::default());
    let config = ConversionConfig::builder()
        .max_upload_bytes(1024)
        .progress_callback(recorder.clone())
        .build()
        .unwrap();
    let session = ConversionSession::new(service.clone(), config);

    let attempt = session.select_path(&path).unwrap();
    assert_eq!(session.phase(), Phase::Error);
    assert!(matches!(
        attempt.wait().await,
        Some(Err(ConversionError::OversizedInput { size: 2048, limit: 1024 }))
    ));
    assert_eq!(recorder.phases(), vec![Phase::Error]);
    assert_eq!(service.calls(), 0);
}

#[tokio::test]
async fn test_declared_type_with_parameters_is_analyzed() {
    let service = ScriptedService::replying(reply(SCORE, Some("A minor")));
    let (session, _recorder) = session_with(service.clone());

    let upload = ImageUpload::new(
        b"\xFF\xD8\xFF\xE0\0\x10JFIF\0".to_vec(),
        Some("image/jpeg; q=0.9"),
    );
    let outcome = session.select_file(upload).unwrap().wait().await;
    assert!(matches!(outcome, Some(Ok(_))));
    assert!(session
        .preview()
        .is_some_and(|p| p.starts_with("data:image/jpeg;base64,")));
    assert_eq!(service.calls(), 1);
}
