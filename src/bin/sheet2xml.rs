//! CLI binary for edgequake-sheet2xml.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ConversionConfig`, drives one `ConversionSession` attempt, and prints
//! the exported MusicXML.

use anyhow::{bail, Context, Result};
use clap::Parser;
use edgequake_sheet2xml::pipeline::input::{is_url, resolve_input};
use edgequake_sheet2xml::{
    resolve_service, to_musicxml_document, write_musicxml, ConversionConfig, ConversionError,
    ConversionProgressCallback, ConversionResult, ConversionSession, Phase, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal spinner that shows the session phase as its prefix and the
/// status-ticker message as its text.
struct CliProgressCallback {
    bar: ProgressBar,
    started: Instant,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Waiting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            started: Instant::now(),
        })
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_phase_change(&self, _from: Phase, to: Phase) {
        match to {
            Phase::Uploading => {
                self.bar.set_prefix("Uploading");
                self.bar.set_message("Reading the image…");
            }
            Phase::Analyzing => self.bar.set_prefix("Analyzing"),
            _ => {}
        }
    }

    fn on_status(&self, _step: usize, message: &str) {
        self.bar.set_message(message.to_string());
    }

    fn on_success(&self, result: &ConversionResult) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} Recognised {} in {:.1}s",
            green("✔"),
            bold(&format!("{} chars of MusicXML", result.xml_content.chars().count())),
            self.started.elapsed().as_secs_f64()
        );
    }

    fn on_error(&self, error: &ConversionError) {
        self.bar.finish_and_clear();
        eprintln!("{}", failure_line(error));
    }

    fn on_reset(&self) {
        self.bar.finish_and_clear();
    }
}

/// Spinner line for a failed attempt. Only the category is shown; `main`
/// reports the message itself.
fn failure_line(error: &ConversionError) -> String {
    format!("{} {}", red("✘"), dim(&format!("{:?}", error.kind())))
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Print MusicXML to stdout
  sheet2xml etude.jpg

  # Write to a file
  sheet2xml etude.jpg -o etude.musicxml

  # Summary in another language
  sheet2xml --language Uzbek etude.jpg -o etude.musicxml

  # Use a different provider
  sheet2xml --provider openai --model gpt-4.1 etude.jpg

  # Convert from URL
  sheet2xml https://example.org/scans/minuet.png -o minuet.musicxml

  # JSON output {xmlContent, summary}
  sheet2xml --json etude.jpg > etude.json

SUPPORTED PROVIDERS:
  Provider     Model                      Output schema
  ─────────    ─────────────────────────  ─────────────
  gemini       gemini-2.5-pro (default)   enforced by the API
  gemini       gemini-2.5-flash           enforced by the API
  openai       gpt-4.1                    in prompt
  anthropic    claude-sonnet-4-20250514   in prompt
  ollama       llama3.2-vision            in prompt

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (API_KEY is also accepted)
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Provider used when no Gemini key is set
  EDGEQUAKE_MODEL         Model used with EDGEQUAKE_LLM_PROVIDER

LIMITS:
  Images up to 10 MiB. JPEG, PNG, WebP, GIF, BMP and TIFF are accepted.
  Press Ctrl-C to cancel a running analysis.
"#;

/// Convert photos of sheet music to MusicXML using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "sheet2xml",
    version,
    about = "Convert photos of sheet music to MusicXML using Vision LLMs",
    long_about = "Convert a photo or scan of printed sheet music (local file or URL) to a \
MusicXML score plus a short summary of the piece. Uses Google Gemini natively, or any \
provider supported by edgequake-llm (OpenAI, Anthropic, Ollama, …).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local image file path or HTTP/HTTPS URL.
    input: String,

    /// Write MusicXML to this file instead of stdout.
    #[arg(short, long, env = "SHEET2XML_OUTPUT")]
    output: Option<PathBuf>,

    /// Model ID (e.g. gemini-2.5-pro, gemini-2.5-flash, gpt-4.1).
    #[arg(long, env = "SHEET2XML_MODEL")]
    model: Option<String>,

    /// Provider: gemini, openai, anthropic, ollama.
    #[arg(long, env = "SHEET2XML_PROVIDER")]
    provider: Option<String>,

    /// Gemini API key (defaults to GEMINI_API_KEY).
    #[arg(long, env = "SHEET2XML_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Language of the summary.
    #[arg(long, env = "SHEET2XML_LANGUAGE", default_value = "English")]
    language: String,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "SHEET2XML_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Max visible output tokens.
    #[arg(long, env = "SHEET2XML_MAX_TOKENS", default_value_t = 12_000)]
    max_tokens: usize,

    /// Reasoning budget in tokens (Gemini only).
    #[arg(long, env = "SHEET2XML_THINKING_BUDGET", default_value_t = 4_000)]
    thinking_budget: u32,

    /// Timeout for the recognition call in seconds (none by default).
    #[arg(long, env = "SHEET2XML_API_TIMEOUT")]
    api_timeout: Option<u64>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "SHEET2XML_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Path to a text file containing a custom recognition prompt.
    #[arg(long, env = "SHEET2XML_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Output JSON {xmlContent, summary} instead of MusicXML.
    #[arg(long, env = "SHEET2XML_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "SHEET2XML_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SHEET2XML_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SHEET2XML_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs while the spinner is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config and service ─────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;
    let service = resolve_service(&config).context("No recognition service available")?;
    let session = ConversionSession::new(service, config);

    // ── Run one attempt ──────────────────────────────────────────────────
    let attempt = if is_url(&cli.input) {
        let upload = resolve_input(&cli.input, cli.download_timeout, session.config().max_upload_bytes)
            .await
            .context("Failed to download image")?;
        session.select_file(upload)?
    } else {
        session.select_path(&cli.input)?
    };

    let outcome = tokio::select! {
        outcome = attempt.wait() => outcome,
        _ = tokio::signal::ctrl_c() => {
            session.reset();
            bail!("Cancelled");
        }
    };

    let result = match outcome {
        Some(Ok(result)) => result,
        Some(Err(e)) => bail!("Conversion failed: {e}"),
        None => bail!("Conversion was cancelled"),
    };

    // ── Emit output ──────────────────────────────────────────────────────
    if let Some(ref output_path) = cli.output {
        write_musicxml(&result, output_path)
            .await
            .context("Failed to write MusicXML")?;
        if !cli.quiet {
            eprintln!("{}  →  {}", green("✔"), bold(&output_path.display().to_string()));
        }
    }

    if cli.json {
        let json = serde_json::to_string_pretty(&result).context("Failed to serialise output")?;
        println!("{json}");
    } else if cli.output.is_none() {
        let document = to_musicxml_document(&result);
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(document.as_bytes())
            .context("Failed to write to stdout")?;
        if !document.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    if !cli.quiet && !cli.json {
        eprintln!("{} {}", dim("summary:"), result.summary);
    }

    Ok(())
}

/// Map CLI args to `ConversionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .summary_language(cli.language.clone())
        .temperature(cli.temperature)
        .max_output_tokens(cli.max_tokens)
        .thinking_budget(cli.thinking_budget)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key.clone());
    }
    if let Some(secs) = cli.api_timeout {
        builder = builder.api_timeout_secs(secs);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
