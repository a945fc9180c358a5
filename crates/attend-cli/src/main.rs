mod config;

use anyhow::{bail, Context, Result};
use attend_core::ledger::{DATE_FORMAT, TIME_FORMAT};
use attend_core::{
    Clock, CsvLedgerStore, EuclideanMatcher, FaceExtractor, Gallery, Identity, Ledger, LedgerRow,
    MergeOutcome, NotificationSink, RecognitionSession, ReferenceStore, SessionReport, Status,
    StopReason, StopSignal, SystemClock, MATCH_DISTANCE_THRESHOLD,
};
use attend_vision::{
    ImageDirStore, ImageSequence, OnnxFaceExtractor, ARCFACE_MODEL_FILE, SCRFD_MODEL_FILE,
};
use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand, ValueEnum};
use config::Config;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "attend", about = "Face-recognition attendance CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a reference image for a person
    Register {
        /// Name recorded in the ledger for this person
        #[arg(short, long)]
        name: String,
        /// Image containing exactly one clearly visible face
        image: PathBuf,
    },
    /// Run a recognition session over a directory of frames
    Recognize {
        /// Directory of frames, processed in file name order
        frames: PathBuf,
        /// Session timeout in seconds (overrides configuration)
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Record attendance for a person by hand
    Mark {
        name: String,
        #[arg(short, long, value_enum, default_value_t = ManualStatus::Present)]
        status: ManualStatus,
    },
    /// Show the ledger for a day
    Show {
        /// Day to show (YYYY-MM-DD), today if omitted
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Print rows as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show configuration and model status
    Status,
}

/// Statuses an operator may record directly. Absent is only written by a
/// finished recognition session.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum ManualStatus {
    Present,
    Leave,
}

impl From<ManualStatus> for Status {
    fn from(status: ManualStatus) -> Self {
        match status {
            ManualStatus::Present => Status::Present,
            ManualStatus::Leave => Status::Leave,
        }
    }
}

/// Prints one line per newly written ledger row.
struct ConsoleNotifier;

impl NotificationSink for ConsoleNotifier {
    fn notify(&self, identity: &Identity, status: Status) {
        println!("{identity} marked as {status}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load().context("loading configuration")?;

    match cli.command {
        Commands::Register { name, image } => register(&config, &name, &image),
        Commands::Recognize { frames, timeout } => recognize(config, frames, timeout).await,
        Commands::Mark { name, status } => mark(&config, &name, status.into()),
        Commands::Show { date, json } => show(&config, date, json),
        Commands::Status => status(&config),
    }
}

fn register(config: &Config, name: &str, image_path: &Path) -> Result<()> {
    let identity = Identity::new(name.trim());
    if identity.as_str().is_empty() {
        bail!("name must not be empty");
    }

    let image = image::open(image_path)
        .with_context(|| format!("reading {}", image_path.display()))?
        .to_rgb8();

    let mut extractor = OnnxFaceExtractor::load(&config.model_dir)?;
    let faces = extractor.detect_faces(&image)?;
    match faces.len() {
        0 => bail!("no face detected in {}; choose a clearer photo", image_path.display()),
        1 => {}
        n => tracing::warn!(
            faces = n,
            "several faces detected; the most confident one will be used"
        ),
    }

    let store = ImageDirStore::new(&config.reference_dir);
    let path = store.register(&identity, &image)?;
    println!("Registered {identity} ({})", path.display());
    Ok(())
}

async fn recognize(config: Config, frames: PathBuf, timeout: Option<u64>) -> Result<()> {
    let stop = StopSignal::new();

    let watcher = {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received; stopping after the current frame");
                stop.stop();
            }
        })
    };

    let session_stop = stop.clone();
    let report = tokio::task::spawn_blocking(move || {
        run_session(&config, &frames, timeout, &session_stop)
    })
    .await
    .context("recognition task panicked")?;
    watcher.abort();

    let report = report?;
    print_report(&report);
    Ok(())
}

/// Blocking part of `recognize`: model loading, gallery build and the frame loop.
fn run_session(
    config: &Config,
    frames: &Path,
    timeout: Option<u64>,
    stop: &StopSignal,
) -> Result<SessionReport> {
    let mut extractor = OnnxFaceExtractor::load(&config.model_dir)?;

    let references = ImageDirStore::new(&config.reference_dir).list()?;
    let gallery: Gallery = Gallery::build(references, &mut extractor);
    gallery.require_non_empty()?;
    tracing::info!(identities = gallery.identities().len(), "gallery ready");

    let mut capture = ImageSequence::open(frames)?;
    let mut ledger = Ledger::new(CsvLedgerStore::new(&config.ledger_dir));
    let timeout = timeout
        .map(std::time::Duration::from_secs)
        .unwrap_or_else(|| config.session_timeout());

    let matcher = EuclideanMatcher::new();
    let session = RecognitionSession {
        gallery: &gallery,
        extractor: &mut extractor,
        matcher: &matcher,
        ledger: &mut ledger,
        notifier: &ConsoleNotifier,
        clock: &SystemClock,
        timeout,
    };
    Ok(session.run(&mut capture, stop)?)
}

fn print_report(report: &SessionReport) {
    let ended = match report.stop_reason {
        StopReason::Timeout => "timeout",
        StopReason::Cancelled => "interrupted",
        StopReason::EndOfStream => "all frames processed",
        StopReason::CaptureFailed => "frame could not be read",
    };
    println!(
        "Session for {} ended ({ended}) after {} frames: {} present, {} absent",
        report.date,
        report.frames,
        report.present.len(),
        report.absent.len(),
    );
    if report.skipped_duplicates > 0 {
        println!("{} already recorded earlier today", report.skipped_duplicates);
    }
}

fn mark(config: &Config, name: &str, status: Status) -> Result<()> {
    println!("{}", mark_at(&config.ledger_dir, name, status, SystemClock.now())?);
    Ok(())
}

/// Merge a manual mark into the ledger for `now` and describe the outcome.
fn mark_at(ledger_dir: &Path, name: &str, status: Status, now: NaiveDateTime) -> Result<String> {
    let identity = Identity::new(name.trim());
    if identity.as_str().is_empty() {
        bail!("name must not be empty");
    }

    let mut ledger = Ledger::new(CsvLedgerStore::new(ledger_dir));
    let message = match ledger.merge_record(&identity, now.date(), now.time(), status)? {
        MergeOutcome::Inserted => format!("{identity} marked as {status}"),
        MergeOutcome::SkippedDuplicate => {
            format!("{identity} already has a record for {}; nothing written", now.date())
        }
    };
    Ok(message)
}

fn show(config: &Config, date: Option<NaiveDate>, json: bool) -> Result<()> {
    let date = date.unwrap_or_else(|| SystemClock.now().date());
    let rows = Ledger::new(CsvLedgerStore::new(&config.ledger_dir)).rows(date)?;
    print!("{}", render_rows(date, &rows, json)?);
    Ok(())
}

/// A day's rows as an aligned table, or as pretty JSON.
fn render_rows(date: NaiveDate, rows: &[LedgerRow], json: bool) -> Result<String> {
    if json {
        return Ok(format!("{}\n", serde_json::to_string_pretty(rows)?));
    }
    if rows.is_empty() {
        return Ok(format!("No attendance recorded for {date}\n"));
    }

    let mut out = format!("{:<24} {:<10} {:<8} STATUS\n", "NAME", "DATE", "TIME");
    for row in rows {
        writeln!(
            out,
            "{:<24} {:<10} {:<8} {}",
            row.identity.as_str(),
            row.date.format(DATE_FORMAT).to_string(),
            row.time.format(TIME_FORMAT).to_string(),
            row.status.as_str()
        )?;
    }
    Ok(out)
}

fn status(config: &Config) -> Result<()> {
    let references = ImageDirStore::new(&config.reference_dir).list()?;
    let ledger = CsvLedgerStore::new(&config.ledger_dir);
    let today = SystemClock.now().date();

    let status = serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "config": config,
        "reference_images": references.len(),
        "today_ledger": ledger.path_for(today),
        "today_ledger_exists": ledger.path_for(today).exists(),
        "detector_model_present": config.model_dir.join(SCRFD_MODEL_FILE).exists(),
        "recognizer_model_present": config.model_dir.join(ARCFACE_MODEL_FILE).exists(),
        "match_distance_threshold": MATCH_DISTANCE_THRESHOLD,
    });
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
