//! CLI binary for edgequake-edgeprint.
//!
//! A thin shim over the library crate that maps CLI flags to a
//! `JobRequest` and `PipelineConfig`, runs one job and prints its outcome.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use edgequake_edgeprint::{
    create_store, BleedMode, CleanupReport, HttpWorkerConfig, HttpWorkers, ImageSlicer,
    JobRequest, JobState, LayoutMode, Orchestrator, PipelineConfig, PipelineOutcome,
    PipelineProgressCallback, ProcessingMethod, ProgressCallback, StoreLocation, TreatmentName,
    TrimSize, Workers,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner while slicing and splitting, then a bar over chunk completions.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Validating job…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total_chunks: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} chunks  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_chunks as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Rendering");
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_job_start(&self, job: &str, total_pages: usize, method: ProcessingMethod) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("{job}: {total_pages} pages, {method:?} processing"))
        ));
        if method == ProcessingMethod::Direct {
            self.bar.set_prefix("Processing");
            self.bar.set_message("direct worker…");
        }
    }

    fn on_state_change(&self, _from: JobState, to: JobState) {
        match to {
            JobState::Slicing => self.bar.set_prefix("Slicing"),
            JobState::Splitting => self.bar.set_prefix("Splitting"),
            JobState::Merging => self.bar.set_prefix("Merging"),
            JobState::CleaningUp => self.bar.set_prefix("Cleaning up"),
            _ => {}
        }
    }

    fn on_chunk_start(&self, index: usize, total_chunks: usize) {
        if self.bar.length() != Some(total_chunks as u64) {
            self.activate_bar(total_chunks);
        }
        self.bar.set_message(format!("chunk {index}"));
    }

    fn on_chunk_complete(&self, index: usize, total_chunks: usize) {
        self.bar.println(format!(
            "  {} Chunk {:>3}/{:<3}",
            green("✓"),
            index + 1,
            total_chunks
        ));
        self.bar.inc(1);
    }

    fn on_chunk_error(&self, index: usize, total_chunks: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Chunk {:>3}/{:<3}  {}",
            red("✗"),
            index + 1,
            total_chunks,
            red(&msg)
        ));
        self.bar.inc(1);
    }

    fn on_cleanup_complete(&self, report: &CleanupReport) {
        if !report.is_clean() {
            self.bar.println(format!(
                "  {} cleanup left {} artifact(s) behind",
                cyan("⚠"),
                report.failures.len()
            ));
        }
        if report.already_gone > 0 {
            self.bar.println(format!(
                "  {} {} artifact(s) were not in the store",
                cyan("⚠"),
                report.already_gone
            ));
        }
    }

    fn on_job_complete(&self, outcome: &PipelineOutcome) {
        self.bar.finish_and_clear();
        match outcome {
            PipelineOutcome::Succeeded(s) => eprintln!(
                "{} {} pages  →  {}",
                green("✔"),
                bold(&s.total_pages.to_string()),
                bold(&s.output_url)
            ),
            PipelineOutcome::Failed(f) => eprintln!(
                "{} failed at {} stage{}",
                red("✘"),
                bold(f.failed_stage.as_str()),
                match self.errors.load(Ordering::SeqCst) {
                    0 => String::new(),
                    n => dim(&format!("  ({n} chunk error(s))")),
                }
            ),
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # 120-page book, fore-edge only, remote workers
  edgeprint --source uploads/book.pdf --output job-42/output.pdf --pages 120 \
    --treatment primary=uploads/edge.png --workers-url http://localhost:8080 \
    --store-root ./data

  # All three edges, existing bleed, slicing done in-process
  edgeprint --source uploads/book.pdf --output job-43/output.pdf --pages 320 \
    --treatment primary=uploads/side.png --treatment top=uploads/top.png \
    --treatment bottom=uploads/bottom.png --layout multi-surface --bleed existing \
    --workers-url http://localhost:8080 --store-root ./data --local-slicing

  # Check the worker service before running
  edgeprint --check-workers --workers-url http://localhost:8080 --store-root ./data ...

  # Dry run against a throwaway in-memory store
  edgeprint --memory-store --workers-url http://localhost:8080 ...

TREATMENTS:
  primary (alias side)        fore-edge artwork, used in every layout
  secondary-a (alias top)     top-edge artwork, multi-surface only
  secondary-b (alias bottom)  bottom-edge artwork, multi-surface only

ENVIRONMENT VARIABLES:
  EDGEPRINT_WORKERS_URL       Base URL of the worker service
  EDGEPRINT_STORE_ROOT        Object-store root shared with the workers (required)
  EDGEPRINT_MEMORY_STORE      Use a throwaway in-memory store instead (dry runs)
  EDGEPRINT_CHUNK_THRESHOLD   Largest page count processed directly (default 50)
  EDGEPRINT_PAGES_PER_CHUNK   Pages per chunk (default 40, must be even)
  EDGEPRINT_MAX_CONCURRENCY   Cap on concurrent rendering calls
  RUST_LOG                    Overrides the log filter
"#;

/// Composite edge artwork onto a print-ready document.
#[derive(Parser, Debug)]
#[command(
    name = "edgeprint",
    version,
    about = "Composite edge artwork onto a print-ready document",
    long_about = "Run one edge-printing job. Small documents go to a single direct worker; \
larger ones are sliced, split into chunks, rendered in parallel and merged in page order.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Object-store path of the source document.
    #[arg(long)]
    source: String,

    /// Object-store path to write the final document to.
    #[arg(short, long)]
    output: String,

    /// Page count of the source document.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pages: u64,

    /// Treatment image as NAME=PATH (primary, secondary-a, secondary-b). Repeatable.
    #[arg(long = "treatment", value_name = "NAME=PATH", value_parser = parse_treatment)]
    treatments: Vec<(TreatmentName, String)>,

    /// How page bleed is produced.
    #[arg(long, value_enum, default_value = "add-bleed")]
    bleed: BleedArg,

    /// Which page edges receive a treatment.
    #[arg(long, value_enum, default_value = "single-surface")]
    layout: LayoutArg,

    /// Trim width in inches.
    #[arg(long, default_value_t = 5.0)]
    trim_width: f64,

    /// Trim height in inches.
    #[arg(long, default_value_t = 8.0)]
    trim_height: f64,

    /// Base URL of the worker service.
    #[arg(long, env = "EDGEPRINT_WORKERS_URL")]
    workers_url: String,

    /// Per-request worker timeout in seconds.
    #[arg(long, env = "EDGEPRINT_WORKER_TIMEOUT", default_value_t = 300)]
    worker_timeout: u64,

    /// Root directory of the object store the workers read and write.
    #[arg(
        long,
        env = "EDGEPRINT_STORE_ROOT",
        required_unless_present = "memory_store",
        conflicts_with = "memory_store"
    )]
    store_root: Option<PathBuf>,

    /// Use a process-local store the workers cannot see. Dry runs only:
    /// cleanup finds nothing to delete.
    #[arg(long, env = "EDGEPRINT_MEMORY_STORE")]
    memory_store: bool,

    /// Slice treatment images in-process instead of calling the worker service.
    #[arg(long, env = "EDGEPRINT_LOCAL_SLICING")]
    local_slicing: bool,

    /// Largest page count processed in one direct invocation.
    #[arg(long, env = "EDGEPRINT_CHUNK_THRESHOLD", default_value_t = 50)]
    chunk_threshold: usize,

    /// Pages per chunk; must be even and match the splitting worker.
    #[arg(long, env = "EDGEPRINT_PAGES_PER_CHUNK", default_value_t = 40)]
    pages_per_chunk: usize,

    /// Cap on concurrent rendering invocations (default: one per chunk).
    #[arg(long, env = "EDGEPRINT_MAX_CONCURRENCY")]
    max_concurrency: Option<usize>,

    /// Also delete split and processed chunks after the job.
    #[arg(long, env = "EDGEPRINT_PURGE_CHUNKS")]
    purge_chunks: bool,

    /// Call the worker service's health endpoint before starting.
    #[arg(long)]
    check_workers: bool,

    /// Disable progress bar.
    #[arg(long, env = "EDGEPRINT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "EDGEPRINT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the outcome JSON.
    #[arg(short, long, env = "EDGEPRINT_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum BleedArg {
    AddBleed,
    Existing,
}

impl From<BleedArg> for BleedMode {
    fn from(v: BleedArg) -> Self {
        match v {
            BleedArg::AddBleed => BleedMode::AddBleed,
            BleedArg::Existing => BleedMode::Existing,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum LayoutArg {
    SingleSurface,
    MultiSurface,
}

impl From<LayoutArg> for LayoutMode {
    fn from(v: LayoutArg) -> Self {
        match v {
            LayoutArg::SingleSurface => LayoutMode::SingleSurface,
            LayoutArg::MultiSurface => LayoutMode::MultiSurface,
        }
    }
}

fn parse_treatment(s: &str) -> Result<(TreatmentName, String), String> {
    let (name, path) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=PATH, got '{s}'"))?;
    let name: TreatmentName = name.trim().parse().map_err(|e| format!("{e}"))?;
    let path = path.trim();
    if path.is_empty() {
        return Err(format!("treatment '{name}' has an empty path"));
    }
    Ok((name, path.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress;
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

    // ── Workers and store ────────────────────────────────────────────────
    let http_config = HttpWorkerConfig::new(cli.workers_url.clone()).timeout_secs(cli.worker_timeout);
    let http = Arc::new(HttpWorkers::new(http_config).context("Invalid worker service URL")?);

    if cli.check_workers {
        http.health()
            .await
            .map_err(|e| anyhow!("{e}"))
            .with_context(|| format!("Worker service at {} is not healthy", cli.workers_url))?;
        if !cli.quiet {
            eprintln!("{} worker service healthy", green("✔"));
        }
    }

    let location = store_location(&cli);
    if location == StoreLocation::Memory {
        warn!("Using an in-memory store; worker artifacts will not be cleaned up");
    }
    let store = create_store(&location).context("Failed to open object store")?;

    let mut workers = Workers::from_shared(http);
    if cli.local_slicing {
        workers = workers.with_slicer(Arc::new(ImageSlicer::new(
            store.clone(),
            cli.pages_per_chunk,
        )));
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn PipelineProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;
    let request = build_request(&cli)?;

    // ── Run ──────────────────────────────────────────────────────────────
    let orchestrator = Orchestrator::new(workers, store, config);
    let outcome = orchestrator.run(&request).await;

    let json = serde_json::to_string_pretty(&outcome).context("Failed to serialise outcome")?;
    println!("{json}");
    std::process::exit(outcome.exit_code());
}

fn store_location(cli: &Cli) -> StoreLocation {
    match cli.store_root {
        Some(ref root) if !cli.memory_store => StoreLocation::Local(root.clone()),
        _ => StoreLocation::Memory,
    }
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .chunk_threshold(cli.chunk_threshold)
        .pages_per_chunk(cli.pages_per_chunk)
        .purge_chunk_artifacts(cli.purge_chunks);
    if let Some(n) = cli.max_concurrency {
        builder = builder.max_concurrent_renders(n);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid pipeline configuration")
}

/// Map CLI args to the job request.
fn build_request(cli: &Cli) -> Result<JobRequest> {
    let mut treatments = BTreeMap::new();
    for (name, path) in &cli.treatments {
        if treatments.insert(*name, path.clone()).is_some() {
            return Err(anyhow!("treatment '{name}' given more than once"));
        }
    }
    Ok(JobRequest {
        source_path: cli.source.clone(),
        treatments,
        total_pages: cli.pages as usize,
        trim_size: TrimSize {
            width_in: cli.trim_width,
            height_in: cli.trim_height,
        },
        bleed_mode: cli.bleed.clone().into(),
        layout_mode: cli.layout.clone().into(),
        output_path: cli.output.clone(),
    })
}
