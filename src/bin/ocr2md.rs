//! CLI binary for edgequake-ocr2md.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig` / `SummaryOptions` and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_ocr2md::store::{self, OutputDirs};
use edgequake_ocr2md::{
    extract, inspect, EngineKind, ExtractionConfig, ExtractionOutput, ExtractionProgressCallback,
    MarkdownDocument, PageSelection, PageSeparator, ProgressCallback, RemoteProvider, Summarizer,
    SummaryOptions, SummaryStyle,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per page.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Start time of the page currently being recognised.
    page_started: Mutex<Option<Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_extraction_start` tells us the page count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening document…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            page_started: Mutex::new(None),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Recognising");
        self.bar.reset_eta();
    }

    fn page_elapsed_secs(&self) -> f64 {
        self.page_started
            .lock()
            .ok()
            .and_then(|mut t| t.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Recognising {total_pages} page(s)…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut t) = self.page_started.lock() {
            *t = Some(Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, chars: usize) {
        let secs = self.page_elapsed_secs();
        let size = if chars == 0 {
            "blank".to_string()
        } else {
            format!("{chars:>5} chars")
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<11}  {}",
            green("✓"),
            page_num,
            total,
            dim(&size),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let secs = self.page_elapsed_secs();
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            let head: String = error.chars().take(79).collect();
            format!("{head}\u{2026}")
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
    }

    fn on_extraction_complete(&self, total_pages: usize, success_count: usize) {
        self.bar.finish_and_clear();
        if self.errors.load(Ordering::SeqCst) == 0 && success_count == total_pages {
            eprintln!(
                "{} {} page(s) recognised",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} stopped after {}/{} page(s)",
                red("✘"),
                bold(&success_count.to_string()),
                total_pages,
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Scanned chapter with local Tesseract, saved under outputs/saved_markdown/
  ocr2md extract chapter3.pdf

  # Arabic + English, pages 3 to 15
  ocr2md extract --lang ara,eng --pages 3-15 notes.pdf

  # Whiteboard photo with Gemini, printed to stdout
  ocr2md extract --engine gemini --stdout board.jpg

  # Extract and write a French summary next to it
  ocr2md extract --engine openai --summarize --summary-lang French lecture.pdf

  # Flashcards from a previously extracted file
  ocr2md summarize --style flashcards outputs/saved_markdown/lecture_20250101-101500-123.md

  # Kind and page count only (no engine needed)
  ocr2md inspect https://example.org/scan.pdf

ENGINES:
  Engine      Runs    Requires
  ─────────   ──────  ──────────────────────────────────────────
  tesseract   local   tesseract binary + language data (default)
  easyocr     local   python3 with `pip install easyocr`
  paddleocr   local   python3 with `pip install paddleocr`
  gemini      remote  GEMINI_API_KEY (or GEMINI_AI_API_KEY / GOOGLE_API_KEY)
  openai      remote  OPENAI_API_KEY

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY      Google Gemini API key
  OPENAI_API_KEY      OpenAI API key
  TESSERACT_CMD       Tesseract executable (default: tesseract)
  OCR2MD_PYTHON       Python interpreter for EasyOCR / PaddleOCR (default: python3)
  PDFIUM_LIB_PATH     Path to libpdfium (file or directory)
  RUST_LOG            Log filter, overrides --verbose

  A .env file in the working directory is loaded on start-up.
"#;

/// OCR scanned PDFs and images to Markdown, then summarize them.
#[derive(Parser, Debug)]
#[command(
    name = "ocr2md",
    version,
    about = "OCR scanned PDFs and images to Markdown, then summarize them",
    long_about = "Turn scanned PDFs, photos and whiteboard images into clean Markdown with a \
local OCR engine (Tesseract, EasyOCR, PaddleOCR) or a vision model (Gemini, OpenAI), and \
optionally condense the result into a summary or flashcards.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "OCR2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "OCR2MD_QUIET")]
    quiet: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "OCR2MD_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract Markdown from a PDF, PNG or JPEG (path or URL).
    Extract(ExtractArgs),
    /// Summarize a Markdown file.
    Summarize(SummarizeArgs),
    /// Print the detected kind and page count of a document.
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Local file path or HTTP/HTTPS URL.
    input: String,

    /// OCR engine.
    #[arg(long, env = "OCR2MD_ENGINE", value_enum, default_value = "tesseract")]
    engine: EngineArg,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "OCR2MD_PAGES", default_value = "all")]
    pages: String,

    /// Rendering DPI (72–400).
    #[arg(long, env = "OCR2MD_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// OCR languages, comma separated (e.g. eng,fra for Tesseract, en,ar for EasyOCR).
    #[arg(long, env = "OCR2MD_LANG", value_delimiter = ',')]
    lang: Vec<String>,

    /// Model ID for remote engines (default: gemini-1.5-pro / gpt-4o).
    #[arg(long, env = "OCR2MD_MODEL")]
    model: Option<String>,

    /// Page separator: hr, none, comment, or custom string.
    #[arg(long, env = "OCR2MD_SEPARATOR", default_value = "hr")]
    separator: String,

    /// Root directory for saved_markdown/ and summaries/.
    #[arg(long, env = "OCR2MD_OUT_DIR", default_value = "outputs")]
    out_dir: PathBuf,

    /// Print Markdown to stdout instead of saving it.
    #[arg(long, env = "OCR2MD_STDOUT")]
    stdout: bool,

    /// Print structured JSON (ExtractionOutput) to stdout instead of saving.
    #[arg(long, env = "OCR2MD_JSON")]
    json: bool,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "OCR2MD_PASSWORD")]
    password: Option<String>,

    /// Skip grayscale / upscale / contrast preprocessing for local engines.
    #[arg(long, env = "OCR2MD_NO_PREPROCESS")]
    no_preprocess: bool,

    /// Path to a text file containing a custom OCR prompt for remote engines.
    #[arg(long, env = "OCR2MD_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max output tokens per page for remote engines.
    #[arg(long, env = "OCR2MD_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Temperature for remote engines (0.0–2.0).
    #[arg(long, env = "OCR2MD_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// Retries on transient remote failures.
    #[arg(long, env = "OCR2MD_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Per-call timeout for remote engines in seconds.
    #[arg(long, env = "OCR2MD_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "OCR2MD_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Python interpreter for EasyOCR / PaddleOCR.
    #[arg(long, env = "OCR2MD_PYTHON")]
    python: Option<String>,

    /// Tesseract executable.
    #[arg(long, env = "TESSERACT_CMD")]
    tesseract_cmd: Option<String>,

    /// Also summarize the extracted Markdown.
    #[arg(long, env = "OCR2MD_SUMMARIZE")]
    summarize: bool,

    #[command(flatten)]
    summary: SummaryArgs,
}

#[derive(Args, Debug)]
struct SummaryArgs {
    /// Summary style.
    #[arg(long, env = "OCR2MD_STYLE", value_enum, default_value = "summary")]
    style: StyleArg,

    /// Summary language (default: the document's own language).
    #[arg(long = "summary-lang", visible_alias = "language", env = "OCR2MD_SUMMARY_LANG")]
    summary_lang: Option<String>,

    /// Model used for the summary.
    #[arg(long, env = "OCR2MD_SUMMARY_MODEL")]
    summary_model: Option<String>,
}

#[derive(Args, Debug)]
struct SummarizeArgs {
    /// Markdown file to summarize.
    markdown_file: PathBuf,

    /// Summary engine.
    #[arg(long, env = "OCR2MD_SUMMARY_ENGINE", value_enum, default_value = "gemini")]
    engine: ProviderArg,

    #[command(flatten)]
    summary: SummaryArgs,

    /// Root directory for summaries/.
    #[arg(long, env = "OCR2MD_OUT_DIR", default_value = "outputs")]
    out_dir: PathBuf,

    /// Print the summary to stdout instead of saving it.
    #[arg(long, env = "OCR2MD_STDOUT")]
    stdout: bool,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Local file path or HTTP/HTTPS URL.
    input: String,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "OCR2MD_PASSWORD")]
    password: Option<String>,

    /// Output JSON.
    #[arg(long, env = "OCR2MD_JSON")]
    json: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum EngineArg {
    Tesseract,
    Easyocr,
    Paddleocr,
    Gemini,
    Openai,
}

impl From<EngineArg> for EngineKind {
    fn from(v: EngineArg) -> Self {
        match v {
            EngineArg::Tesseract => EngineKind::Tesseract,
            EngineArg::Easyocr => EngineKind::EasyOcr,
            EngineArg::Paddleocr => EngineKind::PaddleOcr,
            EngineArg::Gemini => EngineKind::Gemini,
            EngineArg::Openai => EngineKind::OpenAi,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ProviderArg {
    Gemini,
    Openai,
}

impl From<ProviderArg> for RemoteProvider {
    fn from(v: ProviderArg) -> Self {
        match v {
            ProviderArg::Gemini => RemoteProvider::Gemini,
            ProviderArg::Openai => RemoteProvider::OpenAi,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum StyleArg {
    Summary,
    Flashcards,
}

impl From<StyleArg> for SummaryStyle {
    fn from(v: StyleArg) -> Self {
        match v {
            StyleArg::Summary => SummaryStyle::Summary,
            StyleArg::Flashcards => SummaryStyle::Flashcards,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Credentials may live in .env; a missing file is fine.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; --verbose brings them back.
    let prints_to_stdout = match &cli.command {
        Command::Extract(a) => a.stdout || a.json,
        Command::Summarize(a) => a.stdout,
        Command::Inspect(_) => true,
    };
    let show_progress = !cli.quiet
        && !cli.no_progress
        && matches!(cli.command, Command::Extract(ref a) if !a.json);
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress || prints_to_stdout {
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

    match cli.command {
        Command::Extract(ref args) => run_extract(args, cli.quiet, show_progress).await,
        Command::Summarize(ref args) => run_summarize(args, cli.quiet).await,
        Command::Inspect(ref args) => run_inspect(args).await,
    }
}

// ── extract ──────────────────────────────────────────────────────────────────

async fn run_extract(args: &ExtractArgs, quiet: bool, show_progress: bool) -> Result<()> {
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };

    let config = build_config(args, progress_cb).await?;
    let output = extract(&args.input, &config)
        .await
        .context("Extraction failed")?;

    let dirs = OutputDirs::under(&args.out_dir);
    if args.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if args.stdout {
        write_stdout(&output.document.markdown)?;
    } else {
        let path = store::save_markdown(&output.document, &dirs)
            .context("Failed to save Markdown")?;
        if !quiet {
            print_extract_summary(&output, &path);
        }
    }

    if args.summarize {
        let provider = args
            .engine
            .remote_provider()
            .unwrap_or(RemoteProvider::Gemini);
        let summary_path = summarize_document(
            &output.document,
            provider,
            &args.summary,
            &dirs,
            args.stdout || args.json,
        )
        .await?;
        if let (Some(path), false) = (summary_path, quiet) {
            eprintln!("{}  summary  →  {}", green("✔"), bold(&path.display().to_string()));
        }
    }

    Ok(())
}

impl EngineArg {
    /// The remote provider behind a remote engine, reused for summaries.
    fn remote_provider(self) -> Option<RemoteProvider> {
        EngineKind::from(self).remote_provider()
    }
}

fn print_extract_summary(output: &ExtractionOutput, path: &Path) {
    let stats = &output.stats;
    eprintln!(
        "{}  {}/{} pages  {}ms  →  {}",
        green("✔"),
        stats.processed_pages,
        stats.total_pages,
        stats.total_duration_ms,
        bold(&path.display().to_string()),
    );
    if stats.empty_pages > 0 {
        eprintln!("   {} blank page(s)", dim(&stats.empty_pages.to_string()));
    }
    if stats.total_input_tokens > 0 {
        eprintln!(
            "   {} tokens in  /  {} tokens out",
            dim(&stats.total_input_tokens.to_string()),
            dim(&stats.total_output_tokens.to_string()),
        );
    }
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(
    args: &ExtractArgs,
    progress: Option<ProgressCallback>,
) -> Result<ExtractionConfig> {
    let pages = parse_pages(&args.pages)?;
    let separator = parse_separator(&args.separator);

    let mut builder = ExtractionConfig::builder()
        .engine(args.engine.into())
        .dpi(args.dpi)
        .pages(pages)
        .languages(args.lang.iter().cloned())
        .preprocess(!args.no_preprocess)
        .page_separator(separator)
        .max_tokens(args.max_tokens)
        .temperature(args.temperature)
        .max_retries(args.max_retries)
        .api_timeout_secs(args.api_timeout)
        .download_timeout_secs(args.download_timeout);

    if let Some(ref path) = args.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref model) = args.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref password) = args.password {
        builder = builder.password(password.clone());
    }
    if let Some(ref python) = args.python {
        builder = builder.python(python.clone());
    }
    if let Some(ref cmd) = args.tesseract_cmd {
        builder = builder.tesseract_cmd(cmd.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

// ── summarize ────────────────────────────────────────────────────────────────

async fn run_summarize(args: &SummarizeArgs, quiet: bool) -> Result<()> {
    let markdown = tokio::fs::read_to_string(&args.markdown_file)
        .await
        .with_context(|| format!("Failed to read {}", args.markdown_file.display()))?;
    let source_name = args
        .markdown_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.md".to_string());
    let doc = MarkdownDocument::new(source_name, markdown);

    let dirs = OutputDirs::under(&args.out_dir);
    let path =
        summarize_document(&doc, args.engine.into(), &args.summary, &dirs, args.stdout).await?;
    if let (Some(path), false) = (path, quiet) {
        eprintln!("{}  {}", green("✔"), bold(&path.display().to_string()));
    }
    Ok(())
}

/// Summarize `doc` and save it, or print it when `to_stdout`.
async fn summarize_document(
    doc: &MarkdownDocument,
    provider: RemoteProvider,
    args: &SummaryArgs,
    dirs: &OutputDirs,
    to_stdout: bool,
) -> Result<Option<PathBuf>> {
    let mut builder = SummaryOptions::builder()
        .engine(provider)
        .style(args.style.into());
    if let Some(ref lang) = args.summary_lang {
        builder = builder.language(lang.clone());
    }
    if let Some(ref model) = args.summary_model {
        builder = builder.model(model.clone());
    }
    let options = builder.build().context("Invalid summary options")?;

    let summarizer = Summarizer::connect(options).context("Cannot connect summarizer")?;
    let summary = summarizer
        .summarize(doc)
        .await
        .context("Summarization failed")?;

    if to_stdout {
        write_stdout(&summary.markdown)?;
        return Ok(None);
    }
    let path = store::save_summary(&summary, dirs).context("Failed to save summary")?;
    Ok(Some(path))
}

// ── inspect ──────────────────────────────────────────────────────────────────

async fn run_inspect(args: &InspectArgs) -> Result<()> {
    let report = inspect(&args.input, args.password.clone())
        .await
        .context("Failed to inspect document")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize report")?
        );
    } else {
        println!("File:   {}", report.source_name);
        println!("Kind:   {}", report.kind);
        println!("Pages:  {}", report.page_count);
        println!("Size:   {} bytes", report.size_bytes);
    }
    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn write_stdout(text: &str) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(text.as_bytes())
        .context("Failed to write to stdout")?;
    if !text.ends_with('\n') {
        handle.write_all(b"\n").ok();
    }
    Ok(())
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    // Range: "3-15"
    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start
            .trim()
            .parse()
            .context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;

        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            anyhow::bail!(
                "Invalid page range '{}-{}': start must be <= end",
                start,
                end
            );
        }

        return Ok(PageSelection::Range(start, end));
    }

    // Set: "1,3,5,7"
    if s.contains(',') {
        let pages: Vec<usize> = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .with_context(|| format!("Invalid page number: '{}'", p.trim()))
            })
            .collect::<Result<Vec<_>>>()?;

        if pages.contains(&0) {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got 0)");
        }

        return Ok(PageSelection::Set(pages));
    }

    // Single page: "5"
    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }

    Ok(PageSelection::Single(page))
}

/// Parse `--separator` string into `PageSeparator`.
fn parse_separator(s: &str) -> PageSeparator {
    match s.to_lowercase().as_str() {
        "none" => PageSeparator::None,
        "hr" | "---" => PageSeparator::HorizontalRule,
        "comment" => PageSeparator::Comment,
        _ => PageSeparator::Custom(s.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_parse() {
        assert_eq!(parse_pages("all").unwrap(), PageSelection::All);
        assert_eq!(parse_pages(" 5 ").unwrap(), PageSelection::Single(5));
        assert_eq!(parse_pages("3-15").unwrap(), PageSelection::Range(3, 15));
        assert_eq!(parse_pages("1,3,5").unwrap(), PageSelection::Set(vec![1, 3, 5]));
        assert!(parse_pages("0").is_err());
        assert!(parse_pages("9-2").is_err());
        assert!(parse_pages("1,x").is_err());
    }

    #[test]
    fn separator_parse_keeps_custom_case() {
        assert_eq!(parse_separator("HR"), PageSeparator::HorizontalRule);
        assert_eq!(parse_separator("none"), PageSeparator::None);
        assert_eq!(
            parse_separator("<!-- Break -->"),
            PageSeparator::Custom("<!-- Break -->".into())
        );
    }

    #[test]
    fn cli_parses_extract_with_summary_flags() {
        let cli = Cli::try_parse_from([
            "ocr2md",
            "extract",
            "--engine",
            "openai",
            "--lang",
            "eng,fra",
            "--summarize",
            "--style",
            "flashcards",
            "--summary-lang",
            "French",
            "doc.pdf",
        ])
        .unwrap();
        match cli.command {
            Command::Extract(a) => {
                assert_eq!(a.input, "doc.pdf");
                assert_eq!(a.lang, vec!["eng", "fra"]);
                assert!(a.summarize);
                assert_eq!(a.engine.remote_provider(), Some(RemoteProvider::OpenAi));
                assert_eq!(SummaryStyle::from(a.summary.style), SummaryStyle::Flashcards);
                assert_eq!(a.summary.summary_lang.as_deref(), Some("French"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_verify() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
