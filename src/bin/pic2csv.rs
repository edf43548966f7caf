//! CLI binary for pic2csv.
//!
//! A thin shim over the library crate: flags map to `ExtractionConfig`, the
//! extracted tables go into a `Session`, and the session is optionally edited
//! from stdin before it is exported.

use anyhow::{bail, Context, Result};
use clap::Parser;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};
use indicatif::{ProgressBar, ProgressStyle};
use pic2csv::editor::command::HELP;
use pic2csv::{
    export, extract, Command, CsvOptions, DropOutcome, EditOutcome, ExportFormat,
    ExtractionConfig, ExtractionProgressCallback, GridView, PageSelection, Pic2CsvError,
    ProgressCallback, Reply, Session,
};
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
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

/// Live progress bar plus one log line per page. Pages may complete out of
/// order when several are in flight.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    /// Starts as a spinner; `on_extraction_start` turns it into a bar.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading input…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Extracting");
    }

    fn elapsed_secs(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut times| times.remove(&page_num))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        let noun = if total_pages == 1 { "page" } else { "pages" };
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Looking for tables on {total_pages} {noun}…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut times) = self.start_times.lock() {
            times.insert(page_num, Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, table_count: usize) {
        let secs = self.elapsed_secs(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<10}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{table_count:>2} table(s)")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(page_num);

        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(['…']).collect()
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
        self.bar.inc(1);
    }

    fn on_extraction_complete(&self, total_pages: usize, success_count: usize) {
        let failed = total_pages.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} page(s) read successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages read  ({} failed)",
                if failed == total_pages { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Receipt photo to CSV on stdout
  pic2csv receipt.jpg

  # Straight to Excel (format from the extension)
  pic2csv invoice.pdf -o invoice.xlsx

  # Fix headers interactively, then export
  pic2csv scan.png --edit -o scan.csv

  # Only pages 2-4, one CSV per table into out/
  pic2csv report.pdf --pages 2-4 --split -o out/

  # Re-open a saved session and export as PDF
  pic2csv --from-json session.json -o tables.pdf

  # Keep a session file up to date while editing
  pic2csv statement.pdf --edit --autosave session.json -o statement.csv

EDITOR COMMANDS (--edit):
  show, tables, use <n>, rename <col> <new>, move-col <a> <b>,
  move-row <a> <b>, drag col:<key>|row:<n> [target], set <row> <col> <value>,
  add-col, del-col <col>, add-row, del-row <row>, export <path> [format],
  help, quit

ENVIRONMENT VARIABLES:
  OPENROUTER_API_KEY      OpenRouter API key (default model google/gemini-2.0-flash-001)
  OPENAI_API_KEY          OpenAI API key (default model gpt-4.1-nano)
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, openrouter, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory), needed for PDF input

SETUP:
  1. Set API key:     export OPENROUTER_API_KEY=sk-or-...
  2. Extract:         pic2csv table.png -o table.csv
"#;

/// Extract tables from images and PDFs with Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "pic2csv",
    version,
    about = "Extract tables from images and PDFs with Vision LLMs",
    long_about = "Extract tables from photos, scans, screenshots and PDFs (local files or URLs) \
using Vision Language Models, optionally edit them, and export to CSV, Excel, PDF or JSON.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Image or PDF path, HTTP/HTTPS URL, or session JSON with --from-json.
    input: String,

    /// Output file (or directory with --split). Without it, CSV goes to stdout.
    #[arg(short, long, env = "PIC2CSV_OUTPUT")]
    output: Option<PathBuf>,

    /// Output format; inferred from the output extension when omitted.
    #[arg(short, long, env = "PIC2CSV_FORMAT")]
    format: Option<ExportFormat>,

    /// Write one file per table into the output directory.
    #[arg(long)]
    split: bool,

    /// Tables to export, 1-based: 2 or 1,3. Default: all.
    #[arg(long, value_delimiter = ',')]
    tables: Vec<usize>,

    /// Open the line editor on stdin before exporting.
    #[arg(short, long)]
    edit: bool,

    /// Treat INPUT as a saved session (payload JSON) instead of extracting.
    #[arg(long)]
    from_json: bool,

    /// Rewrite this session JSON after every committed edit.
    #[arg(long, env = "PIC2CSV_AUTOSAVE")]
    autosave: Option<PathBuf>,

    /// Page selection for PDFs: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "PIC2CSV_PAGES", default_value = "all")]
    pages: String,

    /// LLM model ID (e.g. gpt-4.1-nano, google/gemini-2.0-flash-001).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openrouter, openai, anthropic, gemini, ollama.
    #[arg(
        long,
        env = "EDGEQUAKE_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: openrouter, openai, anthropic, gemini, azure, ollama."
    )]
    provider: Option<String>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PIC2CSV_PASSWORD")]
    password: Option<String>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "PIC2CSV_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max LLM output tokens per page.
    #[arg(long, env = "PIC2CSV_MAX_TOKENS", default_value_t = 16_000)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PIC2CSV_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Retries per page on LLM failure.
    #[arg(long, env = "PIC2CSV_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Largest accepted input in MiB.
    #[arg(long, env = "PIC2CSV_MAX_FILE_MB", default_value_t = 10)]
    max_file_mb: u64,

    /// Number of concurrent VLM API calls.
    #[arg(short, long, env = "PIC2CSV_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Quote every CSV field.
    #[arg(long)]
    quote_all: bool,

    /// CSV field delimiter (a single ASCII character).
    #[arg(long, default_value_t = ',')]
    delimiter: char,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PIC2CSV_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-page LLM call timeout in seconds.
    #[arg(long, env = "PIC2CSV_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Disable progress bar.
    #[arg(long, env = "PIC2CSV_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PIC2CSV_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PIC2CSV_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless -v is given.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.from_json;
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

    match run(&cli, show_progress).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli, show_progress: bool) -> Result<()> {
    let csv_options = CsvOptions {
        delimiter: delimiter_byte(cli.delimiter)?,
        quote_all: cli.quote_all,
    };

    // ── Load or extract ──────────────────────────────────────────────────
    let session = if cli.from_json {
        Session::load_json(&cli.input).context("Failed to load session")?
    } else {
        let progress_cb: Option<ProgressCallback> = if show_progress {
            Some(CliProgressCallback::new_dynamic() as Arc<dyn ExtractionProgressCallback>)
        } else {
            None
        };
        let config = build_config(cli, progress_cb).await?;
        let output = extract(&cli.input, &config)
            .await
            .context("Extraction failed")?;

        if !cli.quiet {
            let stats = &output.stats;
            eprintln!(
                "   {} table(s), {} row(s)  ·  {} tokens in / {} out  ·  {}ms",
                bold(&stats.table_count.to_string()),
                stats.row_count,
                dim(&stats.total_input_tokens.to_string()),
                dim(&stats.total_output_tokens.to_string()),
                stats.total_duration_ms,
            );
        }
        Session::from_payloads(output.tables)
    };
    let mut session = session.with_csv_options(csv_options);

    if !cli.tables.is_empty() {
        if let Some(bad) = cli.tables.iter().find(|&&n| n == 0 || n > session.len()) {
            bail!("--tables: no table {} (there are {})", bad, session.len());
        }
        session.select(cli.tables.iter().map(|n| n - 1));
    }

    if let Some(ref path) = cli.autosave {
        session
            .enable_autosave(path)
            .context("Failed to start autosave")?;
    }

    // ── Edit ─────────────────────────────────────────────────────────────
    if cli.edit {
        tokio::task::block_in_place(|| run_editor(&mut session, cli.quiet))
            .context("Editor failed")?;
    }

    // ── Export ───────────────────────────────────────────────────────────
    if cli.split {
        let dir = cli.output.clone().unwrap_or_else(|| PathBuf::from("."));
        let format = cli.format.unwrap_or_default();
        let files = session
            .export_each(format, &dir)
            .context("Export failed")?;
        if !cli.quiet {
            for file in &files {
                eprintln!("{} {}", green("✔"), bold(&file.display().to_string()));
            }
        }
    } else if let Some(ref path) = cli.output {
        let format = cli
            .format
            .or_else(|| ExportFormat::from_path(path))
            .unwrap_or_default();
        let bytes = session.export(format, path).context("Export failed")?;
        if !cli.quiet {
            eprintln!(
                "{} {} {}  →  {}",
                green("✔"),
                format,
                dim(&format!("{bytes} bytes")),
                bold(&path.display().to_string()),
            );
        }
    } else {
        let format = cli.format.unwrap_or_default();
        if matches!(format, ExportFormat::Xlsx | ExportFormat::Pdf) {
            bail!("{format} output is binary; pass -o <file>");
        }
        let bytes = export::render(&session.selected_snapshots(), format, &csv_options)
            .context("Export failed")?;
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(&bytes)
            .context("Failed to write to stdout")?;
        if !bytes.ends_with(b"\n") {
            handle.write_all(b"\n").ok();
        }
    }

    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .pages(PageSelection::parse(&cli.pages).context("Invalid --pages")?)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .max_file_bytes(cli.max_file_mb.saturating_mul(1024 * 1024))
        .concurrency(cli.concurrency)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password);
    }
    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn delimiter_byte(c: char) -> Result<u8> {
    if c.is_ascii() && c != '"' && c != '\n' && c != '\r' {
        Ok(c as u8)
    } else {
        bail!("--delimiter must be a single ASCII character other than a quote or newline")
    }
}

// ── Line editor ──────────────────────────────────────────────────────────────

fn run_editor(session: &mut Session, quiet: bool) -> Result<()> {
    if session.is_empty() {
        bail!("There are no tables to edit");
    }
    if !quiet {
        eprintln!("{}", dim("Type `help` for commands, `quit` to finish."));
        print_view(session);
    }

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        let name = session.active().map(|t| t.name.as_str()).unwrap_or("");
        eprint!("{} ", cyan(&format!("pic2csv[{name}]>")));
        io::stderr().flush().ok();

        let Some(line) = lines.next() else {
            break;
        };
        let line = line.context("Failed to read stdin")?;

        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("{} {}", red("✗"), e);
                continue;
            }
        };

        match session.execute(command) {
            Reply::Quit => break,
            Reply::Help => eprintln!("{HELP}"),
            Reply::Show(view) => eprintln!("{}", grid_table(&view)),
            Reply::Tables(summaries) => {
                for t in summaries {
                    eprintln!(
                        "{} {:>2}. {}  {}{}",
                        if t.active { cyan("▶") } else { " ".to_string() },
                        t.position,
                        bold(&t.name),
                        dim(&format!("{} columns × {} rows", t.columns, t.rows)),
                        if t.selected { "" } else { "  (not exported)" },
                    );
                }
            }
            Reply::Switched { position, name } => {
                eprintln!("{} table {position}: {}", green("✔"), bold(&name));
                print_view(session);
            }
            Reply::Edited(EditOutcome::Applied) | Reply::Dropped(DropOutcome::Reordered { .. }) => {
                print_view(session);
            }
            Reply::Edited(EditOutcome::Unchanged) | Reply::Dropped(DropOutcome::Unchanged) => {
                eprintln!("{}", dim("nothing changed"));
            }
            Reply::Edited(EditOutcome::Rejected(e)) => eprintln!("{} {}", red("✗"), e),
            Reply::Dropped(DropOutcome::Ignored) => {
                eprintln!("{}", dim("drop ignored, nothing moved"));
            }
            Reply::AddedColumn(key) => {
                eprintln!("{} added column {}", green("✔"), bold(&key));
                print_view(session);
            }
            Reply::AddedRow(position) => {
                eprintln!("{} added row {position}", green("✔"));
                print_view(session);
            }
            Reply::Exported { path, bytes } => eprintln!(
                "{} {}  {}",
                green("✔"),
                bold(&path.display().to_string()),
                dim(&format!("{bytes} bytes"))
            ),
            Reply::Failed(msg) => eprintln!("{} {}", red("✗"), msg),
        }
    }
    Ok(())
}

fn print_view(session: &Session) {
    if let Some(table) = session.active() {
        eprintln!("{}", grid_table(&table.editor.render()));
    }
}

/// Draw a grid with 1-based row positions in the first column.
fn grid_table(view: &GridView) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let mut header = vec![Cell::new("#").fg(Color::DarkGrey)];
    header.extend(view.headers.iter().map(|h| {
        let cell = Cell::new(&h.key).add_attribute(Attribute::Bold);
        if h.deletable {
            cell.fg(Color::Cyan)
        } else {
            cell.fg(Color::Yellow)
        }
    }));
    table.set_header(header);

    for (i, row) in view.rows.iter().enumerate() {
        let mut cells = vec![Cell::new(i + 1).fg(Color::DarkGrey)];
        cells.extend(row.cells.iter().map(Cell::new));
        table.add_row(cells);
    }
    table
}

// ── Error display ────────────────────────────────────────────────────────────

fn report(error: &anyhow::Error) {
    match error.downcast_ref::<Pic2CsvError>() {
        Some(e) => {
            let category = e.category();
            eprintln!("{} {}", red("✘"), bold(category.title()));
            eprintln!("  {e}");
            for hint in category.suggestions() {
                eprintln!("  {} {}", yellow("•"), hint);
            }
        }
        None => eprintln!("{} {:#}", red("✘"), error),
    }
}
