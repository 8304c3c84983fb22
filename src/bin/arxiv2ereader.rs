//! CLI binary for arxiv-to-ereader.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use arxiv_to_ereader::{
    convert_batch_stream, convert_to_dir, inspect, ConversionConfig, ConversionProgressCallback,
    OutputFormat, ProgressCallback, ScreenPreset, Stage, StylePreset,
};
use clap::Parser;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

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

/// Terminal progress: a spinner showing the current stage, switched to a
/// counter bar when a batch starts. Papers may finish out of order.
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
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_papers: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} papers  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        self.bar.set_length(total_papers as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Converting");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {total_papers} papers…"))
        ));
    }

    fn on_stage(&self, paper: &str, stage: Stage) {
        self.bar.set_prefix(paper.to_string());
        self.bar.set_message(format!("{}…", stage.label()));
    }

    fn on_paper_complete(&self, paper: &str, title: &str, bytes: usize) {
        self.bar.println(format!(
            "  {} {}  {}  {}",
            green("✓"),
            paper,
            title,
            dim(&format!("{:.1} KB", bytes as f64 / 1024.0)),
        ));
        self.bar.inc(1);
    }

    fn on_paper_error(&self, paper: &str, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let first_line = error.lines().next().unwrap_or(error);
        let msg = if first_line.chars().count() > 100 {
            format!("{}\u{2026}", first_line.chars().take(99).collect::<String>())
        } else {
            first_line.to_string()
        };
        self.bar
            .println(format!("  {} {}  {}", red("✗"), paper, red(&msg)));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, _total_papers: usize, _success_count: usize) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert one paper to EPUB in the current directory
  arxiv2ereader 2402.08954

  # Kindle format into a directory
  arxiv2ereader 2402.08954 --format azw3 -o ~/kindle/

  # Several papers at once, MOBI
  arxiv2ereader 2402.08954 2401.12345 -o ~/kindle/ -f mobi

  # Larger type, from an abstract URL
  arxiv2ereader https://arxiv.org/abs/2402.08954 --style large-text

  # PDF laid out for a Kobo Libra screen
  arxiv2ereader 2402.08954 -f pdf --screen kobo-libra

  # Convert a saved HTML page (file named after the arXiv ID)
  arxiv2ereader ./2402.08954.html

  # Inspect parsed metadata, no conversion
  arxiv2ereader --inspect-only --json 2402.08954

OUTPUT FORMATS:
  Format  Needs
  ──────  ────────────────────────────────────────────────
  epub    nothing (latex + dvipng for equation images)
  mobi    Calibre's ebook-convert
  azw3    Calibre's ebook-convert
  pdf     Chromium, Chrome or Edge

SCREEN PRESETS (--screen, PDF only):
  kindle, kindle-paperwhite (default), kindle-scribe, kobo-clara,
  kobo-libra, remarkable, a5, a4, letter

ENVIRONMENT VARIABLES:
  ARXIV2EREADER_OUTPUT          Output directory
  ARXIV2EREADER_FORMAT          Output format
  ARXIV2EREADER_BROWSER         Chromium-family browser for PDF output
  ARXIV2EREADER_EBOOK_CONVERT   Calibre ebook-convert binary
  RUST_LOG                      Override the log filter (e.g. arxiv_to_ereader=debug)

NOTE:
  arXiv serves HTML for papers submitted since December 2023 and for many
  older ones. Papers without an HTML rendition cannot be converted."#;

/// Convert arXiv papers to EPUB, Kindle and PDF for e-readers.
#[derive(Parser, Debug)]
#[command(
    name = "arxiv2ereader",
    version,
    about = "Convert arXiv papers to EPUB, Kindle (MOBI/AZW3) or PDF for e-readers",
    long_about = "Convert arXiv papers (IDs, URLs or saved HTML pages) to e-books. \
Equations are rendered as images for readers without MathML, images are embedded, \
footnotes become linked endnotes and the package is scrubbed for Kindle compatibility.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// arXiv IDs or URLs (2402.08954, https://arxiv.org/abs/2402.08954) or local .html files.
    #[arg(required = true)]
    papers: Vec<String>,

    /// Output directory for e-book files.
    #[arg(short, long, env = "ARXIV2EREADER_OUTPUT", default_value = ".")]
    output: PathBuf,

    /// Output format: epub, mobi, azw3 or pdf.
    #[arg(short, long, env = "ARXIV2EREADER_FORMAT", default_value = "epub")]
    format: OutputFormat,

    /// EPUB style preset: default, compact or large-text.
    #[arg(short, long, env = "ARXIV2EREADER_STYLE", default_value = "default")]
    style: StylePreset,

    /// Screen preset for PDF output (see --help for the list).
    #[arg(long, env = "ARXIV2EREADER_SCREEN", default_value = "kindle-paperwhite")]
    screen: String,

    /// Skip downloading images (faster, smaller files).
    #[arg(long, env = "ARXIV2EREADER_NO_IMAGES")]
    no_images: bool,

    /// Don't render equations as images (keeps MathML, may not display on Kindle).
    #[arg(long, env = "ARXIV2EREADER_NO_MATH_IMAGES")]
    no_math_images: bool,

    /// Keep MathML in EPUB output instead of replacing it with LaTeX alt text.
    #[arg(long, env = "ARXIV2EREADER_KEEP_MATHML")]
    keep_mathml: bool,

    /// Resolution of rendered equation images (72–600).
    #[arg(long, env = "ARXIV2EREADER_MATH_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    math_dpi: u32,

    /// HTTP timeout in seconds for the paper and each image.
    #[arg(long, env = "ARXIV2EREADER_TIMEOUT", default_value_t = 30)]
    timeout: u64,

    /// Number of papers converted at once.
    #[arg(short, long, env = "ARXIV2EREADER_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Chromium-family browser used for PDF output.
    #[arg(long, env = "ARXIV2EREADER_BROWSER")]
    browser: Option<PathBuf>,

    /// Calibre's ebook-convert binary used for MOBI/AZW3 output.
    #[arg(long, env = "ARXIV2EREADER_EBOOK_CONVERT")]
    ebook_convert: Option<PathBuf>,

    /// Print parsed paper metadata only, no conversion.
    #[arg(long)]
    inspect_only: bool,

    /// With --inspect-only, print JSON.
    #[arg(long, env = "ARXIV2EREADER_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "ARXIV2EREADER_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "ARXIV2EREADER_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "ARXIV2EREADER_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; -v brings them back at DEBUG.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.inspect_only;
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

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let config = build_config(&cli, None)?;
        for input in &cli.papers {
            let paper = inspect(input, &config)
                .await
                .with_context(|| format!("Failed to inspect {input}"))?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&paper).context("Failed to serialise paper")?
                );
                continue;
            }
            println!("ID:           {}", paper.id);
            println!("Title:        {}", paper.title);
            println!("Authors:      {}", paper.authors.join(", "));
            if let Some(ref d) = paper.date {
                println!("Date:         {}", d);
            }
            println!("Sections:     {}", paper.sections.len());
            for s in &paper.sections {
                println!("  {}{}", "  ".repeat(s.level.saturating_sub(1) as usize), s.title);
            }
            println!("Figures:      {}", paper.figures.len());
            println!("Images:       {}", paper.image_sources.len());
            println!("Footnotes:    {}", paper.footnotes.len());
            println!("References:   {}", paper.references.len());
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress = show_progress.then(CliProgressCallback::new);
    let config = build_config(
        &cli,
        progress
            .clone()
            .map(|cb| cb as Arc<dyn ConversionProgressCallback>),
    )?;

    // ── Single paper ─────────────────────────────────────────────────────
    if cli.papers.len() == 1 {
        let input = &cli.papers[0];
        let result = convert_to_dir(input, &cli.output, &config).await;
        if let Some(ref p) = progress {
            p.bar.finish_and_clear();
        }
        let book = result.with_context(|| format!("Failed to convert {input}"))?;

        if !cli.quiet {
            eprintln!(
                "{} Created: {}",
                green("✔"),
                bold(&book.path.display().to_string())
            );
            eprintln!("  Title:   {}", book.output.title);
            eprintln!("  Authors: {}", book.output.authors.join(", "));
            print_warnings(&book.output.warnings);
        }
        return Ok(());
    }

    // ── Batch ────────────────────────────────────────────────────────────
    if !show_progress && !cli.quiet {
        eprintln!(
            "Converting {} papers to {}...",
            cli.papers.len(),
            config.format.extension().to_uppercase()
        );
    }
    let mut results = convert_batch_stream(cli.papers.clone(), &cli.output, &config);
    let mut ok = 0usize;
    let mut failed = 0usize;
    while let Some(r) = results.next().await {
        match r.outcome {
            Ok(book) => {
                ok += 1;
                if !cli.quiet && !show_progress {
                    eprintln!("{} {}", green("Created:"), book.path.display());
                }
                if !cli.quiet {
                    print_warnings(&book.output.warnings);
                }
            }
            Err(e) => {
                failed += 1;
                if !show_progress {
                    eprintln!("{} {}: {}", red("Error"), r.input, e);
                }
            }
        }
    }

    if !cli.quiet {
        eprintln!(
            "{} {} succeeded, {} failed",
            if failed == 0 { green("✔") } else { cyan("⚠") },
            bold(&ok.to_string()),
            if failed == 0 {
                failed.to_string()
            } else {
                red(&failed.to_string())
            },
        );
    }
    if failed > 0 {
        anyhow::bail!("{failed} of {} papers failed", ok + failed);
    }
    Ok(())
}

fn print_warnings(warnings: &[arxiv_to_ereader::AssetError]) {
    for w in warnings {
        eprintln!("  {} {}", yellow("⚠"), dim(&w.to_string()));
    }
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let screen = ScreenPreset::from_name(&cli.screen).with_context(|| {
        format!(
            "Unknown screen preset '{}'. Use one of: {}",
            cli.screen,
            ScreenPreset::names().join(", ")
        )
    })?;

    let mut builder = ConversionConfig::builder()
        .format(cli.format)
        .style(cli.style)
        .screen(screen)
        .download_images(!cli.no_images)
        .render_math(!cli.no_math_images)
        .keep_mathml(cli.keep_mathml)
        .math_dpi(cli.math_dpi)
        .timeout_secs(cli.timeout)
        .batch_concurrency(cli.concurrency);

    if let Some(ref path) = cli.browser {
        builder = builder.browser_path(path.clone());
    }
    if let Some(ref path) = cli.ebook_convert {
        builder = builder.ebook_convert_path(path.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_map_onto_config() {
        let cli = Cli::try_parse_from([
            "arxiv2ereader",
            "2402.08954",
            "-f",
            "azw3",
            "-s",
            "large-text",
            "--screen",
            "kobo-libra",
            "--no-images",
            "--math-dpi",
            "300",
        ])
        .unwrap();
        let config = build_config(&cli, None).unwrap();
        assert_eq!(config.format, OutputFormat::Azw3);
        assert_eq!(config.style, StylePreset::LargeText);
        assert_eq!(config.screen.name, "kobo-libra");
        assert!(!config.download_images);
        assert!(config.render_math);
        assert_eq!(config.math_dpi, 300);
    }

    #[test]
    fn unknown_screen_rejected() {
        let cli = Cli::try_parse_from(["arxiv2ereader", "2402.08954", "--screen", "etch-a-sketch"])
            .unwrap();
        let err = build_config(&cli, None).unwrap_err();
        assert!(err.to_string().contains("etch-a-sketch"));
    }

    #[test]
    fn unknown_format_rejected() {
        assert!(Cli::try_parse_from(["arxiv2ereader", "2402.08954", "-f", "docx"]).is_err());
    }
}
