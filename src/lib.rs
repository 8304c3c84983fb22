//! # arxiv-to-ereader
//!
//! Convert arXiv papers into e-books for e-readers: EPUB, Kindle (MOBI,
//! AZW3) and screen-sized PDF.
//!
//! ## Why this crate?
//!
//! arXiv serves most papers published since December 2023 as HTML (rendered
//! by LaTeXML). That HTML is structured text, unlike the two-column PDF, so
//! it can be reflowed for a 6-inch screen. Reading it on an e-reader still
//! needs work: MathML is unsupported on most devices, images live on arXiv's
//! servers, footnotes are inline popups, and Kindle tooling rejects several
//! valid EPUB constructs. This crate does that work.
//!
//! ## Pipeline Overview
//!
//! ```text
//! arXiv ID / URL / .html
//!  │
//!  ├─ 1. Fetch    normalise the ID, download the HTML rendition
//!  ├─ 2. Parse    LaTeXML DOM → sections, footnotes, references, figures
//!  ├─ 3. Images   concurrent downloads, embedded in the book
//!  ├─ 4. Math     LaTeX → PNG for readers without MathML (spawn_blocking)
//!  ├─ 5. Render   EPUB 3 package, scrubbed for Kindle compatibility
//!  └─ 6. Convert  ebook-convert (MOBI/AZW3) or headless browser (PDF)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use arxiv_to_ereader::{convert_to_dir, ConversionConfig, OutputFormat};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::builder()
//!         .format(OutputFormat::Epub)
//!         .build()?;
//!     let book = convert_to_dir("2402.08954", ".", &config).await?;
//!     println!("{} → {}", book.output.title, book.path.display());
//!     for w in &book.output.warnings {
//!         eprintln!("warning: {w}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `arxiv2ereader` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! arxiv-to-ereader = { version = "0.3", default-features = false }
//! ```
//!
//! ## External Tools
//!
//! | Output | Needs |
//! |--------|-------|
//! | EPUB   | nothing; `latex` + `dvipng` for equation images (optional) |
//! | MOBI / AZW3 | Calibre's `ebook-convert` |
//! | PDF    | Chromium, Chrome or Edge |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod render;
pub mod stream;
pub mod styles;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder, OutputFormat, StylePreset};
pub use convert::{convert, convert_html, convert_sync, convert_to_dir, convert_to_file, inspect};
pub use error::{AssetError, ConvertError};
pub use model::Paper;
pub use output::{BatchResult, ConversionOutput, ConversionStats, WrittenBook};
pub use pipeline::math::{LatexRenderer, MathImage, MathRenderer};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback, Stage};
pub use stream::{convert_batch_stream, BatchStream};
pub use styles::ScreenPreset;
