//! Error types for the arxiv-to-ereader library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ConvertError`] is **fatal**: the paper cannot be converted at all
//!   (unknown ID, no HTML rendition, external converter missing). Returned as
//!   `Err(ConvertError)` from the top-level `convert*` functions.
//!
//! * [`AssetError`] is **non-fatal**: one image failed to download or one
//!   equation failed to rasterise, but the book is still produced. Collected
//!   in [`crate::output::ConversionOutput::warnings`] so callers can report
//!   degraded output without losing the whole paper.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the arxiv-to-ereader library.
///
/// Asset-level failures use [`AssetError`] and are stored in
/// [`crate::output::ConversionOutput`] rather than propagated here.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The input string is neither an arXiv ID, an arXiv URL nor a local HTML file.
    #[error(
        "Invalid arXiv paper ID or URL: '{input}'\n\
Expected forms: 2402.08954, 2402.08954v2, hep-th/9901001, https://arxiv.org/abs/2402.08954"
    )]
    InvalidPaperId { input: String },

    /// Local HTML file was not found.
    #[error("HTML file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    // ── Fetch errors ──────────────────────────────────────────────────────
    /// arXiv has no HTML rendition for this paper (HTTP 404).
    #[error(
        "HTML version not available for paper {paper_id}.\n\
This paper may predate HTML support (Dec 2023) or failed conversion.\n\
Check https://arxiv.org/abs/{paper_id} for other formats."
    )]
    HtmlNotAvailable { paper_id: String },

    /// HTTP request failed for a reason other than 404.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Rendering errors ──────────────────────────────────────────────────
    /// Building the EPUB container failed.
    #[error("Failed to build EPUB package: {0}")]
    PackageFailed(String),

    /// An external converter (ebook-convert, headless browser) is not installed.
    #[error("{tool} not found.\n{hint}")]
    ConverterNotFound { tool: String, hint: String },

    /// An external converter ran but exited unsuccessfully.
    #[error("{tool} conversion failed: {stderr}")]
    ConverterFailed { tool: String, stderr: String },

    /// The headless browser produced something that is not a PDF.
    #[error("Browser output is not a valid PDF (first bytes: {magic:?})")]
    NotAPdf { magic: Vec<u8> },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output book file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConvertError {
    /// Install hint shown when Calibre's `ebook-convert` is missing.
    pub fn calibre_missing(tool: impl Into<String>) -> Self {
        ConvertError::ConverterNotFound {
            tool: tool.into(),
            hint: "Install Calibre to convert to Kindle formats.\n  \
- macOS: brew install calibre\n  \
- Ubuntu/Debian: sudo apt install calibre\n  \
- Or download from: https://calibre-ebook.com/download"
                .to_string(),
        }
    }

    /// Install hint shown when no Chromium-family browser is available.
    pub fn browser_missing(tool: impl Into<String>) -> Self {
        ConvertError::ConverterNotFound {
            tool: tool.into(),
            hint: "PDF output prints through a headless Chromium-family browser.\n  \
- macOS: brew install --cask chromium\n  \
- Ubuntu/Debian: sudo apt install chromium\n  \
- Or point ARXIV2EREADER_BROWSER / --browser at an existing Chrome binary"
                .to_string(),
        }
    }
}

/// A non-fatal error for a single embedded asset.
///
/// Stored in [`crate::output::ConversionOutput::warnings`]. The book is still
/// written; the asset is left out (images) or left as MathML (equations).
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum AssetError {
    /// An image referenced by the paper could not be downloaded.
    #[error("Image '{src}' could not be downloaded: {reason}")]
    ImageDownload { src: String, reason: String },

    /// A LaTeX expression could not be rasterised.
    #[error("Equation could not be rendered ({reason}): {latex}")]
    MathRender { latex: String, reason: String },
}
