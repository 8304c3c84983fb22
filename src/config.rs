//! Configuration types for arXiv-to-e-reader conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. One struct holds every knob so a
//! config can be shared across the concurrent batch workers and logged as a
//! whole.

use crate::error::ConvertError;
use crate::pipeline::math::MathRenderer;
use crate::progress::ProgressCallback;
use crate::styles::ScreenPreset;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// Configuration for converting one or more arXiv papers.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use arxiv_to_ereader::{ConversionConfig, OutputFormat, StylePreset};
///
/// let config = ConversionConfig::builder()
///     .format(OutputFormat::Epub)
///     .style(StylePreset::LargeText)
///     .math_dpi(200)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Target container. Default: [`OutputFormat::Epub`].
    pub format: OutputFormat,

    /// EPUB stylesheet preset. Default: [`StylePreset::Default`].
    pub style: StylePreset,

    /// Page geometry for PDF output. Default: `kindle-paperwhite`.
    pub screen: ScreenPreset,

    /// Download and embed images referenced by the paper. Default: true.
    pub download_images: bool,

    /// Rasterise LaTeX equations to PNG for EPUB/Kindle output. Default: true.
    ///
    /// Most e-ink readers cannot render MathML. Equations whose rendering
    /// fails keep their MathML and fall back to alt text during the Kindle
    /// scrub.
    pub render_math: bool,

    /// Resolution of rendered equation images. Range: 72–600. Default: 150.
    pub math_dpi: u32,

    /// Keep MathML in EPUB output instead of replacing it with its LaTeX
    /// alt text. Default: false.
    ///
    /// Kindle formats always strip MathML.
    pub keep_mathml: bool,

    /// HTTP timeout in seconds for the paper and each image. Default: 30.
    pub timeout_secs: u64,

    /// Concurrent image downloads per paper. Default: 8.
    pub image_concurrency: usize,

    /// Concurrent papers in a batch. Default: 4.
    pub batch_concurrency: usize,

    /// Base of the HTML rendition URL. Default: `https://arxiv.org/html`.
    pub html_base_url: String,

    /// Base of the abstract page URL. Default: `https://arxiv.org/abs`.
    pub abs_base_url: String,

    /// User-Agent sent with every request.
    pub user_agent: String,

    /// Explicit Chromium/Chrome binary for PDF output. Searched on `PATH` if None.
    pub browser_path: Option<PathBuf>,

    /// Explicit `ebook-convert` binary for Kindle output. Searched on `PATH` if None.
    pub ebook_convert_path: Option<PathBuf>,

    /// Equation rasteriser. Uses [`crate::pipeline::math::LatexRenderer`] if None.
    pub math_renderer: Option<Arc<dyn MathRenderer>>,

    /// Progress events sink. No events are emitted if None.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            style: StylePreset::default(),
            screen: ScreenPreset::default(),
            download_images: true,
            render_math: true,
            math_dpi: 150,
            keep_mathml: false,
            timeout_secs: 30,
            image_concurrency: 8,
            batch_concurrency: 4,
            html_base_url: "https://arxiv.org/html".to_string(),
            abs_base_url: "https://arxiv.org/abs".to_string(),
            user_agent: format!("arxiv-to-ereader/{}", env!("CARGO_PKG_VERSION")),
            browser_path: None,
            ebook_convert_path: None,
            math_renderer: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("format", &self.format)
            .field("style", &self.style)
            .field("screen", &self.screen.name)
            .field("download_images", &self.download_images)
            .field("render_math", &self.render_math)
            .field("math_dpi", &self.math_dpi)
            .field("keep_mathml", &self.keep_mathml)
            .field("timeout_secs", &self.timeout_secs)
            .field("image_concurrency", &self.image_concurrency)
            .field("batch_concurrency", &self.batch_concurrency)
            .field("html_base_url", &self.html_base_url)
            .field("browser_path", &self.browser_path)
            .field("ebook_convert_path", &self.ebook_convert_path)
            .field(
                "math_renderer",
                &self.math_renderer.as_ref().map(|_| "<dyn MathRenderer>"),
            )
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// `{html_base_url}/{id}`
    pub fn html_url(&self, paper_id: &str) -> String {
        format!("{}/{}", self.html_base_url.trim_end_matches('/'), paper_id)
    }

    /// `{abs_base_url}/{id}`
    pub fn abs_url(&self, paper_id: &str) -> String {
        format!("{}/{}", self.abs_base_url.trim_end_matches('/'), paper_id)
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn format(mut self, format: OutputFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn style(mut self, style: StylePreset) -> Self {
        self.config.style = style;
        self
    }

    pub fn screen(mut self, screen: ScreenPreset) -> Self {
        self.config.screen = screen;
        self
    }

    pub fn download_images(mut self, v: bool) -> Self {
        self.config.download_images = v;
        self
    }

    pub fn render_math(mut self, v: bool) -> Self {
        self.config.render_math = v;
        self
    }

    /// Clamped to 72–600.
    pub fn math_dpi(mut self, dpi: u32) -> Self {
        self.config.math_dpi = dpi.clamp(72, 600);
        self
    }

    pub fn keep_mathml(mut self, v: bool) -> Self {
        self.config.keep_mathml = v;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    pub fn image_concurrency(mut self, n: usize) -> Self {
        self.config.image_concurrency = n.max(1);
        self
    }

    pub fn batch_concurrency(mut self, n: usize) -> Self {
        self.config.batch_concurrency = n.max(1);
        self
    }

    pub fn html_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.html_base_url = url.into();
        self
    }

    pub fn abs_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.abs_base_url = url.into();
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config.user_agent = ua.into();
        self
    }

    pub fn browser_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.browser_path = Some(path.into());
        self
    }

    pub fn ebook_convert_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ebook_convert_path = Some(path.into());
        self
    }

    pub fn math_renderer(mut self, renderer: Arc<dyn MathRenderer>) -> Self {
        self.config.math_renderer = Some(renderer);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, ConvertError> {
        let c = &self.config;
        if c.timeout_secs == 0 {
            return Err(ConvertError::InvalidConfig(
                "Timeout must be ≥ 1 second".into(),
            ));
        }
        if c.image_concurrency == 0 || c.batch_concurrency == 0 {
            return Err(ConvertError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        for base in [&c.html_base_url, &c.abs_base_url] {
            if !base.starts_with("http://") && !base.starts_with("https://") {
                return Err(ConvertError::InvalidConfig(format!(
                    "Base URL must be http(s), got '{base}'"
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Output container for the converted paper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// EPUB 3 with NCX fallback. (default)
    #[default]
    Epub,
    /// Legacy Kindle format via Calibre's `ebook-convert`.
    Mobi,
    /// Kindle Format 8 via Calibre's `ebook-convert`.
    Azw3,
    /// Paginated PDF printed by a headless browser.
    Pdf,
}

impl OutputFormat {
    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Epub => "epub",
            OutputFormat::Mobi => "mobi",
            OutputFormat::Azw3 => "azw3",
            OutputFormat::Pdf => "pdf",
        }
    }

    /// MOBI and AZW3 go through `ebook-convert`.
    pub fn is_kindle(self) -> bool {
        matches!(self, OutputFormat::Mobi | OutputFormat::Azw3)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "epub" => Ok(OutputFormat::Epub),
            "mobi" => Ok(OutputFormat::Mobi),
            "azw3" => Ok(OutputFormat::Azw3),
            "pdf" => Ok(OutputFormat::Pdf),
            other => Err(ConvertError::InvalidConfig(format!(
                "Unknown output format '{other}' (expected epub, mobi, azw3 or pdf)"
            ))),
        }
    }
}

/// Typography preset for the EPUB stylesheet.
///
/// | Preset | Body size | Line height | Use case |
/// |--------|-----------|-------------|----------|
/// | `default` | 1em | 1.5 | Most 6–7" readers |
/// | `compact` | 0.9em | 1.35 | Dense papers, large screens |
/// | `large-text` | 1.2em | 1.7 | Accessibility, small screens |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StylePreset {
    #[default]
    Default,
    Compact,
    LargeText,
}

impl StylePreset {
    pub fn name(self) -> &'static str {
        match self {
            StylePreset::Default => "default",
            StylePreset::Compact => "compact",
            StylePreset::LargeText => "large-text",
        }
    }
}

impl FromStr for StylePreset {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(StylePreset::Default),
            "compact" => Ok(StylePreset::Compact),
            "large-text" | "large_text" | "large" => Ok(StylePreset::LargeText),
            other => Err(ConvertError::InvalidConfig(format!(
                "Unknown style preset '{other}' (expected default, compact or large-text)"
            ))),
        }
    }
}

/// Default output path for a paper: `{dir}/{id with '/' → '_'}.{ext}`.
pub fn default_output_path(dir: &Path, paper_id: &str, format: OutputFormat) -> PathBuf {
    dir.join(format!("{}.{}", paper_id.replace('/', "_"), format.extension()))
}

/// Replace the extension of `path` when it does not match `format`.
pub fn fix_extension(path: &Path, format: OutputFormat) -> PathBuf {
    let matches = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(format.extension()))
        .unwrap_or(false);
    if matches {
        path.to_path_buf()
    } else {
        path.with_extension(format.extension())
    }
}
