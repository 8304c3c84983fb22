//! Single-paper conversion entry points.
//!
//! [`convert`] returns the finished book in memory; [`convert_to_file`] and
//! [`convert_to_dir`] also write it to disk. For many papers at once use
//! [`crate::stream::convert_batch_stream`], which drives these same steps
//! with bounded concurrency.

use crate::config::{default_output_path, fix_extension, ConversionConfig};
use crate::error::ConvertError;
use crate::model::Paper;
use crate::output::{ConversionOutput, ConversionStats, WrittenBook};
use crate::pipeline::fetch::{self, FetchedPaper};
use crate::pipeline::parse;
use crate::progress::Stage;
use crate::render;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Convert one paper to an e-book.
///
/// # Arguments
/// * `input`: arXiv ID (`2402.08954`, `hep-th/9901001`), arXiv URL, or a
///   local `.html` file
/// * `config`: Conversion configuration
///
/// # Returns
/// `Ok(ConversionOutput)` on success, even if some images or equations could
/// not be embedded (check `output.warnings`).
///
/// # Errors
/// Returns `Err(ConvertError)` only for fatal errors:
/// - Unrecognised input / file not found
/// - No HTML rendition on arXiv, network failure, timeout
/// - External converter missing or failing (Kindle, PDF)
pub async fn convert(
    input: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConvertError> {
    let input = input.as_ref();
    notify_start(config, input);
    let result = convert_inner(input, config).await;
    notify_outcome(config, input, &result);
    result
}

/// Convert an HTML document already in memory.
///
/// `paper_id` names the paper in metadata and relative image URLs resolve
/// against its arXiv HTML location.
pub async fn convert_html(
    html: impl Into<String>,
    paper_id: &str,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConvertError> {
    let total_start = Instant::now();
    notify_start(config, paper_id);
    let fetched = FetchedPaper {
        paper_id: paper_id.to_string(),
        html: html.into(),
        source: "<memory>".to_string(),
        base_url: fetch::default_base_url(config, paper_id),
    };
    let result = build(paper_id, fetched, config, total_start, 0).await;
    notify_outcome(config, paper_id, &result);
    result
}

/// Convert a paper and write the book to `output_path`.
///
/// The extension is corrected to match `config.format`, parent directories
/// are created, and the write is atomic (temp file + rename).
pub async fn convert_to_file(
    input: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<WrittenBook, ConvertError> {
    let input = input.as_ref();
    let path = fix_extension(output_path.as_ref(), config.format);
    notify_start(config, input);
    let result = async {
        let output = convert_inner(input, config).await?;
        write_book(input, &path, output, config).await
    }
    .await;
    notify_written(config, input, &result);
    result
}

/// Convert a paper into `dir`, naming the file after its arXiv ID.
pub async fn convert_to_dir(
    input: impl AsRef<str>,
    dir: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<WrittenBook, ConvertError> {
    let input = input.as_ref();
    notify_start(config, input);
    let result = async {
        let output = convert_inner(input, config).await?;
        let path = default_output_path(dir.as_ref(), &output.paper_id, config.format);
        write_book(input, &path, output, config).await
    }
    .await;
    notify_written(config, input, &result);
    result
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConvertError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ConvertError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input, config))
}

/// Fetch and parse a paper without downloading images or rendering.
pub async fn inspect(input: impl AsRef<str>, config: &ConversionConfig) -> Result<Paper, ConvertError> {
    let fetched = fetch::resolve_input(input.as_ref(), config).await?;
    Ok(parse::parse_paper(
        &fetched.html,
        &fetched.paper_id,
        Some(&fetched.base_url),
    ))
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn stage(config: &ConversionConfig, input: &str, stage: Stage) {
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage(input, stage);
    }
}

fn notify_start(config: &ConversionConfig, input: &str) {
    if let Some(ref cb) = config.progress_callback {
        cb.on_paper_start(input);
    }
}

fn notify_outcome(config: &ConversionConfig, input: &str, result: &Result<ConversionOutput, ConvertError>) {
    if let Some(ref cb) = config.progress_callback {
        match result {
            Ok(out) => cb.on_paper_complete(input, &out.title, out.bytes.len()),
            Err(e) => cb.on_paper_error(input, &e.to_string()),
        }
    }
}

fn notify_written(config: &ConversionConfig, input: &str, result: &Result<WrittenBook, ConvertError>) {
    if let Some(ref cb) = config.progress_callback {
        match result {
            Ok(book) => cb.on_paper_complete(input, &book.output.title, book.output.bytes.len()),
            Err(e) => cb.on_paper_error(input, &e.to_string()),
        }
    }
}

async fn convert_inner(input: &str, config: &ConversionConfig) -> Result<ConversionOutput, ConvertError> {
    let total_start = Instant::now();
    info!("Starting conversion: {} → {}", input, config.format);

    // ── Step 1: Resolve input ────────────────────────────────────────────
    stage(config, input, Stage::Fetching);
    let fetch_start = Instant::now();
    let fetched = fetch::resolve_input(input, config).await?;
    let fetch_duration_ms = fetch_start.elapsed().as_millis() as u64;
    debug!("Resolved {} from {} in {}ms", fetched.paper_id, fetched.source, fetch_duration_ms);

    build(input, fetched, config, total_start, fetch_duration_ms).await
}

async fn build(
    input: &str,
    fetched: FetchedPaper,
    config: &ConversionConfig,
    total_start: Instant,
    fetch_duration_ms: u64,
) -> Result<ConversionOutput, ConvertError> {
    // ── Step 2: Parse ────────────────────────────────────────────────────
    stage(config, input, Stage::Parsing);
    let paper = parse::parse_paper(&fetched.html, &fetched.paper_id, Some(&fetched.base_url));
    info!(
        "Parsed '{}': {} sections, {} images referenced",
        paper.title,
        paper.sections.len(),
        paper.image_sources.len()
    );

    // ── Step 3: Download images ──────────────────────────────────────────
    let images_start = Instant::now();
    let (paper, mut warnings) = if config.download_images && !paper.image_sources.is_empty() {
        stage(config, input, Stage::DownloadingImages);
        fetch::embed_images(paper, config).await
    } else {
        (paper, Vec::new())
    };
    let images_duration_ms = images_start.elapsed().as_millis() as u64;

    let mut stats = ConversionStats {
        sections: paper.sections.len(),
        blocks: paper.block_count(),
        footnotes: paper.footnotes.len(),
        references: paper.references.len(),
        images_found: paper.image_sources.len(),
        images_embedded: paper.images.len(),
        fetch_duration_ms,
        images_duration_ms,
        ..Default::default()
    };
    let paper_id = paper.id.clone();
    let title = paper.title.clone();
    let authors = paper.authors.clone();

    // ── Step 4: Render ───────────────────────────────────────────────────
    // Math rasterisation, zip compression and external converters all block.
    let render_start = Instant::now();
    let render_config = config.clone();
    let label = input.to_string();
    let rendered = tokio::task::spawn_blocking(move || {
        let cb = render_config.progress_callback.clone();
        let on_stage = |s: Stage| {
            if let Some(ref cb) = cb {
                cb.on_stage(&label, s);
            }
        };
        render::render(&paper, &render_config, &on_stage)
    })
    .await
    .map_err(|e| ConvertError::Internal(format!("render task panicked: {e}")))??;
    stats.render_duration_ms = render_start.elapsed().as_millis() as u64;

    for w in &rendered.warnings {
        warn!("{}", w);
    }
    warnings.extend(rendered.warnings);

    stats.math_rendered = rendered.math_rendered;
    stats.output_bytes = rendered.bytes.len();
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    info!(
        "Converted {} to {} ({} bytes, {} warnings) in {}ms",
        paper_id,
        config.format,
        stats.output_bytes,
        warnings.len(),
        stats.total_duration_ms
    );

    Ok(ConversionOutput {
        paper_id,
        title,
        authors,
        format: config.format,
        bytes: rendered.bytes,
        stats,
        warnings,
    })
}

/// Atomic write: uniquely named temp file next to the target, then rename.
///
/// Concurrent writers of the same path (duplicate batch inputs) each get
/// their own temp file; the last rename wins with a complete book.
async fn write_book(
    input: &str,
    path: &Path,
    output: ConversionOutput,
    config: &ConversionConfig,
) -> Result<WrittenBook, ConvertError> {
    stage(config, input, Stage::Writing);
    let write_err = |e: std::io::Error| ConvertError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => parent.to_path_buf(),
        None => PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&dir).await.map_err(write_err)?;

    let target = path.to_path_buf();
    let output = tokio::task::spawn_blocking(move || -> std::io::Result<ConversionOutput> {
        let mut tmp = tempfile::Builder::new()
            .prefix(".arxiv2ereader-")
            .suffix(".tmp")
            .tempfile_in(&dir)?;
        tmp.write_all(&output.bytes)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o644))?;
        }
        tmp.persist(&target).map_err(|e| e.error)?;
        Ok(output)
    })
    .await
    .map_err(|e| ConvertError::Internal(format!("write task panicked: {e}")))?
    .map_err(write_err)?;

    info!("Wrote {} ({} bytes)", path.display(), output.bytes.len());
    Ok(WrittenBook {
        path: path.to_path_buf(),
        output,
    })
}
