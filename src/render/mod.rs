//! Renderers: [`Paper`] → book bytes.
//!
//! ```text
//!                 ┌──▶ epub ──────────────────▶ .epub
//! Paper ──render──┼──▶ epub ──▶ kindle ───────▶ .mobi / .azw3   (ebook-convert)
//!                 └──▶ pdf (HTML + print) ────▶ .pdf            (headless browser)
//! ```
//!
//! Every renderer is synchronous: math rasterisation, zip compression and the
//! external converters are CPU- or subprocess-bound, so the caller runs
//! [`render`] inside `spawn_blocking`.

pub mod epub;
pub mod kindle;
pub mod pdf;

use crate::config::{ConversionConfig, OutputFormat};
use crate::error::{AssetError, ConvertError};
use crate::model::Paper;
use crate::pipeline::dom::{self, Node};
use crate::progress::Stage;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// A finished book.
#[derive(Debug)]
pub struct Rendered {
    pub bytes: Vec<u8>,
    /// Equations rasterised to images.
    pub math_rendered: usize,
    pub warnings: Vec<AssetError>,
}

/// Render `paper` in `config.format`.
///
/// `on_stage` is told when the work moves to math, rendering or conversion.
pub fn render(
    paper: &Paper,
    config: &ConversionConfig,
    on_stage: &dyn Fn(Stage),
) -> Result<Rendered, ConvertError> {
    match config.format {
        OutputFormat::Epub => {
            let options = epub::EpubOptions::from_config(config, &paper.id);
            let out = epub::render_epub(paper, &options, on_stage)?;
            Ok(Rendered {
                bytes: out.bytes,
                math_rendered: out.math_images,
                warnings: out.warnings,
            })
        }
        OutputFormat::Mobi | OutputFormat::Azw3 => {
            let mut options = epub::EpubOptions::from_config(config, &paper.id);
            options.strip_mathml = true;
            let out = epub::render_epub(paper, &options, on_stage)?;
            on_stage(Stage::Converting);
            let tool = kindle::ebook_convert_binary(config)?;
            let bytes = kindle::render_kindle(&out.bytes, config.format, &tool)?;
            Ok(Rendered {
                bytes,
                math_rendered: out.math_images,
                warnings: out.warnings,
            })
        }
        OutputFormat::Pdf => {
            let bytes = pdf::render_pdf(paper, config, on_stage)?;
            Ok(Rendered {
                bytes,
                math_rendered: 0,
                warnings: Vec::new(),
            })
        }
    }
}

// ── Shared helpers ───────────────────────────────────────────────────────

/// Look for the first of `names` on `PATH`, then in `extra` absolute locations.
pub fn find_executable(names: &[&str], extra: &[&str]) -> Option<PathBuf> {
    names
        .iter()
        .find_map(|name| which::which(name).ok())
        .or_else(|| extra.iter().map(PathBuf::from).find(|p| p.is_file()))
}

/// Last `max_lines` lines of a tool's stderr, for error messages.
pub fn stderr_tail(stderr: &[u8], max_lines: usize) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    lines[lines.len().saturating_sub(max_lines)..].join("\n")
}

/// Run `cmd`, mapping a missing binary to `missing(tool)` and a failed exit to
/// [`ConvertError::ConverterFailed`].
pub fn run_tool(
    cmd: &mut std::process::Command,
    tool: &Path,
    missing: fn(String) -> ConvertError,
) -> Result<std::process::Output, ConvertError> {
    let name = tool.display().to_string();
    let output = cmd.output().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            missing(name.clone())
        } else {
            ConvertError::ConverterFailed {
                tool: name.clone(),
                stderr: e.to_string(),
            }
        }
    })?;
    if !output.status.success() {
        return Err(ConvertError::ConverterFailed {
            tool: name,
            stderr: match stderr_tail(&output.stderr, 20) {
                s if s.is_empty() => output.status.to_string(),
                s => s,
            },
        });
    }
    Ok(output)
}

/// Point `img[src]` and SVG `image`/`use` hrefs at their replacement when one exists.
pub fn rewrite_image_refs(nodes: &mut [Node], map: &HashMap<String, String>) {
    dom::for_each_element_mut(nodes, &mut |e| {
        let keys: &[&str] = match e.name.as_str() {
            "img" => &["src"],
            "image" | "use" => &["href", "xlink:href"],
            _ => return,
        };
        for key in keys {
            let replacement = e.attr(key).and_then(|v| map.get(v.trim())).cloned();
            if let Some(new) = replacement {
                e.set_attr(key, new);
            }
        }
    });
}
