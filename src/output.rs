//! Conversion results.

use crate::config::OutputFormat;
use crate::error::{AssetError, ConvertError};
use serde::Serialize;
use std::path::PathBuf;

/// One converted paper.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionOutput {
    /// Normalised arXiv ID, e.g. `2402.08954`.
    pub paper_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub format: OutputFormat,
    /// The finished book.
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub stats: ConversionStats,
    /// Assets that could not be embedded. The book was still produced.
    pub warnings: Vec<AssetError>,
}

/// Counts and timings for one conversion.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversionStats {
    pub sections: usize,
    pub blocks: usize,
    pub footnotes: usize,
    pub references: usize,
    /// Images referenced by the page.
    pub images_found: usize,
    /// Images downloaded and embedded.
    pub images_embedded: usize,
    /// Equations rasterised to PNG.
    pub math_rendered: usize,
    pub output_bytes: usize,
    pub fetch_duration_ms: u64,
    pub images_duration_ms: u64,
    pub render_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// A book written to disk by [`crate::convert::convert_to_file`].
#[derive(Debug, Clone, Serialize)]
pub struct WrittenBook {
    pub path: PathBuf,
    pub output: ConversionOutput,
}

/// Outcome for one input of a batch.
#[derive(Debug)]
pub struct BatchResult {
    /// The input string as given.
    pub input: String,
    /// Position of the input in the batch.
    pub index: usize,
    pub outcome: Result<WrittenBook, ConvertError>,
}

impl BatchResult {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}
