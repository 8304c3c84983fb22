//! Progress-callback trait for per-paper conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the pipeline moves each paper through its stages.
//!
//! Callers can forward events to a channel, a log, or a terminal progress
//! bar without the library knowing how the host application communicates.
//! The trait is `Send + Sync` because batch conversion drives several papers
//! at once.
//!
//! # Example
//!
//! ```rust
//! use arxiv_to_ereader::{ConversionConfig, ConversionProgressCallback, Stage};
//! use std::sync::Arc;
//!
//! struct Logger;
//!
//! impl ConversionProgressCallback for Logger {
//!     fn on_stage(&self, paper: &str, stage: Stage) {
//!         eprintln!("{paper}: {}", stage.label());
//!     }
//! }
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(Arc::new(Logger) as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use serde::Serialize;
use std::sync::Arc;

/// Pipeline stage a paper is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Fetching,
    Parsing,
    DownloadingImages,
    RenderingMath,
    Rendering,
    Converting,
    Writing,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::Fetching => "fetching HTML",
            Stage::Parsing => "parsing",
            Stage::DownloadingImages => "downloading images",
            Stage::RenderingMath => "rendering math",
            Stage::Rendering => "rendering",
            Stage::Converting => "converting",
            Stage::Writing => "writing",
        }
    }
}

/// Called by the conversion pipeline as it processes each paper.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// In batch mode `on_paper_start`, `on_stage`, `on_paper_complete` and
/// `on_paper_error` may be called concurrently for different papers.
/// Implementations must protect shared mutable state with appropriate
/// synchronisation primitives (e.g. `Mutex`, `AtomicUsize`).
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once before a batch starts.
    fn on_batch_start(&self, total_papers: usize) {
        let _ = total_papers;
    }

    /// Called when work on `paper` (the user's input string) begins.
    fn on_paper_start(&self, paper: &str) {
        let _ = paper;
    }

    /// Called on every stage transition.
    fn on_stage(&self, paper: &str, stage: Stage) {
        let _ = (paper, stage);
    }

    /// Called when a paper converted successfully.
    ///
    /// # Arguments
    /// * `paper`     : the user's input string
    /// * `title`     : parsed paper title
    /// * `bytes`     : size of the produced book
    fn on_paper_complete(&self, paper: &str, title: &str, bytes: usize) {
        let _ = (paper, title, bytes);
    }

    /// Called when a paper failed fatally.
    fn on_paper_error(&self, paper: &str, error: &str) {
        let _ = (paper, error);
    }

    /// Called once after every paper in a batch has been attempted.
    fn on_batch_complete(&self, total_papers: usize, success_count: usize) {
        let _ = (total_papers, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
