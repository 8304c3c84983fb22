//! Batch conversion API: emit one result per paper as it completes.
//!
//! Converting a reading list takes a while: every paper is an HTML fetch,
//! a burst of image downloads and possibly an external converter run.
//! [`convert_batch_stream`] overlaps up to `batch_concurrency` papers and
//! yields each [`BatchResult`] as soon as its book is on disk, so callers
//! can drive a progress bar or report failures early.
//!
//! Results arrive in completion order. Use [`BatchResult::index`] to
//! restore input order. A failed paper never aborts the batch.

use crate::config::ConversionConfig;
use crate::convert::convert_to_dir;
use crate::output::BatchResult;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of batch results.
pub type BatchStream = Pin<Box<dyn Stream<Item = BatchResult> + Send>>;

/// Convert every input into `output_dir`, streaming results as they finish.
///
/// Each book is named after its arXiv ID (`hep-th/9901001` →
/// `hep-th_9901001.epub`). `on_batch_start` fires immediately and
/// `on_batch_complete` fires once the stream is exhausted.
///
/// # Example
/// ```rust,no_run
/// use arxiv_to_ereader::{convert_batch_stream, ConversionConfig};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() {
/// let config = ConversionConfig::default();
/// let inputs = vec!["2402.08954".to_string(), "1706.03762".to_string()];
/// let mut results = convert_batch_stream(inputs, "books", &config);
/// while let Some(r) = results.next().await {
///     match r.outcome {
///         Ok(book) => println!("{} → {}", r.input, book.path.display()),
///         Err(e) => eprintln!("{}: {e}", r.input),
///     }
/// }
/// # }
/// ```
pub fn convert_batch_stream(
    inputs: Vec<String>,
    output_dir: impl AsRef<Path>,
    config: &ConversionConfig,
) -> BatchStream {
    let total = inputs.len();
    info!(
        "Starting batch of {} papers ({} at a time)",
        total, config.batch_concurrency
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let successes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&successes);
    let dir = output_dir.as_ref().to_path_buf();
    let cfg = config.clone();

    let results = stream::iter(inputs.into_iter().enumerate().map(move |(index, input)| {
        let dir = dir.clone();
        let cfg = cfg.clone();
        async move {
            let outcome = convert_to_dir(&input, &dir, &cfg).await;
            BatchResult {
                input,
                index,
                outcome,
            }
        }
    }))
    .buffer_unordered(config.batch_concurrency)
    .inspect(move |r| {
        if r.is_ok() {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    let cb = config.progress_callback.clone();
    let done = stream::once(async move {
        let ok = successes.load(Ordering::SeqCst);
        info!("Batch complete: {} succeeded, {} failed", ok, total - ok);
        if let Some(cb) = cb {
            cb.on_batch_complete(total, ok);
        }
    })
    .filter_map(|()| async { None::<BatchResult> });

    Box::pin(results.chain(done))
}
