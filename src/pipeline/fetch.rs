//! Input resolution and HTTP: turn a user-supplied ID, URL or file into HTML,
//! and download the images a parsed paper references.
//!
//! Every arXiv input form (`2402.08954`, `arXiv:2402.08954v2`,
//! `https://arxiv.org/abs/…`, `…/pdf/…`, old-style `hep-th/9901001`) is
//! normalised to a bare ID first, so the HTML URL is always built the same
//! way and output filenames are stable. A local `.html` file skips the
//! network entirely, which is how fixtures and offline conversions work.

use crate::config::ConversionConfig;
use crate::error::{AssetError, ConvertError};
use crate::model::{EmbeddedImage, ImageSource, Paper};
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

static RE_ARXIV_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:arxiv:)?(?:abs/|html/|pdf/)?(\d{4}\.\d{4,5}(?:v\d+)?|[a-z-]+(?:\.[a-z]{2})?/\d{7}(?:v\d+)?)",
    )
    .unwrap()
});

/// HTML obtained for one input, before parsing.
#[derive(Debug, Clone)]
pub struct FetchedPaper {
    pub paper_id: String,
    pub html: String,
    /// Where the HTML came from (final URL after redirects, or file path).
    pub source: String,
    /// Base for resolving relative URLs; ends with `/`.
    pub base_url: String,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Check if the input names a local HTML file (existing or not).
pub fn is_html_path(input: &str) -> bool {
    let lower = input.to_ascii_lowercase();
    !is_url(input) && (lower.ends_with(".html") || lower.ends_with(".htm"))
}

/// Extract the arXiv ID from any supported input form.
///
/// URLs are matched on their path only, so hosts and query strings never
/// produce false positives.
pub fn normalize_arxiv_id(input: &str) -> Result<String, ConvertError> {
    let input = input.trim();
    let haystack = if is_url(input) {
        Url::parse(input)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| input.to_string())
    } else {
        input.to_string()
    };

    RE_ARXIV_ID
        .captures(&haystack)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| ConvertError::InvalidPaperId {
            input: input.to_string(),
        })
}

/// Resolve `src` against `base` the way a browser would.
///
/// Falls back to `src` unchanged when either side is not a valid URL.
pub fn resolve_url(base: &str, src: &str) -> String {
    Url::parse(base)
        .and_then(|b| b.join(src))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| src.to_string())
}

/// Default base URL for a paper: `{html_base}/{id}/`.
pub fn default_base_url(config: &ConversionConfig, paper_id: &str) -> String {
    format!("{}/", config.html_url(paper_id))
}

/// Resolve any supported input to HTML.
///
/// Local `.html`/`.htm` paths are read from disk; everything else is treated
/// as an arXiv ID or URL and fetched.
pub async fn resolve_input(
    input: &str,
    config: &ConversionConfig,
) -> Result<FetchedPaper, ConvertError> {
    if is_html_path(input) {
        read_local(Path::new(input), config).await
    } else {
        fetch_paper(input, config).await
    }
}

async fn read_local(path: &Path, config: &ConversionConfig) -> Result<FetchedPaper, ConvertError> {
    let html = tokio::fs::read_to_string(path)
        .await
        .map_err(|_| ConvertError::FileNotFound {
            path: PathBuf::from(path),
        })?;

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("paper")
        .to_string();
    // `hep-th_9901001.html` names the old-style ID `hep-th/9901001`.
    let paper_id = normalize_arxiv_id(&stem)
        .or_else(|_| normalize_arxiv_id(&stem.replacen('_', "/", 1)))
        .unwrap_or(stem);

    debug!("Resolved local HTML: {} (id {})", path.display(), paper_id);
    Ok(FetchedPaper {
        base_url: default_base_url(config, &paper_id),
        source: path.display().to_string(),
        paper_id,
        html,
    })
}

/// Build the shared HTTP client: User-Agent, Accept, timeout, redirects.
pub fn http_client(config: &ConversionConfig) -> Result<reqwest::Client, ConvertError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml"),
    );
    reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .default_headers(headers)
        .timeout(Duration::from_secs(config.timeout_secs))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| ConvertError::Internal(format!("HTTP client: {e}")))
}

/// Fetch the HTML rendition of an arXiv paper.
///
/// # Errors
/// - [`ConvertError::InvalidPaperId`] if no ID can be extracted
/// - [`ConvertError::HtmlNotAvailable`] on HTTP 404
/// - [`ConvertError::DownloadTimeout`] / [`ConvertError::DownloadFailed`] otherwise
pub async fn fetch_paper(
    input: &str,
    config: &ConversionConfig,
) -> Result<FetchedPaper, ConvertError> {
    let paper_id = normalize_arxiv_id(input)?;
    let url = config.html_url(&paper_id);
    info!("Fetching arXiv paper {} from {}", paper_id, url);

    let client = http_client(config)?;
    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| send_error(&url, config.timeout_secs, e))?;

    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(ConvertError::HtmlNotAvailable { paper_id });
    }
    if !status.is_success() {
        return Err(ConvertError::DownloadFailed {
            url,
            reason: format!("HTTP {status}"),
        });
    }

    let final_url = response.url().to_string();
    let html = response
        .text()
        .await
        .map_err(|e| send_error(&url, config.timeout_secs, e))?;

    info!("Fetched {} bytes of HTML for {}", html.len(), paper_id);
    Ok(FetchedPaper {
        base_url: default_base_url(config, &paper_id),
        source: final_url,
        paper_id,
        html,
    })
}

fn send_error(url: &str, secs: u64, e: reqwest::Error) -> ConvertError {
    if e.is_timeout() {
        ConvertError::DownloadTimeout {
            url: url.to_string(),
            secs,
        }
    } else {
        ConvertError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }
}

/// Media type from a `Content-Type` value, parameters stripped.
pub fn media_type_from_header(value: Option<&str>) -> String {
    value
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "image/png".to_string())
}

/// Best media type for downloaded bytes: the header if it names an image,
/// otherwise the sniffed format.
fn image_media_type(header: String, bytes: &[u8]) -> Option<String> {
    if header.starts_with("image/") {
        return Some(header);
    }
    if let Ok(format) = image::guess_format(bytes) {
        return Some(format.to_mime_type().to_string());
    }
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(512)]);
    if head.contains("<svg") {
        return Some("image/svg+xml".to_string());
    }
    None
}

/// Download one image.
pub async fn download_image(
    client: &reqwest::Client,
    source: &ImageSource,
) -> Result<EmbeddedImage, AssetError> {
    let fail = |reason: String| AssetError::ImageDownload {
        src: source.src.clone(),
        reason,
    };

    let response = client
        .get(&source.url)
        .header(ACCEPT, "image/*")
        .send()
        .await
        .map_err(|e| fail(e.to_string()))?;

    if !response.status().is_success() {
        return Err(fail(format!("HTTP {}", response.status())));
    }

    let header = media_type_from_header(
        response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
    );
    let data = response.bytes().await.map_err(|e| fail(e.to_string()))?;
    let media_type = image_media_type(header.clone(), &data)
        .ok_or_else(|| fail(format!("not an image (content-type {header})")))?;

    Ok(EmbeddedImage {
        src: source.src.clone(),
        url: source.url.clone(),
        media_type,
        data: data.to_vec(),
    })
}

/// Download every image the paper references and attach them.
///
/// Downloads run concurrently (bounded by `image_concurrency`) but the
/// resulting list keeps document order. Failures never abort the paper;
/// they come back as [`AssetError::ImageDownload`] warnings.
pub async fn embed_images(paper: Paper, config: &ConversionConfig) -> (Paper, Vec<AssetError>) {
    if paper.image_sources.is_empty() {
        return (paper, Vec::new());
    }

    let client = match http_client(config) {
        Ok(c) => c,
        Err(e) => {
            let warnings = paper
                .image_sources
                .iter()
                .map(|s| AssetError::ImageDownload {
                    src: s.src.clone(),
                    reason: e.to_string(),
                })
                .collect();
            return (paper, warnings);
        }
    };

    info!(
        "Downloading {} images for {}",
        paper.image_sources.len(),
        paper.id
    );

    let mut results: Vec<(usize, Result<EmbeddedImage, AssetError>)> =
        stream::iter(paper.image_sources.iter().cloned().enumerate().map(|(i, source)| {
            let client = client.clone();
            async move { (i, download_image(&client, &source).await) }
        }))
        .buffer_unordered(config.image_concurrency)
        .collect()
        .await;
    results.sort_by_key(|(i, _)| *i);

    let mut paper = paper;
    let mut warnings = Vec::new();
    for (_, result) in results {
        match result {
            Ok(img) => paper.images.push(img),
            Err(e) => {
                warn!("{}", e);
                warnings.push(e);
            }
        }
    }

    for fig in paper.figures.iter_mut() {
        if let Some(url) = &fig.image_url {
            fig.image = paper.images.iter().find(|img| &img.url == url).cloned();
        }
    }

    debug!(
        "Embedded {}/{} images",
        paper.images.len(),
        paper.image_sources.len()
    );
    (paper, warnings)
}
