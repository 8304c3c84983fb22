//! PDF through a headless Chromium-family browser.
//!
//! The paper is laid out as one standalone HTML page: print stylesheet sized
//! to the [`ScreenPreset`], images inlined as data URIs and MathML left for
//! the browser's native renderer. The browser prints it with
//! `--print-to-pdf`.

use crate::config::ConversionConfig;
use crate::error::ConvertError;
use crate::model::Paper;
use crate::pipeline::dom::{self, escape, Element, Node};
use crate::pipeline::postprocess;
use crate::progress::Stage;
use crate::render::epub::{notes_section, references_body, section_body, text_el, title_page};
use crate::render::{find_executable, rewrite_image_refs, run_tool};
use crate::styles::{pdf_stylesheet, ScreenPreset};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

const BROWSERS: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
    "msedge",
];

const EXTRA_LOCATIONS: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
    "C:\\Program Files\\Google\\Chrome\\Application\\chrome.exe",
    "C:\\Program Files (x86)\\Microsoft\\Edge\\Application\\msedge.exe",
];

const PDF_MAGIC: &[u8] = b"%PDF";

/// Render `paper` to PDF bytes.
pub fn render_pdf(
    paper: &Paper,
    config: &ConversionConfig,
    on_stage: &dyn Fn(Stage),
) -> Result<Vec<u8>, ConvertError> {
    on_stage(Stage::Rendering);
    let html = build_html(paper, &config.screen);
    on_stage(Stage::Converting);
    let browser = browser_binary(config)?;
    print_to_pdf(&html, &browser)
}

/// The configured browser, or the first Chromium-family browser found.
pub fn browser_binary(config: &ConversionConfig) -> Result<PathBuf, ConvertError> {
    if let Some(path) = &config.browser_path {
        return Ok(path.clone());
    }
    find_executable(BROWSERS, EXTRA_LOCATIONS).ok_or_else(|| ConvertError::browser_missing("chromium"))
}

/// Standalone print document for `paper`.
pub fn build_html(paper: &Paper, screen: &ScreenPreset) -> String {
    let mut body: Vec<Node> = vec![Node::Element(Element {
        name: "div".into(),
        attrs: vec![("class".into(), "cover".into())],
        children: title_page(paper),
    })];

    if !paper.abstract_text.is_empty() {
        body.push(Node::Element(
            Element::new("div")
                .with_attr("class", "abstract")
                .with_child(text_el("p", Some("abstract-title"), "Abstract"))
                .with_child(text_el("p", None, &paper.abstract_text)),
        ));
    }
    for section in &paper.sections {
        body.push(Node::Element(Element {
            name: "section".into(),
            attrs: vec![("class".into(), "paper-section".into())],
            children: section_body(section),
        }));
    }
    if !paper.references.is_empty() {
        body.push(Node::Element(Element {
            name: "section".into(),
            attrs: vec![("class".into(), "references".into())],
            children: references_body(&paper.references),
        }));
    }
    if !paper.footnotes.is_empty() {
        body.push(notes_section(paper));
    }

    // ── Inline images ────────────────────────────────────────────────────
    let mut data_uris: HashMap<String, String> = HashMap::new();
    for img in &paper.images {
        let uri = format!("data:{};base64,{}", img.media_type, STANDARD.encode(&img.data));
        data_uris.insert(img.src.clone(), uri.clone());
        data_uris.insert(img.url.clone(), uri);
    }
    rewrite_image_refs(&mut body, &data_uris);
    postprocess::scrub_tree(&mut body, false);

    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\"/>\n\
<title>{title}</title>\n<style>\n{css}\n</style>\n</head>\n<body>\n{body}\n</body>\n</html>\n",
        title = escape(&paper.title),
        css = pdf_stylesheet(screen),
        body = dom::nodes_to_xhtml(&body),
    )
}

/// Print `html` to PDF with `browser`.
pub fn print_to_pdf(html: &str, browser: &Path) -> Result<Vec<u8>, ConvertError> {
    let io_err = |e: std::io::Error| ConvertError::Internal(format!("scratch directory: {e}"));
    let dir = tempfile::tempdir().map_err(io_err)?;
    let page = dir.path().join("paper.html");
    let output = dir.path().join("paper.pdf");
    std::fs::write(&page, html).map_err(io_err)?;

    let url = reqwest::Url::from_file_path(&page)
        .map_err(|_| ConvertError::Internal(format!("not an absolute path: {}", page.display())))?;

    let mut cmd = Command::new(browser);
    cmd.arg("--headless")
        .arg("--disable-gpu")
        .arg("--no-sandbox")
        .arg("--no-pdf-header-footer")
        .arg(format!("--user-data-dir={}", dir.path().join("profile").display()))
        .arg(format!("--print-to-pdf={}", output.display()))
        .arg(url.as_str());
    debug!("Printing {} with {}", url, browser.display());
    run_tool(&mut cmd, browser, ConvertError::browser_missing)?;

    let bytes = std::fs::read(&output).map_err(|e| ConvertError::ConverterFailed {
        tool: browser.display().to_string(),
        stderr: format!("no PDF produced: {e}"),
    })?;
    let bytes = check_pdf(bytes)?;
    info!("Printed PDF: {} bytes", bytes.len());
    Ok(bytes)
}

/// Reject output that does not start with `%PDF`.
pub fn check_pdf(bytes: Vec<u8>) -> Result<Vec<u8>, ConvertError> {
    if bytes.starts_with(PDF_MAGIC) {
        Ok(bytes)
    } else {
        Err(ConvertError::NotAPdf {
            magic: bytes.iter().take(8).copied().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EmbeddedImage;
    use crate::pipeline::parse::parse_paper;

    const HTML: &str = r##"<html><body><article>
<h1 class="ltx_title ltx_title_document">Printing Papers</h1>
<span class="ltx_personname">Grace Hopper</span>
<div class="ltx_abstract"><p>Short.</p></div>
<section id="S1" class="ltx_section"><h2 class="ltx_title">1 Body</h2>
<p>Text<span class="ltx_note"><span class="ltx_note_content">Note.</span></span>
<math alttext="a+b" display="inline"><mi>a</mi><mo>+</mo><mi>b</mi></math></p>
<img src="x1.png" alt="plot"><img src="">
</section>
</article></body></html>"##;

    fn paper() -> Paper {
        let mut paper = parse_paper(HTML, "2402.08954", None);
        paper.images.push(EmbeddedImage {
            src: "x1.png".into(),
            url: "https://arxiv.org/html/2402.08954/x1.png".into(),
            media_type: "image/png".into(),
            data: vec![1, 2, 3],
        });
        paper
    }

    #[test]
    fn html_is_standalone() {
        let html = build_html(&paper(), &ScreenPreset::default());
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<title>Printing Papers</title>"));
        assert!(html.contains("size: 103.6mm 138.2mm;"));
        assert!(html.contains("<div class=\"cover\"><h1>Printing Papers</h1>"));
        assert!(html.contains("<p class=\"authors\">Grace Hopper</p>"));
        assert!(html.contains("<p>Short.</p>"));
        assert!(html.contains("<h1 id=\"S1\">1 Body</h1>"));
    }

    #[test]
    fn images_inlined_and_mathml_kept() {
        let html = build_html(&paper(), &ScreenPreset::default());
        assert!(html.contains("src=\"data:image/png;base64,AQID\""));
        assert!(!html.contains("src=\"\""));
        assert!(html.contains("<math alttext=\"a+b\""));
    }

    #[test]
    fn notes_use_same_page_anchors() {
        let html = build_html(&paper(), &ScreenPreset::default());
        assert!(html.contains("href=\"#fn-1\""));
        assert!(html.contains("<li id=\"fn-1\">Note. <a href=\"#fnref-1\" class=\"footnote-back\">↩</a></li>"));
    }

    #[test]
    fn pdf_magic_checked() {
        assert!(check_pdf(b"%PDF-1.7\n...".to_vec()).is_ok());
        match check_pdf(b"<html>".to_vec()).unwrap_err() {
            ConvertError::NotAPdf { magic } => assert_eq!(magic, b"<html>"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn configured_browser_wins() {
        let config = ConversionConfig::builder()
            .browser_path("/opt/chrome/chrome")
            .build()
            .unwrap();
        assert_eq!(browser_binary(&config).unwrap(), PathBuf::from("/opt/chrome/chrome"));
    }

    #[test]
    fn missing_browser_is_converter_not_found() {
        let err = print_to_pdf("<html></html>", Path::new("/nonexistent/chromium")).unwrap_err();
        assert!(matches!(err, ConvertError::ConverterNotFound { .. }));
    }
}
