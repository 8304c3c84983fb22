//! Post-processing: deterministic Kindle-compatibility scrub of the EPUB.
//!
//! Calibre's `ebook-convert` and Amazon's ingestion pipeline reject or
//! silently mangle a handful of constructs that are valid EPUB 3. The scrub
//! removes them without touching content.
//!
//! Two groups of rules:
//!
//! - **Tree rules** ([`scrub_tree`]) run on each chapter's DOM before it is
//!   serialised: empty images, MathML and empty lists.
//! - **Document rules** ([`scrub_epub`]) run on the finished package, over
//!   every XML-ish entry: declaration, control characters, `dc:language`,
//!   NCX links to body ids. The archive is rewritten with `mimetype` first
//!   and stored.
//!
//! ## Rule Order
//!
//! Tree rules run images → math → lists so a list emptied by an earlier rule
//! is still caught. Document rules collect body ids from chapters before the
//! NCX is rewritten.

use crate::error::ConvertError;
use crate::pipeline::dom::{self, Element, Node, Rewrite};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="utf-8"?>"#;

/// Apply the tree rules to a chapter's content.
///
/// Rules (applied in order):
/// 1. Remove `img` elements without a `src`
/// 2. Replace `math` with its `alttext` padded with spaces, or drop it
///    (only when `strip_math`)
/// 3. Remove `ol` elements that contain no `li`
pub fn scrub_tree(nodes: &mut Vec<Node>, strip_math: bool) {
    remove_empty_images(nodes);
    if strip_math {
        strip_mathml(nodes);
    }
    remove_empty_lists(nodes);
}

// ── Rule 1: Remove images without src ────────────────────────────────────

fn remove_empty_images(nodes: &mut Vec<Node>) {
    dom::rewrite_elements(nodes, &mut |e| {
        if e.name == "img" && e.attr("src").is_none_or(|s| s.trim().is_empty()) {
            Rewrite::Remove
        } else {
            Rewrite::Keep
        }
    });
}

// ── Rule 2: Strip MathML ─────────────────────────────────────────────────

fn strip_mathml(nodes: &mut Vec<Node>) {
    dom::rewrite_elements(nodes, &mut |e| {
        if e.name != "math" {
            return Rewrite::Keep;
        }
        match e.attr("alttext").filter(|a| !a.is_empty()) {
            Some(alt) => Rewrite::Replace(vec![Node::Text(format!(" {alt} "))]),
            None => Rewrite::Remove,
        }
    });
}

// ── Rule 3: Remove lists without items ───────────────────────────────────

fn has_item(e: &Element) -> bool {
    e.find(|c| c.name == "li").is_some()
}

fn remove_empty_lists(nodes: &mut Vec<Node>) {
    dom::rewrite_elements(nodes, &mut |e| {
        if e.name == "ol" && !has_item(e) {
            Rewrite::Remove
        } else {
            Rewrite::Keep
        }
    });
}

/// Scrub a finished EPUB package and re-zip it.
///
/// Rules (applied to every `.xhtml/.html/.xml/.opf/.ncx` entry, in order):
/// 4. Force a UTF-8 XML declaration
/// 5. Strip XML-invalid control characters
/// 6. Ensure `<dc:language>` in the OPF
/// 7. Point NCX entries at chapter files instead of their `body` id
///
/// Entries that are not valid UTF-8 pass through untouched.
pub fn scrub_epub(epub: &[u8]) -> Result<Vec<u8>, ConvertError> {
    let zip_err = |e: zip::result::ZipError| ConvertError::PackageFailed(e.to_string());
    let mut archive = ZipArchive::new(Cursor::new(epub)).map_err(zip_err)?;

    let mut entries: Vec<(String, Vec<u8>)> = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).map_err(zip_err)?;
        if file.is_dir() {
            continue;
        }
        let mut data = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut data)
            .map_err(|e| ConvertError::PackageFailed(format!("{}: {e}", file.name())))?;
        entries.push((file.name().to_string(), data));
    }

    let mut body_ids: BTreeMap<String, String> = BTreeMap::new();
    for (name, data) in entries.iter_mut() {
        let name = name.as_str();
        if name == "mimetype" || !is_markup(name) {
            continue;
        }
        let Ok(text) = std::str::from_utf8(data) else {
            debug!("Skipping non-UTF-8 entry {name}");
            continue;
        };
        let mut text = force_xml_declaration(text);
        text = strip_control_chars(&text);
        if name.ends_with(".xhtml") || name.ends_with(".html") {
            if let Some(id) = body_id(&text) {
                let file = name.rsplit('/').next().unwrap_or(name).to_string();
                body_ids.insert(file, id);
            }
        }
        if name.ends_with(".opf") {
            text = ensure_dc_language(&text);
        }
        *data = text.into_bytes();
    }

    for (name, data) in entries.iter_mut() {
        if !name.ends_with(".ncx") {
            continue;
        }
        if let Ok(text) = std::str::from_utf8(data) {
            *data = fix_ncx_body_links(text, &body_ids).into_bytes();
        }
    }

    write_package(&entries)
}

fn is_markup(name: &str) -> bool {
    [".xhtml", ".html", ".xml", ".opf", ".ncx"]
        .iter()
        .any(|ext| name.ends_with(ext))
}

/// Zip `entries`, `mimetype` first and uncompressed.
pub fn write_package(entries: &[(String, Vec<u8>)]) -> Result<Vec<u8>, ConvertError> {
    let zip_err = |e: zip::result::ZipError| ConvertError::PackageFailed(e.to_string());
    let io_err = |e: std::io::Error| ConvertError::PackageFailed(e.to_string());

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    if let Some((_, data)) = entries.iter().find(|(n, _)| n == "mimetype") {
        zip.start_file("mimetype", stored).map_err(zip_err)?;
        zip.write_all(data).map_err(io_err)?;
    }
    for (name, data) in entries.iter().filter(|(n, _)| n != "mimetype") {
        zip.start_file(name.as_str(), deflated).map_err(zip_err)?;
        zip.write_all(data).map_err(io_err)?;
    }
    Ok(zip.finish().map_err(zip_err)?.into_inner())
}

// ── Rule 4: Force UTF-8 XML declaration ──────────────────────────────────

static RE_XML_DECL: Lazy<Regex> = Lazy::new(|| Regex::new(r"<\?xml[^?]*\?>").unwrap());

fn force_xml_declaration(text: &str) -> String {
    let lead = text.trim_start();
    if lead.starts_with("<?xml") {
        RE_XML_DECL.replace(text, XML_DECLARATION).into_owned()
    } else if lead.starts_with("<!DOCTYPE") {
        text.to_string()
    } else {
        format!("{XML_DECLARATION}\n{text}")
    }
}

// ── Rule 5: Strip XML-invalid control characters ─────────────────────────

fn strip_control_chars(text: &str) -> String {
    text.chars()
        .filter(|&c| !matches!(c, '\u{0}'..='\u{8}' | '\u{b}' | '\u{c}' | '\u{e}'..='\u{1f}' | '\u{7f}'))
        .collect()
}

// ── Rule 6: Ensure dc:language ───────────────────────────────────────────

static RE_METADATA_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(<metadata[^>]*>)").unwrap());

fn ensure_dc_language(opf: &str) -> String {
    if opf.contains("<dc:language>") || opf.contains("<dc:language/>") {
        return opf.to_string();
    }
    RE_METADATA_OPEN
        .replace(opf, "${1}\n    <dc:language>en</dc:language>")
        .into_owned()
}

// ── Rule 7: NCX links to body ids ────────────────────────────────────────

static RE_BODY_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<body\b[^>]*?\sid="([^"]+)""#).unwrap());

fn body_id(xhtml: &str) -> Option<String> {
    RE_BODY_ID.captures(xhtml).map(|c| c[1].to_string())
}

fn fix_ncx_body_links(ncx: &str, body_ids: &BTreeMap<String, String>) -> String {
    let mut out = ncx.to_string();
    for (file, id) in body_ids {
        let pattern = format!(
            r#"src="((?:[^"]*/)?{})#{}""#,
            regex::escape(file),
            regex::escape(id)
        );
        // Both parts are escaped, so the pattern is always valid.
        if let Ok(re) = Regex::new(&pattern) {
            out = re.replace_all(&out, r#"src="${1}""#).into_owned();
        }
    }
    out
}

// ── Tests ────────────────────────────────────────────────────────────────
