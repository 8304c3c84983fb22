//! EPUB 3 package writer.
//!
//! Layout of the archive:
//!
//! ```text
//! mimetype                      (first entry, stored)
//! META-INF/container.xml
//! EPUB/content.opf              metadata, manifest, spine
//! EPUB/nav.xhtml                EPUB 3 navigation document
//! EPUB/toc.ncx                  EPUB 2 table of contents for older readers
//! EPUB/style.css
//! EPUB/cover.xhtml              title page
//! EPUB/abstract.xhtml           if the paper has an abstract
//! EPUB/section_NN.xhtml         one per section
//! EPUB/references.xhtml         if the paper has a bibliography
//! EPUB/footnotes.xhtml          if the paper has notes
//! EPUB/images/img_NNNN.ext      downloaded images
//! EPUB/math/math_HASH.png       rendered equations
//! ```
//!
//! Sections become separate chapters, so in-page anchors such as footnote
//! references (`#fn-3`) or bibliography citations (`#bib.bib12`) are
//! rewritten to `file.xhtml#id` when their target lives in another chapter.

use crate::config::{ConversionConfig, StylePreset};
use crate::error::{AssetError, ConvertError};
use crate::model::{Paper, Reference, Section};
use crate::pipeline::dom::{self, escape, Element, Node};
use crate::pipeline::math::{self, LatexRenderer, MathCache, MathRenderer};
use crate::pipeline::postprocess::{self, XML_DECLARATION};
use crate::progress::Stage;
use crate::render::rewrite_image_refs;
use crate::styles;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info};

const OEBPS: &str = "EPUB";

/// What the EPUB writer needs from the configuration.
#[derive(Clone)]
pub struct EpubOptions {
    pub style: StylePreset,
    /// Rasterises `<math>`; `None` keeps equations as MathML.
    pub math_renderer: Option<Arc<dyn MathRenderer>>,
    pub math_dpi: u32,
    /// Replace leftover MathML with its alt text.
    pub strip_mathml: bool,
    /// Abstract page URL recorded as `dc:source`.
    pub source_url: String,
}

impl EpubOptions {
    pub fn from_config(config: &ConversionConfig, paper_id: &str) -> Self {
        let math_renderer = if config.render_math {
            let renderer = config
                .math_renderer
                .clone()
                .unwrap_or_else(|| Arc::new(LatexRenderer::default()) as Arc<dyn MathRenderer>);
            renderer.is_available().then_some(renderer)
        } else {
            None
        };
        Self {
            style: config.style,
            math_renderer,
            math_dpi: config.math_dpi,
            strip_mathml: !config.keep_mathml,
            source_url: config.abs_url(paper_id),
        }
    }
}

/// A written EPUB with counts for the conversion stats.
#[derive(Debug)]
pub struct EpubOutput {
    pub bytes: Vec<u8>,
    pub chapters: usize,
    pub images: usize,
    pub math_images: usize,
    pub warnings: Vec<AssetError>,
}

struct Chapter {
    id: String,
    title: String,
    /// Nesting depth in the table of contents.
    level: u8,
    /// Title pages carry their own CSS instead of `style.css`.
    inline_css: Option<&'static str>,
    body: Vec<Node>,
}

impl Chapter {
    fn new(id: impl Into<String>, title: impl Into<String>, level: u8, body: Vec<Node>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            level,
            inline_css: None,
            body,
        }
    }

    fn file(&self) -> String {
        format!("{}.xhtml", self.id)
    }
}

// ── Chapter content ──────────────────────────────────────────────────────

pub(crate) fn text_el(name: &str, class: Option<&str>, text: &str) -> Node {
    let mut el = Element::new(name).with_text(text);
    if let Some(class) = class {
        el.set_attr("class", class);
    }
    Node::Element(el)
}

/// Title, authors, date and arXiv id; shared with the PDF title page.
pub(crate) fn title_page(paper: &Paper) -> Vec<Node> {
    let authors = if paper.authors.is_empty() {
        "Unknown Authors".to_string()
    } else {
        paper.authors.join(", ")
    };
    let mut body = vec![
        text_el("h1", None, &paper.title),
        text_el("p", Some("authors"), &authors),
    ];
    if let Some(date) = &paper.date {
        body.push(text_el("p", Some("date"), date));
    }
    body.push(text_el("p", Some("paper-id"), &format!("arXiv:{}", paper.id)));
    body
}

fn cover_chapter(paper: &Paper) -> Chapter {
    let mut chapter = Chapter::new("cover", "Cover", 1, title_page(paper));
    chapter.inline_css = Some(styles::cover_css());
    chapter
}

fn abstract_chapter(paper: &Paper) -> Chapter {
    let body = vec![Node::Element(
        Element::new("div")
            .with_attr("class", "abstract")
            .with_child(text_el("p", Some("abstract-title"), "Abstract"))
            .with_child(text_el("p", None, &paper.abstract_text)),
    )];
    Chapter::new("abstract", "Abstract", 1, body)
}

fn section_chapters(paper: &Paper) -> Vec<Chapter> {
    paper
        .sections
        .iter()
        .enumerate()
        .map(|(i, section)| {
            Chapter::new(
                format!("section_{i:02}"),
                section.title.clone(),
                section.level.clamp(1, 3),
                section_body(section),
            )
        })
        .collect()
}

/// `h{level}#id` heading followed by the section's blocks.
pub(crate) fn section_body(section: &Section) -> Vec<Node> {
    let level = section.level.clamp(1, 3);
    let heading = Element::new(&format!("h{level}"))
        .with_attr("id", section.id.clone())
        .with_text(section.title.clone());
    let mut body = vec![Node::Element(heading)];
    body.extend(section.blocks.iter().map(|b| b.node.clone()));
    body
}

/// Bibliography entries; consecutive `li` entries share one list.
pub(crate) fn references_body(references: &[Reference]) -> Vec<Node> {
    let mut body = vec![text_el("h1", None, "References")];
    let mut list: Option<Element> = None;
    for reference in references {
        match &reference.content {
            Node::Element(e) if e.name == "li" => list
                .get_or_insert_with(|| Element::new("ul").with_attr("class", "ltx_biblist"))
                .children
                .push(Node::Element(e.clone())),
            other => {
                if let Some(ul) = list.take() {
                    body.push(Node::Element(ul));
                }
                body.push(other.clone());
            }
        }
    }
    if let Some(ul) = list {
        body.push(Node::Element(ul));
    }
    body
}

/// `section.footnotes-section` with one `li#fn-N` per note and a `↩` back link.
pub(crate) fn notes_section(paper: &Paper) -> Node {
    let mut ol = Element::new("ol");
    for note in &paper.footnotes {
        let mut li = Element::new("li").with_attr("id", note.id.clone());
        li.children.extend(note.content.iter().cloned());
        li.children.push(Node::Text(" ".to_string()));
        li.children.push(Node::Element(
            Element::new("a")
                .with_attr("href", format!("#{}", note.ref_id()))
                .with_attr("class", "footnote-back")
                .with_text("↩"),
        ));
        ol.children.push(Node::Element(li));
    }
    Node::Element(
        Element::new("section")
            .with_attr("class", "footnotes-section")
            .with_attr("epub:type", "footnotes")
            .with_child(text_el("h1", None, "Notes"))
            .with_child(Node::Element(ol)),
    )
}

fn footnotes_chapter(paper: &Paper) -> Chapter {
    Chapter::new("footnotes", "Notes", 1, vec![notes_section(paper)])
}

// ── Anchors ──────────────────────────────────────────────────────────────

fn collect_ids(nodes: &[Node], file: &str, out: &mut HashMap<String, String>) {
    for node in nodes {
        if let Node::Element(e) = node {
            if let Some(id) = e.id() {
                out.entry(id.to_string()).or_insert_with(|| file.to_string());
            }
            collect_ids(&e.children, file, out);
        }
    }
}

/// Turn `#id` links whose target is in another chapter into `file.xhtml#id`.
fn rewrite_anchors(nodes: &mut [Node], file: &str, ids: &HashMap<String, String>) {
    dom::for_each_element_mut(nodes, &mut |e| {
        if e.name != "a" {
            return;
        }
        let target = e
            .attr("href")
            .and_then(|h| h.strip_prefix('#'))
            .and_then(|id| ids.get(id).map(|f| (f, id)))
            .filter(|(f, _)| f.as_str() != file)
            .map(|(f, id)| format!("{f}#{id}"));
        if let Some(href) = target {
            e.set_attr("href", href);
        }
    });
}

// ── Documents ────────────────────────────────────────────────────────────

fn chapter_document(chapter: &Chapter) -> String {
    let head_style = match chapter.inline_css {
        Some(css) => format!("<style>{css}</style>"),
        None => r#"<link rel="stylesheet" href="style.css" type="text/css"/>"#.to_string(),
    };
    format!(
        "{XML_DECLARATION}\n<!DOCTYPE html>\n\
<html xmlns=\"http://www.w3.org/1999/xhtml\" xmlns:epub=\"http://www.idpf.org/2007/ops\" xml:lang=\"en\" lang=\"en\">\n\
<head>\n<title>{title}</title>\n{head_style}\n</head>\n\
<body>\n{body}\n</body>\n</html>\n",
        title = escape(&chapter.title),
        body = dom::nodes_to_xhtml(&chapter.body),
    )
}

struct TocNode<'a> {
    chapter: &'a Chapter,
    children: Vec<TocNode<'a>>,
}

fn toc_tree<'a>(chapters: &'a [Chapter], pos: &mut usize, parent_level: u8) -> Vec<TocNode<'a>> {
    let mut out = Vec::new();
    while *pos < chapters.len() && chapters[*pos].level > parent_level {
        let chapter = &chapters[*pos];
        *pos += 1;
        let children = toc_tree(chapters, pos, chapter.level);
        out.push(TocNode { chapter, children });
    }
    out
}

fn toc_depth(nodes: &[TocNode<'_>]) -> usize {
    nodes
        .iter()
        .map(|n| 1 + toc_depth(&n.children))
        .max()
        .unwrap_or(0)
}

fn nav_list(nodes: &[TocNode<'_>], out: &mut String) {
    out.push_str("<ol>");
    for node in nodes {
        let _ = write!(
            out,
            "<li><a href=\"{}\">{}</a>",
            node.chapter.file(),
            escape(&node.chapter.title)
        );
        if !node.children.is_empty() {
            nav_list(&node.children, out);
        }
        out.push_str("</li>");
    }
    out.push_str("</ol>");
}

fn nav_document(tree: &[TocNode<'_>]) -> String {
    let mut list = String::new();
    nav_list(tree, &mut list);
    format!(
        "{XML_DECLARATION}\n<!DOCTYPE html>\n\
<html xmlns=\"http://www.w3.org/1999/xhtml\" xmlns:epub=\"http://www.idpf.org/2007/ops\" xml:lang=\"en\" lang=\"en\">\n\
<head>\n<title>Contents</title>\n</head>\n\
<body>\n<nav epub:type=\"toc\" id=\"toc\" role=\"doc-toc\">\n<h1>Contents</h1>\n{list}\n</nav>\n</body>\n</html>\n"
    )
}

fn ncx_points(nodes: &[TocNode<'_>], order: &mut usize, out: &mut String) {
    for node in nodes {
        *order += 1;
        let _ = write!(
            out,
            "<navPoint id=\"navPoint-{order}\" playOrder=\"{order}\"><navLabel><text>{}</text></navLabel><content src=\"{}\"/>",
            escape(&node.chapter.title),
            node.chapter.file()
        );
        ncx_points(&node.children, order, out);
        out.push_str("</navPoint>\n");
    }
}

fn ncx_document(paper: &Paper, tree: &[TocNode<'_>]) -> String {
    let mut points = String::new();
    ncx_points(tree, &mut 0, &mut points);
    format!(
        "{XML_DECLARATION}\n\
<ncx xmlns=\"http://www.daisy.org/z3986/2005/ncx/\" version=\"2005-1\">\n\
<head>\n\
<meta name=\"dtb:uid\" content=\"arxiv:{id}\"/>\n\
<meta name=\"dtb:depth\" content=\"{depth}\"/>\n\
<meta name=\"dtb:totalPageCount\" content=\"0\"/>\n\
<meta name=\"dtb:maxPageNumber\" content=\"0\"/>\n\
</head>\n\
<docTitle><text>{title}</text></docTitle>\n\
<navMap>\n{points}</navMap>\n</ncx>\n",
        id = escape(&paper.id),
        depth = toc_depth(tree).max(1),
        title = escape(&paper.title),
    )
}

struct ManifestItem {
    id: String,
    href: String,
    media_type: String,
    properties: Option<String>,
}

fn chapter_properties(body: &[Node]) -> Option<String> {
    let has = |name: &str| {
        body.iter().any(|n| match n {
            Node::Element(e) => e.name == name || e.find(|c| c.name == name).is_some(),
            Node::Text(_) => false,
        })
    };
    let props: Vec<&str> = [("math", "mathml"), ("svg", "svg")]
        .into_iter()
        .filter(|(el, _)| has(el))
        .map(|(_, prop)| prop)
        .collect();
    (!props.is_empty()).then(|| props.join(" "))
}

fn opf_document(paper: &Paper, options: &EpubOptions, manifest: &[ManifestItem], spine: &[String]) -> String {
    let mut meta = String::new();
    let _ = writeln!(meta, "<dc:identifier id=\"id\">arxiv:{}</dc:identifier>", escape(&paper.id));
    let _ = writeln!(meta, "<dc:title>{}</dc:title>", escape(&paper.title));
    meta.push_str("<dc:language>en</dc:language>\n");
    for (i, author) in paper.authors.iter().enumerate() {
        let _ = writeln!(meta, "<dc:creator id=\"creator_{i}\">{}</dc:creator>", escape(author));
    }
    if let Some(date) = &paper.date {
        let _ = writeln!(meta, "<dc:date>{}</dc:date>", escape(date));
    }
    let _ = writeln!(meta, "<dc:source>{}</dc:source>", escape(&options.source_url));
    meta.push_str("<dc:publisher>arXiv</dc:publisher>\n");
    let _ = writeln!(
        meta,
        "<meta property=\"dcterms:modified\">{}</meta>",
        chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ")
    );

    let mut items = String::new();
    for item in manifest {
        let _ = write!(
            items,
            "<item id=\"{}\" href=\"{}\" media-type=\"{}\"",
            item.id,
            escape(&item.href),
            item.media_type
        );
        if let Some(props) = &item.properties {
            let _ = write!(items, " properties=\"{props}\"");
        }
        items.push_str("/>\n");
    }

    let itemrefs: String = spine
        .iter()
        .map(|id| format!("<itemref idref=\"{id}\"/>\n"))
        .collect();

    format!(
        "{XML_DECLARATION}\n\
<package xmlns=\"http://www.idpf.org/2007/opf\" version=\"3.0\" unique-identifier=\"id\" xml:lang=\"en\">\n\
<metadata xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\n{meta}</metadata>\n\
<manifest>\n{items}</manifest>\n\
<spine toc=\"ncx\">\n{itemrefs}</spine>\n\
</package>\n"
    )
}

const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
<rootfiles>
<rootfile full-path="EPUB/content.opf" media-type="application/oebps-package+xml"/>
</rootfiles>
</container>
"#;

// ── Entry point ──────────────────────────────────────────────────────────

/// Build the EPUB for `paper`.
///
/// The package is passed through the Kindle scrub before it is returned.
pub fn render_epub(
    paper: &Paper,
    options: &EpubOptions,
    on_stage: &dyn Fn(Stage),
) -> Result<EpubOutput, ConvertError> {
    // ── Step 1: Chapters ─────────────────────────────────────────────────
    let mut chapters = vec![cover_chapter(paper)];
    if !paper.abstract_text.is_empty() {
        chapters.push(abstract_chapter(paper));
    }
    chapters.extend(section_chapters(paper));
    if !paper.references.is_empty() {
        chapters.push(Chapter::new(
            "references",
            "References",
            1,
            references_body(&paper.references),
        ));
    }
    if !paper.footnotes.is_empty() {
        chapters.push(footnotes_chapter(paper));
    }

    // ── Step 2: Images ───────────────────────────────────────────────────
    let mut image_paths: HashMap<String, String> = HashMap::new();
    let mut image_entries: Vec<(String, &str, &[u8])> = Vec::with_capacity(paper.images.len());
    for (i, img) in paper.images.iter().enumerate() {
        let path = format!("images/img_{i:04}.{}", img.extension());
        image_paths.insert(img.src.clone(), path.clone());
        image_paths.insert(img.url.clone(), path.clone());
        image_entries.push((path, img.media_type.as_str(), img.data.as_slice()));
    }
    for chapter in chapters.iter_mut() {
        rewrite_image_refs(&mut chapter.body, &image_paths);
    }

    // ── Step 3: Math ─────────────────────────────────────────────────────
    let mut cache = MathCache::new();
    let mut warnings = Vec::new();
    if let Some(renderer) = &options.math_renderer {
        on_stage(Stage::RenderingMath);
        for chapter in chapters.iter_mut() {
            warnings.extend(math::convert_math_to_images(
                &mut chapter.body,
                &mut cache,
                renderer.as_ref(),
                options.math_dpi,
            ));
        }
        debug!("Rendered {} equations ({} failed)", cache.len(), warnings.len());
    }

    // ── Step 4: Scrub and link ───────────────────────────────────────────
    on_stage(Stage::Rendering);
    for chapter in chapters.iter_mut() {
        postprocess::scrub_tree(&mut chapter.body, options.strip_mathml);
    }
    let mut ids: HashMap<String, String> = HashMap::new();
    for chapter in &chapters {
        collect_ids(&chapter.body, &chapter.file(), &mut ids);
    }
    for chapter in chapters.iter_mut() {
        let file = chapter.file();
        rewrite_anchors(&mut chapter.body, &file, &ids);
    }

    // ── Step 5: Package ──────────────────────────────────────────────────
    let mut pos = 0;
    let tree = toc_tree(&chapters, &mut pos, 0);

    let mut manifest = vec![
        ManifestItem {
            id: "nav".into(),
            href: "nav.xhtml".into(),
            media_type: "application/xhtml+xml".into(),
            properties: Some("nav".into()),
        },
        ManifestItem {
            id: "ncx".into(),
            href: "toc.ncx".into(),
            media_type: "application/x-dtbncx+xml".into(),
            properties: None,
        },
        ManifestItem {
            id: "style".into(),
            href: "style.css".into(),
            media_type: "text/css".into(),
            properties: None,
        },
    ];
    let mut spine = vec!["nav".to_string()];
    for chapter in &chapters {
        manifest.push(ManifestItem {
            id: chapter.id.clone(),
            href: chapter.file(),
            media_type: "application/xhtml+xml".into(),
            properties: chapter_properties(&chapter.body),
        });
        spine.push(chapter.id.clone());
    }
    for (i, (path, media_type, _)) in image_entries.iter().enumerate() {
        manifest.push(ManifestItem {
            id: format!("image_{i}"),
            href: path.clone(),
            media_type: media_type.to_string(),
            properties: None,
        });
    }
    let math_images = cache.images();
    for img in &math_images {
        let file = img.filename();
        manifest.push(ManifestItem {
            id: file.trim_end_matches(".png").to_string(),
            href: format!("math/{file}"),
            media_type: img.media_type.clone(),
            properties: None,
        });
    }

    let mut entries: Vec<(String, Vec<u8>)> = vec![
        ("mimetype".into(), b"application/epub+zip".to_vec()),
        ("META-INF/container.xml".into(), CONTAINER_XML.as_bytes().to_vec()),
        (
            format!("{OEBPS}/content.opf"),
            opf_document(paper, options, &manifest, &spine).into_bytes(),
        ),
        (format!("{OEBPS}/nav.xhtml"), nav_document(&tree).into_bytes()),
        (format!("{OEBPS}/toc.ncx"), ncx_document(paper, &tree).into_bytes()),
        (
            format!("{OEBPS}/style.css"),
            styles::epub_stylesheet(options.style).into_bytes(),
        ),
    ];
    for chapter in &chapters {
        entries.push((
            format!("{OEBPS}/{}", chapter.file()),
            chapter_document(chapter).into_bytes(),
        ));
    }
    for (path, _, data) in &image_entries {
        entries.push((format!("{OEBPS}/{path}"), data.to_vec()));
    }
    for img in &math_images {
        entries.push((format!("{OEBPS}/math/{}", img.filename()), img.data.clone()));
    }

    let package = postprocess::write_package(&entries)?;
    let bytes = postprocess::scrub_epub(&package)?;

    info!(
        "EPUB for {}: {} chapters, {} images, {} equations, {} bytes",
        paper.id,
        chapters.len(),
        image_entries.len(),
        math_images.len(),
        bytes.len()
    );

    Ok(EpubOutput {
        bytes,
        chapters: chapters.len(),
        images: image_entries.len(),
        math_images: math_images.len(),
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EmbeddedImage;
    use crate::pipeline::math::MathImage;
    use crate::pipeline::parse::parse_paper;
    use std::io::{Cursor, Read};
    use zip::ZipArchive;

    const HTML: &str = r##"<html><head><meta name="citation_date" content="2024-02-13"></head><body><article>
<h1 class="ltx_title ltx_title_document">A &amp; B</h1>
<span class="ltx_personname">Ada Lovelace</span>
<div class="ltx_abstract"><p>We study things.</p></div>
<section id="S1" class="ltx_section"><h2 class="ltx_title">1 Intro</h2>
<div class="ltx_para"><p>See<span class="ltx_note"><span class="ltx_note_content">A note.</span></span> <a class="ltx_ref" href="#bib.bib1">[1]</a> and <a href="#S1.SS1">below</a>.</p></div>
<figure class="ltx_figure"><img src="x1.png" alt="Refer to caption"><figcaption class="ltx_caption">Figure 1: Plot.</figcaption></figure>
<p><math alttext="x^2" display="inline"><msup><mi>x</mi><mn>2</mn></msup></math></p>
<section id="S1.SS1" class="ltx_subsection"><h3 class="ltx_title">1.1 Detail</h3><p>Deep.</p></section>
</section>
<section id="S2" class="ltx_section"><h2 class="ltx_title">2 End</h2><p>Bye <a href="#S1">up</a>.</p></section>
<section class="ltx_bibliography"><ul><li id="bib.bib1" class="ltx_bibitem"><span class="ltx_tag_bibitem">[1]</span> Ref.</li></ul></section>
</article></body></html>"##;

    struct StubRenderer;

    impl MathRenderer for StubRenderer {
        fn render(&self, latex: &str, display: bool, _dpi: u32) -> Result<MathImage, AssetError> {
            Ok(MathImage {
                latex: latex.to_string(),
                data: b"\x89PNG".to_vec(),
                media_type: "image/png".to_string(),
                display,
                depth_em: -0.2,
                width: 10,
                height: 5,
            })
        }
    }

    fn paper() -> Paper {
        let mut paper = parse_paper(HTML, "2402.08954", None);
        paper.images.push(EmbeddedImage {
            src: "x1.png".into(),
            url: "https://arxiv.org/html/2402.08954/x1.png".into(),
            media_type: "image/jpeg".into(),
            data: vec![0xFF, 0xD8, 0xFF],
        });
        paper
    }

    fn options(renderer: Option<Arc<dyn MathRenderer>>, strip_mathml: bool) -> EpubOptions {
        EpubOptions {
            style: StylePreset::Default,
            math_renderer: renderer,
            math_dpi: 150,
            strip_mathml,
            source_url: "https://arxiv.org/abs/2402.08954".into(),
        }
    }

    struct Book(ZipArchive<Cursor<Vec<u8>>>);

    impl Book {
        fn read(&mut self, name: &str) -> String {
            let mut s = String::new();
            self.0
                .by_name(name)
                .unwrap_or_else(|_| panic!("{name} missing"))
                .read_to_string(&mut s)
                .unwrap();
            s
        }

        fn names(&self) -> Vec<String> {
            self.0.file_names().map(str::to_string).collect()
        }
    }

    fn render(options: &EpubOptions) -> (EpubOutput, Book) {
        let out = render_epub(&paper(), options, &|_| {}).unwrap();
        let book = Book(ZipArchive::new(Cursor::new(out.bytes.clone())).unwrap());
        (out, book)
    }

    #[test]
    fn package_layout() {
        let (out, mut book) = render(&options(Some(Arc::new(StubRenderer)), true));
        assert_eq!(book.0.by_index(0).unwrap().name(), "mimetype");
        let names = book.names();
        for expected in [
            "META-INF/container.xml",
            "EPUB/content.opf",
            "EPUB/nav.xhtml",
            "EPUB/toc.ncx",
            "EPUB/style.css",
            "EPUB/cover.xhtml",
            "EPUB/abstract.xhtml",
            "EPUB/section_00.xhtml",
            "EPUB/section_01.xhtml",
            "EPUB/section_02.xhtml",
            "EPUB/references.xhtml",
            "EPUB/footnotes.xhtml",
            "EPUB/images/img_0000.jpg",
        ] {
            assert!(names.iter().any(|n| n == expected), "{expected} missing");
        }
        assert!(names.iter().any(|n| n.starts_with("EPUB/math/math_")));
        assert_eq!(out.chapters, 7);
        assert_eq!(out.images, 1);
        assert_eq!(out.math_images, 1);
        assert!(out.warnings.is_empty());
        assert_eq!(book.read("mimetype"), "application/epub+zip");
    }

    #[test]
    fn opf_metadata_and_spine() {
        let (_, mut book) = render(&options(None, true));
        let opf = book.read("EPUB/content.opf");
        assert!(opf.contains("<dc:identifier id=\"id\">arxiv:2402.08954</dc:identifier>"));
        assert!(opf.contains("<dc:title>A &amp; B</dc:title>"));
        assert!(opf.contains("<dc:creator id=\"creator_0\">Ada Lovelace</dc:creator>"));
        assert!(opf.contains("<dc:date>2024-02-13</dc:date>"));
        assert!(opf.contains("<dc:source>https://arxiv.org/abs/2402.08954</dc:source>"));
        assert!(opf.contains("<dc:publisher>arXiv</dc:publisher>"));
        assert!(opf.contains("property=\"dcterms:modified\""));
        assert!(opf.contains("media-type=\"image/jpeg\""));
        let spine_start = opf.find("<spine").unwrap();
        let spine = &opf[spine_start..];
        assert!(spine.find("idref=\"nav\"").unwrap() < spine.find("idref=\"cover\"").unwrap());
        assert!(spine.find("idref=\"cover\"").unwrap() < spine.find("idref=\"section_00\"").unwrap());
    }

    #[test]
    fn toc_nested_by_level() {
        let (_, mut book) = render(&options(None, true));
        let nav = book.read("EPUB/nav.xhtml");
        assert!(nav.contains(
            "<li><a href=\"section_00.xhtml\">1 Intro</a><ol><li><a href=\"section_01.xhtml\">1.1 Detail</a></li></ol></li>"
        ));
        let ncx = book.read("EPUB/toc.ncx");
        assert!(ncx.contains("<meta name=\"dtb:depth\" content=\"2\"/>"));
        assert!(ncx.contains("playOrder=\"1\""));
    }

    #[test]
    fn cross_chapter_anchors_rewritten() {
        let (_, mut book) = render(&options(None, true));
        let intro = book.read("EPUB/section_00.xhtml");
        assert!(intro.contains("href=\"footnotes.xhtml#fn-1\""));
        assert!(intro.contains("href=\"references.xhtml#bib.bib1\""));
        assert!(intro.contains("href=\"section_01.xhtml#S1.SS1\""));
        assert!(intro.contains("<h1 id=\"S1\">1 Intro</h1>"));
        let end = book.read("EPUB/section_02.xhtml");
        assert!(end.contains("href=\"section_00.xhtml#S1\""));
        let notes = book.read("EPUB/footnotes.xhtml");
        assert!(notes.contains("<li id=\"fn-1\">A note. <a href=\"section_00.xhtml#fnref-1\" class=\"footnote-back\">↩</a></li>"));
        assert!(notes.contains("epub:type=\"footnotes\""));
    }

    #[test]
    fn images_and_math_rewritten() {
        let (_, mut book) = render(&options(Some(Arc::new(StubRenderer)), true));
        let intro = book.read("EPUB/section_00.xhtml");
        assert!(intro.contains("src=\"images/img_0000.jpg\""));
        assert!(intro.contains("alt=\"Figure 1: Plot.\""));
        assert!(intro.contains("class=\"math-image math-inline\""));
        assert!(intro.contains("style=\"vertical-align: -0.20em;\""));
        assert!(!intro.contains("<math"));
        assert!(intro.starts_with(XML_DECLARATION));
    }

    #[test]
    fn mathml_stripped_to_alt_text_without_renderer() {
        let (_, mut book) = render(&options(None, true));
        let intro = book.read("EPUB/section_00.xhtml");
        assert!(!intro.contains("<math"));
        assert!(intro.contains("<p> x^2 </p>"));
    }

    #[test]
    fn mathml_kept_on_request() {
        let (_, mut book) = render(&options(None, false));
        let intro = book.read("EPUB/section_00.xhtml");
        assert!(intro.contains("<math alttext=\"x^2\""));
        let opf = book.read("EPUB/content.opf");
        assert!(opf.contains("href=\"section_00.xhtml\" media-type=\"application/xhtml+xml\" properties=\"mathml\""));
    }

    #[test]
    fn cover_and_abstract() {
        let (_, mut book) = render(&options(None, true));
        let cover = book.read("EPUB/cover.xhtml");
        assert!(cover.contains("<h1>A &amp; B</h1>"));
        assert!(cover.contains("<p class=\"authors\">Ada Lovelace</p>"));
        assert!(cover.contains("<p class=\"date\">2024-02-13</p>"));
        assert!(cover.contains("<p class=\"paper-id\">arXiv:2402.08954</p>"));
        assert!(cover.contains("<style>"));
        let abs = book.read("EPUB/abstract.xhtml");
        assert!(abs.contains("<div class=\"abstract\"><p class=\"abstract-title\">Abstract</p><p>We study things.</p></div>"));
        assert!(abs.contains("href=\"style.css\""));
    }

    #[test]
    fn minimal_paper_has_cover_only() {
        let paper = parse_paper("<html><body></body></html>", "2402.00001", None);
        let out = render_epub(&paper, &options(None, true), &|_| {}).unwrap();
        assert_eq!(out.chapters, 1);
        let mut book = Book(ZipArchive::new(Cursor::new(out.bytes)).unwrap());
        let cover = book.read("EPUB/cover.xhtml");
        assert!(cover.contains("Unknown Authors"));
        assert!(cover.contains("Untitled Paper"));
    }

    #[test]
    fn references_grouped_in_one_list() {
        let refs: Vec<Reference> = ["a", "b"]
            .iter()
            .map(|t| Reference {
                id: None,
                label: None,
                text: t.to_string(),
                content: Node::Element(Element::new("li").with_text(*t)),
            })
            .collect();
        let body = dom::nodes_to_xhtml(&references_body(&refs));
        assert_eq!(
            body,
            "<h1>References</h1><ul class=\"ltx_biblist\"><li>a</li><li>b</li></ul>"
        );
    }

    #[test]
    fn source_url_follows_configured_abs_base() {
        let config = ConversionConfig::builder()
            .render_math(false)
            .abs_base_url("https://export.arxiv.org/abs/")
            .build()
            .unwrap();
        let options = EpubOptions::from_config(&config, "hep-th/9901001");
        assert_eq!(options.source_url, "https://export.arxiv.org/abs/hep-th/9901001");
        assert!(options.math_renderer.is_none());

        let out = render_epub(&paper(), &options, &|_| {}).unwrap();
        let mut book = Book(ZipArchive::new(Cursor::new(out.bytes)).unwrap());
        assert!(book
            .read("EPUB/content.opf")
            .contains("<dc:source>https://export.arxiv.org/abs/hep-th/9901001</dc:source>"));
    }
}
