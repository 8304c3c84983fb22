//! LaTeXML HTML → [`Paper`].
//!
//! arXiv renders papers with LaTeXML, whose output tags every structural
//! element with an `ltx_*` class. The parser walks the DOM once for
//! metadata, once per section for content, and rewrites each section's
//! content for e-readers:
//!
//! 0. replace "Refer to caption" alt text with the figure caption
//! 1. wrap tables in `div.table-wrapper`
//! 2. lift `.ltx_note` footnotes out into [`Footnote`]s, leaving a link
//! 3. tag listings `code-block`, theorem environments `theorem-like`,
//!    equations `math-block`, inline math `math-inline`, citations `citation`
//! 4. turn absolute `arxiv.org/html/…#frag` cross-references into `#frag`
//!
//! Pages that are not LaTeXML still produce a paper: the main content
//! container becomes a single section.

use crate::model::{Block, BlockKind, Figure, Footnote, ImageSource, Paper, Reference, Section};
use crate::pipeline::dom::{self, clean_text, Element, Node, Rewrite};
use crate::pipeline::fetch::resolve_url;
use std::collections::HashSet;
use tracing::debug;

const SECTION_CLASSES: &[&str] = &[
    "ltx_section",
    "ltx_appendix",
    "ltx_subsection",
    "ltx_subsubsection",
];

const THEOREM_CLASSES: &[&str] = &[
    "ltx_theorem",
    "ltx_proof",
    "ltx_lemma",
    "ltx_definition",
    "ltx_corollary",
    "ltx_proposition",
    "ltx_remark",
    "ltx_example",
];

/// Front matter and page chrome removed when the whole page becomes one section.
const FALLBACK_SKIP_CLASSES: &[&str] = &[
    "ltx_title_document",
    "ltx_authors",
    "ltx_abstract",
    "ltx_bibliography",
    "ltx_page_header",
    "ltx_page_footer",
];

const MAX_AUTHOR_LEN: usize = 100;
const MAX_ALT_LEN: usize = 100;

/// Parse arXiv HTML into a [`Paper`].
///
/// `base_url` defaults to `https://arxiv.org/html/{paper_id}/`; a `<base href>`
/// in the document is resolved against it and takes precedence.
pub fn parse_paper(html: &str, paper_id: &str, base_url: Option<&str>) -> Paper {
    let root = dom::parse_html(html);

    let default_base = base_url
        .map(str::to_string)
        .unwrap_or_else(|| format!("https://arxiv.org/html/{paper_id}/"));
    let base_url = root
        .find(|e| e.name == "base")
        .and_then(|b| b.attr("href"))
        .filter(|h| !h.trim().is_empty())
        .map(|h| resolve_url(&default_base, h.trim()))
        .unwrap_or(default_base);

    let figures = extract_figures(&root, &base_url);
    let image_sources = extract_image_sources(&root, &base_url);
    let (sections, footnotes) = extract_sections(&root);
    let references = extract_references(&root);

    let paper = Paper {
        id: paper_id.to_string(),
        title: extract_title(&root),
        authors: extract_authors(&root),
        abstract_text: extract_abstract(&root),
        date: extract_date(&root),
        sections,
        figures,
        footnotes,
        references,
        base_url,
        image_sources,
        images: Vec::new(),
    };

    debug!(
        "Parsed {}: {} sections, {} blocks, {} figures, {} footnotes, {} references, {} images",
        paper.id,
        paper.sections.len(),
        paper.block_count(),
        paper.figures.len(),
        paper.footnotes.len(),
        paper.references.len(),
        paper.image_sources.len()
    );
    paper
}

// ── Metadata ─────────────────────────────────────────────────────────────

fn meta_content<'a>(root: &'a Element, name: &str) -> Vec<&'a str> {
    root.find_all(|e| e.name == "meta" && e.attr("name") == Some(name))
        .into_iter()
        .filter_map(|m| m.attr("content"))
        .collect()
}

fn extract_title(root: &Element) -> String {
    root.find(|e| e.has_class("ltx_title") && e.has_class("ltx_title_document"))
        .or_else(|| root.find(|e| e.name == "h1"))
        .or_else(|| root.find(|e| e.name == "title"))
        .map(|e| clean_text(&e.text()))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Untitled Paper".to_string())
}

fn extract_authors(root: &Element) -> Vec<String> {
    let person_names = root.find_all(|e| e.has_class("ltx_personname"));
    if person_names.is_empty() {
        return meta_content(root, "citation_author")
            .into_iter()
            .map(clean_text)
            .filter(|a| !a.is_empty())
            .collect();
    }

    let mut authors: Vec<String> = Vec::new();
    for person in person_names {
        let mut parts: Vec<String> = Vec::new();
        for child in &person.children {
            match child {
                Node::Text(t) => {
                    let t = t.trim();
                    if !t.is_empty() && !t.contains('@') {
                        parts.push(clean_text(t));
                    }
                }
                // Affiliation markers and line breaks are not part of the name.
                Node::Element(e) if matches!(e.name.as_str(), "br" | "sup") => {}
                Node::Element(e) => {
                    let t = e.text();
                    if !t.contains('@') {
                        let t = clean_text(&t);
                        if !t.is_empty() {
                            parts.push(t);
                        }
                    }
                }
            }
        }

        let mut name = parts.join(" ");
        if name.is_empty() {
            let full = clean_text(&person.text());
            name = match full.split_once('@') {
                Some((before, _)) => before
                    .rsplit_once(' ')
                    .map(|(name, _)| name)
                    .unwrap_or(before)
                    .trim()
                    .to_string(),
                None => full,
            };
        }

        if !name.is_empty() && name.chars().count() < MAX_AUTHOR_LEN && !authors.contains(&name) {
            authors.push(name);
        }
    }
    authors
}

fn extract_abstract(root: &Element) -> String {
    if let Some(abs) = root.find(|e| e.has_class("ltx_abstract")) {
        let paragraphs = abs.find_all(|e| e.name == "p");
        if !paragraphs.is_empty() {
            return paragraphs
                .iter()
                .map(|p| clean_text(&p.text()))
                .collect::<Vec<_>>()
                .join(" ");
        }
        return clean_text(&abs.text());
    }
    meta_content(root, "description")
        .first()
        .map(|d| clean_text(d))
        .unwrap_or_default()
}

fn extract_date(root: &Element) -> Option<String> {
    if let Some(date) = meta_content(root, "citation_date").first() {
        return Some(date.trim().to_string());
    }
    root.find(|e| e.has_class("ltx_date"))
        .map(|e| clean_text(&e.text()))
        .filter(|d| !d.is_empty())
}

// ── Sections ─────────────────────────────────────────────────────────────

fn section_level(el: &Element) -> u8 {
    if el.has_any_class(&["ltx_section", "ltx_appendix"]) {
        1
    } else if el.has_class("ltx_subsection") {
        2
    } else {
        3
    }
}

fn extract_sections(root: &Element) -> (Vec<Section>, Vec<Footnote>) {
    let mut sections = Vec::new();
    let mut footnotes = Vec::new();
    let mut counter = 0usize;

    for (i, el) in root
        .find_all(|e| e.has_any_class(SECTION_CLASSES))
        .into_iter()
        .enumerate()
    {
        let id = el
            .id()
            .map(str::to_string)
            .unwrap_or_else(|| format!("section-{i}"));
        let title = el
            .child_elements()
            .find(|c| c.has_class("ltx_title"))
            .or_else(|| el.find(|c| c.has_class("ltx_title")))
            .map(|t| clean_text(&t.text()))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| format!("Section {}", i + 1));

        let mut container = Element::new("div");
        container.children = el
            .child_elements()
            .filter(|c| !c.has_class("ltx_title") && !c.has_any_class(SECTION_CLASSES))
            .cloned()
            .map(Node::Element)
            .collect();

        footnotes.extend(process_content(&mut container, &mut counter, &id));
        sections.push(Section {
            level: section_level(el),
            blocks: into_blocks(container),
            id,
            title,
        });
    }

    if sections.is_empty() {
        let main = root.find(|e| {
            e.has_any_class(&["ltx_page_main", "ltx_page_content", "content"])
                || e.name == "article"
                || e.name == "main"
        });
        if let Some(main) = main {
            let mut container = Element::new("div");
            container.children = main.child_elements().cloned().map(Node::Element).collect();
            dom::rewrite_elements(&mut container.children, &mut |e| {
                if e.has_any_class(FALLBACK_SKIP_CLASSES) {
                    Rewrite::Remove
                } else {
                    Rewrite::Keep
                }
            });
            let id = "main-content".to_string();
            footnotes.extend(process_content(&mut container, &mut counter, &id));
            sections.push(Section {
                id,
                title: "Content".to_string(),
                level: 1,
                blocks: into_blocks(container),
            });
        }
    }

    (sections, footnotes)
}

/// Apply the e-reader rewrites to one section's content, returning its footnotes.
fn process_content(container: &mut Element, counter: &mut usize, section_id: &str) -> Vec<Footnote> {
    fix_alt_text(&mut container.children, None);
    wrap_tables(container);
    let footnotes = extract_footnotes(&mut container.children, counter, section_id);

    dom::for_each_element_mut(&mut container.children, &mut |e| {
        if e.has_any_class(&["ltx_listing", "ltx_verbatim"]) {
            e.add_class("code-block");
        }
        if e.has_any_class(THEOREM_CLASSES) {
            e.add_class("theorem-like");
        }
        if e.has_any_class(&["ltx_equation", "ltx_equationgroup"]) {
            e.add_class("math-block");
        }
        if e.has_class("ltx_Math") {
            e.add_class("math-inline");
        }
        if e.has_class("ltx_cite") {
            e.add_class("citation");
        }
        if e.has_class("ltx_ref") {
            rewrite_ref(e);
        }
    });

    footnotes
}

/// `figure` is `None` outside a `<figure>`, `Some(caption)` inside one.
fn fix_alt_text(nodes: &mut [Node], figure: Option<Option<&str>>) {
    for node in nodes.iter_mut() {
        let Node::Element(e) = node else { continue };
        if e.name == "figure" {
            let caption = e
                .find(|c| c.has_class("ltx_caption") || c.name == "figcaption")
                .map(|c| clean_text(&c.text()));
            fix_alt_text(&mut e.children, Some(caption.as_deref()));
            continue;
        }
        if e.name == "img" {
            let placeholder = e
                .attr("alt")
                .map(|a| {
                    let a = a.trim().to_ascii_lowercase();
                    a == "refer to caption" || a == "refer to caption."
                })
                .unwrap_or(false);
            if placeholder {
                let alt = match figure {
                    Some(Some(caption)) => caption.chars().take(MAX_ALT_LEN).collect(),
                    Some(None) => "Figure".to_string(),
                    None => "Image".to_string(),
                };
                e.set_attr("alt", alt);
            }
        }
        fix_alt_text(&mut e.children, figure);
    }
}

fn is_table(el: &Element) -> bool {
    el.name == "table" || el.has_any_class(&["ltx_tabular", "ltx_table"])
}

fn wrap_tables(parent: &mut Element) {
    let parent_is_wrapper = parent.has_class("table-wrapper");
    for child in parent.children.iter_mut() {
        let wrap = match child {
            Node::Element(e) => {
                wrap_tables(e);
                is_table(e) && !parent_is_wrapper
            }
            Node::Text(_) => false,
        };
        if wrap {
            let table = std::mem::replace(child, Node::Text(String::new()));
            *child = Node::Element(
                Element::new("div")
                    .with_attr("class", "table-wrapper")
                    .with_child(table),
            );
        }
    }
}

fn extract_footnotes(nodes: &mut Vec<Node>, counter: &mut usize, section_id: &str) -> Vec<Footnote> {
    let mut footnotes = Vec::new();
    dom::rewrite_elements(nodes, &mut |e| {
        if !e.has_class("ltx_note") {
            return Rewrite::Keep;
        }
        *counter += 1;
        let index = *counter;

        let mut content = e
            .find(|c| c.has_class("ltx_note_content"))
            .map(|c| c.children.clone())
            .unwrap_or_else(|| e.children.clone());
        dom::rewrite_elements(&mut content, &mut |c| {
            if c.has_any_class(&["ltx_note_mark", "ltx_tag_note"]) {
                Rewrite::Remove
            } else {
                Rewrite::Keep
            }
        });
        trim_nodes(&mut content);

        footnotes.push(Footnote {
            id: format!("fn-{index}"),
            index,
            section_id: section_id.to_string(),
            content,
        });
        Rewrite::Replace(vec![footnote_link(index)])
    });
    footnotes
}

/// `<a href="#fn-N" id="fnref-N" class="footnote-ref" epub:type="noteref" role="doc-noteref"><sup>N</sup></a>`
pub fn footnote_link(index: usize) -> Node {
    Node::Element(
        Element::new("a")
            .with_attr("href", format!("#fn-{index}"))
            .with_attr("id", format!("fnref-{index}"))
            .with_attr("class", "footnote-ref")
            .with_attr("epub:type", "noteref")
            .with_attr("role", "doc-noteref")
            .with_child(Node::Element(Element::new("sup").with_text(index.to_string()))),
    )
}

fn trim_nodes(nodes: &mut Vec<Node>) {
    while matches!(nodes.first(), Some(Node::Text(t)) if t.trim().is_empty()) {
        nodes.remove(0);
    }
    while matches!(nodes.last(), Some(Node::Text(t)) if t.trim().is_empty()) {
        nodes.pop();
    }
}

/// `https://arxiv.org/html/ID#S2` → `#S2`
fn rewrite_ref(el: &mut Element) {
    let Some(href) = el.attr("href") else { return };
    if href.contains("arxiv.org/html/") {
        if let Some((_, fragment)) = href.rsplit_once('#') {
            let local = format!("#{fragment}");
            el.set_attr("href", local);
        }
    }
}

/// LaTeX source of a `<math>` element: `alttext`, else its TeX annotation.
pub fn extract_latex(math: &Element) -> Option<String> {
    math.attr("alttext")
        .map(str::to_string)
        .or_else(|| {
            math.find(|e| {
                e.name == "annotation" && e.attr("encoding") == Some("application/x-tex")
            })
            .map(|a| a.text())
        })
        .filter(|l| !l.trim().is_empty())
}

// ── Blocks ───────────────────────────────────────────────────────────────

fn is_math(el: &Element) -> bool {
    el.has_any_class(&["ltx_equation", "ltx_equationgroup", "math-block"])
        || (el.name == "math" && el.attr("display") == Some("block"))
}

/// Kind of a top-level content element.
pub fn classify(el: &Element) -> BlockKind {
    if el.has_class("ltx_para") {
        let only_whitespace_text = el
            .children
            .iter()
            .all(|n| !matches!(n, Node::Text(t) if !t.trim().is_empty()));
        let mut kids = el.child_elements();
        if let (Some(only), None) = (kids.next(), kids.next()) {
            if only_whitespace_text {
                return classify(only);
            }
        }
    }
    if el.has_class("table-wrapper") {
        return match el.child_elements().next() {
            Some(inner) if is_math(inner) => BlockKind::Math,
            _ => BlockKind::Table,
        };
    }
    if is_math(el) {
        BlockKind::Math
    } else if is_table(el) {
        BlockKind::Table
    } else if el.name == "figure" || el.has_class("ltx_figure") {
        BlockKind::Figure
    } else if el.name == "pre" || el.has_any_class(&["ltx_listing", "ltx_verbatim", "code-block"]) {
        BlockKind::Code
    } else {
        BlockKind::Text
    }
}

fn into_blocks(container: Element) -> Vec<Block> {
    container
        .children
        .into_iter()
        .filter_map(|n| match n {
            Node::Element(e) => Some(Block {
                kind: classify(&e),
                node: Node::Element(e),
            }),
            Node::Text(_) => None,
        })
        .collect()
}

// ── Figures, images, references ──────────────────────────────────────────

fn extract_figures(root: &Element, base_url: &str) -> Vec<Figure> {
    root.find_all(|e| e.has_class("ltx_figure") || e.name == "figure")
        .into_iter()
        .enumerate()
        .map(|(i, el)| Figure {
            id: el
                .id()
                .map(str::to_string)
                .unwrap_or_else(|| format!("figure-{i}")),
            caption: el
                .find(|c| c.has_class("ltx_caption") || c.name == "figcaption")
                .map(|c| clean_text(&c.text()))
                .unwrap_or_default(),
            image_url: el
                .find(|c| c.name == "img")
                .and_then(|img| img.attr("src"))
                .filter(|src| !src.is_empty())
                .map(|src| resolve_url(base_url, src)),
            image: None,
        })
        .collect()
}

fn is_external_image(src: &str) -> bool {
    !src.is_empty() && !src.starts_with('#') && !src.starts_with("data:")
}

fn extract_image_sources(root: &Element, base_url: &str) -> Vec<ImageSource> {
    let mut seen = HashSet::new();
    let mut sources = Vec::new();
    let candidates = root.find_all(|e| matches!(e.name.as_str(), "img" | "use" | "image"));
    for el in candidates {
        let src = match el.name.as_str() {
            "img" => el.attr("src"),
            _ => el.attr("href").or_else(|| el.attr("xlink:href")),
        };
        let Some(src) = src.map(str::trim) else { continue };
        if is_external_image(src) && seen.insert(src.to_string()) {
            sources.push(ImageSource {
                src: src.to_string(),
                url: resolve_url(base_url, src),
            });
        }
    }
    sources
}

fn extract_references(root: &Element) -> Vec<Reference> {
    let Some(refs) = root.find(|e| {
        e.has_any_class(&["ltx_bibliography", "references"]) || e.id() == Some("references")
    }) else {
        return Vec::new();
    };

    let mut entries: Vec<&Element> = refs.find_all(|e| e.has_class("ltx_bibitem"));
    if entries.is_empty() {
        entries = refs.find_all(|e| e.name == "li");
    }
    if entries.is_empty() {
        entries = vec![refs];
    }

    entries
        .into_iter()
        .map(|entry| {
            let mut content = entry.clone();
            dom::for_each_element_mut(&mut content.children, &mut |e| {
                if e.has_class("ltx_ref") {
                    rewrite_ref(e);
                }
            });
            Reference {
                id: entry.id().map(str::to_string),
                label: entry
                    .find(|c| c.has_class("ltx_tag_bibitem"))
                    .map(|t| clean_text(&t.text()))
                    .filter(|t| !t.is_empty()),
                text: clean_text(&entry.text()),
                content: Node::Element(content),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAPER: &str = r##"<!DOCTYPE html>
<html><head>
<title>Fallback Title</title>
<meta name="citation_date" content="2024-02-13">
</head><body>
<div class="ltx_page_main"><div class="ltx_page_content"><article class="ltx_document">
<h1 class="ltx_title ltx_title_document">Attention   Is
  All You Need</h1>
<div class="ltx_authors">
  <span class="ltx_creator ltx_role_author"><span class="ltx_personname">Ashish Vaswani<sup>1</sup><br class="ltx_break"><span class="ltx_text">avaswani@google.com</span></span></span>
  <span class="ltx_creator ltx_role_author"><span class="ltx_personname">Noam Shazeer</span></span>
  <span class="ltx_creator ltx_role_author"><span class="ltx_personname">Noam Shazeer</span></span>
</div>
<div class="ltx_abstract"><h6 class="ltx_title ltx_title_abstract">Abstract</h6>
<p class="ltx_p">The dominant models   are recurrent.</p>
<p class="ltx_p">We propose the Transformer.</p></div>
<section id="S1" class="ltx_section">
<h2 class="ltx_title ltx_title_section"><span class="ltx_tag">1 </span>Introduction</h2>
<div id="S1.p1" class="ltx_para"><p class="ltx_p">Recurrent models<span class="ltx_note ltx_role_footnote" id="footnote1"><sup class="ltx_note_mark">1</sup><span class="ltx_note_outer"><span class="ltx_note_content"><sup class="ltx_note_mark">1</sup><span class="ltx_tag ltx_tag_note">1</span>Equal contribution.</span></span></span> see <cite class="ltx_cite"><a class="ltx_ref" href="https://arxiv.org/html/1706.03762v7#bib.bib1">[1]</a></cite> and <math class="ltx_Math" alttext="x^2" display="inline"><msup><mi>x</mi><mn>2</mn></msup></math>.</p></div>
<figure id="S1.F1" class="ltx_figure"><img src="x1.png" alt="Refer to caption"><figcaption class="ltx_caption">Figure 1: The Transformer model architecture.</figcaption></figure>
<div class="ltx_para"><table class="ltx_equation ltx_eqn_table"><tr><td><math alttext="a=b" display="block"><mi>a</mi></math></td></tr></table></div>
<section id="S1.SS1" class="ltx_subsection">
<h3 class="ltx_title">1.1 Background</h3>
<div class="ltx_para"><p>Second note<span class="ltx_note"><span class="ltx_note_content">Another.</span></span>.</p></div>
<div class="ltx_listing"><div class="ltx_listingline">print(1)</div></div>
<div class="ltx_theorem ltx_theorem_theorem"><p>Theorem.</p></div>
<figure class="ltx_table"><table class="ltx_tabular"><tr><td>1</td></tr></table></figure>
<img src="data:image/png;base64,AAAA" alt="inline">
<svg><use href="#glyph"></use><image xlink:href="plots/p.svg"></image></svg>
</section>
</section>
<section id="A1" class="ltx_appendix"><h2 class="ltx_title">Appendix A</h2><p>Extra <img src="x1.png" alt="Refer to caption."></p></section>
<section id="bib" class="ltx_bibliography"><h2 class="ltx_title">References</h2>
<ul class="ltx_biblist">
<li id="bib.bib1" class="ltx_bibitem"><span class="ltx_tag ltx_tag_bibitem">[1]</span> D. Bahdanau. <a class="ltx_ref" href="https://arxiv.org/html/1706.03762v7#S1">Neural machine translation</a>.</li>
<li id="bib.bib2" class="ltx_bibitem"><span class="ltx_tag ltx_tag_bibitem">[2]</span> J. Ba. Layer normalization.</li>
</ul></section>
</article></div></div>
</body></html>"##;

    fn paper() -> Paper {
        parse_paper(PAPER, "1706.03762", None)
    }

    #[test]
    fn metadata() {
        let p = paper();
        assert_eq!(p.id, "1706.03762");
        assert_eq!(p.title, "Attention Is All You Need");
        assert_eq!(p.authors, vec!["Ashish Vaswani", "Noam Shazeer"]);
        assert_eq!(
            p.abstract_text,
            "The dominant models are recurrent. We propose the Transformer."
        );
        assert_eq!(p.date.as_deref(), Some("2024-02-13"));
        assert_eq!(p.base_url, "https://arxiv.org/html/1706.03762/");
    }

    #[test]
    fn sections_in_document_order_with_levels() {
        let p = paper();
        let summary: Vec<(&str, &str, u8)> = p
            .sections
            .iter()
            .map(|s| (s.id.as_str(), s.title.as_str(), s.level))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("S1", "1 Introduction", 1),
                ("S1.SS1", "1.1 Background", 2),
                ("A1", "Appendix A", 1),
            ]
        );
    }

    #[test]
    fn nested_sections_are_not_duplicated() {
        let p = paper();
        let intro = &p.sections[0];
        assert!(intro
            .blocks
            .iter()
            .all(|b| !b.node.to_xhtml().contains("Background")));
    }

    #[test]
    fn block_kinds() {
        let p = paper();
        let kinds: Vec<BlockKind> = p.sections[0].blocks.iter().map(|b| b.kind).collect();
        assert_eq!(kinds, vec![BlockKind::Text, BlockKind::Figure, BlockKind::Math]);
        let kinds: Vec<BlockKind> = p.sections[1].blocks.iter().map(|b| b.kind).collect();
        assert_eq!(
            kinds,
            vec![
                BlockKind::Text,
                BlockKind::Code,
                BlockKind::Text,
                BlockKind::Table,
                BlockKind::Text,
                BlockKind::Text,
            ]
        );
    }

    #[test]
    fn footnotes_numbered_globally_and_linked() {
        let p = paper();
        assert_eq!(p.footnotes.len(), 2);
        assert_eq!(p.footnotes[0].id, "fn-1");
        assert_eq!(p.footnotes[0].section_id, "S1");
        assert_eq!(dom::nodes_to_xhtml(&p.footnotes[0].content), "Equal contribution.");
        assert_eq!(p.footnotes[1].index, 2);
        assert_eq!(p.footnotes[1].section_id, "S1.SS1");

        let intro = p.sections[0].blocks[0].node.to_xhtml();
        assert!(intro.contains(
            "<a href=\"#fn-1\" id=\"fnref-1\" class=\"footnote-ref\" epub:type=\"noteref\" role=\"doc-noteref\"><sup>1</sup></a>"
        ));
        assert!(!intro.contains("ltx_note"));
    }

    #[test]
    fn classes_added_once() {
        let p = paper();
        let intro = p.sections[0].blocks[0].node.to_xhtml();
        assert!(intro.contains("class=\"ltx_cite citation\""));
        assert!(intro.contains("class=\"ltx_Math math-inline\""));
        let eq = p.sections[0].blocks[2].node.to_xhtml();
        assert!(eq.contains("ltx_equation ltx_eqn_table math-block"));

        let bg: String = p.sections[1].blocks.iter().map(|b| b.node.to_xhtml()).collect();
        assert!(bg.contains("class=\"ltx_listing code-block\""));
        assert!(bg.contains("class=\"ltx_theorem ltx_theorem_theorem theorem-like\""));
        assert_eq!(bg.matches("theorem-like").count(), 1);
    }

    #[test]
    fn cross_references_become_local() {
        let p = paper();
        let intro = p.sections[0].blocks[0].node.to_xhtml();
        assert!(intro.contains("href=\"#bib.bib1\""));
        assert!(p.references[0].content.to_xhtml().contains("href=\"#S1\""));
    }

    #[test]
    fn tables_wrapped_once() {
        let p = paper();
        let table = p.sections[1].blocks[3].node.to_xhtml();
        assert!(table.starts_with("<div class=\"table-wrapper\"><figure class=\"ltx_table\">"));
        assert_eq!(table.matches("table-wrapper").count(), 2);
    }

    #[test]
    fn alt_text_fixed() {
        let p = paper();
        let fig = p.sections[0].blocks[1].node.to_xhtml();
        assert!(fig.contains("alt=\"Figure 1: The Transformer model architecture.\""));
        let appendix: String = p.sections[2].blocks.iter().map(|b| b.node.to_xhtml()).collect();
        assert!(appendix.contains("alt=\"Image\""));
    }

    #[test]
    fn figures_resolved_against_base() {
        let p = paper();
        assert_eq!(p.figures.len(), 2);
        assert_eq!(p.figures[0].id, "S1.F1");
        assert_eq!(p.figures[0].caption, "Figure 1: The Transformer model architecture.");
        assert_eq!(
            p.figures[0].image_url.as_deref(),
            Some("https://arxiv.org/html/1706.03762/x1.png")
        );
        assert_eq!(p.figures[1].id, "figure-1");
        assert_eq!(p.figures[1].image_url, None);
    }

    #[test]
    fn image_sources_deduplicated_and_filtered() {
        let p = paper();
        let srcs: Vec<&str> = p.image_sources.iter().map(|s| s.src.as_str()).collect();
        assert_eq!(srcs, vec!["x1.png", "plots/p.svg"]);
        assert_eq!(
            p.image_sources[1].url,
            "https://arxiv.org/html/1706.03762/plots/p.svg"
        );
    }

    #[test]
    fn references() {
        let p = paper();
        assert_eq!(p.references.len(), 2);
        assert_eq!(p.references[0].id.as_deref(), Some("bib.bib1"));
        assert_eq!(p.references[0].label.as_deref(), Some("[1]"));
        assert_eq!(p.references[1].text, "[2] J. Ba. Layer normalization.");
    }

    #[test]
    fn base_tag_overrides_default() {
        let html = r#"<html><head><base href="/html/2402.08954v2/"></head><body><img src="x1.png"></body></html>"#;
        let p = parse_paper(html, "2402.08954", None);
        assert_eq!(p.base_url, "https://arxiv.org/html/2402.08954v2/");
        assert_eq!(p.image_sources[0].url, "https://arxiv.org/html/2402.08954v2/x1.png");
    }

    #[test]
    fn fallbacks_for_plain_html() {
        let html = r#"<html><head><title>  Plain   Page </title>
<meta name="citation_author" content="Ada Lovelace">
<meta name="citation_author" content="Charles Babbage">
<meta name="description" content="About engines.">
</head><body><main><p>Body text.</p><table><tr><td>1</td></tr></table></main></body></html>"#;
        let p = parse_paper(html, "2402.00001", None);
        assert_eq!(p.title, "Plain Page");
        assert_eq!(p.authors, vec!["Ada Lovelace", "Charles Babbage"]);
        assert_eq!(p.abstract_text, "About engines.");
        assert_eq!(p.date, None);
        assert_eq!(p.sections.len(), 1);
        assert_eq!(p.sections[0].id, "main-content");
        assert_eq!(p.sections[0].title, "Content");
        let kinds: Vec<BlockKind> = p.sections[0].blocks.iter().map(|b| b.kind).collect();
        assert_eq!(kinds, vec![BlockKind::Text, BlockKind::Table]);
    }

    #[test]
    fn empty_document() {
        let p = parse_paper("", "2402.00002", None);
        assert_eq!(p.title, "Untitled Paper");
        assert!(p.authors.is_empty());
        assert!(p.abstract_text.is_empty());
        assert!(p.sections.is_empty());
        assert!(p.references.is_empty());
    }

    #[test]
    fn untitled_sections_get_numbered_titles() {
        let html = r#"<html><body><section class="ltx_section"><p>a</p></section><section class="ltx_section"><p>b</p></section></body></html>"#;
        let p = parse_paper(html, "2402.00003", None);
        assert_eq!(p.sections[0].id, "section-0");
        assert_eq!(p.sections[1].title, "Section 2");
    }

    #[test]
    fn latex_from_alttext_or_annotation() {
        let nodes = dom::parse_fragment(
            r#"<math alttext="E=mc^2"><mi>E</mi></math><math><semantics><mi>x</mi><annotation encoding="application/x-tex">\alpha</annotation></semantics></math><math><mi>y</mi></math>"#,
        );
        let maths: Vec<&Element> = nodes.iter().filter_map(Node::as_element).collect();
        assert_eq!(extract_latex(maths[0]).as_deref(), Some("E=mc^2"));
        assert_eq!(extract_latex(maths[1]).as_deref(), Some("\\alpha"));
        assert_eq!(extract_latex(maths[2]), None);
    }

    #[test]
    fn author_email_only_text_falls_back() {
        let html = r#"<html><body><span class="ltx_personname">Jane Roe jroe@example.org</span></body></html>"#;
        let p = parse_paper(html, "2402.00004", None);
        assert_eq!(p.authors, vec!["Jane Roe"]);
    }
}
