//! The parsed paper record.
//!
//! A [`Paper`] is produced once by [`crate::pipeline::parse::parse_paper`],
//! completed once by [`crate::pipeline::fetch::embed_images`] (which consumes
//! it and returns a new value), then handed by reference to exactly one
//! renderer. Nothing mutates it in between.

use crate::pipeline::dom::Node;
use serde::Serialize;

/// One arXiv paper.
#[derive(Debug, Clone, Serialize)]
pub struct Paper {
    /// Normalised arXiv identifier, e.g. `2402.08954` or `hep-th/9901001`.
    pub id: String,
    pub title: String,
    /// Author names in document order, de-duplicated.
    pub authors: Vec<String>,
    /// Plain-text abstract; empty when the page has none.
    pub abstract_text: String,
    pub date: Option<String>,
    pub sections: Vec<Section>,
    pub figures: Vec<Figure>,
    /// Extracted inline notes, numbered globally from 1.
    pub footnotes: Vec<Footnote>,
    pub references: Vec<Reference>,
    /// Base used to resolve relative URLs (`<base href>` wins over the default).
    pub base_url: String,
    /// Every image referenced by the page, in document order.
    pub image_sources: Vec<ImageSource>,
    /// Downloaded images; empty until [`crate::pipeline::fetch::embed_images`] runs.
    #[serde(skip)]
    pub images: Vec<EmbeddedImage>,
}

/// A section, subsection or subsubsection.
#[derive(Debug, Clone, Serialize)]
pub struct Section {
    pub id: String,
    pub title: String,
    /// 1 = section (and appendix), 2 = subsection, 3 = subsubsection.
    pub level: u8,
    pub blocks: Vec<Block>,
}

/// One top-level content element of a section.
#[derive(Debug, Clone, Serialize)]
pub struct Block {
    pub kind: BlockKind,
    /// Processed content, serialised as XHTML in JSON output.
    #[serde(rename = "html")]
    pub node: Node,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Text,
    Math,
    Figure,
    Table,
    Code,
}

#[derive(Debug, Clone, Serialize)]
pub struct Figure {
    pub id: String,
    pub caption: String,
    /// Absolute URL of the figure's first image.
    pub image_url: Option<String>,
    /// Filled in by image embedding when `image_url` was downloaded.
    #[serde(skip)]
    pub image: Option<EmbeddedImage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Footnote {
    /// `fn-{index}`
    pub id: String,
    /// 1-based, global across the paper.
    pub index: usize,
    /// Id of the section the note was found in.
    pub section_id: String,
    pub content: Vec<Node>,
}

impl Footnote {
    /// Id of the in-text reference link pointing at this note.
    pub fn ref_id(&self) -> String {
        format!("fnref-{}", self.index)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Reference {
    /// Anchor id of the bibliography entry, e.g. `bib.bib12`.
    pub id: Option<String>,
    /// Visible tag, e.g. `[12]` or `Vaswani et al. (2017)`.
    pub label: Option<String>,
    /// Whitespace-normalised plain text.
    pub text: String,
    pub content: Node,
}

/// An image reference found in the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageSource {
    /// The attribute value as written in the HTML.
    pub src: String,
    /// `src` resolved against the paper's base URL.
    pub url: String,
}

/// A downloaded image.
#[derive(Clone, Serialize)]
pub struct EmbeddedImage {
    pub src: String,
    pub url: String,
    pub media_type: String,
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl std::fmt::Debug for EmbeddedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedImage")
            .field("src", &self.src)
            .field("url", &self.url)
            .field("media_type", &self.media_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl EmbeddedImage {
    /// File extension for the media type (`jpeg` → `jpg`, `svg+xml` → `svg`).
    pub fn extension(&self) -> &str {
        extension_for(&self.media_type)
    }
}

/// File extension for an image media type.
pub fn extension_for(media_type: &str) -> &str {
    match media_type.rsplit('/').next().unwrap_or("png") {
        "jpeg" => "jpg",
        "svg+xml" => "svg",
        "" => "png",
        other => other,
    }
}

impl Paper {
    /// The downloaded image for an `src` as written in the HTML, if any.
    pub fn image_for(&self, src: &str) -> Option<&EmbeddedImage> {
        self.images.iter().find(|img| img.src == src || img.url == src)
    }

    /// Number of content blocks across all sections.
    pub fn block_count(&self) -> usize {
        self.sections.iter().map(|s| s.blocks.len()).sum()
    }

    /// `/` is not allowed in file names.
    pub fn file_stem(&self) -> String {
        self.id.replace('/', "_")
    }
}
