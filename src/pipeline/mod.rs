//! Pipeline stages for arXiv-HTML-to-e-book conversion.
//!
//! Each submodule implements exactly one transformation step. The renderers
//! in [`crate::render`] consume the [`crate::model::Paper`] these stages
//! produce.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ fetch ──▶ parse ──▶ fetch::embed_images ──▶ math ──▶ postprocess
//! (ID/URL)  (HTTP)    (DOM)     (HTTP, concurrent)      (PNG)    (scrub)
//! ```
//!
//! 1. [`fetch`]: normalise the arXiv ID and download the HTML rendition, or
//!    read a local file; later download the paper's images
//! 2. [`parse`]: LaTeXML DOM → metadata, sections, footnotes, references
//! 3. [`math`] : rasterise `<math>` to PNG for readers without MathML;
//!    runs inside the blocking render step
//! 4. [`postprocess`]: deterministic Kindle-compatibility rules on the
//!    chapter trees and the finished package
//!
//! [`dom`] is the owned HTML tree the other stages share.

pub mod dom;
pub mod fetch;
pub mod math;
pub mod parse;
pub mod postprocess;
