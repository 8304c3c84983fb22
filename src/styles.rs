//! Stylesheets for EPUB and PDF output.
//!
//! EPUB readers apply their own font and margin settings on top of ours, so
//! the EPUB stylesheet only sets relative sizes. PDF output is laid out once
//! by the browser for a fixed page, so [`pdf_stylesheet`] works in points
//! sized to a [`ScreenPreset`].

use crate::config::StylePreset;
use serde::{Deserialize, Serialize};

/// Page geometry of a target device or paper size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenPreset {
    pub name: String,
    pub description: String,
    pub width_mm: f32,
    pub height_mm: f32,
    pub margin_mm: f32,
    pub base_font_pt: f32,
}

/// (name, description, width mm, height mm, margin mm, base font pt)
const SCREEN_PRESETS: &[(&str, &str, f32, f32, f32, f32)] = &[
    ("kindle", "Kindle / Kindle Basic 6\"", 91.4, 121.9, 4.0, 10.0),
    ("kindle-paperwhite", "Kindle Paperwhite 6.8\"", 103.6, 138.2, 5.0, 10.0),
    ("kindle-scribe", "Kindle Scribe 10.2\"", 155.4, 207.3, 8.0, 11.0),
    ("kobo-clara", "Kobo Clara 6\"", 91.4, 121.9, 4.0, 10.0),
    ("kobo-libra", "Kobo Libra 7\"", 106.7, 142.2, 5.0, 10.0),
    ("remarkable", "reMarkable 10.3\"", 157.0, 209.0, 8.0, 11.0),
    ("a5", "A5 paper", 148.0, 210.0, 12.0, 10.0),
    ("a4", "A4 paper", 210.0, 297.0, 18.0, 11.0),
    ("letter", "US Letter paper", 215.9, 279.4, 18.0, 11.0),
];

impl ScreenPreset {
    /// Look up a preset by name (case-insensitive, `_` accepted for `-`).
    pub fn from_name(name: &str) -> Option<Self> {
        let wanted = name.trim().to_ascii_lowercase().replace('_', "-");
        SCREEN_PRESETS
            .iter()
            .find(|p| p.0 == wanted)
            .map(|&(name, description, width_mm, height_mm, margin_mm, base_font_pt)| Self {
                name: name.to_string(),
                description: description.to_string(),
                width_mm,
                height_mm,
                margin_mm,
                base_font_pt,
            })
    }

    /// Every known preset name, in display order.
    pub fn names() -> Vec<&'static str> {
        SCREEN_PRESETS.iter().map(|p| p.0).collect()
    }
}

impl Default for ScreenPreset {
    fn default() -> Self {
        Self {
            name: "kindle-paperwhite".to_string(),
            description: "Kindle Paperwhite 6.8\"".to_string(),
            width_mm: 103.6,
            height_mm: 138.2,
            margin_mm: 5.0,
            base_font_pt: 10.0,
        }
    }
}

struct Typography {
    font_size: &'static str,
    line_height: f32,
    paragraph_gap: &'static str,
    body_margin: &'static str,
}

fn typography(preset: StylePreset) -> Typography {
    match preset {
        StylePreset::Default => Typography {
            font_size: "1em",
            line_height: 1.5,
            paragraph_gap: "0.6em",
            body_margin: "0.5em",
        },
        StylePreset::Compact => Typography {
            font_size: "0.9em",
            line_height: 1.35,
            paragraph_gap: "0.4em",
            body_margin: "0.3em",
        },
        StylePreset::LargeText => Typography {
            font_size: "1.2em",
            line_height: 1.7,
            paragraph_gap: "0.8em",
            body_margin: "0.8em",
        },
    }
}

/// Stylesheet shipped as `style.css` inside the EPUB.
pub fn epub_stylesheet(preset: StylePreset) -> String {
    let t = typography(preset);
    format!(
        r#"/* arxiv-to-ereader: {name} */
body {{
    font-family: Georgia, "Times New Roman", serif;
    font-size: {font_size};
    line-height: {line_height};
    margin: {body_margin};
    text-align: justify;
    hyphens: auto;
    -webkit-hyphens: auto;
}}

h1, h2, h3, h4 {{
    font-family: Helvetica, Arial, sans-serif;
    line-height: 1.3;
    text-align: left;
    page-break-after: avoid;
}}
h1 {{ font-size: 1.5em; margin: 0 0 0.8em 0; }}
h2 {{ font-size: 1.3em; margin: 1.2em 0 0.5em 0; }}
h3 {{ font-size: 1.1em; margin: 1em 0 0.4em 0; }}

p {{
    margin: 0 0 {paragraph_gap} 0;
    orphans: 2;
    widows: 2;
}}

a {{ color: inherit; }}

img {{
    max-width: 100%;
    height: auto;
}}

figure, .ltx_figure {{
    margin: 1em 0;
    text-align: center;
    page-break-inside: avoid;
}}

figcaption, .ltx_caption {{
    font-size: 0.9em;
    font-style: italic;
    margin-top: 0.4em;
}}

.table-wrapper {{
    overflow-x: auto;
    margin: 1em 0;
}}

table {{
    border-collapse: collapse;
    font-size: 0.85em;
    margin: 0 auto;
}}

th, td, .ltx_td, .ltx_th {{
    padding: 0.2em 0.4em;
    text-align: left;
}}

.ltx_tabular {{ display: table; border-collapse: collapse; }}
.ltx_tr {{ display: table-row; }}
.ltx_td, .ltx_th {{ display: table-cell; }}
.ltx_border_t {{ border-top: 1px solid #444; }}
.ltx_border_b {{ border-bottom: 1px solid #444; }}
.ltx_border_l {{ border-left: 1px solid #444; }}
.ltx_border_r {{ border-right: 1px solid #444; }}
.ltx_border_tt {{ border-top: 2px solid #000; }}
.ltx_border_bb {{ border-bottom: 2px solid #000; }}

.ltx_transformed_outer {{
    width: auto !important;
    height: auto !important;
    vertical-align: baseline !important;
}}
.ltx_transformed_inner {{ transform: none !important; }}

pre, code, .code-block {{
    font-family: "Courier New", Courier, monospace;
    font-size: 0.85em;
}}

.code-block, pre {{
    white-space: pre-wrap;
    word-wrap: break-word;
    border: 1px solid #ccc;
    padding: 0.5em;
    margin: 0.8em 0;
}}

.theorem-like {{
    margin: 1em 0;
    padding: 0.5em 0.7em;
    border-left: 3px solid #666;
}}

.math-block, .math-block-img {{
    margin: 0.8em 0;
    text-align: center;
}}

img.math-image {{ display: inline; margin: 0; }}
img.math-inline {{ height: 1.2em; width: auto; }}
img.math-display {{ max-width: 100%; }}

.citation {{ font-style: normal; }}

.abstract {{
    margin: 1em 0;
    padding: 0.8em;
    border-left: 3px solid #666;
}}
.abstract-title {{ font-weight: bold; }}

.ltx_bibitem {{
    margin-bottom: 0.5em;
    padding-left: 2em;
    text-indent: -2em;
    font-size: 0.9em;
}}

.footnote-ref {{ text-decoration: none; }}
.footnote-ref sup {{ font-size: 0.75em; }}
.footnotes-section {{ font-size: 0.9em; }}
.footnote-back {{ text-decoration: none; }}
"#,
        name = preset.name(),
        font_size = t.font_size,
        line_height = t.line_height,
        body_margin = t.body_margin,
        paragraph_gap = t.paragraph_gap,
    )
}

/// Inline stylesheet of the title page.
pub fn cover_css() -> &'static str {
    r#"body { text-align: center; margin: 2em 1em; font-family: Georgia, serif; }
h1 { font-size: 1.6em; margin: 2em 0 1em 0; line-height: 1.3; }
.authors { font-size: 1.1em; font-style: italic; margin-bottom: 2em; }
.date { color: #555; font-size: 0.9em; }
.paper-id { color: #555; font-size: 0.9em; margin-top: 1em; }"#
}

/// Print stylesheet for the PDF renderer, sized to `screen`.
pub fn pdf_stylesheet(screen: &ScreenPreset) -> String {
    let b = screen.base_font_pt;
    let pt = |factor: f32| format!("{:.1}pt", b * factor);
    format!(
        r#"@page {{
    size: {width}mm {height}mm;
    margin: {margin}mm;
}}

* {{ margin: 0; padding: 0; box-sizing: border-box; }}

body {{
    font-family: Georgia, "Times New Roman", serif;
    font-size: {base};
    line-height: 1.5;
    color: #000;
    background: #fff;
    text-align: justify;
    hyphens: auto;
    -webkit-hyphens: auto;
}}

h1, h2, h3, h4, h5, h6 {{
    font-family: Helvetica, Arial, sans-serif;
    font-weight: bold;
    line-height: 1.3;
    text-align: left;
    page-break-after: avoid;
}}
h1 {{ font-size: {h1}; margin: 0 0 12pt 0; page-break-before: always; }}
h1:first-of-type {{ page-break-before: avoid; }}
h2 {{ font-size: {h2}; margin: 18pt 0 8pt 0; }}
h3 {{ font-size: {h3}; margin: 14pt 0 6pt 0; }}
h4, h5, h6 {{ font-size: {base}; margin: 12pt 0 4pt 0; }}

p {{ margin-bottom: 8pt; orphans: 2; widows: 2; }}
p + p {{ text-indent: 1.5em; margin-top: 0; }}

a {{ color: #0066cc; text-decoration: underline; }}

img {{ max-width: 100%; height: auto; display: block; margin: 12pt auto; }}

figure {{ margin: 16pt 0; text-align: center; page-break-inside: avoid; }}
figcaption, .ltx_caption {{ font-size: {small}; font-style: italic; margin-top: 6pt; text-align: center; }}

table {{ width: 100%; border-collapse: collapse; margin: 12pt 0; font-size: {small}; page-break-inside: avoid; }}
th, td {{ border: 0.5pt solid #666; padding: 4pt 6pt; text-align: left; }}
th {{ background: #f0f0f0; font-weight: bold; }}

pre, code {{ font-family: "Courier New", Courier, monospace; font-size: {code}; background: #f5f5f5; }}
pre {{ padding: 8pt; white-space: pre-wrap; word-wrap: break-word; page-break-inside: avoid; }}
code {{ padding: 1pt 3pt; }}

ul, ol {{ margin: 8pt 0; padding-left: 1.5em; }}
li {{ margin-bottom: 4pt; }}

.cover {{ text-align: center; padding: 20pt 10pt; page-break-after: always; }}
.cover h1 {{ page-break-before: avoid; margin-bottom: 16pt; font-size: {cover}; }}
.cover .authors {{ font-size: {h3}; font-style: italic; margin-bottom: 24pt; }}
.cover .paper-id, .cover .date {{ font-size: {small}; color: #666; margin-top: 8pt; }}

.abstract {{ margin: 16pt 0; padding: 12pt; background: #f8f8f8; border-left: 3pt solid #666; }}
.abstract-title {{ font-weight: bold; margin-bottom: 8pt; }}

.theorem-like, .ltx_theorem, .ltx_lemma, .ltx_definition,
.ltx_corollary, .ltx_proposition, .ltx_remark, .ltx_example {{
    margin: 14pt 0;
    padding: 10pt;
    background: #f9f9f9;
    border: 0.5pt solid #ddd;
    border-left: 3pt solid #666;
    page-break-inside: avoid;
}}
.ltx_proof {{ margin: 10pt 0; padding: 8pt 10pt; border-left: 2pt solid #999; }}

math {{ font-size: 1em; }}
math[display="block"] {{ display: block; text-align: center; margin: 12pt 0; }}

table.ltx_equation, table.ltx_eqn_table {{ border: none; margin: 12pt 0; width: 100%; }}
table.ltx_equation td, table.ltx_eqn_table td {{ border: none; padding: 4pt 0; vertical-align: middle; }}
.ltx_eqn_cell {{ text-align: center; }}
.ltx_eqn_eqno {{ text-align: right; font-size: {small}; color: #444; width: 10%; }}

.citation, .ltx_cite {{ font-style: normal; }}

.ltx_bibliography, .references {{ margin-top: 20pt; }}
.ltx_bibitem {{ margin-bottom: 8pt; padding-left: 2em; text-indent: -2em; font-size: {small}; }}

.footnotes-section {{ margin-top: 20pt; padding-top: 10pt; border-top: 0.5pt solid #ccc; font-size: {small}; }}
.footnote-ref {{ text-decoration: none; color: #0066cc; }}
.footnote-ref sup {{ font-size: 0.75em; }}

.ltx_para {{ margin-bottom: 8pt; }}
.ltx_item {{ margin-bottom: 4pt; }}

.code-block, .ltx_listing, .ltx_verbatim {{
    background: #f5f5f5;
    padding: 8pt;
    margin: 10pt 0;
    font-family: "Courier New", Courier, monospace;
    font-size: {code};
    white-space: pre-wrap;
    word-wrap: break-word;
    border: 0.5pt solid #ddd;
}}

blockquote {{ margin: 10pt 15pt; padding-left: 10pt; border-left: 2pt solid #ccc; font-style: italic; }}

.table-wrapper {{ margin: 12pt 0; }}

.ltx_tabular {{ display: table; border-collapse: collapse; margin: 8pt auto; font-size: {code}; }}
.ltx_tr {{ display: table-row; }}
.ltx_td, .ltx_th {{ display: table-cell; padding: 3pt 5pt; text-align: left; vertical-align: middle; }}
.ltx_border_t {{ border-top: 0.5pt solid #444; }}
.ltx_border_b {{ border-bottom: 0.5pt solid #444; }}
.ltx_border_l {{ border-left: 0.5pt solid #444; }}
.ltx_border_r {{ border-right: 0.5pt solid #444; }}
.ltx_border_tt {{ border-top: 1pt solid #000; }}
.ltx_border_bb {{ border-bottom: 1pt solid #000; }}
.ltx_table {{ margin: 12pt auto; page-break-inside: avoid; }}

.ltx_transformed_outer {{
    display: block;
    margin: 8pt auto;
    max-width: 100%;
    overflow-x: auto;
    width: auto !important;
    height: auto !important;
    vertical-align: baseline !important;
}}
.ltx_transformed_inner {{ display: block; transform: none !important; }}

svg.ltx_picture {{ max-width: 100%; height: auto; display: block; margin: 10pt auto; }}
svg foreignobject {{ overflow: visible; }}
.ltx_foreignobject_container {{ display: block; }}
.ltx_figure svg {{ max-width: 100%; height: auto; }}

@media print {{
    body {{ -webkit-print-color-adjust: exact; print-color-adjust: exact; }}
    .cover {{ page-break-after: always; }}
    h1, h2, h3, h4, h5, h6 {{ page-break-after: avoid; }}
    figure, table, pre {{ page-break-inside: avoid; }}
}}
"#,
        width = screen.width_mm,
        height = screen.height_mm,
        margin = screen.margin_mm,
        base = pt(1.0),
        h1 = pt(1.5),
        h2 = pt(1.3),
        h3 = pt(1.1),
        cover = pt(1.6),
        small = pt(0.9),
        code = pt(0.85),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_named_preset_resolves() {
        for name in ScreenPreset::names() {
            let p = ScreenPreset::from_name(name).unwrap();
            assert_eq!(p.name, name);
            assert!(p.width_mm < p.height_mm, "{name} should be portrait");
        }
    }

    #[test]
    fn preset_lookup_is_forgiving() {
        assert!(ScreenPreset::from_name("Kindle_Scribe").is_some());
        assert!(ScreenPreset::from_name("nook").is_none());
    }

    #[test]
    fn default_preset_matches_table() {
        assert_eq!(
            ScreenPreset::from_name("kindle-paperwhite").unwrap(),
            ScreenPreset::default()
        );
    }

    #[test]
    fn epub_stylesheet_varies_by_preset() {
        let default = epub_stylesheet(StylePreset::Default);
        let large = epub_stylesheet(StylePreset::LargeText);
        assert!(default.contains("font-size: 1em;"));
        assert!(large.contains("font-size: 1.2em;"));
        assert!(large.contains("large-text"));
        assert!(default.contains(".footnote-ref"));
    }

    #[test]
    fn pdf_stylesheet_uses_page_geometry() {
        let css = pdf_stylesheet(&ScreenPreset::from_name("a4").unwrap());
        assert!(css.contains("size: 210mm 297mm;"));
        assert!(css.contains("font-size: 11.0pt;"));
        assert!(css.contains("math[display=\"block\"]"));
    }
}
