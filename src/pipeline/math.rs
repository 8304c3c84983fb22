//! LaTeX math → PNG images for readers without MathML support.
//!
//! Kindle devices render MathML poorly or not at all, so each `<math>`
//! element is replaced by an `<img>` of its LaTeX source. Inline images carry
//! a `vertical-align` offset so their baseline lines up with the text.
//!
//! Rendering goes through the [`MathRenderer`] trait. [`LatexRenderer`]
//! shells out to `latex` and `dvipng`; tests and embedders can inject their
//! own implementation through [`crate::ConversionConfigBuilder::math_renderer`].

use crate::error::AssetError;
use crate::pipeline::dom::{self, Element, Node, Rewrite};
use crate::pipeline::parse::extract_latex;
use image::{DynamicImage, Rgb, RgbImage};
use md5::{Digest, Md5};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::io::{Cursor, ErrorKind};
use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, warn};

/// Longest alt text kept on a math image.
const MAX_ALT_LEN: usize = 200;

/// Point size of the LaTeX document; depths are expressed relative to it.
const FONT_PT: f32 = 12.0;

/// A rendered equation.
#[derive(Clone)]
pub struct MathImage {
    /// The LaTeX source as found in the page (before any cleaning).
    pub latex: String,
    pub data: Vec<u8>,
    pub media_type: String,
    pub display: bool,
    /// Offset of the image bottom from the text baseline, in em (≤ 0).
    pub depth_em: f32,
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Debug for MathImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MathImage")
            .field("latex", &self.latex)
            .field("display", &self.display)
            .field("depth_em", &self.depth_em)
            .field("size", &(self.width, self.height))
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl MathImage {
    /// `math_{12 hex chars of md5(latex)}.png`, stable across runs.
    pub fn filename(&self) -> String {
        let digest = Md5::digest(self.latex.as_bytes());
        let hex: String = digest.iter().take(6).map(|b| format!("{b:02x}")).collect();
        format!("math_{hex}.png")
    }
}

/// Turns LaTeX into an image.
pub trait MathRenderer: Send + Sync {
    /// Render `latex` (without `$` delimiters) at `dpi`.
    fn render(&self, latex: &str, display: bool, dpi: u32) -> Result<MathImage, AssetError>;

    /// Whether the renderer can work at all (e.g. its tools are installed).
    fn is_available(&self) -> bool {
        true
    }
}

// ── LaTeX substitutions ──────────────────────────────────────────────────

/// Ordered rewrites for commands that minimal TeX setups lack.
static SUBSTITUTIONS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        // Bold variants
        (r"\\bm\{([^}]*)\}", r"\boldsymbol{${1}}"),
        (r"\\mathbold\{([^}]*)\}", r"\boldsymbol{${1}}"),
        // Style commands
        (r"\\displaystyle\s*", ""),
        (r"\\textstyle\s*", ""),
        (r"\\scriptstyle\s*", ""),
        (r"\\scriptscriptstyle\s*", ""),
        // Text commands
        (r"\\text\{([^}]*)\}", r"\mathrm{${1}}"),
        (r"\\textbf\{([^}]*)\}", r"\mathbf{${1}}"),
        (r"\\textit\{([^}]*)\}", r"\mathit{${1}}"),
        (r"\\textrm\{([^}]*)\}", r"\mathrm{${1}}"),
        (r"\\texttt\{([^}]*)\}", r"\mathrm{${1}}"),
        (r"\\textsf\{([^}]*)\}", r"\mathrm{${1}}"),
        // Spacing
        (r"\\,", " "),
        (r"\\;", " "),
        (r"\\:", " "),
        (r"\\!", ""),
        (r"\\quad\b", "  "),
        (r"\\qquad\b", "    "),
        (r"\\hspace\{[^}]*\}", " "),
        (r"\\vspace\{[^}]*\}", ""),
        // Delimiter sizing
        (r"\\left\[", "["),
        (r"\\right\]", "]"),
        (r"\\left\(", "("),
        (r"\\right\)", ")"),
        (r"\\left\\\{", r"\{"),
        (r"\\right\\\}", r"\}"),
        (r"\\left\|", "|"),
        (r"\\right\|", "|"),
        (r"\\left\\langle", r"\langle"),
        (r"\\right\\rangle", r"\rangle"),
        (r"\\left\.", ""),
        (r"\\right\.", ""),
        // Operators
        (r"\\operatorname\*?\{([^}]*)\}", r"\mathrm{${1}}"),
        (r"\\mathop\{([^}]*)\}", r"\mathrm{${1}}"),
        (r"\\DeclareMathOperator\{[^}]*\}\{([^}]*)\}", r"\mathrm{${1}}"),
        (r"\\Bigg[lrm]?\b", ""),
        (r"\\bigg[lrm]?\b", ""),
        (r"\\Big[lrm]?\b", ""),
        (r"\\big[lrm]?\b", ""),
        // Symbols
        (r"\\setminus\b", r"\backslash"),
        (r"\\mid\b", "|"),
        (r"\\triangleq\b", "="),
        (r"\\coloneqq\b", ":="),
        (r"\\eqqcolon\b", "=:"),
        (r"\\vcentcolon\b", ":"),
        // Font families
        (r"\\mathbb\{([^}]*)\}", r"\mathbf{${1}}"),
        (r"\\mathcal\{([^}]*)\}", r"\mathit{${1}}"),
        (r"\\mathscr\{([^}]*)\}", r"\mathit{${1}}"),
        (r"\\mathfrak\{([^}]*)\}", r"\mathbf{${1}}"),
        (r"\\mathtt\{([^}]*)\}", r"\mathrm{${1}}"),
        (r"\\mathsf\{([^}]*)\}", r"\mathrm{${1}}"),
        // Environments
        (r"\\begin\{[^}]*\}", ""),
        (r"\\end\{[^}]*\}", ""),
        // Accents
        (r"\\tilde\{([^}]*)\}", "${1}"),
        (r"\\hat\{([^}]*)\}", "${1}"),
        (r"\\bar\{([^}]*)\}", "${1}"),
        (r"\\vec\{([^}]*)\}", "${1}"),
        (r"\\dot\{([^}]*)\}", "${1}"),
        (r"\\ddot\{([^}]*)\}", "${1}"),
        (r"\\widehat\{([^}]*)\}", "${1}"),
        (r"\\widetilde\{([^}]*)\}", "${1}"),
        // LaTeXML intent artifacts
        (r":literal", ""),
        // Colours
        (r"\\color\[[^\]]*\]\{[^}]*\}", ""),
        (r"\\color\{[^}]*\}", ""),
        (r"\\textcolor\[[^\]]*\]\{[^}]*\}\{([^}]*)\}", "${1}"),
        (r"\\textcolor\{[^}]*\}\{([^}]*)\}", "${1}"),
        // Arrows
        (r"\\gets\b", r"\leftarrow"),
        (r"\\to\b", r"\rightarrow"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).unwrap(), replacement))
    .collect()
});

static RE_NESTED_BOLD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\boldsymbol\{(\\[a-zA-Z]+\{[^}]*\})\}").unwrap());

static RE_CMD_WITH_ARG: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\[a-zA-Z]+\{([^}]*)\}").unwrap());
static RE_CMD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\[a-zA-Z]+").unwrap());
static RE_SCRIPTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[_^{}]").unwrap());
static RE_DEPTH: Lazy<Regex> = Lazy::new(|| Regex::new(r"depth=(-?\d+)").unwrap());

/// Rewrite LaTeX into the subset understood by a bare TeX installation.
pub fn clean_latex(latex: &str) -> String {
    let mut out = latex.trim().to_string();
    for (re, replacement) in SUBSTITUTIONS.iter() {
        out = re.replace_all(&out, *replacement).into_owned();
    }
    // \boldsymbol cannot wrap another command
    RE_NESTED_BOLD.replace_all(&out, "${1}").into_owned()
}

/// Last resort: drop every command, script marker and brace.
pub fn simple_latex_fallback(latex: &str) -> String {
    let out = RE_CMD_WITH_ARG.replace_all(latex, "${1}");
    let out = RE_CMD.replace_all(&out, "");
    let out = RE_SCRIPTS.replace_all(&out, "");
    let out = out.trim();
    if out.is_empty() {
        "?".to_string()
    } else {
        out.to_string()
    }
}

// ── latex + dvipng ───────────────────────────────────────────────────────

/// Renders through a local TeX installation (`latex` and `dvipng` on `PATH`).
#[derive(Debug)]
pub struct LatexRenderer {
    latex: PathBuf,
    dvipng: PathBuf,
    available: OnceCell<bool>,
}

impl Default for LatexRenderer {
    fn default() -> Self {
        Self::new("latex", "dvipng")
    }
}

struct Failure {
    reason: String,
    /// The toolchain itself is unusable; retrying with other input is pointless.
    fatal: bool,
}

impl LatexRenderer {
    pub fn new(latex: impl Into<PathBuf>, dvipng: impl Into<PathBuf>) -> Self {
        Self {
            latex: latex.into(),
            dvipng: dvipng.into(),
            available: OnceCell::new(),
        }
    }

    fn document(latex: &str, display: bool) -> String {
        let body = if display {
            format!("$\\displaystyle {latex}$")
        } else {
            format!("${latex}$")
        };
        format!(
            "\\documentclass[{FONT_PT}pt]{{article}}\n\
             \\usepackage{{amsmath}}\n\
             \\usepackage{{amssymb}}\n\
             \\usepackage{{bm}}\n\
             \\pagestyle{{empty}}\n\
             \\begin{{document}}\n\
             {body}\n\
             \\end{{document}}\n"
        )
    }

    fn run(&self, cmd: &mut Command, tool: &std::path::Path) -> Result<std::process::Output, Failure> {
        let output = cmd.output().map_err(|e| Failure {
            reason: if e.kind() == ErrorKind::NotFound {
                format!("`{}` not found on PATH", tool.display())
            } else {
                format!("failed to run `{}`: {e}", tool.display())
            },
            fatal: true,
        })?;
        if output.status.success() {
            return Ok(output);
        }
        // TeX reports errors on stdout as lines starting with '!'
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = stdout
            .lines()
            .find(|l| l.starts_with('!'))
            .map(str::to_string)
            .or_else(|| stderr.lines().next().map(str::to_string))
            .unwrap_or_else(|| output.status.to_string());
        Err(Failure {
            reason: format!("{} failed: {detail}", tool.display()),
            fatal: false,
        })
    }

    fn render_once(&self, latex: &str, display: bool, dpi: u32) -> Result<(Vec<u8>, u32, u32, i32), Failure> {
        let dir = tempfile::tempdir().map_err(|e| Failure {
            reason: format!("cannot create temp dir: {e}"),
            fatal: true,
        })?;
        let io_failure = |e: std::io::Error| Failure {
            reason: e.to_string(),
            fatal: false,
        };
        std::fs::write(dir.path().join("eq.tex"), Self::document(latex, display)).map_err(io_failure)?;

        self.run(
            Command::new(&self.latex)
                .args(["-interaction=nonstopmode", "-halt-on-error", "eq.tex"])
                .current_dir(dir.path()),
            &self.latex,
        )?;

        let out = self.run(
            Command::new(&self.dvipng)
                .args(["-T", "tight", "-D"])
                .arg(dpi.to_string())
                .args(["-bg", "White", "--depth", "-o", "eq.png", "eq.dvi"])
                .current_dir(dir.path()),
            &self.dvipng,
        )?;
        let depth = RE_DEPTH
            .captures(&String::from_utf8_lossy(&out.stdout))
            .and_then(|c| c[1].parse::<i32>().ok())
            .unwrap_or(0);

        let png = std::fs::read(dir.path().join("eq.png")).map_err(io_failure)?;
        let (data, width, height) = flatten_on_white(&png).map_err(|e| Failure {
            reason: format!("invalid PNG from dvipng: {e}"),
            fatal: false,
        })?;
        Ok((data, width, height, depth))
    }
}

impl MathRenderer for LatexRenderer {
    fn render(&self, latex: &str, display: bool, dpi: u32) -> Result<MathImage, AssetError> {
        let fail = |reason: String| AssetError::MathRender {
            latex: latex.to_string(),
            reason,
        };
        if latex.trim().is_empty() {
            return Err(fail("empty expression".to_string()));
        }

        let mut attempts: Vec<String> = Vec::with_capacity(3);
        for candidate in [latex.trim().to_string(), clean_latex(latex), simple_latex_fallback(latex)] {
            if !attempts.contains(&candidate) {
                attempts.push(candidate);
            }
        }

        let mut last = String::new();
        for attempt in &attempts {
            match self.render_once(attempt, display, dpi) {
                Ok((data, width, height, depth)) => {
                    let depth_em = if display {
                        0.0
                    } else {
                        -(depth as f32) / (FONT_PT * dpi as f32 / 72.0)
                    };
                    return Ok(MathImage {
                        latex: latex.to_string(),
                        data,
                        media_type: "image/png".to_string(),
                        display,
                        depth_em,
                        width,
                        height,
                    });
                }
                Err(f) if f.fatal => return Err(fail(f.reason)),
                Err(f) => {
                    debug!("Math attempt failed for {attempt:?}: {}", f.reason);
                    last = f.reason;
                }
            }
        }
        Err(fail(last))
    }

    fn is_available(&self) -> bool {
        *self.available.get_or_init(|| {
            let ok = [&self.latex, &self.dvipng].iter().all(|tool| {
                Command::new(tool)
                    .arg("--version")
                    .output()
                    .map(|o| o.status.success())
                    .unwrap_or(false)
            });
            if !ok {
                warn!(
                    "`{}`/`{}` not available; math stays as MathML",
                    self.latex.display(),
                    self.dvipng.display()
                );
            }
            ok
        })
    }
}

/// Composite a (possibly transparent) PNG onto white and re-encode it.
///
/// Returns the PNG bytes plus width and height.
pub fn flatten_on_white(png: &[u8]) -> Result<(Vec<u8>, u32, u32), image::ImageError> {
    let rgba = image::load_from_memory(png)?.to_rgba8();
    let (w, h) = rgba.dimensions();
    let flat = RgbImage::from_fn(w, h, |x, y| {
        let p = rgba.get_pixel(x, y).0;
        let a = p[3] as u32;
        let blend = |c: u8| ((c as u32 * a + 255 * (255 - a)) / 255) as u8;
        Rgb([blend(p[0]), blend(p[1]), blend(p[2])])
    });
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(flat).write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok((buf, w, h))
}

// ── Replacing <math> ─────────────────────────────────────────────────────

/// Rendered equations shared across the chapters of one paper.
#[derive(Debug, Default)]
pub struct MathCache {
    rendered: HashMap<String, MathImage>,
    failed: HashSet<String>,
}

impl MathCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rendered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rendered.is_empty()
    }

    /// Rendered images ordered by file name.
    pub fn images(&self) -> Vec<&MathImage> {
        let mut images: Vec<&MathImage> = self.rendered.values().collect();
        images.sort_by_cached_key(|m| m.filename());
        images
    }

    fn get_or_render(
        &mut self,
        latex: &str,
        display: bool,
        renderer: &dyn MathRenderer,
        dpi: u32,
        warnings: &mut Vec<AssetError>,
    ) -> Option<MathImage> {
        if let Some(img) = self.rendered.get(latex) {
            return Some(img.clone());
        }
        if self.failed.contains(latex) {
            return None;
        }
        match renderer.render(latex, display, dpi) {
            Ok(img) => {
                self.rendered.insert(latex.to_string(), img.clone());
                Some(img)
            }
            Err(e) => {
                debug!("{e}");
                self.failed.insert(latex.to_string());
                warnings.push(e);
                None
            }
        }
    }
}

fn math_img(latex: &str, img: &MathImage, display: bool) -> Node {
    let alt: String = latex.chars().take(MAX_ALT_LEN).collect();
    let mut el = Element::new("img")
        .with_attr("src", format!("math/{}", img.filename()))
        .with_attr("alt", alt)
        .with_attr(
            "class",
            if display {
                "math-image math-display"
            } else {
                "math-image math-inline"
            },
        );
    if display {
        return Node::Element(
            Element::new("div")
                .with_attr("class", "math-block-img")
                .with_child(Node::Element(el)),
        );
    }
    if img.depth_em != 0.0 {
        el.set_attr("style", format!("vertical-align: {:.2}em;", img.depth_em));
    }
    Node::Element(el)
}

/// Replace every `<math>` in `nodes` with an image of its LaTeX.
///
/// Equations without LaTeX, or whose rendering fails, are left as MathML.
/// Returns one warning per distinct failing expression.
pub fn convert_math_to_images(
    nodes: &mut Vec<Node>,
    cache: &mut MathCache,
    renderer: &dyn MathRenderer,
    dpi: u32,
) -> Vec<AssetError> {
    let mut warnings = Vec::new();
    dom::rewrite_elements(nodes, &mut |e| {
        if e.name != "math" {
            return Rewrite::Keep;
        }
        let Some(latex) = extract_latex(e) else {
            return Rewrite::Keep;
        };
        let display = e.attr("display") == Some("block");
        match cache.get_or_render(&latex, display, renderer, dpi, &mut warnings) {
            Some(img) => Rewrite::Replace(vec![math_img(&latex, &img, display)]),
            None => Rewrite::Keep,
        }
    });
    warnings
}
