//! Kindle formats through Calibre's `ebook-convert`.
//!
//! MOBI and AZW3 are not written directly: the scrubbed EPUB goes to a
//! scratch directory and Calibre transcodes it, picking the target format
//! from the output file's extension.

use crate::config::{ConversionConfig, OutputFormat};
use crate::error::ConvertError;
use crate::render::{find_executable, run_tool};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

const TOOL: &str = "ebook-convert";

/// Where Calibre puts the CLI tools when installed as an app bundle.
const EXTRA_LOCATIONS: &[&str] = &[
    "/Applications/calibre.app/Contents/MacOS/ebook-convert",
    "/opt/calibre/ebook-convert",
    "C:\\Program Files\\Calibre2\\ebook-convert.exe",
];

/// The configured `ebook-convert`, or the first one found on the system.
pub fn ebook_convert_binary(config: &ConversionConfig) -> Result<PathBuf, ConvertError> {
    if let Some(path) = &config.ebook_convert_path {
        return Ok(path.clone());
    }
    find_executable(&[TOOL], EXTRA_LOCATIONS).ok_or_else(|| ConvertError::calibre_missing(TOOL))
}

/// Transcode an EPUB to `format` (MOBI or AZW3) with `tool`.
pub fn render_kindle(epub: &[u8], format: OutputFormat, tool: &Path) -> Result<Vec<u8>, ConvertError> {
    if !format.is_kindle() {
        return Err(ConvertError::Internal(format!(
            "render_kindle called for {format}"
        )));
    }

    let io_err = |e: std::io::Error| ConvertError::Internal(format!("scratch directory: {e}"));
    let dir = tempfile::tempdir().map_err(io_err)?;
    let input = dir.path().join("paper.epub");
    let output = dir.path().join(format!("paper.{}", format.extension()));
    std::fs::write(&input, epub).map_err(io_err)?;

    debug!("Running {} {} {}", tool.display(), input.display(), output.display());
    let mut cmd = Command::new(tool);
    cmd.arg(&input).arg(&output);
    run_tool(&mut cmd, tool, ConvertError::calibre_missing)?;

    let bytes = std::fs::read(&output).map_err(|e| ConvertError::ConverterFailed {
        tool: tool.display().to_string(),
        stderr: format!("no output file produced: {e}"),
    })?;
    info!("{} → {}: {} bytes", TOOL, format, bytes.len());
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_binary_wins() {
        let config = ConversionConfig::builder()
            .ebook_convert_path("/opt/custom/ebook-convert")
            .build()
            .unwrap();
        assert_eq!(
            ebook_convert_binary(&config).unwrap(),
            PathBuf::from("/opt/custom/ebook-convert")
        );
    }

    #[test]
    fn missing_tool_is_converter_not_found() {
        let err = render_kindle(
            b"PK",
            OutputFormat::Mobi,
            Path::new("/nonexistent/ebook-convert"),
        )
        .unwrap_err();
        match err {
            ConvertError::ConverterNotFound { hint, .. } => assert!(hint.contains("calibre")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_non_kindle_format() {
        let err = render_kindle(b"PK", OutputFormat::Pdf, Path::new(TOOL)).unwrap_err();
        assert!(matches!(err, ConvertError::Internal(_)));
    }

    #[cfg(unix)]
    #[test]
    fn failing_tool_is_converter_failed() {
        let err = render_kindle(b"PK", OutputFormat::Azw3, Path::new("false")).unwrap_err();
        match err {
            ConvertError::ConverterFailed { stderr, .. } => assert!(stderr.contains("exit")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn missing_output_file_is_converter_failed() {
        let err = render_kindle(b"PK", OutputFormat::Mobi, Path::new("true")).unwrap_err();
        match err {
            ConvertError::ConverterFailed { stderr, .. } => {
                assert!(stderr.contains("no output file produced"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
