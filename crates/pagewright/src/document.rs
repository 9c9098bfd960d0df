//! Document preprocessing: rasterize source documents into per-page
//! images for multimodal model input. Rendering shells out to poppler
//! (`pdfinfo` for the page count, `pdftoppm` for rasterization); the
//! tools being absent is a reported precondition failure, not a crash.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tempfile::TempDir;
use tokio::process::Command;
use tracing::debug;

use crate::errors::DocumentError;

/// One rasterized page of a source document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentPage {
    /// 0-based, contiguous, defines page order
    pub index: usize,
    /// PNG-encoded page image
    pub data: Vec<u8>,
    /// The document this page came from
    pub source: PathBuf,
}

const DEFAULT_MAX_EDGE: u32 = 2048;

/// How a page gets sized: at the requested resolution, or scaled down
/// to the pixel cap when the resolution would overshoot it.
#[derive(Debug, Clone, Copy, PartialEq)]
enum RenderScale {
    Dpi(u32),
    ScaleTo(u32),
}

/// Renders PDF documents into ordered page images. A page whose
/// longest edge would exceed the configured pixel cap at the requested
/// DPI is scaled down to the cap instead.
#[derive(Debug, Clone)]
pub struct PdfRenderer {
    dpi: u32,
    max_edge: u32,
}

impl PdfRenderer {
    pub fn new(dpi: u32) -> Self {
        Self {
            dpi,
            max_edge: DEFAULT_MAX_EDGE,
        }
    }

    pub fn with_max_edge(mut self, max_edge: u32) -> Self {
        self.max_edge = max_edge;
        self
    }

    /// Rasterize every page of `path`, returning pages sorted by
    /// ascending index. Pages render concurrently; ordering is
    /// re-established here, not assumed from completion order. All
    /// intermediate artifacts live in a temp dir removed on every exit
    /// path when it drops.
    pub async fn render(&self, path: &Path) -> Result<Vec<DocumentPage>, DocumentError> {
        if !is_pdf(path) {
            return Err(DocumentError::UnsupportedFormat(
                path.display().to_string(),
            ));
        }
        if !path.is_file() {
            return Err(DocumentError::Conversion(format!(
                "no such file: {}",
                path.display()
            )));
        }

        let info = self.probe(path).await?;
        let scale = scale_mode(self.dpi, self.max_edge, info.page_size);
        debug!(document = %path.display(), pages = info.pages, ?scale, "rendering document");

        let workdir = TempDir::new()
            .map_err(|e| DocumentError::Conversion(format!("cannot create temp dir: {e}")))?;

        let renders =
            (0..info.pages).map(|index| self.render_page(path, workdir.path(), index, scale));
        let mut pages = futures::future::try_join_all(renders).await?;
        pages.sort_by_key(|page| page.index);

        Ok(pages)
    }

    async fn probe(&self, path: &Path) -> Result<PdfInfo, DocumentError> {
        let output = Command::new("pdfinfo")
            .arg(path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                DocumentError::Conversion(format!("cannot run pdfinfo (is poppler installed?): {e}"))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DocumentError::Conversion(format!(
                "pdfinfo failed for {}: {}",
                path.display(),
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(PdfInfo {
            pages: parse_page_count(&stdout)?,
            page_size: parse_page_size(&stdout),
        })
    }

    async fn render_page(
        &self,
        path: &Path,
        workdir: &Path,
        index: usize,
        scale: RenderScale,
    ) -> Result<DocumentPage, DocumentError> {
        // pdftoppm numbers pages from 1
        let page_number = index + 1;
        let prefix = workdir.join(format!("page-{page_number}"));

        let mut command = Command::new("pdftoppm");
        command.arg("-png");
        match scale {
            RenderScale::Dpi(dpi) => command.arg("-r").arg(dpi.to_string()),
            RenderScale::ScaleTo(edge) => command.arg("-scale-to").arg(edge.to_string()),
        };
        let output = command
            .arg("-f")
            .arg(page_number.to_string())
            .arg("-l")
            .arg(page_number.to_string())
            .arg("-singlefile")
            .arg(path)
            .arg(&prefix)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                DocumentError::Conversion(format!(
                    "cannot run pdftoppm (is poppler installed?): {e}"
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DocumentError::Conversion(format!(
                "pdftoppm failed on page {} of {}: {}",
                page_number,
                path.display(),
                stderr.trim()
            )));
        }

        let image_path = prefix.with_extension("png");
        let data = tokio::fs::read(&image_path).await.map_err(|e| {
            DocumentError::Conversion(format!(
                "pdftoppm produced no image for page {page_number}: {e}"
            ))
        })?;

        Ok(DocumentPage {
            index,
            data,
            source: path.to_path_buf(),
        })
    }
}

impl Default for PdfRenderer {
    fn default() -> Self {
        // 150 dpi keeps a letter page under most provider size limits
        Self::new(150)
    }
}

struct PdfInfo {
    pages: usize,
    /// Media box in PostScript points, when pdfinfo reports one
    page_size: Option<(f64, f64)>,
}

fn scale_mode(dpi: u32, max_edge: u32, page_size: Option<(f64, f64)>) -> RenderScale {
    if let Some((width_pts, height_pts)) = page_size {
        // 72 points to the inch
        let longest_px = width_pts.max(height_pts) / 72.0 * f64::from(dpi);
        if longest_px > f64::from(max_edge) {
            return RenderScale::ScaleTo(max_edge);
        }
    }
    RenderScale::Dpi(dpi)
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

fn parse_page_count(pdfinfo_output: &str) -> Result<usize, DocumentError> {
    pdfinfo_output
        .lines()
        .find_map(|line| line.strip_prefix("Pages:"))
        .and_then(|rest| rest.trim().parse().ok())
        .ok_or_else(|| {
            DocumentError::Conversion("pdfinfo output had no page count".to_string())
        })
}

fn parse_page_size(pdfinfo_output: &str) -> Option<(f64, f64)> {
    // "Page size:      612 x 792 pts (letter)"
    let rest = pdfinfo_output
        .lines()
        .find_map(|line| line.strip_prefix("Page size:"))?;
    let mut parts = rest.split_whitespace();
    let width = parts.next()?.parse().ok()?;
    if parts.next()? != "x" {
        return None;
    }
    let height = parts.next()?.parse().ok()?;
    Some((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_non_pdf_extension() {
        let renderer = PdfRenderer::default();
        let err = renderer.render(Path::new("notes.txt")).await.unwrap_err();
        assert!(matches!(err, DocumentError::UnsupportedFormat(_)));
    }

    #[tokio::test]
    async fn test_missing_file_is_conversion_error() {
        let renderer = PdfRenderer::default();
        let err = renderer
            .render(Path::new("/nonexistent/report.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentError::Conversion(_)));
    }

    #[test]
    fn test_pdf_extension_check_is_case_insensitive() {
        assert!(is_pdf(Path::new("slides.PDF")));
        assert!(is_pdf(Path::new("dir/report.pdf")));
        assert!(!is_pdf(Path::new("image.png")));
        assert!(!is_pdf(Path::new("no_extension")));
    }

    #[test]
    fn test_parse_page_count() {
        let output = "Title:          Quarterly Report\n\
                      Producer:       LibreOffice\n\
                      Pages:          12\n\
                      Page size:      612 x 792 pts (letter)\n";
        assert_eq!(parse_page_count(output).unwrap(), 12);
    }

    #[test]
    fn test_parse_page_count_missing() {
        let err = parse_page_count("Title: empty\n").unwrap_err();
        assert!(matches!(err, DocumentError::Conversion(_)));
    }

    #[test]
    fn test_parse_page_size() {
        let output = "Pages:          2\n\
                      Page size:      612 x 792 pts (letter)\n";
        assert_eq!(parse_page_size(output), Some((612.0, 792.0)));
        assert_eq!(parse_page_size("Pages: 2\n"), None);
    }

    #[test]
    fn test_letter_page_within_cap_renders_at_dpi() {
        // 792 pts at 150 dpi is 1650 px, under the 2048 cap
        let scale = scale_mode(150, DEFAULT_MAX_EDGE, Some((612.0, 792.0)));
        assert_eq!(scale, RenderScale::Dpi(150));
    }

    #[test]
    fn test_oversized_page_is_scaled_to_cap() {
        // A0 poster, 2384 x 3370 pts: 3370 pts at 150 dpi is ~7021 px
        let scale = scale_mode(150, DEFAULT_MAX_EDGE, Some((2384.0, 3370.0)));
        assert_eq!(scale, RenderScale::ScaleTo(DEFAULT_MAX_EDGE));
    }

    #[test]
    fn test_unknown_page_size_renders_at_dpi() {
        assert_eq!(scale_mode(150, DEFAULT_MAX_EDGE, None), RenderScale::Dpi(150));
    }
}
