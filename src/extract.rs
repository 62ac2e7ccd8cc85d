//! PDF text extraction.
//!
//! The [`DocumentLoader`] trait turns a stored raw file into ordered pages of
//! text. [`PdfLoader`] walks the page tree with `lopdf` so every chunk can be
//! traced back to its page; when no page yields text through `lopdf` it falls
//! back to `pdf-extract` over the whole file, which understands more font
//! encodings, and reports the result as a single page.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;

use crate::models::Page;

/// Extension accepted for uploads, compared ASCII case-insensitively.
pub const PDF_EXTENSION: &str = "pdf";

/// Extraction error. Parsing never panics the caller; a panic inside a
/// parser surfaces as [`ExtractError::Pdf`].
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("PDF parsing failed: {0}")]
    Pdf(String),
    #[error("PDF has no pages")]
    NoPages,
    #[error("PDF contains no extractable text")]
    NoText,
}

/// Loads a stored document into pages of text.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Returns at least one non-blank page, or an error.
    async fn load(&self, path: &Path) -> Result<Vec<Page>>;
}

/// Returns true when `filename` carries the `.pdf` extension.
pub fn is_pdf_filename(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(PDF_EXTENSION))
        .unwrap_or(false)
}

/// [`DocumentLoader`] for PDF files.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfLoader;

#[async_trait]
impl DocumentLoader for PdfLoader {
    async fn load(&self, path: &Path) -> Result<Vec<Page>> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?;
        let pages = tokio::task::spawn_blocking(move || parse_pdf(&bytes))
            .await
            .map_err(|e| ExtractError::Pdf(format!("parser aborted: {}", e)))??;
        Ok(pages)
    }
}

/// Parses PDF bytes into non-blank pages.
pub fn parse_pdf(bytes: &[u8]) -> Result<Vec<Page>, ExtractError> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))?;

    let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
    if page_numbers.is_empty() {
        return Err(ExtractError::NoPages);
    }

    let mut pages = Vec::with_capacity(page_numbers.len());
    for number in page_numbers {
        match doc.extract_text(&[number]) {
            Ok(text) if !text.trim().is_empty() => pages.push(Page { number, text }),
            Ok(_) => {}
            Err(e) => tracing::debug!(page = number, error = %e, "lopdf could not extract page text"),
        }
    }

    if pages.is_empty() {
        let text = pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| ExtractError::Pdf(e.to_string()))?;
        if !text.trim().is_empty() {
            pages.push(Page { number: 1, text });
        }
    }

    if pages.is_empty() {
        return Err(ExtractError::NoText);
    }

    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};

    fn pdf_with_pages(texts: &[&str]) -> Vec<u8> {
        let mut doc = lopdf::Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in texts {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    #[test]
    fn pdf_extension_check() {
        assert!(is_pdf_filename("report.pdf"));
        assert!(is_pdf_filename("REPORT.PDF"));
        assert!(is_pdf_filename("my report v2.final.pdf"));
        assert!(!is_pdf_filename("report.pdf.exe"));
        assert!(!is_pdf_filename("notes.txt"));
        assert!(!is_pdf_filename("pdf"));
        assert!(!is_pdf_filename(""));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = parse_pdf(b"not a pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn pages_keep_their_numbers() {
        let bytes = pdf_with_pages(&["Alpha page text", "Beta page text"]);
        let pages = parse_pdf(&bytes).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].number, 1);
        assert_eq!(pages[1].number, 2);
        assert!(pages[0].text.contains("Alpha"));
        assert!(pages[1].text.contains("Beta"));
    }

    #[tokio::test]
    async fn loader_reads_from_disk() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("doc.pdf");
        std::fs::write(&path, pdf_with_pages(&["Stored on disk"])).unwrap();

        let pages = PdfLoader.load(&path).await.unwrap();
        assert_eq!(pages.len(), 1);
        assert!(pages[0].text.contains("Stored on disk"));
    }

    #[tokio::test]
    async fn loader_missing_file_is_io_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = PdfLoader.load(&tmp.path().join("absent.pdf")).await.unwrap_err();
        assert!(err.downcast_ref::<ExtractError>().is_none());
        assert!(err.downcast_ref::<std::io::Error>().is_some());
        assert!(err.to_string().contains("absent.pdf"));
    }

    #[tokio::test]
    async fn loader_corrupt_file_is_extract_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("broken.pdf");
        std::fs::write(&path, b"%PDF-1.4 truncated").unwrap();

        let err = PdfLoader.load(&path).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ExtractError>(),
            Some(ExtractError::Pdf(_))
        ));
    }
}
