use crate::error::IngestError;
use lopdf::Document;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait PdfExtractor: Send + Sync {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError>;

    /// `label` names the buffer in error messages, usually the upload's filename.
    fn extract_pages_from_bytes(
        &self,
        bytes: &[u8],
        label: &str,
    ) -> Result<Vec<PageText>, IngestError>;

    /// Page texts in page order, separated by a blank line.
    fn extract_text(&self, path: &Path) -> Result<String, IngestError> {
        Ok(join_pages(&self.extract_pages(path)?))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let label = path.display().to_string();
        let document = Document::load(path)
            .map_err(|error| IngestError::Extraction(format!("{label}: {error}")))?;
        pages_from_document(&document, &label)
    }

    fn extract_pages_from_bytes(
        &self,
        bytes: &[u8],
        label: &str,
    ) -> Result<Vec<PageText>, IngestError> {
        let document = Document::load_mem(bytes)
            .map_err(|error| IngestError::Extraction(format!("{label}: {error}")))?;
        pages_from_document(&document, label)
    }
}

fn pages_from_document(document: &Document, label: &str) -> Result<Vec<PageText>, IngestError> {
    let mut pages = Vec::new();
    // get_pages is a BTreeMap keyed by page number, so iteration is already in page order.
    for (page_no, _page_id) in document.get_pages() {
        let text = document
            .extract_text(&[page_no])
            .map_err(|error| IngestError::Extraction(format!("{label} page {page_no}: {error}")))?;

        if !text.trim().is_empty() {
            pages.push(PageText {
                number: page_no,
                text,
            });
        }
    }

    if pages.is_empty() {
        return Err(IngestError::Extraction(format!(
            "pdf had no readable page text: {label}"
        )));
    }

    Ok(pages)
}

pub fn join_pages(pages: &[PageText]) -> String {
    pages
        .iter()
        .map(|page| page.text.trim())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn extract_text(path: &Path) -> Result<String, IngestError> {
    LopdfExtractor.extract_text(path)
}

pub fn extract_text_from_bytes(bytes: &[u8], label: &str) -> Result<String, IngestError> {
    let pages = LopdfExtractor.extract_pages_from_bytes(bytes, label)?;
    Ok(join_pages(&pages))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn pages_are_joined_with_blank_line_in_order() {
        let pages = vec![
            PageText {
                number: 1,
                text: "Experience\n".to_string(),
            },
            PageText {
                number: 2,
                text: "  Education".to_string(),
            },
        ];

        assert_eq!(join_pages(&pages), "Experience\n\nEducation");
    }

    #[test]
    fn unparseable_file_is_an_extraction_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.pdf");
        fs::write(&path, b"%PDF-1.4\n%broken")?;

        let result = extract_text(&path);
        assert!(matches!(result, Err(IngestError::Extraction(_))));
        Ok(())
    }

    #[test]
    fn unparseable_buffer_is_an_extraction_error() {
        let result = extract_text_from_bytes(b"not a pdf at all", "upload.pdf");
        match result {
            Err(IngestError::Extraction(message)) => assert!(message.contains("upload.pdf")),
            other => panic!("expected extraction error, got {other:?}"),
        }
    }
}
