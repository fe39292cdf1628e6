use crate::error::IngestError;
use lopdf::Document;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait PdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let document =
            Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        // get_pages is keyed by page number, so iteration is already in page order.
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| IngestError::PdfParse(format!("page {page_no}: {error}")))?;
            pages.push(PageText {
                number: page_no,
                text,
            });
        }

        if pages.is_empty() {
            return Err(IngestError::PdfParse(format!(
                "pdf has no pages: {}",
                path.display()
            )));
        }

        debug!(path = %path.display(), pages = pages.len(), "extracted pdf pages");
        Ok(pages)
    }
}

pub fn extract_page_texts(path: &Path) -> Result<Vec<PageText>, IngestError> {
    LopdfExtractor.extract_pages(path)
}
