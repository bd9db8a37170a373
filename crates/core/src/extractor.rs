use crate::error::IngestError;
use crate::models::PdfDocument;
use lopdf::Document;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait PdfExtractor {
    fn extract_pages(&self, document: &PdfDocument) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, document: &PdfDocument) -> Result<Vec<PageText>, IngestError> {
        let parse_error = |details: String| IngestError::PdfParse {
            file: document.file_name.clone(),
            details,
        };

        let pdf = Document::load_mem(&document.bytes).map_err(|error| parse_error(error.to_string()))?;

        // get_pages is a BTreeMap keyed by page number, so this walks in page order.
        let mut pages = Vec::new();
        for (page_no, _page_id) in pdf.get_pages() {
            let text = pdf
                .extract_text(&[page_no])
                .map_err(|error| parse_error(error.to_string()))?;

            pages.push(PageText {
                number: page_no,
                text,
            });
        }

        debug!(file = %document.file_name, pages = pages.len(), "extracted pdf pages");
        Ok(pages)
    }
}

/// Every page of every document, in document order then page order.
pub fn extract_document_pages<E: PdfExtractor>(
    extractor: &E,
    documents: &[PdfDocument],
) -> Result<Vec<PageText>, IngestError> {
    let mut pages = Vec::new();
    for document in documents {
        pages.extend(extractor.extract_pages(document)?);
    }
    Ok(pages)
}

/// Concatenated text of all pages with no page or document separators.
/// Image-only PDFs contribute nothing; there is no OCR pass.
pub fn extract_text(documents: &[PdfDocument]) -> Result<String, IngestError> {
    let pages = extract_document_pages(&LopdfExtractor, documents)?;
    Ok(join_pages(&pages))
}

pub fn join_pages(pages: &[PageText]) -> String {
    pages.iter().map(|page| page.text.as_str()).collect()
}
