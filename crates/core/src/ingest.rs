use crate::chunking::{split_text, ChunkingConfig};
use crate::extractor::{extract_document_pages, join_pages, LopdfExtractor};
use crate::index::{KnowledgeIndex, DEFAULT_EMBEDDING_BATCH_SIZE};
use crate::traits::EmbeddingProvider;
use crate::{IngestError, IngestionReport, PdfDocument, SessionError};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};

/// Extract, chunk and embed a document set into a fresh index.
pub struct IngestionPipeline {
    chunking: ChunkingConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl IngestionPipeline {
    pub fn new(
        chunking: ChunkingConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        batch_size: usize,
    ) -> Result<Self, IngestError> {
        chunking.validate()?;
        if batch_size == 0 {
            return Err(IngestError::InvalidArgument(
                "embedding batch size must be positive".to_string(),
            ));
        }
        Ok(Self {
            chunking,
            embedder,
            batch_size,
        })
    }

    pub fn with_defaults(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            embedder,
            batch_size: DEFAULT_EMBEDDING_BATCH_SIZE,
        }
    }

    pub fn chunking(&self) -> &ChunkingConfig {
        &self.chunking
    }

    /// All-or-nothing: if any file fails to parse, nothing is indexed.
    pub async fn run(
        &self,
        documents: &[PdfDocument],
    ) -> Result<(KnowledgeIndex, IngestionReport), SessionError> {
        if documents.is_empty() {
            return Err(IngestError::InvalidArgument("no PDF files were uploaded".to_string()).into());
        }

        let fingerprint = digest_documents(documents);
        let pages = extract_document_pages(&LopdfExtractor, documents)?;
        let text = join_pages(&pages);
        if text.trim().is_empty() {
            warn!(documents = documents.len(), "documents contain no extractable text");
        }

        let chunks = split_text(&text, &self.chunking)?;
        let chunk_count = chunks.len();
        let index = KnowledgeIndex::build(chunks, Arc::clone(&self.embedder), self.batch_size).await?;

        let report = IngestionReport {
            document_count: documents.len(),
            page_count: pages.len(),
            character_count: text.chars().count(),
            chunk_count,
            fingerprint,
            processed_at: Utc::now(),
        };
        info!(
            documents = report.document_count,
            pages = report.page_count,
            chunks = report.chunk_count,
            fingerprint = %report.fingerprint,
            "processed document set"
        );
        Ok((index, report))
    }
}

/// Content hash over the whole upload, stable across re-uploads of the same files.
pub fn digest_documents(documents: &[PdfDocument]) -> String {
    let mut hasher = Sha256::new();
    for document in documents {
        hasher.update(document.file_name.as_bytes());
        hasher.update((document.bytes.len() as u64).to_le_bytes());
        hasher.update(&document.bytes);
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{pdf_with_pages, FailingEmbedder};
    use crate::CharacterNgramEmbedder;

    fn pipeline() -> IngestionPipeline {
        IngestionPipeline::with_defaults(Arc::new(CharacterNgramEmbedder::default()))
    }

    #[test]
    fn invalid_settings_fail_up_front() {
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(CharacterNgramEmbedder::default());
        let bad_chunks = ChunkingConfig {
            chunk_size: 100,
            chunk_overlap: 100,
        };
        assert!(IngestionPipeline::new(bad_chunks, embedder.clone(), 8).is_err());
        assert!(IngestionPipeline::new(ChunkingConfig::default(), embedder, 0).is_err());
    }

    #[test]
    fn digest_is_reproducible_and_content_sensitive() {
        let first = vec![PdfDocument::new("a.pdf", b"abc".to_vec())];
        let same = vec![PdfDocument::new("a.pdf", b"abc".to_vec())];
        let other = vec![PdfDocument::new("a.pdf", b"abd".to_vec())];

        assert_eq!(digest_documents(&first), digest_documents(&same));
        assert_ne!(digest_documents(&first), digest_documents(&other));
    }

    #[tokio::test]
    async fn one_page_pdf_becomes_a_one_entry_index() {
        let documents = vec![PdfDocument::new(
            "handbook.pdf",
            pdf_with_pages(&["Employee handbook: vacation policy is 15 days."]),
        )];

        let (index, report) = pipeline().run(&documents).await.unwrap();

        assert_eq!(report.document_count, 1);
        assert_eq!(report.page_count, 1);
        assert_eq!(report.chunk_count, 1);
        assert_eq!(index.len(), 1);

        let hits = index.retrieve("How many vacation days?", 4).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "Employee handbook: vacation policy is 15 days.");
    }

    #[tokio::test]
    async fn blank_pdf_builds_an_empty_index() {
        let documents = vec![PdfDocument::new("scan.pdf", pdf_with_pages(&[""]))];

        let (index, report) = pipeline().run(&documents).await.unwrap();
        assert_eq!(report.chunk_count, 0);
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn empty_upload_is_rejected() {
        let error = pipeline().run(&[]).await.err().expect("empty upload must fail");
        assert!(matches!(error, SessionError::Ingest(IngestError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn embedding_failure_surfaces_as_index_error() {
        let pipeline = IngestionPipeline::with_defaults(Arc::new(FailingEmbedder));
        let documents = vec![PdfDocument::new("a.pdf", pdf_with_pages(&["Some text"]))];

        let error = pipeline.run(&documents).await.err().expect("provider failure");
        assert!(matches!(error, SessionError::Index(_)));
    }
}
