pub mod chunking;
pub mod conversation;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod index;
pub mod ingest;
pub mod models;
pub mod providers;
pub mod session;
pub mod traits;

#[cfg(test)]
pub(crate) mod test_support;

pub use chunking::{split_text, ChunkingConfig, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
pub use conversation::{ConversationalResponder, Exchange, ResponderSettings};
pub use embeddings::{CharacterNgramEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{IndexError, IngestError, ProviderError, SessionError};
pub use extractor::{extract_text, LopdfExtractor, PageText, PdfExtractor};
pub use index::{
    InMemoryVectorIndex, KnowledgeIndex, DEFAULT_EMBEDDING_BATCH_SIZE, DEFAULT_RETRIEVAL_K,
};
pub use ingest::{digest_documents, IngestionPipeline};
pub use models::{
    ChatMessage, ChatRequest, ChatResult, ChatRole, ConversationHistory, ConversationTurn,
    EmbeddingResult, IngestionReport, PdfDocument, RetrievedChunk, Role, TokenUsage,
};
pub use providers::{OpenAiChat, OpenAiConfig, OpenAiEmbedder, RetryPolicy};
pub use session::{Session, SessionRegistry, DEFAULT_SESSION_IDLE_TIMEOUT};
pub use traits::{ChatProvider, EmbeddingProvider, VectorIndex};
