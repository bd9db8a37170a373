use crate::{ChatRequest, ChatResult, EmbeddingResult, IndexError, ProviderError};
use async_trait::async_trait;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;

    /// One result per input, in input order.
    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<EmbeddingResult>, ProviderError>;

    async fn embed(&self, input: &str) -> Result<EmbeddingResult, ProviderError> {
        let mut results = self.embed_batch(&[input.to_string()]).await?;
        match results.pop() {
            Some(result) if results.is_empty() => Ok(result),
            _ => Err(ProviderError::InvalidResponse {
                provider: self.name().to_string(),
                details: "expected exactly one embedding for a single input".to_string(),
            }),
        }
    }
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResult, ProviderError>;
}

pub struct ScoredEntry<'a> {
    pub position: usize,
    pub text: &'a str,
    pub score: f32,
}

pub trait VectorIndex {
    fn insert(&mut self, text: String, vector: Vec<f32>) -> Result<(), IndexError>;

    /// At most `k` distinct entries, best match first.
    fn nearest(&self, query_vector: &[f32], k: usize) -> Result<Vec<ScoredEntry<'_>>, IndexError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
