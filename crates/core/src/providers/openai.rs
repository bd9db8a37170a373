use super::{send_with_retry, RetryPolicy};
use crate::traits::{ChatProvider, EmbeddingProvider};
use crate::{ChatMessage, ChatRequest, ChatResult, EmbeddingResult, ProviderError, TokenUsage};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";

const PROVIDER: &str = "openai";

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, ProviderError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        Ok(Url::parse(&url)?)
    }

    fn client(&self) -> Result<Client, ProviderError> {
        let api_key = self.api_key.trim();
        if api_key.is_empty() {
            return Err(ProviderError::MissingCredentials(
                "OpenAI API key is empty".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|_| {
            ProviderError::MissingCredentials("OpenAI API key is not a valid header value".to_string())
        })?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(Client::builder()
            .timeout(self.timeout)
            .default_headers(headers)
            .build()?)
    }
}

pub struct OpenAiEmbedder {
    client: Client,
    endpoint: Url,
    model: String,
    retry: RetryPolicy,
}

impl OpenAiEmbedder {
    pub fn new(config: &OpenAiConfig, model: impl Into<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: config.client()?,
            endpoint: config.endpoint("embeddings")?,
            model: model.into(),
            retry: config.retry,
        })
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

fn embeddings_from_response(
    mut response: EmbeddingResponse,
    expected: usize,
) -> Result<Vec<EmbeddingResult>, ProviderError> {
    response.data.sort_by_key(|entry| entry.index);
    if response.data.len() != expected {
        return Err(ProviderError::InvalidResponse {
            provider: PROVIDER.to_string(),
            details: format!(
                "returned {} embeddings for {} inputs",
                response.data.len(),
                expected
            ),
        });
    }
    if response.data.iter().any(|entry| entry.embedding.is_empty()) {
        return Err(ProviderError::InvalidResponse {
            provider: PROVIDER.to_string(),
            details: "returned an empty embedding vector".to_string(),
        });
    }

    Ok(response
        .data
        .into_iter()
        .map(|entry| EmbeddingResult {
            vector: entry.embedding,
        })
        .collect())
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<EmbeddingResult>, ProviderError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let body = EmbeddingRequest {
            model: &self.model,
            input: inputs,
        };
        let response = send_with_retry(PROVIDER, &self.retry, || {
            self.client.post(self.endpoint.clone()).json(&body)
        })
        .await?;

        let parsed: EmbeddingResponse = response.json().await?;
        debug!(model = %self.model, inputs = inputs.len(), "embedded batch");
        embeddings_from_response(parsed, inputs.len())
    }
}

pub struct OpenAiChat {
    client: Client,
    endpoint: Url,
    model: String,
    retry: RetryPolicy,
}

impl OpenAiChat {
    pub fn new(config: &OpenAiConfig, model: impl Into<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: config.client()?,
            endpoint: config.endpoint("chat/completions")?,
            model: model.into(),
            retry: config.retry,
        })
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

fn chat_result_from_response(response: CompletionResponse) -> Result<ChatResult, ProviderError> {
    let reply = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .unwrap_or_default();

    if reply.is_empty() {
        return Err(ProviderError::InvalidResponse {
            provider: PROVIDER.to_string(),
            details: "chat completion has no message content".to_string(),
        });
    }

    Ok(ChatResult {
        reply,
        usage: response.usage,
    })
}

#[async_trait]
impl ChatProvider for OpenAiChat {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResult, ProviderError> {
        let body = CompletionRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
        };
        let response = send_with_retry(PROVIDER, &self.retry, || {
            self.client.post(self.endpoint.clone()).json(&body)
        })
        .await?;

        let parsed: CompletionResponse = response.json().await?;
        let result = chat_result_from_response(parsed)?;
        if let Some(usage) = result.usage {
            debug!(
                model = %self.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "chat completion finished"
            );
        }
        Ok(result)
    }
}
