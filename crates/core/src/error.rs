use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("could not read pdf '{file}': {details}")]
    PdfParse { file: String, details: String },

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} returned {status}: {body}")]
    Status {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("invalid response from {provider}: {details}")]
    InvalidResponse { provider: String, details: String },

    #[error("missing credentials: {0}")]
    MissingCredentials(String),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("provider request failed: {0}")]
    Request(String),
}

impl ProviderError {
    /// Rate limits, server errors and network hiccups are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Http(error) => {
                error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
            }
            ProviderError::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || *status >= 500
            }
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("embedding dimension {actual} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding count {vectors} doesn't match chunk count {chunks}")]
    CountMismatch { chunks: usize, vectors: usize },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("no documents have been processed yet; upload PDFs and click Process first")]
    NotReady,

    #[error("question is empty")]
    EmptyQuestion,
}

impl SessionError {
    /// True when retrying the same action later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SessionError::Provider(error) | SessionError::Index(IndexError::Provider(error)) => {
                error.is_transient()
            }
            _ => false,
        }
    }
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;
