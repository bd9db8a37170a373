mod render;
mod web;

use anyhow::Context;
use chrono::Utc;
use clap::{ArgAction, Parser, ValueEnum};
use pdf_chat_core::providers::openai::{DEFAULT_BASE_URL, DEFAULT_CHAT_MODEL, DEFAULT_EMBEDDING_MODEL};
use pdf_chat_core::{
    CharacterNgramEmbedder, ChunkingConfig, ConversationalResponder, EmbeddingProvider,
    IngestionPipeline, OpenAiChat, OpenAiConfig, OpenAiEmbedder, ResponderSettings, RetryPolicy,
    SessionRegistry, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, DEFAULT_EMBEDDING_BATCH_SIZE,
    DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_RETRIEVAL_K,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use web::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EmbeddingBackend {
    /// Remote OpenAI-compatible embeddings endpoint.
    Openai,
    /// Local character-trigram hashing; no network, lower quality.
    Ngram,
}

#[derive(Parser)]
#[command(name = "pdf-chat-server", version)]
struct Cli {
    /// Address the web UI listens on
    #[arg(long, env = "PDF_CHAT_BIND", default_value = "127.0.0.1:8501")]
    bind: SocketAddr,

    /// Page heading
    #[arg(long, env = "PDF_CHAT_TITLE", default_value = "HR Onboarding And Automation")]
    title: String,

    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    /// Base URL of the OpenAI-compatible API
    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    openai_base_url: String,

    /// Chat completion model
    #[arg(long, env = "PDF_CHAT_MODEL", default_value = DEFAULT_CHAT_MODEL)]
    chat_model: String,

    /// Sampling temperature for answers
    #[arg(long, env = "PDF_CHAT_TEMPERATURE", default_value_t = 0.7)]
    temperature: f32,

    /// Embedding backend used to index chunks and queries
    #[arg(long, env = "PDF_CHAT_EMBEDDINGS", value_enum, default_value_t = EmbeddingBackend::Openai)]
    embeddings: EmbeddingBackend,

    /// Embedding model (openai backend)
    #[arg(long, env = "PDF_CHAT_EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    /// Vector size (ngram backend)
    #[arg(long, default_value_t = DEFAULT_EMBEDDING_DIMENSIONS)]
    ngram_dimensions: usize,

    /// Chunks sent per embedding request
    #[arg(long, default_value_t = DEFAULT_EMBEDDING_BATCH_SIZE)]
    embedding_batch_size: usize,

    /// Per-request timeout for provider calls, in seconds
    #[arg(long, env = "PDF_CHAT_TIMEOUT_SECS", default_value_t = 60)]
    request_timeout_secs: u64,

    /// Retries after a transient provider failure
    #[arg(long, env = "PDF_CHAT_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Maximum characters per chunk
    #[arg(long, env = "PDF_CHAT_CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Characters shared between consecutive chunks
    #[arg(long, env = "PDF_CHAT_CHUNK_OVERLAP", default_value_t = DEFAULT_CHUNK_OVERLAP)]
    chunk_overlap: usize,

    /// Chunks retrieved per question
    #[arg(long, env = "PDF_CHAT_RETRIEVAL_K", default_value_t = DEFAULT_RETRIEVAL_K)]
    retrieval_k: usize,

    /// Rewrite follow-up questions into standalone ones before retrieval
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    rephrase_follow_ups: bool,

    /// Minutes a session may sit unused before it is dropped
    #[arg(long, env = "PDF_CHAT_SESSION_IDLE_MINUTES", default_value_t = 60)]
    session_idle_minutes: u64,

    /// Upper bound on a single upload request, in megabytes
    #[arg(long, default_value_t = 64)]
    max_upload_mb: usize,
}

impl Cli {
    fn responder_settings(&self) -> anyhow::Result<ResponderSettings> {
        anyhow::ensure!(self.retrieval_k > 0, "--retrieval-k must be at least 1");
        Ok(ResponderSettings {
            retrieval_k: self.retrieval_k,
            temperature: Some(self.temperature),
            rephrase_follow_ups: self.rephrase_follow_ups,
        })
    }

    fn session_idle_timeout(&self) -> anyhow::Result<Duration> {
        anyhow::ensure!(
            self.session_idle_minutes > 0,
            "--session-idle-minutes must be at least 1"
        );
        Ok(Duration::from_secs(self.session_idle_minutes.saturating_mul(60)))
    }

    fn openai_config(&self) -> anyhow::Result<OpenAiConfig> {
        let api_key = self
            .openai_api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .context("OPENAI_API_KEY must be set (flag, environment or .env file)")?;

        Ok(OpenAiConfig {
            api_key,
            base_url: self.openai_base_url.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs),
            retry: RetryPolicy {
                max_retries: self.max_retries,
                ..RetryPolicy::default()
            },
        })
    }

    fn embedder(&self, openai: &OpenAiConfig) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
        let embedder: Arc<dyn EmbeddingProvider> = match self.embeddings {
            EmbeddingBackend::Openai => Arc::new(
                OpenAiEmbedder::new(openai, &self.embedding_model)
                    .context("failed to build embedding client")?,
            ),
            EmbeddingBackend::Ngram => Arc::new(CharacterNgramEmbedder {
                dimensions: self.ngram_dimensions,
            }),
        };
        Ok(embedder)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let chunking = ChunkingConfig::new(cli.chunk_size, cli.chunk_overlap)?;
    let settings = cli.responder_settings()?;
    let idle_timeout = cli.session_idle_timeout()?;
    let openai = cli.openai_config()?;
    let embedder = cli.embedder(&openai)?;
    let chat = OpenAiChat::new(&openai, &cli.chat_model).context("failed to build chat client")?;

    let pipeline = IngestionPipeline::new(chunking, embedder, cli.embedding_batch_size)?;
    let responder = ConversationalResponder::new(Arc::new(chat), settings);

    let sessions = SessionRegistry::with_idle_timeout(idle_timeout);
    let sweeper = sessions.spawn_idle_sweeper(Duration::from_secs(60));

    let state = AppState {
        sessions,
        pipeline: Arc::new(pipeline),
        responder: Arc::new(responder),
        title: Arc::from(cli.title.as_str()),
    };
    let app = web::router(state, cli.max_upload_mb.saturating_mul(1024 * 1024));

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        bind = %cli.bind,
        chat_model = %cli.chat_model,
        embeddings = ?cli.embeddings,
        chunk_size = chunking.chunk_size,
        chunk_overlap = chunking.chunk_overlap,
        retrieval_k = settings.retrieval_k,
        session_idle_secs = idle_timeout.as_secs(),
        "pdf-chat-server boot"
    );

    let listener = tokio::net::TcpListener::bind(cli.bind)
        .await
        .with_context(|| format!("failed to bind {}", cli.bind))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server shutdown")?;
    sweeper.abort();

    info!("pdf-chat-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(%error, "failed to listen for shutdown signal");
    }
}
