use crate::conversation::{ConversationalResponder, Exchange};
use crate::index::KnowledgeIndex;
use crate::ingest::IngestionPipeline;
use crate::{ConversationHistory, IngestionReport, PdfDocument, SessionError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::info;
use uuid::Uuid;

/// Everything one user works with: the current index and the transcript.
pub struct Session {
    id: Uuid,
    index: Option<KnowledgeIndex>,
    history: ConversationHistory,
    last_ingestion: Option<IngestionReport>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            index: None,
            history: ConversationHistory::new(),
            last_ingestion: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn index(&self) -> Option<&KnowledgeIndex> {
        self.index.as_ref()
    }

    pub fn last_ingestion(&self) -> Option<&IngestionReport> {
        self.last_ingestion.as_ref()
    }

    /// Builds a new index from `documents` and swaps it in. Answers given
    /// against the old documents are cleared with it. On failure the session
    /// is left exactly as it was.
    pub async fn process(
        &mut self,
        pipeline: &IngestionPipeline,
        documents: &[PdfDocument],
    ) -> Result<&IngestionReport, SessionError> {
        let (index, report) = pipeline.run(documents).await?;

        if !self.history.is_empty() {
            info!(session = %self.id, turns = self.history.len(), "clearing history for new documents");
        }
        self.index = Some(index);
        self.history.clear();
        Ok(&*self.last_ingestion.insert(report))
    }

    /// Appends the question and the answer together, or nothing at all.
    pub async fn ask(
        &mut self,
        responder: &ConversationalResponder,
        question: &str,
    ) -> Result<&ConversationHistory, SessionError> {
        let index = self.index.as_ref().ok_or(SessionError::NotReady)?;
        let Exchange {
            question, answer, ..
        } = responder.ask(index, &self.history, question).await?;

        self.history.push_exchange(question, answer);
        Ok(&self.history)
    }
}

/// Sessions untouched for this long are dropped by `purge_idle`.
pub const DEFAULT_SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

struct RegistryEntry {
    session: Arc<Mutex<Session>>,
    last_used: Instant,
}

/// Owns every live session; each session sits behind its own lock so one
/// user's slow provider call never blocks another's.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<Uuid, RegistryEntry>>>,
    idle_timeout: Duration,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::with_idle_timeout(DEFAULT_SESSION_IDLE_TIMEOUT)
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            idle_timeout,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Registers a fresh session. Idle sessions are swept first.
    pub async fn create(&self) -> Uuid {
        self.purge_idle().await;

        let session = Session::new();
        let id = session.id();
        self.sessions.write().await.insert(
            id,
            RegistryEntry {
                session: Arc::new(Mutex::new(session)),
                last_used: Instant::now(),
            },
        );
        info!(session = %id, "session created");
        id
    }

    /// Looks a session up and marks it as used.
    pub async fn get(&self, id: &Uuid) -> Option<Arc<Mutex<Session>>> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(id)?;
        entry.last_used = Instant::now();
        Some(entry.session.clone())
    }

    pub async fn remove(&self, id: &Uuid) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    /// Drops every session not looked up within the idle timeout and returns
    /// how many went. Handlers already holding a session keep their handle.
    pub async fn purge_idle(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| now.duration_since(entry.last_used) < self.idle_timeout);
        let purged = before - sessions.len();
        if purged > 0 {
            info!(purged, remaining = sessions.len(), "expired idle sessions");
        }
        purged
    }

    /// Runs `purge_idle` every `period` until the runtime shuts down.
    pub fn spawn_idle_sweeper(&self, period: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                registry.purge_idle().await;
            }
        })
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
