use crate::index::{KnowledgeIndex, DEFAULT_RETRIEVAL_K};
use crate::traits::ChatProvider;
use crate::{
    ChatMessage, ChatRequest, ConversationHistory, ConversationTurn, ProviderError,
    RetrievedChunk, Role, SessionError, TokenUsage,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

const ANSWER_INSTRUCTIONS: &str = "Use the following pieces of context to answer the user's question. \
If you don't know the answer, just say that you don't know; don't try to make up an answer.";

const REPHRASE_INSTRUCTIONS: &str = "Given the following conversation and a follow up question, \
rephrase the follow up question to be a standalone question, in its original language.";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResponderSettings {
    pub retrieval_k: usize,
    pub temperature: Option<f32>,
    /// Condense follow-ups into standalone questions before retrieval.
    pub rephrase_follow_ups: bool,
}

impl Default for ResponderSettings {
    fn default() -> Self {
        Self {
            retrieval_k: DEFAULT_RETRIEVAL_K,
            temperature: None,
            rephrase_follow_ups: true,
        }
    }
}

/// One successful question/answer round. Nothing is recorded until the
/// caller appends it to a history.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub question: String,
    pub standalone_question: String,
    pub answer: String,
    pub sources: Vec<RetrievedChunk>,
    pub usage: Option<TokenUsage>,
}

pub struct ConversationalResponder {
    chat: Arc<dyn ChatProvider>,
    settings: ResponderSettings,
}

impl ConversationalResponder {
    pub fn new(chat: Arc<dyn ChatProvider>, settings: ResponderSettings) -> Self {
        Self { chat, settings }
    }

    pub fn settings(&self) -> &ResponderSettings {
        &self.settings
    }

    /// Answers `question` from the chunks in `index`, conditioned on `history`.
    /// Reads the history only.
    pub async fn ask(
        &self,
        index: &KnowledgeIndex,
        history: &ConversationHistory,
        question: &str,
    ) -> Result<Exchange, SessionError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(SessionError::EmptyQuestion);
        }

        let standalone_question = self.standalone_question(history, question).await?;
        let sources = index
            .retrieve(&standalone_question, self.settings.retrieval_k)
            .await?;

        let request = ChatRequest {
            messages: answer_messages(history, &standalone_question, &sources),
            temperature: self.settings.temperature,
        };
        let result = self.chat.complete(&request).await?;
        let answer = result.reply.trim();
        if answer.is_empty() {
            return Err(ProviderError::InvalidResponse {
                provider: self.chat.name().to_string(),
                details: "chat reply was empty".to_string(),
            }
            .into());
        }

        info!(
            provider = self.chat.name(),
            sources = sources.len(),
            history_turns = history.len(),
            "answered question"
        );

        Ok(Exchange {
            question: question.to_string(),
            standalone_question,
            answer: answer.to_string(),
            sources,
            usage: result.usage,
        })
    }

    async fn standalone_question(
        &self,
        history: &ConversationHistory,
        question: &str,
    ) -> Result<String, SessionError> {
        if history.is_empty() || !self.settings.rephrase_follow_ups {
            return Ok(question.to_string());
        }

        let request = ChatRequest {
            messages: vec![ChatMessage::user(rephrase_prompt(history, question))],
            temperature: self.settings.temperature,
        };
        let rephrased = self.chat.complete(&request).await?.reply;
        let rephrased = rephrased.trim();
        if rephrased.is_empty() {
            warn!("rephrased question was empty, using the original");
            return Ok(question.to_string());
        }

        debug!(original = question, standalone = rephrased, "rephrased follow-up");
        Ok(rephrased.to_string())
    }
}

fn speaker(role: Role) -> &'static str {
    match role {
        Role::User => "Human",
        Role::Assistant => "Assistant",
    }
}

pub fn render_history(turns: &[ConversationTurn]) -> String {
    turns
        .iter()
        .map(|turn| format!("{}: {}", speaker(turn.role), turn.content))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn rephrase_prompt(history: &ConversationHistory, question: &str) -> String {
    format!(
        "{REPHRASE_INSTRUCTIONS}\n\nChat History:\n{}\nFollow Up Input: {question}\nStandalone question:",
        render_history(history.turns())
    )
}

pub fn render_context(sources: &[RetrievedChunk]) -> String {
    sources
        .iter()
        .map(|source| source.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// System prompt carrying the retrieved context, then the prior turns with
/// their own roles, then the question being asked.
pub fn answer_messages(
    history: &ConversationHistory,
    question: &str,
    sources: &[RetrievedChunk],
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(format!(
        "{ANSWER_INSTRUCTIONS}\n----------------\n{}",
        render_context(sources)
    )));
    messages.extend(history.turns().iter().map(ChatMessage::from));
    messages.push(ChatMessage::user(question));
    messages
}
