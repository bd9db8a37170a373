//! Stub providers and in-memory PDF fixtures shared by unit tests.

use crate::index::KnowledgeIndex;
use crate::traits::{ChatProvider, EmbeddingProvider};
use crate::{
    CharacterNgramEmbedder, ChatRequest, ChatResult, ChatRole, EmbeddingResult, ProviderError,
};
use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Builds a PDF with one page per entry; an empty entry yields a page with
/// no text operators at all.
pub(crate) fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let operations = if text.is_empty() {
            Vec::new()
        } else {
            vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![50.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ]
        };
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("content should encode"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Resources" => resources_id,
            "Contents" => content_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("pdf should serialize");
    bytes
}

pub(crate) async fn index_of(texts: &[&str]) -> KnowledgeIndex {
    let chunks = texts.iter().map(|text| text.to_string()).collect();
    KnowledgeIndex::build(chunks, Arc::new(CharacterNgramEmbedder::default()), 8)
        .await
        .expect("ngram embedding never fails")
}

/// Replies with the system context it was given, so tests can see exactly
/// which chunks reached the model. Requests without a system message are
/// rephrase requests; they get `rephrase` back when set.
#[derive(Default)]
pub(crate) struct EchoChat {
    calls: AtomicUsize,
    rephrase: Option<String>,
}

impl EchoChat {
    pub(crate) fn with_rephrase(rephrase: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            rephrase: Some(rephrase.to_string()),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatProvider for EchoChat {
    fn name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResult, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let system = request
            .messages
            .iter()
            .find(|message| message.role == ChatRole::System);

        let reply = match (system, &self.rephrase) {
            (Some(system), _) => format!("echo: {}", system.content),
            (None, Some(rephrase)) => rephrase.clone(),
            (None, None) => request
                .messages
                .last()
                .map(|message| message.content.clone())
                .unwrap_or_default(),
        };

        Ok(ChatResult { reply, usage: None })
    }
}

pub(crate) struct FailingChat;

#[async_trait]
impl ChatProvider for FailingChat {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _request: &ChatRequest) -> Result<ChatResult, ProviderError> {
        Err(ProviderError::Request("stubbed chat failure".to_string()))
    }
}

/// Succeeds with a whitespace-only reply.
pub(crate) struct BlankChat;

#[async_trait]
impl ChatProvider for BlankChat {
    fn name(&self) -> &str {
        "blank"
    }

    async fn complete(&self, _request: &ChatRequest) -> Result<ChatResult, ProviderError> {
        Ok(ChatResult {
            reply: "   ".to_string(),
            usage: None,
        })
    }
}

pub(crate) struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn name(&self) -> &str {
        "failing"
    }

    async fn embed_batch(&self, _inputs: &[String]) -> Result<Vec<EmbeddingResult>, ProviderError> {
        Err(ProviderError::Request("stubbed embedding failure".to_string()))
    }
}
