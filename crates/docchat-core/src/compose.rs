//! Retrieval-augmented answer composition.
//!
//! [`Composer::answer`] turns a [`ChatRequest`] into answer text:
//!
//! - [`ChatMode::General`]: the question goes straight to the chat model
//!   behind a fixed system instruction.
//! - [`ChatMode::Docs`] / [`ChatMode::Cms`]: the question is embedded,
//!   the selected file's nearest chunks are fetched, re-sorted into
//!   document order by their stored `order`, joined into one context
//!   string, and sent with a prompt restricting the model to that context.
//!
//! Provider failures never escape: they are logged and returned as an
//! apology in the answer text, because the chat surface has no error state.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::chat::{ChatMessage, ChatModel};
use crate::embedding::{embed_query, Embedder};
use crate::error::ProviderError;
use crate::models::{Collection, ScoredChunk};
use crate::store::VectorStore;

/// Default number of chunks retrieved for a file-grounded answer.
pub const DEFAULT_RETRIEVAL_LIMIT: usize = 20;

/// Answer returned when a file-grounded mode has no file selected.
pub const NO_FILE_SELECTED: &str = "Please select a file first so I know what to read.";

const GENERAL_SYSTEM_PROMPT: &str = "Your name is 'Echo Bot'. You are a helpful AI assistant with three modes. ALWAYS mention all modes when asked:

**Chat Mode** (current): Answer questions, help with writing, explain concepts, translate text, brainstorm ideas, and casual conversations.

**Docs Mode**: Analyze uploaded documents and CMS content.

**CMS Mode**: Similar to Docs mode, focused on CMS content.

Always tell users they can switch modes using the toggle above.";

const GROUNDED_SYSTEM_PROMPT: &str = "You are 'Echo Bot'. Always greet the user and reference the selected file.
Answer questions using ONLY the content of the selected file.";

/// Chat context selected by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    /// Unscoped conversation.
    #[default]
    #[serde(alias = "chat")]
    General,
    /// Grounded on an uploaded document.
    Docs,
    /// Grounded on uploaded CMS content.
    Cms,
}

impl ChatMode {
    /// The upload collection a grounded mode reads from.
    pub fn collection(self) -> Option<Collection> {
        match self {
            ChatMode::General => None,
            ChatMode::Docs => Some(Collection::Documents),
            ChatMode::Cms => Some(Collection::Cms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub question: String,
    #[serde(default)]
    pub mode: ChatMode,
    #[serde(default)]
    pub selected_file_id: Option<String>,
    #[serde(default)]
    pub selected_filename: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
}

/// Answer composer over injected embedding, vector-store and chat clients.
///
/// Build it once at startup and share it; it holds no per-request state.
#[derive(Clone)]
pub struct Composer {
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorStore>,
    chat: Arc<dyn ChatModel>,
    retrieval_limit: usize,
}

impl Composer {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorStore>,
        chat: Arc<dyn ChatModel>,
    ) -> Self {
        Self {
            embedder,
            vectors,
            chat,
            retrieval_limit: DEFAULT_RETRIEVAL_LIMIT,
        }
    }

    pub fn with_retrieval_limit(mut self, limit: usize) -> Self {
        self.retrieval_limit = limit;
        self
    }

    /// Produce answer text for `req`. Never fails.
    pub async fn answer(&self, req: &ChatRequest) -> String {
        let result = match req.mode {
            ChatMode::General => self.answer_general(&req.question).await,
            ChatMode::Docs | ChatMode::Cms => {
                let (Some(file_id), Some(filename)) = (
                    non_blank(req.selected_file_id.as_deref()),
                    non_blank(req.selected_filename.as_deref()),
                ) else {
                    return NO_FILE_SELECTED.to_string();
                };
                let label = req
                    .mode
                    .collection()
                    .map(Collection::label)
                    .unwrap_or("file");
                self.answer_grounded(&req.question, file_id, filename, label)
                    .await
            }
        };

        match result {
            Ok(answer) => answer,
            Err(err) => {
                tracing::error!(mode = ?req.mode, error = %err, "answer failed");
                format!("Sorry, I couldn't answer that right now: {}", err)
            }
        }
    }

    async fn answer_general(&self, question: &str) -> Result<String, ProviderError> {
        let messages = [
            ChatMessage::system(GENERAL_SYSTEM_PROMPT),
            ChatMessage::user(question),
        ];
        self.chat.complete(&messages).await
    }

    async fn answer_grounded(
        &self,
        question: &str,
        file_id: &str,
        filename: &str,
        label: &str,
    ) -> Result<String, ProviderError> {
        let query = embed_query(self.embedder.as_ref(), question).await?;
        let hits = self
            .vectors
            .search(&query, self.retrieval_limit, file_id)
            .await?;
        tracing::debug!(file_id, hits = hits.len(), "retrieved context");

        let context = assemble_context(hits);
        let messages = [
            ChatMessage::system(GROUNDED_SYSTEM_PROMPT),
            ChatMessage::user(grounded_prompt(filename, label, &context, question)),
        ];
        self.chat.complete(&messages).await
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Join chunk texts in document order (by stored `order`, not by score).
pub fn assemble_context(mut hits: Vec<ScoredChunk>) -> String {
    hits.sort_by(|a, b| {
        a.order.cmp(&b.order).then_with(|| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    });
    hits.into_iter()
        .map(|h| h.text)
        .collect::<Vec<_>>()
        .join(" ")
}

fn grounded_prompt(filename: &str, label: &str, context: &str, question: &str) -> String {
    format!(
        "I see you've selected the {label} **{filename}**.
I can help you understand it, summarize it, or answer any questions.

File content for reference:
{context}

Question:
{question}"
    )
}
