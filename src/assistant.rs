//! Chat assistant and document analysis on top of the LLM client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::llm_client::{LlmClient, PromptMessage};
use crate::models::{ChatMessage, MessageRole};
use crate::store::Store;

const CHAT_SYSTEM_PROMPT: &str = "You are the virtual assistant of a healthcare consulting firm. \
Help visitors understand our services (medical billing, credentialing, practice management, \
compliance and revenue cycle consulting), answer general questions and guide them to book a \
consultation. Do not give medical diagnoses or treatment advice; suggest contacting a licensed \
professional instead. Keep answers concise and friendly.";

/// Messages of history sent with each turn, newest last.
const TRANSCRIPT_WINDOW: usize = 20;
const MAX_DOCUMENT_CHARS: usize = 12_000;
const TITLE_CHARS: usize = 50;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub session_id: Option<Uuid>,
    /// Must match the caller when present.
    #[serde(default)]
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub message: String,
    pub session_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub document_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentAnalysis {
    pub analysis: String,
    pub document_type: String,
    pub processed_at: DateTime<Utc>,
}

/// Instructions per document type; unknown types get the general prompt.
pub fn document_prompt(document_type: &str) -> &'static str {
    match document_type {
        "medical_record" => "You review medical records for a healthcare consulting firm. \
Summarize the patient history, diagnoses, procedures and any documentation gaps that could \
affect billing or coding. Do not add clinical advice.",
        "insurance" => "You review insurance documents. Summarize coverage, deductibles, \
co-pays, exclusions, prior-authorization requirements and anything the patient or practice \
should follow up on.",
        "prescription" => "You review prescriptions. List each medication with dosage, \
frequency and duration, and flag missing or unclear information. Do not recommend changes.",
        "lab_result" => "You review lab results. List each test with its value and reference \
range, point out values outside the range and suggest questions to raise with the ordering \
provider. Do not diagnose.",
        _ => "You review healthcare documents for a consulting firm. Summarize the key points, \
important dates and amounts, and any action items.",
    }
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn to_prompt(message: &ChatMessage) -> PromptMessage {
    match message.role {
        MessageRole::User => PromptMessage::user(message.content.clone()),
        MessageRole::Assistant => PromptMessage::assistant(message.content.clone()),
    }
}

/// Map LLM failures to a generic error; detail is logged.
fn llm_failure(context: &str, err: AppError) -> AppError {
    tracing::error!("{} failed: {}", context, err);
    match err {
        AppError::ExternalApiError(_) => {
            AppError::ExternalApiError("The assistant is unavailable right now".to_string())
        }
        other => other,
    }
}

pub struct AssistantService {
    store: Arc<dyn Store>,
    llm: LlmClient,
}

impl AssistantService {
    pub fn new(store: Arc<dyn Store>, llm: LlmClient) -> Self {
        Self { store, llm }
    }

    /// One chat turn. Starts a session when none is given.
    pub async fn chat(&self, user: &AuthUser, request: ChatRequest) -> Result<ChatResponse, AppError> {
        let text = request.message.trim();
        if text.is_empty() {
            return Err(AppError::BadRequest("message is required".to_string()));
        }
        if request.user_id.is_some_and(|id| id != user.id) {
            return Err(AppError::Forbidden(format!(
                "user {} tried to chat as {:?}",
                user.id, request.user_id
            )));
        }

        let session = match request.session_id {
            Some(id) => self
                .store
                .chat_session(id)
                .await?
                .filter(|s| s.user_id == user.id)
                .ok_or_else(|| AppError::NotFound(format!("Chat session {} not found", id)))?,
            None => {
                let session = self
                    .store
                    .create_chat_session(user.id, truncate_chars(text, TITLE_CHARS))
                    .await?;
                tracing::info!("Started chat session {} for {}", session.id, user.id);
                session
            }
        };

        self.store
            .append_chat_message(session.id, MessageRole::User, text)
            .await?;

        let history = self.store.chat_messages(session.id).await?;
        let skip = history.len().saturating_sub(TRANSCRIPT_WINDOW);
        let mut prompt = vec![PromptMessage::system(CHAT_SYSTEM_PROMPT)];
        prompt.extend(history.iter().skip(skip).map(to_prompt));

        let reply = self
            .llm
            .complete(&prompt, 0.7, 800)
            .await
            .map_err(|e| llm_failure("Chat completion", e))?;

        self.store
            .append_chat_message(session.id, MessageRole::Assistant, &reply)
            .await?;

        Ok(ChatResponse {
            message: reply,
            session_id: session.id,
        })
    }

    /// Stateless analysis; nothing is stored.
    pub async fn analyze_document(&self, request: DocumentRequest) -> Result<DocumentAnalysis, AppError> {
        let text = request.text.trim();
        if text.is_empty() {
            return Err(AppError::BadRequest("text is required".to_string()));
        }
        let document_type = request
            .document_type
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "general".to_string());

        let prompt = [
            PromptMessage::system(document_prompt(&document_type)),
            PromptMessage::user(format!(
                "Analyze this {} document:\n\n{}",
                document_type.replace('_', " "),
                truncate_chars(text, MAX_DOCUMENT_CHARS)
            )),
        ];

        let analysis = self
            .llm
            .complete(&prompt, 0.2, 1500)
            .await
            .map_err(|e| llm_failure("Document analysis", e))?;

        Ok(DocumentAnalysis {
            analysis,
            document_type,
            processed_at: Utc::now(),
        })
    }
}
