//! DI "Interfaces"

use crate::core::error::StoreError;
use crate::core::filter::ChatFilter;
use crate::infrastructure::entities::{ChatDocument, StoredMessage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// Lightweight projection of a chat for paginated listings: no transcript,
/// only a preview of the last message.
#[derive(Debug, Clone)]
pub struct ChatSummary {
    pub chat_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub model_name: String,
    pub last_message_preview: String,
    pub last_message_time: Option<DateTime<Utc>>,
}

/// One page of summaries plus the totals the pagination controls need.
#[derive(Debug, Default)]
pub struct ChatPage {
    pub chats: Vec<ChatSummary>,
    pub total_chats: u64,
    pub total_pages: u64,
}

/// A full chat rendered for serialization: opaque string id, RFC 3339
/// timestamps, complete transcript. Used by the details endpoint and both
/// export formats.
#[derive(Debug, Clone, Serialize)]
pub struct ChatExport {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub model_name: String,
    pub messages: Vec<StoredMessage>,
}

impl From<ChatDocument> for ChatExport {
    fn from(chat: ChatDocument) -> Self {
        ChatExport {
            id: chat.id,
            title: chat.title,
            created_at: chat.created_at,
            model_name: chat.model_name,
            messages: chat.messages.0,
        }
    }
}

/// The conversation store façade: all reads and writes of the chats
/// collection go through here, behind an API that does not leak the storage
/// engine's query language.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Creates an empty chat and returns its opaque id. The model name is
    /// taken from the generation backend, falling back to `"unknown"`.
    async fn create_chat(&self, title: Option<String>) -> Result<String, StoreError>;

    /// Appends one message. The role string must be `user` or `assistant`
    /// and the id must be well-formed; both are rejected before any storage
    /// call.
    async fn append_message(
        &self,
        chat_id: &str,
        role: &str,
        content: String,
    ) -> Result<(), StoreError>;

    /// The full transcript, oldest first. A chat that exists but has no
    /// messages yields an empty vector; an unknown id is `NotFound`.
    async fn history(&self, chat_id: &str) -> Result<Vec<StoredMessage>, StoreError>;

    /// Merges the given keys into the most recent assistant message.
    ///
    /// The read and the write are separate storage calls; an append that
    /// lands in between is overwritten by the replace. Known race, accepted;
    /// a vanished document is still detected through the zero-row write.
    async fn patch_last_assistant_message(
        &self,
        chat_id: &str,
        metadata: Map<String, Value>,
    ) -> Result<(), StoreError>;

    /// Filtered page of summaries, newest first. `page` and `per_page` are
    /// clamped to at least 1. Storage errors degrade to an empty page.
    async fn list_paginated(&self, page: i64, per_page: i64, filter: &ChatFilter) -> ChatPage;

    /// Every matching chat with its full transcript, newest first,
    /// serialization-ready. Storage errors degrade to an empty list.
    async fn list_for_export(&self, filter: &ChatFilter) -> Vec<ChatExport>;

    /// The complete document for one chat.
    async fn chat_details(&self, chat_id: &str) -> Result<ChatExport, StoreError>;

    /// Removes the chat. `NotFound` when nothing was deleted.
    async fn delete_chat(&self, chat_id: &str) -> Result<(), StoreError>;
}
