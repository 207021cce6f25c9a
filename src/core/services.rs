//! Implementations for the services the app needs.
//!

use crate::core::assistant;
use crate::core::error::StoreError;
use crate::core::filter::ChatFilter;
use crate::core::traits::{ChatExport, ChatPage, ChatStore, ChatSummary};
use crate::infrastructure::entities::{ChatDocument, ChatSummaryRow, Role, StoredMessage};
use crate::infrastructure::traits::ChatRepository;
use async_trait::async_trait;
use chrono::Utc;
use di::{Ref, injectable};
use log::warn;
use serde_json::{Map, Value};
use sqlx::types::Json;
use uuid::Uuid;

pub const DEFAULT_CHAT_TITLE: &str = "New Chat";
pub const UNKNOWN_MODEL: &str = "unknown";
const PREVIEW_LENGTH: usize = 50;
const EMPTY_CHAT_PREVIEW: &str = "[empty chat]";

/// Message fields that are part of the fixed record and can never be
/// overwritten through a metadata patch.
const FIXED_MESSAGE_FIELDS: [&str; 3] = ["role", "content", "timestamp"];

#[injectable(ChatStore)]
pub struct ChatStoreService {
    repo: Ref<dyn ChatRepository>,
}

#[async_trait]
impl ChatStore for ChatStoreService {
    async fn create_chat(&self, title: Option<String>) -> Result<String, StoreError> {
        let chat = ChatDocument {
            id: Uuid::new_v4().to_string(),
            title: title.unwrap_or_else(|| DEFAULT_CHAT_TITLE.to_string()),
            created_at: Utc::now(),
            model_name: assistant::loaded_model_name()
                .unwrap_or_else(|| UNKNOWN_MODEL.to_string()),
            messages: Json(Vec::new()),
        };

        self.repo.insert_chat(&chat).await?;
        Ok(chat.id)
    }

    async fn append_message(
        &self,
        chat_id: &str,
        role: &str,
        content: String,
    ) -> Result<(), StoreError> {
        let role: Role = role.parse().map_err(|()| {
            warn!("invalid role {role:?} for chat {chat_id}");
            StoreError::InvalidRole(role.to_string())
        })?;
        let id = parse_chat_id(chat_id)?;

        let message = StoredMessage::new(role, content);
        if self.repo.push_message(id, &message).await? {
            Ok(())
        } else {
            warn!("chat {chat_id} not found when appending message");
            Err(StoreError::NotFound)
        }
    }

    async fn history(&self, chat_id: &str) -> Result<Vec<StoredMessage>, StoreError> {
        let id = parse_chat_id(chat_id)?;

        match self.repo.find_chat(id).await? {
            Some(chat) => Ok(chat.messages.0),
            None => {
                warn!("chat {chat_id} not found when reading history");
                Err(StoreError::NotFound)
            }
        }
    }

    async fn patch_last_assistant_message(
        &self,
        chat_id: &str,
        metadata: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let id = parse_chat_id(chat_id)?;

        let mut chat = self.repo.find_chat(id).await?.ok_or_else(|| {
            warn!("chat {chat_id} not found when patching metadata");
            StoreError::NotFound
        })?;

        let target = chat
            .messages
            .0
            .iter_mut()
            .rfind(|m| m.role == Role::Assistant)
            .ok_or_else(|| {
                warn!("chat {chat_id} has no assistant message to patch");
                StoreError::NoAssistantMessage
            })?;

        for (key, value) in metadata {
            if FIXED_MESSAGE_FIELDS.contains(&key.as_str()) {
                warn!("skipping patch of fixed message field {key:?} on chat {chat_id}");
                continue;
            }
            target.metadata.insert(key, value);
        }

        if self.repo.replace_chat(&chat).await? {
            Ok(())
        } else {
            warn!("metadata patch modified nothing on chat {chat_id}");
            Err(StoreError::NothingModified)
        }
    }

    async fn list_paginated(&self, page: i64, per_page: i64, filter: &ChatFilter) -> ChatPage {
        let page = page.max(1);
        let per_page = per_page.max(1);
        let offset = (page - 1) * per_page;

        let total_chats = match self.repo.count_chats(filter).await {
            Ok(count) => count,
            Err(_) => return ChatPage::default(),
        };
        let rows = match self.repo.find_page(filter, per_page, offset).await {
            Ok(rows) => rows,
            Err(_) => return ChatPage::default(),
        };

        ChatPage {
            chats: rows.into_iter().map(summarize).collect(),
            total_chats,
            total_pages: total_chats.div_ceil(per_page as u64),
        }
    }

    async fn list_for_export(&self, filter: &ChatFilter) -> Vec<ChatExport> {
        match self.repo.find_all(filter).await {
            Ok(chats) => chats.into_iter().map(ChatExport::from).collect(),
            Err(_) => Vec::new(),
        }
    }

    async fn chat_details(&self, chat_id: &str) -> Result<ChatExport, StoreError> {
        let id = parse_chat_id(chat_id)?;

        match self.repo.find_chat(id).await? {
            Some(chat) => Ok(chat.into()),
            None => {
                warn!("chat {chat_id} not found when reading details");
                Err(StoreError::NotFound)
            }
        }
    }

    async fn delete_chat(&self, chat_id: &str) -> Result<(), StoreError> {
        let id = parse_chat_id(chat_id)?;

        if self.repo.delete_chat(id).await? {
            Ok(())
        } else {
            warn!("chat {chat_id} not found when deleting");
            Err(StoreError::NotFound)
        }
    }
}

fn parse_chat_id(chat_id: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(chat_id).map_err(|_| {
        warn!("malformed chat id {chat_id:?}");
        StoreError::InvalidChatId
    })
}

fn summarize(row: ChatSummaryRow) -> ChatSummary {
    let (preview, last_message_time) = match row.last_message {
        Some(Json(last)) if !last.content.is_empty() => {
            let head: String = last.content.chars().take(PREVIEW_LENGTH).collect();
            (format!("{head}..."), Some(last.timestamp))
        }
        Some(Json(last)) => (EMPTY_CHAT_PREVIEW.to_string(), Some(last.timestamp)),
        None => (EMPTY_CHAT_PREVIEW.to_string(), None),
    };

    ChatSummary {
        chat_id: row.id,
        title: row.title,
        created_at: row.created_at,
        model_name: row.model_name,
        last_message_preview: preview,
        last_message_time,
    }
}
