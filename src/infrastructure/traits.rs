//! Infrastructure traits, used for DI on higher levels

use crate::core::error::StoreError;
use crate::core::filter::ChatFilter;
use crate::infrastructure::entities::{ChatDocument, ChatSummaryRow, StoredMessage};
use async_trait::async_trait;
use uuid::Uuid;

/// Raw document operations on the `chats` collection. Ids arrive already
/// validated; the service layer owns validation and all shaping logic.
#[async_trait]
pub trait ChatRepository: Send + Sync {
    async fn insert_chat(&self, chat: &ChatDocument) -> Result<(), StoreError>;

    async fn find_chat(&self, id: Uuid) -> Result<Option<ChatDocument>, StoreError>;

    /// Appends one message to the chat's message array in a single
    /// statement. Returns whether a document matched the id.
    async fn push_message(&self, id: Uuid, message: &StoredMessage) -> Result<bool, StoreError>;

    /// Replaces the whole document. Returns whether a document matched.
    async fn replace_chat(&self, chat: &ChatDocument) -> Result<bool, StoreError>;

    /// Returns whether a document was removed.
    async fn delete_chat(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn count_chats(&self, filter: &ChatFilter) -> Result<u64, StoreError>;

    /// Filtered page of chats, newest first, projecting only the last
    /// message of each transcript.
    async fn find_page(
        &self,
        filter: &ChatFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ChatSummaryRow>, StoreError>;

    /// Every chat matching the filter, newest first, full transcripts.
    async fn find_all(&self, filter: &ChatFilter) -> Result<Vec<ChatDocument>, StoreError>;
}
