//! DB Repository abstractions

use crate::core::error::StoreError;
use crate::core::filter::ChatFilter;
use crate::infrastructure::database::DatabaseConnection;
use crate::infrastructure::entities::{ChatDocument, ChatSummaryRow, StoredMessage};
use crate::infrastructure::traits::ChatRepository;
use async_trait::async_trait;
use di::{Ref, injectable};
use log::error;
use sqlx::types::Json;
use uuid::Uuid;

#[injectable(ChatRepository)]
pub struct DbChatRepository {
    connection: Ref<DatabaseConnection>,
}

#[async_trait]
impl ChatRepository for DbChatRepository {
    async fn insert_chat(&self, chat: &ChatDocument) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO chats (id, title, created_at, model_name, messages) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&chat.id)
        .bind(&chat.title)
        .bind(chat.created_at.to_rfc3339())
        .bind(&chat.model_name)
        .bind(&chat.messages)
        .execute(&**self.connection)
        .await
        .map_err(|e| {
            error!("insert chat {}: {e}", chat.id);
            e
        })?;

        Ok(())
    }

    async fn find_chat(&self, id: Uuid) -> Result<Option<ChatDocument>, StoreError> {
        sqlx::query_as("SELECT id, title, created_at, model_name, messages FROM chats WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&**self.connection)
            .await
            .map_err(|e| {
                error!("find chat {id}: {e}");
                StoreError::from(e)
            })
    }

    async fn push_message(&self, id: Uuid, message: &StoredMessage) -> Result<bool, StoreError> {
        let result =
            sqlx::query("UPDATE chats SET messages = json_insert(messages, '$[#]', json(?)) WHERE id = ?")
                .bind(Json(message))
                .bind(id.to_string())
                .execute(&**self.connection)
                .await
                .map_err(|e| {
                    error!("push message to chat {id}: {e}");
                    e
                })?;

        Ok(result.rows_affected() > 0)
    }

    async fn replace_chat(&self, chat: &ChatDocument) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE chats SET title = ?, created_at = ?, model_name = ?, messages = ? WHERE id = ?",
        )
        .bind(&chat.title)
        .bind(chat.created_at.to_rfc3339())
        .bind(&chat.model_name)
        .bind(&chat.messages)
        .bind(&chat.id)
        .execute(&**self.connection)
        .await
        .map_err(|e| {
            error!("replace chat {}: {e}", chat.id);
            e
        })?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_chat(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM chats WHERE id = ?")
            .bind(id.to_string())
            .execute(&**self.connection)
            .await
            .map_err(|e| {
                error!("delete chat {id}: {e}");
                e
            })?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_chats(&self, filter: &ChatFilter) -> Result<u64, StoreError> {
        let (where_clause, params) = filter.build_where();
        let sql = format!("SELECT COUNT(*) FROM chats {where_clause}");

        let mut query = sqlx::query_as::<_, (i64,)>(&sql);
        for param in params {
            query = query.bind(param);
        }

        let (count,) = query.fetch_one(&**self.connection).await.map_err(|e| {
            error!("count chats: {e}");
            StoreError::from(e)
        })?;

        Ok(count.max(0) as u64)
    }

    async fn find_page(
        &self,
        filter: &ChatFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ChatSummaryRow>, StoreError> {
        let (where_clause, params) = filter.build_where();
        let sql = format!(
            "SELECT id, title, created_at, model_name, \
             json_extract(messages, '$[#-1]') AS last_message \
             FROM chats {where_clause} \
             ORDER BY datetime(created_at) DESC LIMIT ? OFFSET ?",
        );

        let mut query = sqlx::query_as::<_, ChatSummaryRow>(&sql);
        for param in params {
            query = query.bind(param);
        }

        query
            .bind(limit)
            .bind(offset)
            .fetch_all(&**self.connection)
            .await
            .map_err(|e| {
                error!("list chats page: {e}");
                StoreError::from(e)
            })
    }

    async fn find_all(&self, filter: &ChatFilter) -> Result<Vec<ChatDocument>, StoreError> {
        let (where_clause, params) = filter.build_where();
        let sql = format!(
            "SELECT id, title, created_at, model_name, messages FROM chats {where_clause} \
             ORDER BY datetime(created_at) DESC",
        );

        let mut query = sqlx::query_as::<_, ChatDocument>(&sql);
        for param in params {
            query = query.bind(param);
        }

        query.fetch_all(&**self.connection).await.map_err(|e| {
            error!("list chats for export: {e}");
            StoreError::from(e)
        })
    }
}
