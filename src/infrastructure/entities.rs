//! Database entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use sqlx::types::Json;
use std::fmt;
use std::str::FromStr;

/// Author of a stored message. Nothing else is a valid value; the system
/// instruction used for generation is never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One turn of a conversation as stored inside the chat document.
///
/// The fixed fields are typed; generation metadata (`processing_time`,
/// `model_used`, ...) lives in the flattened extension map so the wire shape
/// keeps the metadata keys at the top level of the message object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl StoredMessage {
    pub fn new(role: Role, content: String) -> Self {
        StoredMessage {
            role,
            content,
            timestamp: Utc::now(),
            metadata: Map::new(),
        }
    }
}

/// A full chat document: one row of the `chats` table, with the ordered
/// message transcript held as a JSON array column.
#[derive(Debug, Clone, FromRow)]
pub struct ChatDocument {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub model_name: String,
    pub messages: Json<Vec<StoredMessage>>,
}

/// Listing projection: chat-level columns plus only the last message,
/// extracted in the query instead of transferring the whole transcript.
#[derive(Debug, FromRow)]
pub struct ChatSummaryRow {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub model_name: String,
    pub last_message: Option<Json<StoredMessage>>,
}
