//! Store error taxonomy
//!
//! Every store operation reports failure through this enum instead of
//! raising; callers turn the variants into HTTP statuses or empty results.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The supplied chat id is not a well-formed identifier. Rejected before
    /// any storage call.
    #[error("malformed chat id")]
    InvalidChatId,

    /// A message role outside {user, assistant}.
    #[error("invalid message role: {0:?}")]
    InvalidRole(String),

    /// No chat document matches the id.
    #[error("chat not found")]
    NotFound,

    /// A metadata patch was requested on a chat with no assistant message.
    #[error("chat has no assistant message")]
    NoAssistantMessage,

    /// A replace matched nothing; the document disappeared between the read
    /// and the write.
    #[error("write did not modify any document")]
    NothingModified,

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}
