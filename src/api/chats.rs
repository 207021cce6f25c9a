//! Chat endpoints

use crate::TASK_SENDER;
use crate::api::ApiError;
use crate::api::chats::schemas::{ChatList, GenerateRequest, GenerateResponse, HistoryParams};
use crate::core::assistant::{self, ChatMessage, InferenceTask};
use crate::core::export;
use crate::core::services::UNKNOWN_MODEL;
use crate::core::traits::{ChatExport, ChatStore};
use axum::extract::{Path, Query};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use di_axum::Inject;
use log::warn;
use serde_json::{Map, json};
use tokio::time::Instant;

const PER_PAGE: i64 = 10;
const TITLE_PROMPT_LENGTH: usize = 30;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_chats))
        .route("/generate", post(generate_response))
        .route("/export/:format", get(export_chats))
        .route("/:id", get(chat_details).delete(delete_chat))
        .route("/:id/messages", get(chat_messages))
}

/// One conversation turn: persist the user's message, generate a reply with
/// the whole history as context, persist the reply and stamp it with timing
/// metadata. The user's turn survives a failed generation.
async fn generate_response(
    Inject(store): Inject<dyn ChatStore>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let request_start = Instant::now();

    let prompt = request.prompt.unwrap_or_default();
    if prompt.trim().is_empty() {
        return Err(ApiError::bad_request("prompt must not be empty"));
    }

    let chat_id = match request.chat_id {
        Some(id) => id,
        None => store.create_chat(Some(title_from_prompt(&prompt))).await?,
    };

    store.append_message(&chat_id, "user", prompt).await?;
    let history = store.history(&chat_id).await?;

    let chat_messages: Vec<ChatMessage> = history.iter().map(ChatMessage::from).collect();
    let (task, mut receiver) = InferenceTask::new(chat_messages);

    let task_sender = TASK_SENDER
        .get()
        .ok_or_else(|| ApiError::unavailable("generation backend is not running"))?;
    task_sender
        .send(task)
        .await
        .map_err(|_| ApiError::unavailable("generation backend is not running"))?;

    let mut response_text = String::new();
    while let Some(part) = receiver.recv().await {
        response_text.push_str(&part);
    }
    if response_text.is_empty() {
        return Err(ApiError::bad_gateway("failed to generate a response"));
    }

    store
        .append_message(&chat_id, "assistant", response_text.clone())
        .await?;

    let processing_time = (request_start.elapsed().as_secs_f64() * 100.0).round() / 100.0;
    let mut metadata = Map::new();
    metadata.insert("processing_time".to_string(), json!(processing_time));
    metadata.insert(
        "model_used".to_string(),
        json!(assistant::loaded_model_name().unwrap_or_else(|| UNKNOWN_MODEL.to_string())),
    );
    // The reply is already persisted; a failed patch only loses metadata.
    if let Err(e) = store.patch_last_assistant_message(&chat_id, metadata).await {
        warn!("failed to patch metadata on chat {chat_id}: {e}");
    }

    Ok(Json(GenerateResponse {
        chat_id,
        response: response_text,
    }))
}

async fn list_chats(
    Inject(store): Inject<dyn ChatStore>,
    Query(params): Query<HistoryParams>,
) -> Json<ChatList> {
    let filter = params.filter();
    let page = params.page.unwrap_or(1).max(1);

    let chat_page = store.list_paginated(page, PER_PAGE, &filter).await;

    Json(ChatList {
        chats: chat_page
            .chats
            .into_iter()
            .map(schemas::ChatSummary::from)
            .collect(),
        total_chats: chat_page.total_chats,
        total_pages: chat_page.total_pages,
        page,
    })
}

async fn chat_details(
    Inject(store): Inject<dyn ChatStore>,
    Path(chat_id): Path<String>,
) -> Result<Json<ChatExport>, ApiError> {
    let chat = store.chat_details(&chat_id).await?;
    Ok(Json(chat))
}

async fn chat_messages(
    Inject(store): Inject<dyn ChatStore>,
    Path(chat_id): Path<String>,
) -> Result<Json<schemas::MessagesList>, ApiError> {
    let messages = store.history(&chat_id).await?;
    Ok(Json(schemas::MessagesList { messages }))
}

async fn delete_chat(
    Inject(store): Inject<dyn ChatStore>,
    Path(chat_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    store.delete_chat(&chat_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Unpaginated export of every chat matching the filter, as a download.
async fn export_chats(
    Inject(store): Inject<dyn ChatStore>,
    Path(format): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Response, ApiError> {
    let filter = params.filter();
    let chats = store.list_for_export(&filter).await;
    let filename = format!("chat_history_{}", Utc::now().format("%Y%m%d_%H%M%S"));

    match format.as_str() {
        "json" => {
            let body = export::chats_to_json(&chats)
                .map_err(|e| ApiError::internal(format!("failed to serialize export: {e}")))?;
            Ok(attachment(body, "application/json", &format!("{filename}.json")))
        }
        "csv" => {
            let body = export::chats_to_csv(&chats)
                .map_err(|e| ApiError::internal(format!("failed to render export: {e}")))?;
            Ok(attachment(body, "text/csv; charset=utf-8", &format!("{filename}.csv")))
        }
        _ => Err(ApiError::bad_request("unsupported export format")),
    }
}

fn attachment(body: impl IntoResponse, content_type: &str, filename: &str) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response()
}

fn title_from_prompt(prompt: &str) -> String {
    let head: String = prompt.chars().take(TITLE_PROMPT_LENGTH).collect();
    format!("Chat: {head}...")
}

pub mod schemas {
    use crate::core::filter::ChatFilter;
    use crate::core::traits;
    use crate::infrastructure::entities::StoredMessage;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};

    #[derive(Deserialize, Debug)]
    pub struct GenerateRequest {
        pub prompt: Option<String>,
        pub chat_id: Option<String>,
    }

    #[derive(Serialize, Debug)]
    pub struct GenerateResponse {
        pub chat_id: String,
        pub response: String,
    }

    /// Listing and export query parameters.
    #[derive(Deserialize, Debug, Default)]
    pub struct HistoryParams {
        pub query: Option<String>,
        pub date_from: Option<String>,
        pub date_to: Option<String>,
        pub page: Option<i64>,
    }

    impl HistoryParams {
        pub fn filter(&self) -> ChatFilter {
            ChatFilter::from_raw(
                self.query.as_deref(),
                self.date_from.as_deref(),
                self.date_to.as_deref(),
            )
        }
    }

    #[derive(Serialize, Debug)]
    pub struct ChatSummary {
        pub chat_id: String,
        pub title: String,
        pub created_at: DateTime<Utc>,
        pub model_name: String,
        pub last_message_preview: String,
        pub last_message_time: Option<DateTime<Utc>>,
    }

    impl From<traits::ChatSummary> for ChatSummary {
        fn from(summary: traits::ChatSummary) -> Self {
            ChatSummary {
                chat_id: summary.chat_id,
                title: summary.title,
                created_at: summary.created_at,
                model_name: summary.model_name,
                last_message_preview: summary.last_message_preview,
                last_message_time: summary.last_message_time,
            }
        }
    }

    #[derive(Serialize, Debug)]
    pub struct ChatList {
        pub chats: Vec<ChatSummary>,
        pub total_chats: u64,
        pub total_pages: u64,
        pub page: i64,
    }

    #[derive(Serialize, Debug, Default)]
    pub struct MessagesList {
        pub messages: Vec<StoredMessage>,
    }
}
