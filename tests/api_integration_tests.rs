//! API Integration Tests
//!
//! Tests the HTTP API endpoints with a real database.
//! These tests focus on the endpoints that don't require a running model
//! backend; the generate endpoint is exercised up to the task queue.
//!
//! Tests are serialized because they share a global test pool.
//!
//! Note: The `more-di` DI framework doesn't support injecting custom pools.
//! We work around this by using `DatabaseConnection::set_test_pool()` to set
//! a global pool that the DI-created DatabaseConnection will use.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use di::{Injectable, ServiceCollection};
use di_axum::RouterServiceProviderExtensions;
use serde_json::Value;
use serial_test::serial;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio_local_chat_api::{
    api, core::services::ChatStoreService, infrastructure::database::DatabaseConnection,
    infrastructure::repositories::DbChatRepository,
};
use tower::ServiceExt;
use uuid::Uuid;

/// Counter for unique test database URIs
static TEST_DB_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Setup test database with migrations and returns pool
/// Uses in-memory SQLite for test isolation
async fn setup_test_db() -> SqlitePool {
    let db_num = TEST_DB_COUNTER.fetch_add(1, Ordering::SeqCst);
    // Use file URI format with shared cache - each test gets a unique DB
    let db_url = format!("sqlite:file:apitestdb{}?mode=memory&cache=shared", db_num);

    let pool = SqlitePool::connect(&db_url).await.unwrap();
    sqlx::migrate!().run(&pool).await.unwrap();

    // Set this pool as the global test pool so DI uses it
    DatabaseConnection::set_test_pool(pool.clone());

    pool
}

/// Clean up after test
fn cleanup_test_db() {
    DatabaseConnection::clear_test_pool();
}

/// Create test app - uses the global test pool set by setup_test_db()
fn create_test_app() -> axum::Router {
    let provider = ServiceCollection::new()
        .add(DatabaseConnection::transient())
        .add(DbChatRepository::scoped())
        .add(ChatStoreService::scoped())
        .build_provider()
        .unwrap();

    axum::Router::new()
        .nest("/chats", api::chats::router())
        .with_provider(provider)
}

async fn insert_chat(pool: &SqlitePool, title: &str, created_at: &str, messages: &str) -> String {
    let id = Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO chats (id, title, created_at, model_name, messages) VALUES (?, ?, ?, ?, ?)")
        .bind(&id)
        .bind(title)
        .bind(created_at)
        .bind("test-model")
        .bind(messages)
        .execute(pool)
        .await
        .unwrap();
    id
}

async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    (status, json)
}

#[tokio::test]
#[serial]
async fn test_list_chats_empty() {
    let _pool = setup_test_db().await;

    let (status, json) = get_json(create_test_app(), "/chats").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["chats"].as_array().unwrap().len(), 0);
    assert_eq!(json["total_chats"], 0);
    assert_eq!(json["total_pages"], 0);
    assert_eq!(json["page"], 1);

    cleanup_test_db();
}

#[tokio::test]
#[serial]
async fn test_list_chats_paginates_newest_first() {
    let pool = setup_test_db().await;

    for day in 1..=25 {
        insert_chat(
            &pool,
            &format!("Chat {day}"),
            &format!("2024-03-{day:02}T10:00:00+00:00"),
            "[]",
        )
        .await;
    }

    let (status, json) = get_json(create_test_app(), "/chats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["chats"].as_array().unwrap().len(), 10);
    assert_eq!(json["total_chats"], 25);
    assert_eq!(json["total_pages"], 3);
    assert_eq!(json["chats"][0]["title"], "Chat 25");

    let (_, json) = get_json(create_test_app(), "/chats?page=3").await;
    assert_eq!(json["chats"].as_array().unwrap().len(), 5);
    assert_eq!(json["page"], 3);

    cleanup_test_db();
}

#[tokio::test]
#[serial]
async fn test_list_chats_includes_last_message_preview() {
    let pool = setup_test_db().await;

    insert_chat(
        &pool,
        "With messages",
        "2024-03-01T10:00:00+00:00",
        r#"[{"role":"user","content":"hi","timestamp":"2024-03-01T10:00:01+00:00"},
            {"role":"assistant","content":"hello","timestamp":"2024-03-01T10:00:02+00:00"}]"#,
    )
    .await;
    insert_chat(&pool, "Empty", "2024-03-02T10:00:00+00:00", "[]").await;

    let (_, json) = get_json(create_test_app(), "/chats").await;
    let chats = json["chats"].as_array().unwrap();

    assert_eq!(chats[0]["title"], "Empty");
    assert_eq!(chats[0]["last_message_preview"], "[empty chat]");
    assert_eq!(chats[1]["last_message_preview"], "hello...");
    assert_eq!(chats[1]["model_name"], "test-model");

    cleanup_test_db();
}

#[tokio::test]
#[serial]
async fn test_list_chats_with_filters() {
    let pool = setup_test_db().await;

    insert_chat(&pool, "Hello world", "2024-01-15T12:00:00+00:00", "[]").await;
    insert_chat(
        &pool,
        "Unrelated",
        "2024-01-16T12:00:00+00:00",
        r#"[{"role":"user","content":"say hello there","timestamp":"2024-01-16T12:00:01+00:00"}]"#,
    )
    .await;
    insert_chat(&pool, "February", "2024-02-01T00:00:01+00:00", "[]").await;

    let (_, json) = get_json(create_test_app(), "/chats?query=hello").await;
    assert_eq!(json["total_chats"], 2);

    let (_, json) = get_json(
        create_test_app(),
        "/chats?date_from=2024-01-01&date_to=2024-01-31",
    )
    .await;
    assert_eq!(json["total_chats"], 2);

    let (_, json) = get_json(
        create_test_app(),
        "/chats?query=hello&date_from=2024-01-16&date_to=2024-01-31",
    )
    .await;
    assert_eq!(json["total_chats"], 1);

    cleanup_test_db();
}

#[tokio::test]
#[serial]
async fn test_chat_details_success() {
    let pool = setup_test_db().await;

    let chat_id = insert_chat(
        &pool,
        "Detailed",
        "2024-03-01T10:00:00+00:00",
        r#"[{"role":"assistant","content":"hello","timestamp":"2024-03-01T10:00:02+00:00","processing_time":1.23}]"#,
    )
    .await;

    let (status, json) = get_json(create_test_app(), &format!("/chats/{chat_id}")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], chat_id);
    assert_eq!(json["title"], "Detailed");
    assert!(json["created_at"].is_string());
    let message = &json["messages"][0];
    assert_eq!(message["role"], "assistant");
    assert_eq!(message["processing_time"], 1.23);
    assert!(message["timestamp"].is_string());

    cleanup_test_db();
}

#[tokio::test]
#[serial]
async fn test_chat_details_not_found_and_malformed() {
    let _pool = setup_test_db().await;

    let (status, json) =
        get_json(create_test_app(), &format!("/chats/{}", Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].is_string());

    let (status, _) = get_json(create_test_app(), "/chats/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    cleanup_test_db();
}

#[tokio::test]
#[serial]
async fn test_chat_messages_endpoint() {
    let pool = setup_test_db().await;

    let chat_id = insert_chat(
        &pool,
        "Transcript",
        "2024-03-01T10:00:00+00:00",
        r#"[{"role":"user","content":"hi","timestamp":"2024-03-01T10:00:01+00:00"}]"#,
    )
    .await;

    let (status, json) =
        get_json(create_test_app(), &format!("/chats/{chat_id}/messages")).await;

    assert_eq!(status, StatusCode::OK);
    let messages = json["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["content"], "hi");

    cleanup_test_db();
}

#[tokio::test]
#[serial]
async fn test_delete_chat() {
    let pool = setup_test_db().await;

    let chat_id = insert_chat(&pool, "Doomed", "2024-03-01T10:00:00+00:00", "[]").await;

    let response = create_test_app()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/chats/{chat_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // Second delete: nothing left to remove.
    let response = create_test_app()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/chats/{chat_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    cleanup_test_db();
}

#[tokio::test]
#[serial]
async fn test_export_json() {
    let pool = setup_test_db().await;

    insert_chat(
        &pool,
        "Exported",
        "2024-03-01T10:00:00+00:00",
        r#"[{"role":"user","content":"hi","timestamp":"2024-03-01T10:00:01+00:00"}]"#,
    )
    .await;

    let response = create_test_app()
        .oneshot(
            Request::builder()
                .uri("/chats/export/json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response
        .headers()
        .get("content-disposition")
        .unwrap()
        .to_str()
        .unwrap()
        .to_owned();
    assert!(disposition.starts_with("attachment; filename=\"chat_history_"));
    assert!(disposition.ends_with(".json\""));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    let chats = json.as_array().unwrap();
    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0]["title"], "Exported");
    assert_eq!(chats[0]["messages"][0]["content"], "hi");

    cleanup_test_db();
}

#[tokio::test]
#[serial]
async fn test_export_csv_flattens_messages() {
    let pool = setup_test_db().await;

    insert_chat(
        &pool,
        "Exported",
        "2024-03-01T10:00:00+00:00",
        r#"[{"role":"user","content":"hi","timestamp":"2024-03-01T10:00:01+00:00"},
            {"role":"assistant","content":"hello","timestamp":"2024-03-01T10:00:02+00:00","processing_time":1.23}]"#,
    )
    .await;

    let response = create_test_app()
        .oneshot(
            Request::builder()
                .uri("/chats/export/csv")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/csv")
    );

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    // UTF-8 byte-order mark for spreadsheet tools.
    assert_eq!(&body[..3], [0xEF, 0xBB, 0xBF]);

    let text = String::from_utf8(body.to_vec()).unwrap();
    let lines: Vec<&str> = text.trim_start_matches('\u{feff}').trim_end().lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("Chat_ID;Chat_Title"));
    assert!(lines[1].contains(";user;hi;"));
    assert!(lines[2].contains(";assistant;hello;"));
    assert!(lines[2].ends_with(";1.23"));

    cleanup_test_db();
}

#[tokio::test]
#[serial]
async fn test_export_respects_filters() {
    let pool = setup_test_db().await;

    insert_chat(&pool, "Hello world", "2024-01-15T12:00:00+00:00", "[]").await;
    insert_chat(&pool, "Other", "2024-01-16T12:00:00+00:00", "[]").await;

    let response = create_test_app()
        .oneshot(
            Request::builder()
                .uri("/chats/export/json?query=hello")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json.as_array().unwrap().len(), 1);

    cleanup_test_db();
}

#[tokio::test]
#[serial]
async fn test_export_unknown_format() {
    let _pool = setup_test_db().await;

    let (status, json) = get_json(create_test_app(), "/chats/export/xml").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());

    cleanup_test_db();
}

#[tokio::test]
#[serial]
async fn test_generate_rejects_empty_prompt() {
    let _pool = setup_test_db().await;

    let response = create_test_app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/chats/generate")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"prompt": "   "}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    cleanup_test_db();
}

#[tokio::test]
#[serial]
async fn test_generate_without_backend_keeps_user_turn() {
    let pool = setup_test_db().await;

    // No background task is running in tests, so the task queue is absent;
    // the user's message must still be persisted before that is discovered.
    let response = create_test_app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/chats/generate")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"prompt": "hello model"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chats")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);

    let (title, length): (String, i64) =
        sqlx::query_as("SELECT title, json_array_length(messages) FROM chats")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(title, "Chat: hello model...");
    assert_eq!(length, 1);

    cleanup_test_db();
}
