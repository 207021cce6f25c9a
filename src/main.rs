//! Local LLM chat server with persistent history
//!
//! (c) Softlandia 2025

use tokio_local_chat_api::TASK_SENDER;
use tokio_local_chat_api::api;
use tokio_local_chat_api::core;
use tokio_local_chat_api::core::services::ChatStoreService;
use tokio_local_chat_api::infrastructure::database::DatabaseConnection;
use tokio_local_chat_api::infrastructure::repositories::DbChatRepository;

use axum::Router;
use axum::http::{HeaderValue, Method};
use di::{Injectable, ServiceCollection};
use di_axum::RouterServiceProviderExtensions;
use log::info;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};

fn main() -> anyhow::Result<()> {
    // initialize tracing
    tracing_subscriber::fmt::init();

    let runtime: Runtime = Builder::new_multi_thread().enable_all().build()?;

    // background task for the local LLM runner
    let (task_sender, task_receiver) = mpsc::channel(10);
    let assistant_join_handle = runtime.spawn(core::assistant::background_task(task_receiver));
    TASK_SENDER
        .set(task_sender)
        .expect("task sender should not be set");

    let web_task_handle = runtime.spawn(web_server_task());

    runtime.block_on(async {
        web_task_handle
            .await
            .expect("failed to join web_task_handle");
        assistant_join_handle
            .await
            .expect("failed to join assistant_join_handle");
    });

    Ok(())
}

async fn web_server_task() {
    let provider = ServiceCollection::new()
        .add(DatabaseConnection::singleton())
        .add(DbChatRepository::scoped())
        .add(ChatStoreService::scoped())
        .build_provider()
        .unwrap();

    let connection = provider.get_required::<DatabaseConnection>();
    sqlx::migrate!()
        .run(&**connection)
        .await
        .expect("failed to run database migrations");

    // build our application with a route
    let app = Router::new()
        .nest("/chats", api::chats::router())
        .layer(
            CorsLayer::new()
                .allow_headers(Any)
                .allow_methods([Method::GET, Method::POST, Method::DELETE])
                .allow_origin([
                    "http://localhost:3000".parse::<HeaderValue>().unwrap(),
                    "http://localhost:5173".parse::<HeaderValue>().unwrap(),
                ]),
        )
        .with_provider(provider);

    // run our app with hyper, listening globally on port 3000
    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
    info!("listening on {}", listener.local_addr().unwrap());
    axum::serve(listener, app).await.unwrap();
    info!("Shutting down...");
}
