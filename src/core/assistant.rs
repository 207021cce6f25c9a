//! LLM Assistant service.
//!
//! Generation happens in a background task fed through an mpsc queue; the
//! model itself is served by a locally hosted Ollama-compatible runner that
//! this task talks to over HTTP.

use crate::infrastructure::entities;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::sync::mpsc;
use tokio::time::Instant;

const DEFAULT_RUNNER_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_MODEL_NAME: &str = "qwen2:0.5b-instruct";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const GENERATION_TIMEOUT: Duration = Duration::from_secs(120);

const SYSTEM_PROMPT: &str = r#"You are a helpful assistant. Answer using the whole conversation so far.
You MUST keep the conversation safe and professional.
You MUST ONLY produce plain text responses, there is no support for Markdown or HTML formatting.
"#;

/// Identifier of the model once the runner has been confirmed reachable.
/// Empty until then; the store falls back to its own sentinel.
static LOADED_MODEL: OnceCell<String> = OnceCell::const_new();

pub fn loaded_model_name() -> Option<String> {
    LOADED_MODEL.get().cloned()
}

pub struct InferenceTask {
    messages: Vec<ChatMessage>,
    return_channel: mpsc::Sender<String>,
}

impl InferenceTask {
    pub fn new(messages: Vec<ChatMessage>) -> (InferenceTask, mpsc::Receiver<String>) {
        let (sender, receiver) = mpsc::channel::<String>(1000);

        (
            InferenceTask {
                messages,
                return_channel: sender,
            },
            receiver,
        )
    }
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    role: Role,
    content: String,
}

#[derive(Debug, Clone)]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl From<&entities::StoredMessage> for ChatMessage {
    fn from(m: &entities::StoredMessage) -> Self {
        Self {
            content: m.content.clone(),
            role: match m.role {
                entities::Role::User => Role::User,
                entities::Role::Assistant => Role::Assistant,
            },
        }
    }
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

pub async fn background_task(mut task_queue: mpsc::Receiver<InferenceTask>) {
    let base_url = env::var("OLLAMA_URL").unwrap_or(DEFAULT_RUNNER_URL.to_owned());
    let model_name = env::var("MODEL_NAME").unwrap_or(DEFAULT_MODEL_NAME.to_owned());

    let client = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(GENERATION_TIMEOUT)
        .build()
        .expect("failed to build http client");

    match client.get(format!("{base_url}/api/version")).send().await {
        Ok(_) => {
            info!("model runner reachable at {base_url}, using model {model_name}");
            LOADED_MODEL.set(model_name.clone()).ok();
        }
        Err(e) => {
            // Keep serving the queue; the runner may come up later.
            error!("model runner unreachable at {base_url}: {e}");
        }
    }

    loop {
        match task_queue.recv().await {
            None => {
                return;
            }
            Some(task) => {
                let generation_start = Instant::now();

                match generate(&client, &base_url, &model_name, &task.messages).await {
                    Ok(text) => {
                        info!(
                            "response generated in {:.2} seconds",
                            generation_start.elapsed().as_secs_f32()
                        );
                        if LOADED_MODEL.get().is_none() {
                            LOADED_MODEL.set(model_name.clone()).ok();
                        }
                        if task.return_channel.send(text).await.is_err() {
                            warn!("inference result receiver dropped");
                        }
                    }
                    // Dropping the task closes the return channel; the
                    // caller sees the failure as an empty reply.
                    Err(e) => error!("text generation failed: {e}"),
                }
            }
        }
    }
}

async fn generate(
    client: &reqwest::Client,
    base_url: &str,
    model_name: &str,
    history: &[ChatMessage],
) -> anyhow::Result<String> {
    let mut messages = vec![ApiMessage {
        role: "system",
        content: SYSTEM_PROMPT,
    }];
    messages.extend(history.iter().map(|m| ApiMessage {
        role: m.role.as_str(),
        content: &m.content,
    }));

    let response: ChatResponse = client
        .post(format!("{base_url}/api/chat"))
        .json(&ChatRequest {
            model: model_name,
            messages,
            stream: false,
        })
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    Ok(response.message.content.trim().to_owned())
}
