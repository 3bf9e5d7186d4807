//! HTTP model client: JSON over HTTPS with the screenshot inlined as base64.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ModelSettings;
use crate::domain::{Action, ActionResult, ModelError, TaskerError};
use crate::ports::{ModelClient, ModelContext, TodoDigest};

const ACTIONS_PATH: &str = "/v1/actions";

#[derive(Debug, Serialize)]
struct ActionRequest<'a> {
    model: &'a str,
    temperature: f32,
    instruction: &'a str,
    todo: TodoRef<'a>,
    history: Vec<HistoryEntry<'a>>,
    previous_todos: &'a [TodoDigest],
    screenshot: ImagePayload,
}

#[derive(Debug, Serialize)]
struct TodoRef<'a> {
    index: usize,
    total: usize,
    description: &'a str,
}

#[derive(Debug, Serialize)]
struct HistoryEntry<'a> {
    index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    action: Option<&'a Action>,
    result: &'a ActionResult,
}

#[derive(Debug, Serialize)]
struct ImagePayload {
    mime: &'static str,
    width: u32,
    height: u32,
    data: String,
}

#[derive(Debug, Deserialize)]
struct ActionResponse {
    action: serde_json::Value,
}

pub struct HttpModelClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    temperature: f32,
}

impl HttpModelClient {
    pub fn new(settings: &ModelSettings) -> Result<Self, TaskerError> {
        Self::with_timeout(settings, settings.request_timeout())
    }

    pub fn with_timeout(settings: &ModelSettings, timeout: Duration) -> Result<Self, TaskerError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TaskerError::Config(format!("http client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}{ACTIONS_PATH}", settings.base_url.trim_end_matches('/')),
            api_key: settings.api_key.clone(),
            temperature: settings.temperature,
        })
    }

    fn request_body<'a>(&self, context: &'a ModelContext<'a>) -> ActionRequest<'a> {
        ActionRequest {
            model: context.model,
            temperature: self.temperature,
            instruction: context.instruction,
            todo: TodoRef {
                index: context.todo_index,
                total: context.todo_count,
                description: context.todo,
            },
            history: context
                .history
                .iter()
                .map(|step| HistoryEntry {
                    index: step.index,
                    action: step.action.as_ref(),
                    result: &step.result,
                })
                .collect(),
            previous_todos: context.previous_todos,
            screenshot: ImagePayload {
                mime: context.screenshot.mime(),
                width: context.screenshot.width,
                height: context.screenshot.height,
                data: BASE64.encode(&context.screenshot.bytes),
            },
        }
    }
}

fn transport_error(e: reqwest::Error) -> ModelError {
    if e.is_timeout() {
        ModelError::Timeout
    } else {
        ModelError::Unreachable(e.to_string())
    }
}

/// Parse a response body into an action.
pub fn parse_action(body: &str) -> Result<Action, ModelError> {
    let response: ActionResponse =
        serde_json::from_str(body).map_err(|e| ModelError::Malformed(e.to_string()))?;
    Action::from_wire(response.action).map_err(|e| ModelError::Malformed(e.to_string()))
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn propose_action(&self, context: &ModelContext<'_>) -> Result<Action, ModelError> {
        let body = self.request_body(context);
        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(ModelError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }
        let action = parse_action(&text)?;
        debug!(todo = context.todo_index, kind = action.kind_name(), "model proposed action");
        Ok(action)
    }
}
