//! Telegram Bot API transport.
//!
//! Delivers HTML messages via `sendMessage`, uploads exports via
//! `sendDocument` and long-polls `getUpdates` for bot commands.

use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::traits::{ChatCommand, CommandBatch, CommandSource, Notification, Notifier, NotifyError};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";
/// Long-poll window for `getUpdates`.
const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(30);

// ── Bot API payloads ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// Extract the command name from message text: `/Export@my_bot now` → `export`.
pub fn parse_command(text: &str) -> Option<String> {
    let first = text.split_whitespace().next()?;
    let name = first.strip_prefix('/')?;
    let name = name.split('@').next().unwrap_or(name);
    if name.is_empty() {
        return None;
    }
    Some(name.to_lowercase())
}

/// Turn raw updates into commands and the offset that acknowledges them.
pub fn commands_from_updates(updates: &[Update]) -> CommandBatch {
    let commands = updates
        .iter()
        .filter_map(|u| {
            let message = u.message.as_ref()?;
            let name = parse_command(message.text.as_deref()?)?;
            Some(ChatCommand {
                chat_id: message.chat.id,
                name,
            })
        })
        .collect();
    CommandBatch {
        commands,
        next_offset: updates.iter().map(|u| u.update_id + 1).max(),
    }
}

// ── Notifier ──────────────────────────────────────────────────

/// Sends notifications via the Telegram Bot API.
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    bot_token: String,
    api_base: String,
    poll_timeout: Duration,
    client: reqwest::Client,
}

impl TelegramNotifier {
    /// Returns [`NotifyError::Config`] if the token is empty.
    pub fn new(bot_token: impl Into<String>) -> Result<Self, NotifyError> {
        let bot_token = bot_token.into();
        if bot_token.trim().is_empty() {
            return Err(NotifyError::Config(
                "Telegram bot token must not be empty".to_string(),
            ));
        }
        Ok(Self {
            bot_token,
            api_base: DEFAULT_API_BASE.to_string(),
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            client: reqwest::Client::new(),
        })
    }

    /// Point at a different Bot API server (e.g. a local one).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    /// Unwrap the `{ok, result, description}` envelope.
    async fn read_response<T: DeserializeOwned>(
        method: &str,
        response: reqwest::Response,
    ) -> Result<T, NotifyError> {
        let status = response.status();
        let body: ApiResponse<T> = response.json().await?;

        if body.ok {
            if let Some(result) = body.result {
                return Ok(result);
            }
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = body
                .parameters
                .and_then(|p| p.retry_after)
                .unwrap_or(30);
            return Err(NotifyError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        Err(NotifyError::Api {
            method: method.to_string(),
            description: body
                .description
                .unwrap_or_else(|| "Unknown Telegram API error".to_string()),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<T, NotifyError> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await?;
        Self::read_response(method, response).await
    }

    /// Long-poll for updates newer than `offset`.
    pub async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>, NotifyError> {
        let mut body = serde_json::json!({
            "timeout": self.poll_timeout.as_secs(),
            "allowed_updates": ["message"],
        });
        if let Some(offset) = offset {
            body["offset"] = serde_json::Value::from(offset);
        }

        let response = self
            .client
            .post(self.method_url("getUpdates"))
            .json(&body)
            // The server holds the request for up to `poll_timeout`.
            .timeout(self.poll_timeout + Duration::from_secs(10))
            .send()
            .await?;
        Self::read_response("getUpdates", response).await
    }
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    /// `sendMessage` with HTML parse mode and link previews disabled.
    async fn send(&self, chat_id: i64, notification: &Notification) -> Result<(), NotifyError> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": notification.body,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });

        tracing::debug!(chat_id, subject = %notification.subject, "Sending Telegram message");
        let _: serde_json::Value = self.call("sendMessage", &body).await?;
        Ok(())
    }

    /// `sendDocument` as a multipart upload.
    async fn send_document(
        &self,
        chat_id: i64,
        path: &Path,
        caption: Option<&str>,
    ) -> Result<(), NotifyError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| NotifyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "export.xlsx".to_string());

        let mut form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .part(
                "document",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name.clone()),
            );
        if let Some(caption) = caption {
            form = form.text("caption", caption.to_string());
        }

        tracing::debug!(chat_id, file = %file_name, "Uploading Telegram document");
        let response = self
            .client
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await?;
        let _: serde_json::Value = Self::read_response("sendDocument", response).await?;
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "telegram"
    }
}

#[async_trait::async_trait]
impl CommandSource for TelegramNotifier {
    async fn register_commands(&self, commands: &[(&str, &str)]) -> Result<(), NotifyError> {
        let list: Vec<serde_json::Value> = commands
            .iter()
            .map(|(command, description)| {
                serde_json::json!({ "command": command, "description": description })
            })
            .collect();
        let _: bool = self
            .call("setMyCommands", &serde_json::json!({ "commands": list }))
            .await?;
        Ok(())
    }

    async fn poll_commands(&self, offset: Option<i64>) -> Result<CommandBatch, NotifyError> {
        let updates = self.get_updates(offset).await?;
        Ok(commands_from_updates(&updates))
    }
}
