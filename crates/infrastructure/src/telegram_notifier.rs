//! Telegram Bot API notifier with inline approve/deny buttons.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::info;
use url::Url;

use jitbroker_application::{ApprovalNotice, Notifier};
use jitbroker_core::{AppError, AppResult};
use jitbroker_domain::NotificationHandle;

use crate::http_support::{transport_error, trimmed_base};

mod format;

/// Public Bot API endpoint.
pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Callback data prefix for approval buttons.
pub const CALLBACK_PREFIX: &str = "jit";

/// Sends approval prompts to a single chat and edits them as requests resolve.
pub struct TelegramNotifier {
    http_client: reqwest::Client,
    api_base: String,
    bot_token: String,
    chat_id: i64,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

impl TelegramNotifier {
    /// Creates a notifier for the public Bot API.
    #[must_use]
    pub fn new(http_client: reqwest::Client, bot_token: impl Into<String>, chat_id: i64) -> Self {
        Self {
            http_client,
            api_base: TELEGRAM_API_BASE.to_owned(),
            bot_token: bot_token.into(),
            chat_id,
        }
    }

    /// Points the notifier at another Bot API server.
    #[must_use]
    pub fn with_api_base(mut self, api_base: &Url) -> Self {
        self.api_base = trimmed_base(api_base);
        self
    }

    /// Returns the chat allowed to answer approval prompts.
    #[must_use]
    pub fn chat_id(&self) -> i64 {
        self.chat_id
    }

    /// Registers the webhook that receives button callbacks.
    pub async fn set_webhook(&self, webhook_url: &str, secret_token: &str) -> AppResult<()> {
        self.call_api::<Value>(
            "setWebhook",
            &json!({ "url": webhook_url, "secret_token": secret_token }),
        )
        .await?;
        info!(webhook_url, "telegram webhook registered");
        Ok(())
    }

    async fn call_api<T>(&self, method: &str, body: &Value) -> AppResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let context = format!("telegram {method}");
        let response = self
            .http_client
            .post(format!("{}/bot{}/{method}", self.api_base, self.bot_token))
            .json(body)
            .send()
            .await
            .map_err(|error| transport_error(&context, &error.without_url()))?;

        let status = response.status();
        let envelope: ApiEnvelope<T> = response.json().await.map_err(|error| {
            AppError::Upstream(format!(
                "{context} returned {status} with invalid JSON: {error}"
            ))
        })?;

        if !envelope.ok {
            return Err(AppError::Upstream(format!(
                "{context} failed: {}",
                envelope.description.unwrap_or_else(|| status.to_string())
            )));
        }

        Ok(envelope.result)
    }

    async fn edit(&self, handle: &NotificationHandle, text: String) -> AppResult<()> {
        let message_id = handle.as_str().parse::<i64>().map_err(|_| {
            AppError::Validation(format!(
                "notification handle '{}' is not a telegram message id",
                handle.as_str()
            ))
        })?;

        self.call_api::<Value>(
            "editMessageText",
            &json!({
                "chat_id": self.chat_id,
                "message_id": message_id,
                "text": text,
                "parse_mode": "HTML",
            }),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_approval(&self, notice: &ApprovalNotice) -> AppResult<NotificationHandle> {
        let id = notice.request_id.as_str();
        let body = json!({
            "chat_id": self.chat_id,
            "text": format::approval_prompt(notice),
            "parse_mode": "HTML",
            "reply_markup": {
                "inline_keyboard": [[
                    { "text": "✅ Approve", "callback_data": format!("{CALLBACK_PREFIX}:approve:{id}") },
                    { "text": "❌ Deny", "callback_data": format!("{CALLBACK_PREFIX}:deny:{id}") },
                ]],
            },
        });

        let sent = self
            .call_api::<SentMessage>("sendMessage", &body)
            .await?
            .ok_or_else(|| AppError::Upstream("telegram sendMessage returned no message".to_owned()))?;

        info!(request_id = %notice.request_id, message_id = sent.message_id, "approval prompt sent");
        Ok(NotificationHandle::new(sent.message_id.to_string()))
    }

    async fn mark_approved(
        &self,
        handle: &NotificationHandle,
        notice: &ApprovalNotice,
    ) -> AppResult<()> {
        self.edit(handle, format::resolved(notice, format::Resolution::Approved, Utc::now()))
            .await
    }

    async fn mark_denied(
        &self,
        handle: &NotificationHandle,
        notice: &ApprovalNotice,
    ) -> AppResult<()> {
        self.edit(handle, format::resolved(notice, format::Resolution::Denied, Utc::now()))
            .await
    }

    async fn mark_timed_out(
        &self,
        handle: &NotificationHandle,
        notice: &ApprovalNotice,
    ) -> AppResult<()> {
        self.edit(handle, format::timed_out(notice)).await
    }

    async fn mark_error(
        &self,
        handle: &NotificationHandle,
        notice: &ApprovalNotice,
        message: &str,
    ) -> AppResult<()> {
        self.edit(handle, format::failed(notice, message)).await
    }
}

/// Renders a TTL the way approvers read it: `15m`, `1h`, `1h30m`, `45s`.
fn human_ttl(ttl: Duration) -> String {
    let total = ttl.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);

    let mut rendered = String::new();
    if hours > 0 {
        rendered.push_str(&format!("{hours}h"));
    }
    if minutes > 0 {
        rendered.push_str(&format!("{minutes}m"));
    }
    if seconds > 0 || rendered.is_empty() {
        rendered.push_str(&format!("{seconds}s"));
    }
    rendered
}
