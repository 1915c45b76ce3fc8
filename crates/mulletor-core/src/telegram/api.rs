//! ============================================================================
//! Telegram API - Bot API client behind the TelegramApi trait
//! ============================================================================
//! The pipeline only sees the `TelegramApi` trait; `BotApi` is the reqwest
//! implementation. Every call unwraps the Bot API envelope and maps an
//! `ok: false` answer to a typed error.
//! ============================================================================

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::telegram::types::{File, LabeledPrice, Message, ReplyParameters, Update};
use crate::types::{MulletorError, Result};

const API_URL: &str = "https://api.telegram.org";

/// Client-side timeout; must exceed the getUpdates long-poll window
const CLIENT_TIMEOUT_SECS: u64 = 90;

/// Operations the payment pipeline performs against the chat platform
#[async_trait]
pub trait TelegramApi: Send + Sync {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i64>,
    ) -> Result<Message>;

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<()>;

    #[allow(clippy::too_many_arguments)]
    async fn send_invoice(
        &self,
        chat_id: i64,
        title: &str,
        description: &str,
        payload: &str,
        currency: &str,
        prices: &[LabeledPrice],
        reply_to: Option<i64>,
    ) -> Result<Message>;

    async fn answer_pre_checkout_query(&self, query_id: &str, ok: bool) -> Result<()>;

    async fn get_file(&self, file_id: &str) -> Result<File>;

    /// Download URL for a file path returned by `get_file`
    fn file_url(&self, file_path: &str) -> String;

    async fn refund_star_payment(&self, user_id: i64, charge_id: &str) -> Result<()>;

    async fn send_photo(
        &self,
        chat_id: i64,
        photo_path: &Path,
        caption: &str,
        reply_to: Option<i64>,
    ) -> Result<Message>;
}

/// Bot API response envelope; missing fields deserialize to None
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

/// reqwest-backed Bot API client
pub struct BotApi {
    client: reqwest::Client,
    token: String,
}

impl BotApi {
    pub fn new(token: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(CLIENT_TIMEOUT_SECS))
            .build()
            .expect("failed to build telegram http client");

        Self { client, token }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{API_URL}/bot{}/{method}", self.token)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: &serde_json::Value,
    ) -> Result<T> {
        debug!("Calling {method}");

        let response = self
            .client
            .post(self.method_url(method))
            .json(payload)
            .send()
            .await
            .map_err(|e| MulletorError::Transport(format!("{method} failed: {e}")))?;

        let body = response
            .text()
            .await
            .map_err(|e| MulletorError::Transport(format!("could not read {method} body: {e}")))?;

        unwrap_envelope(method, &body)
    }

    /// Long-poll for new updates; used by the bot loop, not the pipeline
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        let payload = json!({
            "offset": offset,
            "timeout": timeout_secs,
            "allowed_updates": ["message", "pre_checkout_query"],
        });

        self.call("getUpdates", &payload).await
    }
}

fn unwrap_envelope<T: DeserializeOwned>(method: &str, body: &str) -> Result<T> {
    let envelope: ApiResponse<T> = serde_json::from_str(body).map_err(|e| {
        MulletorError::Protocol(format!("could not parse {method} response: {e}"))
    })?;

    if !envelope.ok {
        return Err(MulletorError::Api(format!(
            "{method}: {}",
            envelope
                .description
                .unwrap_or_else(|| "no description".to_string())
        )));
    }

    envelope.result.ok_or_else(|| {
        MulletorError::Protocol(format!("{method}: ok response without a result"))
    })
}

#[async_trait]
impl TelegramApi for BotApi {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i64>,
    ) -> Result<Message> {
        let mut payload = json!({"chat_id": chat_id, "text": text});
        if let Some(message_id) = reply_to {
            payload["reply_parameters"] = serde_json::to_value(ReplyParameters::to(message_id))
                .map_err(|e| MulletorError::Serialization(e.to_string()))?;
        }

        self.call("sendMessage", &payload).await
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<()> {
        let payload = json!({"chat_id": chat_id, "message_id": message_id});
        self.call::<bool>("deleteMessage", &payload).await?;
        Ok(())
    }

    async fn send_invoice(
        &self,
        chat_id: i64,
        title: &str,
        description: &str,
        payload: &str,
        currency: &str,
        prices: &[LabeledPrice],
        reply_to: Option<i64>,
    ) -> Result<Message> {
        let mut body = json!({
            "chat_id": chat_id,
            "title": title,
            "description": description,
            "payload": payload,
            "currency": currency,
            "prices": prices,
        });
        if let Some(message_id) = reply_to {
            body["reply_parameters"] = serde_json::to_value(ReplyParameters::to(message_id))
                .map_err(|e| MulletorError::Serialization(e.to_string()))?;
        }

        self.call("sendInvoice", &body).await
    }

    async fn answer_pre_checkout_query(&self, query_id: &str, ok: bool) -> Result<()> {
        let payload = json!({"pre_checkout_query_id": query_id, "ok": ok});
        self.call::<bool>("answerPreCheckoutQuery", &payload).await?;
        Ok(())
    }

    async fn get_file(&self, file_id: &str) -> Result<File> {
        let payload = json!({"file_id": file_id});
        self.call("getFile", &payload).await
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{API_URL}/file/bot{}/{file_path}", self.token)
    }

    async fn refund_star_payment(&self, user_id: i64, charge_id: &str) -> Result<()> {
        let payload = json!({
            "user_id": user_id,
            "telegram_payment_charge_id": charge_id,
        });
        self.call::<bool>("refundStarPayment", &payload).await?;
        Ok(())
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        photo_path: &Path,
        caption: &str,
        reply_to: Option<i64>,
    ) -> Result<Message> {
        let bytes = tokio::fs::read(photo_path).await.map_err(|e| {
            MulletorError::Io(format!("could not read {}: {e}", photo_path.display()))
        })?;

        let file_name = photo_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "photo.png".to_string());

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("image/png")
            .map_err(|e| MulletorError::Serialization(format!("photo part: {e}")))?;

        let mut form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .part("photo", part);

        if let Some(message_id) = reply_to {
            let reply = serde_json::to_string(&ReplyParameters::to(message_id))
                .map_err(|e| MulletorError::Serialization(e.to_string()))?;
            form = form.text("reply_parameters", reply);
        }

        let response = self
            .client
            .post(self.method_url("sendPhoto"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| MulletorError::Transport(format!("sendPhoto failed: {e}")))?;

        let body = response
            .text()
            .await
            .map_err(|e| MulletorError::Transport(format!("could not read sendPhoto body: {e}")))?;

        unwrap_envelope("sendPhoto", &body)
    }
}
