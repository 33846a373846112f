//! Telegram Bot channel — long polling + message sending via Bot API.

use async_trait::async_trait;
use dripcast_core::chat::{IncomingEvent, Reply, ReplyMarkup};
use dripcast_core::config::TelegramConfig;
use dripcast_core::error::{DripError, Result};
use dripcast_core::traits::{Ack, ChatFrontend, OutboundChannel};
use dripcast_core::types::ChannelAddress;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";
/// Long-poll hold time requested from Telegram.
const LONG_POLL_SECS: u64 = 30;

/// Telegram Bot channel. Cheap to clone; clones share the HTTP client.
#[derive(Clone)]
pub struct TelegramChannel {
    config: TelegramConfig,
    client: reqwest::Client,
    api_base: String,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            api_base: DEFAULT_API_BASE.into(),
        }
    }

    /// Point at a different Bot API server (self-hosted `telegram-bot-api`).
    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.config.bot_token, method)
    }

    fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.config.send_timeout_secs.max(1))
    }

    /// POST a Bot API method and unwrap the `{ok, result}` envelope.
    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> Result<T> {
        let response = self
            .client
            .post(self.api_url(method))
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| DripError::Channel(format!("Telegram {method} failed: {e}")))?;

        let result: TelegramApiResponse<T> = response
            .json()
            .await
            .map_err(|e| DripError::Channel(format!("Invalid Telegram {method} response: {e}")))?;
        result.into_result(method)
    }

    /// Get updates using long polling.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<TelegramUpdate>> {
        let body = serde_json::json!({
            "offset": offset,
            "timeout": LONG_POLL_SECS,
            "allowed_updates": ["message", "callback_query"],
        });
        self.call(
            "getUpdates",
            &body,
            Duration::from_secs(LONG_POLL_SECS + 10),
        )
        .await
    }

    /// Send a text message, optionally with buttons.
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        markup: &ReplyMarkup,
    ) -> Result<TelegramMessage> {
        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(markup) = reply_markup_json(markup) {
            body["reply_markup"] = markup;
        }
        self.call("sendMessage", &body, self.send_timeout()).await
    }

    /// Get bot info.
    pub async fn get_me(&self) -> Result<TelegramUser> {
        self.call("getMe", &serde_json::json!({}), self.send_timeout())
            .await
    }

    /// Start the polling loop and return a stream of incoming events.
    /// The loop ends when `cancel` fires or the stream is dropped.
    pub fn start_polling(&self, cancel: CancellationToken) -> TelegramPollingStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let channel = self.clone();

        tokio::spawn(async move {
            tracing::info!("Telegram polling loop started");
            let mut offset = 0_i64;

            loop {
                let updates = tokio::select! {
                    _ = cancel.cancelled() => break,
                    updates = channel.get_updates(offset) => updates,
                };

                match updates {
                    Ok(updates) => {
                        for update in updates {
                            offset = offset.max(update.update_id + 1);
                            if let Some(event) = update.to_incoming()
                                && tx.send(event).is_err()
                            {
                                tracing::info!("Telegram polling stopped (receiver dropped)");
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!("Telegram polling error: {e}");
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(Duration::from_secs(5)) => {}
                        }
                    }
                }

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_secs(channel.config.poll_interval)) => {}
                }
            }
            tracing::info!("Telegram polling loop stopped");
        });

        TelegramPollingStream { rx }
    }
}

#[async_trait]
impl OutboundChannel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, address: ChannelAddress, text: &str) -> Result<Ack> {
        let sent = self.send_message(address.0, text, &ReplyMarkup::None).await?;
        Ok(Ack {
            message_id: Some(sent.message_id),
        })
    }
}

#[async_trait]
impl ChatFrontend for TelegramChannel {
    async fn reply(&self, chat: ChannelAddress, reply: Reply) -> Result<()> {
        self.send_message(chat.0, &reply.text, &reply.markup).await?;
        Ok(())
    }

    async fn edit_text(&self, chat: ChannelAddress, message_id: i64, text: &str) -> Result<()> {
        let body = serde_json::json!({
            "chat_id": chat.0,
            "message_id": message_id,
            "text": text,
        });
        // Returns the edited Message, or `true` for inline messages
        let _: serde_json::Value = self
            .call("editMessageText", &body, self.send_timeout())
            .await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<()> {
        let body = serde_json::json!({ "callback_query_id": callback_id });
        let _: bool = self
            .call("answerCallbackQuery", &body, self.send_timeout())
            .await?;
        Ok(())
    }
}

/// Stream of incoming Telegram events from polling.
pub struct TelegramPollingStream {
    rx: tokio::sync::mpsc::UnboundedReceiver<IncomingEvent>,
}

impl Stream for TelegramPollingStream {
    type Item = IncomingEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

fn reply_markup_json(markup: &ReplyMarkup) -> Option<serde_json::Value> {
    match markup {
        ReplyMarkup::None => None,
        ReplyMarkup::Keyboard(buttons) => Some(serde_json::json!({
            "keyboard": buttons
                .iter()
                .map(|b| vec![serde_json::json!({ "text": b })])
                .collect::<Vec<_>>(),
            "resize_keyboard": true,
        })),
        ReplyMarkup::Inline(buttons) => Some(serde_json::json!({
            "inline_keyboard": buttons
                .iter()
                .map(|(text, data)| vec![serde_json::json!({ "text": text, "callback_data": data })])
                .collect::<Vec<_>>(),
        })),
    }
}

// --- Telegram API Types ---

#[derive(Debug, Deserialize)]
pub struct TelegramApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

impl<T> TelegramApiResponse<T> {
    fn into_result(self, method: &str) -> Result<T> {
        if !self.ok {
            return Err(DripError::Channel(format!(
                "Telegram {method} error: {}",
                self.description.unwrap_or_default()
            )));
        }
        self.result
            .ok_or_else(|| DripError::Channel(format!("Telegram {method}: empty result")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    pub message: Option<TelegramMessage>,
    pub callback_query: Option<TelegramCallbackQuery>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub from: Option<TelegramUser>,
    pub chat: TelegramChat,
    pub text: Option<String>,
    pub date: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

impl TelegramUser {
    pub fn full_name(&self) -> String {
        match self.last_name.as_deref() {
            Some(last) if !last.is_empty() => format!("{} {last}", self.first_name),
            _ => self.first_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramCallbackQuery {
    pub id: String,
    pub from: TelegramUser,
    pub message: Option<TelegramMessage>,
    pub data: Option<String>,
}

impl TelegramUpdate {
    /// Convert to a front-end event. Bot authors and non-text messages are dropped.
    pub fn to_incoming(&self) -> Option<IncomingEvent> {
        if let Some(msg) = &self.message {
            let text = msg.text.as_ref()?;
            let from = msg.from.as_ref()?;
            if from.is_bot {
                return None;
            }
            return Some(IncomingEvent::Text {
                chat: ChannelAddress(msg.chat.id),
                sender_name: from.full_name(),
                text: text.clone(),
            });
        }

        let query = self.callback_query.as_ref()?;
        let message = query.message.as_ref()?;
        Some(IncomingEvent::Callback {
            callback_id: query.id.clone(),
            chat: ChannelAddress(message.chat.id),
            message_id: message.message_id,
            data: query.data.clone().unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::Arc;

    fn parse(json: &str) -> TelegramUpdate {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_text_update() {
        let update = parse(
            r#"{"update_id": 10, "message": {"message_id": 5, "date": 0,
                "from": {"id": 77, "is_bot": false, "first_name": "Ann", "last_name": "Lee"},
                "chat": {"id": 77, "type": "private"}, "text": "/start"}}"#,
        );
        assert_eq!(
            update.to_incoming(),
            Some(IncomingEvent::Text {
                chat: ChannelAddress(77),
                sender_name: "Ann Lee".into(),
                text: "/start".into(),
            })
        );
    }

    #[test]
    fn test_bot_and_non_text_skipped() {
        let bot = parse(
            r#"{"update_id": 1, "message": {"message_id": 1, "date": 0,
                "from": {"id": 1, "is_bot": true, "first_name": "B"},
                "chat": {"id": 1, "type": "private"}, "text": "hi"}}"#,
        );
        assert!(bot.to_incoming().is_none());

        let sticker = parse(
            r#"{"update_id": 2, "message": {"message_id": 2, "date": 0,
                "from": {"id": 2, "is_bot": false, "first_name": "C"},
                "chat": {"id": 2, "type": "private"}}}"#,
        );
        assert!(sticker.to_incoming().is_none());
    }

    #[test]
    fn test_callback_update() {
        let update = parse(
            r#"{"update_id": 3, "callback_query": {"id": "cb1",
                "from": {"id": 9, "is_bot": false, "first_name": "Op"},
                "message": {"message_id": 44, "date": 0, "chat": {"id": 9, "type": "private"}, "text": "x"},
                "data": "delete_message_3"}}"#,
        );
        assert_eq!(
            update.to_incoming(),
            Some(IncomingEvent::Callback {
                callback_id: "cb1".into(),
                chat: ChannelAddress(9),
                message_id: 44,
                data: "delete_message_3".into(),
            })
        );
    }

    #[test]
    fn test_markup_json() {
        assert!(reply_markup_json(&ReplyMarkup::None).is_none());

        let kb = reply_markup_json(&ReplyMarkup::Keyboard(vec!["A".into(), "B".into()])).unwrap();
        assert_eq!(kb["keyboard"][1][0]["text"], "B");
        assert_eq!(kb["resize_keyboard"], true);

        let inline =
            reply_markup_json(&ReplyMarkup::Inline(vec![("Delete".into(), "delete_user_1".into())]))
                .unwrap();
        assert_eq!(inline["inline_keyboard"][0][0]["callback_data"], "delete_user_1");
    }

    #[test]
    fn test_api_error_envelope() {
        let resp: TelegramApiResponse<TelegramMessage> = serde_json::from_str(
            r#"{"ok": false, "error_code": 403, "description": "Forbidden: bot was blocked by the user"}"#,
        )
        .unwrap();
        let err = resp.into_result("sendMessage").unwrap_err();
        assert!(err.to_string().contains("blocked"));
    }

    /// Answers every request with an empty `getUpdates` result.
    async fn empty_updates_server() -> (String, Arc<tokio::sync::Notify>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let served = Arc::new(tokio::sync::Notify::new());
        let notify = served.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                // Drain headers and the JSON body before answering
                let mut buf = Vec::new();
                let mut chunk = [0_u8; 1024];
                loop {
                    let text = String::from_utf8_lossy(&buf).to_ascii_lowercase();
                    if let Some(end) = text.find("\r\n\r\n") {
                        let length = text[..end]
                            .lines()
                            .find_map(|l| l.strip_prefix("content-length:"))
                            .and_then(|v| v.trim().parse::<usize>().ok())
                            .unwrap_or(0);
                        if buf.len() >= end + 4 + length {
                            break;
                        }
                    }
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }
                let body = r#"{"ok":true,"result":[]}"#;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(response.as_bytes()).await.ok();
                socket.shutdown().await.ok();
                notify.notify_one();
            }
        });
        (base, served)
    }

    #[tokio::test]
    async fn test_polling_stops_on_cancel_during_interval() {
        let (base, served) = empty_updates_server().await;
        let channel = TelegramChannel::new(TelegramConfig {
            bot_token: "123:abc".into(),
            poll_interval: 3600,
            ..Default::default()
        })
        .with_api_base(&base);
        let cancel = CancellationToken::new();
        let mut events = channel.start_polling(cancel.clone());

        // One successful poll, then the loop waits out the hour-long interval
        served.notified().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let next = tokio::time::timeout(Duration::from_secs(5), events.next())
            .await
            .unwrap();
        assert!(next.is_none());
    }

    #[test]
    fn test_api_url() {
        let channel = TelegramChannel::new(TelegramConfig {
            bot_token: "123:abc".into(),
            ..Default::default()
        })
        .with_api_base("http://localhost:8081/");
        assert_eq!(
            channel.api_url("getMe"),
            "http://localhost:8081/bot123:abc/getMe"
        );
    }
}
