use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::Config;
use crate::platform::{Delivery, Notify};

/// One webhook notification from Telegram. Absent fields decode to their
/// zero value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Update {
    pub update_id: i64,
    pub message: Message,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Message {
    pub message_id: i64,
    pub text: String,
    pub chat: Chat,
    pub from: User,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Chat {
    pub id: i64,
    pub title: String,
}

/// Sender metadata. Carried along but not used for routing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[allow(dead_code)]
#[serde(default)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub username: String,
}

/// Form body of `sendMessage`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundReply {
    pub chat_id: String,
    pub text: String,
}

impl Update {
    /// Decode a webhook body without ever failing.
    ///
    /// When strict decoding fails the error is returned next to a partial
    /// update: fields of the right type are kept from a syntactically valid
    /// body, everything else stays zero.
    pub fn decode(body: &[u8]) -> (Self, Option<serde_json::Error>) {
        match serde_json::from_slice::<Update>(body) {
            Ok(update) => (update, None),
            Err(e) => {
                let partial = serde_json::from_slice::<Value>(body)
                    .map(|value| Self::salvage(&value))
                    .unwrap_or_default();
                (partial, Some(e))
            }
        }
    }

    fn salvage(value: &Value) -> Self {
        let int = |pointer: &str| {
            value
                .pointer(pointer)
                .and_then(Value::as_i64)
                .unwrap_or_default()
        };
        let string = |pointer: &str| {
            value
                .pointer(pointer)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Update {
            update_id: int("/update_id"),
            message: Message {
                message_id: int("/message/message_id"),
                text: string("/message/text"),
                chat: Chat {
                    id: int("/message/chat/id"),
                    title: string("/message/chat/title"),
                },
                from: User {
                    id: int("/message/from/id"),
                    first_name: string("/message/from/first_name"),
                    username: string("/message/from/username"),
                },
            },
        }
    }
}

/// Sends replies through the Bot API `sendMessage` method.
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base: String,
}

impl TelegramNotifier {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: config.telegram_api.clone(),
        }
    }
}

#[async_trait]
impl Notify for TelegramNotifier {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<Delivery> {
        let reply = OutboundReply {
            chat_id: chat_id.to_string(),
            text: text.to_string(),
        };

        let url = format!("{}/sendMessage", self.api_base);
        debug!("Sending message to chat {}", reply.chat_id);

        let response = self
            .client
            .post(&url)
            .form(&reply)
            .send()
            .await
            .context("Failed to send message to Telegram")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read Telegram response body")?;

        info!("Body of Telegram response: {}", body);

        Ok(Delivery {
            status: status.as_u16(),
            body,
        })
    }
}
