pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;

/// What the messaging platform said back after a send.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// HTTP status of the platform's response
    pub status: u16,
    /// Raw response body, kept verbatim for diagnostics
    pub body: String,
}

impl Delivery {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Delivers a text reply into a chat.
///
/// `Err` means the request never produced a response (network failure or an
/// unreadable body). A response with any status is an `Ok(Delivery)`.
#[async_trait]
pub trait Notify: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<Delivery>;
}
