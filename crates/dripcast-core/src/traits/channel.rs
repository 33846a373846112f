//! Channel traits — how the engine and the front-end talk to users.

use async_trait::async_trait;

use crate::chat::Reply;
use crate::error::Result;
use crate::types::ChannelAddress;

/// Channel acknowledgement: the message was accepted, not necessarily read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ack {
    pub message_id: Option<i64>,
}

/// Fallible one-shot delivery used by the delivery executor.
///
/// No ordering or batching guarantees; `Err` means the channel did not
/// accept the message and nothing should be recorded.
#[async_trait]
pub trait OutboundChannel: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, address: ChannelAddress, text: &str) -> Result<Ack>;
}

/// Conversational surface used by the registration and admin handlers.
#[async_trait]
pub trait ChatFrontend: Send + Sync {
    async fn reply(&self, chat: ChannelAddress, reply: Reply) -> Result<()>;

    /// Replace the text of a message the bot sent earlier.
    async fn edit_text(&self, chat: ChannelAddress, message_id: i64, text: &str) -> Result<()>;

    /// Dismiss the loading state of an inline button.
    async fn answer_callback(&self, callback_id: &str) -> Result<()>;
}
