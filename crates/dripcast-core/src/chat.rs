//! Front-end message types, independent of the chat platform.

use serde::{Deserialize, Serialize};

use crate::types::ChannelAddress;

/// Something a user did in the chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IncomingEvent {
    /// Plain text or a command.
    Text {
        chat: ChannelAddress,
        sender_name: String,
        text: String,
    },
    /// Inline button press.
    Callback {
        callback_id: String,
        chat: ChannelAddress,
        message_id: i64,
        data: String,
    },
}

impl IncomingEvent {
    pub fn chat(&self) -> ChannelAddress {
        match self {
            IncomingEvent::Text { chat, .. } | IncomingEvent::Callback { chat, .. } => *chat,
        }
    }
}

/// Buttons attached to a reply.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum ReplyMarkup {
    #[default]
    None,
    /// Persistent reply keyboard, one button per row.
    Keyboard(Vec<String>),
    /// Inline buttons as `(label, callback_data)`.
    Inline(Vec<(String, String)>),
}

/// Outgoing front-end message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub text: String,
    #[serde(default)]
    pub markup: ReplyMarkup,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markup: ReplyMarkup::None,
        }
    }

    pub fn with_keyboard(mut self, buttons: &[&str]) -> Self {
        self.markup = ReplyMarkup::Keyboard(buttons.iter().map(|b| b.to_string()).collect());
        self
    }

    pub fn with_inline_button(mut self, label: &str, data: impl Into<String>) -> Self {
        let button = (label.to_string(), data.into());
        match &mut self.markup {
            ReplyMarkup::Inline(buttons) => buttons.push(button),
            markup => *markup = ReplyMarkup::Inline(vec![button]),
        }
        self
    }
}
