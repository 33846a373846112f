//! # Dripcast Channels
//! Channel implementations: the delivery engine's outbound channel and the
//! chat front-end are the same Telegram bot.

pub mod telegram;

pub use telegram::{TelegramChannel, TelegramPollingStream};
