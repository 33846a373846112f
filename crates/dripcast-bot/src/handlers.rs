//! Chat handlers — `/start` registration, `/admin` panel, authoring and deletion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use dripcast_core::chat::{IncomingEvent, Reply};
use dripcast_core::clock::Clock;
use dripcast_core::config::BotConfig;
use dripcast_core::error::{DripError, Result};
use dripcast_core::traits::{ChatFrontend, RecordStore};
use dripcast_core::types::{ChannelAddress, MessageId, NewRecipient, RecipientId};
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::dialogue::{Advance, AuthoringSession};

pub const BUTTON_ADD_MESSAGE: &str = "Add message";
pub const BUTTON_LIST_MESSAGES: &str = "List messages";
pub const BUTTON_LIST_USERS: &str = "List users";

const DELETE_MESSAGE_PREFIX: &str = "delete_message_";
const DELETE_USER_PREFIX: &str = "delete_user_";

/// Text commands and admin keyboard buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Admin,
    AddMessage,
    ListMessages,
    ListUsers,
    Cancel,
}

impl Command {
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "/start" => Some(Command::Start),
            "/admin" => Some(Command::Admin),
            "/cancel" => Some(Command::Cancel),
            BUTTON_ADD_MESSAGE => Some(Command::AddMessage),
            BUTTON_LIST_MESSAGES => Some(Command::ListMessages),
            BUTTON_LIST_USERS => Some(Command::ListUsers),
            _ => None,
        }
    }
}

/// The conversational front-end.
pub struct Bot {
    store: Arc<dyn RecordStore>,
    frontend: Arc<dyn ChatFrontend>,
    clock: Arc<dyn Clock>,
    config: BotConfig,
    min_delay_hours: f64,
    /// In-progress authoring sessions, keyed by operator chat.
    sessions: Mutex<HashMap<ChannelAddress, AuthoringSession>>,
}

impl Bot {
    pub fn new(
        store: Arc<dyn RecordStore>,
        frontend: Arc<dyn ChatFrontend>,
        clock: Arc<dyn Clock>,
        config: BotConfig,
        min_delay_hours: f64,
    ) -> Self {
        Self {
            store,
            frontend,
            clock,
            config,
            min_delay_hours,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Handle events until the stream ends or `cancel` fires.
    pub async fn run<S>(&self, mut events: S, cancel: CancellationToken)
    where
        S: Stream<Item = IncomingEvent> + Unpin,
    {
        tracing::info!("💬 Bot front-end started");
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.next() => event,
            };
            let Some(event) = event else { break };
            let chat = event.chat();
            if let Err(e) = self.handle(event).await {
                tracing::warn!("⚠️ Failed to handle event from chat {chat}: {e}");
            }
        }
        tracing::info!("💬 Bot front-end stopped");
    }

    /// Dispatch one event.
    pub async fn handle(&self, event: IncomingEvent) -> Result<()> {
        match event {
            IncomingEvent::Text {
                chat,
                sender_name,
                text,
            } => self.on_text(chat, &sender_name, &text).await,
            IncomingEvent::Callback {
                callback_id,
                chat,
                message_id,
                data,
            } => {
                let result = self.on_callback(chat, message_id, &data).await;
                self.frontend.answer_callback(&callback_id).await?;
                result
            }
        }
    }

    async fn on_text(&self, chat: ChannelAddress, sender_name: &str, text: &str) -> Result<()> {
        // Commands win over an open dialogue
        if let Some(command) = Command::parse(text) {
            return self.on_command(chat, sender_name, command).await;
        }

        let step = {
            let mut sessions = self.lock_sessions();
            let Some(session) = sessions.get_mut(&chat) else {
                return Ok(());
            };
            let step = session.submit(text);
            if session.is_done() {
                sessions.remove(&chat);
            }
            step
        };

        match step {
            Ok(Advance::Prompt(prompt)) => self.say(chat, prompt).await,
            Ok(Advance::Complete(message)) => {
                self.store.insert_message(message).await?;
                self.say(chat, "Message saved! ✅").await
            }
            Err(DripError::Validation(reason)) => self.say(chat, &reason).await,
            Err(e) => Err(e),
        }
    }

    async fn on_command(&self, chat: ChannelAddress, sender_name: &str, command: Command) -> Result<()> {
        match command {
            Command::Start => self.register(chat, sender_name).await,
            Command::Admin => {
                let reply = Reply::text("Admin panel:").with_keyboard(&[
                    BUTTON_ADD_MESSAGE,
                    BUTTON_LIST_MESSAGES,
                    BUTTON_LIST_USERS,
                ]);
                self.frontend.reply(chat, reply).await
            }
            Command::AddMessage => {
                let (session, prompt) = AuthoringSession::start(self.min_delay_hours);
                self.lock_sessions().insert(chat, session);
                self.say(chat, prompt).await
            }
            Command::Cancel => {
                let removed = self.lock_sessions().remove(&chat).is_some();
                if removed {
                    self.say(chat, "Cancelled.").await
                } else {
                    Ok(())
                }
            }
            Command::ListMessages => self.list_messages(chat).await,
            Command::ListUsers => self.list_users(chat).await,
        }
    }

    /// Register on first contact; registration time starts the campaign.
    async fn register(&self, chat: ChannelAddress, sender_name: &str) -> Result<()> {
        if self.store.find_recipient_by_address(chat).await?.is_some() {
            return self.say(chat, &self.config.already_registered_text).await;
        }
        let recipient = NewRecipient::user(sender_name, chat, self.clock.now());
        self.store.insert_recipient(recipient).await?;
        self.say(chat, &self.config.welcome_text).await
    }

    async fn list_messages(&self, chat: ChannelAddress) -> Result<()> {
        let messages = self.store.list_messages().await?;
        if messages.is_empty() {
            return self.say(chat, "The message list is empty.").await;
        }
        for message in messages {
            let reply = Reply::text(format!(
                "📩 {}\n📝 {}\n🔗 {}\n⏱ {}h",
                message.title,
                message.body,
                message.link,
                message.delay.hours()
            ))
            .with_inline_button("Delete", format!("{DELETE_MESSAGE_PREFIX}{}", message.id));
            self.frontend.reply(chat, reply).await?;
        }
        Ok(())
    }

    async fn list_users(&self, chat: ChannelAddress) -> Result<()> {
        let recipients = self.store.list_recipients().await?;
        if recipients.is_empty() {
            return self.say(chat, "The user list is empty.").await;
        }
        for recipient in recipients {
            let reply = Reply::text(format!("👤 {} ({})", recipient.name, recipient.address))
                .with_inline_button("Delete", format!("{DELETE_USER_PREFIX}{}", recipient.id));
            self.frontend.reply(chat, reply).await?;
        }
        Ok(())
    }

    async fn on_callback(&self, chat: ChannelAddress, message_id: i64, data: &str) -> Result<()> {
        let text = if let Some(id) = parse_id(data, DELETE_MESSAGE_PREFIX) {
            if self.store.delete_message(MessageId(id)).await? {
                tracing::info!("🗑️ Message {id} deleted by chat {chat}");
                "Message deleted."
            } else {
                "Message was already deleted."
            }
        } else if let Some(id) = parse_id(data, DELETE_USER_PREFIX) {
            if self.store.delete_recipient(RecipientId(id)).await? {
                tracing::info!("🗑️ Recipient {id} deleted by chat {chat}");
                "User deleted."
            } else {
                "User was already deleted."
            }
        } else {
            tracing::debug!("Ignoring unknown callback '{data}'");
            return Ok(());
        };
        self.frontend.edit_text(chat, message_id, text).await
    }

    async fn say(&self, chat: ChannelAddress, text: &str) -> Result<()> {
        self.frontend.reply(chat, Reply::text(text)).await
    }

    fn lock_sessions(&self) -> std::sync::MutexGuard<'_, HashMap<ChannelAddress, AuthoringSession>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn parse_id(data: &str, prefix: &str) -> Option<i64> {
    data.strip_prefix(prefix)?.parse().ok()
}
