//! Domain records shared by the store, the scheduler and the front-end.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DripError, Result};

/// Recipient primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecipientId(pub i64);

/// Message primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub i64);

/// Where the outbound channel delivers to (a Telegram chat id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelAddress(pub i64);

impl fmt::Display for RecipientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ChannelAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered campaign recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: RecipientId,
    pub name: String,
    pub address: ChannelAddress,
    pub role: String,
    /// Fixed at creation; the campaign clock starts here.
    pub registered_at: DateTime<Utc>,
}

/// Recipient fields before the store assigns an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecipient {
    pub name: String,
    pub address: ChannelAddress,
    pub role: String,
    pub registered_at: DateTime<Utc>,
}

impl NewRecipient {
    /// A plain campaign subscriber registered at `now`.
    pub fn user(name: &str, address: ChannelAddress, now: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            address,
            role: "user".into(),
            registered_at: now,
        }
    }
}

/// Delay after registration, in (fractional) hours.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct DelayHours(f64);

impl DelayHours {
    /// Validate a delay against the configured minimum.
    pub fn new(hours: f64, min_hours: f64) -> Result<Self> {
        if !hours.is_finite() || hours < 0.0 {
            return Err(DripError::Validation(format!(
                "delay must be a non-negative number, got {hours}"
            )));
        }
        if hours < min_hours {
            return Err(DripError::Validation(format!(
                "delay must be at least {min_hours} hours"
            )));
        }
        Ok(Self(hours))
    }

    /// Parse operator input such as `"1.5"` or `"0,25"`.
    pub fn parse(input: &str, min_hours: f64) -> Result<Self> {
        let normalized = input.trim().replace(',', ".");
        let hours: f64 = normalized
            .parse()
            .map_err(|_| DripError::Validation(format!("'{}' is not a number", input.trim())))?;
        Self::new(hours, min_hours)
    }

    /// Rebuild from a stored value; skips the minimum check.
    pub fn from_stored(hours: f64) -> Self {
        Self(hours.max(0.0))
    }

    pub fn hours(&self) -> f64 {
        self.0
    }

    /// Millisecond-resolution duration, saturating at `Duration::MAX`.
    pub fn as_duration(&self) -> Duration {
        Duration::try_milliseconds((self.0 * 3_600_000.0).round() as i64).unwrap_or(Duration::MAX)
    }
}

/// A campaign message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub title: String,
    pub body: String,
    pub delay: DelayHours,
    pub link: String,
}

impl Message {
    /// Text handed to the outbound channel: body, then the link on its own line.
    pub fn compose(&self) -> String {
        if self.link.trim().is_empty() {
            self.body.clone()
        } else {
            format!("{}\n{}", self.body, self.link)
        }
    }
}

/// Message fields before the store assigns an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub title: String,
    pub body: String,
    pub delay: DelayHours,
    pub link: String,
}

/// Proof that one message reached one recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub recipient_id: RecipientId,
    pub message_id: MessageId,
    pub sent_at: DateTime<Utc>,
}

impl DeliveryRecord {
    pub fn key(&self) -> (RecipientId, MessageId) {
        (self.recipient_id, self.message_id)
    }
}

/// Everything the due-set evaluator needs, read in one transaction.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub recipients: Vec<Recipient>,
    pub messages: Vec<Message>,
    pub deliveries: Vec<DeliveryRecord>,
}
