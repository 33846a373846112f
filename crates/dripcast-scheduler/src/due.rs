//! Due-set evaluation — which pairs should be sent right now.

use chrono::{DateTime, Utc};
use dripcast_core::types::{DeliveryRecord, Message, MessageId, Recipient, RecipientId};
use std::collections::HashSet;

/// A (recipient, message) pair whose delay has elapsed and that has no record.
#[derive(Debug, Clone, PartialEq)]
pub struct DuePair {
    pub recipient: Recipient,
    pub message: Message,
    pub due_at: DateTime<Utc>,
}

impl DuePair {
    pub fn key(&self) -> (RecipientId, MessageId) {
        (self.recipient.id, self.message.id)
    }
}

/// When `message` becomes due for `recipient`. `None` if the sum overflows,
/// in which case the pair is never due.
pub fn due_at(recipient: &Recipient, message: &Message) -> Option<DateTime<Utc>> {
    recipient
        .registered_at
        .checked_add_signed(message.delay.as_duration())
}

/// Pairs with `now >= registered_at + delay` and no delivery record,
/// ordered by recipient id, then message id.
pub fn due_pairs(
    now: DateTime<Utc>,
    recipients: &[Recipient],
    messages: &[Message],
    deliveries: &[DeliveryRecord],
) -> Vec<DuePair> {
    let delivered: HashSet<(RecipientId, MessageId)> =
        deliveries.iter().map(DeliveryRecord::key).collect();

    let mut recipients: Vec<&Recipient> = recipients.iter().collect();
    recipients.sort_by_key(|r| r.id);
    let mut messages: Vec<&Message> = messages.iter().collect();
    messages.sort_by_key(|m| m.id);

    let mut due = Vec::new();
    for recipient in &recipients {
        for message in &messages {
            if delivered.contains(&(recipient.id, message.id)) {
                continue;
            }
            let Some(at) = due_at(recipient, message) else {
                continue;
            };
            if now >= at {
                due.push(DuePair {
                    recipient: (*recipient).clone(),
                    message: (*message).clone(),
                    due_at: at,
                });
            }
        }
    }
    due
}
