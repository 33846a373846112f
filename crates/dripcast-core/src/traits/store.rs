//! Record store trait — durable recipients, messages and delivery records.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    ChannelAddress, DeliveryRecord, Message, MessageId, NewMessage, NewRecipient, Recipient,
    RecipientId, Snapshot,
};

/// Transactional storage for the three campaign entities.
///
/// Listing methods return rows in ascending id order.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create tables if they are missing. Safe to call on every start.
    async fn init_schema(&self) -> Result<()>;

    async fn list_recipients(&self) -> Result<Vec<Recipient>>;

    async fn list_messages(&self) -> Result<Vec<Message>>;

    async fn list_delivery_records(&self) -> Result<Vec<DeliveryRecord>>;

    /// All three collections read in a single transaction.
    async fn snapshot(&self) -> Result<Snapshot>;

    async fn find_recipient_by_address(&self, address: ChannelAddress)
        -> Result<Option<Recipient>>;

    async fn find_delivery_record(
        &self,
        recipient_id: RecipientId,
        message_id: MessageId,
    ) -> Result<Option<DeliveryRecord>>;

    /// Fails with `DripError::DuplicateKey` when the pair already has a record.
    async fn insert_delivery_record(&self, record: &DeliveryRecord) -> Result<()>;

    async fn insert_recipient(&self, recipient: NewRecipient) -> Result<Recipient>;

    async fn insert_message(&self, message: NewMessage) -> Result<Message>;

    /// Removes the recipient and its delivery records. Returns false if absent.
    async fn delete_recipient(&self, id: RecipientId) -> Result<bool>;

    /// Removes the message and its delivery records. Returns false if absent.
    async fn delete_message(&self, id: MessageId) -> Result<bool>;
}
