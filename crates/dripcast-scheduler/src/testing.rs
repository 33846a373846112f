//! Test doubles: a scripted outbound channel and a store with injectable faults.

use async_trait::async_trait;
use dripcast_core::error::{DripError, Result};
use dripcast_core::traits::{Ack, OutboundChannel, RecordStore};
use dripcast_core::types::{
    ChannelAddress, DeliveryRecord, Message, MessageId, NewMessage, NewRecipient, Recipient,
    RecipientId, Snapshot,
};
use dripcast_db::SqliteStore;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Notify;

/// Per-call outcome for [`ScriptedChannel`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    Ok,
    Fail,
    Panic,
}

/// Channel that plays back a script, then succeeds forever.
#[derive(Default)]
pub struct ScriptedChannel {
    script: Mutex<VecDeque<Step>>,
    attempts: Mutex<Vec<(ChannelAddress, String)>>,
    delivered: Mutex<Vec<(ChannelAddress, String)>>,
}

impl ScriptedChannel {
    pub fn new(script: &[Step]) -> Self {
        Self {
            script: Mutex::new(script.iter().copied().collect()),
            ..Default::default()
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    pub fn delivered(&self) -> Vec<(ChannelAddress, String)> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl OutboundChannel for ScriptedChannel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn send(&self, address: ChannelAddress, text: &str) -> Result<Ack> {
        self.attempts.lock().unwrap().push((address, text.to_string()));
        let step = self.script.lock().unwrap().pop_front().unwrap_or(Step::Ok);
        match step {
            Step::Ok => {
                self.delivered.lock().unwrap().push((address, text.to_string()));
                Ok(Ack::default())
            }
            Step::Fail => Err(DripError::Channel("bot was blocked by the user".into())),
            Step::Panic => panic!("channel exploded"),
        }
    }
}

/// Channel whose sends block until [`GatedChannel::open`] is called.
#[derive(Default)]
pub struct GatedChannel {
    entered: Notify,
    gate: Notify,
    attempts: Mutex<Vec<(ChannelAddress, String)>>,
}

impl GatedChannel {
    /// Wait until some send is blocked at the gate.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    /// Let one blocked send through.
    pub fn open(&self) {
        self.gate.notify_one();
    }

    pub fn attempts(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }
}

#[async_trait]
impl OutboundChannel for GatedChannel {
    fn name(&self) -> &str {
        "gated"
    }

    async fn send(&self, address: ChannelAddress, text: &str) -> Result<Ack> {
        self.attempts.lock().unwrap().push((address, text.to_string()));
        self.entered.notify_one();
        self.gate.notified().await;
        Ok(Ack::default())
    }
}

/// In-memory SQLite store with switches for the failure modes the engine must survive.
pub struct FaultyStore {
    pub inner: SqliteStore,
    pub fail_snapshot: AtomicBool,
    pub fail_insert: AtomicBool,
    /// Pretend no record exists on the per-pair re-check.
    pub hide_records: AtomicBool,
    /// Fail this many upcoming record lookups.
    pub fail_finds: AtomicUsize,
}

impl FaultyStore {
    pub async fn new() -> Self {
        let inner = SqliteStore::open_in_memory().unwrap();
        inner.init_schema().await.unwrap();
        Self {
            inner,
            fail_snapshot: AtomicBool::new(false),
            fail_insert: AtomicBool::new(false),
            hide_records: AtomicBool::new(false),
            fail_finds: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RecordStore for FaultyStore {
    async fn init_schema(&self) -> Result<()> {
        self.inner.init_schema().await
    }

    async fn list_recipients(&self) -> Result<Vec<Recipient>> {
        self.inner.list_recipients().await
    }

    async fn list_messages(&self) -> Result<Vec<Message>> {
        self.inner.list_messages().await
    }

    async fn list_delivery_records(&self) -> Result<Vec<DeliveryRecord>> {
        self.inner.list_delivery_records().await
    }

    async fn snapshot(&self) -> Result<Snapshot> {
        if self.fail_snapshot.load(Ordering::SeqCst) {
            return Err(DripError::Store("database is locked".into()));
        }
        self.inner.snapshot().await
    }

    async fn find_recipient_by_address(
        &self,
        address: ChannelAddress,
    ) -> Result<Option<Recipient>> {
        self.inner.find_recipient_by_address(address).await
    }

    async fn find_delivery_record(
        &self,
        recipient_id: RecipientId,
        message_id: MessageId,
    ) -> Result<Option<DeliveryRecord>> {
        if self
            .fail_finds
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(DripError::Store("database is locked".into()));
        }
        if self.hide_records.load(Ordering::SeqCst) {
            return Ok(None);
        }
        self.inner.find_delivery_record(recipient_id, message_id).await
    }

    async fn insert_delivery_record(&self, record: &DeliveryRecord) -> Result<()> {
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(DripError::Store("disk I/O error".into()));
        }
        self.inner.insert_delivery_record(record).await
    }

    async fn insert_recipient(&self, recipient: NewRecipient) -> Result<Recipient> {
        self.inner.insert_recipient(recipient).await
    }

    async fn insert_message(&self, message: NewMessage) -> Result<Message> {
        self.inner.insert_message(message).await
    }

    async fn delete_recipient(&self, id: RecipientId) -> Result<bool> {
        self.inner.delete_recipient(id).await
    }

    async fn delete_message(&self, id: MessageId) -> Result<bool> {
        self.inner.delete_message(id).await
    }
}
