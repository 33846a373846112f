//! Delivery executor — send each due pair, then record it.
//!
//! A record is written only after the channel confirms the send. Channel
//! failures leave the pair due for the next tick. A record write that fails
//! after a confirmed send is the one window where a duplicate can happen on
//! the next tick, so it is logged at error level and the tick stops there.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use dripcast_core::clock::Clock;
use dripcast_core::error::{DripError, Result};
use dripcast_core::traits::{OutboundChannel, RecordStore};
use dripcast_core::types::DeliveryRecord;
use tokio_util::sync::CancellationToken;

use crate::due::DuePair;

/// What happened to one pair.
#[derive(Debug, Clone, PartialEq)]
pub enum PairOutcome {
    /// Sent and recorded.
    Delivered,
    /// A record already existed (found on re-check or hit on insert).
    AlreadyDelivered,
    /// Channel refused; the pair stays due.
    ChannelFailed(String),
    /// The pre-send record lookup failed; nothing was sent and the pair stays due.
    CheckFailed(String),
    /// Recipient or message was deleted between the send and the record write.
    Vanished,
}

/// Tally of one delivery pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryReport {
    pub attempted: usize,
    pub delivered: usize,
    pub already_delivered: usize,
    pub failed: usize,
    pub vanished: usize,
    /// Shutdown was requested before every pair was attempted.
    pub interrupted: bool,
}

impl DeliveryReport {
    fn count(&mut self, outcome: &PairOutcome) {
        self.attempted += 1;
        match outcome {
            PairOutcome::Delivered => self.delivered += 1,
            PairOutcome::AlreadyDelivered => self.already_delivered += 1,
            PairOutcome::ChannelFailed(_) | PairOutcome::CheckFailed(_) => self.failed += 1,
            PairOutcome::Vanished => self.vanished += 1,
        }
    }
}

/// Sends due pairs through the outbound channel, one at a time.
pub struct DeliveryExecutor {
    store: Arc<dyn RecordStore>,
    channel: Arc<dyn OutboundChannel>,
    clock: Arc<dyn Clock>,
}

impl DeliveryExecutor {
    pub fn new(
        store: Arc<dyn RecordStore>,
        channel: Arc<dyn OutboundChannel>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            channel,
            clock,
        }
    }

    /// Attempt every pair in order. Cancellation is checked between pairs only.
    ///
    /// Returns `Err` only when a record write fails after a confirmed send;
    /// the remaining pairs are left for the next tick.
    pub async fn deliver_all(
        &self,
        pairs: &[DuePair],
        cancel: &CancellationToken,
    ) -> Result<DeliveryReport> {
        let mut report = DeliveryReport::default();
        for pair in pairs {
            if cancel.is_cancelled() {
                tracing::info!(
                    "⏹️ Shutdown requested, {} due pair(s) left for next start",
                    pairs.len() - report.attempted
                );
                report.interrupted = true;
                break;
            }
            let outcome = self.deliver_one(pair).await?;
            report.count(&outcome);
        }
        Ok(report)
    }

    /// Re-check, send, then record a single pair.
    pub async fn deliver_one(&self, pair: &DuePair) -> Result<PairOutcome> {
        let (recipient_id, message_id) = pair.key();

        match self.store.find_delivery_record(recipient_id, message_id).await {
            Ok(Some(_)) => {
                tracing::debug!("Already delivered: recipient {recipient_id} / message {message_id}");
                return Ok(PairOutcome::AlreadyDelivered);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    "⚠️ Record check failed for recipient {recipient_id} / message {message_id}, skipping: {e}"
                );
                return Ok(PairOutcome::CheckFailed(e.to_string()));
            }
        }

        let text = pair.message.compose();
        let sent = AssertUnwindSafe(self.channel.send(pair.recipient.address, &text))
            .catch_unwind()
            .await;

        match sent {
            Ok(Ok(_ack)) => {}
            Ok(Err(e)) => {
                tracing::warn!(
                    "⚠️ Send failed for recipient {} ({}) / message {} '{}': {e}",
                    recipient_id,
                    pair.recipient.address,
                    message_id,
                    pair.message.title
                );
                return Ok(PairOutcome::ChannelFailed(e.to_string()));
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                tracing::warn!(
                    "⚠️ Channel '{}' panicked for recipient {} / message {}: {reason}",
                    self.channel.name(),
                    recipient_id,
                    message_id
                );
                return Ok(PairOutcome::ChannelFailed(format!("panic: {reason}")));
            }
        }

        let record = DeliveryRecord {
            recipient_id,
            message_id,
            sent_at: self.clock.now(),
        };
        match self.store.insert_delivery_record(&record).await {
            Ok(()) => {
                tracing::info!(
                    "✅ Delivered message {} '{}' to recipient {} ({})",
                    message_id,
                    pair.message.title,
                    recipient_id,
                    pair.recipient.address
                );
                Ok(PairOutcome::Delivered)
            }
            Err(e) if e.is_duplicate() => {
                tracing::warn!(
                    "⚠️ Delivery record already present for recipient {recipient_id} / message {message_id}, treating as delivered"
                );
                Ok(PairOutcome::AlreadyDelivered)
            }
            Err(DripError::NotFound(what)) => {
                tracing::warn!("⚠️ Sent, but {what}; nothing to record");
                Ok(PairOutcome::Vanished)
            }
            Err(e) => {
                tracing::error!(
                    "🚨 Message {} was SENT to recipient {} but the delivery record was not saved: {e}. \
                     It may be sent again on the next tick.",
                    message_id,
                    recipient_id
                );
                Err(e)
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::due::due_pairs;
    use crate::testing::{FaultyStore, ScriptedChannel, Step};
    use chrono::{Duration, Utc};
    use dripcast_core::clock::ManualClock;
    use dripcast_core::types::{ChannelAddress, DelayHours, NewMessage, NewRecipient};
    use std::sync::atomic::Ordering;

    struct Fixture {
        store: Arc<FaultyStore>,
        channel: Arc<ScriptedChannel>,
        clock: Arc<ManualClock>,
        executor: DeliveryExecutor,
    }

    async fn fixture(script: &[Step], recipients: i64, messages: i64) -> Fixture {
        let start = Utc::now();
        let store = Arc::new(FaultyStore::new().await);
        for i in 0..recipients {
            store
                .insert_recipient(NewRecipient::user(&format!("r{i}"), ChannelAddress(100 + i), start))
                .await
                .unwrap();
        }
        for i in 0..messages {
            store
                .insert_message(NewMessage {
                    title: format!("m{i}"),
                    body: format!("body {i}"),
                    delay: DelayHours::new(1.0, 0.016).unwrap(),
                    link: "https://example.com".into(),
                })
                .await
                .unwrap();
        }
        let channel = Arc::new(ScriptedChannel::new(script));
        let clock = Arc::new(ManualClock::new(start + Duration::hours(2)));
        let executor = DeliveryExecutor::new(store.clone(), channel.clone(), clock.clone());
        Fixture {
            store,
            channel,
            clock,
            executor,
        }
    }

    async fn due(f: &Fixture) -> Vec<DuePair> {
        let snap = f.store.snapshot().await.unwrap();
        due_pairs(f.clock.now(), &snap.recipients, &snap.messages, &snap.deliveries)
    }

    #[tokio::test]
    async fn test_success_records_with_clock_time() {
        let f = fixture(&[], 1, 1).await;
        let pairs = due(&f).await;
        let report = f
            .executor
            .deliver_all(&pairs, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.delivered, 1);
        let records = f.store.list_delivery_records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sent_at, f.clock.now());
        assert_eq!(
            f.channel.delivered(),
            vec![(ChannelAddress(100), "body 0\nhttps://example.com".to_string())]
        );
    }

    #[tokio::test]
    async fn test_failure_continues_with_next_pair() {
        let f = fixture(&[Step::Fail, Step::Ok, Step::Fail, Step::Ok], 2, 2).await;
        let pairs = due(&f).await;
        let report = f
            .executor
            .deliver_all(&pairs, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.attempted, 4);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 2);
        assert_eq!(f.store.list_delivery_records().await.unwrap().len(), 2);
        // The failed pairs are still due
        assert_eq!(due(&f).await.len(), 2);
    }

    #[tokio::test]
    async fn test_panic_isolated_to_pair() {
        let f = fixture(&[Step::Panic], 1, 2).await;
        let pairs = due(&f).await;
        let report = f
            .executor
            .deliver_all(&pairs, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(f.store.list_delivery_records().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_existing_record_skips_send() {
        let f = fixture(&[], 1, 1).await;
        let pairs = due(&f).await;
        f.executor.deliver_one(&pairs[0]).await.unwrap();

        // Stale due-set from before the first delivery
        let outcome = f.executor.deliver_one(&pairs[0]).await.unwrap();
        assert_eq!(outcome, PairOutcome::AlreadyDelivered);
        assert_eq!(f.channel.attempts(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_noop() {
        let f = fixture(&[], 1, 1).await;
        let pairs = due(&f).await;
        f.executor.deliver_one(&pairs[0]).await.unwrap();

        f.store.hide_records.store(true, Ordering::SeqCst);
        let outcome = f.executor.deliver_one(&pairs[0]).await.unwrap();
        assert_eq!(outcome, PairOutcome::AlreadyDelivered);
        assert_eq!(f.store.list_delivery_records().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_record_write_failure_aborts_pass() {
        let f = fixture(&[], 1, 3).await;
        let pairs = due(&f).await;
        f.store.fail_insert.store(true, Ordering::SeqCst);

        let err = f
            .executor
            .deliver_all(&pairs, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DripError::Store(_)));
        // Sent once, then stopped: remaining pairs untouched
        assert_eq!(f.channel.attempts(), 1);
        assert!(f.store.list_delivery_records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_record_check_skips_only_that_pair() {
        let f = fixture(&[], 3, 1).await;
        let pairs = due(&f).await;
        f.store.fail_finds.store(1, Ordering::SeqCst);

        let report = f
            .executor
            .deliver_all(&pairs, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.attempted, 3);
        assert_eq!(report.failed, 1);
        assert_eq!(report.delivered, 2);
        // The skipped pair was never sent and is still due
        assert_eq!(f.channel.attempts(), 2);
        assert_eq!(f.store.list_delivery_records().await.unwrap().len(), 2);
        let left = due(&f).await;
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].key(), pairs[0].key());
    }

    #[tokio::test]
    async fn test_deleted_recipient_mid_pass() {
        let f = fixture(&[], 1, 1).await;
        let pairs = due(&f).await;
        f.store.delete_recipient(pairs[0].recipient.id).await.unwrap();

        let outcome = f.executor.deliver_one(&pairs[0]).await.unwrap();
        assert_eq!(outcome, PairOutcome::Vanished);
        assert!(f.store.list_delivery_records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_before_pass() {
        let f = fixture(&[], 2, 2).await;
        let pairs = due(&f).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = f.executor.deliver_all(&pairs, &cancel).await.unwrap();
        assert!(report.interrupted);
        assert_eq!(report.attempted, 0);
        assert_eq!(f.channel.attempts(), 0);
    }
}
