//! Scheduler Engine — the main loop that evaluates and delivers due pairs.
//! Uses tokio::interval for ticking; ticks never overlap and a late tick
//! is delayed rather than skipped.

use std::sync::Arc;
use std::time::Duration;

use dripcast_core::clock::{Clock, SystemClock};
use dripcast_core::config::SchedulerConfig;
use dripcast_core::error::Result;
use dripcast_core::traits::{OutboundChannel, RecordStore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::delivery::{DeliveryExecutor, DeliveryReport};
use crate::due::due_pairs;

/// Result of one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub due: usize,
    pub delivery: DeliveryReport,
}

/// The scheduler engine: owns the executor and drives it on a fixed period.
pub struct SchedulerEngine {
    store: Arc<dyn RecordStore>,
    executor: DeliveryExecutor,
    clock: Arc<dyn Clock>,
    period: Duration,
}

impl SchedulerEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        channel: Arc<dyn OutboundChannel>,
        clock: Arc<dyn Clock>,
        period: Duration,
    ) -> Self {
        let executor = DeliveryExecutor::new(store.clone(), channel, clock.clone());
        Self {
            store,
            executor,
            clock,
            period,
        }
    }

    /// Wall-clock engine with the configured tick period.
    pub fn from_config(
        store: Arc<dyn RecordStore>,
        channel: Arc<dyn OutboundChannel>,
        config: &SchedulerConfig,
    ) -> Self {
        Self::new(
            store,
            channel,
            Arc::new(SystemClock),
            Duration::from_secs(config.tick_interval_secs.max(1)),
        )
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// One evaluation + delivery pass.
    ///
    /// A store read failure aborts the tick before anything is sent.
    pub async fn tick(&self, cancel: &CancellationToken) -> Result<TickReport> {
        let now = self.clock.now();
        let snapshot = self.store.snapshot().await?;
        let due = due_pairs(
            now,
            &snapshot.recipients,
            &snapshot.messages,
            &snapshot.deliveries,
        );

        if due.is_empty() {
            tracing::trace!("Tick: nothing due");
            return Ok(TickReport::default());
        }

        tracing::info!("🔔 {} pair(s) due", due.len());
        let delivery = self.executor.deliver_all(&due, cancel).await?;
        if delivery.failed > 0 {
            tracing::info!(
                "📣 Tick done: {} delivered, {} failed (will retry)",
                delivery.delivered,
                delivery.failed
            );
        } else {
            tracing::info!("📣 Tick done: {} delivered", delivery.delivered);
        }

        Ok(TickReport {
            due: due.len(),
            delivery,
        })
    }

    /// Tick until `cancel` fires. The first tick runs immediately.
    ///
    /// Cancellation is observed while idle and between pairs, so shutdown
    /// never abandons a pair mid-send.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!("⏰ Scheduler started (check every {}s)", self.period.as_secs_f64());

        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            if let Err(e) = self.tick(&cancel).await {
                tracing::error!("❌ Tick aborted: {e}");
            }
        }

        tracing::info!("⏰ Scheduler stopped");
    }

    /// Spawn the loop as a background task.
    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        let cancel = CancellationToken::new();
        let join = spawn_scheduler(self, cancel.clone());
        SchedulerHandle { cancel, join }
    }
}

/// Spawn the scheduler loop on the tokio runtime.
pub fn spawn_scheduler(engine: Arc<SchedulerEngine>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move { engine.run(cancel).await })
}

/// Running scheduler; `stop` waits for the in-flight pair to finish.
pub struct SchedulerHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.join.await {
            tracing::error!("Scheduler task ended abnormally: {e}");
        }
    }
}
