//! # Dripcast Scheduler
//!
//! The delivery engine: on every tick, work out which (recipient, message)
//! pairs are due and push each one through the outbound channel exactly once.
//!
//! ## Architecture
//! ```text
//! SchedulerEngine (tokio interval, one tick at a time)
//!   ├── RecordStore::snapshot()      recipients + messages + deliveries
//!   ├── due::due_pairs(now, ...)     pure, deterministic order
//!   └── DeliveryExecutor             per pair: re-check → send → record
//!         ├── record check or channel failure → warn, pair stays due
//!         │                                     for the next tick
//!         ├── duplicate record → no-op
//!         └── record write failure after send → error, tick aborted
//! ```

pub mod delivery;
pub mod due;
pub mod engine;

#[cfg(test)]
mod testing;

pub use delivery::{DeliveryExecutor, DeliveryReport, PairOutcome};
pub use due::{DuePair, due_pairs};
pub use engine::{SchedulerEngine, SchedulerHandle, TickReport};
