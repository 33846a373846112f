//! # Dripcast Core
//!
//! Shared vocabulary for the drip-campaign engine: domain records, the
//! record-store and channel traits, the injectable clock, configuration
//! and the crate-wide error type.

pub mod chat;
pub mod clock;
pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::DripcastConfig;
pub use error::{DripError, Result};
pub use traits::{Ack, ChatFrontend, OutboundChannel, RecordStore};
pub use types::{
    ChannelAddress, DelayHours, DeliveryRecord, Message, MessageId, NewMessage, NewRecipient,
    Recipient, RecipientId, Snapshot,
};
