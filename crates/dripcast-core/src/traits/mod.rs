//! Seams between the engine and its collaborators.

pub mod channel;
pub mod store;

pub use channel::{Ack, ChatFrontend, OutboundChannel};
pub use store::RecordStore;
