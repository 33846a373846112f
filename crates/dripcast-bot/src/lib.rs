//! # Dripcast Bot
//!
//! Conversational front-end. Registers recipients on `/start`, walks the
//! operator through defining a message, lists and deletes records. Talks to
//! the delivery engine only through the record store.

pub mod dialogue;
pub mod handlers;

pub use dialogue::{Advance, AuthoringSession, AuthoringState};
pub use handlers::{Bot, Command};
