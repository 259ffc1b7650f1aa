//! Message storage module
//!
//! Durable, append-only log of direct messages; the single source of truth
//! for conversation history.

pub mod message_store;

pub use message_store::MessageStore;
