//! # chatline-store
//!
//! Local conversation cache for the Chatline timeline, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for chatrooms,
//! members, conversations and reactions, plus [`SqliteConversationStore`],
//! an async `ConversationStore` implementation that fans changes out to
//! live observers.

pub mod chatrooms;
pub mod conversations;
pub mod database;
pub mod members;
pub mod migrations;
pub mod reactions;
pub mod sqlite_store;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use sqlite_store::SqliteConversationStore;
