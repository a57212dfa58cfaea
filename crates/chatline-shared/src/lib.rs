//! Shared domain types for the Chatline message timeline.
//!
//! Everything the store and the timeline engine exchange lives here: the
//! dual conversation identity, the conversation / chatroom records, date
//! bucketing, the error taxonomy and the store-facing traits.

pub mod constants;
pub mod error;
pub mod models;
pub mod store;
pub mod time;
pub mod types;

pub use error::{ChatlineError, Result};
pub use models::*;
pub use types::*;
