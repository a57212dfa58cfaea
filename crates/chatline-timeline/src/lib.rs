//! Message timeline reconciliation for a single open chatroom.
//!
//! [`Timeline`] keeps the date-grouped projection of conversations and
//! reconciles optimistic sends with server confirmations. [`spawn_session`]
//! wraps it in an actor that drives paging, live store events, sends and
//! chatroom actions, and reports back through [`PresentationEvent`]s.

pub mod config;
pub mod events;
pub mod link_preview;
pub mod live;
pub mod pagination;
pub mod projection;
pub mod retry;
pub mod session;
pub mod timeline;

pub use config::{ReactionFailurePolicy, SendFailurePolicy, TimelineConfig};
pub use events::{ExitReason, PresentationEvent};
pub use pagination::{decide_initial_load, InitialLoad, OpenContext};
pub use projection::{group_by_date, Projection, Section};
pub use retry::RetryPolicy;
pub use session::{spawn_session, MessageDraft, SessionCommand, SessionHandle};
pub use timeline::{Merge, Timeline, Upsert};
