use thiserror::Error;

/// Errors surfaced by a conversation store or upload service.
///
/// None of these cross the session boundary: the timeline logs them and
/// turns them into a retry, an exit signal, a failed delivery or a no-op.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatlineError {
    /// The chatroom record is not available yet (retryable).
    #[error("Chatroom not found: {0}")]
    ChatroomNotFound(String),

    /// The chatroom was deleted remotely (terminal for the session).
    #[error("Chatroom deleted: {0}")]
    ChatroomDeleted(String),

    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    /// The backend refused the request.
    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Attachment upload failed: {0}")]
    Upload(String),

    /// Neither a temporary nor a server id was supplied.
    #[error("Conversation has no usable identity")]
    InvalidIdentity,

    /// The session task is gone.
    #[error("Session closed")]
    Closed,
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, ChatlineError>;
