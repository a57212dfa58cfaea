//! Interfaces of the collaborators the timeline consumes.
//!
//! [`ConversationStore`] is the authoritative source of chatroom and
//! conversation records (local cache plus backend). [`AttachmentUploader`]
//! moves picked files to remote storage. Both are used as trait objects.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::models::{
    AttachmentUploadRequest, Chatroom, ChatroomActions, Conversation, Member, MemberState, OgTags,
};
use crate::types::{ChatroomId, ConversationId, MemberId, TemporaryId};

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PageDirection {
    /// Oldest conversations of the chatroom.
    Top,
    /// Newest conversations of the chatroom.
    Bottom,
    /// Strictly older than the anchor.
    Above,
    /// Strictly newer than the anchor.
    Below,
}

/// A paginated conversation request. Results are always ordered oldest to
/// newest within the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationQuery {
    pub chatroom_id: ChatroomId,
    pub limit: usize,
    pub direction: PageDirection,
    pub anchor: Option<Conversation>,
}

impl ConversationQuery {
    pub fn bottom(chatroom_id: ChatroomId, limit: usize) -> Self {
        Self {
            chatroom_id,
            limit,
            direction: PageDirection::Bottom,
            anchor: None,
        }
    }

    pub fn top(chatroom_id: ChatroomId, limit: usize) -> Self {
        Self {
            chatroom_id,
            limit,
            direction: PageDirection::Top,
            anchor: None,
        }
    }

    pub fn above(chatroom_id: ChatroomId, limit: usize, anchor: Conversation) -> Self {
        Self {
            chatroom_id,
            limit,
            direction: PageDirection::Above,
            anchor: Some(anchor),
        }
    }

    pub fn below(chatroom_id: ChatroomId, limit: usize, anchor: Conversation) -> Self {
        Self {
            chatroom_id,
            limit,
            direction: PageDirection::Below,
            anchor: Some(anchor),
        }
    }
}

/// How the store should sync a chatroom in the background.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoadType {
    FirstTime,
    Reopen,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostConversationRequest {
    pub chatroom_id: ChatroomId,
    pub temporary_id: TemporaryId,
    pub text: String,
    pub reply_to: Option<ConversationId>,
    pub attachment_count: usize,
    pub share_link: Option<String>,
    pub og_tags: Option<OgTags>,
    /// Creation time of the optimistic copy, kept so the confirmed
    /// conversation sorts where the pending one was shown.
    pub created_epoch_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EditConversationRequest {
    pub conversation_id: ConversationId,
    pub text: String,
    pub share_link: Option<String>,
}

// ---------------------------------------------------------------------------
// Live events
// ---------------------------------------------------------------------------

/// Batches pushed by the store while a chatroom is observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveEvent {
    /// Conversations this user sent, now acknowledged.
    Posted(Vec<Conversation>),
    /// Edits, reactions and deletions from any actor.
    Changed(Vec<Conversation>),
    /// Conversations from other actors or other devices.
    New(Vec<Conversation>),
}

impl LiveEvent {
    pub fn conversations(&self) -> &[Conversation] {
        match self {
            Self::Posted(c) | Self::Changed(c) | Self::New(c) => c,
        }
    }
}

pub type LiveListener = mpsc::UnboundedSender<LiveEvent>;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get_chatroom(&self, chatroom_id: &ChatroomId) -> Result<Option<Chatroom>>;

    async fn get_conversation(&self, id: &ConversationId) -> Result<Option<Conversation>>;

    async fn get_conversations(&self, query: ConversationQuery) -> Result<Vec<Conversation>>;

    async fn post_conversation(&self, request: PostConversationRequest) -> Result<Conversation>;

    async fn edit_conversation(&self, request: EditConversationRequest) -> Result<Conversation>;

    async fn delete_conversations(&self, ids: &[ConversationId]) -> Result<()>;

    async fn put_reaction(&self, id: &ConversationId, reaction: &str) -> Result<()>;

    async fn set_chatroom_topic(
        &self,
        chatroom_id: &ChatroomId,
        conversation_id: &ConversationId,
    ) -> Result<()>;

    async fn mark_read_chatroom(&self, chatroom_id: &ChatroomId) -> Result<()>;

    async fn follow_chatroom(&self, chatroom_id: &ChatroomId, follow: bool) -> Result<()>;

    async fn mute_chatroom(&self, chatroom_id: &ChatroomId, mute: bool) -> Result<()>;

    async fn leave_chatroom(&self, chatroom_id: &ChatroomId) -> Result<()>;

    /// Register `listener` for Posted / Changed / New batches of a chatroom.
    async fn observe_conversations(
        &self,
        chatroom_id: &ChatroomId,
        listener: LiveListener,
    ) -> Result<()>;

    async fn save_temporary_conversation(&self, conversation: &Conversation) -> Result<()>;

    async fn save_posted_conversation(&self, conversation: &Conversation) -> Result<()>;

    async fn get_chatroom_actions(&self, chatroom_id: &ChatroomId) -> Result<ChatroomActions>;

    async fn get_member_state(&self) -> Result<MemberState>;

    async fn get_member(&self, id: &MemberId) -> Result<Option<Member>>;

    async fn decode_url(&self, url: &str) -> Result<Option<OgTags>>;

    /// Kick off a background sync of the chatroom's conversations.
    async fn sync_conversations(&self, chatroom_id: &ChatroomId, load_type: LoadType)
        -> Result<()>;
}

#[async_trait]
pub trait AttachmentUploader: Send + Sync {
    async fn upload(
        &self,
        conversation_id: &ConversationId,
        temporary_id: Option<&TemporaryId>,
        requests: Vec<AttachmentUploadRequest>,
    ) -> Result<()>;
}
