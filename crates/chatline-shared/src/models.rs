//! Domain records exchanged between the conversation store and the timeline.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be persisted
//! as JSON columns by the store and handed to a presentation layer as is.

use serde::{Deserialize, Serialize};

use crate::constants::GIF_MESSAGE_MARKER;
use crate::time::{normalize_epoch_ms, DateBucketer};
use crate::types::{ChatroomId, ConversationId, Identity, MemberId, TemporaryId};

// ---------------------------------------------------------------------------
// Member
// ---------------------------------------------------------------------------

/// A chat participant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Member {
    pub id: MemberId,
    pub name: String,
    pub image_url: Option<String>,
    /// Custom title such as "Community Manager".
    pub title: Option<String>,
}

impl Member {
    pub fn new(id: impl Into<MemberId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            image_url: None,
            title: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Attachments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    Video,
    Audio,
    VoiceNote,
    Gif,
    Pdf,
    Link,
    Other,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachmentMeta {
    pub size: Option<u64>,
    pub number_of_pages: Option<u32>,
    /// Duration in seconds for audio and video.
    pub duration: Option<u32>,
}

/// A file attached to a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    pub name: Option<String>,
    pub url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub local_path: Option<String>,
    pub kind: AttachmentKind,
    /// 1-based position inside the conversation.
    pub index: u32,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub meta: AttachmentMeta,
}

/// A local file the user picked for sending, before any upload happened.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachmentDraft {
    pub name: String,
    pub local_path: String,
    pub thumbnail_path: Option<String>,
    pub kind: AttachmentKind,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub meta: AttachmentMeta,
}

/// One file handed to the upload service once the server id is known.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachmentUploadRequest {
    pub chatroom_id: ChatroomId,
    pub conversation_id: ConversationId,
    pub index: u32,
    pub draft: AttachmentDraft,
}

impl AttachmentUploadRequest {
    /// Build upload requests for every draft, numbering them from 1.
    pub fn for_drafts(
        chatroom_id: &ChatroomId,
        conversation_id: &ConversationId,
        drafts: &[AttachmentDraft],
    ) -> Vec<Self> {
        drafts
            .iter()
            .enumerate()
            .map(|(i, draft)| Self {
                chatroom_id: chatroom_id.clone(),
                conversation_id: conversation_id.clone(),
                index: i as u32 + 1,
                draft: draft.clone(),
            })
            .collect()
    }

    /// Attachment record saved alongside the posted conversation.
    pub fn to_attachment(&self) -> Attachment {
        self.draft.to_attachment(self.index)
    }
}

impl AttachmentDraft {
    /// Local-only attachment shown while the file has not been uploaded.
    pub fn to_attachment(&self, index: u32) -> Attachment {
        Attachment {
            name: Some(self.name.clone()),
            url: Some(self.local_path.clone()),
            thumbnail_url: self.thumbnail_path.clone(),
            local_path: Some(self.local_path.clone()),
            kind: self.kind,
            index,
            width: self.width,
            height: self.height,
            meta: self.meta.clone(),
        }
    }
}

/// Link preview metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OgTags {
    pub url: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
}

// ---------------------------------------------------------------------------
// Reactions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reaction {
    pub member: Member,
    pub reaction: String,
}

/// Reactions of one kind, as shown under a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReactionGroup {
    pub reaction: String,
    pub members: Vec<MemberId>,
    pub count: usize,
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    #[default]
    Normal,
    /// Synthetic entry rendered from the chatroom's own metadata.
    ChatroomHeader,
    MemberJoined,
    MemberLeft,
    TopicChanged,
    Poll,
}

/// Where a conversation stands in the optimistic-send window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    Pending,
    #[default]
    Sent,
    Failed,
}

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub identity: Identity,
    pub chatroom_id: ChatroomId,
    pub member: Option<Member>,
    pub body: String,
    /// Creation time, always in milliseconds.
    pub created_epoch_ms: i64,
    pub attachments: Vec<Attachment>,
    pub reactions: Vec<Reaction>,
    pub reply_to_id: Option<ConversationId>,
    pub reply_to: Option<Box<Conversation>>,
    pub is_edited: bool,
    pub deleted_by: Option<Member>,
    pub attachment_count: usize,
    pub attachment_uploaded: bool,
    pub og_tags: Option<OgTags>,
    pub state: ConversationState,
    pub delivery: Delivery,
}

impl Conversation {
    /// A plain text conversation; `created_epoch` may be seconds or millis.
    pub fn new(
        identity: Identity,
        chatroom_id: ChatroomId,
        body: impl Into<String>,
        created_epoch: i64,
    ) -> Self {
        Self {
            identity,
            chatroom_id,
            member: None,
            body: body.into(),
            created_epoch_ms: normalize_epoch_ms(created_epoch),
            attachments: Vec::new(),
            reactions: Vec::new(),
            reply_to_id: None,
            reply_to: None,
            is_edited: false,
            deleted_by: None,
            attachment_count: 0,
            attachment_uploaded: false,
            og_tags: None,
            state: ConversationState::Normal,
            delivery: Delivery::Sent,
        }
    }

    /// Synthetic first entry built from chatroom metadata.
    pub fn chatroom_header(chatroom: &Chatroom) -> Self {
        let mut header = Self::new(
            Identity::Confirmed(ConversationId::new(chatroom.id.as_str())),
            chatroom.id.clone(),
            chatroom.title.clone(),
            chatroom.created_epoch_ms,
        );
        header.member = chatroom.member.clone();
        header.state = ConversationState::ChatroomHeader;
        header
    }

    pub fn with_member(mut self, member: Member) -> Self {
        self.member = Some(member);
        self
    }

    pub fn server_id(&self) -> Option<&ConversationId> {
        self.identity.server_id()
    }

    pub fn temporary_id(&self) -> Option<&TemporaryId> {
        self.identity.temporary_id()
    }

    /// Whether `id` names this conversation by its server id.
    pub fn has_server_id(&self, id: &ConversationId) -> bool {
        self.server_id() == Some(id)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_by.is_some()
    }

    pub fn is_header(&self) -> bool {
        self.state == ConversationState::ChatroomHeader
    }

    /// Live "New" events only render a conversation once its media is
    /// fetchable.
    pub fn media_ready(&self) -> bool {
        self.attachment_count == 0 || self.attachment_uploaded
    }

    pub fn bucket_key(&self, bucketer: &DateBucketer) -> String {
        bucketer.bucket_key(self.created_epoch_ms)
    }

    /// Replace `actor`'s reaction (if any) with `reaction`.
    pub fn with_reaction(mut self, actor: &Member, reaction: impl Into<String>) -> Self {
        self.reactions.retain(|r| r.member.id != actor.id);
        self.reactions.push(Reaction {
            member: actor.clone(),
            reaction: reaction.into(),
        });
        self
    }

    pub fn without_reaction(mut self, actor: &MemberId) -> Self {
        self.reactions.retain(|r| &r.member.id != actor);
        self
    }

    /// Reactions grouped by kind, newest kind first, members in arrival order.
    pub fn grouped_reactions(&self) -> Vec<ReactionGroup> {
        let mut groups: Vec<ReactionGroup> = Vec::new();
        for reaction in self.reactions.iter().rev() {
            match groups.iter_mut().find(|g| g.reaction == reaction.reaction) {
                Some(group) => {
                    group.members.push(reaction.member.id.clone());
                    group.count += 1;
                }
                None => groups.push(ReactionGroup {
                    reaction: reaction.reaction.clone(),
                    members: vec![reaction.member.id.clone()],
                    count: 1,
                }),
            }
        }
        groups
    }

    /// Body with composer-only markers removed.
    pub fn display_body(&self) -> String {
        self.body.replace(GIF_MESSAGE_MARKER, "")
    }
}

// ---------------------------------------------------------------------------
// Chatroom
// ---------------------------------------------------------------------------

/// Chatroom metadata as served by the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chatroom {
    pub id: ChatroomId,
    pub title: String,
    pub member: Option<Member>,
    pub created_epoch_ms: i64,
    pub community_id: Option<String>,
    pub deleted_by: Option<MemberId>,
    pub total_response_count: u64,
    pub last_seen_conversation_id: Option<ConversationId>,
    pub unseen_count: u64,
    pub is_conversation_stored: bool,
    pub topic: Option<Box<Conversation>>,
    pub topic_id: Option<ConversationId>,
    pub follow_status: bool,
    pub muted: bool,
    pub is_secret: bool,
}

impl Chatroom {
    pub fn new(id: impl Into<ChatroomId>, title: impl Into<String>, created_epoch: i64) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            member: None,
            created_epoch_ms: normalize_epoch_ms(created_epoch),
            community_id: None,
            deleted_by: None,
            total_response_count: 0,
            last_seen_conversation_id: None,
            unseen_count: 0,
            is_conversation_stored: false,
            topic: None,
            topic_id: None,
            follow_status: false,
            muted: false,
            is_secret: false,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_by.is_some()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChatroomAction {
    ViewParticipants,
    Invite,
    Report,
    Leave,
    Follow,
    Unfollow,
    Mute,
    Unmute,
}

/// Header data and the action menu for a chatroom.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatroomActions {
    pub participant_count: u64,
    pub actions: Vec<ChatroomAction>,
}

// ---------------------------------------------------------------------------
// Member state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Admin,
    Member,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MemberRight {
    RespondInChatrooms,
    CreateChatrooms,
    CreatePolls,
    SetTopic,
    DeleteOthers,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemberRightGrant {
    pub right: MemberRight,
    pub selected: bool,
}

/// The local member's role and rights in the community.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemberState {
    pub member: Member,
    pub role: MemberRole,
    pub rights: Vec<MemberRightGrant>,
}

impl MemberState {
    pub fn is_admin(&self) -> bool {
        self.role == MemberRole::Admin
    }

    pub fn has_right(&self, right: MemberRight) -> bool {
        self.rights
            .iter()
            .find(|grant| grant.right == right)
            .map(|grant| grant.selected)
            .unwrap_or(false)
    }
}
