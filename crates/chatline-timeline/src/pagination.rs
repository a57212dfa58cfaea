//! Initial-load decision tree and page assembly.
//!
//! Everything here is pure: the session fetches pages from the store and
//! hands them to the `assemble_*` functions, which decide where the
//! synthetic chatroom header goes.

use chatline_shared::store::ConversationQuery;
use chatline_shared::{Chatroom, ChatroomId, Conversation, ConversationId, Member, ScrollDirection};

/// How a chatroom screen was opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenContext {
    pub chatroom_id: ChatroomId,
    /// Explicit target from a deep link or search result.
    pub conversation_id: Option<ConversationId>,
    /// Target of a report flow.
    pub reported_conversation_id: Option<ConversationId>,
    /// The signed-in member.
    pub local_member: Member,
}

impl OpenContext {
    pub fn new(chatroom_id: impl Into<ChatroomId>, local_member: Member) -> Self {
        Self {
            chatroom_id: chatroom_id.into(),
            conversation_id: None,
            reported_conversation_id: None,
            local_member,
        }
    }

    pub fn with_target(mut self, conversation_id: impl Into<ConversationId>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_reported(mut self, conversation_id: impl Into<ConversationId>) -> Self {
        self.reported_conversation_id = Some(conversation_id.into());
        self
    }

    /// Explicit target first, reported conversation second.
    pub fn target(&self) -> Option<&ConversationId> {
        self.conversation_id
            .as_ref()
            .or(self.reported_conversation_id.as_ref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwaitReason {
    NoLastSeen,
    NotStored,
}

/// Outcome of the initial-load decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitialLoad {
    /// The chatroom record is not available yet.
    RetryLater,
    /// The chatroom was deleted; the screen must close.
    ExitSession,
    /// Jump to a deep-link, search or report target.
    JumpTo(ConversationId),
    LoadBottom,
    /// Nothing to fetch until the store signals more data.
    AwaitSignal(AwaitReason),
    /// Jump to the last conversation the member has seen.
    JumpToLastSeen(ConversationId),
}

/// Evaluate the open rules in priority order.
///
/// `first_open` is set when an earlier lookup in this session missed the
/// chatroom, and cleared by the bottom load that follows.
pub fn decide_initial_load(
    chatroom: Option<&Chatroom>,
    context: &OpenContext,
    first_open: bool,
) -> InitialLoad {
    let Some(chatroom) = chatroom else {
        return InitialLoad::RetryLater;
    };
    if chatroom.is_deleted() {
        return InitialLoad::ExitSession;
    }
    if let Some(target) = context.target() {
        return InitialLoad::JumpTo(target.clone());
    }
    if chatroom.total_response_count == 0 || first_open {
        return InitialLoad::LoadBottom;
    }
    let Some(ref last_seen) = chatroom.last_seen_conversation_id else {
        return InitialLoad::AwaitSignal(AwaitReason::NoLastSeen);
    };
    if !chatroom.is_conversation_stored {
        return InitialLoad::AwaitSignal(AwaitReason::NotStored);
    }
    if chatroom.unseen_count == 0 {
        return InitialLoad::LoadBottom;
    }
    InitialLoad::JumpToLastSeen(last_seen.clone())
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

pub fn more_query(
    chatroom_id: &ChatroomId,
    limit: usize,
    anchor: Conversation,
    direction: ScrollDirection,
) -> ConversationQuery {
    match direction {
        ScrollDirection::Up => ConversationQuery::above(chatroom_id.clone(), limit, anchor),
        ScrollDirection::Down => ConversationQuery::below(chatroom_id.clone(), limit, anchor),
    }
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

fn with_header(mut page: Vec<Conversation>, chatroom: Option<&Chatroom>) -> Vec<Conversation> {
    if let Some(chatroom) = chatroom {
        page.insert(0, Conversation::chatroom_header(chatroom));
    }
    page
}

/// Newest page; a short page means the chatroom start is in view.
pub fn assemble_bottom(
    page: Vec<Conversation>,
    chatroom: Option<&Chatroom>,
    limit: usize,
) -> Vec<Conversation> {
    if page.len() < limit {
        with_header(page, chatroom)
    } else {
        page
    }
}

/// Oldest page, which always starts at the chatroom header.
pub fn assemble_top(page: Vec<Conversation>, chatroom: Option<&Chatroom>) -> Vec<Conversation> {
    with_header(page, chatroom)
}

/// `above + anchor + below`, headed by the chatroom when `above` is short.
pub fn assemble_jump(
    above: Vec<Conversation>,
    anchor: Conversation,
    below: Vec<Conversation>,
    chatroom: Option<&Chatroom>,
    limit: usize,
) -> Vec<Conversation> {
    let short = above.len() < limit;
    let mut all = Vec::with_capacity(above.len() + below.len() + 2);
    all.extend(above);
    all.push(anchor);
    all.extend(below);
    if short {
        with_header(all, chatroom)
    } else {
        all
    }
}

/// Incremental page; `None` when there is nothing to merge.
pub fn assemble_more(
    page: Vec<Conversation>,
    direction: ScrollDirection,
    chatroom: Option<&Chatroom>,
    limit: usize,
) -> Option<Vec<Conversation>> {
    if page.is_empty() {
        return None;
    }
    if direction == ScrollDirection::Up && page.len() < limit {
        Some(with_header(page, chatroom))
    } else {
        Some(page)
    }
}
