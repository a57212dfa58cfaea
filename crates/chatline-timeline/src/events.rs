use chatline_shared::{ChatroomActions, Conversation, MemberState, OgTags, ScrollDirection};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::projection::Section;

/// Why the session asks the screen to close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    ChatroomDeleted,
    /// The chatroom never became available within the retry budget.
    ChatroomUnavailable,
    /// The member left the chatroom.
    Left,
}

/// Signals pushed to the presentation layer.
///
/// Every positioning signal is preceded by a `ReloadChatMessageList`
/// carrying the projection it refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum PresentationEvent {
    ReloadChatMessageList(Vec<Section>),
    ScrollToBottom,
    ScrollToConversation { section: usize, row: usize },
    ReloadData(ScrollDirection),
    UpdateChatroomSubtitles(ChatroomActions),
    UpdateTopicBar(Option<Conversation>),
    MemberRightsCheck(MemberState),
    /// Preview for the link in the composer; `None` clears it.
    LinkPreview(Option<OgTags>),
    ExitScreen(ExitReason),
}

pub type EventSender = mpsc::UnboundedSender<PresentationEvent>;

pub fn emit_event(tx: &EventSender, event: PresentationEvent) {
    if tx.send(event).is_err() {
        tracing::debug!("presentation receiver dropped, discarding event");
    }
}
