//! Chatroom session actor.
//!
//! One tokio task owns the [`Timeline`] for an open chatroom. Callers talk
//! to it through a [`SessionHandle`]; store calls run in spawned tasks whose
//! results come back through the actor's completion channel, so the
//! projection is only ever touched from the actor loop. Presentation
//! signals go out on an unbounded [`PresentationEvent`] channel.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chatline_shared::store::{
    AttachmentUploader, ConversationQuery, ConversationStore, EditConversationRequest, LiveEvent,
    LoadType, PostConversationRequest,
};
use chatline_shared::time::now_epoch_ms;
use chatline_shared::{
    AttachmentDraft, AttachmentUploadRequest, ChatlineError, Chatroom, ChatroomActions,
    Conversation, ConversationId, Delivery, Identity, MemberState, OgTags, Result,
    ScrollDirection, TemporaryId,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::{ReactionFailurePolicy, SendFailurePolicy, TimelineConfig};
use crate::events::{emit_event, EventSender, ExitReason, PresentationEvent};
use crate::link_preview::Debouncer;
use crate::live;
use crate::pagination::{
    assemble_bottom, assemble_jump, assemble_more, assemble_top, decide_initial_load, more_query,
    InitialLoad, OpenContext,
};
use crate::projection::Section;
use crate::timeline::{Merge, Timeline};

// ---------------------------------------------------------------------------
// Public surface
// ---------------------------------------------------------------------------

/// A message composed by the local member.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageDraft {
    pub text: String,
    pub attachments: Vec<AttachmentDraft>,
    pub share_link: Option<String>,
    pub reply_to: Option<ConversationId>,
}

impl MessageDraft {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<AttachmentDraft>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn with_share_link(mut self, link: impl Into<String>) -> Self {
        self.share_link = Some(link.into());
        self
    }

    pub fn replying_to(mut self, id: impl Into<ConversationId>) -> Self {
        self.reply_to = Some(id.into());
        self
    }
}

/// Commands sent *into* the session task.
#[derive(Debug)]
pub enum SessionCommand {
    /// Re-run the initial load decision, e.g. when the screen reappears.
    Reopen,
    LoadBottom,
    LoadTop,
    JumpTo(ConversationId),
    LoadMore {
        anchor: ConversationId,
        direction: ScrollDirection,
    },
    PostMessage(MessageDraft),
    RetrySend(TemporaryId),
    EditConversation {
        id: ConversationId,
        text: String,
        share_link: Option<String>,
    },
    DeleteConversations(Vec<ConversationId>),
    PutReaction {
        id: ConversationId,
        reaction: String,
    },
    RemoveReaction(ConversationId),
    SetTopic(ConversationId),
    Mute(bool),
    Follow(bool),
    Leave,
    MarkRead,
    LinkDetected(String),
    CancelLinkPreview,
    ReplyClicked(ConversationId),
    Snapshot(oneshot::Sender<Vec<Section>>),
    CopyText(Vec<ConversationId>, oneshot::Sender<Option<String>>),
    Shutdown,
}

/// Cloneable handle to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub async fn send(&self, command: SessionCommand) -> Result<()> {
        self.cmd_tx
            .send(command)
            .await
            .map_err(|_| ChatlineError::Closed)
    }

    pub async fn reopen(&self) -> Result<()> {
        self.send(SessionCommand::Reopen).await
    }

    pub async fn load_bottom(&self) -> Result<()> {
        self.send(SessionCommand::LoadBottom).await
    }

    pub async fn load_top(&self) -> Result<()> {
        self.send(SessionCommand::LoadTop).await
    }

    pub async fn jump_to(&self, id: impl Into<ConversationId>) -> Result<()> {
        self.send(SessionCommand::JumpTo(id.into())).await
    }

    pub async fn load_more(&self, anchor: impl Into<ConversationId>, direction: ScrollDirection) -> Result<()> {
        self.send(SessionCommand::LoadMore {
            anchor: anchor.into(),
            direction,
        })
        .await
    }

    pub async fn post_message(&self, draft: MessageDraft) -> Result<()> {
        self.send(SessionCommand::PostMessage(draft)).await
    }

    pub async fn retry_send(&self, id: TemporaryId) -> Result<()> {
        self.send(SessionCommand::RetrySend(id)).await
    }

    pub async fn edit_conversation(
        &self,
        id: impl Into<ConversationId>,
        text: impl Into<String>,
        share_link: Option<String>,
    ) -> Result<()> {
        self.send(SessionCommand::EditConversation {
            id: id.into(),
            text: text.into(),
            share_link,
        })
        .await
    }

    pub async fn delete_conversations(&self, ids: Vec<ConversationId>) -> Result<()> {
        self.send(SessionCommand::DeleteConversations(ids)).await
    }

    pub async fn put_reaction(&self, id: impl Into<ConversationId>, reaction: impl Into<String>) -> Result<()> {
        self.send(SessionCommand::PutReaction {
            id: id.into(),
            reaction: reaction.into(),
        })
        .await
    }

    pub async fn remove_reaction(&self, id: impl Into<ConversationId>) -> Result<()> {
        self.send(SessionCommand::RemoveReaction(id.into())).await
    }

    pub async fn set_topic(&self, id: impl Into<ConversationId>) -> Result<()> {
        self.send(SessionCommand::SetTopic(id.into())).await
    }

    pub async fn mute(&self, mute: bool) -> Result<()> {
        self.send(SessionCommand::Mute(mute)).await
    }

    pub async fn follow(&self, follow: bool) -> Result<()> {
        self.send(SessionCommand::Follow(follow)).await
    }

    pub async fn leave(&self) -> Result<()> {
        self.send(SessionCommand::Leave).await
    }

    pub async fn mark_read(&self) -> Result<()> {
        self.send(SessionCommand::MarkRead).await
    }

    pub async fn link_detected(&self, url: impl Into<String>) -> Result<()> {
        self.send(SessionCommand::LinkDetected(url.into())).await
    }

    pub async fn cancel_link_preview(&self) -> Result<()> {
        self.send(SessionCommand::CancelLinkPreview).await
    }

    pub async fn reply_clicked(&self, id: impl Into<ConversationId>) -> Result<()> {
        self.send(SessionCommand::ReplyClicked(id.into())).await
    }

    /// Current projection as seen by the actor.
    pub async fn snapshot(&self) -> Result<Vec<Section>> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::Snapshot(tx)).await?;
        rx.await.map_err(|_| ChatlineError::Closed)
    }

    pub async fn copy_text(&self, ids: Vec<ConversationId>) -> Result<Option<String>> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::CopyText(ids, tx)).await?;
        rx.await.map_err(|_| ChatlineError::Closed)
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(SessionCommand::Shutdown).await
    }
}

/// Spawn a session for `context.chatroom_id` and start its initial load.
///
/// Returns the command handle and the presentation event stream. Must be
/// called from within a tokio runtime.
pub fn spawn_session(
    store: Arc<dyn ConversationStore>,
    uploader: Arc<dyn AttachmentUploader>,
    config: TimelineConfig,
    context: OpenContext,
) -> (SessionHandle, mpsc::UnboundedReceiver<PresentationEvent>) {
    let (cmd_tx, cmd_rx) = mpsc::channel::<SessionCommand>(256);
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (completion_tx, completion_rx) = mpsc::unbounded_channel();
    let (live_tx, live_rx) = mpsc::unbounded_channel();

    info!(chatroom = %context.chatroom_id, "starting chatroom session");

    let session = Session {
        timeline: Timeline::new(config.bucketer()),
        link_preview: Debouncer::new(config.link_debounce),
        store,
        uploader,
        config,
        context,
        chatroom: None,
        first_open: false,
        open_attempts: 0,
        observing: false,
        topic: None,
        detected_og_tags: None,
        pending_link: None,
        pending_sends: HashMap::new(),
        events: event_tx,
        completions: completion_tx,
        live: live_tx,
        stopped: false,
    };
    tokio::spawn(session.run(cmd_rx, completion_rx, live_rx));

    (SessionHandle { cmd_tx }, event_rx)
}

// ---------------------------------------------------------------------------
// Actor internals
// ---------------------------------------------------------------------------

/// Results of spawned store calls, delivered back to the actor.
enum Completion {
    Chatroom(Result<Option<Chatroom>>),
    RetryOpen,
    Topic(Result<Option<Conversation>>),
    Actions(Result<ChatroomActions>),
    MemberState(Result<MemberState>),
    Page {
        kind: PageKind,
        result: Result<Vec<Conversation>>,
    },
    Jump {
        target: ConversationId,
        result: Result<Option<JumpPage>>,
    },
    More {
        direction: ScrollDirection,
        generation: u64,
        result: Result<Vec<Conversation>>,
    },
    ReplyResolved {
        temporary_id: TemporaryId,
        result: Result<Option<Conversation>>,
    },
    Posted {
        temporary_id: TemporaryId,
        result: Result<Conversation>,
    },
    RetryPost(TemporaryId),
    Edited(Result<Conversation>),
    Deleted {
        ids: Vec<ConversationId>,
        result: Result<()>,
    },
    Reacted {
        id: ConversationId,
        previous: Option<Conversation>,
        result: Result<()>,
    },
    TopicSet {
        id: ConversationId,
        result: Result<()>,
    },
    Muted {
        mute: bool,
        result: Result<()>,
    },
    Followed {
        follow: bool,
        result: Result<()>,
    },
    Left(Result<()>),
    LinkPreview {
        url: String,
        result: Result<Option<OgTags>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageKind {
    Bottom,
    Top,
}

struct JumpPage {
    anchor: Conversation,
    above: Vec<Conversation>,
    below: Vec<Conversation>,
}

struct PendingSend {
    request: PostConversationRequest,
    drafts: Vec<AttachmentDraft>,
    attempts: u32,
}

struct Session {
    store: Arc<dyn ConversationStore>,
    uploader: Arc<dyn AttachmentUploader>,
    config: TimelineConfig,
    context: OpenContext,
    timeline: Timeline,
    chatroom: Option<Chatroom>,
    /// Set while the chatroom was missing from the store; the first
    /// successful lookup afterwards loads the bottom page.
    first_open: bool,
    open_attempts: u32,
    observing: bool,
    topic: Option<Conversation>,
    detected_og_tags: Option<OgTags>,
    pending_link: Option<String>,
    pending_sends: HashMap<TemporaryId, PendingSend>,
    link_preview: Debouncer,
    events: EventSender,
    completions: mpsc::UnboundedSender<Completion>,
    live: mpsc::UnboundedSender<LiveEvent>,
    stopped: bool,
}

impl Session {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<SessionCommand>,
        mut completion_rx: mpsc::UnboundedReceiver<Completion>,
        mut live_rx: mpsc::UnboundedReceiver<LiveEvent>,
    ) {
        self.open();

        while !self.stopped {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => {
                        debug!(chatroom = %self.context.chatroom_id, "all session handles dropped");
                        break;
                    }
                },
                Some(completion) = completion_rx.recv() => self.handle_completion(completion),
                Some(event) = live_rx.recv() => self.handle_live(event),
            }
        }

        self.link_preview.cancel();
        info!(chatroom = %self.context.chatroom_id, "chatroom session stopped");
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    /// Run a store call off the actor and feed its result back in.
    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        let tx = self.completions.clone();
        tokio::spawn(async move {
            let completion = task.await;
            let _ = tx.send(completion);
        });
    }

    /// Fire-and-forget store call whose failure is only logged.
    fn spawn_logged<F>(&self, operation: &'static str, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let chatroom = self.context.chatroom_id.clone();
        tokio::spawn(async move {
            if let Err(e) = task.await {
                warn!(chatroom = %chatroom, operation, error = %e, "background call failed");
            }
        });
    }

    fn emit(&self, event: PresentationEvent) {
        emit_event(&self.events, event);
    }

    fn emit_reload(&self) {
        self.emit(PresentationEvent::ReloadChatMessageList(self.timeline.snapshot()));
    }

    fn exit(&mut self, reason: ExitReason) {
        info!(chatroom = %self.context.chatroom_id, ?reason, "closing chatroom session");
        self.emit(PresentationEvent::ExitScreen(reason));
        self.stopped = true;
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Reopen => self.open(),
            SessionCommand::LoadBottom => self.load_bottom(),
            SessionCommand::LoadTop => self.load_top(),
            SessionCommand::JumpTo(id) => self.jump_to(id),
            SessionCommand::LoadMore { anchor, direction } => self.load_more(&anchor, direction),
            SessionCommand::PostMessage(draft) => self.post_message(draft),
            SessionCommand::RetrySend(id) => self.retry_send(id),
            SessionCommand::EditConversation {
                id,
                text,
                share_link,
            } => self.edit_conversation(id, text, share_link),
            SessionCommand::DeleteConversations(ids) => self.delete_conversations(ids),
            SessionCommand::PutReaction { id, reaction } => self.put_reaction(id, reaction),
            SessionCommand::RemoveReaction(id) => self.remove_reaction(&id),
            SessionCommand::SetTopic(id) => self.set_topic(id),
            SessionCommand::Mute(mute) => self.mute(mute),
            SessionCommand::Follow(follow) => self.follow(follow),
            SessionCommand::Leave => self.leave(),
            SessionCommand::MarkRead => self.mark_read(),
            SessionCommand::LinkDetected(url) => self.link_detected(url),
            SessionCommand::CancelLinkPreview => self.cancel_link_preview(),
            SessionCommand::ReplyClicked(id) => self.reply_clicked(id),
            SessionCommand::Snapshot(reply) => {
                let _ = reply.send(self.timeline.snapshot());
            }
            SessionCommand::CopyText(ids, reply) => {
                let _ = reply.send(self.timeline.copy_text(&ids));
            }
            SessionCommand::Shutdown => self.stopped = true,
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Chatroom(result) => self.on_chatroom(result),
            Completion::RetryOpen => self.open(),
            Completion::Topic(result) => self.on_topic(result),
            Completion::Actions(result) => match result {
                Ok(actions) => self.emit(PresentationEvent::UpdateChatroomSubtitles(actions)),
                Err(e) => warn!(error = %e, "failed to fetch chatroom actions"),
            },
            Completion::MemberState(result) => match result {
                Ok(state) => self.emit(PresentationEvent::MemberRightsCheck(state)),
                Err(e) => warn!(error = %e, "failed to fetch member state"),
            },
            Completion::Page { kind, result } => self.on_page(kind, result),
            Completion::Jump { target, result } => self.on_jump(target, result),
            Completion::More {
                direction,
                generation,
                result,
            } => self.on_more(direction, generation, result),
            Completion::ReplyResolved {
                temporary_id,
                result,
            } => self.on_reply_resolved(&temporary_id, result),
            Completion::Posted {
                temporary_id,
                result,
            } => self.on_posted(temporary_id, result),
            Completion::RetryPost(temporary_id) => self.send_pending(temporary_id),
            Completion::Edited(result) => match result {
                Ok(conversation) => {
                    self.timeline.upsert(conversation);
                    self.emit_reload();
                }
                Err(e) => warn!(error = %e, "edit failed"),
            },
            Completion::Deleted { ids, result } => self.on_deleted(&ids, result),
            Completion::Reacted {
                id,
                previous,
                result,
            } => self.on_reacted(id, previous, result),
            Completion::TopicSet { id, result } => match result {
                Ok(()) => {
                    self.topic = self.timeline.get(&id).cloned();
                    self.emit(PresentationEvent::UpdateTopicBar(self.topic.clone()));
                }
                Err(e) => warn!(conversation = %id, error = %e, "failed to set topic"),
            },
            Completion::Muted { mute, result } => match result {
                Ok(()) => {
                    if let Some(ref mut chatroom) = self.chatroom {
                        chatroom.muted = mute;
                    }
                    self.refresh_actions();
                }
                Err(e) => warn!(mute, error = %e, "failed to change mute state"),
            },
            Completion::Followed { follow, result } => match result {
                Ok(()) => {
                    if let Some(ref mut chatroom) = self.chatroom {
                        chatroom.follow_status = follow;
                    }
                    self.refresh_actions();
                }
                Err(e) => warn!(follow, error = %e, "failed to change follow state"),
            },
            Completion::Left(result) => match result {
                Ok(()) => self.exit(ExitReason::Left),
                Err(e) => warn!(error = %e, "failed to leave chatroom"),
            },
            Completion::LinkPreview { url, result } => self.on_link_preview(url, result),
        }
    }

    fn handle_live(&mut self, event: LiveEvent) {
        let outcome = live::dispatch(&mut self.timeline, event);
        debug!(
            chatroom = %self.context.chatroom_id,
            applied = outcome.applied,
            deferred = outcome.deferred,
            "live batch applied"
        );
        if outcome.reload || outcome.scroll_to_bottom {
            self.emit_reload();
        }
        if outcome.scroll_to_bottom {
            self.emit(PresentationEvent::ScrollToBottom);
        }
        self.mark_read();
    }

    // ------------------------------------------------------------------
    // Initial load
    // ------------------------------------------------------------------

    fn open(&mut self) {
        let store = self.store.clone();
        let id = self.context.chatroom_id.clone();
        self.spawn(async move { Completion::Chatroom(store.get_chatroom(&id).await) });
    }

    fn on_chatroom(&mut self, result: Result<Option<Chatroom>>) {
        let chatroom = result.unwrap_or_else(|e| {
            warn!(chatroom = %self.context.chatroom_id, error = %e, "chatroom lookup failed");
            None
        });

        let decision = decide_initial_load(chatroom.as_ref(), &self.context, self.first_open);
        debug!(chatroom = %self.context.chatroom_id, ?decision, "initial load decision");

        match decision {
            InitialLoad::RetryLater => return self.schedule_open_retry(),
            InitialLoad::ExitSession => return self.exit(ExitReason::ChatroomDeleted),
            _ => {}
        }

        self.open_attempts = 0;
        self.chatroom = chatroom;
        self.resolve_topic();

        match decision {
            InitialLoad::JumpTo(id) | InitialLoad::JumpToLastSeen(id) => self.jump_to(id),
            InitialLoad::LoadBottom => {
                self.first_open = false;
                self.load_bottom();
            }
            InitialLoad::AwaitSignal(reason) => {
                debug!(chatroom = %self.context.chatroom_id, ?reason, "waiting for store sync");
            }
            InitialLoad::RetryLater | InitialLoad::ExitSession => {}
        }

        self.refresh_actions();
        self.mark_read();
        self.fetch_member_state();
        self.observe();
        self.sync_conversations();
    }

    fn schedule_open_retry(&mut self) {
        self.first_open = true;
        self.open_attempts += 1;
        if let Some(max) = self.config.chatroom_max_retries {
            if self.open_attempts > max {
                warn!(
                    chatroom = %self.context.chatroom_id,
                    attempts = self.open_attempts,
                    "chatroom never became available"
                );
                return self.exit(ExitReason::ChatroomUnavailable);
            }
        }
        let delay = self.config.chatroom_retry_delay;
        debug!(
            chatroom = %self.context.chatroom_id,
            attempt = self.open_attempts,
            ?delay,
            "chatroom not available yet, retrying"
        );
        self.spawn(async move {
            tokio::time::sleep(delay).await;
            Completion::RetryOpen
        });
    }

    fn resolve_topic(&mut self) {
        let Some(ref chatroom) = self.chatroom else {
            return;
        };
        if let Some(ref topic) = chatroom.topic {
            self.topic = Some(topic.as_ref().clone());
        } else if let Some(topic_id) = chatroom.topic_id.clone() {
            let store = self.store.clone();
            self.spawn(async move { Completion::Topic(store.get_conversation(&topic_id).await) });
            return;
        } else {
            self.topic = None;
        }
        self.emit(PresentationEvent::UpdateTopicBar(self.topic.clone()));
    }

    fn on_topic(&mut self, result: Result<Option<Conversation>>) {
        match result {
            Ok(topic) => {
                self.topic = topic;
                self.emit(PresentationEvent::UpdateTopicBar(self.topic.clone()));
            }
            Err(e) => warn!(error = %e, "failed to resolve chatroom topic"),
        }
    }

    fn refresh_actions(&self) {
        let store = self.store.clone();
        let id = self.context.chatroom_id.clone();
        self.spawn(async move { Completion::Actions(store.get_chatroom_actions(&id).await) });
    }

    fn fetch_member_state(&self) {
        let store = self.store.clone();
        self.spawn(async move { Completion::MemberState(store.get_member_state().await) });
    }

    fn observe(&mut self) {
        if self.observing {
            return;
        }
        self.observing = true;
        let store = self.store.clone();
        let id = self.context.chatroom_id.clone();
        let listener = self.live.clone();
        self.spawn_logged("observe_conversations", async move {
            store.observe_conversations(&id, listener).await
        });
    }

    fn sync_conversations(&self) {
        let load_type = match self.chatroom {
            Some(ref chatroom) if chatroom.is_conversation_stored => LoadType::Reopen,
            _ => LoadType::FirstTime,
        };
        let store = self.store.clone();
        let id = self.context.chatroom_id.clone();
        self.spawn_logged("sync_conversations", async move {
            store.sync_conversations(&id, load_type).await
        });
    }

    fn mark_read(&self) {
        let store = self.store.clone();
        let id = self.context.chatroom_id.clone();
        self.spawn_logged("mark_read_chatroom", async move { store.mark_read_chatroom(&id).await });
    }

    // ------------------------------------------------------------------
    // Pagination
    // ------------------------------------------------------------------

    fn load_bottom(&self) {
        self.load_page(PageKind::Bottom);
    }

    fn load_top(&self) {
        self.load_page(PageKind::Top);
    }

    fn load_page(&self, kind: PageKind) {
        let id = self.context.chatroom_id.clone();
        let query = match kind {
            PageKind::Bottom => ConversationQuery::bottom(id, self.config.page_size),
            PageKind::Top => ConversationQuery::top(id, self.config.page_size),
        };
        let store = self.store.clone();
        self.spawn(async move {
            Completion::Page {
                kind,
                result: store.get_conversations(query).await,
            }
        });
    }

    fn on_page(&mut self, kind: PageKind, result: Result<Vec<Conversation>>) {
        let page = match result {
            Ok(page) => page,
            Err(e) => {
                warn!(chatroom = %self.context.chatroom_id, ?kind, error = %e, "page fetch failed");
                return;
            }
        };
        debug!(chatroom = %self.context.chatroom_id, ?kind, count = page.len(), "page loaded");

        let chatroom = self.chatroom.as_ref();
        match kind {
            PageKind::Bottom => {
                let all = assemble_bottom(page, chatroom, self.config.page_size);
                self.timeline.replace_all(all);
                self.emit_reload();
                self.emit(PresentationEvent::ScrollToBottom);
            }
            PageKind::Top => {
                let all = assemble_top(page, chatroom);
                self.timeline.replace_all(all);
                self.emit_reload();
                if !self.timeline.is_empty() {
                    self.emit(PresentationEvent::ScrollToConversation { section: 0, row: 0 });
                }
            }
        }
    }

    fn jump_to(&self, target: ConversationId) {
        let store = self.store.clone();
        let chatroom_id = self.context.chatroom_id.clone();
        let limit = self.config.page_size;
        self.spawn(async move {
            let result = match store.get_conversation(&target).await {
                Ok(Some(anchor)) => {
                    let above = ConversationQuery::above(chatroom_id.clone(), limit, anchor.clone());
                    let below = ConversationQuery::below(chatroom_id, limit, anchor.clone());
                    let (above, below) =
                        futures::join!(store.get_conversations(above), store.get_conversations(below));
                    Ok(Some(JumpPage {
                        anchor,
                        above: above.unwrap_or_else(|e| {
                            warn!(error = %e, "fetching conversations above anchor failed");
                            Vec::new()
                        }),
                        below: below.unwrap_or_else(|e| {
                            warn!(error = %e, "fetching conversations below anchor failed");
                            Vec::new()
                        }),
                    }))
                }
                other => other.map(|_| None),
            };
            Completion::Jump { target, result }
        });
    }

    fn on_jump(&mut self, target: ConversationId, result: Result<Option<JumpPage>>) {
        let page = match result {
            Ok(Some(page)) => page,
            Ok(None) => return self.jump_target_missing(&target),
            Err(e) => {
                warn!(conversation = %target, error = %e, "anchor lookup failed");
                return self.jump_target_missing(&target);
            }
        };

        let anchor = page.anchor.identity.clone();
        let all = assemble_jump(
            page.above,
            page.anchor,
            page.below,
            self.chatroom.as_ref(),
            self.config.page_size,
        );
        self.timeline.replace_all(all);
        self.emit_reload();
        match self.timeline.locate(&anchor) {
            Some((section, row)) => {
                self.emit(PresentationEvent::ScrollToConversation { section, row })
            }
            None => warn!(conversation = %target, "anchor missing after grouping"),
        }
    }

    /// The chatroom id doubles as the header's id, so jumping to it means
    /// "show the start of the chatroom".
    fn jump_target_missing(&self, target: &ConversationId) {
        if target.as_str() == self.context.chatroom_id.as_str() {
            self.load_top();
        } else {
            debug!(conversation = %target, "jump target not found");
        }
    }

    fn load_more(&self, anchor: &ConversationId, direction: ScrollDirection) {
        let Some(anchor) = self.timeline.get(anchor).cloned() else {
            debug!(conversation = %anchor, "load more anchor not in timeline");
            return;
        };
        let generation = self.timeline.generation();
        let query = more_query(&self.context.chatroom_id, self.config.page_size, anchor, direction);
        let store = self.store.clone();
        self.spawn(async move {
            Completion::More {
                direction,
                generation,
                result: store.get_conversations(query).await,
            }
        });
    }

    fn on_more(&mut self, direction: ScrollDirection, generation: u64, result: Result<Vec<Conversation>>) {
        let page = match result {
            Ok(page) => page,
            Err(e) => {
                warn!(?direction, error = %e, "load more failed");
                return;
            }
        };
        let Some(page) = assemble_more(page, direction, self.chatroom.as_ref(), self.config.page_size)
        else {
            debug!(?direction, "nothing more to load");
            return;
        };
        match self.timeline.merge_page(page, generation) {
            Merge::Applied(count) => {
                debug!(?direction, count, "merged page");
                self.emit_reload();
                self.emit(PresentationEvent::ReloadData(direction));
            }
            Merge::Stale => debug!(?direction, generation, "discarding page from replaced timeline"),
        }
    }

    fn reply_clicked(&mut self, id: ConversationId) {
        match self.timeline.position_of(&id) {
            Some((section, row)) => {
                self.emit_reload();
                self.emit(PresentationEvent::ScrollToConversation { section, row });
            }
            None => self.jump_to(id),
        }
    }

    // ------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------

    fn post_message(&mut self, draft: MessageDraft) {
        let chatroom_id = self.context.chatroom_id.clone();
        let temporary_id = TemporaryId::generate();
        let created_epoch_ms = now_epoch_ms();

        let og_tags = match (&draft.share_link, &self.detected_og_tags) {
            (Some(link), Some(tags)) if !link.is_empty() && tags.url.as_deref() == Some(link.as_str()) => {
                Some(tags.clone())
            }
            _ => None,
        };

        let request = PostConversationRequest {
            chatroom_id: chatroom_id.clone(),
            temporary_id: temporary_id.clone(),
            text: draft.text.clone(),
            reply_to: draft.reply_to.clone(),
            attachment_count: draft.attachments.len(),
            share_link: draft.share_link.clone(),
            og_tags: og_tags.clone(),
            created_epoch_ms,
        };

        let mut conversation = Conversation::new(
            Identity::Temporary(temporary_id.clone()),
            chatroom_id,
            draft.text,
            created_epoch_ms,
        )
        .with_member(self.context.local_member.clone());
        conversation.attachments = draft
            .attachments
            .iter()
            .enumerate()
            .map(|(i, d)| d.to_attachment(i as u32 + 1))
            .collect();
        conversation.attachment_count = draft.attachments.len();
        conversation.reply_to_id = draft.reply_to;
        conversation.og_tags = og_tags;
        conversation.delivery = Delivery::Pending;

        if let Some(reply_id) = conversation.reply_to_id.clone() {
            match self.timeline.get(&reply_id) {
                Some(reply) => conversation.reply_to = Some(Box::new(reply.clone())),
                None => {
                    let store = self.store.clone();
                    let temporary_id = temporary_id.clone();
                    self.spawn(async move {
                        Completion::ReplyResolved {
                            temporary_id,
                            result: store.get_conversation(&reply_id).await,
                        }
                    });
                }
            }
        }

        info!(chatroom = %self.context.chatroom_id, temporary = %temporary_id, "posting conversation");
        self.timeline.upsert(conversation.clone());
        self.emit_reload();
        self.emit(PresentationEvent::ScrollToBottom);

        self.pending_sends.insert(
            temporary_id.clone(),
            PendingSend {
                request: request.clone(),
                drafts: draft.attachments,
                attempts: 0,
            },
        );

        let store = self.store.clone();
        self.spawn(async move {
            if let Err(e) = store.save_temporary_conversation(&conversation).await {
                warn!(temporary = %temporary_id, error = %e, "failed to save pending conversation");
            }
            Completion::Posted {
                temporary_id,
                result: store.post_conversation(request).await,
            }
        });
    }

    fn on_reply_resolved(&mut self, temporary_id: &TemporaryId, result: Result<Option<Conversation>>) {
        let reply = match result {
            Ok(Some(reply)) => reply,
            Ok(None) => return,
            Err(e) => {
                warn!(temporary = %temporary_id, error = %e, "failed to resolve reply target");
                return;
            }
        };
        let Some(mut conversation) = self.timeline.get_temporary(temporary_id).cloned() else {
            return;
        };
        conversation.reply_to = Some(Box::new(reply));
        self.timeline.upsert(conversation);
        self.emit_reload();
    }

    fn send_pending(&self, temporary_id: TemporaryId) {
        let Some(pending) = self.pending_sends.get(&temporary_id) else {
            return;
        };
        let request = pending.request.clone();
        let store = self.store.clone();
        self.spawn(async move {
            Completion::Posted {
                temporary_id,
                result: store.post_conversation(request).await,
            }
        });
    }

    fn on_posted(&mut self, temporary_id: TemporaryId, result: Result<Conversation>) {
        let conversation = match result {
            Ok(conversation) => conversation,
            Err(e) => return self.on_post_failed(temporary_id, e),
        };
        let drafts = self
            .pending_sends
            .remove(&temporary_id)
            .map(|pending| pending.drafts)
            .unwrap_or_default();
        let Some(server_id) = conversation.server_id().cloned() else {
            warn!(temporary = %temporary_id, "posted conversation has no server id");
            return;
        };
        info!(temporary = %temporary_id, conversation = %server_id, "conversation confirmed");

        let uploads =
            AttachmentUploadRequest::for_drafts(&conversation.chatroom_id, &server_id, &drafts);
        let mut posted = conversation.clone();
        if !uploads.is_empty() {
            posted.attachments = uploads.iter().map(AttachmentUploadRequest::to_attachment).collect();
        }

        let store = self.store.clone();
        let uploader = self.uploader.clone();
        self.spawn_logged("save_posted_conversation", async move {
            store.save_posted_conversation(&posted).await?;
            if !uploads.is_empty() {
                uploader.upload(&server_id, Some(&temporary_id), uploads).await?;
            }
            Ok(())
        });

        if conversation.media_ready() {
            self.timeline.upsert(conversation);
            self.emit_reload();
        }
        self.follow_if_needed();
    }

    fn on_post_failed(&mut self, temporary_id: TemporaryId, error: ChatlineError) {
        let Some(pending) = self.pending_sends.get_mut(&temporary_id) else {
            return;
        };
        warn!(
            temporary = %temporary_id,
            attempt = pending.attempts,
            error = %error,
            "posting conversation failed"
        );

        if let SendFailurePolicy::Retry { max_attempts } = self.config.send_failure {
            if pending.attempts < max_attempts {
                let delay = self.config.send_retry.delay_for_attempt(pending.attempts);
                pending.attempts += 1;
                self.spawn(async move {
                    tokio::time::sleep(delay).await;
                    Completion::RetryPost(temporary_id)
                });
                return;
            }
        }
        self.set_delivery(&temporary_id, Delivery::Failed);
    }

    fn retry_send(&mut self, temporary_id: TemporaryId) {
        let failed = self
            .timeline
            .get_temporary(&temporary_id)
            .map(|c| c.delivery == Delivery::Failed)
            .unwrap_or(false);
        let Some(pending) = self.pending_sends.get_mut(&temporary_id) else {
            debug!(temporary = %temporary_id, "no pending send to retry");
            return;
        };
        if !failed {
            debug!(temporary = %temporary_id, "send is still in flight");
            return;
        }
        pending.attempts = 0;
        self.set_delivery(&temporary_id, Delivery::Pending);
        self.send_pending(temporary_id);
    }

    fn set_delivery(&mut self, temporary_id: &TemporaryId, delivery: Delivery) {
        let Some(mut conversation) = self.timeline.get_temporary(temporary_id).cloned() else {
            return;
        };
        if conversation.identity.is_confirmed() {
            return;
        }
        conversation.delivery = delivery;
        self.timeline.upsert(conversation.clone());
        self.emit_reload();

        let store = self.store.clone();
        self.spawn_logged("save_temporary_conversation", async move {
            store.save_temporary_conversation(&conversation).await
        });
    }

    fn follow_if_needed(&mut self) {
        let needs_follow = self
            .chatroom
            .as_ref()
            .map(|chatroom| !chatroom.follow_status)
            .unwrap_or(false);
        if needs_follow {
            self.follow(true);
        }
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    fn edit_conversation(&self, id: ConversationId, text: String, share_link: Option<String>) {
        if text.trim().is_empty() {
            debug!(conversation = %id, "ignoring empty edit");
            return;
        }
        let store = self.store.clone();
        let request = EditConversationRequest {
            conversation_id: id,
            text,
            share_link,
        };
        self.spawn(async move { Completion::Edited(store.edit_conversation(request).await) });
    }

    fn delete_conversations(&self, ids: Vec<ConversationId>) {
        if ids.is_empty() {
            return;
        }
        let store = self.store.clone();
        self.spawn(async move {
            let result = store.delete_conversations(&ids).await;
            Completion::Deleted { ids, result }
        });
    }

    fn on_deleted(&mut self, ids: &[ConversationId], result: Result<()>) {
        if let Err(e) = result {
            warn!(count = ids.len(), error = %e, "delete failed");
            return;
        }
        for id in ids {
            self.timeline.mark_deleted(id, &self.context.local_member);
        }
        self.emit_reload();
    }

    fn put_reaction(&mut self, id: ConversationId, reaction: String) {
        let previous = self
            .timeline
            .apply_reaction(&id, &self.context.local_member, &reaction);
        if previous.is_some() {
            self.emit_reload();
        }
        let store = self.store.clone();
        self.spawn(async move {
            let result = store.put_reaction(&id, &reaction).await;
            Completion::Reacted {
                id,
                previous,
                result,
            }
        });
    }

    fn on_reacted(&mut self, id: ConversationId, previous: Option<Conversation>, result: Result<()>) {
        let Err(e) = result else {
            self.follow_if_needed();
            return;
        };
        warn!(conversation = %id, error = %e, "reaction failed");
        if self.config.reaction_failure == ReactionFailurePolicy::Rollback {
            if let Some(previous) = previous {
                self.timeline.upsert(previous);
                self.emit_reload();
            }
        }
    }

    fn remove_reaction(&mut self, id: &ConversationId) {
        if self
            .timeline
            .remove_reaction(id, &self.context.local_member.id)
            .is_some()
        {
            self.emit_reload();
        }
    }

    fn set_topic(&self, id: ConversationId) {
        let store = self.store.clone();
        let chatroom_id = self.context.chatroom_id.clone();
        self.spawn(async move {
            let result = store.set_chatroom_topic(&chatroom_id, &id).await;
            Completion::TopicSet { id, result }
        });
    }

    fn mute(&self, mute: bool) {
        let store = self.store.clone();
        let id = self.context.chatroom_id.clone();
        self.spawn(async move {
            Completion::Muted {
                mute,
                result: store.mute_chatroom(&id, mute).await,
            }
        });
    }

    fn follow(&self, follow: bool) {
        let store = self.store.clone();
        let id = self.context.chatroom_id.clone();
        self.spawn(async move {
            Completion::Followed {
                follow,
                result: store.follow_chatroom(&id, follow).await,
            }
        });
    }

    fn leave(&self) {
        let store = self.store.clone();
        let id = self.context.chatroom_id.clone();
        self.spawn(async move { Completion::Left(store.leave_chatroom(&id).await) });
    }

    // ------------------------------------------------------------------
    // Link previews
    // ------------------------------------------------------------------

    fn link_detected(&mut self, url: String) {
        self.pending_link = Some(url.clone());
        let store = self.store.clone();
        let tx = self.completions.clone();
        self.link_preview.schedule(async move {
            let result = store.decode_url(&url).await;
            let _ = tx.send(Completion::LinkPreview { url, result });
        });
    }

    fn cancel_link_preview(&mut self) {
        self.link_preview.cancel();
        self.pending_link = None;
        self.detected_og_tags = None;
        self.emit(PresentationEvent::LinkPreview(None));
    }

    fn on_link_preview(&mut self, url: String, result: Result<Option<OgTags>>) {
        if self.pending_link.as_deref() != Some(url.as_str()) {
            debug!(url, "dropping preview for superseded link");
            return;
        }
        match result {
            Ok(Some(mut tags)) => {
                tags.url.get_or_insert(url);
                self.detected_og_tags = Some(tags.clone());
                self.emit(PresentationEvent::LinkPreview(Some(tags)));
            }
            Ok(None) => debug!(url, "no preview for link"),
            Err(e) => warn!(url, error = %e, "link decode failed"),
        }
    }
}
