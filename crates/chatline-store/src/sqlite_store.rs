//! [`ConversationStore`] backed by the local SQLite cache.
//!
//! The backend is simulated in-process: posting assigns a server id,
//! mutations are persisted immediately and every change is fanned out to the
//! listeners registered through `observe_conversations`. `set_reachable(false)`
//! makes every remote-facing call fail with `Rejected`, which is how callers
//! exercise send and reaction failure paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chatline_shared::store::{
    ConversationQuery, ConversationStore, EditConversationRequest, LiveEvent, LiveListener,
    LoadType, PostConversationRequest,
};
use chatline_shared::{
    ChatlineError, Chatroom, ChatroomAction, ChatroomActions, ChatroomId, Conversation,
    ConversationId, Delivery, Identity, Member, MemberId, MemberRole, MemberState, OgTags,
};

use crate::database::Database;
use crate::error::StoreError;

type StoreResult<T> = chatline_shared::Result<T>;

pub struct SqliteConversationStore {
    db: Mutex<Database>,
    local_member: Member,
    member_state: Mutex<MemberState>,
    listeners: Mutex<HashMap<ChatroomId, Vec<LiveListener>>>,
    link_previews: Mutex<HashMap<String, OgTags>>,
    reachable: AtomicBool,
}

impl SqliteConversationStore {
    /// Wrap an open database. `local_member` is the account this device is
    /// signed in as; it authors posts, reactions and deletions.
    pub fn new(db: Database, local_member: Member) -> Self {
        let member_state = MemberState {
            member: local_member.clone(),
            role: MemberRole::Member,
            rights: Vec::new(),
        };
        Self {
            db: Mutex::new(db),
            local_member,
            member_state: Mutex::new(member_state),
            listeners: Mutex::new(HashMap::new()),
            link_previews: Mutex::new(HashMap::new()),
            reachable: AtomicBool::new(true),
        }
    }

    pub fn open_in_memory(local_member: Member) -> StoreResult<Self> {
        Ok(Self::new(Database::open_in_memory()?, local_member))
    }

    pub fn local_member(&self) -> &Member {
        &self.local_member
    }

    // ------------------------------------------------------------------
    // Backend simulation
    // ------------------------------------------------------------------

    /// Insert or overwrite a chatroom record.
    pub fn upsert_chatroom(&self, chatroom: &Chatroom) -> StoreResult<()> {
        self.with_db(|db| db.upsert_chatroom(chatroom))
    }

    pub fn set_participant_count(&self, chatroom_id: &ChatroomId, count: u64) -> StoreResult<()> {
        self.with_db(|db| db.set_participant_count(chatroom_id, count))
    }

    /// Flag a chatroom as deleted by `actor`.
    pub fn delete_chatroom(&self, chatroom_id: &ChatroomId, actor: &MemberId) -> StoreResult<()> {
        self.with_db(|db| {
            let mut chatroom = db.get_chatroom(chatroom_id)?.ok_or(StoreError::NotFound)?;
            chatroom.deleted_by = Some(actor.clone());
            db.upsert_chatroom(&chatroom)
        })
    }

    pub fn set_member_state(&self, state: MemberState) -> StoreResult<()> {
        let mut guard = self.member_state.lock().map_err(|_| StoreError::Poisoned)?;
        *guard = state;
        Ok(())
    }

    /// Toggle the simulated backend connection.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Make `decode_url` resolve `url` to `tags`.
    pub fn register_link_preview(&self, url: impl Into<String>, tags: OgTags) -> StoreResult<()> {
        let mut previews = self.link_previews.lock().map_err(|_| StoreError::Poisoned)?;
        previews.insert(url.into(), tags);
        Ok(())
    }

    /// Persist conversations authored elsewhere and push them as `New`.
    pub fn ingest_remote(&self, conversations: Vec<Conversation>) -> StoreResult<()> {
        if conversations.is_empty() {
            return Ok(());
        }
        self.with_db(|db| {
            for conversation in &conversations {
                db.upsert_conversation(conversation)?;
                let unseen = u64::from(
                    conversation.member.as_ref().map(|m| &m.id) != Some(&self.local_member.id),
                );
                db.bump_response_counts(&conversation.chatroom_id, 1, unseen)?;
            }
            Ok(())
        })?;
        for (chatroom_id, batch) in by_chatroom(conversations) {
            self.emit(&chatroom_id, LiveEvent::New(batch));
        }
        Ok(())
    }

    /// Mark the attachments of a conversation uploaded and push it as `New`.
    pub fn complete_attachment_upload(&self, id: &ConversationId) -> StoreResult<Conversation> {
        let conversation = self.with_db(|db| {
            if !db.set_attachment_uploaded(id)? {
                return Err(StoreError::NotFound);
            }
            db.get_conversation(id)?.ok_or(StoreError::NotFound)
        })?;
        tracing::debug!(conversation = %id, "attachment upload completed");
        self.emit(&conversation.chatroom_id, LiveEvent::New(vec![conversation.clone()]));
        Ok(conversation)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn with_db<T>(&self, f: impl FnOnce(&Database) -> crate::error::Result<T>) -> StoreResult<T> {
        let db = self.db.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(f(&db)?)
    }

    fn ensure_reachable(&self, operation: &str) -> StoreResult<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            tracing::warn!(operation, "backend unreachable");
            Err(ChatlineError::Rejected(format!("{operation}: backend unreachable")))
        }
    }

    /// Push `event` to every listener of the chatroom, dropping closed ones.
    fn emit(&self, chatroom_id: &ChatroomId, event: LiveEvent) {
        let Ok(mut listeners) = self.listeners.lock() else {
            tracing::warn!("listener registry poisoned, dropping live event");
            return;
        };
        if let Some(registered) = listeners.get_mut(chatroom_id) {
            registered.retain(|listener| listener.send(event.clone()).is_ok());
        }
    }

    fn load_existing(&self, id: &ConversationId) -> StoreResult<Conversation> {
        self.with_db(|db| db.get_conversation(id))?
            .ok_or_else(|| ChatlineError::ConversationNotFound(id.to_string()))
    }

    fn require_chatroom(updated: bool, chatroom_id: &ChatroomId) -> StoreResult<()> {
        if updated {
            Ok(())
        } else {
            Err(ChatlineError::ChatroomNotFound(chatroom_id.to_string()))
        }
    }
}

fn by_chatroom(conversations: Vec<Conversation>) -> Vec<(ChatroomId, Vec<Conversation>)> {
    let mut batches: Vec<(ChatroomId, Vec<Conversation>)> = Vec::new();
    for conversation in conversations {
        match batches.iter_mut().find(|(id, _)| *id == conversation.chatroom_id) {
            Some((_, batch)) => batch.push(conversation),
            None => batches.push((conversation.chatroom_id.clone(), vec![conversation])),
        }
    }
    batches
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn get_chatroom(&self, chatroom_id: &ChatroomId) -> StoreResult<Option<Chatroom>> {
        self.with_db(|db| {
            let Some(mut chatroom) = db.get_chatroom(chatroom_id)? else {
                return Ok(None);
            };
            if let Some(ref topic_id) = chatroom.topic_id {
                chatroom.topic = db.get_conversation(topic_id)?.map(Box::new);
            }
            Ok(Some(chatroom))
        })
    }

    async fn get_conversation(&self, id: &ConversationId) -> StoreResult<Option<Conversation>> {
        self.with_db(|db| db.get_conversation(id))
    }

    async fn get_conversations(&self, query: ConversationQuery) -> StoreResult<Vec<Conversation>> {
        self.with_db(|db| db.get_conversations_page(&query))
    }

    /// Confirms a pending send. `Posted` is pushed right away for text-only
    /// conversations; ones with attachments surface as `New` once
    /// [`complete_attachment_upload`](Self::complete_attachment_upload) runs.
    async fn post_conversation(&self, request: PostConversationRequest) -> StoreResult<Conversation> {
        self.ensure_reachable("post_conversation")?;

        let identity = Identity::Temporary(request.temporary_id.clone()).confirm(ConversationId::generate());
        let conversation = self.with_db(|db| {
            let attachments = db
                .get_temporary_conversation(&request.temporary_id)?
                .map(|pending| pending.attachments)
                .unwrap_or_default();

            let mut conversation = Conversation::new(
                identity,
                request.chatroom_id.clone(),
                request.text.clone(),
                request.created_epoch_ms,
            )
            .with_member(self.local_member.clone());
            conversation.attachments = attachments;
            conversation.attachment_count = request.attachment_count;
            conversation.reply_to_id = request.reply_to.clone();
            conversation.og_tags = request.og_tags.clone();
            conversation.delivery = Delivery::Sent;

            db.upsert_conversation(&conversation)?;
            db.bump_response_counts(&request.chatroom_id, 1, 0)?;
            let server_id = conversation.server_id().cloned().ok_or(StoreError::NotFound)?;
            db.get_conversation(&server_id)?.ok_or(StoreError::NotFound)
        })?;

        tracing::info!(
            chatroom = %conversation.chatroom_id,
            conversation = %conversation.identity,
            "conversation posted"
        );
        if conversation.media_ready() {
            self.emit(&conversation.chatroom_id, LiveEvent::Posted(vec![conversation.clone()]));
        }
        Ok(conversation)
    }

    async fn edit_conversation(&self, request: EditConversationRequest) -> StoreResult<Conversation> {
        self.ensure_reachable("edit_conversation")?;

        let mut conversation = self.load_existing(&request.conversation_id)?;
        conversation.body = request.text;
        conversation.is_edited = true;
        if let Some(ref link) = request.share_link {
            conversation.og_tags = self.decode_url(link).await?;
        }
        self.with_db(|db| db.upsert_conversation(&conversation))?;

        self.emit(&conversation.chatroom_id, LiveEvent::Changed(vec![conversation.clone()]));
        Ok(conversation)
    }

    async fn delete_conversations(&self, ids: &[ConversationId]) -> StoreResult<()> {
        self.ensure_reachable("delete_conversations")?;

        let deleted = self.with_db(|db| {
            let mut deleted = Vec::with_capacity(ids.len());
            for id in ids {
                if db.mark_conversation_deleted(id, &self.local_member)? {
                    if let Some(conversation) = db.get_conversation(id)? {
                        deleted.push(conversation);
                    }
                }
            }
            Ok(deleted)
        })?;
        for (chatroom_id, batch) in by_chatroom(deleted) {
            self.emit(&chatroom_id, LiveEvent::Changed(batch));
        }
        Ok(())
    }

    async fn put_reaction(&self, id: &ConversationId, reaction: &str) -> StoreResult<()> {
        self.ensure_reachable("put_reaction")?;

        let conversation = self.with_db(|db| {
            if db.get_conversation(id)?.is_none() {
                return Err(StoreError::NotFound);
            }
            db.put_reaction(id, &self.local_member, reaction)?;
            db.get_conversation(id)?.ok_or(StoreError::NotFound)
        })?;
        let chatroom_id = conversation.chatroom_id.clone();
        self.emit(&chatroom_id, LiveEvent::Changed(vec![conversation]));
        Ok(())
    }

    async fn set_chatroom_topic(
        &self,
        chatroom_id: &ChatroomId,
        conversation_id: &ConversationId,
    ) -> StoreResult<()> {
        self.ensure_reachable("set_chatroom_topic")?;
        self.load_existing(conversation_id)?;
        let updated = self.with_db(|db| db.set_chatroom_topic(chatroom_id, conversation_id))?;
        Self::require_chatroom(updated, chatroom_id)
    }

    async fn mark_read_chatroom(&self, chatroom_id: &ChatroomId) -> StoreResult<()> {
        self.with_db(|db| db.mark_chatroom_read(chatroom_id))
    }

    async fn follow_chatroom(&self, chatroom_id: &ChatroomId, follow: bool) -> StoreResult<()> {
        self.ensure_reachable("follow_chatroom")?;
        let updated = self.with_db(|db| db.set_follow_status(chatroom_id, follow))?;
        Self::require_chatroom(updated, chatroom_id)
    }

    async fn mute_chatroom(&self, chatroom_id: &ChatroomId, mute: bool) -> StoreResult<()> {
        self.ensure_reachable("mute_chatroom")?;
        let updated = self.with_db(|db| db.set_muted(chatroom_id, mute))?;
        Self::require_chatroom(updated, chatroom_id)
    }

    async fn leave_chatroom(&self, chatroom_id: &ChatroomId) -> StoreResult<()> {
        self.ensure_reachable("leave_chatroom")?;
        let updated = self.with_db(|db| db.set_follow_status(chatroom_id, false))?;
        Self::require_chatroom(updated, chatroom_id)?;
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.remove(chatroom_id);
        }
        Ok(())
    }

    async fn observe_conversations(
        &self,
        chatroom_id: &ChatroomId,
        listener: LiveListener,
    ) -> StoreResult<()> {
        let mut listeners = self.listeners.lock().map_err(|_| StoreError::Poisoned)?;
        listeners.entry(chatroom_id.clone()).or_default().push(listener);
        tracing::debug!(chatroom = %chatroom_id, "live observer registered");
        Ok(())
    }

    async fn save_temporary_conversation(&self, conversation: &Conversation) -> StoreResult<()> {
        self.with_db(|db| db.upsert_conversation(conversation).map(|_| ()))
    }

    async fn save_posted_conversation(&self, conversation: &Conversation) -> StoreResult<()> {
        self.with_db(|db| db.upsert_conversation(conversation).map(|_| ()))
    }

    async fn get_chatroom_actions(&self, chatroom_id: &ChatroomId) -> StoreResult<ChatroomActions> {
        let (chatroom, participant_count) = self.with_db(|db| {
            let chatroom = db.get_chatroom(chatroom_id)?.ok_or(StoreError::NotFound)?;
            Ok((chatroom, db.participant_count(chatroom_id)?))
        })?;

        let mut actions = vec![ChatroomAction::ViewParticipants];
        if !chatroom.is_secret {
            actions.push(ChatroomAction::Invite);
        }
        actions.push(if chatroom.follow_status {
            ChatroomAction::Unfollow
        } else {
            ChatroomAction::Follow
        });
        actions.push(if chatroom.muted {
            ChatroomAction::Unmute
        } else {
            ChatroomAction::Mute
        });
        if chatroom.member.as_ref().map(|m| &m.id) != Some(&self.local_member.id) {
            actions.push(ChatroomAction::Report);
        }
        if chatroom.follow_status {
            actions.push(ChatroomAction::Leave);
        }

        Ok(ChatroomActions {
            participant_count,
            actions,
        })
    }

    async fn get_member_state(&self) -> StoreResult<MemberState> {
        let state = self.member_state.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(state.clone())
    }

    async fn get_member(&self, id: &MemberId) -> StoreResult<Option<Member>> {
        self.with_db(|db| db.get_member(id))
    }

    async fn decode_url(&self, url: &str) -> StoreResult<Option<OgTags>> {
        let previews = self.link_previews.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(previews.get(url).cloned())
    }

    async fn sync_conversations(&self, chatroom_id: &ChatroomId, load_type: LoadType) -> StoreResult<()> {
        tracing::debug!(chatroom = %chatroom_id, ?load_type, "syncing conversations");
        self.with_db(|db| db.set_conversation_stored(chatroom_id))
    }
}
