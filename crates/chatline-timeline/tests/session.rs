use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chatline_shared::store::AttachmentUploader;
use chatline_shared::{
    AttachmentDraft, AttachmentKind, AttachmentMeta, AttachmentUploadRequest, ChatroomAction,
    Chatroom, Conversation, ConversationId, Delivery, Identity, Member, MemberId, OgTags, Result,
    ScrollDirection, TemporaryId,
};
use chatline_store::SqliteConversationStore;
use chatline_timeline::{
    spawn_session, ExitReason, MessageDraft, OpenContext, PresentationEvent,
    ReactionFailurePolicy, RetryPolicy, Section, SendFailurePolicy, SessionHandle, TimelineConfig,
};
use tokio::sync::mpsc::UnboundedReceiver;

/// 2024-03-05 10:30 UTC.
const BASE_MS: i64 = 1_709_634_600_000;
const MINUTE_MS: i64 = 60_000;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RecordingUploader {
    uploads: Mutex<Vec<AttachmentUploadRequest>>,
}

#[async_trait]
impl AttachmentUploader for RecordingUploader {
    async fn upload(
        &self,
        _conversation_id: &ConversationId,
        _temporary_id: Option<&TemporaryId>,
        requests: Vec<AttachmentUploadRequest>,
    ) -> Result<()> {
        self.uploads.lock().unwrap().extend(requests);
        Ok(())
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("chatline_timeline=debug"))
        .with_test_writer()
        .try_init();
}

fn me() -> Member {
    Member::new("me", "Me")
}

fn bob() -> Member {
    Member::new("bob", "Bob")
}

fn chatroom() -> Chatroom {
    Chatroom::new("room", "Room", BASE_MS - 60 * MINUTE_MS)
}

fn context() -> OpenContext {
    OpenContext::new("room", me())
}

fn config() -> TimelineConfig {
    TimelineConfig {
        chatroom_retry_delay: Duration::from_millis(20),
        link_debounce: Duration::from_millis(30),
        ..TimelineConfig::default()
    }
}

/// Chatroom record after `total` responses were synced, with the read
/// marker on `last_seen` and `unseen` conversations after it.
fn synced_chatroom(total: u64, last_seen: Option<&str>, unseen: u64) -> Chatroom {
    let mut room = chatroom();
    room.total_response_count = total;
    room.last_seen_conversation_id = last_seen.map(ConversationId::from);
    room.unseen_count = unseen;
    room.is_conversation_stored = true;
    room
}

/// A store holding the chatroom and `count` conversations `c0..`, one
/// minute apart on the same day, all of them already read.
fn seeded_store(count: usize) -> Arc<SqliteConversationStore> {
    let store = Arc::new(SqliteConversationStore::open_in_memory(me()).unwrap());
    store.upsert_chatroom(&chatroom()).unwrap();
    let conversations = (0..count)
        .map(|i| {
            Conversation::new(
                Identity::Confirmed(format!("c{i}").into()),
                "room".into(),
                format!("message {i}"),
                BASE_MS + i as i64 * MINUTE_MS,
            )
            .with_member(bob())
        })
        .collect();
    store.ingest_remote(conversations).unwrap();
    if count > 0 {
        let newest = format!("c{}", count - 1);
        store
            .upsert_chatroom(&synced_chatroom(count as u64, Some(&newest), 0))
            .unwrap();
    }
    store
}

fn flatten(sections: &[Section]) -> Vec<Conversation> {
    sections
        .iter()
        .flat_map(|s| s.conversations.iter().cloned())
        .collect()
}

fn find(sections: &[Section], id: &str) -> Option<Conversation> {
    let id = ConversationId::from(id);
    flatten(sections).into_iter().find(|c| c.has_server_id(&id))
}

/// Let spawned store calls and live events drain.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

struct Harness {
    store: Arc<SqliteConversationStore>,
    uploader: Arc<RecordingUploader>,
    handle: SessionHandle,
    events: UnboundedReceiver<PresentationEvent>,
    /// Projection carried by the most recent reload.
    sections: Vec<Section>,
}

impl Harness {
    fn start(store: Arc<SqliteConversationStore>, config: TimelineConfig, context: OpenContext) -> Self {
        init_tracing();
        let uploader = Arc::new(RecordingUploader::default());
        let (handle, events) = spawn_session(store.clone(), uploader.clone(), config, context);
        Self {
            store,
            uploader,
            handle,
            events,
            sections: Vec::new(),
        }
    }

    async fn next(&mut self) -> Option<PresentationEvent> {
        let event = tokio::time::timeout(Duration::from_secs(5), self.events.recv())
            .await
            .expect("timed out waiting for a presentation event");
        if let Some(PresentationEvent::ReloadChatMessageList(ref sections)) = event {
            self.sections = sections.clone();
        }
        event
    }

    async fn until(&mut self, pred: impl Fn(&PresentationEvent) -> bool) -> PresentationEvent {
        loop {
            let event = self.next().await.expect("session closed");
            if pred(&event) {
                return event;
            }
        }
    }

    async fn until_rows(&mut self, pred: impl Fn(&[Section]) -> bool) -> Vec<Conversation> {
        loop {
            let event = self.next().await.expect("session closed");
            if matches!(event, PresentationEvent::ReloadChatMessageList(_)) && pred(&self.sections) {
                return flatten(&self.sections);
            }
        }
    }

    async fn loaded(&mut self) {
        self.until(|e| matches!(e, PresentationEvent::ScrollToBottom)).await;
        settle().await;
    }

    fn rows(&self) -> Vec<Conversation> {
        flatten(&self.sections)
    }
}

fn is_scroll_to_conversation(event: &PresentationEvent) -> bool {
    matches!(event, PresentationEvent::ScrollToConversation { .. })
}

// ---------------------------------------------------------------------------
// Initial load
// ---------------------------------------------------------------------------

#[tokio::test]
async fn short_bottom_page_is_headed_by_the_chatroom() {
    let mut h = Harness::start(seeded_store(4), config(), context());
    h.until(|e| matches!(e, PresentationEvent::ScrollToBottom)).await;

    assert_eq!(h.sections.len(), 1);
    let rows = h.rows();
    assert_eq!(rows.len(), 5);
    assert!(rows[0].is_header());
    assert_eq!(rows[0].body, "Room");
    assert_eq!(rows[4].body, "message 3");
}

#[tokio::test]
async fn deep_link_with_full_page_above_has_no_header() {
    let ctx = context().with_target("c10");
    let mut h = Harness::start(seeded_store(14), config(), ctx);

    let event = h.until(is_scroll_to_conversation).await;
    assert_eq!(event, PresentationEvent::ScrollToConversation { section: 0, row: 10 });

    let rows = h.rows();
    assert_eq!(rows.len(), 14);
    assert!(rows.iter().all(|c| !c.is_header()));
}

#[tokio::test]
async fn missing_chatroom_is_retried_until_it_appears() {
    let store = Arc::new(SqliteConversationStore::open_in_memory(me()).unwrap());
    let mut h = Harness::start(store.clone(), config(), context());

    tokio::time::sleep(Duration::from_millis(70)).await;
    store.upsert_chatroom(&chatroom()).unwrap();

    h.until(|e| matches!(e, PresentationEvent::ScrollToBottom)).await;
    let rows = h.rows();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].is_header());
}

#[tokio::test]
async fn chatroom_that_never_appears_closes_the_screen() {
    let store = Arc::new(SqliteConversationStore::open_in_memory(me()).unwrap());
    let config = TimelineConfig {
        chatroom_max_retries: Some(2),
        ..config()
    };
    let mut h = Harness::start(store, config, context());

    let event = h.until(|e| matches!(e, PresentationEvent::ExitScreen(_))).await;
    assert_eq!(event, PresentationEvent::ExitScreen(ExitReason::ChatroomUnavailable));
    assert!(h.next().await.is_none());
}

#[tokio::test]
async fn deleted_chatroom_exits_even_with_a_target() {
    let store = seeded_store(3);
    store
        .delete_chatroom(&"room".into(), &MemberId::from("me"))
        .unwrap();
    let mut h = Harness::start(store, config(), context().with_target("c1"));

    let event = h.until(|e| matches!(e, PresentationEvent::ExitScreen(_))).await;
    assert_eq!(event, PresentationEvent::ExitScreen(ExitReason::ChatroomDeleted));
    assert!(h.next().await.is_none());
}

#[tokio::test]
async fn unseen_conversations_open_at_the_read_marker() {
    let store = seeded_store(25);
    store
        .upsert_chatroom(&synced_chatroom(25, Some("c5"), 19))
        .unwrap();
    let mut h = Harness::start(store, config(), context());

    let event = h
        .until(|e| {
            matches!(
                e,
                PresentationEvent::ScrollToBottom | PresentationEvent::ScrollToConversation { .. }
            )
        })
        .await;
    assert_eq!(event, PresentationEvent::ScrollToConversation { section: 0, row: 6 });
    assert_eq!(h.rows()[6].body, "message 5");
}

#[tokio::test]
async fn read_chatroom_without_marker_waits_for_sync() {
    let store = seeded_store(5);
    store.upsert_chatroom(&synced_chatroom(5, None, 0)).unwrap();
    let mut h = Harness::start(store, config(), context());

    h.until(|e| matches!(e, PresentationEvent::UpdateChatroomSubtitles(_)))
        .await;
    settle().await;
    while let Ok(event) = h.events.try_recv() {
        assert!(
            !matches!(
                event,
                PresentationEvent::ReloadChatMessageList(_)
                    | PresentationEvent::ScrollToBottom
                    | PresentationEvent::ScrollToConversation { .. }
            ),
            "unexpected {event:?}"
        );
    }
}

#[tokio::test]
async fn reopen_jumps_to_last_seen_conversation() {
    let mut h = Harness::start(seeded_store(25), config(), context());
    h.loaded().await;

    h.store
        .upsert_chatroom(&synced_chatroom(25, Some("c5"), 19))
        .unwrap();

    h.handle.reopen().await.unwrap();
    let event = h.until(is_scroll_to_conversation).await;

    // header, c0..c4, c5, then a full page below
    assert_eq!(event, PresentationEvent::ScrollToConversation { section: 0, row: 6 });
    let rows = h.rows();
    assert_eq!(rows.len(), 17);
    assert!(rows[0].is_header());
    assert_eq!(rows[6].body, "message 5");
}

// ---------------------------------------------------------------------------
// Paging
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scrolling_up_merges_older_pages_until_the_header() {
    let mut h = Harness::start(seeded_store(25), config(), context());
    h.until(|e| matches!(e, PresentationEvent::ScrollToBottom)).await;
    let rows = h.rows();
    assert_eq!(rows.len(), 10);
    assert_eq!(rows[0].body, "message 15");

    h.handle.load_more("c15", ScrollDirection::Up).await.unwrap();
    let event = h.until(|e| matches!(e, PresentationEvent::ReloadData(_))).await;
    assert_eq!(event, PresentationEvent::ReloadData(ScrollDirection::Up));
    assert_eq!(h.rows().len(), 20);

    h.handle.load_more("c5", ScrollDirection::Up).await.unwrap();
    h.until(|e| matches!(e, PresentationEvent::ReloadData(_))).await;
    let rows = h.rows();
    assert_eq!(rows.len(), 26);
    assert!(rows[0].is_header());
    assert_eq!(rows[1].body, "message 0");
    assert!(rows.windows(2).all(|w| w[0].created_epoch_ms <= w[1].created_epoch_ms));
}

#[tokio::test]
async fn reply_click_scrolls_or_jumps() {
    let mut h = Harness::start(seeded_store(25), config(), context());
    h.loaded().await;

    h.handle.reply_clicked("c20").await.unwrap();
    let event = h.until(is_scroll_to_conversation).await;
    assert_eq!(event, PresentationEvent::ScrollToConversation { section: 0, row: 5 });

    h.handle.reply_clicked("c2").await.unwrap();
    let event = h.until(is_scroll_to_conversation).await;
    assert_eq!(event, PresentationEvent::ScrollToConversation { section: 0, row: 3 });
    assert!(h.rows()[0].is_header());
}

#[tokio::test]
async fn jumping_to_the_chatroom_loads_the_top() {
    let mut h = Harness::start(seeded_store(25), config(), context());
    h.loaded().await;

    h.handle.jump_to("room").await.unwrap();
    let event = h.until(is_scroll_to_conversation).await;
    assert_eq!(event, PresentationEvent::ScrollToConversation { section: 0, row: 0 });

    let rows = h.rows();
    assert_eq!(rows.len(), 11);
    assert!(rows[0].is_header());
    assert_eq!(rows[10].body, "message 9");
}

// ---------------------------------------------------------------------------
// Live events
// ---------------------------------------------------------------------------

#[tokio::test]
async fn new_conversations_wait_for_their_attachments() {
    let mut h = Harness::start(seeded_store(2), config(), context());
    h.loaded().await;

    let mut photo = Conversation::new(
        Identity::Confirmed("p1".into()),
        "room".into(),
        "photo",
        BASE_MS + 10 * MINUTE_MS,
    )
    .with_member(bob());
    photo.attachment_count = 1;
    h.store.ingest_remote(vec![photo]).unwrap();
    settle().await;

    let snapshot = h.handle.snapshot().await.unwrap();
    assert!(find(&snapshot, "p1").is_none());

    h.store.complete_attachment_upload(&"p1".into()).unwrap();
    h.until(|e| matches!(e, PresentationEvent::ScrollToBottom)).await;
    let rows = h.rows();
    assert_eq!(rows.last().map(|c| c.body.as_str()), Some("photo"));
}

#[tokio::test]
async fn remote_edits_and_deletes_update_in_place() {
    let mut h = Harness::start(seeded_store(3), config(), context());
    h.loaded().await;

    h.handle.edit_conversation("c1", "edited", None).await.unwrap();
    let rows = h
        .until_rows(|s| find(s, "c1").map(|c| c.is_edited).unwrap_or(false))
        .await;
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[2].body, "edited");

    h.handle.delete_conversations(vec!["c0".into()]).await.unwrap();
    let rows = h
        .until_rows(|s| find(s, "c0").map(|c| c.is_deleted()).unwrap_or(false))
        .await;
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[1].deleted_by.as_ref().map(|m| m.id.as_str()), Some("me"));
}

// ---------------------------------------------------------------------------
// Sending
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sent_message_is_confirmed_in_place() {
    let mut h = Harness::start(seeded_store(2), config(), context());
    h.loaded().await;

    h.handle.post_message(MessageDraft::text("hello")).await.unwrap();
    let rows = h
        .until_rows(|s| flatten(s).iter().any(|c| c.body == "hello"))
        .await;
    let pending = rows.iter().find(|c| c.body == "hello").unwrap();
    assert!(!pending.identity.is_confirmed());
    assert_eq!(pending.delivery, Delivery::Pending);

    let rows = h
        .until_rows(|s| flatten(s).iter().any(|c| c.body == "hello" && c.identity.is_confirmed()))
        .await;
    assert_eq!(rows.iter().filter(|c| c.body == "hello").count(), 1);
    assert_eq!(rows.len(), 4);

    // first post makes the member follow the chatroom
    let event = h
        .until(|e| match e {
            PresentationEvent::UpdateChatroomSubtitles(actions) => {
                actions.actions.contains(&ChatroomAction::Unfollow)
            }
            _ => false,
        })
        .await;
    assert!(matches!(event, PresentationEvent::UpdateChatroomSubtitles(_)));
}

#[tokio::test]
async fn failed_send_is_flagged_and_can_be_retried() {
    let mut h = Harness::start(seeded_store(0), config(), context());
    h.loaded().await;

    h.store.set_reachable(false);
    h.handle.post_message(MessageDraft::text("hello")).await.unwrap();
    let rows = h
        .until_rows(|s| {
            flatten(s)
                .iter()
                .any(|c| c.body == "hello" && c.delivery == Delivery::Failed)
        })
        .await;
    let failed = rows.iter().find(|c| c.body == "hello").unwrap();
    let temporary = failed.temporary_id().cloned().unwrap();

    h.store.set_reachable(true);
    h.handle.retry_send(temporary.clone()).await.unwrap();
    let rows = h
        .until_rows(|s| {
            flatten(s)
                .iter()
                .any(|c| c.temporary_id() == Some(&temporary) && c.identity.is_confirmed())
        })
        .await;
    let sent: Vec<_> = rows.iter().filter(|c| c.body == "hello").collect();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].delivery, Delivery::Sent);
}

fn retrying_config(base_delay_ms: u64) -> TimelineConfig {
    TimelineConfig {
        send_failure: SendFailurePolicy::Retry { max_attempts: 2 },
        send_retry: RetryPolicy::new(base_delay_ms, base_delay_ms * 4),
        ..config()
    }
}

#[tokio::test]
async fn send_is_flagged_once_automatic_retries_run_out() {
    let mut h = Harness::start(seeded_store(0), retrying_config(15), context());
    h.loaded().await;

    h.store.set_reachable(false);
    let started = Instant::now();
    h.handle.post_message(MessageDraft::text("hello")).await.unwrap();
    let rows = h
        .until_rows(|s| {
            flatten(s)
                .iter()
                .any(|c| c.body == "hello" && c.delivery == Delivery::Failed)
        })
        .await;

    // two backoff waits: 15ms then 30ms
    assert!(started.elapsed() >= Duration::from_millis(45));
    let sent: Vec<_> = rows.iter().filter(|c| c.body == "hello").collect();
    assert_eq!(sent.len(), 1);
    assert!(!sent[0].identity.is_confirmed());
}

#[tokio::test]
async fn send_recovers_when_the_backend_returns_before_the_retry() {
    let mut h = Harness::start(seeded_store(0), retrying_config(300), context());
    h.loaded().await;

    h.store.set_reachable(false);
    h.handle.post_message(MessageDraft::text("hello")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    h.store.set_reachable(true);

    let rows = h
        .until_rows(|s| {
            flatten(s)
                .iter()
                .any(|c| c.body == "hello" && c.identity.is_confirmed())
        })
        .await;
    let sent: Vec<_> = rows.iter().filter(|c| c.body == "hello").collect();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].delivery, Delivery::Sent);
    assert!(sent[0].temporary_id().is_some());
}

#[tokio::test]
async fn attachments_are_uploaded_and_surface_once_ready() {
    let mut h = Harness::start(seeded_store(1), config(), context());
    h.loaded().await;

    let draft = AttachmentDraft {
        name: "cat.png".into(),
        local_path: "/tmp/cat.png".into(),
        thumbnail_path: None,
        kind: AttachmentKind::Image,
        width: Some(640),
        height: Some(480),
        meta: AttachmentMeta::default(),
    };
    h.handle
        .post_message(MessageDraft::text("pic").with_attachments(vec![draft]))
        .await
        .unwrap();
    let rows = h.until_rows(|s| flatten(s).iter().any(|c| c.body == "pic")).await;
    let pending = rows.iter().find(|c| c.body == "pic").unwrap();
    assert_eq!(pending.attachments.len(), 1);
    assert_eq!(pending.attachments[0].local_path.as_deref(), Some("/tmp/cat.png"));
    settle().await;

    let server_id = {
        let uploads = h.uploader.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].index, 1);
        uploads[0].conversation_id.clone()
    };

    h.store.complete_attachment_upload(&server_id).unwrap();
    let rows = h
        .until_rows(|s| flatten(s).iter().any(|c| c.has_server_id(&server_id)))
        .await;
    assert_eq!(rows.iter().filter(|c| c.body == "pic").count(), 1);
}

// ---------------------------------------------------------------------------
// Reactions and chatroom actions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rejected_reaction_is_rolled_back() {
    let config = TimelineConfig {
        reaction_failure: ReactionFailurePolicy::Rollback,
        ..config()
    };
    let mut h = Harness::start(seeded_store(1), config, context());
    h.loaded().await;

    h.store.set_reachable(false);
    h.handle.put_reaction("c0", "👍").await.unwrap();
    h.until_rows(|s| find(s, "c0").map(|c| c.reactions.len() == 1).unwrap_or(false))
        .await;
    h.until_rows(|s| find(s, "c0").map(|c| c.reactions.is_empty()).unwrap_or(false))
        .await;
}

#[tokio::test]
async fn rejected_reaction_is_kept_by_default() {
    let mut h = Harness::start(seeded_store(1), config(), context());
    h.loaded().await;

    h.store.set_reachable(false);
    h.handle.put_reaction("c0", "👍").await.unwrap();
    settle().await;

    let snapshot = h.handle.snapshot().await.unwrap();
    let reacted = find(&snapshot, "c0").unwrap();
    assert_eq!(reacted.reactions.len(), 1);
    assert_eq!(reacted.reactions[0].member.id.as_str(), "me");
}

#[tokio::test]
async fn topic_and_mute_are_reported() {
    let mut h = Harness::start(seeded_store(2), config(), context());
    h.loaded().await;

    h.handle.set_topic("c1").await.unwrap();
    let event = h
        .until(|e| matches!(e, PresentationEvent::UpdateTopicBar(Some(_))))
        .await;
    match event {
        PresentationEvent::UpdateTopicBar(Some(topic)) => assert_eq!(topic.body, "message 1"),
        other => panic!("unexpected event {other:?}"),
    }

    h.handle.mute(true).await.unwrap();
    h.until(|e| match e {
        PresentationEvent::UpdateChatroomSubtitles(actions) => {
            actions.actions.contains(&ChatroomAction::Unmute)
        }
        _ => false,
    })
    .await;
}

#[tokio::test]
async fn leaving_closes_the_session() {
    let mut h = Harness::start(seeded_store(1), config(), context());
    h.loaded().await;

    h.handle.leave().await.unwrap();
    let event = h.until(|e| matches!(e, PresentationEvent::ExitScreen(_))).await;
    assert_eq!(event, PresentationEvent::ExitScreen(ExitReason::Left));
    assert!(h.next().await.is_none());
    assert!(h.handle.snapshot().await.is_err());
}

#[tokio::test]
async fn copy_text_needs_every_selected_conversation() {
    let mut h = Harness::start(seeded_store(3), config(), context());
    h.loaded().await;

    let single = h.handle.copy_text(vec!["c0".into()]).await.unwrap();
    assert_eq!(single.as_deref(), Some("message 0"));

    let several = h
        .handle
        .copy_text(vec!["c0".into(), "c1".into()])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(several.lines().count(), 2);
    assert!(several.starts_with("[5 Mar 2024, 10:30] Bob: message 0"));

    let missing = h
        .handle
        .copy_text(vec!["c0".into(), "nope".into()])
        .await
        .unwrap();
    assert!(missing.is_none());
}

// ---------------------------------------------------------------------------
// Link previews
// ---------------------------------------------------------------------------

#[tokio::test]
async fn only_the_last_detected_link_is_decoded() {
    let store = seeded_store(1);
    store
        .register_link_preview(
            "https://a.example",
            OgTags {
                title: Some("A".into()),
                ..OgTags::default()
            },
        )
        .unwrap();
    store
        .register_link_preview(
            "https://b.example",
            OgTags {
                title: Some("B".into()),
                ..OgTags::default()
            },
        )
        .unwrap();
    let mut h = Harness::start(store, config(), context());
    h.loaded().await;

    h.handle.link_detected("https://a.example").await.unwrap();
    h.handle.link_detected("https://b.example").await.unwrap();
    let event = h
        .until(|e| matches!(e, PresentationEvent::LinkPreview(_)))
        .await;
    let tags = match event {
        PresentationEvent::LinkPreview(Some(tags)) => tags,
        other => panic!("unexpected event {other:?}"),
    };
    assert_eq!(tags.title.as_deref(), Some("B"));
    assert_eq!(tags.url.as_deref(), Some("https://b.example"));

    h.handle
        .post_message(MessageDraft::text("look").with_share_link("https://b.example"))
        .await
        .unwrap();
    let rows = h.until_rows(|s| flatten(s).iter().any(|c| c.body == "look")).await;
    let shared = rows.iter().find(|c| c.body == "look").unwrap();
    assert_eq!(
        shared.og_tags.as_ref().and_then(|t| t.title.as_deref()),
        Some("B")
    );

    h.handle.cancel_link_preview().await.unwrap();
    let event = h
        .until(|e| matches!(e, PresentationEvent::LinkPreview(_)))
        .await;
    assert_eq!(event, PresentationEvent::LinkPreview(None));
}
