//! # chatline-demo
//!
//! Drives a chatroom session against the SQLite store and logs every
//! presentation event:
//! - seeds an empty chatroom with conversations spread over a few days
//! - scrolls up, previews a link, posts text and an image, reacts
//! - lets a remote member post, then jumps to the top of the chatroom

mod config;
mod uploader;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chatline_shared::store::ConversationStore;
use chatline_shared::time::now_epoch_ms;
use chatline_shared::{
    AttachmentDraft, AttachmentKind, AttachmentMeta, Chatroom, ChatroomId, Conversation, Identity,
    Member, OgTags, ScrollDirection,
};
use chatline_store::{Database, SqliteConversationStore};
use chatline_timeline::{
    spawn_session, MessageDraft, OpenContext, PresentationEvent, SessionHandle, TimelineConfig,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::DemoConfig;
use crate::uploader::SimulatedUploader;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;
const PREVIEW_URL: &str = "https://example.com/rust";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,chatline_timeline=debug")),
        )
        .init();

    info!("Starting chatline demo v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let demo = DemoConfig::from_env();
    let timeline_config = TimelineConfig::from_env();
    info!(?demo, "Loaded demo configuration");
    info!(?timeline_config, "Loaded timeline configuration");

    // -----------------------------------------------------------------------
    // 3. Open the store and seed the chatroom
    // -----------------------------------------------------------------------
    let db = match demo.db_path {
        None => Database::open_in_memory(),
        Some(ref path) if path.as_os_str() == "default" => Database::new(),
        Some(ref path) => Database::open_at(path),
    }
    .context("failed to open conversation cache")?;

    let member = Member::new("local", demo.member_name.clone());
    let store = Arc::new(SqliteConversationStore::new(db, member.clone()));
    seed_chatroom(&store, &demo).await?;
    store.register_link_preview(
        PREVIEW_URL,
        OgTags {
            title: Some("The Rust Programming Language".into()),
            description: Some("A language empowering everyone.".into()),
            ..OgTags::default()
        },
    )?;

    // -----------------------------------------------------------------------
    // 4. Spawn the session and an event logger
    // -----------------------------------------------------------------------
    let uploader = Arc::new(SimulatedUploader::new(store.clone(), demo.upload_delay));
    let context = OpenContext::new(demo.chatroom_id.clone(), member);
    let (handle, mut events) = spawn_session(store.clone(), uploader, timeline_config, context);

    let json = demo.json_events;
    let logger = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if json {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => tracing::warn!(error = %e, "failed to encode event"),
                }
            } else {
                info!("{}", describe(&event));
            }
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the scenario (or stop early on Ctrl+C)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = run_scenario(&handle, &store, &demo) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "scenario failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    let sections = handle.snapshot().await?;
    info!(
        sections = sections.len(),
        conversations = sections.iter().map(|s| s.conversations.len()).sum::<usize>(),
        "final timeline"
    );
    handle.shutdown().await?;
    logger.await?;

    Ok(())
}

/// Give an empty chatroom some history spread over the last few days.
async fn seed_chatroom(store: &SqliteConversationStore, demo: &DemoConfig) -> anyhow::Result<()> {
    let chatroom_id = ChatroomId::new(demo.chatroom_id.as_str());
    if store.get_chatroom(&chatroom_id).await?.is_some() {
        info!(chatroom = %chatroom_id, "chatroom already cached, skipping seed");
        return Ok(());
    }

    let start = now_epoch_ms() - 3 * DAY_MS;
    let mut chatroom = Chatroom::new(chatroom_id.clone(), "General", start);
    chatroom.member = Some(Member::new("ada", "Ada"));
    store.upsert_chatroom(&chatroom)?;
    store.set_participant_count(&chatroom_id, 3)?;

    let authors = [Member::new("ada", "Ada"), Member::new("linus", "Linus")];
    let step = (2 * DAY_MS) / demo.seed_count.max(1) as i64;
    let conversations = (0..demo.seed_count)
        .map(|i| {
            Conversation::new(
                Identity::Confirmed(format!("seed-{i}").into()),
                chatroom_id.clone(),
                format!("Seeded message #{i}"),
                start + DAY_MS / 2 + i as i64 * step,
            )
            .with_member(authors[i % authors.len()].clone())
        })
        .collect();
    store.ingest_remote(conversations)?;

    // Pretend an earlier visit read all but the last few, so the session
    // opens at the read marker.
    if demo.seed_count > 0 {
        let unseen = demo.seed_count.min(5);
        chatroom.total_response_count = demo.seed_count as u64;
        chatroom.last_seen_conversation_id =
            Some(format!("seed-{}", demo.seed_count - unseen).into());
        chatroom.unseen_count = (unseen - 1) as u64;
        chatroom.is_conversation_stored = true;
        store.upsert_chatroom(&chatroom)?;
    }

    info!(chatroom = %chatroom_id, count = demo.seed_count, "seeded chatroom");
    Ok(())
}

async fn run_scenario(
    handle: &SessionHandle,
    store: &SqliteConversationStore,
    demo: &DemoConfig,
) -> anyhow::Result<()> {
    let pause = || tokio::time::sleep(Duration::from_millis(250));
    pause().await;

    // Scroll up from the oldest loaded conversation.
    let sections = handle.snapshot().await?;
    let oldest = sections
        .iter()
        .flat_map(|s| s.conversations.iter())
        .find(|c| !c.is_header())
        .and_then(|c| c.server_id().cloned());
    if let Some(anchor) = oldest {
        handle.load_more(anchor, ScrollDirection::Up).await?;
        pause().await;
    }

    // Type a link, wait for the preview, then send it.
    handle.link_detected(PREVIEW_URL).await?;
    tokio::time::sleep(Duration::from_millis(600)).await;
    handle
        .post_message(MessageDraft::text(format!("Worth a read: {PREVIEW_URL}")).with_share_link(PREVIEW_URL))
        .await?;
    handle.cancel_link_preview().await?;
    pause().await;

    // An image, which only shows as confirmed once the upload finishes.
    let photo = AttachmentDraft {
        name: "sunset.jpg".into(),
        local_path: "/tmp/sunset.jpg".into(),
        thumbnail_path: None,
        kind: AttachmentKind::Image,
        width: Some(1920),
        height: Some(1080),
        meta: AttachmentMeta {
            size: Some(482_113),
            ..AttachmentMeta::default()
        },
    };
    handle
        .post_message(MessageDraft::text("Sunset from the office").with_attachments(vec![photo]))
        .await?;

    // React to the newest seeded conversation.
    if demo.seed_count > 0 {
        let newest = format!("seed-{}", demo.seed_count - 1);
        handle.put_reaction(newest.as_str(), "🎉").await?;
        if let Some(text) = handle.copy_text(vec![newest.as_str().into()]).await? {
            info!(%text, "copied conversation");
        }
    }

    // Someone else joins the conversation.
    let reply = Conversation::new(
        Identity::Confirmed(format!("remote-{}", now_epoch_ms()).into()),
        demo.chatroom_id.as_str().into(),
        "Nice one!",
        now_epoch_ms(),
    )
    .with_member(Member::new("linus", "Linus"));
    store.ingest_remote(vec![reply])?;

    tokio::time::sleep(demo.upload_delay + Duration::from_millis(250)).await;

    // Back to where it all started.
    handle.jump_to(demo.chatroom_id.as_str()).await?;
    pause().await;
    Ok(())
}

fn describe(event: &PresentationEvent) -> String {
    match event {
        PresentationEvent::ReloadChatMessageList(sections) => {
            let buckets: Vec<String> = sections
                .iter()
                .map(|s| format!("{} ({})", s.key, s.conversations.len()))
                .collect();
            format!("reload: {}", buckets.join(", "))
        }
        PresentationEvent::ScrollToBottom => "scroll to bottom".to_string(),
        PresentationEvent::ScrollToConversation { section, row } => {
            format!("scroll to section {section}, row {row}")
        }
        PresentationEvent::ReloadData(direction) => format!("reload data ({direction:?})"),
        PresentationEvent::UpdateChatroomSubtitles(actions) => format!(
            "subtitles: {} participants, actions {:?}",
            actions.participant_count, actions.actions
        ),
        PresentationEvent::UpdateTopicBar(topic) => match topic {
            Some(topic) => format!("topic: {}", topic.display_body()),
            None => "topic: none".to_string(),
        },
        PresentationEvent::MemberRightsCheck(state) => {
            format!("member {} is {:?}", state.member.name, state.role)
        }
        PresentationEvent::LinkPreview(tags) => match tags.as_ref().and_then(|t| t.title.as_deref()) {
            Some(title) => format!("link preview: {title}"),
            None => "link preview cleared".to_string(),
        },
        PresentationEvent::ExitScreen(reason) => format!("exit: {reason:?}"),
    }
}
