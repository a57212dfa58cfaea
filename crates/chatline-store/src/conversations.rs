//! CRUD and paging for [`Conversation`] records.
//!
//! Conversations are keyed by a local row id so that pending sends (which
//! only have a temporary id) and confirmed ones share one table. Pages are
//! ordered by `(created_epoch_ms, local_id)`.

use chatline_shared::store::{ConversationQuery, PageDirection};
use chatline_shared::{
    ChatroomId, Conversation, ConversationId, ConversationState, Delivery, Identity, Member,
    TemporaryId,
};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::members::member_columns;

const CONVERSATION_SELECT: &str = "SELECT c.local_id, c.server_id, c.temporary_id, c.chatroom_id,
        c.body, c.created_epoch_ms, c.attachments_json, c.reply_to_id, c.is_edited,
        c.attachment_count, c.attachment_uploaded, c.og_tags_json, c.state, c.delivery,
        m.id, m.name, m.image_url, m.title,
        d.id, d.name, d.image_url, d.title
     FROM conversations c
     LEFT JOIN members m ON m.id = c.member_id
     LEFT JOIN members d ON d.id = c.deleted_by_id";

impl Database {
    // ------------------------------------------------------------------
    // Write
    // ------------------------------------------------------------------

    /// Insert a conversation, or update the row whose identity matches it.
    ///
    /// Returns the local row id. Reactions of confirmed conversations are
    /// replaced wholesale.
    pub fn upsert_conversation(&self, conversation: &Conversation) -> Result<i64> {
        if let Some(ref member) = conversation.member {
            self.upsert_member(member)?;
        }
        if let Some(ref member) = conversation.deleted_by {
            self.upsert_member(member)?;
        }

        let attachments = serde_json::to_string(&conversation.attachments)?;
        let og_tags = conversation
            .og_tags
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let local_id = match self.find_local_id(&conversation.identity)? {
            Some(local_id) => {
                self.conn().execute(
                    "UPDATE conversations SET
                        server_id = ?2, temporary_id = ?3, chatroom_id = ?4, member_id = ?5,
                        body = ?6, created_epoch_ms = ?7, attachments_json = ?8, reply_to_id = ?9,
                        is_edited = ?10, deleted_by_id = ?11, attachment_count = ?12,
                        attachment_uploaded = ?13, og_tags_json = ?14, state = ?15, delivery = ?16
                     WHERE local_id = ?1",
                    params![
                        local_id,
                        conversation.server_id().map(|s| s.as_str()),
                        conversation.temporary_id().map(|t| t.as_str()),
                        conversation.chatroom_id.as_str(),
                        conversation.member.as_ref().map(|m| m.id.as_str()),
                        conversation.body,
                        conversation.created_epoch_ms,
                        attachments,
                        conversation.reply_to_id.as_ref().map(|r| r.as_str()),
                        conversation.is_edited,
                        conversation.deleted_by.as_ref().map(|m| m.id.as_str()),
                        conversation.attachment_count as i64,
                        conversation.attachment_uploaded,
                        og_tags,
                        state_to_str(conversation.state),
                        delivery_to_str(conversation.delivery),
                    ],
                )?;
                local_id
            }
            None => {
                self.conn().execute(
                    "INSERT INTO conversations (server_id, temporary_id, chatroom_id, member_id,
                        body, created_epoch_ms, attachments_json, reply_to_id, is_edited,
                        deleted_by_id, attachment_count, attachment_uploaded, og_tags_json,
                        state, delivery)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                    params![
                        conversation.server_id().map(|s| s.as_str()),
                        conversation.temporary_id().map(|t| t.as_str()),
                        conversation.chatroom_id.as_str(),
                        conversation.member.as_ref().map(|m| m.id.as_str()),
                        conversation.body,
                        conversation.created_epoch_ms,
                        attachments,
                        conversation.reply_to_id.as_ref().map(|r| r.as_str()),
                        conversation.is_edited,
                        conversation.deleted_by.as_ref().map(|m| m.id.as_str()),
                        conversation.attachment_count as i64,
                        conversation.attachment_uploaded,
                        og_tags,
                        state_to_str(conversation.state),
                        delivery_to_str(conversation.delivery),
                    ],
                )?;
                self.conn().last_insert_rowid()
            }
        };

        if let Some(server_id) = conversation.server_id() {
            self.replace_reactions(server_id, &conversation.reactions)?;
        }
        Ok(local_id)
    }

    /// Flag a conversation deleted by `actor`. Returns `false` if unknown.
    pub fn mark_conversation_deleted(&self, id: &ConversationId, actor: &Member) -> Result<bool> {
        self.upsert_member(actor)?;
        let affected = self.conn().execute(
            "UPDATE conversations SET deleted_by_id = ?2 WHERE server_id = ?1",
            params![id.as_str(), actor.id.as_str()],
        )?;
        Ok(affected > 0)
    }

    pub fn set_attachment_uploaded(&self, id: &ConversationId) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE conversations SET attachment_uploaded = 1 WHERE server_id = ?1",
            params![id.as_str()],
        )?;
        Ok(affected > 0)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a conversation by server id, with its reply target resolved.
    pub fn get_conversation(&self, id: &ConversationId) -> Result<Option<Conversation>> {
        let Some((_, conversation)) = self.query_one("c.server_id = ?1", id.as_str())? else {
            return Ok(None);
        };
        self.hydrate(conversation).map(Some)
    }

    pub fn get_temporary_conversation(&self, id: &TemporaryId) -> Result<Option<Conversation>> {
        let Some((_, conversation)) = self.query_one("c.temporary_id = ?1", id.as_str())? else {
            return Ok(None);
        };
        self.hydrate(conversation).map(Some)
    }

    /// One page of a chatroom, ordered oldest to newest.
    pub fn get_conversations_page(&self, query: &ConversationQuery) -> Result<Vec<Conversation>> {
        let limit = query.limit as i64;
        let chatroom = query.chatroom_id.as_str();

        let (clause, descending, anchor) = match query.direction {
            PageDirection::Top => ("c.chatroom_id = ?1", false, None),
            PageDirection::Bottom => ("c.chatroom_id = ?1", true, None),
            PageDirection::Above => (
                "c.chatroom_id = ?1 AND (c.created_epoch_ms < ?3
                    OR (c.created_epoch_ms = ?3 AND c.local_id < ?4))",
                true,
                Some(self.anchor_position(query, 0)?),
            ),
            PageDirection::Below => (
                "c.chatroom_id = ?1 AND (c.created_epoch_ms > ?3
                    OR (c.created_epoch_ms = ?3 AND c.local_id > ?4))",
                false,
                Some(self.anchor_position(query, i64::MAX)?),
            ),
        };
        let order = if descending {
            "c.created_epoch_ms DESC, c.local_id DESC"
        } else {
            "c.created_epoch_ms ASC, c.local_id ASC"
        };
        let sql = format!("{CONVERSATION_SELECT} WHERE {clause} ORDER BY {order} LIMIT ?2");

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = match anchor {
            Some((created, local_id)) => {
                stmt.query_map(params![chatroom, limit, created, local_id], row_to_conversation)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => stmt
                .query_map(params![chatroom, limit], row_to_conversation)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
        };

        let mut page = Vec::with_capacity(rows.len());
        for (_, conversation) in rows {
            page.push(self.hydrate(conversation)?);
        }
        if descending {
            page.reverse();
        }
        Ok(page)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Local row id of the stored conversation matching `identity`.
    fn find_local_id(&self, identity: &Identity) -> Result<Option<i64>> {
        let mut stmt = self.conn().prepare(
            "SELECT local_id, server_id, temporary_id FROM conversations
             WHERE server_id = ?1 OR temporary_id = ?2",
        )?;
        let candidates = stmt
            .query_map(
                params![
                    identity.server_id().map(|s| s.as_str()),
                    identity.temporary_id().map(|t| t.as_str()),
                ],
                |row| {
                    let local_id: i64 = row.get(0)?;
                    let server: Option<String> = row.get(1)?;
                    let temporary: Option<String> = row.get(2)?;
                    Ok((local_id, server, temporary))
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for (local_id, server, temporary) in candidates {
            let stored = Identity::from_parts(temporary.map(TemporaryId), server.map(ConversationId))
                .map_err(|e| StoreError::Corrupt(e.to_string()))?;
            if stored.matches(identity) {
                return Ok(Some(local_id));
            }
        }
        Ok(None)
    }

    /// `(created_epoch_ms, local_id)` of the query's anchor. Anchors that are
    /// not stored (e.g. the synthetic chatroom header) use `fallback_local_id`
    /// so that rows sharing the anchor's timestamp are excluded.
    fn anchor_position(&self, query: &ConversationQuery, fallback_local_id: i64) -> Result<(i64, i64)> {
        let Some(ref anchor) = query.anchor else {
            return Err(StoreError::Corrupt("paged query without anchor".to_string()));
        };
        let local_id = self.find_local_id(&anchor.identity)?;
        Ok((anchor.created_epoch_ms, local_id.unwrap_or(fallback_local_id)))
    }

    fn query_one(&self, clause: &str, key: &str) -> Result<Option<(i64, Conversation)>> {
        let row = self
            .conn()
            .query_row(
                &format!("{CONVERSATION_SELECT} WHERE {clause}"),
                params![key],
                row_to_conversation,
            )
            .optional()?;
        Ok(row)
    }

    /// Attach reactions and the (one level deep) reply target.
    fn hydrate(&self, mut conversation: Conversation) -> Result<Conversation> {
        if let Some(server_id) = conversation.server_id().cloned() {
            conversation.reactions = self.get_reactions(&server_id)?;
        }
        if let Some(ref reply_id) = conversation.reply_to_id {
            if let Some((_, mut reply)) = self.query_one("c.server_id = ?1", reply_id.as_str())? {
                if let Some(server_id) = reply.server_id().cloned() {
                    reply.reactions = self.get_reactions(&server_id)?;
                }
                conversation.reply_to = Some(Box::new(reply));
            }
        }
        Ok(conversation)
    }
}

fn conversion_error<E>(index: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e))
}

/// Map a `rusqlite::Row` to `(local_id, Conversation)` without reactions.
fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<(i64, Conversation)> {
    let local_id: i64 = row.get(0)?;
    let server_id: Option<String> = row.get(1)?;
    let temporary_id: Option<String> = row.get(2)?;
    let identity = Identity::from_parts(temporary_id.map(TemporaryId), server_id.map(ConversationId))
        .map_err(|e| conversion_error(1, e))?;

    let attachments_json: String = row.get(6)?;
    let attachments = serde_json::from_str(&attachments_json).map_err(|e| conversion_error(6, e))?;

    let reply_to_id: Option<String> = row.get(7)?;

    let og_tags_json: Option<String> = row.get(11)?;
    let og_tags = og_tags_json
        .map(|json| serde_json::from_str(&json))
        .transpose()
        .map_err(|e| conversion_error(11, e))?;

    let state: String = row.get(12)?;
    let delivery: String = row.get(13)?;

    let conversation = Conversation {
        identity,
        chatroom_id: ChatroomId(row.get(3)?),
        member: member_columns(row, 14)?,
        body: row.get(4)?,
        created_epoch_ms: row.get(5)?,
        attachments,
        reactions: Vec::new(),
        reply_to_id: reply_to_id.map(ConversationId),
        reply_to: None,
        is_edited: row.get(8)?,
        deleted_by: member_columns(row, 18)?,
        attachment_count: row.get::<_, i64>(9)?.max(0) as usize,
        attachment_uploaded: row.get(10)?,
        og_tags,
        state: state_from_str(&state),
        delivery: delivery_from_str(&delivery),
    };
    Ok((local_id, conversation))
}

fn state_to_str(state: ConversationState) -> &'static str {
    match state {
        ConversationState::Normal => "normal",
        ConversationState::ChatroomHeader => "chatroom_header",
        ConversationState::MemberJoined => "member_joined",
        ConversationState::MemberLeft => "member_left",
        ConversationState::TopicChanged => "topic_changed",
        ConversationState::Poll => "poll",
    }
}

fn state_from_str(s: &str) -> ConversationState {
    match s {
        "chatroom_header" => ConversationState::ChatroomHeader,
        "member_joined" => ConversationState::MemberJoined,
        "member_left" => ConversationState::MemberLeft,
        "topic_changed" => ConversationState::TopicChanged,
        "poll" => ConversationState::Poll,
        _ => ConversationState::Normal,
    }
}

fn delivery_to_str(delivery: Delivery) -> &'static str {
    match delivery {
        Delivery::Pending => "pending",
        Delivery::Sent => "sent",
        Delivery::Failed => "failed",
    }
}

fn delivery_from_str(s: &str) -> Delivery {
    match s {
        "pending" => Delivery::Pending,
        "failed" => Delivery::Failed,
        _ => Delivery::Sent,
    }
}
