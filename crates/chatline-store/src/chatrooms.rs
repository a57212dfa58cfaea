//! CRUD operations for [`Chatroom`] records.

use chatline_shared::{Chatroom, ChatroomId, ConversationId, MemberId};
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::Result;
use crate::members::member_columns;

const CHATROOM_SELECT: &str = "SELECT r.id, r.title, r.created_epoch_ms, r.community_id, r.deleted_by,
        r.total_response_count, r.last_seen_conversation_id, r.unseen_count,
        r.is_conversation_stored, r.topic_id, r.follow_status, r.muted, r.is_secret,
        m.id, m.name, m.image_url, m.title
     FROM chatrooms r
     LEFT JOIN members m ON m.id = r.member_id";

impl Database {
    // ------------------------------------------------------------------
    // Create / update
    // ------------------------------------------------------------------

    /// Insert a chatroom or overwrite every column of an existing one.
    pub fn upsert_chatroom(&self, chatroom: &Chatroom) -> Result<()> {
        if let Some(ref member) = chatroom.member {
            self.upsert_member(member)?;
        }
        self.conn().execute(
            "INSERT INTO chatrooms (id, title, member_id, created_epoch_ms, community_id, deleted_by,
                total_response_count, last_seen_conversation_id, unseen_count,
                is_conversation_stored, topic_id, follow_status, muted, is_secret)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                member_id = excluded.member_id,
                created_epoch_ms = excluded.created_epoch_ms,
                community_id = excluded.community_id,
                deleted_by = excluded.deleted_by,
                total_response_count = excluded.total_response_count,
                last_seen_conversation_id = excluded.last_seen_conversation_id,
                unseen_count = excluded.unseen_count,
                is_conversation_stored = excluded.is_conversation_stored,
                topic_id = excluded.topic_id,
                follow_status = excluded.follow_status,
                muted = excluded.muted,
                is_secret = excluded.is_secret",
            params![
                chatroom.id.as_str(),
                chatroom.title,
                chatroom.member.as_ref().map(|m| m.id.as_str()),
                chatroom.created_epoch_ms,
                chatroom.community_id,
                chatroom.deleted_by.as_ref().map(|m| m.as_str()),
                chatroom.total_response_count as i64,
                chatroom.last_seen_conversation_id.as_ref().map(|c| c.as_str()),
                chatroom.unseen_count as i64,
                chatroom.is_conversation_stored,
                chatroom.topic_id.as_ref().map(|c| c.as_str()),
                chatroom.follow_status,
                chatroom.muted,
                chatroom.is_secret,
            ],
        )?;
        Ok(())
    }

    pub fn set_participant_count(&self, id: &ChatroomId, count: u64) -> Result<()> {
        self.conn().execute(
            "UPDATE chatrooms SET participant_count = ?2 WHERE id = ?1",
            params![id.as_str(), count as i64],
        )?;
        Ok(())
    }

    pub fn set_chatroom_topic(&self, id: &ChatroomId, topic: &ConversationId) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE chatrooms SET topic_id = ?2 WHERE id = ?1",
            params![id.as_str(), topic.as_str()],
        )?;
        Ok(affected > 0)
    }

    pub fn set_follow_status(&self, id: &ChatroomId, follow: bool) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE chatrooms SET follow_status = ?2 WHERE id = ?1",
            params![id.as_str(), follow],
        )?;
        Ok(affected > 0)
    }

    pub fn set_muted(&self, id: &ChatroomId, muted: bool) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE chatrooms SET muted = ?2 WHERE id = ?1",
            params![id.as_str(), muted],
        )?;
        Ok(affected > 0)
    }

    pub fn set_conversation_stored(&self, id: &ChatroomId) -> Result<()> {
        self.conn().execute(
            "UPDATE chatrooms SET is_conversation_stored = 1 WHERE id = ?1",
            params![id.as_str()],
        )?;
        Ok(())
    }

    /// Record `count` new responses, `unseen` of which the user has not read.
    pub fn bump_response_counts(&self, id: &ChatroomId, count: u64, unseen: u64) -> Result<()> {
        self.conn().execute(
            "UPDATE chatrooms
             SET total_response_count = total_response_count + ?2,
                 unseen_count = unseen_count + ?3
             WHERE id = ?1",
            params![id.as_str(), count as i64, unseen as i64],
        )?;
        Ok(())
    }

    /// Clear the unseen counter and move the last-seen marker to the newest
    /// confirmed conversation.
    pub fn mark_chatroom_read(&self, id: &ChatroomId) -> Result<()> {
        self.conn().execute(
            "UPDATE chatrooms
             SET unseen_count = 0,
                 last_seen_conversation_id = COALESCE(
                    (SELECT server_id FROM conversations
                     WHERE chatroom_id = ?1 AND server_id IS NOT NULL
                     ORDER BY created_epoch_ms DESC, local_id DESC LIMIT 1),
                    last_seen_conversation_id)
             WHERE id = ?1",
            params![id.as_str()],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_chatroom(&self, id: &ChatroomId) -> Result<Option<Chatroom>> {
        let chatroom = self
            .conn()
            .query_row(
                &format!("{CHATROOM_SELECT} WHERE r.id = ?1"),
                params![id.as_str()],
                row_to_chatroom,
            )
            .optional()?;
        Ok(chatroom)
    }

    pub fn participant_count(&self, id: &ChatroomId) -> Result<u64> {
        let count: Option<i64> = self
            .conn()
            .query_row(
                "SELECT participant_count FROM chatrooms WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(count.unwrap_or(0).max(0) as u64)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Chatroom`].
fn row_to_chatroom(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chatroom> {
    let deleted_by: Option<String> = row.get(4)?;
    let last_seen: Option<String> = row.get(6)?;
    let topic_id: Option<String> = row.get(9)?;

    Ok(Chatroom {
        id: ChatroomId(row.get(0)?),
        title: row.get(1)?,
        created_epoch_ms: row.get(2)?,
        community_id: row.get(3)?,
        deleted_by: deleted_by.map(MemberId),
        total_response_count: row.get::<_, i64>(5)?.max(0) as u64,
        last_seen_conversation_id: last_seen.map(ConversationId),
        unseen_count: row.get::<_, i64>(7)?.max(0) as u64,
        is_conversation_stored: row.get(8)?,
        topic: None,
        topic_id: topic_id.map(ConversationId),
        follow_status: row.get(10)?,
        muted: row.get(11)?,
        is_secret: row.get(12)?,
        member: member_columns(row, 13)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatline_shared::Member;

    fn room() -> Chatroom {
        let mut room = Chatroom::new("room-1", "General", 1_700_000_000);
        room.member = Some(Member::new("owner", "Owner"));
        room.total_response_count = 3;
        room
    }

    #[test]
    fn chatroom_round_trip() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_chatroom(&room()).unwrap();

        let loaded = db.get_chatroom(&"room-1".into()).unwrap().unwrap();
        assert_eq!(loaded, room());
        assert!(db.get_chatroom(&"missing".into()).unwrap().is_none());
    }

    #[test]
    fn flags_and_counters_update() {
        let db = Database::open_in_memory().unwrap();
        let id: ChatroomId = "room-1".into();
        db.upsert_chatroom(&room()).unwrap();

        assert!(db.set_follow_status(&id, true).unwrap());
        assert!(db.set_muted(&id, true).unwrap());
        db.bump_response_counts(&id, 2, 2).unwrap();
        db.set_conversation_stored(&id).unwrap();

        let loaded = db.get_chatroom(&id).unwrap().unwrap();
        assert!(loaded.follow_status);
        assert!(loaded.muted);
        assert!(loaded.is_conversation_stored);
        assert_eq!(loaded.total_response_count, 5);
        assert_eq!(loaded.unseen_count, 2);

        db.mark_chatroom_read(&id).unwrap();
        assert_eq!(db.get_chatroom(&id).unwrap().unwrap().unseen_count, 0);
        assert!(!db.set_muted(&"missing".into(), true).unwrap());
    }
}
