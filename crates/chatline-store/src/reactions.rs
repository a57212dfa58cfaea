use chatline_shared::time::now_epoch_ms;
use chatline_shared::{ConversationId, Member, MemberId, Reaction};
use rusqlite::params;

use crate::database::Database;
use crate::error::Result;
use crate::members::member_columns;

impl Database {
    /// Set `member`'s reaction on a conversation, replacing any previous one.
    pub fn put_reaction(&self, conversation_id: &ConversationId, member: &Member, reaction: &str) -> Result<()> {
        self.upsert_member(member)?;
        self.conn().execute(
            "INSERT INTO reactions (conversation_id, member_id, reaction, created_at_ms)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(conversation_id, member_id) DO UPDATE SET
                reaction = excluded.reaction,
                created_at_ms = excluded.created_at_ms",
            params![conversation_id.as_str(), member.id.as_str(), reaction, now_epoch_ms()],
        )?;
        Ok(())
    }

    pub fn remove_reaction(&self, conversation_id: &ConversationId, member_id: &MemberId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM reactions WHERE conversation_id = ?1 AND member_id = ?2",
            params![conversation_id.as_str(), member_id.as_str()],
        )?;
        Ok(affected > 0)
    }

    /// Overwrite every reaction of a conversation, keeping the given order.
    pub fn replace_reactions(&self, conversation_id: &ConversationId, reactions: &[Reaction]) -> Result<()> {
        self.conn().execute(
            "DELETE FROM reactions WHERE conversation_id = ?1",
            params![conversation_id.as_str()],
        )?;
        let base = now_epoch_ms();
        for (i, reaction) in reactions.iter().enumerate() {
            self.upsert_member(&reaction.member)?;
            self.conn().execute(
                "INSERT OR REPLACE INTO reactions (conversation_id, member_id, reaction, created_at_ms)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    conversation_id.as_str(),
                    reaction.member.id.as_str(),
                    reaction.reaction,
                    base + i as i64,
                ],
            )?;
        }
        Ok(())
    }

    /// Reactions on a conversation in arrival order.
    pub fn get_reactions(&self, conversation_id: &ConversationId) -> Result<Vec<Reaction>> {
        let mut stmt = self.conn().prepare(
            "SELECT r.reaction, m.id, m.name, m.image_url, m.title
             FROM reactions r
             LEFT JOIN members m ON m.id = r.member_id
             WHERE r.conversation_id = ?1
             ORDER BY r.created_at_ms ASC, r.rowid ASC",
        )?;

        let rows = stmt.query_map(params![conversation_id.as_str()], |row| {
            let reaction: String = row.get(0)?;
            Ok(member_columns(row, 1)?.map(|member| Reaction { member, reaction }))
        })?;

        let mut reactions = Vec::new();
        for row in rows {
            if let Some(reaction) = row? {
                reactions.push(reaction);
            }
        }
        Ok(reactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatline_shared::{Chatroom, Conversation, Identity};

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.upsert_chatroom(&Chatroom::new("room", "Room", 1_700_000_000)).unwrap();
        db.upsert_conversation(&Conversation::new(
            Identity::Confirmed("c1".into()),
            "room".into(),
            "hello",
            1_700_000_100,
        ))
        .unwrap();
        db
    }

    #[test]
    fn one_reaction_per_member() {
        let db = setup();
        let id: ConversationId = "c1".into();
        let alice = Member::new("alice", "Alice");

        db.put_reaction(&id, &alice, "👍").unwrap();
        db.put_reaction(&id, &alice, "🎉").unwrap();
        db.put_reaction(&id, &Member::new("bob", "Bob"), "👍").unwrap();

        let reactions = db.get_reactions(&id).unwrap();
        assert_eq!(reactions.len(), 2);
        assert!(reactions
            .iter()
            .any(|r| r.member.id == alice.id && r.reaction == "🎉"));

        assert!(db.remove_reaction(&id, &alice.id).unwrap());
        assert!(!db.remove_reaction(&id, &alice.id).unwrap());
        assert_eq!(db.get_reactions(&id).unwrap().len(), 1);
    }

    #[test]
    fn replace_keeps_order() {
        let db = setup();
        let id: ConversationId = "c1".into();
        let reactions = vec![
            Reaction { member: Member::new("b", "B"), reaction: "❤️".into() },
            Reaction { member: Member::new("a", "A"), reaction: "👍".into() },
        ];
        db.replace_reactions(&id, &reactions).unwrap();
        assert_eq!(db.get_reactions(&id).unwrap(), reactions);
    }
}
