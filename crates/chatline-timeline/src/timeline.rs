//! Reconciliation engine: the flat conversation cache plus its projection.
//!
//! Every mutation goes through [`Timeline::upsert`], which matches entries by
//! [`Identity::matches`]. That makes repeated delivery idempotent and lets a
//! confirmed conversation replace its optimistic copy in place.

use chatline_shared::time::DateBucketer;
use chatline_shared::{Conversation, ConversationId, Identity, Member, MemberId, TemporaryId};

use crate::projection::{group_by_date, Projection, Section};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    /// Number of conversations upserted.
    Applied(usize),
    /// The projection was replaced after the page was requested.
    Stale,
}

#[derive(Debug, Clone, Default)]
pub struct Timeline {
    bucketer: DateBucketer,
    conversations: Vec<Conversation>,
    projection: Projection,
    generation: u64,
}

impl Timeline {
    pub fn new(bucketer: DateBucketer) -> Self {
        Self {
            bucketer,
            conversations: Vec::new(),
            projection: Projection::new(),
            generation: 0,
        }
    }

    pub fn bucketer(&self) -> &DateBucketer {
        &self.bucketer
    }

    /// Bumped by every full replace.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    /// Cloned sections for the presentation layer.
    pub fn snapshot(&self) -> Vec<Section> {
        self.projection.sections().to_vec()
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Insert `conversation`, or replace the entry whose identity matches.
    pub fn upsert(&mut self, conversation: Conversation) -> Upsert {
        let existing = self
            .conversations
            .iter()
            .position(|c| c.identity.matches(&conversation.identity));

        match existing {
            Some(index) => {
                let previous = std::mem::replace(&mut self.conversations[index], conversation.clone());
                match self.projection.locate(&previous.identity) {
                    Some(at) => self.projection.replace(at, conversation, &self.bucketer),
                    None => self.projection.insert(conversation, &self.bucketer),
                }
                Upsert::Updated
            }
            None => {
                self.conversations.push(conversation.clone());
                self.projection.insert(conversation, &self.bucketer);
                Upsert::Inserted
            }
        }
    }

    /// Drop everything and rebuild from `conversations`.
    ///
    /// Duplicate identities collapse into one entry (last wins).
    pub fn replace_all(&mut self, conversations: Vec<Conversation>) -> u64 {
        self.generation += 1;
        self.conversations.clear();
        for conversation in conversations {
            match self
                .conversations
                .iter()
                .position(|c| c.identity.matches(&conversation.identity))
            {
                Some(index) => self.conversations[index] = conversation,
                None => self.conversations.push(conversation),
            }
        }
        self.projection =
            Projection::from_sections(group_by_date(self.conversations.clone(), &self.bucketer));
        self.generation
    }

    /// Upsert a page fetched while the timeline was at `generation`.
    pub fn merge_page(&mut self, conversations: Vec<Conversation>, generation: u64) -> Merge {
        if generation != self.generation {
            return Merge::Stale;
        }
        let count = conversations.len();
        for conversation in conversations {
            self.upsert(conversation);
        }
        self.projection.sort_sections();
        Merge::Applied(count)
    }

    /// Flag a conversation deleted by `actor`, keeping it in place.
    pub fn mark_deleted(&mut self, id: &ConversationId, actor: &Member) -> bool {
        let Some(mut conversation) = self.get(id).cloned() else {
            return false;
        };
        conversation.deleted_by = Some(actor.clone());
        self.upsert(conversation);
        true
    }

    /// Replace `actor`'s reaction. Returns the conversation as it was.
    pub fn apply_reaction(
        &mut self,
        id: &ConversationId,
        actor: &Member,
        reaction: &str,
    ) -> Option<Conversation> {
        let previous = self.get(id).cloned()?;
        self.upsert(previous.clone().with_reaction(actor, reaction));
        Some(previous)
    }

    /// Drop `actor`'s reaction. Returns the conversation as it was.
    pub fn remove_reaction(&mut self, id: &ConversationId, actor: &MemberId) -> Option<Conversation> {
        let previous = self.get(id).cloned()?;
        self.upsert(previous.clone().without_reaction(actor));
        Some(previous)
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    pub fn get(&self, id: &ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.has_server_id(id))
    }

    pub fn get_temporary(&self, id: &TemporaryId) -> Option<&Conversation> {
        self.conversations
            .iter()
            .find(|c| c.temporary_id() == Some(id))
    }

    pub fn find(&self, identity: &Identity) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.identity.matches(identity))
    }

    pub fn locate(&self, identity: &Identity) -> Option<(usize, usize)> {
        self.projection.locate(identity)
    }

    /// `(section, row)` of a confirmed conversation.
    pub fn position_of(&self, id: &ConversationId) -> Option<(usize, usize)> {
        self.locate(&Identity::Confirmed(id.clone()))
    }

    /// Clipboard rendering of the selected conversations.
    ///
    /// A single conversation copies as its trimmed body; several copy as
    /// `[date, HH:MM] name: body` lines. Returns `None` if any selected
    /// conversation is unknown or has no text.
    pub fn copy_text(&self, ids: &[ConversationId]) -> Option<String> {
        let mut lines = Vec::with_capacity(ids.len());
        for id in ids {
            let conversation = self.get(id)?;
            let body = conversation.display_body();
            let body = body.trim();
            if body.is_empty() {
                return None;
            }
            if ids.len() == 1 {
                return Some(body.to_string());
            }
            lines.push(format!(
                "[{}, {}] {}: {}",
                conversation.bucket_key(&self.bucketer),
                self.bucketer
                    .time_of_day(conversation.created_epoch_ms)
                    .unwrap_or_default(),
                conversation.member.as_ref().map(|m| m.name.as_str()).unwrap_or_default(),
                body
            ));
        }
        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatline_shared::Delivery;

    // 2024-03-05T10:30:00Z
    const MARCH_5_MS: i64 = 1_709_634_600_000;
    const DAY_MS: i64 = 86_400_000;

    fn confirmed(id: &str, created_ms: i64) -> Conversation {
        Conversation::new(Identity::Confirmed(id.into()), "room".into(), id, created_ms)
    }

    fn timeline() -> Timeline {
        Timeline::new(DateBucketer::utc())
    }

    fn assert_ordered(timeline: &Timeline) {
        let sections = timeline.projection().sections();
        for pair in sections.windows(2) {
            assert!(pair[0].sort_key < pair[1].sort_key);
        }
        for section in sections {
            for pair in section.conversations.windows(2) {
                assert!(pair[0].created_epoch_ms <= pair[1].created_epoch_ms);
            }
        }
    }

    #[test]
    fn upsert_is_idempotent() {
        let mut timeline = timeline();
        assert_eq!(timeline.upsert(confirmed("c1", MARCH_5_MS)), Upsert::Inserted);
        let before = timeline.snapshot();
        assert_eq!(timeline.upsert(confirmed("c1", MARCH_5_MS)), Upsert::Updated);
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline.snapshot(), before);
    }

    #[test]
    fn confirmation_replaces_temporary_entry() {
        let mut timeline = timeline();
        let mut pending = Conversation::new(
            Identity::Temporary("T1".into()),
            "room".into(),
            "hi",
            MARCH_5_MS,
        );
        pending.delivery = Delivery::Pending;
        timeline.upsert(pending.clone());

        let mut confirmed = pending.clone();
        confirmed.identity = Identity::Both {
            temporary: "T1".into(),
            server: "S1".into(),
        };
        confirmed.delivery = Delivery::Sent;
        assert_eq!(timeline.upsert(confirmed), Upsert::Updated);
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline.projection().len(), 1);

        assert_eq!(timeline.upsert(confirmed_with_body("S1", "edited")), Upsert::Updated);
        assert_eq!(timeline.get(&"S1".into()).map(|c| c.body.as_str()), Some("edited"));
        assert_eq!(timeline.len(), 1);
    }

    fn confirmed_with_body(id: &str, body: &str) -> Conversation {
        Conversation::new(Identity::Confirmed(id.into()), "room".into(), body, MARCH_5_MS)
    }

    #[test]
    fn sections_stay_ordered_under_any_insert_order() {
        let mut timeline = timeline();
        for (id, offset) in [("c", 2 * DAY_MS), ("a", 0), ("d", 2 * DAY_MS - 1), ("b", DAY_MS)] {
            timeline.upsert(confirmed(id, MARCH_5_MS + offset));
        }
        assert_ordered(&timeline);
        assert_eq!(timeline.projection().section_count(), 3);
    }

    #[test]
    fn delete_keeps_entry_in_place() {
        let mut timeline = timeline();
        timeline.upsert(confirmed("c1", MARCH_5_MS));
        timeline.upsert(confirmed("c2", MARCH_5_MS + 1));

        let moderator = Member::new("mod", "Mod");
        assert!(timeline.mark_deleted(&"c1".into(), &moderator));
        assert!(!timeline.mark_deleted(&"missing".into(), &moderator));
        assert_eq!(timeline.position_of(&"c1".into()), Some((0, 0)));
        assert!(timeline.get(&"c1".into()).unwrap().is_deleted());
    }

    #[test]
    fn reaction_returns_previous_snapshot() {
        let mut timeline = timeline();
        timeline.upsert(confirmed("c1", MARCH_5_MS));
        let me = Member::new("me", "Me");

        let before = timeline.apply_reaction(&"c1".into(), &me, "👍").unwrap();
        assert!(before.reactions.is_empty());
        timeline.apply_reaction(&"c1".into(), &me, "🎉");
        let reactions = &timeline.get(&"c1".into()).unwrap().reactions;
        assert_eq!(reactions.len(), 1);
        assert_eq!(reactions[0].reaction, "🎉");

        timeline.remove_reaction(&"c1".into(), &me.id);
        assert!(timeline.get(&"c1".into()).unwrap().reactions.is_empty());
        assert!(timeline.apply_reaction(&"missing".into(), &me, "👍").is_none());
    }

    #[test]
    fn stale_page_is_discarded() {
        let mut timeline = timeline();
        let generation = timeline.replace_all(vec![confirmed("c1", MARCH_5_MS)]);
        timeline.replace_all(vec![confirmed("c9", MARCH_5_MS)]);

        assert_eq!(
            timeline.merge_page(vec![confirmed("c0", MARCH_5_MS - 1)], generation),
            Merge::Stale
        );
        assert!(timeline.get(&"c0".into()).is_none());

        let current = timeline.generation();
        assert_eq!(
            timeline.merge_page(vec![confirmed("c0", MARCH_5_MS - DAY_MS)], current),
            Merge::Applied(1)
        );
        assert_ordered(&timeline);
    }

    #[test]
    fn replace_all_collapses_duplicates() {
        let mut timeline = timeline();
        timeline.replace_all(vec![
            confirmed("c1", MARCH_5_MS),
            confirmed_with_body("c1", "newer"),
        ]);
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline.projection().len(), 1);
        assert_eq!(timeline.get(&"c1".into()).unwrap().body, "newer");
    }

    #[test]
    fn copy_text_formats() {
        let mut timeline = timeline();
        timeline.upsert(confirmed("c1", MARCH_5_MS).with_member(Member::new("a", "Alice")));
        timeline.upsert(confirmed("c2", MARCH_5_MS + 60_000).with_member(Member::new("b", "Bob")));

        assert_eq!(timeline.copy_text(&["c1".into()]), Some("c1".to_string()));
        assert_eq!(
            timeline.copy_text(&["c1".into(), "c2".into()]),
            Some("[5 Mar 2024, 10:30] Alice: c1\n[5 Mar 2024, 10:31] Bob: c2".to_string())
        );
        assert_eq!(timeline.copy_text(&["c1".into(), "nope".into()]), None);
    }
}
