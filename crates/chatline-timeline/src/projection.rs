//! Date-bucketed, time-ordered view of a conversation list.
//!
//! A [`Projection`] keeps two invariants after every mutation:
//! sections are ascending by sort key with unique bucket keys, and the
//! conversations of a section are non-decreasing by creation time. Sorting
//! is stable, so equal timestamps keep their arrival order.

use chatline_shared::time::DateBucketer;
use chatline_shared::{Conversation, Identity};
use serde::Serialize;

/// One date bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    /// Display key, e.g. `5 Mar 2024`.
    pub key: String,
    /// Midnight of the bucket in epoch seconds.
    pub sort_key: i64,
    pub conversations: Vec<Conversation>,
}

impl Section {
    fn new(key: String, bucketer: &DateBucketer) -> Self {
        let sort_key = bucketer.sort_key(&key);
        Self {
            key,
            sort_key,
            conversations: Vec::new(),
        }
    }

    fn sort_conversations(&mut self) {
        self.conversations.sort_by_key(|c| c.created_epoch_ms);
    }
}

/// Partition `conversations` into date buckets.
///
/// Buckets come out in first-seen order; each is sorted by timestamp.
pub fn group_by_date(
    conversations: impl IntoIterator<Item = Conversation>,
    bucketer: &DateBucketer,
) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    for conversation in conversations {
        let key = conversation.bucket_key(bucketer);
        match sections.iter_mut().find(|s| s.key == key) {
            Some(section) => section.conversations.push(conversation),
            None => {
                let mut section = Section::new(key, bucketer);
                section.conversations.push(conversation);
                sections.push(section);
            }
        }
    }
    for section in &mut sections {
        section.sort_conversations();
    }
    sections
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    sections: Vec<Section>,
}

impl Projection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a projection from grouped sections, ordering them by sort key.
    pub fn from_sections(mut sections: Vec<Section>) -> Self {
        sections.sort_by_key(|s| s.sort_key);
        Self { sections }
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// Total number of conversations across all sections.
    pub fn len(&self) -> usize {
        self.sections.iter().map(|s| s.conversations.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.iter().all(|s| s.conversations.is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Conversation> {
        self.sections.iter().flat_map(|s| s.conversations.iter())
    }

    /// `(section, row)` of the conversation matching `identity`.
    pub fn locate(&self, identity: &Identity) -> Option<(usize, usize)> {
        self.sections.iter().enumerate().find_map(|(s, section)| {
            section
                .conversations
                .iter()
                .position(|c| c.identity.matches(identity))
                .map(|row| (s, row))
        })
    }

    /// Add a conversation to its bucket, creating the bucket at its sorted
    /// position if needed.
    pub fn insert(&mut self, conversation: Conversation, bucketer: &DateBucketer) {
        let key = conversation.bucket_key(bucketer);
        if let Some(section) = self.sections.iter_mut().find(|s| s.key == key) {
            section.conversations.push(conversation);
            section.sort_conversations();
            return;
        }

        let mut section = Section::new(key, bucketer);
        section.conversations.push(conversation);
        let at = self.sections.partition_point(|s| s.sort_key <= section.sort_key);
        self.sections.insert(at, section);
    }

    /// Replace the conversation at `(section, row)`. A conversation whose
    /// bucket changed moves to its new section.
    pub fn replace(&mut self, at: (usize, usize), conversation: Conversation, bucketer: &DateBucketer) {
        let (s, row) = at;
        let Some(section) = self.sections.get_mut(s) else {
            self.insert(conversation, bucketer);
            return;
        };
        if row >= section.conversations.len() {
            self.insert(conversation, bucketer);
            return;
        }

        if section.key == conversation.bucket_key(bucketer) {
            section.conversations[row] = conversation;
            section.sort_conversations();
            return;
        }

        section.conversations.remove(row);
        if section.conversations.is_empty() {
            self.sections.remove(s);
        }
        self.insert(conversation, bucketer);
    }

    /// Re-establish the global section order.
    pub fn sort_sections(&mut self) {
        self.sections.sort_by_key(|s| s.sort_key);
    }

    pub fn clear(&mut self) {
        self.sections.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-03-05T10:30:00Z
    const MARCH_5_MS: i64 = 1_709_634_600_000;
    const DAY_MS: i64 = 86_400_000;

    fn conversation(id: &str, created_ms: i64) -> Conversation {
        Conversation::new(Identity::Confirmed(id.into()), "room".into(), id, created_ms)
    }

    fn keys(sections: &[Section]) -> Vec<&str> {
        sections.iter().map(|s| s.key.as_str()).collect()
    }

    #[test]
    fn empty_input_groups_to_nothing() {
        assert!(group_by_date(Vec::new(), &DateBucketer::utc()).is_empty());
    }

    #[test]
    fn groups_by_day_and_sorts_within() {
        let bucketer = DateBucketer::utc();
        let sections = group_by_date(
            vec![
                conversation("b", MARCH_5_MS + 60_000),
                conversation("next-day", MARCH_5_MS + DAY_MS),
                conversation("a", MARCH_5_MS),
            ],
            &bucketer,
        );
        assert_eq!(keys(&sections), vec!["5 Mar 2024", "6 Mar 2024"]);
        let first: Vec<_> = sections[0].conversations.iter().map(|c| c.body.as_str()).collect();
        assert_eq!(first, vec!["a", "b"]);
        assert_eq!(sections[0].sort_key, bucketer.sort_key("5 Mar 2024"));
    }

    #[test]
    fn equal_timestamps_keep_arrival_order() {
        let sections = group_by_date(
            vec![conversation("x", MARCH_5_MS), conversation("y", MARCH_5_MS)],
            &DateBucketer::utc(),
        );
        let bodies: Vec<_> = sections[0].conversations.iter().map(|c| c.body.as_str()).collect();
        assert_eq!(bodies, vec!["x", "y"]);
    }

    #[test]
    fn insert_places_new_sections_in_order() {
        let bucketer = DateBucketer::utc();
        let mut projection = Projection::new();
        projection.insert(conversation("late", MARCH_5_MS + 2 * DAY_MS), &bucketer);
        projection.insert(conversation("early", MARCH_5_MS), &bucketer);
        projection.insert(conversation("middle", MARCH_5_MS + DAY_MS), &bucketer);

        assert_eq!(keys(projection.sections()), vec!["5 Mar 2024", "6 Mar 2024", "7 Mar 2024"]);
        assert_eq!(projection.len(), 3);
        assert_eq!(projection.locate(&Identity::Confirmed("middle".into())), Some((1, 0)));
    }

    #[test]
    fn replace_moves_across_buckets() {
        let bucketer = DateBucketer::utc();
        let mut projection = Projection::new();
        projection.insert(conversation("a", MARCH_5_MS), &bucketer);
        projection.insert(conversation("b", MARCH_5_MS + DAY_MS), &bucketer);

        projection.replace((0, 0), conversation("a", MARCH_5_MS + DAY_MS + 1), &bucketer);
        assert_eq!(projection.section_count(), 1);
        assert_eq!(projection.locate(&Identity::Confirmed("a".into())), Some((0, 1)));
    }

    #[test]
    fn replace_resorts_section() {
        let bucketer = DateBucketer::utc();
        let mut projection = Projection::new();
        projection.insert(conversation("a", MARCH_5_MS), &bucketer);
        projection.insert(conversation("b", MARCH_5_MS + 1_000), &bucketer);

        projection.replace((0, 0), conversation("a", MARCH_5_MS + 2_000), &bucketer);
        assert_eq!(projection.locate(&Identity::Confirmed("a".into())), Some((0, 1)));
    }

    #[test]
    fn from_sections_orders_by_sort_key() {
        let bucketer = DateBucketer::utc();
        let sections = group_by_date(
            vec![
                conversation("late", MARCH_5_MS + DAY_MS),
                conversation("early", MARCH_5_MS),
            ],
            &bucketer,
        );
        assert_eq!(keys(&sections), vec!["6 Mar 2024", "5 Mar 2024"]);
        let projection = Projection::from_sections(sections);
        assert_eq!(keys(projection.sections()), vec!["5 Mar 2024", "6 Mar 2024"]);
    }
}
