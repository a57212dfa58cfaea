use chatline_shared::{Member, MemberId};
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Insert or refresh a member record.
    pub fn upsert_member(&self, member: &Member) -> Result<()> {
        self.conn().execute(
            "INSERT INTO members (id, name, image_url, title)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                image_url = excluded.image_url,
                title = excluded.title",
            params![member.id.as_str(), member.name, member.image_url, member.title],
        )?;
        Ok(())
    }

    pub fn get_member(&self, id: &MemberId) -> Result<Option<Member>> {
        let member = self
            .conn()
            .query_row(
                "SELECT id, name, image_url, title FROM members WHERE id = ?1",
                params![id.as_str()],
                |row| {
                    Ok(Member {
                        id: MemberId(row.get(0)?),
                        name: row.get(1)?,
                        image_url: row.get(2)?,
                        title: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(member)
    }
}

/// Build a member from four nullable columns starting at `start`.
pub(crate) fn member_columns(row: &rusqlite::Row<'_>, start: usize) -> rusqlite::Result<Option<Member>> {
    let id: Option<String> = row.get(start)?;
    let Some(id) = id else {
        return Ok(None);
    };
    Ok(Some(Member {
        id: MemberId(id),
        name: row.get::<_, Option<String>>(start + 1)?.unwrap_or_default(),
        image_url: row.get(start + 2)?,
        title: row.get(start + 3)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_overwrites_name() {
        let db = Database::open_in_memory().unwrap();
        let mut alice = Member::new("alice", "Alice");
        db.upsert_member(&alice).unwrap();
        alice.name = "Alice B.".into();
        db.upsert_member(&alice).unwrap();

        let loaded = db.get_member(&"alice".into()).unwrap().unwrap();
        assert_eq!(loaded.name, "Alice B.");
        assert!(db.get_member(&"nobody".into()).unwrap().is_none());
    }
}
