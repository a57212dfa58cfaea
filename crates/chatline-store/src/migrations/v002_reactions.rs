use rusqlite::Connection;

const UP_SQL: &str = r#"
-- One active reaction per member per conversation
CREATE TABLE IF NOT EXISTS reactions (
    conversation_id TEXT NOT NULL,             -- server id, FK -> conversations(server_id)
    member_id       TEXT NOT NULL,             -- FK -> members(id)
    reaction        TEXT NOT NULL,             -- emoji character(s)
    created_at_ms   INTEGER NOT NULL,

    PRIMARY KEY (conversation_id, member_id),
    FOREIGN KEY (conversation_id) REFERENCES conversations(server_id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_reactions_conversation ON reactions(conversation_id);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
