//! v001 -- Initial schema creation.
//!
//! Creates the three core tables: `members`, `chatrooms` and
//! `conversations`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Members
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS members (
    id        TEXT PRIMARY KEY NOT NULL,
    name      TEXT NOT NULL,
    image_url TEXT,
    title     TEXT
);

-- ----------------------------------------------------------------
-- Chatrooms
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chatrooms (
    id                        TEXT PRIMARY KEY NOT NULL,
    title                     TEXT NOT NULL,
    member_id                 TEXT,                       -- creator, FK -> members(id)
    created_epoch_ms          INTEGER NOT NULL,
    community_id              TEXT,
    deleted_by                TEXT,
    total_response_count      INTEGER NOT NULL DEFAULT 0,
    last_seen_conversation_id TEXT,
    unseen_count              INTEGER NOT NULL DEFAULT 0,
    is_conversation_stored    INTEGER NOT NULL DEFAULT 0, -- boolean 0/1
    topic_id                  TEXT,
    follow_status             INTEGER NOT NULL DEFAULT 0,
    muted                     INTEGER NOT NULL DEFAULT 0,
    is_secret                 INTEGER NOT NULL DEFAULT 0,
    participant_count         INTEGER NOT NULL DEFAULT 0
);

-- ----------------------------------------------------------------
-- Conversations
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS conversations (
    local_id            INTEGER PRIMARY KEY AUTOINCREMENT,
    server_id           TEXT UNIQUE,                 -- NULL while pending
    temporary_id        TEXT UNIQUE,                 -- NULL for remote conversations
    chatroom_id         TEXT NOT NULL,               -- FK -> chatrooms(id)
    member_id           TEXT,                        -- author, FK -> members(id)
    body                TEXT NOT NULL,
    created_epoch_ms    INTEGER NOT NULL,
    attachments_json    TEXT NOT NULL DEFAULT '[]',
    reply_to_id         TEXT,
    is_edited           INTEGER NOT NULL DEFAULT 0,
    deleted_by_id       TEXT,                        -- FK -> members(id)
    attachment_count    INTEGER NOT NULL DEFAULT 0,
    attachment_uploaded INTEGER NOT NULL DEFAULT 0,
    og_tags_json        TEXT,
    state               TEXT NOT NULL DEFAULT 'normal',
    delivery            TEXT NOT NULL DEFAULT 'sent',

    CHECK (server_id IS NOT NULL OR temporary_id IS NOT NULL),
    FOREIGN KEY (chatroom_id) REFERENCES chatrooms(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_conversations_chatroom_ts
    ON conversations(chatroom_id, created_epoch_ms, local_id);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
