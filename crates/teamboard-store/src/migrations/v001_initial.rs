//! v001 -- Initial schema creation.
//!
//! One generic `documents` table addressed by `(collection, id)`, plus a
//! small key/value table holding the write sequence and server clock.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Documents
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,                 -- e.g. "boards", "chats/a_b/messages"
    id         TEXT NOT NULL,
    fields     TEXT NOT NULL,                 -- JSON object
    seq        INTEGER NOT NULL,              -- write sequence of the last change
    updated_at INTEGER NOT NULL,              -- server clock, epoch millis

    PRIMARY KEY (collection, id)
);

CREATE INDEX IF NOT EXISTS idx_documents_seq
    ON documents(collection, seq);

-- ----------------------------------------------------------------
-- Store metadata
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS store_meta (
    key   TEXT PRIMARY KEY NOT NULL,
    value INTEGER NOT NULL
);
"#;

/// Apply the initial schema.
pub fn up(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(UP_SQL)
}
