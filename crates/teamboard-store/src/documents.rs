//! Row-level helpers for the `documents` and `store_meta` tables.
//!
//! Everything here takes a plain [`Connection`] so it can run inside the
//! transaction opened by [`Database`](crate::Database) for each write.

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::error::Result;
use crate::models::{CollectionPath, Document, Fields};

const META_SEQUENCE: &str = "sequence";
const META_CLOCK: &str = "clock";

// ------------------------------------------------------------------
// Read
// ------------------------------------------------------------------

/// Fetch the fields of one document.
pub(crate) fn load(conn: &Connection, collection: &CollectionPath, id: &str) -> Result<Option<Fields>> {
    let fields = conn
        .query_row(
            "SELECT fields FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection.as_str(), id],
            |row| parse_fields(row, 0),
        )
        .optional()?;
    Ok(fields)
}

/// Every document of a collection, ordered by id.
pub(crate) fn list(conn: &Connection, collection: &CollectionPath) -> Result<Vec<Document>> {
    let mut stmt = conn.prepare(
        "SELECT id, fields
         FROM documents
         WHERE collection = ?1
         ORDER BY id ASC",
    )?;

    let rows = stmt.query_map(params![collection.as_str()], row_to_document)?;

    let mut documents = Vec::new();
    for row in rows {
        documents.push(row?);
    }
    Ok(documents)
}

// ------------------------------------------------------------------
// Write
// ------------------------------------------------------------------

/// Insert or overwrite a document.
pub(crate) fn upsert(
    conn: &Connection,
    collection: &CollectionPath,
    id: &str,
    fields: &Fields,
    sequence: u64,
    updated_at: i64,
) -> Result<()> {
    let json = serde_json::to_string(fields)?;
    conn.execute(
        "INSERT INTO documents (collection, id, fields, seq, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (collection, id) DO UPDATE SET
             fields = excluded.fields,
             seq = excluded.seq,
             updated_at = excluded.updated_at",
        params![collection.as_str(), id, json, sequence as i64, updated_at],
    )?;
    Ok(())
}

/// Delete a document. Returns `true` if a row was deleted.
pub(crate) fn delete(conn: &Connection, collection: &CollectionPath, id: &str) -> Result<bool> {
    let affected = conn.execute(
        "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
        params![collection.as_str(), id],
    )?;
    Ok(affected > 0)
}

// ------------------------------------------------------------------
// Store metadata
// ------------------------------------------------------------------

/// Last committed write sequence (0 for a fresh database).
pub(crate) fn sequence(conn: &Connection) -> Result<u64> {
    Ok(meta(conn, META_SEQUENCE)?.max(0) as u64)
}

/// Last timestamp handed out by the server clock.
pub(crate) fn clock(conn: &Connection) -> Result<i64> {
    meta(conn, META_CLOCK)
}

/// Persist the sequence and clock after a committed write.
pub(crate) fn record_write(conn: &Connection, sequence: u64, clock: i64) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO store_meta (key, value) VALUES (?1, ?2)
         ON CONFLICT (key) DO UPDATE SET value = excluded.value",
    )?;
    stmt.execute(params![META_SEQUENCE, sequence as i64])?;
    stmt.execute(params![META_CLOCK, clock])?;
    Ok(())
}

fn meta(conn: &Connection, key: &str) -> Result<i64> {
    let value = conn
        .query_row(
            "SELECT value FROM store_meta WHERE key = ?1",
            params![key],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(value.unwrap_or(0))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Document`].
fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
    let id: String = row.get(0)?;
    let fields = parse_fields(row, 1)?;
    Ok(Document { id, fields })
}

fn parse_fields(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Fields> {
    let raw: String = row.get(idx)?;
    let value: Value = serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(rusqlite::Error::InvalidColumnType(
            idx,
            "fields".to_string(),
            rusqlite::types::Type::Text,
        )),
    }
}
