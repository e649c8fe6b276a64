//! SQLite-backed document store.
//!
//! The [`Database`] struct owns a [`rusqlite::Connection`] and guarantees that
//! migrations are run before any other operation. Each write runs in its own
//! transaction under the connection lock, which is what makes the array
//! primitives atomic.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use directories::ProjectDirs;
use rusqlite::Connection;
use serde_json::Value;
use uuid::Uuid;

use teamboard_shared::constants::DEFAULT_SNAPSHOT_CAPACITY;

use crate::documents;
use crate::error::{Result, StoreError};
use crate::fields::{self, ServerClock};
use crate::filter::Filter;
use crate::migrations;
use crate::models::{CollectionPath, DocPath, Document, Fields, SetMode, Snapshot};
use crate::store::DocumentStore;
use crate::subscription::{ChangeFeed, Subscription};

struct DbState {
    conn: Connection,
    sequence: u64,
    clock: ServerClock,
}

struct DbInner {
    state: Mutex<DbState>,
    feed: ChangeFeed,
    path: Option<PathBuf>,
}

impl DbInner {
    fn lock(&self) -> Result<MutexGuard<'_, DbState>> {
        self.state.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn snapshot(&self, collection: &CollectionPath, filter: &Filter) -> Result<Snapshot> {
        let state = self.lock()?;
        let documents = documents::list(&state.conn, collection)?
            .into_iter()
            .filter(|doc| filter.matches(&doc.fields))
            .collect();
        Ok(Snapshot {
            documents,
            sequence: state.sequence,
        })
    }
}

/// Persistent [`DocumentStore`]. Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DbInner>,
}

impl Database {
    /// Open (or create) the default application database.
    ///
    /// The database file is placed in the platform-appropriate data directory:
    /// - Linux:   `~/.local/share/teamboard/teamboard.db`
    /// - macOS:   `~/Library/Application Support/com.teamboard.teamboard/teamboard.db`
    /// - Windows: `{FOLDERID_RoamingAppData}\teamboard\teamboard\data\teamboard.db`
    pub fn new() -> Result<Self> {
        let project_dirs =
            ProjectDirs::from("com", "teamboard", "teamboard").ok_or(StoreError::NoDataDir)?;

        let data_dir = project_dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;

        Self::open_at(&data_dir.join("teamboard.db"))
    }

    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        Self::open_with_capacity(path, DEFAULT_SNAPSHOT_CAPACITY)
    }

    /// Like [`open_at`](Self::open_at), with `capacity` buffered change
    /// notices per collection.
    pub fn open_with_capacity(path: &Path, capacity: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %path.display(), "opening database");

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::from_connection(conn, Some(path.to_path_buf()), capacity)
    }

    /// A throwaway database that lives only as long as this handle.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, None, DEFAULT_SNAPSHOT_CAPACITY)
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>, capacity: usize) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run_migrations(&conn)?;

        let sequence = documents::sequence(&conn)?;
        let clock = ServerClock::starting_after(documents::clock(&conn)?);

        Ok(Self {
            inner: Arc::new(DbInner {
                state: Mutex::new(DbState {
                    conn,
                    sequence,
                    clock,
                }),
                feed: ChangeFeed::new(capacity),
                path,
            }),
        })
    }

    /// Filesystem path of the open database, `None` when in memory.
    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    /// Run one write in a transaction, then announce it.
    ///
    /// `apply` gets the transaction, the sequence this write will commit at,
    /// and the server timestamp. It reports whether anything changed; an
    /// unchanged write is rolled back and not announced.
    fn write<T>(
        &self,
        collection: &CollectionPath,
        apply: impl FnOnce(&Connection, u64, i64) -> Result<(T, bool)>,
    ) -> Result<T> {
        let (sequence, out) = {
            let mut guard = self.inner.lock()?;
            let state = &mut *guard;
            let now = state.clock.stamp();
            let next = state.sequence + 1;

            let tx = state.conn.transaction()?;
            let (out, changed) = apply(&tx, next, now)?;
            if !changed {
                return Ok(out);
            }
            documents::record_write(&tx, next, now)?;
            tx.commit()?;

            state.sequence = next;
            (next, out)
        };
        tracing::debug!(collection = %collection, sequence, "Write committed");
        self.inner.feed.publish(collection, sequence);
        Ok(out)
    }

    /// Load, modify and store an existing document.
    fn modify(
        &self,
        path: &DocPath,
        change: impl FnOnce(&mut Fields, i64) -> Result<bool>,
    ) -> Result<()> {
        self.write(&path.collection, |conn, sequence, now| {
            let mut existing = documents::load(conn, &path.collection, &path.id)?
                .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
            if !change(&mut existing, now)? {
                return Ok(((), false));
            }
            documents::upsert(conn, &path.collection, &path.id, &existing, sequence, now)?;
            Ok(((), true))
        })
    }
}

#[async_trait]
impl DocumentStore for Database {
    async fn subscribe(&self, collection: &CollectionPath, filter: Filter) -> Result<Subscription> {
        let inner = self.inner.clone();
        let coll = collection.clone();
        Ok(self
            .inner
            .feed
            .subscribe(collection, move || inner.snapshot(&coll, &filter)))
    }

    async fn create_document(&self, collection: &CollectionPath, mut data: Fields) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.write(collection, |conn, sequence, now| {
            fields::resolve_server_timestamps(&mut data, now);
            documents::upsert(conn, collection, &id, &data, sequence, now)?;
            Ok(((), true))
        })?;
        Ok(id)
    }

    async fn set_document(&self, path: &DocPath, mut data: Fields, mode: SetMode) -> Result<()> {
        self.write(&path.collection, |conn, sequence, now| {
            let mut stored = match mode {
                SetMode::Merge => match documents::load(conn, &path.collection, &path.id)? {
                    Some(mut existing) => {
                        fields::deep_merge(&mut existing, data);
                        existing
                    }
                    None => data,
                },
                SetMode::Replace => data,
            };
            fields::resolve_server_timestamps(&mut stored, now);
            documents::upsert(conn, &path.collection, &path.id, &stored, sequence, now)?;
            Ok(((), true))
        })
    }

    async fn update_document(&self, path: &DocPath, mut partial: Fields) -> Result<()> {
        self.modify(path, |existing, now| {
            fields::resolve_server_timestamps(&mut partial, now);
            existing.extend(partial);
            Ok(true)
        })
    }

    async fn append_to_array(&self, path: &DocPath, field: &str, element: Value) -> Result<()> {
        self.modify(path, |existing, _| {
            fields::array_union(existing, path, field, element)
        })
    }

    async fn remove_from_array(&self, path: &DocPath, field: &str, element: Value) -> Result<()> {
        self.modify(path, |existing, _| {
            fields::array_remove(existing, path, field, &element)
        })
    }

    async fn delete_document(&self, path: &DocPath) -> Result<()> {
        self.write(&path.collection, |conn, _, _| {
            let removed = documents::delete(conn, &path.collection, &path.id)?;
            Ok(((), removed))
        })
    }

    async fn get_document(&self, path: &DocPath) -> Result<Option<Document>> {
        let state = self.inner.lock()?;
        Ok(documents::load(&state.conn, &path.collection, &path.id)?.map(|fields| Document {
            id: path.id.clone(),
            fields,
        }))
    }

    async fn query(&self, collection: &CollectionPath, filter: &Filter) -> Result<Vec<Document>> {
        Ok(self.inner.snapshot(collection, filter)?.documents)
    }

    fn active_subscriptions(&self) -> usize {
        self.inner.feed.active()
    }
}
