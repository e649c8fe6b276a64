//! In-memory document store.
//!
//! Suitable for tests and for a single process hosting every client. All
//! clones of a [`MemoryStore`] share one state, so two "clients" holding
//! clones observe each other's writes through their subscriptions.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use teamboard_shared::constants::DEFAULT_SNAPSHOT_CAPACITY;

use crate::error::{Result, StoreError};
use crate::fields::{self, ServerClock};
use crate::filter::Filter;
use crate::models::{CollectionPath, DocPath, Document, Fields, SetMode, Snapshot};
use crate::store::DocumentStore;
use crate::subscription::{ChangeFeed, Subscription};

#[derive(Default)]
struct State {
    collections: HashMap<CollectionPath, BTreeMap<String, Fields>>,
    sequence: u64,
    clock: ServerClock,
}

impl State {
    fn snapshot(&self, collection: &CollectionPath, filter: &Filter) -> Snapshot {
        let documents = self
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, fields)| filter.matches(fields))
                    .map(|(id, fields)| Document {
                        id: id.clone(),
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Snapshot {
            documents,
            sequence: self.sequence,
        }
    }
}

struct Inner {
    state: RwLock<State>,
    feed: ChangeFeed,
}

/// Process-local [`DocumentStore`].
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SNAPSHOT_CAPACITY)
    }

    /// `capacity` bounds the queued change notices per collection.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(State::default()),
                feed: ChangeFeed::new(capacity),
            }),
        }
    }

    /// Number of documents currently stored in `collection`.
    pub fn len(&self, collection: &CollectionPath) -> usize {
        self.inner
            .state
            .read()
            .map(|s| s.collections.get(collection).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }

    /// Apply one write under the state lock, then announce it.
    ///
    /// `apply` receives the collection's documents and the server timestamp
    /// for this write, and reports whether anything changed.
    fn write<T>(
        &self,
        collection: &CollectionPath,
        apply: impl FnOnce(&mut BTreeMap<String, Fields>, i64) -> Result<(T, bool)>,
    ) -> Result<T> {
        let (sequence, out) = {
            let mut state = self.inner.state.write().map_err(|_| StoreError::LockPoisoned)?;
            let now = state.clock.stamp();
            let docs = state.collections.entry(collection.clone()).or_default();
            let (out, changed) = apply(docs, now)?;
            if !changed {
                return Ok(out);
            }
            state.sequence += 1;
            (state.sequence, out)
        };
        debug!(collection = %collection, sequence, "Write committed");
        self.inner.feed.publish(collection, sequence);
        Ok(out)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn subscribe(&self, collection: &CollectionPath, filter: Filter) -> Result<Subscription> {
        let inner = self.inner.clone();
        let coll = collection.clone();
        Ok(self.inner.feed.subscribe(collection, move || {
            let state = inner.state.read().map_err(|_| StoreError::LockPoisoned)?;
            Ok(state.snapshot(&coll, &filter))
        }))
    }

    async fn create_document(&self, collection: &CollectionPath, mut data: Fields) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let doc_id = id.clone();
        self.write(collection, move |docs, now| {
            fields::resolve_server_timestamps(&mut data, now);
            docs.insert(doc_id, data);
            Ok(((), true))
        })?;
        Ok(id)
    }

    async fn set_document(&self, path: &DocPath, mut data: Fields, mode: SetMode) -> Result<()> {
        let id = path.id.clone();
        self.write(&path.collection, move |docs, now| {
            if matches!(mode, SetMode::Merge) {
                if let Some(existing) = docs.get_mut(&id) {
                    fields::deep_merge(existing, data);
                    fields::resolve_server_timestamps(existing, now);
                    return Ok(((), true));
                }
            }
            fields::resolve_server_timestamps(&mut data, now);
            docs.insert(id, data);
            Ok(((), true))
        })
    }

    async fn update_document(&self, path: &DocPath, mut partial: Fields) -> Result<()> {
        let shown = path.to_string();
        self.write(&path.collection, |docs, now| {
            let existing = docs.get_mut(&path.id).ok_or(StoreError::NotFound(shown))?;
            fields::resolve_server_timestamps(&mut partial, now);
            for (key, value) in partial {
                existing.insert(key, value);
            }
            Ok(((), true))
        })
    }

    async fn append_to_array(&self, path: &DocPath, field: &str, element: Value) -> Result<()> {
        self.write(&path.collection, |docs, _| {
            let existing = docs
                .get_mut(&path.id)
                .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
            let changed = fields::array_union(existing, path, field, element)?;
            Ok(((), changed))
        })
    }

    async fn remove_from_array(&self, path: &DocPath, field: &str, element: Value) -> Result<()> {
        self.write(&path.collection, |docs, _| {
            let existing = docs
                .get_mut(&path.id)
                .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
            let changed = fields::array_remove(existing, path, field, &element)?;
            Ok(((), changed))
        })
    }

    async fn delete_document(&self, path: &DocPath) -> Result<()> {
        self.write(&path.collection, |docs, _| {
            let removed = docs.remove(&path.id).is_some();
            Ok(((), removed))
        })
    }

    async fn get_document(&self, path: &DocPath) -> Result<Option<Document>> {
        let state = self.inner.state.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(state
            .collections
            .get(&path.collection)
            .and_then(|docs| docs.get(&path.id))
            .map(|fields| Document {
                id: path.id.clone(),
                fields: fields.clone(),
            }))
    }

    async fn query(&self, collection: &CollectionPath, filter: &Filter) -> Result<Vec<Document>> {
        let state = self.inner.state.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(state.snapshot(collection, filter).documents)
    }

    fn active_subscriptions(&self) -> usize {
        self.inner.feed.active()
    }
}
