#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use teamboard_core::Teamboard;
use teamboard_shared::Identity;
use teamboard_store::{
    CollectionPath, DocPath, Document, DocumentStore, Fields, Filter, MemoryStore, Result, SetMode,
    StoreError, Subscription,
};

/// A [`MemoryStore`] that can be told to start failing.
pub struct FailingStore {
    inner: MemoryStore,
    deletes_left: AtomicUsize,
    creates_down: AtomicBool,
}

impl FailingStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            deletes_left: AtomicUsize::new(usize::MAX),
            creates_down: AtomicBool::new(false),
        }
    }

    /// Let `n` more deletes through, then fail every delete after that.
    pub fn fail_deletes_after(&self, n: usize) {
        self.deletes_left.store(n, Ordering::SeqCst);
    }

    pub fn heal_deletes(&self) {
        self.deletes_left.store(usize::MAX, Ordering::SeqCst);
    }

    pub fn set_creates_down(&self, down: bool) {
        self.creates_down.store(down, Ordering::SeqCst);
    }

    fn take_delete(&self) -> Result<()> {
        let left = self.deletes_left.load(Ordering::SeqCst);
        if left == 0 {
            return Err(StoreError::Unavailable("injected delete failure".into()));
        }
        if left != usize::MAX {
            self.deletes_left.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FailingStore {
    async fn subscribe(&self, collection: &CollectionPath, filter: Filter) -> Result<Subscription> {
        self.inner.subscribe(collection, filter).await
    }

    async fn create_document(&self, collection: &CollectionPath, fields: Fields) -> Result<String> {
        if self.creates_down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected create failure".into()));
        }
        self.inner.create_document(collection, fields).await
    }

    async fn set_document(&self, path: &DocPath, fields: Fields, mode: SetMode) -> Result<()> {
        self.inner.set_document(path, fields, mode).await
    }

    async fn update_document(&self, path: &DocPath, partial: Fields) -> Result<()> {
        self.inner.update_document(path, partial).await
    }

    async fn append_to_array(&self, path: &DocPath, field: &str, element: Value) -> Result<()> {
        self.inner.append_to_array(path, field, element).await
    }

    async fn remove_from_array(&self, path: &DocPath, field: &str, element: Value) -> Result<()> {
        self.inner.remove_from_array(path, field, element).await
    }

    async fn delete_document(&self, path: &DocPath) -> Result<()> {
        self.take_delete()?;
        self.inner.delete_document(path).await
    }

    async fn get_document(&self, path: &DocPath) -> Result<Option<Document>> {
        self.inner.get_document(path).await
    }

    async fn query(&self, collection: &CollectionPath, filter: &Filter) -> Result<Vec<Document>> {
        self.inner.query(collection, filter).await
    }

    fn active_subscriptions(&self) -> usize {
        self.inner.active_subscriptions()
    }
}

pub fn alice() -> Identity {
    Identity::new("alice-uid", "alice@x.io")
}

pub fn bob() -> Identity {
    Identity::new("bob-uid", "bob@x.io")
}

/// Register every identity in the directory so they can be found by email.
pub async fn register<S: DocumentStore>(app: &Teamboard<S>, people: &[&Identity]) {
    for identity in people {
        app.directory.upsert_profile(identity).await.unwrap();
    }
}

pub fn failing_app() -> (Arc<FailingStore>, Teamboard<FailingStore>) {
    let store = Arc::new(FailingStore::new());
    let app = Teamboard::new(store.clone());
    (store, app)
}
