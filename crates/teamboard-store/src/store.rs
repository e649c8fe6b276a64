//! The document-database trait every backend implements.

use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;
use crate::filter::Filter;
use crate::models::{CollectionPath, DocPath, Document, Fields, SetMode};
use crate::subscription::Subscription;

/// The storage boundary the application core is written against.
///
/// Concurrency control is last-write-wins per document, except for the array
/// primitives which apply atomically under the backend's write lock so two
/// concurrent appends never lose one another.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Open a live query over `collection` restricted by `filter`.
    async fn subscribe(&self, collection: &CollectionPath, filter: Filter) -> Result<Subscription>;

    /// Insert a new document with a store-generated id and return that id.
    async fn create_document(&self, collection: &CollectionPath, fields: Fields) -> Result<String>;

    /// Upsert a document at a caller-chosen id.
    async fn set_document(&self, path: &DocPath, fields: Fields, mode: SetMode) -> Result<()>;

    /// Set the supplied top-level fields on an existing document.
    ///
    /// Fails with [`StoreError::NotFound`](crate::StoreError::NotFound) when
    /// the document does not exist.
    async fn update_document(&self, path: &DocPath, partial: Fields) -> Result<()>;

    /// Atomically add `element` to the array `field` unless an equal element
    /// is already present.
    async fn append_to_array(&self, path: &DocPath, field: &str, element: Value) -> Result<()>;

    /// Atomically remove every element equal to `element` from `field`.
    async fn remove_from_array(&self, path: &DocPath, field: &str, element: Value) -> Result<()>;

    /// Delete a document. Deleting a missing document succeeds.
    async fn delete_document(&self, path: &DocPath) -> Result<()>;

    /// One-shot read of a single document.
    async fn get_document(&self, path: &DocPath) -> Result<Option<Document>>;

    /// One-shot read of every matching document.
    async fn query(&self, collection: &CollectionPath, filter: &Filter) -> Result<Vec<Document>>;

    /// Number of live subscriptions not yet cancelled.
    fn active_subscriptions(&self) -> usize;
}

#[async_trait::async_trait]
impl<S: DocumentStore + ?Sized> DocumentStore for Arc<S> {
    async fn subscribe(&self, collection: &CollectionPath, filter: Filter) -> Result<Subscription> {
        (**self).subscribe(collection, filter).await
    }

    async fn create_document(&self, collection: &CollectionPath, fields: Fields) -> Result<String> {
        (**self).create_document(collection, fields).await
    }

    async fn set_document(&self, path: &DocPath, fields: Fields, mode: SetMode) -> Result<()> {
        (**self).set_document(path, fields, mode).await
    }

    async fn update_document(&self, path: &DocPath, partial: Fields) -> Result<()> {
        (**self).update_document(path, partial).await
    }

    async fn append_to_array(&self, path: &DocPath, field: &str, element: Value) -> Result<()> {
        (**self).append_to_array(path, field, element).await
    }

    async fn remove_from_array(&self, path: &DocPath, field: &str, element: Value) -> Result<()> {
        (**self).remove_from_array(path, field, element).await
    }

    async fn delete_document(&self, path: &DocPath) -> Result<()> {
        (**self).delete_document(path).await
    }

    async fn get_document(&self, path: &DocPath) -> Result<Option<Document>> {
        (**self).get_document(path).await
    }

    async fn query(&self, collection: &CollectionPath, filter: &Filter) -> Result<Vec<Document>> {
        (**self).query(collection, filter).await
    }

    fn active_subscriptions(&self) -> usize {
        (**self).active_subscriptions()
    }
}
