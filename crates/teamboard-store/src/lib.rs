//! # teamboard-store
//!
//! The document database behind Teamboard. A [`DocumentStore`] holds
//! collections of JSON documents addressed by path, applies writes with
//! last-write-wins semantics plus atomic array primitives, and serves live
//! queries as streams of full snapshots.
//!
//! Two backends are provided: [`MemoryStore`] for tests and single-process
//! hosting, and the SQLite-backed [`Database`] for persistence.

pub mod database;
pub mod fields;
pub mod filter;
pub mod memory;
pub mod migrations;
pub mod models;
pub mod store;
pub mod subscription;

mod documents;
mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use fields::server_timestamp;
pub use filter::Filter;
pub use memory::MemoryStore;
pub use models::*;
pub use store::DocumentStore;
pub use subscription::{SnapshotStream, Subscription};
