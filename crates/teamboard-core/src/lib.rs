//! Collaborative task boards with realtime sync.
//!
//! Every service here is a thin layer over a [`DocumentStore`]: writes go
//! straight to the store, and live views are store subscriptions that
//! re-deliver the full result set whenever anything matching changes.

pub mod aggregate;
pub mod auth;
pub mod boards;
pub mod calendar;
pub mod chat;
pub mod config;
pub mod directory;
pub mod dnd;
pub mod error;
pub mod live;
pub mod policy;
pub mod prefs;
pub mod records;
pub mod tasks;

use std::sync::Arc;

use tracing_subscriber::{fmt, EnvFilter};

use teamboard_shared::Identity;
use teamboard_store::{Database, DocumentStore, MemoryStore};

pub use crate::auth::{IdentityProvider, MemoryIdentityProvider, Session};
pub use crate::boards::BoardStore;
pub use crate::calendar::CalendarStore;
pub use crate::chat::{ChatService, ChatSession, ChatState};
pub use crate::config::ClientConfig;
pub use crate::directory::Directory;
pub use crate::dnd::{DragReconciler, DragState, DropOutcome, StatusSink};
pub use crate::error::{AuthError, CoreError, ErrorKind, Result};
pub use crate::live::{Live, SummaryStream};
pub use crate::prefs::{FileCache, LocalCache, MemoryCache, Preferences};
pub use crate::records::{Board, CalendarTarget, Comment, Conversation, Message, Profile, Task};
pub use crate::tasks::TaskStore;

/// Install a `fmt` subscriber honoring `RUST_LOG`.
///
/// Safe to call more than once; only the first call installs anything.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("teamboard_core=debug,teamboard_store=info,warn"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

/// All services over one shared store.
pub struct Teamboard<S> {
    store: Arc<S>,
    pub directory: Directory<S>,
    pub boards: BoardStore<S>,
    pub tasks: TaskStore<S>,
    pub calendar: CalendarStore<S>,
    pub chat: ChatService<S>,
}

impl<S> Clone for Teamboard<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            directory: self.directory.clone(),
            boards: self.boards.clone(),
            tasks: self.tasks.clone(),
            calendar: self.calendar.clone(),
            chat: self.chat.clone(),
        }
    }
}

impl<S: DocumentStore> Teamboard<S> {
    pub fn new(store: Arc<S>) -> Self {
        let directory = Directory::new(store.clone());
        Self {
            boards: BoardStore::new(store.clone(), directory.clone()),
            tasks: TaskStore::new(store.clone()),
            calendar: CalendarStore::new(store.clone()),
            chat: ChatService::new(store.clone(), directory.clone()),
            directory,
            store,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// An authentication session that records profiles in this directory.
    pub fn session<P: IdentityProvider + ?Sized>(&self, provider: Arc<P>) -> Session<P, S> {
        Session::new(provider, self.directory.clone())
    }

    /// A chat view for `actor` with nothing selected.
    pub fn chat_session(&self, actor: Identity) -> ChatSession<S> {
        ChatSession::new(self.chat.clone(), actor)
    }

    /// Live summary of `actor`'s boards and the tasks they created.
    pub async fn summary_feed(&self, actor: &Identity) -> Result<SummaryStream> {
        let boards = self.boards.subscribe_boards(actor).await?;
        let tasks = self.tasks.subscribe_created_by(actor).await?;
        Ok(live::summary_feed(boards, tasks))
    }

    /// Subscriptions currently open against the store.
    pub fn active_subscriptions(&self) -> usize {
        self.store.active_subscriptions()
    }
}

impl Teamboard<MemoryStore> {
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }
}

impl Teamboard<Database> {
    /// Open the SQLite database named by `config`.
    pub fn open(config: &ClientConfig) -> Result<Self> {
        let db = Database::open_with_capacity(&config.db_path, config.snapshot_capacity)?;
        tracing::info!(path = %config.db_path.display(), "Teamboard opened");
        Ok(Self::new(Arc::new(db)))
    }
}
