//! Local convenience cache.
//!
//! Per-device navigation state: the last dashboard view, recently opened
//! boards, a navigation history and the last conversation each user had
//! open. None of it is authoritative. Anything absent or unreadable reads
//! as the default, and failed writes are logged and otherwise ignored.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use teamboard_shared::constants::{DEFAULT_HISTORY_LIMIT, DEFAULT_RECENT_LIMIT};
use teamboard_shared::{BoardId, ConversationId, UserId};

use crate::config::ClientConfig;
use crate::records::now_millis;

const LAST_VIEW_KEY: &str = "lastDashboardParams";
const RECENT_KEY: &str = "recentItems";
const HISTORY_KEY: &str = "historyItems";

/// String key-value storage local to one device.
pub trait LocalCache: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: String) -> io::Result<()>;

    fn remove(&self, key: &str) -> io::Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalCache for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> io::Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.remove(key);
        Ok(())
    }
}

/// A cache backed by one JSON object on disk, rewritten on every change.
#[derive(Debug)]
pub struct FileCache {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileCache {
    /// Load the cache at `path`. A missing file starts empty, and so does a
    /// file that does not hold a JSON object of strings.
    pub fn open(path: &Path) -> io::Result<Self> {
        let entries = match std::fs::read(path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Discarding unreadable local cache");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e),
        };
        debug!(path = %path.display(), entries = entries.len(), "Local cache loaded");

        Ok(Self {
            path: path.to_path_buf(),
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the file atomically: write a sibling temp file, then move it
    /// over the old one.
    fn persist(&self, entries: &BTreeMap<String, String>) -> io::Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let bytes = serde_json::to_vec_pretty(entries)?;
        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(&bytes)?;
        file.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl LocalCache for FileCache {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> io::Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.insert(key.to_string(), value);
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }
}

/// The dashboard views a user can land on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    #[default]
    Boards,
    Summary,
    Calendar,
    TaskManager,
    AllTasks,
    Chat,
}

impl View {
    pub const ALL: [View; 6] = [
        View::Boards,
        View::Summary,
        View::Calendar,
        View::TaskManager,
        View::AllTasks,
        View::Chat,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            View::Boards => "boards",
            View::Summary => "summary",
            View::Calendar => "calendar",
            View::TaskManager => "taskmanager",
            View::AllTasks => "alltasks",
            View::Chat => "chat",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            View::Boards => "Boards",
            View::Summary => "Summary",
            View::Calendar => "Calendar",
            View::TaskManager => "Task Manager",
            View::AllTasks => "All Tasks",
            View::Chat => "Chat",
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for View {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        View::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| format!("unknown view: {s}"))
    }
}

/// Where the dashboard was last left.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LastView {
    pub view: View,
    pub board_id: Option<BoardId>,
}

impl LastView {
    /// Encoded as query parameters, e.g. `view=taskmanager&boardId=b1`.
    fn encode(&self) -> String {
        match &self.board_id {
            Some(board) => format!("view={}&boardId={}", self.view, board),
            None => format!("view={}", self.view),
        }
    }

    fn decode(params: &str) -> Result<Self, String> {
        let mut last = LastView::default();
        for pair in params.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            match key {
                "view" => last.view = value.parse()?,
                "boardId" if !value.is_empty() => last.board_id = Some(BoardId::from(value)),
                _ => {}
            }
        }
        Ok(last)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Board,
    View,
}

/// One entry of the recent or history list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// The conversation a user last had open, with the friend fields they had
/// typed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastChat {
    #[serde(default)]
    pub chat_id: Option<ConversationId>,
    #[serde(default)]
    pub friend_email: String,
    #[serde(default)]
    pub friend_name: String,
}

pub struct Preferences<C> {
    cache: C,
    recent_limit: usize,
    history_limit: usize,
}

impl<C: LocalCache> Preferences<C> {
    pub fn new(cache: C) -> Self {
        Self::with_limits(cache, DEFAULT_RECENT_LIMIT, DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_limits(cache: C, recent_limit: usize, history_limit: usize) -> Self {
        Self {
            cache,
            recent_limit,
            history_limit,
        }
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn last_view(&self) -> LastView {
        let Some(raw) = self.cache.get(LAST_VIEW_KEY) else {
            return LastView::default();
        };
        LastView::decode(&raw).unwrap_or_else(|e| {
            warn!(key = LAST_VIEW_KEY, error = %e, "Ignoring stored view");
            LastView::default()
        })
    }

    pub fn set_last_view(&self, last: &LastView) {
        self.write(LAST_VIEW_KEY, last.encode());
    }

    /// Recently opened boards, most recent first.
    pub fn recent(&self) -> Vec<NavItem> {
        self.read_json(RECENT_KEY).unwrap_or_default()
    }

    /// Navigation history, most recent first.
    pub fn history(&self) -> Vec<NavItem> {
        self.read_json(HISTORY_KEY).unwrap_or_default()
    }

    /// Record that `board` was opened: it moves to the front of both lists.
    pub fn visit_board(&self, board: &BoardId, name: &str) {
        let item = NavItem {
            id: board.to_string(),
            kind: ItemKind::Board,
            name: name.to_string(),
            timestamp: Some(now_millis()),
        };
        self.push_recent(item.clone());
        self.push_history(item);
        self.set_last_view(&LastView {
            view: View::TaskManager,
            board_id: Some(board.clone()),
        });
    }

    /// Record a switch to `view`.
    pub fn visit_view(&self, view: View) {
        self.push_history(NavItem {
            id: view.as_str().to_string(),
            kind: ItemKind::View,
            name: view.title().to_string(),
            timestamp: None,
        });
        self.set_last_view(&LastView {
            view,
            board_id: None,
        });
    }

    fn push_recent(&self, item: NavItem) {
        let mut items = self.recent();
        items.retain(|i| i.id != item.id);
        items.insert(0, item);
        items.truncate(self.recent_limit);
        self.write_json(RECENT_KEY, &items);
    }

    fn push_history(&self, item: NavItem) {
        let mut items = self.history();
        items.retain(|i| !(i.id == item.id && i.kind == item.kind));
        items.insert(0, item);
        items.truncate(self.history_limit);
        self.write_json(HISTORY_KEY, &items);
    }

    pub fn last_chat(&self, user: &UserId) -> Option<LastChat> {
        self.read_json(&last_chat_key(user))
    }

    pub fn set_last_chat(&self, user: &UserId, chat: &LastChat) {
        self.write_json(&last_chat_key(user), chat);
    }

    pub fn clear_last_chat(&self, user: &UserId) {
        let key = last_chat_key(user);
        if let Err(e) = self.cache.remove(&key) {
            warn!(%key, error = %e, "Failed to clear local cache entry");
        }
    }

    fn read_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.cache.get(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(%key, error = %e, "Ignoring corrupt local cache entry");
                None
            }
        }
    }

    fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        match serde_json::to_string(value) {
            Ok(raw) => self.write(key, raw),
            Err(e) => warn!(%key, error = %e, "Failed to encode local cache entry"),
        }
    }

    fn write(&self, key: &str, raw: String) {
        if let Err(e) = self.cache.set(key, raw) {
            warn!(%key, error = %e, "Failed to write local cache entry");
        }
    }
}

impl Preferences<FileCache> {
    /// Preferences kept in the cache file named by `config`.
    pub fn open(config: &ClientConfig) -> io::Result<Self> {
        let cache = FileCache::open(&config.cache_path)?;
        Ok(Self::with_limits(cache, config.recent_limit, config.history_limit))
    }
}

fn last_chat_key(user: &UserId) -> String {
    format!("chat:last:{user}")
}
