/// Collection holding one profile document per user, keyed by user id
pub const USERS: &str = "users";

/// Collection of boards
pub const BOARDS: &str = "boards";

/// Collection of tasks (board reference, not containment)
pub const TASKS: &str = "tasks";

/// Collection of per-user calendar targets
pub const CALENDAR_TARGETS: &str = "calendarTargets";

/// Collection of 1:1 conversations
pub const CHATS: &str = "chats";

/// Message sub-collection under each conversation
pub const MESSAGES: &str = "messages";

/// Joins the two sorted participant ids of a conversation
pub const CONVERSATION_ID_SEPARATOR: &str = "_";

/// Literal a board owner must re-type to delete a board (case-insensitive)
pub const DELETE_CONFIRMATION: &str = "delete";

/// Shown for a board member whose profile cannot be resolved
pub const UNKNOWN_EMAIL: &str = "(unknown)";

/// Fallback label for a conversation with no stored name or email
pub const CONVERSATION_FALLBACK_LABEL: &str = "Conversation";

/// Minimum accepted password length at sign-up
pub const MIN_PASSWORD_LEN: usize = 6;

/// Recent boards kept in the local cache
pub const DEFAULT_RECENT_LIMIT: usize = 10;

/// History entries kept in the local cache
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Buffered change notices per collection before a subscriber resyncs
pub const DEFAULT_SNAPSHOT_CAPACITY: usize = 256;
