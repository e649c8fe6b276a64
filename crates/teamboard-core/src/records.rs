//! Typed views of the documents the services read and write.
//!
//! Field names follow the stored camelCase layout. Where older documents used
//! a different name (`userId` for a board owner or task creator) the old name
//! is accepted on read.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use teamboard_shared::constants::CONVERSATION_FALLBACK_LABEL;
use teamboard_shared::{BoardId, ConversationId, MessageId, TargetId, TaskId, TaskStatus, UserId};
use teamboard_store::{Document, Fields};

use crate::error::{CoreError, Result};

/// Discoverable user profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: UserId,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub id: BoardId,
    pub name: String,
    #[serde(alias = "userId")]
    pub owner_id: UserId,
    #[serde(default)]
    pub members: Vec<UserId>,
    #[serde(default)]
    pub created_at: i64,
}

impl Board {
    pub fn is_owner(&self, user: &UserId) -> bool {
        &self.owner_id == user
    }

    /// The owner counts as a member even if a stale document lost them from
    /// `members`.
    pub fn is_member(&self, user: &UserId) -> bool {
        self.is_owner(user) || self.members.contains(user)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub text: String,
    pub status: TaskStatus,
    pub board_id: BoardId,
    #[serde(alias = "userId")]
    pub creator_id: UserId,
    /// Client clock, epoch millis.
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

/// Append-only note on a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    /// Keeps identical text from the same author at the same millisecond
    /// distinct under set-union append.
    #[serde(default)]
    pub id: String,
    pub text: String,
    #[serde(alias = "userId")]
    pub author_id: UserId,
    #[serde(alias = "userEmail", default)]
    pub author_email: String,
    #[serde(default)]
    pub created_at: i64,
}

/// Personal goal pinned to a calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarTarget {
    pub id: TargetId,
    pub text: String,
    /// Local `YYYY-MM-DD` day key.
    pub date: String,
    #[serde(alias = "userId")]
    pub owner_id: UserId,
    #[serde(default)]
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    pub participants: Vec<UserId>,
    #[serde(default)]
    pub participant_emails: BTreeMap<UserId, String>,
    #[serde(default)]
    pub participant_names: BTreeMap<UserId, String>,
    /// Server clock; absent on documents written before it existed.
    #[serde(default)]
    pub updated_at: Option<i64>,
}

impl Conversation {
    /// The participant that is not `me`.
    pub fn mate(&self, me: &UserId) -> Option<&UserId> {
        self.participants.iter().find(|p| *p != me)
    }

    /// How `me` sees the other participant: stored name, else email, else a
    /// generic label.
    pub fn mate_label(&self, me: &UserId) -> String {
        let Some(mate) = self.mate(me) else {
            return CONVERSATION_FALLBACK_LABEL.to_string();
        };
        [&self.participant_names, &self.participant_emails]
            .into_iter()
            .filter_map(|map| map.get(mate))
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .unwrap_or(CONVERSATION_FALLBACK_LABEL)
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    #[serde(rename = "fromUid")]
    pub sender_id: UserId,
    pub text: String,
    /// Server clock, epoch millis.
    #[serde(default)]
    pub created_at: i64,
}

/// Client clock in epoch millis, for `createdAt` fields that are not
/// ordering-sensitive.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Field map from a `json!` object literal. Anything but an object is
/// rejected rather than written as an empty document.
pub(crate) fn object(value: serde_json::Value) -> Result<Fields> {
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(CoreError::corrupt(
            "field map",
            format!("expected an object, got {other}"),
        )),
    }
}

/// Decode one document, reporting failures as [`CoreError::Corrupt`].
pub(crate) fn decode<T: DeserializeOwned>(doc: &Document, path: impl fmt::Display) -> Result<T> {
    doc.decode().map_err(|e| CoreError::corrupt(path, e))
}

/// Decode every document, skipping (and logging) the ones that do not fit.
pub(crate) fn decode_all<T: DeserializeOwned>(docs: &[Document], collection: &str) -> Vec<T> {
    docs.iter()
        .filter_map(|doc| match doc.decode() {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(collection, id = %doc.id, error = %e, "Skipping undecodable document");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, v: serde_json::Value) -> Document {
        Document {
            id: id.into(),
            fields: v.as_object().cloned().unwrap(),
        }
    }

    #[test]
    fn test_board_accepts_legacy_owner_field() {
        let board: Board = doc(
            "b1",
            json!({ "name": "Sprint", "userId": "u1", "members": ["u1"], "createdAt": 1 }),
        )
        .decode()
        .unwrap();
        assert_eq!(board.owner_id.as_str(), "u1");
        assert!(board.is_member(&UserId::from("u1")));
        assert!(!board.is_member(&UserId::from("u2")));
    }

    #[test]
    fn test_task_decodes_legacy_comment() {
        let task: Task = doc(
            "t1",
            json!({
                "text": "Write spec",
                "status": "done",
                "boardId": "b1",
                "userId": "u1",
                "createdAt": 5,
                "comments": [{ "text": "LGTM", "userId": "u2", "userEmail": "b@x.io", "createdAt": 6 }]
            }),
        )
        .decode()
        .unwrap();
        assert_eq!(task.status, TaskStatus::Done);
        assert_eq!(task.comments[0].author_id.as_str(), "u2");
        assert_eq!(task.comments[0].author_email, "b@x.io");
    }

    #[test]
    fn test_mate_label_fallbacks() {
        let me = UserId::from("a");
        let mut conv = Conversation {
            id: ConversationId::from("a_b"),
            participants: vec![UserId::from("a"), UserId::from("b")],
            participant_emails: BTreeMap::new(),
            participant_names: BTreeMap::new(),
            updated_at: None,
        };
        assert_eq!(conv.mate_label(&me), "Conversation");

        conv.participant_emails.insert(UserId::from("b"), "b@x.io".into());
        assert_eq!(conv.mate_label(&me), "b@x.io");

        conv.participant_names.insert(UserId::from("b"), "  ".into());
        assert_eq!(conv.mate_label(&me), "b@x.io");

        conv.participant_names.insert(UserId::from("b"), "Bob".into());
        assert_eq!(conv.mate_label(&me), "Bob");
    }

    #[test]
    fn test_non_object_fields_are_corrupt() {
        let fields = object(json!({ "status": "done" })).unwrap();
        assert_eq!(fields["status"], "done");

        for bad in [json!(null), json!("done"), json!(["a", "b"]), json!(3)] {
            let err = object(bad).unwrap_err();
            assert_eq!(err.kind(), crate::error::ErrorKind::Corrupt);
        }
    }

    #[test]
    fn test_decode_all_skips_bad_documents() {
        let docs = vec![
            doc("b1", json!({ "name": "ok", "ownerId": "u1" })),
            doc("b2", json!({ "name": "legacy", "members": 3, "userId": "u1" })),
        ];
        let boards: Vec<Board> = decode_all(&docs, "boards");
        assert_eq!(boards.len(), 1);
        assert_eq!(boards[0].id.as_str(), "b1");
    }
}
