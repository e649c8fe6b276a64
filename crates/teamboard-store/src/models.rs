//! Addressing and document types shared by every backend.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field map of a document. Always a JSON object at the top level.
pub type Fields = serde_json::Map<String, Value>;

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// Slash-separated collection path, e.g. `boards` or `chats/<id>/messages`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Address a document inside this collection.
    pub fn doc(&self, id: impl Into<String>) -> DocPath {
        DocPath {
            collection: self.clone(),
            id: id.into(),
        }
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Address of a single document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocPath {
    pub collection: CollectionPath,
    pub id: String,
}

impl DocPath {
    /// A sub-collection nested under this document.
    pub fn sub_collection(&self, name: &str) -> CollectionPath {
        CollectionPath(format!("{}/{}/{}", self.collection, self.id, name))
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

/// A stored document: its id within the collection plus its fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Deserialize the document into a typed record. The document id is
    /// injected as an `id` field so records can carry it.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        let mut fields = self.fields.clone();
        fields.insert("id".to_string(), Value::String(self.id.clone()));
        serde_json::from_value(Value::Object(fields))
    }
}

/// One delivery of a live query: the complete matching document set at the
/// store's write sequence `sequence`.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub documents: Vec<Document>,
    pub sequence: u64,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// How [`set_document`](crate::DocumentStore::set_document) treats an existing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetMode {
    /// Replace every field.
    Replace,
    /// Deep-merge the supplied fields; fields not supplied are kept.
    Merge,
}

/// Serialize a record into a field map, dropping a top-level `id` if the
/// record carries one (the id lives in the path, not in the fields).
pub fn to_fields<T: Serialize>(record: &T) -> Result<Fields, serde_json::Error> {
    match serde_json::to_value(record)? {
        Value::Object(mut map) => {
            map.remove("id");
            Ok(map)
        }
        other => Err(serde::ser::Error::custom(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Board {
        id: String,
        name: String,
    }

    #[test]
    fn test_doc_paths() {
        let chats = CollectionPath::new("chats");
        let chat = chats.doc("a_b");
        assert_eq!(chat.to_string(), "chats/a_b");
        assert_eq!(chat.sub_collection("messages").as_str(), "chats/a_b/messages");
    }

    #[test]
    fn test_decode_injects_id() {
        let doc = Document {
            id: "b1".into(),
            fields: json!({ "name": "Sprint 1" }).as_object().cloned().unwrap(),
        };
        let board: Board = doc.decode().unwrap();
        assert_eq!(
            board,
            Board {
                id: "b1".into(),
                name: "Sprint 1".into()
            }
        );
    }

    #[test]
    fn test_to_fields_strips_id() {
        let fields = to_fields(&Board {
            id: "b1".into(),
            name: "x".into(),
        })
        .unwrap();
        assert!(!fields.contains_key("id"));
        assert_eq!(fields["name"], "x");
    }

    #[test]
    fn test_to_fields_rejects_non_objects() {
        assert!(to_fields(&42).is_err());
    }
}
