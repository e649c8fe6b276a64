//! Chat Subsystem: 1:1 conversations between teammates.
//!
//! A conversation's id is derived from the sorted participant pair, so either
//! side connecting again lands on the same document. Messages live in a
//! `messages` sub-collection and take their `createdAt` from the store clock,
//! which keeps ordering authoritative even when client clocks disagree.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use teamboard_shared::constants::{CHATS, MESSAGES};
use teamboard_shared::identity::normalize_email;
use teamboard_shared::{ConversationId, Identity, MessageId, UserId};
use teamboard_store::{server_timestamp, CollectionPath, DocPath, DocumentStore, Filter, SetMode, StoreError};

use crate::directory::Directory;
use crate::error::{CoreError, Result};
use crate::live::Live;
use crate::records::{decode, object, Conversation, Message};

/// Shown as the actor's own name when they have no email on record.
const SELF_NAME_FALLBACK: &str = "Me";

pub struct ChatService<S> {
    store: Arc<S>,
    directory: Directory<S>,
    chats: CollectionPath,
}

impl<S> Clone for ChatService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            directory: self.directory.clone(),
            chats: self.chats.clone(),
        }
    }
}

impl<S: DocumentStore> ChatService<S> {
    pub fn new(store: Arc<S>, directory: Directory<S>) -> Self {
        Self {
            store,
            directory,
            chats: CollectionPath::new(CHATS),
        }
    }

    fn path(&self, id: &ConversationId) -> DocPath {
        self.chats.doc(id.as_str())
    }

    fn messages(&self, id: &ConversationId) -> CollectionPath {
        self.path(id).sub_collection(MESSAGES)
    }

    pub async fn get_conversation(&self, id: &ConversationId) -> Result<Option<Conversation>> {
        let path = self.path(id);
        match self.store.get_document(&path).await? {
            Some(doc) => Ok(Some(decode(&doc, &path)?)),
            None => Ok(None),
        }
    }

    async fn require_participant(&self, actor: &Identity, id: &ConversationId) -> Result<Conversation> {
        let conversation = self
            .get_conversation(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("conversation {id}")))?;
        if !conversation.participants.contains(&actor.user_id) {
            return Err(CoreError::Unauthorized(
                "only participants can use this conversation".into(),
            ));
        }
        Ok(conversation)
    }

    /// Open (or reopen) the conversation between `actor` and the user
    /// registered as `friend_email`.
    ///
    /// Metadata is merged: the other participant's stored name is only
    /// replaced when `friend_name` is given, and the actor's own name is only
    /// set if none is stored yet.
    pub async fn connect(
        &self,
        actor: &Identity,
        friend_email: &str,
        friend_name: &str,
    ) -> Result<ConversationId> {
        let email = normalize_email(friend_email);
        if email.is_empty() {
            return Err(CoreError::validation("Enter your teammate's email"));
        }
        let friend = self
            .directory
            .find_by_email(&email)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("no user with email {email}")))?;
        if friend.user_id == actor.user_id {
            return Err(CoreError::validation("You cannot start a chat with yourself"));
        }

        let id = ConversationId::between(&actor.user_id, &friend.user_id);
        let existing = self.get_conversation(&id).await?;
        let has_name = |user: &UserId| {
            existing
                .as_ref()
                .and_then(|c| c.participant_names.get(user))
                .is_some_and(|n| !n.trim().is_empty())
        };

        let mut names = Map::new();
        if !has_name(&actor.user_id) {
            let own = if actor.email.is_empty() {
                SELF_NAME_FALLBACK.to_string()
            } else {
                actor.email.clone()
            };
            names.insert(actor.user_id.to_string(), Value::String(own));
        }
        let friend_name = friend_name.trim();
        if !friend_name.is_empty() {
            names.insert(friend.user_id.to_string(), Value::String(friend_name.to_string()));
        }

        let mut fields = object(json!({
            "participants": ConversationId::sorted_pair(&actor.user_id, &friend.user_id),
            "participantEmails": {
                actor.user_id.as_str(): normalize_email(&actor.email),
                friend.user_id.as_str(): email,
            },
            "updatedAt": server_timestamp(),
        }))?;
        if !names.is_empty() {
            fields.insert("participantNames".into(), Value::Object(names));
        }

        self.store
            .set_document(&self.path(&id), fields, SetMode::Merge)
            .await?;
        info!(conversation_id = %id, "Conversation connected");
        Ok(id)
    }

    /// Live conversations `actor` takes part in, most recently active first.
    pub async fn subscribe_conversations(&self, actor: &Identity) -> Result<Live<Conversation>> {
        let sub = self
            .store
            .subscribe(
                &self.chats,
                Filter::array_contains("participants", actor.user_id.as_str()),
            )
            .await?;
        Ok(Live::new(sub).ordered(|a, b| {
            b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id))
        }))
    }

    /// Live messages of a conversation, oldest first. Messages with the same
    /// timestamp are ordered by id so every re-subscription renders alike.
    pub async fn subscribe_messages(&self, id: &ConversationId) -> Result<Live<Message>> {
        let sub = self.store.subscribe(&self.messages(id), Filter::All).await?;
        Ok(Live::new(sub).ordered(|a, b| {
            a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id))
        }))
    }

    /// Append a message. Its timestamp is assigned by the store.
    pub async fn send_message(&self, actor: &Identity, id: &ConversationId, text: &str) -> Result<MessageId> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CoreError::validation("Message cannot be empty"));
        }
        self.require_participant(actor, id).await?;

        let message_id = self
            .store
            .create_document(
                &self.messages(id),
                object(json!({
                    "fromUid": actor.user_id,
                    "text": text,
                    "createdAt": server_timestamp(),
                }))?,
            )
            .await?;
        debug!(conversation_id = %id, message_id = %message_id, "Message sent");

        // Only affects list ordering; the message itself is already stored.
        if let Err(e) = self
            .store
            .set_document(
                &self.path(id),
                object(json!({ "updatedAt": server_timestamp() }))?,
                SetMode::Merge,
            )
            .await
        {
            warn!(conversation_id = %id, error = %e, "Could not bump conversation activity");
        }

        Ok(MessageId::new(message_id))
    }

    /// Delete every message, then the conversation itself.
    ///
    /// The store has no cascading delete, so this is a series of single
    /// deletes. If it stops after deleting something, the error is
    /// [`CoreError::Incomplete`] and calling again finishes the job.
    pub async fn delete_conversation(&self, actor: &Identity, id: &ConversationId) -> Result<()> {
        if self.get_conversation(id).await?.is_some() {
            self.require_participant(actor, id).await?;
        }

        let messages_path = self.messages(id);
        let messages = self.store.query(&messages_path, &Filter::All).await?;

        let mut completed = 0;
        for message in &messages {
            if let Err(e) = self.store.delete_document(&messages_path.doc(&message.id)).await {
                let left = messages.len() - completed;
                return Err(self.incomplete(id, completed, left, e));
            }
            completed += 1;
        }

        if let Err(e) = self.store.delete_document(&self.path(id)).await {
            return Err(self.incomplete(id, completed, 0, e));
        }

        info!(conversation_id = %id, messages = completed, "Conversation deleted");
        Ok(())
    }

    fn incomplete(&self, id: &ConversationId, completed: usize, messages_left: usize, source: StoreError) -> CoreError {
        if completed == 0 {
            return CoreError::from(source);
        }
        warn!(conversation_id = %id, completed, messages_left, error = %source, "Conversation deletion stopped part-way");
        let record = self.path(id);
        let remaining = if messages_left > 0 {
            format!("{messages_left} message(s) and {record}")
        } else {
            record.to_string()
        };
        CoreError::Incomplete {
            operation: "delete conversation",
            completed,
            remaining,
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatState {
    Idle,
    ConversationSelected(ConversationId),
}

/// One user's chat panel: which conversation is open, its live messages,
/// and the unsent draft.
///
/// Selecting another conversation, deselecting, or deleting the open one
/// cancels the message subscription. The draft survives failed sends.
pub struct ChatSession<S> {
    chat: ChatService<S>,
    actor: Identity,
    open: Option<(ConversationId, Live<Message>)>,
    messages: Vec<Message>,
    draft: String,
}

impl<S: DocumentStore> ChatSession<S> {
    pub fn new(chat: ChatService<S>, actor: Identity) -> Self {
        Self {
            chat,
            actor,
            open: None,
            messages: Vec::new(),
            draft: String::new(),
        }
    }

    pub fn state(&self) -> ChatState {
        match &self.open {
            Some((id, _)) => ChatState::ConversationSelected(id.clone()),
            None => ChatState::Idle,
        }
    }

    pub fn selected(&self) -> Option<&ConversationId> {
        self.open.as_ref().map(|(id, _)| id)
    }

    pub async fn select(&mut self, id: &ConversationId) -> Result<()> {
        let live = self.chat.subscribe_messages(id).await?;
        // Replacing drops (and so cancels) the previous subscription.
        self.open = Some((id.clone(), live));
        self.messages.clear();
        Ok(())
    }

    pub fn deselect(&mut self) {
        self.open = None;
        self.messages.clear();
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    /// Messages from the latest delivery.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Wait for the open conversation's next message list. `None` when
    /// nothing is selected or the store shut down.
    pub async fn next_messages(&mut self) -> Option<Result<&[Message]>> {
        let (_, live) = self.open.as_mut()?;
        match live.next_records().await? {
            Ok(messages) => {
                self.messages = messages;
                Some(Ok(&self.messages))
            }
            Err(e) => Some(Err(e)),
        }
    }

    /// Send the draft to the open conversation. The draft is cleared only
    /// once the store accepted the message.
    pub async fn send_draft(&mut self) -> Result<MessageId> {
        let Some(id) = self.selected().cloned() else {
            return Err(CoreError::validation("Select a conversation first"));
        };
        let sent = self.chat.send_message(&self.actor, &id, &self.draft).await?;
        self.draft.clear();
        Ok(sent)
    }

    /// Delete the open conversation and return to `Idle`. On failure the
    /// conversation stays selected so the caller can retry.
    pub async fn delete_selected(&mut self) -> Result<()> {
        let Some(id) = self.selected().cloned() else {
            return Err(CoreError::validation("Select a conversation first"));
        };
        self.chat.delete_conversation(&self.actor, &id).await?;
        self.deselect();
        Ok(())
    }
}
