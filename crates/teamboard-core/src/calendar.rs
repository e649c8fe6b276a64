//! Personal calendar targets.

use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::json;
use tracing::info;

use teamboard_shared::calendar::day_key;
use teamboard_shared::constants::CALENDAR_TARGETS;
use teamboard_shared::{Identity, TargetId};
use teamboard_store::{CollectionPath, DocPath, DocumentStore, Filter};

use crate::error::{CoreError, Result};
use crate::live::Live;
use crate::policy::require_target_owner;
use crate::records::{decode, now_millis, object, CalendarTarget};

pub struct CalendarStore<S> {
    store: Arc<S>,
    targets: CollectionPath,
}

impl<S> Clone for CalendarStore<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            targets: self.targets.clone(),
        }
    }
}

impl<S: DocumentStore> CalendarStore<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            targets: CollectionPath::new(CALENDAR_TARGETS),
        }
    }

    fn path(&self, id: &TargetId) -> DocPath {
        self.targets.doc(id.as_str())
    }

    /// Fetch a target, `None` if it does not exist.
    async fn find(&self, id: &TargetId) -> Result<Option<CalendarTarget>> {
        let path = self.path(id);
        match self.store.get_document(&path).await? {
            Some(doc) => Ok(Some(decode(&doc, &path)?)),
            None => Ok(None),
        }
    }

    pub async fn get_target(&self, id: &TargetId) -> Result<CalendarTarget> {
        self.find(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("calendar target {id}")))
    }

    /// Pin a target to the local calendar day `date`.
    pub async fn create_target(
        &self,
        actor: &Identity,
        date: NaiveDate,
        text: &str,
    ) -> Result<CalendarTarget> {
        let text = non_empty(text)?;
        let key = day_key(date);
        let created_at = now_millis();
        let id = self
            .store
            .create_document(
                &self.targets,
                object(json!({
                    "text": text,
                    "date": key,
                    "ownerId": actor.user_id,
                    "createdAt": created_at,
                }))?,
            )
            .await?;

        info!(target_id = %id, date = %key, "Calendar target created");
        Ok(CalendarTarget {
            id: TargetId::new(id),
            text,
            date: key,
            owner_id: actor.user_id.clone(),
            created_at,
        })
    }

    /// Change the text of one of `actor`'s targets. The date never moves.
    pub async fn edit_target(&self, actor: &Identity, id: &TargetId, text: &str) -> Result<()> {
        let text = non_empty(text)?;
        let target = self.get_target(id).await?;
        require_target_owner(&target, actor)?;

        self.store
            .update_document(&self.path(id), object(json!({ "text": text }))?)
            .await?;
        info!(target_id = %id, "Calendar target edited");
        Ok(())
    }

    /// Delete one of `actor`'s targets. A target that is already gone is not
    /// an error.
    pub async fn delete_target(&self, actor: &Identity, id: &TargetId) -> Result<()> {
        let Some(target) = self.find(id).await? else {
            return Ok(());
        };
        require_target_owner(&target, actor)?;

        self.store.delete_document(&self.path(id)).await?;
        info!(target_id = %id, "Calendar target deleted");
        Ok(())
    }

    /// Live list of `actor`'s targets, by day then creation.
    pub async fn subscribe_targets(&self, actor: &Identity) -> Result<Live<CalendarTarget>> {
        let sub = self
            .store
            .subscribe(&self.targets, Filter::eq("ownerId", actor.user_id.as_str()))
            .await?;
        Ok(Live::new(sub).ordered(|a, b| {
            a.date
                .cmp(&b.date)
                .then(a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        }))
    }
}

fn non_empty(text: &str) -> Result<String> {
    let text = text.trim();
    if text.is_empty() {
        return Err(CoreError::validation("Target text cannot be empty"));
    }
    Ok(text.to_string())
}
