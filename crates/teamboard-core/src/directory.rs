//! Identity Directory: one profile document per user so teammates can be
//! found by email.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use teamboard_shared::constants::{UNKNOWN_EMAIL, USERS};
use teamboard_shared::identity::normalize_email;
use teamboard_shared::{Identity, UserId};
use teamboard_store::{CollectionPath, DocumentStore, Filter, SetMode};

use crate::error::Result;
use crate::records::{decode, object, Profile};

/// Stored profile layout. Older documents may lack `uid`, in which case the
/// document id is the user id.
#[derive(Deserialize)]
struct ProfileDoc {
    id: String,
    uid: Option<UserId>,
    #[serde(default)]
    email: String,
}

impl From<ProfileDoc> for Profile {
    fn from(doc: ProfileDoc) -> Self {
        Profile {
            user_id: doc.uid.unwrap_or_else(|| UserId::new(doc.id)),
            email: doc.email,
        }
    }
}

/// A board member as shown in the board header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Teammate {
    pub user_id: UserId,
    pub email: String,
}

pub struct Directory<S> {
    store: Arc<S>,
    users: CollectionPath,
}

impl<S> Clone for Directory<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            users: self.users.clone(),
        }
    }
}

impl<S: DocumentStore> Directory<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            users: CollectionPath::new(USERS),
        }
    }

    /// Record `identity` as discoverable. Merges, so fields other writers
    /// added to the profile are kept.
    pub async fn upsert_profile(&self, identity: &Identity) -> Result<()> {
        let fields = object(json!({
            "uid": identity.user_id,
            "email": normalize_email(&identity.email),
        }))?;
        self.store
            .set_document(&self.users.doc(identity.user_id.as_str()), fields, SetMode::Merge)
            .await?;
        debug!(user_id = %identity.user_id, "Profile upserted");
        Ok(())
    }

    /// Look a profile up by email, case- and whitespace-insensitively.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<Profile>> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Ok(None);
        }
        let docs = self
            .store
            .query(&self.users, &Filter::eq("email", email.as_str()))
            .await?;
        let Some(doc) = docs.first() else {
            return Ok(None);
        };
        Ok(Some(decode::<ProfileDoc>(doc, self.users.doc(&doc.id))?.into()))
    }

    pub async fn get_profile(&self, user_id: &UserId) -> Result<Option<Profile>> {
        let path = self.users.doc(user_id.as_str());
        match self.store.get_document(&path).await? {
            Some(doc) => Ok(Some(decode::<ProfileDoc>(&doc, &path)?.into())),
            None => Ok(None),
        }
    }

    /// Resolve member ids to emails, in member order. A member whose profile
    /// is missing or unreadable is shown as `(unknown)`.
    pub async fn teammates(&self, member_ids: &[UserId]) -> Vec<Teammate> {
        let mut out = Vec::with_capacity(member_ids.len());
        for user_id in member_ids {
            let email = match self.get_profile(user_id).await {
                Ok(Some(profile)) if !profile.email.is_empty() => profile.email,
                Ok(_) => UNKNOWN_EMAIL.to_string(),
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "Could not resolve teammate");
                    UNKNOWN_EMAIL.to_string()
                }
            };
            out.push(Teammate {
                user_id: user_id.clone(),
                email,
            });
        }
        out
    }
}
