//! Identity Provider boundary and an in-process provider.
//!
//! Credential checks belong to the provider. The core only needs the
//! resulting [`Identity`] and keeps the Identity Directory in sync with it on
//! every successful authentication.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::info;

use teamboard_shared::constants::MIN_PASSWORD_LEN;
use teamboard_shared::identity::parse_email;
use teamboard_shared::{Identity, UserId};
use teamboard_store::DocumentStore;

use crate::directory::Directory;
use crate::error::{AuthError, Result};

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> std::result::Result<Identity, AuthError>;

    async fn sign_in(&self, email: &str, password: &str) -> std::result::Result<Identity, AuthError>;

    async fn sign_out(&self);

    /// Current identity now and after every sign-in or sign-out.
    fn identity_changes(&self) -> watch::Receiver<Option<Identity>>;
}

struct Account {
    user_id: UserId,
    salt: [u8; 16],
    hash: blake3::Hash,
}

fn hash_password(salt: &[u8; 16], password: &str) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize()
}

/// Accounts held in memory, keyed by normalized email. Passwords are kept
/// only as salted BLAKE3 digests.
pub struct MemoryIdentityProvider {
    accounts: RwLock<HashMap<String, Account>>,
    current: watch::Sender<Option<Identity>>,
}

impl Default for MemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self {
            accounts: RwLock::new(HashMap::new()),
            current,
        }
    }

    fn set_current(&self, identity: Option<Identity>) {
        self.current.send_replace(identity);
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn sign_up(&self, email: &str, password: &str) -> std::result::Result<Identity, AuthError> {
        let email = parse_email(email).map_err(|_| AuthError::InvalidEmail(email.trim().to_string()))?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword {
                min: MIN_PASSWORD_LEN,
            });
        }

        let identity = {
            let mut accounts = self
                .accounts
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if accounts.contains_key(&email) {
                return Err(AuthError::EmailInUse(email));
            }
            let salt: [u8; 16] = rand::random();
            let user_id = UserId::new(hex::encode(rand::random::<[u8; 14]>()));
            accounts.insert(
                email.clone(),
                Account {
                    user_id: user_id.clone(),
                    salt,
                    hash: hash_password(&salt, password),
                },
            );
            Identity::new(user_id, &email)
        };

        info!(user_id = %identity.user_id, "Account created");
        self.set_current(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_in(&self, email: &str, password: &str) -> std::result::Result<Identity, AuthError> {
        let email = parse_email(email).map_err(|_| AuthError::InvalidCredentials)?;
        let identity = {
            let accounts = self
                .accounts
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let account = accounts.get(&email).ok_or(AuthError::InvalidCredentials)?;
            // blake3::Hash equality is constant-time.
            if hash_password(&account.salt, password) != account.hash {
                return Err(AuthError::InvalidCredentials);
            }
            Identity::new(account.user_id.clone(), &email)
        };

        info!(user_id = %identity.user_id, "Signed in");
        self.set_current(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) {
        self.set_current(None);
    }

    fn identity_changes(&self) -> watch::Receiver<Option<Identity>> {
        self.current.subscribe()
    }
}

/// Authenticates through a provider and keeps the caller's profile in the
/// Identity Directory up to date.
pub struct Session<P: ?Sized, S> {
    provider: Arc<P>,
    directory: Directory<S>,
}

impl<P: IdentityProvider + ?Sized, S: DocumentStore> Session<P, S> {
    pub fn new(provider: Arc<P>, directory: Directory<S>) -> Self {
        Self { provider, directory }
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Identity> {
        let identity = self.provider.sign_up(email, password).await?;
        self.directory.upsert_profile(&identity).await?;
        Ok(identity)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
        let identity = self.provider.sign_in(email, password).await?;
        self.directory.upsert_profile(&identity).await?;
        Ok(identity)
    }

    pub async fn sign_out(&self) {
        self.provider.sign_out().await;
    }

    pub fn identity_changes(&self) -> watch::Receiver<Option<Identity>> {
        self.provider.identity_changes()
    }
}
