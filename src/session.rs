//! Authentication state as seen by the journal, and the secret lifecycle of
//! an account: generated at sign-up, fetched at sign-in, dropped at sign-out.

use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::crypto;
use crate::error::AccountError;
use crate::store::{CHATS, DocumentStore, FieldValue, Fields, USERS};

/// The per-user secret that envelope keys are derived from.
///
/// Wiped from memory when the last clone is dropped, never printed.
#[derive(Clone)]
pub struct UserSecret(Arc<Zeroizing<String>>);

impl UserSecret {
    pub fn new(secret: Zeroizing<String>) -> Self {
        Self(Arc::new(secret))
    }

    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for UserSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UserSecret(<redacted>)")
    }
}

impl PartialEq for UserSecret {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthState {
    pub user_id: Option<String>,
    pub secret: Option<UserSecret>,
}

impl AuthState {
    /// Both a user and their secret are present.
    pub fn is_unlocked(&self) -> bool {
        self.user_id.is_some() && self.secret.is_some()
    }
}

/// Current auth state with change notification.
#[derive(Clone)]
pub struct Session {
    state: Arc<watch::Sender<AuthState>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(AuthState::default());
        Self {
            state: Arc::new(tx),
        }
    }

    pub fn current_user_id(&self) -> Option<String> {
        self.state.borrow().user_id.clone()
    }

    pub fn current_secret(&self) -> Option<UserSecret> {
        self.state.borrow().secret.clone()
    }

    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every sign-in and sign-out.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn sign_in(&self, user_id: &str, secret: UserSecret) {
        self.state.send_replace(AuthState {
            user_id: Some(user_id.to_string()),
            secret: Some(secret),
        });
    }

    pub fn sign_out(&self) {
        self.state.send_replace(AuthState::default());
    }
}

/// Secret storage in the users collection, tied to a [`Session`].
pub struct Accounts<S: DocumentStore> {
    store: Arc<S>,
    session: Session,
}

impl<S: DocumentStore> Accounts<S> {
    pub fn new(store: Arc<S>, session: Session) -> Self {
        Self { store, session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Registers `user_id`: generates their secret, writes the users record,
    /// creates the empty chat record and signs the session in.
    pub async fn sign_up(&self, user_id: &str, email: &str) -> Result<UserSecret, AccountError> {
        if self.store.get_by_id(USERS, user_id).await?.is_some() {
            return Err(AccountError::AlreadyRegistered(user_id.to_string()));
        }

        let secret = UserSecret::new(crypto::generate_user_secret()?);
        let now = Utc::now();

        let user = Fields::from([
            ("email".to_string(), FieldValue::from(email)),
            ("encryptionKey".to_string(), FieldValue::from(secret.expose())),
            ("createdAt".to_string(), now.into()),
            ("lastLogin".to_string(), now.into()),
        ]);
        self.store.put(USERS, user_id, user).await?;

        if self.store.get_by_id(CHATS, user_id).await?.is_none() {
            let placeholder = Fields::from([
                ("userId".to_string(), FieldValue::from(user_id)),
                ("encryptedData".to_string(), FieldValue::from("")),
                ("salt".to_string(), FieldValue::from("")),
                ("iv".to_string(), FieldValue::from("")),
                ("createdAt".to_string(), now.into()),
                ("updatedAt".to_string(), now.into()),
            ]);
            self.store.put(CHATS, user_id, placeholder).await?;
        }

        info!(user_id, "account created");
        self.session.sign_in(user_id, secret.clone());
        Ok(secret)
    }

    /// Fetches the stored secret for `user_id` and signs the session in.
    pub async fn sign_in(&self, user_id: &str) -> Result<UserSecret, AccountError> {
        let Some(user) = self.store.get_by_id(USERS, user_id).await? else {
            warn!(user_id, "no users record");
            return Err(AccountError::SecretMissing(user_id.to_string()));
        };

        let secret = match user.text("encryptionKey") {
            Some(key) if !key.is_empty() => UserSecret::new(Zeroizing::new(key.to_string())),
            _ => {
                warn!(user_id, "users record has no encryption key");
                return Err(AccountError::SecretMissing(user_id.to_string()));
            }
        };

        let last_login = Fields::from([("lastLogin".to_string(), FieldValue::from(Utc::now()))]);
        self.store.update(USERS, user_id, last_login).await?;

        info!(user_id, "signed in");
        self.session.sign_in(user_id, secret.clone());
        Ok(secret)
    }

    pub fn sign_out(&self) {
        if let Some(user_id) = self.session.current_user_id() {
            info!(user_id = %user_id, "signed out");
        }
        self.session.sign_out();
    }
}
