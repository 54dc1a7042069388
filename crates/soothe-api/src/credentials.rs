//! Process-wide credential storage.
//!
//! The store holds the single access/refresh token pair for the session and
//! makes presence changes observable, so the realtime layer can react to
//! login and logout without polling. Persistence (keychain, secure storage)
//! is an external collaborator; the core never writes tokens to disk.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// The current access/refresh token pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    pub access_token: String,
    /// Absent for sessions authenticated through a flow that does not issue
    /// refresh tokens; such sessions cannot be renewed and fail closed.
    pub refresh_token: Option<String>,
}

impl CredentialPair {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
        }
    }
}

/// Token payload returned by the login and refresh endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl From<TokenGrant> for CredentialPair {
    fn from(grant: TokenGrant) -> Self {
        Self {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
        }
    }
}

/// Shared handle to the session credentials.
///
/// Cloning is cheap; all clones observe the same underlying pair. Readers
/// always see the latest value at the moment of use, so a token rotated by
/// a refresh is picked up by the next request without coordination.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    tx: watch::Sender<Option<CredentialPair>>,
}

impl CredentialStore {
    /// Creates an empty (logged-out) store.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Creates a store pre-populated with an existing pair, e.g. restored
    /// from the platform keychain by the embedding shell.
    pub fn with_pair(pair: CredentialPair) -> Self {
        let (tx, _) = watch::channel(Some(pair));
        Self { tx }
    }

    pub fn get(&self) -> Option<CredentialPair> {
        self.tx.borrow().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.tx.borrow().as_ref().map(|p| p.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.tx.borrow().as_ref().and_then(|p| p.refresh_token.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Replaces the stored pair; set on login and on refresh success.
    pub fn set(&self, pair: CredentialPair) {
        self.tx.send_replace(Some(pair));
    }

    /// Clears the stored pair; called on logout and on irrecoverable
    /// refresh failure. Observers are only notified if a pair was present.
    pub fn clear(&self) {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                *current = None;
                true
            } else {
                false
            }
        });
    }

    /// Subscribes to credential changes. The receiver yields the current
    /// value immediately and on every subsequent set/clear.
    pub fn subscribe(&self) -> watch::Receiver<Option<CredentialPair>> {
        self.tx.subscribe()
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}
