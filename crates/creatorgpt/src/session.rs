//! Explicit session context.
//!
//! A [`Session`] owns the connection to an [`IdentityProvider`] for the
//! lifetime of one client. Components that need the current user receive the
//! session (or the user id read from it) instead of reaching for global state.
//!
//! ```rust
//! use std::sync::Arc;
//! use creatorgpt::{LocalIdentityProvider, MemoryStore, Session};
//!
//! # async fn example() -> creatorgpt::Result<()> {
//! let provider = Arc::new(LocalIdentityProvider::new(Arc::new(MemoryStore::new())));
//! let mut session = Session::start(provider);
//! assert!(session.user_id().is_none());
//!
//! session.sign_up("ada@example.com", "hunter22").await?;
//! assert!(session.is_signed_in());
//!
//! session.sign_out().await;
//! session.end();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::error::AuthError;
use crate::identity::{IdentityProvider, User};

/// The current user of one client, tracked through its identity provider.
pub struct Session {
    provider: Arc<dyn IdentityProvider>,
    auth_state: watch::Receiver<Option<User>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("user", &self.current_user()).finish()
    }
}

impl Session {
    /// Start tracking `provider`'s auth state
    pub fn start(provider: Arc<dyn IdentityProvider>) -> Self {
        let auth_state = provider.on_auth_state_changed();
        debug!(signed_in = auth_state.borrow().is_some(), "Session started");
        Self { provider, auth_state }
    }

    /// The signed-in user, if any
    #[must_use]
    pub fn current_user(&self) -> Option<User> {
        self.auth_state.borrow().clone()
    }

    /// The signed-in user's id, if any
    #[must_use]
    pub fn user_id(&self) -> Option<String> {
        self.auth_state.borrow().as_ref().map(|user| user.uid.clone())
    }

    /// Whether someone is signed in
    #[must_use]
    pub fn is_signed_in(&self) -> bool {
        self.auth_state.borrow().is_some()
    }

    /// Wait for the next sign-in or sign-out.
    ///
    /// Returns the new user, or `None` once signed out. Also returns `None` if
    /// the provider goes away.
    pub async fn changed(&mut self) -> Option<User> {
        if self.auth_state.changed().await.is_err() {
            return None;
        }
        self.auth_state.borrow_and_update().clone()
    }

    /// Sign in through the provider
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthError> {
        self.provider.sign_in(email, password).await
    }

    /// Register and sign in through the provider
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<User, AuthError> {
        self.provider.sign_up(email, password).await
    }

    /// Sign out through the provider
    pub async fn sign_out(&self) {
        self.provider.sign_out().await;
    }

    /// Stop tracking auth state
    pub fn end(self) {
        debug!("Session ended");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::LocalIdentityProvider;
    use crate::store::MemoryStore;

    fn start() -> Session {
        Session::start(Arc::new(LocalIdentityProvider::new(Arc::new(MemoryStore::new()))))
    }

    #[tokio::test]
    async fn test_session_tracks_sign_in_and_out() {
        let session = start();
        assert!(!session.is_signed_in());

        let user = session.sign_up("ada@example.com", "hunter22").await.unwrap();
        assert_eq!(session.user_id(), Some(user.uid.clone()));

        session.sign_out().await;
        assert!(session.current_user().is_none());

        session.sign_in("ada@example.com", "hunter22").await.unwrap();
        assert_eq!(session.current_user(), Some(user));
    }

    #[tokio::test]
    async fn test_session_changed_reports_new_user() {
        let provider = Arc::new(LocalIdentityProvider::new(Arc::new(MemoryStore::new())));
        let mut session = Session::start(provider.clone());

        let waiter = tokio::spawn(async move { session.changed().await });
        provider.sign_up("ada@example.com", "hunter22").await.unwrap();

        let user = waiter.await.unwrap().unwrap();
        assert_eq!(user.email, "ada@example.com");
    }

    #[tokio::test]
    async fn test_failed_sign_up_surfaces_user_message() {
        let session = start();
        let err = session.sign_up("ada@example.com", "short").await.unwrap_err();
        assert_eq!(err.user_message(), "Password too weak (min 6 chars).");
        assert!(!session.is_signed_in());
    }
}
