//! Email/password identity.
//!
//! [`AccountStore`] keeps accounts as documents in `accounts/{email}` with an
//! argon2id password hash in PHC string form. It is stateless and safe to share between
//! many concurrent users, which is what the HTTP server needs.
//!
//! [`IdentityProvider`] is the client-facing contract: one signed-in user at a
//! time plus a stream of auth state changes. [`LocalIdentityProvider`]
//! implements it on top of an [`AccountStore`].

use std::sync::Arc;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::AuthError;
use crate::store::{run_transaction, DocPath, DocumentStore, Fields, SetMode, Snapshot};
use crate::{DEFAULT_TRANSACTION_MAX_ATTEMPTS, MIN_PASSWORD_LEN};

/// Collection holding one document per account.
pub const ACCOUNTS_COLLECTION: &str = "accounts";

/// An authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Stable user identifier
    pub uid: String,
    /// Email the account was registered with (normalized)
    pub email: String,
}

/// Result alias for identity operations
pub type AuthResult<T> = std::result::Result<T, AuthError>;

/// Trim and lowercase an email, rejecting obviously malformed ones
fn normalize_email(email: &str) -> AuthResult<String> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain))
            if !local.is_empty() && !domain.is_empty() && !domain.contains('@') && !email.contains('/') =>
        {
            Ok(email)
        }
        _ => Err(AuthError::InvalidEmail),
    }
}

/// Hash a password with argon2id and a fresh random salt
fn hash_password(password: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::unavailable(format!("password hashing failed: {e}")))
}

/// Check a password against a stored PHC string; unparseable hashes never match
fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(e) => {
            warn!(error = %e, "Stored password hash is not a valid PHC string");
            false
        }
    }
}

/// Accounts persisted in a [`DocumentStore`].
#[derive(Clone)]
pub struct AccountStore {
    store: Arc<dyn DocumentStore>,
    max_attempts: u32,
}

impl std::fmt::Debug for AccountStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountStore").finish_non_exhaustive()
    }
}

impl AccountStore {
    /// Create an account store over `store`
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store, max_attempts: DEFAULT_TRANSACTION_MAX_ATTEMPTS }
    }

    fn account_path(email: &str) -> AuthResult<DocPath> {
        DocPath::new(ACCOUNTS_COLLECTION, email).map_err(|_| AuthError::InvalidEmail)
    }

    /// Register a new account.
    ///
    /// The existence check and the write happen in one transaction, so two
    /// concurrent sign-ups for the same email cannot both succeed.
    pub async fn create(&self, email: &str, password: &str) -> AuthResult<User> {
        let email = normalize_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword);
        }
        let path = Self::account_path(&email)?;

        let password_hash = hash_password(password)?;
        let user = User { uid: uuid::Uuid::new_v4().simple().to_string(), email };

        let created = run_transaction(&self.store, self.max_attempts, |tx| {
            let path = path.clone();
            let fields = Fields::new()
                .with("uid", user.uid.clone())
                .with("email", user.email.clone())
                .with("passwordHash", password_hash.clone())
                .with_server_timestamp("createdAt");
            async move {
                if tx.get(&path).await?.is_some() {
                    return Ok(false);
                }
                tx.set(&path, fields, SetMode::Overwrite);
                Ok(true)
            }
        })
        .await
        .map_err(|e| AuthError::unavailable(e.to_string()))?;

        if !created {
            debug!(email = %user.email, "Sign-up rejected, email taken");
            return Err(AuthError::EmailAlreadyInUse);
        }

        info!(uid = %user.uid, email = %user.email, "Account created");
        Ok(user)
    }

    /// Check credentials and return the matching user
    pub async fn verify(&self, email: &str, password: &str) -> AuthResult<User> {
        let email = normalize_email(email)?;
        let path = Self::account_path(&email)?;

        let snapshot = self
            .store
            .get(&path)
            .await
            .map_err(|e| AuthError::unavailable(e.to_string()))?
            .ok_or(AuthError::InvalidCredentials)?;

        let account = StoredAccount::from_snapshot(&snapshot)?;
        if !verify_password(password, &account.password_hash) {
            debug!(email = %email, "Wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        Ok(User { uid: account.uid, email: account.email })
    }
}

struct StoredAccount {
    uid: String,
    email: String,
    password_hash: String,
}

impl StoredAccount {
    fn from_snapshot(snapshot: &Snapshot) -> AuthResult<Self> {
        let field = |name: &str| -> AuthResult<String> {
            snapshot
                .get::<String>(name)
                .ok()
                .flatten()
                .ok_or_else(|| {
                    warn!(path = %snapshot.path, field = name, "Account document is missing a field");
                    AuthError::unavailable(format!("account record missing {name}"))
                })
        };
        Ok(Self {
            uid: field("uid")?,
            email: field("email")?,
            password_hash: field("passwordHash")?,
        })
    }
}

/// An identity provider with a single current user.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Sign in with email and password
    async fn sign_in(&self, email: &str, password: &str) -> AuthResult<User>;

    /// Create an account and sign in as it
    async fn sign_up(&self, email: &str, password: &str) -> AuthResult<User>;

    /// Sign out the current user, if any
    async fn sign_out(&self);

    /// Observe the current user. The receiver starts at the current state;
    /// dropping it unsubscribes.
    fn on_auth_state_changed(&self) -> watch::Receiver<Option<User>>;
}

/// [`IdentityProvider`] backed by an [`AccountStore`].
#[derive(Debug)]
pub struct LocalIdentityProvider {
    accounts: AccountStore,
    current: watch::Sender<Option<User>>,
}

impl LocalIdentityProvider {
    /// Create a provider storing accounts in `store`
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_accounts(AccountStore::new(store))
    }

    /// Create a provider over an existing account store
    pub fn with_accounts(accounts: AccountStore) -> Self {
        let (current, _) = watch::channel(None);
        Self { accounts, current }
    }

    /// The signed-in user, if any
    #[must_use]
    pub fn current_user(&self) -> Option<User> {
        self.current.borrow().clone()
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn sign_in(&self, email: &str, password: &str) -> AuthResult<User> {
        let user = self.accounts.verify(email, password).await?;
        info!(uid = %user.uid, "Signed in");
        self.current.send_replace(Some(user.clone()));
        Ok(user)
    }

    async fn sign_up(&self, email: &str, password: &str) -> AuthResult<User> {
        let user = self.accounts.create(email, password).await?;
        self.current.send_replace(Some(user.clone()));
        Ok(user)
    }

    async fn sign_out(&self) {
        if let Some(user) = self.current.send_replace(None) {
            info!(uid = %user.uid, "Signed out");
        }
    }

    fn on_auth_state_changed(&self) -> watch::Receiver<Option<User>> {
        self.current.subscribe()
    }
}
