//! In-memory bearer tokens

use std::collections::HashMap;

use axum::http::{header, HeaderMap};
use creatorgpt::User;
use parking_lot::Mutex;
use tracing::debug;

/// Maps opaque bearer tokens to signed-in users. Tokens do not survive a
/// restart.
#[derive(Debug, Default)]
pub struct TokenStore {
    tokens: Mutex<HashMap<String, User>>,
}

impl TokenStore {
    /// Issue a fresh token for `user`
    pub fn issue(&self, user: User) -> String {
        let token = uuid::Uuid::new_v4().to_string();
        debug!(uid = %user.uid, "Session token issued");
        self.tokens.lock().insert(token.clone(), user);
        token
    }

    /// The user a token belongs to
    pub fn resolve(&self, token: &str) -> Option<User> {
        self.tokens.lock().get(token).cloned()
    }

    /// Invalidate a token. Returns the user it belonged to.
    pub fn revoke(&self, token: &str) -> Option<User> {
        self.tokens.lock().remove(token)
    }

    /// Number of live tokens
    pub fn len(&self) -> usize {
        self.tokens.lock().len()
    }

    /// Whether no token is live
    pub fn is_empty(&self) -> bool {
        self.tokens.lock().is_empty()
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn user() -> User {
        User { uid: "u1".into(), email: "ada@example.com".into() }
    }

    #[test]
    fn test_issue_resolve_revoke() {
        let tokens = TokenStore::default();
        let token = tokens.issue(user());

        assert_eq!(tokens.resolve(&token), Some(user()));
        assert_eq!(tokens.revoke(&token), Some(user()));
        assert!(tokens.resolve(&token).is_none());
        assert!(tokens.is_empty());
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(bearer_token(&headers).is_none());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc-123"));
        assert_eq!(bearer_token(&headers), Some("abc-123"));
    }
}
