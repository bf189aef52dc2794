//! Authentication: registration, login, and the in-memory session map.
//! Tokens live only for the process lifetime; a restart logs everyone out.

use std::sync::Arc;

use dashmap::DashMap;

use crate::security;
use crate::store::FlatStore;
use crate::users::{User, UserError, UserStore, ROLE_USER};
use crate::validators;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    Invalid(String),
    #[error("username or password is incorrect")]
    BadCredentials,
    #[error(transparent)]
    User(#[from] UserError),
}

#[derive(Clone)]
pub struct AuthService {
    users: UserStore,
    sessions: Arc<DashMap<String, u64>>,
}

impl AuthService {
    pub fn new(store: Arc<FlatStore>) -> Self {
        Self {
            users: UserStore::new(store),
            sessions: Arc::new(DashMap::new()),
        }
    }

    pub fn users(&self) -> &UserStore {
        &self.users
    }

    /// Validate the fields, then create the account. A taken username
    /// surfaces as `UserError::DuplicateUsername` through the `User` variant.
    pub fn register(
        &self,
        username: &str,
        password: &str,
        full_name: &str,
    ) -> Result<User, AuthError> {
        validators::validate_username(username).map_err(AuthError::Invalid)?;
        validators::validate_password(password).map_err(AuthError::Invalid)?;
        validators::validate_name(full_name).map_err(AuthError::Invalid)?;
        Ok(self.users.create(username, password, full_name, ROLE_USER)?)
    }

    /// Check credentials and mint a session token on success.
    pub fn login(&self, username: &str, password: &str) -> Result<(String, User), AuthError> {
        let user = self
            .users
            .verify_login(username, password)
            .ok_or(AuthError::BadCredentials)?;
        let token = security::generate_session_token();
        self.sessions.insert(token.clone(), user.user_id);
        Ok((token, user))
    }

    /// Drop the session if it exists; logging out twice is fine.
    pub fn logout(&self, token: &str) {
        self.sessions.remove(token);
    }

    /// Resolve a token to its user, re-reading the user row so deactivation
    /// after login is visible.
    pub fn verify(&self, token: &str) -> Option<User> {
        let user_id = *self.sessions.get(token)?;
        self.users.by_id(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth() -> AuthService {
        let dir = std::env::temp_dir().join(format!("linguachat-auth-{}", uuid::Uuid::new_v4()));
        AuthService::new(Arc::new(FlatStore::new(dir).unwrap()))
    }

    #[test]
    fn register_validates_before_touching_the_store() {
        let auth = auth();
        assert!(matches!(
            auth.register("x", "secret1", "Alice A"),
            Err(AuthError::Invalid(_))
        ));
        assert!(matches!(
            auth.register("alice", "short", "Alice A"),
            Err(AuthError::Invalid(_))
        ));
        assert!(auth.users().by_username("alice").is_none());
        assert!(auth.register("alice", "secret1", "Alice A").is_ok());
    }

    #[test]
    fn second_registration_with_same_username_fails() {
        let auth = auth();
        auth.register("alice", "secret1", "Alice A").unwrap();
        assert!(matches!(
            auth.register("alice", "secret2", "Alice Two"),
            Err(AuthError::User(UserError::DuplicateUsername(_)))
        ));
    }

    #[test]
    fn login_mints_a_token_that_verifies_until_logout() {
        let auth = auth();
        auth.register("alice", "secret1", "Alice A").unwrap();

        assert!(matches!(
            auth.login("alice", "wrong"),
            Err(AuthError::BadCredentials)
        ));

        let (token, user) = auth.login("alice", "secret1").unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(auth.verify(&token).unwrap().user_id, user.user_id);

        auth.logout(&token);
        assert!(auth.verify(&token).is_none());
        auth.logout(&token);
    }

    #[test]
    fn deactivation_invalidates_an_existing_session() {
        let auth = auth();
        let user = auth.register("alice", "secret1", "Alice A").unwrap();
        let (token, _) = auth.login("alice", "secret1").unwrap();
        auth.users().deactivate(user.user_id).unwrap();
        // Token resolves to a user row; the account state is the caller's
        // concern, but login is refused outright.
        assert!(!auth.verify(&token).unwrap().active);
        assert!(auth.login("alice", "secret1").is_err());
    }
}
