//! User records and the typed accessor over `users.csv`.

use std::sync::Arc;

use crate::security;
use crate::store::{FlatStore, Row, StoreError};

const TABLE: &str = "users.csv";
const COLUMNS: &[&str] = &["UserID", "Username", "Password", "RoleID", "Active", "FullName"];

pub const ROLE_USER: u32 = 0;
pub const ROLE_ADMIN: u32 = 1;

#[derive(Debug, Clone, serde::Serialize)]
pub struct User {
    pub user_id: u64,
    pub username: String,
    /// Bcrypt hash, never the plaintext. Excluded from JSON.
    #[serde(skip_serializing)]
    pub password: String,
    pub role_id: u32,
    pub active: bool,
    pub full_name: String,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role_id == ROLE_ADMIN
    }

    fn to_row(&self) -> Row {
        Row::from([
            ("UserID".into(), self.user_id.to_string()),
            ("Username".into(), self.username.clone()),
            ("Password".into(), self.password.clone()),
            ("RoleID".into(), self.role_id.to_string()),
            ("Active".into(), if self.active { "true".into() } else { "false".into() }),
            ("FullName".into(), self.full_name.clone()),
        ])
    }

    fn from_row(row: &Row) -> Option<Self> {
        let get = |k: &str| row.get(k).cloned().unwrap_or_default();
        Some(Self {
            user_id: get("UserID").parse().ok()?,
            username: get("Username"),
            password: get("Password"),
            role_id: get("RoleID").parse().unwrap_or(ROLE_USER),
            active: get("Active") == "true",
            full_name: get("FullName"),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("username '{0}' is already taken")]
    DuplicateUsername(String),
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct UserStore {
    store: Arc<FlatStore>,
}

impl UserStore {
    pub fn new(store: Arc<FlatStore>) -> Self {
        Self { store }
    }

    /// Create a user with a freshly hashed password. Rejects a username that
    /// already exists. The existence check and the append are two separate
    /// store calls; two simultaneous registrations for the same name can
    /// still both pass at high concurrency.
    pub fn create(
        &self,
        username: &str,
        password: &str,
        full_name: &str,
        role_id: u32,
    ) -> Result<User, UserError> {
        if self.by_username(username).is_some() {
            return Err(UserError::DuplicateUsername(username.to_string()));
        }
        let hashed = security::hash_password(password)?;
        let mut user = User {
            user_id: 0,
            username: username.to_string(),
            password: hashed,
            role_id,
            active: true,
            full_name: full_name.to_string(),
        };
        let template = user.clone();
        user.user_id = self
            .store
            .append_with_next_id(TABLE, "UserID", COLUMNS, move |id| {
                let mut row_user = template;
                row_user.user_id = id;
                row_user.to_row()
            })?;
        Ok(user)
    }

    pub fn by_id(&self, user_id: u64) -> Option<User> {
        self.store
            .find_by_field(TABLE, "UserID", &user_id.to_string())
            .as_ref()
            .and_then(User::from_row)
    }

    pub fn by_username(&self, username: &str) -> Option<User> {
        self.store
            .find_by_field(TABLE, "Username", username)
            .as_ref()
            .and_then(User::from_row)
    }

    /// Check credentials: the account must exist, be active, and the
    /// password must match the stored hash. Returns the user on success.
    pub fn verify_login(&self, username: &str, password: &str) -> Option<User> {
        let user = self.by_username(username)?;
        if !user.active {
            return None;
        }
        security::verify_password(password, &user.password)
            .then_some(user)
    }

    pub fn update(&self, user: &User) -> Result<bool, StoreError> {
        self.store.update_by_field(
            TABLE,
            "UserID",
            &user.user_id.to_string(),
            user.to_row(),
            COLUMNS,
        )
    }

    pub fn deactivate(&self, user_id: u64) -> Result<bool, StoreError> {
        let Some(mut user) = self.by_id(user_id) else {
            return Ok(false);
        };
        user.active = false;
        self.update(&user)
    }

    pub fn all(&self) -> Vec<User> {
        self.store
            .read(TABLE)
            .iter()
            .filter_map(User::from_row)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_store() -> UserStore {
        let dir = std::env::temp_dir().join(format!("linguachat-users-{}", uuid::Uuid::new_v4()));
        UserStore::new(Arc::new(FlatStore::new(dir).unwrap()))
    }

    #[test]
    fn duplicate_username_is_rejected_and_ids_increase() {
        let users = user_store();
        let alice = users.create("alice", "secret1", "Alice A", ROLE_USER).unwrap();
        let bob = users.create("bob", "secret2", "Bob B", ROLE_USER).unwrap();
        assert!(bob.user_id > alice.user_id);

        let err = users.create("alice", "other", "Alice Two", ROLE_USER);
        assert!(matches!(err, Err(UserError::DuplicateUsername(_))));
    }

    #[test]
    fn stored_password_is_a_hash() {
        let users = user_store();
        let alice = users.create("alice", "secret1", "Alice A", ROLE_USER).unwrap();
        assert_ne!(alice.password, "secret1");
        let on_disk = users.by_username("alice").unwrap();
        assert_ne!(on_disk.password, "secret1");
    }

    #[test]
    fn login_requires_active_account_and_matching_password() {
        let users = user_store();
        let alice = users.create("alice", "secret1", "Alice A", ROLE_USER).unwrap();

        assert!(users.verify_login("alice", "secret1").is_some());
        assert!(users.verify_login("alice", "wrong").is_none());
        assert!(users.verify_login("nobody", "secret1").is_none());

        users.deactivate(alice.user_id).unwrap();
        assert!(users.verify_login("alice", "secret1").is_none());
    }

    #[test]
    fn user_json_never_contains_the_hash() {
        let users = user_store();
        let alice = users.create("alice", "secret1", "Alice A", ROLE_USER).unwrap();
        let json = serde_json::to_value(&alice).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["username"], "alice");
    }
}
