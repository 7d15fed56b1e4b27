use std::collections::HashMap;

use async_trait::async_trait;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tokio::sync::RwLock;

use crate::error::ModelError;

/// User account persistence and credential checks.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Create a user. Fails with [`ModelError::DuplicateEmail`] if the email is taken.
    async fn insert(&self, name: &str, email: &str, password: &str) -> Result<i64, ModelError>;

    /// Return the user id for a matching email/password pair.
    async fn authenticate(&self, email: &str, password: &str) -> Result<i64, ModelError>;

    /// Look a user up by id. Unknown ids are [`ModelError::NoRecord`].
    async fn get(&self, id: i64) -> Result<User, ModelError>;
}

/// A user account, without its credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
}

struct UserRow {
    user: User,
    salt: [u8; 16],
    password_digest: [u8; 32],
}

#[derive(Default)]
struct Users {
    next_id: i64,
    by_email: HashMap<String, UserRow>,
}

/// User store kept in process memory.
///
/// Passwords are kept as salted SHA-256 digests. This is a stand-in for a real
/// password hashing scheme, which belongs to the production store.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<Users>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.by_email.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn digest(salt: &[u8], password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, name: &str, email: &str, password: &str) -> Result<i64, ModelError> {
        let email = email.trim();
        let mut users = self.users.write().await;
        if users.by_email.contains_key(email) {
            return Err(ModelError::DuplicateEmail);
        }

        let mut salt = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt);

        users.next_id += 1;
        let id = users.next_id;
        users.by_email.insert(
            email.to_string(),
            UserRow {
                user: User {
                    id,
                    name: name.to_string(),
                    email: email.to_string(),
                },
                salt,
                password_digest: digest(&salt, password),
            },
        );
        Ok(id)
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<i64, ModelError> {
        let users = self.users.read().await;
        let row = users
            .by_email
            .get(email.trim())
            .ok_or(ModelError::InvalidCredentials)?;

        let candidate = digest(&row.salt, password);
        if bool::from(candidate.ct_eq(&row.password_digest)) {
            Ok(row.user.id)
        } else {
            Err(ModelError::InvalidCredentials)
        }
    }

    async fn get(&self, id: i64) -> Result<User, ModelError> {
        self.users
            .read()
            .await
            .by_email
            .values()
            .find(|row| row.user.id == id)
            .map(|row| row.user.clone())
            .ok_or(ModelError::NoRecord)
    }
}
