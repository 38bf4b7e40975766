//! User persistence capability.
//!
//! Handlers only see the [`UserStore`] trait; the concrete backend is chosen
//! at startup.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub use memory::InMemoryUserStore;

/// Role assigned to self-registered accounts.
pub const DEFAULT_ROLE_ID: u64 = 1;

/// A registered account.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub username: String,
    pub hashed_password: String,
    pub salt: String,
    pub email: String,
    pub verified: bool,
    pub role_id: u64,
    pub created_at: DateTime<Utc>,
    pub last_login: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("user not found")]
    NotFound,

    #[error("username {0:?} already exists")]
    Duplicate(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Lookup and insertion of user records.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user_by_username(&self, username: &str) -> StoreResult<User>;

    async fn insert_user(&self, user: User) -> StoreResult<()>;
}
