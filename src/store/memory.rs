//! In-process user store.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{StoreError, StoreResult, User, UserStore};

/// Users kept in a concurrent map keyed by username.
///
/// Contents live for the lifetime of the process.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: DashMap<String, User>,
    log_queries: bool,
}

impl InMemoryUserStore {
    pub fn new(log_queries: bool) -> Self {
        Self {
            users: DashMap::new(),
            log_queries,
        }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_user_by_username(&self, username: &str) -> StoreResult<User> {
        if self.log_queries {
            tracing::info!(query = "find_user_by_username", username = %username, "store query");
        }
        self.users
            .get(username)
            .map(|entry| entry.value().clone())
            .ok_or(StoreError::NotFound)
    }

    async fn insert_user(&self, user: User) -> StoreResult<()> {
        if self.log_queries {
            tracing::info!(
                query = "insert_user",
                username = %user.username,
                email = %user.email,
                role_id = user.role_id,
                "store query"
            );
        }
        match self.users.entry(user.username.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(user.username)),
            Entry::Vacant(slot) => {
                slot.insert(user);
                Ok(())
            }
        }
    }
}
