//! `POST /register`: create an unverified account.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use chrono::Utc;

use super::join_error;
use crate::error::{AppError, AppResult, OperationContext};
use crate::http::adapter::Handler;
use crate::http::execution::RequestExecution;
use crate::security::password::CredentialHasher;
use crate::store::{User, UserStore, DEFAULT_ROLE_ID};

pub struct RegisterHandler {
    store: Arc<dyn UserStore>,
    hasher: Arc<CredentialHasher>,
    salt_size: usize,
}

impl RegisterHandler {
    pub fn new(store: Arc<dyn UserStore>, hasher: Arc<CredentialHasher>, salt_size: usize) -> Self {
        Self {
            store,
            hasher,
            salt_size,
        }
    }

    async fn register(&self, exec: &RequestExecution) -> AppResult<()> {
        let username = exec.param("username").to_owned();
        let password = exec.param("password").to_owned();
        let email = exec.param("email").to_owned();
        if username.is_empty() || password.is_empty() || email.is_empty() {
            return Err(AppError::validation(
                "username, password and email are required",
            ));
        }
        tracing::info!(username = %username, email = %email, "registering user");

        let hasher = Arc::clone(&self.hasher);
        let salt_size = self.salt_size;
        let span = exec.span().clone();
        let credential =
            tokio::task::spawn_blocking(move || span.in_scope(|| hasher.hash(&password, salt_size)))
                .await
                .map_err(join_error)
                .context("hash_password")?
                .context("hash_password")?;

        let now = Utc::now();
        let user = User {
            username,
            hashed_password: credential.hash,
            salt: credential.salt,
            email,
            verified: false,
            role_id: DEFAULT_ROLE_ID,
            created_at: now,
            last_login: now,
        };

        exec.context()
            .run(self.store.insert_user(user))
            .await
            .context("insert_user")?
            .context("insert_user")
    }
}

#[async_trait]
impl Handler for RegisterHandler {
    async fn handle(&self, exec: &mut RequestExecution) -> AppResult<()> {
        self.register(exec)
            .await
            .map_err(|e| e.context("register"))
            .context("try_register")?;

        let response = exec.response();
        response.set_status(StatusCode::CREATED);
        response.write("User created");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::handlers::test_support::{cheap_hasher, execution};
    use crate::store::InMemoryUserStore;

    fn handler(store: Arc<InMemoryUserStore>) -> RegisterHandler {
        RegisterHandler::new(store, Arc::new(cheap_hasher()), 16)
    }

    #[tokio::test]
    async fn test_register_stores_hashed_credential() {
        let store = Arc::new(InMemoryUserStore::new(false));
        let (mut exec, _release) = execution(
            "/register",
            "username=bob&password=hunter2&email=bob%40example.com",
            false,
        );

        handler(Arc::clone(&store)).handle(&mut exec).await.unwrap();
        assert_eq!(exec.response().status(), StatusCode::CREATED);

        let user = store.find_user_by_username("bob").await.unwrap();
        assert_eq!(user.email, "bob@example.com");
        assert!(!user.verified);
        assert_eq!(user.role_id, DEFAULT_ROLE_ID);
        assert_eq!(user.created_at, user.last_login);
        assert_ne!(user.hashed_password, "hunter2");
        assert!(cheap_hasher().verify("hunter2", &user.hashed_password, &user.salt));
    }

    #[tokio::test]
    async fn test_empty_email_is_validation_failure() {
        let store = Arc::new(InMemoryUserStore::new(false));
        let (mut exec, _release) = execution("/register", "username=bob&password=pw&email=", true);

        let err = handler(Arc::clone(&store)).handle(&mut exec).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("email"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_username() {
        let store = Arc::new(InMemoryUserStore::new(false));
        let register = handler(Arc::clone(&store));

        let (mut first, _r1) =
            execution("/register", "username=bob&password=a&email=a%40x.io", false);
        register.handle(&mut first).await.unwrap();

        let (mut second, _r2) =
            execution("/register", "username=bob&password=b&email=b%40x.io", false);
        let err = register.handle(&mut second).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "try_register: register: insert_user: username \"bob\" already exists"
        );
    }
}
