//! `POST /login`: check a username/password pair against the user store.
//!
//! Unknown users and wrong passwords produce the same client-facing
//! failure; the real cause only reaches the log.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;

use super::join_error;
use crate::error::{AppError, AppResult, OperationContext};
use crate::http::adapter::Handler;
use crate::http::execution::RequestExecution;
use crate::security::password::{CredentialHasher, EncodedCredential};
use crate::store::{StoreError, User, UserStore};

pub struct LoginHandler {
    store: Arc<dyn UserStore>,
    hasher: Arc<CredentialHasher>,
    placeholder: EncodedCredential,
}

impl LoginHandler {
    pub fn new(store: Arc<dyn UserStore>, hasher: Arc<CredentialHasher>) -> Self {
        let placeholder = hasher.placeholder();
        Self {
            store,
            hasher,
            placeholder,
        }
    }

    async fn login(&self, exec: &RequestExecution) -> AppResult<User> {
        let username = exec.param("username").to_owned();
        let password = exec.param("password").to_owned();
        if username.is_empty() || password.is_empty() {
            return Err(AppError::validation("username and password are required"));
        }

        let found = match exec
            .context()
            .run(self.store.find_user_by_username(&username))
            .await
            .context("find_user_by_username")?
        {
            Ok(user) => Some(user),
            Err(StoreError::NotFound) => None,
            Err(e) => return Err(AppError::from(e).context("find_user_by_username")),
        };

        // Unknown users verify against the placeholder so every attempt costs one derivation.
        let (hash, salt) = match &found {
            Some(user) => (user.hashed_password.clone(), user.salt.clone()),
            None => (self.placeholder.hash.clone(), self.placeholder.salt.clone()),
        };
        let hasher = Arc::clone(&self.hasher);
        let span = exec.span().clone();
        let matches = tokio::task::spawn_blocking(move || {
            span.in_scope(|| hasher.verify(&password, &hash, &salt))
        })
        .await
        .map_err(join_error)
        .context("verify_password")?;
        tracing::debug!(
            username = %username,
            known_user = found.is_some(),
            "password verification finished"
        );

        match found {
            Some(user) if matches => Ok(user),
            Some(_) => Err(AppError::authentication(format!(
                "invalid password for {username:?}"
            ))),
            None => Err(AppError::authentication(format!("user {username:?} not found"))),
        }
    }
}

#[async_trait]
impl Handler for LoginHandler {
    async fn handle(&self, exec: &mut RequestExecution) -> AppResult<()> {
        let user = self
            .login(exec)
            .await
            .map_err(|e| e.context("login"))
            .context("try_login")?;

        tracing::info!(username = %user.username, role_id = user.role_id, "login succeeded");
        let response = exec.response();
        response.set_status(StatusCode::OK);
        response.write("Login successful");
        Ok(())
    }
}
