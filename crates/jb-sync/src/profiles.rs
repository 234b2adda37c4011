//! # Profile Service
//!
//! Reads and edits `users/{id}` documents. Unlike the feed, every call here
//! is user-initiated, so remote failures are returned to the caller.

use std::sync::Arc;

use chrono::Utc;
use jb_core::{validate_username, AppError, Result, User};
use serde_json::{json, Map, Value};
use tracing::info;

use crate::gateway::RemoteGateway;

/// Fields a user may edit. `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub username: Option<String>,
}

pub struct ProfileService {
    gateway: Arc<RemoteGateway>,
}

impl ProfileService {
    pub fn new(gateway: Arc<RemoteGateway>) -> Self {
        Self { gateway }
    }

    pub async fn create_profile(&self, user_id: &str, email: &str) -> Result<User> {
        let email = email.trim();
        if !email.contains('@') {
            return Err(AppError::validation("email must contain '@'"));
        }
        let user = self.gateway.create_user(user_id, email, Utc::now()).await?;
        info!(user = user_id, "profile created");
        Ok(user)
    }

    pub async fn load_profile(&self, user_id: &str) -> Result<Option<User>> {
        self.gateway.get_user(user_id).await
    }

    pub async fn update_profile(&self, user_id: &str, update: ProfileUpdate) -> Result<User> {
        let mut user = self.require(user_id).await?;
        let mut fields = Map::new();

        if let Some(name) = update.name {
            let name = name.trim().to_string();
            fields.insert("name".into(), Value::from(name.clone()));
            user.name = Some(name);
        }
        if let Some(username) = update.username {
            let username = validate_username(&username)?;
            fields.insert("username".into(), Value::from(username.clone()));
            user.username = Some(username);
        }

        if !fields.is_empty() {
            self.gateway.merge_user(user_id, Value::Object(fields)).await?;
        }
        Ok(user)
    }

    /// Adds `joke_id` to the favourites, or removes it if already there.
    pub async fn toggle_favourite(&self, user_id: &str, joke_id: &str) -> Result<User> {
        let mut user = self.require(user_id).await?;
        if let Some(pos) = user.favourite_joke_ids.iter().position(|id| id == joke_id) {
            user.favourite_joke_ids.remove(pos);
        } else {
            user.favourite_joke_ids.push(joke_id.to_string());
        }
        self.gateway
            .merge_user(user_id, json!({ "favouriteJokesIDs": user.favourite_joke_ids }))
            .await?;
        Ok(user)
    }

    async fn require(&self, user_id: &str) -> Result<User> {
        self.gateway
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User", user_id))
    }
}
