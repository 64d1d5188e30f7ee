//! services/elibrary/src/adapters/token_store.rs
//!
//! Persists the opaque auth token and the profile that came with it.

use crate::adapters::records::UserRecord;
use elibrary_core::domain::User;
use elibrary_core::ports::{KeyValueStorage, PortError, PortResult};
use std::sync::Arc;
use tracing::warn;

pub const TOKEN_KEY: &str = "token";
pub const USER_KEY: &str = "user";

/// A thin key-value wrapper; it knows nothing about sessions or HTTP.
#[derive(Clone)]
pub struct TokenStore {
    storage: Arc<dyn KeyValueStorage>,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }

    pub fn token(&self) -> PortResult<Option<String>> {
        Ok(self.storage.get(TOKEN_KEY)?.filter(|t| !t.is_empty()))
    }

    pub fn set_token(&self, token: &str) -> PortResult<()> {
        self.storage.set(TOKEN_KEY, token)
    }

    /// Loads the stored profile. An unreadable profile is dropped rather than failing the caller.
    pub fn user(&self) -> PortResult<Option<User>> {
        let Some(raw) = self.storage.get(USER_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str::<UserRecord>(&raw) {
            Ok(record) => Ok(Some(record.to_domain())),
            Err(e) => {
                warn!("Discarding unreadable stored user profile: {:?}", e);
                Ok(None)
            }
        }
    }

    pub fn set_user(&self, user: &User) -> PortResult<()> {
        let raw = serde_json::to_string(&UserRecord::from_domain(user))
            .map_err(|e| PortError::Storage(e.to_string()))?;
        self.storage.set(USER_KEY, &raw)
    }

    /// Removes both token and profile.
    pub fn clear(&self) -> PortResult<()> {
        self.storage.remove(TOKEN_KEY)?;
        self.storage.remove(USER_KEY)
    }
}
