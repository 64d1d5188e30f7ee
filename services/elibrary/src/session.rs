//! services/elibrary/src/session.rs
//!
//! The explicit session object: the live token, the signed-in user, and a
//! broadcast channel that tells the front end when it must show the login view.

use crate::adapters::token_store::TokenStore;
use elibrary_core::domain::{AuthGrant, User};
use elibrary_core::ports::PortResult;
use std::sync::RwLock;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Where the front end should navigate once the session has been evicted.
pub const LOGIN_ROUTE: &str = "/login";

/// Session lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn { user_id: String },
    SignedOut,
    /// The backend rejected the token; credentials have already been cleared.
    LoginRequired { redirect_to: String },
}

/// Owned by the top-level application and shared by `Arc` with every consumer.
pub struct Session {
    tokens: TokenStore,
    user: RwLock<Option<User>>,
    events: broadcast::Sender<SessionEvent>,
}

impl Session {
    /// Rebuilds the session from whatever the token store already holds.
    pub fn restore(tokens: TokenStore) -> Self {
        let user = match tokens.user() {
            Ok(user) => user,
            Err(e) => {
                warn!("Failed to load stored user profile: {:?}", e);
                None
            }
        };
        let (events, _) = broadcast::channel(16);
        Self {
            tokens,
            user: RwLock::new(user),
            events,
        }
    }

    /// The current bearer token, if any. Storage failures read as "no token".
    pub fn token(&self) -> Option<String> {
        match self.tokens.token() {
            Ok(token) => token,
            Err(e) => {
                warn!("Failed to read auth token: {:?}", e);
                None
            }
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    pub fn user(&self) -> Option<User> {
        self.user.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Persists the grant's token and profile and makes the user current.
    pub fn sign_in(&self, grant: &AuthGrant) -> PortResult<()> {
        self.tokens.set_token(&grant.token)?;
        self.tokens.set_user(&grant.user)?;
        *self.user.write().unwrap_or_else(|e| e.into_inner()) = Some(grant.user.clone());
        info!("Signed in as {}", grant.user.email);
        let _ = self.events.send(SessionEvent::SignedIn {
            user_id: grant.user.id.clone(),
        });
        Ok(())
    }

    /// Explicit logout.
    pub fn sign_out(&self) -> PortResult<()> {
        *self.user.write().unwrap_or_else(|e| e.into_inner()) = None;
        self.tokens.clear()?;
        info!("Signed out");
        let _ = self.events.send(SessionEvent::SignedOut);
        Ok(())
    }

    /// Evicts the session after a 401 and asks the front end to route to login.
    pub fn expire(&self) {
        *self.user.write().unwrap_or_else(|e| e.into_inner()) = None;
        if let Err(e) = self.tokens.clear() {
            warn!("Failed to clear auth token after 401: {:?}", e);
        }
        warn!("Session rejected by the server, redirecting to {}", LOGIN_ROUTE);
        let _ = self.events.send(SessionEvent::LoginRequired {
            redirect_to: LOGIN_ROUTE.to_string(),
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}
