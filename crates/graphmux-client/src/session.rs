//! Session lifecycle: login, logout, and token reads.
//!
//! Per client the states are anonymous and authenticated. `login` moves to
//! authenticated (or rotates the token); `logout` moves back and is a no-op
//! when already anonymous. Concurrent logins on the same client race at the
//! storage layer with last-write-wins semantics.

use std::sync::Arc;

use tracing::{debug, warn};

use graphmux_core::{stored_token, ClientError, TokenStorage};

use crate::registry::{ClientRegistry, RegistryEntry};

/// Login/logout controller over the client registry.
#[derive(Debug, Clone)]
pub struct SessionController {
    registry: Arc<ClientRegistry>,
}

impl SessionController {
    /// Create a controller for a registry.
    #[must_use]
    pub const fn new(registry: Arc<ClientRegistry>) -> Self {
        Self { registry }
    }

    /// Persist a token and roll the client over to the new session.
    ///
    /// Requires a non-empty token; clearing is only ever performed by
    /// [`logout`](Self::logout). Once storage is updated the login has
    /// succeeded: any live WebSocket is restarted so the next handshake
    /// carries the new token, and the cache reset that follows is
    /// best-effort - its failures are logged, never propagated.
    pub async fn login(
        &self,
        token: &str,
        client_name: Option<&str>,
        skip_cache_reset: bool,
    ) -> Result<(), ClientError> {
        if token.is_empty() {
            return Err(ClientError::EmptyToken);
        }

        let entry = self.registry.resolve(client_name);
        self.write_token(entry, token);
        self.roll_session(entry, skip_cache_reset, "login").await;
        Ok(())
    }

    /// Clear the stored token and roll the client back to anonymous.
    ///
    /// A no-op when no token is stored, to avoid unnecessary cache churn.
    pub async fn logout(&self, client_name: Option<&str>, skip_cache_reset: bool) {
        let entry = self.registry.resolve(client_name);
        if self.token_for(entry).is_none() {
            debug!(client = entry.name.as_str(), "logout with no stored token is a no-op");
            return;
        }

        self.registry
            .store()
            .remove(entry.config.token_storage, &entry.config.token_name);
        self.roll_session(entry, skip_cache_reset, "logout").await;
    }

    /// Currently stored raw token for a client (no header formatting).
    #[must_use]
    pub fn token(&self, client_name: Option<&str>) -> Option<String> {
        let entry = self.registry.resolve(client_name);
        self.token_for(entry)
    }

    fn token_for(&self, entry: &RegistryEntry) -> Option<String> {
        stored_token(&entry.config, self.registry.ctx(), self.registry.store())
    }

    fn write_token(&self, entry: &RegistryEntry, token: &str) {
        let store = self.registry.store();
        store.set(entry.config.token_storage, &entry.config.token_name, token);
        if entry.config.token_storage == TokenStorage::Cookie {
            let set_cookie = entry
                .config
                .cookie_attributes
                .to_set_cookie(&entry.config.token_name, token);
            debug!(client = entry.name.as_str(), set_cookie, "session cookie updated");
        }
    }

    /// A live socket cannot change its own auth mid-flight; tear it down so
    /// the next handshake resolves the new session. Cache-reset failures
    /// are absorbed here.
    async fn roll_session(&self, entry: &RegistryEntry, skip_cache_reset: bool, operation: &str) {
        if let Some(ws) = &entry.ws {
            ws.restart();
        }

        if !skip_cache_reset {
            if let Err(err) = entry.client.reset_store().await {
                warn!(
                    client = entry.name.as_str(),
                    operation,
                    error = %err,
                    "cache reset failed"
                );
            }
        }
    }
}
