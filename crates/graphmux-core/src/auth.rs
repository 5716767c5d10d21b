//! Auth token resolution and session storage.
//!
//! Resolution runs fresh on every outgoing operation and every WebSocket
//! (re)connect; tokens may rotate, so nothing here is cached across calls.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::config::{ClientConfig, TokenStorage};
use crate::context::ExecutionContext;
use crate::hooks::Hooks;

/// Browser-side session storage: a cookie jar and a local-storage map.
///
/// The server never reads from this store for cookie-mode clients; each
/// request's cookies come from its own [`ExecutionContext`].
#[derive(Debug, Default)]
pub struct SessionStore {
    cookies: RwLock<HashMap<String, String>>,
    local: RwLock<HashMap<String, String>>,
}

impl SessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a value from the given storage.
    #[must_use]
    pub fn get(&self, storage: TokenStorage, name: &str) -> Option<String> {
        match storage {
            TokenStorage::Cookie => self.cookies.read().get(name).cloned(),
            TokenStorage::LocalStorage => self.local.read().get(name).cloned(),
        }
    }

    /// Write a value into the given storage.
    pub fn set(&self, storage: TokenStorage, name: &str, value: &str) {
        match storage {
            TokenStorage::Cookie => {
                self.cookies.write().insert(name.to_string(), value.to_string());
            }
            TokenStorage::LocalStorage => {
                self.local.write().insert(name.to_string(), value.to_string());
            }
        }
    }

    /// Remove a value from the given storage, returning what was stored.
    pub fn remove(&self, storage: TokenStorage, name: &str) -> Option<String> {
        match storage {
            TokenStorage::Cookie => self.cookies.write().remove(name),
            TokenStorage::LocalStorage => self.local.write().remove(name),
        }
    }
}

/// Read the currently stored raw token for a client.
///
/// Storage branching: cookie-mode reads the forwarded request header on the
/// server and the jar in-browser; local-storage yields nothing during server
/// rendering (documented limitation of that storage mode).
#[must_use]
pub fn stored_token(
    config: &ClientConfig,
    ctx: &ExecutionContext,
    store: &SessionStore,
) -> Option<String> {
    match config.token_storage {
        TokenStorage::Cookie => {
            if ctx.is_browser() {
                store.get(TokenStorage::Cookie, &config.token_name)
            } else {
                ctx.request_cookie(&config.token_name)
            }
        }
        TokenStorage::LocalStorage => {
            if ctx.is_browser() {
                store.get(TokenStorage::LocalStorage, &config.token_name)
            } else {
                None
            }
        }
    }
    .filter(|token| !token.is_empty())
}

/// Resolve the raw token for a client: hook override first, then storage.
#[must_use]
pub fn resolve_token(
    client: &str,
    config: &ClientConfig,
    ctx: &ExecutionContext,
    store: &SessionStore,
    hooks: &Hooks,
) -> Option<String> {
    hooks
        .auth_override(client)
        .or_else(|| stored_token(config, ctx, store))
}

/// Format a raw token as an auth header value.
///
/// A value that already starts with a scheme word (a leading run of letters
/// followed by whitespace) passes through unchanged. Otherwise the
/// configured scheme is prefixed with a single space; an `auth_type` of
/// `None` never prefixes.
#[must_use]
pub fn format_auth_value(token: &str, auth_type: Option<&str>) -> String {
    if has_scheme_prefix(token) {
        return token.to_string();
    }
    match auth_type {
        Some(scheme) => format!("{scheme} {token}"),
        None => token.to_string(),
    }
}

/// Resolve and format the auth header value for one outgoing operation.
///
/// Returns `None` when no token resolves; the auth link then omits the
/// header entirely rather than sending an empty value.
#[must_use]
pub fn resolve_auth_header_value(
    client: &str,
    config: &ClientConfig,
    ctx: &ExecutionContext,
    store: &SessionStore,
    hooks: &Hooks,
) -> Option<String> {
    let token = resolve_token(client, config, ctx, store, hooks)?;
    Some(format_auth_value(&token, config.auth_type.as_deref()))
}

fn has_scheme_prefix(value: &str) -> bool {
    let letters = value.chars().take_while(char::is_ascii_alphabetic).count();
    letters > 0 && value[letters..].starts_with(|c: char| c.is_whitespace())
}
