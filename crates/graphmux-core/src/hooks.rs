//! Application-facing extension points.
//!
//! Two typed callback registries replace ambient hook dispatch: `auth`
//! handlers may override token resolution per operation, `error` handlers
//! observe every GraphQL/network error seen by the error link.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::GraphqlError;

/// Payload handed to auth handlers before every header resolution.
#[derive(Debug)]
pub struct AuthEvent<'a> {
    /// Client name the operation targets.
    pub client: &'a str,
    token: Option<String>,
}

impl AuthEvent<'_> {
    /// Short-circuit storage lookup with an explicit token.
    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = Some(token.into());
    }

    /// Token set so far (by an earlier handler).
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

/// Structured error handed to error handlers.
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    /// Client name the operation targeted.
    pub client: String,
    /// Operation name, when the request carried one.
    pub operation_name: Option<String>,
    /// GraphQL errors returned by the server.
    pub graphql_errors: Vec<GraphqlError>,
    /// Network-level failure, when the request never produced a response.
    pub network_error: Option<String>,
}

type AuthHandler = dyn Fn(&mut AuthEvent<'_>) + Send + Sync;
type ErrorHandler = dyn Fn(&ErrorEvent) + Send + Sync;

/// Callback registries, injected at registry-construction time.
#[derive(Default)]
pub struct Hooks {
    auth: RwLock<Vec<Arc<AuthHandler>>>,
    error: RwLock<Vec<Arc<ErrorHandler>>>,
}

impl Hooks {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an auth handler.
    pub fn on_auth(&self, handler: impl Fn(&mut AuthEvent<'_>) + Send + Sync + 'static) {
        self.auth.write().push(Arc::new(handler));
    }

    /// Register an error handler.
    pub fn on_error(&self, handler: impl Fn(&ErrorEvent) + Send + Sync + 'static) {
        self.error.write().push(Arc::new(handler));
    }

    /// Run auth handlers for a client; the first non-empty token wins.
    #[must_use]
    pub fn auth_override(&self, client: &str) -> Option<String> {
        let handlers: Vec<_> = self.auth.read().iter().cloned().collect();
        let mut event = AuthEvent {
            client,
            token: None,
        };
        for handler in handlers {
            handler(&mut event);
            if event.token.as_deref().is_some_and(|t| !t.is_empty()) {
                break;
            }
        }
        event.token.filter(|t| !t.is_empty())
    }

    /// Forward an error to every registered handler.
    pub fn emit_error(&self, event: &ErrorEvent) {
        let handlers: Vec<_> = self.error.read().iter().cloned().collect();
        for handler in handlers {
            handler(event);
        }
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("auth_handlers", &self.auth.read().len())
            .field("error_handlers", &self.error.read().len())
            .finish()
    }
}
