//! Explicit execution context.
//!
//! The context is threaded as a parameter into every function that needs to
//! know which side it runs on, never read from module-global state. On the
//! server each incoming request carries its own isolated context.

use serde::{Deserialize, Serialize};

/// Which side of the render boundary the code executes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionSide {
    /// Server rendering a request.
    Server,
    /// Browser after hydration.
    Browser,
}

/// Execution context for one process (browser) or one request (server).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    /// Execution side.
    pub side: ExecutionSide,
    /// The forwarded request's raw `Cookie` header, server side only.
    pub request_cookie_header: Option<String>,
}

impl ExecutionContext {
    /// Context for a server render of one incoming request.
    #[must_use]
    pub fn server(request_cookie_header: Option<String>) -> Self {
        Self {
            side: ExecutionSide::Server,
            request_cookie_header,
        }
    }

    /// Context for the browser.
    #[must_use]
    pub const fn browser() -> Self {
        Self {
            side: ExecutionSide::Browser,
            request_cookie_header: None,
        }
    }

    /// Returns `true` when running in the browser.
    #[must_use]
    pub fn is_browser(&self) -> bool {
        self.side == ExecutionSide::Browser
    }

    /// Look up one cookie value from the forwarded request header.
    ///
    /// Reads only the request's own header, never an ambient jar, so
    /// concurrent requests stay isolated.
    #[must_use]
    pub fn request_cookie(&self, name: &str) -> Option<String> {
        let header = self.request_cookie_header.as_deref()?;
        header.split(';').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key.trim() == name).then(|| value.trim().to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cookie_from_request_header() {
        let ctx = ExecutionContext::server(Some(
            "session=abc; apollo:default.token=tok123; theme=dark".to_string(),
        ));
        assert_eq!(
            ctx.request_cookie("apollo:default.token").as_deref(),
            Some("tok123")
        );
        assert_eq!(ctx.request_cookie("missing"), None);
    }

    #[test]
    fn browser_context_has_no_request_cookies() {
        let ctx = ExecutionContext::browser();
        assert!(ctx.is_browser());
        assert_eq!(ctx.request_cookie("session"), None);
    }
}
