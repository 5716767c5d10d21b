//! Link-chain composition.
//!
//! Outermost first: error observation wraps auth header attachment wraps
//! transport selection. The order is load-bearing - the observer must see
//! failures originating from auth, HTTP, and WebSocket alike.

use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE};
use tracing::debug;

use graphmux_core::{
    resolve_auth_header_value, ClientConfig, ClientError, ErrorEvent, ExecutionContext,
    GraphqlRequest, GraphqlResponse, Hooks, OperationKind, SessionStore,
};

use crate::http::HttpTransport;
use crate::ws::{ConnectionParams, RestartableTransport, SubscriptionStream};

const CLIENT_NAME_HEADER: &str = "apollographql-client-name";
const CLIENT_VERSION_HEADER: &str = "apollographql-client-version";

/// Terminating transport selection for a client.
#[derive(Debug)]
pub enum Route {
    /// Everything over HTTP.
    Http(HttpTransport),
    /// Everything over the WebSocket transport.
    Ws(Arc<RestartableTransport>),
    /// Subscriptions over WebSocket, everything else over HTTP.
    Split {
        /// HTTP transport for queries and mutations.
        http: HttpTransport,
        /// WebSocket transport for subscriptions.
        ws: Arc<RestartableTransport>,
    },
}

impl Route {
    /// Whether an operation of the given kind is routed over WebSocket.
    #[must_use]
    pub const fn uses_websocket(&self, kind: OperationKind) -> bool {
        match self {
            Self::Http(_) => false,
            Self::Ws(_) => true,
            Self::Split { .. } => matches!(kind, OperationKind::Subscription),
        }
    }
}

/// The composed per-client link chain.
pub struct LinkChain {
    name: String,
    config: ClientConfig,
    ctx: ExecutionContext,
    store: Arc<SessionStore>,
    hooks: Arc<Hooks>,
    route: Option<Route>,
}

impl std::fmt::Debug for LinkChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkChain")
            .field("name", &self.name)
            .field("route", &self.route)
            .finish_non_exhaustive()
    }
}

impl LinkChain {
    /// Compose the chain for one client.
    ///
    /// A missing endpoint never fails construction; dispatch over a missing
    /// transport fails per request. The WebSocket transport exists only
    /// in-browser - server rendering completes before any socket handshake
    /// would matter. Returns the chain plus the restartable transport
    /// handle, when one was created, for the registry to own.
    pub fn build(
        name: &str,
        config: ClientConfig,
        ctx: ExecutionContext,
        store: Arc<SessionStore>,
        hooks: Arc<Hooks>,
    ) -> Result<(Self, Option<Arc<RestartableTransport>>), ClientError> {
        let http = HttpTransport::build(&config, &ctx)?;

        let ws = match (&config.ws_endpoint, ctx.is_browser()) {
            (Some(endpoint), true) => {
                let params = connection_params(name, &config, &ctx, &store, &hooks);
                Some(Arc::new(RestartableTransport::new(
                    endpoint.clone(),
                    config.ws_link_options.clone(),
                    params,
                )))
            }
            _ => None,
        };

        let route = match (http, ws.clone()) {
            (Some(http), Some(ws)) => {
                if config.websockets_only {
                    Some(Route::Ws(ws))
                } else {
                    Some(Route::Split { http, ws })
                }
            }
            (Some(http), None) => Some(Route::Http(http)),
            (None, Some(ws)) => Some(Route::Ws(ws)),
            (None, None) => None,
        };

        let chain = Self {
            name: name.to_string(),
            config,
            ctx,
            store,
            hooks,
            route,
        };
        Ok((chain, ws))
    }

    /// The transport routing decision, when any transport exists.
    #[must_use]
    pub const fn route(&self) -> Option<&Route> {
        self.route.as_ref()
    }

    /// The normalized configuration this chain was built from.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Execution context the chain runs under.
    #[must_use]
    pub const fn ctx(&self) -> &ExecutionContext {
        &self.ctx
    }

    /// Dispatch one query or mutation through the chain.
    pub async fn execute(
        &self,
        request: &GraphqlRequest,
    ) -> Result<GraphqlResponse<serde_json::Value>, ClientError> {
        let result = self.dispatch(request).await;
        self.observe(request, &result);
        result
    }

    /// Open a subscription through the chain.
    pub async fn subscribe(
        &self,
        request: GraphqlRequest,
    ) -> Result<SubscriptionStream, ClientError> {
        let ws = match &self.route {
            Some(Route::Ws(ws) | Route::Split { ws, .. }) => Arc::clone(ws),
            Some(Route::Http(_)) | None => {
                let err = ClientError::protocol(format!(
                    "client `{}` has no websocket transport for subscriptions",
                    self.name
                ));
                self.observe(&request, &Err(err.clone()));
                return Err(err);
            }
        };
        let result = ws.subscribe(request.clone()).await;
        if let Err(err) = &result {
            self.observe(&request, &Err(err.clone()));
        }
        result
    }

    async fn dispatch(
        &self,
        request: &GraphqlRequest,
    ) -> Result<GraphqlResponse<serde_json::Value>, ClientError> {
        match &self.route {
            Some(Route::Http(http)) => http.execute(request, self.headers()).await,
            Some(Route::Ws(ws)) => ws.execute(request).await,
            Some(Route::Split { http, ws }) => {
                if request.kind == OperationKind::Subscription {
                    ws.execute(request).await
                } else {
                    http.execute(request, self.headers()).await
                }
            }
            None => Err(ClientError::protocol(format!(
                "client `{}` has no transport configured",
                self.name
            ))),
        }
    }

    /// Auth link: per-request headers resolved fresh for every operation.
    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        let auth = resolve_auth_header_value(
            &self.name,
            &self.config,
            &self.ctx,
            &self.store,
            &self.hooks,
        );
        if let Some(value) = auth {
            let name = HeaderName::from_bytes(self.config.auth_header.as_bytes());
            let value = HeaderValue::from_str(&value);
            if let (Ok(name), Ok(value)) = (name, value) {
                headers.insert(name, value);
            } else {
                debug!(client = self.name.as_str(), "auth header value was not header-safe");
            }
        }

        // The upstream GraphQL server sees the same session cookies the
        // page request carried.
        if !self.ctx.is_browser() && self.config.proxy_cookies {
            if let Some(cookie) = &self.ctx.request_cookie_header {
                if let Ok(value) = HeaderValue::from_str(cookie) {
                    headers.insert(COOKIE, value);
                }
            }
        }

        if self.config.client_awareness {
            if let Ok(value) = HeaderValue::from_str(&self.name) {
                headers.insert(HeaderName::from_static(CLIENT_NAME_HEADER), value);
            }
            headers.insert(
                HeaderName::from_static(CLIENT_VERSION_HEADER),
                HeaderValue::from_static(env!("CARGO_PKG_VERSION")),
            );
        }

        headers
    }

    /// Error link: observes every failure and GraphQL error list, then
    /// always lets the result propagate untouched.
    fn observe(
        &self,
        request: &GraphqlRequest,
        result: &Result<GraphqlResponse<serde_json::Value>, ClientError>,
    ) {
        let event = match result {
            Ok(response) if !response.errors.is_empty() => ErrorEvent {
                client: self.name.clone(),
                operation_name: request.operation_name.clone(),
                graphql_errors: response.errors.clone(),
                network_error: None,
            },
            Err(ClientError::GraphqlErrors { errors }) => ErrorEvent {
                client: self.name.clone(),
                operation_name: request.operation_name.clone(),
                graphql_errors: errors.clone(),
                network_error: None,
            },
            Err(err) => ErrorEvent {
                client: self.name.clone(),
                operation_name: request.operation_name.clone(),
                graphql_errors: Vec::new(),
                network_error: Some(err.to_string()),
            },
            Ok(_) => return,
        };
        self.hooks.emit_error(&event);
    }
}

fn connection_params(
    name: &str,
    config: &ClientConfig,
    ctx: &ExecutionContext,
    store: &Arc<SessionStore>,
    hooks: &Arc<Hooks>,
) -> ConnectionParams {
    let name = name.to_string();
    let config = config.clone();
    let ctx = ctx.clone();
    let store = Arc::clone(store);
    let hooks = Arc::clone(hooks);
    Arc::new(move || {
        let auth = resolve_auth_header_value(&name, &config, &ctx, &store, &hooks)?;
        let mut payload = serde_json::Map::new();
        payload.insert(config.auth_header.clone(), serde_json::Value::String(auth));
        Some(serde_json::Value::Object(payload))
    })
}

#[cfg(test)]
mod tests {
    use graphmux_core::{normalize, ModuleOptions, RawClientConfig};

    use super::*;

    fn build_chain(raw: RawClientConfig, ctx: ExecutionContext) -> LinkChain {
        let config = normalize("default", &raw, &ModuleOptions::default());
        let (chain, _) = LinkChain::build(
            "default",
            config,
            ctx,
            Arc::new(SessionStore::new()),
            Arc::new(Hooks::new()),
        )
        .unwrap();
        chain
    }

    #[test]
    fn split_routes_subscriptions_to_websocket() {
        let chain = build_chain(
            RawClientConfig {
                http_endpoint: Some("http://localhost:4000/graphql".to_string()),
                ws_endpoint: Some("ws://localhost:4000/graphql".to_string()),
                ..RawClientConfig::default()
            },
            ExecutionContext::browser(),
        );
        let route = chain.route().unwrap();
        assert!(route.uses_websocket(OperationKind::Subscription));
        assert!(!route.uses_websocket(OperationKind::Query));
        assert!(!route.uses_websocket(OperationKind::Mutation));
    }

    #[test]
    fn websockets_only_routes_everything_to_websocket() {
        let chain = build_chain(
            RawClientConfig {
                http_endpoint: Some("http://localhost:4000/graphql".to_string()),
                ws_endpoint: Some("ws://localhost:4000/graphql".to_string()),
                websockets_only: Some(true),
                ..RawClientConfig::default()
            },
            ExecutionContext::browser(),
        );
        let route = chain.route().unwrap();
        assert!(route.uses_websocket(OperationKind::Query));
        assert!(route.uses_websocket(OperationKind::Mutation));
        assert!(route.uses_websocket(OperationKind::Subscription));
    }

    #[test]
    fn server_side_never_builds_a_websocket() {
        let chain = build_chain(
            RawClientConfig {
                http_endpoint: Some("http://localhost:4000/graphql".to_string()),
                ws_endpoint: Some("ws://localhost:4000/graphql".to_string()),
                ..RawClientConfig::default()
            },
            ExecutionContext::server(None),
        );
        assert!(matches!(chain.route(), Some(Route::Http(_))));
    }

    #[test]
    fn endpointless_client_constructs_without_a_route() {
        let chain = build_chain(RawClientConfig::default(), ExecutionContext::browser());
        assert!(chain.route().is_none());
    }

    #[tokio::test]
    async fn dispatch_without_transport_fails_per_request() {
        let chain = build_chain(RawClientConfig::default(), ExecutionContext::browser());
        let request = GraphqlRequest::new("{ viewer { id } }", serde_json::json!({}));
        assert!(matches!(
            chain.execute(&request).await,
            Err(ClientError::Protocol { .. })
        ));
    }
}
