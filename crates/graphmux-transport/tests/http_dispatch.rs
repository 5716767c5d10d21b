//! HTTP dispatch through the full link chain against a mock server.

use std::sync::Arc;

use parking_lot::Mutex;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use graphmux_core::{
    normalize, ClientError, ErrorEvent, ExecutionContext, GraphqlRequest, Hooks, ModuleOptions,
    RawClientConfig, SessionStore, TokenStorage,
};
use graphmux_transport::LinkChain;

fn chain_for(
    endpoint: &str,
    ctx: ExecutionContext,
    store: Arc<SessionStore>,
    hooks: Arc<Hooks>,
) -> LinkChain {
    let raw = RawClientConfig {
        http_endpoint: Some(endpoint.to_string()),
        ..RawClientConfig::default()
    };
    let config = normalize("default", &raw, &ModuleOptions::default());
    let (chain, _) = LinkChain::build("default", config, ctx, store, hooks).unwrap();
    chain
}

#[tokio::test]
async fn stored_cookie_token_becomes_bearer_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(header("authorization", "Bearer tok123"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "viewer": { "id": "1" } }
            })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(SessionStore::new());
    store.set(TokenStorage::Cookie, "apollo:default.token", "tok123");
    let chain = chain_for(
        &format!("{}/graphql", server.uri()),
        ExecutionContext::browser(),
        store,
        Arc::new(Hooks::new()),
    );

    let request = GraphqlRequest::new("{ viewer { id } }", serde_json::json!({}));
    let response = chain.execute(&request).await.unwrap();
    assert_eq!(
        response.data,
        Some(serde_json::json!({ "viewer": { "id": "1" } }))
    );
}

#[tokio::test]
async fn server_render_forwards_request_cookies_and_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(header("authorization", "Bearer from-request"))
        .and(header("cookie", "apollo:default.token=from-request; theme=dark"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "data": { "ok": true } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let ctx = ExecutionContext::server(Some(
        "apollo:default.token=from-request; theme=dark".to_string(),
    ));
    let chain = chain_for(
        &format!("{}/graphql", server.uri()),
        ctx,
        Arc::new(SessionStore::new()),
        Arc::new(Hooks::new()),
    );

    let request = GraphqlRequest::new("{ ok }", serde_json::json!({}));
    let response = chain.execute(&request).await.unwrap();
    assert_eq!(response.data, Some(serde_json::json!({ "ok": true })));
}

#[tokio::test]
async fn graphql_errors_reach_error_handlers_and_propagate() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": null,
                "errors": [{ "message": "boom" }]
            })),
        )
        .mount(&server)
        .await;

    let hooks = Arc::new(Hooks::new());
    let seen: Arc<Mutex<Vec<ErrorEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    hooks.on_error(move |event| sink.lock().push(event.clone()));

    let chain = chain_for(
        &format!("{}/graphql", server.uri()),
        ExecutionContext::browser(),
        Arc::new(SessionStore::new()),
        hooks,
    );

    let request =
        GraphqlRequest::new("query Broken { nope }", serde_json::json!({}))
            .with_operation_name("Broken");
    let response = chain.execute(&request).await.unwrap();
    assert!(!response.is_ok());

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].client, "default");
    assert_eq!(seen[0].operation_name.as_deref(), Some("Broken"));
    assert_eq!(seen[0].graphql_errors[0].message, "boom");
    assert_eq!(seen[0].network_error, None);
}

#[tokio::test]
async fn http_error_status_surfaces_as_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let hooks = Arc::new(Hooks::new());
    let seen: Arc<Mutex<Vec<ErrorEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    hooks.on_error(move |event| sink.lock().push(event.clone()));

    let chain = chain_for(
        &format!("{}/graphql", server.uri()),
        ExecutionContext::browser(),
        Arc::new(SessionStore::new()),
        hooks,
    );

    let request = GraphqlRequest::new("{ ok }", serde_json::json!({}));
    let err = chain.execute(&request).await.unwrap_err();
    assert!(matches!(err, ClientError::HttpStatus { status: 503, .. }));

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].graphql_errors.is_empty());
    assert!(seen[0].network_error.as_deref().unwrap().contains("503"));
}

#[tokio::test]
async fn oversized_multibyte_error_bodies_reject_with_the_status() {
    let server = MockServer::start().await;
    // A multibyte char straddling the truncation offset must not panic.
    let mut body = "a".repeat(4095);
    body.push('€');
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(503).set_body_string(body))
        .mount(&server)
        .await;

    let chain = chain_for(
        &format!("{}/graphql", server.uri()),
        ExecutionContext::browser(),
        Arc::new(SessionStore::new()),
        Arc::new(Hooks::new()),
    );

    let request = GraphqlRequest::new("{ ok }", serde_json::json!({}));
    let err = chain.execute(&request).await.unwrap_err();
    match err {
        ClientError::HttpStatus { status, body } => {
            assert_eq!(status, 503);
            assert!(body.ends_with('…'));
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_token_omits_the_auth_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "data": { "ok": true } })),
        )
        .mount(&server)
        .await;

    let chain = chain_for(
        &format!("{}/graphql", server.uri()),
        ExecutionContext::browser(),
        Arc::new(SessionStore::new()),
        Arc::new(Hooks::new()),
    );

    let request = GraphqlRequest::new("{ ok }", serde_json::json!({}));
    chain.execute(&request).await.unwrap();

    let received = &server.received_requests().await.unwrap()[0];
    assert!(!received.headers.contains_key("authorization"));
}
