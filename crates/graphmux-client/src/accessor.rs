//! One-shot query accessors with in-flight deduplication.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt, Shared};

use graphmux_core::{ClientError, FetchPolicy, GraphqlOperation, GraphqlRequest};

use crate::client::cache_key;
use crate::registry::ClientRegistry;

type SharedQueryFuture = Shared<BoxFuture<'static, Result<serde_json::Value, ClientError>>>;

/// Options for one accessor call.
#[derive(Debug, Clone, Default)]
pub struct AsyncQueryOptions {
    /// Explicit dedup key; defaults to a hash of document, variables, and
    /// resolved client name.
    pub key: Option<String>,
    /// `true` prefers the cache, `false` always hits the network. Unset
    /// falls back to the client's side-dependent default policy.
    pub cache: Option<bool>,
    /// Client name; unknown or unset names resolve to the default client.
    pub client: Option<String>,
}

/// Request-dispatch helper bound to the client registry.
///
/// Concurrent or repeated calls carrying the same key share a single
/// in-flight request instead of dispatching twice.
#[derive(Clone)]
pub struct AsyncQuery {
    registry: Arc<ClientRegistry>,
    in_flight: Arc<tokio::sync::Mutex<HashMap<String, SharedQueryFuture>>>,
}

impl std::fmt::Debug for AsyncQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncQuery").finish_non_exhaustive()
    }
}

impl AsyncQuery {
    /// Create an accessor over a registry.
    #[must_use]
    pub fn new(registry: Arc<ClientRegistry>) -> Self {
        Self {
            registry,
            in_flight: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
        }
    }

    /// Dispatch a query and resolve its data.
    ///
    /// Rejects with the underlying GraphQL/network error intact so callers
    /// can inspect the error list directly.
    pub async fn query(
        &self,
        query: &str,
        variables: serde_json::Value,
        options: AsyncQueryOptions,
    ) -> Result<serde_json::Value, ClientError> {
        let entry = self.registry.resolve(options.client.as_deref());
        let request = GraphqlRequest::new(query, variables);
        let key = options
            .key
            .unwrap_or_else(|| cache_key(&request, &entry.name));
        let policy = options.cache.map(|cached| {
            if cached {
                FetchPolicy::CacheFirst
            } else {
                FetchPolicy::NetworkOnly
            }
        });

        let mut guard = self.in_flight.lock().await;
        if let Some(shared) = guard.get(&key).cloned() {
            drop(guard);
            return shared.await;
        }

        let client = Arc::clone(&entry.client);
        let future = async move { client.query(&request, policy).await?.into_data() }
            .boxed()
            .shared();
        guard.insert(key.clone(), future.clone());
        drop(guard);

        let result = future.await;
        self.in_flight.lock().await.remove(&key);
        result
    }

    /// Typed accessor variant.
    pub async fn query_as<O: GraphqlOperation>(
        &self,
        variables: O::Variables,
        options: AsyncQueryOptions,
    ) -> Result<O::ResponseData, ClientError> {
        let variables = serde_json::to_value(&variables)?;
        let data = self.query(O::QUERY, variables, options).await?;
        Ok(serde_json::from_value(data)?)
    }
}
