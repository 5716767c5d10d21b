//! One configured GraphQL client: a link chain plus its own cache.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use graphmux_core::{
    ClientError, ExecutionSide, FetchPolicy, GraphqlOperation, GraphqlRequest, GraphqlResponse,
};
use graphmux_transport::{LinkChain, SubscriptionStream};

use crate::cache::QueryCache;

/// Deterministic cache/dedup key: query text, variables, and client name.
#[must_use]
pub fn cache_key(request: &GraphqlRequest, client: &str) -> String {
    let mut hasher = DefaultHasher::new();
    client.hash(&mut hasher);
    request.query.as_str().hash(&mut hasher);
    request.variables.to_string().hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// One client: the composed link chain and the cache it owns.
#[derive(Debug)]
pub struct GraphClient {
    name: String,
    chain: LinkChain,
    cache: QueryCache,
    active: RwLock<HashMap<String, GraphqlRequest>>,
}

impl GraphClient {
    pub(crate) fn new(name: &str, chain: LinkChain) -> Self {
        let cache = QueryCache::new(chain.config().in_memory_cache_options.clone());
        if chain.config().connect_to_dev_tools {
            debug!(client = name, "client registered for devtools inspection");
        }
        Self {
            name: name.to_string(),
            chain,
            cache,
            active: RwLock::new(HashMap::new()),
        }
    }

    /// Client name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The client's cache.
    #[must_use]
    pub const fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// The client's link chain.
    #[must_use]
    pub const fn chain(&self) -> &LinkChain {
        &self.chain
    }

    /// The fetch policy applied when the caller does not specify one:
    /// network-first on the server (freshness at render time),
    /// cache-preferred in the browser.
    #[must_use]
    pub fn default_policy(&self) -> FetchPolicy {
        self.chain.config().default_fetch_policy.unwrap_or(
            match self.chain.ctx().side {
                ExecutionSide::Server => FetchPolicy::NetworkOnly,
                ExecutionSide::Browser => FetchPolicy::CacheFirst,
            },
        )
    }

    /// Dispatch a query, consulting the cache per the effective policy.
    ///
    /// Successful data is written back into the cache under the request's
    /// deterministic key regardless of policy, so a server render populates
    /// the snapshot the browser later hydrates from.
    pub async fn query(
        &self,
        request: &GraphqlRequest,
        policy: Option<FetchPolicy>,
    ) -> Result<GraphqlResponse<serde_json::Value>, ClientError> {
        let key = cache_key(request, &self.name);
        let policy = policy.unwrap_or_else(|| self.default_policy());

        if policy == FetchPolicy::CacheFirst {
            if let Some(data) = self.cache.get(&key) {
                return Ok(GraphqlResponse::from_data(data));
            }
        }

        // Active only while the dispatch is in flight; a reset mid-flight
        // re-executes it, a settled one-shot query is forgotten.
        self.active.write().insert(key.clone(), request.clone());
        let result = self.chain.execute(request).await;
        self.active.write().remove(&key);

        let response = result?;
        if let Some(data) = &response.data {
            if response.is_ok() {
                self.cache.insert(&key, data.clone());
            }
        }
        Ok(response)
    }

    /// Dispatch a mutation. Never cached.
    pub async fn mutate(
        &self,
        request: &GraphqlRequest,
    ) -> Result<GraphqlResponse<serde_json::Value>, ClientError> {
        self.chain.execute(request).await
    }

    /// Open a subscription.
    pub async fn subscribe(
        &self,
        request: GraphqlRequest,
    ) -> Result<SubscriptionStream, ClientError> {
        self.chain.subscribe(request).await
    }

    /// Typed query helper.
    pub async fn query_as<O: GraphqlOperation>(
        &self,
        variables: O::Variables,
        policy: Option<FetchPolicy>,
    ) -> Result<O::ResponseData, ClientError> {
        let request = GraphqlRequest::typed::<O>(variables)?;
        self.query(&request, policy)
            .await?
            .deserialize_data::<O::ResponseData>()?
            .into_data()
    }

    /// Typed mutation helper.
    pub async fn mutate_as<O: GraphqlOperation>(
        &self,
        variables: O::Variables,
    ) -> Result<O::ResponseData, ClientError> {
        let request = GraphqlRequest::typed::<O>(variables)?;
        self.mutate(&request)
            .await?
            .deserialize_data::<O::ResponseData>()?
            .into_data()
    }

    /// Clear the cache and re-execute the queries still in flight so the
    /// cache repopulates under the new session. Settled one-shot queries
    /// are not refetched.
    pub async fn reset_store(&self) -> Result<(), ClientError> {
        self.cache.reset();
        let active: Vec<GraphqlRequest> = self.active.read().values().cloned().collect();
        let mut first_error = None;
        for request in active {
            if let Err(err) = self.query(&request, Some(graphmux_core::FetchPolicy::NetworkOnly)).await
            {
                warn!(client = self.name.as_str(), error = %err, "re-execution failed during cache reset");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Deserialize a read-back typed response from a raw request result.
    pub fn deserialize<T: DeserializeOwned>(
        response: GraphqlResponse<serde_json::Value>,
    ) -> Result<T, ClientError> {
        response.deserialize_data::<T>()?.into_data()
    }
}
