//! Client registry and cache hydration across the render boundary.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use graphmux_core::{ClientConfig, ExecutionContext, Hooks, SessionStore, SetupError};
use graphmux_transport::{LinkChain, RestartableTransport};

use crate::cache::CacheSnapshot;
use crate::client::GraphClient;

/// Render-payload slot prefix for serialized caches.
const PAYLOAD_PREFIX: &str = "_graphmux:";

/// One registry entry. The registry exclusively owns the constructed client;
/// callers only reference it.
#[derive(Debug)]
pub struct RegistryEntry {
    /// Client name.
    pub name: String,
    /// The constructed client.
    pub client: Arc<GraphClient>,
    /// Normalized configuration the client was built from.
    pub config: ClientConfig,
    /// Restartable WebSocket transport, present in-browser when the client
    /// has a WS endpoint. Replaced only through `restart()`.
    pub ws: Option<Arc<RestartableTransport>>,
}

/// Server-to-browser render payload: one serialized cache per client name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderPayload {
    #[serde(flatten)]
    slots: BTreeMap<String, CacheSnapshot>,
}

impl RenderPayload {
    /// The payload key for a client name.
    #[must_use]
    pub fn key(client: &str) -> String {
        format!("{PAYLOAD_PREFIX}{client}")
    }

    /// Store a client's snapshot.
    pub fn insert(&mut self, client: &str, snapshot: CacheSnapshot) {
        self.slots.insert(Self::key(client), snapshot);
    }

    /// Fetch a client's snapshot.
    #[must_use]
    pub fn get(&self, client: &str) -> Option<&CacheSnapshot> {
        self.slots.get(&Self::key(client))
    }

    /// Returns `true` when no slot is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Process-wide (or per-request, on the server) client lookup.
///
/// Populated once at setup, then read-mostly: the only later mutation is
/// WebSocket transport replacement inside `restart()`, confined to one
/// client's entry.
#[derive(Debug)]
pub struct ClientRegistry {
    entries: BTreeMap<String, RegistryEntry>,
    default_name: String,
    ctx: ExecutionContext,
    store: Arc<SessionStore>,
    hooks: Arc<Hooks>,
}

impl ClientRegistry {
    /// Build exactly one client per configured name.
    ///
    /// When no client is named `default`, the first configured name is
    /// promoted to serve as the default.
    pub fn build(
        configs: BTreeMap<String, ClientConfig>,
        ctx: ExecutionContext,
        store: Arc<SessionStore>,
        hooks: Arc<Hooks>,
    ) -> Result<Self, SetupError> {
        if configs.is_empty() {
            return Err(SetupError::NoClientsConfigured);
        }

        let default_name = if configs.contains_key("default") {
            "default".to_string()
        } else {
            configs.keys().next().cloned().unwrap_or_default()
        };

        let mut entries = BTreeMap::new();
        for (name, config) in configs {
            let (chain, ws) = LinkChain::build(
                &name,
                config.clone(),
                ctx.clone(),
                Arc::clone(&store),
                Arc::clone(&hooks),
            )
            .map_err(|err| SetupError::ClientBuild {
                client: name.clone(),
                message: err.to_string(),
            })?;
            let client = Arc::new(GraphClient::new(&name, chain));
            entries.insert(
                name.clone(),
                RegistryEntry {
                    name,
                    client,
                    config,
                    ws,
                },
            );
        }

        Ok(Self {
            entries,
            default_name,
            ctx,
            store,
            hooks,
        })
    }

    /// Execution context the registry was built under.
    #[must_use]
    pub const fn ctx(&self) -> &ExecutionContext {
        &self.ctx
    }

    /// The session store shared by every client.
    #[must_use]
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// The hook registries shared by every client.
    #[must_use]
    pub fn hooks(&self) -> &Arc<Hooks> {
        &self.hooks
    }

    /// Configured client names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Name of the default client.
    #[must_use]
    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    /// Look up an entry by exact name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RegistryEntry> {
        self.entries.get(name)
    }

    /// The default entry.
    ///
    /// # Panics
    /// Never panics for a registry produced by [`ClientRegistry::build`],
    /// which guarantees at least one entry.
    #[must_use]
    pub fn default_entry(&self) -> &RegistryEntry {
        self.entries
            .get(&self.default_name)
            .expect("registry always holds its default client")
    }

    /// Resolve a requested client name, falling back to the default with a
    /// diagnostic when the name is unknown.
    #[must_use]
    pub fn resolve(&self, name: Option<&str>) -> &RegistryEntry {
        match name {
            Some(requested) => self.entries.get(requested).unwrap_or_else(|| {
                warn!(
                    client = requested,
                    fallback = self.default_name.as_str(),
                    "unknown client requested, falling back to default"
                );
                self.default_entry()
            }),
            None => self.default_entry(),
        }
    }

    /// Serialize every client's cache into the render payload.
    ///
    /// Call only after all in-flight queries for the render have settled.
    #[must_use]
    pub fn extract_snapshots(&self) -> RenderPayload {
        let mut payload = RenderPayload::default();
        for entry in self.entries.values() {
            payload.insert(&entry.name, entry.client.cache().extract());
        }
        payload
    }

    /// Restore each client's cache from its render-payload slot.
    ///
    /// Must run before the first query accessor call resolves; a late
    /// hydration only costs a duplicate fetch, never incorrectness.
    pub fn hydrate(&self, payload: &RenderPayload) {
        for entry in self.entries.values() {
            if let Some(snapshot) = payload.get(&entry.name) {
                entry.client.cache().restore(snapshot);
            }
        }
    }
}
