//! Client configuration model and normalizer.
//!
//! Each named client is declared either inline or as a path to an external
//! config file. Path entries are resolved exactly once through a
//! [`ConfigLoader`]; normalization itself is pure data merging.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::SetupError;

/// Where the session token for a client lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TokenStorage {
    /// Cookie jar (readable during server rendering from the request header).
    #[default]
    Cookie,
    /// Browser local storage. Yields no token during server rendering.
    LocalStorage,
}

/// Cookie attributes applied when persisting a session token.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieAttributes {
    /// Cookie path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Max age in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age_secs: Option<u64>,
    /// Secure flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    /// SameSite policy (`Strict`, `Lax`, or `None`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

impl CookieAttributes {
    /// Deep-merge: every field set here wins, unset fields fall back to
    /// `defaults`. Never a shallow overwrite of the whole block.
    #[must_use]
    pub fn merged_over(&self, defaults: &Self) -> Self {
        Self {
            path: self.path.clone().or_else(|| defaults.path.clone()),
            max_age_secs: self.max_age_secs.or(defaults.max_age_secs),
            secure: self.secure.or(defaults.secure),
            same_site: self.same_site.clone().or_else(|| defaults.same_site.clone()),
        }
    }

    /// Serialize as a `Set-Cookie` header value.
    #[must_use]
    pub fn to_set_cookie(&self, name: &str, value: &str) -> String {
        let mut out = format!("{name}={value}");
        if let Some(path) = &self.path {
            out.push_str("; Path=");
            out.push_str(path);
        }
        if let Some(max_age) = self.max_age_secs {
            out.push_str(&format!("; Max-Age={max_age}"));
        }
        if self.secure == Some(true) {
            out.push_str("; Secure");
        }
        if let Some(same_site) = &self.same_site {
            out.push_str("; SameSite=");
            out.push_str(same_site);
        }
        out
    }
}

/// Pass-through options for the HTTP transport.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpLinkOptions {
    /// Extra headers applied to every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Request timeout in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// Pass-through options for the WebSocket transport.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsLinkOptions {
    /// Connection handshake timeout in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout_secs: Option<u64>,
    /// Time to wait for `connection_ack` in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ack_timeout_secs: Option<u64>,
}

/// Options for the normalized query cache.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InMemoryCacheOptions {
    /// Upper bound on cached results; oldest entries are evicted first.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_entries: Option<usize>,
}

/// Fetch policy for query dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FetchPolicy {
    /// Answer from the cache when possible, hit the network on a miss.
    CacheFirst,
    /// Always hit the network.
    NetworkOnly,
}

/// Raw per-client configuration as read from the configuration input.
///
/// Every field is optional; [`normalize`] fills in module defaults and
/// derived values. An `authType` of `""` explicitly disables the scheme
/// prefix (normalizes to `None`), while an absent `authType` inherits the
/// module default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawClientConfig {
    /// HTTP endpoint.
    pub http_endpoint: Option<String>,
    /// HTTP endpoint override used only in-browser.
    pub browser_http_endpoint: Option<String>,
    /// WebSocket endpoint.
    pub ws_endpoint: Option<String>,
    /// Session token name.
    pub token_name: Option<String>,
    /// Token storage mode.
    pub token_storage: Option<TokenStorage>,
    /// Auth scheme prefix.
    pub auth_type: Option<String>,
    /// Auth header name.
    pub auth_header: Option<String>,
    /// Cookie attributes (deep-merged with module defaults).
    pub cookie_attributes: Option<CookieAttributes>,
    /// HTTP transport options.
    pub http_link_options: Option<HttpLinkOptions>,
    /// WebSocket transport options.
    pub ws_link_options: Option<WsLinkOptions>,
    /// Cache options.
    pub in_memory_cache_options: Option<InMemoryCacheOptions>,
    /// Default fetch policy for queries.
    pub default_fetch_policy: Option<FetchPolicy>,
    /// Route every operation over the WebSocket transport.
    pub websockets_only: Option<bool>,
    /// Announce the client to devtools.
    pub connect_to_dev_tools: Option<bool>,
}

/// Fully normalized per-client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// HTTP endpoint.
    pub http_endpoint: Option<String>,
    /// HTTP endpoint override used only in-browser.
    pub browser_http_endpoint: Option<String>,
    /// WebSocket endpoint.
    pub ws_endpoint: Option<String>,
    /// Session token name.
    pub token_name: String,
    /// Token storage mode.
    pub token_storage: TokenStorage,
    /// Auth scheme prefix. `None` disables prefixing.
    pub auth_type: Option<String>,
    /// Auth header name.
    pub auth_header: String,
    /// Cookie attributes.
    pub cookie_attributes: CookieAttributes,
    /// HTTP transport options.
    pub http_link_options: HttpLinkOptions,
    /// WebSocket transport options.
    pub ws_link_options: WsLinkOptions,
    /// Cache options.
    pub in_memory_cache_options: InMemoryCacheOptions,
    /// Default fetch policy for queries.
    pub default_fetch_policy: Option<FetchPolicy>,
    /// Route every operation over the WebSocket transport.
    pub websockets_only: bool,
    /// Announce the client to devtools.
    pub connect_to_dev_tools: bool,
    /// Forward the original request's cookie header to the upstream server.
    pub proxy_cookies: bool,
    /// Attach client-identifying headers to outgoing requests.
    pub client_awareness: bool,
}

impl ClientConfig {
    /// Returns `true` if the client has any transport endpoint at all.
    #[must_use]
    pub fn has_endpoint(&self) -> bool {
        self.http_endpoint.is_some() || self.ws_endpoint.is_some()
    }
}

/// Module-wide defaults applied when a client config omits a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleOptions {
    /// Default auth scheme prefix.
    pub auth_type: Option<String>,
    /// Default auth header name.
    pub auth_header: String,
    /// Default token storage mode.
    pub token_storage: TokenStorage,
    /// Default cookie attributes.
    pub cookie_attributes: CookieAttributes,
    /// Default fetch policy.
    pub default_fetch_policy: Option<FetchPolicy>,
    /// Forward request cookies to the upstream server.
    pub proxy_cookies: bool,
    /// Attach client-identifying headers.
    pub client_awareness: bool,
}

impl Default for ModuleOptions {
    fn default() -> Self {
        Self {
            auth_type: Some("Bearer".to_string()),
            auth_header: "Authorization".to_string(),
            token_storage: TokenStorage::Cookie,
            cookie_attributes: CookieAttributes {
                path: Some("/".to_string()),
                max_age_secs: Some(60 * 60 * 24 * 7),
                secure: None,
                same_site: None,
            },
            default_fetch_policy: None,
            proxy_cookies: true,
            client_awareness: false,
        }
    }
}

/// Normalize one client's raw configuration against module defaults.
///
/// Derivation order: token name, auth header, auth type, token storage,
/// cookie attributes (deep merge), fetch policy (client wins). A client
/// missing both endpoints is reported and still returned; it will fail at
/// request time without aborting the other clients' setup.
#[must_use]
pub fn normalize(name: &str, raw: &RawClientConfig, defaults: &ModuleOptions) -> ClientConfig {
    let auth_type = match &raw.auth_type {
        Some(scheme) if scheme.is_empty() => None,
        Some(scheme) => Some(scheme.clone()),
        None => defaults.auth_type.clone(),
    };

    let config = ClientConfig {
        http_endpoint: raw.http_endpoint.clone(),
        browser_http_endpoint: raw.browser_http_endpoint.clone(),
        ws_endpoint: raw.ws_endpoint.clone(),
        token_name: raw
            .token_name
            .clone()
            .unwrap_or_else(|| format!("apollo:{name}.token")),
        token_storage: raw.token_storage.unwrap_or(defaults.token_storage),
        auth_type,
        auth_header: raw
            .auth_header
            .clone()
            .unwrap_or_else(|| defaults.auth_header.clone()),
        cookie_attributes: raw
            .cookie_attributes
            .as_ref()
            .map_or_else(
                || defaults.cookie_attributes.clone(),
                |attrs| attrs.merged_over(&defaults.cookie_attributes),
            ),
        http_link_options: raw.http_link_options.clone().unwrap_or_default(),
        ws_link_options: raw.ws_link_options.clone().unwrap_or_default(),
        in_memory_cache_options: raw.in_memory_cache_options.clone().unwrap_or_default(),
        default_fetch_policy: raw.default_fetch_policy.or(defaults.default_fetch_policy),
        websockets_only: raw.websockets_only.unwrap_or(false),
        connect_to_dev_tools: raw.connect_to_dev_tools.unwrap_or(false),
        proxy_cookies: defaults.proxy_cookies,
        client_awareness: defaults.client_awareness,
    };

    if !config.has_endpoint() {
        warn!(
            client = name,
            "either `httpEndpoint` or `wsEndpoint` must be provided; \
             the client is constructed but will fail at request time"
        );
    }

    config
}

/// A client config entry: inline data or a path to load.
///
/// The variant is resolved once at setup; nothing downstream re-inspects it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientConfigSource {
    /// A path to a file exporting a [`RawClientConfig`].
    Path(PathBuf),
    /// Inline configuration.
    Inline(RawClientConfig),
}

/// Collaborator that loads external client config files.
pub trait ConfigLoader {
    /// Load a raw client config from a path.
    fn load(&self, path: &Path) -> Result<RawClientConfig, SetupError>;
}

/// Loads client configs from JSON files.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonConfigLoader;

impl ConfigLoader for JsonConfigLoader {
    fn load(&self, path: &Path) -> Result<RawClientConfig, SetupError> {
        let client = path.display().to_string();
        let contents = fs::read_to_string(path).map_err(|err| SetupError::ConfigLoad {
            client: client.clone(),
            message: err.to_string(),
        })?;
        serde_json::from_str(&contents).map_err(|err| SetupError::ConfigLoad {
            client,
            message: err.to_string(),
        })
    }
}

/// The module-level configuration input. Its shape is a hard contract with
/// the host application's config loading.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleConfig {
    /// Named client configurations.
    pub clients: BTreeMap<String, ClientConfigSource>,
    /// Module-wide defaults.
    #[serde(default, flatten)]
    pub defaults: ModuleOptionsInput,
}

/// Serde-facing mirror of [`ModuleOptions`] with every field optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleOptionsInput {
    /// Default auth scheme prefix.
    pub auth_type: Option<String>,
    /// Default auth header name.
    pub auth_header: Option<String>,
    /// Default token storage mode.
    pub token_storage: Option<TokenStorage>,
    /// Default cookie attributes.
    pub cookie_attributes: Option<CookieAttributes>,
    /// Default fetch policy.
    pub default_fetch_policy: Option<FetchPolicy>,
    /// Forward request cookies to the upstream server.
    pub proxy_cookies: Option<bool>,
    /// Attach client-identifying headers.
    pub client_awareness: Option<bool>,
}

impl ModuleOptionsInput {
    /// Fill unset fields from the built-in defaults.
    #[must_use]
    pub fn into_options(self) -> ModuleOptions {
        let base = ModuleOptions::default();
        ModuleOptions {
            auth_type: self.auth_type.map_or(base.auth_type, |scheme| {
                if scheme.is_empty() {
                    None
                } else {
                    Some(scheme)
                }
            }),
            auth_header: self.auth_header.unwrap_or(base.auth_header),
            token_storage: self.token_storage.unwrap_or(base.token_storage),
            cookie_attributes: self
                .cookie_attributes
                .map_or(base.cookie_attributes.clone(), |attrs| {
                    attrs.merged_over(&base.cookie_attributes)
                }),
            default_fetch_policy: self.default_fetch_policy.or(base.default_fetch_policy),
            proxy_cookies: self.proxy_cookies.unwrap_or(base.proxy_cookies),
            client_awareness: self.client_awareness.unwrap_or(base.client_awareness),
        }
    }
}

impl ModuleConfig {
    /// Resolve every client entry and normalize it.
    ///
    /// Path entries that fail to load are reported and skipped; zero
    /// resolvable clients is fatal.
    pub fn resolve_clients(
        &self,
        loader: &dyn ConfigLoader,
    ) -> Result<BTreeMap<String, ClientConfig>, SetupError> {
        if self.clients.is_empty() {
            return Err(SetupError::NoClientsConfigured);
        }

        let defaults = self.defaults.clone().into_options();
        let mut resolved = BTreeMap::new();
        for (name, source) in &self.clients {
            let raw = match source {
                ClientConfigSource::Inline(raw) => raw.clone(),
                ClientConfigSource::Path(path) => match loader.load(path) {
                    Ok(raw) => raw,
                    Err(err) => {
                        warn!(client = name.as_str(), error = %err, "unable to resolve client config");
                        continue;
                    }
                },
            };
            resolved.insert(name.clone(), normalize(name, &raw, &defaults));
        }

        if resolved.is_empty() {
            return Err(SetupError::NoClientsConfigured);
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_token_name_from_client_name() {
        let config = normalize("admin", &RawClientConfig::default(), &ModuleOptions::default());
        assert_eq!(config.token_name, "apollo:admin.token");
        assert_eq!(config.auth_header, "Authorization");
        assert_eq!(config.auth_type.as_deref(), Some("Bearer"));
        assert_eq!(config.token_storage, TokenStorage::Cookie);
    }

    #[test]
    fn client_values_win_over_module_defaults() {
        let raw = RawClientConfig {
            token_name: Some("session".to_string()),
            auth_header: Some("X-Auth".to_string()),
            token_storage: Some(TokenStorage::LocalStorage),
            default_fetch_policy: Some(FetchPolicy::CacheFirst),
            ..RawClientConfig::default()
        };
        let defaults = ModuleOptions {
            default_fetch_policy: Some(FetchPolicy::NetworkOnly),
            ..ModuleOptions::default()
        };
        let config = normalize("default", &raw, &defaults);
        assert_eq!(config.token_name, "session");
        assert_eq!(config.auth_header, "X-Auth");
        assert_eq!(config.token_storage, TokenStorage::LocalStorage);
        assert_eq!(config.default_fetch_policy, Some(FetchPolicy::CacheFirst));
    }

    #[test]
    fn empty_auth_type_disables_prefixing() {
        let raw = RawClientConfig {
            auth_type: Some(String::new()),
            ..RawClientConfig::default()
        };
        let config = normalize("default", &raw, &ModuleOptions::default());
        assert_eq!(config.auth_type, None);
    }

    #[test]
    fn cookie_attributes_deep_merge() {
        let raw = RawClientConfig {
            cookie_attributes: Some(CookieAttributes {
                secure: Some(true),
                ..CookieAttributes::default()
            }),
            ..RawClientConfig::default()
        };
        let config = normalize("default", &raw, &ModuleOptions::default());
        // Client's `secure` wins, module default max-age survives the merge.
        assert_eq!(config.cookie_attributes.secure, Some(true));
        assert_eq!(config.cookie_attributes.max_age_secs, Some(60 * 60 * 24 * 7));
        assert_eq!(config.cookie_attributes.path.as_deref(), Some("/"));
    }

    #[test]
    fn missing_endpoints_still_constructs() {
        let config = normalize("broken", &RawClientConfig::default(), &ModuleOptions::default());
        assert!(!config.has_endpoint());
    }

    #[test]
    fn set_cookie_serialization() {
        let attrs = CookieAttributes {
            path: Some("/".to_string()),
            max_age_secs: Some(3600),
            secure: Some(true),
            same_site: Some("Lax".to_string()),
        };
        assert_eq!(
            attrs.to_set_cookie("t", "v"),
            "t=v; Path=/; Max-Age=3600; Secure; SameSite=Lax"
        );
    }

    #[test]
    fn zero_clients_is_fatal() {
        let module = ModuleConfig::default();
        assert!(matches!(
            module.resolve_clients(&JsonConfigLoader),
            Err(SetupError::NoClientsConfigured)
        ));
    }

    #[test]
    fn unresolvable_path_entries_are_skipped() {
        let mut clients = BTreeMap::new();
        clients.insert(
            "default".to_string(),
            ClientConfigSource::Inline(RawClientConfig {
                http_endpoint: Some("http://localhost:4000/graphql".to_string()),
                ..RawClientConfig::default()
            }),
        );
        clients.insert(
            "external".to_string(),
            ClientConfigSource::Path(PathBuf::from("/nonexistent/client.json")),
        );
        let module = ModuleConfig {
            clients,
            defaults: ModuleOptionsInput::default(),
        };
        let resolved = module.resolve_clients(&JsonConfigLoader).unwrap();
        assert_eq!(resolved.len(), 1);
        assert!(resolved.contains_key("default"));
    }
}
