//! GraphQL-over-HTTP transport.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};

use graphmux_core::{ClientConfig, ClientError, ExecutionContext, GraphqlRequest, GraphqlResponse};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Terminating HTTP link. Posts the standard `query`/`variables` JSON body.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    endpoint: String,
    http: reqwest::Client,
}

impl HttpTransport {
    /// Build the transport for a client, or `None` when the config carries
    /// no HTTP endpoint. In-browser, `browserHttpEndpoint` wins.
    pub fn build(
        config: &ClientConfig,
        ctx: &ExecutionContext,
    ) -> Result<Option<Self>, ClientError> {
        let endpoint = if ctx.is_browser() {
            config
                .browser_http_endpoint
                .as_ref()
                .or(config.http_endpoint.as_ref())
        } else {
            config.http_endpoint.as_ref()
        };
        let Some(endpoint) = endpoint else {
            return Ok(None);
        };

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in &config.http_link_options.headers {
            let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
                continue;
            };
            if let Ok(value) = HeaderValue::from_str(value) {
                headers.insert(name, value);
            }
        }

        let timeout = config
            .http_link_options
            .timeout_secs
            .map_or(DEFAULT_TIMEOUT, Duration::from_secs);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Some(Self {
            endpoint: endpoint.clone(),
            http,
        }))
    }

    /// Endpoint this transport posts to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Dispatch one operation with per-request headers.
    pub async fn execute(
        &self,
        request: &GraphqlRequest,
        headers: HeaderMap,
    ) -> Result<GraphqlResponse<serde_json::Value>, ClientError> {
        let response = self
            .http
            .post(&self.endpoint)
            .headers(headers)
            .json(&request.body())
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(ClientError::HttpStatus {
                status: status.as_u16(),
                body: truncate_body(&bytes),
            });
        }

        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn truncate_body(bytes: &[u8]) -> String {
    const MAX_LEN: usize = 4096;
    let mut body = String::from_utf8_lossy(bytes).to_string();
    if body.len() > MAX_LEN {
        // Cut must land on a char boundary or truncate panics.
        let mut cut = MAX_LEN;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push('…');
    }
    body
}

#[cfg(test)]
mod tests {
    use graphmux_core::{normalize, ModuleOptions, RawClientConfig};

    use super::*;

    fn config(http: Option<&str>, browser: Option<&str>) -> ClientConfig {
        let raw = RawClientConfig {
            http_endpoint: http.map(str::to_string),
            browser_http_endpoint: browser.map(str::to_string),
            ..RawClientConfig::default()
        };
        normalize("default", &raw, &ModuleOptions::default())
    }

    #[test]
    fn browser_endpoint_wins_in_browser_only() {
        let config = config(Some("http://internal/graphql"), Some("http://public/graphql"));

        let browser = HttpTransport::build(&config, &ExecutionContext::browser())
            .unwrap()
            .unwrap();
        assert_eq!(browser.endpoint(), "http://public/graphql");

        let server = HttpTransport::build(&config, &ExecutionContext::server(None))
            .unwrap()
            .unwrap();
        assert_eq!(server.endpoint(), "http://internal/graphql");
    }

    #[test]
    fn body_truncation_respects_char_boundaries() {
        let mut body = vec![b'a'; 4095];
        body.extend_from_slice("€".as_bytes());
        let truncated = truncate_body(&body);
        assert_eq!(truncated.chars().filter(|c| *c == 'a').count(), 4095);
        assert!(truncated.ends_with('…'));
    }

    #[test]
    fn missing_endpoint_builds_nothing() {
        let config = config(None, None);
        assert!(HttpTransport::build(&config, &ExecutionContext::browser())
            .unwrap()
            .is_none());
    }
}
