//! Network transport.
//!
//! [`Transport`] is the single seam between the gateway and the network.
//! The gateway only ever hands it a registry descriptor and validated
//! parameters; there is no way to name an arbitrary URL.
//!
//! [`HttpTransport`] is the reqwest-backed implementation. Tests inject
//! scripted transports through the same trait.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::redirect::Policy;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::registry::{EndpointDescriptor, HttpMethod};
use crate::types::Params;
use crate::{GatewayError, RateLimitOrigin, Result};

/// Maximum redirects followed, all of which must stay on the registered host.
const MAX_REDIRECTS: usize = 5;

/// Issues one call to a registered endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Name for logs.
    fn name(&self) -> &str;

    /// Call `endpoint` with `params`.
    ///
    /// Must map outcomes onto the gateway taxonomy: HTTP 200 with a JSON
    /// body is `Ok`, 429 is `RateLimited { Provider }`, any other status
    /// is `Http`, and transport or parse failures are `Network`.
    async fn send(&self, endpoint: &EndpointDescriptor, params: &Params) -> Result<Value>;
}

/// HTTP client settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout in seconds (default: 60).
    pub timeout_secs: u64,
    /// User-Agent header (default: `astrolabe/<version>`).
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            user_agent: format!("astrolabe/{}", crate::PKG_VERSION),
        }
    }
}

/// reqwest-backed [`Transport`].
#[derive(Clone)]
pub struct HttpTransport {
    http: Client,
}

impl HttpTransport {
    /// Create a transport with default settings.
    pub fn new() -> Result<Self> {
        Self::with_config(&HttpConfig::default())
    }

    pub fn with_config(config: &HttpConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .redirect(same_host_redirects())
            .build()
            .map_err(|e| GatewayError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }

    /// Build the URL for a call: GET parameters go in the query string.
    fn request_url(endpoint: &EndpointDescriptor, params: &Params) -> Result<Url> {
        if !matches!(endpoint.url.scheme(), "http" | "https") {
            return Err(GatewayError::Configuration(format!(
                "endpoint {} has non-http url {}",
                endpoint.id, endpoint.url
            )));
        }
        let mut url = endpoint.url.clone();
        if endpoint.method == HttpMethod::Get && !params.is_empty() {
            let mut query = url.query_pairs_mut();
            for (name, value) in params.iter() {
                query.append_pair(name, &value.to_string());
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn send(&self, endpoint: &EndpointDescriptor, params: &Params) -> Result<Value> {
        let url = Self::request_url(endpoint, params)?;
        debug!(endpoint = %endpoint.id, method = endpoint.method.as_str(), %url, "sending request");

        let request = match endpoint.method {
            HttpMethod::Get => self.http.get(url),
            HttpMethod::Post => self.http.post(url).json(&params.to_json()),
        };

        let response = request
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        check_status(response.status())?;

        let body = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;
        serde_json::from_slice(&body)
            .map_err(|e| GatewayError::Network(format!("invalid JSON response: {e}")))
    }
}

/// Map a response status onto the gateway taxonomy.
fn check_status(status: StatusCode) -> Result<()> {
    match status {
        StatusCode::OK => Ok(()),
        StatusCode::TOO_MANY_REQUESTS => Err(GatewayError::RateLimited {
            origin: RateLimitOrigin::Provider,
        }),
        other => Err(GatewayError::Http {
            status: other.as_u16(),
            message: format!(
                "HTTP {}: {}",
                other.as_u16(),
                other.canonical_reason().unwrap_or("Unknown Status")
            ),
        }),
    }
}

/// Follow redirects only while they stay on the original host and scheme.
fn same_host_redirects() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() > MAX_REDIRECTS {
            return attempt.error("too many redirects");
        }
        let allowed = attempt
            .previous()
            .first()
            .is_some_and(|origin| redirect_allowed(origin, attempt.url()));
        if allowed {
            attempt.follow()
        } else {
            attempt.stop()
        }
    })
}

/// A redirect target must keep the registered host and scheme, so an https
/// endpoint is never downgraded to cleartext.
fn redirect_allowed(origin: &Url, target: &Url) -> bool {
    matches!(target.scheme(), "http" | "https")
        && target.scheme() == origin.scheme()
        && target.host_str().is_some()
        && target.host_str() == origin.host_str()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::EndpointRegistry;

    fn registry(method: &str) -> EndpointRegistry {
        EndpointRegistry::from_json(&format!(
            r#"[{{"id": "x", "url": "https://api.example.com/v1/search?fixed=1",
                "method": "{method}", "rate_limit": 1, "ttl_ms": 1}}]"#
        ))
        .unwrap()
    }

    #[test]
    fn redirects_keep_host_and_scheme() {
        let origin = Url::parse("https://api.example.com/v1/search").unwrap();
        let allowed = |target: &str| redirect_allowed(&origin, &Url::parse(target).unwrap());

        assert!(allowed("https://api.example.com/v2/search?page=2"));
        assert!(!allowed("http://api.example.com/v1/search"));
        assert!(!allowed("https://evil.example.com/v1/search"));
        assert!(!allowed("ftp://api.example.com/v1/search"));
    }

    #[test]
    fn get_params_appended_to_query() {
        let registry = registry("GET");
        let endpoint = registry.describe("x").unwrap();
        let params = Params::new().with("q", "m 31").with("page", 2i64);
        let url = HttpTransport::request_url(endpoint, &params).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/v1/search?fixed=1&page=2&q=m+31"
        );
    }

    #[test]
    fn post_params_stay_out_of_query() {
        let registry = registry("POST");
        let endpoint = registry.describe("x").unwrap();
        let params = Params::new().with("q", "m31");
        let url = HttpTransport::request_url(endpoint, &params).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/search?fixed=1");
    }

    #[test]
    fn status_mapping() {
        assert!(check_status(StatusCode::OK).is_ok());
        assert!(matches!(
            check_status(StatusCode::TOO_MANY_REQUESTS),
            Err(GatewayError::RateLimited {
                origin: RateLimitOrigin::Provider
            })
        ));
        match check_status(StatusCode::NOT_FOUND) {
            Err(GatewayError::Http { status, message }) => {
                assert_eq!(status, 404);
                assert_eq!(message, "HTTP 404: Not Found");
            }
            other => panic!("expected Http error, got {other:?}"),
        }
        // Only 200 counts as success.
        assert!(matches!(
            check_status(StatusCode::NO_CONTENT),
            Err(GatewayError::Http { status: 204, .. })
        ));
    }
}
