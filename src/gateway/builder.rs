//! Builder for configuring gateway instances

use std::sync::Arc;

use tracing::info;

use super::Gateway;
use crate::cache::{CacheConfig, ResponseCache};
use crate::config::Config;
use crate::registry::EndpointRegistry;
use crate::retry::RetryConfig;
use crate::transport::{HttpConfig, HttpTransport, Transport};
use crate::types::UnlistedParams;
use crate::validate::RequestValidator;
use crate::{GatewayError, Result};

impl Gateway {
    /// Create a new builder for configuring the gateway.
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }
}

/// Builder for configuring gateway instances.
///
/// ```rust,no_run
/// # use astrolabe::{Gateway, RetryConfig};
/// # fn main() -> astrolabe::Result<()> {
/// let gateway = Gateway::builder()
///     .retry(RetryConfig::new().max_retries(2))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct GatewayBuilder {
    registry: Option<EndpointRegistry>,
    transport: Option<Arc<dyn Transport>>,
    http: HttpConfig,
    cache: CacheConfig,
    retry: RetryConfig,
    unlisted: UnlistedParams,
}

impl GatewayBuilder {
    pub fn new() -> Self {
        Self {
            registry: None,
            transport: None,
            http: HttpConfig::default(),
            cache: CacheConfig::default(),
            retry: RetryConfig::default(),
            unlisted: UnlistedParams::default(),
        }
    }

    /// Start from a loaded config file.
    ///
    /// Loads the registry file named in `[registry] path`, if any;
    /// otherwise the embedded seed is used at build time.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut builder = Self::new()
            .http(config.http.clone())
            .cache(CacheConfig::new().max_entries(config.cache.max_entries))
            .retry(RetryConfig::from(&config.retry))
            .unlisted_params(config.validation.unlisted_params);
        if let Some(path) = &config.registry.path {
            builder = builder.registry(EndpointRegistry::load(path)?);
        }
        Ok(builder)
    }

    /// Use this registry instead of the embedded seed.
    pub fn registry(mut self, registry: EndpointRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Use a custom transport instead of the default HTTP client.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Settings for the default HTTP transport.
    ///
    /// Ignored when a custom [`transport`](Self::transport) is set.
    pub fn http(mut self, config: HttpConfig) -> Self {
        self.http = config;
        self
    }

    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.cache = config;
        self
    }

    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    /// Set the policy for parameters the endpoint schema does not declare.
    ///
    /// - [`UnlistedParams::Allow`] — forward unchecked (default)
    /// - [`UnlistedParams::Warn`] — log a warning, forward
    /// - [`UnlistedParams::Reject`] — fail validation
    pub fn unlisted_params(mut self, policy: UnlistedParams) -> Self {
        self.unlisted = policy;
        self
    }

    /// Build the gateway.
    pub fn build(self) -> Result<Gateway> {
        let registry = self
            .registry
            .unwrap_or_else(EndpointRegistry::with_embedded_seed);
        if registry.is_empty() {
            return Err(GatewayError::Configuration(
                "registry has no endpoints".into(),
            ));
        }

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::with_config(&self.http)?),
        };

        info!(
            endpoints = registry.len(),
            transport = transport.name(),
            cache_capacity = self.cache.max_entries,
            max_retries = self.retry.max_retries,
            "gateway ready"
        );

        Ok(Gateway::new(
            registry,
            RequestValidator::new(self.unlisted),
            ResponseCache::new(&self.cache),
            transport,
            self.retry,
        ))
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}
