//! Endpoint registry — the fixed table of external data sources.
//!
//! Every other component consults the registry for URLs, methods, rate
//! limits and TTLs; nothing else hardcodes them. The table is data, not
//! code: it ships as an embedded JSON seed and can be replaced wholesale
//! by a file named in the configuration (see [`source`]).
//!
//! Entries are compiled once at load time (URLs parsed, schemes checked,
//! patterns compiled) and never mutated afterwards. Consumers hold
//! `Arc<EndpointDescriptor>` handles, never copies.

pub mod source;

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::{GatewayError, Result};
use source::{RawEndpoint, RawParamSpec};

/// HTTP method an endpoint is called with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// Declared type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Boolean,
    /// A string of the form `YYYY-MM-DD` naming a real calendar date.
    Date,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Date => "date",
        }
    }
}

/// Call contract for one declared parameter.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub kind: ParamType,
    pub required: bool,
    /// Applied to string and date values. Anchoring is up to the pattern.
    pub pattern: Option<Regex>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// One external data source and its call contract.
#[derive(Debug, Clone)]
pub struct EndpointDescriptor {
    pub id: String,
    pub url: Url,
    pub method: HttpMethod,
    /// Maximum calls per rolling 60-second window.
    pub rate_limit: u32,
    /// How long a successful response stays fresh.
    pub ttl: Duration,
    pub params: BTreeMap<String, ParamSpec>,
}

impl EndpointDescriptor {
    fn compile(raw: RawEndpoint) -> Result<Self> {
        let id = raw.id;
        let invalid =
            |reason: String| GatewayError::Configuration(format!("endpoint {id}: {reason}"));

        if id.is_empty() {
            return Err(GatewayError::Configuration(
                "endpoint id must not be empty".to_string(),
            ));
        }

        let url = Url::parse(&raw.url)
            .map_err(|e| invalid(format!("invalid url {:?}: {e}", raw.url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!(
                "scheme {:?} not allowed (http/https only)",
                url.scheme()
            )));
        }

        let mut params = BTreeMap::new();
        for (name, spec) in raw.params {
            let spec = compile_param(spec)
                .map_err(|reason| invalid(format!("parameter {name}: {reason}")))?;
            params.insert(name, spec);
        }

        Ok(Self {
            id,
            url,
            method: raw.method,
            rate_limit: raw.rate_limit,
            ttl: Duration::from_millis(raw.ttl_ms),
            params,
        })
    }
}

fn compile_param(raw: RawParamSpec) -> std::result::Result<ParamSpec, String> {
    let pattern = raw
        .pattern
        .as_deref()
        .map(Regex::new)
        .transpose()
        .map_err(|e| format!("invalid pattern: {e}"))?;

    if let (Some(min), Some(max)) = (raw.min, raw.max) {
        if min > max {
            return Err(format!("min {min} exceeds max {max}"));
        }
    }
    if (raw.min.is_some() || raw.max.is_some()) && raw.kind != ParamType::Number {
        return Err(format!("min/max declared on a {} parameter", raw.kind.as_str()));
    }

    Ok(ParamSpec {
        kind: raw.kind,
        required: raw.required,
        pattern,
        min: raw.min,
        max: raw.max,
    })
}

/// Immutable table of known endpoints, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct EndpointRegistry {
    entries: HashMap<String, Arc<EndpointDescriptor>>,
}

impl EndpointRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and compile a registry from JSON.
    ///
    /// Accepts `{ "version": 1, "endpoints": [...] }` or a bare array.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw = source::parse_payload(json)?;
        Self::compile(raw)
    }

    /// Load a registry from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Configuration(format!("failed to read registry file {path:?}: {e}"))
        })?;
        Self::from_json(&content)
    }

    /// Create a registry from the six endpoints compiled into the binary.
    pub fn with_embedded_seed() -> Self {
        match Self::from_json(EMBEDDED_SEED) {
            Ok(registry) => registry,
            Err(e) => {
                // Empty registry: every lookup reports "unknown endpoint".
                error!(error = %e, "failed to parse embedded endpoint seed");
                Self::new()
            }
        }
    }

    fn compile(raw: Vec<RawEndpoint>) -> Result<Self> {
        let mut entries = HashMap::with_capacity(raw.len());
        for endpoint in raw {
            let descriptor = EndpointDescriptor::compile(endpoint)?;
            if entries.contains_key(&descriptor.id) {
                return Err(GatewayError::Configuration(format!(
                    "duplicate endpoint id: {}",
                    descriptor.id
                )));
            }
            entries.insert(descriptor.id.clone(), Arc::new(descriptor));
        }
        Ok(Self { entries })
    }

    /// Look up an endpoint by id.
    pub fn describe(&self, id: &str) -> Option<&Arc<EndpointDescriptor>> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// All endpoints, sorted by id.
    pub fn list(&self) -> Vec<&Arc<EndpointDescriptor>> {
        let mut list: Vec<_> = self.entries.values().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Raw JSON seed data compiled into the binary.
const EMBEDDED_SEED: &str = include_str!("seed.json");
