//! Registry data format.
//!
//! The registry file uses the same JSON format as the embedded
//! `seed.json`: a versioned `{ "version": 1, "endpoints": [...] }` object,
//! or a bare array of endpoints.
//!
//! ```json
//! {
//!   "version": 1,
//!   "endpoints": [{
//!     "id": "apod",
//!     "url": "https://api.nasa.gov/planetary/apod",
//!     "method": "GET",
//!     "rate_limit": 1000,
//!     "ttl_ms": 86400000,
//!     "params": {
//!       "api_key": { "type": "string", "required": true },
//!       "count": { "type": "number", "min": 1, "max": 100 }
//!     }
//!   }]
//! }
//! ```

use std::collections::BTreeMap;

use serde::Deserialize;

use super::{HttpMethod, ParamType};
use crate::{GatewayError, Result};

/// Maximum supported registry format version.
const MAX_SUPPORTED_VERSION: u32 = 1;

/// Endpoint entry as written in the registry file, before compilation.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawEndpoint {
    pub id: String,
    pub url: String,
    pub method: HttpMethod,
    pub rate_limit: u32,
    pub ttl_ms: u64,
    #[serde(default)]
    pub params: BTreeMap<String, RawParamSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawParamSpec {
    #[serde(rename = "type")]
    pub kind: ParamType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

#[derive(Deserialize)]
struct VersionedRegistry {
    version: u32,
    endpoints: Vec<RawEndpoint>,
}

/// Accept both versioned and bare-array formats.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawPayload {
    Versioned(VersionedRegistry),
    Bare(Vec<RawEndpoint>),
}

/// Parse a registry payload, accepting both versioned and bare formats.
///
/// Returns an error if the version is unsupported.
pub(crate) fn parse_payload(json: &str) -> Result<Vec<RawEndpoint>> {
    let payload: RawPayload = serde_json::from_str(json).map_err(|e| {
        GatewayError::Configuration(format!("failed to parse registry JSON: {e}"))
    })?;
    match payload {
        RawPayload::Versioned(registry) => {
            if registry.version > MAX_SUPPORTED_VERSION {
                return Err(GatewayError::Configuration(format!(
                    "unsupported registry version {} (max supported: {MAX_SUPPORTED_VERSION})",
                    registry.version
                )));
            }
            Ok(registry.endpoints)
        }
        RawPayload::Bare(endpoints) => Ok(endpoints),
    }
}
