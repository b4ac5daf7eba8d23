//! Request validation against the endpoint registry.
//!
//! Validation is pure: it reads the registry and the parameters and
//! touches nothing else, so the orchestrator can run it before any cache,
//! limiter or network state is consulted. A malformed request never
//! consumes rate-limit budget.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::warn;

use crate::registry::{EndpointDescriptor, EndpointRegistry, ParamSpec, ParamType};
use crate::types::{ParamValue, Params, UnlistedParams};
use crate::{GatewayError, Result};

/// Checks requests against the registry's call contracts.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestValidator {
    unlisted: UnlistedParams,
}

impl RequestValidator {
    pub fn new(unlisted: UnlistedParams) -> Self {
        Self { unlisted }
    }

    pub fn unlisted_params(&self) -> UnlistedParams {
        self.unlisted
    }

    /// Validate a request and return the endpoint it targets.
    ///
    /// Order of checks: unknown endpoint, missing required parameters,
    /// then per-parameter type, range and pattern. The first failure wins.
    pub fn validate<'r>(
        &self,
        registry: &'r EndpointRegistry,
        endpoint_id: &str,
        params: &Params,
    ) -> Result<&'r Arc<EndpointDescriptor>> {
        let descriptor = registry
            .describe(endpoint_id)
            .ok_or_else(|| GatewayError::Validation(format!("unknown endpoint: {endpoint_id}")))?;
        self.check_params(descriptor, params)?;
        Ok(descriptor)
    }

    /// Check parameters against one endpoint's schema.
    pub fn check_params(&self, descriptor: &EndpointDescriptor, params: &Params) -> Result<()> {
        for (name, spec) in &descriptor.params {
            if spec.required && !params.contains(name) {
                return Err(GatewayError::Validation(format!(
                    "missing required parameter: {name}"
                )));
            }
        }

        for (name, value) in params.iter() {
            match descriptor.params.get(name) {
                Some(spec) => check_value(name, spec, value)?,
                None => match self.unlisted {
                    UnlistedParams::Allow => {}
                    UnlistedParams::Warn => {
                        warn!(
                            endpoint = %descriptor.id,
                            parameter = name,
                            "forwarding undeclared parameter"
                        );
                    }
                    UnlistedParams::Reject => {
                        return Err(GatewayError::Validation(format!(
                            "parameter {name} is not declared for endpoint {}",
                            descriptor.id
                        )));
                    }
                },
            }
        }

        Ok(())
    }
}

fn check_value(name: &str, spec: &ParamSpec, value: &ParamValue) -> Result<()> {
    let mismatch = || {
        GatewayError::Validation(format!(
            "parameter {name} must be a {}, got {}",
            spec.kind.as_str(),
            value.type_name()
        ))
    };

    match spec.kind {
        ParamType::String => {
            let s = value.as_str().ok_or_else(mismatch)?;
            check_pattern(name, spec, s)
        }
        ParamType::Date => {
            let s = value.as_str().ok_or_else(mismatch)?;
            if !is_calendar_date(s) {
                return Err(GatewayError::Validation(format!(
                    "parameter {name} must be a YYYY-MM-DD date"
                )));
            }
            check_pattern(name, spec, s)
        }
        ParamType::Boolean => match value {
            ParamValue::Bool(_) => Ok(()),
            _ => Err(mismatch()),
        },
        ParamType::Number => {
            let n = value.as_f64().ok_or_else(mismatch)?;
            if let Some(min) = spec.min {
                if n < min {
                    return Err(GatewayError::Validation(format!(
                        "parameter {name} must be >= {min}"
                    )));
                }
            }
            if let Some(max) = spec.max {
                if n > max {
                    return Err(GatewayError::Validation(format!(
                        "parameter {name} must be <= {max}"
                    )));
                }
            }
            Ok(())
        }
    }
}

fn check_pattern(name: &str, spec: &ParamSpec, value: &str) -> Result<()> {
    match &spec.pattern {
        Some(pattern) if !pattern.is_match(value) => Err(GatewayError::Validation(format!(
            "parameter {name} has invalid format"
        ))),
        _ => Ok(()),
    }
}

/// Strict `YYYY-MM-DD` naming a real day.
fn is_calendar_date(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}
