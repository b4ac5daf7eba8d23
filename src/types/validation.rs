//! Unlisted-parameter policy.

use serde::{Deserialize, Serialize};

/// How to handle request parameters the endpoint schema does not declare.
///
/// The schema is a minimum bar: declared parameters are checked, anything
/// else is forwarded to the provider unless this policy says otherwise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnlistedParams {
    /// Forward undeclared parameters unchecked.
    ///
    /// This is the default.
    #[default]
    Allow,

    /// Log a warning and forward them.
    Warn,

    /// Fail validation on the first undeclared parameter.
    ///
    /// Turns the schema into an allow-list.
    Reject,
}
