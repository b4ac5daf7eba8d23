//! Public types for the Astrolabe API.

mod fetch;
mod params;
mod validation;

pub use fetch::{FetchOptions, Fetched, Freshness};
pub use params::{ParamValue, Params};
pub use validation::UnlistedParams;
