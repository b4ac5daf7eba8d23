//! Gateway implementation

mod builder;
mod orchestrator;

pub use builder::GatewayBuilder;
pub use orchestrator::Gateway;
