//! Storefront Edge Library
//!
//! Host-based tenant resolution for storefront traffic plus the custom
//! domain onboarding workflow (DNS verification and ingress provisioning).

pub mod config;
pub mod directory;
pub mod domains;
pub mod error;
pub mod routes;
pub mod routing;
pub mod state;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use routing::{HostResolver, RoutingDecision};
pub use state::AppState;
