//! Host-based routing for storefront traffic
//!
//! This module handles resolving incoming Host headers to tenants,
//! enabling storefront URLs like:
//! - Platform subdomains: shop1.mainsite.com
//! - Embedded app hosts: shop1.miniapp.mainsite.com, shop1-qpay.inapp.mainsite.com
//! - Custom domains: myshop.com, shop.myshop.com

pub mod domain_name;
mod host_resolver;
mod middleware;

pub use domain_name::{DomainName, InvalidHostnameError};
pub use host_resolver::{HostResolver, RedirectReason, RoutingDecision, TenantToken};
pub use middleware::{
    tenant_resolution_middleware, EMBEDDED_APP_HEADER, IN_APP_HEADER, ORIGIN_PROVIDER_HEADER,
    TENANT_ID_HEADER,
};
