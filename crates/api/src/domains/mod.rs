//! Custom domain lifecycle
//!
//! Tenants bring their own domains (e.g. myshop.com). Before traffic for a
//! domain is accepted, its DNS must be delegated to the platform and point at
//! the ingress; only then is a TLS-terminated ingress rule created for it.

pub mod dns;
pub mod ingress;
mod locks;
pub mod onboarding;

pub use dns::{DnsCheckError, DnsLookup, DnsVerifier, ResolverLookup};
pub use ingress::{
    ingress_name, tls_secret_name, IngressManifest, IngressProvisioner, Kubectl, ObjectKind,
    Orchestrator, ProvisioningError,
};
pub use locks::DomainLocks;
pub use onboarding::{AdvanceOutcome, DnsInstructions, DomainOnboarding, OnboardingError};
