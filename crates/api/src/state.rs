//! Shared application state

use std::sync::Arc;

use anyhow::Context;

use crate::config::Config;
use crate::directory::{HttpTenantDirectory, TenantDirectory};
use crate::domains::{
    DnsLookup, DnsVerifier, DomainOnboarding, IngressProvisioner, Kubectl, Orchestrator,
    ResolverLookup,
};
use crate::routing::HostResolver;

/// State handed to every handler and middleware
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub directory: Arc<dyn TenantDirectory>,
    pub resolver: HostResolver,
    pub onboarding: Arc<DomainOnboarding>,
}

impl AppState {
    /// Wire the production collaborators: HTTP directory, public DNS, kubectl
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let directory = HttpTenantDirectory::new(
            config.directory_url.clone(),
            config.directory_api_key.clone(),
            config.directory_timeout,
        )
        .context("Failed to build tenant directory client")?
        .with_redact_fields(config.directory_redact_fields.clone());

        let lookup: Arc<dyn DnsLookup> = Arc::new(ResolverLookup::new(config.dns_timeout));
        let orchestrator: Arc<dyn Orchestrator> =
            Arc::new(Kubectl::new(&config.ingress, config.orchestrator_timeout));

        Ok(Self::new(config, Arc::new(directory), lookup, orchestrator))
    }

    /// Assemble state around the given collaborators
    pub fn new(
        config: Config,
        directory: Arc<dyn TenantDirectory>,
        lookup: Arc<dyn DnsLookup>,
        orchestrator: Arc<dyn Orchestrator>,
    ) -> Self {
        let config = Arc::new(config);
        let verifier = DnsVerifier::new(lookup, &config);
        let provisioner = IngressProvisioner::new(orchestrator, config.ingress.clone());
        let onboarding = DomainOnboarding::new(
            directory.clone(),
            verifier,
            provisioner,
            config.main_domain.clone(),
            config.transition_deadline(),
        );

        Self {
            resolver: HostResolver::new(directory.clone(), config.clone()),
            onboarding: Arc::new(onboarding),
            directory,
            config,
        }
    }
}
