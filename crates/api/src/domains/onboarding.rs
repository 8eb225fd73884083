//! Custom domain onboarding
//!
//! Drives a tenant domain through
//! `requested -> dns_pending -> dns_verified -> provisioned`, and to
//! `detached` on removal. Transitions for one domain are serialized and
//! bounded by a deadline; distinct domains proceed independently.
//!
//! An ingress is only ever applied right after a verification in which both
//! the NS and A checks passed.
//!
//! The in-process locks only order callers sharing one `DomainOnboarding`.
//! The api and the worker coordinate through the directory instead: every
//! registration write is conditional on the version that was read, and a
//! transition that touches the ingress first claims a lease on the record.
//! A caller that loses either race gets `OnboardingError::Busy`.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use storefront_shared::{
    DomainRegistration, DomainStatus, DomainVerificationRecord, Theme, TransitionLease,
};
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::dns::DnsVerifier;
use super::ingress::{IngressProvisioner, ProvisioningError};
use super::locks::DomainLocks;
use crate::directory::{DirectoryError, TenantDirectory};
use crate::routing::domain_name;

#[derive(Debug, thiserror::Error)]
pub enum OnboardingError {
    #[error("Invalid domain: {0}")]
    InvalidDomain(String),
    #[error("{0} is a platform domain")]
    PlatformDomain(String),
    #[error("Tenant not found: {0}")]
    TenantNotFound(String),
    #[error("Domain {0} is not attached to this tenant")]
    NotAttached(String),
    #[error("Domain {0} is already attached to another tenant")]
    Conflict(String),
    #[error("Domain {0} transition timed out")]
    Timeout(String),
    #[error("Domain {0} is being updated elsewhere")]
    Busy(String),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),
}

/// Result of one `advance` step
#[derive(Debug, Clone, Serialize)]
pub struct AdvanceOutcome {
    pub registration: DomainRegistration,
    /// Present when DNS was checked during this step
    pub verification: Option<DomainVerificationRecord>,
}

/// DNS records a tenant has to configure
#[derive(Debug, Clone, Serialize)]
pub struct DnsInstructions {
    pub nameservers: Vec<String>,
    pub a_records: Vec<DnsRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DnsRecord {
    pub record_type: String,
    pub name: String,
    pub value: String,
}

/// Orchestrates DNS verification and ingress provisioning per domain
pub struct DomainOnboarding {
    directory: Arc<dyn TenantDirectory>,
    verifier: DnsVerifier,
    provisioner: IngressProvisioner,
    locks: DomainLocks,
    main_domain: String,
    deadline: Duration,
    /// Lease holder id, unique per instance
    owner: String,
}

impl DomainOnboarding {
    pub fn new(
        directory: Arc<dyn TenantDirectory>,
        verifier: DnsVerifier,
        provisioner: IngressProvisioner,
        main_domain: impl Into<String>,
        deadline: Duration,
    ) -> Self {
        Self {
            directory,
            verifier,
            provisioner,
            locks: DomainLocks::new(),
            main_domain: main_domain.into(),
            deadline,
            owner: Uuid::new_v4().to_string(),
        }
    }

    /// Register `domain` for `tenant_id` and start waiting for DNS
    pub async fn attach(
        &self,
        tenant_id: &str,
        domain: &str,
        theme: Theme,
    ) -> Result<DomainRegistration, OnboardingError> {
        let domain = self.validate(domain)?;
        let _guard = self.locks.acquire(&domain).await;

        self.directory
            .fetch(tenant_id)
            .await?
            .ok_or_else(|| OnboardingError::TenantNotFound(tenant_id.to_string()))?;

        let existing = self.directory.find_registration(&domain).await?;
        if let Some(existing) = &existing {
            if existing.status != DomainStatus::Detached {
                if existing.tenant_id != tenant_id {
                    return Err(OnboardingError::Conflict(domain));
                }
                if existing.theme == theme {
                    return Ok(existing.clone());
                }
            }
            self.ensure_free(existing)?;
        }

        let mut registration = DomainRegistration::new(tenant_id, &domain, theme);
        registration.version = existing.map(|r| r.version).unwrap_or(0);
        registration.transition(DomainStatus::DnsPending);
        self.save(&mut registration).await?;

        info!(tenant_id = %tenant_id, domain = %domain, theme = %theme, "Custom domain attached");
        Ok(registration)
    }

    /// Re-check DNS for `domain` and provision it once verified
    pub async fn advance(&self, domain: &str) -> Result<AdvanceOutcome, OnboardingError> {
        let domain = self.validate(domain)?;
        let _guard = self.locks.acquire(&domain).await;

        tokio::time::timeout(self.deadline, self.advance_locked(&domain))
            .await
            .map_err(|_| OnboardingError::Timeout(domain.clone()))?
    }

    async fn advance_locked(&self, domain: &str) -> Result<AdvanceOutcome, OnboardingError> {
        let mut registration = self
            .directory
            .find_registration(domain)
            .await?
            .ok_or_else(|| OnboardingError::NotAttached(domain.to_string()))?;

        match registration.status {
            DomainStatus::Provisioned => {
                return Ok(AdvanceOutcome {
                    registration,
                    verification: None,
                })
            }
            DomainStatus::Detached => return Err(OnboardingError::NotAttached(domain.to_string())),
            DomainStatus::Requested | DomainStatus::DnsPending | DomainStatus::DnsVerified => {}
        }

        let verification = self.verifier.verify(domain).await;

        if !verification.is_verified() {
            if registration.status != DomainStatus::DnsPending {
                self.ensure_free(&registration)?;
                registration.transition(DomainStatus::DnsPending);
                self.save(&mut registration).await?;
            }
            info!(
                domain = %domain,
                ns_valid = verification.ns_valid,
                a_record_valid = verification.a_record_valid,
                "Domain DNS not verified yet"
            );
            return Ok(AdvanceOutcome {
                registration,
                verification: Some(verification),
            });
        }

        registration.transition(DomainStatus::DnsVerified);
        self.claim(&mut registration).await?;

        if let Err(e) = self.provisioner.apply(domain, registration.theme).await {
            error!(domain = %domain, error = %e, "Ingress provisioning failed");
            self.release(&mut registration).await;
            return Err(e.into());
        }

        self.directory
            .set_custom_domain(&registration.tenant_id, Some(domain))
            .await?;
        registration.transition(DomainStatus::Provisioned);
        registration.lease = None;
        self.save(&mut registration).await?;

        info!(tenant_id = %registration.tenant_id, domain = %domain, "Custom domain provisioned");
        Ok(AdvanceOutcome {
            registration,
            verification: Some(verification),
        })
    }

    /// Tear down the ingress for `domain`, then unlink it from the tenant
    pub async fn detach(
        &self,
        tenant_id: &str,
        domain: &str,
    ) -> Result<DomainRegistration, OnboardingError> {
        let domain = self.validate(domain)?;
        let _guard = self.locks.acquire(&domain).await;

        tokio::time::timeout(self.deadline, self.detach_locked(tenant_id, &domain))
            .await
            .map_err(|_| OnboardingError::Timeout(domain.clone()))?
    }

    async fn detach_locked(
        &self,
        tenant_id: &str,
        domain: &str,
    ) -> Result<DomainRegistration, OnboardingError> {
        let tenant = self.directory.fetch(tenant_id).await?;
        let linked = tenant.as_ref().and_then(|t| t.canonical_domain()) == Some(domain);

        let mut registration = match self.directory.find_registration(domain).await? {
            Some(existing) if existing.tenant_id == tenant_id => existing,
            Some(existing) if existing.status != DomainStatus::Detached => {
                return Err(OnboardingError::NotAttached(domain.to_string()))
            }
            stale => {
                // Tenants provisioned before registrations existed only
                // carry the custom domain itself
                let theme = match (&tenant, linked) {
                    (Some(tenant), true)
                        if DomainStatus::recover(None, tenant.canonical_domain())
                            == DomainStatus::Provisioned =>
                    {
                        tenant.theme
                    }
                    _ => return Err(OnboardingError::NotAttached(domain.to_string())),
                };
                let mut legacy = DomainRegistration::new(tenant_id, domain, theme);
                legacy.version = stale.map(|r| r.version).unwrap_or(0);
                legacy.status = DomainStatus::Provisioned;
                debug!(tenant_id = %tenant_id, domain = %domain, "Detaching legacy custom domain");
                legacy
            }
        };

        if registration.status == DomainStatus::Detached {
            return Ok(registration);
        }

        self.claim(&mut registration).await?;

        // Ingress first: a crash after this point leaves the tenant pointing
        // at a domain that no longer routes, never an ingress without owner
        if let Err(e) = self.provisioner.remove(domain).await {
            self.release(&mut registration).await;
            return Err(e.into());
        }

        if linked {
            self.directory.set_custom_domain(tenant_id, None).await?;
        } else if tenant.is_none() {
            warn!(tenant_id = %tenant_id, domain = %domain, "Detaching domain of missing tenant");
        }

        registration.transition(DomainStatus::Detached);
        registration.lease = None;
        self.save(&mut registration).await?;

        info!(tenant_id = %tenant_id, domain = %domain, "Custom domain detached");
        Ok(registration)
    }

    /// Current status of `domain` for `tenant_id`, recovered from the directory
    pub async fn status(&self, tenant_id: &str, domain: &str) -> Result<DomainStatus, OnboardingError> {
        let domain = self.validate(domain)?;
        let registration = self
            .directory
            .find_registration(&domain)
            .await?
            .filter(|r| r.tenant_id == tenant_id);
        let tenant = self
            .directory
            .fetch(tenant_id)
            .await?
            .ok_or_else(|| OnboardingError::TenantNotFound(tenant_id.to_string()))?;

        let custom_domain = tenant.canonical_domain().filter(|d| *d == domain);
        Ok(DomainStatus::recover(
            registration.map(|r| r.status),
            custom_domain,
        ))
    }

    /// Records the tenant must create before verification can pass
    pub fn dns_instructions(&self, domain: &str) -> Result<DnsInstructions, OnboardingError> {
        let domain = self.validate(domain)?;
        let apex = domain_name::parse(&domain)
            .map(|parsed| parsed.is_apex())
            .unwrap_or(false);

        let ip = self.verifier.ingress_ip().to_string();
        let mut a_records = vec![DnsRecord {
            record_type: "A".to_string(),
            name: domain.clone(),
            value: ip.clone(),
        }];
        if apex {
            a_records.push(DnsRecord {
                record_type: "A".to_string(),
                name: format!("www.{}", domain),
                value: ip,
            });
        }

        Ok(DnsInstructions {
            nameservers: self.verifier.expected_nameservers().to_vec(),
            a_records,
        })
    }

    /// Take the transition lease on `registration` before touching the ingress
    async fn claim(&self, registration: &mut DomainRegistration) -> Result<(), OnboardingError> {
        self.ensure_free(registration)?;
        registration.lease = Some(TransitionLease {
            owner: self.owner.clone(),
            expires_at: OffsetDateTime::now_utc() + self.deadline,
        });
        self.save(registration).await
    }

    /// Drop our lease after a failed transition. Best effort: an unreleased
    /// lease still expires after the deadline.
    async fn release(&self, registration: &mut DomainRegistration) {
        registration.lease = None;
        if let Err(e) = self.save(registration).await {
            warn!(domain = %registration.domain, error = %e, "Failed to release domain lease");
        }
    }

    fn ensure_free(&self, registration: &DomainRegistration) -> Result<(), OnboardingError> {
        if registration.is_leased_by_other(&self.owner, OffsetDateTime::now_utc()) {
            return Err(OnboardingError::Busy(registration.domain.clone()));
        }
        Ok(())
    }

    /// Conditional write against the version `registration` was read at
    async fn save(&self, registration: &mut DomainRegistration) -> Result<(), OnboardingError> {
        let expected = registration.version;
        registration.version = expected + 1;
        match self.directory.save_registration(registration, expected).await {
            Ok(()) => Ok(()),
            Err(e) => {
                registration.version = expected;
                match e {
                    DirectoryError::Conflict => {
                        Err(OnboardingError::Busy(registration.domain.clone()))
                    }
                    other => Err(other.into()),
                }
            }
        }
    }

    /// Normalize and validate a tenant-supplied domain
    fn validate(&self, domain: &str) -> Result<String, OnboardingError> {
        let domain = domain.trim().trim_end_matches('.').to_lowercase();
        let parsed = domain_name::parse(&domain)
            .map_err(|_| OnboardingError::InvalidDomain(domain.clone()))?;

        if domain.contains(':') {
            return Err(OnboardingError::InvalidDomain(domain));
        }
        if parsed.registrable_domain == self.main_domain {
            return Err(OnboardingError::PlatformDomain(domain));
        }
        Ok(domain)
    }
}
