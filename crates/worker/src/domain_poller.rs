//! Custom Domain Poller
//!
//! Drives domains waiting on DNS towards provisioning. Each tick lists the
//! registrations still in flight and advances each one once; anything that
//! fails is simply picked up again on the next tick.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use storefront_api::directory::TenantDirectory;
use storefront_api::domains::{DomainOnboarding, OnboardingError};
use storefront_api::AppState;
use storefront_shared::{DomainRegistration, DomainStatus};
use tracing::{debug, error, info, warn};

/// Counts from one poll pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollSummary {
    pub polled: usize,
    pub provisioned: usize,
    pub pending: usize,
    /// Held by another process for this tick
    pub skipped: usize,
    pub failed: usize,
}

pub struct DomainPoller {
    directory: Arc<dyn TenantDirectory>,
    onboarding: Arc<DomainOnboarding>,
    concurrency: usize,
}

impl DomainPoller {
    pub fn new(state: &AppState) -> Self {
        Self {
            directory: state.directory.clone(),
            onboarding: state.onboarding.clone(),
            concurrency: state.config.domain_poll_concurrency.max(1),
        }
    }

    /// Advance every in-flight domain once
    pub async fn poll_once(&self) -> PollSummary {
        let registrations = self.in_flight().await;
        if registrations.is_empty() {
            debug!("No custom domains awaiting DNS");
            return PollSummary::default();
        }

        info!(count = registrations.len(), "Polling custom domains");

        let provisioned = AtomicUsize::new(0);
        let pending = AtomicUsize::new(0);
        let skipped = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);
        let polled = registrations.len();

        stream::iter(registrations)
            .for_each_concurrent(self.concurrency, |registration| {
                let (provisioned, pending, skipped, failed) =
                    (&provisioned, &pending, &skipped, &failed);
                async move {
                    match self.onboarding.advance(&registration.domain).await {
                        Ok(outcome) if outcome.registration.status == DomainStatus::Provisioned => {
                            info!(
                                tenant_id = %registration.tenant_id,
                                domain = %registration.domain,
                                "Custom domain provisioned"
                            );
                            provisioned.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(outcome) => {
                            debug!(
                                domain = %registration.domain,
                                status = %outcome.registration.status,
                                "Custom domain still waiting on DNS"
                            );
                            pending.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(OnboardingError::Busy(_)) => {
                            debug!(
                                domain = %registration.domain,
                                "Custom domain is being updated elsewhere, skipping"
                            );
                            skipped.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            warn!(
                                tenant_id = %registration.tenant_id,
                                domain = %registration.domain,
                                error = %e,
                                "Failed to advance custom domain"
                            );
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            })
            .await;

        let summary = PollSummary {
            polled,
            provisioned: provisioned.into_inner(),
            pending: pending.into_inner(),
            skipped: skipped.into_inner(),
            failed: failed.into_inner(),
        };
        info!(
            polled = summary.polled,
            provisioned = summary.provisioned,
            pending = summary.pending,
            skipped = summary.skipped,
            failed = summary.failed,
            "Custom domain poll complete"
        );
        summary
    }

    async fn in_flight(&self) -> Vec<DomainRegistration> {
        let mut registrations = Vec::new();
        for status in [DomainStatus::DnsPending, DomainStatus::DnsVerified] {
            match self.directory.list_registrations(status).await {
                Ok(mut found) => registrations.append(&mut found),
                Err(e) => error!(status = %status, error = %e, "Failed to list custom domains"),
            }
        }
        registrations.retain(|r| r.status.needs_polling());
        registrations
    }
}
