//! DNS verification for custom domains
//!
//! A tenant domain is only considered verified when it is delegated to the
//! platform's nameservers and resolves to the platform ingress. Lookups are
//! advisory: any resolver failure counts as "not yet", never as an error.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use storefront_shared::DomainVerificationRecord;
use time::OffsetDateTime;
use tracing::debug;
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::lookup::Lookup;
use trust_dns_resolver::proto::rr::RecordType;
use trust_dns_resolver::TokioAsyncResolver;

use crate::config::Config;
use crate::routing::domain_name;

/// Resolver failures. Collapsed to `false` by the verifier.
#[derive(Debug, thiserror::Error)]
pub enum DnsCheckError {
    #[error("DNS lookup for {0} failed: {1}")]
    Lookup(String, String),
    #[error("DNS lookup for {0} timed out")]
    Timeout(String),
}

/// Record lookups needed for verification
#[async_trait]
pub trait DnsLookup: Send + Sync {
    /// NS record targets for `domain`, as returned by the resolver
    async fn nameservers(&self, domain: &str) -> Result<Vec<String>, DnsCheckError>;

    /// A record addresses for `domain`
    async fn ipv4_addresses(&self, domain: &str) -> Result<Vec<Ipv4Addr>, DnsCheckError>;
}

/// `DnsLookup` backed by a trust-dns async resolver
pub struct ResolverLookup {
    resolver: TokioAsyncResolver,
}

impl ResolverLookup {
    /// Resolver against public recursive DNS, so tenants' changes are seen as
    /// the rest of the internet sees them
    pub fn new(timeout: Duration) -> Self {
        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;
        opts.attempts = 2;
        // Polling must observe record changes as soon as they propagate
        opts.cache_size = 0;

        Self {
            resolver: TokioAsyncResolver::tokio(ResolverConfig::cloudflare(), opts),
        }
    }
}

#[async_trait]
impl DnsLookup for ResolverLookup {
    async fn nameservers(&self, domain: &str) -> Result<Vec<String>, DnsCheckError> {
        let response = self
            .resolver
            .lookup(domain, RecordType::NS)
            .await
            .map_err(|e| DnsCheckError::Lookup(domain.to_string(), e.to_string()))?;

        Ok(response
            .iter()
            .filter_map(|record| record.as_ns().map(|ns| ns.to_string()))
            .collect())
    }

    async fn ipv4_addresses(&self, domain: &str) -> Result<Vec<Ipv4Addr>, DnsCheckError> {
        let response = self
            .resolver
            .lookup(domain, RecordType::A)
            .await
            .map_err(|e| DnsCheckError::Lookup(domain.to_string(), e.to_string()))?;

        Ok(ipv4_records(&response))
    }
}

/// A record addresses in `lookup`; CNAMEs followed by the resolver are skipped
fn ipv4_records(lookup: &Lookup) -> Vec<Ipv4Addr> {
    lookup
        .iter()
        .filter_map(|record| record.as_a())
        .map(|a| a.0)
        .collect()
}

/// Checks tenant DNS against the platform's expected values
#[derive(Clone)]
pub struct DnsVerifier {
    lookup: Arc<dyn DnsLookup>,
    /// Sorted, normalized nameserver trio
    expected_nameservers: [String; 3],
    ingress_ip: Ipv4Addr,
    timeout: Duration,
}

impl DnsVerifier {
    pub fn new(lookup: Arc<dyn DnsLookup>, config: &Config) -> Self {
        let mut expected = config.expected_nameservers.clone();
        for name in expected.iter_mut() {
            *name = normalize_name(name);
        }
        expected.sort();

        Self {
            lookup,
            expected_nameservers: expected,
            ingress_ip: config.ingress_ip,
            timeout: config.dns_timeout,
        }
    }

    pub fn expected_nameservers(&self) -> &[String; 3] {
        &self.expected_nameservers
    }

    pub fn ingress_ip(&self) -> Ipv4Addr {
        self.ingress_ip
    }

    /// Run both checks and record the outcome
    pub async fn verify(&self, domain: &str) -> DomainVerificationRecord {
        let (ns_valid, a_record_valid) =
            tokio::join!(self.check_nameservers(domain), self.check_a_record(domain));

        DomainVerificationRecord {
            domain: domain.to_string(),
            ns_valid,
            a_record_valid,
            checked_at: OffsetDateTime::now_utc(),
        }
    }

    /// True only if the zone is delegated to exactly the expected nameservers.
    ///
    /// Delegation lives at the registrable domain, so subdomains are checked
    /// through their zone apex.
    pub async fn check_nameservers(&self, domain: &str) -> bool {
        let zone = match domain_name::parse(domain) {
            Ok(parsed) => parsed.registrable_domain,
            Err(_) => return false,
        };

        let mut names: Vec<String> = match self.bounded(self.lookup.nameservers(&zone), &zone).await {
            Ok(names) => names.iter().map(|n| normalize_name(n)).collect(),
            Err(e) => {
                debug!(domain = %domain, error = %e, "NS check failed");
                return false;
            }
        };
        names.sort();

        let valid = names.as_slice() == self.expected_nameservers.as_slice();
        debug!(domain = %domain, nameservers = ?names, valid, "NS check");
        valid
    }

    /// True only if the domain resolves to exactly the ingress IP. Apex
    /// domains must also have `www.` pointing there.
    pub async fn check_a_record(&self, domain: &str) -> bool {
        let apex = match domain_name::parse(domain) {
            Ok(parsed) => parsed.is_apex(),
            Err(_) => return false,
        };

        if !self.points_at_ingress(domain).await {
            return false;
        }
        if apex {
            return self.points_at_ingress(&format!("www.{}", domain)).await;
        }
        true
    }

    async fn points_at_ingress(&self, host: &str) -> bool {
        match self.bounded(self.lookup.ipv4_addresses(host), host).await {
            Ok(addrs) => {
                let valid = addrs.len() == 1 && addrs[0] == self.ingress_ip;
                debug!(host = %host, addresses = ?addrs, valid, "A record check");
                valid
            }
            Err(e) => {
                debug!(host = %host, error = %e, "A record check failed");
                false
            }
        }
    }

    async fn bounded<T>(
        &self,
        lookup: impl std::future::Future<Output = Result<T, DnsCheckError>>,
        name: &str,
    ) -> Result<T, DnsCheckError> {
        tokio::time::timeout(self.timeout, lookup)
            .await
            .map_err(|_| DnsCheckError::Timeout(name.to_string()))?
    }
}

/// Strip the root label and lowercase
fn normalize_name(name: &str) -> String {
    name.trim().trim_end_matches('.').to_lowercase()
}
