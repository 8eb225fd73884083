//! Common types used across the storefront platform

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::StorefrontError;

// =============================================================================
// Tenants
// =============================================================================

/// A storefront as seen by the edge.
///
/// The record itself is owned by the tenant directory service; the edge only
/// reads it per request and writes `custom_domain` during onboarding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    #[serde(default)]
    pub custom_domain: Option<String>,
    #[serde(default)]
    pub is_subscribed: bool,
    #[serde(default)]
    pub expired: bool,
    #[serde(default)]
    pub theme: Theme,
    /// Storefront categories, passed through untouched to downstream handlers
    #[serde(default)]
    pub categories: Vec<serde_json::Value>,
}

impl Tenant {
    /// A tenant is active when it is subscribed and not expired
    pub fn is_active(&self) -> bool {
        self.is_subscribed && !self.expired
    }

    /// The canonical custom domain, ignoring blank values
    pub fn canonical_domain(&self) -> Option<&str> {
        self.custom_domain
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
    }
}

/// Per-request tenant context attached for downstream handlers.
///
/// Built fresh for every request and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TenantContext {
    pub tenant_id: String,
    pub is_embedded_app: bool,
    pub is_in_app: bool,
    /// Wallet or social app the request came through, empty for browsers
    pub origin_provider: String,
    #[serde(default)]
    pub categories: Vec<serde_json::Value>,
}

// =============================================================================
// Themes
// =============================================================================

/// Storefront frontend generation a tenant is rendered with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Legacy,
    #[default]
    Default,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Default => "default",
        }
    }
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Theme {
    type Err = StorefrontError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "legacy" => Ok(Self::Legacy),
            "default" => Ok(Self::Default),
            _ => Err(StorefrontError::InvalidTheme(s.to_string())),
        }
    }
}

// =============================================================================
// Custom domains
// =============================================================================

/// Onboarding state of a tenant-owned custom domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DomainStatus {
    #[default]
    Requested,
    DnsPending,
    DnsVerified,
    Provisioned,
    Detached,
}

impl DomainStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::DnsPending => "dns_pending",
            Self::DnsVerified => "dns_verified",
            Self::Provisioned => "provisioned",
            Self::Detached => "detached",
        }
    }

    /// Recover the status of a tenant's domain after a restart.
    ///
    /// An explicit registration status always wins. Records that predate
    /// registrations only carry `custom_domain`, in which case a set value
    /// means the domain is serving and an unset one means nothing was ever
    /// provisioned.
    pub fn recover(registration: Option<DomainStatus>, custom_domain: Option<&str>) -> Self {
        match (registration, custom_domain) {
            (Some(status), _) => status,
            (None, Some(domain)) if !domain.trim().is_empty() => Self::Provisioned,
            (None, _) => Self::Requested,
        }
    }

    /// Whether the background poller should keep driving this domain
    pub fn needs_polling(&self) -> bool {
        matches!(self, Self::DnsPending | Self::DnsVerified)
    }
}

impl std::fmt::Display for DomainStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DomainStatus {
    type Err = StorefrontError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requested" => Ok(Self::Requested),
            "dns_pending" => Ok(Self::DnsPending),
            "dns_verified" => Ok(Self::DnsVerified),
            "provisioned" => Ok(Self::Provisioned),
            "detached" => Ok(Self::Detached),
            _ => Err(StorefrontError::InvalidStatus(s.to_string())),
        }
    }
}

/// Persisted onboarding record for one tenant domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainRegistration {
    pub tenant_id: String,
    pub domain: String,
    pub status: DomainStatus,
    #[serde(default)]
    pub theme: Theme,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    /// Write version; the directory rejects saves made against a stale one
    #[serde(default)]
    pub version: u64,
    /// Process currently driving a transition for this domain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease: Option<TransitionLease>,
}

/// Claim on a domain's next transition, shared across processes through the
/// directory. Expired leases may be taken over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionLease {
    pub owner: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl DomainRegistration {
    pub fn new(tenant_id: impl Into<String>, domain: impl Into<String>, theme: Theme) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            domain: domain.into(),
            status: DomainStatus::Requested,
            theme,
            updated_at: OffsetDateTime::now_utc(),
            version: 0,
            lease: None,
        }
    }

    /// True while a live lease belongs to someone other than `owner`
    pub fn is_leased_by_other(&self, owner: &str, now: OffsetDateTime) -> bool {
        self.lease
            .as_ref()
            .is_some_and(|lease| lease.owner != owner && lease.expires_at > now)
    }

    /// Move to `status`, stamping the transition time
    pub fn transition(&mut self, status: DomainStatus) {
        self.status = status;
        self.updated_at = OffsetDateTime::now_utc();
    }
}

/// Outcome of one DNS verification attempt; never persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainVerificationRecord {
    pub domain: String,
    pub ns_valid: bool,
    pub a_record_valid: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub checked_at: OffsetDateTime,
}

impl DomainVerificationRecord {
    /// Both checks must pass before an ingress may be provisioned
    pub fn is_verified(&self) -> bool {
        self.ns_valid && self.a_record_valid
    }
}
