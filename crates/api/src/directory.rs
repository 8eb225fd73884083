//! Tenant directory integration
//!
//! Tenant records are owned by the directory service. The edge reads them per
//! request and writes custom domain state during onboarding, over a small
//! JSON/HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use storefront_shared::{redact_paths, DomainRegistration, DomainStatus, Tenant};
use tracing::{debug, error};

/// Errors talking to the tenant directory
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("Tenant directory timed out")]
    Timeout,
    #[error("Tenant directory request failed: {0}")]
    Http(String),
    #[error("Tenant directory returned {0}: {1}")]
    Status(u16, String),
    #[error("Failed to decode tenant directory response: {0}")]
    Decode(String),
    #[error("Record was changed concurrently")]
    Conflict,
}

impl From<reqwest::Error> for DirectoryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DirectoryError::Timeout
        } else {
            DirectoryError::Http(err.to_string())
        }
    }
}

pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Read/write access to tenant records. Implementations must be safe to share
/// across concurrent requests.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// Fetch a tenant by token; `Ok(None)` when it does not exist
    async fn fetch(&self, tenant_id: &str) -> DirectoryResult<Option<Tenant>>;

    /// Set or clear the tenant's canonical custom domain
    async fn set_custom_domain(&self, tenant_id: &str, domain: Option<&str>)
        -> DirectoryResult<()>;

    /// Persist the onboarding record for a domain.
    ///
    /// Only succeeds while the stored record is still at `expected_version`
    /// (a missing record counts as version 0); otherwise `Conflict`.
    async fn save_registration(
        &self,
        registration: &DomainRegistration,
        expected_version: u64,
    ) -> DirectoryResult<()>;

    /// Look up the onboarding record for a domain
    async fn find_registration(&self, domain: &str)
        -> DirectoryResult<Option<DomainRegistration>>;

    /// List onboarding records in a given state
    async fn list_registrations(
        &self,
        status: DomainStatus,
    ) -> DirectoryResult<Vec<DomainRegistration>>;

    /// Cheap reachability check
    async fn ping(&self) -> DirectoryResult<()>;
}

#[derive(Debug, Serialize)]
struct CustomDomainBody<'a> {
    custom_domain: Option<&'a str>,
}

/// HTTP client for the tenant directory
#[derive(Clone)]
pub struct HttpTenantDirectory {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    redact_fields: Vec<String>,
}

impl HttpTenantDirectory {
    /// Create a client bounded by `timeout` per call
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> DirectoryResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DirectoryError::Http(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            redact_fields: Vec::new(),
        })
    }

    /// Dotted paths masked when raw tenant payloads are logged
    pub fn with_redact_fields(mut self, fields: Vec<String>) -> Self {
        self.redact_fields = fields;
        self
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("Authorization", format!("Bearer {}", key)),
            None => request,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Turn non-success statuses into errors, keeping the body for diagnostics
    async fn check(response: reqwest::Response) -> DirectoryResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        error!("Tenant directory returned error status {}: {}", status, body);
        Err(DirectoryError::Status(status.as_u16(), body))
    }
}

#[async_trait]
impl TenantDirectory for HttpTenantDirectory {
    async fn fetch(&self, tenant_id: &str) -> DirectoryResult<Option<Tenant>> {
        let response = self
            .authorize(self.client.get(self.url(&format!("/tenants/{}", tenant_id))))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let mut payload: serde_json::Value = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| DirectoryError::Decode(e.to_string()))?;

        let tenant: Tenant = serde_json::from_value(payload.clone())
            .map_err(|e| DirectoryError::Decode(e.to_string()))?;

        if tracing::enabled!(tracing::Level::DEBUG) {
            redact_paths(&mut payload, &self.redact_fields);
            debug!(tenant_id = %tenant_id, payload = %payload, "Fetched tenant");
        }

        Ok(Some(tenant))
    }

    async fn set_custom_domain(
        &self,
        tenant_id: &str,
        domain: Option<&str>,
    ) -> DirectoryResult<()> {
        let response = self
            .authorize(
                self.client
                    .put(self.url(&format!("/tenants/{}/custom-domain", tenant_id))),
            )
            .json(&CustomDomainBody {
                custom_domain: domain,
            })
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }

    async fn save_registration(
        &self,
        registration: &DomainRegistration,
        expected_version: u64,
    ) -> DirectoryResult<()> {
        let response = self
            .authorize(self.client.put(self.url(&format!(
                "/tenants/{}/domains/{}",
                registration.tenant_id, registration.domain
            ))))
            .header("If-Match", format!("\"{}\"", expected_version))
            .json(registration)
            .send()
            .await?;

        if response.status() == StatusCode::PRECONDITION_FAILED {
            debug!(
                domain = %registration.domain,
                expected_version,
                "Registration changed concurrently"
            );
            return Err(DirectoryError::Conflict);
        }
        Self::check(response).await?;
        Ok(())
    }

    async fn find_registration(
        &self,
        domain: &str,
    ) -> DirectoryResult<Option<DomainRegistration>> {
        let response = self
            .authorize(self.client.get(self.url(&format!("/domains/{}", domain))))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        Self::check(response)
            .await?
            .json()
            .await
            .map(Some)
            .map_err(|e| DirectoryError::Decode(e.to_string()))
    }

    async fn list_registrations(
        &self,
        status: DomainStatus,
    ) -> DirectoryResult<Vec<DomainRegistration>> {
        let response = self
            .authorize(
                self.client
                    .get(self.url("/domains"))
                    .query(&[("status", status.as_str())]),
            )
            .send()
            .await?;

        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| DirectoryError::Decode(e.to_string()))
    }

    async fn ping(&self) -> DirectoryResult<()> {
        let response = self
            .authorize(self.client.get(self.url("/health")))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
