//! Internal custom domain routes
//!
//! Called by the tenant admin backend when a tenant attaches, verifies or
//! removes their own domain (e.g., myshop.com). Mounted on the internal
//! listener only; there is no authentication layer here.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use storefront_shared::{DomainRegistration, DomainStatus, DomainVerificationRecord, Theme};

use crate::{
    domains::DnsInstructions,
    error::{ApiError, ApiResult},
    state::AppState,
};

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AttachDomainRequest {
    pub domain: String,
    /// Defaults to the tenant's current theme
    pub theme: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AttachDomainResponse {
    pub registration: DomainRegistration,
    pub dns_instructions: DnsInstructions,
}

#[derive(Debug, Serialize)]
pub struct VerifyDomainResponse {
    pub status: DomainStatus,
    pub registration: DomainRegistration,
    pub verification: Option<DomainVerificationRecord>,
}

#[derive(Debug, Serialize)]
pub struct DomainStatusResponse {
    pub domain: String,
    pub status: DomainStatus,
    pub dns_instructions: DnsInstructions,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /internal/v1/tenants/:tenant_id/domains
pub async fn attach_domain(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Json(req): Json<AttachDomainRequest>,
) -> ApiResult<(StatusCode, Json<AttachDomainResponse>)> {
    let theme = match req.theme.as_deref() {
        Some(theme) => theme
            .parse::<Theme>()
            .map_err(|e| ApiError::Validation(e.to_string()))?,
        None => state
            .directory
            .fetch(&tenant_id)
            .await?
            .map(|tenant| tenant.theme)
            .unwrap_or_default(),
    };

    let registration = state
        .onboarding
        .attach(&tenant_id, &req.domain, theme)
        .await?;
    let dns_instructions = state.onboarding.dns_instructions(&registration.domain)?;

    Ok((
        StatusCode::CREATED,
        Json(AttachDomainResponse {
            registration,
            dns_instructions,
        }),
    ))
}

/// GET /internal/v1/tenants/:tenant_id/domains/:domain
pub async fn get_domain_status(
    State(state): State<AppState>,
    Path((tenant_id, domain)): Path<(String, String)>,
) -> ApiResult<Json<DomainStatusResponse>> {
    let status = state.onboarding.status(&tenant_id, &domain).await?;
    let dns_instructions = state.onboarding.dns_instructions(&domain)?;

    Ok(Json(DomainStatusResponse {
        domain: domain.trim().trim_end_matches('.').to_lowercase(),
        status,
        dns_instructions,
    }))
}

/// POST /internal/v1/tenants/:tenant_id/domains/:domain/verify
///
/// Runs one verification step now instead of waiting for the worker.
pub async fn verify_domain(
    State(state): State<AppState>,
    Path((tenant_id, domain)): Path<(String, String)>,
) -> ApiResult<Json<VerifyDomainResponse>> {
    ensure_owned(&state, &tenant_id, &domain).await?;

    let outcome = state.onboarding.advance(&domain).await?;

    Ok(Json(VerifyDomainResponse {
        status: outcome.registration.status,
        registration: outcome.registration,
        verification: outcome.verification,
    }))
}

/// DELETE /internal/v1/tenants/:tenant_id/domains/:domain
pub async fn detach_domain(
    State(state): State<AppState>,
    Path((tenant_id, domain)): Path<(String, String)>,
) -> ApiResult<Json<DomainRegistration>> {
    let registration = state.onboarding.detach(&tenant_id, &domain).await?;
    Ok(Json(registration))
}

/// Another tenant's domain must not be advanced through this tenant's path
async fn ensure_owned(state: &AppState, tenant_id: &str, domain: &str) -> ApiResult<()> {
    let normalized = domain.trim().trim_end_matches('.').to_lowercase();
    match state.directory.find_registration(&normalized).await? {
        Some(registration) if registration.tenant_id == tenant_id => Ok(()),
        _ => Err(ApiError::NotFoundWith(format!(
            "Domain {} is not attached",
            normalized
        ))),
    }
}
