//! Storefront fallback
//!
//! Everything on the public listener is storefront traffic.
//! By the time a request lands here the resolution middleware has either
//! redirected it or attached the tenant context.

use axum::{Extension, Json};
use storefront_shared::TenantContext;

use crate::error::{ApiError, ApiResult};

/// GET /__tenant (and any other storefront path)
///
/// Hands the resolved context to the SSR frontend sitting behind the edge.
pub async fn tenant_context(
    context: Option<Extension<TenantContext>>,
) -> ApiResult<Json<TenantContext>> {
    match context {
        Some(Extension(context)) => Ok(Json(context)),
        // Static assets and the accounts host pass through without a tenant
        None => Err(ApiError::NotFound),
    }
}
