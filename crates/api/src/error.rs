//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::directory::DirectoryError;
use crate::domains::OnboardingError;

pub type ApiResult<T> = Result<T, ApiError>;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    // Resource errors
    #[error("Resource not found")]
    NotFound,
    #[error("Not found: {0}")]
    NotFoundWith(String),
    #[error("Resource already exists")]
    Conflict(String),

    // Upstream errors
    #[error("Provisioning failed")]
    ProvisioningFailed,
    #[error("Tenant directory unavailable")]
    DirectoryUnavailable,
    #[error("Request timed out")]
    Timeout,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // Validation
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),

            // Resources
            ApiError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            ApiError::NotFoundWith(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),

            // Upstream
            ApiError::ProvisioningFailed => (StatusCode::BAD_GATEWAY, "PROVISIONING_FAILED", "Failed to provision the domain. It will be retried automatically.".to_string()),
            ApiError::DirectoryUnavailable => (StatusCode::BAD_GATEWAY, "DIRECTORY_UNAVAILABLE", self.to_string()),
            ApiError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT", self.to_string()),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<DirectoryError> for ApiError {
    fn from(err: DirectoryError) -> Self {
        if let DirectoryError::Conflict = err {
            return ApiError::Conflict("Record was changed concurrently, retry shortly".to_string());
        }
        tracing::error!(error = %err, "Tenant directory error");
        match err {
            DirectoryError::Timeout => ApiError::Timeout,
            _ => ApiError::DirectoryUnavailable,
        }
    }
}

impl From<OnboardingError> for ApiError {
    fn from(err: OnboardingError) -> Self {
        match err {
            OnboardingError::InvalidDomain(domain) => {
                ApiError::Validation(format!("Invalid domain: {}", domain))
            }
            OnboardingError::PlatformDomain(domain) => {
                ApiError::Validation(format!("{} is a platform domain", domain))
            }
            OnboardingError::TenantNotFound(id) => {
                ApiError::NotFoundWith(format!("Tenant not found: {}", id))
            }
            OnboardingError::NotAttached(domain) => {
                ApiError::NotFoundWith(format!("Domain {} is not attached", domain))
            }
            OnboardingError::Conflict(domain) => ApiError::Conflict(format!(
                "Domain {} is already attached to another tenant",
                domain
            )),
            OnboardingError::Busy(domain) => ApiError::Conflict(format!(
                "Domain {} is being updated, retry shortly",
                domain
            )),
            OnboardingError::Timeout(domain) => {
                tracing::warn!(domain = %domain, "Domain transition timed out");
                ApiError::Timeout
            }
            OnboardingError::Directory(e) => e.into(),
            OnboardingError::Provisioning(e) => {
                // Command output stays in the logs
                tracing::error!(error = ?e, "Ingress provisioning failed");
                ApiError::ProvisioningFailed
            }
        }
    }
}
