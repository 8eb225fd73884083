//! Tenant resolution middleware
//!
//! Runs the host resolver for every storefront request. Resolved requests
//! continue with the `TenantContext` attached as an extension and mirrored
//! into `x-tenant-*` headers for proxied frontends; everything else is
//! redirected. Never produces an error response.

use axum::{
    body::Body,
    extract::State,
    http::{header::HOST, HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use storefront_shared::TenantContext;

use super::HostResolver;
use super::RoutingDecision;

pub const TENANT_ID_HEADER: &str = "x-tenant-id";
pub const EMBEDDED_APP_HEADER: &str = "x-embedded-app";
pub const IN_APP_HEADER: &str = "x-in-app";
pub const ORIGIN_PROVIDER_HEADER: &str = "x-origin-provider";

const CONTEXT_HEADERS: [&str; 4] = [
    TENANT_ID_HEADER,
    EMBEDDED_APP_HEADER,
    IN_APP_HEADER,
    ORIGIN_PROVIDER_HEADER,
];

/// Middleware that resolves the tenant for the request's host
pub async fn tenant_resolution_middleware(
    State(resolver): State<HostResolver>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let host = request_host(&request);
    let path = request
        .uri()
        .path_and_query()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    // Context headers are only ever set by this layer
    for name in CONTEXT_HEADERS {
        request.headers_mut().remove(name);
    }

    match resolver.resolve(&host, &path).await {
        RoutingDecision::Pass(context) => {
            if let Some(context) = context {
                insert_context_headers(request.headers_mut(), &context);
                request.extensions_mut().insert(context);
            }
            next.run(request).await
        }
        RoutingDecision::Redirect { location, reason } => {
            tracing::debug!(host = %host, location = %location, ?reason, "Redirecting request");
            if reason.is_permanent() {
                Redirect::permanent(&location).into_response()
            } else {
                Redirect::temporary(&location).into_response()
            }
        }
    }
}

/// Host the client asked for: Host header, falling back to the URI authority
fn request_host(request: &Request<Body>) -> String {
    request
        .headers()
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| request.uri().host())
        .unwrap_or_default()
        .to_string()
}

fn insert_context_headers(headers: &mut HeaderMap, context: &TenantContext) {
    if let Ok(value) = HeaderValue::from_str(&context.tenant_id) {
        headers.insert(TENANT_ID_HEADER, value);
    }
    headers.insert(EMBEDDED_APP_HEADER, bool_header(context.is_embedded_app));
    headers.insert(IN_APP_HEADER, bool_header(context.is_in_app));
    if !context.origin_provider.is_empty() {
        if let Ok(value) = HeaderValue::from_str(&context.origin_provider) {
            headers.insert(ORIGIN_PROVIDER_HEADER, value);
        }
    }
}

fn bool_header(value: bool) -> HeaderValue {
    HeaderValue::from_static(if value { "true" } else { "false" })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{active_tenant, test_config, FakeDirectory};
    use axum::{http::StatusCode, routing::get, Extension, Router};
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn echo(
        context: Option<Extension<TenantContext>>,
        headers: HeaderMap,
    ) -> String {
        let provider = headers
            .get(ORIGIN_PROVIDER_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string();
        match context {
            Some(Extension(ctx)) => format!("{}|{}", ctx.tenant_id, provider),
            None => "anonymous".to_string(),
        }
    }

    fn app(directory: FakeDirectory) -> Router {
        let resolver = HostResolver::new(Arc::new(directory), Arc::new(test_config()));
        Router::new()
            .fallback(get(echo))
            .layer(axum::middleware::from_fn_with_state(
                resolver,
                tenant_resolution_middleware,
            ))
    }

    fn request(host: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(HOST, host)
            .header(TENANT_ID_HEADER, "spoofed")
            .body(Body::empty())
            .unwrap()
    }

    async fn body(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_pass_attaches_context() {
        let app = app(FakeDirectory::with_tenant(active_tenant("shop1")));

        let response = app
            .oneshot(request("shop1.miniapp.mainsite.com", "/products"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(response).await, "shop1|monpay");
    }

    #[tokio::test]
    async fn test_spoofed_context_headers_are_dropped() {
        let app = app(FakeDirectory::default());

        let response = app
            .oneshot(request("accounts.mainsite.com", "/login"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(response).await, "anonymous");
    }

    #[tokio::test]
    async fn test_unknown_host_redirects_to_marketing() {
        let app = app(FakeDirectory::default());

        let response = app.oneshot(request("nobody.mainsite.com", "/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            response.headers().get("location").unwrap(),
            "https://about.mainsite.com"
        );
    }

    #[tokio::test]
    async fn test_malformed_host_redirects_instead_of_failing() {
        let app = app(FakeDirectory::default());

        let response = app.oneshot(request("localhost:3000", "/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    }

    #[tokio::test]
    async fn test_custom_domain_redirect_keeps_path_and_query() {
        let mut tenant = active_tenant("shop1");
        tenant.custom_domain = Some("myshop.com".to_string());
        let app = app(FakeDirectory::with_tenant(tenant));

        let response = app
            .oneshot(request("shop1.mainsite.com", "/original/path?page=2"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
        assert_eq!(
            response.headers().get("location").unwrap(),
            "https://myshop.com/original/path?page=2"
        );
    }
}
