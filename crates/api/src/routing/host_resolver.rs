//! Host-to-Tenant Resolution
//!
//! Resolves incoming Host headers to storefront tenants and decides whether
//! the request is served, sent to the tenant's canonical domain, or bounced
//! to the platform:
//! - Platform subdomains: shop1.mainsite.com -> tenant `shop1`
//! - Wallet mini-apps: shop1.miniapp.mainsite.com -> tenant `shop1` via monpay
//! - In-app shells: shop1-qpay.inapp.mainsite.com -> tenant `shop1` via qpay
//! - Custom domains: myshop.com -> tenant `myshop`, shop.myshop.com -> `shop.myshop`

use std::sync::Arc;

use storefront_shared::TenantContext;
use tracing::{debug, info, warn};

use super::domain_name::{self, DomainName};
use crate::config::Config;
use crate::directory::TenantDirectory;

/// Suffixes that mark a wallet/social embedded app
const EMBEDDED_SUFFIXES: &[&str] = &["miniapp", "socialpay"];

/// Suffix that marks an in-app browser shell (`{tenant}-{provider}.inapp`)
const IN_APP_SUFFIX: &str = "inapp";

/// Tenant identity derived from the host alone, before any lookup
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TenantToken {
    pub tenant_id: String,
    pub is_embedded_app: bool,
    pub is_in_app: bool,
    pub origin_provider: String,
    /// Whether the host is under the platform's main domain
    pub on_main_domain: bool,
}

/// What the edge should do with a request
#[derive(Debug, Clone, PartialEq)]
pub enum RoutingDecision {
    /// Continue to the next handler, with tenant context when one was resolved
    Pass(Option<TenantContext>),
    /// Send the client elsewhere
    Redirect { location: String, reason: RedirectReason },
}

/// Why a request was redirected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectReason {
    /// Host unparsable, no tenant token, tenant unknown or directory unavailable
    Marketing,
    /// Tenant exists but is expired or unsubscribed
    InactiveTenant,
    /// Browser traffic on the platform domain for a tenant with its own domain
    CanonicalDomain,
}

impl RedirectReason {
    /// Canonical-domain redirects are permanent; the rest depend on tenant state
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::CanonicalDomain)
    }
}

/// Resolves hosts to tenants using the directory
#[derive(Clone)]
pub struct HostResolver {
    directory: Arc<dyn TenantDirectory>,
    config: Arc<Config>,
}

impl HostResolver {
    pub fn new(directory: Arc<dyn TenantDirectory>, config: Arc<Config>) -> Self {
        Self { directory, config }
    }

    /// Resolve a host header and request path to a routing decision.
    ///
    /// Never fails: every error path degrades to a redirect. Performs at most
    /// one directory lookup.
    pub async fn resolve(&self, host: &str, path: &str) -> RoutingDecision {
        if self.is_static_path(path) {
            return RoutingDecision::Pass(None);
        }

        let parsed = match domain_name::parse(host) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!(host = %host, error = %e, "Unparsable host");
                return self.to_marketing();
            }
        };

        if parsed.registrable_domain == self.config.main_domain
            && parsed.subdomain == self.config.accounts_subdomain
        {
            return RoutingDecision::Pass(None);
        }

        let token = self.tenant_token(&parsed);
        if token.tenant_id.is_empty() {
            return self.to_marketing();
        }

        let lookup = self.directory.fetch(&token.tenant_id);
        let tenant = match tokio::time::timeout(self.config.directory_timeout, lookup).await {
            Ok(Ok(Some(tenant))) => tenant,
            Ok(Ok(None)) => {
                debug!(host = %host, tenant_id = %token.tenant_id, "Tenant not found");
                return self.to_marketing();
            }
            Ok(Err(e)) => {
                warn!(host = %host, tenant_id = %token.tenant_id, error = %e, "Tenant lookup failed");
                return self.to_marketing();
            }
            Err(_) => {
                warn!(host = %host, tenant_id = %token.tenant_id, "Tenant lookup timed out");
                return self.to_marketing();
            }
        };

        if !tenant.is_active() {
            info!(tenant_id = %tenant.id, "Tenant inactive, redirecting to main domain");
            return RoutingDecision::Redirect {
                location: self.config.main_domain_url(),
                reason: RedirectReason::InactiveTenant,
            };
        }

        if !token.is_embedded_app && token.on_main_domain {
            if let Some(custom_domain) = tenant.canonical_domain() {
                return RoutingDecision::Redirect {
                    location: format!("https://{}{}", custom_domain, path),
                    reason: RedirectReason::CanonicalDomain,
                };
            }
        }

        RoutingDecision::Pass(Some(TenantContext {
            tenant_id: token.tenant_id,
            is_embedded_app: token.is_embedded_app,
            is_in_app: token.is_in_app,
            origin_provider: token.origin_provider,
            categories: tenant.categories,
        }))
    }

    /// Derive the tenant token and request flags from a parsed host
    pub fn tenant_token(&self, parsed: &DomainName) -> TenantToken {
        if parsed.registrable_domain != self.config.main_domain {
            let label = parsed.label();
            let tenant_id = if parsed.subdomain.is_empty() || label.is_empty() {
                label.to_string()
            } else {
                format!("{}.{}", parsed.subdomain, label)
            };
            return TenantToken {
                tenant_id,
                ..TenantToken::default()
            };
        }

        let mut token = TenantToken {
            tenant_id: parsed.subdomain.clone(),
            on_main_domain: true,
            ..TenantToken::default()
        };

        if let Some((base, provider)) = split_suffix(&parsed.subdomain, EMBEDDED_SUFFIXES) {
            token.is_embedded_app = true;
            token.origin_provider = if provider == "miniapp" {
                self.config.default_wallet_provider.clone()
            } else {
                provider.to_string()
            };
            token.tenant_id = base.to_string();
        } else if let Some((base, _)) = split_suffix(&parsed.subdomain, &[IN_APP_SUFFIX]) {
            let parts: Vec<&str> = base.split('-').collect();
            if let [tenant_id, provider] = parts.as_slice() {
                token.is_in_app = true;
                token.is_embedded_app = true;
                token.origin_provider = provider.to_string();
                token.tenant_id = tenant_id.to_string();
            } else {
                token.tenant_id = base.to_string();
            }
        }

        token
    }

    fn is_static_path(&self, path: &str) -> bool {
        self.config
            .static_path_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }

    fn to_marketing(&self) -> RoutingDecision {
        RoutingDecision::Redirect {
            location: self.config.marketing_url.clone(),
            reason: RedirectReason::Marketing,
        }
    }
}

/// Split `{base}.{suffix}` when the last label is one of `suffixes`
fn split_suffix<'a>(token: &'a str, suffixes: &[&str]) -> Option<(&'a str, &'a str)> {
    let (base, last) = token.rsplit_once('.')?;
    suffixes.contains(&last).then_some((base, last))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{active_tenant, test_config, FakeDirectory};
    use std::sync::atomic::Ordering;

    fn resolver(directory: FakeDirectory) -> (HostResolver, Arc<FakeDirectory>) {
        let directory = Arc::new(directory);
        let resolver = HostResolver::new(directory.clone(), Arc::new(test_config()));
        (resolver, directory)
    }

    fn passed(decision: RoutingDecision) -> TenantContext {
        match decision {
            RoutingDecision::Pass(Some(ctx)) => ctx,
            other => panic!("Expected Pass with context, got: {:?}", other),
        }
    }

    fn marketing() -> RoutingDecision {
        RoutingDecision::Redirect {
            location: "https://about.mainsite.com".to_string(),
            reason: RedirectReason::Marketing,
        }
    }

    #[tokio::test]
    async fn test_platform_subdomain_passes() {
        let (resolver, _) = resolver(FakeDirectory::with_tenant(active_tenant("shop1")));

        let ctx = passed(resolver.resolve("shop1.mainsite.com", "/").await);
        assert_eq!(ctx.tenant_id, "shop1");
        assert!(!ctx.is_embedded_app);
        assert!(!ctx.is_in_app);
        assert_eq!(ctx.origin_provider, "");
    }

    #[tokio::test]
    async fn test_miniapp_suffix_uses_default_wallet() {
        let (resolver, _) = resolver(FakeDirectory::with_tenant(active_tenant("shop1")));

        let ctx = passed(resolver.resolve("shop1.miniapp.mainsite.com", "/").await);
        assert_eq!(ctx.tenant_id, "shop1");
        assert!(ctx.is_embedded_app);
        assert!(!ctx.is_in_app);
        assert_eq!(ctx.origin_provider, "monpay");
    }

    #[tokio::test]
    async fn test_socialpay_suffix_keeps_provider_name() {
        let (resolver, _) = resolver(FakeDirectory::with_tenant(active_tenant("shop1")));

        let ctx = passed(resolver.resolve("shop1.socialpay.mainsite.com", "/").await);
        assert_eq!(ctx.tenant_id, "shop1");
        assert!(ctx.is_embedded_app);
        assert_eq!(ctx.origin_provider, "socialpay");
    }

    #[tokio::test]
    async fn test_inapp_suffix_splits_provider() {
        let (resolver, _) = resolver(FakeDirectory::with_tenant(active_tenant("shop1")));

        let ctx = passed(resolver.resolve("shop1-qpay.inapp.mainsite.com", "/").await);
        assert_eq!(ctx.tenant_id, "shop1");
        assert!(ctx.is_in_app);
        assert!(ctx.is_embedded_app);
        assert_eq!(ctx.origin_provider, "qpay");
    }

    #[tokio::test]
    async fn test_inapp_suffix_fallback_keeps_whole_token() {
        let (resolver, directory) =
            resolver(FakeDirectory::with_tenant(active_tenant("shop1-qpay-extra")));

        let ctx = passed(resolver.resolve("shop1-qpay-extra.inapp.mainsite.com", "/").await);
        assert_eq!(ctx.tenant_id, "shop1-qpay-extra");
        assert!(!ctx.is_in_app);
        assert!(!ctx.is_embedded_app);
        assert_eq!(ctx.origin_provider, "");
        assert_eq!(directory.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_custom_domain_token() {
        let (resolver, _) = resolver(FakeDirectory::default());

        let token = resolver.tenant_token(&domain_name::parse("myshop.co.uk").unwrap());
        assert_eq!(token.tenant_id, "myshop");
        assert!(!token.on_main_domain);

        let token = resolver.tenant_token(&domain_name::parse("shop.myshop.com").unwrap());
        assert_eq!(token.tenant_id, "shop.myshop");
    }

    #[tokio::test]
    async fn test_custom_domain_host_passes_without_redirect() {
        let mut tenant = active_tenant("myshop");
        tenant.custom_domain = Some("myshop.com".to_string());
        let (resolver, _) = resolver(FakeDirectory::with_tenant(tenant));

        let ctx = passed(resolver.resolve("myshop.com", "/cart").await);
        assert_eq!(ctx.tenant_id, "myshop");
    }

    #[tokio::test]
    async fn test_accounts_subdomain_passes_without_lookup() {
        let (resolver, directory) = resolver(FakeDirectory::default());

        assert_eq!(
            resolver.resolve("accounts.mainsite.com", "/login").await,
            RoutingDecision::Pass(None)
        );
        assert_eq!(directory.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_static_paths_bypass_resolution() {
        let (resolver, directory) = resolver(FakeDirectory::default());

        assert_eq!(
            resolver.resolve("garbage host", "/_next/static/app.js").await,
            RoutingDecision::Pass(None)
        );
        assert_eq!(directory.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unparsable_hosts_go_to_marketing() {
        let (resolver, directory) = resolver(FakeDirectory::default());

        for host in ["", "localhost", "127.0.0.1", "bad..host.com", "x.notarealsuffixzz"] {
            assert_eq!(resolver.resolve(host, "/").await, marketing(), "host {:?}", host);
        }
        assert_eq!(directory.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bare_main_domain_goes_to_marketing() {
        let (resolver, directory) = resolver(FakeDirectory::default());

        assert_eq!(resolver.resolve("mainsite.com", "/").await, marketing());
        assert_eq!(directory.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_tenant_goes_to_marketing() {
        let (resolver, _) = resolver(FakeDirectory::default());
        assert_eq!(resolver.resolve("nobody.mainsite.com", "/").await, marketing());
    }

    #[tokio::test]
    async fn test_directory_failure_goes_to_marketing() {
        let (resolver, _) = resolver(FakeDirectory {
            fail_lookups: true,
            ..FakeDirectory::with_tenant(active_tenant("shop1"))
        });
        assert_eq!(resolver.resolve("shop1.mainsite.com", "/").await, marketing());
    }

    #[tokio::test]
    async fn test_inactive_tenant_goes_to_main_domain() {
        let mut expired = active_tenant("shop1");
        expired.expired = true;
        let (resolver, _) = resolver(FakeDirectory::with_tenant(expired));

        assert_eq!(
            resolver.resolve("shop1.mainsite.com", "/").await,
            RoutingDecision::Redirect {
                location: "https://mainsite.com".to_string(),
                reason: RedirectReason::InactiveTenant,
            }
        );

        let mut unsubscribed = active_tenant("shop2");
        unsubscribed.is_subscribed = false;
        let (resolver, _) = self::resolver(FakeDirectory::with_tenant(unsubscribed));
        assert!(matches!(
            resolver.resolve("shop2.mainsite.com", "/").await,
            RoutingDecision::Redirect { reason: RedirectReason::InactiveTenant, .. }
        ));
    }

    #[tokio::test]
    async fn test_browser_traffic_redirects_to_custom_domain() {
        let mut tenant = active_tenant("shop1");
        tenant.custom_domain = Some("myshop.com".to_string());
        let (resolver, _) = resolver(FakeDirectory::with_tenant(tenant));

        let decision = resolver
            .resolve("shop1.mainsite.com", "/original/path")
            .await;
        assert_eq!(
            decision,
            RoutingDecision::Redirect {
                location: "https://myshop.com/original/path".to_string(),
                reason: RedirectReason::CanonicalDomain,
            }
        );
    }

    #[tokio::test]
    async fn test_embedded_traffic_skips_custom_domain_redirect() {
        let mut tenant = active_tenant("shop1");
        tenant.custom_domain = Some("myshop.com".to_string());
        let (resolver, _) = resolver(FakeDirectory::with_tenant(tenant));

        let ctx = passed(resolver.resolve("shop1.miniapp.mainsite.com", "/").await);
        assert_eq!(ctx.tenant_id, "shop1");
        assert!(ctx.is_embedded_app);
    }

    #[test]
    fn test_split_suffix() {
        assert_eq!(split_suffix("shop1.miniapp", EMBEDDED_SUFFIXES), Some(("shop1", "miniapp")));
        assert_eq!(split_suffix("shop1", EMBEDDED_SUFFIXES), None);
        assert_eq!(split_suffix("shop1.inapp", EMBEDDED_SUFFIXES), None);
        assert_eq!(split_suffix("a.b.inapp", &[IN_APP_SUFFIX]), Some(("a.b", "inapp")));
    }
}
