//! Application configuration

use std::collections::HashMap;
use std::env;
use std::net::Ipv4Addr;
use std::time::Duration;

use storefront_shared::Theme;

/// Default platform nameservers, sorted
const DEFAULT_NAMESERVERS: &str = "ns1.digitalocean.com,ns2.digitalocean.com,ns3.digitalocean.com";

/// Path prefixes that never need tenant identity
const DEFAULT_STATIC_PREFIXES: &str = "/_next/,/static/,/assets/,/favicon.ico,/robots.txt";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,
    /// Listener for health and `/internal/v1`; keep it off the public network
    pub internal_bind_address: String,

    // Tenant resolution
    pub main_domain: String, // e.g., "mainsite.com" for *.mainsite.com storefronts
    pub marketing_url: String,
    pub accounts_subdomain: String,
    pub default_wallet_provider: String,
    pub static_path_prefixes: Vec<String>,

    // DNS verification
    pub expected_nameservers: [String; 3],
    pub ingress_ip: Ipv4Addr,
    pub dns_timeout: Duration,

    // Ingress provisioning
    pub ingress: IngressConfig,
    pub orchestrator_timeout: Duration,

    // Tenant directory
    pub directory_url: String,
    pub directory_api_key: Option<String>,
    pub directory_timeout: Duration,
    pub directory_redact_fields: Vec<String>,

    // Worker
    pub domain_poll_cron: String,
    pub domain_poll_concurrency: usize,
}

/// Settings for rendering and applying ingress manifests
#[derive(Debug, Clone)]
pub struct IngressConfig {
    pub namespace: String,
    pub ingress_class: String,
    pub cert_issuer: String,
    pub kubectl_path: String,
    pub theme_services: HashMap<Theme, String>,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            ingress_class: "nginx".to_string(),
            cert_issuer: "letsencrypt-prod".to_string(),
            kubectl_path: "kubectl".to_string(),
            theme_services: HashMap::from([
                (Theme::Legacy, "storefront-legacy".to_string()),
                (Theme::Default, "storefront".to_string()),
            ]),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = IngressConfig::default();

        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            internal_bind_address: env::var("INTERNAL_BIND_ADDRESS")
                .unwrap_or_else(|_| "127.0.0.1:3001".to_string()),

            // Tenant resolution
            main_domain: required("MAIN_DOMAIN")?.trim().to_lowercase(),
            marketing_url: required("MARKETING_URL")?.trim_end_matches('/').to_string(),
            accounts_subdomain: env::var("ACCOUNTS_SUBDOMAIN")
                .unwrap_or_else(|_| "accounts".to_string()),
            default_wallet_provider: env::var("DEFAULT_WALLET_PROVIDER")
                .unwrap_or_else(|_| "monpay".to_string()),
            static_path_prefixes: list(
                &env::var("STATIC_PATH_PREFIXES")
                    .unwrap_or_else(|_| DEFAULT_STATIC_PREFIXES.to_string()),
            ),

            // DNS verification
            expected_nameservers: nameservers(
                &env::var("EXPECTED_NAMESERVERS")
                    .unwrap_or_else(|_| DEFAULT_NAMESERVERS.to_string()),
            )?,
            ingress_ip: required("INGRESS_IP")?
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid("INGRESS_IP", "must be an IPv4 address"))?,
            dns_timeout: millis("DNS_TIMEOUT_MS", 5_000)?,

            // Ingress provisioning
            ingress: IngressConfig {
                namespace: env::var("INGRESS_NAMESPACE").unwrap_or(defaults.namespace),
                ingress_class: env::var("INGRESS_CLASS").unwrap_or(defaults.ingress_class),
                cert_issuer: env::var("CERT_ISSUER").unwrap_or(defaults.cert_issuer),
                kubectl_path: env::var("KUBECTL_PATH").unwrap_or(defaults.kubectl_path),
                theme_services: HashMap::from([
                    (
                        Theme::Legacy,
                        env::var("THEME_SERVICE_LEGACY")
                            .unwrap_or_else(|_| "storefront-legacy".to_string()),
                    ),
                    (
                        Theme::Default,
                        env::var("THEME_SERVICE_DEFAULT")
                            .unwrap_or_else(|_| "storefront".to_string()),
                    ),
                ]),
            },
            orchestrator_timeout: millis("ORCHESTRATOR_TIMEOUT_MS", 30_000)?,

            // Tenant directory
            directory_url: required("DIRECTORY_URL")?.trim_end_matches('/').to_string(),
            directory_api_key: env::var("DIRECTORY_API_KEY").ok().filter(|k| !k.is_empty()),
            directory_timeout: millis("DIRECTORY_TIMEOUT_MS", 3_000)?,
            directory_redact_fields: list(
                &env::var("DIRECTORY_REDACT_FIELDS")
                    .unwrap_or_else(|_| "owner.phone,owner.email,payment".to_string()),
            ),

            // Worker
            domain_poll_cron: env::var("DOMAIN_POLL_CRON")
                .unwrap_or_else(|_| "0 */5 * * * *".to_string()),
            domain_poll_concurrency: match env::var("DOMAIN_POLL_CONCURRENCY") {
                Ok(v) => v.trim().parse().map_err(|_| {
                    ConfigError::Invalid("DOMAIN_POLL_CONCURRENCY", "must be a positive integer")
                })?,
                Err(_) => 8,
            },
        })
    }

    /// `https://{main_domain}`
    pub fn main_domain_url(&self) -> String {
        format!("https://{}", self.main_domain)
    }

    /// Upper bound for one onboarding transition: both DNS checks, up to
    /// two orchestrator calls and a handful of directory writes
    pub fn transition_deadline(&self) -> Duration {
        self.dns_timeout * 2 + self.orchestrator_timeout * 2 + self.directory_timeout * 4
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(key)),
    }
}

fn millis(key: &'static str, default: u64) -> Result<Duration, ConfigError> {
    match env::var(key) {
        Ok(v) => v
            .trim()
            .parse()
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::Invalid(key, "must be a number of milliseconds")),
        Err(_) => Ok(Duration::from_millis(default)),
    }
}

fn list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse the expected nameserver trio into a sorted, normalized array
fn nameservers(raw: &str) -> Result<[String; 3], ConfigError> {
    let mut names: Vec<String> = list(raw)
        .into_iter()
        .map(|n| n.trim_end_matches('.').to_lowercase())
        .collect();
    names.sort();

    names.try_into().map_err(|_| {
        ConfigError::Invalid("EXPECTED_NAMESERVERS", "must list exactly three nameservers")
    })
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    /// Helper to set required env vars for testing
    fn setup_minimal_config() {
        env::set_var("MAIN_DOMAIN", "MainSite.com");
        env::set_var("MARKETING_URL", "https://about.mainsite.com/");
        env::set_var("INGRESS_IP", "203.0.113.10");
        env::set_var("DIRECTORY_URL", "http://directory.internal/");
    }

    /// Helper to clear env vars after tests
    fn cleanup_config() {
        for key in [
            "MAIN_DOMAIN",
            "MARKETING_URL",
            "INGRESS_IP",
            "DIRECTORY_URL",
            "EXPECTED_NAMESERVERS",
            "DNS_TIMEOUT_MS",
            "THEME_SERVICE_LEGACY",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_minimal_config_uses_defaults() {
        setup_minimal_config();

        let config = Config::from_env().unwrap();
        assert_eq!(config.main_domain, "mainsite.com");
        assert_eq!(config.bind_address, "0.0.0.0:3000");
        assert_eq!(config.internal_bind_address, "127.0.0.1:3001");
        assert_eq!(config.marketing_url, "https://about.mainsite.com");
        assert_eq!(config.directory_url, "http://directory.internal");
        assert_eq!(config.accounts_subdomain, "accounts");
        assert_eq!(config.default_wallet_provider, "monpay");
        assert_eq!(config.ingress_ip, Ipv4Addr::new(203, 0, 113, 10));
        assert_eq!(
            config.expected_nameservers,
            [
                "ns1.digitalocean.com".to_string(),
                "ns2.digitalocean.com".to_string(),
                "ns3.digitalocean.com".to_string(),
            ]
        );
        assert_eq!(config.main_domain_url(), "https://mainsite.com");
        assert_eq!(
            config.ingress.theme_services.get(&Theme::Legacy).map(String::as_str),
            Some("storefront-legacy")
        );

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_missing_required_var() {
        setup_minimal_config();
        env::remove_var("DIRECTORY_URL");

        match Config::from_env() {
            Err(ConfigError::Missing("DIRECTORY_URL")) => {}
            other => panic!("Expected Missing error for DIRECTORY_URL, got: {:?}", other),
        }

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_invalid_values_are_rejected() {
        setup_minimal_config();

        env::set_var("INGRESS_IP", "not-an-ip");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid("INGRESS_IP", _))
        ));
        env::set_var("INGRESS_IP", "203.0.113.10");

        env::set_var("EXPECTED_NAMESERVERS", "ns1.example.com,ns2.example.com");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid("EXPECTED_NAMESERVERS", _))
        ));
        env::remove_var("EXPECTED_NAMESERVERS");

        env::set_var("DNS_TIMEOUT_MS", "soon");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid("DNS_TIMEOUT_MS", _))
        ));

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_nameservers_are_normalized_and_sorted() {
        setup_minimal_config();
        env::set_var(
            "EXPECTED_NAMESERVERS",
            "NS3.example.com., ns1.example.com, ns2.example.com",
        );
        env::set_var("THEME_SERVICE_LEGACY", "shop-v1");

        let config = Config::from_env().unwrap();
        assert_eq!(config.expected_nameservers[0], "ns1.example.com");
        assert_eq!(config.expected_nameservers[2], "ns3.example.com");
        assert_eq!(
            config.ingress.theme_services.get(&Theme::Legacy).map(String::as_str),
            Some("shop-v1")
        );

        cleanup_config();
    }
}
