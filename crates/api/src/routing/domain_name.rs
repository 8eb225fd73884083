//! Hostname parsing against the public suffix list
//!
//! Splits a host into its registrable domain, subdomain and public suffix:
//! - `shop1.mainsite.com` -> (`mainsite.com`, `shop1`, `com`)
//! - `a.b.myshop.co.uk`   -> (`myshop.co.uk`, `a.b`, `co.uk`)

/// A hostname split at its public suffix boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainName {
    /// Registrable domain, e.g. `myshop.co.uk`
    pub registrable_domain: String,
    /// Labels left of the registrable domain, empty for apex hosts
    pub subdomain: String,
    /// Public suffix, e.g. `co.uk`
    pub tld: String,
}

impl DomainName {
    /// True when the host is the registrable domain itself
    pub fn is_apex(&self) -> bool {
        self.subdomain.is_empty()
    }

    /// Registrable domain with its public suffix removed (`myshop.co.uk` -> `myshop`)
    pub fn label(&self) -> &str {
        self.registrable_domain
            .strip_suffix(&self.tld)
            .and_then(|s| s.strip_suffix('.'))
            .unwrap_or(&self.registrable_domain)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid hostname: {0}")]
pub struct InvalidHostnameError(pub String);

/// Parse a hostname (optionally carrying a port) into its parts
pub fn parse(hostname: &str) -> Result<DomainName, InvalidHostnameError> {
    let host = normalize_host(hostname);
    let invalid = || InvalidHostnameError(hostname.to_string());

    if !is_well_formed(&host) {
        return Err(invalid());
    }

    let domain = psl::domain(host.as_bytes()).ok_or_else(invalid)?;
    let suffix = domain.suffix();
    if !suffix.is_known() {
        return Err(invalid());
    }

    let registrable_domain = std::str::from_utf8(domain.as_bytes())
        .map_err(|_| invalid())?
        .to_string();
    let tld = std::str::from_utf8(suffix.as_bytes())
        .map_err(|_| invalid())?
        .to_string();

    let subdomain = host
        .strip_suffix(&registrable_domain)
        .map(|prefix| prefix.trim_end_matches('.').to_string())
        .unwrap_or_default();

    Ok(DomainName {
        registrable_domain,
        subdomain,
        tld,
    })
}

/// Normalize a host header value
pub fn normalize_host(host: &str) -> String {
    // Remove port if present
    let host = host.trim().split(':').next().unwrap_or(host);
    // Lowercase, drop the root label
    host.trim_end_matches('.').to_lowercase()
}

fn is_well_formed(host: &str) -> bool {
    if host.is_empty() || host.len() > 253 {
        return false;
    }

    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    })
}
