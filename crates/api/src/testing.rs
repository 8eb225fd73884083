//! In-memory collaborators shared by the crate's unit tests

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use storefront_shared::{DomainRegistration, DomainStatus, Tenant, Theme};

use crate::config::{Config, IngressConfig};
use crate::directory::{DirectoryError, DirectoryResult, TenantDirectory};
use crate::domains::{DnsCheckError, DnsLookup, ObjectKind, Orchestrator, ProvisioningError};
use crate::domains::ingress::CommandOutput;

/// In-memory directory used across the crate's tests
#[derive(Default)]
pub struct FakeDirectory {
    pub tenants: Mutex<HashMap<String, Tenant>>,
    pub registrations: Mutex<HashMap<String, DomainRegistration>>,
    pub fail_lookups: bool,
    pub fail_writes: bool,
    pub fetches: AtomicUsize,
    /// Ordered log of mutating calls
    pub calls: Mutex<Vec<String>>,
}

impl FakeDirectory {
    pub fn with_tenant(tenant: Tenant) -> Self {
        let dir = Self::default();
        dir.tenants.lock().unwrap().insert(tenant.id.clone(), tenant);
        dir
    }

    pub fn tenant(&self, id: &str) -> Option<Tenant> {
        self.tenants.lock().unwrap().get(id).cloned()
    }

    pub fn registration(&self, domain: &str) -> Option<DomainRegistration> {
        self.registrations.lock().unwrap().get(domain).cloned()
    }
}

#[async_trait]
impl TenantDirectory for FakeDirectory {
    async fn fetch(&self, tenant_id: &str) -> DirectoryResult<Option<Tenant>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_lookups {
            return Err(DirectoryError::Timeout);
        }
        Ok(self.tenant(tenant_id))
    }

    async fn set_custom_domain(
        &self,
        tenant_id: &str,
        domain: Option<&str>,
    ) -> DirectoryResult<()> {
        if self.fail_writes {
            return Err(DirectoryError::Timeout);
        }
        self.calls
            .lock()
            .unwrap()
            .push(format!("set_custom_domain:{}:{:?}", tenant_id, domain));
        let mut tenants = self.tenants.lock().unwrap();
        let tenant = tenants
            .get_mut(tenant_id)
            .ok_or_else(|| DirectoryError::Status(404, "tenant not found".to_string()))?;
        tenant.custom_domain = domain.map(str::to_string);
        Ok(())
    }

    async fn save_registration(
        &self,
        registration: &DomainRegistration,
        expected_version: u64,
    ) -> DirectoryResult<()> {
        if self.fail_writes {
            return Err(DirectoryError::Timeout);
        }
        let mut registrations = self.registrations.lock().unwrap();
        let current = registrations
            .get(&registration.domain)
            .map(|r| r.version)
            .unwrap_or(0);
        if current != expected_version {
            return Err(DirectoryError::Conflict);
        }
        self.calls.lock().unwrap().push(format!(
            "save_registration:{}:{}",
            registration.domain, registration.status
        ));
        registrations.insert(registration.domain.clone(), registration.clone());
        Ok(())
    }

    async fn find_registration(&self, domain: &str) -> DirectoryResult<Option<DomainRegistration>> {
        Ok(self.registration(domain))
    }

    async fn list_registrations(
        &self,
        status: DomainStatus,
    ) -> DirectoryResult<Vec<DomainRegistration>> {
        Ok(self
            .registrations
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> DirectoryResult<()> {
        if self.fail_lookups {
            return Err(DirectoryError::Timeout);
        }
        Ok(())
    }
}

pub fn test_config() -> Config {
    Config {
        bind_address: "127.0.0.1:0".to_string(),
        internal_bind_address: "127.0.0.1:0".to_string(),
        main_domain: "mainsite.com".to_string(),
        marketing_url: "https://about.mainsite.com".to_string(),
        accounts_subdomain: "accounts".to_string(),
        default_wallet_provider: "monpay".to_string(),
        static_path_prefixes: vec!["/_next/".to_string(), "/favicon.ico".to_string()],
        expected_nameservers: [
            "ns1.digitalocean.com".to_string(),
            "ns2.digitalocean.com".to_string(),
            "ns3.digitalocean.com".to_string(),
        ],
        ingress_ip: Ipv4Addr::new(203, 0, 113, 10),
        dns_timeout: Duration::from_secs(1),
        ingress: IngressConfig::default(),
        orchestrator_timeout: Duration::from_secs(5),
        directory_url: "http://directory.invalid".to_string(),
        directory_api_key: None,
        directory_timeout: Duration::from_secs(1),
        directory_redact_fields: vec![],
        domain_poll_cron: "0 */5 * * * *".to_string(),
        domain_poll_concurrency: 4,
    }
}

pub fn active_tenant(id: &str) -> Tenant {
    Tenant {
        id: id.to_string(),
        custom_domain: None,
        is_subscribed: true,
        expired: false,
        theme: Theme::Default,
        categories: vec![],
    }
}

/// Canned DNS answers; unknown names fail like NXDOMAIN
#[derive(Default)]
pub struct FakeDns {
    pub ns: HashMap<String, Vec<String>>,
    pub a: HashMap<String, Vec<Ipv4Addr>>,
    pub fail: bool,
    pub delay: Option<Duration>,
}

impl FakeDns {
    pub fn with_ns(mut self, domain: &str, names: &[&str]) -> Self {
        self.ns
            .insert(domain.to_string(), names.iter().map(|n| n.to_string()).collect());
        self
    }

    pub fn with_a(mut self, domain: &str, addrs: &[Ipv4Addr]) -> Self {
        self.a.insert(domain.to_string(), addrs.to_vec());
        self
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl DnsLookup for FakeDns {
    async fn nameservers(&self, domain: &str) -> Result<Vec<String>, DnsCheckError> {
        self.pause().await;
        if self.fail {
            return Err(DnsCheckError::Lookup(domain.to_string(), "SERVFAIL".to_string()));
        }
        self.ns
            .get(domain)
            .cloned()
            .ok_or_else(|| DnsCheckError::Lookup(domain.to_string(), "NXDOMAIN".to_string()))
    }

    async fn ipv4_addresses(&self, domain: &str) -> Result<Vec<Ipv4Addr>, DnsCheckError> {
        self.pause().await;
        if self.fail {
            return Err(DnsCheckError::Lookup(domain.to_string(), "SERVFAIL".to_string()));
        }
        self.a
            .get(domain)
            .cloned()
            .ok_or_else(|| DnsCheckError::Lookup(domain.to_string(), "NXDOMAIN".to_string()))
    }
}

/// In-memory cluster keyed by `kind/name`
#[derive(Default)]
pub struct FakeOrchestrator {
    pub objects: Mutex<HashMap<String, String>>,
    pub applied_paths: Mutex<Vec<PathBuf>>,
    /// Ordered log of orchestrator calls
    pub calls: Mutex<Vec<String>>,
    pub unchanged: AtomicUsize,
    pub fail_apply: bool,
    pub fail_delete: bool,
    pub delay: Option<Duration>,
}

impl FakeOrchestrator {
    pub fn object(&self, kind: &str, name: &str) -> Option<String> {
        self.objects
            .lock()
            .unwrap()
            .get(&format!("{}/{}", kind, name))
            .cloned()
    }

    pub fn insert(&self, kind: &str, name: &str, contents: &str) {
        self.objects
            .lock()
            .unwrap()
            .insert(format!("{}/{}", kind, name), contents.to_string());
    }

    pub fn unchanged_applies(&self) -> usize {
        self.unchanged.load(Ordering::SeqCst)
    }

    fn failure(command: &str) -> ProvisioningError {
        ProvisioningError::Command {
            command: command.to_string(),
            status: "exit status: 1".to_string(),
            stdout: String::new(),
            stderr: "Error from server: admission webhook denied the request".to_string(),
        }
    }
}

#[async_trait]
impl Orchestrator for FakeOrchestrator {
    async fn apply(&self, path: &Path) -> Result<CommandOutput, ProvisioningError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.applied_paths.lock().unwrap().push(path.to_path_buf());
        if self.fail_apply {
            return Err(Self::failure("kubectl apply"));
        }

        let contents = std::fs::read_to_string(path)?;
        let doc: serde_yaml::Value = serde_yaml::from_str(&contents)
            .map_err(|e| ProvisioningError::Render(e.to_string()))?;
        let name = doc["metadata"]["name"].as_str().unwrap_or_default().to_string();
        self.calls.lock().unwrap().push(format!("apply:ingress:{}", name));

        let key = format!("ingress/{}", name);
        let mut objects = self.objects.lock().unwrap();
        let verb = if objects.get(&key) == Some(&contents) {
            self.unchanged.fetch_add(1, Ordering::SeqCst);
            "unchanged"
        } else {
            "configured"
        };
        objects.insert(key, contents);

        Ok(CommandOutput {
            stdout: format!("ingress.networking.k8s.io/{} {}", name, verb),
            stderr: String::new(),
        })
    }

    async fn delete(&self, kind: ObjectKind, name: &str) -> Result<CommandOutput, ProvisioningError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("delete:{}:{}", kind.as_str(), name));
        if self.fail_delete {
            return Err(Self::failure("kubectl delete"));
        }
        self.objects
            .lock()
            .unwrap()
            .remove(&format!("{}/{}", kind.as_str(), name));
        Ok(CommandOutput::default())
    }
}
