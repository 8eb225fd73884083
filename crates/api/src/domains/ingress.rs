//! Ingress provisioning for custom domains
//!
//! Renders a `networking.k8s.io/v1` Ingress for a tenant domain and applies
//! it with the orchestrator's declarative apply. cert-manager picks up the
//! issuer annotation and issues the TLS certificate into `{name}-tls`.
//!
//! The provisioner does not check DNS; callers gate it on verification.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use storefront_shared::Theme;
use tokio::process::Command;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::IngressConfig;
use crate::routing::domain_name;

const API_VERSION: &str = "networking.k8s.io/v1";
const INGRESS_CLASS_ANNOTATION: &str = "kubernetes.io/ingress.class";
const CLUSTER_ISSUER_ANNOTATION: &str = "cert-manager.io/cluster-issuer";
const WWW_REDIRECT_ANNOTATION: &str = "nginx.ingress.kubernetes.io/from-to-www-redirect";
const BACKEND_PORT: u16 = 80;

/// Orchestrator command failures
#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
    #[error("`{command}` exited with {status}: {stderr}")]
    Command {
        command: String,
        status: String,
        stdout: String,
        stderr: String,
    },
    #[error("`{0}` timed out")]
    Timeout(String),
    #[error("No backend service configured for theme {0}")]
    UnknownTheme(Theme),
    #[error("Invalid domain: {0}")]
    InvalidDomain(String),
    #[error("Failed to render manifest: {0}")]
    Render(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Captured output of a successful orchestrator command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Object kinds the provisioner manages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Ingress,
    Certificate,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingress => "ingress",
            Self::Certificate => "certificate",
        }
    }
}

/// Declarative apply/delete against the cluster
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Apply the manifest at `path`; must converge on repeated calls
    async fn apply(&self, path: &Path) -> Result<CommandOutput, ProvisioningError>;

    /// Delete an object; a missing object is not an error
    async fn delete(&self, kind: ObjectKind, name: &str) -> Result<CommandOutput, ProvisioningError>;
}

/// `Orchestrator` that shells out to kubectl
pub struct Kubectl {
    program: String,
    namespace: String,
    timeout: Duration,
}

impl Kubectl {
    pub fn new(config: &IngressConfig, timeout: Duration) -> Self {
        Self {
            program: config.kubectl_path.clone(),
            namespace: config.namespace.clone(),
            timeout,
        }
    }

    async fn run(&self, args: &[&str]) -> Result<CommandOutput, ProvisioningError> {
        let command = format!("{} {}", self.program, args.join(" "));

        let child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the future on timeout/cancellation kills kubectl
            .kill_on_drop(true)
            .spawn()?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ProvisioningError::Timeout(command.clone()))??;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !output.status.success() {
            return Err(ProvisioningError::Command {
                command,
                status: output.status.to_string(),
                stdout,
                stderr,
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }
}

#[async_trait]
impl Orchestrator for Kubectl {
    async fn apply(&self, path: &Path) -> Result<CommandOutput, ProvisioningError> {
        let path = path.to_string_lossy();
        self.run(&["apply", "-n", &self.namespace, "-f", &path]).await
    }

    async fn delete(&self, kind: ObjectKind, name: &str) -> Result<CommandOutput, ProvisioningError> {
        self.run(&[
            "delete",
            "-n",
            &self.namespace,
            kind.as_str(),
            name,
            "--ignore-not-found",
        ])
        .await
    }
}

// ============================================================================
// Manifest
// ============================================================================

/// Everything that determines a domain's ingress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressManifest {
    /// Derived from the domain, dots replaced with hyphens
    pub name: String,
    /// The domain, plus `www.` for apex domains
    pub hosts: Vec<String>,
    pub theme: Theme,
    pub tls_secret_name: String,
    pub service: String,
    /// Apex domains redirect `www.` to the bare domain
    pub www_redirect: bool,
}

/// Deterministic ingress object name for a domain
pub fn ingress_name(domain: &str) -> String {
    domain.trim().to_lowercase().replace('.', "-")
}

/// Deterministic TLS secret (and certificate) name for a domain
pub fn tls_secret_name(domain: &str) -> String {
    format!("{}-tls", ingress_name(domain))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IngressDocument<'a> {
    api_version: &'static str,
    kind: &'static str,
    metadata: ObjectMeta<'a>,
    spec: IngressSpec<'a>,
}

#[derive(Serialize)]
struct ObjectMeta<'a> {
    name: &'a str,
    annotations: BTreeMap<&'static str, &'a str>,
}

#[derive(Serialize)]
struct IngressSpec<'a> {
    tls: Vec<IngressTls<'a>>,
    rules: Vec<IngressRule<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IngressTls<'a> {
    hosts: &'a [String],
    secret_name: &'a str,
}

#[derive(Serialize)]
struct IngressRule<'a> {
    host: &'a str,
    http: HttpRule<'a>,
}

#[derive(Serialize)]
struct HttpRule<'a> {
    paths: Vec<HttpPath<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HttpPath<'a> {
    path: &'static str,
    path_type: &'static str,
    backend: Backend<'a>,
}

#[derive(Serialize)]
struct Backend<'a> {
    service: BackendService<'a>,
}

#[derive(Serialize)]
struct BackendService<'a> {
    name: &'a str,
    port: ServicePort,
}

#[derive(Serialize)]
struct ServicePort {
    number: u16,
}

impl IngressManifest {
    /// Render the Kubernetes YAML document
    pub fn render(&self, config: &IngressConfig) -> Result<String, ProvisioningError> {
        let primary_host = self
            .hosts
            .first()
            .ok_or_else(|| ProvisioningError::Render("manifest has no hosts".to_string()))?;

        let mut annotations = BTreeMap::new();
        annotations.insert(INGRESS_CLASS_ANNOTATION, config.ingress_class.as_str());
        annotations.insert(CLUSTER_ISSUER_ANNOTATION, config.cert_issuer.as_str());
        if self.www_redirect {
            annotations.insert(WWW_REDIRECT_ANNOTATION, "true");
        }

        let document = IngressDocument {
            api_version: API_VERSION,
            kind: "Ingress",
            metadata: ObjectMeta {
                name: &self.name,
                annotations,
            },
            spec: IngressSpec {
                tls: vec![IngressTls {
                    hosts: &self.hosts,
                    secret_name: &self.tls_secret_name,
                }],
                rules: vec![IngressRule {
                    host: primary_host,
                    http: HttpRule {
                        paths: vec![HttpPath {
                            path: "/",
                            path_type: "Prefix",
                            backend: Backend {
                                service: BackendService {
                                    name: &self.service,
                                    port: ServicePort {
                                        number: BACKEND_PORT,
                                    },
                                },
                            },
                        }],
                    },
                }],
            },
        };

        serde_yaml::to_string(&document).map_err(|e| ProvisioningError::Render(e.to_string()))
    }
}

/// Manifest written to a temporary file, removed when dropped
struct TransientManifest {
    path: PathBuf,
}

impl TransientManifest {
    async fn write(name: &str, contents: &str) -> Result<Self, ProvisioningError> {
        let path = std::env::temp_dir().join(format!("ingress-{}-{}.yaml", name, Uuid::new_v4()));
        tokio::fs::write(&path, contents).await?;
        Ok(Self { path })
    }
}

impl Drop for TransientManifest {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to remove transient manifest");
        }
    }
}

// ============================================================================
// Provisioner
// ============================================================================

/// Renders, applies and removes domain ingresses
#[derive(Clone)]
pub struct IngressProvisioner {
    orchestrator: Arc<dyn Orchestrator>,
    config: IngressConfig,
}

impl IngressProvisioner {
    pub fn new(orchestrator: Arc<dyn Orchestrator>, config: IngressConfig) -> Self {
        Self {
            orchestrator,
            config,
        }
    }

    /// Build the manifest for `domain` served by `theme`
    pub fn manifest(&self, domain: &str, theme: Theme) -> Result<IngressManifest, ProvisioningError> {
        let domain = domain.trim().to_lowercase();
        let parsed = domain_name::parse(&domain)
            .map_err(|_| ProvisioningError::InvalidDomain(domain.clone()))?;

        let service = self
            .config
            .theme_services
            .get(&theme)
            .cloned()
            .ok_or(ProvisioningError::UnknownTheme(theme))?;

        let apex = parsed.is_apex();
        let mut hosts = vec![domain.clone()];
        if apex {
            hosts.push(format!("www.{}", domain));
        }

        Ok(IngressManifest {
            name: ingress_name(&domain),
            hosts,
            theme,
            tls_secret_name: tls_secret_name(&domain),
            service,
            www_redirect: apex,
        })
    }

    /// Render and apply the ingress for `domain`
    pub async fn apply(&self, domain: &str, theme: Theme) -> Result<IngressManifest, ProvisioningError> {
        let manifest = self.manifest(domain, theme)?;
        let rendered = manifest.render(&self.config)?;

        let file = TransientManifest::write(&manifest.name, &rendered).await?;
        let output = self.orchestrator.apply(&file.path).await?;
        drop(file);

        info!(
            domain = %domain,
            ingress = %manifest.name,
            theme = %theme,
            output = %output.stdout,
            "Ingress applied"
        );
        Ok(manifest)
    }

    /// Delete the ingress and certificate for `domain`
    pub async fn remove(&self, domain: &str) -> Result<(), ProvisioningError> {
        let name = ingress_name(domain);
        self.orchestrator.delete(ObjectKind::Ingress, &name).await?;
        self.orchestrator
            .delete(ObjectKind::Certificate, &tls_secret_name(domain))
            .await?;

        info!(domain = %domain, ingress = %name, "Ingress removed");
        Ok(())
    }
}
