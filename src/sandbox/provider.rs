//! Provider trait and the opaque configuration handed to providers.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ProviderSettings;
use crate::error::Result;

use super::handle::{ProviderKind, SandboxHandle};

/// A file to place inside a sandbox, path relative to its working directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxFile {
    pub path: String,
    pub contents: String,
}

impl SandboxFile {
    pub fn new(path: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
        }
    }
}

/// Backend-specific settings forwarded unchanged from the request boundary.
///
/// Nothing outside the concrete provider interprets these values. The
/// factory only fills unset fields from the deployment defaults.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Bearer credential for hosted backends.
    pub api_key: Option<String>,
    /// Override for the backend API endpoint.
    pub base_url: Option<String>,
    /// Cluster credential blob (kubeconfig YAML).
    pub kubeconfig: Option<String>,
    /// Kubernetes namespace for workspaces.
    pub namespace: Option<String>,
    /// Runtime identifier (image or template name).
    pub runtime: Option<String>,
    /// Directory inside the sandbox that holds the app.
    pub working_directory: Option<String>,
    /// Sandbox lifetime on the backend, in minutes.
    pub timeout_minutes: Option<u64>,
    /// Wait after starting the dev server before reporting setup complete.
    pub dev_server_startup_delay_ms: Option<u64>,
    /// Port the dev server listens on.
    pub dev_server_port: Option<u16>,
    /// Anything else a backend wants passed through.
    pub extra: BTreeMap<String, String>,
}

impl ProviderConfig {
    /// Fills unset pass-through fields from deployment settings.
    pub fn with_defaults(mut self, settings: &ProviderSettings) -> Self {
        self.runtime.get_or_insert_with(|| settings.runtime.clone());
        self.working_directory
            .get_or_insert_with(|| settings.working_directory.clone());
        self.timeout_minutes
            .get_or_insert(settings.sandbox_timeout_minutes);
        self.dev_server_startup_delay_ms
            .get_or_insert(settings.dev_server_startup_delay_ms);
        self.dev_server_port.get_or_insert(settings.dev_server_port);
        self
    }

    /// Secret material identifying the account this config talks to.
    pub fn credential_material(&self) -> &str {
        self.kubeconfig
            .as_deref()
            .or(self.api_key.as_deref())
            .unwrap_or_default()
    }

    pub fn working_directory(&self) -> &str {
        self.working_directory.as_deref().unwrap_or("/home/user/app")
    }

    pub fn dev_server_port(&self) -> u16 {
        self.dev_server_port.unwrap_or(5173)
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redact(value: &Option<String>) -> Option<&'static str> {
            value.as_ref().map(|_| "<redacted>")
        }

        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("kubeconfig", &redact(&self.kubeconfig))
            .field("namespace", &self.namespace)
            .field("runtime", &self.runtime)
            .field("working_directory", &self.working_directory)
            .field("timeout_minutes", &self.timeout_minutes)
            .field("dev_server_startup_delay_ms", &self.dev_server_startup_delay_ms)
            .field("dev_server_port", &self.dev_server_port)
            .field("extra", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Capability provider for one sandbox backend.
///
/// An instance is bound to at most one remote sandbox: the one produced by
/// its own `create_sandbox` call. All side effects are remote; providers hold
/// no local state beyond credentials and that sandbox's id.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Which backend this provider talks to.
    fn kind(&self) -> ProviderKind;

    /// Provisions a fresh remote environment.
    ///
    /// Fails with `ProviderUnavailable` if the backend rejects the request
    /// and `ProvisionTimeout` if it does not finish in time.
    async fn create_sandbox(&self) -> Result<SandboxHandle>;

    /// Pushes the Vite scaffold into the created sandbox and starts the
    /// dev server. Fails with `SetupFailed`.
    async fn setup_vite_app(&self) -> Result<()>;

    /// Uploads files into the created sandbox. Fails with `SetupFailed`.
    async fn write_files(&self, files: &[SandboxFile]) -> Result<()>;

    /// Releases backend resources.
    ///
    /// Must be idempotent: terminating a sandbox that is already gone, or
    /// that was never fully created, succeeds.
    async fn terminate(&self) -> Result<()>;
}
