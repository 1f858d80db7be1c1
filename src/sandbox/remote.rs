//! Provider implementation shared by every HTTP-reachable backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::api::{CommandRequest, CreateSandboxRequest, Endpoint, SandboxApi};
use super::handle::{ProviderKind, SandboxHandle};
use super::provider::{Provider, ProviderConfig, SandboxFile};
use super::scaffold;

/// What makes one backend kind different from another.
#[derive(Debug, Clone, Copy)]
pub struct BackendProfile {
    pub kind: ProviderKind,
    /// Resolves endpoint and credential. Called at create time, so bad
    /// credentials surface as `ProviderUnavailable` from `create_sandbox`.
    pub resolve_endpoint: fn(&ProviderConfig) -> Result<Endpoint>,
    /// Shapes the create request body.
    pub create_request: fn(&ProviderConfig) -> CreateSandboxRequest,
}

/// The sandbox this provider created.
#[derive(Debug)]
struct Session {
    id: String,
    url: String,
    api: SandboxApi,
}

/// Provider bound to at most one remote sandbox on an HTTP backend.
pub struct RemoteProvider {
    profile: BackendProfile,
    config: ProviderConfig,
    client: reqwest::Client,
    provision_timeout: Duration,
    session: OnceLock<Session>,
    terminated: AtomicBool,
}

impl RemoteProvider {
    pub fn new(
        profile: BackendProfile,
        config: ProviderConfig,
        client: reqwest::Client,
        provision_timeout: Duration,
    ) -> Self {
        Self {
            profile,
            config,
            client,
            provision_timeout,
            session: OnceLock::new(),
            terminated: AtomicBool::new(false),
        }
    }

    /// Id of the sandbox this provider created, if any.
    pub fn sandbox_id(&self) -> Option<&str> {
        self.session.get().map(|s| s.id.as_str())
    }

    fn session(&self) -> Result<&Session> {
        self.session
            .get()
            .ok_or_else(|| Error::SetupFailed("sandbox has not been created".to_string()))
    }

    async fn run(&self, session: &Session, command: String, background: bool) -> Result<()> {
        let req = CommandRequest {
            command,
            cwd: self.config.working_directory().to_string(),
            background,
        };
        let resp = session.api.run_command(&session.id, &req).await?;
        if !resp.succeeded() {
            return Err(Error::SetupFailed(format!(
                "'{}' exited with {:?}: {}",
                req.command,
                resp.exit_code,
                resp.stderr.trim()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Provider for RemoteProvider {
    fn kind(&self) -> ProviderKind {
        self.profile.kind
    }

    async fn create_sandbox(&self) -> Result<SandboxHandle> {
        if let Some(existing) = self.sandbox_id() {
            return Err(Error::Config(format!(
                "provider already bound to sandbox {}",
                existing
            )));
        }

        let endpoint = (self.profile.resolve_endpoint)(&self.config)?;
        let api = SandboxApi::new(self.client.clone(), endpoint);
        let req = (self.profile.create_request)(&self.config);

        let created = tokio::time::timeout(self.provision_timeout, api.create(&req))
            .await
            .map_err(|_| {
                tracing::error!(
                    kind = %self.profile.kind,
                    timeout_secs = self.provision_timeout.as_secs(),
                    "sandbox provisioning timed out"
                );
                Error::ProvisionTimeout(self.provision_timeout)
            })??;

        let handle = SandboxHandle::new(&created.id, self.profile.kind, &created.url);
        self.session
            .set(Session {
                id: created.id,
                url: created.url,
                api,
            })
            .map_err(|s| Error::Config(format!("provider already bound to sandbox {}", s.id)))?;

        Ok(handle)
    }

    async fn setup_vite_app(&self) -> Result<()> {
        let session = self.session()?;
        let port = self.config.dev_server_port();

        let files = scaffold::vite_scaffold(port, &session.url);
        session.api.write_files(&session.id, &files).await?;
        self.run(session, scaffold::INSTALL_COMMAND.to_string(), false)
            .await?;
        self.run(session, scaffold::dev_server_command(port), true)
            .await?;

        let delay_ms = self.config.dev_server_startup_delay_ms.unwrap_or(0);
        if delay_ms > 0 {
            tracing::debug!(sandbox_id = %session.id, delay_ms = delay_ms, "waiting for dev server");
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        tracing::info!(sandbox_id = %session.id, port = port, "vite app configured");
        Ok(())
    }

    async fn write_files(&self, files: &[SandboxFile]) -> Result<()> {
        if files.is_empty() {
            return Ok(());
        }
        let session = self.session()?;
        session.api.write_files(&session.id, files).await
    }

    async fn terminate(&self) -> Result<()> {
        let Some(session) = self.session.get() else {
            // Never created remotely; nothing to release.
            return Ok(());
        };
        if self.terminated.load(Ordering::SeqCst) {
            return Ok(());
        }

        session.api.delete(&session.id).await?;
        self.terminated.store(true, Ordering::SeqCst);
        Ok(())
    }
}
