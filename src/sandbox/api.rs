//! HTTP client for a sandbox-hosting endpoint.
//!
//! Every backend kind is reached through the same small REST surface:
//! `POST /sandboxes`, `PUT /sandboxes/{id}/files`,
//! `POST /sandboxes/{id}/commands`, `DELETE /sandboxes/{id}`.
//! What differs per kind is where the endpoint lives and how the request
//! body is shaped; see `sandbox::backends`.

use std::collections::BTreeMap;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::provider::SandboxFile;

// ── Request / Response types ────────────────────────────────────────

/// Where a backend lives and the bearer credential it expects.
#[derive(Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub base_url: String,
    pub token: String,
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CreateSandboxRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub runtime: String,
    pub timeout_minutes: u64,
    pub working_directory: String,
    pub port: u16,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SandboxResponse {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
struct WriteFilesRequest<'a> {
    files: &'a [SandboxFile],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandRequest {
    pub command: String,
    pub cwd: String,
    pub background: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommandResponse {
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
}

impl CommandResponse {
    /// Background commands report no exit code; that counts as started.
    pub fn succeeded(&self) -> bool {
        self.exit_code.map_or(true, |code| code == 0)
    }
}

// ── Client ──────────────────────────────────────────────────────────

/// HTTP client for one backend endpoint.
#[derive(Debug, Clone)]
pub struct SandboxApi {
    endpoint: Endpoint,
    client: reqwest::Client,
}

impl SandboxApi {
    pub fn new(client: reqwest::Client, endpoint: Endpoint) -> Self {
        let endpoint = Endpoint {
            base_url: endpoint.base_url.trim_end_matches('/').to_string(),
            token: endpoint.token,
        };
        Self { endpoint, client }
    }

    pub fn base_url(&self) -> &str {
        &self.endpoint.base_url
    }

    fn sandbox_url(&self, id: &str, suffix: &str) -> String {
        format!("{}/sandboxes/{}{}", self.endpoint.base_url, id, suffix)
    }

    /// Provisions a sandbox.
    pub async fn create(&self, req: &CreateSandboxRequest) -> Result<SandboxResponse> {
        let url = format!("{}/sandboxes", self.endpoint.base_url);

        tracing::info!(runtime = %req.runtime, base_url = %self.endpoint.base_url, "requesting sandbox");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.endpoint.token)
            .json(req)
            .send()
            .await
            .map_err(|e| Error::ProviderUnavailable(format!("sandbox create failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::ProviderUnavailable(format!(
                "sandbox create returned {status}: {body}"
            )));
        }

        let sandbox = resp
            .json::<SandboxResponse>()
            .await
            .map_err(|e| Error::Serde(format!("failed to parse sandbox response: {e}")))?;

        if sandbox.id.is_empty() || sandbox.url.is_empty() {
            return Err(Error::Serde(
                "sandbox response is missing an id or url".to_string(),
            ));
        }

        tracing::info!(sandbox_id = %sandbox.id, url = %sandbox.url, "sandbox created");
        Ok(sandbox)
    }

    /// Uploads files into a sandbox.
    pub async fn write_files(&self, id: &str, files: &[SandboxFile]) -> Result<()> {
        let resp = self
            .client
            .put(self.sandbox_url(id, "/files"))
            .bearer_auth(&self.endpoint.token)
            .json(&WriteFilesRequest { files })
            .send()
            .await
            .map_err(|e| Error::SetupFailed(format!("file upload failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::SetupFailed(format!(
                "file upload returned {status}: {body}"
            )));
        }

        tracing::debug!(sandbox_id = %id, count = files.len(), "uploaded files");
        Ok(())
    }

    /// Runs a command inside a sandbox.
    pub async fn run_command(&self, id: &str, req: &CommandRequest) -> Result<CommandResponse> {
        let resp = self
            .client
            .post(self.sandbox_url(id, "/commands"))
            .bearer_auth(&self.endpoint.token)
            .json(req)
            .send()
            .await
            .map_err(|e| Error::SetupFailed(format!("command '{}' failed: {e}", req.command)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::SetupFailed(format!(
                "command '{}' returned {status}: {body}",
                req.command
            )));
        }

        resp.json::<CommandResponse>()
            .await
            .map_err(|e| Error::Serde(format!("failed to parse command response: {e}")))
    }

    /// Deletes a sandbox. A sandbox that is already gone counts as deleted.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let resp = self
            .client
            .delete(self.sandbox_url(id, ""))
            .bearer_auth(&self.endpoint.token)
            .send()
            .await
            .map_err(|e| Error::ProviderUnavailable(format!("sandbox delete failed: {e}")))?;

        match resp.status() {
            s if s.is_success() => {
                tracing::info!(sandbox_id = %id, "sandbox deleted");
                Ok(())
            }
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                tracing::debug!(sandbox_id = %id, "sandbox already gone");
                Ok(())
            }
            status => {
                let body = resp.text().await.unwrap_or_default();
                Err(Error::ProviderUnavailable(format!(
                    "sandbox delete returned {status}: {body}"
                )))
            }
        }
    }
}
