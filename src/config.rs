//! Orchestrator configuration.
//!
//! Loaded from TOML; every field has a default so a partial file (or no file)
//! is fine. [`Validate`] catches misconfiguration before any sandbox is
//! provisioned.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sandbox::ProviderKind;

/// Deployment defaults for providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Backend used when a request does not name one.
    #[serde(default = "default_kind")]
    pub default_kind: ProviderKind,
    /// Sandbox lifetime on the backend.
    #[serde(default = "default_sandbox_timeout_minutes")]
    pub sandbox_timeout_minutes: u64,
    /// Wait after starting the dev server.
    #[serde(default = "default_dev_server_startup_delay_ms")]
    pub dev_server_startup_delay_ms: u64,
    /// App directory inside the sandbox.
    #[serde(default = "default_working_directory")]
    pub working_directory: String,
    /// Runtime identifier passed to the backend.
    #[serde(default = "default_runtime")]
    pub runtime: String,
    /// Bounded wait for `create_sandbox`.
    #[serde(default = "default_provision_timeout_secs")]
    pub provision_timeout_secs: u64,
    /// Dev server port inside the sandbox.
    #[serde(default = "default_dev_server_port")]
    pub dev_server_port: u16,
}

fn default_kind() -> ProviderKind {
    ProviderKind::RemoteServerless
}

fn default_sandbox_timeout_minutes() -> u64 {
    15
}

fn default_dev_server_startup_delay_ms() -> u64 {
    10_000
}

fn default_working_directory() -> String {
    "/home/user/app".to_string()
}

fn default_runtime() -> String {
    "node".to_string()
}

fn default_provision_timeout_secs() -> u64 {
    120
}

fn default_dev_server_port() -> u16 {
    5173
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            default_kind: default_kind(),
            sandbox_timeout_minutes: default_sandbox_timeout_minutes(),
            dev_server_startup_delay_ms: default_dev_server_startup_delay_ms(),
            working_directory: default_working_directory(),
            runtime: default_runtime(),
            provision_timeout_secs: default_provision_timeout_secs(),
            dev_server_port: default_dev_server_port(),
        }
    }
}

impl ProviderSettings {
    pub fn provision_timeout(&self) -> Duration {
        Duration::from_secs(self.provision_timeout_secs)
    }
}

/// Build-validation probe and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSettings {
    /// Wait before probing, for the remote bundler's first compile.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// HTTP timeout for one probe.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Probes before a sandbox is declared Failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base unit for retry delays.
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
}

fn default_settle_delay_ms() -> u64 {
    3000
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_ms() -> u64 {
    2000
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            max_attempts: default_max_attempts(),
            retry_base_ms: default_retry_base_ms(),
        }
    }
}

impl ValidationSettings {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Registry teardown settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySettings {
    /// Attempts at `Provider::terminate` before an entry is dropped anyway.
    #[serde(default = "default_max_terminate_attempts")]
    pub max_terminate_attempts: u32,
    /// Pause between termination attempts.
    #[serde(default = "default_terminate_retry_delay_ms")]
    pub terminate_retry_delay_ms: u64,
}

fn default_max_terminate_attempts() -> u32 {
    3
}

fn default_terminate_retry_delay_ms() -> u64 {
    500
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            max_terminate_attempts: default_max_terminate_attempts(),
            terminate_retry_delay_ms: default_terminate_retry_delay_ms(),
        }
    }
}

impl RegistrySettings {
    pub fn terminate_retry_delay(&self) -> Duration {
        Duration::from_millis(self.terminate_retry_delay_ms)
    }
}

/// Top-level orchestrator configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub provider: ProviderSettings,
    #[serde(default)]
    pub validation: ValidationSettings,
    #[serde(default)]
    pub registry: RegistrySettings,
}

impl OrchestratorConfig {
    /// Parses configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Reads configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

/// Validation result containing all found issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Fatal problems.
    pub errors: Vec<String>,
    /// Non-fatal problems.
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// Returns true if there are no errors.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Merges another report into this one.
    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Converts to a Result, failing if there are errors.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.is_valid() {
            Ok(self.warnings)
        } else {
            Err(Error::Config(self.errors.join("; ")))
        }
    }
}

/// Trait for validatable configuration types.
pub trait Validate {
    fn validate(&self) -> ValidationReport;
}

impl Validate for ProviderSettings {
    fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();

        if self.sandbox_timeout_minutes == 0 {
            report.add_error("sandbox_timeout_minutes must be at least 1");
        }
        if self.provision_timeout_secs == 0 {
            report.add_error("provision_timeout_secs must be at least 1");
        }
        if self.working_directory.trim().is_empty() {
            report.add_error("working_directory cannot be empty");
        }
        if self.provision_timeout_secs > self.sandbox_timeout_minutes.saturating_mul(60) {
            report.add_warning(
                "provision_timeout_secs exceeds the sandbox lifetime; sandboxes may expire before they are ready",
            );
        }

        report
    }
}

impl Validate for ValidationSettings {
    fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();

        if self.max_attempts == 0 {
            report.add_error("max_attempts must be at least 1");
        }
        if self.retry_base_ms == 0 {
            report.add_warning("retry_base_ms = 0 disables retry backoff");
        }
        if self.max_attempts > 10 {
            report.add_warning("max_attempts > 10 may keep a broken sandbox alive for a long time");
        }
        if self.settle_delay_ms > 60_000 {
            report.add_warning("settle_delay_ms over 60 seconds slows every validation");
        }

        report
    }
}

impl Validate for RegistrySettings {
    fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();

        if self.max_terminate_attempts == 0 {
            report.add_error("max_terminate_attempts must be at least 1");
        }

        report
    }
}

impl Validate for OrchestratorConfig {
    fn validate(&self) -> ValidationReport {
        let mut report = self.provider.validate();
        report.merge(self.validation.validate());
        report.merge(self.registry.validate());
        report
    }
}
