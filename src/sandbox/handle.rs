//! Sandbox handle, backend kinds and the lifecycle state machine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::validator::ErrorKind;

/// Backend that hosts a sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// Serverless sandbox service reached over HTTP.
    RemoteServerless,
    /// Container-based dev-box service.
    ContainerDevBox,
    /// Workspace pods on a Kubernetes cluster.
    KubernetesWorkspace,
}

impl ProviderKind {
    /// All kinds, in declaration order.
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::RemoteServerless,
        ProviderKind::ContainerDevBox,
        ProviderKind::KubernetesWorkspace,
    ];

    /// Kebab-case identifier, as used in config files and on the CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::RemoteServerless => "remote-serverless",
            ProviderKind::ContainerDevBox => "container-dev-box",
            ProviderKind::KubernetesWorkspace => "kubernetes-workspace",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::Config(format!("unknown provider kind '{}'", s)))
    }
}

/// Lifecycle state of a sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxState {
    Creating,
    ConfiguringApp,
    Validating,
    Ready,
    Degraded,
    Terminated,
    Failed,
}

impl SandboxState {
    /// Terminated and Failed accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SandboxState::Terminated | SandboxState::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: SandboxState) -> bool {
        use SandboxState::*;

        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (_, Terminated)
                | (_, Failed)
                | (Creating, ConfiguringApp)
                | (ConfiguringApp, Validating)
                | (Validating, Ready)
                | (Validating, Degraded)
                | (Degraded, Validating)
        )
    }
}

/// Why a sandbox is degraded and when to look again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegradedInfo {
    /// Classified kind of the last failure.
    pub error_kind: ErrorKind,
    /// Raw message of the last failure.
    pub message: String,
    /// 1-based attempt that produced the failure.
    pub attempt: u32,
    /// Delay before the next probe.
    pub retry_delay_ms: u64,
}

/// Record of one provisioned remote sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxHandle {
    id: String,
    provider_kind: ProviderKind,
    #[serde(rename = "url")]
    public_url: String,
    state: SandboxState,
    created_at: DateTime<Utc>,
    last_validated_at: Option<DateTime<Utc>>,
    degraded: Option<DegradedInfo>,
    last_error: Option<String>,
}

impl SandboxHandle {
    /// Creates a handle for a sandbox the backend has just provisioned.
    ///
    /// The handle starts in `Creating`; the creation call that produced it
    /// is still considered in flight until the orchestrator moves it on.
    pub fn new(id: impl Into<String>, provider_kind: ProviderKind, public_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            provider_kind,
            public_url: public_url.into(),
            state: SandboxState::Creating,
            created_at: Utc::now(),
            last_validated_at: None,
            degraded: None,
            last_error: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn provider_kind(&self) -> ProviderKind {
        self.provider_kind
    }

    pub fn public_url(&self) -> &str {
        &self.public_url
    }

    pub fn state(&self) -> SandboxState {
        self.state
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_validated_at(&self) -> Option<DateTime<Utc>> {
        self.last_validated_at
    }

    pub fn degraded(&self) -> Option<&DegradedInfo> {
        self.degraded.as_ref()
    }

    /// Last error recorded on a Degraded or Failed transition.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Moves to `next` if the state machine allows it.
    pub fn transition_to(&mut self, next: SandboxState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                id: self.id.clone(),
                from: self.state,
                to: next,
            });
        }
        if next != SandboxState::Degraded {
            self.degraded = None;
        }
        self.state = next;
        Ok(())
    }

    /// Validating -> Degraded, recording the classified failure.
    pub fn mark_degraded(&mut self, info: DegradedInfo) -> Result<()> {
        self.transition_to(SandboxState::Degraded)?;
        self.last_error = Some(info.message.clone());
        self.degraded = Some(info);
        Ok(())
    }

    /// Any non-terminal state -> Failed, recording the reason.
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition_to(SandboxState::Failed)?;
        self.last_error = Some(reason.into());
        Ok(())
    }

    /// Stamps the time of the latest validation probe.
    pub fn touch_validated(&mut self) {
        self.last_validated_at = Some(Utc::now());
    }
}
