//! Per-kind backend profiles.
//!
//! Each backend resolves its endpoint and credential from the opaque
//! [`ProviderConfig`](crate::sandbox::ProviderConfig) and shapes the create
//! request; everything else is shared through
//! [`RemoteProvider`](crate::sandbox::RemoteProvider).

pub mod devbox;
pub mod kubernetes;
pub mod serverless;

use crate::error::{Error, Result};

use super::handle::ProviderKind;
use super::provider::ProviderConfig;
use super::remote::BackendProfile;

/// Profile for a backend kind.
pub fn profile(kind: ProviderKind) -> BackendProfile {
    match kind {
        ProviderKind::RemoteServerless => serverless::PROFILE,
        ProviderKind::ContainerDevBox => devbox::PROFILE,
        ProviderKind::KubernetesWorkspace => kubernetes::PROFILE,
    }
}

/// Returns the configured API key or a `ProviderUnavailable` naming the kind.
pub(crate) fn require_api_key(kind: ProviderKind, config: &ProviderConfig) -> Result<String> {
    config
        .api_key
        .as_deref()
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::ProviderUnavailable(format!("{} requires an api_key", kind)))
}
