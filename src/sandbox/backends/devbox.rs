//! Container-based dev-box service.

use crate::error::Result;
use crate::sandbox::api::{CreateSandboxRequest, Endpoint};
use crate::sandbox::handle::ProviderKind;
use crate::sandbox::provider::ProviderConfig;
use crate::sandbox::remote::BackendProfile;

pub const DEFAULT_BASE_URL: &str = "https://api.devbox.dev/v1";

pub const PROFILE: BackendProfile = BackendProfile {
    kind: ProviderKind::ContainerDevBox,
    resolve_endpoint,
    create_request,
};

fn resolve_endpoint(config: &ProviderConfig) -> Result<Endpoint> {
    let token = super::require_api_key(ProviderKind::ContainerDevBox, config)?;
    Ok(Endpoint {
        base_url: config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        token,
    })
}

/// Dev boxes boot from a container image named after the runtime.
fn image_for(runtime: &str) -> String {
    if runtime.contains(':') || runtime.contains('/') {
        runtime.to_string()
    } else {
        format!("{}:lts", runtime)
    }
}

fn create_request(config: &ProviderConfig) -> CreateSandboxRequest {
    let runtime = config.runtime.clone().unwrap_or_else(|| "node".to_string());
    CreateSandboxRequest {
        template: None,
        image: Some(image_for(&runtime)),
        runtime,
        timeout_minutes: config.timeout_minutes.unwrap_or(15),
        working_directory: config.working_directory().to_string(),
        port: config.dev_server_port(),
        labels: config.extra.clone(),
    }
}
