//! Serverless sandbox service.

use crate::error::Result;
use crate::sandbox::api::{CreateSandboxRequest, Endpoint};
use crate::sandbox::handle::ProviderKind;
use crate::sandbox::provider::ProviderConfig;
use crate::sandbox::remote::BackendProfile;

pub const DEFAULT_BASE_URL: &str = "https://api.serverless-sandbox.dev/v1";

/// Template the service boots new sandboxes from.
const TEMPLATE: &str = "vite-react";

pub const PROFILE: BackendProfile = BackendProfile {
    kind: ProviderKind::RemoteServerless,
    resolve_endpoint,
    create_request,
};

fn resolve_endpoint(config: &ProviderConfig) -> Result<Endpoint> {
    let token = super::require_api_key(ProviderKind::RemoteServerless, config)?;
    Ok(Endpoint {
        base_url: config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        token,
    })
}

fn create_request(config: &ProviderConfig) -> CreateSandboxRequest {
    CreateSandboxRequest {
        template: Some(TEMPLATE.to_string()),
        image: None,
        runtime: config.runtime.clone().unwrap_or_else(|| "node".to_string()),
        timeout_minutes: config.timeout_minutes.unwrap_or(15),
        working_directory: config.working_directory().to_string(),
        port: config.dev_server_port(),
        labels: config.extra.clone(),
    }
}
