//! Kubernetes-backed workspaces.
//!
//! The credential is a kubeconfig blob. Only the parts needed to reach the
//! workspace API are read: the cluster server, the user's bearer token and
//! the context namespace.

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::sandbox::api::{CreateSandboxRequest, Endpoint};
use crate::sandbox::handle::ProviderKind;
use crate::sandbox::provider::ProviderConfig;
use crate::sandbox::remote::BackendProfile;

const DEFAULT_NAMESPACE: &str = "default";

pub const PROFILE: BackendProfile = BackendProfile {
    kind: ProviderKind::KubernetesWorkspace,
    resolve_endpoint,
    create_request,
};

#[derive(Debug, Deserialize)]
struct Kubeconfig {
    #[serde(rename = "current-context")]
    current_context: Option<String>,
    #[serde(default)]
    clusters: Vec<NamedCluster>,
    #[serde(default)]
    users: Vec<NamedUser>,
    #[serde(default)]
    contexts: Vec<NamedContext>,
}

#[derive(Debug, Deserialize)]
struct NamedCluster {
    name: String,
    cluster: Cluster,
}

#[derive(Debug, Deserialize)]
struct Cluster {
    server: String,
}

#[derive(Debug, Deserialize)]
struct NamedUser {
    name: String,
    user: User,
}

#[derive(Debug, Deserialize)]
struct User {
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedContext {
    name: String,
    context: Context,
}

#[derive(Debug, Deserialize)]
struct Context {
    cluster: String,
    user: String,
    namespace: Option<String>,
}

/// Server, token and namespace picked out of a kubeconfig.
#[derive(Debug, PartialEq, Eq)]
struct ClusterAccess {
    server: String,
    token: String,
    namespace: Option<String>,
}

fn unavailable(reason: impl Into<String>) -> Error {
    Error::ProviderUnavailable(format!("kubeconfig: {}", reason.into()))
}

fn parse_kubeconfig(blob: &str) -> Result<ClusterAccess> {
    let config: Kubeconfig =
        serde_yaml::from_str(blob).map_err(|e| unavailable(format!("invalid YAML: {e}")))?;

    let context = match &config.current_context {
        Some(name) => Some(
            config
                .contexts
                .iter()
                .find(|c| &c.name == name)
                .map(|c| &c.context)
                .ok_or_else(|| unavailable(format!("current-context '{name}' not defined")))?,
        ),
        None => None,
    };

    let cluster = match context {
        Some(ctx) => config.clusters.iter().find(|c| c.name == ctx.cluster),
        None => config.clusters.first(),
    }
    .ok_or_else(|| unavailable("no cluster defined"))?;

    let user = match context {
        Some(ctx) => config.users.iter().find(|u| u.name == ctx.user),
        None => config.users.first(),
    }
    .ok_or_else(|| unavailable("no user defined"))?;

    let token = user
        .user
        .token
        .clone()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| unavailable(format!("user '{}' has no bearer token", user.name)))?;

    Ok(ClusterAccess {
        server: cluster.cluster.server.trim_end_matches('/').to_string(),
        token,
        namespace: context.and_then(|c| c.namespace.clone()),
    })
}

fn resolve_endpoint(config: &ProviderConfig) -> Result<Endpoint> {
    let blob = config
        .kubeconfig
        .as_deref()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| unavailable("kubernetes-workspace requires a kubeconfig"))?;
    let access = parse_kubeconfig(blob)?;

    let namespace = config
        .namespace
        .clone()
        .or(access.namespace)
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

    Ok(Endpoint {
        base_url: format!(
            "{}/apis/workspaces/v1/namespaces/{}",
            access.server, namespace
        ),
        token: access.token,
    })
}

fn create_request(config: &ProviderConfig) -> CreateSandboxRequest {
    let mut labels = config.extra.clone();
    labels
        .entry("app.kubernetes.io/managed-by".to_string())
        .or_insert_with(|| "sandbox-orchestrator".to_string());

    CreateSandboxRequest {
        template: None,
        image: config.runtime.clone(),
        runtime: config.runtime.clone().unwrap_or_else(|| "node".to_string()),
        timeout_minutes: config.timeout_minutes.unwrap_or(15),
        working_directory: config.working_directory().to_string(),
        port: config.dev_server_port(),
        labels,
    }
}
