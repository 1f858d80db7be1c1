//! Provider selection and construction.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::config::ProviderSettings;
use crate::error::{Error, Result};

use super::backends;
use super::handle::ProviderKind;
use super::provider::{Provider, ProviderConfig};
use super::remote::RemoteProvider;

/// Shared resources a constructor may use.
#[derive(Debug, Clone)]
pub struct BackendContext {
    /// HTTP client cached for this (kind, credential) pair.
    pub client: reqwest::Client,
    /// Bounded wait for sandbox creation.
    pub provision_timeout: Duration,
}

/// Builds a provider for one backend kind.
pub type ProviderConstructor =
    Arc<dyn Fn(ProviderConfig, &BackendContext) -> Arc<dyn Provider> + Send + Sync>;

/// Cache key for backend HTTP clients.
///
/// The credential is reduced to a SHA-256 fingerprint so the key never holds
/// the secret itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    pub kind: ProviderKind,
    pub fingerprint: String,
}

impl ClientKey {
    pub fn new(kind: ProviderKind, config: &ProviderConfig) -> Self {
        let digest = Sha256::digest(config.credential_material().as_bytes());
        Self {
            kind,
            fingerprint: hex::encode(digest),
        }
    }
}

/// Upper bound on cached backend clients, one per (kind, credential) pair.
/// An arbitrary entry is evicted when full.
const MAX_CACHED_CLIENTS: usize = 64;

fn remote_constructor(kind: ProviderKind) -> ProviderConstructor {
    Arc::new(move |config: ProviderConfig, ctx: &BackendContext| {
        Arc::new(RemoteProvider::new(
            backends::profile(kind),
            config,
            ctx.client.clone(),
            ctx.provision_timeout,
        )) as Arc<dyn Provider>
    })
}

/// Selects and constructs providers so callers never branch on kind.
pub struct ProviderFactory {
    settings: ProviderSettings,
    constructors: HashMap<ProviderKind, ProviderConstructor>,
    clients: Mutex<HashMap<ClientKey, reqwest::Client>>,
}

impl ProviderFactory {
    /// Creates a factory with the built-in HTTP backends registered.
    pub fn new(settings: ProviderSettings) -> Self {
        let mut factory = Self::empty(settings);
        for kind in ProviderKind::ALL {
            factory.register(kind, remote_constructor(kind));
        }
        factory
    }

    /// Creates a factory with no constructors registered.
    pub fn empty(settings: ProviderSettings) -> Self {
        Self {
            settings,
            constructors: HashMap::new(),
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Registers (or replaces) the constructor for a kind.
    pub fn register(&mut self, kind: ProviderKind, constructor: ProviderConstructor) {
        self.constructors.insert(kind, constructor);
    }

    /// Kinds that can currently be constructed.
    pub fn kinds(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<_> = self.constructors.keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn default_kind(&self) -> ProviderKind {
        self.settings.default_kind
    }

    /// Number of cached backend clients.
    pub fn cached_clients(&self) -> usize {
        self.clients.lock().map(|c| c.len()).unwrap_or(0)
    }

    fn client_for(&self, key: ClientKey) -> Result<reqwest::Client> {
        let mut clients = self
            .clients
            .lock()
            .map_err(|_| Error::Config("client cache lock poisoned".to_string()))?;
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        if clients.len() >= MAX_CACHED_CLIENTS {
            if let Some(evicted) = clients.keys().next().cloned() {
                tracing::debug!(kind = %evicted.kind, "evicting cached backend client");
                clients.remove(&evicted);
            }
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("sandbox-orchestrator/", env!("CARGO_PKG_VERSION")))
            .build()?;
        clients.insert(key, client.clone());
        Ok(client)
    }

    /// Constructs a provider for `kind` (or the default kind).
    ///
    /// The config is forwarded as-is apart from filling unset pass-through
    /// fields from deployment settings; the provider validates it when used.
    pub fn create(
        &self,
        kind: Option<ProviderKind>,
        config: Option<ProviderConfig>,
    ) -> Result<Arc<dyn Provider>> {
        let kind = kind.unwrap_or(self.settings.default_kind);
        let constructor = self.constructors.get(&kind).ok_or_else(|| {
            Error::Config(format!("no provider registered for kind '{}'", kind))
        })?;

        let config = config.unwrap_or_default().with_defaults(&self.settings);
        let ctx = BackendContext {
            client: self.client_for(ClientKey::new(kind, &config))?,
            provision_timeout: self.settings.provision_timeout(),
        };

        tracing::debug!(kind = %kind, "constructing provider");
        Ok(constructor(config, &ctx))
    }
}
