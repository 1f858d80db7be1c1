//! Create, configure, register and validate sandboxes.
//!
//! [`Orchestrator`] is the only entry point the surrounding application
//! calls. It asks the [`ProviderFactory`] for a provider, drives it through
//! creation and app setup, records every lifecycle step in the
//! [`SandboxRegistry`], and turns [`BuildValidator`] probes into a bounded
//! validate/degrade/retry loop.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::Instrument;
use uuid::Uuid;

use crate::backoff::RetryBackoff;
use crate::config::{OrchestratorConfig, Validate};
use crate::error::{Error, Result};
use crate::file_cache::FileCacheSnapshot;
use crate::registry::SandboxRegistry;
use crate::sandbox::{
    DegradedInfo, Provider, ProviderConfig, ProviderFactory, ProviderKind, SandboxFile,
    SandboxHandle, SandboxState,
};
use crate::validator::{BuildValidation, BuildValidator, ErrorKind};

/// Inbound "create sandbox" request. Both fields are optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    #[serde(default)]
    pub kind: Option<ProviderKind>,
    #[serde(default)]
    pub config: Option<ProviderConfig>,
}

/// Reply to a successful "create sandbox" request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSandboxResponse {
    pub sandbox_id: String,
    pub url: String,
    pub provider_kind: ProviderKind,
}

impl From<&SandboxHandle> for CreateSandboxResponse {
    fn from(handle: &SandboxHandle) -> Self {
        Self {
            sandbox_id: handle.id().to_string(),
            url: handle.public_url().to_string(),
            provider_kind: handle.provider_kind(),
        }
    }
}

/// Result of driving a sandbox to Ready.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyOutcome {
    pub handle: SandboxHandle,
    /// The successful probe.
    pub validation: BuildValidation,
    /// Probes it took, including the successful one.
    pub attempts: u32,
    /// Packages reported missing by failed probes along the way.
    pub missing_packages: BTreeSet<String>,
}

/// What `apply_files` actually uploaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyReport {
    pub written: Vec<String>,
    pub skipped: usize,
}

/// A created sandbox that has been validated as ready.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionOutcome {
    pub sandbox: CreateSandboxResponse,
    pub ready: ReadyOutcome,
}

fn orchestration_span(op: &'static str) -> tracing::Span {
    let request_id = Uuid::new_v4();
    tracing::info_span!("orchestration", request_id = %request_id, op = op)
}

/// Sandbox workflow over a provider factory, registry and validator.
pub struct Orchestrator {
    config: OrchestratorConfig,
    factory: ProviderFactory,
    registry: Arc<SandboxRegistry>,
    validator: BuildValidator,
    file_caches: Mutex<HashMap<String, FileCacheSnapshot>>,
}

impl Orchestrator {
    /// Builds an orchestrator with the built-in HTTP backends.
    pub fn new(config: OrchestratorConfig) -> Result<Self> {
        for warning in config.validate().into_result()? {
            tracing::warn!(warning = %warning, "configuration warning");
        }

        let factory = ProviderFactory::new(config.provider.clone());
        let validator = BuildValidator::new(&config.validation)?;
        Ok(Self::with_parts(config, factory, validator))
    }

    /// Builds an orchestrator from explicit parts.
    pub fn with_parts(
        config: OrchestratorConfig,
        factory: ProviderFactory,
        validator: BuildValidator,
    ) -> Self {
        let registry = Arc::new(SandboxRegistry::new(config.registry.clone()));
        Self {
            config,
            factory,
            registry,
            validator,
            file_caches: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SandboxRegistry> {
        &self.registry
    }

    pub async fn active_sandbox(&self) -> Option<SandboxHandle> {
        self.registry.active().await
    }

    /// Creates a sandbox and configures the app in it.
    ///
    /// Every previously tracked sandbox is terminated first. On success the
    /// sandbox is registered and in `Validating`. On failure whatever was
    /// partially created is torn down before the error is returned.
    pub async fn create_sandbox(&self, request: CreateRequest) -> Result<CreateSandboxResponse> {
        self.create_inner(request)
            .instrument(orchestration_span("create"))
            .await
    }

    async fn create_inner(&self, request: CreateRequest) -> Result<CreateSandboxResponse> {
        let cleanup_errors = self.terminate_all().await;
        if !cleanup_errors.is_empty() {
            tracing::warn!(count = cleanup_errors.len(), "previous sandboxes left orphaned");
        }

        let provider = self.factory.create(request.kind, request.config)?;
        let kind = provider.kind();
        tracing::info!(kind = %kind, "creating sandbox");

        let handle = match provider.create_sandbox().await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(kind = %kind, error = %e, "sandbox creation failed");
                if let Err(cleanup) = provider.terminate().await {
                    tracing::warn!(error = %cleanup, "cleanup after failed creation failed");
                }
                return Err(e);
            }
        };
        let id = handle.id().to_string();
        let response = CreateSandboxResponse::from(&handle);

        if let Err(e) = self.registry.register(handle, Arc::clone(&provider)).await {
            if let Err(cleanup) = provider.terminate().await {
                tracing::warn!(sandbox_id = %id, error = %cleanup, "cleanup after failed registration failed");
            }
            return Err(e);
        }

        if let Err(e) = self.configure(&id, provider.as_ref()).await {
            tracing::error!(sandbox_id = %id, error = %e, "sandbox setup failed");
            match self.registry.mark_failed(&id, e.to_string()).await {
                Ok(_) => self.discard(&id).await,
                // A concurrent sweep already owns the teardown.
                Err(Error::NotFound(_))
                | Err(Error::InvalidTransition {
                    from: SandboxState::Terminated,
                    ..
                }) => {
                    tracing::debug!(sandbox_id = %id, "sandbox torn down during setup");
                }
                Err(mark) => {
                    tracing::warn!(sandbox_id = %id, error = %mark, "could not mark sandbox failed");
                    self.discard(&id).await;
                }
            }
            return Err(e);
        }

        tracing::info!(sandbox_id = %id, url = %response.url, "sandbox configured");
        Ok(response)
    }

    async fn configure(&self, id: &str, provider: &dyn Provider) -> Result<()> {
        self.registry
            .transition(id, SandboxState::ConfiguringApp)
            .await?;
        provider.setup_vite_app().await?;
        self.registry.transition(id, SandboxState::Validating).await?;
        Ok(())
    }

    /// Untracks and terminates a sandbox, logging cleanup failures.
    async fn discard(&self, id: &str) {
        self.file_caches.lock().await.remove(id);
        match self.registry.terminate(id).await {
            Ok(()) | Err(Error::NotFound(_)) => {}
            Err(e) => tracing::warn!(sandbox_id = %id, error = %e, "sandbox cleanup failed"),
        }
    }

    /// One probe of `url`. Never retries.
    pub async fn validate_build(&self, url: &str, sandbox_id: &str) -> BuildValidation {
        let validation = self.validator.validate(url, sandbox_id).await;
        if self.registry.touch_validated(sandbox_id).await.is_err() {
            tracing::debug!(sandbox_id = %sandbox_id, "validated an untracked sandbox");
        }
        validation
    }

    /// Probes a sandbox until it renders or the attempt budget runs out.
    ///
    /// Each failed probe moves the sandbox to `Degraded` with the classified
    /// error and computed delay, sleeps that delay, and re-enters
    /// `Validating`. When the budget is spent the sandbox becomes `Failed`
    /// and every collected error is returned in `ValidationFailed`.
    /// A sandbox that is already Ready gets a single probe and no
    /// transition; a failing probe is returned as `ValidationFailed`.
    pub async fn await_ready(&self, id: &str) -> Result<ReadyOutcome> {
        self.await_ready_inner(id)
            .instrument(orchestration_span("await_ready"))
            .await
    }

    async fn await_ready_inner(&self, id: &str) -> Result<ReadyOutcome> {
        let handle = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let url = handle.public_url().to_string();

        match handle.state() {
            SandboxState::Ready => {
                let validation = self.validate_build(&url, id).await;
                if !validation.success {
                    tracing::warn!(sandbox_id = %id, errors = ?validation.errors, "ready sandbox failed its probe");
                    return Err(Error::ValidationFailed {
                        attempts: 1,
                        errors: validation.errors,
                    });
                }
                return Ok(ReadyOutcome {
                    missing_packages: validation.missing_packages(),
                    handle,
                    validation,
                    attempts: 1,
                });
            }
            SandboxState::Validating => {}
            SandboxState::Degraded => {
                self.registry.transition(id, SandboxState::Validating).await?;
            }
            from => {
                return Err(Error::InvalidTransition {
                    id: id.to_string(),
                    from,
                    to: SandboxState::Validating,
                })
            }
        }

        let settings = &self.config.validation;
        let mut backoff = RetryBackoff::new(settings.retry_base_ms, settings.max_attempts);
        let mut errors = Vec::new();
        let mut missing_packages = BTreeSet::new();

        loop {
            let validation = self.validate_build(&url, id).await;

            if validation.success {
                let handle = self.registry.transition(id, SandboxState::Ready).await?;
                tracing::info!(sandbox_id = %id, attempts = backoff.attempt(), "sandbox ready");
                return Ok(ReadyOutcome {
                    handle,
                    validation,
                    attempts: backoff.attempt(),
                    missing_packages,
                });
            }

            let kind = validation.classification().unwrap_or(ErrorKind::Unknown);
            let message = validation.errors.first().cloned().unwrap_or_default();
            missing_packages.extend(validation.missing_packages());
            errors.extend(validation.errors);

            if backoff.exhausted() {
                self.registry.mark_failed(id, message).await?;
                return Err(Error::ValidationFailed {
                    attempts: backoff.attempt(),
                    errors,
                });
            }

            let delay_ms = backoff.delay_ms_for(kind);
            self.registry
                .mark_degraded(
                    id,
                    DegradedInfo {
                        error_kind: kind,
                        message,
                        attempt: backoff.attempt(),
                        retry_delay_ms: delay_ms,
                    },
                )
                .await?;

            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            self.registry.transition(id, SandboxState::Validating).await?;
            backoff.next();
        }
    }

    /// Creates a sandbox and waits for it to render.
    ///
    /// A sandbox that never validates stays tracked as `Failed` until the
    /// next create or an explicit teardown.
    pub async fn provision(&self, request: CreateRequest) -> Result<ProvisionOutcome> {
        let sandbox = self.create_sandbox(request).await?;
        let ready = self.await_ready(&sandbox.sandbox_id).await?;
        Ok(ProvisionOutcome { sandbox, ready })
    }

    /// Uploads the files whose contents differ from the last upload.
    pub async fn apply_files(&self, id: &str, files: &[SandboxFile]) -> Result<ApplyReport> {
        let (_, provider) = self
            .registry
            .lookup(id)
            .await
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let changed: Vec<SandboxFile> = {
            let caches = self.file_caches.lock().await;
            match caches.get(id) {
                Some(cache) => cache.changed(files).into_iter().cloned().collect(),
                None => FileCacheSnapshot::new()
                    .changed(files)
                    .into_iter()
                    .cloned()
                    .collect(),
            }
        };
        let skipped = files.len() - changed.len();

        if !changed.is_empty() {
            provider.write_files(&changed).await?;
            self.file_caches
                .lock()
                .await
                .entry(id.to_string())
                .or_default()
                .record(&changed);
        }

        tracing::info!(sandbox_id = %id, written = changed.len(), skipped = skipped, "files applied");
        Ok(ApplyReport {
            written: changed.into_iter().map(|f| f.path).collect(),
            skipped,
        })
    }

    /// Explicit teardown of one sandbox.
    ///
    /// An id that is no longer tracked counts as already terminated. A
    /// sandbox whose backend refuses to release it is still untracked and
    /// the failure is returned as `SandboxCleanup`.
    pub async fn terminate_sandbox(&self, id: &str) -> Result<()> {
        self.file_caches.lock().await.remove(id);
        match self.registry.terminate(id).await {
            Err(Error::NotFound(_)) => {
                tracing::debug!(sandbox_id = %id, "sandbox already terminated");
                Ok(())
            }
            other => other,
        }
    }

    /// Terminates every tracked sandbox, returning the cleanup failures.
    pub async fn terminate_all(&self) -> Vec<Error> {
        let errors = self.registry.terminate_all().await;
        let remaining = self.registry.ids().await;
        self.file_caches
            .lock()
            .await
            .retain(|id, _| remaining.contains(id));
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;

    use tokio::sync::Notify;

    use crate::config::ProviderSettings;
    use crate::sandbox::BackendContext;
    use crate::sandbox::testing::ScriptedProvider;
    use crate::validator::calculate_retry_delay;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const HEALTHY_PAGE: &str = r#"<!doctype html><html><head>
<script type="module" src="/@vite/client"></script></head>
<body><div id="root"></div><script type="module" src="/src/main.jsx"></script></body></html>"#;

    const MISSING_PACKAGE_PAGE: &str = r#"<!doctype html><html><head>
<script type="module" src="/@vite/client"></script></head>
<body><div id="root"></div><vite-error-overlay>[plugin:vite:import-analysis] Failed to resolve import "left-pad" from "src/App.jsx". Does the file exist?</vite-error-overlay></body></html>"#;

    fn test_config() -> OrchestratorConfig {
        let mut config = OrchestratorConfig::default();
        config.validation.settle_delay_ms = 0;
        config.validation.retry_base_ms = 1;
        config.validation.max_attempts = 3;
        config.registry.terminate_retry_delay_ms = 0;
        config
    }

    /// Factory whose default kind hands out scripted providers.
    struct Harness {
        orchestrator: Orchestrator,
        providers: Arc<StdMutex<Vec<Arc<ScriptedProvider>>>>,
    }

    impl Harness {
        fn new(url: &str) -> Self {
            Self::with_script(url, |p| p)
        }

        fn with_script(
            url: &str,
            script: impl Fn(ScriptedProvider) -> ScriptedProvider + Send + Sync + 'static,
        ) -> Self {
            let config = test_config();
            let providers: Arc<StdMutex<Vec<Arc<ScriptedProvider>>>> = Arc::default();
            let counter = Arc::new(AtomicU32::new(0));

            let mut factory = ProviderFactory::empty(ProviderSettings::default());
            let created = Arc::clone(&providers);
            let url = url.to_string();
            factory.register(
                ProviderKind::RemoteServerless,
                Arc::new(move |_: ProviderConfig, _: &BackendContext| {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    let provider = Arc::new(script(ScriptedProvider::new(&format!("sbx-{n}"), &url)));
                    created.lock().unwrap().push(Arc::clone(&provider));
                    provider as Arc<dyn Provider>
                }),
            );

            let validator = BuildValidator::new(&config.validation).unwrap();
            Self {
                orchestrator: Orchestrator::with_parts(config, factory, validator),
                providers,
            }
        }

        fn provider(&self, index: usize) -> Arc<ScriptedProvider> {
            Arc::clone(&self.providers.lock().unwrap()[index])
        }
    }

    async fn dev_server(body: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html"))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn healthy_sandbox_becomes_ready() {
        let server = dev_server(HEALTHY_PAGE).await;
        let harness = Harness::new(&server.uri());

        let outcome = harness
            .orchestrator
            .provision(CreateRequest::default())
            .await
            .unwrap();

        assert_eq!(outcome.sandbox.sandbox_id, "sbx-1");
        assert_eq!(outcome.sandbox.provider_kind, ProviderKind::RemoteServerless);
        assert!(outcome.ready.validation.success);
        assert!(outcome.ready.validation.is_rendering);
        assert_eq!(outcome.ready.attempts, 1);
        assert_eq!(outcome.ready.handle.state(), SandboxState::Ready);
        assert!(outcome.ready.handle.last_validated_at().is_some());

        let active = harness.orchestrator.active_sandbox().await.unwrap();
        assert_eq!(active.id(), "sbx-1");
        assert_eq!(harness.provider(0).setups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_package_overlay_is_classified() {
        let server = dev_server(MISSING_PACKAGE_PAGE).await;
        let harness = Harness::new(&server.uri());

        let validation = harness
            .orchestrator
            .validate_build(&server.uri(), "sbx-unknown")
            .await;

        assert!(!validation.success);
        let kind = validation.classification().unwrap();
        assert_eq!(kind, ErrorKind::MissingPackage);
        assert_eq!(
            validation.missing_packages(),
            BTreeSet::from(["left-pad".to_string()])
        );
        assert_eq!(calculate_retry_delay(1, kind), 4000);
    }

    #[tokio::test]
    async fn persistent_failure_exhausts_attempts() {
        let server = dev_server(MISSING_PACKAGE_PAGE).await;
        let harness = Harness::new(&server.uri());

        let created = harness
            .orchestrator
            .create_sandbox(CreateRequest::default())
            .await
            .unwrap();
        let err = harness
            .orchestrator
            .await_ready(&created.sandbox_id)
            .await
            .unwrap_err();

        match err {
            Error::ValidationFailed { attempts, errors } => {
                assert_eq!(attempts, 3);
                assert_eq!(errors.len(), 3);
                assert!(errors.iter().all(|e| e.contains("left-pad")));
            }
            other => panic!("unexpected error: {other}"),
        }

        let handle = harness.orchestrator.registry().get("sbx-1").await.unwrap();
        assert_eq!(handle.state(), SandboxState::Failed);
        assert!(harness.orchestrator.active_sandbox().await.is_none());
    }

    #[tokio::test]
    async fn degraded_sandbox_recovers_on_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(MISSING_PACKAGE_PAGE, "text/html"),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(HEALTHY_PAGE, "text/html"))
            .mount(&server)
            .await;
        let harness = Harness::new(&server.uri());

        let outcome = harness
            .orchestrator
            .provision(CreateRequest::default())
            .await
            .unwrap();

        assert_eq!(outcome.ready.attempts, 2);
        assert!(outcome.ready.missing_packages.contains("left-pad"));
        assert!(outcome.ready.handle.degraded().is_none());
        assert_eq!(outcome.ready.handle.last_error().map(|e| e.contains("left-pad")), Some(true));
    }

    #[tokio::test]
    async fn ready_sandbox_that_stops_serving_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(HEALTHY_PAGE, "text/html"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;
        let harness = Harness::new(&server.uri());

        harness
            .orchestrator
            .provision(CreateRequest::default())
            .await
            .unwrap();
        let err = harness.orchestrator.await_ready("sbx-1").await.unwrap_err();

        match err {
            Error::ValidationFailed { attempts, errors } => {
                assert_eq!(attempts, 1);
                assert_eq!(errors, vec!["Sandbox returned 502".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        let handle = harness.orchestrator.registry().get("sbx-1").await.unwrap();
        assert_eq!(handle.state(), SandboxState::Ready);
    }

    #[tokio::test]
    async fn teardown_during_setup_aborts_create() {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let harness = {
            let (started, release) = (Arc::clone(&started), Arc::clone(&release));
            Harness::with_script("http://127.0.0.1:9", move |p| {
                p.gated_setup(Arc::clone(&started), Arc::clone(&release))
            })
        };

        let sweep = async {
            started.notified().await;
            let handle = harness.orchestrator.registry().get("sbx-1").await.unwrap();
            assert_eq!(handle.state(), SandboxState::ConfiguringApp);
            let errors = harness.orchestrator.terminate_all().await;
            release.notify_one();
            errors
        };
        let (created, sweep_errors) = tokio::join!(
            harness.orchestrator.create_sandbox(CreateRequest::default()),
            sweep
        );

        assert!(sweep_errors.is_empty());
        assert!(matches!(created.unwrap_err(), Error::NotFound(_)));
        assert!(harness.orchestrator.registry().is_empty().await);
        assert_eq!(harness.provider(0).terminate_calls(), 1);
    }

    #[tokio::test]
    async fn new_sandbox_replaces_previous_one() {
        let server = dev_server(HEALTHY_PAGE).await;
        let harness = Harness::new(&server.uri());

        harness
            .orchestrator
            .provision(CreateRequest::default())
            .await
            .unwrap();
        let second = harness
            .orchestrator
            .create_sandbox(CreateRequest::default())
            .await
            .unwrap();

        assert_eq!(second.sandbox_id, "sbx-2");
        assert_eq!(harness.provider(0).terminate_calls(), 1);
        assert_eq!(
            harness.orchestrator.registry().ids().await,
            vec!["sbx-2".to_string()]
        );
        assert!(harness.orchestrator.active_sandbox().await.is_none());
    }

    #[tokio::test]
    async fn failed_setup_tears_sandbox_down() {
        let harness = Harness::with_script("http://127.0.0.1:9", |p| {
            p.failing_setup(Error::SetupFailed("npm install exited with 1".into()))
        });

        let err = harness
            .orchestrator
            .create_sandbox(CreateRequest::default())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::SetupFailed(_)));
        assert!(harness.orchestrator.registry().is_empty().await);
        assert_eq!(harness.provider(0).terminate_calls(), 1);
    }

    #[tokio::test]
    async fn failed_creation_is_surfaced() {
        let harness = Harness::with_script("http://127.0.0.1:9", |p| {
            p.failing_create(Error::ProviderUnavailable("quota exceeded".into()))
        });

        let err = harness
            .orchestrator
            .create_sandbox(CreateRequest::default())
            .await
            .unwrap_err();

        assert_eq!(err.code(), "provider_unavailable");
        assert!(harness.orchestrator.registry().is_empty().await);
    }

    #[tokio::test]
    async fn unchanged_files_are_not_reuploaded() {
        let harness = Harness::new("http://127.0.0.1:9");
        let created = harness
            .orchestrator
            .create_sandbox(CreateRequest::default())
            .await
            .unwrap();
        let id = created.sandbox_id.as_str();

        let files = vec![
            SandboxFile::new("src/App.jsx", "export default () => null"),
            SandboxFile::new("src/index.css", "body {}"),
        ];
        let first = harness.orchestrator.apply_files(id, &files).await.unwrap();
        assert_eq!(first.written.len(), 2);
        assert_eq!(first.skipped, 0);

        let mut edited = files.clone();
        edited[0].contents = "export default () => <h1>hi</h1>".into();
        let second = harness.orchestrator.apply_files(id, &edited).await.unwrap();
        assert_eq!(second.written, vec!["src/App.jsx".to_string()]);
        assert_eq!(second.skipped, 1);

        assert_eq!(harness.provider(0).written_paths().len(), 3);
    }

    #[tokio::test]
    async fn apply_files_to_unknown_sandbox_fails() {
        let harness = Harness::new("http://127.0.0.1:9");
        let err = harness
            .orchestrator
            .apply_files("missing", &[SandboxFile::new("a.js", "")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn explicit_teardown_is_idempotent() {
        let harness = Harness::new("http://127.0.0.1:9");
        let created = harness
            .orchestrator
            .create_sandbox(CreateRequest::default())
            .await
            .unwrap();

        harness
            .orchestrator
            .terminate_sandbox(&created.sandbox_id)
            .await
            .unwrap();
        harness
            .orchestrator
            .terminate_sandbox(&created.sandbox_id)
            .await
            .unwrap();
        assert_eq!(harness.provider(0).terminate_calls(), 1);
    }

    #[tokio::test]
    async fn await_ready_on_unknown_sandbox_is_not_found() {
        let harness = Harness::new("http://127.0.0.1:9");
        let err = harness.orchestrator.await_ready("sbx-404").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn create_request_accepts_empty_json() {
        let request: CreateRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request, CreateRequest::default());

        let request: CreateRequest =
            serde_json::from_str(r#"{"kind":"kubernetes-workspace","config":{"namespace":"dev"}}"#)
                .unwrap();
        assert_eq!(request.kind, Some(ProviderKind::KubernetesWorkspace));
        assert_eq!(request.config.unwrap().namespace.as_deref(), Some("dev"));
    }

    #[test]
    fn create_response_uses_camel_case() {
        let response = CreateSandboxResponse {
            sandbox_id: "sbx-1".into(),
            url: "https://sbx-1.dev".into(),
            provider_kind: ProviderKind::ContainerDevBox,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["sandboxId"], "sbx-1");
        assert_eq!(json["providerKind"], "container-dev-box");
    }
}
