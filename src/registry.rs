//! Concurrency-safe store of live sandboxes.
//!
//! Every lifecycle mutation goes through [`SandboxRegistry`], which also
//! owns the single "active sandbox" pointer. Reads take a short read lock
//! and return clones, so a lookup never observes a half-inserted or
//! half-removed entry. Slow provider calls always run with the lock
//! released.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::RwLock;

use crate::config::RegistrySettings;
use crate::error::{Error, Result};
use crate::sandbox::{DegradedInfo, Provider, SandboxHandle, SandboxState};

struct Entry {
    handle: SandboxHandle,
    provider: Arc<dyn Provider>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    active: Option<String>,
}

impl Inner {
    fn entry_mut(&mut self, id: &str) -> Result<&mut Entry> {
        self.entries
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Clears the active pointer if it refers to `id`.
    fn release_active(&mut self, id: &str) {
        if self.active.as_deref() == Some(id) {
            self.active = None;
        }
    }
}

/// Registry of sandboxes keyed by id.
pub struct SandboxRegistry {
    inner: RwLock<Inner>,
    settings: RegistrySettings,
}

impl Default for SandboxRegistry {
    fn default() -> Self {
        Self::new(RegistrySettings::default())
    }
}

impl SandboxRegistry {
    pub fn new(settings: RegistrySettings) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            settings,
        }
    }

    /// Tracks a freshly created sandbox together with the provider that owns it.
    ///
    /// Fails with `DuplicateRegistration` if the id is already tracked; the
    /// existing entry is left untouched.
    pub async fn register(&self, handle: SandboxHandle, provider: Arc<dyn Provider>) -> Result<()> {
        let mut inner = self.inner.write().await;
        let id = handle.id().to_string();
        if inner.entries.contains_key(&id) {
            tracing::error!(sandbox_id = %id, "duplicate sandbox registration");
            return Err(Error::DuplicateRegistration(id));
        }

        tracing::info!(sandbox_id = %id, kind = %handle.provider_kind(), "sandbox registered");
        inner.entries.insert(id, Entry { handle, provider });
        Ok(())
    }

    /// Snapshot of a sandbox and its provider.
    pub async fn lookup(&self, id: &str) -> Option<(SandboxHandle, Arc<dyn Provider>)> {
        let inner = self.inner.read().await;
        inner
            .entries
            .get(id)
            .map(|e| (e.handle.clone(), Arc::clone(&e.provider)))
    }

    /// Snapshot of a sandbox's handle.
    pub async fn get(&self, id: &str) -> Option<SandboxHandle> {
        self.inner.read().await.entries.get(id).map(|e| e.handle.clone())
    }

    /// Ids of every tracked sandbox, sorted.
    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.inner.read().await.entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// The sandbox currently holding the ready slot.
    pub async fn active(&self) -> Option<SandboxHandle> {
        let inner = self.inner.read().await;
        inner
            .active
            .as_ref()
            .and_then(|id| inner.entries.get(id))
            .map(|e| e.handle.clone())
    }

    /// Applies a lifecycle transition and returns the updated handle.
    ///
    /// Moving to `Ready` claims the active slot and fails with
    /// `ActiveSandboxConflict` while another tracked sandbox is Ready.
    pub async fn transition(&self, id: &str, next: SandboxState) -> Result<SandboxHandle> {
        let mut inner = self.inner.write().await;

        if next == SandboxState::Ready {
            let holder = inner.active.clone().filter(|active| active != id);
            if let Some(holder) = holder {
                let still_ready = inner
                    .entries
                    .get(&holder)
                    .is_some_and(|e| e.handle.state() == SandboxState::Ready);
                if still_ready {
                    return Err(Error::ActiveSandboxConflict(holder));
                }
            }
        }

        let entry = inner.entry_mut(id)?;
        let from = entry.handle.state();
        entry.handle.transition_to(next)?;
        let handle = entry.handle.clone();

        match next {
            SandboxState::Ready => inner.active = Some(id.to_string()),
            s if s.is_terminal() => inner.release_active(id),
            _ => {}
        }

        tracing::info!(sandbox_id = %id, from = ?from, to = ?next, "sandbox state changed");
        Ok(handle)
    }

    /// Validating -> Degraded with the classified failure attached.
    pub async fn mark_degraded(&self, id: &str, info: DegradedInfo) -> Result<SandboxHandle> {
        let mut inner = self.inner.write().await;
        let entry = inner.entry_mut(id)?;
        tracing::warn!(
            sandbox_id = %id,
            error_kind = %info.error_kind,
            attempt = info.attempt,
            retry_delay_ms = info.retry_delay_ms,
            "sandbox degraded"
        );
        entry.handle.mark_degraded(info)?;
        Ok(entry.handle.clone())
    }

    /// Moves a sandbox to Failed, keeping it tracked for cleanup.
    pub async fn mark_failed(&self, id: &str, reason: impl Into<String>) -> Result<SandboxHandle> {
        let reason = reason.into();
        let mut inner = self.inner.write().await;
        let entry = inner.entry_mut(id)?;
        entry.handle.mark_failed(reason.clone())?;
        let handle = entry.handle.clone();
        inner.release_active(id);
        tracing::error!(sandbox_id = %id, reason = %reason, "sandbox failed");
        Ok(handle)
    }

    pub async fn touch_validated(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.entry_mut(id)?.handle.touch_validated();
        Ok(())
    }

    /// Stops tracking one sandbox and releases it on its backend.
    ///
    /// The entry is removed before the provider is called, so a second call
    /// for the same id returns `NotFound`. A sandbox whose provider keeps
    /// failing is still dropped; the failure comes back as `SandboxCleanup`.
    pub async fn terminate(&self, id: &str) -> Result<()> {
        let provider = {
            let mut inner = self.inner.write().await;
            let mut entry = inner
                .entries
                .remove(id)
                .ok_or_else(|| Error::NotFound(id.to_string()))?;
            inner.release_active(id);
            if !entry.handle.state().is_terminal() {
                let _ = entry.handle.transition_to(SandboxState::Terminated);
            }
            entry.provider
        };

        self.terminate_provider(id, provider.as_ref()).await
    }

    /// Terminates every tracked sandbox and stops tracking them.
    ///
    /// Entries are marked Terminated and snapshotted under one short write
    /// lock, terminated concurrently with the lock released, then removed
    /// under a second short write lock regardless of outcome. Sandboxes
    /// registered while the sweep runs are left alone. Returns one error per
    /// sandbox that could not be released.
    pub async fn terminate_all(&self) -> Vec<Error> {
        let snapshot: Vec<(String, Arc<dyn Provider>)> = {
            let mut inner = self.inner.write().await;
            inner.active = None;
            inner
                .entries
                .iter_mut()
                .map(|(id, entry)| {
                    if !entry.handle.state().is_terminal() {
                        let _ = entry.handle.transition_to(SandboxState::Terminated);
                    }
                    (id.clone(), Arc::clone(&entry.provider))
                })
                .collect()
        };

        if snapshot.is_empty() {
            return Vec::new();
        }
        tracing::info!(count = snapshot.len(), "terminating all sandboxes");

        let results = join_all(
            snapshot
                .iter()
                .map(|(id, provider)| self.terminate_provider(id, provider.as_ref())),
        )
        .await;

        {
            let mut inner = self.inner.write().await;
            for (id, _) in &snapshot {
                inner.entries.remove(id);
            }
        }

        let errors: Vec<Error> = results.into_iter().filter_map(|r| r.err()).collect();
        if !errors.is_empty() {
            tracing::error!(
                failed = errors.len(),
                total = snapshot.len(),
                "some sandboxes could not be terminated and are no longer tracked"
            );
        }
        errors
    }

    async fn terminate_provider(&self, id: &str, provider: &dyn Provider) -> Result<()> {
        let attempts = self.settings.max_terminate_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match provider.terminate().await {
                Ok(()) => {
                    tracing::info!(sandbox_id = %id, "sandbox terminated");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(sandbox_id = %id, attempt = attempt, error = %e, "sandbox termination failed");
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(self.settings.terminate_retry_delay()).await;
                    }
                }
            }
        }

        let reason = last_error.map(|e| e.to_string()).unwrap_or_default();
        tracing::error!(sandbox_id = %id, reason = %reason, "giving up on sandbox termination");
        Err(Error::SandboxCleanup {
            id: id.to_string(),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::testing::ScriptedProvider;
    use crate::sandbox::ProviderKind;
    use crate::validator::ErrorKind;

    fn fast_settings() -> RegistrySettings {
        RegistrySettings {
            max_terminate_attempts: 3,
            terminate_retry_delay_ms: 0,
        }
    }

    fn handle(id: &str) -> SandboxHandle {
        SandboxHandle::new(id, ProviderKind::RemoteServerless, format!("https://{id}.dev"))
    }

    async fn register(registry: &SandboxRegistry, id: &str) -> Arc<ScriptedProvider> {
        let provider = Arc::new(ScriptedProvider::new(id, &format!("https://{id}.dev")));
        registry.register(handle(id), provider.clone()).await.unwrap();
        provider
    }

    async fn drive_to_ready(registry: &SandboxRegistry, id: &str) -> Result<SandboxHandle> {
        registry.transition(id, SandboxState::ConfiguringApp).await?;
        registry.transition(id, SandboxState::Validating).await?;
        registry.transition(id, SandboxState::Ready).await
    }

    #[tokio::test]
    async fn registry_rejects_duplicate_registration() {
        let registry = SandboxRegistry::new(fast_settings());
        register(&registry, "sbx-1").await;
        registry
            .transition("sbx-1", SandboxState::ConfiguringApp)
            .await
            .unwrap();

        let second = Arc::new(ScriptedProvider::new("sbx-1", "https://other.dev"));
        let err = registry.register(handle("sbx-1"), second).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateRegistration(ref id) if id == "sbx-1"));

        let (kept, _) = registry.lookup("sbx-1").await.unwrap();
        assert_eq!(kept.public_url(), "https://sbx-1.dev");
        assert_eq!(kept.state(), SandboxState::ConfiguringApp);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn terminate_all_drops_every_entry_and_collects_failures() {
        let registry = SandboxRegistry::new(fast_settings());
        let a = register(&registry, "sbx-a").await;
        let c = register(&registry, "sbx-c").await;
        let b = Arc::new(ScriptedProvider::new("sbx-b", "https://sbx-b.dev").failing_terminate(u32::MAX));
        registry.register(handle("sbx-b"), b.clone()).await.unwrap();

        let errors = registry.terminate_all().await;

        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], Error::SandboxCleanup { ref id, .. } if id == "sbx-b"));
        assert!(registry.is_empty().await);
        for id in ["sbx-a", "sbx-b", "sbx-c"] {
            assert!(registry.lookup(id).await.is_none());
        }
        assert_eq!(a.terminate_calls(), 1);
        assert_eq!(c.terminate_calls(), 1);
        assert_eq!(b.terminate_calls(), 3);
    }

    #[tokio::test]
    async fn terminate_retries_transient_failures() {
        let registry = SandboxRegistry::new(fast_settings());
        let provider = Arc::new(ScriptedProvider::new("sbx-1", "https://sbx-1.dev").failing_terminate(2));
        registry.register(handle("sbx-1"), provider.clone()).await.unwrap();

        registry.terminate("sbx-1").await.unwrap();
        assert_eq!(provider.terminate_calls(), 3);
    }

    #[tokio::test]
    async fn second_terminate_is_not_found() {
        let registry = SandboxRegistry::new(fast_settings());
        let provider = register(&registry, "sbx-1").await;

        registry.terminate("sbx-1").await.unwrap();
        let err = registry.terminate("sbx-1").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(provider.terminate_calls(), 1);
    }

    #[tokio::test]
    async fn failed_termination_still_untracks() {
        let registry = SandboxRegistry::new(fast_settings());
        register(&registry, "sbx-ok").await;
        let bad = Arc::new(ScriptedProvider::new("sbx-bad", "https://sbx-bad.dev").failing_terminate(u32::MAX));
        registry.register(handle("sbx-bad"), bad).await.unwrap();

        let err = registry.terminate("sbx-bad").await.unwrap_err();
        assert_eq!(err.code(), "cleanup_failed");
        assert_eq!(registry.ids().await, vec!["sbx-ok".to_string()]);
    }

    #[tokio::test]
    async fn only_one_sandbox_can_be_ready() {
        let registry = SandboxRegistry::new(fast_settings());
        register(&registry, "sbx-1").await;
        register(&registry, "sbx-2").await;

        drive_to_ready(&registry, "sbx-1").await.unwrap();
        let err = drive_to_ready(&registry, "sbx-2").await.unwrap_err();
        assert!(matches!(err, Error::ActiveSandboxConflict(ref id) if id == "sbx-1"));
        assert_eq!(registry.active().await.unwrap().id(), "sbx-1");

        registry.terminate("sbx-1").await.unwrap();
        assert!(registry.active().await.is_none());
        registry.transition("sbx-2", SandboxState::Ready).await.unwrap();
        assert_eq!(registry.active().await.unwrap().id(), "sbx-2");
    }

    #[tokio::test]
    async fn transition_enforces_state_machine() {
        let registry = SandboxRegistry::new(fast_settings());
        register(&registry, "sbx-1").await;

        let err = registry
            .transition("sbx-1", SandboxState::Ready)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));

        let err = registry
            .transition("missing", SandboxState::Failed)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn degraded_sandbox_carries_failure_details() {
        let registry = SandboxRegistry::new(fast_settings());
        register(&registry, "sbx-1").await;
        registry.transition("sbx-1", SandboxState::ConfiguringApp).await.unwrap();
        registry.transition("sbx-1", SandboxState::Validating).await.unwrap();

        let handle = registry
            .mark_degraded(
                "sbx-1",
                DegradedInfo {
                    error_kind: ErrorKind::MissingPackage,
                    message: "Failed to resolve import \"left-pad\"".into(),
                    attempt: 1,
                    retry_delay_ms: 4000,
                },
            )
            .await
            .unwrap();
        assert_eq!(handle.state(), SandboxState::Degraded);
        assert_eq!(handle.degraded().unwrap().error_kind, ErrorKind::MissingPackage);

        let failed = registry.mark_failed("sbx-1", "gave up").await.unwrap();
        assert_eq!(failed.state(), SandboxState::Failed);
        assert_eq!(failed.last_error(), Some("gave up"));
    }

    #[tokio::test]
    async fn lookups_never_see_swept_entries() {
        let registry = Arc::new(SandboxRegistry::new(fast_settings()));
        let ids: Vec<String> = (0..16).map(|i| format!("sbx-{i}")).collect();
        for id in &ids {
            register(&registry, id).await;
        }

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let ids = ids.clone();
                tokio::spawn(async move {
                    for _ in 0..50 {
                        for id in &ids {
                            if let Some((handle, _)) = registry.lookup(id).await {
                                assert_eq!(handle.id(), id);
                            }
                        }
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        let errors = registry.terminate_all().await;
        assert!(errors.is_empty());
        for id in &ids {
            assert!(registry.lookup(id).await.is_none());
        }
        for reader in readers {
            reader.await.unwrap();
        }
    }

    #[tokio::test]
    async fn sweep_marks_entries_terminated_before_removal() {
        let registry = SandboxRegistry::new(fast_settings());
        register(&registry, "sbx-1").await;
        drive_to_ready(&registry, "sbx-1").await.unwrap();

        registry.terminate_all().await;
        assert!(registry.active().await.is_none());
        assert!(registry.get("sbx-1").await.is_none());
    }
}
