//! Scripted provider for unit tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::error::{Error, Result};

use super::handle::{ProviderKind, SandboxHandle};
use super::provider::{Provider, SandboxFile};

/// Provider whose outcomes are fixed up front and whose calls are counted.
pub(crate) struct ScriptedProvider {
    id: String,
    url: String,
    create_error: Mutex<Option<Error>>,
    setup_error: Mutex<Option<Error>>,
    terminate_failures: AtomicU32,
    setup_gate: Option<(Arc<Notify>, Arc<Notify>)>,
    pub creates: AtomicU32,
    pub setups: AtomicU32,
    pub terminates: AtomicU32,
    pub written: Mutex<Vec<SandboxFile>>,
}

impl ScriptedProvider {
    pub fn new(id: &str, url: &str) -> Self {
        Self {
            id: id.to_string(),
            url: url.to_string(),
            create_error: Mutex::new(None),
            setup_error: Mutex::new(None),
            terminate_failures: AtomicU32::new(0),
            setup_gate: None,
            creates: AtomicU32::new(0),
            setups: AtomicU32::new(0),
            terminates: AtomicU32::new(0),
            written: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_create(self, err: Error) -> Self {
        *self.create_error.lock().unwrap() = Some(err);
        self
    }

    pub fn failing_setup(self, err: Error) -> Self {
        *self.setup_error.lock().unwrap() = Some(err);
        self
    }

    /// Setup signals `started`, then waits for `release` before finishing.
    pub fn gated_setup(mut self, started: Arc<Notify>, release: Arc<Notify>) -> Self {
        self.setup_gate = Some((started, release));
        self
    }

    /// The first `times` terminate calls fail. `u32::MAX` fails forever.
    pub fn failing_terminate(self, times: u32) -> Self {
        self.terminate_failures.store(times, Ordering::SeqCst);
        self
    }

    pub fn terminate_calls(&self) -> u32 {
        self.terminates.load(Ordering::SeqCst)
    }

    pub fn written_paths(&self) -> Vec<String> {
        self.written
            .lock()
            .unwrap()
            .iter()
            .map(|f| f.path.clone())
            .collect()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::RemoteServerless
    }

    async fn create_sandbox(&self) -> Result<SandboxHandle> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.create_error.lock().unwrap().take() {
            return Err(err);
        }
        Ok(SandboxHandle::new(&self.id, self.kind(), &self.url))
    }

    async fn setup_vite_app(&self) -> Result<()> {
        self.setups.fetch_add(1, Ordering::SeqCst);
        if let Some((started, release)) = &self.setup_gate {
            started.notify_one();
            release.notified().await;
        }
        match self.setup_error.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn write_files(&self, files: &[SandboxFile]) -> Result<()> {
        self.written.lock().unwrap().extend_from_slice(files);
        Ok(())
    }

    async fn terminate(&self) -> Result<()> {
        self.terminates.fetch_add(1, Ordering::SeqCst);
        let remaining = self.terminate_failures.load(Ordering::SeqCst);
        if remaining == 0 {
            return Ok(());
        }
        if remaining != u32::MAX {
            self.terminate_failures.store(remaining - 1, Ordering::SeqCst);
        }
        Err(Error::ProviderUnavailable(format!(
            "delete of {} returned 500",
            self.id
        )))
    }
}
