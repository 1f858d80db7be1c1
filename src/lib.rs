//! Sandbox Orchestrator - provisioning and build validation for remote dev sandboxes
//!
//! This library creates short-lived remote sandboxes running a live dev
//! server, tracks their lifecycle in a concurrency-safe registry, and probes
//! their served output until the pushed app compiles and renders.

pub mod backoff;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod file_cache;
pub mod orchestrator;
pub mod registry;
pub mod sandbox;
pub mod validator;

pub use error::{Error, ErrorPayload, Result};

pub use config::{
    OrchestratorConfig, ProviderSettings, RegistrySettings, Validate, ValidationReport,
    ValidationSettings,
};
pub use file_cache::FileCacheSnapshot;
pub use orchestrator::{
    ApplyReport, CreateRequest, CreateSandboxResponse, Orchestrator, ProvisionOutcome,
    ReadyOutcome,
};
pub use registry::SandboxRegistry;
pub use sandbox::{
    ClientKey, DegradedInfo, Provider, ProviderConfig, ProviderFactory, ProviderKind,
    RemoteProvider, SandboxFile, SandboxHandle, SandboxState,
};
pub use validator::{
    calculate_retry_delay, classify_error, extract_missing_packages, BuildValidation,
    BuildValidator, ErrorKind,
};
