//! Sandbox providers and the handle they produce.
//!
//! The [`Provider`] trait is the uniform contract every backend implements.
//! [`ProviderFactory`] picks the implementation for a [`ProviderKind`], so
//! nothing above this module branches on backend kind.

pub mod api;
pub mod backends;
mod factory;
mod handle;
mod provider;
mod remote;
pub mod scaffold;

#[cfg(test)]
pub(crate) mod testing;

pub use factory::{BackendContext, ClientKey, ProviderConstructor, ProviderFactory};
pub use handle::{DegradedInfo, ProviderKind, SandboxHandle, SandboxState};
pub use provider::{Provider, ProviderConfig, SandboxFile};
pub use remote::{BackendProfile, RemoteProvider};
