//! Diagnostic-mode switch.
//!
//! Environment variables:
//! - `SANDBOX_DIAGNOSTICS=1` - Attach debug details to reported errors
//!
//! Diagnostic mode is meant for local development. Production deployments
//! leave it unset so error payloads carry only a code and a message.

use std::sync::OnceLock;

/// Global diagnostics configuration loaded once on first use.
static DIAGNOSTICS: OnceLock<DiagnosticsConfig> = OnceLock::new();

/// Diagnostics configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiagnosticsConfig {
    /// Include debug renderings of errors in externally reported payloads.
    pub include_details: bool,
}

impl DiagnosticsConfig {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            include_details: std::env::var("SANDBOX_DIAGNOSTICS")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

/// Installs an explicit configuration. Returns false if one was already set.
pub fn init(config: DiagnosticsConfig) -> bool {
    DIAGNOSTICS.set(config).is_ok()
}

/// Returns the active configuration, reading the environment on first call.
pub fn config() -> DiagnosticsConfig {
    *DIAGNOSTICS.get_or_init(DiagnosticsConfig::from_env)
}

/// Whether error payloads should carry debug details.
pub fn enabled() -> bool {
    config().include_details
}
