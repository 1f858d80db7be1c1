//! Single-shot build probe against a sandbox's public URL.

use std::collections::BTreeSet;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE, PRAGMA};
use serde::{Deserialize, Serialize};

use crate::config::ValidationSettings;
use crate::error::Result;

use super::classify::{classify_error, extract_missing_packages, ErrorKind};

/// Strings a host serves from its placeholder page while no dev server is
/// listening yet.
const PLACEHOLDER_MARKERS: &[&str] = &["sandbox-scaffold-placeholder", "welcome to your sandbox"];

/// Element ids an app mounts into.
const ROOT_MOUNT_MARKERS: &[&str] = &[r#"id="root""#, "id='root'", r#"id="app""#, "id='app'"];

/// Signatures of a bundler error overlay in the served document.
const OVERLAY_MARKERS: &[&str] = &["error-overlay", "[plugin:", "internal server error"];

/// Fallback when an overlay is present but no cause could be extracted.
pub const GENERIC_BUNDLER_ERROR: &str = "Bundler compilation error detected in sandbox output";

/// Message for a sandbox still serving a placeholder page.
pub const NOT_RENDERING_ERROR: &str = "Sandbox is not yet rendering the application";

/// Outcome of one validation probe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildValidation {
    /// Whether the app compiled and is rendering.
    pub success: bool,
    /// Failure messages, most specific first.
    pub errors: Vec<String>,
    /// Whether the served page is the real application.
    pub is_rendering: bool,
    /// Non-fatal observations.
    pub warnings: Vec<String>,
}

impl BuildValidation {
    fn passed(warnings: Vec<String>) -> Self {
        Self {
            success: true,
            errors: Vec::new(),
            is_rendering: true,
            warnings,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            errors: vec![error.into()],
            is_rendering: false,
            warnings: Vec::new(),
        }
    }

    /// Classification of the first reported error, if any.
    pub fn classification(&self) -> Option<ErrorKind> {
        self.errors.first().map(|e| classify_error(e))
    }

    /// Packages named by any of the reported errors.
    pub fn missing_packages(&self) -> BTreeSet<String> {
        self.errors
            .iter()
            .flat_map(|e| extract_missing_packages(e))
            .collect()
    }
}

fn cause_patterns() -> &'static [Regex; 3] {
    static PATTERNS: OnceLock<[Regex; 3]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r#"(?i)failed to resolve import\s+"[^"]+"(?:\s+from\s+"[^"]+")?"#)
                .expect("import cause pattern is valid"),
            Regex::new(r#"(?i)cannot find module\s+['"][^'"]+['"]"#)
                .expect("module cause pattern is valid"),
            Regex::new(r"(?i)(?:syntaxerror|unexpected token)[^<\n]*")
                .expect("syntax cause pattern is valid"),
        ]
    })
}

fn decode_entities(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Inspects a served document. Separated from the fetch so it can be
/// exercised without a server.
pub fn inspect_document(body: &str) -> BuildValidation {
    let decoded = decode_entities(body);
    let lower = decoded.to_lowercase();
    let mut errors = Vec::new();
    let mut is_rendering = true;

    let placeholder = PLACEHOLDER_MARKERS.iter().any(|m| lower.contains(m));
    let has_root = ROOT_MOUNT_MARKERS.iter().any(|m| lower.contains(m));
    if placeholder || !has_root {
        is_rendering = false;
        errors.push(NOT_RENDERING_ERROR.to_string());
    }

    if OVERLAY_MARKERS.iter().any(|m| lower.contains(m)) {
        let cause = cause_patterns()
            .iter()
            .find_map(|p| p.find(&decoded))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_else(|| GENERIC_BUNDLER_ERROR.to_string());
        // The bundler cause is the actionable one.
        errors.insert(0, cause);
    }

    let mut warnings = Vec::new();
    if !lower.contains("/@vite/client") {
        warnings.push("Dev server client script not found; page may not hot-reload".to_string());
    }

    if errors.is_empty() {
        BuildValidation::passed(warnings)
    } else {
        BuildValidation {
            success: false,
            errors,
            is_rendering,
            warnings,
        }
    }
}

/// Probes a sandbox's served output and classifies what it finds.
///
/// Performs exactly one fetch per call; retry scheduling belongs to the
/// caller.
#[derive(Debug, Clone)]
pub struct BuildValidator {
    client: reqwest::Client,
    settle_delay: Duration,
}

impl BuildValidator {
    /// Creates a validator from validation settings.
    pub fn new(settings: &ValidationSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()?;
        Ok(Self {
            client,
            settle_delay: settings.settle_delay(),
        })
    }

    /// Overrides the settling delay.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Waits for the bundler, fetches `url`, and inspects the result.
    pub async fn validate(&self, url: &str, sandbox_id: &str) -> BuildValidation {
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }

        let cache_buster = chrono::Utc::now().timestamp_millis().to_string();
        let response = self
            .client
            .get(url)
            .query(&[("_sandbox_probe", cache_buster.as_str())])
            .header(CACHE_CONTROL, "no-cache, no-store, must-revalidate")
            .header(PRAGMA, "no-cache")
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                tracing::warn!(sandbox_id = %sandbox_id, url = %url, "sandbox probe timed out");
                return BuildValidation::failed(format!("Sandbox request timed out: {}", e));
            }
            Err(e) => {
                tracing::warn!(sandbox_id = %sandbox_id, url = %url, error = %e, "sandbox probe failed");
                return BuildValidation::failed(format!("Failed to reach sandbox (connection refused or reset): {}", e));
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(sandbox_id = %sandbox_id, status = status.as_u16(), "sandbox returned non-success");
            return BuildValidation::failed(format!("Sandbox returned {}", status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return BuildValidation::failed(format!("Failed to read sandbox response: {}", e)),
        };

        let mut validation = inspect_document(&body);
        if let Some(ct) = content_type.filter(|ct| !ct.contains("text/html")) {
            validation
                .warnings
                .push(format!("Unexpected content type from sandbox: {}", ct));
        }

        tracing::debug!(
            sandbox_id = %sandbox_id,
            success = validation.success,
            is_rendering = validation.is_rendering,
            errors = validation.errors.len(),
            "sandbox probe complete"
        );

        validation
    }
}
