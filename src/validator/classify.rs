//! Failure classification, retry delays and missing-package extraction.
//!
//! All functions here are pure. They pick a retry strategy; they never
//! change whether a probe counted as success.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Base unit for retry delays, in milliseconds.
pub const RETRY_BASE_MS: u64 = 2000;

/// Coarse, retry-relevant category of a build failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingPackage,
    SyntaxError,
    SandboxTimeout,
    NotRendered,
    BundlerError,
    Unknown,
}

impl ErrorKind {
    /// Multiplier applied to the base retry unit.
    pub fn delay_multiplier(&self) -> u64 {
        match self {
            ErrorKind::MissingPackage => 2,
            ErrorKind::NotRendered => 3,
            ErrorKind::BundlerError => 2,
            ErrorKind::SandboxTimeout => 4,
            ErrorKind::SyntaxError | ErrorKind::Unknown => 1,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::MissingPackage => "missing_package",
            ErrorKind::SyntaxError => "syntax_error",
            ErrorKind::SandboxTimeout => "sandbox_timeout",
            ErrorKind::NotRendered => "not_rendered",
            ErrorKind::BundlerError => "bundler_error",
            ErrorKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Keyword table, checked in order; first hit wins.
const KEYWORDS: &[(ErrorKind, &[&str])] = &[
    (
        ErrorKind::MissingPackage,
        &[
            "failed to resolve import",
            "cannot find module",
            "module not found",
            "cannot find package",
            "could not resolve",
            "package not found",
            "is not installed",
        ],
    ),
    (
        ErrorKind::SyntaxError,
        &[
            "syntaxerror",
            "syntax error",
            "unexpected token",
            "unterminated",
            "expected expression",
            "parse error",
        ],
    ),
    (
        ErrorKind::SandboxTimeout,
        &[
            "timed out",
            "timeout",
            "sandbox not found",
            "sandbox expired",
            "econnrefused",
            "econnreset",
            "connection refused",
            "bad gateway",
        ],
    ),
    (
        ErrorKind::NotRendered,
        &[
            "not rendering",
            "not yet rendering",
            "not rendered",
            "root element",
            "blank page",
            "placeholder",
        ],
    ),
    (
        ErrorKind::BundlerError,
        &[
            "vite",
            "bundler",
            "esbuild",
            "compilation error",
            "failed to compile",
            "[plugin:",
            "error overlay",
            "internal server error",
        ],
    ),
];

/// Classifies an error message by case-insensitive keyword match.
pub fn classify_error(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();
    KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
        .map(|(kind, _)| *kind)
        .unwrap_or(ErrorKind::Unknown)
}

/// Retry delay in milliseconds for a 1-based attempt, using [`RETRY_BASE_MS`].
///
/// `delay = base × multiplier(kind) × attempt`. Attempt 0 is treated as 1.
pub fn calculate_retry_delay(attempt: u32, kind: ErrorKind) -> u64 {
    retry_delay_with_base(RETRY_BASE_MS, attempt, kind)
}

/// Same as [`calculate_retry_delay`] with a configurable base unit.
pub fn retry_delay_with_base(base_ms: u64, attempt: u32, kind: ErrorKind) -> u64 {
    base_ms
        .saturating_mul(kind.delay_multiplier())
        .saturating_mul(u64::from(attempt.max(1)))
}

fn missing_package_patterns() -> &'static [Regex; 3] {
    static PATTERNS: OnceLock<[Regex; 3]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // Vite: Failed to resolve import "left-pad" from "src/App.jsx"
            Regex::new(r#"(?i)failed to resolve import\s+["']([^"']+)["']"#)
                .expect("unresolved-import pattern is valid"),
            // Node / webpack: Cannot find module 'x', Module not found: Can't resolve 'x'
            Regex::new(r#"(?i)(?:cannot find module|can't resolve)\s+["']([^"']+)["']"#)
                .expect("unresolved-module pattern is valid"),
            // npm / esbuild: Package "x" not found, Could not resolve "x"
            Regex::new(
                r#"(?i)(?:package\s+["']([^"']+)["']\s+(?:was\s+)?not found|could not resolve\s+["']([^"']+)["'])"#,
            )
            .expect("package-not-found pattern is valid"),
        ]
    })
}

/// Reduces an import specifier to the npm package that provides it.
///
/// Returns `None` for relative paths, absolute paths and runtime builtins.
fn package_name(specifier: &str) -> Option<String> {
    let specifier = specifier.trim();
    if specifier.is_empty()
        || specifier.starts_with('.')
        || specifier.starts_with('/')
        || specifier.starts_with("node:")
        || specifier.starts_with("virtual:")
    {
        return None;
    }

    let mut segments = specifier.split('/');
    let first = segments.next()?;
    let name = if first.starts_with('@') {
        let second = segments.next().filter(|s| !s.is_empty())?;
        format!("{}/{}", first, second)
    } else {
        first.to_string()
    };

    let valid = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '@' | '/' | '-' | '_' | '.'));
    valid.then_some(name)
}

/// Scans an error message for packages that failed to resolve.
///
/// The three pattern families are matched independently and their results
/// merged, so a package named by more than one of them appears once.
pub fn extract_missing_packages(message: &str) -> BTreeSet<String> {
    let mut packages = BTreeSet::new();
    for pattern in missing_package_patterns() {
        for captures in pattern.captures_iter(message) {
            let specifier = captures
                .iter()
                .skip(1)
                .flatten()
                .next()
                .map(|m| m.as_str());
            if let Some(name) = specifier.and_then(package_name) {
                packages.insert(name);
            }
        }
    }
    packages
}
