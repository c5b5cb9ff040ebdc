//! Error types for scenario runs

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Element not found: {descriptor} (waited {waited_ms} ms)")]
    ElementNotFound { descriptor: String, waited_ms: u64 },

    #[error("Ambiguous match: {descriptor} resolved to {count} actionable elements")]
    AmbiguousMatch { descriptor: String, count: usize },

    #[error("Timeout waiting for: {condition} (waited {waited_ms} ms)")]
    TimeoutExpired { condition: String, waited_ms: u64 },

    #[error("Navigation failed: expected URL matching {pattern}, last URL was {last_url} (waited {waited_ms} ms)")]
    NavigationFailed {
        pattern: String,
        last_url: String,
        waited_ms: u64,
    },

    #[error("No appointment slot available (tried: {})", tried.join(", "))]
    SlotUnavailable { tried: Vec<String> },

    #[error("Step {step} requires {missing}, which no earlier step confirmed")]
    PreconditionUnmet { step: String, missing: String },

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Playwright bridge not available. Install with: npm i playwright && npx playwright install")]
    BridgeNotFound,

    #[error("Target application unreachable: {0}")]
    TargetUnreachable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML encode error: {0}")]
    TomlEncode(#[from] toml::ser::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;

/// Coarse classification of a step failure, as reported in run results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ElementNotFound,
    AmbiguousMatch,
    TimeoutExpired,
    NavigationFailed,
    SlotUnavailable,
    PreconditionUnmet,
    Infrastructure,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ElementNotFound => "ElementNotFound",
            Self::AmbiguousMatch => "AmbiguousMatch",
            Self::TimeoutExpired => "TimeoutExpired",
            Self::NavigationFailed => "NavigationFailed",
            Self::SlotUnavailable => "SlotUnavailable",
            Self::PreconditionUnmet => "PreconditionUnmet",
            Self::Infrastructure => "Infrastructure",
        };
        f.write_str(s)
    }
}

impl E2eError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::ElementNotFound { .. } => FailureKind::ElementNotFound,
            Self::AmbiguousMatch { .. } => FailureKind::AmbiguousMatch,
            Self::TimeoutExpired { .. } => FailureKind::TimeoutExpired,
            Self::NavigationFailed { .. } => FailureKind::NavigationFailed,
            Self::SlotUnavailable { .. } => FailureKind::SlotUnavailable,
            Self::PreconditionUnmet { .. } => FailureKind::PreconditionUnmet,
            _ => FailureKind::Infrastructure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let err = E2eError::NavigationFailed {
            pattern: "**/app/provider/**".to_string(),
            last_url: "https://portal.test/login".to_string(),
            waited_ms: 30_000,
        };
        assert_eq!(err.kind(), FailureKind::NavigationFailed);
        assert_eq!(E2eError::Driver("gone".into()).kind(), FailureKind::Infrastructure);
    }

    #[test]
    fn test_slot_unavailable_lists_attempts() {
        let err = E2eError::SlotUnavailable {
            tried: vec![".available-slot (first)".into(), ".slot (unique)".into()],
        };
        assert_eq!(
            err.to_string(),
            "No appointment slot available (tried: .available-slot (first), .slot (unique))"
        );
    }
}
