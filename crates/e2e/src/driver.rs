//! Browser capability consumed by the engine
//!
//! [`UiDriver`] is the only seam between the scenario engine and a real
//! browser. Implementations: [`crate::playwright::PlaywrightDriver`] for live
//! runs and `testing::FakePage` (feature `testing`) for tests.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::descriptor::Descriptor;
use crate::error::E2eResult;

/// Stable identity of a DOM node for the lifetime of that node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementHandle(pub String);

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One element a descriptor resolved to, with its interaction state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub handle: ElementHandle,
    /// Accessible name or visible text
    pub text: String,
    pub visible: bool,
    pub enabled: bool,
    /// Another element sits on top of this one's center point
    #[serde(default)]
    pub obscured: bool,
}

impl Candidate {
    /// Present in the tree is not enough; it has to accept input.
    pub fn is_actionable(&self) -> bool {
        self.visible && self.enabled && !self.obscured
    }
}

/// Best-effort picture of the page for failure diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
    pub visible_text: String,
}

impl PageSnapshot {
    /// Truncate visible text for logs and reports
    pub fn summary(&self, max_chars: usize) -> String {
        let text: String = self
            .visible_text
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        let excerpt: String = text.chars().take(max_chars).collect();
        let ellipsis = if text.chars().count() > max_chars { "..." } else { "" };
        format!("url={} title=\"{}\" text=\"{}{}\"", self.url, self.title, excerpt, ellipsis)
    }
}

#[async_trait]
pub trait UiDriver: Send + Sync {
    async fn goto(&self, url: &str) -> E2eResult<()>;

    async fn current_url(&self) -> E2eResult<String>;

    /// Every element currently in the document that matches the descriptor,
    /// actionable or not.
    async fn query(&self, descriptor: &Descriptor) -> E2eResult<Vec<Candidate>>;

    async fn fill(&self, element: &ElementHandle, value: &str) -> E2eResult<()>;

    async fn click(&self, element: &ElementHandle) -> E2eResult<()>;

    async fn check(&self, element: &ElementHandle) -> E2eResult<()>;

    async fn select_option(&self, element: &ElementHandle, label: &str) -> E2eResult<()>;

    async fn snapshot(&self) -> E2eResult<PageSnapshot>;

    /// Returns `false` when the driver cannot capture screenshots.
    async fn screenshot(&self, _path: &Path) -> E2eResult<bool> {
        Ok(false)
    }

    async fn close(&self) -> E2eResult<()> {
        Ok(())
    }
}

/// Opens an independent browser context per scenario run
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn open(&self) -> E2eResult<Arc<dyn UiDriver>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(visible: bool, enabled: bool, obscured: bool) -> Candidate {
        Candidate {
            handle: ElementHandle("1".into()),
            text: "Save".into(),
            visible,
            enabled,
            obscured,
        }
    }

    #[test]
    fn test_actionable_requires_all_three() {
        assert!(candidate(true, true, false).is_actionable());
        assert!(!candidate(false, true, false).is_actionable());
        assert!(!candidate(true, false, false).is_actionable());
        assert!(!candidate(true, true, true).is_actionable());
    }

    #[test]
    fn test_snapshot_summary_truncates() {
        let snap = PageSnapshot {
            url: "https://portal.test/app".into(),
            title: "Portal".into(),
            visible_text: "Settings\n  Scheduling   Appointments".into(),
        };
        assert_eq!(
            snap.summary(10),
            "url=https://portal.test/app title=\"Portal\" text=\"Settings S...\""
        );
        assert!(snap.summary(100).ends_with("Appointments\""));
    }
}
