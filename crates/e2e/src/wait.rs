//! Synchronization with an eventually-consistent UI
//!
//! All waiting in the engine goes through [`WaitPolicy`]: a bounded polling
//! loop on tokio's clock. A wait returns as soon as its condition holds on any
//! poll and never outlives its timeout, even if a single driver call hangs,
//! because every probe runs under the remaining budget.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout, Instant};
use tracing::debug;

use crate::descriptor::Descriptor;
use crate::driver::{ElementHandle, UiDriver};
use crate::error::{E2eError, E2eResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Delay between probes
    pub poll_interval: Duration,
    /// Budget for locating an element before interacting with it
    pub action_timeout: Duration,
    /// Default budget for a step's postcondition
    pub postcondition_timeout: Duration,
    /// Budget for URL postconditions
    pub navigation_timeout: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            action_timeout: Duration::from_secs(10),
            postcondition_timeout: Duration::from_secs(15),
            navigation_timeout: Duration::from_secs(30),
        }
    }
}

impl WaitPolicy {
    /// Run `probe` until it yields a value or `budget` elapses.
    ///
    /// The first probe always runs, even with a zero budget.
    pub async fn poll<T, F, Fut>(&self, budget: Duration, mut probe: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        let deadline = Instant::now() + budget;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let remaining = deadline.saturating_duration_since(Instant::now());
            match timeout(remaining, probe()).await {
                Ok(Some(value)) => return Some(value),
                Ok(None) => {}
                Err(_) => {
                    debug!("Probe #{} exceeded the remaining budget", attempts);
                    return None;
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!("Gave up after {} probes", attempts);
                return None;
            }
            sleep(self.poll_interval.min(remaining)).await;
        }
    }

    /// Wait until an element matching `descriptor` is visible.
    pub async fn wait_until_visible(
        &self,
        driver: &dyn UiDriver,
        descriptor: &Descriptor,
        budget: Duration,
    ) -> E2eResult<ElementHandle> {
        self.wait_until_fresh_visible(driver, descriptor, &HashSet::new(), budget)
            .await
    }

    /// Wait until an element matching `descriptor` is visible and is not one
    /// of the `baseline` elements observed before the triggering action.
    pub async fn wait_until_fresh_visible(
        &self,
        driver: &dyn UiDriver,
        descriptor: &Descriptor,
        baseline: &HashSet<ElementHandle>,
        budget: Duration,
    ) -> E2eResult<ElementHandle> {
        let start = Instant::now();
        let found = self
            .poll(budget, || async move {
                let candidates = match driver.query(descriptor).await {
                    Ok(c) => c,
                    Err(e) => {
                        debug!("Query for {} failed, retrying: {}", descriptor, e);
                        return None;
                    }
                };
                let stale = candidates
                    .iter()
                    .filter(|c| c.visible && baseline.contains(&c.handle))
                    .count();
                if stale > 0 {
                    debug!("Ignoring {} stale match(es) for {}", stale, descriptor);
                }
                candidates
                    .into_iter()
                    .find(|c| c.visible && !baseline.contains(&c.handle))
                    .map(|c| c.handle)
            })
            .await;

        found.ok_or_else(|| E2eError::TimeoutExpired {
            condition: format!("{descriptor} visible"),
            waited_ms: elapsed_ms(start),
        })
    }

    /// Wait until no element matching `descriptor` is visible.
    pub async fn wait_until_hidden(
        &self,
        driver: &dyn UiDriver,
        descriptor: &Descriptor,
        budget: Duration,
    ) -> E2eResult<()> {
        let start = Instant::now();
        let gone = self
            .poll(budget, || async move {
                match driver.query(descriptor).await {
                    Ok(candidates) if candidates.iter().all(|c| !c.visible) => Some(()),
                    Ok(_) => None,
                    Err(e) => {
                        debug!("Query for {} failed, retrying: {}", descriptor, e);
                        None
                    }
                }
            })
            .await;

        gone.ok_or_else(|| E2eError::TimeoutExpired {
            condition: format!("{descriptor} hidden"),
            waited_ms: elapsed_ms(start),
        })
    }

    /// Wait until the page URL matches `pattern`.
    pub async fn wait_for_url(
        &self,
        driver: &dyn UiDriver,
        pattern: &UrlPattern,
        budget: Duration,
    ) -> E2eResult<String> {
        self.wait_for_url_change(driver, pattern, None, budget).await
    }

    /// Like [`Self::wait_for_url`], but a URL equal to `stale` does not count.
    pub async fn wait_for_url_change(
        &self,
        driver: &dyn UiDriver,
        pattern: &UrlPattern,
        stale: Option<&str>,
        budget: Duration,
    ) -> E2eResult<String> {
        let start = Instant::now();
        let last_url = Mutex::new(String::new());
        let last_url_ref = &last_url;

        let reached = self
            .poll(budget, || async move {
                let url = driver.current_url().await.ok()?;
                *last_url_ref.lock() = url.clone();
                let fresh = stale.map_or(true, |s| s != url);
                (fresh && pattern.matches(&url)).then_some(url)
            })
            .await;

        reached.ok_or_else(|| E2eError::NavigationFailed {
            pattern: pattern.to_string(),
            last_url: last_url.into_inner(),
            waited_ms: elapsed_ms(start),
        })
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Glob over full URLs: `**` matches anything, `*` anything but `/`,
/// `?` a single character other than `/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UrlPattern {
    glob: String,
    regex: Regex,
}

impl UrlPattern {
    pub fn new(glob: &str) -> E2eResult<Self> {
        let mut source = String::from("^");
        let mut chars = glob.chars().peekable();
        let mut literal = String::new();

        while let Some(c) = chars.next() {
            match c {
                '*' | '?' => {
                    source.push_str(&regex::escape(&literal));
                    literal.clear();
                    if c == '?' {
                        source.push_str("[^/]");
                    } else if chars.peek() == Some(&'*') {
                        chars.next();
                        source.push_str(".*");
                    } else {
                        source.push_str("[^/]*");
                    }
                }
                other => literal.push(other),
            }
        }
        source.push_str(&regex::escape(&literal));
        source.push('$');

        let regex = Regex::new(&source)
            .map_err(|e| E2eError::InvalidConfig(format!("bad URL pattern {glob:?}: {e}")))?;
        Ok(Self { glob: glob.to_string(), regex })
    }

    pub fn matches(&self, url: &str) -> bool {
        self.regex.is_match(url)
    }

    pub fn as_str(&self) -> &str {
        &self.glob
    }
}

impl PartialEq for UrlPattern {
    fn eq(&self, other: &Self) -> bool {
        self.glob == other.glob
    }
}

impl fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.glob)
    }
}

impl TryFrom<String> for UrlPattern {
    type Error = E2eError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<UrlPattern> for String {
    fn from(value: UrlPattern) -> Self {
        value.glob
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeElement, FakePage};
    use test_case::test_case;

    #[test_case("**/app/provider/**", "https://portal.test/app/provider/dashboard" => true; "double star spans segments")]
    #[test_case("**/app/provider/**", "https://portal.test/login" => false; "other path")]
    #[test_case("**/app/provider/**", "https://portal.test/app/provider" => false; "needs trailing segment")]
    #[test_case("https://portal.test/app/*", "https://portal.test/app/home" => true; "single star")]
    #[test_case("https://portal.test/app/*", "https://portal.test/app/home/x" => false; "single star stops at slash")]
    #[test_case("https://portal.test/?ogin", "https://portal.test/login" => true; "question mark")]
    #[test_case("https://portal.test/a.b", "https://portal.test/aXb" => false; "dots are literal")]
    fn test_url_pattern(glob: &str, url: &str) -> bool {
        UrlPattern::new(glob).unwrap().matches(url)
    }

    fn fast_policy() -> WaitPolicy {
        WaitPolicy {
            poll_interval: Duration::from_millis(100),
            ..WaitPolicy::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_visible_after_delay() {
        let page = FakePage::new("https://portal.test/");
        page.add_after(Duration::from_millis(700), FakeElement::text("Provider created successfully"));

        let start = Instant::now();
        let handle = fast_policy()
            .wait_until_visible(&page, &Descriptor::text("created successfully"), Duration::from_secs(2))
            .await
            .unwrap();

        assert!(!handle.0.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(700));
        assert!(start.elapsed() < Duration::from_millis(900));
    }

    #[tokio::test(start_paused = true)]
    async fn test_visible_times_out_within_budget() {
        let page = FakePage::new("https://portal.test/");
        let budget = Duration::from_millis(1_500);

        let start = Instant::now();
        let err = fast_policy()
            .wait_until_visible(&page, &Descriptor::text("never"), budget)
            .await
            .unwrap_err();

        assert!(matches!(err, E2eError::TimeoutExpired { .. }));
        assert!(start.elapsed() <= budget + Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_driver_cannot_stretch_the_wait() {
        let page = FakePage::new("https://portal.test/");
        page.set_query_latency(Duration::from_secs(60));
        let budget = Duration::from_secs(2);

        let start = Instant::now();
        let result = fast_policy()
            .wait_until_visible(&page, &Descriptor::text("anything"), budget)
            .await;

        assert!(result.is_err());
        assert!(start.elapsed() <= budget + Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_baseline_is_ignored() {
        let page = FakePage::new("https://portal.test/");
        let old = page.add(FakeElement::text("Provider created successfully").persistent());
        let baseline: HashSet<_> = [old].into_iter().collect();

        let err = fast_policy()
            .wait_until_fresh_visible(
                &page,
                &Descriptor::text("Provider created successfully"),
                &baseline,
                Duration::from_secs(1),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, E2eError::TimeoutExpired { .. }));

        page.add(FakeElement::text("Provider created successfully"));
        let fresh = fast_policy()
            .wait_until_fresh_visible(
                &page,
                &Descriptor::text("Provider created successfully"),
                &baseline,
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert!(!baseline.contains(&fresh));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_url_reports_last_url() {
        let page = FakePage::new("https://portal.test/login");
        let pattern = UrlPattern::new("**/app/provider/**").unwrap();

        let err = fast_policy()
            .wait_for_url(&page, &pattern, Duration::from_secs(3))
            .await
            .unwrap_err();

        match err {
            E2eError::NavigationFailed { pattern, last_url, waited_ms } => {
                assert_eq!(pattern, "**/app/provider/**");
                assert_eq!(last_url, "https://portal.test/login");
                assert!(waited_ms >= 3_000);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_url_change_rejects_stale_url() {
        let page = FakePage::new("https://portal.test/app/provider/home");
        let pattern = UrlPattern::new("**/app/provider/**").unwrap();
        let policy = fast_policy();

        let stale = policy
            .wait_for_url_change(&page, &pattern, Some("https://portal.test/app/provider/home"), Duration::from_millis(500))
            .await;
        assert!(stale.is_err());

        page.navigate_after(Duration::from_millis(200), "https://portal.test/app/provider/settings");
        let url = policy
            .wait_for_url_change(&page, &pattern, Some("https://portal.test/app/provider/home"), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(url, "https://portal.test/app/provider/settings");
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_hidden() {
        let page = FakePage::new("https://portal.test/");
        let button = page.add(FakeElement::button("Save and close"));
        page.remove_after(Duration::from_millis(300), &button);

        fast_policy()
            .wait_until_hidden(&page, &Descriptor::button("Save and close"), Duration::from_secs(1))
            .await
            .unwrap();
    }
}
